pub mod launcher;

pub use launcher::{
    create_account_context, create_page_in_context, dispose_context, launch_browser, prepare_page,
};
