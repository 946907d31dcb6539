pub mod account;
pub mod content;
pub mod course;

pub use account::{load_accounts, Account};
pub use content::{
    count_contents, prune_unfinished, Chapter, ContentItem, ContentKind, NodePath, Section,
};
pub use course::{CourseRecord, CourseSelection};
