pub mod delay;
pub mod logging;
pub mod retry;
pub mod time;

pub use delay::random_delay;
pub use retry::{exponential_backoff, retry_bounded, RetryError};
pub use time::{seconds_to_time_str, time_str_to_seconds};
