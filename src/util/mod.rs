//! Small async helpers.

pub mod retry;
pub mod timeout;

pub use retry::RetryPolicy;
pub use timeout::{with_deadline, with_timeout};
