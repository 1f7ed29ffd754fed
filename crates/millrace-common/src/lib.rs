pub mod error;
pub mod metrics;
pub mod retry;
pub mod shutdown;
pub mod type_map;

pub use error::{ErrorEvent, Reportable, Severity};
pub use retry::{retry, Retry, RetryPolicy, Retryable};
pub use shutdown::ShutdownSignal;
pub use type_map::TypeMap;
