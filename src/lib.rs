pub mod bootstrap;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod notify;
pub mod retry;
pub mod session;

mod utils;

pub use context::AppContext;
pub use error::{ConnectionError, SessionError};
pub use notify::{ChangeEvent, Notifier};
pub use retry::{RetryPolicy, run_with_retry};
pub use session::Session;
