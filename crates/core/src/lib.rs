pub mod config;
pub mod error;

pub use config::{load_dotenv, SchedulerSettings, SupervisorSettings, TaktConfig};
pub use error::{panic_message, HandlerError, TaktError};
