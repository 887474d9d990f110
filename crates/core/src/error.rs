use thiserror::Error;

/// Terminal error produced by a task handler or tracked thread body.
///
/// Boxed so that task authors can return whatever error type they already
/// have; the scheduler never inspects it beyond logging and crash capture.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum TaktError {
    #[error("handler for '{hash}' failed: {message}")]
    HandlerFailed { hash: String, message: String },

    #[error("handler for '{hash}' panicked: {message}")]
    HandlerPanicked { hash: String, message: String },

    #[error("tracked thread '{name}' failed: {message}")]
    ThreadFailed { name: String, message: String },

    #[error("tracked thread '{name}' panicked: {message}")]
    ThreadPanicked { name: String, message: String },

    #[error("host failure: {0}")]
    Host(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl TaktError {
    /// Whether this error originated in the host's main execution context
    /// (as opposed to a background thread or handler).
    pub fn is_host(&self) -> bool {
        matches!(self, TaktError::Host(_))
    }
}

/// Best-effort extraction of a panic payload's message.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_failed_display() {
        let e = TaktError::HandlerFailed {
            hash: "H".into(),
            message: "boom".into(),
        };
        assert_eq!(e.to_string(), "handler for 'H' failed: boom");
    }

    #[test]
    fn host_classification() {
        assert!(TaktError::Host("x".into()).is_host());
        assert!(!TaktError::Other("x".into()).is_host());
    }
}
