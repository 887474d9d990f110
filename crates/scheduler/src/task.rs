//! [`Task`] — one request to run a handler periodically.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use takt_core::HandlerError;

/// Arguments passed to a handler on every invocation.
pub type TaskArgs = Vec<serde_json::Value>;

/// A callable scheduled for periodic execution.
///
/// Implemented for any matching closure, so most callers never name this
/// trait directly.
pub trait Handler: Send + Sync {
    fn call(&self, args: &TaskArgs) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&TaskArgs) -> Result<(), HandlerError> + Send + Sync,
{
    fn call(&self, args: &TaskArgs) -> Result<(), HandlerError> {
        self(args)
    }
}

/// Immutable descriptor of one periodic job request.
///
/// `hash` is the grouping key: tasks sharing a hash merge into a single
/// [`TaskSet`](crate::TaskSet). When no hash is supplied a fresh random one is
/// generated, so independent firing is the default and merging is opt-in.
/// Callers that share a hash across tasks are responsible for using the same
/// handler and args for all of them.
#[derive(Clone)]
pub struct Task {
    handler: Arc<dyn Handler>,
    args: TaskArgs,
    period: Duration,
    hash: String,
}

impl Task {
    /// Create a task with a fresh random hash. `period` must be non-zero.
    pub fn new(handler: Arc<dyn Handler>, args: TaskArgs, period: Duration) -> Self {
        Self::with_hash(handler, args, period, Uuid::new_v4().to_string())
    }

    /// Create a task with an explicit grouping hash.
    pub fn with_hash(
        handler: Arc<dyn Handler>,
        args: TaskArgs,
        period: Duration,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            handler,
            args,
            period,
            hash: hash.into(),
        }
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn args(&self) -> &TaskArgs {
        &self.args
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("hash", &self.hash)
            .field("period", &self.period)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> Arc<dyn Handler> {
        Arc::new(|_: &TaskArgs| -> Result<(), HandlerError> { Ok(()) })
    }

    #[test]
    fn fresh_hash_by_default() {
        let a = Task::new(noop(), vec![], Duration::from_secs(5));
        let b = Task::new(noop(), vec![], Duration::from_secs(5));
        assert_ne!(a.hash(), b.hash(), "unrelated tasks must never merge");
    }

    #[test]
    fn explicit_hash_is_kept() {
        let t = Task::with_hash(noop(), vec![json!("a"), json!(1)], Duration::from_secs(5), "H");
        assert_eq!(t.hash(), "H");
        assert_eq!(t.args(), &vec![json!("a"), json!(1)]);
        assert_eq!(t.period(), Duration::from_secs(5));
    }

    #[test]
    fn closures_are_handlers() {
        let t = Task::new(
            Arc::new(|args: &TaskArgs| -> Result<(), HandlerError> {
                assert_eq!(args.len(), 1);
                Ok(())
            }),
            vec![json!(42)],
            Duration::from_secs(1),
        );
        t.handler().call(t.args()).unwrap();
    }
}
