//! Runtime Errors
//!
//! Almost nothing in the reactive core or the reconciler is allowed to fail
//! loudly. Read-only writes, prop validation failures and panicking jobs are
//! *reported*: logged through `tracing` and handed to an optional per-thread
//! handler, after which execution continues with best-effort semantics.
//!
//! The only fallible public entry point returning `Result` is configuration
//! parsing.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

/// Everything the runtime can complain about.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("set operation on key \"{key}\" failed: target is readonly")]
    ReadonlyWrite { key: String },

    #[error("delete operation on key \"{key}\" failed: target is readonly")]
    ReadonlyDelete { key: String },

    #[error("array write at index {index} rejected: padding from length {len} exceeds the limit of {limit}")]
    ArrayGap { index: usize, len: usize, limit: usize },

    #[error("value cannot be made reactive: {value}")]
    NotObservable { value: String },

    #[error("write operation failed: memo value is readonly")]
    ReadonlyMemo,

    #[error("{hook} is called when there is no active component instance")]
    HookOutsideSetup { hook: &'static str },

    #[error("missing required prop \"{prop}\" on component <{component}>")]
    MissingProp { component: String, prop: String },

    #[error("invalid prop: type check failed for prop \"{prop}\": expected {expected}, got {actual}")]
    PropType {
        prop: String,
        expected: String,
        actual: &'static str,
    },

    #[error("invalid prop: custom validator check failed for prop \"{prop}\"")]
    PropValidator { prop: String },

    #[error("prop \"{prop}\" is declared more than once on component <{component}>")]
    DuplicateProp { component: String, prop: String },

    #[error("duplicate keys found during update: {key}")]
    DuplicateKey { key: String },

    #[error("component <{component}> is missing a render function")]
    MissingRender { component: String },

    #[error("job {job} panicked: {message}")]
    JobPanicked { job: u64, message: String },

    #[error("maximum recursive updates exceeded: job {job} ran more than {limit} times in one flush")]
    RecursionLimit { job: u64, limit: usize },

    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid runtime configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl RuntimeError {
    /// Warnings describe misuse that was recovered from. Everything else is
    /// a failure that cost some work (a skipped job, a rejected config).
    pub fn is_warning(&self) -> bool {
        !matches!(
            self,
            RuntimeError::JobPanicked { .. }
                | RuntimeError::RecursionLimit { .. }
                | RuntimeError::Config(_)
                | RuntimeError::InvalidConfig { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

type ReportHandler = Rc<dyn Fn(&RuntimeError)>;

thread_local! {
    static REPORT_HANDLER: RefCell<Option<ReportHandler>> = const { RefCell::new(None) };
}

/// Install a handler that observes every reported error on this thread.
///
/// Returns the previously installed handler, if any.
pub fn set_report_handler<F>(handler: F) -> Option<Rc<dyn Fn(&RuntimeError)>>
where
    F: Fn(&RuntimeError) + 'static,
{
    REPORT_HANDLER.with(|slot| slot.borrow_mut().replace(Rc::new(handler)))
}

/// Remove the report handler for this thread.
pub fn clear_report_handler() {
    REPORT_HANDLER.with(|slot| slot.borrow_mut().take());
}

/// Report an error: log it and forward it to the installed handler.
pub fn report(err: RuntimeError) {
    if err.is_warning() {
        tracing::warn!(error = %err, "runtime warning");
    } else {
        tracing::error!(error = %err, "runtime error");
    }

    // The handler may itself report, so never call it with the slot borrowed.
    let handler = REPORT_HANDLER.with(|slot| slot.borrow().clone());
    if let Some(handler) = handler {
        handler(&err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn report_reaches_handler() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        set_report_handler(move |_| seen_clone.set(seen_clone.get() + 1));

        report(RuntimeError::ReadonlyMemo);
        report(RuntimeError::DuplicateKey { key: "a".into() });
        assert_eq!(seen.get(), 2);

        clear_report_handler();
        report(RuntimeError::ReadonlyMemo);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn severity_split() {
        assert!(RuntimeError::ReadonlyWrite { key: "x".into() }.is_warning());
        assert!(!RuntimeError::JobPanicked { job: 1, message: "boom".into() }.is_warning());
    }
}
