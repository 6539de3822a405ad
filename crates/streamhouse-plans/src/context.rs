//! Execution context handed to plan stages

use tokio::sync::watch;
use tracing::Span;

/// Carries the logging span and the optional cancellation signal for one
/// rule's pipeline.
///
/// A context without a span logs nothing; stages never require one.
#[derive(Debug, Clone)]
pub struct StageContext {
    rule_id: String,
    span: Span,
    cancel: Option<watch::Receiver<bool>>,
}

impl StageContext {
    /// Context for `rule_id`, logging under a `rule` span.
    pub fn new(rule_id: impl Into<String>) -> Self {
        let rule_id = rule_id.into();
        let span = tracing::info_span!("rule", rule = %rule_id);
        Self {
            rule_id,
            span,
            cancel: None,
        }
    }

    /// Context with no logging and no cancellation.
    pub fn background() -> Self {
        Self {
            rule_id: String::new(),
            span: Span::none(),
            cancel: None,
        }
    }

    /// Observe `cancel`; the context counts as cancelled once it holds `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Whether cancellation has been signalled. A dropped sender does not
    /// cancel.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

impl Default for StageContext {
    fn default() -> Self {
        Self::background()
    }
}
