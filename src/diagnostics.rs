// ABOUTME: Diagnostics accumulator for non-fatal warnings during a command.
// ABOUTME: Collects problems that must not fail a transition but should reach the operator.

/// Collects non-fatal warnings.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Record warnings the orchestrator already logged.
    pub fn extend_transition(&mut self, messages: impl IntoIterator<Item = String>) {
        self.warnings
            .extend(messages.into_iter().map(Warning::transition));
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A side effect of an applied transition failed (protection, history).
    pub fn transition(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Transition,
            message: message.into(),
        }
    }

    /// Routing found out of line with the recorded state.
    pub fn drift(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Drift,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Transition applied, but a follow-up step failed.
    Transition,
    /// Routing layer differs from what the state implies.
    Drift,
}
