//! Structured parse trace.
//!
//! Every stage records the decisions it took. The trace is returned next to
//! the intent so callers can show or log how a query was interpreted; the
//! parser itself has no print side effects.

/// One recorded parser decision.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    /// Stage identifier, e.g. "chart_type" or "filters"
    pub stage: &'static str,
    /// Human-readable description of the decision
    pub detail: String,
}

/// Ordered record of parser decisions for one query.
#[derive(Debug, Clone, Default)]
pub struct ParseTrace {
    events: Vec<TraceEvent>,
}

impl ParseTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: &'static str, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::debug!(stage, %detail, "parser decision");
        self.events.push(TraceEvent { stage, detail });
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Events recorded by one stage.
    pub fn for_stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a TraceEvent> + 'a {
        self.events.iter().filter(move |e| e.stage == stage)
    }
}

impl std::fmt::Display for ParseTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for event in &self.events {
            writeln!(f, "[{}] {}", event.stage, event.detail)?;
        }
        Ok(())
    }
}
