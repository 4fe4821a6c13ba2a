//! Progress event sink
//!
//! The engine never reaches outward to a UI: the sink is injected into the
//! pipeline and receives one callback per notable outcome. Progress reports
//! describe nominal step completion; soft failures inside a step stay in
//! the error log, which remains the authoritative failure record.

use std::sync::Mutex;

/// Receives provisioning progress from the engine
pub trait ProgressSink: Send + Sync {
    /// An action completed successfully
    fn success(&self, message: &str);

    /// Informational notice (e.g. something already installed)
    fn info(&self, message: &str);

    /// A non-fatal problem the operator should see
    fn warning(&self, message: &str);

    /// A blocking problem; the run is about to stop
    fn error(&self, message: &str);

    /// A pipeline step finished its nominal work
    fn step_completed(&self, step: &str);

    /// Pre-run confirmation gate; the single point where the engine waits
    /// on the presentation layer
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// A sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn success(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn step_completed(&self, _step: &str) {}
}

/// A sink that forwards events to the tracing layer
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn success(&self, message: &str) {
        tracing::info!(outcome = "success", "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    fn step_completed(&self, step: &str) {
        tracing::info!(step = step, "step completed");
    }
}

/// Recorded event kinds, for assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Success(String),
    Info(String),
    Warning(String),
    Error(String),
    StepCompleted(String),
}

/// A sink that records every event; useful for tests and embedders that
/// render progress after the fact
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names of completed steps, in order
    pub fn completed_steps(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::StepCompleted(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressSink for CollectingSink {
    fn success(&self, message: &str) {
        self.record(SinkEvent::Success(message.to_string()));
    }

    fn info(&self, message: &str) {
        self.record(SinkEvent::Info(message.to_string()));
    }

    fn warning(&self, message: &str) {
        self.record(SinkEvent::Warning(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.record(SinkEvent::Error(message.to_string()));
    }

    fn step_completed(&self, step: &str) {
        self.record(SinkEvent::StepCompleted(step.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_records_in_order() {
        let sink = CollectingSink::new();
        sink.info("starting");
        sink.success("installed yara");
        sink.step_completed("packages");

        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::Info("starting".to_string()),
                SinkEvent::Success("installed yara".to_string()),
                SinkEvent::StepCompleted("packages".to_string()),
            ]
        );
        assert_eq!(sink.completed_steps(), vec!["packages"]);
    }

    #[test]
    fn test_default_confirm_accepts() {
        let sink = NullSink;
        assert!(sink.confirm("continue?"));
    }
}
