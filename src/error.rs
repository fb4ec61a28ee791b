//! Pipeline error taxonomy.
//!
//! Only initialization failures (`DiscoveryEmpty`, `NoActiveSources`) halt a run.
//! Everything else is scoped to one source for one cycle and is surfaced via logs.
//! A capture timeout is not an error; see [`crate::receiver::Capture::Timeout`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Discovery found no sources at all.
    #[error("no sources discovered")]
    DiscoveryEmpty,

    /// The transport could not bind to a selected source.
    #[error("cannot connect to source '{source_name}': {reason}")]
    Connection { source_name: String, reason: String },

    /// A source already has a live receiver.
    #[error("source '{0}' already has a live receiver")]
    DuplicateSource(String),

    /// Every selected source failed to open (or nothing was selected).
    #[error("no active sources remain after initialization")]
    NoActiveSources,

    /// The receiver id does not refer to a live receiver.
    #[error("unknown receiver #{0}")]
    UnknownReceiver(usize),

    /// The transport failed while waiting for a frame.
    #[error("capture from '{source_name}' failed: {reason}")]
    CaptureFailed { source_name: String, reason: String },

    /// The detector could not classify a frame.
    #[error("detection on '{source_name}' failed: {reason}")]
    DetectionFailed { source_name: String, reason: String },

    /// The reporter's single delivery attempt failed.
    #[error("delivery to {endpoint} failed: {reason}")]
    DeliveryFailure { endpoint: String, reason: String },

    /// The aggregator received a body it could not accept.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl PipelineError {
    /// True for failures that end the run rather than a single source's cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::DiscoveryEmpty | PipelineError::NoActiveSources
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_initialization_failures_are_fatal() {
        assert!(PipelineError::DiscoveryEmpty.is_fatal());
        assert!(PipelineError::NoActiveSources.is_fatal());
        assert!(!PipelineError::Connection {
            source_name: "CamA".into(),
            reason: "gone".into(),
        }
        .is_fatal());
        assert!(!PipelineError::DeliveryFailure {
            endpoint: "http://127.0.0.1:5000/presence".into(),
            reason: "status 500".into(),
        }
        .is_fatal());
    }
}
