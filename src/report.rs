//! Detection results and their delivery to the aggregator.
//!
//! Delivery is one HTTP POST per result, at most once: no retry, no backoff,
//! no queue. A failed delivery is reported to the caller and forgotten.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Reference timeout for one delivery attempt.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of one detection on one captured frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectionResult {
    pub source_ordinal: u32,
    pub source_name: String,
    pub present: bool,
}

/// Wire form posted to the aggregator's `/presence` endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceReport {
    pub index: u32,
    pub ndi_name: String,
    pub player_present: bool,
}

impl From<&DetectionResult> for PresenceReport {
    fn from(result: &DetectionResult) -> Self {
        Self {
            index: result.source_ordinal,
            ndi_name: result.source_name.clone(),
            player_present: result.present,
        }
    }
}

/// Delivery port used by the polling loop.
pub trait PresenceReporter {
    fn send(&mut self, result: &DetectionResult) -> Result<(), PipelineError>;
}

/// Posts results as JSON to a fixed endpoint.
pub struct HttpReporter {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpReporter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, DEFAULT_REPORT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Point later deliveries at another endpoint.
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        self.endpoint = endpoint.into();
    }

    /// One POST of `result` to `endpoint`. Anything but a 200 is a failure.
    pub fn send_to(&self, endpoint: &str, result: &DetectionResult) -> Result<(), PipelineError> {
        let failure = |reason: String| PipelineError::DeliveryFailure {
            endpoint: endpoint.to_string(),
            reason,
        };
        let body = serde_json::to_string(&PresenceReport::from(result))
            .map_err(|e| failure(format!("encode payload: {}", e)))?;

        match self
            .agent
            .post(endpoint)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) if response.status() == 200 => Ok(()),
            Ok(response) => Err(failure(format!("unexpected status {}", response.status()))),
            Err(ureq::Error::Status(code, _)) => Err(failure(format!("status {}", code))),
            Err(e) => Err(failure(e.to_string())),
        }
    }
}

impl PresenceReporter for HttpReporter {
    fn send(&mut self, result: &DetectionResult) -> Result<(), PipelineError> {
        self.send_to(&self.endpoint, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_wire_field_names() {
        let result = DetectionResult {
            source_ordinal: 3,
            source_name: "CamA".to_string(),
            present: true,
        };
        let json = serde_json::to_string(&PresenceReport::from(&result)).unwrap();
        assert_eq!(json, r#"{"index":3,"ndi_name":"CamA","player_present":true}"#);
    }

    #[test]
    fn endpoint_can_be_replaced_before_delivery() {
        let mut reporter = HttpReporter::new("http://localhost:5000/presence");
        reporter.set_endpoint("http://10.0.0.5:5000/presence");
        assert_eq!(reporter.endpoint(), "http://10.0.0.5:5000/presence");
    }

    #[test]
    fn unreachable_endpoint_is_delivery_failure() {
        // port 9 on loopback: nothing listens there in test environments
        let mut reporter =
            HttpReporter::with_timeout("http://127.0.0.1:9/presence", Duration::from_millis(200));
        let err = reporter
            .send(&DetectionResult {
                source_ordinal: 1,
                source_name: "CamA".to_string(),
                present: false,
            })
            .unwrap_err();
        assert!(matches!(err, PipelineError::DeliveryFailure { .. }));
    }
}
