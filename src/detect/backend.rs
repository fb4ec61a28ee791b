use anyhow::Result;

use super::result::Region;
use crate::frame::Frame;

/// Reference confidence a region must exceed to count as a person.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Presence decision port used by the polling loop.
///
/// Implementations decide from the frame's current contents only; the frame is
/// read-only and must not be retained past the call.
pub trait PresenceDetector {
    /// Detector identifier (for logs).
    fn name(&self) -> &str;

    /// True when a person is visible in `frame`.
    fn detect(&mut self, frame: &Frame) -> Result<bool>;
}

/// Region classifier backend.
///
/// # Audit Boundary
///
/// Implementations MUST:
/// - Treat the frame as read-only and ephemeral
/// - Not write frames to disk or send them over the network
/// - Keep no state that changes the outcome of later calls
pub trait RegionClassifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Candidate person regions with their confidences.
    fn classify(&mut self, frame: &Frame) -> Result<Vec<Region>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<C: RegionClassifier + ?Sized> RegionClassifier for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn classify(&mut self, frame: &Frame) -> Result<Vec<Region>> {
        (**self).classify(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}

/// Presence policy over a classifier: at least one region strictly above the threshold.
pub struct ThresholdDetector<C> {
    classifier: C,
    threshold: f32,
}

impl<C: RegionClassifier> ThresholdDetector<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }
}

impl<C: RegionClassifier> PresenceDetector for ThresholdDetector<C> {
    fn name(&self) -> &str {
        self.classifier.name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<bool> {
        let regions = self.classifier.classify(frame)?;
        Ok(regions
            .iter()
            .any(|region| region.confidence > self.threshold))
    }
}
