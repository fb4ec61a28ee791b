mod backend;
pub mod backends;
mod registry;
mod result;

pub use backend::{PresenceDetector, RegionClassifier, ThresholdDetector, DEFAULT_THRESHOLD};
pub use backends::{ContrastClassifier, StubClassifier};
pub use registry::ClassifierRegistry;
pub use result::{BoundingBox, Region};
