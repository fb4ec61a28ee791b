//! Presence monitor
//!
//! Watches a set of live video sources, decides per frame whether a person is
//! in view, and reports the verdict to a small HTTP aggregator that keeps the
//! last-known state for dashboards.
//!
//! # Module Structure
//!
//! - `ingest`: source transports (synthetic `stub://`, HTTP snapshots)
//! - `catalog`: discovery and operator selection of sources
//! - `receiver`: one receive handle per monitored source, with frame release
//! - `detect`: region classifiers and the thresholded presence decision
//! - `report`: detection results and their delivery
//! - `pipeline`: the polling loop tying the above together
//! - `aggregator`: last-write-wins board and presence state behind HTTP
//! - `config`, `operator`: settings and console prompts for the binaries

pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod operator;
pub mod pipeline;
pub mod receiver;
pub mod report;

pub use aggregator::{
    AggregatorHandle, AggregatorServer, BoardInfo, PresenceEntry, StateStore, DEFAULT_BIND_ADDR,
};
pub use catalog::{Source, SourceCatalog};
pub use config::{AggregatorConfig, MonitorConfig};
pub use detect::{
    ClassifierRegistry, PresenceDetector, Region, RegionClassifier, ThresholdDetector,
};
pub use error::PipelineError;
pub use frame::{Frame, PixelFormat};
pub use ingest::{CaptureStatus, SourceTransport, SyntheticSource, SyntheticTransport, VideoReceiver};
pub use pipeline::{LoopSettings, LoopState, PollingLoop, RunSummary, StopSignal};
pub use receiver::{Capture, ReceiverId, ReceiverPool};
pub use report::{DetectionResult, HttpReporter, PresenceReport, PresenceReporter};
