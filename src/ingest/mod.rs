//! Video transports.
//!
//! A transport discovers named sources and opens receivers on them:
//! - Synthetic `stub://` sources (testing, demos)
//! - HTTP JPEG snapshot cameras (feature: ingest-http)
//!
//! Transports own discovery and connection mechanics only. They MUST NOT:
//! - Retain frames beyond the receiver's own buffer
//! - Block longer than the timeout passed to `capture`
//! - Share one receiver's buffer with another

#[cfg(feature = "ingest-http")]
pub mod http;
pub mod synthetic;

use std::time::Duration;

use anyhow::Result;

use crate::frame::Frame;

#[cfg(feature = "ingest-http")]
pub use http::{HttpSnapshotTransport, HttpSourceSpec};
pub use synthetic::{SyntheticSource, SyntheticTransport};

/// Outcome of one capture attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureStatus {
    /// The frame buffer now holds a new picture.
    Frame,
    /// Nothing arrived before the deadline.
    Timeout,
}

/// Source discovery and connection port.
///
/// Preconditions: `connect` is only called with names previously returned by
/// `find_sources` (the source may have vanished since). `shutdown` is called once,
/// after every receiver has been closed.
pub trait SourceTransport {
    type Receiver: VideoReceiver;

    /// Transport identifier.
    fn name(&self) -> &'static str;

    /// Start a discovery session. Forgets everything announced by earlier sessions.
    fn begin_discovery(&mut self) {}

    /// Wait up to `wait` and return the source names visible now that were not
    /// announced earlier in the current discovery session.
    fn find_sources(&mut self, wait: Duration) -> Result<Vec<String>>;

    /// Open a receiver bound to one source.
    fn connect(&mut self, source_name: &str) -> Result<Self::Receiver>;

    /// Release process-wide transport state.
    fn shutdown(&mut self) {}
}

/// Frame capture port for one connected source.
pub trait VideoReceiver {
    /// Block up to `timeout` for the next picture and write it into `frame`.
    ///
    /// Returns `Timeout` (not an error) when the source is idle or congested.
    fn capture(&mut self, frame: &mut Frame, timeout: Duration) -> Result<CaptureStatus>;

    /// Hand the buffer back after the caller is done reading it.
    fn release(&mut self, _frame: &mut Frame) {}

    /// Close the connection. Called exactly once.
    fn close(&mut self) {}
}
