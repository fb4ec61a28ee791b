//! Receiver pool: one live connection plus one frame buffer per monitored source.
//!
//! Lifecycle per receiver: `create` → (`capture` → `release`)* → `destroy`.
//! A `CapturedFrame` borrows the pool mutably, so the next capture cannot start
//! until the previous frame has been released.

use std::collections::HashSet;
use std::time::Duration;

use crate::catalog::Source;
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::ingest::{CaptureStatus, SourceTransport, VideoReceiver};

/// Opaque handle to a live receiver in a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReceiverId(usize);

impl ReceiverId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Per-receiver counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub captures: u64,
    pub timeouts: u64,
    pub failures: u64,
}

struct Slot<R> {
    source: Source,
    receiver: R,
    frame: Frame,
    stats: ReceiverStats,
}

/// Result of a capture attempt.
pub enum Capture<'a, R: VideoReceiver> {
    Frame(CapturedFrame<'a, R>),
    Timeout,
}

/// A filled frame on loan from its receiver.
///
/// `release` hands the buffer back; dropping the guard does the same.
pub struct CapturedFrame<'a, R: VideoReceiver> {
    slot: &'a mut Slot<R>,
    released: bool,
}

impl<'a, R: VideoReceiver> CapturedFrame<'a, R> {
    pub fn frame(&self) -> &Frame {
        &self.slot.frame
    }

    pub fn source(&self) -> &Source {
        &self.slot.source
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let slot = &mut *self.slot;
        slot.receiver.release(&mut slot.frame);
        slot.frame.recycle();
    }
}

impl<R: VideoReceiver> Drop for CapturedFrame<'_, R> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

pub struct ReceiverPool<T: SourceTransport> {
    transport: T,
    slots: Vec<Option<Slot<T::Receiver>>>,
    live_names: HashSet<String>,
    shut_down: bool,
}

impl<T: SourceTransport> ReceiverPool<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            slots: Vec::new(),
            live_names: HashSet::new(),
            shut_down: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Open a receiver for `source` and allocate its frame buffer.
    pub fn create(&mut self, source: &Source) -> Result<ReceiverId, PipelineError> {
        if self.live_names.contains(&source.name) {
            return Err(PipelineError::DuplicateSource(source.name.clone()));
        }
        let receiver =
            self.transport
                .connect(&source.name)
                .map_err(|e| PipelineError::Connection {
                    source_name: source.name.clone(),
                    reason: format!("{:#}", e),
                })?;
        self.live_names.insert(source.name.clone());
        self.slots.push(Some(Slot {
            source: source.clone(),
            receiver,
            frame: Frame::new(),
            stats: ReceiverStats::default(),
        }));
        Ok(ReceiverId(self.slots.len() - 1))
    }

    /// Wait up to `timeout` for a frame from one receiver.
    pub fn capture(
        &mut self,
        id: ReceiverId,
        timeout: Duration,
    ) -> Result<Capture<'_, T::Receiver>, PipelineError> {
        let slot = self
            .slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(PipelineError::UnknownReceiver(id.0))?;

        match slot.receiver.capture(&mut slot.frame, timeout) {
            Ok(CaptureStatus::Frame) => {
                slot.stats.captures += 1;
                Ok(Capture::Frame(CapturedFrame {
                    slot,
                    released: false,
                }))
            }
            Ok(CaptureStatus::Timeout) => {
                slot.stats.timeouts += 1;
                Ok(Capture::Timeout)
            }
            Err(e) => {
                slot.stats.failures += 1;
                // a half-written buffer is never handed out
                slot.frame.recycle();
                Err(PipelineError::CaptureFailed {
                    source_name: slot.source.name.clone(),
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    /// Close one receiver. Returns false if it was already gone.
    pub fn destroy(&mut self, id: ReceiverId) -> bool {
        let Some(mut slot) = self.slots.get_mut(id.0).and_then(Option::take) else {
            return false;
        };
        slot.receiver.close();
        self.live_names.remove(&slot.source.name);
        log::debug!(
            "receiver for {} destroyed (captures={}, timeouts={}, failures={})",
            slot.source.name,
            slot.stats.captures,
            slot.stats.timeouts,
            slot.stats.failures
        );
        true
    }

    /// Close every live receiver. Returns how many were closed.
    pub fn destroy_all(&mut self) -> usize {
        (0..self.slots.len())
            .filter(|&i| self.destroy(ReceiverId(i)))
            .count()
    }

    /// Close everything and tear down the transport. Idempotent.
    pub fn shutdown(&mut self) -> usize {
        let closed = self.destroy_all();
        if !self.shut_down {
            self.transport.shutdown();
            self.shut_down = true;
        }
        closed
    }

    pub fn source(&self, id: ReceiverId) -> Option<&Source> {
        self.slot(id).map(|slot| &slot.source)
    }

    pub fn stats(&self, id: ReceiverId) -> Option<ReceiverStats> {
        self.slot(id).map(|slot| slot.stats)
    }

    /// Live receivers in creation order.
    pub fn ids(&self) -> Vec<ReceiverId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| ReceiverId(i))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.live_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_names.is_empty()
    }

    fn slot(&self, id: ReceiverId) -> Option<&Slot<T::Receiver>> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }
}

impl<T: SourceTransport> Drop for ReceiverPool<T> {
    fn drop(&mut self) {
        let closed = self.shutdown();
        if closed > 0 {
            log::warn!("receiver pool dropped with {} live receivers", closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SyntheticSource, SyntheticTransport};

    fn source(ordinal: u32, name: &str) -> Source {
        Source {
            ordinal,
            name: name.to_string(),
        }
    }

    fn pool(sources: Vec<SyntheticSource>) -> ReceiverPool<SyntheticTransport> {
        ReceiverPool::new(SyntheticTransport::new(sources))
    }

    #[test]
    fn create_rejects_second_handle_for_same_source() {
        let mut pool = pool(vec![SyntheticSource::new("A")]);
        pool.create(&source(1, "A")).unwrap();
        let err = pool.create(&source(1, "A")).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateSource(name) if name == "A"));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn create_maps_transport_failure_to_connection_error() {
        let mut pool = pool(vec![SyntheticSource::new("A").unreachable()]);
        let err = pool.create(&source(1, "A")).unwrap_err();
        assert!(matches!(err, PipelineError::Connection { .. }));
        assert!(pool.is_empty());
    }

    #[test]
    fn capture_then_release_recycles_buffer() {
        let mut pool = pool(vec![SyntheticSource::new("A").with_interval(Duration::ZERO)]);
        let id = pool.create(&source(1, "A")).unwrap();
        match pool.capture(id, Duration::from_millis(10)).unwrap() {
            Capture::Frame(captured) => {
                assert!(captured.frame().is_filled());
                assert_eq!(captured.source().name, "A");
                captured.release();
            }
            Capture::Timeout => panic!("expected a frame"),
        }
        assert_eq!(pool.stats(id).unwrap().captures, 1);
        assert!(!pool.slot(id).unwrap().frame.is_filled());
    }

    #[test]
    fn timeout_is_counted_not_failed() {
        let mut pool = pool(vec![SyntheticSource::new("A").silent()]);
        let id = pool.create(&source(1, "A")).unwrap();
        assert!(matches!(
            pool.capture(id, Duration::from_millis(1)).unwrap(),
            Capture::Timeout
        ));
        let stats = pool.stats(id).unwrap();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.failures, 0);
    }

    #[test]
    fn destroy_is_safe_without_capture_and_only_once() {
        let mut pool = pool(vec![SyntheticSource::new("A")]);
        let id = pool.create(&source(1, "A")).unwrap();
        assert!(pool.destroy(id));
        assert!(!pool.destroy(id));
        assert!(matches!(
            pool.capture(id, Duration::from_millis(1)),
            Err(PipelineError::UnknownReceiver(0))
        ));
        // the name is free again
        pool.create(&source(1, "A")).unwrap();
    }

    #[test]
    fn shutdown_closes_all_receivers() {
        let mut pool = pool(vec![SyntheticSource::new("A"), SyntheticSource::new("B")]);
        pool.create(&source(1, "A")).unwrap();
        pool.create(&source(2, "B")).unwrap();
        assert_eq!(pool.shutdown(), 2);
        assert_eq!(pool.shutdown(), 0);
        assert!(pool.ids().is_empty());
    }
}
