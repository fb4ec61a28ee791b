//! Polling loop: discovery → receivers → capture → detect → report.
//!
//! States: `Initializing → Running → Draining → Stopped`.
//!
//! The loop is single-threaded and visits receivers strictly in selection order.
//! Each capture is bounded by the capture timeout, so a silent source delays the
//! sources after it by at most that much and never blocks the loop. Failures after
//! initialization are isolated to one source for one pass and only logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::catalog::{Source, SourceCatalog};
use crate::detect::PresenceDetector;
use crate::error::PipelineError;
use crate::ingest::SourceTransport;
use crate::receiver::{Capture, ReceiverId, ReceiverPool};
use crate::report::{DetectionResult, PresenceReporter};

/// Reference per-source capture timeout.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Reference pause between passes.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_millis(1000);

/// Granularity at which the inter-cycle sleep checks the stop signal.
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

#[derive(Clone, Copy, Debug)]
pub struct LoopSettings {
    pub capture_timeout: Duration,
    pub cycle_interval: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
        }
    }
}

/// Shared stop flag, set from a signal handler or another thread.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one pass over the active receivers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub captures: usize,
    pub frames: usize,
    pub timeouts: usize,
    pub reports: usize,
    pub failures: usize,
}

/// Totals for a whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: u64,
    pub frames: u64,
    pub timeouts: u64,
    pub reports: u64,
    pub failures: u64,
    pub destroyed: usize,
}

impl RunSummary {
    fn add(&mut self, pass: &PassSummary) {
        self.passes += 1;
        self.frames += pass.frames as u64;
        self.timeouts += pass.timeouts as u64;
        self.reports += pass.reports as u64;
        self.failures += pass.failures as u64;
    }
}

pub struct PollingLoop<T: SourceTransport, D, R> {
    pool: ReceiverPool<T>,
    detector: D,
    reporter: R,
    settings: LoopSettings,
    stop: StopSignal,
    state: LoopState,
    active: Vec<ReceiverId>,
    summary: RunSummary,
}

impl<T, D, R> PollingLoop<T, D, R>
where
    T: SourceTransport,
    D: PresenceDetector,
    R: PresenceReporter,
{
    pub fn new(
        transport: T,
        detector: D,
        reporter: R,
        settings: LoopSettings,
        stop: StopSignal,
    ) -> Self {
        Self {
            pool: ReceiverPool::new(transport),
            detector,
            reporter,
            settings,
            stop,
            state: LoopState::Initializing,
            active: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn pool(&self) -> &ReceiverPool<T> {
        &self.pool
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut R {
        &mut self.reporter
    }

    /// Totals accumulated so far.
    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Active sources in polling order.
    pub fn active_sources(&self) -> Vec<Source> {
        self.active
            .iter()
            .filter_map(|&id| self.pool.source(id).cloned())
            .collect()
    }

    /// Discover sources, let `select` pick ordinals, and open one receiver per pick.
    ///
    /// Fails with `DiscoveryEmpty` when nothing is found and `NoActiveSources` when
    /// no receiver could be opened; both leave the loop `Stopped`.
    pub fn initialize<F>(
        &mut self,
        catalog: &SourceCatalog,
        select: F,
    ) -> Result<(), PipelineError>
    where
        F: FnOnce(&[Source]) -> Vec<u32>,
    {
        let discovered = match catalog.discover(self.pool.transport_mut()) {
            Ok(sources) => sources,
            Err(e) => {
                log::error!("discovery failed: {:#}", e);
                Vec::new()
            }
        };
        if discovered.is_empty() {
            self.abort();
            return Err(PipelineError::DiscoveryEmpty);
        }

        let ordinals = select(&discovered);
        self.open(&SourceCatalog::resolve(&discovered, &ordinals))
    }

    /// Open receivers for already-resolved sources.
    pub fn open(&mut self, selected: &[Source]) -> Result<(), PipelineError> {
        for source in selected {
            match self.pool.create(source) {
                Ok(id) => {
                    log::info!("monitoring {}", source);
                    self.active.push(id);
                }
                Err(e) => log::warn!("dropping {}: {}", source, e),
            }
        }

        if self.active.is_empty() {
            self.abort();
            return Err(PipelineError::NoActiveSources);
        }
        self.state = LoopState::Running;
        Ok(())
    }

    /// One pass over every active receiver, in order.
    ///
    /// The stop signal is checked before each capture; a triggered stop ends the
    /// pass early without interrupting a capture already in progress.
    pub fn run_pass(&mut self) -> PassSummary {
        let mut pass = PassSummary::default();
        if self.state != LoopState::Running {
            return pass;
        }

        for &id in &self.active {
            if self.stop.is_triggered() {
                break;
            }
            let Some(source) = self.pool.source(id).cloned() else {
                continue;
            };
            pass.captures += 1;
            let captured = match self.pool.capture(id, self.settings.capture_timeout) {
                Ok(Capture::Frame(captured)) => captured,
                Ok(Capture::Timeout) => {
                    pass.timeouts += 1;
                    log::debug!(
                        "{}: no frame within {:?}",
                        source,
                        self.settings.capture_timeout
                    );
                    continue;
                }
                Err(e) => {
                    pass.failures += 1;
                    log::warn!("{}", e);
                    continue;
                }
            };
            pass.frames += 1;

            let present = self.detector.detect(captured.frame());
            captured.release();

            let present = match present {
                Ok(present) => present,
                Err(e) => {
                    pass.failures += 1;
                    log::warn!(
                        "{}",
                        PipelineError::DetectionFailed {
                            source_name: source.name.clone(),
                            reason: format!("{:#}", e),
                        }
                    );
                    continue;
                }
            };

            let result = DetectionResult {
                source_ordinal: source.ordinal,
                source_name: source.name,
                present,
            };
            match self.reporter.send(&result) {
                Ok(()) => {
                    pass.reports += 1;
                    log::info!(
                        "camera {} ({}): {}",
                        result.source_ordinal,
                        result.source_name,
                        if result.present {
                            "person detected"
                        } else {
                            "no person"
                        }
                    );
                }
                Err(e) => {
                    pass.failures += 1;
                    log::warn!("{}", e);
                }
            }
        }

        self.summary.add(&pass);
        pass
    }

    /// Poll until the stop signal fires, then drain. Returns the run totals.
    pub fn run(&mut self) -> RunSummary {
        self.run_for(None)
    }

    /// Like `run`, but also stops after `max_passes` passes when given. The
    /// cycle interval separates consecutive passes.
    pub fn run_for(&mut self, max_passes: Option<u64>) -> RunSummary {
        let mut passes = 0u64;
        while self.state == LoopState::Running {
            if self.stop.is_triggered() || max_passes.is_some_and(|max| passes >= max) {
                break;
            }
            if passes > 0 {
                self.pause();
                if self.stop.is_triggered() {
                    break;
                }
            }
            self.run_pass();
            passes += 1;
        }
        self.drain();
        self.summary
    }

    /// Stop polling, destroy every receiver, tear down the transport.
    pub fn drain(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        self.state = LoopState::Draining;
        log::info!("draining {} receivers", self.active.len());
        self.summary.destroyed += self.pool.shutdown();
        self.active.clear();
        self.state = LoopState::Stopped;
    }

    fn abort(&mut self) {
        self.summary.destroyed += self.pool.shutdown();
        self.active.clear();
        self.state = LoopState::Stopped;
    }

    fn pause(&self) {
        let deadline = Instant::now() + self.settings.cycle_interval;
        loop {
            if self.stop.is_triggered() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}
