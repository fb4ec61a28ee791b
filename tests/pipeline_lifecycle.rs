use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use presence_monitor::{
    CaptureStatus, DetectionResult, Frame, LoopSettings, LoopState, PipelineError, PixelFormat,
    PollingLoop, PresenceDetector, PresenceReporter, SourceCatalog, SourceTransport, StopSignal,
    VideoReceiver,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Behaviour {
    Frames,
    Silent,
    Broken,
    Refuses,
}

#[derive(Debug, Default)]
struct Counters {
    connects: HashMap<String, usize>,
    captures: HashMap<String, usize>,
    capture_timeouts: Vec<Duration>,
    releases: usize,
    closes: HashMap<String, usize>,
    shutdowns: usize,
}

type Shared = Arc<Mutex<Counters>>;

struct FakeTransport {
    sources: Vec<(String, Behaviour)>,
    announced: bool,
    counters: Shared,
}

impl FakeTransport {
    fn new(sources: &[(&str, Behaviour)], counters: Shared) -> Self {
        Self {
            sources: sources
                .iter()
                .map(|(name, behaviour)| (name.to_string(), *behaviour))
                .collect(),
            announced: false,
            counters,
        }
    }
}

impl SourceTransport for FakeTransport {
    type Receiver = FakeReceiver;

    fn name(&self) -> &'static str {
        "fake"
    }

    fn begin_discovery(&mut self) {
        self.announced = false;
    }

    fn find_sources(&mut self, _wait: Duration) -> Result<Vec<String>> {
        if self.announced {
            return Ok(Vec::new());
        }
        self.announced = true;
        Ok(self.sources.iter().map(|(name, _)| name.clone()).collect())
    }

    fn connect(&mut self, source_name: &str) -> Result<FakeReceiver> {
        let behaviour = self
            .sources
            .iter()
            .find(|(name, _)| name == source_name)
            .map(|(_, behaviour)| *behaviour)
            .ok_or_else(|| anyhow!("no such source"))?;
        if behaviour == Behaviour::Refuses {
            return Err(anyhow!("connection refused"));
        }
        *self
            .counters
            .lock()
            .unwrap()
            .connects
            .entry(source_name.to_string())
            .or_default() += 1;
        Ok(FakeReceiver {
            name: source_name.to_string(),
            behaviour,
            counters: self.counters.clone(),
        })
    }

    fn shutdown(&mut self) {
        self.counters.lock().unwrap().shutdowns += 1;
    }
}

struct FakeReceiver {
    name: String,
    behaviour: Behaviour,
    counters: Shared,
}

impl VideoReceiver for FakeReceiver {
    fn capture(&mut self, frame: &mut Frame, timeout: Duration) -> Result<CaptureStatus> {
        {
            let mut counters = self.counters.lock().unwrap();
            *counters.captures.entry(self.name.clone()).or_default() += 1;
            counters.capture_timeouts.push(timeout);
        }
        match self.behaviour {
            Behaviour::Frames => {
                frame.refill(4, 4, 12, PixelFormat::Rgb8)?.fill(128);
                Ok(CaptureStatus::Frame)
            }
            Behaviour::Silent => Ok(CaptureStatus::Timeout),
            Behaviour::Broken => Err(anyhow!("decoder fault")),
            Behaviour::Refuses => unreachable!(),
        }
    }

    fn release(&mut self, _frame: &mut Frame) {
        self.counters.lock().unwrap().releases += 1;
    }

    fn close(&mut self) {
        *self
            .counters
            .lock()
            .unwrap()
            .closes
            .entry(self.name.clone())
            .or_default() += 1;
    }
}

/// Says "present" for every frame it sees.
struct AlwaysPresent;

impl PresenceDetector for AlwaysPresent {
    fn name(&self) -> &str {
        "always"
    }

    fn detect(&mut self, frame: &Frame) -> Result<bool> {
        assert!(frame.is_filled());
        Ok(true)
    }
}

#[derive(Clone, Default)]
struct Recorder {
    sent: Arc<Mutex<Vec<DetectionResult>>>,
    stop_after: Option<(usize, StopSignal)>,
}

impl PresenceReporter for Recorder {
    fn send(&mut self, result: &DetectionResult) -> Result<(), PipelineError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(result.clone());
        if let Some((limit, stop)) = &self.stop_after {
            if sent.len() >= *limit {
                stop.trigger();
            }
        }
        Ok(())
    }
}

fn fast_settings() -> LoopSettings {
    LoopSettings {
        capture_timeout: Duration::from_millis(5),
        cycle_interval: Duration::from_millis(1),
    }
}

fn catalog() -> SourceCatalog {
    SourceCatalog::new(Duration::from_millis(1))
}

#[test]
fn one_receiver_per_selected_ordinal_and_one_capture_per_pass() {
    let counters = Shared::default();
    let transport = FakeTransport::new(
        &[
            ("CamA", Behaviour::Frames),
            ("CamB", Behaviour::Frames),
            ("CamC", Behaviour::Frames),
        ],
        counters.clone(),
    );
    let recorder = Recorder::default();
    let mut pipeline = PollingLoop::new(
        transport,
        AlwaysPresent,
        recorder.clone(),
        fast_settings(),
        StopSignal::new(),
    );

    pipeline.initialize(&catalog(), |_| vec![3, 1]).unwrap();
    assert_eq!(pipeline.state(), LoopState::Running);
    let active: Vec<_> = pipeline
        .active_sources()
        .into_iter()
        .map(|source| source.name)
        .collect();
    assert_eq!(active, vec!["CamC", "CamA"]);

    for _ in 0..4 {
        let pass = pipeline.run_pass();
        assert_eq!(pass.captures, 2);
        assert_eq!(pass.reports, 2);
    }

    {
        let counters = counters.lock().unwrap();
        assert_eq!(counters.connects.get("CamA"), Some(&1));
        assert_eq!(counters.connects.get("CamC"), Some(&1));
        assert_eq!(counters.connects.get("CamB"), None);
        assert_eq!(counters.captures.get("CamA"), Some(&4));
        assert_eq!(counters.captures.get("CamC"), Some(&4));
        assert_eq!(counters.releases, 8);
    }

    let sent = recorder.sent.lock().unwrap();
    assert_eq!(sent.len(), 8);
    assert_eq!(sent[0].source_ordinal, 3);
    assert_eq!(sent[0].source_name, "CamC");
    assert_eq!(sent[1].source_ordinal, 1);
    assert!(sent.iter().all(|result| result.present));
}

#[test]
fn stop_destroys_every_receiver_exactly_once() {
    let counters = Shared::default();
    let transport = FakeTransport::new(
        &[
            ("CamA", Behaviour::Frames),
            ("Idle", Behaviour::Silent),
            ("Faulty", Behaviour::Broken),
        ],
        counters.clone(),
    );
    let stop = StopSignal::new();
    let recorder = Recorder {
        stop_after: Some((3, stop.clone())),
        ..Recorder::default()
    };
    let mut pipeline = PollingLoop::new(transport, AlwaysPresent, recorder, fast_settings(), stop);

    pipeline.initialize(&catalog(), |_| vec![1, 2, 3]).unwrap();
    let summary = pipeline.run();

    assert_eq!(pipeline.state(), LoopState::Stopped);
    assert_eq!(summary.reports, 3);
    assert_eq!(summary.destroyed, 3);
    assert!(summary.timeouts >= 2);
    assert!(summary.failures >= 2);

    let counters = counters.lock().unwrap();
    for name in ["CamA", "Idle", "Faulty"] {
        assert_eq!(counters.closes.get(name), Some(&1), "{}", name);
    }
    assert!(counters.captures.get("Idle").is_some_and(|&n| n >= 2));
    assert!(counters.captures.get("Faulty").is_some_and(|&n| n >= 2));
    let captures: usize = counters.captures.values().sum();
    assert_eq!(counters.capture_timeouts.len(), captures);
    assert!(counters
        .capture_timeouts
        .iter()
        .all(|&timeout| timeout == fast_settings().capture_timeout));
    assert_eq!(counters.shutdowns, 1);
    assert!(pipeline.pool().is_empty());
}

#[test]
fn refused_source_is_dropped_and_others_keep_running() {
    let counters = Shared::default();
    let transport = FakeTransport::new(
        &[("CamA", Behaviour::Refuses), ("CamB", Behaviour::Frames)],
        counters.clone(),
    );
    let mut pipeline = PollingLoop::new(
        transport,
        AlwaysPresent,
        Recorder::default(),
        fast_settings(),
        StopSignal::new(),
    );

    pipeline.initialize(&catalog(), |_| vec![1, 2]).unwrap();
    assert_eq!(pipeline.active_sources().len(), 1);
    assert_eq!(pipeline.run_pass().reports, 1);

    pipeline.drain();
    let counters = counters.lock().unwrap();
    assert_eq!(counters.closes.get("CamB"), Some(&1));
    assert_eq!(counters.closes.get("CamA"), None);
}

#[test]
fn nothing_selectable_aborts_initialization() {
    let counters = Shared::default();
    let transport = FakeTransport::new(&[("CamA", Behaviour::Frames)], counters.clone());
    let mut pipeline = PollingLoop::new(
        transport,
        AlwaysPresent,
        Recorder::default(),
        fast_settings(),
        StopSignal::new(),
    );

    let err = pipeline.initialize(&catalog(), |_| vec![7]).unwrap_err();
    assert!(matches!(err, PipelineError::NoActiveSources));
    assert_eq!(pipeline.state(), LoopState::Stopped);
    assert_eq!(counters.lock().unwrap().shutdowns, 1);
}
