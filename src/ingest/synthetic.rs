//! Synthetic `stub://` transport.
//!
//! Produces deterministic BGRX frames without any network or hardware:
//! - Sources are announced in batches to exercise repeated discovery
//! - Each source paces frames at its own interval (or never, when silent)
//! - The scene flips between "empty" and "occupied" every 50 frames; an occupied
//!   scene carries a bright upright block in the middle of the picture

use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{CaptureStatus, SourceTransport, VideoReceiver};
use crate::frame::{Frame, PixelFormat};

const SCHEME: &str = "stub://";
const SCENE_PERIOD_FRAMES: u64 = 50;
const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// One simulated feed.
#[derive(Clone, Debug)]
pub struct SyntheticSource {
    pub name: String,
    /// Time between frames. `None` means the source never delivers.
    pub frame_interval: Option<Duration>,
    /// When false the source is listed by discovery but refuses connections.
    pub reachable: bool,
    pub width: u32,
    pub height: u32,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frame_interval: Some(DEFAULT_FRAME_INTERVAL),
            reachable: true,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }

    /// Parse `stub://name` (the scheme is optional).
    pub fn parse(spec: &str) -> Result<Self> {
        let name = spec.trim().strip_prefix(SCHEME).unwrap_or(spec.trim());
        if name.is_empty() {
            return Err(anyhow!("synthetic source '{}' has no name", spec));
        }
        Ok(Self::new(name))
    }

    pub fn silent(mut self) -> Self {
        self.frame_interval = None;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }
}

/// Transport over a fixed set of synthetic sources.
pub struct SyntheticTransport {
    sources: Vec<SyntheticSource>,
    batch_size: usize,
    announced: HashSet<String>,
    connections: usize,
}

impl SyntheticTransport {
    pub fn new(sources: Vec<SyntheticSource>) -> Self {
        Self {
            sources,
            batch_size: 2,
            announced: HashSet::new(),
            connections: 0,
        }
    }

    /// Build from `stub://` specs (e.g. `["stub://CamA", "stub://CamB"]`).
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let sources = specs
            .iter()
            .map(|spec| SyntheticSource::parse(spec.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(sources))
    }

    /// How many new sources one discovery round may announce.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Successful `connect` calls so far.
    pub fn connections_made(&self) -> usize {
        self.connections
    }
}

impl SourceTransport for SyntheticTransport {
    type Receiver = SyntheticReceiver;

    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn begin_discovery(&mut self) {
        self.announced.clear();
    }

    fn find_sources(&mut self, wait: Duration) -> Result<Vec<String>> {
        let batch: Vec<String> = self
            .sources
            .iter()
            .filter(|source| !self.announced.contains(&source.name))
            .take(self.batch_size)
            .map(|source| source.name.clone())
            .collect();
        if batch.is_empty() {
            // Nothing new showed up within the wait.
            std::thread::sleep(wait);
        }
        self.announced.extend(batch.iter().cloned());
        Ok(batch)
    }

    fn connect(&mut self, source_name: &str) -> Result<SyntheticReceiver> {
        let source = self
            .sources
            .iter()
            .find(|source| source.name == source_name)
            .ok_or_else(|| anyhow!("synthetic source '{}' not found", source_name))?;
        if !source.reachable {
            return Err(anyhow!("synthetic source '{}' refused connection", source_name));
        }
        self.connections += 1;
        log::info!("SyntheticTransport: connected to {}{}", SCHEME, source_name);
        Ok(SyntheticReceiver::new(source.clone()))
    }

    fn shutdown(&mut self) {
        log::debug!(
            "SyntheticTransport: shutdown after {} connections",
            self.connections
        );
        self.announced.clear();
    }
}

// ----------------------------------------------------------------------------
// Receiver
// ----------------------------------------------------------------------------

pub struct SyntheticReceiver {
    source: SyntheticSource,
    frame_count: u64,
    scene_state: u8,
    last_frame_at: Option<Instant>,
}

impl SyntheticReceiver {
    fn new(source: SyntheticSource) -> Self {
        Self {
            source,
            frame_count: 0,
            scene_state: 0,
            last_frame_at: None,
        }
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frame_count
    }

    /// True while the current scene shows a figure.
    pub fn scene_occupied(&self) -> bool {
        self.scene_state % 2 == 1
    }

    fn draw(&mut self, frame: &mut Frame) -> Result<()> {
        let width = self.source.width;
        let height = self.source.height;
        let bpp = PixelFormat::Bgrx8.bytes_per_pixel();
        let stride = width as usize * bpp;

        if self.frame_count > 0 && self.frame_count % SCENE_PERIOD_FRAMES == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let occupied = self.scene_occupied();

        let mut rng = rand::thread_rng();
        let buf = frame.refill(width, height, stride, PixelFormat::Bgrx8)?;
        let (fx0, fx1) = (width * 2 / 5, width * 3 / 5);
        let (fy0, fy1) = (height / 4, height * 7 / 8);
        for y in 0..height {
            let row = &mut buf[y as usize * stride..(y as usize + 1) * stride];
            for x in 0..width {
                let idx = x as usize * bpp;
                let figure = occupied && (fx0..fx1).contains(&x) && (fy0..fy1).contains(&y);
                let base: u8 = if figure {
                    230
                } else {
                    // dim vertical gradient with a little sensor noise
                    (40 + (y * 40 / height.max(1)) as u8).saturating_add(rng.gen_range(0..3))
                };
                row[idx] = base;
                row[idx + 1] = base;
                row[idx + 2] = base;
                row[idx + 3] = 0xff;
            }
        }
        Ok(())
    }
}

impl VideoReceiver for SyntheticReceiver {
    fn capture(&mut self, frame: &mut Frame, timeout: Duration) -> Result<CaptureStatus> {
        let Some(interval) = self.source.frame_interval else {
            std::thread::sleep(timeout);
            return Ok(CaptureStatus::Timeout);
        };

        let wait = self
            .last_frame_at
            .map(|last| interval.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO);
        if wait > timeout {
            std::thread::sleep(timeout);
            return Ok(CaptureStatus::Timeout);
        }
        std::thread::sleep(wait);

        self.draw(frame)?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(CaptureStatus::Frame)
    }

    fn close(&mut self) {
        log::debug!(
            "SyntheticReceiver: closed {}{} after {} frames",
            SCHEME,
            self.source.name,
            self.frame_count
        );
    }
}
