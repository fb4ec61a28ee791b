//! HTTP JPEG snapshot transport.
//!
//! Each source is a camera exposing a still-image endpoint (`name=http://host/snapshot.jpg`).
//! - Discovery probes the configured endpoints and announces those that answer
//! - A capture is one GET bounded by the capture timeout, decoded in-memory to RGB
//!
//! The transport MUST NOT store decoded frames or forward them anywhere.

use std::collections::HashSet;
use std::io::Read;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use url::Url;

use super::{CaptureStatus, SourceTransport, VideoReceiver};
use crate::frame::{Frame, PixelFormat};

const MAX_JPEG_BYTES: u64 = 5 * 1024 * 1024;

/// `name=url` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpSourceSpec {
    pub name: String,
    pub url: String,
}

impl HttpSourceSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, url) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("http source '{}' must look like name=url", spec))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("http source '{}' has an empty name", spec));
        }
        let parsed = Url::parse(url.trim()).context("parse http source url")?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported snapshot scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        Ok(Self {
            name: name.to_string(),
            url: parsed.to_string(),
        })
    }
}

pub struct HttpSnapshotTransport {
    specs: Vec<HttpSourceSpec>,
    announced: HashSet<String>,
    agent: ureq::Agent,
}

impl HttpSnapshotTransport {
    pub fn new(specs: Vec<HttpSourceSpec>) -> Self {
        Self {
            specs,
            announced: HashSet::new(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let specs = specs
            .iter()
            .map(|spec| HttpSourceSpec::parse(spec.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(specs))
    }

    fn probe(&self, url: &str, timeout: Duration) -> Result<()> {
        self.agent
            .get(url)
            .timeout(timeout)
            .call()
            .with_context(|| format!("probe {}", url))?;
        Ok(())
    }
}

impl SourceTransport for HttpSnapshotTransport {
    type Receiver = HttpSnapshotReceiver;

    fn name(&self) -> &'static str {
        "http-snapshot"
    }

    fn begin_discovery(&mut self) {
        self.announced.clear();
    }

    fn find_sources(&mut self, wait: Duration) -> Result<Vec<String>> {
        let pending: Vec<&HttpSourceSpec> = self
            .specs
            .iter()
            .filter(|spec| !self.announced.contains(&spec.name))
            .collect();
        if pending.is_empty() {
            std::thread::sleep(wait);
            return Ok(Vec::new());
        }

        let per_probe = wait / pending.len() as u32;
        let mut found = Vec::new();
        for spec in pending {
            match self.probe(&spec.url, per_probe.max(Duration::from_millis(50))) {
                Ok(()) => found.push(spec.name.clone()),
                Err(e) => log::debug!("HttpSnapshotTransport: {} not visible: {:#}", spec.name, e),
            }
        }
        self.announced.extend(found.iter().cloned());
        Ok(found)
    }

    fn connect(&mut self, source_name: &str) -> Result<HttpSnapshotReceiver> {
        let spec = self
            .specs
            .iter()
            .find(|spec| spec.name == source_name)
            .ok_or_else(|| anyhow!("http source '{}' is not configured", source_name))?;
        self.probe(&spec.url, Duration::from_secs(2))?;
        log::info!("HttpSnapshotTransport: connected to {} ({})", spec.name, spec.url);
        Ok(HttpSnapshotReceiver {
            spec: spec.clone(),
            agent: self.agent.clone(),
            frame_count: 0,
        })
    }
}

pub struct HttpSnapshotReceiver {
    spec: HttpSourceSpec,
    agent: ureq::Agent,
    frame_count: u64,
}

impl HttpSnapshotReceiver {
    fn fetch(&self, timeout: Duration) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.spec.url)
            .timeout(timeout)
            .call()
            .with_context(|| format!("fetch snapshot from {}", self.spec.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES)
            .read_to_end(&mut bytes)
            .context("read snapshot body")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty snapshot"));
        }
        Ok(bytes)
    }
}

impl VideoReceiver for HttpSnapshotReceiver {
    fn capture(&mut self, frame: &mut Frame, timeout: Duration) -> Result<CaptureStatus> {
        let started = Instant::now();
        let bytes = match self.fetch(timeout) {
            Ok(bytes) => bytes,
            // Deadline hit: an idle camera, not a broken one.
            Err(_) if started.elapsed() >= timeout => return Ok(CaptureStatus::Timeout),
            Err(e) => return Err(e),
        };

        let image = image::load_from_memory(&bytes).context("decode snapshot")?;
        let (width, height) = image.dimensions();
        let rgb = image.into_rgb8();
        let stride = width as usize * PixelFormat::Rgb8.bytes_per_pixel();
        frame
            .refill(width, height, stride, PixelFormat::Rgb8)?
            .copy_from_slice(rgb.as_raw());
        self.frame_count += 1;
        Ok(CaptureStatus::Frame)
    }

    fn close(&mut self) {
        log::debug!(
            "HttpSnapshotReceiver: closed {} after {} frames",
            self.spec.name,
            self.frame_count
        );
    }
}
