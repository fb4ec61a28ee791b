use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::backend::RegionClassifier;
use crate::detect::result::Region;
use crate::frame::Frame;

/// Stub classifier for testing. Ignores pixels and returns scripted regions.
///
/// With a script, each call pops the next entry; once the script runs out the
/// fallback regions are returned forever.
#[derive(Clone, Debug, Default)]
pub struct StubClassifier {
    script: VecDeque<Vec<Region>>,
    fallback: Vec<Region>,
    calls: u64,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same regions on every call.
    pub fn fixed(regions: Vec<Region>) -> Self {
        Self {
            fallback: regions,
            ..Self::default()
        }
    }

    /// One entry per call, then nothing.
    pub fn scripted(script: Vec<Vec<Region>>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl RegionClassifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&mut self, _frame: &Frame) -> Result<Vec<Region>> {
        self.calls += 1;
        Ok(self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_then_fallback() {
        let mut stub = StubClassifier::scripted(vec![vec![Region::new(0.9)], vec![]]);
        let frame = Frame::new();
        assert_eq!(stub.classify(&frame).unwrap(), vec![Region::new(0.9)]);
        assert!(stub.classify(&frame).unwrap().is_empty());
        assert!(stub.classify(&frame).unwrap().is_empty());
        assert_eq!(stub.calls(), 3);
    }
}
