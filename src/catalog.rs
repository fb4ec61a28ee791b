//! Source discovery and operator selection.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use anyhow::Result;

use crate::ingest::SourceTransport;

/// Reference wait per discovery round.
pub const DEFAULT_DISCOVERY_WAIT: Duration = Duration::from_millis(1000);

/// A discovered feed. `ordinal` is 1-based and only meaningful for this run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    pub ordinal: u32,
    pub name: String,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.ordinal, self.name)
    }
}

#[derive(Clone, Debug)]
pub struct SourceCatalog {
    wait: Duration,
    max_rounds: usize,
}

impl Default for SourceCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_WAIT)
    }
}

impl SourceCatalog {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            max_rounds: 64,
        }
    }

    /// Upper bound on discovery rounds, for transports that never go quiet.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Query the transport until a round turns up nothing new.
    ///
    /// Sources come back in discovery order with ordinals assigned here. An empty
    /// result is not an error. Nothing is cached between calls: each call opens a
    /// fresh discovery session on the transport.
    pub fn discover<T: SourceTransport>(&self, transport: &mut T) -> Result<Vec<Source>> {
        transport.begin_discovery();
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for round in 0..self.max_rounds {
            let batch = transport.find_sources(self.wait)?;
            let before = names.len();
            for name in batch {
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
            if names.len() == before {
                break;
            }
            log::debug!(
                "discovery round {}: {} new sources via {}",
                round + 1,
                names.len() - before,
                transport.name()
            );
        }

        Ok(names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Source {
                ordinal: i as u32 + 1,
                name,
            })
            .collect())
    }

    /// Map operator ordinals to sources, in operator order.
    ///
    /// Out-of-range ordinals are logged and skipped; repeats keep the first occurrence.
    pub fn resolve(sources: &[Source], ordinals: &[u32]) -> Vec<Source> {
        let mut picked = HashSet::new();
        let mut selected = Vec::new();
        for &ordinal in ordinals {
            let Some(source) = sources.iter().find(|s| s.ordinal == ordinal) else {
                log::warn!(
                    "ignoring selection {}: only {} sources discovered",
                    ordinal,
                    sources.len()
                );
                continue;
            };
            if picked.insert(ordinal) {
                selected.push(source.clone());
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SyntheticSource, SyntheticTransport};

    fn sources(names: &[&str]) -> Vec<Source> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Source {
                ordinal: i as u32 + 1,
                name: name.to_string(),
            })
            .collect()
    }

    #[test]
    fn discover_assigns_ordinals_across_batches() {
        let mut transport = SyntheticTransport::new(vec![
            SyntheticSource::new("A"),
            SyntheticSource::new("B"),
            SyntheticSource::new("C"),
        ])
        .with_batch_size(1);
        let catalog = SourceCatalog::new(Duration::from_millis(1));
        let found = catalog.discover(&mut transport).unwrap();
        assert_eq!(found, sources(&["A", "B", "C"]));
    }

    #[test]
    fn repeated_discovery_requeries_the_transport() {
        let mut transport =
            SyntheticTransport::new(vec![SyntheticSource::new("A"), SyntheticSource::new("B")]);
        let catalog = SourceCatalog::new(Duration::from_millis(1));
        let first = catalog.discover(&mut transport).unwrap();
        let second = catalog.discover(&mut transport).unwrap();
        assert_eq!(first, sources(&["A", "B"]));
        assert_eq!(second, first);
    }

    #[test]
    fn discover_returns_empty_without_error() {
        let mut transport = SyntheticTransport::new(Vec::new());
        let catalog = SourceCatalog::new(Duration::from_millis(1));
        assert!(catalog.discover(&mut transport).unwrap().is_empty());
    }

    #[test]
    fn resolve_skips_out_of_range_and_repeats() {
        let all = sources(&["A", "B", "C"]);
        let picked = SourceCatalog::resolve(&all, &[3, 0, 1, 3, 9]);
        let names: Vec<_> = picked.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A"]);
    }
}
