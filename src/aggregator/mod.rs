//! Aggregator: last-known board and presence state, served over HTTP.
//!
//! Two independent last-write-wins maps, no history, no eviction:
//! - `BoardInfo`: a singleton describing the broadcast being watched
//! - presence: source name → `PresenceEntry`
//!
//! Ingress is validated before any lock is taken, so a rejected payload never
//! touches stored state.

mod server;

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;
use crate::report::PresenceReport;

pub use server::{AggregatorHandle, AggregatorServer, DEFAULT_BIND_ADDR};

fn empty_value() -> Value {
    Value::String(String::new())
}

/// Board state pushed by the broadcast-side tooling. Fields are opaque JSON values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInfo {
    #[serde(default = "empty_value")]
    pub broadcast_url: Value,
    #[serde(default = "empty_value")]
    pub board_number: Value,
    #[serde(default = "empty_value")]
    pub total_boards: Value,
    #[serde(default = "empty_value")]
    pub turn: Value,
}

impl Default for BoardInfo {
    fn default() -> Self {
        Self {
            broadcast_url: empty_value(),
            board_number: empty_value(),
            total_boards: empty_value(),
            turn: empty_value(),
        }
    }
}

impl BoardInfo {
    /// One-line operator summary: `broadcast: <url> board: <n>/<total> | turn: <turn>`.
    pub fn summary(&self) -> String {
        format!(
            "broadcast: {} board: {}/{} | turn: {}",
            plain(&self.broadcast_url),
            plain(&self.board_number),
            plain(&self.total_boards),
            plain(&self.turn)
        )
    }
}

/// Strings without their JSON quotes; everything else in JSON form.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Stored presence for one source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub index: u32,
    pub player_present: bool,
}

/// Both maps behind one mutex each; every operation holds one lock for its duration.
#[derive(Debug, Default)]
pub struct StateStore {
    board: Mutex<BoardInfo>,
    presence: Mutex<BTreeMap<String, PresenceEntry>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn board_info(&self) -> BoardInfo {
        self.board
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_board_info(&self, info: BoardInfo) {
        *self.board.lock().unwrap_or_else(PoisonError::into_inner) = info;
    }

    /// Snapshot of every source's last report.
    pub fn presence(&self) -> BTreeMap<String, PresenceEntry> {
        self.presence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn presence_of(&self, name: &str) -> Option<PresenceEntry> {
        self.presence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn set_presence(&self, name: impl Into<String>, entry: PresenceEntry) {
        self.presence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), entry);
    }

    /// Validate a `/presence` body and store it.
    pub fn apply_presence(&self, body: &[u8]) -> Result<PresenceReport, PipelineError> {
        let report: PresenceReport = serde_json::from_value(parse_object(body)?)
            .map_err(|e| PipelineError::MalformedPayload(e.to_string()))?;
        self.set_presence(
            report.ndi_name.clone(),
            PresenceEntry {
                index: report.index,
                player_present: report.player_present,
            },
        );
        Ok(report)
    }

    /// Validate a board-info body and replace the stored board info.
    pub fn apply_board_info(&self, body: &[u8]) -> Result<BoardInfo, PipelineError> {
        let info: BoardInfo = serde_json::from_value(parse_object(body)?)
            .map_err(|e| PipelineError::MalformedPayload(e.to_string()))?;
        self.set_board_info(info.clone());
        Ok(info)
    }
}

fn parse_object(body: &[u8]) -> Result<Value, PipelineError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PipelineError::MalformedPayload(e.to_string()))?;
    if !value.is_object() {
        return Err(PipelineError::MalformedPayload(
            "expected a JSON object".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn presence_overwrites_only_its_key() {
        let store = StateStore::new();
        store
            .apply_presence(br#"{"ndi_name":"CamA","index":3,"player_present":true}"#)
            .unwrap();
        store
            .apply_presence(br#"{"ndi_name":"CamB","index":4,"player_present":true}"#)
            .unwrap();
        store
            .apply_presence(br#"{"ndi_name":"CamA","index":3,"player_present":false}"#)
            .unwrap();

        let presence = store.presence();
        assert_eq!(
            presence["CamA"],
            PresenceEntry {
                index: 3,
                player_present: false
            }
        );
        assert!(presence["CamB"].player_present);
    }

    #[test]
    fn malformed_presence_leaves_state_unchanged() {
        let store = StateStore::new();
        store.set_presence(
            "CamA",
            PresenceEntry {
                index: 1,
                player_present: true,
            },
        );
        for body in [
            &b"{not json"[..],
            br#"[1,2,3]"#,
            br#"{"ndi_name":"CamA","index":1}"#,
            br#"{"ndi_name":"CamA","index":"one","player_present":false}"#,
        ] {
            let err = store.apply_presence(body).unwrap_err();
            assert!(matches!(err, PipelineError::MalformedPayload(_)));
        }
        assert_eq!(store.presence().len(), 1);
        assert!(store.presence_of("CamA").unwrap().player_present);
    }

    #[test]
    fn board_info_defaults_missing_fields() {
        let store = StateStore::new();
        let info = store
            .apply_board_info(br#"{"boardNumber":2,"turn":"white","extra":true}"#)
            .unwrap();
        assert_eq!(info.board_number, json!(2));
        assert_eq!(info.broadcast_url, json!(""));
        assert_eq!(
            serde_json::to_value(store.board_info()).unwrap(),
            json!({"broadcastUrl":"","boardNumber":2,"totalBoards":"","turn":"white"})
        );
    }

    #[test]
    fn board_summary_prints_strings_unquoted() {
        let store = StateStore::new();
        let info = store
            .apply_board_info(
                br#"{"broadcastUrl":"https://example.org/b/1","boardNumber":3,"totalBoards":8,"turn":"white"}"#,
            )
            .unwrap();
        assert_eq!(
            info.summary(),
            "broadcast: https://example.org/b/1 board: 3/8 | turn: white"
        );
        assert_eq!(BoardInfo::default().summary(), "broadcast:  board: / | turn: ");
    }

    #[test]
    fn board_info_rejects_non_objects() {
        let store = StateStore::new();
        assert!(store.apply_board_info(br#"["a","b","c","d"]"#).is_err());
        assert_eq!(store.board_info(), BoardInfo::default());
    }
}
