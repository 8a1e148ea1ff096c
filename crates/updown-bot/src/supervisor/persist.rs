//! JSON state files.
//!
//! Three files reflect the supervisor's state at the end of the last
//! successful tick: tracked markets (without price caches), active orders
//! grouped by condition id, and the full order history sorted newest-first.
//! Files are rewritten atomically (temp file + rename), never appended.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use updown_common::{Market, OrderRecord, Outcome};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file JSON invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Paths of the three state files.
#[derive(Debug, Clone)]
pub struct StateFiles {
    pub markets: PathBuf,
    pub orders: PathBuf,
    pub history: PathBuf,
}

impl Default for StateFiles {
    fn default() -> Self {
        Self {
            markets: PathBuf::from("markets_state.json"),
            orders: PathBuf::from("bot_orders.json"),
            history: PathBuf::from("order_history.json"),
        }
    }
}

/// A market as persisted: identity and timing only, no price caches.
#[derive(Debug, Serialize, Deserialize)]
struct StoredMarket {
    condition_id: String,
    market_slug: String,
    question: String,
    start_timestamp: i64,
    end_timestamp: i64,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    is_resolved: bool,
    #[serde(default)]
    outcomes: Vec<StoredOutcome>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredOutcome {
    token_id: String,
    outcome: String,
}

impl From<&Market> for StoredMarket {
    fn from(m: &Market) -> Self {
        Self {
            condition_id: m.condition_id.clone(),
            market_slug: m.market_slug.clone(),
            question: m.question.clone(),
            start_timestamp: m.start_ts,
            end_timestamp: m.end_ts,
            is_active: m.is_active,
            is_resolved: m.is_resolved,
            outcomes: m
                .outcomes
                .iter()
                .map(|o| StoredOutcome {
                    token_id: o.token_id.clone(),
                    outcome: o.outcome.clone(),
                })
                .collect(),
        }
    }
}

impl From<StoredMarket> for Market {
    fn from(m: StoredMarket) -> Self {
        Market {
            condition_id: m.condition_id,
            market_slug: m.market_slug,
            question: m.question,
            start_ts: m.start_timestamp,
            end_ts: m.end_timestamp,
            outcomes: m
                .outcomes
                .into_iter()
                .map(|o| Outcome::new(o.token_id, o.outcome))
                .collect(),
            is_active: m.is_active,
            is_resolved: m.is_resolved,
        }
    }
}

impl StateFiles {
    /// Place all three files inside `dir` (tests use a temp dir).
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            markets: dir.join("markets_state.json"),
            orders: dir.join("bot_orders.json"),
            history: dir.join("order_history.json"),
        }
    }

    pub fn save_markets(&self, markets: &HashMap<String, Market>) -> Result<(), PersistError> {
        let stored: BTreeMap<&str, StoredMarket> = markets
            .iter()
            .map(|(cid, m)| (cid.as_str(), StoredMarket::from(m)))
            .collect();
        atomic_write(&self.markets, &serde_json::to_vec_pretty(&stored)?)
    }

    pub fn load_markets(&self) -> Result<HashMap<String, Market>, PersistError> {
        let Some(raw) = read_if_exists(&self.markets)? else {
            return Ok(HashMap::new());
        };
        let stored: HashMap<String, StoredMarket> = serde_json::from_slice(&raw)?;
        Ok(stored.into_iter().map(|(cid, m)| (cid, m.into())).collect())
    }

    pub fn save_orders(
        &self,
        groups: &HashMap<String, Vec<OrderRecord>>,
    ) -> Result<(), PersistError> {
        let stored: BTreeMap<&str, &Vec<OrderRecord>> =
            groups.iter().map(|(cid, orders)| (cid.as_str(), orders)).collect();
        atomic_write(&self.orders, &serde_json::to_vec_pretty(&stored)?)
    }

    pub fn load_orders(&self) -> Result<HashMap<String, Vec<OrderRecord>>, PersistError> {
        let Some(raw) = read_if_exists(&self.orders)? else {
            return Ok(HashMap::new());
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Persist the history as a list, newest first.
    pub fn save_history(&self, history: &HashMap<String, OrderRecord>) -> Result<(), PersistError> {
        let mut records: Vec<&OrderRecord> = history.values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        atomic_write(&self.history, &serde_json::to_vec_pretty(&records)?)
    }

    pub fn load_history(&self) -> Result<Vec<OrderRecord>, PersistError> {
        let Some(raw) = read_if_exists(&self.history)? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Load the history file directly (dashboard aggregation path).
pub fn load_history_file(path: &Path) -> Vec<OrderRecord> {
    read_if_exists(path)
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .unwrap_or_default()
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, PersistError> {
    match fs::read(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write via a sibling temp file and rename, so readers never observe a
/// half-written file.
fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), PersistError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
