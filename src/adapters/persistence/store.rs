//! File store - durable order/trade/position persistence.
//!
//! Orders and trades append to `orders.jsonl` / `trades.jsonl`, one JSON
//! record per line. Saves are idempotent by primary key: re-saving an id
//! appends a newer record, and loads keep only the latest record per id,
//! so replaying a save changes nothing. Positions live in a single
//! `positions.json` snapshot written atomically (tmp file + rename); a
//! flat position is removed from the snapshot rather than stored as a
//! zero row.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::domain::{Order, Position, Trade};
use crate::ports::{OrderFilter, Storage, TradeFilter};

/// JSONL + atomic-snapshot storage adapter.
pub struct FileStore {
    orders_path: PathBuf,
    trades_path: PathBuf,
    positions_path: PathBuf,
    positions_tmp: PathBuf,
    /// Current position snapshot, mirrored to `positions.json`.
    positions: Mutex<HashMap<String, Position>>,
}

impl FileStore {
    /// Open (or initialize) a store in the given data directory.
    pub async fn open(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

        let positions_path = dir.join("positions.json");
        let positions = load_positions(&positions_path).await?;

        info!(
            dir = %dir.display(),
            positions = positions.len(),
            "File store opened"
        );

        Ok(Self {
            orders_path: dir.join("orders.jsonl"),
            trades_path: dir.join("trades.jsonl"),
            positions_tmp: dir.join("positions.json.tmp"),
            positions_path,
            positions: Mutex::new(positions),
        })
    }

    /// Append one serialized record to a JSONL file.
    async fn append_record<T: serde::Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        let mut json = serde_json::to_string(record).context("Failed to serialize record")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        file.write_all(json.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        file.flush().await.context("Failed to flush record")?;

        Ok(())
    }

    /// Write the position snapshot atomically (tmp file, then rename).
    async fn write_positions(&self, positions: &HashMap<String, Position>) -> Result<()> {
        let json = serde_json::to_string_pretty(positions)
            .context("Failed to serialize positions")?;

        fs::write(&self.positions_tmp, &json)
            .await
            .context("Failed to write tmp positions file")?;
        fs::rename(&self.positions_tmp, &self.positions_path)
            .await
            .context("Failed to rename positions file")?;

        Ok(())
    }
}

/// Load a JSONL file keeping only the latest record per key.
async fn load_latest<T, K, F>(path: &Path, key_of: F) -> Result<Vec<T>>
where
    T: serde::de::DeserializeOwned,
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> K,
{
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    // Later lines replace earlier ones; insertion order is preserved so
    // listings come back in first-save order.
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut records: Vec<Option<T>> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(record) => {
                let key = key_of(&record);
                match index.get(&key) {
                    Some(&slot) => records[slot] = Some(record),
                    None => {
                        index.insert(key, records.len());
                        records.push(Some(record));
                    }
                }
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping malformed record");
            }
        }
    }

    Ok(records.into_iter().flatten().collect())
}

async fn load_positions(path: &Path) -> Result<HashMap<String, Position>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let json = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).context("Failed to parse positions snapshot")
}

#[async_trait]
impl Storage for FileStore {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn save_order(&self, order: &Order) -> Result<()> {
        self.append_record(&self.orders_path, order).await
    }

    #[instrument(skip(self, trade), fields(trade_id = %trade.id))]
    async fn save_trade(&self, trade: &Trade) -> Result<()> {
        self.append_record(&self.trades_path, trade).await
    }

    #[instrument(skip(self, position), fields(token = %position.token_id))]
    async fn save_position(&self, position: &Position) -> Result<()> {
        let mut positions = self.positions.lock().await;
        if position.is_flat() {
            positions.remove(&position.token_id);
        } else {
            positions.insert(position.token_id.clone(), position.clone());
        }
        self.write_positions(&positions).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let orders = load_latest::<Order, _, _>(&self.orders_path, |o| o.id.clone()).await?;
        Ok(orders
            .into_iter()
            .filter(|o| {
                filter
                    .market_id
                    .as_ref()
                    .is_none_or(|m| &o.market_id == m)
                    && filter.status.is_none_or(|s| o.status == s)
            })
            .collect())
    }

    async fn list_trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>> {
        let trades = load_latest::<Trade, _, _>(&self.trades_path, |t| t.id.clone()).await?;
        Ok(trades
            .into_iter()
            .filter(|t| {
                filter
                    .market_id
                    .as_ref()
                    .is_none_or(|m| &t.market_id == m)
                    && filter
                        .token_id
                        .as_ref()
                        .is_none_or(|tok| &t.token_id == tok)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderSide, OrderStatus, OrderType};
    use chrono::Utc;

    fn order(id: &str, status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: id.to_string(),
            market_id: "m1".to_string(),
            token_id: "t1".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            status,
            price: 0.40,
            size: 100.0,
            filled_size: 0.0,
            is_paper: true,
            created_at: now,
            updated_at: now,
            filled_at: None,
        }
    }

    fn position(token: &str, size: f64) -> Position {
        Position {
            market_id: "m1".to_string(),
            token_id: token.to_string(),
            size,
            avg_entry_price: 0.40,
            realized_pnl: 0.0,
            opened_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_order_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().to_str().unwrap()).await.unwrap();

        let o = order("o-1", OrderStatus::Open);
        store.save_order(&o).await.unwrap();
        store.save_order(&o).await.unwrap();

        let listed = store.list_orders(&OrderFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "o-1");
    }

    #[tokio::test]
    async fn later_save_replaces_earlier_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().to_str().unwrap()).await.unwrap();

        store.save_order(&order("o-1", OrderStatus::Open)).await.unwrap();
        store
            .save_order(&order("o-1", OrderStatus::Filled))
            .await
            .unwrap();

        let listed = store.list_orders(&OrderFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn status_filter_applies() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().to_str().unwrap()).await.unwrap();

        store.save_order(&order("o-1", OrderStatus::Open)).await.unwrap();
        store.save_order(&order("o-2", OrderStatus::Filled)).await.unwrap();

        let filter = OrderFilter {
            status: Some(OrderStatus::Filled),
            ..Default::default()
        };
        let listed = store.list_orders(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "o-2");
    }

    #[tokio::test]
    async fn flat_position_is_deleted_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();

        {
            let store = FileStore::open(path).await.unwrap();
            store.save_position(&position("t1", 100.0)).await.unwrap();
            store.save_position(&position("t2", 50.0)).await.unwrap();
            store.save_position(&position("t1", 0.0)).await.unwrap();
        }

        let store = FileStore::open(path).await.unwrap();
        let positions = store.positions.lock().await;
        assert!(!positions.contains_key("t1"));
        assert!(positions.contains_key("t2"));
    }
}
