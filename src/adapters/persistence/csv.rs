//! CSV export - operator-facing dumps of orders and trades.
//!
//! Orthogonal to the runtime's own persistence: exports read whatever the
//! storage port lists and write plain CSV files into the configured
//! export directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::info;

use crate::domain::{Order, Trade};

/// Writes CSV exports into a directory.
pub struct CsvExporter {
    export_dir: PathBuf,
}

impl CsvExporter {
    /// Create an exporter, creating the directory if needed.
    pub async fn new(export_dir: &str) -> Result<Self> {
        let dir = Path::new(export_dir).to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
        Ok(Self { export_dir: dir })
    }

    /// Export trades to `<dir>/<name>`, returning the written path.
    pub async fn export_trades(&self, name: &str, trades: &[Trade]) -> Result<PathBuf> {
        let mut out = String::from(
            "id,order_id,market_id,token_id,side,price,size,fee,is_paper,executed_at\n",
        );
        for t in trades {
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{}\n",
                t.id,
                t.order_id,
                t.market_id,
                t.token_id,
                t.side,
                t.price,
                t.size,
                t.fee,
                t.is_paper,
                t.executed_at.to_rfc3339(),
            ));
        }

        let path = self.export_dir.join(name);
        fs::write(&path, out)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), rows = trades.len(), "Trades exported");
        Ok(path)
    }

    /// Export orders to `<dir>/<name>`, returning the written path.
    pub async fn export_orders(&self, name: &str, orders: &[Order]) -> Result<PathBuf> {
        let mut out = String::from(
            "id,market_id,token_id,side,order_type,status,price,size,filled_size,is_paper,created_at\n",
        );
        for o in orders {
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{}\n",
                o.id,
                o.market_id,
                o.token_id,
                o.side,
                o.order_type,
                o.status,
                o.price,
                o.size,
                o.filled_size,
                o.is_paper,
                o.created_at.to_rfc3339(),
            ));
        }

        let path = self.export_dir.join(name);
        fs::write(&path, out)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), rows = orders.len(), "Orders exported");
        Ok(path)
    }
}
