//! Trade analytics - pure summary functions over a trade list.
//!
//! No I/O and no engine access: everything here recomputes from the
//! immutable trade records, so it can run over live state, a storage
//! listing, or a CSV re-import alike.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::{OrderSide, Trade};

/// Summary statistics over a set of trades.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TradeSummary {
    /// Number of trades.
    pub num_trades: usize,
    /// Sum of trade notionals.
    pub total_volume: f64,
    /// Signed cash flow: sells minus buys.
    pub net_cash_flow: f64,
    /// P&L over FIFO-matched buy/sell round trips.
    pub matched_pnl: f64,
    /// Profit from winning round trips.
    pub gross_profit: f64,
    /// Loss from losing round trips (positive number).
    pub gross_loss: f64,
    /// Fraction of round trips that were profitable.
    pub win_rate: f64,
    /// Mean trade notional.
    pub avg_trade_value: f64,
}

/// Compute summary statistics from a trade list.
pub fn summarize(trades: &[Trade]) -> TradeSummary {
    if trades.is_empty() {
        return TradeSummary::default();
    }

    let total_volume: f64 = trades.iter().map(Trade::value).sum();
    let net_cash_flow: f64 = trades.iter().map(Trade::cash_flow).sum();

    let round_trips = match_round_trips(trades);
    let gross_profit: f64 = round_trips.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = round_trips.iter().filter(|p| **p < 0.0).map(|p| -p).sum();
    let wins = round_trips.iter().filter(|p| **p > 0.0).count();
    let win_rate = if round_trips.is_empty() {
        0.0
    } else {
        wins as f64 / round_trips.len() as f64
    };

    TradeSummary {
        num_trades: trades.len(),
        total_volume,
        net_cash_flow,
        matched_pnl: round_trips.iter().sum(),
        gross_profit,
        gross_loss,
        win_rate,
        avg_trade_value: total_volume / trades.len() as f64,
    }
}

/// FIFO-match buys against sells per token; one P&L value per matched
/// round trip, sized to the smaller leg.
fn match_round_trips(trades: &[Trade]) -> Vec<f64> {
    let mut by_token: HashMap<&str, (Vec<&Trade>, Vec<&Trade>)> = HashMap::new();
    for trade in trades {
        let entry = by_token.entry(&trade.token_id).or_default();
        match trade.side {
            OrderSide::Buy => entry.0.push(trade),
            OrderSide::Sell => entry.1.push(trade),
        }
    }

    let mut pnl = Vec::new();
    for (buys, sells) in by_token.values() {
        for (buy, sell) in buys.iter().zip(sells.iter()) {
            pnl.push((sell.price - buy.price) * sell.size.min(buy.size));
        }
    }
    pnl
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trade(token: &str, side: OrderSide, price: f64, size: f64) -> Trade {
        Trade {
            id: format!("t-{token}-{side}-{price}"),
            order_id: "o".to_string(),
            market_id: "m".to_string(),
            token_id: token.to_string(),
            side,
            price,
            size,
            fee: 0.0,
            is_paper: true,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn empty_trades_give_zeroed_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary.num_trades, 0);
        assert_eq!(summary.total_volume, 0.0);
        assert_eq!(summary.win_rate, 0.0);
    }

    #[test]
    fn round_trip_pnl_and_win_rate() {
        let trades = vec![
            trade("T1", OrderSide::Buy, 0.40, 100.0),
            trade("T1", OrderSide::Sell, 0.50, 100.0),
            trade("T2", OrderSide::Buy, 0.60, 50.0),
            trade("T2", OrderSide::Sell, 0.55, 50.0),
        ];

        let summary = summarize(&trades);
        assert_eq!(summary.num_trades, 4);
        // +10 on T1, -2.5 on T2
        assert!((summary.matched_pnl - 7.5).abs() < 1e-9);
        assert!((summary.gross_profit - 10.0).abs() < 1e-9);
        assert!((summary.gross_loss - 2.5).abs() < 1e-9);
        assert!((summary.win_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn cash_flow_is_signed() {
        let trades = vec![
            trade("T1", OrderSide::Buy, 0.40, 100.0),
            trade("T1", OrderSide::Sell, 0.50, 100.0),
        ];
        let summary = summarize(&trades);
        assert!((summary.net_cash_flow - 10.0).abs() < 1e-9);
        assert!((summary.total_volume - 90.0).abs() < 1e-9);
    }
}
