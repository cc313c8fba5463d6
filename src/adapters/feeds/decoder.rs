//! Message decoder - wire frames to normalized events.
//!
//! Pure translation layer: one raw text frame in, zero or more
//! `MarketEvent`s out. Accepts both historical `price_change` shapes
//! (single-asset legacy and batched `price_changes`), `book`, `trade`,
//! and the user-channel `order*` events. Frames may arrive as a single
//! JSON object or an array of objects; arrays are flattened and decoded
//! element by element.
//!
//! Decoding is total. A frame that cannot be parsed produces zero events
//! and bumps the failure counter; it never raises. Numeric fields arrive
//! as JSON numbers or JSON-encoded strings depending on venue version,
//! so both are accepted everywhere.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{BookLevel, MarketEvent, OrderEventKind};

/// Stateless frame decoder with failure counters as the side channel.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    /// Frames that parsed as JSON.
    pub frames_ok: u64,
    /// Frames that failed to parse.
    pub frames_failed: u64,
    /// Events emitted.
    pub events_out: u64,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one raw text frame into normalized events.
    pub fn decode(&mut self, raw: &str) -> Vec<MarketEvent> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                self.frames_failed += 1;
                warn!(error = %e, frame = raw.chars().take(120).collect::<String>(),
                    "Failed to decode frame");
                return Vec::new();
            }
        };

        self.frames_ok += 1;
        let events = decode_value(&value);
        self.events_out += events.len() as u64;
        events
    }
}

/// Decode an already-parsed frame (object or array of objects).
fn decode_value(value: &Value) -> Vec<MarketEvent> {
    match value {
        Value::Object(obj) => decode_object(obj),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .flat_map(decode_object)
            .collect(),
        other => {
            debug!(kind = other_kind(other), "Dropping non-object frame");
            Vec::new()
        }
    }
}

/// Decode one frame object by its `event_type`.
fn decode_object(obj: &Map<String, Value>) -> Vec<MarketEvent> {
    let event_type = obj.get("event_type").and_then(Value::as_str).unwrap_or("");

    match event_type {
        "price_change" => decode_price_change(obj),
        "book" => decode_book(obj),
        "trade" => vec![decode_trade(obj)],
        "order" => vec![decode_order_update(obj, OrderEventKind::Placement)],
        "order_fill" => vec![decode_order_update(obj, OrderEventKind::Fill)],
        "order_cancel" => vec![decode_order_update(obj, OrderEventKind::Cancellation)],
        other => {
            if !other.is_empty() {
                debug!(event_type = other, "Ignoring unknown event type");
            }
            Vec::new()
        }
    }
}

/// Decode a `price_change` frame in either historical shape.
///
/// - Batched: `{market, price_changes: [{asset_id, price, best_bid, best_ask}, ...]}`
///   emits one event per element, in input order.
/// - Legacy: `{market, asset_id, price, bid?, ask?}` emits one event.
fn decode_price_change(obj: &Map<String, Value>) -> Vec<MarketEvent> {
    let market_id = str_field(obj, "market");
    let timestamp_ms = num_u64(obj.get("timestamp"));

    if let Some(changes) = obj.get("price_changes").and_then(Value::as_array) {
        return changes
            .iter()
            .filter_map(Value::as_object)
            .map(|change| MarketEvent::PriceChange {
                market_id: market_id.clone(),
                token_id: str_field(change, "asset_id"),
                price: num_f64(change.get("price")),
                best_bid: opt_f64(change.get("best_bid")),
                best_ask: opt_f64(change.get("best_ask")),
                timestamp_ms,
            })
            .collect();
    }

    vec![MarketEvent::PriceChange {
        market_id,
        token_id: str_field(obj, "asset_id"),
        price: num_f64(obj.get("price")),
        best_bid: opt_f64(obj.get("bid")),
        best_ask: opt_f64(obj.get("ask")),
        timestamp_ms,
    }]
}

/// Decode a `book` frame.
fn decode_book(obj: &Map<String, Value>) -> Vec<MarketEvent> {
    vec![MarketEvent::Book {
        market_id: str_field(obj, "market"),
        token_id: str_field(obj, "asset_id"),
        bids: decode_levels(obj.get("bids")),
        asks: decode_levels(obj.get("asks")),
        timestamp_ms: num_u64(obj.get("timestamp")),
    }]
}

/// Decode a `trade` frame.
fn decode_trade(obj: &Map<String, Value>) -> MarketEvent {
    MarketEvent::Trade {
        market_id: str_field(obj, "market"),
        token_id: str_field(obj, "asset_id"),
        price: num_f64(obj.get("price")),
        size: num_f64(obj.get("size")),
        timestamp_ms: num_u64(obj.get("timestamp")),
    }
}

/// Decode a user-channel order lifecycle frame.
fn decode_order_update(obj: &Map<String, Value>, kind: OrderEventKind) -> MarketEvent {
    let order_id = match obj.get("order_id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => str_field(obj, "id"),
    };

    MarketEvent::OrderUpdate {
        order_id,
        kind,
        price: opt_f64(obj.get("price")),
        size: opt_f64(obj.get("size")),
        trade_id: obj
            .get("trade_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        timestamp_ms: num_u64(obj.get("timestamp")),
    }
}

/// Parse book levels, accepting `{price, size}` objects or
/// `[price, size]` pairs. Unparsable levels are dropped.
fn decode_levels(value: Option<&Value>) -> Vec<BookLevel> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(level) => Some(BookLevel {
                price: opt_f64(level.get("price"))?,
                size: opt_f64(level.get("size"))?,
            }),
            Value::Array(pair) if pair.len() >= 2 => Some(BookLevel {
                price: opt_f64(pair.first())?,
                size: opt_f64(pair.get(1))?,
            }),
            _ => None,
        })
        .collect()
}

/// Numeric field as f64 from a JSON number or string, defaulting to 0.0.
fn num_f64(value: Option<&Value>) -> f64 {
    opt_f64(value).unwrap_or(0.0)
}

/// Optional numeric field: absent (or unparsable) stays `None`.
fn opt_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Timestamp field as Unix milliseconds, defaulting to 0.
fn num_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn other_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_legacy_price_change() {
        let mut decoder = MessageDecoder::new();
        let events = decoder.decode(
            r#"{"event_type":"price_change","market":"M","asset_id":"TY","price":"0.70","bid":"0.69","ask":"0.71"}"#,
        );

        assert_eq!(events.len(), 1);
        match &events[0] {
            MarketEvent::PriceChange {
                market_id,
                token_id,
                price,
                best_bid,
                best_ask,
                ..
            } => {
                assert_eq!(market_id, "M");
                assert_eq!(token_id, "TY");
                assert_eq!(*price, 0.70);
                assert_eq!(*best_bid, Some(0.69));
                assert_eq!(*best_ask, Some(0.71));
            }
            other => panic!("Unexpected event: {other:?}"),
        }
        assert_eq!(decoder.frames_ok, 1);
        assert_eq!(decoder.events_out, 1);
    }

    #[test]
    fn decodes_batched_price_changes_in_order() {
        let mut decoder = MessageDecoder::new();
        let events = decoder.decode(
            r#"{"event_type":"price_change","market":"M","price_changes":[
                {"asset_id":"TY","price":"0.65","best_bid":"0.64","best_ask":"0.66"},
                {"asset_id":"TN","price":"0.35"}
            ]}"#,
        );

        assert_eq!(events.len(), 2);
        match &events[0] {
            MarketEvent::PriceChange {
                token_id,
                price,
                best_bid,
                ..
            } => {
                assert_eq!(token_id, "TY");
                assert_eq!(*price, 0.65);
                assert_eq!(*best_bid, Some(0.64));
            }
            other => panic!("Unexpected event: {other:?}"),
        }
        match &events[1] {
            MarketEvent::PriceChange {
                token_id,
                price,
                best_bid,
                best_ask,
                ..
            } => {
                assert_eq!(token_id, "TN");
                assert_eq!(*price, 0.35);
                assert_eq!(*best_bid, None);
                assert_eq!(*best_ask, None);
            }
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[test]
    fn flattens_array_frames_and_drops_non_objects() {
        let mut decoder = MessageDecoder::new();
        let events = decoder.decode(
            r#"[
                {"event_type":"price_change","market":"M","asset_id":"A","price":0.5},
                42,
                "noise",
                {"event_type":"trade","market":"M","asset_id":"A","price":"0.51","size":"10"}
            ]"#,
        );

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], MarketEvent::PriceChange { .. }));
        assert!(matches!(events[1], MarketEvent::Trade { .. }));
    }

    #[test]
    fn decodes_book_with_both_level_shapes() {
        let mut decoder = MessageDecoder::new();
        let events = decoder.decode(
            r#"{"event_type":"book","market":"M","asset_id":"A",
                "bids":[{"price":"0.48","size":"100"},["0.47","50"]],
                "asks":[{"price":"0.52","size":"80"}],
                "timestamp":"1700000000000"}"#,
        );

        match &events[0] {
            MarketEvent::Book {
                bids,
                asks,
                timestamp_ms,
                ..
            } => {
                assert_eq!(bids.len(), 2);
                assert_eq!(bids[1].price, 0.47);
                assert_eq!(asks[0].size, 80.0);
                assert_eq!(*timestamp_ms, 1_700_000_000_000);
            }
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_order_fill() {
        let mut decoder = MessageDecoder::new();
        let events = decoder.decode(
            r#"{"event_type":"order_fill","order_id":"ord-1","price":"0.40","size":"25","trade_id":"f-9"}"#,
        );

        match &events[0] {
            MarketEvent::OrderUpdate {
                order_id,
                kind,
                price,
                size,
                trade_id,
                ..
            } => {
                assert_eq!(order_id, "ord-1");
                assert_eq!(*kind, OrderEventKind::Fill);
                assert_eq!(*price, Some(0.40));
                assert_eq!(*size, Some(25.0));
                assert_eq!(trade_id.as_deref(), Some("f-9"));
            }
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_yields_nothing() {
        let mut decoder = MessageDecoder::new();
        assert!(decoder
            .decode(r#"{"event_type":"tick_size_change","market":"M"}"#)
            .is_empty());
        assert_eq!(decoder.frames_ok, 1);
        assert_eq!(decoder.frames_failed, 0);
    }

    #[test]
    fn malformed_frame_counts_as_failure() {
        let mut decoder = MessageDecoder::new();
        assert!(decoder.decode("{not json").is_empty());
        assert_eq!(decoder.frames_failed, 1);
        assert_eq!(decoder.events_out, 0);
    }

    #[test]
    fn missing_numeric_fields_default_to_zero() {
        let mut decoder = MessageDecoder::new();
        let events =
            decoder.decode(r#"{"event_type":"price_change","market":"M","asset_id":"A"}"#);
        match &events[0] {
            MarketEvent::PriceChange {
                price,
                best_bid,
                best_ask,
                ..
            } => {
                assert_eq!(*price, 0.0);
                assert_eq!(*best_bid, None);
                assert_eq!(*best_ask, None);
            }
            other => panic!("Unexpected event: {other:?}"),
        }
    }
}
