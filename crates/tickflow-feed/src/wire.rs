//! Stream payload decoding.
//!
//! Turns one raw text frame into a typed update. Frames from a combined
//! stream arrive wrapped as `{"stream": "...", "data": {...}}`; bare payloads
//! are accepted as well. The `e` field selects the payload shape.
//!
//! Decoding is pure: a frame that fails here never reaches the store.

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use tickflow_core::{
    Candle, CoreError, FeedKind, Price, PriceLevel, Size, Symbol, TickerSnapshot, Trade,
};

/// `{"e":"trade","s":"BTCUSDT","p":"...","q":"...","T":123,"m":true}`
#[derive(Debug, Deserialize)]
pub struct RawTrade {
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

/// `{"e":"24hrTicker","s":..,"c":..,"p":..,"P":..,"h":..,"l":..,"v":..,"q":..}`
#[derive(Debug, Deserialize)]
pub struct RawTicker {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub last_price: String,
    #[serde(rename = "p")]
    pub price_change: String,
    #[serde(rename = "P")]
    pub price_change_percent: String,
    #[serde(rename = "h")]
    pub high_price: String,
    #[serde(rename = "l")]
    pub low_price: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "q")]
    pub quote_volume: String,
}

/// `{"e":"depthUpdate","s":..,"b":[["px","qty"],..],"a":[..]}`
#[derive(Debug, Deserialize)]
pub struct RawDepth {
    #[serde(rename = "b")]
    pub bids: Vec<(String, String)>,
    #[serde(rename = "a")]
    pub asks: Vec<(String, String)>,
}

/// `{"e":"kline","s":..,"k":{"t":..,"o":..,"h":..,"l":..,"c":..}}`
#[derive(Debug, Deserialize)]
pub struct RawKlineEvent {
    #[serde(rename = "k")]
    pub kline: RawKline,
}

#[derive(Debug, Deserialize)]
pub struct RawKline {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
}

/// Order book levels as sent, before the completeness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthUpdate {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Typed payload of one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    Trade(Trade),
    Ticker(TickerSnapshot),
    Depth(DepthUpdate),
    Kline(Candle),
    /// Event type this client does not handle; carries the `e` value.
    Unknown(String),
}

impl FeedUpdate {
    pub fn kind(&self) -> Option<FeedKind> {
        match self {
            Self::Trade(_) => Some(FeedKind::Trade),
            Self::Ticker(_) => Some(FeedKind::Ticker),
            Self::Depth(_) => Some(FeedKind::Depth),
            Self::Kline(_) => Some(FeedKind::Kline),
            Self::Unknown(_) => None,
        }
    }
}

/// Decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    /// Combined stream name, when the frame was wrapped.
    pub stream: Option<String>,
    /// Symbol as spelled by the payload's `s` field.
    pub symbol: Option<String>,
    pub update: FeedUpdate,
}

/// Map an `e` value to its feed.
pub fn classify(event_type: &str) -> FeedResult<FeedKind> {
    FeedKind::from_event_type(event_type)
        .ok_or_else(|| FeedError::UnknownEventKind(event_type.to_string()))
}

/// Decode one text frame. `received_at` stamps ticker snapshots.
pub fn decode(text: &str, received_at: DateTime<Utc>) -> FeedResult<FeedMessage> {
    let frame: Value = serde_json::from_str(text)?;
    let (stream, payload) = unwrap_envelope(frame)?;

    let symbol = payload
        .get("s")
        .and_then(Value::as_str)
        .map(str::to_string);

    let event_type = match payload.get("e").and_then(Value::as_str) {
        Some(e) => e.to_string(),
        None => {
            return Ok(FeedMessage {
                stream,
                symbol,
                update: FeedUpdate::Unknown(String::new()),
            })
        }
    };

    let update = match classify(&event_type) {
        Ok(FeedKind::Trade) => FeedUpdate::Trade(parse_trade(serde_json::from_value(payload)?)?),
        Ok(FeedKind::Ticker) => {
            FeedUpdate::Ticker(parse_ticker(serde_json::from_value(payload)?, received_at)?)
        }
        Ok(FeedKind::Depth) => FeedUpdate::Depth(parse_depth(serde_json::from_value(payload)?)?),
        Ok(FeedKind::Kline) => {
            let event: RawKlineEvent = serde_json::from_value(payload)?;
            FeedUpdate::Kline(parse_kline(event.kline)?)
        }
        Err(_) => FeedUpdate::Unknown(event_type),
    };

    Ok(FeedMessage {
        stream,
        symbol,
        update,
    })
}

fn unwrap_envelope(frame: Value) -> FeedResult<(Option<String>, Value)> {
    let Value::Object(mut map) = frame else {
        return Err(FeedError::MalformedFrame(
            "frame is not a JSON object".to_string(),
        ));
    };
    match map.remove("data") {
        Some(data @ Value::Object(_)) => {
            let stream = map.get("stream").and_then(Value::as_str).map(str::to_string);
            Ok((stream, data))
        }
        Some(_) => Err(FeedError::MalformedFrame(
            "envelope data is not an object".to_string(),
        )),
        None => Ok((None, Value::Object(map))),
    }
}

fn parse_timestamp(ms: i64) -> Result<DateTime<Utc>, CoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(CoreError::InvalidTimestamp(ms))
}

pub fn parse_trade(raw: RawTrade) -> FeedResult<Trade> {
    Ok(Trade::new(
        Price::parse_field("p", &raw.price)?,
        Size::parse_field("q", &raw.quantity)?,
        parse_timestamp(raw.trade_time)?,
        raw.is_buyer_maker,
    ))
}

pub fn parse_ticker(raw: RawTicker, received_at: DateTime<Utc>) -> FeedResult<TickerSnapshot> {
    Ok(TickerSnapshot {
        symbol: Symbol::new(&raw.symbol)?,
        last_price: Price::parse_field("c", &raw.last_price)?,
        price_change: Price::parse_field("p", &raw.price_change)?,
        price_change_percent: Price::parse_field("P", &raw.price_change_percent)?,
        high_price: Price::parse_field("h", &raw.high_price)?,
        low_price: Price::parse_field("l", &raw.low_price)?,
        volume: Size::parse_field("v", &raw.volume)?,
        quote_volume: Size::parse_field("q", &raw.quote_volume)?,
        observed_at: received_at,
    })
}

fn parse_levels(side: &str, raw: Vec<(String, String)>) -> FeedResult<Vec<PriceLevel>> {
    raw.into_iter()
        .map(|(px, qty)| {
            Ok(PriceLevel::new(
                Price::parse_field(side, &px)?,
                Size::parse_field(side, &qty)?,
            ))
        })
        .collect()
}

pub fn parse_depth(raw: RawDepth) -> FeedResult<DepthUpdate> {
    Ok(DepthUpdate {
        bids: parse_levels("b", raw.bids)?,
        asks: parse_levels("a", raw.asks)?,
    })
}

pub fn parse_kline(raw: RawKline) -> FeedResult<Candle> {
    Ok(Candle {
        open_time: parse_timestamp(raw.open_time)?,
        open: Price::parse_field("o", &raw.open)?,
        high: Price::parse_field("h", &raw.high)?,
        low: Price::parse_field("l", &raw.low)?,
        close: Price::parse_field("c", &raw.close)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_decode_wrapped_trade() {
        let frame = json!({
            "stream": "btcusdt@trade",
            "data": {
                "e": "trade", "E": 1_700_000_000_001i64, "s": "BTCUSDT", "t": 42,
                "p": "97000.10", "q": "0.0150", "T": 1_700_000_000_000i64, "m": true
            }
        });
        let msg = decode(&frame.to_string(), now()).unwrap();
        assert_eq!(msg.stream.as_deref(), Some("btcusdt@trade"));
        assert_eq!(msg.symbol.as_deref(), Some("BTCUSDT"));

        let FeedUpdate::Trade(trade) = msg.update else {
            panic!("expected trade");
        };
        assert_eq!(trade.price.inner(), dec!(97000.10));
        assert_eq!(trade.quantity.to_string(), "0.0150");
        assert_eq!(trade.timestamp, now());
        assert!(trade.is_buyer_maker);
    }

    #[test]
    fn test_decode_bare_ticker_stamps_receive_time() {
        let frame = json!({
            "e": "24hrTicker", "s": "BTCUSDT", "c": "97000.00", "p": "-152.30",
            "P": "-0.157", "h": "98000.00", "l": "96000.00", "v": "1234.5", "q": "119000000.1"
        });
        let msg = decode(&frame.to_string(), now()).unwrap();
        assert!(msg.stream.is_none());
        let FeedUpdate::Ticker(ticker) = msg.update else {
            panic!("expected ticker");
        };
        assert_eq!(ticker.observed_at, now());
        assert_eq!(ticker.price_change.inner(), dec!(-152.30));
        assert_eq!(ticker.quote_volume.to_string(), "119000000.1");
    }

    #[test]
    fn test_decode_depth_keeps_feed_order() {
        let frame = json!({
            "e": "depthUpdate", "s": "BTCUSDT",
            "b": [["100.0", "1"], ["99.5", "2"]],
            "a": [["101.0", "3"]]
        });
        let FeedUpdate::Depth(depth) = decode(&frame.to_string(), now()).unwrap().update else {
            panic!("expected depth");
        };
        assert_eq!(depth.bids.len(), 2);
        assert_eq!(depth.bids[1].price.inner(), dec!(99.5));
        assert_eq!(depth.asks[0].quantity.inner(), dec!(3));
    }

    #[test]
    fn test_decode_kline() {
        let frame = json!({
            "stream": "btcusdt@kline_1h",
            "data": {
                "e": "kline", "s": "BTCUSDT",
                "k": {"t": 1_700_000_000_000i64, "T": 1_700_003_599_999i64, "i": "1h",
                      "o": "1.0", "h": "2.0", "l": "0.5", "c": "1.5", "x": false}
            }
        });
        let FeedUpdate::Kline(candle) = decode(&frame.to_string(), now()).unwrap().update else {
            panic!("expected kline");
        };
        assert_eq!(candle.open_time, now());
        assert_eq!(candle.close.inner(), dec!(1.5));
    }

    #[test]
    fn test_unknown_event_is_not_an_error() {
        let msg = decode(r#"{"e":"aggTrade","s":"BTCUSDT"}"#, now()).unwrap();
        assert_eq!(msg.update, FeedUpdate::Unknown("aggTrade".to_string()));
        assert_eq!(msg.update.kind(), None);

        let msg = decode(r#"{"result":null,"id":1}"#, now()).unwrap();
        assert!(matches!(msg.update, FeedUpdate::Unknown(_)));
    }

    #[test]
    fn test_malformed_frames() {
        let cases = [
            "not json",
            "[1,2,3]",
            r#"{"stream":"x","data":"oops"}"#,
            r#"{"e":"trade","s":"BTCUSDT","q":"1","T":1,"m":false}"#,
            r#"{"e":"trade","s":"BTCUSDT","p":"abc","q":"1","T":1,"m":false}"#,
            r#"{"e":"depthUpdate","s":"BTCUSDT","b":[["1"]],"a":[]}"#,
            r#"{"e":"kline","s":"BTCUSDT","k":{"t":1,"o":"1","h":"1","l":"1"}}"#,
        ];
        for case in cases {
            let err = decode(case, now()).unwrap_err();
            assert!(err.is_malformed(), "{case}: {err}");
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("depthUpdate").unwrap(), FeedKind::Depth);
        assert!(matches!(
            classify("bookTicker"),
            Err(FeedError::UnknownEventKind(_))
        ));
    }
}
