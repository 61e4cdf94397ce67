use super::message::{BingXMessage, RelayResponse};
use crate::{error::DataError, subscription::candle::Candle};
use serde::{Deserialize, Serialize};

/// [`BingX`](super::BingX) real-time kline entry.
///
/// ### Raw Payload Examples
/// See docs: <https://bingx-api.github.io/docs/#/en-us/swapV2/socket/market.html#Subscribe%20K-Line%20Data>
/// ```json
/// {"c":"43010.5","o":"43000.0","h":"43020.0","l":"42990.0","v":"12.34","T":1700000040000}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BingXKline {
    #[serde(rename = "T", deserialize_with = "de_millis")]
    pub open_time_ms: i64,

    #[serde(rename = "o", deserialize_with = "crate::de::de_f64")]
    pub open: f64,

    #[serde(rename = "h", deserialize_with = "crate::de::de_f64")]
    pub high: f64,

    #[serde(rename = "l", deserialize_with = "crate::de::de_f64")]
    pub low: f64,

    #[serde(rename = "c", deserialize_with = "crate::de::de_f64")]
    pub close: f64,

    #[serde(rename = "v", default, deserialize_with = "crate::de::de_opt_f64")]
    pub volume: Option<f64>,
}

impl From<&BingXKline> for Candle {
    fn from(kline: &BingXKline) -> Self {
        Candle::new(
            Candle::time_from_millis(kline.open_time_ms),
            kline.open,
            kline.high,
            kline.low,
            kline.close,
            kline.volume,
        )
    }
}

/// [`BingX`](super::BingX) historical kline entry.
///
/// ### Raw Payload Examples
/// See docs: <https://bingx-api.github.io/docs/#/en-us/swapV2/market-api.html#Kline/Candlestick%20Data>
/// ```json
/// {"open":"43000.0","close":"43010.5","high":"43020.0","low":"42990.0","volume":"12.34","time":1700000040000}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BingXHistoricalKline {
    #[serde(deserialize_with = "de_millis")]
    pub time: i64,

    #[serde(deserialize_with = "crate::de::de_f64")]
    pub open: f64,

    #[serde(deserialize_with = "crate::de::de_f64")]
    pub high: f64,

    #[serde(deserialize_with = "crate::de::de_f64")]
    pub low: f64,

    #[serde(deserialize_with = "crate::de::de_f64")]
    pub close: f64,

    #[serde(default, deserialize_with = "crate::de::de_opt_f64")]
    pub volume: Option<f64>,
}

impl From<&BingXHistoricalKline> for Candle {
    fn from(kline: &BingXHistoricalKline) -> Self {
        Candle::new(
            Candle::time_from_millis(kline.time),
            kline.open,
            kline.high,
            kline.low,
            kline.close,
            kline.volume,
        )
    }
}

/// Parse a relayed `GET /openApi/swap/v2/quote/klines` response.
///
/// The relay returns the upstream body as a string in `contents`, which is parsed a second time.
/// A missing or undecodable `contents`, or a non-zero upstream `code`, is a
/// [`DataError::Parse`].
pub fn parse_historical_klines(payload: &str) -> Result<Vec<Candle>, DataError> {
    const ENTITY: &str = "BingX historical klines";

    let relay = serde_json::from_str::<RelayResponse>(payload)
        .map_err(|error| DataError::parse(ENTITY, format!("relay envelope: {error}")))?;

    let contents = relay
        .contents
        .ok_or_else(|| DataError::parse(ENTITY, "relay response missing contents"))?;

    let response = serde_json::from_str::<BingXMessage>(&contents)
        .map_err(|error| DataError::parse(ENTITY, format!("relayed contents: {error}")))?;

    if !response.is_ok() {
        return Err(DataError::parse(ENTITY, response.error_message()));
    }

    let mut candles = response
        .data_as::<BingXHistoricalKline>(ENTITY)?
        .iter()
        .map(Candle::from)
        .collect::<Vec<_>>();

    candles.sort_by_key(|candle| candle.time);
    Ok(candles)
}

fn de_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    crate::de::value_as_i64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected millisecond timestamp, got {value}")))
}
