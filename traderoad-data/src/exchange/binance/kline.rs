use crate::{
    de::{value_as_f64, value_as_i64},
    error::DataError,
    subscription::{Context, candle::Candle},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// [`Binance`](super::Binance) real-time kline message.
///
/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/Kline-Candlestick-Streams>
/// ```json
/// {
///     "e": "kline",
///     "E": 1638747660000,
///     "s": "BTCUSDT",
///     "k": {
///         "t": 1638747660000,
///         "T": 1638747719999,
///         "s": "BTCUSDT",
///         "i": "1m",
///         "o": "0.0010",
///         "c": "0.0020",
///         "h": "0.0025",
///         "l": "0.0015",
///         "v": "1000",
///         "x": false
///     }
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceKline {
    #[serde(rename = "s", default)]
    pub symbol: Option<SmolStr>,

    #[serde(rename = "k")]
    pub kline: BinanceKlineInner,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceKlineInner {
    #[serde(rename = "t")]
    pub open_time_ms: i64,

    #[serde(rename = "i", default)]
    pub interval: Option<SmolStr>,

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

impl BinanceKline {
    /// Determine if the kline belongs to the [`Context`]. Absent identifiers are assumed to
    /// match since the stream url is already scoped to one symbol and interval.
    pub fn matches(&self, context: &Context) -> bool {
        let symbol_matches = self
            .symbol
            .as_ref()
            .is_none_or(|symbol| symbol.eq_ignore_ascii_case(&context.symbol));

        let interval_matches = self
            .kline
            .interval
            .as_ref()
            .is_none_or(|interval| interval.as_str() == context.timeframe.as_str());

        symbol_matches && interval_matches
    }
}

impl From<&BinanceKlineInner> for Candle {
    fn from(kline: &BinanceKlineInner) -> Self {
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

/// Parse the `GET /fapi/v1/klines` response.
///
/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/market-data/rest-api/Kline-Candlestick-Data>
/// ```json
/// [
///   [
///     1499040000000,
///     "0.01634790",
///     "0.80000000",
///     "0.01575800",
///     "0.01577100",
///     "148976.11427815",
///     1499644799999,
///     "2434.19055334",
///     308,
///     "1756.87402397",
///     "28.46694368",
///     "17928899.62484339"
///   ]
/// ]
/// ```
pub fn parse_historical_klines(payload: &str) -> Result<Vec<Candle>, DataError> {
    let rows = serde_json::from_str::<Vec<Vec<Value>>>(payload)
        .map_err(|error| DataError::parse("Binance historical klines", error))?;

    let mut candles = rows
        .iter()
        .enumerate()
        .map(|(index, row)| parse_row(row).ok_or_else(|| malformed_row(index, row)))
        .collect::<Result<Vec<_>, _>>()?;

    candles.sort_by_key(|candle| candle.time);
    Ok(candles)
}

fn parse_row(row: &[Value]) -> Option<Candle> {
    let [open_time, open, high, low, close, rest @ ..] = row else {
        return None;
    };

    Some(Candle::new(
        Candle::time_from_millis(value_as_i64(open_time)?),
        value_as_f64(open)?,
        value_as_f64(high)?,
        value_as_f64(low)?,
        value_as_f64(close)?,
        rest.first().and_then(value_as_f64),
    ))
}

fn malformed_row(index: usize, row: &[Value]) -> DataError {
    DataError::parse(
        "Binance historical klines",
        format!("malformed row {index}: {row:?}"),
    )
}
