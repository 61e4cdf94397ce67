use crate::subscription::ticker::Ticker;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// [`Binance`](super::Binance) 24hr rolling window ticker message.
///
/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams/Individual-Symbol-Ticker-Streams>
/// ```json
/// {
///     "e": "24hrTicker",
///     "E": 123456789,
///     "s": "BTCUSDT",
///     "p": "0.0015",
///     "P": "250.00",
///     "c": "0.0025",
///     "v": "10000",
///     "q": "18"
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BinanceTicker {
    #[serde(rename = "s", default)]
    pub symbol: Option<SmolStr>,

    #[serde(rename = "c", deserialize_with = "crate::de::de_f64")]
    pub price: f64,

    #[serde(rename = "P", default, deserialize_with = "crate::de::de_opt_f64")]
    pub change_percent: Option<f64>,

    #[serde(rename = "v", default, deserialize_with = "crate::de::de_opt_f64")]
    pub volume: Option<f64>,

    #[serde(rename = "q", default, deserialize_with = "crate::de::de_opt_f64")]
    pub quote_volume: Option<f64>,
}

impl From<&BinanceTicker> for Ticker {
    fn from(ticker: &BinanceTicker) -> Self {
        Ticker {
            price: ticker.price,
            change_percent: ticker.change_percent,
            volume: ticker.volume,
            quote_volume: ticker.quote_volume,
        }
    }
}
