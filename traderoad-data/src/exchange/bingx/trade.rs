use crate::subscription::ticker::Ticker;
use serde::{Deserialize, Serialize};

/// [`BingX`](super::BingX) real-time trade entry, used for the latest price readout.
///
/// ### Raw Payload Examples
/// See docs: <https://bingx-api.github.io/docs/#/en-us/swapV2/socket/market.html#Subscribe%20the%20Latest%20Trade%20Detail>
/// ```json
/// {"q":"0.0010","p":"43005.1","T":1700000041000,"m":true,"s":"BTC-USDT"}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BingXTrade {
    #[serde(rename = "p", deserialize_with = "crate::de::de_f64")]
    pub price: f64,

    #[serde(rename = "q", default, deserialize_with = "crate::de::de_opt_f64")]
    pub quantity: Option<f64>,
}

impl From<&BingXTrade> for Ticker {
    fn from(trade: &BingXTrade) -> Self {
        Ticker::from_price(trade.price)
    }
}
