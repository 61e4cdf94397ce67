use serde::{Deserialize, Serialize};

/// Normalised last-price statistics, used for the latest price readout only.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Default, Deserialize, Serialize)]
pub struct Ticker {
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_volume: Option<f64>,
}

impl Ticker {
    /// Construct a [`Ticker`] carrying only a last traded price.
    pub fn from_price(price: f64) -> Self {
        Self {
            price,
            ..Self::default()
        }
    }
}
