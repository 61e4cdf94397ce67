use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Normalised OHLCV bar.
///
/// `time` is the bar open time in whole seconds since the unix epoch.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize, Constructor)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Candle {
    /// Convert an exchange millisecond open time into [`Candle::time`] seconds.
    pub fn time_from_millis(millis: i64) -> i64 {
        millis.div_euclid(1000)
    }

    /// Determine if the [`Candle`] can be drawn: positive time, finite positive prices,
    /// `high >= low`, and a finite non-negative volume if present.
    pub fn is_valid(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];

        self.time > 0
            && prices.iter().all(|price| price.is_finite() && *price > 0.0)
            && self.high >= self.low
            && self
                .volume
                .is_none_or(|volume| volume.is_finite() && volume >= 0.0)
    }

    /// Bar open time as a UTC [`DateTime`], if representable.
    pub fn time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }

    /// Volume, treating an absent value as zero.
    pub fn volume_or_zero(&self) -> f64 {
        self.volume.unwrap_or(0.0)
    }
}
