//! Moving average and volume series derived from a candle snapshot.
//!
//! Every function here is pure: outputs are fully recomputed from the snapshot whenever the
//! series or the indicator configuration changes.

use crate::subscription::candle::Candle;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Volume bar colour when the bar closed above its open.
pub const VOLUME_UP_COLOR: &str = "rgba(34, 197, 94, 0.5)";

/// Volume bar colour otherwise.
pub const VOLUME_DOWN_COLOR: &str = "rgba(239, 68, 68, 0.5)";

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub enum IndicatorKind {
    /// Simple moving average.
    #[serde(rename = "MA")]
    Ma,
    /// Exponential moving average.
    #[serde(rename = "EMA")]
    Ema,
}

/// User owned moving average configuration.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct IndicatorConfig {
    pub id: SmolStr,
    #[serde(rename = "type")]
    pub kind: IndicatorKind,
    pub period: usize,
    pub color: SmolStr,
    pub visible: bool,
}

impl IndicatorConfig {
    pub fn new(id: &str, kind: IndicatorKind, period: usize, color: &str) -> Self {
        Self {
            id: SmolStr::new(id),
            kind,
            period,
            color: SmolStr::new(color),
            visible: true,
        }
    }

    /// Default moving averages shown on a fresh install.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("ema12", IndicatorKind::Ema, 12, "#34D399"),
            Self::new("ema20", IndicatorKind::Ema, 20, "#F472B6"),
            Self::new("ma50", IndicatorKind::Ma, 50, "#CBD5E1"),
            Self::new("ma200", IndicatorKind::Ma, 200, "#FF0000"),
        ]
    }
}

#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct IndicatorPoint {
    pub time: i64,
    pub value: f64,
}

/// Computed line for one visible [`IndicatorConfig`].
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct IndicatorLine {
    pub color: SmolStr,
    pub points: Vec<IndicatorPoint>,
}

/// Volume histogram point.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct VolumeBar {
    pub time: i64,
    pub value: f64,
    pub color: &'static str,
}

/// Simple moving average of closes, starting at index `period - 1`.
pub fn compute_ma(candles: &[Candle], period: usize) -> Vec<IndicatorPoint> {
    if period == 0 || candles.len() < period {
        return vec![];
    }

    candles
        .windows(period)
        .map(|window| IndicatorPoint {
            time: window[period - 1].time,
            value: window.iter().map(|candle| candle.close).sum::<f64>() / period as f64,
        })
        .collect()
}

/// Exponential moving average of closes, seeded by the simple average of the first `period`
/// closes.
pub fn compute_ema(candles: &[Candle], period: usize) -> Vec<IndicatorPoint> {
    if period == 0 || candles.len() < period {
        return vec![];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = candles[..period].iter().map(|candle| candle.close).sum::<f64>() / period as f64;

    let mut points = Vec::with_capacity(candles.len() - period + 1);
    points.push(IndicatorPoint {
        time: candles[period - 1].time,
        value: seed,
    });

    candles[period..].iter().fold(seed, |previous, candle| {
        let value = (candle.close - previous) * multiplier + previous;
        points.push(IndicatorPoint {
            time: candle.time,
            value,
        });
        value
    });

    points
}

pub fn compute(config: &IndicatorConfig, candles: &[Candle]) -> Vec<IndicatorPoint> {
    match config.kind {
        IndicatorKind::Ma => compute_ma(candles, config.period),
        IndicatorKind::Ema => compute_ema(candles, config.period),
    }
}

/// Lines for every visible config, keyed by id in config order.
pub fn compute_all(configs: &[IndicatorConfig], candles: &[Candle]) -> IndexMap<SmolStr, IndicatorLine> {
    configs
        .iter()
        .filter(|config| config.visible)
        .map(|config| {
            (
                config.id.clone(),
                IndicatorLine {
                    color: config.color.clone(),
                    points: compute(config, candles),
                },
            )
        })
        .collect()
}

pub fn volume_bars(candles: &[Candle]) -> Vec<VolumeBar> {
    candles
        .iter()
        .map(|candle| VolumeBar {
            time: candle.time,
            value: candle.volume_or_zero(),
            color: if candle.close > candle.open {
                VOLUME_UP_COLOR
            } else {
                VOLUME_DOWN_COLOR
            },
        })
        .collect()
}
