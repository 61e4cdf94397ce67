//! Conversion of user supplied symbols and timeframes into exchange wire identifiers.

use crate::exchange::Source;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, StrExt};
use tracing::debug;

/// Concatenated pairs BingX expects in dashed form.
const BINGX_DASHED_PAIRS: &[(&str, &str)] = &[
    ("BTCUSDT", "BTC-USDT"),
    ("ETHUSDT", "ETH-USDT"),
    ("SOLUSDT", "SOL-USDT"),
    ("ADAUSDT", "ADA-USDT"),
    ("LINKUSDT", "LINK-USDT"),
];

/// Quote assets recognised when rendering a symbol for humans.
const DISPLAY_QUOTES: &[&str] = &["USDT", "USDC", "BUSD"];

/// Month timeframe code, spelled uppercase by both exchanges.
const MONTH: &str = "1M";

/// Normalise a user supplied symbol into the wire form expected by the [`Source`].
///
/// eg/ Binance: `"btc/usdt"` -> `"BTCUSDT"`, BingX: `"btcusdt"` -> `"BTC-USDT"`
pub fn normalise_symbol(input: &str, source: Source) -> SmolStr {
    let upper = input.trim().to_uppercase_smolstr();

    match source {
        Source::Binance => upper
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect(),
        Source::BingX => {
            let dashed = upper.replace(['/', '_'], "-");
            match BINGX_DASHED_PAIRS
                .iter()
                .find(|(concatenated, _)| *concatenated == dashed)
            {
                Some((_, wire)) => SmolStr::new_static(*wire),
                None => {
                    if !dashed.contains('-') {
                        debug!(symbol = %dashed, "BingX symbol outside equivalence table, passing through");
                    }
                    SmolStr::new(dashed)
                }
            }
        }
    }
}

/// Normalise a user supplied timeframe into its wire code.
///
/// eg/ `" 1H "` -> `"1h"`, `"1M"` -> `"1M"`
pub fn normalise_timeframe(input: &str) -> SmolStr {
    let trimmed = input.trim();
    if trimmed == MONTH {
        SmolStr::new_static(MONTH)
    } else {
        trimmed.to_lowercase_smolstr()
    }
}

/// Render a wire symbol for humans.
///
/// eg/ `"BTC-USDT"` -> `"BTC/USDT"`, `"ETHUSDT"` -> `"ETH/USDT"`
pub fn display_symbol(symbol: &str) -> SmolStr {
    let upper = symbol.trim().to_uppercase();
    if upper.contains('-') {
        return SmolStr::new(upper.replace('-', "/"));
    }

    DISPLAY_QUOTES
        .iter()
        .find_map(|quote| {
            upper
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
                .map(|base| SmolStr::new(format!("{base}/{quote}")))
        })
        .unwrap_or_else(|| SmolStr::new(upper))
}

/// Normalised timeframe wire code (eg/ `1m`, `4h`, `1d`, `1M`).
#[derive(
    Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct Timeframe(SmolStr);

impl Timeframe {
    pub fn new(input: &str) -> Self {
        Self(normalise_timeframe(input))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Bar duration in seconds, falling back to one hour for unrecognised codes.
    pub fn interval_secs(&self) -> i64 {
        const FALLBACK: i64 = 3600;

        let code = self.0.as_str();
        let Some(unit) = code.chars().last() else {
            return FALLBACK;
        };
        let Ok(count) = code[..code.len() - unit.len_utf8()].parse::<i64>() else {
            return FALLBACK;
        };

        let unit_secs = match unit {
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            'w' => 604_800,
            'M' => 2_592_000,
            _ => return FALLBACK,
        };

        count.saturating_mul(unit_secs)
    }

    /// Uppercase form used when describing the timeframe to humans (eg/ `4H`).
    pub fn label(&self) -> SmolStr {
        self.0.to_uppercase_smolstr()
    }
}

impl AsRef<str> for Timeframe {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
