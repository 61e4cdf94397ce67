use crate::{
    error::DataError,
    exchange::Source,
    normalise::{Timeframe, display_symbol, normalise_symbol},
};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// Normalised OHLCV [`Candle`](candle::Candle) model.
pub mod candle;

/// Last price statistics [`Ticker`](ticker::Ticker) model.
pub mod ticker;

/// The (source, symbol, timeframe) triple identifying which series is active.
///
/// Constructing a [`Context`] normalises the symbol for its [`Source`] and the timeframe, so two
/// contexts built from differently spelled user input for the same market compare equal.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub struct Context {
    pub source: Source,
    pub symbol: SmolStr,
    pub timeframe: Timeframe,
}

impl Context {
    pub fn new(source: Source, symbol: &str, timeframe: &str) -> Result<Self, DataError> {
        let symbol = normalise_symbol(symbol, source);
        if !symbol.chars().any(|char| char.is_ascii_alphanumeric()) {
            return Err(DataError::InvalidContext("symbol is empty".to_string()));
        }

        let timeframe = Timeframe::new(timeframe);
        if timeframe.as_str().is_empty() {
            return Err(DataError::InvalidContext("timeframe is empty".to_string()));
        }

        Ok(Self {
            source,
            symbol,
            timeframe,
        })
    }

    /// Human readable symbol (eg/ `BTC/USDT`).
    pub fn display_symbol(&self) -> SmolStr {
        display_symbol(&self.symbol)
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.source, self.symbol, self.timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_new() {
        struct TestCase {
            source: Source,
            symbol: &'static str,
            timeframe: &'static str,
            expected: Result<&'static str, DataError>,
        }

        let tests = vec![
            TestCase {
                // TC0: Binance normalises dashed symbol and timeframe case
                source: Source::Binance,
                symbol: "btc-usdt",
                timeframe: "1H",
                expected: Ok("binance:BTCUSDT@1h"),
            },
            TestCase {
                // TC1: BingX dashes known pair
                source: Source::BingX,
                symbol: "ETHUSDT",
                timeframe: "4h",
                expected: Ok("bingx:ETH-USDT@4h"),
            },
            TestCase {
                // TC2: empty symbol rejected
                source: Source::Binance,
                symbol: " / ",
                timeframe: "1h",
                expected: Err(DataError::InvalidContext("symbol is empty".to_string())),
            },
            TestCase {
                // TC3: empty timeframe rejected
                source: Source::Binance,
                symbol: "BTCUSDT",
                timeframe: "  ",
                expected: Err(DataError::InvalidContext("timeframe is empty".to_string())),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Context::new(test.source, test.symbol, test.timeframe)
                .map(|context| context.to_string());
            let expected = test.expected.map(str::to_string);
            assert_eq!(actual, expected, "TC{} failed", index);
        }
    }
}
