use crate::store::Generation;
use thiserror::Error;

/// All errors generated in `traderoad-data`.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DataError {
    #[error("network failure requesting {url}: {message}")]
    Network { url: String, message: String },

    #[error("failed to parse {entity}: {message}")]
    Parse {
        entity: &'static str,
        message: String,
    },

    #[error("unexpected control frame: {0}")]
    Protocol(String),

    #[error("result for generation {stale} discarded, current generation is {current}")]
    StaleContext {
        stale: Generation,
        current: Generation,
    },

    #[error("SocketError: {0}")]
    Socket(String),

    #[error("read timeout: no live frames received for {secs}s")]
    ReadTimeout { secs: u64 },

    #[error("invalid url: {0}")]
    UrlParse(String),

    #[error("invalid context: {0}")]
    InvalidContext(String),

    #[error("analysis provider failure: {0}")]
    Analysis(String),

    #[error("preferences store failure: {0}")]
    Preferences(String),

    #[error("MarketView task has terminated")]
    ViewTerminated,
}

impl DataError {
    /// Construct a [`DataError::Parse`] for the provided entity.
    pub fn parse(entity: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Parse {
            entity,
            message: error.to_string(),
        }
    }

    /// Determine if an error requires the live connection to re-initialise.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            DataError::Socket(error_msg) => {
                let error_lower = error_msg.to_lowercase();
                error_lower.contains("terminated")
                    || error_lower.contains("connectionclosed")
                    || error_lower.contains("alreadyclosed")
                    || error_lower.contains("sendafterclosing")
                    || error_lower.contains("io(")
                    || error_lower.contains("timeout")
            }
            DataError::ReadTimeout { .. } | DataError::Network { .. } => true,
            _ => false,
        }
    }
}

impl From<url::ParseError> for DataError {
    fn from(value: url::ParseError) -> Self {
        Self::UrlParse(value.to_string())
    }
}

impl From<serde_json::Error> for DataError {
    fn from(value: serde_json::Error) -> Self {
        Self::parse("json", value)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DataError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(format!("{value:?}"))
    }
}

impl From<reqwest::Error> for DataError {
    fn from(value: reqwest::Error) -> Self {
        Self::Network {
            url: value
                .url()
                .map(ToString::to_string)
                .unwrap_or_else(|| "<unknown>".to_string()),
            message: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_is_terminal() {
        struct TestCase {
            input: DataError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: is not terminal w/ DataError::Parse
                input: DataError::parse("Binance kline", "missing field `k`"),
                expected: false,
            },
            TestCase {
                // TC1: is terminal w/ DataError::Socket containing "ConnectionClosed"
                input: DataError::Socket("WebSocket error: ConnectionClosed".to_string()),
                expected: true,
            },
            TestCase {
                // TC2: is terminal w/ DataError::Socket containing "Io("
                input: DataError::Socket("Io(Kind(UnexpectedEof))".to_string()),
                expected: true,
            },
            TestCase {
                // TC3: is not terminal w/ DataError::Socket w/o termination keyword
                input: DataError::Socket("Capacity(MessageTooLong)".to_string()),
                expected: false,
            },
            TestCase {
                // TC4: is not terminal w/ DataError::StaleContext
                input: DataError::StaleContext {
                    stale: Generation(1),
                    current: Generation(2),
                },
                expected: false,
            },
            TestCase {
                // TC5: is terminal w/ DataError::Network
                input: DataError::Network {
                    url: "https://fapi.binance.com".to_string(),
                    message: "connection refused".to_string(),
                },
                expected: true,
            },
            TestCase {
                // TC6: is terminal w/ DataError::ReadTimeout
                input: DataError::ReadTimeout { secs: 120 },
                expected: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.is_terminal();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
