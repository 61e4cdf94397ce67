use self::{
    kline::{BinanceKline, parse_historical_klines},
    ticker::BinanceTicker,
};
use crate::{
    error::DataError,
    exchange::{LiveEvent, PingInterval, Provider, Source, frame::payload_text},
    streams::transport::WsMessage,
    subscription::{Context, candle::Candle, ticker::Ticker},
};
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Kline types for [`Binance`].
pub mod kline;

/// 24hr ticker types for [`Binance`].
pub mod ticker;

/// [`Binance`] USDⓈ-M futures REST base url.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/general-info>
pub const BASE_URL_BINANCE_FUTURES_REST: &str = "https://fapi.binance.com";

/// [`Binance`] USDⓈ-M futures WebSocket base url.
///
/// See docs: <https://developers.binance.com/docs/derivatives/usds-margined-futures/websocket-market-streams>
pub const BASE_URL_BINANCE_FUTURES_WS: &str = "wss://fstream.binance.com/ws";

/// Number of candles requested per historical fetch.
pub const HISTORICAL_LIMIT: &str = "500";

/// [`Binance`] client keep-alive interval.
///
/// The server pings every 3 minutes and accepts unsolicited pong frames, so a pong on the same
/// cadence keeps idle streams open.
pub const PING_INTERVAL_BINANCE: Duration = Duration::from_secs(180);

/// [`Binance`] USDⓈ-M futures provider.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Binance;

impl Provider for Binance {
    fn source(&self) -> Source {
        Source::Binance
    }

    fn historical_url(&self, context: &Context) -> Result<Url, DataError> {
        Url::parse_with_params(
            &format!("{BASE_URL_BINANCE_FUTURES_REST}/fapi/v1/klines"),
            &[
                ("symbol", context.symbol.as_str()),
                ("interval", context.timeframe.as_str()),
                ("limit", HISTORICAL_LIMIT),
            ],
        )
        .map_err(DataError::from)
    }

    fn parse_historical(&self, payload: &str) -> Result<Vec<Candle>, DataError> {
        parse_historical_klines(payload)
    }

    fn stream_url(&self, context: &Context) -> Result<Url, DataError> {
        Url::parse(&format!(
            "{BASE_URL_BINANCE_FUTURES_WS}/{}@kline_{}",
            context.symbol.to_ascii_lowercase(),
            context.timeframe
        ))
        .map_err(DataError::from)
    }

    fn subscribe_requests(&self, context: &Context) -> Vec<WsMessage> {
        vec![WsMessage::text(
            json!({
                "method": "SUBSCRIBE",
                "params": [format!("{}@ticker", context.symbol.to_ascii_lowercase())],
                "id": 1,
            })
            .to_string(),
        )]
    }

    fn ping_interval(&self) -> Option<PingInterval> {
        Some(PingInterval {
            interval: PING_INTERVAL_BINANCE,
            ping: || WsMessage::Pong(Default::default()),
        })
    }

    fn decode(&self, context: &Context, message: &WsMessage) -> Result<Vec<LiveEvent>, DataError> {
        let Some(text) = payload_text(message)? else {
            return Ok(vec![]);
        };

        let message = serde_json::from_str::<BinanceMessage>(&text)
            .map_err(|error| DataError::parse("Binance frame", error))?;

        match message {
            BinanceMessage::Kline(kline) if kline.matches(context) => {
                Ok(vec![LiveEvent::Candle(Candle::from(&kline.kline))])
            }
            BinanceMessage::Ticker(ticker)
                if ticker
                    .symbol
                    .as_ref()
                    .is_none_or(|symbol| symbol.eq_ignore_ascii_case(&context.symbol)) =>
            {
                Ok(vec![LiveEvent::Ticker(Ticker::from(&ticker))])
            }
            BinanceMessage::Kline(_) | BinanceMessage::Ticker(_) => {
                debug!(%context, payload = %text, "ignoring Binance frame for another stream");
                Ok(vec![])
            }
            BinanceMessage::Response { id } => {
                debug!(%context, ?id, "Binance subscription acknowledged");
                Ok(vec![])
            }
            BinanceMessage::Error { code, msg } => Err(DataError::Protocol(format!(
                "Binance error response code {code}: {msg}"
            ))),
        }
    }
}

/// Messages received on a [`Binance`] futures stream.
#[derive(Clone, PartialEq, Debug)]
pub enum BinanceMessage {
    Kline(BinanceKline),
    Ticker(BinanceTicker),
    /// Response to a `SUBSCRIBE` request (eg/ `{"result":null,"id":1}`).
    Response { id: Value },
    /// Error response to a request (eg/ `{"error":{"code":2,"msg":"Invalid request"},"id":1}`).
    Error { code: i64, msg: String },
}

impl<'de> Deserialize<'de> for BinanceMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        match value.get("e").and_then(Value::as_str) {
            Some("kline") => serde_json::from_value(value)
                .map(BinanceMessage::Kline)
                .map_err(serde::de::Error::custom),
            Some("24hrTicker") => serde_json::from_value(value)
                .map(BinanceMessage::Ticker)
                .map_err(serde::de::Error::custom),
            Some(other) => Err(serde::de::Error::custom(format!(
                "unsupported Binance event type: {other}"
            ))),
            None => {
                if let Some(error) = value.get("error") {
                    return Ok(BinanceMessage::Error {
                        code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                        msg: error
                            .get("msg")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    });
                }

                match value.get("id") {
                    Some(id) if value.get("result").is_some() => {
                        Ok(BinanceMessage::Response { id: id.clone() })
                    }
                    _ => Err(serde::de::Error::custom(format!(
                        "unrecognised Binance message: {value}"
                    ))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        Context::new(Source::Binance, "btc-usdt", "1h").unwrap()
    }

    #[test]
    fn test_binance_urls_and_requests() {
        let context = context();

        assert_eq!(
            Binance.historical_url(&context).unwrap().as_str(),
            "https://fapi.binance.com/fapi/v1/klines?symbol=BTCUSDT&interval=1h&limit=500"
        );
        assert_eq!(
            Binance.stream_url(&context).unwrap().as_str(),
            "wss://fstream.binance.com/ws/btcusdt@kline_1h"
        );
        assert_eq!(
            Binance.subscribe_requests(&context),
            vec![WsMessage::text(
                r#"{"id":1,"method":"SUBSCRIBE","params":["btcusdt@ticker"]}"#.to_string()
            )]
        );
    }

    #[test]
    fn test_binance_decode() {
        struct TestCase {
            input: WsMessage,
            expected: Result<Vec<LiveEvent>, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0: kline for the active context
                input: WsMessage::text(
                    r#"{"e":"kline","E":1,"s":"BTCUSDT","k":{"t":1700000000000,"i":"1h","o":"10","h":"12","l":"9","c":"11","v":"5"}}"#.to_string(),
                ),
                expected: Ok(vec![LiveEvent::Candle(Candle::new(
                    1_700_000_000,
                    10.0,
                    12.0,
                    9.0,
                    11.0,
                    Some(5.0),
                ))]),
            },
            TestCase {
                // TC1: kline for another interval is ignored
                input: WsMessage::text(
                    r#"{"e":"kline","E":1,"s":"BTCUSDT","k":{"t":1700000000000,"i":"4h","o":"10","h":"12","l":"9","c":"11","v":"5"}}"#.to_string(),
                ),
                expected: Ok(vec![]),
            },
            TestCase {
                // TC2: 24hr ticker
                input: WsMessage::text(
                    r#"{"e":"24hrTicker","E":1,"s":"BTCUSDT","p":"100","P":"1.25","c":"43000.5","v":"1000","q":"43000500"}"#.to_string(),
                ),
                expected: Ok(vec![LiveEvent::Ticker(Ticker {
                    price: 43000.5,
                    change_percent: Some(1.25),
                    volume: Some(1000.0),
                    quote_volume: Some(43_000_500.0),
                })]),
            },
            TestCase {
                // TC3: subscription acknowledgement
                input: WsMessage::text(r#"{"result":null,"id":1}"#.to_string()),
                expected: Ok(vec![]),
            },
            TestCase {
                // TC4: error response
                input: WsMessage::text(
                    r#"{"error":{"code":2,"msg":"Invalid request"},"id":1}"#.to_string(),
                ),
                expected: Err(()),
            },
            TestCase {
                // TC5: malformed json
                input: WsMessage::text(r#"{"e":"kline","k":"#.to_string()),
                expected: Err(()),
            },
            TestCase {
                // TC6: transport ping frame
                input: WsMessage::Ping(Default::default()),
                expected: Ok(vec![]),
            },
        ];

        let context = context();
        for (index, test) in tests.into_iter().enumerate() {
            let actual = Binance.decode(&context, &test.input).map_err(|_| ());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
