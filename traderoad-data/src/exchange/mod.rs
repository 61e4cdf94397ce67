use self::{binance::Binance, bingx::BingX};
use crate::{
    error::DataError,
    streams::transport::WsMessage,
    subscription::{Context, candle::Candle, ticker::Ticker},
};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, time::Duration};
use url::Url;

/// `Binance` USDⓈ-M futures [`Provider`] implementation.
pub mod binance;

/// `BingX` perpetual swap [`Provider`] implementation.
pub mod bingx;

/// Frame payload extraction, decompression and keep-alive helpers shared by decoders.
pub mod frame;

/// Unique identifier of a market data source.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Default,
    Display,
    Deserialize,
    Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    #[display("binance")]
    Binance,
    #[display("bingx")]
    BingX,
}

impl Source {
    /// Process wide [`Provider`] for this source.
    pub fn provider(&self) -> &'static dyn Provider {
        match self {
            Source::Binance => &Binance,
            Source::BingX => &BingX,
        }
    }

    /// Parse a persisted or user supplied source name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "binance" => Some(Source::Binance),
            "bingx" => Some(Source::BingX),
            _ => None,
        }
    }
}

/// Event decoded from a single live frame.
#[derive(Clone, PartialEq, Debug)]
pub enum LiveEvent {
    Candle(Candle),
    Ticker(Ticker),
    Control(ControlEvent),
}

/// Protocol level event that must be handled on the connection and never forwarded as data.
#[derive(Clone, PartialEq, Debug)]
pub enum ControlEvent {
    /// Provider keep-alive that must be answered with `reply` on the same socket.
    KeepAlive { reply: WsMessage },
}

/// Client side keep-alive schedule for providers that expect the client to ping.
#[derive(Copy, Clone, Debug)]
pub struct PingInterval {
    pub interval: Duration,
    pub ping: fn() -> WsMessage,
}

/// Normalises one exchange's historical fetch, live subscription and frame decoding.
///
/// Implementations are stateless and selected through [`Source::provider`].
pub trait Provider: Debug + Send + Sync {
    fn source(&self) -> Source;

    /// Url of the REST endpoint returning the most recent candles for the [`Context`].
    fn historical_url(&self, context: &Context) -> Result<Url, DataError>;

    /// Parse a historical REST payload into candles in ascending time order.
    fn parse_historical(&self, payload: &str) -> Result<Vec<Candle>, DataError>;

    /// Url of the live WebSocket stream for the [`Context`].
    fn stream_url(&self, context: &Context) -> Result<Url, DataError>;

    /// Requests to send on every successful (re)connection.
    fn subscribe_requests(&self, context: &Context) -> Vec<WsMessage>;

    /// Client initiated keep-alive, if the provider requires one.
    fn ping_interval(&self) -> Option<PingInterval> {
        None
    }

    /// Decode a live frame into zero or more [`LiveEvent`]s scoped to the [`Context`].
    ///
    /// Frames for a different symbol or interval decode to an empty `Vec`.
    fn decode(&self, context: &Context, message: &WsMessage) -> Result<Vec<LiveEvent>, DataError>;
}
