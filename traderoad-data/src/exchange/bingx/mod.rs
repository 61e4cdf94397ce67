use self::{
    kline::{BingXKline, parse_historical_klines},
    message::BingXMessage,
    trade::BingXTrade,
};
use crate::{
    error::DataError,
    exchange::{
        ControlEvent, LiveEvent, Provider, Source,
        frame::{keep_alive_reply, payload_text},
    },
    streams::transport::WsMessage,
    subscription::{Context, candle::Candle, ticker::Ticker},
};
use serde_json::json;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Kline types for [`BingX`].
pub mod kline;

/// Response envelope shared by [`BingX`] REST and WebSocket payloads.
pub mod message;

/// Latest trade types for [`BingX`].
pub mod trade;

/// [`BingX`] perpetual swap REST base url.
///
/// See docs: <https://bingx-api.github.io/docs/#/en-us/swapV2/base-info.html>
pub const BASE_URL_BINGX_SWAP_REST: &str = "https://open-api.bingx.com";

/// [`BingX`] perpetual swap WebSocket url.
///
/// See docs: <https://bingx-api.github.io/docs/#/en-us/swapV2/socket/>
pub const BASE_URL_BINGX_SWAP_WS: &str = "wss://open-api-swap.bingx.com/swap-market";

/// Public CORS relay the BingX historical endpoint is fetched through. The upstream body is
/// returned as a string in the `contents` field.
pub const RELAY_URL: &str = "https://api.allorigins.win/get";

/// Number of candles requested per historical fetch.
pub const HISTORICAL_LIMIT: &str = "500";

/// [`BingX`] perpetual swap provider.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct BingX;

impl BingX {
    fn kline_channel(context: &Context) -> String {
        format!("{}@kline_{}", context.symbol, context.timeframe)
    }

    fn trade_channel(context: &Context) -> String {
        format!("{}@trade", context.symbol)
    }

    fn subscribe(data_type: String) -> WsMessage {
        WsMessage::text(
            json!({
                "id": Uuid::new_v4().to_string(),
                "reqType": "sub",
                "dataType": data_type,
            })
            .to_string(),
        )
    }
}

impl Provider for BingX {
    fn source(&self) -> Source {
        Source::BingX
    }

    fn historical_url(&self, context: &Context) -> Result<Url, DataError> {
        let upstream = Url::parse_with_params(
            &format!("{BASE_URL_BINGX_SWAP_REST}/openApi/swap/v2/quote/klines"),
            &[
                ("symbol", context.symbol.as_str()),
                ("interval", context.timeframe.as_str()),
                ("limit", HISTORICAL_LIMIT),
            ],
        )?;

        Url::parse_with_params(RELAY_URL, &[("url", upstream.as_str())]).map_err(DataError::from)
    }

    fn parse_historical(&self, payload: &str) -> Result<Vec<Candle>, DataError> {
        parse_historical_klines(payload)
    }

    fn stream_url(&self, _: &Context) -> Result<Url, DataError> {
        Url::parse(BASE_URL_BINGX_SWAP_WS).map_err(DataError::from)
    }

    fn subscribe_requests(&self, context: &Context) -> Vec<WsMessage> {
        vec![
            Self::subscribe(Self::kline_channel(context)),
            Self::subscribe(Self::trade_channel(context)),
        ]
    }

    fn decode(&self, context: &Context, message: &WsMessage) -> Result<Vec<LiveEvent>, DataError> {
        let Some(text) = payload_text(message)? else {
            return Ok(vec![]);
        };

        if let Some(reply) = keep_alive_reply(&text) {
            return Ok(vec![LiveEvent::Control(ControlEvent::KeepAlive { reply })]);
        }

        let message = serde_json::from_str::<BingXMessage>(&text)
            .map_err(|error| DataError::parse("BingX frame", error))?;

        if !message.is_ok() {
            return Err(DataError::Protocol(message.error_message()));
        }

        let Some(data_type) = message.data_type.as_deref().filter(|kind| !kind.is_empty())
        else {
            debug!(%context, payload = %text, "BingX subscription acknowledged");
            return Ok(vec![]);
        };

        if data_type == Self::kline_channel(context) {
            Ok(message
                .data_as::<BingXKline>("BingX kline")?
                .iter()
                .map(|kline| LiveEvent::Candle(Candle::from(kline)))
                .collect())
        } else if data_type == Self::trade_channel(context) {
            Ok(message
                .data_as::<BingXTrade>("BingX trade")?
                .last()
                .map(|trade| LiveEvent::Ticker(Ticker::from(trade)))
                .into_iter()
                .collect())
        } else {
            debug!(%context, data_type, "ignoring BingX frame for another stream");
            Ok(vec![])
        }
    }
}
