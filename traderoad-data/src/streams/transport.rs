use crate::error::DataError;
use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::{fmt::Debug, pin::Pin};
use tracing::debug;
use url::Url;

/// WebSocket frame exchanged with providers.
pub type WsMessage = tokio_tungstenite::tungstenite::Message;

/// Write half of a live provider connection.
pub type WsSink = Pin<Box<dyn Sink<WsMessage, Error = DataError> + Send>>;

/// Read half of a live provider connection.
pub type WsStream = Pin<Box<dyn Stream<Item = Result<WsMessage, DataError>> + Send>>;

/// Opens full-duplex WebSocket connections.
///
/// Production uses [`TungsteniteTransport`], tests substitute an in-memory implementation.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn connect(&self, url: &Url) -> Result<(WsSink, WsStream), DataError>;
}

/// [`Transport`] backed by `tokio-tungstenite` with rustls.
#[derive(Copy, Clone, Debug, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &Url) -> Result<(WsSink, WsStream), DataError> {
        debug!(%url, "attempting to establish WebSocket connection");

        let (websocket, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (sink, stream) = websocket.split();

        let sink: WsSink = Box::pin(sink.sink_map_err(DataError::from));
        let stream: WsStream = Box::pin(stream.map(|result| result.map_err(DataError::from)));

        Ok((sink, stream))
    }
}
