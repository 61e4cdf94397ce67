use crate::AppState;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpStream;
use tokio_stream::wrappers::WatchStream;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use traderoad_data::{
    debounce::Debouncer,
    error::DataError,
    exchange::Source,
    indicator::IndicatorConfig,
    overlay::{OverlaySettings, document::AnnotationDocument},
    pipeline::RenderFrame,
    store::{ConnectionHealth, Phase},
    subscription::Context,
};

/// JSON command sent by a browser client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Select {
        source: Source,
        symbol: String,
        timeframe: String,
    },
    /// Raw symbol text as typed, debounced before selecting.
    SymbolInput { symbol: String },
    Indicators { indicators: Vec<IndicatorConfig> },
    OverlaySettings { settings: OverlaySettings },
    /// Externally produced annotation document, `null` clears it.
    Annotation { document: Option<AnnotationDocument> },
    Analyse,
}

/// JSON message sent to a browser client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    Welcome {
        message: &'a str,
        timestamp: DateTime<Utc>,
    },
    Frame {
        frame: &'a RenderFrame,
    },
    Error {
        message: String,
    },
}

impl ServerMessage<'_> {
    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::text(json)),
            Err(error) => {
                error!(%error, "failed to serialise server message");
                None
            }
        }
    }
}

/// Handle individual WebSocket client connection
pub async fn handle_client(stream: TcpStream, peer_addr: SocketAddr, state: Arc<AppState>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(error) => {
            error!(%peer_addr, %error, "WebSocket handshake failed");
            return;
        }
    };

    info!(%peer_addr, "WebSocket handshake completed");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut frames = WatchStream::new(state.view.subscribe());
    let mut symbol_input = Debouncer::<String>::default();

    let welcome = ServerMessage::Welcome {
        message: "Connected to TradeRoad market feed",
        timestamp: Utc::now(),
    };
    if let Some(message) = welcome.to_message() {
        if ws_sender.send(message).await.is_err() {
            return;
        }
    }

    loop {
        let reply = tokio::select! {
            frame = frames.next() => match frame {
                Some(frame) => ServerMessage::Frame { frame: &frame }.to_message(),
                None => {
                    info!(%peer_addr, "MarketView terminated, closing client");
                    break;
                }
            },
            Some(symbol) = symbol_input.next() => {
                select_symbol(&state, &symbol).await.err().and_then(error_message)
            },
            message = ws_receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientCommand>(text.as_str()) {
                        Ok(command) => {
                            debug!(%peer_addr, ?command, "received command");
                            apply_command(&state, command, &mut symbol_input)
                                .await
                                .err()
                                .and_then(error_message)
                        }
                        Err(error) => {
                            warn!(%peer_addr, %error, "invalid client command");
                            error_message(DataError::parse("client command", error))
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => None,
                Some(Err(error)) => {
                    error!(%peer_addr, %error, "WebSocket error");
                    break;
                }
            },
        };

        if let Some(reply) = reply {
            if ws_sender.send(reply).await.is_err() {
                break;
            }
        }
    }

    info!(%peer_addr, "WebSocket connection closed");
}

fn error_message(error: DataError) -> Option<Message> {
    ServerMessage::Error {
        message: error.to_string(),
    }
    .to_message()
}

async fn apply_command(
    state: &AppState,
    command: ClientCommand,
    symbol_input: &mut Debouncer<String>,
) -> Result<(), DataError> {
    match command {
        ClientCommand::Select {
            source,
            symbol,
            timeframe,
        } => {
            symbol_input.cancel();
            let context = Context::new(source, &symbol, &timeframe)?;
            select(state, context).await
        }
        ClientCommand::SymbolInput { symbol } => {
            symbol_input.push(symbol);
            Ok(())
        }
        ClientCommand::Indicators { indicators } => {
            state.update_preferences(|preferences| preferences.indicators = indicators.clone());
            state.view.set_indicators(indicators).await
        }
        ClientCommand::OverlaySettings { settings } => {
            state.update_preferences(|preferences| preferences.set_overlay_settings(&settings));
            state.view.set_overlay_settings(settings).await
        }
        ClientCommand::Annotation { document } => state.view.set_annotation(document).await,
        ClientCommand::Analyse => state.view.request_analysis().await,
    }
}

/// Select the debounced symbol, keeping the active source and timeframe.
async fn select_symbol(state: &AppState, symbol: &str) -> Result<(), DataError> {
    let (source, timeframe) = match state.view.frame().context.as_ref() {
        Some(context) => (context.source, context.timeframe.clone()),
        None => {
            let preferences = state.preferences.lock();
            (preferences.source, preferences.context()?.timeframe)
        }
    };

    let context = Context::new(source, symbol, timeframe.as_str())?;
    select(state, context).await
}

async fn select(state: &AppState, context: Context) -> Result<(), DataError> {
    if is_active(&state.view.frame(), &context) {
        debug!(%context, "context already active");
        return Ok(());
    }

    state.update_preferences(|preferences| preferences.set_context(&context));
    state.view.select(context).await
}

/// Selecting `context` again is a no-op unless it failed, in which case it retries the fetch.
fn is_active(frame: &RenderFrame, context: &Context) -> bool {
    frame.context.as_ref() == Some(context)
        && frame.phase != Phase::Failed
        && frame.health != ConnectionHealth::Error
}
