//! Owned live WebSocket connection scoped to one ([`Context`], [`Generation`]).
//!
//! A [`LiveFeedController`] runs at most one connection task. The task connects through a
//! [`Transport`], subscribes on every (re)open, answers provider keep-alives on the same socket,
//! and forwards decoded candles and tickers tagged with its [`Generation`]. Restarting or stopping
//! the controller joins the previous task, so nothing it produced can be sent afterwards.

use super::{
    timeout::{DEFAULT_READ_TIMEOUT, TimeoutStream},
    transport::{Transport, WsMessage, WsSink, WsStream},
};
use crate::{
    error::DataError,
    exchange::{ControlEvent, LiveEvent, Provider},
    store::Generation,
    subscription::{Context, candle::Candle, ticker::Ticker},
};
use futures::{SinkExt, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Live feed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Delay between a disconnect and the next connection attempt
    pub reconnect_delay: Duration,
    /// Silence after which the connection is considered dead
    pub read_timeout: Duration,
    /// Buffer size of the channel carrying [`FeedMessage`]s
    pub channel_buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(2),
            read_timeout: DEFAULT_READ_TIMEOUT,
            channel_buffer_size: 1000,
        }
    }
}

impl FeedConfig {
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }
}

/// Connection state reported by the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Candle(Candle),
    Ticker(Ticker),
    State(FeedState),
}

/// [`FeedEvent`] tagged with the [`Generation`] its connection was started under.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    pub generation: Generation,
    pub event: FeedEvent,
}

#[derive(Debug)]
struct ActiveFeed {
    context: Context,
    generation: Generation,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owner of the live connection for the active [`Context`].
#[derive(Debug)]
pub struct LiveFeedController {
    transport: Arc<dyn Transport>,
    config: FeedConfig,
    feed_tx: mpsc::Sender<FeedMessage>,
    active: Option<ActiveFeed>,
}

impl LiveFeedController {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: FeedConfig,
        feed_tx: mpsc::Sender<FeedMessage>,
    ) -> Self {
        Self {
            transport,
            config,
            feed_tx,
            active: None,
        }
    }

    /// Tear down any previous connection, then spawn a connection task for the
    /// ([`Context`], [`Generation`]).
    pub async fn start(&mut self, context: Context, generation: Generation) {
        self.stop().await;

        info!(%context, %generation, "starting live feed");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = FeedTask {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            provider: context.source.provider(),
            context: context.clone(),
            generation,
            feed_tx: self.feed_tx.clone(),
            shutdown: shutdown_rx,
        };

        self.active = Some(ActiveFeed {
            context,
            generation,
            shutdown: shutdown_tx,
            handle: tokio::spawn(task.run()),
        });
    }

    /// Gracefully tear down the active connection and wait for its task to finish.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        debug!(context = %active.context, generation = %active.generation, "stopping live feed");

        // Receiver is gone if the task already exited
        let _ = active.shutdown.send(());

        if let Err(error) = active.handle.await {
            warn!(context = %active.context, ?error, "live feed task failed");
        }
    }

    /// ([`Context`], [`Generation`]) of the running connection task, if any.
    pub fn active(&self) -> Option<(&Context, Generation)> {
        self.active
            .as_ref()
            .map(|active| (&active.context, active.generation))
    }
}

/// Why a single connection session ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    ReceiverDropped,
    Disconnected(Option<DataError>),
}

struct FeedTask {
    transport: Arc<dyn Transport>,
    config: FeedConfig,
    provider: &'static dyn Provider,
    context: Context,
    generation: Generation,
    feed_tx: mpsc::Sender<FeedMessage>,
    shutdown: oneshot::Receiver<()>,
}

impl FeedTask {
    async fn run(mut self) {
        let url = match self.provider.stream_url(&self.context) {
            Ok(url) => url,
            Err(error) => {
                warn!(context = %self.context, %error, "failed to build live stream url");
                let _ = self.report(FeedState::Error(error.to_string())).await;
                return;
            }
        };

        loop {
            if self.report(FeedState::Connecting).await.is_err() {
                return;
            }

            let connection = tokio::select! {
                biased;
                _ = &mut self.shutdown => return,
                connection = self.transport.connect(&url) => connection,
            };

            let end = match connection {
                Ok((mut sink, stream)) => {
                    info!(context = %self.context, %url, "live stream connected");
                    let end = self.session(&mut sink, stream).await;

                    if matches!(end, SessionEnd::Shutdown) {
                        // Best effort, the peer may already be gone
                        let _ = sink.send(WsMessage::Close(None)).await;
                    }
                    end
                }
                Err(error) => SessionEnd::Disconnected(Some(error)),
            };

            let state = match end {
                SessionEnd::Shutdown | SessionEnd::ReceiverDropped => return,
                SessionEnd::Disconnected(Some(error)) => {
                    warn!(context = %self.context, %error, "live stream failed, will reconnect");
                    FeedState::Error(error.to_string())
                }
                SessionEnd::Disconnected(None) => {
                    warn!(context = %self.context, "live stream closed, will reconnect");
                    FeedState::Disconnected
                }
            };

            if self.report(state).await.is_err() {
                return;
            }

            debug!(
                context = %self.context,
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "waiting before reconnecting"
            );

            tokio::select! {
                biased;
                _ = &mut self.shutdown => return,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    async fn session(&mut self, sink: &mut WsSink, stream: WsStream) -> SessionEnd {
        for request in self.provider.subscribe_requests(&self.context) {
            if let Err(error) = sink.send(request).await {
                return SessionEnd::Disconnected(Some(error));
            }
        }

        if let Err(end) = self.report(FeedState::Connected).await {
            return end;
        }

        let mut stream = TimeoutStream::new(stream, self.config.read_timeout);

        let mut ping = self.provider.ping_interval().map(|schedule| {
            let mut interval = tokio::time::interval_at(
                Instant::now() + schedule.interval,
                schedule.interval,
            );
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            (interval, schedule.ping)
        });

        loop {
            let next_ping = async {
                match ping.as_mut() {
                    Some((interval, make_ping)) => {
                        interval.tick().await;
                        make_ping()
                    }
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = &mut self.shutdown => return SessionEnd::Shutdown,
                message = next_ping => {
                    debug!(context = %self.context, "sending keep-alive ping");
                    if let Err(error) = sink.send(message).await {
                        return SessionEnd::Disconnected(Some(error));
                    }
                }
                frame = stream.next() => {
                    let message = match frame {
                        None => return SessionEnd::Disconnected(None),
                        Some(Err(error)) if error.is_terminal() => {
                            return SessionEnd::Disconnected(Some(error));
                        }
                        Some(Err(error)) => {
                            warn!(context = %self.context, %error, "live stream error");
                            continue;
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            debug!(context = %self.context, ?frame, "live stream sent close frame");
                            return SessionEnd::Disconnected(None);
                        }
                        Some(Ok(message)) => message,
                    };

                    if let Err(end) = self.handle(sink, &message).await {
                        return end;
                    }
                }
            }
        }
    }

    async fn handle(&mut self, sink: &mut WsSink, message: &WsMessage) -> Result<(), SessionEnd> {
        let events = match self.provider.decode(&self.context, message) {
            Ok(events) => events,
            Err(DataError::Protocol(error)) => {
                warn!(context = %self.context, %error, "provider reported protocol error");
                return Ok(());
            }
            Err(error) => {
                warn!(context = %self.context, %error, "dropped undecodable live frame");
                debug!(context = %self.context, ?message, "undecodable live frame");
                return Ok(());
            }
        };

        for event in events {
            match event {
                LiveEvent::Control(ControlEvent::KeepAlive { reply }) => {
                    debug!(context = %self.context, "answering provider keep-alive");
                    sink.send(reply)
                        .await
                        .map_err(|error| SessionEnd::Disconnected(Some(error)))?;
                }
                LiveEvent::Candle(candle) => self.forward(FeedEvent::Candle(candle)).await?,
                LiveEvent::Ticker(ticker) => self.forward(FeedEvent::Ticker(ticker)).await?,
            }
        }

        Ok(())
    }

    async fn report(&mut self, state: FeedState) -> Result<(), SessionEnd> {
        self.forward(FeedEvent::State(state)).await
    }

    async fn forward(&mut self, event: FeedEvent) -> Result<(), SessionEnd> {
        let message = FeedMessage {
            generation: self.generation,
            event,
        };

        // Shutdown must win over a full channel, the receiver may be awaiting this task
        tokio::select! {
            biased;
            _ = &mut self.shutdown => Err(SessionEnd::Shutdown),
            result = self.feed_tx.send(message) => result.map_err(|_| {
                debug!(context = %self.context, "feed receiver dropped, stopping live feed");
                SessionEnd::ReceiverDropped
            }),
        }
    }
}
