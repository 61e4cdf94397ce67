//! Single-writer `MarketView` actor owning the [`SeriesStore`] and the [`LiveFeedController`].
//!
//! Every asynchronous result (historical fetch, live frame, connection state, analysis) is sent
//! back into the actor tagged with the [`Generation`] it was started under, and dropped when that
//! generation is no longer current. After every state change the actor publishes a
//! [`RenderFrame`] on a `watch` channel.

use crate::{
    analysis::{AnalysisProvider, AnalysisRequest},
    error::DataError,
    indicator::{IndicatorConfig, IndicatorLine, VolumeBar, compute_all, volume_bars},
    overlay::{Overlay, OverlaySettings, document::AnnotationDocument, map_overlay},
    store::{ConnectionHealth, Generation, Phase, SeriesStore},
    streams::{
        controller::{FeedConfig, FeedEvent, FeedMessage, FeedState, LiveFeedController},
        historical::{HistoricalClient, fetch_historical},
        transport::Transport,
    },
    subscription::{Context, candle::Candle, ticker::Ticker},
};
use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// Commands accepted by the `MarketView` actor.
#[derive(Debug, Clone)]
pub enum Command {
    Select(Context),
    SetIndicators(Vec<IndicatorConfig>),
    SetOverlaySettings(OverlaySettings),
    /// Replace (or clear) the current annotation document.
    SetAnnotation(Option<AnnotationDocument>),
    RequestAnalysis,
    Shutdown,
}

/// Results produced by tasks spawned by the actor.
#[derive(Debug)]
enum Internal {
    Historical {
        generation: Generation,
        result: Result<Vec<Candle>, DataError>,
    },
    Analysis {
        generation: Generation,
        result: Result<AnnotationDocument, DataError>,
    },
}

/// Progress of the most recent analysis request.
#[derive(Clone, PartialEq, Debug, Default, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum AnalysisState {
    #[default]
    Idle,
    Running,
    Ready,
    Failed(String),
}

/// Everything a chart consumer needs to draw the active [`Context`].
#[derive(Clone, PartialEq, Debug, Default, Serialize)]
pub struct RenderFrame {
    pub context: Option<Context>,
    pub generation: Generation,
    pub phase: Phase,
    pub health: ConnectionHealth,
    pub candles: Arc<[Candle]>,
    pub volume: Vec<VolumeBar>,
    pub indicators: IndexMap<SmolStr, IndicatorLine>,
    pub overlay: Overlay,
    pub overlay_settings: OverlaySettings,
    pub annotation: Option<Arc<AnnotationDocument>>,
    pub analysis: AnalysisState,
    pub ticker: Option<Ticker>,
    /// Ticker price when known, otherwise the close of the last candle.
    pub latest_price: Option<f64>,
    pub latest_volume: Option<f64>,
    /// Invalid or late live candles dropped for this generation.
    pub dropped: u64,
    /// Results discarded because they belonged to a superseded generation.
    pub stale_discarded: u64,
}

/// Static `MarketView` configuration.
#[derive(Debug, Clone, Default)]
pub struct MarketViewConfig {
    pub feed: FeedConfig,
    pub indicators: Vec<IndicatorConfig>,
    pub overlay_settings: OverlaySettings,
}

/// Cloneable handle for sending [`Command`]s to, and observing [`RenderFrame`]s from, a running
/// `MarketView`.
#[derive(Debug, Clone)]
pub struct MarketViewHandle {
    command_tx: mpsc::Sender<Command>,
    frame_rx: watch::Receiver<Arc<RenderFrame>>,
}

impl MarketViewHandle {
    pub async fn send(&self, command: Command) -> Result<(), DataError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| DataError::ViewTerminated)
    }

    pub async fn select(&self, context: Context) -> Result<(), DataError> {
        self.send(Command::Select(context)).await
    }

    pub async fn set_indicators(&self, indicators: Vec<IndicatorConfig>) -> Result<(), DataError> {
        self.send(Command::SetIndicators(indicators)).await
    }

    pub async fn set_overlay_settings(&self, settings: OverlaySettings) -> Result<(), DataError> {
        self.send(Command::SetOverlaySettings(settings)).await
    }

    pub async fn set_annotation(&self, document: Option<AnnotationDocument>) -> Result<(), DataError> {
        self.send(Command::SetAnnotation(document)).await
    }

    pub async fn request_analysis(&self) -> Result<(), DataError> {
        self.send(Command::RequestAnalysis).await
    }

    pub async fn shutdown(&self) -> Result<(), DataError> {
        self.send(Command::Shutdown).await
    }

    /// Most recently published [`RenderFrame`].
    pub fn frame(&self) -> Arc<RenderFrame> {
        Arc::clone(&self.frame_rx.borrow())
    }

    /// New receiver observing every subsequently published [`RenderFrame`].
    pub fn subscribe(&self) -> watch::Receiver<Arc<RenderFrame>> {
        self.frame_rx.clone()
    }
}

/// Actor state. Only ever mutated from its own task.
#[derive(Debug)]
pub struct MarketView {
    store: SeriesStore,
    feed: LiveFeedController,
    historical: Arc<dyn HistoricalClient>,
    analyst: Option<Arc<dyn AnalysisProvider>>,
    indicators: Vec<IndicatorConfig>,
    overlay_settings: OverlaySettings,
    annotation: Option<Arc<AnnotationDocument>>,
    analysis: AnalysisState,
    ticker: Option<Ticker>,
    stale_discarded: u64,
    internal_tx: mpsc::Sender<Internal>,
    frame_tx: watch::Sender<Arc<RenderFrame>>,
}

impl MarketView {
    /// Spawn the actor onto the current tokio runtime.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        historical: Arc<dyn HistoricalClient>,
        analyst: Option<Arc<dyn AnalysisProvider>>,
        config: MarketViewConfig,
    ) -> (MarketViewHandle, JoinHandle<()>) {
        let buffer = config.feed.channel_buffer_size.max(1);
        let (command_tx, command_rx) = mpsc::channel(buffer);
        let (internal_tx, internal_rx) = mpsc::channel(buffer);
        let (feed_tx, feed_rx) = mpsc::channel(buffer);

        let initial = RenderFrame {
            overlay_settings: config.overlay_settings.clone(),
            ..RenderFrame::default()
        };
        let (frame_tx, frame_rx) = watch::channel(Arc::new(initial));

        let view = Self {
            store: SeriesStore::new(),
            feed: LiveFeedController::new(transport, config.feed, feed_tx),
            historical,
            analyst,
            indicators: config.indicators,
            overlay_settings: config.overlay_settings,
            annotation: None,
            analysis: AnalysisState::Idle,
            ticker: None,
            stale_discarded: 0,
            internal_tx,
            frame_tx,
        };

        let handle = tokio::spawn(view.run(command_rx, internal_rx, feed_rx));

        (
            MarketViewHandle {
                command_tx,
                frame_rx,
            },
            handle,
        )
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<Command>,
        mut internal_rx: mpsc::Receiver<Internal>,
        mut feed_rx: mpsc::Receiver<FeedMessage>,
    ) {
        info!("MarketView started");

        loop {
            let changed = tokio::select! {
                command = command_rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command).await,
                },
                Some(internal) = internal_rx.recv() => self.on_internal(internal),
                Some(message) = feed_rx.recv() => self.on_feed(message),
            };

            if changed {
                self.publish();
            }
        }

        self.feed.stop().await;
        info!("MarketView stopped");
    }

    async fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Select(context) => {
                self.select(context).await;
                true
            }
            Command::SetIndicators(indicators) => {
                self.indicators = indicators;
                true
            }
            Command::SetOverlaySettings(settings) => {
                self.overlay_settings = settings;
                true
            }
            Command::SetAnnotation(document) => {
                self.annotation = document.map(Arc::new);
                true
            }
            Command::RequestAnalysis => {
                self.request_analysis();
                true
            }
            Command::Shutdown => false,
        }
    }

    async fn select(&mut self, context: Context) {
        let generation = self.store.reset(context.clone());
        info!(%context, %generation, "selected context");

        self.annotation = None;
        self.analysis = AnalysisState::Idle;
        self.ticker = None;

        let client = Arc::clone(&self.historical);
        let internal_tx = self.internal_tx.clone();
        let fetch_context = context.clone();
        tokio::spawn(async move {
            let result = fetch_historical(client.as_ref(), &fetch_context).await;
            let _ = internal_tx
                .send(Internal::Historical { generation, result })
                .await;
        });

        self.feed.start(context, generation).await;
    }

    fn request_analysis(&mut self) {
        let Some(context) = self.store.context().cloned() else {
            self.analysis = AnalysisState::Failed("no market selected".to_string());
            return;
        };

        if self.store.phase() != Phase::Ready {
            self.analysis = AnalysisState::Failed("chart data is still loading".to_string());
            return;
        }

        let Some(current_price) = self.latest_price() else {
            self.analysis = AnalysisState::Failed("no price available yet".to_string());
            return;
        };

        let Some(analyst) = self.analyst.as_ref().map(Arc::clone) else {
            self.analysis = AnalysisState::Failed("no analysis provider configured".to_string());
            return;
        };

        let request = AnalysisRequest::new(&context, current_price, self.latest_volume());
        let generation = self.store.generation();
        let internal_tx = self.internal_tx.clone();

        info!(%context, %generation, "requesting analysis");
        self.analysis = AnalysisState::Running;

        tokio::spawn(async move {
            let result = analyst.analyse(&request).await;
            let _ = internal_tx
                .send(Internal::Analysis { generation, result })
                .await;
        });
    }

    fn on_internal(&mut self, internal: Internal) -> bool {
        match internal {
            Internal::Historical { generation, result } => {
                let applied = match result {
                    Ok(candles) => self.store.seed(generation, candles).map(|len| {
                        debug!(%generation, len, "seeded series");
                    }),
                    Err(error) => self.store.fail(generation).map(|()| {
                        error!(%generation, %error, "historical fetch failed");
                    }),
                };
                self.discard_if_stale(applied)
            }
            Internal::Analysis { generation, result } => {
                if let Err(error) = self.ensure_current(generation) {
                    return self.discard_if_stale(Err(error));
                }

                match result {
                    Ok(document) => {
                        self.annotation = Some(Arc::new(document));
                        self.analysis = AnalysisState::Ready;
                    }
                    Err(error) => {
                        warn!(%generation, %error, "analysis failed");
                        self.analysis = AnalysisState::Failed(error.to_string());
                    }
                }
                true
            }
        }
    }

    fn on_feed(&mut self, message: FeedMessage) -> bool {
        let FeedMessage { generation, event } = message;

        let applied = match event {
            FeedEvent::Candle(candle) => self.store.apply_update(generation, candle).map(|_| ()),
            FeedEvent::Ticker(ticker) => self.ensure_current(generation).map(|()| {
                self.ticker = Some(ticker);
            }),
            FeedEvent::State(state) => {
                let health = match state {
                    FeedState::Connected if self.store.phase() == Phase::Failed => {
                        ConnectionHealth::Error
                    }
                    FeedState::Connected => ConnectionHealth::Ok,
                    FeedState::Connecting | FeedState::Disconnected => ConnectionHealth::Connecting,
                    FeedState::Error(_) => ConnectionHealth::Error,
                };
                self.store.set_health(generation, health)
            }
        };

        self.discard_if_stale(applied)
    }

    fn ensure_current(&self, generation: Generation) -> Result<(), DataError> {
        let current = self.store.generation();
        if generation == current {
            Ok(())
        } else {
            Err(DataError::StaleContext {
                stale: generation,
                current,
            })
        }
    }

    /// Returns whether state changed. A stale result only bumps the discard counter.
    fn discard_if_stale(&mut self, result: Result<(), DataError>) -> bool {
        match result {
            Ok(()) => true,
            Err(error @ DataError::StaleContext { .. }) => {
                debug!(%error, "discarded stale result");
                self.stale_discarded += 1;
                true
            }
            Err(error) => {
                warn!(%error, "failed to apply result");
                false
            }
        }
    }

    fn latest_price(&self) -> Option<f64> {
        self.ticker
            .map(|ticker| ticker.price)
            .or_else(|| self.store.last().map(|candle| candle.close))
    }

    fn latest_volume(&self) -> Option<f64> {
        self.store.last().and_then(|candle| candle.volume)
    }

    fn publish(&self) {
        let candles = self.store.snapshot();
        let context = self.store.context().cloned();

        let overlay = match (self.annotation.as_deref(), context.as_ref()) {
            (Some(document), Some(context)) => {
                map_overlay(document, context, &self.overlay_settings)
            }
            _ => Overlay::default(),
        };

        let frame = RenderFrame {
            generation: self.store.generation(),
            phase: self.store.phase(),
            health: self.store.health(),
            volume: volume_bars(&candles),
            indicators: compute_all(&self.indicators, &candles),
            overlay,
            overlay_settings: self.overlay_settings.clone(),
            annotation: self.annotation.clone(),
            analysis: self.analysis.clone(),
            ticker: self.ticker,
            latest_price: self.latest_price(),
            latest_volume: self.latest_volume(),
            dropped: self.store.dropped(),
            stale_discarded: self.stale_discarded,
            context,
            candles,
        };

        self.frame_tx.send_replace(Arc::new(frame));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exchange::Source,
        indicator::IndicatorKind,
        streams::{controller::tests::MockTransport, transport::WsMessage},
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;
    use url::Url;

    /// [`HistoricalClient`] serving canned payloads by symbol, optionally held back by a gate.
    #[derive(Debug, Default)]
    struct ScriptedHistoricalClient {
        routes: Mutex<Vec<(&'static str, String, Option<Arc<Notify>>)>>,
    }

    impl ScriptedHistoricalClient {
        fn route(&self, symbol: &'static str, payload: String) {
            self.routes.lock().push((symbol, payload, None));
        }

        fn gated_route(&self, symbol: &'static str, payload: String) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.routes
                .lock()
                .push((symbol, payload, Some(Arc::clone(&gate))));
            gate
        }
    }

    #[async_trait]
    impl HistoricalClient for ScriptedHistoricalClient {
        async fn get(&self, url: &Url) -> Result<String, DataError> {
            let route = self
                .routes
                .lock()
                .iter()
                .find(|(symbol, _, _)| url.as_str().contains(&format!("symbol={symbol}")))
                .cloned();

            let Some((_, payload, gate)) = route else {
                return Err(DataError::Network {
                    url: url.to_string(),
                    message: "404 Not Found".to_string(),
                });
            };

            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(payload)
        }
    }

    #[derive(Debug)]
    struct StaticAnalyst(AnnotationDocument);

    /// Actor state driven by calling its handlers directly, without the run loop.
    struct Harness {
        view: MarketView,
        internal_rx: mpsc::Receiver<Internal>,
        frame_rx: watch::Receiver<Arc<RenderFrame>>,
        _feed_rx: mpsc::Receiver<FeedMessage>,
    }

    impl Harness {
        fn new(analyst: Option<Arc<dyn AnalysisProvider>>) -> Self {
            let (internal_tx, internal_rx) = mpsc::channel(16);
            let (feed_tx, feed_rx) = mpsc::channel(16);
            let (frame_tx, frame_rx) = watch::channel(Arc::new(RenderFrame::default()));

            let view = MarketView {
                store: SeriesStore::new(),
                feed: LiveFeedController::new(
                    Arc::new(MockTransport::default()),
                    FeedConfig::default(),
                    feed_tx,
                ),
                historical: Arc::new(ScriptedHistoricalClient::default()),
                analyst,
                indicators: vec![],
                overlay_settings: OverlaySettings::default(),
                annotation: None,
                analysis: AnalysisState::Idle,
                ticker: None,
                stale_discarded: 0,
                internal_tx,
                frame_tx,
            };

            Self {
                view,
                internal_rx,
                frame_rx,
                _feed_rx: feed_rx,
            }
        }

        fn frame(&self) -> Arc<RenderFrame> {
            Arc::clone(&self.frame_rx.borrow())
        }
    }

    fn bar(time: i64, close: f64) -> Candle {
        Candle::new(time, close, close + 1.0, close - 1.0, close, Some(1.0))
    }

    fn ticker(price: f64) -> Ticker {
        Ticker {
            price,
            ..Ticker::default()
        }
    }

    fn btc_document() -> AnnotationDocument {
        serde_json::from_value(serde_json::json!({
            "analisis_general": {
                "simbolo": "BTC/USDT",
                "temporalidad_principal_analisis": "1H"
            },
            "puntos_clave_grafico": [
                { "tipo": "poi_demanda", "nivel": 9.5, "label": "Demand" }
            ]
        }))
        .unwrap()
    }

    #[async_trait]
    impl AnalysisProvider for StaticAnalyst {
        async fn analyse(&self, _: &AnalysisRequest) -> Result<AnnotationDocument, DataError> {
            Ok(self.0.clone())
        }
    }

    fn binance_klines(bars: &[(i64, f64)]) -> String {
        let rows = bars
            .iter()
            .map(|(time, close)| {
                serde_json::json!([
                    time * 1000,
                    close.to_string(),
                    (close + 1.0).to_string(),
                    (close - 1.0).to_string(),
                    close.to_string(),
                    "1"
                ])
            })
            .collect::<Vec<_>>();
        serde_json::to_string(&rows).unwrap()
    }

    fn binance_kline_frame(symbol: &str, interval: &str, time: i64, close: f64) -> WsMessage {
        WsMessage::text(
            serde_json::json!({
                "e": "kline",
                "E": 1,
                "s": symbol,
                "k": {
                    "t": time * 1000,
                    "i": interval,
                    "o": close.to_string(),
                    "h": (close + 1.0).to_string(),
                    "l": (close - 1.0).to_string(),
                    "c": close.to_string(),
                    "v": "1",
                }
            })
            .to_string(),
        )
    }

    fn spawn_view(
        transport: Arc<MockTransport>,
        historical: Arc<ScriptedHistoricalClient>,
        analyst: Option<Arc<dyn AnalysisProvider>>,
        indicators: Vec<IndicatorConfig>,
    ) -> (MarketViewHandle, JoinHandle<()>) {
        MarketView::spawn(
            transport,
            historical,
            analyst,
            MarketViewConfig {
                indicators,
                ..MarketViewConfig::default()
            },
        )
    }

    async fn wait_for_frame(
        handle: &MarketViewHandle,
        predicate: impl FnMut(&Arc<RenderFrame>) -> bool,
    ) -> Arc<RenderFrame> {
        let mut frames = handle.subscribe();
        let frame = tokio::time::timeout(Duration::from_secs(5), frames.wait_for(predicate))
            .await
            .expect("timed out waiting for frame")
            .expect("MarketView terminated");
        Arc::clone(&frame)
    }

    #[tokio::test]
    async fn test_historical_then_live_updates() {
        let transport = Arc::new(MockTransport::default());
        let server = transport.add_session();
        let historical = Arc::new(ScriptedHistoricalClient::default());
        historical.route("BTCUSDT", binance_klines(&[(100, 10.0), (200, 11.0), (300, 12.0)]));

        let (handle, task) = spawn_view(
            Arc::clone(&transport),
            historical,
            None,
            vec![IndicatorConfig::new("ma2", IndicatorKind::Ma, 2, "#FFFFFF")],
        );

        let context = Context::new(Source::Binance, "btcusdt", "1h").unwrap();
        handle.select(context.clone()).await.unwrap();

        server
            .frames
            .unbounded_send(Ok(binance_kline_frame("BTCUSDT", "1h", 300, 13.0)))
            .unwrap();
        server
            .frames
            .unbounded_send(Ok(binance_kline_frame("BTCUSDT", "1h", 400, 14.0)))
            .unwrap();

        let frame = wait_for_frame(&handle, |frame| {
            frame.phase == Phase::Ready && frame.candles.len() == 4
        })
        .await;

        assert_eq!(frame.context.as_ref(), Some(&context));
        assert_eq!(
            frame.candles.iter().map(|candle| candle.close).collect::<Vec<_>>(),
            vec![10.0, 11.0, 13.0, 14.0]
        );
        assert_eq!(
            frame.indicators["ma2"]
                .points
                .iter()
                .map(|point| (point.time, point.value))
                .collect::<Vec<_>>(),
            vec![(200, 10.5), (300, 12.0), (400, 13.5)]
        );
        assert_eq!(frame.volume.len(), 4);
        assert_eq!(frame.latest_price, Some(14.0));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_historical_result_is_discarded() {
        let transport = Arc::new(MockTransport::default());
        let _first = transport.add_session();
        let _second = transport.add_session();

        let historical = Arc::new(ScriptedHistoricalClient::default());
        let gate = historical.gated_route("BTCUSDT", binance_klines(&[(100, 50.0), (200, 51.0)]));
        historical.route("ETHUSDT", binance_klines(&[(100, 2.0), (200, 3.0), (300, 4.0)]));

        let (handle, task) = spawn_view(Arc::clone(&transport), historical, None, vec![]);

        let stale = Context::new(Source::Binance, "BTCUSDT", "1h").unwrap();
        let current = Context::new(Source::Binance, "ETHUSDT", "1h").unwrap();
        handle.select(stale).await.unwrap();
        handle.select(current.clone()).await.unwrap();

        // Connected for the current generation, so every earlier feed message was drained
        let frame = wait_for_frame(&handle, |frame| {
            frame.phase == Phase::Ready && frame.health == ConnectionHealth::Ok
        })
        .await;
        assert_eq!(frame.context.as_ref(), Some(&current));
        let discarded = frame.stale_discarded;

        // Release the superseded fetch
        gate.notify_one();

        let frame = wait_for_frame(&handle, |frame| frame.stale_discarded > discarded).await;
        assert_eq!(frame.context.as_ref(), Some(&current));
        assert_eq!(
            frame.candles.iter().map(|candle| candle.close).collect::<Vec<_>>(),
            vec![2.0, 3.0, 4.0]
        );

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_historical_failure_sets_error_health() {
        let transport = Arc::new(MockTransport::default());
        let server = transport.add_session();
        let historical = Arc::new(ScriptedHistoricalClient::default());

        let (handle, task) = spawn_view(
            Arc::clone(&transport),
            historical,
            None,
            vec![IndicatorConfig::new("ma2", IndicatorKind::Ma, 2, "#FFFFFF")],
        );
        handle
            .select(Context::new(Source::Binance, "DOGEUSDT", "1h").unwrap())
            .await
            .unwrap();

        let frame = wait_for_frame(&handle, |frame| frame.phase == Phase::Failed).await;
        assert_eq!(frame.health, ConnectionHealth::Error);
        assert!(frame.candles.is_empty());

        // Live bars after the failure never build a partial series. The ticker frame is sent
        // last, so once it shows up both klines have been handled.
        for (time, close) in [(400, 10.0), (500, 11.0)] {
            server
                .frames
                .unbounded_send(Ok(binance_kline_frame("DOGEUSDT", "1h", time, close)))
                .unwrap();
        }
        server
            .frames
            .unbounded_send(Ok(WsMessage::text(
                r#"{"e":"24hrTicker","E":1,"s":"DOGEUSDT","c":"11","P":"1.5","v":"10","q":"2"}"#
                    .to_string(),
            )))
            .unwrap();

        let frame = wait_for_frame(&handle, |frame| frame.ticker.is_some()).await;
        assert_eq!(frame.phase, Phase::Failed);
        assert_eq!(frame.health, ConnectionHealth::Error);
        assert!(frame.candles.is_empty());
        assert!(frame.volume.is_empty());
        assert!(frame.indicators["ma2"].points.is_empty());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_analysis_request_and_overlay() {
        let transport = Arc::new(MockTransport::default());
        let _server = transport.add_session();
        let historical = Arc::new(ScriptedHistoricalClient::default());
        historical.route("BTCUSDT", binance_klines(&[(100, 10.0), (200, 11.0)]));

        let document = serde_json::from_value::<AnnotationDocument>(serde_json::json!({
            "analisis_general": {
                "simbolo": "BTC/USDT",
                "temporalidad_principal_analisis": "1H"
            },
            "puntos_clave_grafico": [
                { "tipo": "poi_oferta", "nivel": 10.5, "label": "Supply" }
            ]
        }))
        .unwrap();
        let analyst: Arc<dyn AnalysisProvider> = Arc::new(StaticAnalyst(document));

        let (handle, task) =
            spawn_view(Arc::clone(&transport), historical, Some(analyst), vec![]);

        // Refused without a selected market
        handle.request_analysis().await.unwrap();
        let frame = wait_for_frame(&handle, |frame| {
            matches!(frame.analysis, AnalysisState::Failed(_))
        })
        .await;
        assert!(frame.overlay.is_empty());

        handle
            .select(Context::new(Source::Binance, "BTCUSDT", "1h").unwrap())
            .await
            .unwrap();
        wait_for_frame(&handle, |frame| frame.phase == Phase::Ready).await;

        handle.request_analysis().await.unwrap();
        let frame = wait_for_frame(&handle, |frame| frame.analysis == AnalysisState::Ready).await;
        assert!(frame.annotation.is_some());
        assert_eq!(frame.overlay.price_lines.len(), 1);
        assert_eq!(frame.overlay.price_lines[0].price, 10.5);

        // Drawings hidden by settings
        handle
            .set_overlay_settings(OverlaySettings {
                show_drawings: false,
                ..OverlaySettings::default()
            })
            .await
            .unwrap();
        let frame = wait_for_frame(&handle, |frame| !frame.overlay_settings.show_drawings).await;
        assert!(frame.overlay.is_empty());
        assert!(frame.annotation.is_some());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_analysis_result_is_discarded() {
        let analyst: Arc<dyn AnalysisProvider> = Arc::new(StaticAnalyst(btc_document()));
        let mut harness = Harness::new(Some(analyst));

        harness
            .view
            .select(Context::new(Source::Binance, "BTCUSDT", "1h").unwrap())
            .await;
        let first = harness.view.store.generation();
        assert!(harness.view.on_internal(Internal::Historical {
            generation: first,
            result: Ok(vec![bar(100, 10.0), bar(200, 11.0)]),
        }));

        harness.view.request_analysis();
        assert_eq!(harness.view.analysis, AnalysisState::Running);

        harness
            .view
            .select(Context::new(Source::Binance, "ETHUSDT", "1h").unwrap())
            .await;
        assert_eq!(harness.view.analysis, AnalysisState::Idle);

        // Deliver the analysis started under the first generation
        let analysis = loop {
            match harness.internal_rx.recv().await.unwrap() {
                internal @ Internal::Analysis { .. } => break internal,
                Internal::Historical { .. } => continue,
            }
        };
        assert!(matches!(
            &analysis,
            Internal::Analysis { generation, result: Ok(_) } if *generation == first
        ));

        assert!(harness.view.on_internal(analysis));
        harness.view.publish();

        let frame = harness.frame();
        assert_eq!(frame.stale_discarded, 1);
        assert!(frame.annotation.is_none());
        assert!(frame.overlay.is_empty());
        assert_eq!(frame.analysis, AnalysisState::Idle);

        harness.view.feed.stop().await;
    }

    #[tokio::test]
    async fn test_context_switch_clears_annotation_and_ticker() {
        let mut harness = Harness::new(None);

        harness
            .view
            .select(Context::new(Source::Binance, "BTCUSDT", "1h").unwrap())
            .await;
        let generation = harness.view.store.generation();
        assert!(harness.view.on_internal(Internal::Historical {
            generation,
            result: Ok(vec![bar(100, 10.0), bar(200, 11.0)]),
        }));
        assert!(
            harness
                .view
                .on_command(Command::SetAnnotation(Some(btc_document())))
                .await
        );
        assert!(harness.view.on_feed(FeedMessage {
            generation,
            event: FeedEvent::Ticker(ticker(11.5)),
        }));
        harness.view.publish();

        let frame = harness.frame();
        assert!(frame.annotation.is_some());
        assert_eq!(frame.overlay.price_lines.len(), 1);
        assert_eq!(frame.ticker, Some(ticker(11.5)));
        assert_eq!(frame.latest_price, Some(11.5));

        harness
            .view
            .select(Context::new(Source::BingX, "ETH-USDT", "1h").unwrap())
            .await;
        harness.view.publish();

        let frame = harness.frame();
        assert_eq!(frame.phase, Phase::Loading);
        assert!(frame.annotation.is_none());
        assert!(frame.overlay.is_empty());
        assert!(frame.ticker.is_none());
        assert!(frame.latest_price.is_none());
        assert!(frame.candles.is_empty());

        harness.view.feed.stop().await;
    }

    #[tokio::test]
    async fn test_stale_feed_message_is_dropped() {
        let mut harness = Harness::new(None);

        harness
            .view
            .select(Context::new(Source::Binance, "BTCUSDT", "1h").unwrap())
            .await;
        let stale = harness.view.store.generation();
        harness
            .view
            .select(Context::new(Source::Binance, "ETHUSDT", "1h").unwrap())
            .await;
        let current = harness.view.store.generation();

        for event in [
            FeedEvent::Candle(bar(300, 50.0)),
            FeedEvent::Ticker(ticker(50.0)),
            FeedEvent::State(FeedState::Connected),
        ] {
            harness.view.on_feed(FeedMessage {
                generation: stale,
                event,
            });
        }
        harness.view.publish();

        let frame = harness.frame();
        assert_eq!(frame.generation, current);
        assert_eq!(frame.stale_discarded, 3);
        assert!(frame.candles.is_empty());
        assert!(frame.ticker.is_none());
        assert_eq!(frame.health, ConnectionHealth::Connecting);

        // The current generation is still applied
        assert!(harness.view.on_feed(FeedMessage {
            generation: current,
            event: FeedEvent::Candle(bar(300, 2.0)),
        }));
        harness.view.publish();
        assert_eq!(harness.frame().candles.len(), 1);
        assert_eq!(harness.frame().stale_discarded, 3);

        harness.view.feed.stop().await;
    }
}
