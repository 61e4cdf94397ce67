use crate::{client::handle_client, config::ServerConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use traderoad_data::{
    analysis::{AnalysisProvider, HttpAnalysisProvider},
    pipeline::{MarketView, MarketViewConfig, MarketViewHandle},
    preferences::{FileStore, KeyValueStore, Preferences},
    streams::{historical::HttpClient, transport::TungsteniteTransport},
};

/// Browser client protocol and connection handling.
mod client;

/// Environment driven [`ServerConfig`].
mod config;

/// State shared by every client connection.
#[derive(Debug)]
pub struct AppState {
    pub view: MarketViewHandle,
    pub preferences: Mutex<Preferences>,
    pub store: Box<dyn KeyValueStore>,
}

impl AppState {
    /// Apply a change to the shared [`Preferences`] and persist them.
    pub fn update_preferences(&self, update: impl FnOnce(&mut Preferences)) {
        let mut preferences = self.preferences.lock();
        update(&mut preferences);

        if let Err(error) = preferences.save(self.store.as_ref()) {
            warn!(%error, "failed to persist preferences");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env();

    // Initialize logging
    init_logging(config.json_logs);

    info!(?config, "Starting TradeRoad WebSocket server");

    let store = FileStore::new(&config.prefs_path);
    let preferences = Preferences::load(&store);
    info!(path = %store.path().display(), ?preferences, "loaded preferences");

    let analyst = config.analysis_url.clone().map(|url| {
        info!(%url, "analysis provider configured");
        Arc::new(HttpAnalysisProvider::new(reqwest::Client::new(), url)) as Arc<dyn AnalysisProvider>
    });

    let (view, view_task) = MarketView::spawn(
        Arc::new(TungsteniteTransport),
        Arc::new(HttpClient::default()),
        analyst,
        MarketViewConfig {
            feed: config.feed.clone(),
            indicators: preferences.indicators.clone(),
            overlay_settings: preferences.overlay_settings(),
        },
    );

    match preferences.context() {
        Ok(context) => {
            if let Err(error) = view.select(context).await {
                error!(%error, "failed to select initial context");
            }
        }
        Err(error) => warn!(%error, "stored context is invalid, waiting for a client selection"),
    }

    let state = Arc::new(AppState {
        view: view.clone(),
        preferences: Mutex::new(preferences),
        store: Box::new(store),
    });

    let listener = match TcpListener::bind(config.ws_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(addr = %config.ws_addr, %error, "failed to bind WebSocket server");
            return;
        }
    };

    info!("WebSocket server listening on ws://{}", config.ws_addr);

    tokio::select! {
        _ = accept_clients(listener, state) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                error!(%error, "failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
    }

    if view.shutdown().await.is_ok() {
        if let Err(error) = view_task.await {
            error!(?error, "MarketView task failed");
        }
    }

    info!("TradeRoad WebSocket server stopped");
}

/// Accept WebSocket clients until the listener fails.
async fn accept_clients(listener: TcpListener, state: Arc<AppState>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!(%peer_addr, "New WebSocket connection");
                tokio::spawn(handle_client(stream, peer_addr, Arc::clone(&state)));
            }
            Err(error) => {
                error!(%error, "failed to accept WebSocket connection");
                break;
            }
        }
    }
}

/// Initialize logging, as JSON when requested
fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(cfg!(debug_assertions))
            .init();
    }
}
