use chrono::{DateTime, Local};
use std::sync::Arc;
use traderoad_data::{
    exchange::Source,
    indicator::IndicatorConfig,
    pipeline::{MarketView, MarketViewConfig},
    streams::{historical::HttpClient, transport::TungsteniteTransport},
    subscription::Context,
};
use tracing::warn;

#[tokio::main]
async fn main() {
    // Initialise INFO Tracing log subscriber
    init_logging();

    // eg/ cargo run --example live_candles -- bingx btcusdt 15m
    let mut args = std::env::args().skip(1);
    let source = args
        .next()
        .and_then(|name| Source::from_name(&name))
        .unwrap_or_default();
    let symbol = args.next().unwrap_or_else(|| "btcusdt".to_string());
    let timeframe = args.next().unwrap_or_else(|| "1m".to_string());

    let context = match Context::new(source, &symbol, &timeframe) {
        Ok(context) => context,
        Err(error) => {
            eprintln!("Invalid market: {error}");
            return;
        }
    };

    let (view, task) = MarketView::spawn(
        Arc::new(TungsteniteTransport),
        Arc::new(HttpClient::default()),
        None,
        MarketViewConfig {
            indicators: IndicatorConfig::defaults(),
            ..MarketViewConfig::default()
        },
    );

    println!("Streaming {} {}", context.display_symbol(), context.timeframe.label());
    if let Err(error) = view.select(context).await {
        warn!(%error, "MarketView rejected selection");
        return;
    }

    let mut frames = view.subscribe();
    while frames.changed().await.is_ok() {
        let frame = Arc::clone(&frames.borrow_and_update());

        let Some(last) = frame.candles.last() else {
            continue;
        };

        let opened = DateTime::from_timestamp(last.time, 0)
            .map(|time| time.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_default();

        let indicators = frame
            .indicators
            .iter()
            .filter_map(|(id, line)| {
                line.points
                    .last()
                    .map(|point| format!("{id}={:.2}", point.value))
            })
            .collect::<Vec<_>>()
            .join(" ");

        println!(
            "[{}] {:>5} bars | {} o={} h={} l={} c={} v={:.3} | {}",
            frame.health,
            frame.candles.len(),
            opened,
            last.open,
            last.high,
            last.low,
            last.close,
            last.volume_or_zero(),
            indicators,
        );
    }

    let _ = task.await;
}

fn init_logging() {
    tracing_subscriber::fmt()
        // Filter messages based on the INFO level
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        // Use colored output in debug mode
        .with_ansi(cfg!(debug_assertions))
        // Install this Tracing subscriber as global default
        .init()
}
