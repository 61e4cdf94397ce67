#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # TradeRoad-Data
//! Normalised futures market data for the TradeRoad dashboard.
//!
//! * Historical candles and live kline/ticker streams from Binance and BingX behind one
//!   [`Provider`](exchange::Provider) trait, selected by the [`Source`](exchange::Source) tag.
//! * A [`SeriesStore`](store::SeriesStore) reconciling historical and live candles for the
//!   active [`Context`](subscription::Context), guarded by a [`Generation`](store::Generation)
//!   counter so results from a superseded context are never applied.
//! * Moving average [`indicator`]s and an [`overlay`] mapper turning analysis documents into
//!   chart primitives.
//! * A single-writer [`MarketView`](pipeline::MarketView) actor publishing
//!   [`RenderFrame`](pipeline::RenderFrame)s on a `watch` channel.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use traderoad_data::{
//!     exchange::Source,
//!     pipeline::{MarketView, MarketViewConfig},
//!     streams::{historical::HttpClient, transport::TungsteniteTransport},
//!     subscription::Context,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let (view, _task) = MarketView::spawn(
//!         Arc::new(TungsteniteTransport),
//!         Arc::new(HttpClient::default()),
//!         None,
//!         MarketViewConfig::default(),
//!     );
//!
//!     let context = Context::new(Source::Binance, "btcusdt", "1h").unwrap();
//!     view.select(context).await.unwrap();
//!
//!     let mut frames = view.subscribe();
//!     while frames.changed().await.is_ok() {
//!         let frame = frames.borrow_and_update().clone();
//!         println!("{:?} candles: {}", frame.health, frame.candles.len());
//!     }
//! }
//! ```

/// Analysis provider boundary and response parsing.
pub mod analysis;

/// Serde helpers for lenient and string-encoded numeric fields.
pub mod de;

/// Trailing-edge [`Debouncer`](debounce::Debouncer) for rapidly changing input.
pub mod debounce;

/// All [`Error`](std::error::Error)s generated in TradeRoad-Data.
pub mod error;

/// [`Provider`](exchange::Provider) implementations for each supported exchange.
pub mod exchange;

/// Moving average and volume series.
pub mod indicator;

/// Symbol and timeframe conversion between user input and exchange conventions.
pub mod normalise;

/// Annotation document model and chart overlay mapping.
pub mod overlay;

/// `MarketView` actor tying the store, live feed, indicators and overlays together.
pub mod pipeline;

/// Persisted user preferences.
pub mod preferences;

/// Generation guarded candle series for the active context.
pub mod store;

/// Historical fetch and live stream plumbing.
pub mod streams;

/// Candle, ticker and context data model.
pub mod subscription;
