//! Persisted user preferences stored as JSON blobs in a [`KeyValueStore`].

use crate::{
    error::DataError,
    exchange::Source,
    indicator::IndicatorConfig,
    overlay::{
        OverlaySettings,
        palette::{DEFAULT_SIGNAL_COLOR, Theme},
    },
    subscription::Context,
};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use smol_str::SmolStr;
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

pub const KEY_SOURCE: &str = "traderoad_dataSource";
pub const KEY_SYMBOL: &str = "traderoad_actualSymbol";
pub const KEY_TIMEFRAME: &str = "traderoad_timeframe";
pub const KEY_MOVING_AVERAGES: &str = "traderoad_movingAverages";
pub const KEY_SHOW_DRAWINGS: &str = "traderoad_showAiAnalysisDrawings";
pub const KEY_SIGNAL_COLOR: &str = "traderoad_wSignalColor";
pub const KEY_SIGNAL_OPACITY: &str = "traderoad_wSignalOpacity";
pub const KEY_SHOW_SIGNALS: &str = "traderoad_showWSignals";
pub const KEY_THEME: &str = "traderoad_theme";

pub const DEFAULT_SYMBOL: &str = "ETHUSDT";
pub const DEFAULT_TIMEFRAME: &str = "1h";

/// Default W-signal opacity, in percent.
pub const DEFAULT_SIGNAL_OPACITY: u8 = 70;

/// String key to JSON text store.
pub trait KeyValueStore: Debug + Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, DataError>;

    fn set(&self, key: &str, value: String) -> Result<(), DataError>;

    /// Store several entries at once.
    fn set_many(&self, entries: Vec<(&str, String)>) -> Result<(), DataError> {
        entries
            .into_iter()
            .try_for_each(|(key, value)| self.set(key, value))
    }
}

/// Volatile [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<FnvHashMap<SmolStr, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, DataError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), DataError> {
        self.entries.lock().insert(SmolStr::new(key), value);
        Ok(())
    }

    fn set_many(&self, entries: Vec<(&str, String)>) -> Result<(), DataError> {
        self.entries
            .lock()
            .extend(entries.into_iter().map(|(key, value)| (SmolStr::new(key), value)));
        Ok(())
    }
}

/// [`KeyValueStore`] persisting every entry in a single JSON object file.
///
/// A missing file is an empty store. Writes replace the file through a temporary sibling, and a
/// corrupt file is overwritten by the next write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn contents(&self) -> Result<Option<String>, DataError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(self.error("read", error)),
        }
    }

    fn read(&self) -> Result<FnvHashMap<SmolStr, String>, DataError> {
        match self.contents()? {
            Some(contents) => {
                serde_json::from_str(&contents).map_err(|error| self.error("parse", error))
            }
            None => Ok(FnvHashMap::default()),
        }
    }

    /// Entries to extend on write. A corrupt file is replaced rather than blocking every save.
    fn read_for_update(&self) -> Result<FnvHashMap<SmolStr, String>, DataError> {
        let Some(contents) = self.contents()? else {
            return Ok(FnvHashMap::default());
        };

        Ok(serde_json::from_str(&contents).unwrap_or_else(|error| {
            warn!(path = %self.path.display(), %error, "discarding corrupt preferences file");
            FnvHashMap::default()
        }))
    }

    fn write(&self, entries: &FnvHashMap<SmolStr, String>) -> Result<(), DataError> {
        let contents =
            serde_json::to_string_pretty(entries).map_err(|error| self.error("serialise", error))?;

        let temporary = self.path.with_extension("tmp");
        std::fs::write(&temporary, contents).map_err(|error| self.error("write", error))?;
        std::fs::rename(&temporary, &self.path).map_err(|error| self.error("replace", error))
    }

    fn error(&self, action: &str, error: impl std::fmt::Display) -> DataError {
        DataError::Preferences(format!("failed to {action} {}: {error}", self.path.display()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, DataError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<(), DataError> {
        self.set_many(vec![(key, value)])
    }

    fn set_many(&self, updates: Vec<(&str, String)>) -> Result<(), DataError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_for_update()?;
        entries.extend(updates.into_iter().map(|(key, value)| (SmolStr::new(key), value)));
        self.write(&entries)
    }
}

/// User preferences restored on start-up.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Preferences {
    pub source: Source,
    pub symbol: SmolStr,
    pub timeframe: SmolStr,
    pub indicators: Vec<IndicatorConfig>,
    pub show_drawings: bool,
    pub signal_color: SmolStr,
    /// W-signal opacity in percent (`0..=100`).
    pub signal_opacity: u8,
    pub show_signals: bool,
    pub theme: Theme,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            source: Source::Binance,
            symbol: SmolStr::new_static(DEFAULT_SYMBOL),
            timeframe: SmolStr::new_static(DEFAULT_TIMEFRAME),
            indicators: IndicatorConfig::defaults(),
            show_drawings: true,
            signal_color: SmolStr::new_static(DEFAULT_SIGNAL_COLOR),
            signal_opacity: DEFAULT_SIGNAL_OPACITY,
            show_signals: true,
            theme: Theme::Dark,
        }
    }
}

impl Preferences {
    /// Load preferences, falling back to the default for every key that is missing, unreadable
    /// or unparsable.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let defaults = Self::default();

        Self {
            source: load_key(store, KEY_SOURCE, defaults.source),
            symbol: load_key(store, KEY_SYMBOL, defaults.symbol),
            timeframe: load_key(store, KEY_TIMEFRAME, defaults.timeframe),
            indicators: load_key(store, KEY_MOVING_AVERAGES, defaults.indicators),
            show_drawings: load_key(store, KEY_SHOW_DRAWINGS, defaults.show_drawings),
            signal_color: load_key(store, KEY_SIGNAL_COLOR, defaults.signal_color),
            signal_opacity: load_key(store, KEY_SIGNAL_OPACITY, defaults.signal_opacity),
            show_signals: load_key(store, KEY_SHOW_SIGNALS, defaults.show_signals),
            theme: load_key(store, KEY_THEME, defaults.theme),
        }
    }

    /// Persist every key in a single store write.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), DataError> {
        store.set_many(vec![
            (KEY_SOURCE, serde_json::to_string(&self.source)?),
            (KEY_SYMBOL, serde_json::to_string(&self.symbol)?),
            (KEY_TIMEFRAME, serde_json::to_string(&self.timeframe)?),
            (KEY_MOVING_AVERAGES, serde_json::to_string(&self.indicators)?),
            (KEY_SHOW_DRAWINGS, serde_json::to_string(&self.show_drawings)?),
            (KEY_SIGNAL_COLOR, serde_json::to_string(&self.signal_color)?),
            (KEY_SIGNAL_OPACITY, serde_json::to_string(&self.signal_opacity)?),
            (KEY_SHOW_SIGNALS, serde_json::to_string(&self.show_signals)?),
            (KEY_THEME, serde_json::to_string(&self.theme)?),
        ])
    }

    /// Active [`Context`] described by these preferences, with the symbol converted to the
    /// source's convention.
    pub fn context(&self) -> Result<Context, DataError> {
        Context::new(self.source, &self.symbol, &self.timeframe)
    }

    pub fn set_context(&mut self, context: &Context) {
        self.source = context.source;
        self.symbol = context.symbol.clone();
        self.timeframe = SmolStr::new(context.timeframe.as_str());
    }

    pub fn overlay_settings(&self) -> OverlaySettings {
        OverlaySettings {
            show_drawings: self.show_drawings,
            show_signals: self.show_signals,
            signal_color: self.signal_color.clone(),
            signal_opacity: f64::from(self.signal_opacity.min(100)) / 100.0,
            theme: self.theme,
        }
    }

    pub fn set_overlay_settings(&mut self, settings: &OverlaySettings) {
        self.show_drawings = settings.show_drawings;
        self.show_signals = settings.show_signals;
        self.signal_color = settings.signal_color.clone();
        self.signal_opacity = (settings.signal_opacity.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.theme = settings.theme;
    }
}

fn load_key<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str, default: T) -> T {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return default,
        Err(error) => {
            warn!(key, %error, "failed to read preference, using default");
            return default;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(error) => {
            warn!(key, %error, "failed to parse preference, using default");
            debug!(key, raw = %raw, "unparsable preference");
            default
        }
    }
}
