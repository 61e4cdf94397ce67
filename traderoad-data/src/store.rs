//! Ordered candle series for the active [`Context`], guarded by a [`Generation`] counter so
//! results started under a superseded context can never be applied.

use crate::{
    error::DataError,
    subscription::{Context, candle::Candle},
};
use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counter identifying one activation of a [`Context`]. Bumped on every reset.
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
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Lifecycle of the series for the active [`Context`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Empty,
    Loading,
    Ready,
    Failed,
}

/// Health of the data feeding the active [`Context`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionHealth {
    #[default]
    #[display("connecting")]
    Connecting,
    #[display("ok")]
    Ok,
    #[display("error")]
    Error,
}

/// Result of applying a live candle.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum UpdateOutcome {
    /// Newer bar appended to the series.
    Appended,
    /// Current bar replaced in place.
    Replaced,
    /// Bar older than the current bar, discarded.
    Late,
    /// Bar failed validation, discarded.
    Invalid,
    /// Historical fetch failed for this generation, live bars are not kept.
    Discarded,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Appended | UpdateOutcome::Replaced)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SeriesStore {
    context: Option<Context>,
    generation: Generation,
    phase: Phase,
    health: ConnectionHealth,
    candles: Vec<Candle>,
    dropped: u64,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a new [`Context`], discarding the current series, and return the new
    /// [`Generation`] every result for it must carry.
    pub fn reset(&mut self, context: Context) -> Generation {
        self.generation = self.generation.next();
        self.context = Some(context);
        self.phase = Phase::Loading;
        self.health = ConnectionHealth::Connecting;
        self.candles.clear();
        self.dropped = 0;
        self.generation
    }

    /// Install the historical sequence for the current [`Generation`].
    ///
    /// Candles are sorted and deduplicated by time (later value wins), invalid candles are
    /// dropped and counted, and live updates applied while loading are merged on top.
    /// Returns the resulting series length.
    pub fn seed(&mut self, generation: Generation, candles: Vec<Candle>) -> Result<usize, DataError> {
        self.ensure_current(generation)?;

        let live = std::mem::take(&mut self.candles);
        let total = candles.len();

        let (valid, invalid): (Vec<Candle>, Vec<Candle>) =
            candles.into_iter().partition(Candle::is_valid);
        if !invalid.is_empty() {
            warn!(
                context = ?self.context,
                invalid = invalid.len(),
                total,
                "dropped invalid historical candles"
            );
            self.dropped += invalid.len() as u64;
        }

        // Stable sort keeps arrival order for equal times, so the later value survives dedup
        self.candles = valid
            .into_iter()
            .chain(live)
            .sorted_by_key(|candle| candle.time)
            .rev()
            .dedup_by(|newer, older| newer.time == older.time)
            .collect_vec();
        self.candles.reverse();

        self.phase = Phase::Ready;
        Ok(self.candles.len())
    }

    /// Apply a live candle for the current [`Generation`].
    pub fn apply_update(
        &mut self,
        generation: Generation,
        candle: Candle,
    ) -> Result<UpdateOutcome, DataError> {
        self.ensure_current(generation)?;

        if self.phase == Phase::Failed {
            debug!(context = ?self.context, time = candle.time, "ignored live candle, no history");
            return Ok(UpdateOutcome::Discarded);
        }

        if !candle.is_valid() {
            debug!(context = ?self.context, ?candle, "dropped invalid live candle");
            self.dropped += 1;
            return Ok(UpdateOutcome::Invalid);
        }

        let outcome = match self.candles.last_mut() {
            Some(last) if candle.time == last.time => {
                *last = candle;
                UpdateOutcome::Replaced
            }
            Some(last) if candle.time < last.time => {
                debug!(
                    context = ?self.context,
                    time = candle.time,
                    last = last.time,
                    "dropped late live candle"
                );
                self.dropped += 1;
                UpdateOutcome::Late
            }
            _ => {
                self.candles.push(candle);
                UpdateOutcome::Appended
            }
        };

        Ok(outcome)
    }

    /// Mark the historical fetch for the current [`Generation`] as failed.
    pub fn fail(&mut self, generation: Generation) -> Result<(), DataError> {
        self.ensure_current(generation)?;
        self.candles.clear();
        self.phase = Phase::Failed;
        self.health = ConnectionHealth::Error;
        Ok(())
    }

    pub fn set_health(&mut self, generation: Generation, health: ConnectionHealth) -> Result<(), DataError> {
        self.ensure_current(generation)?;
        self.health = health;
        Ok(())
    }

    /// Immutable ordered copy of the series.
    pub fn snapshot(&self) -> Arc<[Candle]> {
        Arc::from(self.candles.as_slice())
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health
    }

    /// Number of invalid or late candles discarded for the current [`Generation`].
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn ensure_current(&self, generation: Generation) -> Result<(), DataError> {
        if generation == self.generation && self.context.is_some() {
            Ok(())
        } else {
            Err(DataError::StaleContext {
                stale: generation,
                current: self.generation,
            })
        }
    }
}
