//! Built-in fault kinds
//!
//! Each kind is a configuration that knows how to merge with other
//! requesters' configurations plus an effect that carries it into the
//! target through an [`ImagePatcher`]. Patchers do the actual work inside
//! the target and are supplied by the embedding daemon.

use std::fmt;
use std::sync::Arc;

use chaos_core::{ChaosError, Result};
use serde::{Deserialize, Serialize};

use super::traits::{EffectConfig, EffectTarget, ProcessEffect, Withdrawal};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Shift of the clocks selected by `clock_ids_mask`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTimeOffset")]
pub struct TimeOffset {
    pub sec: i64,
    /// Kept in `0..1_000_000_000` by `new`, deserialization and combining
    pub nsec: i64,
    /// Bit `n` selects clock id `n`
    pub clock_ids_mask: u64,
}

/// Wire form of [`TimeOffset`], normalized on the way in
#[derive(Deserialize)]
struct RawTimeOffset {
    #[serde(default)]
    sec: i64,
    #[serde(default)]
    nsec: i64,
    #[serde(default)]
    clock_ids_mask: u64,
}

impl From<RawTimeOffset> for TimeOffset {
    fn from(raw: RawTimeOffset) -> Self {
        TimeOffset::new(raw.sec, raw.nsec, raw.clock_ids_mask)
    }
}

impl TimeOffset {
    pub fn new(sec: i64, nsec: i64, clock_ids_mask: u64) -> Self {
        let mut offset = Self {
            sec,
            nsec,
            clock_ids_mask,
        };
        offset.normalize();
        offset
    }

    fn normalize(&mut self) {
        self.sec = self.sec.saturating_add(self.nsec.div_euclid(NANOS_PER_SEC));
        self.nsec = self.nsec.rem_euclid(NANOS_PER_SEC);
    }

    fn combine(&mut self, other: &Self) {
        // fields are public, so either side may arrive unnormalized
        self.normalize();
        let other = TimeOffset::new(other.sec, other.nsec, other.clock_ids_mask);
        self.sec = self.sec.saturating_add(other.sec);
        self.nsec += other.nsec;
        self.clock_ids_mask |= other.clock_ids_mask;
        self.normalize();
    }
}

/// Extra load run alongside the target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressLoad {
    pub cpu_workers: u32,
    /// Percentage per worker, 0..=100
    pub cpu_load: u8,
    pub memory_bytes: u64,
}

impl StressLoad {
    fn combine(&mut self, other: &Self) {
        self.cpu_workers = self.cpu_workers.saturating_add(other.cpu_workers);
        self.cpu_load = self.cpu_load.max(other.cpu_load);
        self.memory_bytes = self.memory_bytes.saturating_add(other.memory_bytes);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultConfig {
    TimeOffset(TimeOffset),
    Stress(StressLoad),
}

impl FaultConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            FaultConfig::TimeOffset(_) => "time_offset",
            FaultConfig::Stress(_) => "stress",
        }
    }
}

/// Performs the modification of one fault kind inside a target
pub trait ImagePatcher<T>: Send + Sync {
    fn apply(&self, target: EffectTarget, config: &T) -> Result<()>;

    fn revert(&self, target: EffectTarget) -> Result<()>;
}

/// Patcher for kinds the node cannot inject
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl<T> ImagePatcher<T> for Unsupported {
    fn apply(&self, _target: EffectTarget, _config: &T) -> Result<()> {
        Err(ChaosError::NotImplemented("inject"))
    }

    fn revert(&self, _target: EffectTarget) -> Result<()> {
        Err(ChaosError::NotImplemented("recover"))
    }
}

/// Live effect of one fault kind
pub struct ImageEffect<T> {
    applied: T,
    patcher: Arc<dyn ImagePatcher<T>>,
}

impl<T: Default> ImageEffect<T> {
    pub fn new(patcher: Arc<dyn ImagePatcher<T>>) -> Self {
        Self {
            applied: T::default(),
            patcher,
        }
    }
}

impl<T> ImageEffect<T> {
    /// Configuration used by the next injection
    pub fn applied(&self) -> &T {
        &self.applied
    }
}

impl<T: fmt::Debug> fmt::Debug for ImageEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageEffect")
            .field("applied", &self.applied)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> ProcessEffect for ImageEffect<T> {
    fn inject(&mut self, target: EffectTarget) -> Result<()> {
        self.patcher.apply(target, &self.applied)
    }

    fn recover(&mut self, target: EffectTarget) -> Result<()> {
        self.patcher.revert(target)
    }

    fn withdrawal(&self) -> Withdrawal {
        Withdrawal::Reapply
    }
}

#[derive(Debug)]
pub enum FaultEffect {
    TimeOffset(ImageEffect<TimeOffset>),
    Stress(ImageEffect<StressLoad>),
}

impl ProcessEffect for FaultEffect {
    fn inject(&mut self, target: EffectTarget) -> Result<()> {
        match self {
            FaultEffect::TimeOffset(effect) => effect.inject(target),
            FaultEffect::Stress(effect) => effect.inject(target),
        }
    }

    fn recover(&mut self, target: EffectTarget) -> Result<()> {
        match self {
            FaultEffect::TimeOffset(effect) => effect.recover(target),
            FaultEffect::Stress(effect) => effect.recover(target),
        }
    }

    fn withdrawal(&self) -> Withdrawal {
        match self {
            FaultEffect::TimeOffset(effect) => effect.withdrawal(),
            FaultEffect::Stress(effect) => effect.withdrawal(),
        }
    }
}

impl EffectConfig for FaultConfig {
    type Effect = FaultEffect;

    fn combine(&mut self, other: &Self) -> Result<()> {
        match (self, other) {
            (FaultConfig::TimeOffset(mine), FaultConfig::TimeOffset(theirs)) => {
                mine.combine(theirs);
                Ok(())
            }
            (FaultConfig::Stress(mine), FaultConfig::Stress(theirs)) => {
                mine.combine(theirs);
                Ok(())
            }
            (mine, theirs) => Err(ChaosError::CanNotAdd(format!(
                "{} with {}",
                mine.kind(),
                theirs.kind()
            ))),
        }
    }

    fn assign(&self, effect: &mut FaultEffect) -> Result<()> {
        match (self, effect) {
            (FaultConfig::TimeOffset(config), FaultEffect::TimeOffset(effect)) => {
                effect.applied = *config;
                Ok(())
            }
            (FaultConfig::Stress(config), FaultEffect::Stress(effect)) => {
                effect.applied = *config;
                Ok(())
            }
            (config, _) => Err(ChaosError::CanNotAssign(format!(
                "{} to an effect of another kind",
                config.kind()
            ))),
        }
    }
}

/// Patchers the node provides for each fault kind
#[derive(Clone)]
pub struct Patchers {
    pub time: Arc<dyn ImagePatcher<TimeOffset>>,
    pub stress: Arc<dyn ImagePatcher<StressLoad>>,
}

impl Patchers {
    /// Every kind reports `NotImplemented`
    pub fn unsupported() -> Self {
        Self {
            time: Arc::new(Unsupported),
            stress: Arc::new(Unsupported),
        }
    }

    /// Fresh effect able to carry `config`
    pub fn effect_for(&self, config: &FaultConfig) -> FaultEffect {
        match config {
            FaultConfig::TimeOffset(_) => {
                FaultEffect::TimeOffset(ImageEffect::new(Arc::clone(&self.time)))
            }
            FaultConfig::Stress(_) => FaultEffect::Stress(ImageEffect::new(Arc::clone(&self.stress))),
        }
    }
}

impl Default for Patchers {
    fn default() -> Self {
        Self::unsupported()
    }
}

impl fmt::Debug for Patchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patchers").finish_non_exhaustive()
    }
}
