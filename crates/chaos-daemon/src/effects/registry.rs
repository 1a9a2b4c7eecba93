//! Merged per-target effect state shared by concurrent requesters
//!
//! Every target process carries at most one live effect. Requesters add
//! and withdraw contributions; the registry keeps the injected
//! configuration equal to the fold of all contributions still active, and
//! drops the target entirely once the last one is withdrawn.

use std::collections::BTreeMap;
use std::sync::Arc;

use chaos_core::{ChaosError, Missing, Result};
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use super::traits::{EffectConfig, EffectTarget, ProcessEffect, Withdrawal};

struct MergedState<C: EffectConfig> {
    contributions: BTreeMap<String, C>,
    merged: C,
    effect: C::Effect,
}

impl<C: EffectConfig> MergedState<C> {
    /// Inject the fold of `contributions` and adopt them on success.
    /// On failure the previous merged configuration is assigned back.
    fn readmit(&mut self, target: EffectTarget, contributions: BTreeMap<String, C>) -> Result<()> {
        if let Some(merged) = fold(contributions.values())? {
            let injected = merged
                .assign(&mut self.effect)
                .and_then(|()| self.effect.inject(target));
            if let Err(e) = injected {
                if let Err(restore) = self.merged.assign(&mut self.effect) {
                    warn!(
                        "Failed to restore previous configuration on target {}: {}",
                        target, restore
                    );
                }
                return Err(e);
            }
            self.merged = merged;
        }
        self.contributions = contributions;
        Ok(())
    }
}

struct Slot<C: EffectConfig> {
    /// Set once the slot has been torn down and unlinked from the table
    retired: bool,
    state: Option<MergedState<C>>,
}

impl<C: EffectConfig> Default for Slot<C> {
    fn default() -> Self {
        Self {
            retired: false,
            state: None,
        }
    }
}

type SlotGuard<C> = ArcMutexGuard<RawMutex, Slot<C>>;

/// Per-target registry of merged effects.
///
/// Operations on one target are serialized; different targets proceed in
/// parallel.
pub struct EffectRegistry<C: EffectConfig> {
    slots: DashMap<EffectTarget, Arc<Mutex<Slot<C>>>>,
}

impl<C: EffectConfig> Default for EffectRegistry<C> {
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

impl<C: EffectConfig> EffectRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the first or a further contribution to `target`.
    ///
    /// An uninjected target gets a fresh effect from `factory`. Nothing is
    /// recorded when injection fails.
    pub fn create<F>(&self, request_id: &str, target: EffectTarget, config: C, factory: F) -> Result<()>
    where
        F: FnOnce() -> C::Effect,
    {
        let mut guard = self.lock_slot(target);
        let slot: &mut Slot<C> = &mut guard;

        let result = match slot.state.as_mut() {
            Some(state) => {
                if state.contributions.contains_key(request_id) {
                    Err(ChaosError::DuplicateEntity(request_id.to_string()))
                } else {
                    let mut contributions = state.contributions.clone();
                    contributions.insert(request_id.to_string(), config);
                    state.readmit(target, contributions)
                }
            }
            None => start(slot, request_id, target, config, factory),
        };

        match &result {
            Ok(()) => info!("Injected {} into target {}", request_id, target),
            Err(e) => debug!("Create {} on target {} failed: {}", request_id, target, e),
        }

        self.release(target, guard);
        result
    }

    /// Add a contribution to an already injected target
    pub fn apply(&self, request_id: &str, target: EffectTarget, config: C) -> Result<()> {
        self.with_state(target, |state| {
            if state.contributions.contains_key(request_id) {
                return Err(ChaosError::DuplicateEntity(request_id.to_string()));
            }
            let mut contributions = state.contributions.clone();
            contributions.insert(request_id.to_string(), config);
            state.readmit(target, contributions)?;
            info!("Applied {} to target {}", request_id, target);
            Ok(())
        })
    }

    /// Replace the configuration of an active contribution
    pub fn update(&self, request_id: &str, target: EffectTarget, config: C) -> Result<()> {
        self.with_state(target, |state| {
            if !state.contributions.contains_key(request_id) {
                return Err(ChaosError::NotFound(Missing::Uid));
            }
            let mut contributions = state.contributions.clone();
            contributions.insert(request_id.to_string(), config);
            state.readmit(target, contributions)?;
            info!("Updated {} on target {}", request_id, target);
            Ok(())
        })
    }

    /// Withdraw a contribution.
    ///
    /// The contribution stays active when the effect fails to recover, so a
    /// retry attempts the same reversal.
    pub fn recover(&self, request_id: &str, target: EffectTarget) -> Result<()> {
        self.with_state(target, |state| {
            if !state.contributions.contains_key(request_id) {
                return Err(ChaosError::NotFound(Missing::Uid));
            }

            state.effect.recover(target)?;
            state.contributions.remove(request_id);
            info!("Recovered {} from target {}", request_id, target);

            let Some(merged) = fold(state.contributions.values())? else {
                return Ok(());
            };
            state.merged = merged;

            match state.effect.withdrawal() {
                Withdrawal::Reapply => {
                    debug!(
                        "Reinjecting {} remaining contribution(s) into target {}",
                        state.contributions.len(),
                        target
                    );
                    state
                        .merged
                        .assign(&mut state.effect)
                        .and_then(|()| state.effect.inject(target))
                }
                Withdrawal::Keep => Ok(()),
            }
        })
    }

    /// Target and configuration of the contribution `request_id`
    pub fn get_with_uid(&self, request_id: &str) -> Result<(EffectTarget, C)> {
        let mut slots: Vec<_> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        slots.sort_by_key(|(target, _)| *target);

        for (target, slot) in slots {
            let slot = slot.lock();
            if let Some(config) = slot
                .state
                .as_ref()
                .and_then(|state| state.contributions.get(request_id))
            {
                return Ok((target, config.clone()));
            }
        }

        Err(ChaosError::NotFound(Missing::Uid))
    }

    /// Merged configuration currently injected into `target`
    pub fn get_with_pid(&self, target: EffectTarget) -> Result<C> {
        self.read_state(target, |state| state.merged.clone())
    }

    /// Run `f` on the live effect of `target`
    pub fn with_effect<T>(&self, target: EffectTarget, f: impl FnOnce(&mut C::Effect) -> T) -> Result<T> {
        self.with_state(target, |state| Ok(f(&mut state.effect)))
    }

    /// Active contributions of `target`, ordered by request id
    pub fn contributions(&self, target: EffectTarget) -> Vec<(String, C)> {
        self.read_state(target, |state| {
            state
                .contributions
                .iter()
                .map(|(id, config)| (id.clone(), config.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Injected targets in ascending order
    pub fn targets(&self) -> Vec<EffectTarget> {
        let slots: Vec<_> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut targets: Vec<_> = slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().state.is_some())
            .map(|(target, _)| target)
            .collect();
        targets.sort_unstable();
        targets
    }

    /// Lock the live slot of `target`, creating it when absent
    fn lock_slot(&self, target: EffectTarget) -> SlotGuard<C> {
        loop {
            let slot = Arc::clone(
                self.slots
                    .entry(target)
                    .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
                    .value(),
            );
            let guard = slot.lock_arc();
            if !guard.retired {
                return guard;
            }
        }
    }

    /// Lock the live slot of `target` if there is one
    fn existing_slot(&self, target: EffectTarget) -> Option<SlotGuard<C>> {
        loop {
            let slot = self.slots.get(&target).map(|entry| Arc::clone(entry.value()))?;
            let guard = slot.lock_arc();
            if !guard.retired {
                return Some(guard);
            }
        }
    }

    fn with_state<T>(
        &self,
        target: EffectTarget,
        f: impl FnOnce(&mut MergedState<C>) -> Result<T>,
    ) -> Result<T> {
        let Some(mut guard) = self.existing_slot(target) else {
            return Err(ChaosError::NotFound(Missing::Pid));
        };
        let result = match guard.state.as_mut() {
            Some(state) => f(state),
            None => Err(ChaosError::NotFound(Missing::Pid)),
        };
        self.release(target, guard);
        result
    }

    fn read_state<T>(&self, target: EffectTarget, f: impl FnOnce(&MergedState<C>) -> T) -> Result<T> {
        self.existing_slot(target)
            .and_then(|guard| guard.state.as_ref().map(f))
            .ok_or(ChaosError::NotFound(Missing::Pid))
    }

    /// Unlock a slot, tearing it down when no contribution is left
    fn release(&self, target: EffectTarget, mut guard: SlotGuard<C>) {
        if guard
            .state
            .as_ref()
            .is_some_and(|state| state.contributions.is_empty())
        {
            guard.state = None;
        }

        if guard.state.is_none() {
            guard.retired = true;
            let slot = Arc::clone(ArcMutexGuard::mutex(&guard));
            if self
                .slots
                .remove_if(&target, |_, current| Arc::ptr_eq(current, &slot))
                .is_some()
            {
                debug!("Target {} has no effect left", target);
            }
        }
    }
}

fn start<C, F>(
    slot: &mut Slot<C>,
    request_id: &str,
    target: EffectTarget,
    config: C,
    factory: F,
) -> Result<()>
where
    C: EffectConfig,
    F: FnOnce() -> C::Effect,
{
    let mut effect = factory();
    config.assign(&mut effect)?;
    effect.inject(target)?;

    slot.state = Some(MergedState {
        contributions: BTreeMap::from([(request_id.to_string(), config.clone())]),
        merged: config,
        effect,
    });
    Ok(())
}

fn fold<'a, C: EffectConfig>(mut configs: impl Iterator<Item = &'a C>) -> Result<Option<C>> {
    let Some(first) = configs.next() else {
        return Ok(None);
    };
    let mut merged = first.clone();
    for config in configs {
        merged.combine(config)?;
    }
    Ok(Some(merged))
}
