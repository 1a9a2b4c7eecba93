//! Request-level entry points for the built-in fault kinds

use chaos_core::{ErrorKind, Result};
use log::info;

use super::fault::{FaultConfig, Patchers};
use super::registry::EffectRegistry;
use super::traits::EffectTarget;

/// Turns inject/recover requests into registry operations.
///
/// Requests are retried by their senders, so both directions are
/// idempotent: injecting an already active request and recovering one that
/// is already gone both succeed.
#[derive(Default)]
pub struct FaultHandler {
    registry: EffectRegistry<FaultConfig>,
    patchers: Patchers,
}

impl FaultHandler {
    pub fn new(patchers: Patchers) -> Self {
        Self {
            registry: EffectRegistry::new(),
            patchers,
        }
    }

    pub fn registry(&self) -> &EffectRegistry<FaultConfig> {
        &self.registry
    }

    pub fn inject(&self, request_id: &str, target: EffectTarget, config: FaultConfig) -> Result<()> {
        let patchers = &self.patchers;
        let factory_config = config.clone();
        match self
            .registry
            .create(request_id, target, config.clone(), || patchers.effect_for(&factory_config))
        {
            Err(e) if e.kind() == ErrorKind::DuplicateEntity => {}
            other => return other,
        }

        match self.registry.apply(request_id, target, config) {
            Err(e) if e.kind() == ErrorKind::DuplicateEntity => {
                info!("{} is already active on target {}", request_id, target);
                Ok(())
            }
            other => other,
        }
    }

    pub fn recover(&self, request_id: &str, target: EffectTarget) -> Result<()> {
        match self.registry.recover(request_id, target) {
            Err(e) if e.is_not_found() => {
                info!("{} is not active on target {}: {}", request_id, target, e);
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::fault::{ImagePatcher, StressLoad, TimeOffset};
    use chaos_core::{ChaosError, Missing};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recording {
        applied: Mutex<Vec<(EffectTarget, TimeOffset)>>,
        reverted: Mutex<Vec<EffectTarget>>,
    }

    impl ImagePatcher<TimeOffset> for Recording {
        fn apply(&self, target: EffectTarget, config: &TimeOffset) -> Result<()> {
            self.applied.lock().push((target, *config));
            Ok(())
        }

        fn revert(&self, target: EffectTarget) -> Result<()> {
            self.reverted.lock().push(target);
            Ok(())
        }
    }

    fn handler() -> (FaultHandler, Arc<Recording>) {
        let recording = Arc::new(Recording::default());
        let patchers = Patchers {
            time: recording.clone(),
            ..Patchers::unsupported()
        };
        (FaultHandler::new(patchers), recording)
    }

    #[test]
    fn second_request_falls_back_to_apply() {
        let (handler, recording) = handler();
        handler
            .inject("a", 10, FaultConfig::TimeOffset(TimeOffset::new(1, 0, 1)))
            .unwrap();
        handler
            .inject("b", 10, FaultConfig::TimeOffset(TimeOffset::new(2, 0, 2)))
            .unwrap();

        assert_eq!(
            handler.registry().get_with_pid(10).unwrap(),
            FaultConfig::TimeOffset(TimeOffset::new(3, 0, 3))
        );
        assert_eq!(recording.applied.lock().len(), 2);
    }

    #[test]
    fn repeated_inject_is_satisfied() {
        let (handler, recording) = handler();
        let config = FaultConfig::TimeOffset(TimeOffset::new(1, 0, 1));
        handler.inject("a", 10, config.clone()).unwrap();
        handler.inject("a", 10, config).unwrap();
        assert_eq!(recording.applied.lock().len(), 1);
    }

    #[test]
    fn recover_is_idempotent() {
        let (handler, recording) = handler();
        handler
            .inject("a", 10, FaultConfig::TimeOffset(TimeOffset::new(1, 0, 1)))
            .unwrap();
        handler.recover("a", 10).unwrap();
        handler.recover("a", 10).unwrap();
        assert_eq!(*recording.reverted.lock(), vec![10]);
        assert_eq!(
            handler.registry().get_with_pid(10).unwrap_err().kind(),
            ErrorKind::NotFound(Missing::Pid)
        );
    }

    #[test]
    fn unsupported_kind_surfaces_not_implemented() {
        let (handler, _) = handler();
        let err = handler
            .inject("s", 11, FaultConfig::Stress(StressLoad::default()))
            .unwrap_err();
        assert!(matches!(err, ChaosError::NotImplemented("inject")));
        assert!(handler.registry().targets().is_empty());
    }

    #[test]
    fn mixed_kinds_on_one_target_are_rejected() {
        let (handler, _) = handler();
        handler
            .inject("a", 12, FaultConfig::TimeOffset(TimeOffset::new(1, 0, 1)))
            .unwrap();
        let err = handler
            .inject("b", 12, FaultConfig::Stress(StressLoad::default()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CanNotAdd);
        assert_eq!(handler.registry().contributions(12).len(), 1);
    }
}
