//! Capability contract between the registry and concrete effects

use std::fmt::Debug;

use chaos_core::Result;

/// Pid of the process whose running image an effect modifies
pub type EffectTarget = i32;

/// What happens to the remaining contributions when one is withdrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Withdrawal {
    /// Recovery reverses everything; the recomputed configuration is
    /// injected again for the contributions that stay
    #[default]
    Reapply,
    /// Recovery only reverses the withdrawn part; nothing is reinjected
    Keep,
}

/// A live modification of one target process
pub trait ProcessEffect: Send + 'static {
    /// Apply the currently assigned configuration to `target`
    fn inject(&mut self, target: EffectTarget) -> Result<()>;

    /// Reverse the modification on `target`
    fn recover(&mut self, target: EffectTarget) -> Result<()>;

    fn withdrawal(&self) -> Withdrawal {
        Withdrawal::Reapply
    }
}

/// Configuration of an effect kind.
///
/// Several requesters may target the same process; their configurations are
/// folded with [`combine`](EffectConfig::combine) into the one that is
/// actually injected. The fold must not depend on the order of requesters.
pub trait EffectConfig: Clone + Send + Sync + Debug + 'static {
    type Effect: ProcessEffect;

    /// Fold `other` into `self`
    fn combine(&mut self, other: &Self) -> Result<()>;

    /// Make `effect` carry this configuration on its next injection
    fn assign(&self, effect: &mut Self::Effect) -> Result<()>;
}
