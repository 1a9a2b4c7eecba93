//! Effect Registry: merged per-target effects and the built-in fault kinds

pub mod fault;
pub mod handler;
pub mod registry;
pub mod traits;

pub use fault::{FaultConfig, FaultEffect, ImageEffect, ImagePatcher, Patchers, StressLoad, TimeOffset, Unsupported};
pub use handler::FaultHandler;
pub use registry::EffectRegistry;
pub use traits::{EffectConfig, EffectTarget, ProcessEffect, Withdrawal};
