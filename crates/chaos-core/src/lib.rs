//! chaos-core: shared types, errors and process inspection for chaosd
//!
//! This crate provides the foundational types used by the other chaosd crates:
//! - Error taxonomy with a matchable `ErrorKind` and a `Result` alias
//! - `ProcessIdentity` and creation-time validation
//! - `/proc` readers (stat, boot time, creation time)
//! - `Context` for deadlines and cancellation of blocking waits
//! - Runtime capability detection

pub mod capabilities;
pub mod context;
pub mod error;
pub mod identity;
pub mod procfs;

pub use context::Context;
pub use error::{ChaosError, ErrorKind, Missing, Result, ResultExt};
pub use identity::{CREATE_TIME_TOLERANCE_MS, ProcessIdentity, create_time_matches};
pub use procfs::{ProcRoot, ProcStat, ProcessState};
