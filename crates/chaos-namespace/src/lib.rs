//! chaos-namespace: namespace join directives for chaosd helpers
//!
//! Helpers that act on a container (I/O or network chaos) must run inside the
//! target's namespaces. This crate names the supported namespace kinds and
//! builds the directives the supervisor turns into nsexec arguments.

pub mod config;

pub use config::{NsOption, NsType, namespace_inode, ns_path};
