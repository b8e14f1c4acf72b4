//! Process adapter for the external issue engine.
//!
//! This crate is intentionally thin: it validates arguments, runs the
//! engine executable with a per-operation timeout and parses its JSON
//! replies. It keeps no state beyond a cached availability check and never
//! retries.
//!
//! `DependencyResolver` layers ready/blocked/tree queries on top, computed
//! locally from a full snapshot with the rules in `beadmem-bd`.

pub mod args;
pub mod client;
pub mod config;
pub mod error;
pub mod fakes;
pub mod resolver;
pub mod runner;
pub mod validate;

pub use args::{IssueUpdate, NewIssue, Operation, ReadyFilter};
pub use client::{EngineClient, EngineStats, version_at_least};
pub use config::{EngineConfig, TimeoutClass, Timeouts};
pub use error::{EngineError, EngineResult};
pub use resolver::DependencyResolver;
pub use runner::{CommandRunner, Invocation, ProcessOutput, SystemRunner};
