//! Gateway for `OrtRun` license-compliance scan pipelines.
//!
//! An `OrtRun` custom resource drives a three-stage pipeline (analyzer,
//! scanner, reporter) against one repository. This crate exposes creating,
//! listing and inspecting runs, and reading their stage logs, through:
//!
//! - an HTTP JSON API ([`server`]),
//! - a Matrix bot ([`chat::matrix`]),
//! - a Slack bot ([`chat::slack`]).
//!
//! # Architecture
//!
//! - [`model`] holds the read models rebuilt on every request
//! - [`translate`] turns raw `OrtRun` objects into [`Run`]s
//! - [`logs`] finds a stage's pods by name and bundles their logs
//! - [`operations::RunOperations`] is the one entry point all front-ends call
//! - [`store`] defines the collaborator traits; [`cluster`] implements them
//!   against the Kubernetes API
//!
//! # Configuration
//!
//! See [`config::Config::from_env`].

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chat;
pub mod cluster;
pub mod config;
pub mod error;
pub mod logs;
pub mod model;
pub mod names;
pub mod operations;
pub mod server;
pub mod store;
pub mod testing;
pub mod translate;

pub use config::Config;
pub use error::{LogError, MalformedResource, OperationError, StoreError};
pub use model::{LogBundle, PodIdentity, PodLogEntry, Run, RunList, RunStatus, StageStatus};
pub use operations::RunOperations;
pub use store::{NameGenerator, PodLogSource, RunStore};
