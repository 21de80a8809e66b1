//! Client-side multivariate experiment allocation and execution.
//!
//! # Overview
//!
//! A page declares a list of [`Experiment`]s. Each experiment has a stable id, a trigger and an
//! ordered list of weighted [`Variation`]s. An [`ExperimentRunner`] assigns every visiting session
//! to one variation per experiment, remembers that assignment across visits and, once the
//! experiment's trigger fires, applies the variation to the page.
//!
//! A run goes through the following steps:
//!
//! 1. Stop if the kill switch (`#disable_ab_tests`) is present in the URL fragment.
//! 2. Load the persisted [`AllocationMap`] and overlay the allocations forced through the URL
//!    fragment (`#mvt=2.1-5.0`).
//! 3. Allocate experiments that have no allocation yet, by weighted random draw.
//! 4. Publish a tracking string (`2:1-5:0`) through a [`Tracker`] and persist the allocations.
//! 5. Arm every selected variation's trigger.
//!
//! All page access goes through the [`Window`] trait, passed in when the runner is created.
//! [`MemoryWindow`] is a complete in-memory page that is handy for tests.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. A run never fails from the caller's point of
//! view: errors raised while running are logged, reported to the tracker and, in debug mode
//! (`#debug_ab_tests`), written to the page console. The page keeps loading without experiments.
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log/latest/log/) crate with the `"mvt"` target.
//! Diagnostics meant for whoever is looking at the page are also written to the page console.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod allocation;
pub mod location;
pub mod poller;
pub mod random;
pub mod segmentation;
pub mod settings;
pub mod storage;
pub mod tracking;
pub mod window;

mod config;
mod error;
mod experiment;
mod manifest;
mod runner;

pub use allocation::{AllocationMap, AllocationValue};
pub use config::RunnerConfig;
pub use error::{Error, Result};
pub use experiment::{
    triggers, Activation, Effect, Experiment, ExperimentId, SelectedVariation, Trigger, Variation,
};
pub use manifest::{Manifest, ManifestEntry};
pub use runner::{ExperimentRunner, RunOutcome};
pub use settings::{AnalyticsSettings, ProductConfig, Settings};
pub use storage::{PersistentStore, Persistence};
pub use tracking::{GlobalVariableTracker, Tracker};
pub use window::{MemoryStorage, MemoryWindow, Window};
