//! `inapp_core` is the decision core shared by our in-app messaging SDKs. If you're integrating
//! in-app campaigns into an application, you probably want one of the platform SDKs built on top
//! of this crate.
//!
//! # Overview
//!
//! `inapp_core` owns everything between a trigger event and the renderer call. The host SDK
//! supplies the outer surface (configuration download, persistence, geo and segmentation
//! backends, the actual UI) through the traits in [`providers`] and submits
//! [`TriggerEvent`](context::TriggerEvent)s; this crate decides what to show and when.
//!
//! [`Configuration`] is an immutable snapshot of the server-provided campaign configuration.
//! [`ConfigurationStore`](configuration_store::ConfigurationStore) is a thread-safe manager for
//! it: whenever configuration changes, it is replaced completely, and readers receive a
//! *snapshot* unaffected by further writes, so a selection pass is internally consistent.
//!
//! [`targeting`] evaluates a campaign's [`TargetingTree`](model::TargetingTree) against an
//! [`EvaluationContext`](context::EvaluationContext). Evaluation is a pure function of the tree
//! and the context; it fails closed when context data is missing or the tree is malformed.
//!
//! [`bucketer`] deterministically maps a device id and an experiment salt to one of 100 buckets,
//! so every SDK across platforms assigns the same device to the same variant.
//!
//! [`resolver`] fetches the external data (geo, segment memberships, local persisted counters)
//! that the surviving candidates' targeting trees need, concurrently and at most once per pass.
//!
//! [`pipeline`] runs one selection pass: experiment exclusions, static filters, dependency
//! resolution, in-order targeting with exposure telemetry, and frequency validation. [`frequency`]
//! holds the per-campaign and global display-cap rules, and [`scheduler`] holds the winner until
//! its presentation delay elapses, re-validating at fire time.
//!
//! [`CampaignManager`](manager::CampaignManager) ties these together behind a single worker task;
//! most hosts are built from a `ConfigurationStore` and a `CampaignManager`.
//!
//! # Versioning
//!
//! This library follows semver. However, it is considered an internal library, so expect frequent
//! breaking changes and major version bumps.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod bucketer;
pub mod configuration_store;
pub mod context;
pub mod events;
pub mod frequency;
pub mod manager;
pub mod model;
pub mod pipeline;
pub mod providers;
pub mod resolver;
pub mod scheduler;
pub mod targeting;

mod configuration;
mod error;
mod sdk_metadata;
mod str;

pub use crate::str::Str;
pub use configuration::Configuration;
pub use error::{Error, Result};
pub use sdk_metadata::SdkMetadata;
