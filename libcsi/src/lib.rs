//! # libcsi: CSI controller for Qumulo appliances
//!
//! `libcsi` implements the Controller half of the [Container Storage
//! Interface][csi] on top of the Qumulo REST management API. Volumes are
//! directories with a quota on the appliance; their location is encoded in
//! the volume ID so the controller keeps no state of its own. It follows the
//! usual conventions (Tokio async runtime, `tracing` for observability,
//! `thiserror` for structured errors).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: `Volume`, `VolumeId`, capabilities, requests. |
//! | [`error`] | [`CsiError`] and the mapping from appliance failures onto it. |
//! | [`config`] | Driver facts and environment-driven transport settings. |
//! | [`volume_id`] | Encoding of a volume's location into its ID. |
//! | [`rest`] | Authenticated REST transport and idempotent provisioning calls. |
//! | [`controller`] | [`CsiController`] trait for volume create/delete/expand. |
//! | [`backend`] | The Qumulo implementation of [`CsiController`]. |
//!
//! [csi]: https://github.com/container-storage-interface/spec

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod rest;
pub mod types;
pub mod volume_id;

// Re-export the most commonly used items at crate root for convenience.
pub use backend::qumulo::QumuloController;
pub use config::{DriverConfig, TransportConfig};
pub use controller::CsiController;
pub use error::CsiError;
pub use rest::{Connection, RestError};
pub use types::*;
pub use volume_id::VolumeLocation;
