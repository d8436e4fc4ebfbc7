//! Container provisioning for lxcprov.
//!
//! The [`engine::ProvisioningEngine`] drives one container from "absent or
//! stale" to "running with the requested network identity and packages"
//! through a [`backend::ContainerBackend`]. The [`batch::BatchRunner`]
//! feeds it a whole batch file, one record at a time.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod backend;
pub mod batch;
pub mod engine;
pub mod exec;
pub mod guest_net;
