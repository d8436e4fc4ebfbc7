//! # lxcprov-common
//!
//! Shared records, error definitions, configuration models, and constants
//! used across the lxcprov workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and holds the validated [`ContainerRecord`](types::ContainerRecord)
//! that every provisioning run starts from.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
