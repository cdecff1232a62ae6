//! VeloNav link firmware library.
//!
//! Exposes the BLE asset streaming engine for integration testing and
//! host-side simulation. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod link;
pub mod pins;
pub mod storage;
