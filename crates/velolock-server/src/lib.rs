//! # velolock-server
//!
//! HTTP server library for the velolock bicycle lock fleet.
//!
//! This library provides the API handlers, state management, logging setup,
//! and the MQTT bridge between the service and the locks.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod state;
