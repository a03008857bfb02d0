// SPDX-License-Identifier: MPL-2.0

//! Monitor and control client for LoRa mesh repeaters
//!
//! The repeater itself runs elsewhere and exposes a JSON API. This crate
//! polls that API, keeps the results in an explicit [`state::Store`],
//! derives rates and airtime figures from them and renders the lot to a
//! terminal.
//!
//! ```text
//! Scheduler tick ──► ApiClient ──► Action ──► reduce ──► Store ──► views / render
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod preferences;
pub mod render;
pub mod scheduler;
pub mod state;
pub mod views;

pub use error::{Error, Result};
