// SPDX-License-Identifier: MPL-2.0

//! HTTP API of the repeater backend

pub mod client;
pub mod types;

pub use client::ApiClient;
