// SPDX-License-Identifier: MPL-2.0

//! Error type shared by the API client, store and binaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP {status} from {endpoint}")]
    Http {
        status: u16,
        endpoint: &'static str,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered with `success: false`.
    #[error("{0}")]
    Api(String),

    #[error("Response from {0} carried no data")]
    MissingData(&'static str),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Bucketed stats invalid: {0}")]
    InvalidBuckets(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
