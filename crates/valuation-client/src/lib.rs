//! REST implementation of the valuation data, defaults and insight ports.

pub mod client;
pub mod config;
pub mod error;

pub use client::ValuationApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
