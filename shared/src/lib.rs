//! Nightscout2Datadog Shared Library
//!
//! This crate contains the types and clients shared between the polling
//! agent and the operator CLI.
//!
//! # Modules
//!
//! - [`models`] - Nightscout entry model and reading validation
//! - [`dedup`] - Timestamp watermark used to suppress duplicate readings
//! - [`nightscout`] - Upstream entry source trait and HTTP client
//! - [`datadog`] - Metric sink trait, Datadog client, and in-memory recorder
//!
//! # Example
//!
//! ```
//! use shared::models::Entry;
//!
//! let entry = Entry {
//!     date: Some(1_700_000_000_000),
//!     sgv: Some(120.0),
//!     ..Entry::default()
//! };
//!
//! let reading = entry.to_reading().unwrap();
//! assert_eq!(reading.value, 120.0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod datadog;
pub mod dedup;
pub mod models;
pub mod nightscout;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
