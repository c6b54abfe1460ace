//! Data models for CGM entries and validated readings.
//!
//! This module provides the raw [`Entry`] shape returned by the Nightscout
//! API and the validated [`Reading`] consumed by the metric sink.

pub mod entry;

pub use entry::{Entry, EntryValidationError, Reading};
