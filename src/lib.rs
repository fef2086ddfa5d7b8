//! Datamosh - I-frame removal for H.264 video in MP4
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod probe;
pub mod processor;
pub mod workspace;

pub use error::{Error, Result};
