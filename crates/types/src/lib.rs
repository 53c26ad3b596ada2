//! Core types and data models for the PEG analyzer
//!
//! This crate provides the fundamental data structures shared by every other
//! crate in the workspace: time windows, raw and aggregated PEG data,
//! comparison records, request/result shapes and the error model.

pub mod errors;
pub mod peg;
pub mod request;
pub mod result;
pub mod window;

pub use errors::{AnalyzerError, Result};
