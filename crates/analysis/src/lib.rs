//! Analysis pipeline for N-1 vs N PEG comparison
//!
//! The assembler orchestrates the full flow: request validation, time
//! parsing, concurrent sample fetches, per-window aggregation and derived
//! PEG evaluation, comparison and classification, prompt rendering, LLM
//! invocation and response parsing, and finally backend payload
//! construction. Each stage lives in its own module and is testable on its
//! own.

pub mod aggregate;
pub mod assembler;
pub mod compare;
pub mod derive;
pub mod formula;
pub mod outliers;
pub mod payload;
pub mod preview;
pub mod request;
pub mod response;
pub mod time;

pub use assembler::AnalysisAssembler;
pub use request::{validate_request, ValidatedRequest};
pub use time::TimeRangeParser;
