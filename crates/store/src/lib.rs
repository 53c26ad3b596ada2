//! PEG sample retrieval
//!
//! This crate owns the PostgreSQL adapter for raw PEG samples: a pooled
//! connection, a parameterized query builder with identifier whitelisting,
//! and a transient-error retry loop. The `SampleSource` trait is the seam
//! the assembler depends on, so the pipeline can run against an in-memory
//! source in tests and in mock mode.

pub mod memory;
pub mod query;
pub mod store;

use async_trait::async_trait;
use peg_analyzer_types::peg::{Filter, RawSample};
use peg_analyzer_types::request::ColumnMap;
use peg_analyzer_types::window::TimeWindow;
use peg_analyzer_types::Result;

pub use memory::MemorySource;
pub use store::{PegStore, StoreOptions};

/// Anything that can produce raw samples for one window
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn fetch(
        &self,
        window: &TimeWindow,
        filter: &Filter,
        columns: &ColumnMap,
    ) -> Result<Vec<RawSample>>;
}
