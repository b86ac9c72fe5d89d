//! Verdant database layer.
//!
//! Two tables are written as a pair: a parent `papers` row keyed by DOI and
//! exactly one child `paper_metadata` row referencing it. [`PaperStore`] is
//! the seam the ingestion pipeline writes through; [`PgPaperStore`] is the
//! production implementation and [`MemoryStore`] mirrors its constraint and
//! rollback behaviour in process.
//!
//! # Example
//!
//! ```rust,no_run
//! use verdant_db::{PgPaperStore, PaperStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PgPaperStore::connect("postgres://verdant@localhost/verdant", 5).await?;
//!     store.migrate().await?;
//!     println!("{} papers", store.paper_count().await?);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod schema;
pub mod store;
pub mod postgres;
pub mod memory;

pub use error::{DbError, Result};
pub use schema::{GeoPoint, NewPaper, PaperMetadataRow, TABLE_PAPERS, TABLE_PAPER_METADATA};
pub use store::{PaperStore, PersistOutcome};
pub use postgres::PgPaperStore;
pub use memory::MemoryStore;
