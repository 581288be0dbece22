//! `exchange-bridge`: a per-query ingestion bridge between parallel
//! producer connections and a pull-based page source for a query engine.

pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod page;
pub mod page_source;
pub mod profile;
pub mod pushdown;
pub mod registry;
pub mod token;
pub mod wire;

pub use error::{BridgeError, WireError};
pub use page::{Column, ColumnData, ColumnDescriptor, NullMask, Page, WireTag};
pub use page_source::PageSource;
pub use registry::Registry;
