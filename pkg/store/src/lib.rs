//! Concurrency-safe caches consulted by the reconciliation worker.
//!
//! The listers are kept current by an external watch-driven source; the
//! certificate store and versioned cache are owned by the controller.

pub mod cache;
pub mod certificates;
pub mod lister;

pub use cache::VersionedCache;
pub use certificates::CertificateStore;
pub use lister::{Lister, MemoryLister, MemoryListers, StoreListers};
