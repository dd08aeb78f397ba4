pub mod catalog;
pub mod classify;
pub mod engine;
pub mod reconciler;
pub mod scanner;

pub use catalog::{fingerprint, load_catalog, save_catalog, Catalog, CatalogEntry};
pub use classify::{transfer_mode, MimeInference, TransferMode, TypeClass, TypeInference};
pub use engine::{sync, SyncConfig, SyncEngine, SyncReport};
pub use reconciler::{ActionSummary, FileChange, PendingDeletions, Reconciler};
pub use scanner::{FileScanner, ScanConfig};
