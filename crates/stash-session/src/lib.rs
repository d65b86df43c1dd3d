//! Invoker abstraction and session state machine for Stash
//!
//! The four invoker variants (BackupConfiguration, BackupBatch,
//! RestoreSession, RestoreBatch) are normalized behind the [`invoker::Invoker`]
//! trait. Executors report progress as partial statuses; the
//! [`store`] merges them through the pure [`merge`] and [`phase`] functions
//! under optimistic concurrency. The [`coordinator`] gates sequential targets.

#![deny(missing_docs)]

pub mod coordinator;
pub mod invoker;
pub mod merge;
pub mod phase;
pub mod session;
pub mod store;
pub mod summary;

pub use invoker::{
    extract_backup_invoker, extract_restore_invoker, BackupInvoker, BackupTargetInfo, Invoker,
    InvokerKind, InvokerStores, RestoreInvoker, RestoreTargetInfo,
};
pub use session::BackupSessionStore;
pub use store::{KubeStore, ResourceStore, StatusStoreConfig};
pub use summary::{Summary, SummaryPhase};
