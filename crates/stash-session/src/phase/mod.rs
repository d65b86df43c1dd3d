//! Phase Calculator
//!
//! Pure functions from a condition ledger and host/target reports to a
//! lifecycle phase. Each calculator is an ordered guard list: the first
//! matching rule wins. Nothing here performs I/O or keeps counters, so
//! recomputing a phase from the same status always gives the same answer.

mod backup;
mod invoker;
mod restore;

pub use backup::{calculate_backup_session_phase, calculate_backup_target_phase};
pub use invoker::calculate_backup_invoker_phase;
pub use restore::{
    calculate_restore_batch_phase, calculate_restore_session_phase,
    calculate_restore_target_phase,
};
