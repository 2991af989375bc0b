//! Database access for the audit engine
//!
//! Two row families: `analyses` (the aggregate bundle, one row per
//! target) and `audit_runs` (the per-stage execution log). All writes
//! that can contend go through the lock-retry helper.

pub mod bundles;
pub mod retry;
pub mod runs;
