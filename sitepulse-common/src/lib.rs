//! # SitePulse Common Library
//!
//! Shared code for the SitePulse audit services including:
//! - Error types
//! - Audit event types (AuditEvent enum) and the EventBus
//! - Target/audit-type definitions shared across crates
//! - Database initialization and settings access
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use types::{AuditTarget, AuditType};
