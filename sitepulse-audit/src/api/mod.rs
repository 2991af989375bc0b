//! HTTP API handlers for the audit service

pub mod audits;
pub mod health;
pub mod settings;
pub mod sse;

pub use audits::audit_routes;
pub use health::health_routes;
pub use settings::settings_routes;
pub use sse::event_stream;
