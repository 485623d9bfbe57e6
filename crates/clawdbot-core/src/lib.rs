//! # ClawDBot Core
//!
//! Shared foundation for the ClawD marketplace automation service:
//! - `config` — one immutable, TOML-loadable configuration struct covering
//!   every recognized option (scheduler, queues, notifications, thresholds,
//!   AI provider, security, storage, debug).
//! - `error` — the error taxonomy shared by all crates.
//! - `domain` — property / enquiry / AI-request records and the listing
//!   lifecycle state machine.
//! - `auth` — the pure role-authorization predicate (no ambient "current
//!   user"; callers pass identity explicitly).
//! - `store` — injected persistence seams. The real marketplace database is
//!   owned by an external ORM layer; jobs and services only see these traits.

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod store;

pub use auth::{Actor, Role, authorize};
pub use config::BotConfig;
pub use domain::{
    AiRequest, AiRequestKind, Enquiry, EnquiryStatus, Property, PropertyStatus,
};
pub use error::{BotError, Result};
pub use store::{EnquiryStore, MemoryStore, PropertyStore};
