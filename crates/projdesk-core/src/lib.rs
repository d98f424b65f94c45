//! projdesk-core library.
//!
//! Project records with a bounded change history, scoped by a two-tier
//! (internal / per-client external) access model, persisted as one JSON
//! document behind a [`remote::DocumentClient`].
//!
//! Entry point for callers is [`desk::Desk`]; it resolves a
//! [`desk::Caller`]'s [`auth::Scope`] and then drives [`store::ProjectStore`]
//! or [`config::ConfigStore`].
//!
//! # Conventions
//!
//! - **Errors**: typed [`error::DeskError`] from every store and desk
//!   operation; `anyhow::Result` only in [`settings`].
//! - **Logging**: `tracing` macros. Access decisions log to the
//!   [`auth::AUDIT_TARGET`] target.

pub mod auth;
pub mod config;
mod cycle;
pub mod desk;
pub mod error;
pub mod history;
pub mod lock;
pub mod model;
pub mod remote;
pub mod settings;
pub mod store;

pub use cycle::DEFAULT_MAX_CYCLES;
