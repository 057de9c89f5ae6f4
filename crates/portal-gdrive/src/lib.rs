//! # Portal – Google Drive API
//!
//! The slice of Google Drive API v3 the portal's drive administration needs.
//!
//! ## Features
//!
//! - **Service-account auth** – RS256 JWT assertion with domain-wide delegation
//! - **Shared Drives** – create (with idempotency key), get
//! - **Sharing & Permissions** – list (all pages), create on shared drives
//! - **About** – authenticated principal and storage quota
//! - **`DriveApi`** – trait seam with a reqwest client and an in-memory simulation

pub mod types;
pub mod client;
pub mod credentials;
pub mod auth;
pub mod drives;
pub mod sharing;
pub mod about;
pub mod api;

pub use api::{DriveApi, SimulatedDrive};
pub use client::GDriveClient;
pub use credentials::ServiceAccountKey;
pub use types::*;
