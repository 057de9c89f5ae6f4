//! # Portal – Drive Administration
//!
//! Gives every client of the portal a Google shared drive and keeps the
//! portal's service account and support group on each drive's ACL.
//!
//! ## Modules
//!
//! - **secrets** – service-account key storage and payload decoding
//! - **factory** – builds an authenticated `DriveApi` per operation
//! - **provisioning** – batch shared-drive creation for drive-less clients
//! - **reconcile** – permission check, fix and backfill
//! - **facade** – the drive-management actions behind the function boundary
//! - **hook** – UI-side orchestration, notices and the status poller

pub mod actions;
pub mod audit;
pub mod backend;
pub mod config;
pub mod error;
pub mod facade;
pub mod factory;
pub mod hook;
pub mod provisioning;
pub mod reconcile;
pub mod secrets;

pub use actions::{ActionData, DriveAction, Envelope};
pub use backend::{Backend, CallerProfile, ClientRecord, Role};
pub use config::DriveAdminConfig;
pub use error::{ErrorBody, ErrorKind, PortalError, PortalResult, SecretError};
pub use facade::DriveAdminFacade;
pub use factory::{DriveClientFactory, GoogleDriveClientFactory, StaticDriveClientFactory};
pub use hook::{IntegrationHook, StatusPoller};
pub use provisioning::ProvisioningSummary;
