//! # Portal – Drive Functions Server
//!
//! Serves the drive-management and shared-drive creation functions over
//! HTTP, backed by a JSON-file store.

pub mod api;
pub mod config;
pub mod logging;
pub mod storage;

use std::sync::Arc;

use portal_drive_admin::{DriveAdminFacade, GoogleDriveClientFactory};

use crate::config::PortalConfig;
use crate::storage::PortalStore;

/// Build the facade the server runs against.
pub fn build_facade(config: &PortalConfig, store: &Arc<PortalStore>) -> Arc<DriveAdminFacade> {
    let core = config.drive_admin();
    let factory = GoogleDriveClientFactory::new(core.drive.clone(), core.impersonated_admin_email.clone());
    Arc::new(DriveAdminFacade::new(core, store.backend(), Arc::new(factory)))
}
