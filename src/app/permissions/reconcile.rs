use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::adb::dispatcher::CommandDispatcher;
use crate::app::adb::parse::parse_permission_dump;
use crate::app::error::AppError;
use crate::app::models::{
    CommandLineResult, Permission, PermissionKind, PermissionSet, PermissionView,
};
use crate::app::operator::{Confirmation, Notifier};
use crate::app::permissions::bulk::{BulkGrant, BulkGrantOutcome};
use crate::app::permissions::catalog::{
    dump_command, get_command, individually_queried, interpret_query, query_command, AdbCommand,
};
use crate::app::state::{Session, Target};

/// Substring in `pm grant` failures on devices whose vendor policy blocks
/// adb from granting runtime permissions.
pub const SECURITY_POLICY_MARKER: &str = "GRANT_RUNTIME_PERMISSIONS";

const SECURITY_POLICY_HELP: &str = "This device does not let adb grant permissions yet. \
Enable \"Disable permission monitoring\" or \"USB debugging (Security settings)\" under \
Developer options and try again. You may need to turn USB debugging off and on afterwards.";

pub const ALREADY_GRANTED_MESSAGE: &str = "All permissions already granted!";
pub const DONE_MESSAGE: &str = "Done!";

pub fn explain_grant_error(error: &str) -> String {
    if error.contains(SECURITY_POLICY_MARKER) {
        SECURITY_POLICY_HELP.to_string()
    } else {
        format!("Error: {error}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SingleGrantOutcome {
    NoSelection,
    Applied {
        permission: Permission,
        grant: bool,
    },
    Failed {
        permission: Permission,
        grant: bool,
        error: String,
    },
}

impl SingleGrantOutcome {
    pub fn into_result(self, trace_id: &str) -> Result<(), AppError> {
        match self {
            SingleGrantOutcome::Applied { .. } => Ok(()),
            SingleGrantOutcome::Failed { error, .. } => Err(AppError::dependency(error, trace_id)),
            SingleGrantOutcome::NoSelection => Err(AppError::no_selection(trace_id)),
        }
    }
}

/// Reads the permission state of the selected app and applies changes to it.
///
/// Each operation takes one [`Target`] snapshot up front; a selection change
/// while it runs only affects later operations.
pub struct PermissionReconciler {
    dispatcher: Arc<CommandDispatcher>,
    session: Arc<Session>,
}

impl PermissionReconciler {
    pub fn new(dispatcher: Arc<CommandDispatcher>, session: Arc<Session>) -> Self {
        Self { dispatcher, session }
    }

    /// Dump-derived runtime permissions followed by the individually queried
    /// app-ops and settings. `NoSelection` unless both a device and an app
    /// are selected.
    pub fn fetch_permissions(&self, trace_id: &str) -> Result<PermissionView, AppError> {
        let Some(target) = self.session.selection().target() else {
            debug!(trace_id = %trace_id, "no device/app selected; skipping permission fetch");
            return Ok(PermissionView::NoSelection);
        };
        let set = self.fetch_for(&target, trace_id)?;
        let view = PermissionView::Loaded {
            device_id: target.device.id.clone(),
            package_name: target.app.package_name.clone(),
            set,
        };
        self.session.store_permissions(view.clone());
        Ok(view)
    }

    pub fn grant_or_revoke_one(
        &self,
        name: &str,
        kind: Option<PermissionKind>,
        grant: bool,
        notifier: &dyn Notifier,
        trace_id: &str,
    ) -> Result<SingleGrantOutcome, AppError> {
        let Some(target) = self.session.selection().target() else {
            return Ok(SingleGrantOutcome::NoSelection);
        };
        let set = match self.session.last_permission_set_for(&target) {
            Some(set) => set,
            None => self.fetch_and_store(&target, trace_id)?,
        };
        let known = match kind {
            Some(kind) => set.find(name, kind),
            None => set.find_by_name(name),
        };
        let Some(permission) = known.cloned() else {
            return Err(AppError::validation(
                format!(
                    "{name} is not a known permission of {}",
                    target.app.package_name
                ),
                trace_id,
            ));
        };

        let outcome = match self.apply(&target, &permission, grant, trace_id) {
            None => SingleGrantOutcome::Applied { permission, grant },
            Some(error) => {
                notifier.notify(&explain_grant_error(&error));
                SingleGrantOutcome::Failed {
                    permission,
                    grant,
                    error,
                }
            }
        };
        self.refresh(trace_id);
        Ok(outcome)
    }

    /// Grants every ungranted permission, one command at a time, and stops
    /// at the first error. Grants made before the error are kept.
    pub fn grant_all_missing(
        &self,
        confirmation: &dyn Confirmation,
        notifier: &dyn Notifier,
        trace_id: &str,
    ) -> Result<BulkGrantOutcome, AppError> {
        let Some(target) = self.session.selection().target() else {
            return Ok(BulkGrantOutcome::NoSelection);
        };
        let set = self.fetch_and_store(&target, trace_id)?;
        let mut bulk = BulkGrant::from_set(&set);
        if bulk.is_empty() {
            notifier.notify(ALREADY_GRANTED_MESSAGE);
            return Ok(BulkGrantOutcome::NothingToGrant);
        }

        bulk.request_confirmation();
        let approved = confirmation.confirm(&bulk.confirmation_message());
        bulk.confirm(approved);

        while let Some(permission) = bulk.current().cloned() {
            debug!(
                trace_id = %trace_id,
                package = %target.app.package_name,
                permission = %permission.name,
                "granting missing permission"
            );
            let error = self.apply(&target, &permission, true, trace_id);
            if let Some(error) = &error {
                notifier.notify(&explain_grant_error(error));
            }
            bulk.record(error);
        }

        let outcome = bulk.into_outcome();
        match &outcome {
            BulkGrantOutcome::Completed { granted } => {
                info!(
                    trace_id = %trace_id,
                    granted = granted.len(),
                    "granted all missing permissions"
                );
                notifier.notify(DONE_MESSAGE);
                self.refresh(trace_id);
            }
            BulkGrantOutcome::Failed { granted, failed, .. } => {
                warn!(
                    trace_id = %trace_id,
                    granted = granted.len(),
                    failed = %failed.name,
                    "bulk grant stopped at first failure"
                );
                self.refresh(trace_id);
            }
            BulkGrantOutcome::Cancelled { pending } => {
                info!(trace_id = %trace_id, pending, "bulk grant declined");
            }
            BulkGrantOutcome::NoSelection | BulkGrantOutcome::NothingToGrant => {}
        }
        Ok(outcome)
    }

    fn fetch_and_store(&self, target: &Target, trace_id: &str) -> Result<PermissionSet, AppError> {
        let set = self.fetch_for(target, trace_id)?;
        self.session.store_permissions(PermissionView::Loaded {
            device_id: target.device.id.clone(),
            package_name: target.app.package_name.clone(),
            set: set.clone(),
        });
        Ok(set)
    }

    fn fetch_for(&self, target: &Target, trace_id: &str) -> Result<PermissionSet, AppError> {
        let package = target.app.package_name.as_str();
        let dump = self.run(target, dump_command(package), trace_id)?;
        if let Some(error) = dump.error_text() {
            return Err(AppError::dependency(
                format!("Failed to dump package {package}: {error}"),
                trace_id,
            ));
        }
        let mut permissions = parse_permission_dump(&dump.out);

        for (kind, name) in individually_queried() {
            let Some(command) = query_command(kind, name, package) else {
                continue;
            };
            let result = self.run(target, command, trace_id)?;
            let granted = match result.error_text() {
                Some(error) => {
                    warn!(
                        trace_id = %trace_id,
                        permission = name,
                        error = %error,
                        "permission query failed"
                    );
                    false
                }
                None => interpret_query(kind, &result.out),
            };
            permissions.push(Permission {
                name: name.to_string(),
                granted,
                kind,
            });
        }

        let set = PermissionSet::new(permissions);
        info!(
            trace_id = %trace_id,
            serial = %target.device.id,
            package = %package,
            total = set.len(),
            missing = set.missing().len(),
            "fetched permissions"
        );
        Ok(set)
    }

    /// `None` on success, otherwise the error text. Timeouts and transport
    /// failures are folded in so callers see one failure shape.
    fn apply(
        &self,
        target: &Target,
        permission: &Permission,
        grant: bool,
        trace_id: &str,
    ) -> Option<String> {
        let command = get_command(permission, &target.app.package_name, grant);
        info!(
            trace_id = %trace_id,
            serial = %target.device.id,
            command = %command,
            "applying permission change"
        );
        match self.run(target, command, trace_id) {
            Ok(result) => result.error_text().map(str::to_string),
            Err(err) => Some(err.error),
        }
    }

    fn run(
        &self,
        target: &Target,
        command: AdbCommand,
        trace_id: &str,
    ) -> Result<CommandLineResult, AppError> {
        self.dispatcher
            .run_adb_args(Some(&target.device), command.into_args(), trace_id)
    }

    fn refresh(&self, trace_id: &str) {
        if let Err(err) = self.fetch_permissions(trace_id) {
            warn!(trace_id = %trace_id, error = %err, "permission refresh failed");
        }
    }
}
