use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::adb::apps::parse_pm_list_packages_output;
use crate::app::adb::args::join_command_line;
use crate::app::adb::dispatcher::CommandDispatcher;
use crate::app::adb::parse::parse_adb_devices;
use crate::app::bus::{Message, MessageKind, Subscriber};
use crate::app::error::AppError;
use crate::app::models::{
    AndroidApp, CommandLineResult, CommandResponse, Device, DeviceCollection, PermissionKind,
    PermissionView,
};
use crate::app::operator::{Confirmation, Notifier};
use crate::app::permissions::bulk::BulkGrantOutcome;
use crate::app::permissions::reconcile::{PermissionReconciler, SingleGrantOutcome};
use crate::app::state::Session;

pub const SUCCESS_MESSAGE: &str = "Success!";

const HANDLED: [MessageKind; 8] = [
    MessageKind::RequestGrantAllPermissions,
    MessageKind::RequestGrantRevokePermission,
    MessageKind::RequestReloadDevices,
    MessageKind::RequestRunAdbCommand,
    MessageKind::RequestConsoleLog,
    MessageKind::RequestToggleDevOptions,
    MessageKind::SelectedDevice,
    MessageKind::SelectedAndroidApp,
];

pub(crate) fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required"), trace_id));
    }
    Ok(())
}

/// Session-level handler for operator requests, reachable both as a bus
/// subscriber and through direct calls.
pub struct PermissionController {
    session: Arc<Session>,
    dispatcher: Arc<CommandDispatcher>,
    reconciler: PermissionReconciler,
    confirmation: Arc<dyn Confirmation>,
    notifier: Arc<dyn Notifier>,
}

impl PermissionController {
    pub fn new(
        session: Arc<Session>,
        dispatcher: Arc<CommandDispatcher>,
        confirmation: Arc<dyn Confirmation>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let reconciler = PermissionReconciler::new(Arc::clone(&dispatcher), Arc::clone(&session));
        Self {
            session,
            dispatcher,
            reconciler,
            confirmation,
            notifier,
        }
    }

    pub fn list_devices(
        &self,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<DeviceCollection>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        info!(trace_id = %trace_id, "list_devices");

        let result = self.dispatcher.run_adb_command("devices -l", &trace_id)?;
        if let Some(error) = result.error_text() {
            return Err(AppError::dependency(
                format!("adb devices failed: {error}"),
                &trace_id,
            ));
        }
        let devices = DeviceCollection::new(parse_adb_devices(&result.out));
        if self.session.replace_devices(devices.clone()) {
            info!(trace_id = %trace_id, "selected device is gone; selection cleared");
        }
        Ok(CommandResponse {
            trace_id,
            data: devices,
        })
    }

    pub fn list_apps(
        &self,
        third_party_only: bool,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<Vec<AndroidApp>>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        info!(trace_id = %trace_id, third_party_only, "list_apps");

        let mut args = vec![
            "shell".to_string(),
            "pm".to_string(),
            "list".to_string(),
            "packages".to_string(),
            "-f".to_string(),
        ];
        if third_party_only {
            args.push("-3".to_string());
        }
        let device = self.session.selected_device();
        let result = self.dispatcher.run_adb_args(device.as_ref(), args, &trace_id)?;
        if let Some(error) = result.error_text() {
            return Err(AppError::dependency(
                format!("pm list packages failed: {error}"),
                &trace_id,
            ));
        }
        Ok(CommandResponse {
            trace_id,
            data: parse_pm_list_packages_output(&result.out),
        })
    }

    /// Selects a device from the current listing, listing devices first when
    /// the serial is not known yet. `None` clears the selection.
    pub fn select_device(
        &self,
        serial: Option<&str>,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<Option<Device>>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        let device = match serial {
            None => None,
            Some(serial) => {
                ensure_non_empty(serial, "serial", &trace_id)?;
                let known = self.session.devices().find(serial).cloned();
                let found = match known {
                    Some(device) => Some(device),
                    None => self
                        .list_devices(Some(trace_id.clone()))?
                        .data
                        .find(serial)
                        .cloned(),
                };
                match found {
                    Some(device) => Some(device),
                    None => {
                        return Err(AppError::validation(
                            format!("Device {serial} is not attached"),
                            &trace_id,
                        ))
                    }
                }
            }
        };
        info!(
            trace_id = %trace_id,
            serial = ?device.as_ref().map(|d| d.id.as_str()),
            "select_device"
        );
        self.session.select_device(device.clone());
        Ok(CommandResponse {
            trace_id,
            data: device,
        })
    }

    /// Lists devices and selects the only one attached. With zero or several
    /// devices the selection is left untouched and `None` is returned.
    pub fn select_only_device(
        &self,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<Option<Device>>, AppError> {
        let devices = self.list_devices(trace_id)?;
        match devices.data.devices.as_slice() {
            [device] => self.select_device(Some(&device.id), Some(devices.trace_id.clone())),
            others => {
                debug!(
                    trace_id = %devices.trace_id,
                    attached = others.len(),
                    "no single device to select"
                );
                Ok(CommandResponse {
                    trace_id: devices.trace_id,
                    data: None,
                })
            }
        }
    }

    pub fn select_app(
        &self,
        package: Option<&str>,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<Option<AndroidApp>>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        let app = match package {
            None => None,
            Some(package) => {
                ensure_non_empty(package, "package", &trace_id)?;
                Some(AndroidApp::from_package(package.trim()))
            }
        };
        info!(
            trace_id = %trace_id,
            package = ?app.as_ref().map(|a| a.package_name.as_str()),
            "select_app"
        );
        self.session.select_app(app.clone());
        Ok(CommandResponse {
            trace_id,
            data: app,
        })
    }

    pub fn fetch_permissions(
        &self,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<PermissionView>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        let view = self.reconciler.fetch_permissions(&trace_id)?;
        Ok(CommandResponse {
            trace_id,
            data: view,
        })
    }

    pub fn grant_all_missing(
        &self,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<BulkGrantOutcome>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        info!(trace_id = %trace_id, "grant_all_missing");
        let outcome = self.reconciler.grant_all_missing(
            self.confirmation.as_ref(),
            self.notifier.as_ref(),
            &trace_id,
        )?;
        Ok(CommandResponse {
            trace_id,
            data: outcome,
        })
    }

    pub fn set_permission(
        &self,
        name: &str,
        kind: Option<PermissionKind>,
        grant: bool,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<SingleGrantOutcome>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_non_empty(name, "permission", &trace_id)?;
        info!(trace_id = %trace_id, permission = %name, grant, "set_permission");
        let outcome = self.reconciler.grant_or_revoke_one(
            name.trim(),
            kind,
            grant,
            self.notifier.as_ref(),
            &trace_id,
        )?;
        Ok(CommandResponse {
            trace_id,
            data: outcome,
        })
    }

    /// Runs an arbitrary suffix against the selected device and tells the
    /// operator how it went.
    pub fn run_adb_command(
        &self,
        command: &str,
        trace_id: Option<String>,
    ) -> Result<CommandResponse<CommandLineResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        ensure_non_empty(command, "command", &trace_id)?;
        info!(trace_id = %trace_id, command = %command, "run_adb_command");
        let result = self.dispatcher.run_adb_command(command, &trace_id)?;
        match result.error_text() {
            Some(error) => self.notifier.notify(error),
            None => self.notifier.notify(SUCCESS_MESSAGE),
        }
        Ok(CommandResponse {
            trace_id,
            data: result,
        })
    }

    /// Same as [`Self::run_adb_command`] for already-split arguments, which
    /// reach adb unchanged.
    pub fn run_adb_argv(
        &self,
        args: &[String],
        trace_id: Option<String>,
    ) -> Result<CommandResponse<CommandLineResult>, AppError> {
        let trace_id = resolve_trace_id(trace_id);
        let suffix = join_command_line(args, &trace_id)?;
        self.run_adb_command(&suffix, Some(trace_id))
    }

    fn reload(&self, trace_id: &str) -> Result<(), AppError> {
        self.list_devices(Some(trace_id.to_string()))?;
        self.fetch_permissions(Some(trace_id.to_string()))?;
        Ok(())
    }

    fn handle(&self, message: &Message, trace_id: &str) -> Result<(), AppError> {
        let trace = Some(trace_id.to_string());
        match message {
            Message::GrantAllPermissions => self.grant_all_missing(trace).map(|_| ()),
            Message::GrantRevokePermission(request) => self
                .set_permission(
                    &request.permission.name,
                    Some(request.permission.kind),
                    request.grant,
                    trace,
                )
                .map(|_| ()),
            Message::ReloadDevices => self.reload(trace_id),
            Message::RunAdbCommand(request) => {
                self.run_adb_command(&request.command, trace).map(|_| ())
            }
            Message::ConsoleLog(request) => {
                info!(trace_id = %trace_id, source = "counterpart", "{}", request.message);
                Ok(())
            }
            Message::ToggleDevOptions => {
                debug!(trace_id = %trace_id, "developer options toggle has no effect without a UI");
                Ok(())
            }
            Message::SelectedDevice(device) => {
                self.session.select_device(device.clone());
                self.fetch_permissions(trace).map(|_| ())
            }
            Message::SelectedAndroidApp(app) => {
                self.session.select_app(app.clone());
                self.fetch_permissions(trace).map(|_| ())
            }
            Message::RunCommandLine(_) | Message::CommandLineResult(_) => Ok(()),
        }
    }
}

impl Subscriber for PermissionController {
    fn name(&self) -> &str {
        "permission-controller"
    }

    fn handles(&self) -> &[MessageKind] {
        &HANDLED
    }

    fn on_message(&self, message: &Message) -> Result<(), AppError> {
        let trace_id = Uuid::new_v4().to_string();
        debug!(trace_id = %trace_id, kind = %message.kind(), "controller received message");
        let result = self.handle(message, &trace_id);
        if let Err(err) = &result {
            warn!(trace_id = %trace_id, error = %err, "controller request failed");
            self.notifier.notify(&format!("Error: {}", err.error));
        }
        result
    }
}

#[cfg(test)]
mod tests;
