use std::fmt;

use crate::app::adb::parse::{parse_appops_granted, parse_setting_enabled};
use crate::app::models::{Permission, PermissionKind};

/// App-ops permissions that `dumpsys package` does not report; each one is
/// queried on its own.
pub const APP_OPS_PERMISSIONS: [&str; 4] = [
    "PROJECT_MEDIA",
    "SYSTEM_ALERT_WINDOW",
    "GET_USAGE_STATS",
    "WRITE_SETTINGS",
];

pub const GLOBAL_SETTINGS: [&str; 1] = ["hidden_api_policy"];

/// Arguments that follow `adb [-s <serial>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbCommand {
    args: Vec<String>,
}

impl AdbCommand {
    fn shell(words: &[&str]) -> Self {
        let mut args = Vec::with_capacity(words.len() + 1);
        args.push("shell".to_string());
        args.extend(words.iter().map(|word| word.to_string()));
        Self { args }
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

impl fmt::Display for AdbCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

pub fn dump_command(package: &str) -> AdbCommand {
    AdbCommand::shell(&["dumpsys", "package", package])
}

/// The command that changes `permission` for `package`; the verb depends only
/// on the permission kind and the desired state.
pub fn get_command(permission: &Permission, package: &str, grant: bool) -> AdbCommand {
    let name = permission.name.as_str();
    match (permission.kind, grant) {
        (PermissionKind::Runtime, true) => AdbCommand::shell(&["pm", "grant", package, name]),
        (PermissionKind::Runtime, false) => AdbCommand::shell(&["pm", "revoke", package, name]),
        (PermissionKind::AppOps, true) => {
            AdbCommand::shell(&["appops", "set", package, name, "allow"])
        }
        (PermissionKind::AppOps, false) => {
            AdbCommand::shell(&["appops", "set", package, name, "deny"])
        }
        (PermissionKind::GlobalSetting, true) => {
            AdbCommand::shell(&["settings", "put", "global", name, "1"])
        }
        (PermissionKind::GlobalSetting, false) => {
            AdbCommand::shell(&["settings", "put", "global", name, "0"])
        }
    }
}

/// Per-permission query; `None` for runtime permissions, which come from the
/// package dump instead.
pub fn query_command(kind: PermissionKind, name: &str, package: &str) -> Option<AdbCommand> {
    match kind {
        PermissionKind::Runtime => None,
        PermissionKind::AppOps => Some(AdbCommand::shell(&["appops", "get", package, name])),
        PermissionKind::GlobalSetting => {
            Some(AdbCommand::shell(&["settings", "get", "global", name]))
        }
    }
}

pub fn interpret_query(kind: PermissionKind, output: &str) -> bool {
    match kind {
        PermissionKind::Runtime => false,
        PermissionKind::AppOps => parse_appops_granted(output),
        PermissionKind::GlobalSetting => parse_setting_enabled(output),
    }
}

/// The individually queried permissions, in the order they are appended
/// after the dump-derived ones.
pub fn individually_queried() -> impl Iterator<Item = (PermissionKind, &'static str)> {
    APP_OPS_PERMISSIONS
        .iter()
        .map(|name| (PermissionKind::AppOps, *name))
        .chain(GLOBAL_SETTINGS.iter().map(|name| (PermissionKind::GlobalSetting, *name)))
}
