use serde::{Deserialize, Serialize};
use std::fmt;

pub const UNKNOWN_FIELD: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub model: String,
    pub device: String,
}

/// Rebuilt from scratch on every listing; never merged with a previous one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceCollection {
    pub devices: Vec<Device>,
}

impl DeviceCollection {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    pub fn find(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|device| device.id == id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Device> {
        self.devices.iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AndroidApp {
    pub package_name: String,
    pub apk_path: Option<String>,
    pub is_system: bool,
}

impl AndroidApp {
    pub fn from_package(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            apk_path: None,
            is_system: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    /// `pm grant` / `pm revoke`, reported by `dumpsys package`.
    Runtime,
    /// `appops get` / `appops set`.
    AppOps,
    /// `settings get global` / `settings put global`.
    GlobalSetting,
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PermissionKind::Runtime => "runtime",
            PermissionKind::AppOps => "appops",
            PermissionKind::GlobalSetting => "setting",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub name: String,
    pub granted: bool,
    pub kind: PermissionKind,
}

impl Permission {
    pub fn runtime(name: impl Into<String>, granted: bool) -> Self {
        Self {
            name: name.into(),
            granted,
            kind: PermissionKind::Runtime,
        }
    }

    pub fn app_ops(name: impl Into<String>, granted: bool) -> Self {
        Self {
            name: name.into(),
            granted,
            kind: PermissionKind::AppOps,
        }
    }

    pub fn global_setting(name: impl Into<String>, granted: bool) -> Self {
        Self {
            name: name.into(),
            granted,
            kind: PermissionKind::GlobalSetting,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionSet {
    pub permissions: Vec<Permission>,
}

impl PermissionSet {
    pub fn new(permissions: Vec<Permission>) -> Self {
        Self { permissions }
    }

    pub fn find(&self, name: &str, kind: PermissionKind) -> Option<&Permission> {
        self.permissions
            .iter()
            .find(|permission| permission.name == name && permission.kind == kind)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Permission> {
        self.permissions.iter().find(|permission| permission.name == name)
    }

    pub fn missing(&self) -> Vec<Permission> {
        self.permissions
            .iter()
            .filter(|permission| !permission.granted)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

/// Keeps "nothing selected" apart from "the app has no permissions".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PermissionView {
    NoSelection,
    Loaded { device_id: String, package_name: String, set: PermissionSet },
}

impl PermissionView {
    pub fn permissions(&self) -> Option<&PermissionSet> {
        match self {
            PermissionView::NoSelection => None,
            PermissionView::Loaded { set, .. } => Some(set),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommandLineRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub prepend_current_path: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandLineResult {
    pub out: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandLineResult {
    pub fn ok(out: impl Into<String>) -> Self {
        Self {
            out: out.into(),
            error: None,
        }
    }

    pub fn failed(out: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            out: out.into(),
            error: Some(error.into()),
        }
    }

    /// An empty error string counts as success.
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().filter(|error| !error.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}
