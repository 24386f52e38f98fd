use std::sync::RwLock;

use crate::app::models::{AndroidApp, Device, DeviceCollection, PermissionSet, PermissionView};

/// Device and application a permission operation runs against, captured once
/// per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub device: Device,
    pub app: AndroidApp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Nothing,
    DeviceOnly(Device),
    AppOnly(AndroidApp),
    Complete(Target),
}

impl Selection {
    pub fn device(&self) -> Option<&Device> {
        match self {
            Selection::DeviceOnly(device) => Some(device),
            Selection::Complete(target) => Some(&target.device),
            Selection::Nothing | Selection::AppOnly(_) => None,
        }
    }

    pub fn target(self) -> Option<Target> {
        match self {
            Selection::Complete(target) => Some(target),
            _ => None,
        }
    }
}

/// Session-scoped selection context. Only selection actions write it; every
/// reader takes a snapshot through [`Session::selection`].
pub struct Session {
    devices: RwLock<DeviceCollection>,
    selected_device: RwLock<Option<Device>>,
    selected_app: RwLock<Option<AndroidApp>>,
    last_permissions: RwLock<Option<PermissionView>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(DeviceCollection::default()),
            selected_device: RwLock::new(None),
            selected_app: RwLock::new(None),
            last_permissions: RwLock::new(None),
        }
    }

    pub fn selection(&self) -> Selection {
        let device = read_clone(&self.selected_device);
        let app = read_clone(&self.selected_app);
        match (device, app) {
            (Some(device), Some(app)) => Selection::Complete(Target { device, app }),
            (Some(device), None) => Selection::DeviceOnly(device),
            (None, Some(app)) => Selection::AppOnly(app),
            (None, None) => Selection::Nothing,
        }
    }

    pub fn selected_device(&self) -> Option<Device> {
        read_clone(&self.selected_device)
    }

    pub fn selected_app(&self) -> Option<AndroidApp> {
        read_clone(&self.selected_app)
    }

    pub fn select_device(&self, device: Option<Device>) {
        if let Ok(mut guard) = self.selected_device.write() {
            *guard = device;
        }
        self.clear_permissions();
    }

    pub fn select_app(&self, app: Option<AndroidApp>) {
        if let Ok(mut guard) = self.selected_app.write() {
            *guard = app;
        }
        self.clear_permissions();
    }

    pub fn devices(&self) -> DeviceCollection {
        read_clone(&self.devices)
    }

    /// Replaces the listing and drops a selected device that is no longer
    /// attached. Returns true when the selection was dropped.
    pub fn replace_devices(&self, devices: DeviceCollection) -> bool {
        let dropped = match self.selected_device() {
            Some(selected) => devices.find(&selected.id).is_none(),
            None => false,
        };
        if let Ok(mut guard) = self.devices.write() {
            *guard = devices;
        }
        if dropped {
            self.select_device(None);
        }
        dropped
    }

    pub fn last_permissions(&self) -> Option<PermissionView> {
        read_clone(&self.last_permissions)
    }

    /// The permission set fetched last for exactly this device and package.
    pub fn last_permission_set_for(&self, target: &Target) -> Option<PermissionSet> {
        match self.last_permissions()? {
            PermissionView::Loaded {
                device_id,
                package_name,
                set,
            } if device_id == target.device.id && package_name == target.app.package_name => {
                Some(set)
            }
            _ => None,
        }
    }

    pub fn store_permissions(&self, view: PermissionView) {
        if let Ok(mut guard) = self.last_permissions.write() {
            *guard = Some(view);
        }
    }

    fn clear_permissions(&self) {
        if let Ok(mut guard) = self.last_permissions.write() {
            *guard = None;
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn read_clone<T: Clone>(lock: &RwLock<T>) -> T {
    match lock.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
