use std::sync::OnceLock;

use regex::Regex;

use crate::app::models::{Device, Permission, UNKNOWN_FIELD};

/// Marker that identifies a permission line in `dumpsys package` output.
pub const GRANTED_MARKER: &str = ": granted=";

fn model_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `model:` followed by a run of non-whitespace.
    RE.get_or_init(|| Regex::new(r"\bmodel:(\S+)").expect("model pattern"))
}

fn device_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `device:` followed by a run of non-whitespace; the bare state column
    // `device` has no colon and never matches.
    RE.get_or_init(|| Regex::new(r"\bdevice:(\S+)").expect("device pattern"))
}

fn granted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // name: the colon-free run right before the marker; value: up to a comma or CR.
    RE.get_or_init(|| Regex::new(r"([^:]+): granted=([^\r,]*)").expect("granted pattern"))
}

/// Parses `adb devices -l`. The first line is the header and is skipped.
///
/// The identifier is the text before the first space or tab; a line with
/// no separator or an empty identifier is not a device. `model:` and
/// `device:` fall back to `"unknown"` independently.
pub fn parse_adb_devices(output: &str) -> Vec<Device> {
    output
        .split('\n')
        .skip(1)
        .filter_map(|raw| {
            let line = raw.replace('\r', "");
            if line.trim_start().starts_with('*') {
                // adb daemon chatter such as "* daemon started successfully".
                return None;
            }
            let split_at = line.find([' ', '\t'])?;
            let id = &line[..split_at];
            if id.is_empty() {
                return None;
            }
            Some(Device {
                id: id.to_string(),
                model: capture_or_unknown(model_re(), &line),
                device: capture_or_unknown(device_re(), &line),
            })
        })
        .collect()
}

fn capture_or_unknown(re: &Regex, line: &str) -> String {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_FIELD.to_string())
}

/// Extracts standard runtime permissions from `dumpsys package <pkg>`.
/// Only lines containing `": granted="` count; `granted` is true only for
/// the literal `true`.
pub fn parse_permission_dump(output: &str) -> Vec<Permission> {
    output
        .split('\n')
        .filter(|line| line.contains(GRANTED_MARKER))
        .filter_map(|line| {
            let caps = granted_re().captures(line)?;
            let name = caps.get(1)?.as_str().trim();
            if name.is_empty() {
                return None;
            }
            let granted = caps.get(2).is_some_and(|value| value.as_str() == "true");
            Some(Permission::runtime(name, granted))
        })
        .collect()
}

/// `appops get <pkg> <op>` reports e.g. `SYSTEM_ALERT_WINDOW: allow`.
pub fn parse_appops_granted(output: &str) -> bool {
    output.contains("allow")
}

/// `settings get global <name>`: any value containing `1` counts as on.
pub fn parse_setting_enabled(output: &str) -> bool {
    output.contains('1')
}
