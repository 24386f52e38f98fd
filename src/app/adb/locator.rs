use std::path::{Path, PathBuf};

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

pub fn resolve_adb_program(config_command_path: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if normalized.is_empty() {
        "adb".to_string()
    } else {
        normalized
    }
}

/// Resolves the executable named in a command-line request. With
/// `prepend_current_path`, a relative path that contains a separator is
/// anchored at `current_dir`; bare names are left for `PATH` lookup.
pub fn resolve_command_program(
    command: &str,
    prepend_current_path: bool,
    current_dir: &Path,
) -> PathBuf {
    let normalized = normalize_command_path(command);
    let path = PathBuf::from(&normalized);
    let has_separator = normalized.contains('/') || normalized.contains('\\');
    if prepend_current_path && path.is_relative() && has_separator {
        current_dir.join(path)
    } else {
        path
    }
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    let path = Path::new(program);
    if path.components().count() == 1 && path.is_relative() {
        // Bare executable name, resolved through PATH at spawn time.
        return Ok(());
    }
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if path.is_absolute() && !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(())
}
