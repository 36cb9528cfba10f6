use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::app::config::ToolSettings;

pub const AAPT: &str = "aapt";
pub const ADB: &str = "adb";

/// Resolved programs for the external tools the core drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toolchain {
    pub aapt: String,
    pub adb: String,
    pub timeout: Option<Duration>,
}

impl Toolchain {
    pub fn from_settings(settings: &ToolSettings) -> Self {
        let resource_dir = resolve_resource_dir(&settings.resource_dir);
        Self {
            aapt: resolve_tool_program(&settings.aapt_path, resource_dir.as_deref(), AAPT),
            adb: resolve_tool_program(&settings.adb_path, resource_dir.as_deref(), ADB),
            timeout: (settings.command_timeout_secs > 0)
                .then(|| Duration::from_secs(settings.command_timeout_secs)),
        }
    }

    /// Both tools live in `dir`, no timeout.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            aapt: tool_file(dir, AAPT).to_string_lossy().to_string(),
            adb: tool_file(dir, ADB).to_string_lossy().to_string(),
            timeout: None,
        }
    }
}

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// `APK_INSTALLER_RESOURCE_DIR`, then the configured directory, then the executable's directory.
pub fn resolve_resource_dir(configured: &str) -> Option<PathBuf> {
    if let Ok(value) = std::env::var("APK_INSTALLER_RESOURCE_DIR") {
        let normalized = normalize_command_path(&value);
        if !normalized.is_empty() {
            return Some(PathBuf::from(normalized));
        }
    }
    let normalized = normalize_command_path(configured);
    if !normalized.is_empty() {
        return Some(PathBuf::from(normalized));
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

pub fn resolve_tool_program(explicit: &str, resource_dir: Option<&Path>, name: &str) -> String {
    let normalized = normalize_command_path(explicit);
    if !normalized.is_empty() {
        return normalized;
    }
    if let Some(dir) = resource_dir {
        let bundled = tool_file(dir, name);
        if bundled.is_file() {
            return bundled.to_string_lossy().to_string();
        }
    }
    name.to_string()
}

pub fn validate_tool_program(program: &str, name: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err(format!("{name} command is empty"));
    }
    if program == name {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err(format!("{name} path must point to an executable file"));
    }
    if !path.exists() {
        return Err(format!("{name} executable not found at {program}"));
    }
    Ok(())
}

fn tool_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::tests::env_lock;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn strips_wrapping_quotes() {
        assert_eq!(
            normalize_command_path("  \"/opt/android/build-tools/aapt\"  "),
            "/opt/android/build-tools/aapt"
        );
        assert_eq!(
            normalize_command_path("  '/opt/android/platform-tools/adb'  "),
            "/opt/android/platform-tools/adb"
        );
    }

    #[test]
    fn explicit_path_wins() {
        let tmp = TempDir::new().expect("tmp");
        assert_eq!(
            resolve_tool_program("'/custom/adb'", Some(tmp.path()), ADB),
            "/custom/adb"
        );
    }

    #[test]
    fn bundled_tool_is_used_when_present() {
        let tmp = TempDir::new().expect("tmp");
        let bundled = tool_file(tmp.path(), AAPT);
        fs::write(&bundled, b"").expect("write");
        assert_eq!(
            resolve_tool_program("", Some(tmp.path()), AAPT),
            bundled.to_string_lossy()
        );
    }

    #[test]
    fn falls_back_to_bare_name() {
        let tmp = TempDir::new().expect("tmp");
        assert_eq!(resolve_tool_program("", Some(tmp.path()), ADB), "adb");
        assert_eq!(resolve_tool_program("  ", None, AAPT), "aapt");
    }

    #[test]
    fn validates_paths() {
        assert!(validate_tool_program("adb", ADB).is_ok());
        let err = validate_tool_program("/this/path/should/not/exist/adb", ADB).unwrap_err();
        assert!(err.contains("not found"));
        let tmp = TempDir::new().expect("tmp");
        assert!(validate_tool_program(&tmp.path().to_string_lossy(), AAPT).is_err());
    }

    #[test]
    fn resource_dir_prefers_env_then_config_then_exe_dir() {
        let _guard = env_lock();
        let from_env = TempDir::new().expect("tmp");
        let from_config = TempDir::new().expect("tmp");
        let configured = from_config.path().to_string_lossy().to_string();

        std::env::set_var("APK_INSTALLER_RESOURCE_DIR", from_env.path());
        assert_eq!(
            resolve_resource_dir(&configured),
            Some(from_env.path().to_path_buf())
        );

        std::env::set_var("APK_INSTALLER_RESOURCE_DIR", "  ");
        assert_eq!(
            resolve_resource_dir(&format!("\"{configured}\"")),
            Some(from_config.path().to_path_buf())
        );

        std::env::remove_var("APK_INSTALLER_RESOURCE_DIR");
        assert_eq!(
            resolve_resource_dir(&configured),
            Some(from_config.path().to_path_buf())
        );
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        assert!(exe_dir.is_some());
        assert_eq!(resolve_resource_dir(""), exe_dir);
    }

    #[test]
    fn toolchain_uses_bundled_tools_in_configured_dir() {
        let _guard = env_lock();
        std::env::remove_var("APK_INSTALLER_RESOURCE_DIR");
        let tmp = TempDir::new().expect("tmp");
        let bundled = tool_file(tmp.path(), AAPT);
        fs::write(&bundled, b"").expect("write");

        let settings = ToolSettings {
            resource_dir: tmp.path().to_string_lossy().to_string(),
            ..ToolSettings::default()
        };
        let toolchain = Toolchain::from_settings(&settings);
        assert_eq!(toolchain.aapt, bundled.to_string_lossy());
        assert_eq!(toolchain.adb, ADB);
    }

    #[test]
    fn timeout_only_when_configured() {
        let mut settings = ToolSettings::default();
        settings.aapt_path = "/x/aapt".to_string();
        settings.adb_path = "/x/adb".to_string();
        let toolchain = Toolchain::from_settings(&settings);
        assert_eq!(toolchain.timeout, None);
        assert_eq!(toolchain.aapt, "/x/aapt");

        settings.command_timeout_secs = 15;
        let toolchain = Toolchain::from_settings(&settings);
        assert_eq!(toolchain.timeout, Some(Duration::from_secs(15)));
    }
}
