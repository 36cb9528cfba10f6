use std::fs;
use std::path::PathBuf;

use uuid::Uuid;

use crate::app::config::{AppConfig, ApkInstallSettings};
use crate::app::error::AppError;
use crate::app::models::{ApplicationMetadata, Device, DeviceSummary, InstallRequest, InstallOutcome};
use crate::app::tools::badging::parse_apk;
use crate::app::tools::devices;
use crate::app::tools::icon::IconSlot;
use crate::app::tools::install::{InstallHandle, InstallOrchestrator};
use crate::app::tools::locator::Toolchain;

pub fn resolve_trace_id(input: Option<String>) -> String {
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

/// Expands `~/` and makes the path absolute when the file exists.
pub fn normalize_apk_path(path: &str) -> PathBuf {
    let expanded = match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    };
    fs::canonicalize(&expanded).unwrap_or(expanded)
}

/// Everything a front end may call: parse a package, list devices, start an install.
pub struct ApkSession {
    toolchain: Toolchain,
    icon_slot: IconSlot,
    orchestrator: InstallOrchestrator,
}

impl ApkSession {
    pub fn new(toolchain: Toolchain, icon_slot: IconSlot, install: ApkInstallSettings) -> Self {
        let orchestrator = InstallOrchestrator::new(toolchain.clone(), install);
        Self {
            toolchain,
            icon_slot,
            orchestrator,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Toolchain::from_settings(&config.tools),
            IconSlot::from_settings(&config.icon),
            config.apk_install.clone(),
        )
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn parse(&self, path: &str, trace_id: &str) -> Result<ApplicationMetadata, AppError> {
        ensure_non_empty(path, "path", trace_id)?;
        let normalized = normalize_apk_path(path.trim());
        parse_apk(
            &self.toolchain,
            &self.icon_slot,
            &normalized.to_string_lossy(),
            trace_id,
        )
    }

    pub fn list_devices(&self, trace_id: &str) -> Vec<Device> {
        devices::list_devices(&self.toolchain, trace_id)
    }

    pub fn list_device_summaries(&self, trace_id: &str) -> Vec<DeviceSummary> {
        devices::list_device_summaries(&self.toolchain, trace_id)
    }

    pub fn install_async<F>(
        &self,
        device: Device,
        package_path: &str,
        trace_id: &str,
        on_complete: F,
    ) -> Result<InstallHandle, AppError>
    where
        F: FnOnce(&InstallOutcome) + Send + 'static,
    {
        ensure_non_empty(&device.identifier, "device", trace_id)?;
        ensure_non_empty(package_path, "package_path", trace_id)?;
        let request = InstallRequest {
            device,
            package_path: normalize_apk_path(package_path.trim())
                .to_string_lossy()
                .to_string(),
        };
        Ok(self.orchestrator.install_async(request, trace_id, on_complete))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::app::config::IconSettings;
    use crate::app::models::DiagnosticKind;
    use crate::app::tools::icon::tests::build_apk;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_tool(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write tool");
        let mut perms = fs::metadata(&path).expect("meta").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod");
    }

    /// Mock `aapt` that prints a badging dump naming the icon passed in.
    fn write_aapt(dir: &Path, package: &str, version_code: &str, icon: &str) {
        write_tool(
            dir,
            "aapt",
            &format!(
                "cat <<'EOF'\npackage: name='{package}' versionCode='{version_code}' versionName='1.0'\nsdkVersion:'21'\napplication-label:'Demo App'\napplication: label='Demo App' icon='{icon}'\nEOF"
            ),
        );
    }

    fn session(tools: &Path, icon_path: &Path) -> ApkSession {
        ApkSession::new(
            Toolchain::in_dir(tools),
            IconSlot::fixed(icon_path),
            ApkInstallSettings::default(),
        )
    }

    #[test]
    fn parse_extracts_fields_size_and_icon() {
        let tmp = TempDir::new().expect("tmp");
        write_aapt(tmp.path(), "com.example.demo", "123", "res/mipmap/ic_launcher.png");
        let apk = tmp.path().join("demo.apk");
        build_apk(&apk, &[("res/mipmap/ic_launcher.png", b"icon-one")]);
        let icon = tmp.path().join("icon.png");

        let metadata = session(tmp.path(), &icon)
            .parse(&apk.to_string_lossy(), "t")
            .expect("parse");

        assert_eq!(metadata.package_id, "com.example.demo");
        assert_eq!(metadata.label, "Demo App");
        assert_eq!(metadata.version_code, "123");
        assert_eq!(metadata.version_name, "1.0");
        assert_eq!(metadata.min_sdk_version, "21");
        assert_eq!(metadata.icon_entry_name, "res/mipmap/ic_launcher.png");
        assert_eq!(metadata.icon_file, icon.to_string_lossy());
        assert!(metadata.size_bytes > 0);
        assert!(!metadata.size_display.is_empty());
        assert_eq!(fs::read(&icon).expect("icon"), b"icon-one");
    }

    #[test]
    fn parse_without_aapt_degrades_to_empty_fields() {
        let tmp = TempDir::new().expect("tmp");
        let apk = tmp.path().join("demo.apk");
        build_apk(&apk, &[("classes.dex", b"dex")]);
        let icon = tmp.path().join("icon.png");

        let metadata = session(tmp.path(), &icon)
            .parse(&apk.to_string_lossy(), "t")
            .expect("parse");

        assert!(metadata.tool_unavailable());
        assert_eq!(metadata.package_id, "");
        assert_eq!(metadata.version_name, "");
        assert!(!metadata.size_display.is_empty());
        assert!(!icon.exists());
        assert!(metadata
            .diagnostics
            .iter()
            .any(|item| item.kind == DiagnosticKind::IconSkipped));
    }

    #[test]
    fn parse_rejects_unreadable_package() {
        let tmp = TempDir::new().expect("tmp");
        write_aapt(tmp.path(), "com.example.demo", "1", "res/icon.png");
        let icon = tmp.path().join("icon.png");
        let session = session(tmp.path(), &icon);

        let missing = tmp.path().join("missing.apk");
        let err = session
            .parse(&missing.to_string_lossy(), "trace-io")
            .expect_err("expected error");
        assert_eq!(err.code, "ERR_IO");
        assert_eq!(err.trace_id, "trace-io");

        let broken = tmp.path().join("broken.apk");
        fs::write(&broken, b"not a zip").expect("write");
        let err = session
            .parse(&broken.to_string_lossy(), "t")
            .expect_err("expected error");
        assert_eq!(err.code, "ERR_VALIDATION");

        let err = session.parse("  ", "t").expect_err("expected error");
        assert_eq!(err.code, "ERR_VALIDATION");
    }

    #[test]
    fn second_parse_replaces_first_icon() {
        let tmp = TempDir::new().expect("tmp");
        let tools_one = tmp.path().join("one");
        let tools_two = tmp.path().join("two");
        fs::create_dir_all(&tools_one).expect("dir");
        fs::create_dir_all(&tools_two).expect("dir");
        write_aapt(&tools_one, "com.example.one", "1", "res/one.png");
        write_aapt(&tools_two, "com.example.two", "2", "res/two.png");

        let apk_one = tmp.path().join("one.apk");
        let apk_two = tmp.path().join("two.apk");
        build_apk(&apk_one, &[("res/one.png", b"first")]);
        build_apk(&apk_two, &[("res/two.png", b"second")]);
        let icon = tmp.path().join("icon.png");

        session(&tools_one, &icon)
            .parse(&apk_one.to_string_lossy(), "t")
            .expect("parse one");
        assert_eq!(fs::read(&icon).expect("icon"), b"first");

        session(&tools_two, &icon)
            .parse(&apk_two.to_string_lossy(), "t")
            .expect("parse two");
        assert_eq!(fs::read(&icon).expect("icon"), b"second");
        let leftovers = fs::read_dir(tmp.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("icon"))
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn per_call_icons_do_not_accumulate() {
        let tmp = TempDir::new().expect("tmp");
        write_aapt(tmp.path(), "com.example.demo", "7", "res/icon.png");
        let apk = tmp.path().join("demo.apk");
        build_apk(&apk, &[("res/icon.png", b"icon")]);
        let icons = tmp.path().join("icons");
        let slot = IconSlot::from_settings(&IconSettings {
            output_path: icons.join("icon.png").to_string_lossy().to_string(),
            per_call_path: true,
        });
        let session = ApkSession::new(Toolchain::in_dir(tmp.path()), slot, ApkInstallSettings::default());

        let mut last_icon = String::new();
        for _ in 0..5 {
            let metadata = session.parse(&apk.to_string_lossy(), "t").expect("parse");
            assert_ne!(metadata.icon_file, last_icon);
            last_icon = metadata.icon_file;
        }
        let on_disk: Vec<_> = fs::read_dir(&icons)
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect();
        assert_eq!(on_disk, vec![PathBuf::from(&last_icon)]);
        assert_eq!(fs::read(&last_icon).expect("icon"), b"icon");
    }

    #[test]
    fn lists_only_ready_devices() {
        let tmp = TempDir::new().expect("tmp");
        write_tool(
            tmp.path(),
            "adb",
            "printf 'List of devices attached\\nABC123\\tdevice\\nXYZ999\\toffline\\n'",
        );
        let session = session(tmp.path(), &tmp.path().join("icon.png"));
        assert_eq!(session.list_devices("t"), vec![Device::new("ABC123")]);
        assert_eq!(session.list_device_summaries("t").len(), 2);
    }

    #[test]
    fn no_device_lines_is_empty() {
        let tmp = TempDir::new().expect("tmp");
        write_tool(tmp.path(), "adb", "printf 'List of devices attached\\n\\n'");
        let session = session(tmp.path(), &tmp.path().join("icon.png"));
        assert!(session.list_devices("t").is_empty());
    }

    fn install_with_output(stdout: &str) -> InstallOutcome {
        let tmp = TempDir::new().expect("tmp");
        write_tool(tmp.path(), "adb", &format!("printf '{stdout}'"));
        let session = session(tmp.path(), &tmp.path().join("icon.png"));

        let (sender, receiver) = mpsc::channel();
        let handle = session
            .install_async(Device::new("ABC123"), "/tmp/x.apk", "t", move |outcome| {
                let _ = sender.send(outcome.summary.clone());
            })
            .expect("install");
        let delivered = receiver
            .recv_timeout(Duration::from_secs(10))
            .expect("callback");
        let outcome = handle.wait().expect("join");
        assert_eq!(delivered, outcome.summary);
        outcome
    }

    #[test]
    fn install_reports_success_line() {
        let outcome =
            install_with_output("1024 KB/s (5000000 bytes in 2.300s)\\n\\tpkg: /tmp/x.apk\\nSuccess\\n");
        assert_eq!(outcome.summary, "Success");
        assert_eq!(outcome.serial, "ABC123");
        assert!(outcome.error.is_none());
    }

    #[test]
    fn install_reports_failure_line_verbatim() {
        let outcome = install_with_output(
            "Performing Streamed Install\\nFailure [INSTALL_FAILED_INSUFFICIENT_STORAGE]",
        );
        assert_eq!(outcome.summary, "Failure [INSTALL_FAILED_INSUFFICIENT_STORAGE]");
    }

    #[test]
    fn install_passes_force_reinstall_arguments() {
        let tmp = TempDir::new().expect("tmp");
        write_tool(tmp.path(), "adb", "echo \"$@\"");
        let session = session(tmp.path(), &tmp.path().join("icon.png"));
        let outcome = session
            .install_async(Device::new("ABC123"), "/tmp/x.apk", "t", |_| {})
            .expect("install")
            .wait()
            .expect("join");
        assert_eq!(outcome.summary, "-s ABC123 install -r /tmp/x.apk");
    }

    #[test]
    fn install_rejects_empty_device() {
        let tmp = TempDir::new().expect("tmp");
        let session = session(tmp.path(), &tmp.path().join("icon.png"));
        let err = session
            .install_async(Device::new(" "), "/tmp/x.apk", "t", |_| {})
            .err()
            .expect("expected error");
        assert_eq!(err.code, "ERR_VALIDATION");
    }
}
