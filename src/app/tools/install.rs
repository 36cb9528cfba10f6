use std::thread::JoinHandle;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::app::config::ApkInstallSettings;
use crate::app::error::AppError;
use crate::app::models::{InstallOutcome, InstallRequest};
use crate::app::tools::locator::Toolchain;
use crate::app::tools::runner::run_command_with_timeout;

/// Last line of the trimmed output. A trailing informational line after
/// "Success"/"Failure" would be reported instead of the verdict.
pub fn last_output_line(output: &str) -> String {
    output.trim().lines().last().unwrap_or_default().to_string()
}

pub fn install_args(request: &InstallRequest, settings: &ApkInstallSettings) -> Vec<String> {
    let mut args = vec![
        "-s".to_string(),
        request.device.identifier.clone(),
        "install".to_string(),
    ];
    if settings.replace_existing {
        args.push("-r".to_string());
    }
    if settings.allow_downgrade {
        args.push("-d".to_string());
    }
    if settings.grant_permissions {
        args.push("-g".to_string());
    }
    if settings.allow_test_packages {
        args.push("-t".to_string());
    }
    args.extend(settings.extra_args.split_whitespace().map(str::to_string));
    args.push(request.package_path.clone());
    args
}

/// Runs the install on the current thread.
pub fn run_install(
    toolchain: &Toolchain,
    settings: &ApkInstallSettings,
    request: &InstallRequest,
    trace_id: &str,
) -> InstallOutcome {
    let start = Instant::now();
    let args = install_args(request, settings);
    let result = run_command_with_timeout(&toolchain.adb, &args, toolchain.timeout, trace_id);
    let mut outcome = InstallOutcome {
        trace_id: trace_id.to_string(),
        serial: request.device.identifier.clone(),
        package_path: request.package_path.clone(),
        summary: String::new(),
        raw_output: String::new(),
        exit_code: None,
        duration_seconds: 0.0,
        finished_at: String::new(),
        error: None,
    };
    match result {
        Ok(output) => {
            outcome.summary = last_output_line(&output.stdout);
            outcome.raw_output = output.stdout;
            outcome.exit_code = output.exit_code;
            info!(
                trace_id = %trace_id,
                serial = %outcome.serial,
                exit_code = ?outcome.exit_code,
                summary = %outcome.summary,
                stderr = %output.stderr.trim(),
                "install finished"
            );
        }
        Err(err) => {
            warn!(trace_id = %trace_id, serial = %outcome.serial, error = %err, "install could not run");
            outcome.error = Some(err);
        }
    }
    outcome.duration_seconds = start.elapsed().as_secs_f64();
    outcome.finished_at = Utc::now().to_rfc3339();
    outcome
}

pub struct InstallHandle {
    trace_id: String,
    handle: JoinHandle<InstallOutcome>,
}

impl InstallHandle {
    /// Blocks until the install thread is done.
    pub fn wait(self) -> Result<InstallOutcome, AppError> {
        self.handle
            .join()
            .map_err(|_| AppError::system("Install thread panicked", &self.trace_id))
    }
}

/// Starts installs on background threads.
///
/// Overlapping installs are not queued; each runs its own adb process and completes
/// independently, even against the same device.
#[derive(Debug, Clone)]
pub struct InstallOrchestrator {
    toolchain: Toolchain,
    settings: ApkInstallSettings,
}

impl InstallOrchestrator {
    pub fn new(toolchain: Toolchain, settings: ApkInstallSettings) -> Self {
        Self { toolchain, settings }
    }

    /// Returns immediately. `on_complete` runs on the worker thread once adb exits; callers
    /// that need the result on their own thread forward it from there (e.g. over a channel).
    pub fn install_async<F>(
        &self,
        request: InstallRequest,
        trace_id: &str,
        on_complete: F,
    ) -> InstallHandle
    where
        F: FnOnce(&InstallOutcome) + Send + 'static,
    {
        let toolchain = self.toolchain.clone();
        let settings = self.settings.clone();
        let trace_clone = trace_id.to_string();
        info!(
            trace_id = %trace_id,
            serial = %request.device.identifier,
            path = %request.package_path,
            "starting install"
        );
        let handle = std::thread::spawn(move || {
            let outcome = run_install(&toolchain, &settings, &request, &trace_clone);
            on_complete(&outcome);
            outcome
        });
        InstallHandle {
            trace_id: trace_id.to_string(),
            handle,
        }
    }
}
