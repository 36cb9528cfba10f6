use std::path::Path;
use std::sync::mpsc;

use serde::Serialize;
use tracing::{info, warn};

use crate::app::config::{config_path, load_config, save_config, AppConfig};
use crate::app::error::AppError;
use crate::app::logging::init_logging;
use crate::app::models::{
    ApplicationMetadata, CommandResponse, Device, DiagnosticKind, IconPreview, InstallOutcome,
    InstallVerdict,
};
use crate::app::session::{resolve_trace_id, ApkSession};
use crate::app::tools::icon::icon_preview;
use crate::app::tools::locator::{validate_tool_program, AAPT, ADB};

pub const USAGE: &str = "Usage: apk_installer <command> [options]

Commands:
  inspect <apk>                 Show package metadata
  devices [--all]               List ready devices (--all: every device with its state)
  install <apk> [--serial S]    Install onto S, or the first ready device
  config [--path] [--init]      Show the effective configuration (--path: its location,
                                --init: write it to that location)

Options:
  --json                        Print JSON
  --trace-id ID                 Reuse a trace id in logs and output";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Inspect { path: String },
    Devices { all: bool },
    Install { path: String, serial: Option<String> },
    Config { path_only: bool, init: bool },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub command: CliCommand,
    pub json: bool,
    pub trace_id: Option<String>,
}

#[derive(Serialize)]
struct InspectReport {
    metadata: ApplicationMetadata,
    icon: Option<IconPreview>,
}

#[derive(Serialize)]
struct InstallReport {
    outcome: InstallOutcome,
    verdict: &'static str,
    verdict_description: &'static str,
    success: bool,
}

#[derive(Serialize)]
struct ToolStatus {
    program: String,
    error: Option<String>,
}

#[derive(Serialize)]
struct ConfigReport {
    path: String,
    config: AppConfig,
    aapt: ToolStatus,
    adb: ToolStatus,
}

pub fn parse_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut command_name: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();
    let mut serial: Option<String> = None;
    let mut json = false;
    let mut all = false;
    let mut path_only = false;
    let mut init = false;
    let mut trace_id: Option<String> = None;

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--all" => all = true,
            "--path" => path_only = true,
            "--init" => init = true,
            "--serial" | "-s" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--trace-id" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--trace-id requires a value".to_string())?;
                trace_id = Some(value);
            }
            "-h" | "--help" => {
                command_name = Some("help".to_string());
            }
            other if other.starts_with('-') && other.len() > 1 => {
                return Err(format!("Unknown option: {other}"));
            }
            _ => {
                if command_name.is_none() {
                    command_name = Some(arg);
                } else {
                    positional.push(arg);
                }
            }
        }
    }

    let command = match command_name.as_deref() {
        None | Some("help") => CliCommand::Help,
        Some("inspect") => CliCommand::Inspect {
            path: single_path(&positional, "inspect")?,
        },
        Some("devices") => {
            no_positional(&positional, "devices")?;
            CliCommand::Devices { all }
        }
        Some("install") => CliCommand::Install {
            path: single_path(&positional, "install")?,
            serial,
        },
        Some("config") => {
            no_positional(&positional, "config")?;
            CliCommand::Config { path_only, init }
        }
        Some(other) => return Err(format!("Unknown command: {other}")),
    };

    Ok(CliArgs {
        command,
        json,
        trace_id,
    })
}

fn single_path(positional: &[String], command: &str) -> Result<String, String> {
    match positional {
        [path] => Ok(path.clone()),
        [] => Err(format!("{command} requires an APK path")),
        _ => Err(format!("{command} takes exactly one APK path")),
    }
}

fn no_positional(positional: &[String], command: &str) -> Result<(), String> {
    if positional.is_empty() {
        Ok(())
    } else {
        Err(format!("{command} takes no arguments"))
    }
}

/// First ready device unless a serial is given, in which case it must be ready.
pub fn choose_device(ready: &[Device], serial: Option<&str>, trace_id: &str) -> Result<Device, AppError> {
    match serial {
        Some(serial) => ready
            .iter()
            .find(|device| device.identifier == serial)
            .cloned()
            .ok_or_else(|| AppError::validation(format!("Device {serial} is not ready"), trace_id)),
        None => ready
            .first()
            .cloned()
            .ok_or_else(|| AppError::dependency("No Device", trace_id)),
    }
}

fn print_json<T: Serialize>(trace_id: &str, data: T) {
    let response = CommandResponse {
        trace_id: trace_id.to_string(),
        data,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&response).unwrap_or_default()
    );
}

fn report_error(err: &AppError, json: bool) -> i32 {
    if json {
        println!("{}", serde_json::to_string_pretty(err).unwrap_or_default());
    } else {
        eprintln!("error: {err}");
    }
    1
}

pub fn run_cli(args: CliArgs) -> i32 {
    if args.command == CliCommand::Help {
        println!("{USAGE}");
        return 0;
    }

    let trace_id = resolve_trace_id(args.trace_id.clone());
    let config = match load_config(&trace_id) {
        Ok(config) => config,
        Err(err) => return report_error(&err, args.json),
    };
    init_logging(&config.logging.log_level);
    let session = ApkSession::from_config(&config);

    let result = match args.command {
        CliCommand::Inspect { path } => inspect(&session, &path, args.json, &trace_id),
        CliCommand::Devices { all } => {
            devices(&session, all, args.json, &trace_id);
            Ok(0)
        }
        CliCommand::Install { path, serial } => {
            install(&session, &path, serial.as_deref(), args.json, &trace_id)
        }
        CliCommand::Config { path_only, init } => {
            show_config(&session, config, path_only, init, args.json, &trace_id)
        }
        CliCommand::Help => Ok(0),
    };

    result.unwrap_or_else(|err| report_error(&err, args.json))
}

fn inspect(session: &ApkSession, path: &str, json: bool, trace_id: &str) -> Result<i32, AppError> {
    let metadata = session.parse(path, trace_id)?;
    if json {
        let icon = icon_preview(Path::new(&metadata.icon_file), &metadata.icon_entry_name);
        print_json(trace_id, InspectReport { metadata, icon });
    } else {
        print_metadata(&metadata);
    }
    Ok(0)
}

fn print_metadata(metadata: &ApplicationMetadata) {
    println!("Label: {}", metadata.label);
    println!("Package: {}", metadata.package_id);
    println!("{}", metadata.version_code_line());
    println!("{}", metadata.version_name_line());
    println!("{}", metadata.size_line());
    if !metadata.min_sdk_version.is_empty() {
        println!("Min SDK: {}", metadata.min_sdk_version);
    }
    if !metadata.target_sdk_version.is_empty() {
        println!("Target SDK: {}", metadata.target_sdk_version);
    }
    if Path::new(&metadata.icon_file).is_file() {
        println!("Icon: {}", metadata.icon_file);
    }
    for diagnostic in &metadata.diagnostics {
        match diagnostic.kind {
            DiagnosticKind::ToolUnavailable | DiagnosticKind::ToolFailed | DiagnosticKind::IconFailed => {
                eprintln!("warning: {}", diagnostic.message)
            }
            DiagnosticKind::ParseMiss | DiagnosticKind::IconSkipped => {}
        }
    }
}

fn devices(session: &ApkSession, all: bool, json: bool, trace_id: &str) {
    if all {
        let summaries = session.list_device_summaries(trace_id);
        if json {
            print_json(trace_id, summaries);
        } else if summaries.is_empty() {
            println!("No Device");
        } else {
            for summary in summaries {
                println!("{}\t{}", summary.serial, summary.state);
            }
        }
        return;
    }

    let ready = session.list_devices(trace_id);
    if json {
        print_json(trace_id, ready);
    } else if ready.is_empty() {
        println!("No Device");
    } else {
        for device in ready {
            println!("{}", device.identifier);
        }
    }
}

fn install(
    session: &ApkSession,
    path: &str,
    serial: Option<&str>,
    json: bool,
    trace_id: &str,
) -> Result<i32, AppError> {
    let metadata = session.parse(path, trace_id)?;
    let ready = session.list_devices(trace_id);
    let device = choose_device(&ready, serial, trace_id)?;

    if !json {
        println!(
            "{} ({}) -> {}",
            metadata.label, metadata.package_id, device.identifier
        );
        println!("Installing...");
    }

    let (sender, receiver) = mpsc::channel();
    let handle = session.install_async(device, &metadata.path, trace_id, move |outcome| {
        let _ = sender.send(outcome.clone());
    })?;
    let delivered = receiver.recv().ok();
    let joined = handle.wait();
    let outcome = match (delivered, joined) {
        (Some(outcome), _) => outcome,
        (None, Ok(outcome)) => outcome,
        (None, Err(err)) => return Err(err),
    };

    if let Some(err) = outcome.error.clone() {
        warn!(trace_id = %trace_id, error = %err, "install did not run");
        return Err(err);
    }

    let verdict = InstallVerdict::classify(&outcome.summary);
    let code = if verdict.is_success() { 0 } else { 1 };
    if json {
        print_json(
            trace_id,
            InstallReport {
                outcome,
                verdict: verdict.code(),
                verdict_description: verdict.description(),
                success: verdict.is_success(),
            },
        );
    } else {
        println!("{}", outcome.summary);
        if !verdict.is_success() {
            eprintln!("{}: {}", verdict.code(), verdict.description());
        }
    }
    Ok(code)
}

fn show_config(
    session: &ApkSession,
    config: AppConfig,
    path_only: bool,
    init: bool,
    json: bool,
    trace_id: &str,
) -> Result<i32, AppError> {
    let path = config_path().to_string_lossy().to_string();
    if init {
        save_config(&config, trace_id)?;
        info!(trace_id = %trace_id, path = %path, "wrote configuration");
    }
    if path_only {
        if json {
            print_json(trace_id, path);
        } else {
            println!("{path}");
        }
        return Ok(0);
    }

    let toolchain = session.toolchain();
    let report = ConfigReport {
        path,
        config,
        aapt: ToolStatus {
            program: toolchain.aapt.clone(),
            error: validate_tool_program(&toolchain.aapt, AAPT).err(),
        },
        adb: ToolStatus {
            program: toolchain.adb.clone(),
            error: validate_tool_program(&toolchain.adb, ADB).err(),
        },
    };
    if json {
        print_json(trace_id, report);
    } else {
        println!("config: {}", report.path);
        for (name, status) in [(AAPT, &report.aapt), (ADB, &report.adb)] {
            match &status.error {
                Some(error) => println!("{name}: {} ({error})", status.program),
                None => println!("{name}: {}", status.program),
            }
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&report.config).unwrap_or_default()
        );
    }
    Ok(0)
}
