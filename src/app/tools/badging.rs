use std::fs::{self, File};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};
use zip::ZipArchive;

use crate::app::error::AppError;
use crate::app::format::format_file_size;
use crate::app::models::{ApplicationMetadata, Diagnostic, DiagnosticKind};
use crate::app::tools::icon::{extract_icon, IconOutcome, IconSlot};
use crate::app::tools::locator::Toolchain;
use crate::app::tools::pattern::first_match_with;
use crate::app::tools::runner::run_command_with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgingField {
    PackageId,
    Label,
    IconEntry,
    VersionCode,
    VersionName,
    MinSdkVersion,
    TargetSdkVersion,
}

impl BadgingField {
    pub fn name(&self) -> &'static str {
        match self {
            BadgingField::PackageId => "package_id",
            BadgingField::Label => "label",
            BadgingField::IconEntry => "icon_entry_name",
            BadgingField::VersionCode => "version_code",
            BadgingField::VersionName => "version_name",
            BadgingField::MinSdkVersion => "min_sdk_version",
            BadgingField::TargetSdkVersion => "target_sdk_version",
        }
    }

    fn slot<'a>(&self, metadata: &'a mut ApplicationMetadata) -> &'a mut String {
        match self {
            BadgingField::PackageId => &mut metadata.package_id,
            BadgingField::Label => &mut metadata.label,
            BadgingField::IconEntry => &mut metadata.icon_entry_name,
            BadgingField::VersionCode => &mut metadata.version_code,
            BadgingField::VersionName => &mut metadata.version_name,
            BadgingField::MinSdkVersion => &mut metadata.min_sdk_version,
            BadgingField::TargetSdkVersion => &mut metadata.target_sdk_version,
        }
    }
}

/// `aapt d badging` keys, one capture group each.
pub const BADGING_PATTERNS: [(BadgingField, &str); 7] = [
    (BadgingField::PackageId, r"package: name='([\w.\-]+)'"),
    (BadgingField::Label, r"application-label:'([^'\n]+)'"),
    (BadgingField::IconEntry, r"icon='([^'\n]+)'"),
    (BadgingField::VersionCode, r"versionCode='(\d+)'"),
    (BadgingField::VersionName, r"versionName='([^'\n]+)'"),
    (BadgingField::MinSdkVersion, r"(?m)^sdkVersion:'(\d+)'"),
    (BadgingField::TargetSdkVersion, r"(?m)^targetSdkVersion:'(\d+)'"),
];

fn compiled_patterns() -> &'static [(BadgingField, Regex)] {
    static COMPILED: OnceLock<Vec<(BadgingField, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        BADGING_PATTERNS
            .iter()
            .filter_map(|(field, pattern)| Regex::new(pattern).ok().map(|re| (*field, re)))
            .collect()
    })
}

/// Each field is extracted on its own; a miss leaves the field empty.
pub fn extract_badging(dump: &str) -> Vec<(BadgingField, Option<String>)> {
    compiled_patterns()
        .iter()
        .map(|(field, re)| {
            let value = first_match_with(re, dump);
            (*field, Some(value).filter(|value| !value.is_empty()))
        })
        .collect()
}

pub fn apply_badging(metadata: &mut ApplicationMetadata, dump: &str) {
    let record_misses = !dump.trim().is_empty();
    for (field, value) in extract_badging(dump) {
        match value {
            Some(value) => *field.slot(metadata) = value,
            None if record_misses => metadata.diagnostics.push(Diagnostic::new(
                DiagnosticKind::ParseMiss,
                Some(field.name()),
                format!("{} not found in badging output", field.name()),
            )),
            None => {}
        }
    }
}

fn run_badging(toolchain: &Toolchain, path: &str, metadata: &mut ApplicationMetadata, trace_id: &str) -> String {
    let args = vec!["d".to_string(), "badging".to_string(), path.to_string()];
    match run_command_with_timeout(&toolchain.aapt, &args, toolchain.timeout, trace_id) {
        Ok(output) => {
            if !output.success() {
                let detail = output.stderr.lines().next().unwrap_or_default().trim().to_string();
                warn!(trace_id = %trace_id, exit_code = ?output.exit_code, stderr = %detail, "aapt badging failed");
                metadata.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::ToolFailed,
                    None,
                    format!("aapt exited with {:?}: {detail}", output.exit_code),
                ));
            }
            output.stdout
        }
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "aapt unavailable");
            let kind = if err.is_tool_unavailable() {
                DiagnosticKind::ToolUnavailable
            } else {
                DiagnosticKind::ToolFailed
            };
            metadata.diagnostics.push(Diagnostic::new(kind, None, err.error));
            String::new()
        }
    }
}

fn package_size(path: &str, trace_id: &str) -> Result<u64, AppError> {
    let path_obj = Path::new(path);
    let file_meta = fs::metadata(path_obj)
        .map_err(|err| AppError::io(format!("Failed to read package file {path}: {err}"), trace_id))?;
    if !file_meta.is_file() {
        return Err(AppError::validation(format!("Not a file: {path}"), trace_id));
    }
    let file = File::open(path_obj)
        .map_err(|err| AppError::io(format!("Failed to open package file {path}: {err}"), trace_id))?;
    ZipArchive::new(file)
        .map_err(|err| AppError::validation(format!("Invalid APK: {err}"), trace_id))?;
    Ok(file_meta.len())
}

/// Builds metadata for the package at `path`.
///
/// Tool problems and missing fields degrade to empty values and are listed in
/// `diagnostics`. Only a package file that cannot be read as an archive is an error.
pub fn parse_apk(
    toolchain: &Toolchain,
    icon_slot: &IconSlot,
    path: &str,
    trace_id: &str,
) -> Result<ApplicationMetadata, AppError> {
    let mut metadata = ApplicationMetadata::for_path(path);

    let dump = run_badging(toolchain, path, &mut metadata, trace_id);
    apply_badging(&mut metadata, &dump);

    metadata.size_bytes = package_size(path, trace_id)?;
    metadata.size_display = format_file_size(metadata.size_bytes);

    let icon_target = icon_slot.target_path();
    metadata.icon_file = icon_target.to_string_lossy().to_string();
    match extract_icon(Path::new(path), &metadata.icon_entry_name, &icon_target, trace_id) {
        IconOutcome::Extracted { .. } => {}
        IconOutcome::Skipped(message) => metadata.diagnostics.push(Diagnostic::new(
            DiagnosticKind::IconSkipped,
            Some(BadgingField::IconEntry.name()),
            message,
        )),
        IconOutcome::Failed(message) => metadata.diagnostics.push(Diagnostic::new(
            DiagnosticKind::IconFailed,
            Some(BadgingField::IconEntry.name()),
            message,
        )),
    }

    info!(
        trace_id = %trace_id,
        path = %metadata.path,
        package_id = %metadata.package_id,
        version_code = %metadata.version_code,
        version_name = %metadata.version_name,
        size = %metadata.size_display,
        diagnostics = metadata.diagnostics.len(),
        "parsed apk metadata"
    );
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BADGING: &str = "package: name='com.example.notes' versionCode='123' versionName='2.4.1' platformBuildVersionName='13' compileSdkVersion='33'\n\
sdkVersion:'21'\n\
targetSdkVersion:'33'\n\
uses-permission: name='android.permission.INTERNET'\n\
application-label:'Example Notes'\n\
application-label-de:'Beispiel Notizen'\n\
application-icon-160:'res/mipmap-mdpi-v4/ic_launcher.png'\n\
application-icon-480:'res/mipmap-xxhdpi-v4/ic_launcher.png'\n\
application: label='Example Notes' icon='res/mipmap-mdpi-v4/ic_launcher.png'\n\
launchable-activity: name='com.example.notes.MainActivity'  label='' icon=''\n";

    fn value(fields: &[(BadgingField, Option<String>)], field: BadgingField) -> Option<String> {
        fields
            .iter()
            .find(|(candidate, _)| *candidate == field)
            .and_then(|(_, value)| value.clone())
    }

    #[test]
    fn every_pattern_compiles() {
        assert_eq!(compiled_patterns().len(), BADGING_PATTERNS.len());
    }

    #[test]
    fn extracts_all_fields() {
        let fields = extract_badging(BADGING);
        assert_eq!(value(&fields, BadgingField::PackageId).as_deref(), Some("com.example.notes"));
        assert_eq!(value(&fields, BadgingField::Label).as_deref(), Some("Example Notes"));
        assert_eq!(
            value(&fields, BadgingField::IconEntry).as_deref(),
            Some("res/mipmap-mdpi-v4/ic_launcher.png")
        );
        assert_eq!(value(&fields, BadgingField::VersionCode).as_deref(), Some("123"));
        assert_eq!(value(&fields, BadgingField::VersionName).as_deref(), Some("2.4.1"));
        assert_eq!(value(&fields, BadgingField::MinSdkVersion).as_deref(), Some("21"));
        assert_eq!(value(&fields, BadgingField::TargetSdkVersion).as_deref(), Some("33"));
    }

    #[test]
    fn missing_version_name_is_empty_and_recorded() {
        let dump = "package: name='com.example' versionCode='9'\napplication-label:'Ex'\n";
        let mut metadata = ApplicationMetadata::for_path("/tmp/x.apk");
        apply_badging(&mut metadata, dump);
        assert_eq!(metadata.version_code, "9");
        assert_eq!(metadata.version_name, "");
        assert!(metadata.diagnostics.iter().any(|item| {
            item.kind == DiagnosticKind::ParseMiss && item.field.as_deref() == Some("version_name")
        }));
    }

    #[test]
    fn empty_dump_records_no_parse_misses() {
        let mut metadata = ApplicationMetadata::for_path("/tmp/x.apk");
        apply_badging(&mut metadata, "");
        assert!(metadata.diagnostics.is_empty());
        assert_eq!(metadata.package_id, "");
    }
}
