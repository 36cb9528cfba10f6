use serde::{Deserialize, Serialize};

use crate::app::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ToolUnavailable,
    ToolFailed,
    ParseMiss,
    IconSkipped,
    IconFailed,
}

/// A non-fatal condition collected while building metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub field: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.map(str::to_string),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationMetadata {
    pub path: String,
    pub package_id: String,
    pub label: String,
    pub icon_entry_name: String,
    pub icon_file: String,
    pub version_code: String,
    pub version_name: String,
    pub min_sdk_version: String,
    pub target_sdk_version: String,
    pub size_bytes: u64,
    pub size_display: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl ApplicationMetadata {
    /// Every other field stays empty until the parser fills it.
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            package_id: String::new(),
            label: String::new(),
            icon_entry_name: String::new(),
            icon_file: String::new(),
            version_code: String::new(),
            version_name: String::new(),
            min_sdk_version: String::new(),
            target_sdk_version: String::new(),
            size_bytes: 0,
            size_display: String::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn tool_unavailable(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|item| item.kind == DiagnosticKind::ToolUnavailable)
    }

    pub fn version_code_line(&self) -> String {
        format!("Version Code: {}", self.version_code)
    }

    pub fn version_name_line(&self) -> String {
        format!("Version Name: {}", self.version_name)
    }

    pub fn size_line(&self) -> String {
        format!("Size: {}", self.size_display)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Device {
    pub identifier: String,
}

impl Device {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }
}

/// One line of `adb devices` output, whatever its state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
    pub product: Option<String>,
    pub device: Option<String>,
    pub transport_id: Option<String>,
}

impl DeviceSummary {
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallRequest {
    pub device: Device,
    pub package_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub trace_id: String,
    pub serial: String,
    pub package_path: String,
    /// Last line of the trimmed install output, unclassified.
    pub summary: String,
    pub raw_output: String,
    pub exit_code: Option<i32>,
    pub duration_seconds: f64,
    pub finished_at: String,
    /// Set only when the install command could not be run at all.
    pub error: Option<AppError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IconPreview {
    pub mime_type: String,
    pub data_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstallVerdict {
    Success,
    InstallFailedAlreadyExists,
    InstallFailedUpdateIncompatible,
    InstallFailedDuplicatePackage,
    InstallFailedOlderSdk,
    InstallFailedNewerSdk,
    InstallFailedVersionDowngrade,
    InstallFailedInsufficientStorage,
    InstallFailedUserRestricted,
    InstallFailedVerificationFailure,
    InstallParseFailedNotApk,
    InstallParseFailedNoCertificates,
    InstallFailedInvalidApk,
    InstallFailedNoMatchingAbis,
    InstallFailedTestOnly,
    UnknownError,
}

impl InstallVerdict {
    const FAILURES: [InstallVerdict; 14] = [
        InstallVerdict::InstallFailedAlreadyExists,
        InstallVerdict::InstallFailedUpdateIncompatible,
        InstallVerdict::InstallFailedDuplicatePackage,
        InstallVerdict::InstallFailedOlderSdk,
        InstallVerdict::InstallFailedNewerSdk,
        InstallVerdict::InstallFailedVersionDowngrade,
        InstallVerdict::InstallFailedInsufficientStorage,
        InstallVerdict::InstallFailedUserRestricted,
        InstallVerdict::InstallFailedVerificationFailure,
        InstallVerdict::InstallParseFailedNotApk,
        InstallVerdict::InstallParseFailedNoCertificates,
        InstallVerdict::InstallFailedInvalidApk,
        InstallVerdict::InstallFailedNoMatchingAbis,
        InstallVerdict::InstallFailedTestOnly,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            InstallVerdict::Success => "SUCCESS",
            InstallVerdict::InstallFailedAlreadyExists => "INSTALL_FAILED_ALREADY_EXISTS",
            InstallVerdict::InstallFailedUpdateIncompatible => "INSTALL_FAILED_UPDATE_INCOMPATIBLE",
            InstallVerdict::InstallFailedDuplicatePackage => "INSTALL_FAILED_DUPLICATE_PACKAGE",
            InstallVerdict::InstallFailedOlderSdk => "INSTALL_FAILED_OLDER_SDK",
            InstallVerdict::InstallFailedNewerSdk => "INSTALL_FAILED_NEWER_SDK",
            InstallVerdict::InstallFailedVersionDowngrade => "INSTALL_FAILED_VERSION_DOWNGRADE",
            InstallVerdict::InstallFailedInsufficientStorage => {
                "INSTALL_FAILED_INSUFFICIENT_STORAGE"
            }
            InstallVerdict::InstallFailedUserRestricted => "INSTALL_FAILED_USER_RESTRICTED",
            InstallVerdict::InstallFailedVerificationFailure => {
                "INSTALL_FAILED_VERIFICATION_FAILURE"
            }
            InstallVerdict::InstallParseFailedNotApk => "INSTALL_PARSE_FAILED_NOT_APK",
            InstallVerdict::InstallParseFailedNoCertificates => {
                "INSTALL_PARSE_FAILED_NO_CERTIFICATES"
            }
            InstallVerdict::InstallFailedInvalidApk => "INSTALL_FAILED_INVALID_APK",
            InstallVerdict::InstallFailedNoMatchingAbis => "INSTALL_FAILED_NO_MATCHING_ABIS",
            InstallVerdict::InstallFailedTestOnly => "INSTALL_FAILED_TEST_ONLY",
            InstallVerdict::UnknownError => "UNKNOWN_ERROR",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            InstallVerdict::Success => "Installation successful",
            InstallVerdict::InstallFailedAlreadyExists => {
                "App already installed with different signature"
            }
            InstallVerdict::InstallFailedUpdateIncompatible => {
                "Update incompatible with existing installation"
            }
            InstallVerdict::InstallFailedDuplicatePackage => "Package already exists on device",
            InstallVerdict::InstallFailedOlderSdk => "Device Android version too old for this APK",
            InstallVerdict::InstallFailedNewerSdk => "APK requires older Android version",
            InstallVerdict::InstallFailedVersionDowngrade => {
                "Cannot downgrade - enable allow_downgrade or uninstall first"
            }
            InstallVerdict::InstallFailedInsufficientStorage => "Not enough storage space on device",
            InstallVerdict::InstallFailedUserRestricted => "User restricted from installing apps",
            InstallVerdict::InstallFailedVerificationFailure => "Package verification failed",
            InstallVerdict::InstallParseFailedNotApk => "File is not a valid APK",
            InstallVerdict::InstallParseFailedNoCertificates => "APK is not signed",
            InstallVerdict::InstallFailedInvalidApk => "APK file is corrupted or invalid",
            InstallVerdict::InstallFailedNoMatchingAbis => {
                "APK not compatible with device CPU architecture"
            }
            InstallVerdict::InstallFailedTestOnly => {
                "Test-only APK - enable allow_test_packages to install"
            }
            InstallVerdict::UnknownError => "Unknown installation error",
        }
    }

    /// Caller-side reading of an install summary line.
    pub fn classify(summary: &str) -> Self {
        let upper = summary.trim().to_uppercase();
        if upper.is_empty() {
            return InstallVerdict::UnknownError;
        }
        if upper == "SUCCESS" {
            return InstallVerdict::Success;
        }
        Self::FAILURES
            .into_iter()
            .find(|verdict| upper.contains(verdict.code()))
            .unwrap_or(InstallVerdict::UnknownError)
    }

    pub fn is_success(&self) -> bool {
        *self == InstallVerdict::Success
    }
}
