use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use base64::Engine as _;
use mime_guess::MimeGuess;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::app::config::IconSettings;
use crate::app::models::IconPreview;

const DEFAULT_ICON_FILE: &str = "apk_installer_icon.png";
const MAX_PREVIEW_BYTES: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconOutcome {
    Extracted { bytes: u64 },
    Skipped(String),
    Failed(String),
}

/// Where extracted icons land.
///
/// The fixed slot is shared by the whole process and assumes a single writer: two parses
/// running at once both delete and rewrite the same file, and the last one to finish wins.
/// `per_call_path` trades that race for one file per extraction; issuing a new per-call
/// path removes the previous one, so at most one stays on disk.
#[derive(Debug)]
pub struct IconSlot {
    path: PathBuf,
    per_call: bool,
    last_issued: Mutex<Option<PathBuf>>,
}

impl IconSlot {
    pub fn fixed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            per_call: false,
            last_issued: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &IconSettings) -> Self {
        let path = if settings.output_path.trim().is_empty() {
            std::env::temp_dir().join(DEFAULT_ICON_FILE)
        } else {
            PathBuf::from(settings.output_path.trim())
        };
        Self {
            path,
            per_call: settings.per_call_path,
            last_issued: Mutex::new(None),
        }
    }

    pub fn target_path(&self) -> PathBuf {
        if !self.per_call {
            return self.path.clone();
        }
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let stem = self
            .path
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("apk_installer_icon");
        let ext = self
            .path
            .extension()
            .and_then(|value| value.to_str())
            .unwrap_or("png");
        let next = dir.join(format!("{stem}_{}.{ext}", Uuid::new_v4()));

        let mut last = self.last_issued.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = last.replace(next.clone()) {
            if let Err(err) = fs::remove_file(&previous) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = %previous.display(), error = %err, "failed to remove previous icon");
                }
            }
        }
        next
    }
}

/// Replaces `output_path` with the archive entry `entry_name`.
///
/// Any previous file is removed first. An empty name, a missing entry or an unreadable
/// archive leaves `output_path` absent and is reported through the outcome.
pub fn extract_icon(
    archive_path: &Path,
    entry_name: &str,
    output_path: &Path,
    trace_id: &str,
) -> IconOutcome {
    match fs::remove_file(output_path) {
        Ok(()) => debug!(trace_id = %trace_id, path = %output_path.display(), "removed previous icon"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "failed to remove previous icon");
            return IconOutcome::Failed(format!("Failed to remove previous icon: {err}"));
        }
    }

    let entry_name = entry_name.trim();
    if entry_name.is_empty() {
        return IconOutcome::Skipped("No icon entry in package".to_string());
    }

    match write_entry(archive_path, entry_name, output_path) {
        Ok(Some(bytes)) => IconOutcome::Extracted { bytes },
        Ok(None) => IconOutcome::Skipped(format!("Icon entry not found: {entry_name}")),
        Err(message) => {
            warn!(trace_id = %trace_id, error = %message, "icon extraction failed");
            IconOutcome::Failed(message)
        }
    }
}

fn write_entry(archive_path: &Path, entry_name: &str, output_path: &Path) -> Result<Option<u64>, String> {
    let file = File::open(archive_path).map_err(|err| format!("Failed to open APK: {err}"))?;
    let mut archive = ZipArchive::new(file).map_err(|err| format!("Invalid APK: {err}"))?;
    let mut entry = match archive.by_name(entry_name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(format!("Failed to read icon entry: {err}")),
    };
    let mut buffer = Vec::new();
    entry
        .read_to_end(&mut buffer)
        .map_err(|err| format!("Failed to read icon bytes: {err}"))?;

    let dir = output_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir).map_err(|err| format!("Failed to create icon dir: {err}"))?;

    // Written beside the target and renamed into place so readers never see a partial file.
    let mut staged =
        NamedTempFile::new_in(&dir).map_err(|err| format!("Failed to stage icon: {err}"))?;
    staged
        .write_all(&buffer)
        .map_err(|err| format!("Failed to write icon: {err}"))?;
    staged
        .persist(output_path)
        .map_err(|err| format!("Failed to move icon into place: {}", err.error))?;
    Ok(Some(buffer.len() as u64))
}

/// Data URL for an extracted icon, if it is an image small enough to inline.
pub fn icon_preview(icon_file: &Path, entry_name: &str) -> Option<IconPreview> {
    let mime = MimeGuess::from_path(entry_name).first()?;
    if mime.type_() != mime_guess::mime::IMAGE {
        return None;
    }
    let bytes = fs::read(icon_file).ok()?;
    if bytes.is_empty() || bytes.len() > MAX_PREVIEW_BYTES {
        return None;
    }
    let mime_type = mime.essence_str().to_string();
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Some(IconPreview {
        data_url: format!("data:{mime_type};base64,{encoded}"),
        mime_type,
    })
}
