use tracing::{info, warn};

use crate::app::models::{Device, DeviceSummary};
use crate::app::tools::locator::Toolchain;
use crate::app::tools::runner::run_command_with_timeout;

const DEVICES_HEADER: &str = "list of devices attached";

/// Lines after the "List of devices attached" header, or every line when the header is absent.
fn device_block(output: &str) -> impl Iterator<Item = &str> {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines
        .iter()
        .position(|line| line.to_lowercase().contains(DEVICES_HEADER))
        .map(|index| index + 1)
        .unwrap_or(0);
    lines.into_iter().skip(start)
}

pub fn parse_adb_devices(output: &str) -> Vec<DeviceSummary> {
    device_block(output)
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 2 {
                return None;
            }
            let mut summary = DeviceSummary {
                serial: tokens[0].to_string(),
                state: tokens[1].to_string(),
                model: None,
                product: None,
                device: None,
                transport_id: None,
            };
            for token in tokens.iter().skip(2) {
                if let Some(value) = token.strip_prefix("model:") {
                    summary.model = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("product:") {
                    summary.product = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("device:") {
                    summary.device = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("transport_id:") {
                    summary.transport_id = Some(value.to_string());
                }
            }
            Some(summary)
        })
        .collect()
}

pub fn ready_devices(output: &str) -> Vec<Device> {
    parse_adb_devices(output)
        .into_iter()
        .filter(DeviceSummary::is_ready)
        .map(|summary| Device::new(summary.serial))
        .collect()
}

/// Every attached device with its state. A missing or failing adb yields an empty list.
pub fn list_device_summaries(toolchain: &Toolchain, trace_id: &str) -> Vec<DeviceSummary> {
    let args = vec!["devices".to_string()];
    match run_command_with_timeout(&toolchain.adb, &args, toolchain.timeout, trace_id) {
        Ok(output) => {
            if !output.success() {
                warn!(trace_id = %trace_id, exit_code = ?output.exit_code, stderr = %output.stderr.trim(), "adb devices failed");
            }
            parse_adb_devices(&output.stdout)
        }
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "adb unavailable; no devices listed");
            Vec::new()
        }
    }
}

/// Devices in the ready state, enumerated fresh on every call.
pub fn list_devices(toolchain: &Toolchain, trace_id: &str) -> Vec<Device> {
    let devices: Vec<Device> = list_device_summaries(toolchain, trace_id)
        .into_iter()
        .filter(DeviceSummary::is_ready)
        .map(|summary| Device::new(summary.serial))
        .collect();
    info!(trace_id = %trace_id, count = devices.len(), "listed ready devices");
    devices
}
