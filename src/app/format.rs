/// File-style byte count: decimal units, "Zero KB" for empty files,
/// whole kilobytes, up to one decimal for megabytes and two above that.
/// Trailing zero digits are dropped ("5 MB", "2.1 GB").
pub fn format_file_size(bytes: u64) -> String {
    match bytes {
        0 => return "Zero KB".to_string(),
        1 => return "1 byte".to_string(),
        2..=999 => return format!("{bytes} bytes"),
        _ => {}
    }

    const UNITS: [(&str, usize); 4] = [("KB", 0), ("MB", 1), ("GB", 2), ("TB", 2)];
    let mut value = bytes as f64 / 1000.0;
    let mut index = 0;
    loop {
        let (unit, decimals) = UNITS[index];
        let scale = 10f64.powi(decimals as i32);
        let rounded = (value * scale).round() / scale;
        if rounded < 1000.0 || index == UNITS.len() - 1 {
            let digits = format!("{rounded:.decimals$}");
            let digits = if digits.contains('.') {
                digits.trim_end_matches('0').trim_end_matches('.')
            } else {
                digits.as_str()
            };
            return format!("{digits} {unit}");
        }
        value /= 1000.0;
        index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_small_sizes() {
        assert_eq!(format_file_size(0), "Zero KB");
        assert_eq!(format_file_size(1), "1 byte");
        assert_eq!(format_file_size(999), "999 bytes");
    }

    #[test]
    fn formats_scaled_sizes() {
        assert_eq!(format_file_size(1_000), "1 KB");
        assert_eq!(format_file_size(45_600), "46 KB");
        assert_eq!(format_file_size(1_234_567), "1.2 MB");
        assert_eq!(format_file_size(2_345_678_901), "2.35 GB");
    }

    #[test]
    fn drops_trailing_zero_digits() {
        assert_eq!(format_file_size(5_000_000), "5 MB");
        assert_eq!(format_file_size(2_000_000_000), "2 GB");
        assert_eq!(format_file_size(2_100_000_000), "2.1 GB");
        assert_eq!(format_file_size(120_000), "120 KB");
    }

    #[test]
    fn rounding_carries_into_next_unit() {
        assert_eq!(format_file_size(999_700), "1 MB");
    }
}
