use crate::error::{GrabError, Result};

const KIB: u32 = 1024;

/// Parse a byte quantity such as `"512"`, `"10k"`, `"3MB"` or `"1G"`.
///
/// Digits accumulate left to right. A unit letter scales the accumulated
/// value by 1024 once per order of magnitude (`g` falls through `m` and
/// `k`), and a `b` or the end of the string finishes the value. Anything
/// after the unit is ignored. An empty string yields 0.
///
/// Overflow is detected before every multiplication with the check
/// `u32::MAX / multiplier <= value`, so values right at the edge of the
/// range are rejected as well.
pub fn parse_size(size_str: &str) -> Result<u32> {
    let mut size: u32 = 0;

    for c in size_str.chars() {
        let magnitude = match c {
            '0'..='9' => {
                check_overflow(size, 10, size_str)?;
                size = size * 10 + (c as u32 - '0' as u32);
                continue;
            }
            'g' | 'G' => 3,
            'm' | 'M' => 2,
            'k' | 'K' => 1,
            'b' | 'B' => 0,
            _ => {
                return Err(GrabError::config(format!(
                    "Invalid size value '{size_str}': unexpected character '{c}'"
                )));
            }
        };

        for _ in 0..magnitude {
            check_overflow(size, KIB, size_str)?;
            size *= KIB;
        }
        return Ok(size);
    }

    Ok(size)
}

#[inline]
fn check_overflow(size: u32, multiplier: u32, input: &str) -> Result<()> {
    if u32::MAX / multiplier <= size {
        return Err(GrabError::Overflow(input.to_string()));
    }
    Ok(())
}

/// Convert bytes to a human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_digits() {
        assert_eq!(parse_size("32456").unwrap(), 32456);
        assert_eq!(parse_size("0").unwrap(), 0);
    }

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(parse_size("").unwrap(), 0);
    }

    #[test]
    fn units_scale_cumulatively() {
        assert_eq!(parse_size("10K").unwrap(), 10240);
        assert_eq!(parse_size("10k").unwrap(), 10240);
        assert_eq!(parse_size("2m").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1_073_741_824);
        assert_eq!(parse_size("3g").unwrap(), 3_221_225_472);
    }

    #[test]
    fn trailing_b_is_accepted() {
        assert_eq!(parse_size("10kb").unwrap(), 10240);
        assert_eq!(parse_size("5MB").unwrap(), 5 * 1024 * 1024);
        assert_eq!(parse_size("100b").unwrap(), 100);
    }

    #[test]
    fn input_after_unit_is_ignored() {
        assert_eq!(parse_size("4kbytes").unwrap(), 4096);
    }

    #[test]
    fn overflow_on_unit_multiplication() {
        assert!(matches!(parse_size("4G"), Err(GrabError::Overflow(_))));
        assert!(matches!(
            parse_size("5000000k"),
            Err(GrabError::Overflow(_))
        ));
    }

    #[test]
    fn overflow_on_digit_accumulation() {
        // 429496729 * 10 would still fit for a final digit of 0..=5,
        // but the guard fires as soon as MAX / 10 <= value.
        assert!(matches!(
            parse_size("4294967290"),
            Err(GrabError::Overflow(_))
        ));
        assert!(matches!(
            parse_size("99999999999"),
            Err(GrabError::Overflow(_))
        ));
        assert_eq!(parse_size("429496728").unwrap(), 429_496_728);
    }

    #[test]
    fn rejects_stray_characters() {
        assert!(matches!(parse_size("1.5k"), Err(GrabError::Config(_))));
        assert!(matches!(parse_size("abc"), Err(GrabError::Config(_))));
        assert!(matches!(parse_size("-10"), Err(GrabError::Config(_))));
    }

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }
}
