//! Small table/formatting helpers shared by the subcommands.

use comfy_table::{presets::UTF8_FULL, Table};

pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table
}

/// Human-readable byte size (`1.0 KiB`, `2.5 MiB`, ...), falling back to
/// a plain byte count below 1024.
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_stays_in_bytes_below_1024() {
        assert_eq!(format_size(512), "512 B");
    }

    #[test]
    fn format_size_scales_to_larger_units() {
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
