use crate::consts::BLOCK_SIZE;

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Binary units, two decimals above one kilobyte.
pub fn pretty_size_from_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit + 1 < UNITS.len() {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

pub fn pretty_size_from_blocks(blocks: u64) -> String {
    pretty_size_from_bytes(blocks * BLOCK_SIZE as u64)
}
