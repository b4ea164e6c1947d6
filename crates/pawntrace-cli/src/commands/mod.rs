pub mod backtrace;
pub mod error;
pub mod info;
pub mod locate;
pub mod lookup;
pub mod resolve;

use anyhow::{Context, Result};
use pawntrace::{AmxImage, Cell, DebugInfo, Snapshot};
use serde::Serialize;
use std::path::Path;

/// Load and parse a module file
pub fn load_image(path: &Path) -> Result<AmxImage> {
    AmxImage::load(path).with_context(|| format!("Failed to load module: {}", path.display()))
}

/// Debug info of a module, required by the source-level commands
pub fn require_debug_info(image: &AmxImage, path: &Path) -> Result<DebugInfo> {
    DebugInfo::from_image(image)
        .with_context(|| format!("No usable debug info in {}", path.display()))
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    Snapshot::load(path).with_context(|| format!("Failed to load snapshot: {}", path.display()))
}

/// File name shown on frames that have no source location
pub fn script_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parse a code address, hex with a `0x` prefix or decimal
pub fn parse_address(text: &str) -> Result<Cell> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).map(|v| v as Cell),
        None => text.parse::<Cell>(),
    };
    parsed.with_context(|| format!("Invalid address: {}", text))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x1c4").unwrap(), 0x1c4);
        assert_eq!(parse_address("0X1C4").unwrap(), 0x1c4);
        assert_eq!(parse_address("452").unwrap(), 452);
        assert_eq!(parse_address(" 8 ").unwrap(), 8);
        assert_eq!(parse_address("0xffffffff").unwrap(), -1);
        assert!(parse_address("0xzz").is_err());
        assert!(parse_address("main").is_err());
    }

    #[test]
    fn test_script_name() {
        assert_eq!(script_name(Path::new("gamemodes/gm.amx")), "gm.amx");
    }
}
