//! Resolve command - function or source line to code address

use super::{load_image, print_json, require_debug_info};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// What to look up in a source file
#[derive(Debug, Clone)]
pub enum Target {
    Function(String),
    /// One-based
    Line(i32),
}

#[derive(Serialize)]
struct Resolved<'a> {
    file: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<i32>,
    address: i32,
}

pub fn run(path: &Path, source: &str, target: Target, json: bool) -> Result<()> {
    let image = load_image(path)?;
    let debug = require_debug_info(&image, path)?;

    let resolved = match &target {
        Target::Function(name) => Resolved {
            file: source,
            function: Some(name),
            line: None,
            address: debug
                .function_address(name, source)
                .with_context(|| format!("Function {} not found in {}", name, source))?,
        },
        Target::Line(line) => Resolved {
            file: source,
            function: None,
            line: Some(*line),
            address: debug
                .line_address(*line, source)
                .with_context(|| format!("No code for {}:{}", source, line))?,
        },
    };

    if json {
        return print_json(&resolved);
    }
    println!("0x{:08x}", resolved.address);
    Ok(())
}
