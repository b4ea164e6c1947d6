//! Lookup command - code address to source location

use super::{load_image, parse_address, print_json, require_debug_info};
use anyhow::Result;
use pawntrace::{Cell, DebugInfo};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct Location {
    address: Cell,
    file: Option<String>,
    line: Option<i32>,
    /// Function containing the address
    function: Option<String>,
    /// Function starting exactly at the address
    entry_of: Option<String>,
}

fn locate(debug: &DebugInfo, address: Cell) -> Location {
    Location {
        address,
        file: debug.file(address).map(|f| f.name.clone()),
        line: debug.line(address).map(|l| l.number()),
        function: debug.function(address).map(|s| s.name.clone()),
        entry_of: debug.exact_function(address).map(|s| s.name.clone()),
    }
}

pub fn run(path: &Path, address: &str, json: bool) -> Result<()> {
    let address = parse_address(address)?;
    let image = load_image(path)?;
    let debug = require_debug_info(&image, path)?;

    let location = locate(&debug, address);
    if json {
        return print_json(&location);
    }

    let or_unknown = |value: Option<String>| value.unwrap_or_else(|| "??".to_string());
    println!("address:  0x{:08x}", location.address);
    println!("file:     {}", or_unknown(location.file));
    println!("line:     {}", or_unknown(location.line.map(|l| l.to_string())));
    println!("function: {}", or_unknown(location.function));
    if let Some(name) = location.entry_of {
        println!("entry of: {}", name);
    }
    Ok(())
}
