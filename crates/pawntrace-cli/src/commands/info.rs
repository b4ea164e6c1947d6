//! Info command - summarize a compiled module

use super::{load_image, print_json};
use anyhow::Result;
use pawntrace::{AmxHeader, AmxImage, DebugInfo, Native, Public};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ModuleInfo<'a> {
    file: String,
    header: &'a AmxHeader,
    code_size: usize,
    data_size: usize,
    publics: &'a [Public],
    natives: &'a [Native],
    debug: Option<DebugCounts>,
}

#[derive(Serialize)]
struct DebugCounts {
    files: usize,
    lines: usize,
    symbols: usize,
    tags: usize,
    automatons: usize,
    states: usize,
}

impl DebugCounts {
    fn of(image: &AmxImage) -> Option<Self> {
        let debug = DebugInfo::from_image(image).ok()?;
        Some(Self {
            files: debug.files().len(),
            lines: debug.lines().len(),
            symbols: debug.symbols().len(),
            tags: debug.tags().len(),
            automatons: debug.automatons().len(),
            states: debug.states().len(),
        })
    }
}

pub fn run(path: &Path, json: bool) -> Result<()> {
    let image = load_image(path)?;
    let header = image.header();

    let info = ModuleInfo {
        file: path.display().to_string(),
        header,
        code_size: image.code().len(),
        data_size: image.data().len(),
        publics: image.publics(),
        natives: image.natives(),
        debug: DebugCounts::of(&image),
    };

    if json {
        return print_json(&info);
    }

    println!("{}", info.file);
    println!(
        "  version:  file {}, amx {}",
        header.file_version, header.amx_version
    );
    let mut flags = Vec::new();
    if header.has_debug_info() {
        flags.push("debug");
    }
    if header.is_compact() {
        flags.push("compact");
    }
    println!(
        "  flags:    {}",
        if flags.is_empty() { "-".to_string() } else { flags.join(" ") }
    );
    println!("  code:     {} bytes", info.code_size);
    println!("  data:     {} bytes (stack and heap included)", info.data_size);
    if header.cip >= 0 {
        println!("  main:     0x{:08x}", header.cip);
    } else {
        println!("  main:     none");
    }

    println!("publics ({}):", info.publics.len());
    for public in info.publics {
        println!("  0x{:08x} {}", public.address, public.name);
    }
    println!("natives ({}):", info.natives.len());
    for native in info.natives {
        println!("  {}", native.name);
    }

    match &info.debug {
        Some(d) => println!(
            "debug info: {} files, {} lines, {} symbols, {} tags, {} automatons, {} states",
            d.files, d.lines, d.symbols, d.tags, d.automatons, d.states
        ),
        None => println!("debug info: none"),
    }
    Ok(())
}
