//! Locate command - find a module's file in the search paths

use super::{load_image, print_json};
use anyhow::{bail, Result};
use pawntrace::AmxLocator;
use pawntrace_config::Config;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct Located<'a> {
    module: &'a Path,
    found: Option<PathBuf>,
    searched: &'a [PathBuf],
}

pub fn run(module: &Path, extra_paths: Vec<PathBuf>, config: &Config, json: bool) -> Result<()> {
    let image = load_image(module)?;

    let mut locator = AmxLocator::new(extra_paths);
    for path in &config.search_paths {
        locator.add_search_path(path.clone());
    }
    let found = locator.find(image.header_bytes());

    if json {
        return print_json(&Located {
            module,
            found,
            searched: locator.search_paths(),
        });
    }

    match found {
        Some(path) => println!("{}", path.display()),
        None => {
            let searched: Vec<String> = locator
                .search_paths()
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            bail!(
                "No module matching {} in: {}",
                module.display(),
                searched.join(", ")
            );
        }
    }
    Ok(())
}
