//! Module locator
//!
//! A running instance only carries its in-memory image. The file it was
//! loaded from is found by comparing headers against the `.amx` files in a
//! list of search directories.

use crate::amx::image::{AmxHeader, HEADER_SIZE};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Header bytes of a module
pub type HeaderBytes = [u8; HEADER_SIZE];

#[derive(Debug, Clone)]
struct ScannedFile {
    modified: Option<SystemTime>,
    header: HeaderBytes,
}

/// Finds the file a module was loaded from
#[derive(Debug, Clone, Default)]
pub struct AmxLocator {
    search_paths: Vec<PathBuf>,
    /// Every module seen in the search paths
    scanned: BTreeMap<PathBuf, ScannedFile>,
    /// Previous answers, checked against the file before reuse
    found: HashMap<HeaderBytes, PathBuf>,
}

impl AmxLocator {
    pub fn new(search_paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            search_paths: search_paths.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Path of the module whose header is `header`
    pub fn find(&mut self, header: &HeaderBytes) -> Option<PathBuf> {
        if let Some(path) = self.found.get(header) {
            if read_header(path).as_ref() == Some(header) {
                return Some(path.clone());
            }
            let stale = path.clone();
            self.found.remove(header);
            self.scanned.remove(&stale);
        }

        self.rescan();

        let path = self
            .scanned
            .iter()
            .find(|(_, file)| &file.header == header)
            .map(|(path, _)| path.clone());

        match &path {
            Some(path) => {
                self.found.insert(*header, path.clone());
            }
            None => log::debug!(
                "no module matching header in {} search path(s)",
                self.search_paths.len()
            ),
        }
        path
    }

    /// Refresh the scanned set, re-reading files whose modification time
    /// changed and dropping files that are gone
    fn rescan(&mut self) {
        let mut seen = HashSet::new();
        for dir in &self.search_paths {
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
            {
                let path = entry.path();
                if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "amx") {
                    continue;
                }

                seen.insert(path.to_path_buf());
                let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
                let fresh = self
                    .scanned
                    .get(path)
                    .is_some_and(|file| file.modified.is_some() && file.modified >= modified);
                if fresh {
                    continue;
                }

                match read_header(path) {
                    Some(header) => {
                        self.scanned
                            .insert(path.to_path_buf(), ScannedFile { modified, header });
                    }
                    None => {
                        self.scanned.remove(path);
                    }
                }
            }
        }
        self.scanned.retain(|path, _| seen.contains(path));
    }
}

/// Header bytes of a file, if it is a module
fn read_header(path: &Path) -> Option<HeaderBytes> {
    let mut header = [0u8; HEADER_SIZE];
    File::open(path).ok()?.read_exact(&mut header).ok()?;
    match AmxHeader::parse(&header) {
        Ok(_) => Some(header),
        Err(e) => {
            log::debug!("skipping {}: {}", path.display(), e);
            None
        }
    }
}
