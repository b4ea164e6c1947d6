//! Debug symbol store
//!
//! Holds the optional compiler-emitted debug section of one module and
//! answers address and symbol queries against it. The store is immutable
//! once built. A store that failed to load behaves like an empty one: every
//! query returns `None`.

mod parse;
pub mod symbol;

pub use parse::{DEBUG_HEADER_SIZE, DEBUG_MAGIC};
pub use symbol::{
    Automaton, Dim, Line, SourceFile, State, StorageClass, Symbol, SymbolKind, Tag,
    FORWARD_SENTINEL,
};

use crate::addr::Cell;
use crate::amx::image::{AmxHeader, AmxImage, ImageError};
use crate::reader::ShortRead;
use std::path::Path;
use thiserror::Error;

/// Debug-section loading errors
#[derive(Error, Debug)]
pub enum DebugInfoError {
    #[error("Failed to read module: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Module has no debug section")]
    Missing,

    #[error("Bad debug section magic 0x{0:04x}")]
    BadMagic(u16),

    #[error("Debug section truncated: {0}")]
    Truncated(#[from] ShortRead),
}

pub type DebugInfoResult<T> = Result<T, DebugInfoError>;

/// Debug symbols of one module
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    loaded: bool,
    files: Vec<SourceFile>,
    lines: Vec<Line>,
    symbols: Vec<Symbol>,
    tags: Vec<Tag>,
    automatons: Vec<Automaton>,
    states: Vec<State>,
}

impl DebugInfo {
    /// Load the debug section of the module at `path`
    ///
    /// Never fails: a missing file, a module compiled without debug info or a
    /// malformed section all give a store that is not loaded.
    pub fn load(path: &Path) -> Self {
        let result = std::fs::read(path)
            .map_err(DebugInfoError::from)
            .and_then(|bytes| Self::from_module_bytes(&bytes));
        match result {
            Ok(info) => info,
            Err(e) => {
                log::debug!("no debug info for {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// True if the module header announces a debug section
    pub fn is_present(header: &AmxHeader) -> bool {
        header.has_debug_info()
    }

    /// Locate and parse the debug section of a whole module file
    pub fn from_module_bytes(bytes: &[u8]) -> DebugInfoResult<Self> {
        let header = AmxHeader::parse(bytes)?;
        if !Self::is_present(&header) {
            return Err(DebugInfoError::Missing);
        }
        match bytes.get(header.size as usize..) {
            Some(section) if !section.is_empty() => Self::parse(section),
            _ => Err(DebugInfoError::Missing),
        }
    }

    pub fn from_image(image: &AmxImage) -> DebugInfoResult<Self> {
        image
            .debug_section()
            .ok_or(DebugInfoError::Missing)
            .and_then(Self::parse)
    }

    /// Parse a debug section on its own
    pub fn parse(section: &[u8]) -> DebugInfoResult<Self> {
        let tables = parse::parse_tables(section)?;
        Ok(Self {
            loaded: true,
            files: tables.files,
            lines: tables.lines,
            symbols: tables.symbols,
            tags: tables.tags,
            automatons: tables.automatons,
            states: tables.states,
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn automatons(&self) -> &[Automaton] {
        &self.automatons
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    // ── Address queries ─────────────────────────────────────────────────────

    /// Line entry covering `address`
    pub fn line(&self, address: Cell) -> Option<&Line> {
        self.lines.iter().rev().find(|l| l.address <= address)
    }

    /// Source file covering `address`
    pub fn file(&self, address: Cell) -> Option<&SourceFile> {
        self.files.iter().rev().find(|f| f.address <= address)
    }

    /// Function whose code range contains `address`
    pub fn function(&self, address: Cell) -> Option<&Symbol> {
        self.functions()
            .find(|s| s.codestart <= address && address < s.codeend)
    }

    /// Function starting exactly at `address`
    pub fn exact_function(&self, address: Cell) -> Option<&Symbol> {
        self.functions().find(|s| s.codestart == address)
    }

    fn functions(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .iter()
            .filter(|s| s.is_function() && !s.is_forwarded())
    }

    /// Declared arguments of `function`, ordered by frame offset
    pub fn arguments(&self, function: &Symbol) -> Vec<&Symbol> {
        let mut args: Vec<&Symbol> = self
            .symbols
            .iter()
            .filter(|s| s.is_local() && s.codestart == function.codestart && s.address > 0)
            .collect();
        args.sort_by_key(|s| s.address);
        args
    }

    // ── Key lookups ─────────────────────────────────────────────────────────

    pub fn tag(&self, id: i16) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub fn tag_name(&self, id: i16) -> Option<&str> {
        self.tag(id).map(|t| t.name.as_str())
    }

    pub fn automaton(&self, id: i16) -> Option<&Automaton> {
        self.automatons.iter().find(|a| a.id == id)
    }

    /// Automaton whose state variable lives at `address`
    pub fn automaton_at(&self, address: Cell) -> Option<&Automaton> {
        self.automatons.iter().find(|a| a.address == address)
    }

    pub fn state(&self, id: i16, automaton: i16) -> Option<&State> {
        self.states
            .iter()
            .find(|s| s.id == id && s.automaton == automaton)
    }

    // ── Symbolic queries ────────────────────────────────────────────────────

    /// Code range `[start, end)` of `file_name`: from its entry to the next
    /// file entry, or to the end of code
    fn file_range(&self, file_name: &str) -> Option<(Cell, Cell)> {
        let index = self.files.iter().position(|f| f.name == file_name)?;
        let start = self.files[index].address;
        let end = self
            .files
            .get(index + 1)
            .map(|f| f.address)
            .unwrap_or(Cell::MAX);
        Some((start, end))
    }

    /// Start address of function `name` defined in `file_name`
    pub fn function_address(&self, name: &str, file_name: &str) -> Option<Cell> {
        let (start, end) = self.file_range(file_name)?;
        self.symbols
            .iter()
            .find(|s| {
                s.is_function() && s.name == name && s.codestart >= start && s.codestart < end
            })
            .map(|s| s.codestart)
    }

    /// First code address at or after the one-based `line` of `file_name`
    pub fn line_address(&self, line: i32, file_name: &str) -> Option<Cell> {
        let (start, end) = self.file_range(file_name)?;
        let wanted = line - 1;
        self.lines
            .iter()
            .skip_while(|l| l.address < start)
            .take_while(|l| l.address < end)
            .find(|l| l.line >= wanted)
            .map(|l| l.address)
    }
}
