//! Debug-section entities

use crate::addr::Cell;
use serde::Serialize;

/// Marks compiler-emitted forwarded-public symbols. The compiler records them
/// with the code range of the real function, so they must never win a lookup.
pub const FORWARD_SENTINEL: char = '@';

/// Source file whose code starts at `address`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub address: Cell,
    pub name: String,
}

/// Line table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Line {
    pub address: Cell,
    /// Zero-based line number as stored by the compiler
    pub line: i32,
}

impl Line {
    /// One-based line number for display
    pub fn number(&self) -> i32 {
        self.line + 1
    }
}

/// What a symbol names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SymbolKind {
    Variable,
    Reference,
    Array,
    ArrayRef,
    Function,
    FunctionRef,
    Other(u8),
}

impl From<u8> for SymbolKind {
    fn from(ident: u8) -> Self {
        match ident {
            1 => SymbolKind::Variable,
            2 => SymbolKind::Reference,
            3 => SymbolKind::Array,
            4 => SymbolKind::ArrayRef,
            9 => SymbolKind::Function,
            10 => SymbolKind::FunctionRef,
            other => SymbolKind::Other(other),
        }
    }
}

/// Storage class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageClass {
    Global,
    Local,
    Static,
    Other(u8),
}

impl From<u8> for StorageClass {
    fn from(vclass: u8) -> Self {
        match vclass {
            0 => StorageClass::Global,
            1 => StorageClass::Local,
            2 => StorageClass::Static,
            other => StorageClass::Other(other),
        }
    }
}

/// One array dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dim {
    pub tag: i16,
    /// Number of elements, 0 when unknown
    pub size: u32,
}

/// Symbol table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    /// Frame offset for locals, data address for globals, code address for
    /// functions
    pub address: Cell,
    pub tag: i16,
    /// Code range the symbol is visible in (the function's own range for
    /// functions)
    pub codestart: Cell,
    pub codeend: Cell,
    pub kind: SymbolKind,
    pub class: StorageClass,
    pub dims: Vec<Dim>,
}

impl Symbol {
    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Function
    }

    pub fn is_local(&self) -> bool {
        self.class == StorageClass::Local
    }

    pub fn is_variable(&self) -> bool {
        self.kind == SymbolKind::Variable
    }

    pub fn is_reference(&self) -> bool {
        self.kind == SymbolKind::Reference
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, SymbolKind::Array | SymbolKind::ArrayRef)
    }

    pub fn is_forwarded(&self) -> bool {
        self.name.starts_with(FORWARD_SENTINEL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i16,
    pub name: String,
}

/// State machine of a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Automaton {
    pub id: i16,
    /// Data address of the variable holding the current state
    pub address: Cell,
    /// Empty for the anonymous automaton
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct State {
    pub id: i16,
    pub automaton: i16,
    pub name: String,
}
