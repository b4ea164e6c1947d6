//! Debug-section decoding
//!
//! Layout: a 22-byte header followed by the file, line, symbol, tag,
//! automaton and state tables, in that order. Table counts are read unsigned;
//! scripts with more than 32767 lines would otherwise come out negative.

use super::symbol::{Automaton, Dim, Line, SourceFile, State, StorageClass, Symbol, SymbolKind, Tag};
use super::{DebugInfoError, DebugInfoResult};
use crate::addr::Cell;
use crate::reader::ByteReader;

/// Magic of the debug section header
pub const DEBUG_MAGIC: u16 = 0xF1EF;

/// Size of the debug section header in bytes
pub const DEBUG_HEADER_SIZE: usize = 22;

#[derive(Debug, Default)]
pub(super) struct Tables {
    pub files: Vec<SourceFile>,
    pub lines: Vec<Line>,
    pub symbols: Vec<Symbol>,
    pub tags: Vec<Tag>,
    pub automatons: Vec<Automaton>,
    pub states: Vec<State>,
}

struct Counts {
    files: usize,
    lines: usize,
    symbols: usize,
    tags: usize,
    automatons: usize,
    states: usize,
}

pub(super) fn parse_tables(section: &[u8]) -> DebugInfoResult<Tables> {
    let mut i = 0;
    let _size = section.read32_with(&mut i)?;
    let magic = section.read16_with(&mut i)?;
    if magic != DEBUG_MAGIC {
        return Err(DebugInfoError::BadMagic(magic));
    }
    let _file_version = section.read8_with(&mut i)?;
    let _amx_version = section.read8_with(&mut i)?;
    let _flags = section.read16_with(&mut i)?;

    let mut count = || -> DebugInfoResult<usize> { Ok(section.read16_with(&mut i)? as usize) };
    let counts = Counts {
        files: count()?,
        lines: count()?,
        symbols: count()?,
        tags: count()?,
        automatons: count()?,
        states: count()?,
    };
    debug_assert_eq!(i, DEBUG_HEADER_SIZE);

    let mut tables = Tables::default();

    for _ in 0..counts.files {
        let address = section.read32_with(&mut i)? as Cell;
        let name = read_name(section, &mut i)?;
        tables.files.push(SourceFile { address, name });
    }

    for _ in 0..counts.lines {
        let address = section.read32_with(&mut i)? as Cell;
        let line = section.read32_with(&mut i)? as i32;
        tables.lines.push(Line { address, line });
    }

    for _ in 0..counts.symbols {
        tables.symbols.push(read_symbol(section, &mut i)?);
    }

    for _ in 0..counts.tags {
        let id = section.read16_with(&mut i)? as i16;
        let name = read_name(section, &mut i)?;
        tables.tags.push(Tag { id, name });
    }

    for _ in 0..counts.automatons {
        let id = section.read16_with(&mut i)? as i16;
        let address = section.read32_with(&mut i)? as Cell;
        let name = read_name(section, &mut i)?;
        tables.automatons.push(Automaton { id, address, name });
    }

    for _ in 0..counts.states {
        let id = section.read16_with(&mut i)? as i16;
        let automaton = section.read16_with(&mut i)? as i16;
        let name = read_name(section, &mut i)?;
        tables.states.push(State {
            id,
            automaton,
            name,
        });
    }

    Ok(tables)
}

fn read_symbol(section: &[u8], i: &mut usize) -> DebugInfoResult<Symbol> {
    let address = section.read32_with(i)? as Cell;
    let tag = section.read16_with(i)? as i16;
    let codestart = section.read32_with(i)? as Cell;
    let codeend = section.read32_with(i)? as Cell;
    let kind = SymbolKind::from(section.read8_with(i)?);
    let class = StorageClass::from(section.read8_with(i)?);
    let dim_count = section.read16_with(i)? as i16;
    let name = read_name(section, i)?;

    let mut dims = Vec::with_capacity(dim_count.max(0) as usize);
    for _ in 0..dim_count.max(0) {
        let tag = section.read16_with(i)? as i16;
        let size = section.read32_with(i)?;
        dims.push(Dim { tag, size });
    }

    Ok(Symbol {
        name,
        address,
        tag,
        codestart,
        codeend,
        kind,
        class,
        dims,
    })
}

/// Names are stored in the compiler's code page; bytes that are not UTF-8
/// are replaced rather than failing the whole section
fn read_name(section: &[u8], i: &mut usize) -> DebugInfoResult<String> {
    let bytes = section.cstr_with(i)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
