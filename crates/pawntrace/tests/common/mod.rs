//! Shared test utilities
//!
//! Builders for module images, debug sections and VM memory, plus a complete
//! crash scenario used by the backtrace tests.

#![allow(dead_code)]

use pawntrace::amx::image::{AMX_MAGIC, FLAG_DEBUG, HEADER_SIZE};
use pawntrace::debug::DEBUG_MAGIC;
use pawntrace::{Cell, CallKind, CallRecord, CallStack, InstanceId, Registers};

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

pub const PROC: Cell = 46;
pub const CALL: Cell = 49;
pub const PUSH_C: Cell = 39;
pub const RETN: Cell = 48;
pub const HALT: Cell = 120;
pub const SYSREQ_C: Cell = 123;

pub fn cells_to_bytes(cells: &[Cell]) -> Vec<u8> {
    cells.iter().flat_map(|c| c.to_le_bytes()).collect()
}

/// Data segment of `size` bytes with the given cells written into it
pub fn memory(size: usize, writes: &[(Cell, Cell)]) -> Vec<u8> {
    let mut data = vec![0u8; size];
    for &(address, value) in writes {
        let at = address as usize;
        data[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
    data
}

// ============================================================================
// Debug sections
// ============================================================================

/// Builds a debug section in the compiler's binary layout
#[derive(Debug, Default)]
pub struct DebugBuilder {
    files: Vec<(Cell, String)>,
    lines: Vec<(Cell, i32)>,
    symbols: Vec<Vec<u8>>,
    tags: Vec<(i16, String)>,
    automatons: Vec<(i16, Cell, String)>,
    states: Vec<(i16, i16, String)>,
}

impl DebugBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, address: Cell, name: &str) -> Self {
        self.files.push((address, name.to_string()));
        self
    }

    /// `line` is zero-based, as stored by the compiler
    pub fn line(mut self, address: Cell, line: i32) -> Self {
        self.lines.push((address, line));
        self
    }

    pub fn function(self, name: &str, start: Cell, end: Cell) -> Self {
        self.symbol(name, start, 0, start, end, 9, 0, &[])
    }

    /// Local scalar of `function` at frame offset `offset`
    pub fn argument(self, name: &str, tag: i16, offset: Cell, start: Cell, end: Cell) -> Self {
        self.symbol(name, offset, tag, start, end, 1, 1, &[])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn symbol(
        mut self,
        name: &str,
        address: Cell,
        tag: i16,
        codestart: Cell,
        codeend: Cell,
        ident: u8,
        vclass: u8,
        dims: &[(i16, u32)],
    ) -> Self {
        let mut out = Vec::new();
        out.extend((address as u32).to_le_bytes());
        out.extend(tag.to_le_bytes());
        out.extend((codestart as u32).to_le_bytes());
        out.extend((codeend as u32).to_le_bytes());
        out.push(ident);
        out.push(vclass);
        out.extend((dims.len() as u16).to_le_bytes());
        push_name(&mut out, name);
        for &(tag, size) in dims {
            out.extend(tag.to_le_bytes());
            out.extend(size.to_le_bytes());
        }
        self.symbols.push(out);
        self
    }

    pub fn tag(mut self, id: i16, name: &str) -> Self {
        self.tags.push((id, name.to_string()));
        self
    }

    pub fn automaton(mut self, id: i16, address: Cell, name: &str) -> Self {
        self.automatons.push((id, address, name.to_string()));
        self
    }

    pub fn state(mut self, id: i16, automaton: i16, name: &str) -> Self {
        self.states.push((id, automaton, name.to_string()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for (address, name) in &self.files {
            body.extend((*address as u32).to_le_bytes());
            push_name(&mut body, name);
        }
        for (address, line) in &self.lines {
            body.extend((*address as u32).to_le_bytes());
            body.extend(line.to_le_bytes());
        }
        for symbol in &self.symbols {
            body.extend(symbol);
        }
        for (id, name) in &self.tags {
            body.extend(id.to_le_bytes());
            push_name(&mut body, name);
        }
        for (id, address, name) in &self.automatons {
            body.extend(id.to_le_bytes());
            body.extend((*address as u32).to_le_bytes());
            push_name(&mut body, name);
        }
        for (id, automaton, name) in &self.states {
            body.extend(id.to_le_bytes());
            body.extend(automaton.to_le_bytes());
            push_name(&mut body, name);
        }

        let mut out = Vec::new();
        out.extend(((22 + body.len()) as u32).to_le_bytes());
        out.extend(DEBUG_MAGIC.to_le_bytes());
        out.push(8);
        out.push(8);
        out.extend(0u16.to_le_bytes());
        for count in [
            self.files.len(),
            self.lines.len(),
            self.symbols.len(),
            self.tags.len(),
            self.automatons.len(),
            self.states.len(),
        ] {
            out.extend((count as u16).to_le_bytes());
        }
        out.extend(body);
        out
    }
}

fn push_name(out: &mut Vec<u8>, name: &str) {
    out.extend(name.as_bytes());
    out.push(0);
}

// ============================================================================
// Module images
// ============================================================================

/// Builds an uncompressed .amx file
#[derive(Debug, Default)]
pub struct AmxBuilder {
    code: Vec<Cell>,
    globals: Vec<Cell>,
    stack_size: usize,
    main: Option<Cell>,
    publics: Vec<(String, Cell)>,
    natives: Vec<String>,
    debug: Option<Vec<u8>>,
}

impl AmxBuilder {
    pub fn new(code: &[Cell]) -> Self {
        Self {
            code: code.to_vec(),
            stack_size: 0x100,
            ..Default::default()
        }
    }

    pub fn globals(mut self, globals: &[Cell]) -> Self {
        self.globals = globals.to_vec();
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn main(mut self, address: Cell) -> Self {
        self.main = Some(address);
        self
    }

    pub fn public(mut self, name: &str, address: Cell) -> Self {
        self.publics.push((name.to_string(), address));
        self
    }

    pub fn native(mut self, name: &str) -> Self {
        self.natives.push(name.to_string());
        self
    }

    pub fn debug(mut self, section: Vec<u8>) -> Self {
        self.debug = Some(section);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let publics = HEADER_SIZE;
        let natives = publics + 8 * self.publics.len();
        let libraries = natives + 8 * self.natives.len();
        let nametable = libraries;

        // Name table: maximum name length, then the names
        let mut names = vec![31u8, 0];
        let mut name_offsets = Vec::new();
        for name in self.publics.iter().map(|(n, _)| n).chain(&self.natives) {
            name_offsets.push((nametable + names.len()) as u32);
            push_name(&mut names, name);
        }
        let cod = (nametable + names.len() + 3) & !3;
        let dat = cod + 4 * self.code.len();
        let hea = dat + 4 * self.globals.len();
        let stp = hea + self.stack_size;

        let flags = if self.debug.is_some() { FLAG_DEBUG } else { 0 };
        let fields = [
            cod,
            dat,
            hea,
            stp,
            self.main.map(|m| m as usize).unwrap_or(usize::MAX),
            publics,
            natives,
            libraries,
            libraries,
            libraries,
            nametable,
        ];

        let mut out = Vec::new();
        out.extend((hea as u32).to_le_bytes());
        out.extend(AMX_MAGIC.to_le_bytes());
        out.push(8);
        out.push(8);
        out.extend(flags.to_le_bytes());
        out.extend(8i16.to_le_bytes());
        for field in fields {
            out.extend((field as u32).to_le_bytes());
        }
        assert_eq!(out.len(), HEADER_SIZE);

        let mut offsets = name_offsets.into_iter();
        for (_, address) in &self.publics {
            out.extend((*address as u32).to_le_bytes());
            out.extend(offsets.next().unwrap_or(0).to_le_bytes());
        }
        for _ in &self.natives {
            out.extend(0u32.to_le_bytes());
            out.extend(offsets.next().unwrap_or(0).to_le_bytes());
        }
        out.extend(&names);
        out.resize(cod, 0);
        out.extend(cells_to_bytes(&self.code));
        out.extend(cells_to_bytes(&self.globals));
        if let Some(section) = &self.debug {
            out.extend(section);
        }
        out
    }
}

// ============================================================================
// Crash scenario
// ============================================================================

/// `main` calls native `Foo`, whose host code re-enters public `Bar(3)`.
/// `Bar` calls `Baz(7)`, which calls `Foo` again; the crash happens inside
/// that second native call.
pub struct Scenario {
    pub module: Vec<u8>,
    pub memory: Vec<u8>,
    pub registers: Registers,
    pub calls: CallStack,
}

pub const MAIN: Cell = 0x08;
pub const BAR: Cell = 0x40;
pub const BAZ: Cell = 0x80;

pub fn scenario_code() -> Vec<Cell> {
    let mut code = vec![HALT, 0];
    // main
    code.extend([PROC, SYSREQ_C, 0, 0, RETN]);
    code.resize(16, 0);
    // Bar(playerid)
    code.extend([PROC, PUSH_C, 7, PUSH_C, 4, CALL, BAZ, 0, RETN]);
    code.resize(32, 0);
    // Baz(value)
    code.extend([PROC, SYSREQ_C, 0, 0, RETN]);
    code.resize(40, 0);
    code
}

pub fn scenario_debug() -> Vec<u8> {
    DebugBuilder::new()
        .file(0, "test.pwn")
        .line(0x08, 9)
        .line(0x0c, 10)
        .line(0x14, 11)
        .line(0x40, 19)
        .line(0x44, 20)
        .line(0x54, 21)
        .line(0x5c, 22)
        .line(0x80, 29)
        .line(0x84, 30)
        .line(0x8c, 31)
        .function("main", MAIN, 0x40)
        .function("@Bar", BAR, 0x80)
        .function("Bar", BAR, 0x80)
        .function("Baz", BAZ, 0xa0)
        .argument("playerid", 0, 12, BAR, 0x80)
        .argument("value", 0, 12, BAZ, 0xa0)
        .tag(0, "_")
        .build()
}

pub fn scenario_module(with_debug: bool) -> Vec<u8> {
    let builder = AmxBuilder::new(&scenario_code())
        .globals(&[0; 16])
        .stack_size(0xc0)
        .main(MAIN)
        .public("Bar", BAR)
        .native("Foo");
    if with_debug {
        builder.debug(scenario_debug()).build()
    } else {
        builder.build()
    }
}

pub fn scenario(with_debug: bool) -> Scenario {
    let instance = InstanceId(0);
    let memory = memory(
        0x100,
        &[
            // Baz frame
            (0xcc, 0xdc),
            (0xd0, 0x5c),
            (0xd4, 4),
            (0xd8, 7),
            // Bar frame, entered from the host
            (0xdc, 0xf0),
            (0xe0, 0),
            (0xe4, 4),
            (0xe8, 3),
            // main frame
            (0xf0, 0),
            (0xf4, 0),
            (0xf8, 0),
        ],
    );
    let registers = Registers {
        frm: 0xcc,
        cip: 0x8c,
        stk: 0xc8,
        stp: 0xfc,
        hea: 0x40,
        hlw: 0x40,
        pri: 0,
        alt: 0,
    };

    let record = |kind, index, frm, cip| CallRecord {
        instance,
        kind,
        index,
        frm,
        cip,
    };
    let calls = [
        record(CallKind::Public, -1, 0, 0),
        record(CallKind::Native, 0, 0xf0, 0x14),
        record(CallKind::Public, 0, 0xf0, 0x14),
        record(CallKind::Native, 0, 0xcc, 0x8c),
    ]
    .into_iter()
    .collect();

    Scenario {
        module: scenario_module(with_debug),
        memory,
        registers,
        calls,
    }
}
