//! VM instance references
//!
//! [`AmxRef`] is a non-owning view of one running (or just crashed) AMX
//! instance: its code and data segments, register set and function tables.
//! All reads at computed offsets go through its memory-view methods, which
//! return `None` instead of touching anything out of range.

pub mod image;
pub mod opcode;

use crate::addr::{Cell, CELL_SIZE};
use opcode::Opcode;
use serde::{Deserialize, Serialize};

/// Public index of the designated entry point
pub const EXEC_MAIN: Cell = -1;

/// Display name of the designated entry point
pub const MAIN_NAME: &str = "main";

/// Identity of a VM instance within one host process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct InstanceId(pub usize);

/// AMX register file
///
/// `frm`, `stk`, `stp`, `hea`, `hlw` are data-segment offsets; `cip` is a
/// code-segment offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    pub frm: Cell,
    pub cip: Cell,
    pub stk: Cell,
    pub stp: Cell,
    pub hea: Cell,
    pub hlw: Cell,
    #[serde(default)]
    pub pri: Cell,
    #[serde(default)]
    pub alt: Cell,
}

/// Entry of the public function table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Public {
    pub name: String,
    /// Code-segment offset of the function
    pub address: Cell,
}

/// Entry of the native function table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Native {
    pub name: String,
    /// Host address the native is bound to, 0 while unregistered
    pub address: usize,
}

/// Non-owning handle to a VM instance
#[derive(Debug, Clone, Copy)]
pub struct AmxRef<'a> {
    id: InstanceId,
    code: &'a [u8],
    data: &'a [u8],
    regs: Registers,
    publics: &'a [Public],
    natives: &'a [Native],
    entry_point: Option<Cell>,
    code_base: Cell,
    opcode_map: Option<&'a [Cell]>,
}

impl<'a> AmxRef<'a> {
    pub fn new(id: InstanceId, code: &'a [u8], data: &'a [u8], regs: Registers) -> Self {
        Self {
            id,
            code,
            data,
            regs,
            publics: &[],
            natives: &[],
            entry_point: None,
            code_base: 0,
            opcode_map: None,
        }
    }

    pub fn with_publics(mut self, publics: &'a [Public]) -> Self {
        self.publics = publics;
        self
    }

    pub fn with_natives(mut self, natives: &'a [Native]) -> Self {
        self.natives = natives;
        self
    }

    /// Code address of `main`; negative means the module has none
    pub fn with_entry_point(mut self, cip: Cell) -> Self {
        self.entry_point = (cip >= 0).then_some(cip);
        self
    }

    /// Base added to CALL targets when the code was relocated
    pub fn with_code_base(mut self, base: Cell) -> Self {
        self.code_base = base;
        self
    }

    pub fn with_opcode_map(mut self, map: &'a [Cell]) -> Self {
        self.opcode_map = Some(map);
        self
    }

    pub fn with_registers(mut self, regs: Registers) -> Self {
        self.regs = regs;
        self
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn code(&self) -> &'a [u8] {
        self.code
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn publics(&self) -> &'a [Public] {
        self.publics
    }

    pub fn natives(&self) -> &'a [Native] {
        self.natives
    }

    pub fn code_base(&self) -> Cell {
        self.code_base
    }

    pub fn entry_point(&self) -> Option<Cell> {
        self.entry_point
    }

    // ── Memory view ─────────────────────────────────────────────────────────

    /// Cell stored at data offset `addr`
    pub fn data_cell(&self, addr: Cell) -> Option<Cell> {
        read_cell(self.data, addr)
    }

    /// Cell stored at code offset `addr`
    pub fn code_cell(&self, addr: Cell) -> Option<Cell> {
        read_cell(self.code, addr)
    }

    /// Up to `count` consecutive data cells starting at `addr`, stopping at the
    /// end of the segment
    pub fn data_cells(&self, addr: Cell, count: usize) -> Vec<Cell> {
        (0..count)
            .map_while(|i| {
                let offset = Cell::try_from(i).ok()?.checked_mul(CELL_SIZE)?;
                self.data_cell(addr.checked_add(offset)?)
            })
            .collect()
    }

    /// Instruction at code offset `addr`, undoing opcode relocation
    pub fn opcode_at(&self, addr: Cell) -> Option<Opcode> {
        Opcode::decode(self.code_cell(addr)?, self.opcode_map)
    }

    /// Inside the stack/heap region `[hlw, stp)`
    pub fn is_stack_addr(&self, addr: Cell) -> bool {
        addr >= self.regs.hlw && addr < self.regs.stp
    }

    /// Inside the data segment, below the stack top
    pub fn is_data_addr(&self, addr: Cell) -> bool {
        addr >= 0 && addr < self.regs.stp && (addr as usize) < self.data.len()
    }

    /// Inside the code segment
    pub fn is_code_addr(&self, addr: Cell) -> bool {
        addr >= 0 && (addr as usize) < self.code.len()
    }

    // ── Function tables ─────────────────────────────────────────────────────

    /// Code address of the public at `index`; [`EXEC_MAIN`] is the entry point
    pub fn public_address(&self, index: Cell) -> Option<Cell> {
        if index == EXEC_MAIN {
            return self.entry_point;
        }
        let index = usize::try_from(index).ok()?;
        self.publics.get(index).map(|p| p.address)
    }

    pub fn public_name(&self, index: Cell) -> Option<&'a str> {
        if index == EXEC_MAIN {
            return self.entry_point.map(|_| MAIN_NAME);
        }
        let index = usize::try_from(index).ok()?;
        self.publics.get(index).map(|p| p.name.as_str())
    }

    /// Name of the public starting at `address`
    pub fn find_public(&self, address: Cell) -> Option<&'a str> {
        if self.is_main_addr(address) {
            return Some(MAIN_NAME);
        }
        self.publics
            .iter()
            .find(|p| p.address == address)
            .map(|p| p.name.as_str())
    }

    pub fn is_public_addr(&self, address: Cell) -> bool {
        self.find_public(address).is_some()
    }

    pub fn is_main_addr(&self, address: Cell) -> bool {
        self.entry_point == Some(address)
    }

    pub fn native(&self, index: Cell) -> Option<&'a Native> {
        let index = usize::try_from(index).ok()?;
        self.natives.get(index)
    }

    pub fn native_name(&self, index: Cell) -> Option<&'a str> {
        self.native(index).map(|n| n.name.as_str())
    }
}

fn read_cell(segment: &[u8], addr: Cell) -> Option<Cell> {
    let start = usize::try_from(addr).ok()?;
    let bytes = segment.get(start..start.checked_add(CELL_SIZE as usize)?)?;
    Some(Cell::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
