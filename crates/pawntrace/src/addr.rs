//! Cells and checked addresses
//!
//! Every address decoded from VM memory is wrapped in [`Addr`] right after its
//! bounds check. An absent address is never dereferenced; code that needs the
//! raw value for display gets `0`, the zero sentinel of the VM.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The VM's word: every register, address and stored value is one cell
pub type Cell = i32;

/// Size of a cell in bytes
pub const CELL_SIZE: Cell = 4;

/// A bounds-checked address, or nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<Cell>", into = "Option<Cell>")]
pub enum Addr {
    #[default]
    Absent,
    At(Cell),
}

impl Addr {
    /// Accept `value` if it is non-zero and passes `valid`
    pub fn checked(value: Cell, valid: impl FnOnce(Cell) -> bool) -> Addr {
        if value != 0 && valid(value) {
            Addr::At(value)
        } else {
            Addr::Absent
        }
    }

    pub fn get(self) -> Option<Cell> {
        match self {
            Addr::At(a) => Some(a),
            Addr::Absent => None,
        }
    }

    /// The address, or the zero sentinel
    pub fn raw(self) -> Cell {
        self.get().unwrap_or(0)
    }

    pub fn is_present(self) -> bool {
        matches!(self, Addr::At(_))
    }

    pub fn is_absent(self) -> bool {
        matches!(self, Addr::Absent)
    }
}

impl From<Option<Cell>> for Addr {
    fn from(value: Option<Cell>) -> Self {
        match value {
            Some(0) | None => Addr::Absent,
            Some(a) => Addr::At(a),
        }
    }
}

impl From<Addr> for Option<Cell> {
    fn from(addr: Addr) -> Self {
        addr.get()
    }
}

/// Eight hex digits, or question marks when absent
impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::At(a) => write!(f, "{:08x}", a),
            Addr::Absent => f.write_str("????????"),
        }
    }
}
