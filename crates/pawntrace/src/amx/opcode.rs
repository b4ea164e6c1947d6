//! AMX instructions inspected by the diagnostics code
//!
//! Only the handful of opcodes needed to decode call sites, state dispatch
//! blocks and runtime error sites are named here. Numbering follows the
//! AMX instruction set.

use crate::addr::Cell;

/// AMX opcode
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Load PRI from a data address [address]
    LoadPri = 1,
    /// Function prologue
    Proc = 46,
    /// Call a script function [target]
    Call = 49,
    /// Abort if PRI is outside 0..=bound [bound]
    Bounds = 121,
    /// Call a native by index [index]
    SysreqC = 123,
    /// Jump through a case table [table]
    Switch = 129,
    /// Case table header [count, default]
    Casetbl = 130,
}

impl Opcode {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::LoadPri => "load.pri",
            Opcode::Proc => "proc",
            Opcode::Call => "call",
            Opcode::Bounds => "bounds",
            Opcode::SysreqC => "sysreq.c",
            Opcode::Switch => "switch",
            Opcode::Casetbl => "casetbl",
        }
    }

    /// Decode a code cell, undoing opcode relocation when a map is given
    ///
    /// A threaded interpreter replaces each opcode number with a handler
    /// address; `map[n]` is the value stored for opcode `n`.
    pub fn decode(raw: Cell, map: Option<&[Cell]>) -> Option<Opcode> {
        let number = match map {
            Some(map) => map.iter().position(|&v| v == raw)? as Cell,
            None => raw,
        };
        Opcode::try_from(number).ok()
    }
}

impl TryFrom<Cell> for Opcode {
    type Error = ();

    fn try_from(value: Cell) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Opcode::LoadPri),
            46 => Ok(Opcode::Proc),
            49 => Ok(Opcode::Call),
            121 => Ok(Opcode::Bounds),
            123 => Ok(Opcode::SysreqC),
            129 => Ok(Opcode::Switch),
            130 => Ok(Opcode::Casetbl),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain() {
        assert_eq!(Opcode::decode(129, None), Some(Opcode::Switch));
        assert_eq!(Opcode::decode(2, None), None);
    }

    #[test]
    fn test_decode_relocated() {
        let map: Vec<Cell> = (0..140).map(|n| 0x1000 + n * 16).collect();
        assert_eq!(Opcode::decode(0x1000 + 46 * 16, Some(&map)), Some(Opcode::Proc));
        // Raw numbers mean nothing once relocated
        assert_eq!(Opcode::decode(46, Some(&map)), None);
    }

    #[test]
    fn test_mnemonic() {
        assert_eq!(Opcode::SysreqC.mnemonic(), "sysreq.c");
    }
}
