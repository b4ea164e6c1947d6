//! State automaton dispatch
//!
//! A function with state variants compiles to a dispatch stub that switches on
//! the automaton's state variable:
//!
//! ```text
//! f + 0   PROC
//! f + 4   LOAD.pri  <state variable>
//! f + 12  SWITCH    <case table>
//! ```
//!
//! The case table is `CASETBL n default (value target)*n`. Frame walking lands
//! on the stub, so the real body and the states that reach it are recovered
//! from the table.

use crate::addr::{Cell, CELL_SIZE};
use crate::amx::opcode::Opcode;
use crate::amx::AmxRef;
use crate::debug::DebugInfo;

/// Decoded case table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseTable {
    pub default_target: Cell,
    /// (case value, jump target), in table order
    pub cases: Vec<(Cell, Cell)>,
}

impl CaseTable {
    /// Decode the table at code offset `address`
    ///
    /// Jump targets are returned as code offsets.
    pub fn read(amx: &AmxRef<'_>, address: Cell) -> Option<CaseTable> {
        if amx.opcode_at(address)? != Opcode::Casetbl {
            return None;
        }
        let count = amx.code_cell(address.checked_add(CELL_SIZE)?)?;
        // Each case takes two cells; anything larger cannot fit the code
        let max_cases = (amx.code().len() / (2 * CELL_SIZE as usize)) as Cell;
        if !(0..=max_cases).contains(&count) {
            return None;
        }

        let target = |raw: Cell| raw.wrapping_sub(amx.code_base());
        let default_target = target(amx.code_cell(address.checked_add(2 * CELL_SIZE)?)?);

        let mut cases = Vec::with_capacity(count as usize);
        let mut slot = address.checked_add(3 * CELL_SIZE)?;
        for _ in 0..count {
            let value = amx.code_cell(slot)?;
            let jump = amx.code_cell(slot.checked_add(CELL_SIZE)?)?;
            cases.push((value, target(jump)));
            slot = slot.checked_add(2 * CELL_SIZE)?;
        }

        Some(CaseTable {
            default_target,
            cases,
        })
    }

    /// All jump targets, default included
    pub fn targets(&self) -> impl Iterator<Item = Cell> + '_ {
        std::iter::once(self.default_target).chain(self.cases.iter().map(|&(_, t)| t))
    }
}

/// A state dispatch stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDispatch {
    /// Data address of the automaton's state variable
    pub state_variable: Cell,
    pub table: CaseTable,
}

impl StateDispatch {
    /// Decode the stub at code offset `function`, if it is one
    pub fn at(amx: &AmxRef<'_>, function: Cell) -> Option<StateDispatch> {
        let word = |n: Cell| function.checked_add(n * CELL_SIZE);

        if amx.opcode_at(function)? != Opcode::Proc
            || amx.opcode_at(word(1)?)? != Opcode::LoadPri
            || amx.opcode_at(word(3)?)? != Opcode::Switch
        {
            return None;
        }
        let state_variable = amx.code_cell(word(2)?)?;
        let table_address = amx.code_cell(word(4)?)?.wrapping_sub(amx.code_base());
        let table = CaseTable::read(amx, table_address)?;

        Some(StateDispatch {
            state_variable,
            table,
        })
    }
}

/// States under which a frame's code was reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo {
    /// Entry address of the state-specific body
    pub entry: Cell,
    /// Data address of the automaton's state variable
    pub state_variable: Cell,
    /// Matching state ids, ascending
    pub states: Vec<Cell>,
    /// No case matched; only the default target did and state 0 is assumed
    pub via_default: bool,
}

/// Recover the states of the state function stub at `function`, given a code
/// address inside one of its bodies
pub fn resolve_states(
    amx: &AmxRef<'_>,
    debug: &DebugInfo,
    function: Cell,
    code_address: Cell,
) -> Option<StateInfo> {
    let dispatch = StateDispatch::at(amx, function)?;
    let table = &dispatch.table;

    let entry = match debug.function(code_address) {
        Some(body) => body.codestart,
        None => table.targets().filter(|&t| t <= code_address).max()?,
    };

    let mut states: Vec<Cell> = table
        .cases
        .iter()
        .filter(|&&(_, target)| target == entry)
        .map(|&(value, _)| value)
        .collect();
    states.sort_unstable();
    states.dedup();

    let via_default = states.is_empty() && table.default_target == entry;
    if via_default {
        states.push(0);
    }
    if states.is_empty() {
        return None;
    }

    Some(StateInfo {
        entry,
        state_variable: dispatch.state_variable,
        states,
        via_default,
    })
}
