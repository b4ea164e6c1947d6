//! Captured VM state
//!
//! A snapshot is what a host dumps when a script crashes: the register file,
//! the live part of the stack and the call stack log. Combined with the
//! module image it is enough to rebuild the backtrace offline.
//!
//! ```json
//! {
//!   "registers": { "frm": 16308, "cip": 412, "stk": 16296, "stp": 16380, "hea": 1204, "hlw": 1204 },
//!   "stack": { "base": 16296, "cells": [16340, 296, 8, 1, 2] },
//!   "calls": [ { "kind": "public", "index": -1, "frm": 0, "cip": 0 } ]
//! }
//! ```

use crate::addr::{Cell, CELL_SIZE};
use crate::amx::image::AmxImage;
use crate::amx::{AmxRef, InstanceId, Registers};
use crate::call_stack::{CallRecord, CallStack};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stack dump at {base} does not fit a data segment of {size} bytes")]
    OutOfRange { base: Cell, size: usize },
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Consecutive data cells starting at `base`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StackDump {
    pub base: Cell,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub instance: InstanceId,
    /// Registers when the dump was taken
    pub registers: Registers,
    /// Registers at the moment of a runtime error, if they differ
    #[serde(default)]
    pub saved_registers: Option<Registers>,
    #[serde(default)]
    pub stack: StackDump,
    /// Call records, oldest first
    #[serde(default)]
    pub calls: Vec<CallRecord>,
}

impl Snapshot {
    pub fn load(path: &Path) -> SnapshotResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> SnapshotResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Registers to report a runtime error against
    pub fn error_registers(&self) -> Registers {
        self.saved_registers.unwrap_or(self.registers)
    }

    /// The module's data segment with the stack dump written over it
    pub fn apply(&self, data: &[u8]) -> SnapshotResult<Vec<u8>> {
        let out_of_range = || SnapshotError::OutOfRange {
            base: self.stack.base,
            size: data.len(),
        };
        let start = usize::try_from(self.stack.base).map_err(|_| out_of_range())?;
        let end = start
            .checked_add(self.stack.cells.len() * CELL_SIZE as usize)
            .ok_or_else(out_of_range)?;
        if end > data.len() {
            return Err(out_of_range());
        }

        let mut memory = data.to_vec();
        for (slot, cell) in memory[start..end]
            .chunks_exact_mut(CELL_SIZE as usize)
            .zip(&self.stack.cells)
        {
            slot.copy_from_slice(&cell.to_le_bytes());
        }
        Ok(memory)
    }

    /// The call log, every record attributed to the captured instance
    pub fn call_stack(&self) -> CallStack {
        self.calls
            .iter()
            .map(|record| CallRecord {
                instance: self.instance,
                ..*record
            })
            .collect()
    }

    /// View of `image` in the captured state; `memory` comes from [`Snapshot::apply`]
    pub fn amx_ref<'a>(&self, image: &'a AmxImage, memory: &'a [u8]) -> AmxRef<'a> {
        image.amx_ref_with(self.instance, memory, self.registers)
    }
}
