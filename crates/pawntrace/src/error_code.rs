//! AMX runtime error codes and their reports

use crate::addr::{Cell, CELL_SIZE};
use crate::amx::opcode::Opcode;
use crate::amx::{AmxRef, Registers};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes returned by the AMX API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum AmxError {
    None = 0,
    Exit = 1,
    Assert = 2,
    StackErr = 3,
    Bounds = 4,
    MemAccess = 5,
    InvInstr = 6,
    StackLow = 7,
    HeapLow = 8,
    Callback = 9,
    Native = 10,
    Divide = 11,
    Sleep = 12,
    InvState = 13,
    Memory = 16,
    Format = 17,
    Version = 18,
    NotFound = 19,
    Index = 20,
    Debug = 21,
    Init = 22,
    UserData = 23,
    InitJit = 24,
    Params = 25,
    Domain = 26,
    General = 27,
}

impl AmxError {
    const ALL: [AmxError; 26] = [
        AmxError::None,
        AmxError::Exit,
        AmxError::Assert,
        AmxError::StackErr,
        AmxError::Bounds,
        AmxError::MemAccess,
        AmxError::InvInstr,
        AmxError::StackLow,
        AmxError::HeapLow,
        AmxError::Callback,
        AmxError::Native,
        AmxError::Divide,
        AmxError::Sleep,
        AmxError::InvState,
        AmxError::Memory,
        AmxError::Format,
        AmxError::Version,
        AmxError::NotFound,
        AmxError::Index,
        AmxError::Debug,
        AmxError::Init,
        AmxError::UserData,
        AmxError::InitJit,
        AmxError::Params,
        AmxError::Domain,
        AmxError::General,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    /// `None` for reserved and out-of-range codes
    pub fn from_code(code: i32) -> Option<AmxError> {
        Self::ALL.into_iter().find(|e| e.code() == code)
    }

    pub fn message(self) -> &'static str {
        match self {
            AmxError::None => "(none)",
            AmxError::Exit => "Forced exit",
            AmxError::Assert => "Assertion failed",
            AmxError::StackErr => "Stack/heap collision (insufficient stack size)",
            AmxError::Bounds => "Array index out of bounds",
            AmxError::MemAccess => "Invalid memory access",
            AmxError::InvInstr => "Invalid instruction",
            AmxError::StackLow => "Stack underflow",
            AmxError::HeapLow => "Heap underflow",
            AmxError::Callback => "No (valid) native function callback",
            AmxError::Native => "Native function failed",
            AmxError::Divide => "Divide by zero",
            AmxError::Sleep => "(sleep mode)",
            AmxError::InvState => "Invalid state",
            AmxError::Memory => "Out of memory",
            AmxError::Format => "Invalid/unsupported P-code file format",
            AmxError::Version => "File is for a newer version of the AMX",
            AmxError::NotFound => "File or function is not found",
            AmxError::Index => "Invalid index parameter (bad entry point)",
            AmxError::Debug => "Debugger cannot run",
            AmxError::Init => "AMX not initialized (or doubly initialized)",
            AmxError::UserData => "Unable to set user data field (table full)",
            AmxError::InitJit => "Cannot initialize the JIT",
            AmxError::Params => "Parameter error",
            AmxError::Domain => "Domain error, expression result does not fit in range",
            AmxError::General => "General error (unknown or unspecific error)",
        }
    }

    /// Whether the code reports a failure at all
    ///
    /// `None` is what every public returns on a normal exit; `Sleep` parks
    /// the VM so it can be resumed later.
    pub fn is_error(self) -> bool {
        !matches!(self, AmxError::None | AmxError::Sleep)
    }

    /// Whether a backtrace adds anything to the report
    ///
    /// These codes are raised before any bytecode runs.
    pub fn wants_backtrace(self) -> bool {
        !matches!(
            self,
            AmxError::NotFound | AmxError::Index | AmxError::Callback | AmxError::Init
        )
    }
}

impl fmt::Display for AmxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Message for any raw code, including reserved and unknown ones
pub fn describe(code: i32) -> &'static str {
    match AmxError::from_code(code) {
        Some(error) => error.message(),
        None if (14..=15).contains(&code) => "(reserved)",
        None => "(unknown)",
    }
}

/// Heading line of a runtime error report
pub fn heading(code: i32) -> String {
    format!("Run time error {}: \"{}\"", code, describe(code))
}

/// Describe a runtime error raised by `amx`
///
/// `saved` holds the registers as they were when the VM stopped; the live
/// ones may have moved since. The first line is the heading, the rest are
/// details that depend on the error code and may be empty.
pub fn runtime_error_report(amx: &AmxRef<'_>, saved: &Registers, error: AmxError) -> Vec<String> {
    let mut lines = vec![heading(error.code())];
    let cip = saved.cip;

    match error {
        AmxError::Bounds => {
            if amx.opcode_at(cip) == Some(Opcode::Bounds) {
                let index = saved.pri;
                if index < 0 {
                    lines.push(format!(
                        " Attempted to read/write array element at negative index {}",
                        index
                    ));
                } else if let Some(upper) = cip.checked_add(CELL_SIZE).and_then(|a| amx.code_cell(a)) {
                    lines.push(format!(
                        " Attempted to read/write array element at index {} in array of size {}",
                        index,
                        upper.wrapping_add(1)
                    ));
                }
            }
        }
        AmxError::NotFound => {
            lines.extend(
                amx.natives()
                    .iter()
                    .filter(|n| n.address == 0)
                    .map(|n| format!(" {}", n.name)),
            );
        }
        AmxError::StackErr => lines.push(format!(
            " Stack pointer (STK) is 0x{:X}, heap pointer (HEA) is 0x{:X}",
            saved.stk, saved.hea
        )),
        AmxError::StackLow => lines.push(format!(
            " Stack pointer (STK) is 0x{:X}, stack top (STP) is 0x{:X}",
            saved.stk, saved.stp
        )),
        AmxError::HeapLow => lines.push(format!(
            " Heap pointer (HEA) is 0x{:X}, heap bottom (HLW) is 0x{:X}",
            saved.hea, saved.hlw
        )),
        AmxError::InvInstr => {
            if let Some(opcode) = amx.code_cell(cip) {
                lines.push(format!(
                    " Unknown opcode 0x{:x} at address 0x{:08X}",
                    opcode, cip
                ));
            }
        }
        AmxError::Native => {
            if let Some(name) = failed_native(amx, cip) {
                lines.push(format!(" {}", name));
            }
        }
        _ => {}
    }

    lines
}

/// Native called by the `SYSREQ.C` that `cip` returned from
fn failed_native<'a>(amx: &AmxRef<'a>, cip: Cell) -> Option<&'a str> {
    let instruction = cip.checked_sub(2 * CELL_SIZE)?;
    if amx.opcode_at(instruction)? != Opcode::SysreqC {
        return None;
    }
    let index = amx.code_cell(cip.checked_sub(CELL_SIZE)?)?;
    amx.native_name(index)
}
