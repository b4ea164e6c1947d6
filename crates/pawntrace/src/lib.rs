//! Pawntrace - AMX backtraces and crash diagnostics
//!
//! This library reconstructs what a Pawn AMX virtual machine was doing when
//! it crashed or raised a runtime error:
//! - Debug symbol lookups (files, lines, functions, states)
//! - Bytecode frame walking over the VM's data segment
//! - A call stack log bridging native/script boundaries
//! - Backtrace assembly and rendering
//! - Runtime error reports, module images and file location

/// Pawntrace version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod addr;
pub mod amx;
pub mod backtrace;
pub mod call_stack;
pub mod case_table;
pub mod debug;
pub mod error_code;
pub mod frame;
pub mod locate;
pub mod reader;
pub mod registry;
pub mod render;
pub mod snapshot;
pub mod strings;

// Re-export commonly used types
pub use addr::{Addr, Cell, CELL_SIZE};
pub use amx::image::{AmxHeader, AmxImage, ImageError, ImageResult};
pub use amx::opcode::Opcode;
pub use amx::{AmxRef, InstanceId, Native, Public, Registers, EXEC_MAIN};
pub use backtrace::{Backtrace, BacktraceEntry, ModuleResolver, NoModules, BACKTRACE_HEADING};
pub use call_stack::{CallKind, CallRecord, CallStack};
pub use case_table::{resolve_states, CaseTable, StateInfo};
pub use debug::{DebugInfo, DebugInfoError, DebugInfoResult, Symbol, SymbolKind};
pub use error_code::{runtime_error_report, AmxError};
pub use frame::{Frame, StackTrace};
pub use locate::AmxLocator;
pub use registry::{Registry, Script};
pub use render::{FrameRenderer, NativeFrame, ResolvedFrame, ScriptFrame};
pub use snapshot::{Snapshot, SnapshotError, StackDump};
