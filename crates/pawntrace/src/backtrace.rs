//! Backtrace assembler
//!
//! Combines the call stack log with bytecode frame walking. Records are
//! consumed newest first:
//!
//! - a native call contributes one entry;
//! - a public call contributes the frames walked from the current cursor,
//!   the outermost of which is pinned to the public's entry address.
//!
//! After each record the cursor jumps to the registers captured with it,
//! which is where execution sat on the other side of that call boundary.

use crate::amx::AmxRef;
use crate::call_stack::{CallKind, CallRecord, CallStack};
use crate::frame::{Frame, StackTrace};
use crate::render::{FrameRenderer, NativeFrame, ResolvedFrame};

/// Heading printed above a backtrace
pub const BACKTRACE_HEADING: &str = "AMX backtrace:";

/// Maps host code addresses to the module (executable or library) that
/// contains them
pub trait ModuleResolver {
    fn module_of(&self, address: usize) -> Option<String>;
}

/// Resolver for hosts that cannot name their modules
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModules;

impl ModuleResolver for NoModules {
    fn module_of(&self, _address: usize) -> Option<String> {
        None
    }
}

/// One level of the backtrace
#[derive(Debug, Clone)]
pub enum BacktraceEntry<'a> {
    Script(Frame<'a>),
    Native(NativeFrame),
}

/// Call stack levels of one instance, innermost first
#[derive(Debug, Clone, Default)]
pub struct Backtrace<'a> {
    entries: Vec<BacktraceEntry<'a>>,
}

impl<'a> Backtrace<'a> {
    /// Assemble the backtrace of `amx` from its live registers and the log
    ///
    /// Stops at the end of the log, when the cursor reaches code address 0,
    /// or at the first record that belongs to another instance.
    pub fn capture(
        amx: AmxRef<'a>,
        calls: &CallStack,
        modules: &dyn ModuleResolver,
        max_depth: usize,
    ) -> Self {
        let mut entries = Vec::new();
        let regs = amx.registers();
        let (mut frm, mut cip) = (regs.frm, regs.cip);

        for record in calls.iter() {
            if cip == 0 || record.instance != amx.id() {
                break;
            }

            match record.kind {
                CallKind::Native => {
                    entries.push(BacktraceEntry::Native(native_frame(&amx, record, modules)));
                }
                CallKind::Public => {
                    let entry = amx.public_address(record.index).unwrap_or(0);
                    let mut frames: Vec<Frame<'a>> =
                        StackTrace::new(amx, frm, cip, max_depth).collect();
                    match frames.last_mut() {
                        // Frame walking cannot see past the entry point
                        Some(outermost) => outermost.set_caller_address(entry),
                        None => frames.push(Frame::from_parts(amx, frm, 0, 0, entry)),
                    }
                    entries.extend(frames.into_iter().map(BacktraceEntry::Script));
                }
            }

            frm = record.frm;
            cip = record.cip;
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[BacktraceEntry<'a>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Structured frames, innermost first
    pub fn resolve(&self, renderer: &FrameRenderer<'_>) -> Vec<ResolvedFrame> {
        self.entries
            .iter()
            .map(|entry| match entry {
                BacktraceEntry::Script(frame) => ResolvedFrame::Script(renderer.resolve(frame)),
                BacktraceEntry::Native(native) => ResolvedFrame::Native(native.clone()),
            })
            .collect()
    }

    /// Numbered text lines, `#0` innermost
    pub fn lines(&self, renderer: &FrameRenderer<'_>) -> Vec<String> {
        self.resolve(renderer)
            .iter()
            .enumerate()
            .map(|(i, frame)| format!("#{} {}", i, frame))
            .collect()
    }

    /// Write the heading and every line to the log at error level
    pub fn log(&self, renderer: &FrameRenderer<'_>) {
        log::error!(target: "pawntrace", "{}", BACKTRACE_HEADING);
        for line in self.lines(renderer) {
            log::error!(target: "pawntrace", "{}", line);
        }
    }
}

fn native_frame(amx: &AmxRef<'_>, record: &CallRecord, modules: &dyn ModuleResolver) -> NativeFrame {
    let native = amx.native(record.index);
    let address = native.map(|n| n.address).filter(|&a| a != 0);
    NativeFrame {
        index: record.index,
        name: native.map(|n| n.name.clone()),
        address,
        module: address.and_then(|a| modules.module_of(a)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amx::{InstanceId, Native, Registers};

    struct FixedModule;

    impl ModuleResolver for FixedModule {
        fn module_of(&self, address: usize) -> Option<String> {
            (address >= 0x1000).then(|| "plugin.so".to_string())
        }
    }

    #[test]
    fn test_empty_log_gives_empty_backtrace() {
        let amx = AmxRef::new(InstanceId(0), &[], &[], Registers::default());
        let bt = Backtrace::capture(amx, &CallStack::new(), &NoModules, 100);
        assert!(bt.is_empty());
    }

    #[test]
    fn test_native_entry_resolves_module() {
        let natives = vec![Native {
            name: "printf".to_string(),
            address: 0x1234,
        }];
        let regs = Registers {
            cip: 8,
            ..Default::default()
        };
        let amx = AmxRef::new(InstanceId(0), &[], &[], regs).with_natives(&natives);

        let mut calls = CallStack::new();
        calls.push(CallRecord::native(&amx, 0));
        calls.push(CallRecord::native(&amx, 5));

        let bt = Backtrace::capture(amx, &calls, &FixedModule, 100);
        let lines = bt.lines(&FrameRenderer::new(&Default::default()));
        assert_eq!(
            lines,
            vec![
                "#0 native unknown ()".to_string(),
                "#1 native printf () [00001234] from plugin.so".to_string(),
            ]
        );
    }

    #[test]
    fn test_stops_at_other_instance() {
        let regs = Registers {
            cip: 8,
            ..Default::default()
        };
        let amx = AmxRef::new(InstanceId(0), &[], &[], regs);
        let other = AmxRef::new(InstanceId(1), &[], &[], regs);

        let mut calls = CallStack::new();
        calls.push(CallRecord::native(&amx, 0));
        calls.push(CallRecord::native(&other, 0));

        let bt = Backtrace::capture(amx, &calls, &NoModules, 100);
        assert!(bt.is_empty());
    }
}
