//! Instance registry
//!
//! Tracks the scripts attached to the host and the shared call stack log. A
//! host wraps every native and public invocation in [`Registry::with_native_call`]
//! or [`Registry::with_public_call`] and reports crashes and runtime errors
//! through the registry, which knows the debug info of every instance.

use crate::addr::Cell;
use crate::amx::{AmxRef, InstanceId, Registers};
use crate::backtrace::{Backtrace, ModuleResolver, BACKTRACE_HEADING};
use crate::call_stack::{CallRecord, CallStack};
use crate::debug::DebugInfo;
use crate::error_code::{runtime_error_report, AmxError};
use crate::frame::{Frame, StackTrace};
use crate::render::FrameRenderer;
use pawntrace_config::{BacktraceLimits, Config, TraceFilter, TraceFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A loaded script and what is known about it
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// File name shown on frames without debug info
    pub name: String,
    pub path: Option<PathBuf>,
    pub debug_info: DebugInfo,
}

impl Script {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_debug_info(mut self, debug_info: DebugInfo) -> Self {
        self.debug_info = debug_info;
        self
    }

    /// Script for the module file at `path`, with its debug info if present
    pub fn load(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            path: Some(path.to_path_buf()),
            debug_info: DebugInfo::load(path),
        }
    }
}

#[derive(Debug)]
struct Attached {
    script: Script,
    /// Frame pointer seen by the last function entry hook, above every frame
    /// until the first one
    last_frame: Cell,
}

/// Scripts attached to the host plus the shared call stack log
#[derive(Debug, Default)]
pub struct Registry {
    scripts: HashMap<InstanceId, Attached>,
    calls: CallStack,
    trace: TraceFlags,
    trace_filter: Option<TraceFilter>,
    limits: BacktraceLimits,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            trace: config.trace,
            trace_filter: config.trace_filter.clone(),
            limits: config.limits,
            ..Default::default()
        }
    }

    pub fn with_trace(mut self, trace: TraceFlags) -> Self {
        self.trace = trace;
        self
    }

    /// Only log trace lines matching `filter`
    pub fn with_trace_filter(mut self, filter: TraceFilter) -> Self {
        self.trace_filter = Some(filter);
        self
    }

    pub fn with_limits(mut self, limits: BacktraceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn trace(&self) -> TraceFlags {
        self.trace
    }

    pub fn limits(&self) -> BacktraceLimits {
        self.limits
    }

    /// True if `line` passes the trace filter
    pub fn is_traced(&self, line: &str) -> bool {
        self.trace_filter.as_ref().map_or(true, |f| f.matches(line))
    }

    fn log_trace(&self, line: &str) {
        if self.is_traced(line) {
            log::info!(target: "pawntrace", "[trace] {}", line);
        }
    }

    // ── Instances ───────────────────────────────────────────────────────────

    /// Register a script, returning the one it replaces
    pub fn attach(&mut self, instance: InstanceId, script: Script) -> Option<Script> {
        self.scripts
            .insert(
                instance,
                Attached {
                    script,
                    last_frame: Cell::MAX,
                },
            )
            .map(|old| old.script)
    }

    pub fn detach(&mut self, instance: InstanceId) -> Option<Script> {
        self.scripts.remove(&instance).map(|a| a.script)
    }

    pub fn script(&self, instance: InstanceId) -> Option<&Script> {
        self.scripts.get(&instance).map(|a| &a.script)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    // ── Call tracking ───────────────────────────────────────────────────────

    pub fn call_stack(&self) -> &CallStack {
        &self.calls
    }

    /// True while any native or public call is in flight
    pub fn is_inside_amx(&self) -> bool {
        !self.calls.is_empty()
    }

    /// Innermost call in flight
    pub fn top(&self) -> Option<&CallRecord> {
        self.calls.top()
    }

    /// Run `f` as the body of native call `index` made by `amx`
    pub fn with_native_call<R>(
        &mut self,
        amx: &AmxRef<'_>,
        index: Cell,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.calls.push(CallRecord::native(amx, index));
        if self.trace.natives {
            self.log_trace(&native_trace_line(amx, index));
        }

        let result = f(self);
        self.calls.pop();
        result
    }

    /// Run `f` as the execution of public `index` of `amx`
    pub fn with_public_call<R>(
        &mut self,
        amx: &AmxRef<'_>,
        index: Cell,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.calls.push(CallRecord::public(amx, index));
        if self.trace.functions {
            if let Some(attached) = self.scripts.get_mut(&amx.id()) {
                attached.last_frame = 0;
            }
        }
        if self.trace.publics {
            if let Some(line) = self.public_trace_line(amx, index) {
                self.log_trace(&line);
            }
        }

        let result = f(self);
        self.calls.pop();
        result
    }

    /// Debug hook: called by the VM on every line/function boundary
    ///
    /// Logs the current function when the frame pointer moved inward.
    pub fn function_entered(&mut self, amx: &AmxRef<'_>) {
        let frm = amx.registers().frm;
        let line = self.function_trace_line(amx);
        if let Some(attached) = self.scripts.get_mut(&amx.id()) {
            attached.last_frame = frm;
        }
        if let Some(line) = line {
            self.log_trace(&line);
        }
    }

    /// Trace line for a public call, `None` when the public has no address
    pub fn public_trace_line(&self, amx: &AmxRef<'_>, index: Cell) -> Option<String> {
        let address = amx.public_address(index).filter(|&a| a != 0)?;
        let regs = amx.registers();
        let frame = match StackTrace::new(*amx, regs.frm, regs.cip, 1).next() {
            Some(mut live) => {
                live.set_caller_address(address);
                live
            }
            None => Frame::from_parts(*amx, regs.frm, 0, 0, address),
        };
        let debug = self.debug_info(amx.id());
        Some(self.renderer(amx.id(), &debug).resolve(&frame).call_signature())
    }

    /// Trace line for the function just entered, if it should be logged
    pub fn function_trace_line(&self, amx: &AmxRef<'_>) -> Option<String> {
        if !self.trace.functions {
            return None;
        }
        let attached = self.scripts.get(&amx.id())?;
        let debug = &attached.script.debug_info;
        let regs = amx.registers();
        if !debug.is_loaded() || regs.frm >= attached.last_frame {
            return None;
        }
        let frame = StackTrace::new(*amx, regs.frm, regs.cip, 1).next()?;
        Some(self.renderer(amx.id(), debug).resolve(&frame).call_signature())
    }

    // ── Reports ─────────────────────────────────────────────────────────────

    /// Backtrace of `amx` from its live registers
    pub fn backtrace<'a>(&self, amx: AmxRef<'a>, modules: &dyn ModuleResolver) -> Backtrace<'a> {
        Backtrace::capture(amx, &self.calls, modules, self.limits.max_depth)
    }

    /// Heading plus numbered frame lines
    pub fn backtrace_lines(&self, amx: AmxRef<'_>, modules: &dyn ModuleResolver) -> Vec<String> {
        let debug = self.debug_info(amx.id());
        let renderer = self.renderer(amx.id(), &debug);
        let mut lines = vec![BACKTRACE_HEADING.to_string()];
        lines.extend(self.backtrace(amx, modules).lines(&renderer));
        lines
    }

    /// Log the backtrace of `amx` at error level
    pub fn print_backtrace(&self, amx: AmxRef<'_>, modules: &dyn ModuleResolver) {
        for line in self.backtrace_lines(amx, modules) {
            log::error!(target: "pawntrace", "{}", line);
        }
    }

    /// Runtime error report of `amx`, followed by its backtrace when the
    /// error code calls for one
    ///
    /// `saved` are the registers at the moment of the error. The backtrace
    /// is taken from the live registers.
    pub fn runtime_error_lines(
        &self,
        amx: AmxRef<'_>,
        saved: &Registers,
        error: AmxError,
        modules: &dyn ModuleResolver,
    ) -> Vec<String> {
        let mut lines = runtime_error_report(&amx, saved, error);
        if error.wants_backtrace() {
            lines.extend(self.backtrace_lines(amx, modules));
        }
        lines
    }

    /// Log a runtime error raised by `amx`; codes that are not errors are
    /// ignored
    pub fn report_runtime_error(
        &self,
        amx: AmxRef<'_>,
        saved: &Registers,
        error: AmxError,
        modules: &dyn ModuleResolver,
    ) {
        if !error.is_error() {
            return;
        }
        for line in self.runtime_error_lines(amx, saved, error, modules) {
            log::error!(target: "pawntrace", "{}", line);
        }
    }

    /// Crash in native code; logs the innermost script's backtrace if a call
    /// is in flight
    ///
    /// The host passes the instance of `top()`, if any.
    pub fn report_crash(&self, amx: Option<AmxRef<'_>>, modules: &dyn ModuleResolver) {
        match amx.filter(|_| self.is_inside_amx()) {
            Some(amx) => {
                let name = self.script(amx.id()).map(|s| s.name.as_str()).unwrap_or("<unknown>");
                log::error!(target: "pawntrace", "Server crashed while executing {}", name);
                self.print_backtrace(amx, modules);
            }
            None => log::error!(target: "pawntrace", "Server crashed due to an unknown error"),
        }
    }

    fn debug_info(&self, instance: InstanceId) -> std::borrow::Cow<'_, DebugInfo> {
        match self.script(instance) {
            Some(script) => std::borrow::Cow::Borrowed(&script.debug_info),
            None => std::borrow::Cow::Owned(DebugInfo::default()),
        }
    }

    fn renderer<'d>(&self, instance: InstanceId, debug: &'d DebugInfo) -> FrameRenderer<'d> {
        let renderer = FrameRenderer::new(debug).with_limits(self.limits);
        match self.script(instance) {
            Some(script) => renderer.with_script_name(script.name.clone()),
            None => renderer,
        }
    }
}

/// Trace line for a native call
pub fn native_trace_line(amx: &AmxRef<'_>, index: Cell) -> String {
    format!("native {} ()", amx.native_name(index).unwrap_or("<unknown>"))
}
