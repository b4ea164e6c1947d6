//! Frame renderer
//!
//! Turns decoded frames into [`ResolvedFrame`] values and their one-line text
//! form:
//!
//! ```text
//! 000001c4 in public Float:OnDamage (playerid=3, Float:amount=12.5) <game:playing> at main.pwn:42
//! native SetPlayerHealth () [0804a1b0] from samp03svr
//! ```

use crate::addr::{Addr, Cell, CELL_SIZE};
use crate::amx::AmxRef;
use crate::case_table::resolve_states;
use crate::debug::{DebugInfo, Symbol};
use crate::frame::Frame;
use crate::strings;
use pawntrace_config::BacktraceLimits;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the untagged tag
const NO_TAG: &str = "_";

/// A frame with every name and value resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResolvedFrame {
    Script(ScriptFrame),
    Native(NativeFrame),
}

/// Frame of bytecode execution
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptFrame {
    pub return_address: Addr,
    /// Function executing at `return_address`, `None` when unknown
    pub function: Option<String>,
    pub public: bool,
    /// Return tag of the function, untagged omitted
    pub tag: Option<String>,
    pub arguments: Vec<String>,
    /// Arguments passed but not shown
    pub omitted_arguments: usize,
    pub automaton: Option<String>,
    pub states: Vec<String>,
    pub file: Option<String>,
    /// One-based
    pub line: Option<i32>,
    /// Module file name, given when there is no debug info to locate code
    pub module: Option<String>,
}

/// Native function call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NativeFrame {
    pub index: Cell,
    pub name: Option<String>,
    /// Host address the native is bound to
    pub address: Option<usize>,
    /// Host module containing `address`
    pub module: Option<String>,
}

impl ScriptFrame {
    /// `public Tag:Name (args)`, without address or location
    pub fn call_signature(&self) -> String {
        let mut out = String::new();
        if self.public {
            out.push_str("public ");
        }
        if let Some(tag) = &self.tag {
            out.push_str(tag);
            out.push(':');
        }
        out.push_str(self.function.as_deref().unwrap_or("??"));
        out.push_str(" (");
        out.push_str(&self.arguments.join(", "));
        if self.omitted_arguments > 0 {
            if !self.arguments.is_empty() {
                out.push_str(", ");
            }
            out.push_str(&format!(
                "... <{} more argument{}>",
                self.omitted_arguments,
                if self.omitted_arguments == 1 { "" } else { "s" }
            ));
        }
        out.push(')');
        out
    }
}

impl fmt::Display for ScriptFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.return_address, self.call_signature())?;

        if !self.states.is_empty() {
            match self.automaton.as_deref() {
                Some(name) if !name.is_empty() => {
                    write!(f, " <{}:{}>", name, self.states.join(", "))?
                }
                _ => write!(f, " <{}>", self.states.join(", "))?,
            }
        }

        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, " at {}:{}", file, line)?,
            (Some(file), None) => write!(f, " at {}", file)?,
            _ => {}
        }

        if let Some(module) = &self.module {
            write!(f, " from {}", module)?;
        }
        Ok(())
    }
}

impl fmt::Display for NativeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native {} ()", self.name.as_deref().unwrap_or("unknown"))?;
        if let Some(address) = self.address.filter(|&a| a != 0) {
            write!(f, " [{:08x}]", address)?;
        }
        if let Some(module) = &self.module {
            write!(f, " from {}", module)?;
        }
        Ok(())
    }
}

impl fmt::Display for ResolvedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedFrame::Script(frame) => fmt::Display::fmt(frame, f),
            ResolvedFrame::Native(frame) => fmt::Display::fmt(frame, f),
        }
    }
}

/// Resolves frames of one instance against its debug info
#[derive(Debug, Clone)]
pub struct FrameRenderer<'d> {
    debug: &'d DebugInfo,
    limits: BacktraceLimits,
    script_name: Option<String>,
}

impl<'d> FrameRenderer<'d> {
    pub fn new(debug: &'d DebugInfo) -> Self {
        Self {
            debug,
            limits: BacktraceLimits::default(),
            script_name: None,
        }
    }

    pub fn with_limits(mut self, limits: BacktraceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Module name shown on frames that cannot be located in source
    pub fn with_script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = Some(name.into());
        self
    }

    pub fn render(&self, frame: &Frame<'_>) -> String {
        self.resolve(frame).to_string()
    }

    pub fn resolve(&self, frame: &Frame<'_>) -> ScriptFrame {
        let amx = frame.amx();
        let debug = self.debug;
        let caller = frame.caller_address().get();

        let symbol = caller.and_then(|a| debug.exact_function(a).or_else(|| debug.function(a)));

        let mut out = ScriptFrame {
            return_address: frame.return_address(),
            ..Default::default()
        };

        if let Some(address) = caller {
            out.public = amx.is_public_addr(address) && !amx.is_main_addr(address);
        }

        match symbol {
            Some(sym) => {
                out.function = Some(sym.name.clone());
                out.tag = self.tag_of(sym.tag).map(str::to_string);
            }
            None => out.function = caller.and_then(|a| amx.find_public(a)).map(str::to_string),
        }

        self.resolve_arguments(frame, symbol, &mut out);

        if let (Some(function), Some(ret)) = (caller, frame.return_address().get()) {
            self.annotate_states(amx, function, ret, &mut out);
        }

        if let Some(ret) = frame.return_address().get() {
            out.file = debug.file(ret).map(|f| f.name.clone());
            out.line = debug.line(ret).map(|l| l.number());
        }

        if !debug.is_loaded() {
            out.module = self.script_name.clone();
        }

        out
    }

    /// Tag name, `None` for untagged or unknown tags
    fn tag_of(&self, id: i16) -> Option<&'d str> {
        self.debug.tag_name(id).filter(|&name| name != NO_TAG)
    }

    fn resolve_arguments(&self, frame: &Frame<'_>, symbol: Option<&Symbol>, out: &mut ScriptFrame) {
        if frame.address().is_absent() {
            return;
        }
        let passed = frame.argument_count();
        let max = self.limits.max_arguments;

        match symbol {
            Some(function) => {
                let declared = self.debug.arguments(function);
                for (i, arg) in declared.iter().take(max).enumerate() {
                    out.arguments.push(self.format_argument(frame, arg, frame.argument(i)));
                }
                let total = declared.len().max(passed);
                out.omitted_arguments = total - out.arguments.len();
            }
            None => {
                for i in 0..passed.min(max) {
                    match frame.argument(i) {
                        Some(value) => out.arguments.push(value.to_string()),
                        None => break,
                    }
                }
                out.omitted_arguments = passed - out.arguments.len();
            }
        }
    }

    fn format_argument(&self, frame: &Frame<'_>, arg: &Symbol, value: Option<Cell>) -> String {
        let amx = frame.amx();
        let tag = self.tag_of(arg.tag);

        let mut out = String::new();
        if arg.is_reference() {
            out.push('&');
        }
        if let Some(tag) = tag {
            out.push_str(tag);
            out.push(':');
        }
        out.push_str(&arg.name);

        let Some(value) = value else {
            out.push_str("=?");
            return out;
        };

        if arg.is_variable() {
            out.push('=');
            out.push_str(&scalar(tag, value));
        } else if arg.is_reference() {
            out.push_str(&format!("=@0x{:08x}", value));
            if let Some(target) = amx.data_cell(value).filter(|_| amx.is_data_addr(value)) {
                out.push(' ');
                out.push_str(&scalar(tag, target));
            }
        } else if arg.is_array() {
            for dim in &arg.dims {
                if dim.size == 0 {
                    out.push_str("[]");
                } else {
                    out.push('[');
                    if let Some(dim_tag) = self.tag_of(dim.tag) {
                        out.push_str(dim_tag);
                        out.push(':');
                    }
                    out.push_str(&dim.size.to_string());
                    out.push(']');
                }
            }
            out.push_str(&format!("=@0x{:08x}", value));

            let plain = arg.dims.len() == 1 && tag.is_none() && self.tag_of(arg.dims[0].tag).is_none();
            if plain {
                if let Some(text) = self.string_at(amx, value, arg.dims[0].size) {
                    out.push(' ');
                    out.push_str(&text);
                }
            }
        } else {
            out.push('=');
            out.push_str(&value.to_string());
        }
        out
    }

    /// Quoted string stored at `address`, `!` marking a packed one
    fn string_at(&self, amx: &AmxRef<'_>, address: Cell, size: u32) -> Option<String> {
        if !amx.is_data_addr(address) {
            return None;
        }
        let max = self.limits.max_string_length;
        let available = ((amx.registers().stp - address) / CELL_SIZE).max(0) as usize;
        let cells = match size {
            0 => available,
            n => n as usize,
        }
        .min(max + 1);

        let decoded = strings::decode(&amx.data_cells(address, cells), max + 1);
        let text = strings::clip(&decoded.text, max);
        Some(if decoded.packed {
            format!("!\"{}\"", text)
        } else {
            format!("\"{}\"", text)
        })
    }

    fn annotate_states(&self, amx: &AmxRef<'_>, function: Cell, code_address: Cell, out: &mut ScriptFrame) {
        let Some(info) = resolve_states(amx, self.debug, function, code_address) else {
            return;
        };
        let Some(automaton) = self.debug.automaton_at(info.state_variable) else {
            return;
        };
        out.automaton = Some(automaton.name.clone());
        out.states = info
            .states
            .iter()
            .map(|&id| {
                i16::try_from(id)
                    .ok()
                    .and_then(|id| self.debug.state(id, automaton.id))
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect();
    }
}

/// Decode a scalar by its tag
fn scalar(tag: Option<&str>, value: Cell) -> String {
    match tag {
        Some("bool") => (value != 0).to_string(),
        Some("Float") => f32::from_bits(value as u32).to_string(),
        _ => value.to_string(),
    }
}
