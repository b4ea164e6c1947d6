//! Error command - runtime error report for a captured VM state

use super::backtrace::Captured;
use super::print_json;
use anyhow::{anyhow, Result};
use pawntrace::error_code::heading;
use pawntrace::{runtime_error_report, AmxError, ResolvedFrame};
use pawntrace_config::Config;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ErrorReport {
    code: i32,
    error: AmxError,
    message: &'static str,
    /// Heading and detail lines
    report: Vec<String>,
    backtrace: Option<Vec<ResolvedFrame>>,
}

pub fn run(module: &Path, snapshot: &Path, code: i32, config: &Config, json: bool) -> Result<()> {
    let error = AmxError::from_code(code).ok_or_else(|| anyhow!("{}", heading(code)))?;
    let captured = Captured::load(module, snapshot)?;

    let amx = captured.snapshot.amx_ref(&captured.image, &captured.memory);
    let saved = captured.snapshot.error_registers();
    let report = runtime_error_report(&amx, &saved, error);

    if json {
        let backtrace = error
            .wants_backtrace()
            .then(|| captured.frames(config));
        return print_json(&ErrorReport {
            code,
            error,
            message: error.message(),
            report,
            backtrace,
        });
    }

    for line in report {
        println!("{}", line);
    }
    if error.wants_backtrace() {
        for line in captured.lines(config) {
            println!("{}", line);
        }
    }
    Ok(())
}
