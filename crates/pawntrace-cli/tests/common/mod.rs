//! Shared test utilities
//!
//! A small compiled module with debug info and a snapshot of it crashing
//! inside a native call re-entered from another native call.

#![allow(dead_code)]

use assert_cmd::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn pawntrace_cmd() -> Command {
    let mut cmd = Command::cargo_bin("pawntrace").unwrap();
    cmd.env_remove("PAWNTRACE_JSON")
        .env_remove("PAWNTRACE_TRACE")
        .env_remove("AMX_PATH");
    cmd
}

const PROC: i32 = 46;
const CALL: i32 = 49;
const PUSH_C: i32 = 39;
const RETN: i32 = 48;
const HALT: i32 = 120;
const SYSREQ_C: i32 = 123;

pub const MAIN: i32 = 0x08;
pub const BAR: i32 = 0x40;
pub const BAZ: i32 = 0x80;

fn cells(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|c| c.to_le_bytes()).collect()
}

fn name(out: &mut Vec<u8>, name: &str) {
    out.extend(name.as_bytes());
    out.push(0);
}

/// `main` calls native `Foo`; `Bar(playerid)` calls `Baz(value)`, which calls
/// `Foo`
fn code() -> Vec<i32> {
    let mut code = vec![HALT, 0, PROC, SYSREQ_C, 0, 0, RETN];
    code.resize(16, 0);
    code.extend([PROC, PUSH_C, 7, PUSH_C, 4, CALL, BAZ, 0, RETN]);
    code.resize(32, 0);
    code.extend([PROC, SYSREQ_C, 0, 0, RETN]);
    code.resize(40, 0);
    code
}

fn symbol(out: &mut Vec<u8>, sym: &str, address: i32, start: i32, end: i32, ident: u8, vclass: u8) {
    out.extend(address.to_le_bytes());
    out.extend(0i16.to_le_bytes());
    out.extend(start.to_le_bytes());
    out.extend(end.to_le_bytes());
    out.extend([ident, vclass]);
    out.extend(0u16.to_le_bytes());
    name(out, sym);
}

fn debug_section() -> Vec<u8> {
    let lines = [
        (0x08, 9),
        (0x0c, 10),
        (0x14, 11),
        (0x40, 19),
        (0x44, 20),
        (0x54, 21),
        (0x5c, 22),
        (0x80, 29),
        (0x84, 30),
        (0x8c, 31),
    ];

    let mut body = Vec::new();
    body.extend(0i32.to_le_bytes());
    name(&mut body, "test.pwn");
    for (address, line) in lines {
        body.extend((address as i32).to_le_bytes());
        body.extend((line as i32).to_le_bytes());
    }
    symbol(&mut body, "main", MAIN, MAIN, 0x40, 9, 0);
    symbol(&mut body, "@Bar", BAR, BAR, 0x80, 9, 0);
    symbol(&mut body, "Bar", BAR, BAR, 0x80, 9, 0);
    symbol(&mut body, "Baz", BAZ, BAZ, 0xa0, 9, 0);
    symbol(&mut body, "playerid", 12, BAR, 0x80, 1, 1);
    symbol(&mut body, "value", 12, BAZ, 0xa0, 1, 1);
    body.extend(0i16.to_le_bytes());
    name(&mut body, "_");

    let mut out = Vec::new();
    out.extend(((22 + body.len()) as u32).to_le_bytes());
    out.extend(0xF1EFu16.to_le_bytes());
    out.extend([8u8, 8]);
    out.extend(0u16.to_le_bytes());
    for count in [1u16, lines.len() as u16, 6, 1, 0, 0] {
        out.extend(count.to_le_bytes());
    }
    out.extend(body);
    out
}

/// The module image, with or without its debug section
pub fn module(with_debug: bool) -> Vec<u8> {
    const HEADER: usize = 56;
    let publics = HEADER;
    let natives = publics + 8;
    let nametable = natives + 8;
    let mut names = vec![31u8, 0];
    let bar_name = nametable + names.len();
    name(&mut names, "Bar");
    let foo_name = nametable + names.len();
    name(&mut names, "Foo");

    let code = code();
    let cod = (nametable + names.len() + 3) & !3;
    let dat = cod + 4 * code.len();
    let hea = dat + 0x40;
    let stp = hea + 0xc0;

    let mut out = Vec::new();
    out.extend((hea as u32).to_le_bytes());
    out.extend(0xF1E0u16.to_le_bytes());
    out.extend([8u8, 8]);
    out.extend((if with_debug { 0x02i16 } else { 0 }).to_le_bytes());
    out.extend(8i16.to_le_bytes());
    for field in [
        cod, dat, hea, stp, MAIN as usize, publics, natives, nametable, nametable, nametable,
        nametable,
    ] {
        out.extend((field as u32).to_le_bytes());
    }
    out.extend((BAR as u32).to_le_bytes());
    out.extend((bar_name as u32).to_le_bytes());
    out.extend(0u32.to_le_bytes());
    out.extend((foo_name as u32).to_le_bytes());
    out.extend(&names);
    out.resize(cod, 0);
    out.extend(cells(&code));
    out.resize(hea, 0);
    if with_debug {
        out.extend(debug_section());
    }
    out
}

/// Captured state: `Baz(7)` called from `Bar(3)` is inside native `Foo`
pub const SNAPSHOT: &str = r#"{
    "registers": { "frm": 204, "cip": 140, "stk": 200, "stp": 252, "hea": 64, "hlw": 64 },
    "stack": { "base": 204, "cells": [220, 92, 4, 7, 240, 0, 4, 3, 0, 0, 0, 0] },
    "calls": [
        { "kind": "public", "index": -1, "frm": 0, "cip": 0 },
        { "kind": "native", "index": 0, "frm": 240, "cip": 20 },
        { "kind": "public", "index": 0, "frm": 240, "cip": 20 },
        { "kind": "native", "index": 0, "frm": 204, "cip": 140 }
    ]
}"#;

/// A directory holding `gm.amx` and `crash.json`
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new(with_debug: bool) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("gm.amx"), module(with_debug)).unwrap();
        fs::write(dir.path().join("crash.json"), SNAPSHOT).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn module(&self) -> PathBuf {
        self.dir.path().join("gm.amx")
    }

    pub fn snapshot(&self) -> PathBuf {
        self.dir.path().join("crash.json")
    }
}
