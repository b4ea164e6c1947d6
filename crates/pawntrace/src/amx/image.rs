//! Compiled module images (.amx files)
//!
//! Parses the file header, expands compact-encoded code and data, reads the
//! public and native tables and keeps the optional debug section. The image
//! owns its segments and hands out [`AmxRef`] views over them.

use super::{AmxRef, InstanceId, Native, Public, Registers};
use crate::addr::{Cell, CELL_SIZE};
use crate::reader::{ByteReader, ShortRead};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Magic of modules compiled for 32-bit cells
pub const AMX_MAGIC: u16 = 0xF1E0;

/// Size of the packed file header in bytes
pub const HEADER_SIZE: usize = 56;

/// Debug section follows the image
pub const FLAG_DEBUG: i16 = 0x02;
/// Code and data are compact-encoded
pub const FLAG_COMPACT: i16 = 0x04;

pub const MIN_FILE_VERSION: u8 = 6;
pub const MAX_FILE_VERSION: u8 = 11;

/// Size of a function table entry (address + name offset)
const FUNC_STUB_SIZE: i16 = 8;

/// Largest stack plus heap accepted from a header
pub const MAX_STACK_HEAP: i32 = 64 * 1024 * 1024;

/// Module loading errors
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to read module: {0}")]
    Io(#[from] std::io::Error),

    #[error("Module truncated: {0}")]
    Truncated(#[from] ShortRead),

    #[error("Bad magic 0x{0:04x} (not a 32-bit AMX module)")]
    BadMagic(u16),

    #[error("Unsupported file version {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported function table entry size {0}")]
    BadDefSize(i16),

    #[error("Invalid segment layout: {0}")]
    BadLayout(String),

    #[error("Compact encoding does not fit the code and data segments")]
    BadCompactEncoding,
}

pub type ImageResult<T> = Result<T, ImageError>;

/// AMX file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AmxHeader {
    /// Size of the image, excluding the debug section
    pub size: i32,
    pub magic: u16,
    pub file_version: u8,
    pub amx_version: u8,
    pub flags: i16,
    pub defsize: i16,
    pub cod: i32,
    pub dat: i32,
    pub hea: i32,
    pub stp: i32,
    /// Code address of `main`, or -1
    pub cip: i32,
    pub publics: i32,
    pub natives: i32,
    pub libraries: i32,
    pub pubvars: i32,
    pub tags: i32,
    pub nametable: i32,
}

impl AmxHeader {
    /// Parse and validate the header at the start of `bytes`
    pub fn parse(bytes: &[u8]) -> ImageResult<Self> {
        let mut i = 0;
        let size = bytes.read32_with(&mut i)? as i32;
        let magic = bytes.read16_with(&mut i)?;
        if magic != AMX_MAGIC {
            return Err(ImageError::BadMagic(magic));
        }
        let file_version = bytes.read8_with(&mut i)?;
        let amx_version = bytes.read8_with(&mut i)?;
        let flags = bytes.read16_with(&mut i)? as i16;
        let defsize = bytes.read16_with(&mut i)? as i16;

        let mut next = || -> ImageResult<i32> { Ok(bytes.read32_with(&mut i)? as i32) };
        let header = AmxHeader {
            size,
            magic,
            file_version,
            amx_version,
            flags,
            defsize,
            cod: next()?,
            dat: next()?,
            hea: next()?,
            stp: next()?,
            cip: next()?,
            publics: next()?,
            natives: next()?,
            libraries: next()?,
            pubvars: next()?,
            tags: next()?,
            nametable: next()?,
        };

        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> ImageResult<()> {
        if !(MIN_FILE_VERSION..=MAX_FILE_VERSION).contains(&self.file_version) {
            return Err(ImageError::UnsupportedVersion(self.file_version));
        }
        if self.defsize != FUNC_STUB_SIZE {
            return Err(ImageError::BadDefSize(self.defsize));
        }

        let ordered = HEADER_SIZE as i32 <= self.cod
            && self.cod <= self.dat
            && self.dat <= self.hea
            && self.hea <= self.stp;
        if !ordered {
            return Err(ImageError::BadLayout(format!(
                "expected header <= cod <= dat <= hea <= stp, got cod={} dat={} hea={} stp={}",
                self.cod, self.dat, self.hea, self.stp
            )));
        }
        if self.stp - self.hea > MAX_STACK_HEAP {
            return Err(ImageError::BadLayout(format!(
                "stack and heap of {} bytes exceed {}",
                self.stp - self.hea,
                MAX_STACK_HEAP
            )));
        }

        let tables = HEADER_SIZE as i32 <= self.publics
            && self.publics <= self.natives
            && self.natives <= self.libraries
            && self.libraries <= self.cod;
        if !tables {
            return Err(ImageError::BadLayout(format!(
                "function tables out of order: publics={} natives={} libraries={}",
                self.publics, self.natives, self.libraries
            )));
        }

        Ok(())
    }

    pub fn has_debug_info(&self) -> bool {
        self.flags & FLAG_DEBUG != 0
    }

    pub fn is_compact(&self) -> bool {
        self.flags & FLAG_COMPACT != 0
    }

    pub fn num_publics(&self) -> usize {
        ((self.natives - self.publics) / self.defsize as i32) as usize
    }

    pub fn num_natives(&self) -> usize {
        ((self.libraries - self.natives) / self.defsize as i32) as usize
    }
}

/// A loaded module
#[derive(Debug, Clone)]
pub struct AmxImage {
    header: AmxHeader,
    header_bytes: [u8; HEADER_SIZE],
    code: Vec<u8>,
    data: Vec<u8>,
    publics: Vec<Public>,
    natives: Vec<Native>,
    debug_section: Option<Vec<u8>>,
}

impl AmxImage {
    /// Read and parse a module file
    pub fn load(path: &Path) -> ImageResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> ImageResult<Self> {
        let header = AmxHeader::parse(bytes)?;
        let size = header.size as usize;
        if size > bytes.len() {
            return Err(ShortRead(bytes.len()).into());
        }
        if header.cod as usize > size {
            return Err(ImageError::BadLayout(format!(
                "code segment at {} starts past the image end {}",
                header.cod, size
            )));
        }

        // Every compact cell takes at least one byte
        let stored = size - header.cod as usize;
        if header.is_compact() && (header.hea - header.cod) as usize > stored * CELL_SIZE as usize {
            return Err(ImageError::BadCompactEncoding);
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        header_bytes.copy_from_slice(&bytes[..HEADER_SIZE]);

        let cod = header.cod as usize;
        let dat = header.dat as usize;
        let hea = header.hea as usize;

        let segments = if header.is_compact() {
            expand_compact(&bytes[cod..size], hea - cod)?
        } else {
            bytes
                .get(cod..hea)
                .ok_or(ShortRead(bytes.len()))?
                .to_vec()
        };
        let code = segments[..dat - cod].to_vec();

        // The runtime data segment spans up to the stack top; the file only
        // stores the part below the heap.
        let mut data = segments[dat - cod..].to_vec();
        data.resize((header.stp - header.dat) as usize, 0);

        let publics = read_stubs(bytes, header.publics, header.num_publics())?
            .into_iter()
            .map(|(address, name)| Public {
                name,
                address: address as Cell,
            })
            .collect();
        let natives = read_stubs(bytes, header.natives, header.num_natives())?
            .into_iter()
            .map(|(address, name)| Native {
                name,
                address: address as usize,
            })
            .collect();

        let debug_section = (header.has_debug_info() && bytes.len() > size)
            .then(|| bytes[size..].to_vec());

        Ok(Self {
            header,
            header_bytes,
            code,
            data,
            publics,
            natives,
            debug_section,
        })
    }

    pub fn header(&self) -> &AmxHeader {
        &self.header
    }

    /// Raw header bytes, used to match a running instance to its file
    pub fn header_bytes(&self) -> &[u8; HEADER_SIZE] {
        &self.header_bytes
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Initial data segment, zero-filled up to the stack top
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn publics(&self) -> &[Public] {
        &self.publics
    }

    pub fn natives(&self) -> &[Native] {
        &self.natives
    }

    pub fn debug_section(&self) -> Option<&[u8]> {
        self.debug_section.as_deref()
    }

    /// Registers of a freshly initialised instance
    pub fn initial_registers(&self) -> Registers {
        let h = &self.header;
        let hlw = h.hea - h.dat;
        // The top cell of the stack is reserved by the VM
        let stp = h.stp - h.dat - CELL_SIZE;
        Registers {
            frm: 0,
            cip: h.cip.max(0),
            stk: stp,
            stp,
            hea: hlw,
            hlw,
            pri: 0,
            alt: 0,
        }
    }

    /// View of the module as a fresh instance
    pub fn amx_ref(&self, id: InstanceId) -> AmxRef<'_> {
        self.amx_ref_with(id, &self.data, self.initial_registers())
    }

    /// View of the module with captured memory and registers
    pub fn amx_ref_with<'a>(&'a self, id: InstanceId, data: &'a [u8], regs: Registers) -> AmxRef<'a> {
        AmxRef::new(id, &self.code, data, regs)
            .with_publics(&self.publics)
            .with_natives(&self.natives)
            .with_entry_point(self.header.cip)
    }
}

/// Read `count` function stubs starting at `offset`
fn read_stubs(bytes: &[u8], offset: i32, count: usize) -> ImageResult<Vec<(u32, String)>> {
    let mut i = offset as usize;
    let mut stubs = Vec::with_capacity(count);
    for _ in 0..count {
        let address = bytes.read32_with(&mut i)?;
        let name_offset = bytes.read32_with(&mut i)? as usize;
        let name = bytes.cstr(name_offset)?;
        stubs.push((address, String::from_utf8_lossy(name).into_owned()));
    }
    Ok(stubs)
}

/// Expand compact-encoded cells into `expanded_size` bytes
///
/// Each cell is a run of 7-bit groups, most significant first. Every byte but
/// the last has bit 0x80 set; bit 0x40 of the first byte is the sign.
pub fn expand_compact(src: &[u8], expanded_size: usize) -> ImageResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expanded_size);
    let mut value: u32 = 0;
    let mut first = true;

    for &byte in src {
        if first {
            value = if byte & 0x40 != 0 { u32::MAX } else { 0 };
            first = false;
        }
        value = (value << 7) | u32::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            if out.len() + CELL_SIZE as usize > expanded_size {
                return Err(ImageError::BadCompactEncoding);
            }
            out.extend_from_slice(&value.to_le_bytes());
            first = true;
        }
    }

    if !first {
        return Err(ImageError::BadCompactEncoding);
    }
    out.resize(expanded_size, 0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_compact_values() {
        // 5 -> 0x05; -1 -> 0x7f; 200 -> 0x81 0x48; -200 -> 0xfe 0x38
        let src = [0x05, 0x7f, 0x81, 0x48, 0xfe, 0x38];
        let out = expand_compact(&src, 16).unwrap();
        let cells: Vec<i32> = out
            .chunks(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(cells, vec![5, -1, 200, -200]);
    }

    #[test]
    fn test_expand_compact_pads() {
        let out = expand_compact(&[0x01], 8).unwrap();
        assert_eq!(out, vec![1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_expand_compact_overflow() {
        assert!(matches!(
            expand_compact(&[0x01, 0x02], 4),
            Err(ImageError::BadCompactEncoding)
        ));
    }

    #[test]
    fn test_expand_compact_unterminated() {
        assert!(matches!(
            expand_compact(&[0x81], 4),
            Err(ImageError::BadCompactEncoding)
        ));
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[4] = 0xE1;
        bytes[5] = 0xF1;
        assert!(matches!(
            AmxHeader::parse(&bytes),
            Err(ImageError::BadMagic(0xF1E1))
        ));
    }

    #[test]
    fn test_header_truncated() {
        assert!(matches!(
            AmxHeader::parse(&[0u8; 3]),
            Err(ImageError::Truncated(_))
        ));
    }
}
