//! Pawn string decoding
//!
//! Strings live in the data segment either unpacked (one character per cell)
//! or packed (four characters per cell, first character in the high byte).
//! A first cell above [`UNPACKED_MAX`] marks a packed string.

use crate::addr::Cell;

/// Largest cell value an unpacked character can have
pub const UNPACKED_MAX: u32 = 0x00FF_FFFF;

pub fn is_printable(c: u32) -> bool {
    (32..=126).contains(&c)
}

/// Decode a packed string, stopping at the first non-printable byte
pub fn packed(cells: &[Cell], max_chars: usize) -> String {
    cells
        .iter()
        .flat_map(|cell| cell.to_be_bytes())
        .take(max_chars)
        .take_while(|&b| is_printable(u32::from(b)))
        .map(char::from)
        .collect()
}

/// Decode an unpacked string, stopping at the first non-printable cell
pub fn unpacked(cells: &[Cell], max_chars: usize) -> String {
    cells
        .iter()
        .take(max_chars)
        .take_while(|&&c| is_printable(c as u32))
        .map(|&c| char::from(c as u8))
        .collect()
}

/// A decoded string and whether it was packed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedString {
    pub text: String,
    pub packed: bool,
}

/// Decode `cells` as whichever string form the first cell indicates
pub fn decode(cells: &[Cell], max_chars: usize) -> DecodedString {
    let is_packed = cells.first().is_some_and(|&c| c as u32 > UNPACKED_MAX);
    let text = if is_packed {
        packed(cells, max_chars)
    } else {
        unpacked(cells, max_chars)
    };
    DecodedString {
        text,
        packed: is_packed,
    }
}

/// Cut `text` to `max` characters, marking the cut with "..."
pub fn clip(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let mut out: String = text.chars().take(max).collect();
        out.push_str("...");
        out
    } else {
        text.to_string()
    }
}
