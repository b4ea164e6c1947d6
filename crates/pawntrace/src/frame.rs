//! Bytecode frame walker
//!
//! AMX frames live in the data segment. For a frame at `frm`:
//!
//! ```text
//! frm + 0   caller's frm
//! frm + 4   return address (code offset)
//! frm + 8   size of the arguments in bytes
//! frm + 12  first argument
//! ```
//!
//! The walker decodes one such frame at a time and follows the saved frame
//! pointers outward. Every field is bounds checked before it is stored and
//! nothing is read through an absent field, so a corrupted chain ends the walk
//! instead of faulting.

use crate::addr::{Addr, Cell, CELL_SIZE};
use crate::amx::AmxRef;

/// One decoded call frame
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    amx: AmxRef<'a>,
    address: Addr,
    return_address: Addr,
    callee_address: Addr,
    caller_address: Addr,
    /// Frame this one chains to, not yet validated
    previous: Cell,
}

impl<'a> Frame<'a> {
    /// Decode the frame at data offset `address`
    ///
    /// Outside `[hlw, stp)` every field is absent, which ends a walk.
    pub fn new(amx: AmxRef<'a>, address: Cell) -> Self {
        let mut frame = Self::absent(amx);
        let address = Addr::checked(address, |a| amx.is_stack_addr(a));
        let Some(base) = address.get() else {
            return frame;
        };

        frame.address = address;
        frame.previous = amx.data_cell(base).unwrap_or(0);
        frame.return_address = read_code_addr(&amx, base.wrapping_add(CELL_SIZE));
        frame.callee_address = callee_of(&amx, frame.return_address);

        // The function running in this frame is the one the previous frame's
        // return site called.
        let previous_return = Addr::checked(frame.previous, |a| amx.is_stack_addr(a))
            .get()
            .map(|p| read_code_addr(&amx, p.wrapping_add(CELL_SIZE)))
            .unwrap_or_default();
        frame.caller_address = callee_of(&amx, previous_return);

        frame
    }

    /// Build a frame from known values, each checked on its own
    ///
    /// Used for the innermost frame of a walk (live `frm` and `cip`) and for
    /// public functions that have not pushed a frame yet. The result sits on
    /// top of the real frame at `address`: its previous frame is that one.
    pub fn from_parts(
        amx: AmxRef<'a>,
        address: Cell,
        return_address: Cell,
        callee_address: Cell,
        caller_address: Cell,
    ) -> Self {
        let address = Addr::checked(address, |a| amx.is_stack_addr(a));
        Self {
            amx,
            address,
            return_address: Addr::checked(return_address, |a| amx.is_code_addr(a)),
            callee_address: Addr::checked(callee_address, |a| amx.is_code_addr(a)),
            caller_address: Addr::checked(caller_address, |a| amx.is_code_addr(a)),
            previous: address.raw(),
        }
    }

    fn absent(amx: AmxRef<'a>) -> Self {
        Self {
            amx,
            address: Addr::Absent,
            return_address: Addr::Absent,
            callee_address: Addr::Absent,
            caller_address: Addr::Absent,
            previous: 0,
        }
    }

    pub fn amx(&self) -> &AmxRef<'a> {
        &self.amx
    }

    pub fn address(&self) -> Addr {
        self.address
    }

    pub fn return_address(&self) -> Addr {
        self.return_address
    }

    /// Function called from `return_address`
    pub fn callee_address(&self) -> Addr {
        self.callee_address
    }

    /// Function executing at `return_address`
    pub fn caller_address(&self) -> Addr {
        self.caller_address
    }

    pub fn set_caller_address(&mut self, address: Cell) {
        self.caller_address = Addr::checked(address, |a| self.amx.is_code_addr(a));
    }

    /// Next frame outward
    pub fn previous(&self) -> Frame<'a> {
        if self.address.is_absent() {
            return Self::absent(self.amx);
        }
        Frame::new(self.amx, self.previous)
    }

    /// Argument size stored in this frame, in cells; may be negative
    fn stored_argument_count(&self) -> Option<Cell> {
        let base = self.address.get()?;
        self.amx
            .data_cell(base.wrapping_add(2 * CELL_SIZE))
            .map(|bytes| bytes / CELL_SIZE)
    }

    /// Number of arguments passed to the caller function
    ///
    /// Arguments live in the previous frame. Some compiler output leaves a
    /// negative count there; the frame after it then holds the real one.
    pub fn argument_count(&self) -> usize {
        let previous = self.previous();
        let count = match previous.stored_argument_count() {
            Some(n) if n < 0 => previous.previous().stored_argument_count(),
            other => other,
        };
        count.filter(|&n| n > 0).map(|n| n as usize).unwrap_or(0)
    }

    /// Value of argument `index` of the caller function
    pub fn argument(&self, index: usize) -> Option<Cell> {
        let base = self.previous().address.get()?;
        let slot = Cell::try_from(index).ok()?.checked_add(3)?.checked_mul(CELL_SIZE)?;
        self.amx.data_cell(base.checked_add(slot)?)
    }
}

/// Read a cell from the data segment and accept it as a code address
fn read_code_addr(amx: &AmxRef<'_>, data_addr: Cell) -> Addr {
    amx.data_cell(data_addr)
        .map(|v| Addr::checked(v, |a| amx.is_code_addr(a)))
        .unwrap_or_default()
}

/// Target of the CALL instruction that returns to `return_address`
fn callee_of(amx: &AmxRef<'_>, return_address: Addr) -> Addr {
    return_address
        .get()
        .and_then(|ret| amx.code_cell(ret.wrapping_sub(CELL_SIZE)))
        .map(|operand| Addr::checked(operand.wrapping_sub(amx.code_base()), |a| amx.is_code_addr(a)))
        .unwrap_or_default()
}

/// Frames from the innermost outward, while each has a return address
#[derive(Debug, Clone)]
pub struct StackTrace<'a> {
    current: Option<Frame<'a>>,
    remaining: usize,
}

impl<'a> StackTrace<'a> {
    /// Walk from the live registers
    ///
    /// The first frame is synthesised from `frm` and `cip`: it names the
    /// function owning `frm` and points at `cip`.
    pub fn new(amx: AmxRef<'a>, frm: Cell, cip: Cell, max_depth: usize) -> Self {
        let running = Frame::new(amx, frm).callee_address();
        let head = Frame::from_parts(amx, frm, cip, 0, running.raw());
        Self::from_frame(head, max_depth)
    }

    pub fn from_frame(frame: Frame<'a>, max_depth: usize) -> Self {
        Self {
            current: Some(frame),
            remaining: max_depth,
        }
    }
}

impl<'a> Iterator for StackTrace<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.current.take()?;
        if frame.return_address().is_absent() || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.current = Some(frame.previous());
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amx::{InstanceId, Registers};

    fn bytes(cells: &[Cell]) -> Vec<u8> {
        cells.iter().flat_map(|c| c.to_le_bytes()).collect()
    }

    fn regs(stp: Cell) -> Registers {
        Registers {
            hlw: 16,
            hea: 16,
            stk: 16,
            stp,
            ..Default::default()
        }
    }

    #[test]
    fn test_out_of_range_is_absent() {
        let code = bytes(&[0; 8]);
        let data = bytes(&[0; 16]);
        let amx = AmxRef::new(InstanceId(0), &code, &data, regs(64));

        for address in [0, 8, 64, 1000, -4] {
            let frame = Frame::new(amx, address);
            assert!(frame.address().is_absent());
            assert!(frame.return_address().is_absent());
            assert!(frame.previous().address().is_absent());
        }
    }

    #[test]
    fn test_decodes_call_site() {
        // code: 0: nop, 4: call, 8: operand 0x14, 12: ret site, 16..: callee
        let code = bytes(&[0, 49, 0x14, 0, 0, 0, 0, 0]);
        // frame at 32: prev=0, ret=12, args=8 bytes, a0=7, a1=-3
        let mut data = vec![0; 8];
        data.extend([0, 12, 8, 7, -3, 0, 0, 0]);
        let data = bytes(&data);
        let amx = AmxRef::new(InstanceId(0), &code, &data, regs(64));

        let frame = Frame::new(amx, 32);
        assert_eq!(frame.address(), Addr::At(32));
        assert_eq!(frame.return_address(), Addr::At(12));
        assert_eq!(frame.callee_address(), Addr::At(0x14));
        assert!(frame.caller_address().is_absent());
    }

    #[test]
    fn test_from_parts_checks_each_field() {
        let code = bytes(&[0; 4]);
        let data = bytes(&[0; 16]);
        let amx = AmxRef::new(InstanceId(0), &code, &data, regs(64));

        let frame = Frame::from_parts(amx, 32, 8, 400, 4);
        assert_eq!(frame.address(), Addr::At(32));
        assert_eq!(frame.return_address(), Addr::At(8));
        assert!(frame.callee_address().is_absent());
        assert_eq!(frame.caller_address(), Addr::At(4));
    }

    #[test]
    fn test_trace_depth_cap() {
        // A frame that points at itself would loop forever without the cap
        let code = bytes(&[0, 49, 0, 0]);
        let mut data = vec![0; 4];
        data.extend([16, 12, 0, 0]);
        let data = bytes(&data);
        let amx = AmxRef::new(InstanceId(0), &code, &data, regs(32));

        let trace = StackTrace::from_frame(Frame::new(amx, 16), 5);
        assert_eq!(trace.count(), 5);
    }
}
