//! Call stack log
//!
//! Records every native and public call in flight, innermost last. The VM's
//! own frame chain breaks at each native/script boundary; the registers
//! captured here let the backtrace resume walking on the far side.

use crate::addr::Cell;
use crate::amx::{AmxRef, InstanceId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Native,
    Public,
}

/// One call in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    #[serde(default)]
    pub instance: InstanceId,
    pub kind: CallKind,
    /// Index into the native or public table
    pub index: Cell,
    /// Frame pointer when the call was made
    pub frm: Cell,
    /// Instruction pointer when the call was made
    pub cip: Cell,
}

impl CallRecord {
    pub fn native(amx: &AmxRef<'_>, index: Cell) -> Self {
        Self::capture(amx, CallKind::Native, index)
    }

    pub fn public(amx: &AmxRef<'_>, index: Cell) -> Self {
        Self::capture(amx, CallKind::Public, index)
    }

    fn capture(amx: &AmxRef<'_>, kind: CallKind, index: Cell) -> Self {
        let regs = amx.registers();
        Self {
            instance: amx.id(),
            kind,
            index,
            frm: regs.frm,
            cip: regs.cip,
        }
    }

    pub fn is_native(&self) -> bool {
        self.kind == CallKind::Native
    }

    pub fn is_public(&self) -> bool {
        self.kind == CallKind::Public
    }
}

/// Strict LIFO of call records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallStack {
    calls: Vec<CallRecord>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: CallRecord) {
        self.calls.push(record);
    }

    /// Remove the most recent call
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty. Pushes and pops come in pairs from the
    /// host's call hooks, so an empty pop is an integration bug.
    pub fn pop(&mut self) -> CallRecord {
        match self.calls.pop() {
            Some(record) => record,
            None => panic!("call stack underflow: pop without a matching push"),
        }
    }

    pub fn top(&self) -> Option<&CallRecord> {
        self.calls.last()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Records from the most recent to the oldest
    pub fn iter(&self) -> impl Iterator<Item = &CallRecord> {
        self.calls.iter().rev()
    }
}

impl FromIterator<CallRecord> for CallStack {
    /// Records are pushed in iteration order, oldest first
    fn from_iter<T: IntoIterator<Item = CallRecord>>(iter: T) -> Self {
        Self {
            calls: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: CallKind, index: Cell) -> CallRecord {
        CallRecord {
            instance: InstanceId(1),
            kind,
            index,
            frm: 0,
            cip: 0,
        }
    }

    #[test]
    fn test_lifo() {
        let a = record(CallKind::Public, 0);
        let b = record(CallKind::Native, 3);

        let mut stack = CallStack::new();
        stack.push(a);
        stack.push(b);
        assert_eq!(stack.top(), Some(&b));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), b);
        assert_eq!(stack.pop(), a);
        assert!(stack.is_empty());
    }

    #[test]
    #[should_panic(expected = "call stack underflow")]
    fn test_pop_empty_panics() {
        CallStack::new().pop();
    }

    #[test]
    fn test_iter_newest_first() {
        let stack: CallStack = [record(CallKind::Public, 0), record(CallKind::Native, 1)]
            .into_iter()
            .collect();
        let kinds: Vec<_> = stack.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![CallKind::Native, CallKind::Public]);
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&record(CallKind::Native, 2)).unwrap();
        assert_eq!(
            json,
            r#"{"instance":1,"kind":"native","index":2,"frm":0,"cip":0}"#
        );
    }
}
