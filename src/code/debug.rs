use crate::jvm::{LineNumberEntry, LocalVariableEntry, Utf8Index};
use crate::util::Offset;
use std::collections::HashMap;

/// Accumulates `LineNumberTable` rows as statements are lowered
///
/// Rows come in at non-decreasing offsets (they follow emission order). Consecutive rows for
/// the same source line coalesce into one, and a second row at the same offset replaces the
/// first (the earlier statement emitted no code).
#[derive(Default)]
pub struct LineNumberTableBuilder {
    entries: Vec<LineNumberEntry>,
}

impl LineNumberTableBuilder {
    pub fn new() -> LineNumberTableBuilder {
        LineNumberTableBuilder::default()
    }

    pub fn record(&mut self, offset: Offset, line_number: u16) {
        let start_pc = offset.0 as u16;
        if let Some(last) = self.entries.last_mut() {
            if last.line_number == line_number {
                return;
            }
            if last.start_pc == start_pc {
                last.line_number = line_number;
                return;
            }
        }
        self.entries.push(LineNumberEntry {
            start_pc,
            line_number,
        });
    }

    pub fn into_entries(self) -> Vec<LineNumberEntry> {
        self.entries
    }
}

/// Accumulates `LocalVariableTable` rows as scopes open and close
///
/// A slot may be reused by later declarations; every declaration gets its own row covering the
/// range where the variable is in scope. Ranges for the same slot never overlap.
#[derive(Default)]
pub struct LocalVariableTableBuilder {
    entries: Vec<LocalVariableEntry>,
    open: HashMap<u16, OpenLocal>,
}

struct OpenLocal {
    start_pc: u16,
    name: Utf8Index,
    descriptor: Utf8Index,
}

impl LocalVariableTableBuilder {
    pub fn new() -> LocalVariableTableBuilder {
        LocalVariableTableBuilder::default()
    }

    /// A named variable comes into scope at this offset
    pub fn open(&mut self, slot: u16, offset: Offset, name: Utf8Index, descriptor: Utf8Index) {
        let replaced = self.open.insert(
            slot,
            OpenLocal {
                start_pc: offset.0 as u16,
                name,
                descriptor,
            },
        );
        debug_assert!(replaced.is_none(), "slot {} redeclared while in scope", slot);
    }

    /// The variable occupying this slot goes out of scope at this offset
    pub fn close(&mut self, slot: u16, offset: Offset) {
        if let Some(local) = self.open.remove(&slot) {
            self.push_row(slot, local, offset);
        }
    }

    /// Close every open range (method end) and produce the final rows
    pub fn into_entries(mut self, end: Offset) -> Vec<LocalVariableEntry> {
        let mut still_open: Vec<(u16, OpenLocal)> = self.open.drain().collect();
        still_open.sort_by_key(|(slot, _)| *slot);
        for (slot, local) in still_open {
            self.push_row(slot, local, end);
        }
        self.entries
    }

    fn push_row(&mut self, slot: u16, local: OpenLocal, end: Offset) {
        let length = end.0 as u16 - local.start_pc;
        if length == 0 {
            return;
        }
        self.entries.push(LocalVariableEntry {
            start_pc: local.start_pc,
            length,
            name: local.name,
            descriptor: local.descriptor,
            index: slot,
        });
    }
}
