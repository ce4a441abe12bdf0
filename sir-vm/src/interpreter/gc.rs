//! Collection driving: root enumeration and the between-instruction
//! trigger.
//!
//! Roots are the entire operand stack, the locals arena, the globals, the
//! interned constant strings and every frame's bound closure. Slots are
//! untagged, so marking is conservative: any slot that fits a 32-bit handle
//! is offered to the heap, whose soft-failure `get` ignores non-handles.

use crate::consts::GC_ALLOC_INTERVAL;
use crate::host::Host;

use super::Interpreter;

impl<H: Host> Interpreter<H> {
    /// Run a collection if enough allocations have accumulated. Called
    /// between instructions only; never mid-instruction.
    pub(super) fn maybe_collect(&mut self) {
        self.allocation_debt += self.heap.take_allocation_count();
        if self.allocation_debt >= GC_ALLOC_INTERVAL {
            self.collect();
        }
    }

    /// Mark from all roots, then sweep.
    pub fn collect(&mut self) {
        let before = self.heap.live_count();
        self.heap.reset_marks();

        for i in 0..self.stack.len() {
            let slot = self.stack[i];
            if slot <= u64::from(u32::MAX) {
                self.heap.mark(slot as u32);
            }
        }
        for i in 0..self.locals.len() {
            let slot = self.locals[i];
            if slot <= u64::from(u32::MAX) {
                self.heap.mark(slot as u32);
            }
        }
        for i in 0..self.globals.len() {
            let slot = self.globals[i];
            if slot <= u64::from(u32::MAX) {
                self.heap.mark(slot as u32);
            }
        }
        for i in 0..self.const_handles.len() {
            let handle = self.const_handles[i];
            self.heap.mark(handle);
        }
        for i in 0..self.frames.len() {
            let closure = self.frames[i].closure;
            self.heap.mark(closure);
        }

        self.heap.sweep();
        self.allocation_debt = 0;
        tracing::debug!(
            target: "sir::gc",
            live_before = before,
            live_after = self.heap.live_count(),
            "collection"
        );
    }
}
