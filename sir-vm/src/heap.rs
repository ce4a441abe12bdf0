//! Handle-indexed object arena with mark-sweep collection.
//!
//! Handles are stable across collections; the collector never moves
//! objects. Freed slots are recycled through a free list, so a handle value
//! may be reused after its object dies, but never refers to two live
//! objects at once.

use sir_asm::NULL_HANDLE;

/// Discriminates the payload interpretation of a heap object.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ObjectKind {
    /// UTF-8 bytes.
    String,
    /// Fixed-length, element-stride-determined raw payload.
    Array,
    /// `u32 len, u32 cap`, then stride-sized elements; growth amortized.
    List,
    /// Field payload at layout-computed offsets.
    Artifact,
    /// `u32 method_id, u32 upvalue_count, u32 upvalue[count]`.
    Closure,
}

/// Object header: kind, type id, byte size and the collector's bits.
#[derive(Clone, Copy, Debug)]
pub struct ObjHeader {
    /// Payload interpretation.
    pub kind: ObjectKind,
    /// Byte size of the payload.
    pub size: u32,
    /// Runtime type id of the object (element type for arrays and lists).
    pub type_id: u32,
    /// Mark bit; meaningful only between `reset_marks` and `sweep`.
    pub marked: bool,
    /// Live bit; a cleared bit means the slot is on the free list.
    pub alive: bool,
}

/// A heap slot: header plus opaque payload bytes.
#[derive(Clone, Debug)]
pub struct HeapObject {
    /// The object header.
    pub header: ObjHeader,
    /// Kind-specific payload bytes.
    pub payload: Vec<u8>,
}

impl HeapObject {
    /// Little-endian u32 at `offset`, or `None` past the payload end.
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.payload.get(offset..offset + 4)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Little-endian u64 at `offset`, or `None` past the payload end.
    pub fn read_u64(&self, offset: usize) -> Option<u64> {
        let bytes = self.payload.get(offset..offset + 8)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Store a little-endian u32 at `offset`; `false` past the payload end.
    pub fn write_u32(&mut self, offset: usize, value: u32) -> bool {
        match self.payload.get_mut(offset..offset + 4) {
            Some(bytes) => {
                bytes.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Store a little-endian u64 at `offset`; `false` past the payload end.
    pub fn write_u64(&mut self, offset: usize, value: u64) -> bool {
        match self.payload.get_mut(offset..offset + 8) {
            Some(bytes) => {
                bytes.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }
}

/// The managed heap.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
    free_list: Vec<u32>,
    allocation_count: usize,
}

impl Heap {
    /// Fresh, empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed object, preferring a recycled slot.
    pub fn allocate(&mut self, kind: ObjectKind, type_id: u32, size: u32) -> u32 {
        self.allocation_count += 1;
        let header = ObjHeader { kind, size, type_id, marked: false, alive: true };
        if let Some(handle) = self.free_list.pop() {
            let obj = &mut self.objects[handle as usize];
            obj.header = header;
            obj.payload.clear();
            obj.payload.resize(size as usize, 0);
            return handle;
        }
        self.objects.push(HeapObject { header, payload: vec![0; size as usize] });
        (self.objects.len() - 1) as u32
    }

    /// The live object behind `handle`, or `None` for out-of-range or dead
    /// handles. Bad handles are a soft failure here; the interpreter turns
    /// `None` into a trap.
    pub fn get(&self, handle: u32) -> Option<&HeapObject> {
        let obj = self.objects.get(handle as usize)?;
        obj.header.alive.then_some(obj)
    }

    /// Mutable access with the same soft-failure contract as [`Heap::get`].
    pub fn get_mut(&mut self, handle: u32) -> Option<&mut HeapObject> {
        let obj = self.objects.get_mut(handle as usize)?;
        obj.header.alive.then_some(obj)
    }

    /// Mark `handle` and, for closures, everything reachable through its
    /// upvalue handles. Idempotent; the already-marked check terminates
    /// cycles through closure graphs.
    pub fn mark(&mut self, handle: u32) {
        let mut pending = vec![handle];
        while let Some(handle) = pending.pop() {
            let Some(obj) = self.objects.get_mut(handle as usize) else {
                continue;
            };
            if !obj.header.alive || obj.header.marked {
                continue;
            }
            obj.header.marked = true;
            if obj.header.kind == ObjectKind::Closure {
                let Some(count) = obj.read_u32(4) else { continue };
                for i in 0..count as usize {
                    match obj.read_u32(8 + i * 4) {
                        Some(upvalue) if upvalue != NULL_HANDLE => pending.push(upvalue),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Clear the mark bit on every live object.
    pub fn reset_marks(&mut self) {
        for obj in &mut self.objects {
            if obj.header.alive {
                obj.header.marked = false;
            }
        }
    }

    /// Free every live, unmarked object and recycle its slot.
    pub fn sweep(&mut self) {
        for (i, obj) in self.objects.iter_mut().enumerate() {
            if !obj.header.alive {
                continue;
            }
            if obj.header.marked {
                obj.header.marked = false;
                continue;
            }
            obj.header.alive = false;
            obj.header.marked = false;
            obj.header.size = 0;
            obj.header.type_id = 0;
            obj.payload = Vec::new();
            self.free_list.push(i as u32);
        }
    }

    /// Number of currently live objects.
    pub fn live_count(&self) -> usize {
        self.objects.iter().filter(|obj| obj.header.alive).count()
    }

    /// Allocations performed since the last [`Heap::take_allocation_count`].
    pub fn take_allocation_count(&mut self) -> usize {
        std::mem::take(&mut self.allocation_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closure_with_upvalues(heap: &mut Heap, upvalues: &[u32]) -> u32 {
        let size = 8 + 4 * upvalues.len() as u32;
        let handle = heap.allocate(ObjectKind::Closure, 0, size);
        let obj = heap.get_mut(handle).unwrap();
        obj.write_u32(0, 77);
        obj.write_u32(4, upvalues.len() as u32);
        for (i, upvalue) in upvalues.iter().enumerate() {
            obj.write_u32(8 + i * 4, *upvalue);
        }
        handle
    }

    #[test]
    fn allocate_reuses_freed_slots() {
        let mut heap = Heap::new();
        let a = heap.allocate(ObjectKind::String, 13, 4);
        let b = heap.allocate(ObjectKind::String, 13, 4);
        heap.reset_marks();
        heap.mark(b);
        heap.sweep();
        assert!(heap.get(a).is_none());
        let c = heap.allocate(ObjectKind::Array, 5, 16);
        assert_eq!(c, a, "freed slot should be recycled first");
        assert_eq!(heap.get(c).unwrap().payload, vec![0u8; 16]);
    }

    #[test]
    fn get_is_a_soft_failure() {
        let mut heap = Heap::new();
        assert!(heap.get(0).is_none());
        assert!(heap.get(u32::MAX).is_none());
        let h = heap.allocate(ObjectKind::String, 13, 0);
        heap.reset_marks();
        heap.sweep();
        assert!(heap.get(h).is_none());
    }

    #[test]
    fn mark_is_idempotent() {
        let mut heap = Heap::new();
        let inner = heap.allocate(ObjectKind::String, 13, 2);
        let closure = closure_with_upvalues(&mut heap, &[inner]);
        heap.reset_marks();
        heap.mark(closure);
        heap.mark(closure);
        heap.sweep();
        assert!(heap.get(closure).is_some());
        assert!(heap.get(inner).is_some());
    }

    #[test]
    fn mark_survives_closure_cycles() {
        let mut heap = Heap::new();
        let a = closure_with_upvalues(&mut heap, &[NULL_HANDLE]);
        let b = closure_with_upvalues(&mut heap, &[a]);
        // Close the cycle: a's upvalue points back at b.
        heap.get_mut(a).unwrap().write_u32(8, b);
        heap.reset_marks();
        heap.mark(a);
        heap.sweep();
        assert_eq!(heap.live_count(), 2);
    }

    #[test]
    fn sweep_reclaims_exactly_the_unreachable() {
        let mut heap = Heap::new();
        let kept = heap.allocate(ObjectKind::List, 5, 8);
        let dropped = heap.allocate(ObjectKind::List, 5, 8);
        let chained = heap.allocate(ObjectKind::String, 13, 1);
        let closure = closure_with_upvalues(&mut heap, &[chained]);
        heap.reset_marks();
        heap.mark(kept);
        heap.mark(closure);
        heap.sweep();
        assert!(heap.get(kept).is_some());
        assert!(heap.get(chained).is_some());
        assert!(heap.get(closure).is_some());
        assert!(heap.get(dropped).is_none());
        assert_eq!(heap.live_count(), 3);
    }

    #[test]
    fn null_upvalues_are_skipped() {
        let mut heap = Heap::new();
        let closure = closure_with_upvalues(&mut heap, &[NULL_HANDLE, NULL_HANDLE]);
        heap.reset_marks();
        heap.mark(closure);
        heap.sweep();
        assert_eq!(heap.live_count(), 1);
    }
}
