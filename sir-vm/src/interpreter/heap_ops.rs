//! Heap opcodes: artifacts, closures, arrays, lists and strings.
//!
//! Operand orders follow the emitter's conventions: `x.set` pops value,
//! then index, then the container; `x.get` pops index, then the container.
//! A null container reference traps; a live handle of the wrong kind is an
//! invalid-handle trap.

use sir_asm::{ElemKind, SirType, TrapReason, NULL_HANDLE};

use super::Interpreter;
use crate::consts::LIST_MIN_CAPACITY;
use crate::heap::ObjectKind;
use crate::host::Host;
use crate::module::TypeKind;

/// Element class of a `newarray`/`newlist` type id.
fn elem_kind_of_type_id(type_id: u32) -> ElemKind {
    use sir_asm::type_id::*;
    match type_id {
        I64 | U64 => ElemKind::I64,
        F32 => ElemKind::F32,
        F64 => ElemKind::F64,
        BOOL | CHAR | I8 | I16 | I32 | U8 | U16 | U32 => ElemKind::I32,
        _ => ElemKind::Ref,
    }
}

impl<H: Host> Interpreter<H> {
    pub(super) fn exec_newobj(&mut self, type_id: u32) -> Result<(), TrapReason> {
        let ty = self
            .module
            .type_by_id(type_id)
            .ok_or(TrapReason::InvalidTarget)?;
        if ty.kind != TypeKind::Artifact {
            return Err(TrapReason::InvalidTarget);
        }
        let size = ty.size;
        let handle = self.heap.allocate(ObjectKind::Artifact, type_id, size);
        self.push_handle(handle);
        Ok(())
    }

    pub(super) fn exec_ldfld(&mut self, fid: u32) -> Result<(), TrapReason> {
        let field = self
            .module
            .fields
            .get(fid as usize)
            .ok_or(TrapReason::InvalidTarget)?;
        let (offset, ty) = (field.offset as usize, field.ty.clone());
        let handle = self.pop_handle()?;
        if handle == NULL_HANDLE {
            return Err(TrapReason::NullReference);
        }
        let obj = self.heap.get(handle).ok_or(TrapReason::InvalidHandle)?;
        let value = match ty.field_size() {
            1 => {
                let byte = *obj.payload.get(offset).ok_or(TrapReason::InvalidHandle)?;
                if ty == SirType::I8 {
                    byte as i8 as i32 as u32 as u64
                } else {
                    byte.into()
                }
            }
            2 => {
                let bytes = obj
                    .payload
                    .get(offset..offset + 2)
                    .ok_or(TrapReason::InvalidHandle)?;
                let half = u16::from_le_bytes([bytes[0], bytes[1]]);
                if ty == SirType::I16 {
                    half as i16 as i32 as u32 as u64
                } else {
                    half.into()
                }
            }
            4 => obj.read_u32(offset).ok_or(TrapReason::InvalidHandle)?.into(),
            8 => obj.read_u64(offset).ok_or(TrapReason::InvalidHandle)?,
            _ => return Err(TrapReason::InvalidHandle),
        };
        self.push(value);
        Ok(())
    }

    pub(super) fn exec_stfld(&mut self, fid: u32) -> Result<(), TrapReason> {
        let field = self
            .module
            .fields
            .get(fid as usize)
            .ok_or(TrapReason::InvalidTarget)?;
        let (offset, width) = (field.offset as usize, field.ty.field_size());
        let value = self.pop()?;
        let handle = self.pop_handle()?;
        if handle == NULL_HANDLE {
            return Err(TrapReason::NullReference);
        }
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        let written = match width {
            1 => match obj.payload.get_mut(offset) {
                Some(slot) => {
                    *slot = value as u8;
                    true
                }
                None => false,
            },
            2 => match obj.payload.get_mut(offset..offset + 2) {
                Some(slot) => {
                    slot.copy_from_slice(&(value as u16).to_le_bytes());
                    true
                }
                None => false,
            },
            4 => obj.write_u32(offset, value as u32),
            8 => obj.write_u64(offset, value),
            _ => false,
        };
        if !written {
            return Err(TrapReason::InvalidHandle);
        }
        Ok(())
    }

    pub(super) fn exec_typeof(&mut self) -> Result<(), TrapReason> {
        let handle = self.pop_handle()?;
        if handle == NULL_HANDLE {
            return Err(TrapReason::NullReference);
        }
        let obj = self.heap.get(handle).ok_or(TrapReason::InvalidHandle)?;
        let type_id = obj.header.type_id;
        self.push_u32(type_id);
        Ok(())
    }

    pub(super) fn exec_newclosure(
        &mut self,
        method: u32,
        upvalue_count: u8,
    ) -> Result<(), TrapReason> {
        if self.module.functions.get(method as usize).is_none() {
            return Err(TrapReason::InvalidTarget);
        }
        let count = usize::from(upvalue_count);
        let mut upvalues = Vec::with_capacity(count);
        for _ in 0..count {
            upvalues.push(self.pop_handle()?);
        }
        upvalues.reverse();

        let size = 8 + 4 * count as u32;
        let handle = self.heap.allocate(ObjectKind::Closure, 0, size);
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        obj.write_u32(0, method);
        obj.write_u32(4, upvalue_count.into());
        for (i, upvalue) in upvalues.iter().enumerate() {
            obj.write_u32(8 + i * 4, *upvalue);
        }
        self.push_handle(handle);
        Ok(())
    }

    // ---- arrays ------------------------------------------------------------

    pub(super) fn exec_newarray(
        &mut self,
        type_id: u32,
        length: u32,
    ) -> Result<(), TrapReason> {
        let stride = elem_kind_of_type_id(type_id).stride();
        let size = length
            .checked_mul(stride)
            .ok_or(TrapReason::IndexOutOfBounds)?;
        let handle = self.heap.allocate(ObjectKind::Array, type_id, size);
        self.push_handle(handle);
        Ok(())
    }

    pub(super) fn exec_array_len(&mut self) -> Result<(), TrapReason> {
        let handle = self.pop_handle()?;
        if handle == NULL_HANDLE {
            return Err(TrapReason::NullReference);
        }
        let obj = self.heap.get(handle).ok_or(TrapReason::InvalidHandle)?;
        if obj.header.kind != ObjectKind::Array {
            return Err(TrapReason::InvalidHandle);
        }
        let stride = elem_kind_of_type_id(obj.header.type_id).stride();
        let len = obj.header.size / stride.max(1);
        self.push_i32(len as i32);
        Ok(())
    }

    pub(super) fn exec_array_get(&mut self, stride: u32) -> Result<(), TrapReason> {
        let index = self.pop_i32()?;
        let handle = self.pop_handle()?;
        if handle == NULL_HANDLE {
            return Err(TrapReason::NullReference);
        }
        let obj = self.heap.get(handle).ok_or(TrapReason::InvalidHandle)?;
        if obj.header.kind != ObjectKind::Array {
            return Err(TrapReason::InvalidHandle);
        }
        let len = obj.header.size / stride;
        if index < 0 || index as u32 >= len {
            return Err(TrapReason::IndexOutOfBounds);
        }
        let offset = index as usize * stride as usize;
        let value = if stride == 8 {
            obj.read_u64(offset).ok_or(TrapReason::IndexOutOfBounds)?
        } else {
            obj.read_u32(offset).ok_or(TrapReason::IndexOutOfBounds)?.into()
        };
        self.push(value);
        Ok(())
    }

    pub(super) fn exec_array_set(&mut self, stride: u32) -> Result<(), TrapReason> {
        let value = self.pop()?;
        let index = self.pop_i32()?;
        let handle = self.pop_handle()?;
        if handle == NULL_HANDLE {
            return Err(TrapReason::NullReference);
        }
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        if obj.header.kind != ObjectKind::Array {
            return Err(TrapReason::InvalidHandle);
        }
        let len = obj.header.size / stride;
        if index < 0 || index as u32 >= len {
            return Err(TrapReason::IndexOutOfBounds);
        }
        let offset = index as usize * stride as usize;
        let written = if stride == 8 {
            obj.write_u64(offset, value)
        } else {
            obj.write_u32(offset, value as u32)
        };
        if !written {
            return Err(TrapReason::IndexOutOfBounds);
        }
        Ok(())
    }

    // ---- lists -------------------------------------------------------------

    pub(super) fn exec_newlist(
        &mut self,
        type_id: u32,
        capacity: u32,
    ) -> Result<(), TrapReason> {
        let stride = elem_kind_of_type_id(type_id).stride();
        let size = capacity
            .checked_mul(stride)
            .and_then(|bytes| bytes.checked_add(8))
            .ok_or(TrapReason::IndexOutOfBounds)?;
        let handle = self.heap.allocate(ObjectKind::List, type_id, size);
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        obj.write_u32(0, 0);
        obj.write_u32(4, capacity);
        self.push_handle(handle);
        Ok(())
    }

    fn pop_list_handle(&mut self) -> Result<u32, TrapReason> {
        let handle = self.pop_handle()?;
        if handle == NULL_HANDLE {
            return Err(TrapReason::NullReference);
        }
        match self.heap.get(handle) {
            Some(obj) if obj.header.kind == ObjectKind::List => Ok(handle),
            Some(_) => Err(TrapReason::InvalidHandle),
            None => Err(TrapReason::InvalidHandle),
        }
    }

    fn list_len(&self, handle: u32) -> Result<u32, TrapReason> {
        let obj = self.heap.get(handle).ok_or(TrapReason::InvalidHandle)?;
        obj.read_u32(0).ok_or(TrapReason::InvalidHandle)
    }

    pub(super) fn exec_list_len(&mut self) -> Result<(), TrapReason> {
        let handle = self.pop_list_handle()?;
        let len = self.list_len(handle)?;
        self.push_i32(len as i32);
        Ok(())
    }

    pub(super) fn exec_list_get(&mut self, stride: u32) -> Result<(), TrapReason> {
        let index = self.pop_i32()?;
        let handle = self.pop_list_handle()?;
        let len = self.list_len(handle)?;
        if index < 0 || index as u32 >= len {
            return Err(TrapReason::IndexOutOfBounds);
        }
        let obj = self.heap.get(handle).ok_or(TrapReason::InvalidHandle)?;
        let offset = 8 + index as usize * stride as usize;
        let value = if stride == 8 {
            obj.read_u64(offset).ok_or(TrapReason::IndexOutOfBounds)?
        } else {
            obj.read_u32(offset).ok_or(TrapReason::IndexOutOfBounds)?.into()
        };
        self.push(value);
        Ok(())
    }

    pub(super) fn exec_list_set(&mut self, stride: u32) -> Result<(), TrapReason> {
        let value = self.pop()?;
        let index = self.pop_i32()?;
        let handle = self.pop_list_handle()?;
        let len = self.list_len(handle)?;
        if index < 0 || index as u32 >= len {
            return Err(TrapReason::IndexOutOfBounds);
        }
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        let offset = 8 + index as usize * stride as usize;
        let written = if stride == 8 {
            obj.write_u64(offset, value)
        } else {
            obj.write_u32(offset, value as u32)
        };
        if !written {
            return Err(TrapReason::IndexOutOfBounds);
        }
        Ok(())
    }

    /// Grow `handle` so at least one more element fits. Capacity doubles,
    /// which keeps pushes amortized constant.
    fn list_reserve_one(&mut self, handle: u32, stride: u32) -> Result<(), TrapReason> {
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        let len = obj.read_u32(0).ok_or(TrapReason::InvalidHandle)?;
        let cap = obj.read_u32(4).ok_or(TrapReason::InvalidHandle)?;
        if len < cap {
            return Ok(());
        }
        let new_cap = cap
            .checked_mul(2)
            .ok_or(TrapReason::IndexOutOfBounds)?
            .max(LIST_MIN_CAPACITY);
        let new_size = 8 + new_cap as usize * stride as usize;
        obj.payload.resize(new_size, 0);
        obj.header.size = new_size as u32;
        obj.write_u32(4, new_cap);
        Ok(())
    }

    pub(super) fn exec_list_push(&mut self, stride: u32) -> Result<(), TrapReason> {
        let value = self.pop()?;
        let handle = self.pop_list_handle()?;
        self.list_reserve_one(handle, stride)?;
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        let len = obj.read_u32(0).ok_or(TrapReason::InvalidHandle)?;
        let offset = 8 + len as usize * stride as usize;
        let written = if stride == 8 {
            obj.write_u64(offset, value)
        } else {
            obj.write_u32(offset, value as u32)
        };
        if !written {
            return Err(TrapReason::IndexOutOfBounds);
        }
        obj.write_u32(0, len + 1);
        Ok(())
    }

    pub(super) fn exec_list_pop(&mut self, stride: u32) -> Result<(), TrapReason> {
        let handle = self.pop_list_handle()?;
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        let len = obj.read_u32(0).ok_or(TrapReason::InvalidHandle)?;
        if len == 0 {
            return Err(TrapReason::IndexOutOfBounds);
        }
        let offset = 8 + (len - 1) as usize * stride as usize;
        let value = if stride == 8 {
            obj.read_u64(offset).ok_or(TrapReason::IndexOutOfBounds)?
        } else {
            obj.read_u32(offset).ok_or(TrapReason::IndexOutOfBounds)?.into()
        };
        obj.write_u32(0, len - 1);
        self.push(value);
        Ok(())
    }

    pub(super) fn exec_list_insert(&mut self, stride: u32) -> Result<(), TrapReason> {
        let value = self.pop()?;
        let index = self.pop_i32()?;
        let handle = self.pop_list_handle()?;
        let len = self.list_len(handle)?;
        if index < 0 || index as u32 > len {
            return Err(TrapReason::IndexOutOfBounds);
        }
        self.list_reserve_one(handle, stride)?;
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        let stride = stride as usize;
        let at = 8 + index as usize * stride;
        let end = 8 + len as usize * stride;
        obj.payload.copy_within(at..end, at + stride);
        obj.write_u32(at, value as u32);
        obj.write_u32(0, len + 1);
        Ok(())
    }

    pub(super) fn exec_list_remove(&mut self, stride: u32) -> Result<(), TrapReason> {
        let index = self.pop_i32()?;
        let handle = self.pop_list_handle()?;
        let len = self.list_len(handle)?;
        if index < 0 || index as u32 >= len {
            return Err(TrapReason::IndexOutOfBounds);
        }
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        let stride = stride as usize;
        let at = 8 + index as usize * stride;
        let end = 8 + len as usize * stride;
        let value = obj.read_u32(at).ok_or(TrapReason::IndexOutOfBounds)?;
        obj.payload.copy_within(at + stride..end, at);
        obj.write_u32(0, len - 1);
        self.push_u32(value);
        Ok(())
    }

    pub(super) fn exec_list_clear(&mut self) -> Result<(), TrapReason> {
        let handle = self.pop_list_handle()?;
        let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
        obj.write_u32(0, 0);
        Ok(())
    }

    // ---- strings -----------------------------------------------------------

    pub(super) fn exec_string_len(&mut self) -> Result<(), TrapReason> {
        let handle = self.pop_handle()?;
        let len = self.string_at(handle)?.chars().count();
        self.push_i32(len as i32);
        Ok(())
    }

    pub(super) fn exec_string_concat(&mut self) -> Result<(), TrapReason> {
        let right = self.pop_handle()?;
        let left = self.pop_handle()?;
        let mut text = self.string_at(left)?.to_owned();
        text.push_str(self.string_at(right)?);
        let handle = self.alloc_string(&text);
        self.push_handle(handle);
        Ok(())
    }

    pub(super) fn exec_string_get_char(&mut self) -> Result<(), TrapReason> {
        let index = self.pop_i32()?;
        let handle = self.pop_handle()?;
        let text = self.string_at(handle)?;
        if index < 0 {
            return Err(TrapReason::InvalidStringIndex);
        }
        let c = text
            .chars()
            .nth(index as usize)
            .ok_or(TrapReason::InvalidStringIndex)?;
        self.push_u32(c as u32 & 0xFFFF);
        Ok(())
    }

    pub(super) fn exec_string_slice(&mut self) -> Result<(), TrapReason> {
        let len = self.pop_i32()?;
        let start = self.pop_i32()?;
        let handle = self.pop_handle()?;
        if start < 0 || len < 0 {
            return Err(TrapReason::InvalidStringIndex);
        }
        let text = self.string_at(handle)?;
        let total = text.chars().count();
        let (start, len) = (start as usize, len as usize);
        if start + len > total {
            return Err(TrapReason::InvalidStringIndex);
        }
        let slice: String = text.chars().skip(start).take(len).collect();
        let handle = self.alloc_string(&slice);
        self.push_handle(handle);
        Ok(())
    }
}
