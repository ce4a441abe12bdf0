//! Dispatch for `syscall <import_index>`.
//!
//! Reserved `core.*` modules route to the host implementation; the
//! synthesized `core.dl call$<N>` companions decode their scalar arguments
//! against the import signature and go through the dynamic-call family.
//! Any other module has no host implementation and traps.

use sir_asm::{SirType, TrapReason, NULL_HANDLE};

use super::Interpreter;
use crate::heap::ObjectKind;
use crate::host::{DlReturn, Host};
use crate::module::ImportDef;

fn dl_return_of(ty: &SirType) -> Option<DlReturn> {
    let ret = match ty {
        SirType::Void => DlReturn::Void,
        SirType::Bool => DlReturn::Bool,
        SirType::Char => DlReturn::Char,
        SirType::I8 => DlReturn::I8,
        SirType::I16 => DlReturn::I16,
        SirType::I32 => DlReturn::I32,
        SirType::I64 => DlReturn::I64,
        SirType::U8 => DlReturn::U8,
        SirType::U16 => DlReturn::U16,
        SirType::U32 => DlReturn::U32,
        SirType::U64 => DlReturn::U64,
        SirType::F32 => DlReturn::F32,
        SirType::F64 => DlReturn::F64,
        SirType::String => DlReturn::Str0,
        _ => return None,
    };
    Some(ret)
}

impl<H: Host> Interpreter<H> {
    pub(super) fn exec_syscall(&mut self, id: u32) -> Result<(), TrapReason> {
        let import = self
            .module
            .imports
            .get(id as usize)
            .ok_or(TrapReason::InvalidTarget)?
            .clone();
        tracing::trace!(target: "sir::dispatch", module = %import.module, symbol = %import.symbol);
        match import.module.as_str() {
            "core.os" => self.syscall_os(&import),
            "core.io" => self.syscall_io(&import),
            "core.fs" => self.syscall_fs(&import),
            "core.log" => self.syscall_log(&import),
            "core.dl" => self.syscall_dl(&import),
            _ => Err(TrapReason::UnresolvedImport),
        }
    }

    fn syscall_os(&mut self, import: &ImportDef) -> Result<(), TrapReason> {
        match import.symbol.as_str() {
            "args_count" => {
                let count = self.host.args().len() as i32;
                self.push_i32(count);
            }
            "args_get" => {
                let index = self.pop_i32()?;
                let arg = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.host.args().get(i).cloned())
                    .unwrap_or_default();
                let handle = self.alloc_string(&arg);
                self.push_handle(handle);
            }
            "env_get" => {
                let name_handle = self.pop_handle()?;
                let name = self.string_at(name_handle)?.to_owned();
                let value = self.host.env_var(&name).unwrap_or_default();
                let handle = self.alloc_string(&value);
                self.push_handle(handle);
            }
            "cwd_get" => {
                let cwd = self.host.cwd();
                let handle = self.alloc_string(&cwd);
                self.push_handle(handle);
            }
            "time_mono_ns" => {
                let ns = self.host.time_mono_ns();
                self.push_i64(ns);
            }
            "time_wall_ns" => {
                let ns = self.host.time_wall_ns();
                self.push_i64(ns);
            }
            "sleep_ms" => {
                let ms = self.pop_i32()?;
                self.host.sleep_ms(ms);
            }
            _ => return Err(TrapReason::UnresolvedImport),
        }
        Ok(())
    }

    fn syscall_io(&mut self, import: &ImportDef) -> Result<(), TrapReason> {
        match import.symbol.as_str() {
            "buffer_new" => {
                let len = self.pop_i32()?.max(0) as u32;
                let size = 8 + len * 4;
                let handle =
                    self.heap
                        .allocate(ObjectKind::List, sir_asm::type_id::I32, size);
                let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
                obj.write_u32(0, len);
                obj.write_u32(4, len);
                self.push_handle(handle);
            }
            "buffer_len" => {
                let handle = self.pop_buffer()?;
                let len = self.buffer_len(handle)?;
                self.push_i32(len as i32);
            }
            "buffer_fill" => {
                let count = self.pop_i32()?.max(0) as u32;
                let value = self.pop_i32()?;
                let handle = self.pop_buffer()?;
                let len = self.buffer_len(handle)?;
                let n = count.min(len);
                let obj = self.heap.get_mut(handle).ok_or(TrapReason::InvalidHandle)?;
                for i in 0..n {
                    obj.write_u32(8 + i as usize * 4, value as u32);
                }
                self.push_i32(n as i32);
            }
            "buffer_copy" => {
                let count = self.pop_i32()?.max(0) as u32;
                let src = self.pop_buffer()?;
                let dst = self.pop_buffer()?;
                let n = count
                    .min(self.buffer_len(src)?)
                    .min(self.buffer_len(dst)?);
                for i in 0..n as usize {
                    let word = self
                        .heap
                        .get(src)
                        .and_then(|obj| obj.read_u32(8 + i * 4))
                        .ok_or(TrapReason::InvalidHandle)?;
                    let obj =
                        self.heap.get_mut(dst).ok_or(TrapReason::InvalidHandle)?;
                    obj.write_u32(8 + i * 4, word);
                }
                self.push_i32(n as i32);
            }
            _ => return Err(TrapReason::UnresolvedImport),
        }
        Ok(())
    }

    fn syscall_fs(&mut self, import: &ImportDef) -> Result<(), TrapReason> {
        match import.symbol.as_str() {
            "open" => {
                let flags = self.pop_i32()?;
                let path_handle = self.pop_handle()?;
                let path = self.string_at(path_handle)?.to_owned();
                let fd = self.host.fs_open(&path, flags);
                self.push_i32(fd);
            }
            "close" => {
                let fd = self.pop_i32()?;
                self.host.fs_close(fd);
            }
            "read" => {
                let count = self.pop_i32()?.max(0) as u32;
                let buf = self.pop_buffer()?;
                let fd = self.pop_i32()?;
                let len = self.buffer_len(buf)?;
                let n = count.min(len) as usize;
                let mut bytes = vec![0u8; n];
                let read = self.host.fs_read(fd, &mut bytes);
                if read > 0 {
                    let obj =
                        self.heap.get_mut(buf).ok_or(TrapReason::InvalidHandle)?;
                    for (i, byte) in bytes[..read as usize].iter().enumerate() {
                        obj.write_u32(8 + i * 4, u32::from(*byte));
                    }
                }
                self.push_i32(read);
            }
            "write" => {
                let count = self.pop_i32()?.max(0) as u32;
                let buf = self.pop_buffer()?;
                let fd = self.pop_i32()?;
                let len = self.buffer_len(buf)?;
                let n = count.min(len) as usize;
                let mut bytes = Vec::with_capacity(n);
                for i in 0..n {
                    let word = self
                        .heap
                        .get(buf)
                        .and_then(|obj| obj.read_u32(8 + i * 4))
                        .ok_or(TrapReason::InvalidHandle)?;
                    bytes.push(word as u8);
                }
                let written = self.host.fs_write(fd, &bytes);
                self.push_i32(written);
            }
            _ => return Err(TrapReason::UnresolvedImport),
        }
        Ok(())
    }

    fn syscall_log(&mut self, import: &ImportDef) -> Result<(), TrapReason> {
        match import.symbol.as_str() {
            "log" => {
                let level = self.pop_i32()?;
                let handle = self.pop_handle()?;
                let message = self.string_at(handle)?.to_owned();
                self.host.log(&message, level);
                Ok(())
            }
            _ => Err(TrapReason::UnresolvedImport),
        }
    }

    fn syscall_dl(&mut self, import: &ImportDef) -> Result<(), TrapReason> {
        match import.symbol.as_str() {
            "open" => {
                let path_handle = self.pop_handle()?;
                let path = self.string_at(path_handle)?.to_owned();
                let handle = self.host.dl_open(&path);
                self.push_i64(handle);
            }
            "sym" => {
                let name_handle = self.pop_handle()?;
                let name = self.string_at(name_handle)?.to_owned();
                let library = self.pop_i64()?;
                let addr = self.host.dl_sym(library, &name);
                self.push_i64(addr);
            }
            "close" => {
                let library = self.pop_i64()?;
                let code = self.host.dl_close(library);
                self.push_i32(code);
            }
            "last_error" => {
                let message = self.host.dl_last_error();
                let handle = self.alloc_string(&message);
                self.push_handle(handle);
            }
            symbol if symbol.starts_with("call$") => self.syscall_dl_companion(import)?,
            _ => return Err(TrapReason::UnresolvedImport),
        }
        Ok(())
    }

    /// `call$<N>` companion: the import signature is `(i64, scalars…)`,
    /// address first. Arguments sit on the stack in signature order.
    fn syscall_dl_companion(&mut self, import: &ImportDef) -> Result<(), TrapReason> {
        let sig = self.sig_of(import.sig)?.clone();
        let ret = dl_return_of(&sig.ret).ok_or(TrapReason::UnresolvedImport)?;
        let scalar_count = sig.params.len().saturating_sub(1);
        let mut args = Vec::with_capacity(scalar_count);
        for _ in 0..scalar_count {
            args.push(self.pop()?);
        }
        args.reverse();
        let addr = self.pop_i64()?;
        let outcome = self.host.dl_call(ret, addr, &args);
        self.push_dl_outcome(ret, outcome);
        Ok(())
    }

    fn pop_buffer(&mut self) -> Result<u32, TrapReason> {
        let handle = self.pop_handle()?;
        if handle == NULL_HANDLE {
            return Err(TrapReason::NullReference);
        }
        match self.heap.get(handle) {
            Some(obj) if obj.header.kind == ObjectKind::List => Ok(handle),
            _ => Err(TrapReason::InvalidHandle),
        }
    }

    fn buffer_len(&self, handle: u32) -> Result<u32, TrapReason> {
        self.heap
            .get(handle)
            .and_then(|obj| obj.read_u32(0))
            .ok_or(TrapReason::InvalidHandle)
    }
}
