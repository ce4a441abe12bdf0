//! Call, return and jump execution.

use sir_asm::{TrapReason, NULL_HANDLE};

use super::{CallFrame, Interpreter};
use crate::heap::ObjectKind;
use crate::host::Host;

impl<H: Host> Interpreter<H> {
    pub(super) fn push_frame(
        &mut self,
        fid: u32,
        argc: u8,
        closure: u32,
    ) -> Result<(), TrapReason> {
        if self.module.functions.get(fid as usize).is_none() {
            return Err(TrapReason::InvalidTarget);
        }
        let argc = usize::from(argc);
        if self.stack.len() < self.stack_floor() + argc {
            return Err(TrapReason::StackUnderflow);
        }
        let locals_base = self.locals.len();
        let split = self.stack.len() - argc;
        self.locals.extend(self.stack.drain(split..));
        self.frames.push(CallFrame {
            func: fid,
            ip: 0,
            locals_base,
            stack_base: self.stack.len(),
            closure,
        });
        Ok(())
    }

    pub(super) fn do_call(&mut self, fid: u32, argc: u8) -> Result<(), TrapReason> {
        self.push_frame(fid, argc, NULL_HANDLE)
    }

    pub(super) fn do_tailcall(&mut self, fid: u32, argc: u8) -> Result<(), TrapReason> {
        if self.module.functions.get(fid as usize).is_none() {
            return Err(TrapReason::InvalidTarget);
        }
        let argc = usize::from(argc);
        if self.stack.len() < self.stack_floor() + argc {
            return Err(TrapReason::StackUnderflow);
        }
        let split = self.stack.len() - argc;
        let args: Vec<u64> = self.stack.drain(split..).collect();
        let frame = self.frames.last_mut().ok_or(TrapReason::StackUnderflow)?;
        let (locals_base, stack_base) = (frame.locals_base, frame.stack_base);
        frame.func = fid;
        frame.ip = 0;
        frame.closure = NULL_HANDLE;
        self.stack.truncate(stack_base);
        self.locals.truncate(locals_base);
        self.locals.extend(args);
        Ok(())
    }

    pub(super) fn do_call_indirect(
        &mut self,
        sig_id: u32,
        argc: u8,
    ) -> Result<(), TrapReason> {
        let callee = self.pop_handle()?;
        if callee == NULL_HANDLE {
            return Err(TrapReason::NotCallable);
        }
        let obj = self.heap.get(callee).ok_or(TrapReason::NotCallable)?;
        if obj.header.kind != ObjectKind::Closure {
            return Err(TrapReason::NotCallable);
        }
        let method = obj.read_u32(0).ok_or(TrapReason::NotCallable)?;
        let expected = self.sig_of(sig_id)?;
        let actual = self
            .module
            .function_sig(method)
            .ok_or(TrapReason::InvalidTarget)?;
        if !expected.same_shape(actual) {
            return Err(TrapReason::SignatureMismatch);
        }
        self.push_frame(method, argc, callee)
    }

    pub(super) fn do_callcheck(&mut self) -> Result<(), TrapReason> {
        let top = self.peek(0)?;
        if top > u64::from(u32::MAX) {
            return Err(TrapReason::NotCallable);
        }
        let handle = top as u32;
        if handle == NULL_HANDLE {
            return Err(TrapReason::NotCallable);
        }
        match self.heap.get(handle) {
            Some(obj) if obj.header.kind == ObjectKind::Closure => Ok(()),
            _ => Err(TrapReason::NotCallable),
        }
    }

    pub(super) fn do_ret(&mut self) -> Result<(), TrapReason> {
        let frame = self.frames.pop().ok_or(TrapReason::StackUnderflow)?;
        let sig = self
            .module
            .function_sig(frame.func)
            .ok_or(TrapReason::InvalidTarget)?;
        let ret = if sig.returns_value() {
            if self.stack.len() <= frame.stack_base {
                return Err(TrapReason::StackUnderflow);
            }
            self.stack.pop()
        } else {
            None
        };
        self.stack.truncate(frame.stack_base);
        self.locals.truncate(frame.locals_base);
        if let Some(value) = ret {
            self.stack.push(value);
        }
        Ok(())
    }

    pub(super) fn jump(&mut self, offset: i32) -> Result<(), TrapReason> {
        let frame = self.frames.last_mut().ok_or(TrapReason::StackUnderflow)?;
        let code_len = self.module.functions[frame.func as usize].code.len();
        let target = frame.ip as i64 + i64::from(offset);
        if target < 0 || target > code_len as i64 {
            return Err(TrapReason::InvalidTarget);
        }
        frame.ip = target as usize;
        Ok(())
    }

    pub(super) fn do_jmp_table(&mut self) -> Result<(), TrapReason> {
        let selector = self.pop_i32()?;
        let count = self.fetch_u16()?;
        let mut chosen: Option<(usize, i32)> = None;

        let default_offset = self.fetch_i32()?;
        let default_end = self.ip()?;
        for case in 0..count {
            let offset = self.fetch_i32()?;
            let end = self.ip()?;
            if i64::from(selector) == i64::from(case) {
                chosen = Some((end, offset));
            }
        }
        let (end, offset) = chosen.unwrap_or((default_end, default_offset));

        let frame = self.frames.last_mut().ok_or(TrapReason::StackUnderflow)?;
        let code_len = self.module.functions[frame.func as usize].code.len();
        let target = end as i64 + i64::from(offset);
        if target < 0 || target > code_len as i64 {
            return Err(TrapReason::InvalidTarget);
        }
        frame.ip = target as usize;
        Ok(())
    }

    fn ip(&self) -> Result<usize, TrapReason> {
        self.frames
            .last()
            .map(|f| f.ip)
            .ok_or(TrapReason::StackUnderflow)
    }
}
