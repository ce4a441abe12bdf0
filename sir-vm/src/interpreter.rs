//! [`Interpreter`] implementation: fetch-decode-execute over an encoded
//! [`IrModule`].
//!
//! The operand stack, locals arena and globals hold untagged 64-bit slots;
//! the static type of every slot is established by the opcode that produced
//! it. Floats travel as bit patterns, references as zero-extended 32-bit
//! handles.

use sir_asm::{Opcode, SirType, TrapReason, NULL_HANDLE};

use crate::consts::*;
use crate::error::InterpreterError;
use crate::heap::{Heap, ObjectKind};
use crate::host::{Host, StdHost};
use crate::module::{ConstValue, IrModule, Signature};

mod alu;
mod flow;
mod gc;
mod heap_ops;
mod intrinsics;
mod syscall;

/// One call frame: resumption point, locals window and stack watermark.
#[derive(Clone, Copy, Debug)]
struct CallFrame {
    func: u32,
    ip: usize,
    locals_base: usize,
    stack_base: usize,
    /// Bound closure handle for `ldupv`/`stupv`, or [`NULL_HANDLE`].
    closure: u32,
}

/// The SIR stack machine.
///
/// Host effects route through the `H` seam; see [`Host`]. Execution is
/// single-threaded and synchronous, and garbage collection only runs
/// between instructions.
#[derive(Debug)]
pub struct Interpreter<H = StdHost> {
    module: IrModule,
    heap: Heap,
    stack: Vec<u64>,
    locals: Vec<u64>,
    globals: Vec<u64>,
    frames: Vec<CallFrame>,
    const_handles: Vec<u32>,
    host: H,
    allocation_debt: usize,
}

impl<H: Host> Interpreter<H> {
    /// Initialize an interpreter: zero the globals, intern the string
    /// constants and apply `init=` constants to their global slots.
    pub fn new(module: IrModule, host: H) -> Result<Self, InterpreterError> {
        for import in &module.imports {
            if import.sig as usize >= module.sigs.len() {
                return Err(InterpreterError::BadModule(format!(
                    "import {} references signature {} outside the sig table",
                    import.name, import.sig
                )));
            }
        }
        for func in &module.functions {
            if func.sig_id as usize >= module.sigs.len() {
                return Err(InterpreterError::BadModule(format!(
                    "func {} references signature {} outside the sig table",
                    func.name, func.sig_id
                )));
            }
        }
        if module.functions.get(module.entry as usize).is_none() {
            return Err(InterpreterError::BadModule("entry outside module".into()));
        }

        let mut heap = Heap::new();
        let mut const_handles = Vec::with_capacity(module.consts.len());
        for def in &module.consts {
            match &def.value {
                ConstValue::Str(text) => {
                    let handle =
                        heap.allocate(ObjectKind::String, sir_asm::type_id::STRING, text.len() as u32);
                    if let Some(obj) = heap.get_mut(handle) {
                        obj.payload.copy_from_slice(text.as_bytes());
                    }
                    const_handles.push(handle);
                }
                _ => const_handles.push(NULL_HANDLE),
            }
        }

        let mut globals = vec![0u64; module.globals.len()];
        for (slot, global) in globals.iter_mut().zip(&module.globals) {
            let Some(init) = global.init else { continue };
            let Some(def) = module.consts.get(init as usize) else {
                return Err(InterpreterError::BadModule(format!(
                    "global {} references missing const", global.name
                )));
            };
            *slot = match &def.value {
                ConstValue::Int(v) => int_slot(&global.ty, *v),
                ConstValue::Float(v) => float_slot(&global.ty, *v),
                ConstValue::Str(_) => u64::from(const_handles[init as usize]),
            };
        }

        // Drop the interning burst from the collection debt.
        heap.take_allocation_count();

        Ok(Self {
            module,
            heap,
            stack: Vec::new(),
            locals: Vec::new(),
            globals,
            frames: Vec::new(),
            const_handles,
            host,
            allocation_debt: 0,
        })
    }

    /// Run `__global_init` (when present) and then the module entry.
    /// Returns the entry's value slot for value-returning entries.
    pub fn run(&mut self) -> Result<Option<u64>, InterpreterError> {
        if let Some(init) = self.module.global_init_index() {
            self.invoke(init)?;
        }
        let entry = self.module.entry;
        self.invoke(entry)
    }

    /// Invoke a zero-argument function to completion.
    pub fn invoke(&mut self, func: u32) -> Result<Option<u64>, InterpreterError> {
        let base_depth = self.frames.len();
        self.push_frame(func, 0, NULL_HANDLE)
            .map_err(|reason| self.trap(reason))?;
        while self.frames.len() > base_depth {
            if self.frames.len() >= MAX_CALL_DEPTH {
                return Err(InterpreterError::CallDepthExceeded(MAX_CALL_DEPTH));
            }
            self.maybe_collect();
            self.step()?;
        }
        let sig = self
            .module
            .function_sig(func)
            .ok_or_else(|| InterpreterError::BadModule("function without signature".into()))?;
        if sig.returns_value() {
            Ok(self.stack.pop())
        } else {
            Ok(None)
        }
    }

    /// Borrow the host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutably borrow the host.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The loaded module.
    pub fn module(&self) -> &IrModule {
        &self.module
    }

    /// Number of live heap objects; exposed for collection tests.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn live_objects(&self) -> usize {
        self.heap.live_count()
    }

    fn trap(&self, reason: TrapReason) -> InterpreterError {
        let (function, offset) = self
            .frames
            .last()
            .map(|f| (f.func, f.ip))
            .unwrap_or((self.module.entry, 0));
        InterpreterError::Trap { reason, function, offset }
    }

    fn step(&mut self) -> Result<(), InterpreterError> {
        match self.exec_instruction() {
            Ok(()) => Ok(()),
            Err(reason) => Err(self.trap(reason)),
        }
    }

    fn exec_instruction(&mut self) -> Result<(), TrapReason> {
        use Opcode::*;

        let byte = self.fetch_u8()?;
        let op = Opcode::try_from(byte).map_err(|_| TrapReason::InvalidInstruction)?;
        tracing::trace!(target: "sir::dispatch", op = %op);

        // Binary operation: pop right, pop left, push f(left, right).
        macro_rules! binop {
            ($pop:ident, $push:ident, $f:ident) => {{
                let b = self.$pop()?;
                let a = self.$pop()?;
                self.$push(a.$f(b));
            }};
            ($pop:ident, $push:ident, $operator:tt) => {{
                let b = self.$pop()?;
                let a = self.$pop()?;
                self.$push(a $operator b);
            }};
        }
        // Comparison: pop right, pop left, push the relation as bool.
        macro_rules! cmp {
            ($pop:ident, $operator:tt) => {{
                let b = self.$pop()?;
                let a = self.$pop()?;
                self.push_bool(a $operator b);
            }};
        }
        // Unary conversion: pop source type, push converted.
        macro_rules! conv {
            ($pop:ident, $push:ident, $target:ty) => {{
                let v = self.$pop()?;
                self.$push(v as $target);
            }};
        }

        match op {
            Nop => {}
            Pop => {
                self.pop()?;
            }
            Dup => {
                let v = self.peek(0)?;
                self.push(v);
            }
            Dup2 => {
                let b = self.peek(0)?;
                let a = self.peek(1)?;
                self.push(a);
                self.push(b);
            }
            Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b);
                self.push(a);
            }
            Rot => {
                let c = self.pop()?;
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b);
                self.push(c);
                self.push(a);
            }

            Enter => {
                let locals = self.fetch_u16()? as usize;
                let frame = self.frames.last().ok_or(TrapReason::StackUnderflow)?;
                let have = self.locals.len() - frame.locals_base;
                let want = locals.max(have);
                let base = frame.locals_base;
                self.locals.resize(base + want, 0);
            }
            Ret => self.do_ret()?,
            Call => {
                let fid = self.fetch_u32()?;
                let argc = self.fetch_imm_u8()?;
                self.do_call(fid, argc)?;
            }
            CallIndirect => {
                let sig_id = self.fetch_u32()?;
                let argc = self.fetch_imm_u8()?;
                self.do_call_indirect(sig_id, argc)?;
            }
            TailCall => {
                let fid = self.fetch_u32()?;
                let argc = self.fetch_imm_u8()?;
                self.do_tailcall(fid, argc)?;
            }
            CallCheck => self.do_callcheck()?,
            Intrinsic => {
                let id = self.fetch_u32()?;
                self.exec_intrinsic(id)?;
            }
            Syscall => {
                let id = self.fetch_u32()?;
                self.exec_syscall(id)?;
            }

            ConstI8 => {
                let v = self.fetch_u8()? as i8;
                self.push_i32(v.into());
            }
            ConstI16 => {
                let v = self.fetch_u16()? as i16;
                self.push_i32(v.into());
            }
            ConstI32 => {
                let v = self.fetch_u32()? as i32;
                self.push_i32(v);
            }
            ConstI64 => {
                let v = self.fetch_u64()? as i64;
                self.push_i64(v);
            }
            ConstU8 => {
                let v = self.fetch_u8()?;
                self.push_u32(v.into());
            }
            ConstU16 => {
                let v = self.fetch_u16()?;
                self.push_u32(v.into());
            }
            ConstU32 => {
                let v = self.fetch_u32()?;
                self.push_u32(v);
            }
            ConstU64 => {
                let v = self.fetch_u64()?;
                self.push_u64(v);
            }
            ConstF32 => {
                let bits = self.fetch_u32()?;
                self.push(bits.into());
            }
            ConstF64 => {
                let bits = self.fetch_u64()?;
                self.push(bits);
            }
            ConstBool => {
                let v = self.fetch_u8()?;
                self.push_bool(v != 0);
            }
            ConstChar => {
                let v = self.fetch_u16()?;
                self.push_u32(v.into());
            }
            ConstString => {
                let id = self.fetch_u32()? as usize;
                let handle = *self
                    .const_handles
                    .get(id)
                    .ok_or(TrapReason::InvalidTarget)?;
                self.push_handle(handle);
            }
            ConstNull => self.push_handle(NULL_HANDLE),

            Jmp => {
                let offset = self.fetch_i32()?;
                self.jump(offset)?;
            }
            JmpTrue => {
                let offset = self.fetch_i32()?;
                if self.pop_bool()? {
                    self.jump(offset)?;
                }
            }
            JmpFalse => {
                let offset = self.fetch_i32()?;
                if !self.pop_bool()? {
                    self.jump(offset)?;
                }
            }
            JmpTable => self.do_jmp_table()?,

            LdLoc => {
                let index = self.fetch_u16()? as usize;
                let v = self.local(index)?;
                self.push(v);
            }
            StLoc => {
                let index = self.fetch_u16()? as usize;
                let v = self.pop()?;
                *self.local_mut(index)? = v;
            }
            LdGlob => {
                let index = self.fetch_u16()? as usize;
                let v = *self
                    .globals
                    .get(index)
                    .ok_or(TrapReason::InvalidGlobal)?;
                self.push(v);
            }
            StGlob => {
                let index = self.fetch_u16()? as usize;
                let v = self.pop()?;
                *self
                    .globals
                    .get_mut(index)
                    .ok_or(TrapReason::InvalidGlobal)? = v;
            }
            LdUpv => {
                let index = self.fetch_u16()?;
                let v = self.upvalue(index)?;
                self.push_handle(v);
            }
            StUpv => {
                let index = self.fetch_u16()?;
                let v = self.pop()?;
                self.set_upvalue(index, v as u32)?;
            }

            AddI32 => binop!(pop_i32, push_i32, wrapping_add),
            SubI32 => binop!(pop_i32, push_i32, wrapping_sub),
            MulI32 => binop!(pop_i32, push_i32, wrapping_mul),
            DivI32 => self.div_i32()?,
            ModI32 => self.mod_i32()?,
            AddI64 => binop!(pop_i64, push_i64, wrapping_add),
            SubI64 => binop!(pop_i64, push_i64, wrapping_sub),
            MulI64 => binop!(pop_i64, push_i64, wrapping_mul),
            DivI64 => self.div_i64()?,
            ModI64 => self.mod_i64()?,
            AddU32 => binop!(pop_u32, push_u32, wrapping_add),
            SubU32 => binop!(pop_u32, push_u32, wrapping_sub),
            MulU32 => binop!(pop_u32, push_u32, wrapping_mul),
            DivU32 => self.div_u32()?,
            ModU32 => self.mod_u32()?,
            AddU64 => binop!(pop_u64, push_u64, wrapping_add),
            SubU64 => binop!(pop_u64, push_u64, wrapping_sub),
            MulU64 => binop!(pop_u64, push_u64, wrapping_mul),
            DivU64 => self.div_u64()?,
            ModU64 => self.mod_u64()?,
            AddF32 => binop!(pop_f32, push_f32, +),
            SubF32 => binop!(pop_f32, push_f32, -),
            MulF32 => binop!(pop_f32, push_f32, *),
            DivF32 => binop!(pop_f32, push_f32, /),
            AddF64 => binop!(pop_f64, push_f64, +),
            SubF64 => binop!(pop_f64, push_f64, -),
            MulF64 => binop!(pop_f64, push_f64, *),
            DivF64 => binop!(pop_f64, push_f64, /),

            AndI32 => binop!(pop_i32, push_i32, &),
            OrI32 => binop!(pop_i32, push_i32, |),
            XorI32 => binop!(pop_i32, push_i32, ^),
            ShlI32 => {
                let count = self.pop_i32()?;
                let v = self.pop_i32()?;
                self.push_i32(v.wrapping_shl(count as u32));
            }
            ShrI32 => {
                let count = self.pop_i32()?;
                let v = self.pop_i32()?;
                self.push_i32(v.wrapping_shr(count as u32));
            }
            AndI64 => binop!(pop_i64, push_i64, &),
            OrI64 => binop!(pop_i64, push_i64, |),
            XorI64 => binop!(pop_i64, push_i64, ^),
            ShlI64 => {
                let count = self.pop_i64()?;
                let v = self.pop_i64()?;
                self.push_i64(v.wrapping_shl(count as u32));
            }
            ShrI64 => {
                let count = self.pop_i64()?;
                let v = self.pop_i64()?;
                self.push_i64(v.wrapping_shr(count as u32));
            }

            NegI32 => {
                let v = self.pop_i32()?;
                self.push_i32(v.wrapping_neg());
            }
            NegI64 => {
                let v = self.pop_i64()?;
                self.push_i64(v.wrapping_neg());
            }
            IncI32 => {
                let v = self.pop_i32()?;
                self.push_i32(v.wrapping_add(1));
            }
            DecI32 => {
                let v = self.pop_i32()?;
                self.push_i32(v.wrapping_sub(1));
            }
            IncI64 => {
                let v = self.pop_i64()?;
                self.push_i64(v.wrapping_add(1));
            }
            DecI64 => {
                let v = self.pop_i64()?;
                self.push_i64(v.wrapping_sub(1));
            }

            BoolNot => {
                let v = self.pop_bool()?;
                self.push_bool(!v);
            }
            BoolAnd => cmp!(pop_bool, &),
            BoolOr => cmp!(pop_bool, |),

            CmpEqI32 => cmp!(pop_i32, ==),
            CmpNeI32 => cmp!(pop_i32, !=),
            CmpLtI32 => cmp!(pop_i32, <),
            CmpLeI32 => cmp!(pop_i32, <=),
            CmpGtI32 => cmp!(pop_i32, >),
            CmpGeI32 => cmp!(pop_i32, >=),
            CmpEqI64 => cmp!(pop_i64, ==),
            CmpNeI64 => cmp!(pop_i64, !=),
            CmpLtI64 => cmp!(pop_i64, <),
            CmpLeI64 => cmp!(pop_i64, <=),
            CmpGtI64 => cmp!(pop_i64, >),
            CmpGeI64 => cmp!(pop_i64, >=),
            CmpEqU32 => cmp!(pop_u32, ==),
            CmpNeU32 => cmp!(pop_u32, !=),
            CmpLtU32 => cmp!(pop_u32, <),
            CmpLeU32 => cmp!(pop_u32, <=),
            CmpGtU32 => cmp!(pop_u32, >),
            CmpGeU32 => cmp!(pop_u32, >=),
            CmpEqU64 => cmp!(pop_u64, ==),
            CmpNeU64 => cmp!(pop_u64, !=),
            CmpLtU64 => cmp!(pop_u64, <),
            CmpLeU64 => cmp!(pop_u64, <=),
            CmpGtU64 => cmp!(pop_u64, >),
            CmpGeU64 => cmp!(pop_u64, >=),
            CmpEqF32 => cmp!(pop_f32, ==),
            CmpNeF32 => cmp!(pop_f32, !=),
            CmpLtF32 => cmp!(pop_f32, <),
            CmpLeF32 => cmp!(pop_f32, <=),
            CmpGtF32 => cmp!(pop_f32, >),
            CmpGeF32 => cmp!(pop_f32, >=),
            CmpEqF64 => cmp!(pop_f64, ==),
            CmpNeF64 => cmp!(pop_f64, !=),
            CmpLtF64 => cmp!(pop_f64, <),
            CmpLeF64 => cmp!(pop_f64, <=),
            CmpGtF64 => cmp!(pop_f64, >),
            CmpGeF64 => cmp!(pop_f64, >=),

            ConvI32I64 => conv!(pop_i32, push_i64, i64),
            ConvI64I32 => conv!(pop_i64, push_i32, i32),
            ConvI32F32 => conv!(pop_i32, push_f32, f32),
            ConvI32F64 => conv!(pop_i32, push_f64, f64),
            ConvF32I32 => conv!(pop_f32, push_i32, i32),
            ConvF64I32 => conv!(pop_f64, push_i32, i32),
            ConvF32F64 => conv!(pop_f32, push_f64, f64),
            ConvF64F32 => conv!(pop_f64, push_f32, f32),

            NewObj => {
                let type_id = self.fetch_u32()?;
                self.exec_newobj(type_id)?;
            }
            LdFld => {
                let fid = self.fetch_u32()?;
                self.exec_ldfld(fid)?;
            }
            StFld => {
                let fid = self.fetch_u32()?;
                self.exec_stfld(fid)?;
            }
            TypeOf => self.exec_typeof()?,
            IsNull => {
                let handle = self.pop_handle()?;
                self.push_bool(handle == NULL_HANDLE);
            }
            RefEq => cmp!(pop_handle, ==),
            RefNe => cmp!(pop_handle, !=),
            NewClosure => {
                let method = self.fetch_u32()?;
                let upvalues = self.fetch_imm_u8()?;
                self.exec_newclosure(method, upvalues)?;
            }

            NewArray => {
                let type_id = self.fetch_u32()?;
                let length = self.fetch_u32()?;
                self.exec_newarray(type_id, length)?;
            }
            ArrayLen => self.exec_array_len()?,
            ArrayGetI32 | ArrayGetF32 | ArrayGetRef => self.exec_array_get(4)?,
            ArrayGetI64 | ArrayGetF64 => self.exec_array_get(8)?,
            ArraySetI32 | ArraySetF32 | ArraySetRef => self.exec_array_set(4)?,
            ArraySetI64 | ArraySetF64 => self.exec_array_set(8)?,

            NewList => {
                let type_id = self.fetch_u32()?;
                let capacity = self.fetch_u32()?;
                self.exec_newlist(type_id, capacity)?;
            }
            ListLen => self.exec_list_len()?,
            ListGetI32 | ListGetF32 | ListGetRef => self.exec_list_get(4)?,
            ListGetI64 | ListGetF64 => self.exec_list_get(8)?,
            ListSetI32 | ListSetF32 | ListSetRef => self.exec_list_set(4)?,
            ListSetI64 | ListSetF64 => self.exec_list_set(8)?,
            ListPushI32 | ListPushF32 | ListPushRef => self.exec_list_push(4)?,
            ListPushI64 | ListPushF64 => self.exec_list_push(8)?,
            ListPopI32 | ListPopF32 | ListPopRef => self.exec_list_pop(4)?,
            ListPopI64 | ListPopF64 => self.exec_list_pop(8)?,
            ListInsertI32 => self.exec_list_insert(4)?,
            ListRemoveI32 => self.exec_list_remove(4)?,
            ListClear => self.exec_list_clear()?,

            StringLen => self.exec_string_len()?,
            StringConcat => self.exec_string_concat()?,
            StringGetChar => self.exec_string_get_char()?,
            StringSlice => self.exec_string_slice()?,
        }
        Ok(())
    }

    // ---- fetch helpers ----------------------------------------------------

    fn fetch_u8(&mut self) -> Result<u8, TrapReason> {
        let frame = self.frames.last_mut().ok_or(TrapReason::StackUnderflow)?;
        let code = &self.module.functions[frame.func as usize].code;
        let byte = *code.get(frame.ip).ok_or(TrapReason::InvalidTarget)?;
        frame.ip += 1;
        Ok(byte)
    }

    /// u8 immediate operand, distinct from opcode fetch for readability.
    fn fetch_imm_u8(&mut self) -> Result<u8, TrapReason> {
        self.fetch_u8()
    }

    fn fetch_u16(&mut self) -> Result<u16, TrapReason> {
        let bytes = self.fetch_bytes::<2>()?;
        Ok(u16::from_le_bytes(bytes))
    }

    fn fetch_u32(&mut self) -> Result<u32, TrapReason> {
        let bytes = self.fetch_bytes::<4>()?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn fetch_u64(&mut self) -> Result<u64, TrapReason> {
        let bytes = self.fetch_bytes::<8>()?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn fetch_i32(&mut self) -> Result<i32, TrapReason> {
        Ok(self.fetch_u32()? as i32)
    }

    fn fetch_bytes<const N: usize>(&mut self) -> Result<[u8; N], TrapReason> {
        let frame = self.frames.last_mut().ok_or(TrapReason::StackUnderflow)?;
        let code = &self.module.functions[frame.func as usize].code;
        let bytes = code
            .get(frame.ip..frame.ip + N)
            .ok_or(TrapReason::InvalidTarget)?;
        frame.ip += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    // ---- operand stack ----------------------------------------------------

    fn stack_floor(&self) -> usize {
        self.frames.last().map(|f| f.stack_base).unwrap_or(0)
    }

    fn push(&mut self, value: u64) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<u64, TrapReason> {
        if self.stack.len() <= self.stack_floor() {
            return Err(TrapReason::StackUnderflow);
        }
        self.stack.pop().ok_or(TrapReason::StackUnderflow)
    }

    fn peek(&self, depth: usize) -> Result<u64, TrapReason> {
        let floor = self.stack_floor();
        let len = self.stack.len();
        if len <= floor + depth {
            return Err(TrapReason::StackUnderflow);
        }
        Ok(self.stack[len - 1 - depth])
    }

    fn pop_i32(&mut self) -> Result<i32, TrapReason> {
        Ok(self.pop()? as u32 as i32)
    }

    fn pop_u32(&mut self) -> Result<u32, TrapReason> {
        Ok(self.pop()? as u32)
    }

    fn pop_i64(&mut self) -> Result<i64, TrapReason> {
        Ok(self.pop()? as i64)
    }

    fn pop_u64(&mut self) -> Result<u64, TrapReason> {
        self.pop()
    }

    fn pop_f32(&mut self) -> Result<f32, TrapReason> {
        Ok(f32::from_bits(self.pop()? as u32))
    }

    fn pop_f64(&mut self) -> Result<f64, TrapReason> {
        Ok(f64::from_bits(self.pop()?))
    }

    fn pop_bool(&mut self) -> Result<bool, TrapReason> {
        Ok(self.pop()? != 0)
    }

    fn pop_handle(&mut self) -> Result<u32, TrapReason> {
        Ok(self.pop()? as u32)
    }

    fn push_i32(&mut self, value: i32) {
        self.push(value as u32 as u64);
    }

    fn push_u32(&mut self, value: u32) {
        self.push(value.into());
    }

    fn push_i64(&mut self, value: i64) {
        self.push(value as u64);
    }

    fn push_u64(&mut self, value: u64) {
        self.push(value);
    }

    fn push_f32(&mut self, value: f32) {
        self.push(value.to_bits().into());
    }

    fn push_f64(&mut self, value: f64) {
        self.push(value.to_bits());
    }

    fn push_bool(&mut self, value: bool) {
        self.push(value.into());
    }

    fn push_handle(&mut self, handle: u32) {
        self.push(handle.into());
    }

    // ---- locals and upvalues ----------------------------------------------

    fn local(&self, index: usize) -> Result<u64, TrapReason> {
        let frame = self.frames.last().ok_or(TrapReason::StackUnderflow)?;
        self.locals
            .get(frame.locals_base + index)
            .copied()
            .ok_or(TrapReason::InvalidLocal)
    }

    fn local_mut(&mut self, index: usize) -> Result<&mut u64, TrapReason> {
        let frame = self.frames.last().ok_or(TrapReason::StackUnderflow)?;
        self.locals
            .get_mut(frame.locals_base + index)
            .ok_or(TrapReason::InvalidLocal)
    }

    fn upvalue(&self, index: u16) -> Result<u32, TrapReason> {
        let frame = self.frames.last().ok_or(TrapReason::StackUnderflow)?;
        let obj = self
            .heap
            .get(frame.closure)
            .ok_or(TrapReason::InvalidUpvalue)?;
        let count = obj.read_u32(4).ok_or(TrapReason::InvalidUpvalue)?;
        if u32::from(index) >= count {
            return Err(TrapReason::InvalidUpvalue);
        }
        obj.read_u32(8 + usize::from(index) * 4)
            .ok_or(TrapReason::InvalidUpvalue)
    }

    fn set_upvalue(&mut self, index: u16, value: u32) -> Result<(), TrapReason> {
        let frame = self.frames.last().ok_or(TrapReason::StackUnderflow)?;
        let closure = frame.closure;
        let obj = self
            .heap
            .get_mut(closure)
            .ok_or(TrapReason::InvalidUpvalue)?;
        let count = obj.read_u32(4).ok_or(TrapReason::InvalidUpvalue)?;
        if u32::from(index) >= count {
            return Err(TrapReason::InvalidUpvalue);
        }
        if !obj.write_u32(8 + usize::from(index) * 4, value) {
            return Err(TrapReason::InvalidUpvalue);
        }
        Ok(())
    }

    // ---- shared heap plumbing ---------------------------------------------

    fn alloc_string(&mut self, text: &str) -> u32 {
        let handle = self.heap.allocate(
            ObjectKind::String,
            sir_asm::type_id::STRING,
            text.len() as u32,
        );
        if let Some(obj) = self.heap.get_mut(handle) {
            obj.payload.copy_from_slice(text.as_bytes());
        }
        handle
    }

    fn string_at(&self, handle: u32) -> Result<&str, TrapReason> {
        if handle == NULL_HANDLE {
            return Err(TrapReason::NullReference);
        }
        let obj = self.heap.get(handle).ok_or(TrapReason::InvalidHandle)?;
        if obj.header.kind != ObjectKind::String {
            return Err(TrapReason::InvalidHandle);
        }
        std::str::from_utf8(&obj.payload).map_err(|_| TrapReason::InvalidHandle)
    }

    fn sig_of(&self, id: u32) -> Result<&Signature, TrapReason> {
        self.module
            .sigs
            .get(id as usize)
            .ok_or(TrapReason::InvalidTarget)
    }
}

fn int_slot(ty: &SirType, value: i64) -> u64 {
    match ty.elem_kind() {
        Some(sir_asm::ElemKind::I64) => value as u64,
        _ => value as i32 as u32 as u64,
    }
}

fn float_slot(ty: &SirType, value: f64) -> u64 {
    match ty {
        SirType::F32 => u64::from((value as f32).to_bits()),
        _ => value.to_bits(),
    }
}
