//! Dispatch for `intrinsic <id>`.

use sir_asm::{print_tag, IntrinsicId, TrapReason, NULL_HANDLE};

use super::Interpreter;
use crate::host::{DlOutcome, DlReturn, Host};

impl<H: Host> Interpreter<H> {
    pub(super) fn exec_intrinsic(&mut self, id: u32) -> Result<(), TrapReason> {
        use IntrinsicId::*;

        let intrinsic = IntrinsicId::from_id(id).ok_or(TrapReason::UnknownIntrinsic)?;
        match intrinsic {
            Trap => return Err(TrapReason::Explicit),
            Breakpoint => tracing::debug!(target: "sir::dispatch", "breakpoint"),

            LogI32 => {
                let v = self.pop_i32()?;
                self.debug_log(format_args!("{v}"));
            }
            LogI64 => {
                let v = self.pop_i64()?;
                self.debug_log(format_args!("{v}"));
            }
            LogF32 => {
                let v = self.pop_f32()?;
                self.debug_log(format_args!("{v}"));
            }
            LogF64 => {
                let v = self.pop_f64()?;
                self.debug_log(format_args!("{v}"));
            }
            LogRef => {
                let v = self.pop_handle()?;
                if v == NULL_HANDLE {
                    self.debug_log(format_args!("null"));
                } else {
                    self.debug_log(format_args!("ref#{v}"));
                }
            }

            AbsI32 => {
                let v = self.pop_i32()?;
                self.push_i32(v.wrapping_abs());
            }
            AbsI64 => {
                let v = self.pop_i64()?;
                self.push_i64(v.wrapping_abs());
            }
            MinI32 => self.binary_i32(i32::min)?,
            MaxI32 => self.binary_i32(i32::max)?,
            MinI64 => self.binary_i64(i64::min)?,
            MaxI64 => self.binary_i64(i64::max)?,
            MinF32 => self.binary_f32(f32::min)?,
            MaxF32 => self.binary_f32(f32::max)?,
            MinF64 => self.binary_f64(f64::min)?,
            MaxF64 => self.binary_f64(f64::max)?,
            SqrtF32 => {
                let v = self.pop_f32()?;
                self.push_f32(v.sqrt());
            }
            SqrtF64 => {
                let v = self.pop_f64()?;
                self.push_f64(v.sqrt());
            }

            MonoNs => {
                let ns = self.host.time_mono_ns();
                self.push_i64(ns);
            }
            WallNs => {
                let ns = self.host.time_wall_ns();
                self.push_i64(ns);
            }
            RandU32 => {
                let v = self.host.random_u64() as u32;
                self.push_u32(v);
            }
            RandU64 => {
                let v = self.host.random_u64();
                self.push_u64(v);
            }

            WriteStdout => {
                let handle = self.pop_handle()?;
                let bytes = self.string_at(handle)?.as_bytes().to_vec();
                self.host.write_stdout(&bytes);
            }
            WriteStderr => {
                let handle = self.pop_handle()?;
                let bytes = self.string_at(handle)?.as_bytes().to_vec();
                self.host.write_stderr(&bytes);
            }
            PrintAny => self.exec_print_any()?,

            DlCallI8 => self.exec_dl_call(DlReturn::I8)?,
            DlCallI16 => self.exec_dl_call(DlReturn::I16)?,
            DlCallI32 => self.exec_dl_call(DlReturn::I32)?,
            DlCallI64 => self.exec_dl_call(DlReturn::I64)?,
            DlCallU8 => self.exec_dl_call(DlReturn::U8)?,
            DlCallU16 => self.exec_dl_call(DlReturn::U16)?,
            DlCallU32 => self.exec_dl_call(DlReturn::U32)?,
            DlCallU64 => self.exec_dl_call(DlReturn::U64)?,
            DlCallF32 => self.exec_dl_call(DlReturn::F32)?,
            DlCallF64 => self.exec_dl_call(DlReturn::F64)?,
            DlCallBool => self.exec_dl_call(DlReturn::Bool)?,
            DlCallChar => self.exec_dl_call(DlReturn::Char)?,
            DlCallStr0 => self.exec_dl_call(DlReturn::Str0)?,
        }
        Ok(())
    }

    fn debug_log(&mut self, value: std::fmt::Arguments<'_>) {
        let line = format!("{value}\n");
        self.host.write_stderr(line.as_bytes());
    }

    fn binary_i32(&mut self, f: impl Fn(i32, i32) -> i32) -> Result<(), TrapReason> {
        let b = self.pop_i32()?;
        let a = self.pop_i32()?;
        self.push_i32(f(a, b));
        Ok(())
    }

    fn binary_i64(&mut self, f: impl Fn(i64, i64) -> i64) -> Result<(), TrapReason> {
        let b = self.pop_i64()?;
        let a = self.pop_i64()?;
        self.push_i64(f(a, b));
        Ok(())
    }

    fn binary_f32(&mut self, f: impl Fn(f32, f32) -> f32) -> Result<(), TrapReason> {
        let b = self.pop_f32()?;
        let a = self.pop_f32()?;
        self.push_f32(f(a, b));
        Ok(())
    }

    fn binary_f64(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), TrapReason> {
        let b = self.pop_f64()?;
        let a = self.pop_f64()?;
        self.push_f64(f(a, b));
        Ok(())
    }

    /// `print_any`: tag on top, the tagged value beneath it.
    fn exec_print_any(&mut self) -> Result<(), TrapReason> {
        let tag = self.pop_u32()?;
        let slot = self.pop()?;
        let text = match tag {
            print_tag::I8 | print_tag::I16 | print_tag::I32 => {
                format!("{}", slot as u32 as i32)
            }
            print_tag::I64 => format!("{}", slot as i64),
            print_tag::U8 | print_tag::U16 | print_tag::U32 => {
                format!("{}", slot as u32)
            }
            print_tag::U64 => format!("{slot}"),
            print_tag::F32 => format!("{}", f32::from_bits(slot as u32)),
            print_tag::F64 => format!("{}", f64::from_bits(slot)),
            print_tag::BOOL => {
                if slot != 0 { "true".into() } else { "false".into() }
            }
            print_tag::CHAR => char::from_u32(slot as u32 & 0xFFFF)
                .map(String::from)
                .unwrap_or_default(),
            print_tag::STRING => self.string_at(slot as u32)?.to_owned(),
            _ => return Err(TrapReason::UnknownIntrinsic),
        };
        self.host.write_stdout(text.as_bytes());
        Ok(())
    }

    /// Dynamic call: argument count on top, then the arguments, then the
    /// target address beneath them.
    pub(super) fn exec_dl_call(&mut self, ret: DlReturn) -> Result<(), TrapReason> {
        let argc = self.pop_u32()? as usize;
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop()?);
        }
        args.reverse();
        let addr = self.pop_i64()?;
        let outcome = self.host.dl_call(ret, addr, &args);
        self.push_dl_outcome(ret, outcome);
        Ok(())
    }

    pub(super) fn push_dl_outcome(&mut self, ret: DlReturn, outcome: DlOutcome) {
        match outcome {
            DlOutcome::Str(text) => {
                let handle = self.alloc_string(&text);
                self.push_handle(handle);
            }
            DlOutcome::Word(word) => match ret {
                DlReturn::Void => {}
                DlReturn::I8 => self.push_i32(word as i8 as i32),
                DlReturn::I16 => self.push_i32(word as i16 as i32),
                DlReturn::I32 => self.push_i32(word as u32 as i32),
                DlReturn::I64 => self.push(word),
                DlReturn::U8 => self.push_u32(word as u8 as u32),
                DlReturn::U16 => self.push_u32(word as u16 as u32),
                DlReturn::U32 => self.push_u32(word as u32),
                DlReturn::U64 => self.push(word),
                DlReturn::F32 => self.push(u64::from(word as u32)),
                DlReturn::F64 => self.push(word),
                DlReturn::Bool => self.push_bool(word != 0),
                DlReturn::Char => self.push_u32(word as u32 & 0xFFFF),
                DlReturn::Str0 => self.push_handle(NULL_HANDLE),
            },
        }
    }
}
