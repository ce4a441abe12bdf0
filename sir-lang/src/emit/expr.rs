//! Expression lowering.
//!
//! Every emission returns the static type it left on the stack; literal
//! emission adapts to the expected type when one is known. Narrow integer
//! expressions compute through the 32-bit ALU ops; the declared type still
//! drives constants and signatures.

use sir_asm::SirType;

use crate::ast::*;
use crate::emit::context::Capture;
use crate::emit::func::FuncEmitter;
use crate::emit::{parse_integer_literal, split_format_segments, EmitError};

/// Flatten nested member access over identifiers into path segments.
pub(crate) fn flatten_path(expr: &Expr) -> Option<Vec<&str>> {
    match &expr.kind {
        ExprKind::Ident(name) => Some(vec![name.as_str()]),
        ExprKind::Field { base, name } => {
            let mut path = flatten_path(base)?;
            path.push(name.as_str());
            Some(path)
        }
        _ => None,
    }
}

impl<'a, 'c> FuncEmitter<'a, 'c> {
    pub(crate) fn emit_expr(
        &mut self,
        expr: &'a Expr,
        expected: Option<&TypeRef>,
    ) -> Result<TypeRef, EmitError> {
        match &expr.kind {
            ExprKind::IntLit(text) => self.emit_int_literal(text, expected),
            ExprKind::FloatLit(text) => {
                let value: f64 = text
                    .parse()
                    .map_err(|_| EmitError(format!("invalid float literal: {text}")))?;
                let ty = match expected.map(|t| t.name.as_str()) {
                    Some("f32") => {
                        self.line(&format!("const.f32 {value}"));
                        TypeRef::named("f32")
                    }
                    _ => {
                        self.line(&format!("const.f64 {value}"));
                        TypeRef::named("f64")
                    }
                };
                self.push(1);
                Ok(ty)
            }
            ExprKind::BoolLit(value) => {
                self.line(&format!("const.bool {}", u8::from(*value)));
                self.push(1);
                Ok(TypeRef::named("bool"))
            }
            ExprKind::CharLit(value) => {
                self.line(&format!("const.char {}", *value as u32 & 0xFFFF));
                self.push(1);
                Ok(TypeRef::named("char"))
            }
            ExprKind::StrLit(value) => {
                let id = self.cx.intern_string(value);
                self.line(&format!("const.string {id}"));
                self.push(1);
                Ok(TypeRef::named("string"))
            }
            ExprKind::NullLit => {
                let Some(expected) = expected else {
                    return Err(EmitError(
                        "null literal requires a typed context".into(),
                    ));
                };
                self.line("const.null");
                self.push(1);
                Ok(expected.clone())
            }
            ExprKind::Ident(name) => self.emit_ident(name),
            ExprKind::Unary { op, operand } => self.emit_unary(*op, operand),
            ExprKind::Binary { op, lhs, rhs } => {
                self.emit_binary(*op, lhs, rhs, expected)
            }
            ExprKind::Call { callee, args } => self.emit_call(callee, args),
            ExprKind::Field { base, name } => self.emit_field(base, name),
            ExprKind::Index { base, index } => self.emit_index(base, index),
            ExprKind::ArrayLit(items) => self.emit_array_literal(items, expected),
            ExprKind::ListLit(items) => self.emit_list_literal(items, expected),
            ExprKind::ArtifactLit { name, args } => self.emit_artifact_literal(name, args),
            ExprKind::Lambda { .. } => self.emit_lambda_value(expr),
        }
    }

    fn emit_int_literal(
        &mut self,
        text: &str,
        expected: Option<&TypeRef>,
    ) -> Result<TypeRef, EmitError> {
        let value = parse_integer_literal(text)
            .ok_or_else(|| EmitError(format!("invalid integer literal: {text}")))?;
        let target = expected
            .filter(|t| t.dims.is_empty() && t.proc.is_none())
            .map(|t| t.name.as_str());
        let ty = match target {
            Some("i8") => {
                self.line(&format!("const.i8 {value}"));
                TypeRef::named("i8")
            }
            Some("i16") => {
                self.line(&format!("const.i16 {value}"));
                TypeRef::named("i16")
            }
            Some("i64") => {
                self.line(&format!("const.i64 {value}"));
                TypeRef::named("i64")
            }
            Some("u8") => {
                self.line(&format!("const.u8 {value}"));
                TypeRef::named("u8")
            }
            Some("u16") => {
                self.line(&format!("const.u16 {value}"));
                TypeRef::named("u16")
            }
            Some("u32") => {
                self.line(&format!("const.u32 {value}"));
                TypeRef::named("u32")
            }
            Some("u64") => {
                self.line(&format!("const.u64 {value}"));
                TypeRef::named("u64")
            }
            Some("f32") => {
                self.line(&format!("const.f32 {value}"));
                TypeRef::named("f32")
            }
            Some("f64") => {
                self.line(&format!("const.f64 {value}"));
                TypeRef::named("f64")
            }
            Some("char") => {
                self.line(&format!("const.char {}", value as u32 & 0xFFFF));
                TypeRef::named("char")
            }
            Some(name) if self.cx.enum_values.contains_key(name) => {
                self.line(&format!("const.i32 {value}"));
                TypeRef::named(name)
            }
            _ => {
                self.line(&format!("const.i32 {value}"));
                TypeRef::named("i32")
            }
        };
        self.push(1);
        Ok(ty)
    }

    fn emit_ident(&mut self, name: &str) -> Result<TypeRef, EmitError> {
        if let Some(local) = self.lookup_local(name).cloned() {
            self.line(&format!("ldloc {}", local.index));
            self.push(1);
            return Ok(local.ty);
        }
        if let Some(upvalue) = self.upvalues.get(name).cloned() {
            self.line(&format!("ldupv {}", upvalue.index));
            self.push(1);
            if upvalue.boxed {
                self.line("const.i32 0");
                self.push(1);
                let suffix = self.elem_suffix(&upvalue.ty)?;
                self.line(&format!("array.get.{suffix}"));
                self.pop(2)?;
                self.push(1);
            }
            return Ok(upvalue.ty);
        }
        if let Some(index) = self.cx.global_indices.get(name).copied() {
            self.line(&format!("ldglob {index}"));
            self.push(1);
            return Ok(self.cx.global_types[name].clone());
        }
        if let Some(fid) = self.cx.func_ids.get(name).copied() {
            // Top-level function as a value: a captureless closure.
            self.line(&format!("newclosure {fid} 0"));
            self.push(1);
            let params = self.cx.func_params[name].clone();
            let ret = self.cx.func_returns[name].clone();
            return Ok(TypeRef::proc_of(params, ret));
        }
        Err(EmitError(format!("unknown identifier: {name}")))
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: &'a Expr) -> Result<TypeRef, EmitError> {
        let ty = self.emit_expr(operand, None)?;
        match op {
            UnaryOp::Not => {
                self.line("bool.not");
                Ok(ty)
            }
            UnaryOp::Neg => {
                match self.arith_suffix(&ty)? {
                    "i32" => self.line("neg.i32"),
                    "i64" => self.line("neg.i64"),
                    "f32" => {
                        self.line("const.f32 0");
                        self.push(1);
                        self.line("swap");
                        self.line("sub.f32");
                        self.pop(1)?;
                    }
                    "f64" => {
                        self.line("const.f64 0");
                        self.push(1);
                        self.line("swap");
                        self.line("sub.f64");
                        self.pop(1)?;
                    }
                    _ => {
                        return Err(EmitError(format!(
                            "cannot negate a value of type {}",
                            ty.name
                        )))
                    }
                }
                Ok(ty)
            }
        }
    }

    fn emit_binary(
        &mut self,
        op: BinaryOp,
        lhs: &'a Expr,
        rhs: &'a Expr,
        expected: Option<&TypeRef>,
    ) -> Result<TypeRef, EmitError> {
        use BinaryOp::*;

        if matches!(op, LogicalAnd | LogicalOr) {
            let bool_ty = TypeRef::named("bool");
            self.emit_expr(lhs, Some(&bool_ty))?;
            self.emit_expr(rhs, Some(&bool_ty))?;
            self.line(if op == LogicalAnd { "bool.and" } else { "bool.or" });
            self.pop(1)?;
            return Ok(bool_ty);
        }

        // `x == null` and `x != null` lower through `isnull`.
        if matches!(op, Eq | Ne) {
            let null_operand = match (&lhs.kind, &rhs.kind) {
                (_, ExprKind::NullLit) => Some(lhs),
                (ExprKind::NullLit, _) => Some(rhs),
                _ => None,
            };
            if let Some(operand) = null_operand {
                self.emit_expr(operand, None)?;
                self.line("isnull");
                if op == Ne {
                    self.line("bool.not");
                }
                return Ok(TypeRef::named("bool"));
            }
        }

        let arith_expected = match op {
            Add | Sub | Mul | Div | Mod | BitAnd | BitOr | BitXor | Shl | Shr => expected,
            _ => None,
        };
        let lhs_ty = self.emit_expr(lhs, arith_expected)?;
        let rhs_ty = self.emit_expr(rhs, Some(&lhs_ty))?;
        let lhs_sir = self.cx.sir_type_of(&lhs_ty)?;
        let rhs_sir = self.cx.sir_type_of(&rhs_ty)?;
        if lhs_sir != rhs_sir {
            return Err(EmitError(format!(
                "type mismatch in binary expression: {lhs_sir} vs {rhs_sir}"
            )));
        }

        if lhs_sir == SirType::String {
            return match op {
                Add => {
                    self.line("string.concat");
                    self.pop(1)?;
                    Ok(lhs_ty)
                }
                Eq | Ne => {
                    self.line(if op == Eq { "ref.eq" } else { "ref.ne" });
                    self.pop(1)?;
                    Ok(TypeRef::named("bool"))
                }
                _ => Err(EmitError("unsupported string operation".into())),
            };
        }
        if lhs_sir.is_ref() {
            return match op {
                Eq | Ne => {
                    self.line(if op == Eq { "ref.eq" } else { "ref.ne" });
                    self.pop(1)?;
                    Ok(TypeRef::named("bool"))
                }
                _ => Err(EmitError(
                    "references only support equality comparison".into(),
                )),
            };
        }

        match op {
            Eq | Ne | Lt | Le | Gt | Ge => {
                let suffix = self.cmp_suffix(&lhs_ty)?;
                let relation = match op {
                    Eq => "eq",
                    Ne => "ne",
                    Lt => "lt",
                    Le => "le",
                    Gt => "gt",
                    _ => "ge",
                };
                self.line(&format!("cmp.{relation}.{suffix}"));
                self.pop(1)?;
                Ok(TypeRef::named("bool"))
            }
            Add | Sub | Mul | Div | Mod => {
                let suffix = self.arith_suffix(&lhs_ty)?;
                if op == Mod && matches!(suffix, "f32" | "f64") {
                    return Err(EmitError("modulo requires integer operands".into()));
                }
                let mnemonic = match op {
                    Add => "add",
                    Sub => "sub",
                    Mul => "mul",
                    Div => "div",
                    _ => "mod",
                };
                self.line(&format!("{mnemonic}.{suffix}"));
                self.pop(1)?;
                Ok(lhs_ty)
            }
            BitAnd | BitOr | BitXor | Shl | Shr => {
                let suffix = match self.arith_suffix(&lhs_ty)? {
                    "i32" | "u32" => "i32",
                    "i64" | "u64" => "i64",
                    _ => {
                        return Err(EmitError(
                            "bitwise operators require integer operands".into(),
                        ))
                    }
                };
                let mnemonic = match op {
                    BitAnd => "and",
                    BitOr => "or",
                    BitXor => "xor",
                    Shl => "shl",
                    _ => "shr",
                };
                self.line(&format!("{mnemonic}.{suffix}"));
                self.pop(1)?;
                Ok(lhs_ty)
            }
            LogicalAnd | LogicalOr => unreachable!("handled above"),
        }
    }

    fn emit_field(&mut self, base: &'a Expr, name: &str) -> Result<TypeRef, EmitError> {
        // Enum member access, unless a local shadows the enum name.
        if let ExprKind::Ident(base_name) = &base.kind {
            if self.lookup_local(base_name).is_none()
                && !self.upvalues.contains_key(base_name)
            {
                if let Some(value) = self.cx.enum_value(base_name, name) {
                    self.line(&format!("const.i32 {value}"));
                    self.push(1);
                    return Ok(TypeRef::named(base_name));
                }
            }
        }
        let base_ty = self.emit_expr(base, None)?;
        let Some(layout) = self.cx.layouts.get(base_ty.name.as_str()) else {
            return Err(EmitError(format!(
                "type {} has no field '{name}'",
                base_ty.name
            )));
        };
        let Some((fid, field)) = layout.field(name) else {
            return Err(EmitError(format!(
                "type {} has no field '{name}'",
                base_ty.name
            )));
        };
        let field_ty = field.ty.clone();
        self.line(&format!("ldfld {fid}"));
        Ok(field_ty)
    }

    fn emit_index(&mut self, base: &'a Expr, index: &'a Expr) -> Result<TypeRef, EmitError> {
        let base_ty = self.emit_expr(base, None)?;
        self.emit_expr(index, Some(&TypeRef::named("i32")))?;
        if base_ty.name == "string" && base_ty.dims.is_empty() {
            self.line("string.get.char");
            self.pop(2)?;
            self.push(1);
            return Ok(TypeRef::named("char"));
        }
        let (elem_ty, is_list) = self.element_type(&base_ty)?;
        let suffix = self.elem_suffix(&elem_ty)?;
        let op = if is_list { "list.get" } else { "array.get" };
        self.line(&format!("{op}.{suffix}"));
        self.pop(2)?;
        self.push(1);
        Ok(elem_ty)
    }

    // ---- calls -------------------------------------------------------------

    fn emit_call(&mut self, callee: &'a Expr, args: &'a [Expr]) -> Result<TypeRef, EmitError> {
        if let Some(path) = flatten_path(callee) {
            let head_is_value = self.lookup_local(path[0]).is_some()
                || self.upvalues.contains_key(path[0])
                || self.cx.global_indices.contains_key(path[0]);

            if path.len() == 1 && !head_is_value {
                let name = path[0];
                if (name == "print" || name == "println")
                    && !self.cx.func_ids.contains_key(name)
                {
                    return self.emit_print(name == "println", args);
                }
                if self.cx.func_ids.contains_key(name) {
                    return self.emit_direct_call(name, None, args);
                }
                if let Some(index) = self.cx.bare_externs.get(name).copied() {
                    return self.emit_syscall(index, args);
                }
                return Err(EmitError(format!("unknown function: {name}")));
            }

            if path.len() >= 2 && !head_is_value {
                let qualifier = path[..path.len() - 1].join(".");
                let symbol = path[path.len() - 1];

                if let Some(canonical) = self.cx.reserved_module_of(&qualifier) {
                    let key = (canonical.to_owned(), symbol.to_owned());
                    let index =
                        self.cx.symbol_index.get(&key).copied().ok_or_else(|| {
                            EmitError(format!(
                                "unknown import symbol: {qualifier}.{symbol}"
                            ))
                        })?;
                    return self.emit_syscall(index, args);
                }
                if let Some(emit_name) =
                    self.cx.module_funcs.get(&format!("{qualifier}.{symbol}"))
                {
                    let emit_name = emit_name.clone();
                    return self.emit_direct_call(&emit_name, None, args);
                }
                if self
                    .cx
                    .symbol_index
                    .contains_key(&(qualifier.clone(), symbol.to_owned()))
                {
                    return self.emit_extern_call(&qualifier, symbol, args);
                }
            }
        }

        // Method call on an arbitrary base expression.
        if let ExprKind::Field { base, name } = &callee.kind {
            let head_is_value = match flatten_path(callee) {
                Some(path) => {
                    self.lookup_local(path[0]).is_some()
                        || self.upvalues.contains_key(path[0])
                        || self.cx.global_indices.contains_key(path[0])
                }
                None => true,
            };
            if head_is_value {
                return self.emit_method_call(base, name, args);
            }
        }

        self.emit_indirect_call(callee, args)
    }

    fn emit_direct_call(
        &mut self,
        emit_name: &str,
        self_arg: Option<&'a Expr>,
        args: &'a [Expr],
    ) -> Result<TypeRef, EmitError> {
        let fid = self.cx.func_ids[emit_name];
        let params = self.cx.func_params[emit_name].clone();
        let ret = self.cx.func_returns[emit_name].clone();
        let explicit = &params[usize::from(self_arg.is_some())..];
        if explicit.len() != args.len() {
            return Err(EmitError(format!(
                "function '{emit_name}' expects {} argument(s), got {}",
                explicit.len(),
                args.len()
            )));
        }
        if let Some(self_arg) = self_arg {
            self.emit_expr(self_arg, None)?;
        }
        for (arg, param) in args.iter().zip(explicit) {
            let param = param.clone();
            self.emit_expr(arg, Some(&param))?;
        }
        let argc = params.len();
        self.line(&format!("call {fid} {argc}"));
        self.pop(argc as u32)?;
        if !ret.is_void() {
            self.push(1);
        }
        Ok(ret)
    }

    fn emit_method_call(
        &mut self,
        base: &'a Expr,
        method: &str,
        args: &'a [Expr],
    ) -> Result<TypeRef, EmitError> {
        // The base may itself be a closure-typed value being invoked as a
        // pseudo-method; only artifact types have methods.
        let base_ty = self
            .infer_expr_type(base)
            .ok_or_else(|| EmitError(format!("unknown method: {method}")))?;
        let emit_name = format!("{}__{}", base_ty.name, method);
        if !self.cx.func_ids.contains_key(emit_name.as_str()) {
            return Err(EmitError(format!(
                "type {} has no method '{method}'",
                base_ty.name
            )));
        }
        self.emit_direct_call(&emit_name, Some(base), args)
    }

    fn emit_syscall(&mut self, index: usize, args: &'a [Expr]) -> Result<TypeRef, EmitError> {
        let import = self.cx.imports[index].clone();
        if import.params.len() != args.len() {
            return Err(EmitError(format!(
                "import {}.{} expects {} argument(s), got {}",
                import.module,
                import.symbol,
                import.params.len(),
                args.len()
            )));
        }
        for (arg, param) in args.iter().zip(&import.params) {
            self.emit_expr(arg, Some(param))?;
        }
        self.line(&format!("syscall {index}"));
        self.pop(args.len() as u32)?;
        if !import.ret.is_void() {
            self.push(1);
        }
        Ok(import.ret)
    }

    /// Call of a user extern. When a dynamic companion and a manifest
    /// library handle are available, the address is resolved through
    /// `core.dl.sym` and the call routes through the companion; otherwise
    /// the extern's own import is invoked directly.
    fn emit_extern_call(
        &mut self,
        module: &str,
        symbol: &str,
        args: &'a [Expr],
    ) -> Result<TypeRef, EmitError> {
        let key = (module.to_owned(), symbol.to_owned());
        let direct_index = self.cx.symbol_index[&key];
        let companion = self.cx.dl_companions.get(&key).copied();
        let manifest_global = self.cx.manifest_global_for(module);
        let sym_import = self
            .cx
            .symbol_index
            .get(&("core.dl".to_owned(), "sym".to_owned()))
            .copied();

        let (Some(companion), Some(global), Some(sym_import)) =
            (companion, manifest_global, sym_import)
        else {
            return self.emit_syscall(direct_index, args);
        };

        let import = self.cx.imports[companion].clone();
        // Address first: lib handle out of the manifest global, then the
        // symbol lookup.
        self.line(&format!("ldglob {global}"));
        self.push(1);
        let name_id = self.cx.intern_string(symbol);
        self.line(&format!("const.string {name_id}"));
        self.push(1);
        self.line(&format!("syscall {sym_import}"));
        self.pop(2)?;
        self.push(1);

        let scalar_params = &import.params[1..];
        if scalar_params.len() != args.len() {
            return Err(EmitError(format!(
                "extern {module}.{symbol} expects {} argument(s), got {}",
                scalar_params.len(),
                args.len()
            )));
        }
        for (arg, param) in args.iter().zip(scalar_params) {
            let param = param.clone();
            self.emit_expr(arg, Some(&param))?;
        }
        self.line(&format!("syscall {companion}"));
        self.pop(args.len() as u32 + 1)?;
        if !import.ret.is_void() {
            self.push(1);
        }
        Ok(import.ret)
    }

    fn emit_indirect_call(
        &mut self,
        callee: &'a Expr,
        args: &'a [Expr],
    ) -> Result<TypeRef, EmitError> {
        let callee_shape = self
            .infer_expr_type(callee)
            .and_then(|ty| ty.proc.map(|p| *p));
        for (index, arg) in args.iter().enumerate() {
            let expected = callee_shape
                .as_ref()
                .and_then(|shape| shape.params.get(index))
                .cloned();
            self.emit_expr(arg, expected.as_ref())?;
        }
        let callee_ty = self.emit_expr(callee, None)?;
        let Some(shape) = callee_ty.proc.as_deref() else {
            return Err(EmitError("call target is not callable".into()));
        };
        if shape.params.len() != args.len() {
            return Err(EmitError(format!(
                "closure expects {} argument(s), got {}",
                shape.params.len(),
                args.len()
            )));
        }
        let sig_id = self.cx.intern_proc_sig(&shape.params, &shape.ret)?;
        let ret = shape.ret.clone();
        self.line("callcheck");
        self.line(&format!("call.indirect {sig_id} {}", args.len()));
        self.pop(args.len() as u32 + 1)?;
        if !ret.is_void() {
            self.push(1);
        }
        Ok(ret)
    }

    fn emit_print(&mut self, newline: bool, args: &'a [Expr]) -> Result<TypeRef, EmitError> {
        let Some(Expr { kind: ExprKind::StrLit(fmt), .. }) = args.first() else {
            return Err(EmitError("print expects a literal format string".into()));
        };
        let mut segments = split_format_segments(fmt)?;
        if segments.len() - 1 != args.len() - 1 {
            return Err(EmitError(format!(
                "format string expects {} argument(s), got {}",
                segments.len() - 1,
                args.len() - 1
            )));
        }
        if newline {
            if let Some(last) = segments.last_mut() {
                last.push('\n');
            }
        }
        for (index, segment) in segments.iter().enumerate() {
            if !segment.is_empty() {
                let id = self.cx.intern_string(segment);
                self.line(&format!("const.string {id}"));
                self.push(1);
                self.line("intrinsic 0x0050");
                self.pop(1)?;
            }
            if index + 1 < args.len() {
                let ty = self.emit_expr(&args[index + 1], None)?;
                let tag = self.print_tag_of(&ty)?;
                self.line(&format!("const.u32 {tag}"));
                self.push(1);
                self.line("intrinsic 0x0060");
                self.pop(2)?;
            }
        }
        Ok(TypeRef::void())
    }

    fn print_tag_of(&self, ty: &TypeRef) -> Result<u32, EmitError> {
        use sir_asm::print_tag as tag;
        let sir = self.cx.sir_type_of(ty)?;
        let tag = match sir {
            SirType::I8 => tag::I8,
            SirType::I16 => tag::I16,
            SirType::I32 => tag::I32,
            SirType::I64 => tag::I64,
            SirType::U8 => tag::U8,
            SirType::U16 => tag::U16,
            SirType::U32 => tag::U32,
            SirType::U64 => tag::U64,
            SirType::F32 => tag::F32,
            SirType::F64 => tag::F64,
            SirType::Bool => tag::BOOL,
            SirType::Char => tag::CHAR,
            SirType::String => tag::STRING,
            _ => {
                return Err(EmitError(format!(
                    "cannot print a value of type {}",
                    ty.name
                )))
            }
        };
        Ok(tag)
    }

    // ---- literals over containers -----------------------------------------

    fn emit_array_literal(
        &mut self,
        items: &'a [Expr],
        expected: Option<&TypeRef>,
    ) -> Result<TypeRef, EmitError> {
        let elem_ty = match expected {
            Some(expected) if !expected.dims.is_empty() => self.element_type(expected)?.0,
            _ => self.infer_literal_elem(items)?,
        };
        let elem_sir = self.cx.sir_type_of(&elem_ty)?;
        let type_id = self.cx.runtime_type_id(&elem_sir);
        let suffix = self.elem_suffix(&elem_ty)?;
        self.line(&format!("newarray {type_id} {}", items.len()));
        self.push(1);
        for (index, item) in items.iter().enumerate() {
            self.line("dup");
            self.push(1);
            self.emit_expr(item, Some(&elem_ty))?;
            self.line(&format!("const.i32 {index}"));
            self.push(1);
            self.line("swap");
            self.line(&format!("array.set.{suffix}"));
            self.pop(3)?;
        }
        Ok(match expected {
            Some(expected) if !expected.dims.is_empty() => expected.clone(),
            _ => TypeRef::array_of(elem_ty, items.len() as u32),
        })
    }

    fn emit_list_literal(
        &mut self,
        items: &'a [Expr],
        expected: Option<&TypeRef>,
    ) -> Result<TypeRef, EmitError> {
        let elem_ty = match expected {
            Some(expected) if !expected.dims.is_empty() => self.element_type(expected)?.0,
            _ => self.infer_literal_elem(items)?,
        };
        let elem_sir = self.cx.sir_type_of(&elem_ty)?;
        let type_id = self.cx.runtime_type_id(&elem_sir);
        let suffix = self.elem_suffix(&elem_ty)?;
        self.line(&format!("newlist {type_id} {}", items.len()));
        self.push(1);
        for item in items {
            self.line("dup");
            self.push(1);
            self.emit_expr(item, Some(&elem_ty))?;
            self.line(&format!("list.push.{suffix}"));
            self.pop(2)?;
        }
        Ok(match expected {
            Some(expected) if !expected.dims.is_empty() => expected.clone(),
            _ => TypeRef::list_of(elem_ty),
        })
    }

    fn infer_literal_elem(&self, items: &'a [Expr]) -> Result<TypeRef, EmitError> {
        let Some(first) = items.first() else {
            return Err(EmitError(
                "empty container literal requires a declared element type".into(),
            ));
        };
        self.infer_expr_type(first).ok_or_else(|| {
            EmitError("container literal requires a declared element type".into())
        })
    }

    fn emit_artifact_literal(
        &mut self,
        name: &str,
        args: &'a [Expr],
    ) -> Result<TypeRef, EmitError> {
        let Some(layout) = self.cx.layouts.get(name).cloned() else {
            return Err(EmitError(format!("unknown type: {name}")));
        };
        if layout.fields.len() != args.len() {
            return Err(EmitError(format!(
                "artifact literal for {name} expects {} values",
                layout.fields.len()
            )));
        }
        self.line(&format!("newobj {}", layout.type_id));
        self.push(1);
        for (index, (arg, field)) in args.iter().zip(&layout.fields).enumerate() {
            self.line("dup");
            self.push(1);
            self.emit_expr(arg, Some(&field.ty))?;
            self.line(&format!(
                "stfld {}",
                layout.field_id_base + index as u32
            ));
            self.pop(2)?;
        }
        Ok(TypeRef::named(name))
    }

    // ---- lambdas -----------------------------------------------------------

    /// Emit a closure construction. Captured scalars are boxed into
    /// one-element arrays; captured references (including boxed cells of
    /// the enclosing lambda) are passed as upvalues directly, so nested
    /// closures share cells.
    fn emit_lambda_value(&mut self, expr: &'a Expr) -> Result<TypeRef, EmitError> {
        let ExprKind::Lambda { params, ret, body } = &expr.kind else {
            unreachable!("emit_lambda_value only sees lambda expressions");
        };
        // Resolve the lifted spec by body identity; creation order can
        // diverge from discovery order inside immediately-invoked lambdas.
        let body_ptr = body.as_slice() as *const [Stmt];
        let index = self
            .cx
            .lambdas
            .iter()
            .position(|spec| std::ptr::eq(spec.body as *const [Stmt], body_ptr))
            .ok_or_else(|| EmitError("lambda was not collected by the prepass".into()))?;
        let emit_name = self.cx.lambdas[index].emit_name.clone();
        self.cx.next_lambda += 1;

        let mut bound: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let mut free = Vec::new();
        free_vars_stmts(body, &mut bound, &mut free);

        let mut captures = Vec::new();
        for name in &free {
            if let Some(local) = self.lookup_local(name).cloned() {
                let sir = self.cx.sir_type_of(&local.ty)?;
                captures.push((
                    Capture {
                        name: name.clone(),
                        ty: local.ty.clone(),
                        boxed: !sir.is_ref(),
                    },
                    CaptureSource::Local(local.index),
                ));
            } else if let Some(upvalue) = self.upvalues.get(name).cloned() {
                captures.push((
                    Capture {
                        name: name.clone(),
                        ty: upvalue.ty.clone(),
                        boxed: upvalue.boxed,
                    },
                    CaptureSource::Upvalue(upvalue.index),
                ));
            }
            // Globals and function names resolve directly in the lifted
            // body and are not captured.
        }

        for (capture, source) in &captures {
            match source {
                CaptureSource::Local(local_index) => {
                    if capture.boxed {
                        let sir = self.cx.sir_type_of(&capture.ty)?;
                        let type_id = self.cx.runtime_type_id(&sir);
                        let suffix = self.elem_suffix(&capture.ty)?;
                        self.line(&format!("newarray {type_id} 1"));
                        self.push(1);
                        self.line("dup");
                        self.push(1);
                        self.line("const.i32 0");
                        self.push(1);
                        self.line(&format!("ldloc {local_index}"));
                        self.push(1);
                        self.line(&format!("array.set.{suffix}"));
                        self.pop(3)?;
                    } else {
                        self.line(&format!("ldloc {local_index}"));
                        self.push(1);
                    }
                }
                CaptureSource::Upvalue(upvalue_index) => {
                    self.line(&format!("ldupv {upvalue_index}"));
                    self.push(1);
                }
            }
        }

        let count = captures.len();
        self.cx.lambdas[index].captures =
            captures.into_iter().map(|(capture, _)| capture).collect();

        let fid = self.cx.func_ids[emit_name.as_str()];
        self.line(&format!("newclosure {fid} {count}"));
        self.pop(count as u32)?;
        self.push(1);

        Ok(TypeRef::proc_of(
            params.iter().map(|p| p.ty.clone()).collect(),
            ret.clone(),
        ))
    }

    // ---- inference and suffixes -------------------------------------------

    /// Lightweight type inference for contexts that need a type before
    /// anything is emitted: indirect-call callees, method receivers and
    /// container literal elements.
    pub(crate) fn infer_expr_type(&self, expr: &Expr) -> Option<TypeRef> {
        match &expr.kind {
            ExprKind::IntLit(_) => Some(TypeRef::named("i32")),
            ExprKind::FloatLit(_) => Some(TypeRef::named("f64")),
            ExprKind::BoolLit(_) => Some(TypeRef::named("bool")),
            ExprKind::CharLit(_) => Some(TypeRef::named("char")),
            ExprKind::StrLit(_) => Some(TypeRef::named("string")),
            ExprKind::Ident(name) => {
                if let Some(local) = self.lookup_local(name) {
                    return Some(local.ty.clone());
                }
                if let Some(upvalue) = self.upvalues.get(name) {
                    return Some(upvalue.ty.clone());
                }
                if self.cx.global_indices.contains_key(name) {
                    return Some(self.cx.global_types[name].clone());
                }
                if self.cx.func_ids.contains_key(name) {
                    return Some(TypeRef::proc_of(
                        self.cx.func_params[name].clone(),
                        self.cx.func_returns[name].clone(),
                    ));
                }
                None
            }
            ExprKind::Field { base, name } => {
                let base_ty = self.infer_expr_type(base)?;
                let layout = self.cx.layouts.get(base_ty.name.as_str())?;
                let (_, field) = layout.field(name)?;
                Some(field.ty.clone())
            }
            ExprKind::Index { base, .. } => {
                let base_ty = self.infer_expr_type(base)?;
                if base_ty.name == "string" && base_ty.dims.is_empty() {
                    return Some(TypeRef::named("char"));
                }
                self.element_type(&base_ty).ok().map(|(elem, _)| elem)
            }
            ExprKind::ArtifactLit { name, .. } => Some(TypeRef::named(name)),
            ExprKind::Lambda { params, ret, .. } => Some(TypeRef::proc_of(
                params.iter().map(|p| p.ty.clone()).collect(),
                ret.clone(),
            )),
            _ => None,
        }
    }

    pub(crate) fn arith_suffix(&self, ty: &TypeRef) -> Result<&'static str, EmitError> {
        let sir = self.cx.sir_type_of(ty)?;
        let suffix = match sir {
            SirType::I8 | SirType::I16 | SirType::I32 => "i32",
            SirType::U8 | SirType::U16 | SirType::U32 => "u32",
            SirType::I64 => "i64",
            SirType::U64 => "u64",
            SirType::F32 => "f32",
            SirType::F64 => "f64",
            _ => {
                return Err(EmitError(format!(
                    "type {} is not arithmetic",
                    ty.name
                )))
            }
        };
        Ok(suffix)
    }

    fn cmp_suffix(&self, ty: &TypeRef) -> Result<&'static str, EmitError> {
        let sir = self.cx.sir_type_of(ty)?;
        let suffix = match sir {
            SirType::Bool | SirType::Char | SirType::I8 | SirType::I16 | SirType::I32 => {
                "i32"
            }
            SirType::U8 | SirType::U16 | SirType::U32 => "u32",
            SirType::I64 => "i64",
            SirType::U64 => "u64",
            SirType::F32 => "f32",
            SirType::F64 => "f64",
            _ => {
                return Err(EmitError(format!(
                    "type {} is not comparable",
                    ty.name
                )))
            }
        };
        Ok(suffix)
    }
}

enum CaptureSource {
    Local(u16),
    Upvalue(u16),
}

/// Free-variable walk over a lambda body. `bound` carries the lambda's
/// parameters and grows with `let` declarations; nested lambda bodies
/// contribute their own free names.
fn free_vars_stmts(stmts: &[Stmt], bound: &mut Vec<String>, free: &mut Vec<String>) {
    let depth = bound.len();
    for stmt in stmts {
        match stmt {
            Stmt::Let(var) => {
                if let Some(init) = &var.init {
                    free_vars_expr(init, bound, free);
                }
                bound.push(var.name.clone());
            }
            Stmt::Assign { target, value, .. } => {
                free_vars_expr(target, bound, free);
                free_vars_expr(value, bound, free);
            }
            Stmt::If { cond, then_body, else_body, .. } => {
                free_vars_expr(cond, bound, free);
                free_vars_stmts(then_body, bound, free);
                free_vars_stmts(else_body, bound, free);
            }
            Stmt::While { cond, body, .. } => {
                free_vars_expr(cond, bound, free);
                free_vars_stmts(body, bound, free);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    free_vars_expr(value, bound, free);
                }
            }
            Stmt::Expr(expr) => free_vars_expr(expr, bound, free),
            Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }
    bound.truncate(depth);
}

fn free_vars_expr(expr: &Expr, bound: &mut Vec<String>, free: &mut Vec<String>) {
    match &expr.kind {
        ExprKind::Ident(name) => {
            if !bound.iter().any(|b| b == name) && !free.iter().any(|f| f == name) {
                free.push(name.clone());
            }
        }
        ExprKind::Unary { operand, .. } => free_vars_expr(operand, bound, free),
        ExprKind::Binary { lhs, rhs, .. } => {
            free_vars_expr(lhs, bound, free);
            free_vars_expr(rhs, bound, free);
        }
        ExprKind::Call { callee, args } => {
            free_vars_expr(callee, bound, free);
            for arg in args {
                free_vars_expr(arg, bound, free);
            }
        }
        ExprKind::Field { base, .. } => free_vars_expr(base, bound, free),
        ExprKind::Index { base, index } => {
            free_vars_expr(base, bound, free);
            free_vars_expr(index, bound, free);
        }
        ExprKind::ArrayLit(items)
        | ExprKind::ListLit(items) => {
            for item in items {
                free_vars_expr(item, bound, free);
            }
        }
        ExprKind::ArtifactLit { args, .. } => {
            for arg in args {
                free_vars_expr(arg, bound, free);
            }
        }
        ExprKind::Lambda { params, body, .. } => {
            let depth = bound.len();
            bound.extend(params.iter().map(|p| p.name.clone()));
            free_vars_stmts(body, bound, free);
            bound.truncate(depth);
        }
        _ => {}
    }
}
