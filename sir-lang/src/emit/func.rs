//! Per-function emission: locals and scopes, labels, statements and the
//! stack-height ledger.
//!
//! Every emitted opcode adjusts the tracked operand-stack depth by its net
//! effect. The depth must be zero at every statement boundary and at
//! function end; `ret` consumes the declared return arity. Violations are
//! fatal emission errors, not warnings.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ast::*;
use crate::emit::context::{EmitCtx, LambdaSpec};
use crate::emit::EmitError;

#[derive(Clone, Debug)]
pub(crate) struct LocalVar {
    pub index: u16,
    pub ty: TypeRef,
    pub mutable: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct UpvalueVar {
    pub index: u16,
    pub ty: TypeRef,
    pub boxed: bool,
}

pub(crate) struct FuncEmitter<'a, 'c> {
    pub cx: &'c mut EmitCtx<'a>,
    pub body: String,
    pub depth: u32,
    pub max_depth: u32,
    next_local: u16,
    scopes: Vec<HashMap<String, LocalVar>>,
    pub upvalues: HashMap<String, UpvalueVar>,
    ret: TypeRef,
    emit_name: String,
    next_label: u32,
    loop_labels: Vec<(String, String)>,
    ended_with_ret: bool,
}

impl<'a, 'c> FuncEmitter<'a, 'c> {
    /// Emit a declared or script function.
    pub fn emit_item(
        cx: &'c mut EmitCtx<'a>,
        emit_name: &str,
        params: &[Param],
        ret: &TypeRef,
        body: &'a [Stmt],
        is_script: bool,
    ) -> Result<String, EmitError> {
        let mut emitter = FuncEmitter::new(cx, emit_name, ret.clone());
        for param in params {
            emitter.declare_local(&param.name, param.ty.clone(), true)?;
        }
        for stmt in body {
            emitter.emit_stmt(stmt)?;
        }
        if is_script {
            emitter.line("const.i32 0");
            emitter.push(1);
            emitter.emit_ret()?;
        } else if !emitter.ended_with_ret {
            if ret.is_void() {
                emitter.emit_ret()?;
            } else {
                return Err(EmitError(format!(
                    "function '{emit_name}' is missing a return"
                )));
            }
        }
        emitter.finish()
    }

    /// Emit a lifted lambda with its recorded captures bound as upvalues.
    pub fn emit_lambda(
        cx: &'c mut EmitCtx<'a>,
        lambda: &LambdaSpec<'a>,
    ) -> Result<String, EmitError> {
        let mut emitter = FuncEmitter::new(cx, &lambda.emit_name, lambda.ret.clone());
        for (index, capture) in lambda.captures.iter().enumerate() {
            emitter.upvalues.insert(
                capture.name.clone(),
                UpvalueVar {
                    index: index as u16,
                    ty: capture.ty.clone(),
                    boxed: capture.boxed,
                },
            );
        }
        for param in lambda.params {
            emitter.declare_local(&param.name, param.ty.clone(), true)?;
        }
        for stmt in lambda.body {
            emitter.emit_stmt(stmt)?;
        }
        if !emitter.ended_with_ret {
            if lambda.ret.is_void() {
                emitter.emit_ret()?;
            } else {
                return Err(EmitError(format!(
                    "function '{}' is missing a return",
                    lambda.emit_name
                )));
            }
        }
        emitter.finish()
    }

    fn new(cx: &'c mut EmitCtx<'a>, emit_name: &str, ret: TypeRef) -> Self {
        FuncEmitter {
            cx,
            body: String::new(),
            depth: 0,
            max_depth: 0,
            next_local: 0,
            scopes: vec![HashMap::new()],
            upvalues: HashMap::new(),
            ret,
            emit_name: emit_name.into(),
            next_label: 0,
            loop_labels: Vec::new(),
            ended_with_ret: false,
        }
    }

    fn finish(self) -> Result<String, EmitError> {
        if self.depth != 0 {
            return Err(EmitError(format!(
                "stack height mismatch at end of function '{}'",
                self.emit_name
            )));
        }
        let sig = self.cx.func_ids[self.emit_name.as_str()];
        Ok(format!(
            "func {} locals={} stack={} sig={}\n  enter {}\n{}end\n",
            self.emit_name, self.next_local, self.max_depth, sig, self.next_local,
            self.body
        ))
    }

    // ---- ledger and text primitives ---------------------------------------

    pub fn line(&mut self, text: &str) {
        let _ = writeln!(self.body, "  {text}");
    }

    pub fn label_def(&mut self, label: &str) {
        let _ = writeln!(self.body, "{label}:");
    }

    pub fn fresh_label(&mut self) -> String {
        let label = format!("L{}", self.next_label);
        self.next_label += 1;
        label
    }

    pub fn push(&mut self, count: u32) {
        self.depth += count;
        self.max_depth = self.max_depth.max(self.depth);
    }

    pub fn pop(&mut self, count: u32) -> Result<(), EmitError> {
        if self.depth < count {
            return Err(EmitError(format!(
                "operand stack underflow while emitting function '{}'",
                self.emit_name
            )));
        }
        self.depth -= count;
        Ok(())
    }

    // ---- scopes ------------------------------------------------------------

    pub fn declare_local(
        &mut self,
        name: &str,
        ty: TypeRef,
        mutable: bool,
    ) -> Result<u16, EmitError> {
        let index = self.next_local;
        self.next_local = self.next_local.checked_add(1).ok_or_else(|| {
            EmitError(format!("too many locals in function '{}'", self.emit_name))
        })?;
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_owned(), LocalVar { index, ty, mutable });
        Ok(index)
    }

    pub fn lookup_local(&self, name: &str) -> Option<&LocalVar> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    // ---- statements --------------------------------------------------------

    fn emit_stmt(&mut self, stmt: &'a Stmt) -> Result<(), EmitError> {
        self.ended_with_ret = false;
        match stmt {
            Stmt::Let(var) => self.emit_let(var)?,
            Stmt::Assign { target, value, .. } => self.emit_assign(target, value)?,
            Stmt::If { cond, then_body, else_body, .. } => {
                self.emit_if(cond, then_body, else_body)?
            }
            Stmt::While { cond, body, .. } => self.emit_while(cond, body)?,
            Stmt::Return { value, .. } => self.emit_return(value.as_ref())?,
            Stmt::Expr(expr) => {
                let ty = self.emit_expr(expr, None)?;
                if !ty.is_void() {
                    self.line("pop");
                    self.pop(1)?;
                }
            }
            Stmt::Break(_) => {
                let Some((_, break_label)) = self.loop_labels.last().cloned() else {
                    return Err(EmitError("break outside of a loop".into()));
                };
                self.line(&format!("jmp {break_label}"));
            }
            Stmt::Continue(_) => {
                let Some((continue_label, _)) = self.loop_labels.last().cloned() else {
                    return Err(EmitError("continue outside of a loop".into()));
                };
                self.line(&format!("jmp {continue_label}"));
            }
        }
        if self.depth != 0 {
            return Err(EmitError(format!(
                "stack height mismatch after statement in function '{}'",
                self.emit_name
            )));
        }
        Ok(())
    }

    fn emit_let(&mut self, var: &'a VarDecl) -> Result<(), EmitError> {
        let declared = (!var.ty.name.is_empty() || var.ty.proc.is_some())
            .then(|| var.ty.clone());
        match (&var.init, declared) {
            (Some(init), declared) => {
                let produced = self.emit_expr(init, declared.as_ref())?;
                let ty = declared.unwrap_or(produced);
                let index = self.declare_local(
                    &var.name,
                    ty,
                    var.mutability == Mutability::Mutable,
                )?;
                self.line(&format!("stloc {index}"));
                self.pop(1)?;
            }
            (None, Some(ty)) => {
                // Slot is zeroed by `enter`; nothing to store.
                self.declare_local(&var.name, ty, var.mutability == Mutability::Mutable)?;
            }
            (None, None) => {
                return Err(EmitError(format!(
                    "variable '{}' needs a type or an initializer",
                    var.name
                )));
            }
        }
        Ok(())
    }

    fn emit_if(
        &mut self,
        cond: &'a Expr,
        then_body: &'a [Stmt],
        else_body: &'a [Stmt],
    ) -> Result<(), EmitError> {
        let else_label = self.fresh_label();
        let end_label = self.fresh_label();
        self.emit_expr(cond, Some(&TypeRef::named("bool")))?;
        self.line(&format!("jmp.false {else_label}"));
        self.pop(1)?;

        self.scopes.push(HashMap::new());
        for stmt in then_body {
            self.emit_stmt(stmt)?;
        }
        self.scopes.pop();
        let then_returns = self.ended_with_ret;

        if else_body.is_empty() {
            self.label_def(&else_label);
            self.ended_with_ret = false;
        } else {
            self.line(&format!("jmp {end_label}"));
            self.label_def(&else_label);
            self.scopes.push(HashMap::new());
            for stmt in else_body {
                self.emit_stmt(stmt)?;
            }
            self.scopes.pop();
            self.label_def(&end_label);
            // Both arms returning makes the conditional itself terminal.
            self.ended_with_ret = then_returns && self.ended_with_ret;
        }
        Ok(())
    }

    fn emit_while(&mut self, cond: &'a Expr, body: &'a [Stmt]) -> Result<(), EmitError> {
        let start_label = self.fresh_label();
        let end_label = self.fresh_label();
        self.label_def(&start_label);
        self.emit_expr(cond, Some(&TypeRef::named("bool")))?;
        self.line(&format!("jmp.false {end_label}"));
        self.pop(1)?;

        self.loop_labels.push((start_label.clone(), end_label.clone()));
        self.scopes.push(HashMap::new());
        for stmt in body {
            self.emit_stmt(stmt)?;
        }
        self.scopes.pop();
        self.loop_labels.pop();

        self.line(&format!("jmp {start_label}"));
        self.label_def(&end_label);
        Ok(())
    }

    fn emit_return(&mut self, value: Option<&'a Expr>) -> Result<(), EmitError> {
        match (value, self.ret.is_void()) {
            (Some(_), true) => {
                return Err(EmitError(format!(
                    "function '{}' returns void but a value was returned",
                    self.emit_name
                )))
            }
            (None, false) => {
                return Err(EmitError(format!(
                    "function '{}' must return a value",
                    self.emit_name
                )))
            }
            (Some(value), false) => {
                let expected = self.ret.clone();
                self.emit_expr(value, Some(&expected))?;
            }
            (None, true) => {}
        }
        self.emit_ret()
    }

    fn emit_ret(&mut self) -> Result<(), EmitError> {
        let arity = u32::from(!self.ret.is_void());
        self.line("ret");
        self.pop(arity)?;
        self.ended_with_ret = true;
        Ok(())
    }

    fn emit_assign(&mut self, target: &'a Expr, value: &'a Expr) -> Result<(), EmitError> {
        match &target.kind {
            ExprKind::Ident(name) => {
                if let Some(local) = self.lookup_local(name).cloned() {
                    if !local.mutable {
                        return Err(EmitError(format!(
                            "cannot assign to immutable variable '{name}'"
                        )));
                    }
                    self.emit_expr(value, Some(&local.ty))?;
                    self.line(&format!("stloc {}", local.index));
                    self.pop(1)?;
                    return Ok(());
                }
                if let Some(upvalue) = self.upvalues.get(name).cloned() {
                    return self.emit_upvalue_store(&upvalue, value);
                }
                if let Some(index) = self.cx.global_indices.get(name).copied() {
                    if self.cx.global_mutability.get(name)
                        == Some(&Mutability::Immutable)
                    {
                        return Err(EmitError(format!(
                            "cannot assign to immutable variable '{name}'"
                        )));
                    }
                    let ty = self.cx.global_types[name].clone();
                    self.emit_expr(value, Some(&ty))?;
                    self.line(&format!("stglob {index}"));
                    self.pop(1)?;
                    return Ok(());
                }
                Err(EmitError(format!("unknown identifier: {name}")))
            }
            ExprKind::Field { base, name } => {
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
                self.emit_expr(value, Some(&field_ty))?;
                self.line(&format!("stfld {fid}"));
                self.pop(2)?;
                Ok(())
            }
            ExprKind::Index { base, index } => {
                let base_ty = self.emit_expr(base, None)?;
                if base_ty.dims.is_empty() && base_ty.name == "string" {
                    return Err(EmitError("strings are immutable".into()));
                }
                self.emit_expr(index, Some(&TypeRef::named("i32")))?;
                let (elem_ty, is_list) = self.element_type(&base_ty)?;
                self.emit_expr(value, Some(&elem_ty))?;
                let suffix = self.elem_suffix(&elem_ty)?;
                let op = if is_list { "list.set" } else { "array.set" };
                self.line(&format!("{op}.{suffix}"));
                self.pop(3)?;
                Ok(())
            }
            _ => Err(EmitError("invalid assignment target".into())),
        }
    }

    /// Store into a captured variable. Boxed scalars write through their
    /// cell; reference captures replace the upvalue slot.
    fn emit_upvalue_store(
        &mut self,
        upvalue: &UpvalueVar,
        value: &'a Expr,
    ) -> Result<(), EmitError> {
        if upvalue.boxed {
            self.line(&format!("ldupv {}", upvalue.index));
            self.push(1);
            self.line("const.i32 0");
            self.push(1);
            let ty = upvalue.ty.clone();
            self.emit_expr(value, Some(&ty))?;
            let suffix = self.elem_suffix(&upvalue.ty)?;
            self.line(&format!("array.set.{suffix}"));
            self.pop(3)?;
        } else {
            let ty = upvalue.ty.clone();
            self.emit_expr(value, Some(&ty))?;
            self.line(&format!("stupv {}", upvalue.index));
            self.pop(1)?;
        }
        Ok(())
    }

    // ---- shared type helpers ----------------------------------------------

    /// Element type of an indexed container, plus whether it is a list.
    pub fn element_type(&self, base: &TypeRef) -> Result<(TypeRef, bool), EmitError> {
        let Some(dim) = base.dims.first() else {
            if base.name == "string" && base.proc.is_none() {
                return Ok((TypeRef::named("char"), false));
            }
            return Err(EmitError(format!("type {} is not indexable", base.name)));
        };
        let is_list = matches!(dim, TypeDim::List);
        let mut elem = base.clone();
        elem.dims.remove(0);
        Ok((elem, is_list))
    }

    /// Typed-opcode suffix for a container element or boxed capture.
    pub fn elem_suffix(&self, ty: &TypeRef) -> Result<&'static str, EmitError> {
        let sir = self.cx.sir_type_of(ty)?;
        let kind = sir.elem_kind().ok_or_else(|| {
            EmitError(format!("type {} has no element representation", ty.name))
        })?;
        Ok(kind.suffix())
    }
}
