//! Lower a validated program tree into a textual SIR module.
//!
//! Section order is `types`, `sigs`, `consts`, `globals`, `imports`,
//! the function blocks, then `entry <name>`. Emission is transactional:
//! any error leaves the output undefined and returns a single diagnostic.

mod context;
mod expr;
mod func;

use std::fmt::Write as _;

use itertools::Itertools;

use crate::ast::*;
use crate::validate::validate_program;

pub(crate) use context::{
    collect_lambdas, compute_layouts, escape_string_literal, split_format_segments,
    Capture, EmitCtx, ImportItem, LambdaSpec,
};
pub use context::parse_integer_literal;
pub(crate) use func::FuncEmitter;

/// An unsupported construct or inconsistency found during emission.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct EmitError(pub String);

impl From<crate::validate::ValidateError> for EmitError {
    fn from(err: crate::validate::ValidateError) -> Self {
        EmitError(err.0)
    }
}

/// What a function item lowers from.
#[derive(Clone, Copy)]
enum ItemBody<'a> {
    Decl(&'a FuncDecl),
    Script(&'a [Stmt]),
    GlobalInit,
}

/// One function to emit, declared or synthesized.
#[derive(Clone)]
pub(crate) struct FuncItem<'a> {
    body: ItemBody<'a>,
    pub emit_name: String,
    pub params: Vec<Param>,
    pub ret: TypeRef,
}

impl<'a> FuncItem<'a> {
    fn of_decl(decl: &'a FuncDecl, emit_name: String, self_type: Option<TypeRef>) -> Self {
        let mut params = Vec::with_capacity(decl.params.len() + 1);
        if let Some(self_ty) = &self_type {
            params.push(Param::new("self", self_ty.clone()));
        }
        params.extend(decl.params.iter().cloned());
        FuncItem {
            body: ItemBody::Decl(decl),
            emit_name,
            params,
            ret: decl.ret.clone(),
        }
    }

    fn source_name(&self) -> &str {
        match self.body {
            ItemBody::Decl(decl) => &decl.name,
            ItemBody::Script(_) => "__script_entry",
            ItemBody::GlobalInit => "__global_init",
        }
    }
}

/// Validate and lower a program; the one-call entry point.
pub fn emit_sir(program: &Program) -> Result<String, EmitError> {
    validate_program(program)?;
    emit_program(program)
}

/// Lower an already-validated program.
pub fn emit_program(program: &Program) -> Result<String, EmitError> {
    let mut cx = EmitCtx::default();
    let mut items: Vec<FuncItem<'_>> = Vec::new();
    let mut externs: Vec<&ExternDecl> = Vec::new();
    let mut globals: Vec<&VarDecl> = Vec::new();
    let mut enum_decls: Vec<&EnumDecl> = Vec::new();

    for decl in &program.decls {
        match decl {
            Decl::Import(import) => {
                let canonical = sir_asm::reserved::canonicalize_import_path(&import.path)
                    .ok_or_else(|| {
                        EmitError(format!("unsupported import path: {}", import.path))
                    })?;
                cx.reserved_imports.insert(canonical);
                let alias = import
                    .alias
                    .clone()
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| {
                        sir_asm::reserved::default_import_alias(&import.path).to_owned()
                    });
                cx.aliases.insert(alias, canonical);
            }
            Decl::Extern(ext) => externs.push(ext),
            Decl::Function(decl) => {
                cx.type_params.extend(decl.generics.iter().cloned());
                items.push(FuncItem::of_decl(decl, decl.name.clone(), None));
            }
            Decl::Artifact(artifact) => {
                cx.artifact_order.push(artifact.name.clone());
                cx.artifacts.insert(artifact.name.clone(), artifact);
                cx.type_params.extend(artifact.generics.iter().cloned());
                for method in &artifact.methods {
                    cx.type_params.extend(method.generics.iter().cloned());
                    let emit_name = format!("{}__{}", artifact.name, method.name);
                    let display = format!("{}.{}", artifact.name, method.name);
                    cx.module_funcs.insert(display, emit_name.clone());
                    items.push(FuncItem::of_decl(
                        method,
                        emit_name,
                        Some(TypeRef::named(&artifact.name)),
                    ));
                }
            }
            Decl::Enum(decl) => {
                enum_decls.push(decl);
                let mut values = std::collections::HashMap::new();
                for member in &decl.members {
                    let value = match &member.value {
                        Some(text) => parse_integer_literal(text).ok_or_else(|| {
                            EmitError(format!(
                                "invalid enum value for {}.{}",
                                decl.name, member.name
                            ))
                        })?,
                        None => 0,
                    };
                    values.insert(member.name.clone(), value);
                }
                cx.enum_values.insert(decl.name.clone(), values);
            }
            Decl::Module(module) => {
                if !module.variables.is_empty() {
                    return Err(EmitError(
                        "module variables are not supported in SIR emission".into(),
                    ));
                }
                for func in &module.functions {
                    cx.type_params.extend(func.generics.iter().cloned());
                    let key = format!("{}.{}", module.name, func.name);
                    let emit_name = format!("{}__{}", module.name, func.name);
                    cx.module_funcs.insert(key, emit_name.clone());
                    items.push(FuncItem::of_decl(func, emit_name, None));
                }
            }
            Decl::Variable(var) => globals.push(var),
        }
    }

    let has_globals_init = globals.iter().any(|g| g.init.is_some());
    if !globals.is_empty() {
        for (index, glob) in globals.iter().enumerate() {
            cx.global_indices.insert(glob.name.clone(), index as u32);
            cx.global_types.insert(glob.name.clone(), glob.ty.clone());
            cx.global_mutability.insert(glob.name.clone(), glob.mutability);
        }
        if has_globals_init {
            items.push(FuncItem {
                body: ItemBody::GlobalInit,
                emit_name: "__global_init".into(),
                params: Vec::new(),
                ret: TypeRef::void(),
            });
        }
    }
    let has_script = !program.script.is_empty();
    if has_script {
        items.push(FuncItem {
            body: ItemBody::Script(&program.script),
            emit_name: "__script_entry".into(),
            params: Vec::new(),
            ret: TypeRef::named("i32"),
        });
    }
    if items.is_empty() {
        return Err(EmitError(
            "program has no functions or top-level statements".into(),
        ));
    }

    for (index, item) in items.iter().enumerate() {
        cx.func_ids.insert(item.emit_name.clone(), index as u32);
        cx.func_params.insert(
            item.emit_name.clone(),
            item.params.iter().map(|p| p.ty.clone()).collect(),
        );
        cx.func_returns.insert(item.emit_name.clone(), item.ret.clone());
    }
    cx.base_func_count = items.len() as u32;

    compute_layouts(&mut cx)?;
    process_externs(&mut cx, &externs)?;
    synthesize_reserved_imports(&mut cx)?;
    record_manifest_globals(&mut cx, &globals);

    // Lift lambdas before any body text exists so every numeric sig id is
    // final.
    let bodies: Vec<&[Stmt]> = items
        .iter()
        .map(|item| match item.body {
            ItemBody::Decl(decl) => decl.body.as_slice(),
            ItemBody::Script(script) => script,
            ItemBody::GlobalInit => &[],
        })
        .collect();
    collect_lambdas(&bodies, &mut cx);
    for (index, lambda) in cx.lambdas.iter().enumerate() {
        let id = cx.base_func_count + index as u32;
        cx.func_ids.insert(lambda.emit_name.clone(), id);
        cx.func_params.insert(
            lambda.emit_name.clone(),
            lambda.params.iter().map(|p| p.ty.clone()).collect(),
        );
        cx.func_returns.insert(lambda.emit_name.clone(), lambda.ret.clone());
    }

    // Global-init consts are interned before bodies so `__global_init`
    // can reference string ids.
    let global_inits = intern_global_init_consts(&mut cx, &globals)?;

    let entry_name = if has_script {
        "__script_entry".to_owned()
    } else {
        items
            .iter()
            .find(|item| item.source_name() == "main")
            .map(|item| item.emit_name.clone())
            .unwrap_or_else(|| items[0].emit_name.clone())
    };

    let mut function_text = Vec::with_capacity(items.len() + cx.lambdas.len());
    for item in &items {
        let text = match item.body {
            ItemBody::GlobalInit => {
                emit_global_init(&mut cx, &globals, &global_inits)?
            }
            ItemBody::Decl(decl) => FuncEmitter::emit_item(
                &mut cx,
                &item.emit_name,
                &item.params,
                &item.ret,
                &decl.body,
                false,
            )?,
            ItemBody::Script(script) => FuncEmitter::emit_item(
                &mut cx,
                &item.emit_name,
                &item.params,
                &item.ret,
                script,
                true,
            )?,
        };
        function_text.push(text);
    }
    let mut lambda_index = 0;
    while lambda_index < cx.lambdas.len() {
        let lambda = cx.lambdas[lambda_index].clone();
        let text = FuncEmitter::emit_lambda(&mut cx, &lambda)?;
        function_text.push(text);
        lambda_index += 1;
    }
    debug_assert_eq!(cx.next_lambda, cx.lambdas.len(), "lambda schedule drift");

    tracing::debug!(
        functions = function_text.len(),
        imports = cx.imports.len(),
        consts = cx.consts.len(),
        "emitting sir module"
    );

    let mut out = String::new();
    write_types_section(&mut out, &cx, &enum_decls);
    write_sigs_section(&mut out, &cx, &items)?;
    if !cx.consts.is_empty() {
        out.push_str("consts:\n");
        for (_, line) in &cx.consts {
            out.push_str(line);
            out.push('\n');
        }
    }
    if !globals.is_empty() {
        out.push_str("globals:\n");
        for glob in &globals {
            let token = cx.sig_type_name(&glob.ty)?;
            let _ = writeln!(
                out,
                "  global {} {} init=__ginit_{}",
                glob.name, token, glob.name
            );
        }
    }
    if !cx.imports.is_empty() {
        out.push_str("imports:\n");
        for import in &cx.imports {
            let _ = write!(
                out,
                "  import {} {} {} sig={}",
                import.name, import.module, import.symbol, import.sig_name
            );
            if import.flags != 0 {
                let _ = write!(out, " flags={}", import.flags);
            }
            out.push('\n');
        }
    }
    for text in &function_text {
        out.push_str(text);
    }
    let _ = writeln!(out, "entry {entry_name}");
    Ok(out)
}

fn write_types_section(out: &mut String, cx: &EmitCtx<'_>, enums: &[&EnumDecl]) {
    if cx.artifact_order.is_empty() && enums.is_empty() {
        return;
    }
    out.push_str("types:\n");
    for name in &cx.artifact_order {
        let layout = &cx.layouts[name.as_str()];
        let _ = writeln!(out, "  type {} size={} kind=artifact", name, layout.size);
        for field in &layout.fields {
            let _ = writeln!(
                out,
                "  field {} {} offset={}",
                field.name, field.sir, field.offset
            );
        }
    }
    for decl in enums {
        let _ = writeln!(out, "  type {} size=4 kind=i32", decl.name);
    }
}

fn write_sigs_section(
    out: &mut String,
    cx: &EmitCtx<'_>,
    items: &[FuncItem<'_>],
) -> Result<(), EmitError> {
    out.push_str("sigs:\n");
    for item in items {
        let params: Result<Vec<_>, _> =
            item.params.iter().map(|p| cx.sig_type_name(&p.ty)).collect();
        let ret = cx.sig_type_name(&item.ret)?;
        let _ = writeln!(
            out,
            "  sig {}: ({}) -> {}",
            item.emit_name,
            params?.iter().join(", "),
            ret
        );
    }
    for lambda in &cx.lambdas {
        let params: Result<Vec<_>, _> =
            lambda.params.iter().map(|p| cx.sig_type_name(&p.ty)).collect();
        let ret = cx.sig_type_name(lambda.ret)?;
        let _ = writeln!(
            out,
            "  sig {}: ({}) -> {}",
            lambda.emit_name,
            params?.iter().join(", "),
            ret
        );
    }
    for import in &cx.imports {
        let params: Result<Vec<_>, _> =
            import.params.iter().map(|p| cx.sig_type_name(p)).collect();
        let ret = cx.sig_type_name(&import.ret)?;
        let _ = writeln!(
            out,
            "  sig {}: ({}) -> {}",
            import.sig_name,
            params?.iter().join(", "),
            ret
        );
    }
    for line in &cx.proc_sigs {
        out.push_str(line);
        out.push('\n');
    }
    Ok(())
}

/// Whether a type is accepted by the dynamic-call ABI. Returns also admit
/// `void` and `string`; parameters are scalars only.
fn is_dl_abi_type(ty: &TypeRef, cx: &EmitCtx<'_>, is_return: bool) -> bool {
    if ty.proc.is_some() || !ty.dims.is_empty() {
        return false;
    }
    match cx.sir_type_of(ty) {
        Ok(sir) => {
            sir.is_dl_scalar()
                || (is_return && matches!(sir, sir_asm::SirType::Void | sir_asm::SirType::String))
        }
        Err(_) => false,
    }
}

fn process_externs(
    cx: &mut EmitCtx<'_>,
    externs: &[&ExternDecl],
) -> Result<(), EmitError> {
    let mut dynamic_dl_call_index = 0u32;
    for ext in externs {
        let module = match &ext.module {
            Some(module) => resolve_extern_module(cx, module),
            None => "host".to_owned(),
        };
        let key = (module.clone(), ext.name.clone());
        if cx.import_by_key.contains_key(&key) {
            return Err(EmitError(format!(
                "duplicate extern import: {}.{}",
                module, ext.name
            )));
        }

        for param in &ext.params {
            if !is_dl_abi_type(&param.ty, cx, false) {
                let qualified = match &ext.module {
                    Some(m) => format!("{m}.{}", ext.name),
                    None => ext.name.clone(),
                };
                return Err(EmitError(format!(
                    "extern '{}' parameter '{}' has unsupported ABI type",
                    qualified, param.name
                )));
            }
        }
        if !is_dl_abi_type(&ext.ret, cx, true) {
            let qualified = match &ext.module {
                Some(m) => format!("{m}.{}", ext.name),
                None => ext.name.clone(),
            };
            return Err(EmitError(format!(
                "extern '{}' return has unsupported ABI type",
                qualified
            )));
        }

        let index = cx.imports.len();
        let item = ImportItem {
            name: format!("import_{index}"),
            module: module.clone(),
            symbol: ext.name.clone(),
            sig_name: format!("sig_import_{index}"),
            flags: 0,
            params: ext.params.iter().map(|p| p.ty.clone()).collect(),
            ret: ext.ret.clone(),
        };
        cx.import_by_key.insert(key.clone(), index);
        cx.symbol_index.insert(key, index);
        if let Some(source_module) = &ext.module {
            cx.symbol_index
                .insert((source_module.clone(), ext.name.clone()), index);
        } else {
            cx.bare_externs.insert(ext.name.clone(), index);
        }
        cx.imports.push(item);

        // Scalar-ABI externs outside core.dl get a dynamic companion
        // routed through the dl-call intrinsics.
        if let Some(source_module) = &ext.module {
            if module != "core.dl" {
                let companion_index = cx.imports.len();
                let mut params = Vec::with_capacity(ext.params.len() + 1);
                params.push(TypeRef::named("i64"));
                params.extend(ext.params.iter().map(|p| p.ty.clone()));
                let companion = ImportItem {
                    name: format!("import_{companion_index}"),
                    module: "core.dl".into(),
                    symbol: format!("call${dynamic_dl_call_index}"),
                    sig_name: format!("sig_import_{companion_index}"),
                    flags: sir_asm::ImportFlags::DYNAMIC.bits(),
                    params,
                    ret: ext.ret.clone(),
                };
                dynamic_dl_call_index += 1;
                cx.import_by_key.insert(
                    ("core.dl".into(), companion.symbol.clone()),
                    companion_index,
                );
                cx.dl_companions.insert(
                    (source_module.clone(), ext.name.clone()),
                    companion_index,
                );
                cx.imports.push(companion);
            }
        }
    }
    Ok(())
}

fn resolve_extern_module(cx: &EmitCtx<'_>, module: &str) -> String {
    match cx.reserved_module_of(module) {
        Some(canonical) => canonical.to_owned(),
        None => {
            sir_asm::reserved::canonicalize_import_path(module)
                .map(str::to_owned)
                .unwrap_or_else(|| module.to_owned())
        }
    }
}

/// Synthesize the full symbol set of every referenced reserved module.
/// Dedup is by `(module, symbol)`; re-registration is a no-op that reuses
/// the existing slot.
fn synthesize_reserved_imports(cx: &mut EmitCtx<'_>) -> Result<(), EmitError> {
    for module in sir_asm::reserved::RESERVED_MODULES {
        if !cx.reserved_imports.contains(module.name) {
            continue;
        }
        for symbol in module.symbols {
            let key = (module.name.to_owned(), symbol.name.to_owned());
            let index = match cx.import_by_key.get(&key) {
                Some(existing) => *existing,
                None => {
                    let index = cx.imports.len();
                    let params: Result<Vec<_>, _> = symbol
                        .params
                        .iter()
                        .map(|token| type_ref_of_token(token))
                        .collect();
                    let item = ImportItem {
                        name: format!("import_{index}"),
                        module: module.name.into(),
                        symbol: symbol.name.into(),
                        sig_name: format!("sig_import_{index}"),
                        flags: 0,
                        params: params?,
                        ret: type_ref_of_token(symbol.ret)?,
                    };
                    cx.import_by_key.insert(key.clone(), index);
                    cx.imports.push(item);
                    index
                }
            };
            cx.symbol_index.insert(key, index);
        }
    }
    Ok(())
}

/// Convert a catalog type token into a tree-level type use.
fn type_ref_of_token(token: &str) -> Result<TypeRef, EmitError> {
    fn of_sir(sir: &sir_asm::SirType) -> TypeRef {
        use sir_asm::SirType;
        match sir {
            SirType::List(elem) => TypeRef::list_of(of_sir(elem)),
            SirType::Array(elem) => TypeRef::array_of(of_sir(elem), 0),
            SirType::Ref(name) => TypeRef::named(name),
            simple => TypeRef::named(&simple.to_string()),
        }
    }
    let sir: sir_asm::SirType = token
        .parse()
        .map_err(|e| EmitError(format!("bad catalog signature token: {e}")))?;
    Ok(of_sir(&sir))
}

/// Record globals initialized via a reserved `core.dl open("…")` call so
/// extern calls can find their library handle.
fn record_manifest_globals(cx: &mut EmitCtx<'_>, globals: &[&VarDecl]) {
    for glob in globals {
        let Some(init) = &glob.init else { continue };
        let ExprKind::Call { callee, args } = &init.kind else { continue };
        let Some(path) = expr::flatten_path(callee) else { continue };
        if path.len() < 2 || path[path.len() - 1] != "open" {
            continue;
        }
        let qualifier = path[..path.len() - 1].join(".");
        if cx.reserved_module_of(&qualifier) != Some("core.dl") {
            continue;
        }
        if let Some(Expr { kind: ExprKind::StrLit(manifest), .. }) = args.first() {
            cx.global_dl_modules.insert(glob.name.clone(), manifest.clone());
        }
    }
}

/// Constant for each global: the const-evaluated initializer, or the
/// type's default. Returns the rendered `const.*` line body used by
/// `__global_init` per global.
fn intern_global_init_consts(
    cx: &mut EmitCtx<'_>,
    globals: &[&VarDecl],
) -> Result<Vec<String>, EmitError> {
    let mut store_ops = Vec::with_capacity(globals.len());
    for glob in globals {
        let sir = cx.sir_type_of(&glob.ty)?;
        let value = match &glob.init {
            Some(init) => Some(const_eval(init, cx)?),
            None => None,
        };
        let name = format!("__ginit_{}", glob.name);
        let (line, store_op) = match (&sir, value) {
            (sir_asm::SirType::String, value) => {
                let text = match value {
                    Some(ConstInit::Str(text)) => text,
                    None => String::new(),
                    Some(_) => {
                        return Err(EmitError(format!(
                            "global '{}' initializer must be a string constant",
                            glob.name
                        )))
                    }
                };
                let id = cx.consts.len() as u32;
                let line = format!(
                    "  const {} string \"{}\"",
                    name,
                    escape_string_literal(&text)
                );
                (line, format!("const.string {id}"))
            }
            (sir_asm::SirType::F32, value) | (sir_asm::SirType::F64, value) => {
                let float = match value {
                    Some(ConstInit::Float(f)) => f,
                    Some(ConstInit::Int(i)) => i as f64,
                    None => 0.0,
                    Some(_) => {
                        return Err(EmitError(format!(
                            "global '{}' initializer must be a numeric constant",
                            glob.name
                        )))
                    }
                };
                let token = if sir == sir_asm::SirType::F32 { "f32" } else { "f64" };
                let line = format!("  const {name} {token} {float}");
                (line, format!("const.{token} {float}"))
            }
            (sir, value) if sir.elem_kind().is_some() && !sir.is_ref() => {
                let int = match value {
                    Some(ConstInit::Int(i)) => i,
                    None => 0,
                    Some(_) => {
                        return Err(EmitError(format!(
                            "global '{}' initializer must be an integer constant",
                            glob.name
                        )))
                    }
                };
                let token = cx.sig_type_name(&glob.ty)?;
                let line = format!("  const {name} {token} {int}");
                let const_op = match sir {
                    sir_asm::SirType::I64 => "const.i64",
                    sir_asm::SirType::U64 => "const.u64",
                    sir_asm::SirType::U8 | sir_asm::SirType::U16 | sir_asm::SirType::U32 => {
                        "const.u32"
                    }
                    sir_asm::SirType::Bool => "const.bool",
                    sir_asm::SirType::Char => "const.char",
                    _ => "const.i32",
                };
                (line, format!("{const_op} {int}"))
            }
            _ => {
                return Err(EmitError(format!(
                    "global '{}' type has no default const init support",
                    glob.name
                )))
            }
        };
        cx.consts.push((name, line));
        store_ops.push(store_op);
    }
    Ok(store_ops)
}

enum ConstInit {
    Int(i64),
    Float(f64),
    Str(String),
}

/// Constant-fold a global initializer: literals, unary minus and enum
/// members. A reserved `core.dl open` manifest call folds to zero; the
/// handle is established by explicit code, the constant only reserves the
/// slot.
fn const_eval(expr: &Expr, cx: &EmitCtx<'_>) -> Result<ConstInit, EmitError> {
    match &expr.kind {
        ExprKind::IntLit(text) => parse_integer_literal(text)
            .map(ConstInit::Int)
            .ok_or_else(|| EmitError(format!("invalid integer literal: {text}"))),
        ExprKind::FloatLit(text) => text
            .parse::<f64>()
            .map(ConstInit::Float)
            .map_err(|_| EmitError(format!("invalid float literal: {text}"))),
        ExprKind::BoolLit(b) => Ok(ConstInit::Int(i64::from(*b))),
        ExprKind::CharLit(c) => Ok(ConstInit::Int(i64::from(*c as u32))),
        ExprKind::StrLit(text) => Ok(ConstInit::Str(text.clone())),
        ExprKind::Unary { op: UnaryOp::Neg, operand } => match const_eval(operand, cx)? {
            ConstInit::Int(i) => Ok(ConstInit::Int(i.wrapping_neg())),
            ConstInit::Float(f) => Ok(ConstInit::Float(-f)),
            ConstInit::Str(_) => {
                Err(EmitError("cannot negate a string constant".into()))
            }
        },
        ExprKind::Field { base, name } => {
            if let ExprKind::Ident(enum_name) = &base.kind {
                if let Some(value) = cx.enum_value(enum_name, name) {
                    return Ok(ConstInit::Int(value));
                }
            }
            Err(EmitError(
                "global initializer must be a constant expression".into(),
            ))
        }
        ExprKind::Call { .. } => Ok(ConstInit::Int(0)),
        _ => Err(EmitError(
            "global initializer must be a constant expression".into(),
        )),
    }
}

/// Synthesized `__global_init`: store each initializer constant into its
/// slot. Called before the program entry. Manifest globals additionally
/// run their `core.dl open` call so the handle is live.
fn emit_global_init(
    cx: &mut EmitCtx<'_>,
    globals: &[&VarDecl],
    store_ops: &[String],
) -> Result<String, EmitError> {
    let mut body = String::new();
    let mut stack = 0u32;
    for (glob, store_op) in globals.iter().zip(store_ops) {
        if glob.init.is_none() {
            continue;
        }
        let index = cx.global_indices[glob.name.as_str()];
        if cx.global_dl_modules.contains_key(glob.name.as_str()) {
            // Re-open the manifest library at startup.
            let manifest = cx.global_dl_modules[glob.name.as_str()].clone();
            let string_id = cx.intern_string(&manifest);
            let open_index = cx
                .symbol_index
                .get(&("core.dl".to_owned(), "open".to_owned()))
                .copied()
                .ok_or_else(|| {
                    EmitError(
                        "dl manifest global requires an explicit Core.DL import".into(),
                    )
                })?;
            let _ = writeln!(body, "  const.string {string_id}");
            let _ = writeln!(body, "  syscall {open_index}");
        } else {
            let _ = writeln!(body, "  {store_op}");
        }
        let _ = writeln!(body, "  stglob {index}");
        stack = stack.max(1);
    }
    body.push_str("  ret\n");
    let sig = cx.func_ids["__global_init"];
    Ok(format!(
        "func __global_init locals=0 stack={stack} sig={sig}\n  enter 0\n{body}end\n"
    ))
}
