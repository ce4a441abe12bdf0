//! Structural and scoping checks on the program tree.
//!
//! Everything the emitter relies on is enforced here: unique top-level
//! names, explicit enum values, unique record members, callback types only
//! in parameter position, every referenced type in scope, no duplicate
//! generic parameters, and no `return` in top-level script statements.
//! Errors carry a `<line>:<column>: ` prefix when the node has a location.

use std::collections::{HashMap, HashSet};

use sir_asm::reserved;

use crate::ast::*;
use crate::emit::parse_integer_literal;

/// A source-tree structural violation.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ValidateError(pub String);

fn err_at(span: Span, message: impl Into<String>) -> ValidateError {
    let message = message.into();
    if span.line == 0 {
        ValidateError(message)
    } else {
        ValidateError(format!("{}:{}: {}", span.line, span.column, message))
    }
}

/// How a type is used; callbacks are legal only in parameter position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TypeUse {
    Param,
    Value,
    Return,
}

#[derive(Default)]
struct ValidateCtx<'a> {
    top_level: HashSet<&'a str>,
    enums: HashMap<&'a str, HashSet<&'a str>>,
    artifacts: HashMap<&'a str, &'a ArtifactDecl>,
    artifact_generics: HashMap<&'a str, usize>,
    modules: HashMap<&'a str, &'a ModuleDecl>,
    functions: HashMap<&'a str, &'a FuncDecl>,
    globals: HashMap<&'a str, &'a VarDecl>,
    externs: HashMap<&'a str, &'a ExternDecl>,
    externs_by_module: HashMap<&'a str, HashMap<&'a str, &'a ExternDecl>>,
    aliases: HashMap<String, &'static str>,
    reserved_imports: HashSet<&'static str>,
}

const PRIMITIVES: &[&str] = &[
    "void", "bool", "char", "i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64",
    "f32", "f64", "string",
];

/// Validate a program tree.
pub fn validate_program(program: &Program) -> Result<(), ValidateError> {
    if program.decls.is_empty() && program.script.is_empty() {
        return Err(ValidateError(
            "program has no declarations or top-level statements".into(),
        ));
    }

    let mut cx = ValidateCtx::default();
    collect_declarations(program, &mut cx)?;

    for stmt in &program.script {
        if let Stmt::Return { span, .. } = stmt {
            return Err(err_at(*span, "top-level return is not allowed"));
        }
    }
    if !program.script.is_empty() {
        let mut scopes = vec![HashSet::new()];
        let empty = HashSet::new();
        for stmt in &program.script {
            check_stmt(stmt, &cx, &empty, &mut scopes)
                .map_err(|e| ValidateError(format!("in top-level script: {}", e.0)))?;
        }
    }

    for decl in &program.decls {
        match decl {
            Decl::Import(_) => {}
            Decl::Extern(ext) => check_extern(ext, &cx)?,
            Decl::Function(func) => {
                let type_params = collect_type_params(&func.generics)?;
                check_function(func, &cx, &type_params, None).map_err(|e| {
                    ValidateError(format!("in function '{}': {}", func.name, e.0))
                })?;
            }
            Decl::Artifact(artifact) => check_artifact(artifact, &cx)?,
            Decl::Module(module) => check_module(module, &cx)?,
            Decl::Enum(_) => {}
            Decl::Variable(var) => {
                let empty = HashSet::new();
                if var.ty.is_callback() {
                    return Err(err_at(
                        var.span,
                        "callback is only valid as a parameter type",
                    ));
                }
                check_type_ref(&var.ty, &cx, &empty, TypeUse::Value, var.span)?;
                if let Some(init) = &var.init {
                    let mut scopes = vec![HashSet::new()];
                    check_expr(init, &cx, &empty, &mut scopes)?;
                }
            }
        }
    }
    Ok(())
}

fn collect_declarations<'a>(
    program: &'a Program,
    cx: &mut ValidateCtx<'a>,
) -> Result<(), ValidateError> {
    for decl in &program.decls {
        let name: Option<&str> = match decl {
            Decl::Import(import) => {
                let canonical = reserved::canonicalize_import_path(&import.path)
                    .ok_or_else(|| {
                        err_at(
                            import.span,
                            format!("unsupported import path: {}", import.path),
                        )
                    })?;
                let alias = import
                    .alias
                    .clone()
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| {
                        reserved::default_import_alias(&import.path).to_owned()
                    });
                cx.aliases.insert(alias, canonical);
                cx.reserved_imports.insert(canonical);
                None
            }
            Decl::Extern(ext) => match &ext.module {
                Some(module) => {
                    cx.externs_by_module
                        .entry(module.as_str())
                        .or_default()
                        .insert(ext.name.as_str(), ext);
                    None
                }
                None => {
                    cx.externs.insert(ext.name.as_str(), ext);
                    Some(&ext.name)
                }
            },
            Decl::Enum(decl) => {
                let mut members = HashSet::new();
                for member in &decl.members {
                    let Some(value) = &member.value else {
                        return Err(err_at(
                            member.span,
                            format!("enum member requires explicit value: {}", member.name),
                        ));
                    };
                    if parse_integer_literal(value).is_none() {
                        return Err(err_at(
                            member.span,
                            format!("invalid enum value for {}.{}", decl.name, member.name),
                        ));
                    }
                    if !members.insert(member.name.as_str()) {
                        return Err(err_at(
                            member.span,
                            format!("duplicate enum member: {}", member.name),
                        ));
                    }
                }
                cx.enums.insert(decl.name.as_str(), members);
                Some(&decl.name)
            }
            Decl::Artifact(artifact) => {
                cx.artifacts.insert(artifact.name.as_str(), artifact);
                cx.artifact_generics
                    .insert(artifact.name.as_str(), artifact.generics.len());
                Some(&artifact.name)
            }
            Decl::Module(module) => {
                cx.modules.insert(module.name.as_str(), module);
                Some(&module.name)
            }
            Decl::Function(func) => {
                cx.functions.insert(func.name.as_str(), func);
                Some(&func.name)
            }
            Decl::Variable(var) => {
                cx.globals.insert(var.name.as_str(), var);
                Some(&var.name)
            }
        };
        if let Some(name) = name {
            if !cx.top_level.insert(name) {
                return Err(ValidateError(format!(
                    "duplicate top-level declaration: {name}"
                )));
            }
        }
    }
    Ok(())
}

fn collect_type_params(generics: &[String]) -> Result<HashSet<&str>, ValidateError> {
    let mut out = HashSet::new();
    for name in generics {
        if !out.insert(name.as_str()) {
            return Err(ValidateError(format!("duplicate generic parameter: {name}")));
        }
    }
    Ok(out)
}

fn collect_type_params_merged<'a>(
    a: &'a [String],
    b: &'a [String],
) -> Result<HashSet<&'a str>, ValidateError> {
    let mut out = HashSet::new();
    for name in a.iter().chain(b) {
        if !out.insert(name.as_str()) {
            return Err(ValidateError(format!("duplicate generic parameter: {name}")));
        }
    }
    Ok(out)
}

fn check_extern(ext: &ExternDecl, cx: &ValidateCtx<'_>) -> Result<(), ValidateError> {
    let empty = HashSet::new();
    if ext.ret.is_callback() {
        return Err(err_at(ext.span, "callback is only valid as a parameter type"));
    }
    check_type_ref(&ext.ret, cx, &empty, TypeUse::Return, ext.span)?;
    let mut names = HashSet::new();
    for param in &ext.params {
        if !names.insert(param.name.as_str()) {
            return Err(err_at(
                param.span,
                format!("duplicate extern parameter name: {}", param.name),
            ));
        }
        check_type_ref(&param.ty, cx, &empty, TypeUse::Param, param.span)?;
    }
    Ok(())
}

fn check_artifact(
    artifact: &ArtifactDecl,
    cx: &ValidateCtx<'_>,
) -> Result<(), ValidateError> {
    let type_params = collect_type_params(&artifact.generics)?;
    let mut names = HashSet::new();
    for field in &artifact.fields {
        if !names.insert(field.name.as_str()) {
            return Err(err_at(
                field.span,
                format!("duplicate artifact member: {}", field.name),
            ));
        }
        if field.ty.is_callback() {
            return Err(err_at(
                field.span,
                "callback is only valid as a parameter type",
            ));
        }
        check_type_ref(&field.ty, cx, &type_params, TypeUse::Value, field.span)?;
    }
    for method in &artifact.methods {
        if !names.insert(method.name.as_str()) {
            return Err(err_at(
                method.span,
                format!("duplicate artifact member: {}", method.name),
            ));
        }
    }
    for method in &artifact.methods {
        let method_params = collect_type_params_merged(&artifact.generics, &method.generics)?;
        check_function(method, cx, &method_params, Some(artifact)).map_err(|e| {
            ValidateError(format!(
                "in function '{}.{}': {}",
                artifact.name, method.name, e.0
            ))
        })?;
    }
    Ok(())
}

fn check_module(module: &ModuleDecl, cx: &ValidateCtx<'_>) -> Result<(), ValidateError> {
    let mut names = HashSet::new();
    let empty = HashSet::new();
    for var in &module.variables {
        if !names.insert(var.name.as_str()) {
            return Err(err_at(
                var.span,
                format!("duplicate module member: {}", var.name),
            ));
        }
        if var.ty.is_callback() {
            return Err(err_at(var.span, "callback is only valid as a parameter type"));
        }
        check_type_ref(&var.ty, cx, &empty, TypeUse::Value, var.span)?;
    }
    for func in &module.functions {
        if !names.insert(func.name.as_str()) {
            return Err(err_at(
                func.span,
                format!("duplicate module member: {}", func.name),
            ));
        }
    }
    for func in &module.functions {
        let type_params = collect_type_params(&func.generics)?;
        check_function(func, cx, &type_params, None).map_err(|e| {
            ValidateError(format!(
                "in function '{}.{}': {}",
                module.name, func.name, e.0
            ))
        })?;
    }
    Ok(())
}

fn check_function(
    func: &FuncDecl,
    cx: &ValidateCtx<'_>,
    type_params: &HashSet<&str>,
    current_artifact: Option<&ArtifactDecl>,
) -> Result<(), ValidateError> {
    if func.ret.is_callback() {
        return Err(err_at(func.span, "callback is only valid as a parameter type"));
    }
    check_type_ref(&func.ret, cx, type_params, TypeUse::Return, func.span)?;

    let mut scope = HashSet::new();
    if current_artifact.is_some() {
        scope.insert("self".to_owned());
    }
    let mut param_names = HashSet::new();
    for param in &func.params {
        if !param_names.insert(param.name.as_str()) {
            return Err(err_at(
                param.span,
                format!("duplicate parameter name: {}", param.name),
            ));
        }
        check_type_ref(&param.ty, cx, type_params, TypeUse::Param, param.span)?;
        scope.insert(param.name.clone());
    }

    let mut scopes = vec![scope];
    for stmt in &func.body {
        check_stmt(stmt, cx, type_params, &mut scopes)?;
    }
    Ok(())
}

fn check_stmt(
    stmt: &Stmt,
    cx: &ValidateCtx<'_>,
    type_params: &HashSet<&str>,
    scopes: &mut Vec<HashSet<String>>,
) -> Result<(), ValidateError> {
    match stmt {
        Stmt::Let(var) => {
            if var.ty.is_callback() {
                return Err(err_at(var.span, "callback is only valid as a parameter type"));
            }
            if !var.ty.name.is_empty() {
                check_type_ref(&var.ty, cx, type_params, TypeUse::Value, var.span)?;
            }
            if let Some(init) = &var.init {
                check_expr(init, cx, type_params, scopes)?;
                if let ExprKind::ArrayLit(_) = &init.kind {
                    check_array_literal_shape(init, &var.ty.dims, 0)?;
                }
            }
            scopes
                .last_mut()
                .expect("scope stack is never empty")
                .insert(var.name.clone());
        }
        Stmt::Assign { target, value, .. } => {
            check_expr(target, cx, type_params, scopes)?;
            check_expr(value, cx, type_params, scopes)?;
        }
        Stmt::If { cond, then_body, else_body, .. } => {
            check_expr(cond, cx, type_params, scopes)?;
            scopes.push(HashSet::new());
            for stmt in then_body {
                check_stmt(stmt, cx, type_params, scopes)?;
            }
            scopes.pop();
            scopes.push(HashSet::new());
            for stmt in else_body {
                check_stmt(stmt, cx, type_params, scopes)?;
            }
            scopes.pop();
        }
        Stmt::While { cond, body, .. } => {
            check_expr(cond, cx, type_params, scopes)?;
            scopes.push(HashSet::new());
            for stmt in body {
                check_stmt(stmt, cx, type_params, scopes)?;
            }
            scopes.pop();
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                check_expr(value, cx, type_params, scopes)?;
            }
        }
        Stmt::Expr(expr) => check_expr(expr, cx, type_params, scopes)?,
        Stmt::Break(_) | Stmt::Continue(_) => {}
    }
    Ok(())
}

fn name_in_scope(name: &str, cx: &ValidateCtx<'_>, scopes: &[HashSet<String>]) -> bool {
    scopes.iter().any(|scope| scope.contains(name))
        || cx.globals.contains_key(name)
        || cx.functions.contains_key(name)
        || cx.externs.contains_key(name)
        || cx.enums.contains_key(name)
        || cx.modules.contains_key(name)
        || cx.artifacts.contains_key(name)
        || cx.aliases.contains_key(name)
        || cx.externs_by_module.contains_key(name)
        || name == "print"
        || name == "println"
}

fn check_expr(
    expr: &Expr,
    cx: &ValidateCtx<'_>,
    type_params: &HashSet<&str>,
    scopes: &mut Vec<HashSet<String>>,
) -> Result<(), ValidateError> {
    match &expr.kind {
        ExprKind::IntLit(_)
        | ExprKind::FloatLit(_)
        | ExprKind::BoolLit(_)
        | ExprKind::CharLit(_)
        | ExprKind::StrLit(_)
        | ExprKind::NullLit => Ok(()),
        ExprKind::Ident(name) => {
            if name_in_scope(name, cx, scopes) {
                Ok(())
            } else {
                Err(err_at(expr.span, format!("unknown identifier: {name}")))
            }
        }
        ExprKind::Unary { operand, .. } => check_expr(operand, cx, type_params, scopes),
        ExprKind::Binary { lhs, rhs, .. } => {
            check_expr(lhs, cx, type_params, scopes)?;
            check_expr(rhs, cx, type_params, scopes)
        }
        ExprKind::Call { callee, args } => {
            check_expr(callee, cx, type_params, scopes)?;
            for arg in args {
                check_expr(arg, cx, type_params, scopes)?;
            }
            Ok(())
        }
        ExprKind::Field { base, name } => {
            if let ExprKind::Ident(base_name) = &base.kind {
                let is_shadowed = scopes.iter().any(|scope| scope.contains(base_name));
                if !is_shadowed {
                    if let Some(members) = cx.enums.get(base_name.as_str()) {
                        if !members.contains(name.as_str()) {
                            return Err(err_at(
                                expr.span,
                                format!("unknown enum member: {base_name}.{name}"),
                            ));
                        }
                        return Ok(());
                    }
                    if let Some(module) = cx.modules.get(base_name.as_str()) {
                        if !module.functions.iter().any(|f| f.name == *name)
                            && !module.variables.iter().any(|v| v.name == *name)
                        {
                            return Err(err_at(
                                expr.span,
                                format!("unknown module member: {base_name}.{name}"),
                            ));
                        }
                        return Ok(());
                    }
                    if let Some(canonical) = cx.aliases.get(base_name.as_str()) {
                        let module = reserved::reserved_module(canonical)
                            .expect("aliases only bind reserved modules");
                        if !module.symbols.iter().any(|s| s.name == *name) {
                            return Err(err_at(
                                expr.span,
                                format!("unknown import symbol: {base_name}.{name}"),
                            ));
                        }
                        return Ok(());
                    }
                    if let Some(symbols) = cx.externs_by_module.get(base_name.as_str()) {
                        if !symbols.contains_key(name.as_str()) {
                            return Err(err_at(
                                expr.span,
                                format!("unknown extern: {base_name}.{name}"),
                            ));
                        }
                        return Ok(());
                    }
                }
            }
            // Dotted reserved path, e.g. `Core.OS.args_count`.
            if let ExprKind::Field { base: inner, name: middle } = &base.kind {
                if let ExprKind::Ident(head) = &inner.kind {
                    let path = format!("{head}.{middle}");
                    if let Some(canonical) = reserved::canonicalize_import_path(&path) {
                        if cx.reserved_imports.contains(canonical) {
                            let module = reserved::reserved_module(canonical)
                                .expect("canonical names are always cataloged");
                            if !module.symbols.iter().any(|s| s.name == *name) {
                                return Err(err_at(
                                    expr.span,
                                    format!("unknown import symbol: {path}.{name}"),
                                ));
                            }
                            return Ok(());
                        }
                    }
                }
            }
            check_expr(base, cx, type_params, scopes)
        }
        ExprKind::Index { base, index } => {
            check_expr(base, cx, type_params, scopes)?;
            check_expr(index, cx, type_params, scopes)
        }
        ExprKind::ArrayLit(items) | ExprKind::ListLit(items) => {
            for item in items {
                check_expr(item, cx, type_params, scopes)?;
            }
            Ok(())
        }
        ExprKind::ArtifactLit { name, args } => {
            let Some(artifact) = cx.artifacts.get(name.as_str()) else {
                return Err(err_at(expr.span, format!("unknown type: {name}")));
            };
            if artifact.fields.len() != args.len() {
                return Err(err_at(
                    expr.span,
                    format!(
                        "artifact literal for {name} expects {} values",
                        artifact.fields.len()
                    ),
                ));
            }
            for arg in args {
                check_expr(arg, cx, type_params, scopes)?;
            }
            Ok(())
        }
        ExprKind::Lambda { params, ret, body } => {
            check_type_ref(ret, cx, type_params, TypeUse::Return, expr.span)?;
            let mut scope = HashSet::new();
            for param in params {
                check_type_ref(&param.ty, cx, type_params, TypeUse::Param, param.span)?;
                scope.insert(param.name.clone());
            }
            scopes.push(scope);
            for stmt in body {
                check_stmt(stmt, cx, type_params, scopes)?;
            }
            scopes.pop();
            Ok(())
        }
    }
}

/// Fixed-size dimensions must match literal lengths, recursively.
fn check_array_literal_shape(
    expr: &Expr,
    dims: &[TypeDim],
    dim_index: usize,
) -> Result<(), ValidateError> {
    let Some(dim) = dims.get(dim_index) else { return Ok(()) };
    let TypeDim::Fixed(size) = dim else { return Ok(()) };
    match &expr.kind {
        ExprKind::ArrayLit(items) => {
            if items.len() as u32 != *size {
                return Err(err_at(
                    expr.span,
                    "array literal size does not match fixed dimensions",
                ));
            }
            if dim_index + 1 < dims.len() {
                for item in items {
                    check_array_literal_shape(item, dims, dim_index + 1)?;
                }
            }
            Ok(())
        }
        ExprKind::ListLit(_) => Err(err_at(
            expr.span,
            "array literal size does not match fixed dimensions",
        )),
        _ => Ok(()),
    }
}

fn check_type_ref(
    ty: &TypeRef,
    cx: &ValidateCtx<'_>,
    type_params: &HashSet<&str>,
    use_kind: TypeUse,
    span: Span,
) -> Result<(), ValidateError> {
    if let Some(proc) = &ty.proc {
        if proc.is_callback && use_kind != TypeUse::Param {
            return Err(err_at(span, "callback is only valid as a parameter type"));
        }
        for param in &proc.params {
            check_type_ref(param, cx, type_params, TypeUse::Param, span)?;
        }
        return check_type_ref(&proc.ret, cx, type_params, TypeUse::Return, span);
    }

    let known = PRIMITIVES.contains(&ty.name.as_str())
        || type_params.contains(ty.name.as_str())
        || cx.enums.contains_key(ty.name.as_str())
        || cx.artifacts.contains_key(ty.name.as_str());
    if !known {
        return Err(err_at(span, format!("unknown type: {}", ty.name)));
    }
    if let Some(expected) = cx.artifact_generics.get(ty.name.as_str()) {
        if ty.type_args.len() != *expected {
            return Err(err_at(
                span,
                format!(
                    "type {} expects {} generic argument(s), got {}",
                    ty.name,
                    expected,
                    ty.type_args.len()
                ),
            ));
        }
    } else if !ty.type_args.is_empty() {
        return Err(err_at(
            span,
            format!("type {} does not take generic arguments", ty.name),
        ));
    }
    for arg in &ty.type_args {
        check_type_ref(arg, cx, type_params, TypeUse::Value, span)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(name: &str, body: Vec<Stmt>) -> Decl {
        Decl::Function(FuncDecl {
            name: name.into(),
            generics: vec![],
            params: vec![],
            ret: TypeRef::named("i32"),
            body,
            span: Span::none(),
        })
    }

    fn ret_int(text: &str) -> Stmt {
        Stmt::Return { value: Some(Expr::int(text)), span: Span::none() }
    }

    #[test]
    fn empty_program_rejected() {
        let err = validate_program(&Program::default()).unwrap_err();
        assert!(err.0.contains("no declarations"));
    }

    #[test]
    fn duplicate_top_level_rejected() {
        let program = Program {
            decls: vec![func("main", vec![ret_int("0")]), func("main", vec![ret_int("1")])],
            script: vec![],
        };
        let err = validate_program(&program).unwrap_err();
        assert_eq!(err.0, "duplicate top-level declaration: main");
    }

    #[test]
    fn enum_members_need_explicit_values() {
        let program = Program {
            decls: vec![Decl::Enum(EnumDecl {
                name: "Color".into(),
                members: vec![EnumMember {
                    name: "Red".into(),
                    value: None,
                    span: Span::at(3, 5),
                }],
                span: Span::none(),
            })],
            script: vec![],
        };
        let err = validate_program(&program).unwrap_err();
        assert_eq!(err.0, "3:5: enum member requires explicit value: Red");
    }

    #[test]
    fn duplicate_enum_member_rejected() {
        let member = |name: &str| EnumMember {
            name: name.into(),
            value: Some("1".into()),
            span: Span::none(),
        };
        let program = Program {
            decls: vec![Decl::Enum(EnumDecl {
                name: "Color".into(),
                members: vec![member("Red"), member("Red")],
                span: Span::none(),
            })],
            script: vec![],
        };
        let err = validate_program(&program).unwrap_err();
        assert!(err.0.contains("duplicate enum member: Red"));
    }

    #[test]
    fn artifact_fields_and_methods_share_a_namespace() {
        let program = Program {
            decls: vec![Decl::Artifact(ArtifactDecl {
                name: "P".into(),
                generics: vec![],
                fields: vec![FieldDecl {
                    name: "x".into(),
                    ty: TypeRef::named("i32"),
                    span: Span::none(),
                }],
                methods: vec![FuncDecl {
                    name: "x".into(),
                    generics: vec![],
                    params: vec![],
                    ret: TypeRef::void(),
                    body: vec![],
                    span: Span::none(),
                }],
                span: Span::none(),
            })],
            script: vec![],
        };
        let err = validate_program(&program).unwrap_err();
        assert!(err.0.contains("duplicate artifact member: x"));
    }

    #[test]
    fn callback_only_in_parameter_position() {
        let mut callback = TypeRef::proc_of(vec![TypeRef::named("i32")], TypeRef::void());
        if let Some(proc) = callback.proc.as_mut() {
            proc.is_callback = true;
        }
        let program = Program {
            decls: vec![Decl::Variable(VarDecl {
                name: "cb".into(),
                ty: callback,
                mutability: Mutability::Mutable,
                init: None,
                span: Span::none(),
            })],
            script: vec![],
        };
        let err = validate_program(&program).unwrap_err();
        assert!(err.0.contains("callback is only valid as a parameter type"));
    }

    #[test]
    fn top_level_return_rejected() {
        let program = Program {
            decls: vec![],
            script: vec![Stmt::Return { value: None, span: Span::at(1, 1) }],
        };
        let err = validate_program(&program).unwrap_err();
        assert_eq!(err.0, "1:1: top-level return is not allowed");
    }

    #[test]
    fn unknown_identifier_in_function_body() {
        let program = Program {
            decls: vec![func(
                "main",
                vec![Stmt::Return { value: Some(Expr::ident("ghost")), span: Span::none() }],
            )],
            script: vec![],
        };
        let err = validate_program(&program).unwrap_err();
        assert_eq!(err.0, "in function 'main': unknown identifier: ghost");
    }

    #[test]
    fn duplicate_generics_rejected() {
        let program = Program {
            decls: vec![Decl::Function(FuncDecl {
                name: "id".into(),
                generics: vec!["T".into(), "T".into()],
                params: vec![],
                ret: TypeRef::void(),
                body: vec![],
                span: Span::none(),
            })],
            script: vec![],
        };
        let err = validate_program(&program).unwrap_err();
        assert!(err.0.contains("duplicate generic parameter: T"));
    }

    #[test]
    fn unknown_type_rejected() {
        let program = Program {
            decls: vec![Decl::Function(FuncDecl {
                name: "f".into(),
                generics: vec![],
                params: vec![Param::new("x", TypeRef::named("Widget"))],
                ret: TypeRef::void(),
                body: vec![],
                span: Span::none(),
            })],
            script: vec![],
        };
        let err = validate_program(&program).unwrap_err();
        assert!(err.0.contains("unknown type: Widget"));
    }

    #[test]
    fn array_literal_shape_must_match() {
        let program = Program {
            decls: vec![func(
                "main",
                vec![
                    Stmt::Let(VarDecl {
                        name: "a".into(),
                        ty: TypeRef::array_of(TypeRef::named("i32"), 3),
                        mutability: Mutability::Mutable,
                        init: Some(Expr::new(ExprKind::ArrayLit(vec![
                            Expr::int("1"),
                            Expr::int("2"),
                        ]))),
                        span: Span::none(),
                    }),
                    ret_int("0"),
                ],
            )],
            script: vec![],
        };
        let err = validate_program(&program).unwrap_err();
        assert!(err.0.contains("array literal size does not match fixed dimensions"));
    }

    #[test]
    fn valid_program_passes() {
        let program = Program {
            decls: vec![func("main", vec![ret_int("42")])],
            script: vec![],
        };
        validate_program(&program).unwrap();
    }

    #[test]
    fn unknown_import_symbol_rejected() {
        let program = Program {
            decls: vec![
                Decl::Import(ImportDecl {
                    path: "Core.OS".into(),
                    alias: None,
                    span: Span::none(),
                }),
                func(
                    "main",
                    vec![Stmt::Return {
                        value: Some(Expr::call_path(&["OS", "argv_count"], vec![])),
                        span: Span::none(),
                    }],
                ),
            ],
            script: vec![],
        };
        let err = validate_program(&program).unwrap_err();
        assert!(err.0.contains("unknown import symbol: OS.argv_count"));
    }
}
