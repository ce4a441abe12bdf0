//! Program-wide emission state: name binding for artifacts, modules,
//! enums and externs, record layouts, the import table, interned
//! constants, procedure signatures and lifted lambdas.

use std::collections::{HashMap, HashSet};

use sir_asm::{type_id, SirType};

use crate::ast::*;
use crate::emit::EmitError;

/// One accumulated `imports:` entry.
#[derive(Clone, Debug)]
pub(crate) struct ImportItem {
    pub name: String,
    pub module: String,
    pub symbol: String,
    pub sig_name: String,
    pub flags: u32,
    pub params: Vec<TypeRef>,
    pub ret: TypeRef,
}

/// Placed field within an artifact layout.
#[derive(Clone, Debug)]
pub(crate) struct FieldLayout {
    pub name: String,
    pub ty: TypeRef,
    pub sir: SirType,
    pub offset: u32,
}

/// Computed artifact layout plus its runtime ids.
#[derive(Clone, Debug)]
pub(crate) struct ArtifactLayout {
    pub size: u32,
    pub type_id: u32,
    pub field_id_base: u32,
    pub fields: Vec<FieldLayout>,
    pub field_index: HashMap<String, usize>,
}

impl ArtifactLayout {
    pub(crate) fn field(&self, name: &str) -> Option<(u32, &FieldLayout)> {
        let index = *self.field_index.get(name)?;
        Some((self.field_id_base + index as u32, &self.fields[index]))
    }
}

/// A lambda lifted to a synthesized top-level function. Parameters and
/// body borrow the tree; captures are recorded when the creation site is
/// emitted.
#[derive(Clone, Debug)]
pub(crate) struct LambdaSpec<'a> {
    pub emit_name: String,
    pub params: &'a [Param],
    pub ret: &'a TypeRef,
    pub body: &'a [Stmt],
    pub captures: Vec<Capture>,
}

/// One captured variable, in upvalue order.
#[derive(Clone, Debug)]
pub(crate) struct Capture {
    pub name: String,
    pub ty: TypeRef,
    /// Scalars are boxed into one-element arrays; references are stored
    /// directly.
    pub boxed: bool,
}

/// Mutable emission state threaded through the whole lowering. Owned by
/// the emit call; never process-global.
#[derive(Default)]
pub(crate) struct EmitCtx<'a> {
    pub artifacts: HashMap<String, &'a ArtifactDecl>,
    pub layouts: HashMap<String, ArtifactLayout>,
    pub artifact_order: Vec<String>,
    pub enum_values: HashMap<String, HashMap<String, i64>>,
    pub type_params: HashSet<String>,

    /// `Module.fn` display name → mangled emit name.
    pub module_funcs: HashMap<String, String>,

    /// Mangled emit name → function id.
    pub func_ids: HashMap<String, u32>,
    pub func_params: HashMap<String, Vec<TypeRef>>,
    pub func_returns: HashMap<String, TypeRef>,
    pub base_func_count: u32,

    pub global_indices: HashMap<String, u32>,
    pub global_types: HashMap<String, TypeRef>,
    pub global_mutability: HashMap<String, Mutability>,
    /// Global name → dl manifest module recorded from its initializer.
    pub global_dl_modules: HashMap<String, String>,

    /// Canonical reserved modules referenced by the source.
    pub reserved_imports: HashSet<&'static str>,
    /// Alias → canonical reserved-module name.
    pub aliases: HashMap<String, &'static str>,

    pub imports: Vec<ImportItem>,
    /// Dedup key `(module, symbol)` → import index.
    pub import_by_key: HashMap<(String, String), usize>,
    /// Resolution key `(canonical module or extern module, symbol)` →
    /// import index.
    pub symbol_index: HashMap<(String, String), usize>,
    /// Bare extern symbol → import index.
    pub bare_externs: HashMap<String, usize>,
    /// Extern `(module, symbol)` → companion import index.
    pub dl_companions: HashMap<(String, String), usize>,

    /// Const-pool lines in id order: `(name, rendered line)`.
    pub consts: Vec<(String, String)>,
    /// String value → const id, for dedup of interned literals.
    pub string_const_ids: HashMap<String, u32>,

    /// Procedure-type signature lines in id order.
    pub proc_sigs: Vec<String>,
    /// Shape key → numeric sig id.
    pub proc_sig_ids: HashMap<String, u32>,

    pub lambdas: Vec<LambdaSpec<'a>>,
    /// Creation sites consumed so far; emission order equals prepass
    /// discovery order.
    pub next_lambda: usize,
}

impl<'a> EmitCtx<'a> {
    /// Total function count (declared plus lifted); import sig ids start
    /// here.
    pub fn total_funcs(&self) -> u32 {
        self.base_func_count + self.lambdas.len() as u32
    }

    /// First numeric sig id of the procedure-type block.
    pub fn proc_sig_base(&self) -> u32 {
        self.total_funcs() + self.imports.len() as u32
    }

    /// Intern a string literal into the const pool and return its id.
    pub fn intern_string(&mut self, value: &str) -> u32 {
        if let Some(id) = self.string_const_ids.get(value) {
            return *id;
        }
        let id = self.consts.len() as u32;
        let name = format!("str_{}", self.string_const_ids.len());
        let line = format!("  const {} string \"{}\"", name, escape_string_literal(value));
        self.consts.push((name, line));
        self.string_const_ids.insert(value.to_owned(), id);
        id
    }

    /// Intern a procedure shape and return its numeric sig id. The id is
    /// only valid once imports are final, which holds for every body
    /// emission.
    pub fn intern_proc_sig(
        &mut self,
        params: &[TypeRef],
        ret: &TypeRef,
    ) -> Result<u32, EmitError> {
        let mut tokens = Vec::with_capacity(params.len());
        for param in params {
            tokens.push(self.sig_type_name(param)?);
        }
        let ret_token = self.sig_type_name(ret)?;
        let key = format!("({}) -> {}", tokens.join(", "), ret_token);
        if let Some(id) = self.proc_sig_ids.get(&key) {
            return Ok(*id);
        }
        let id = self.proc_sig_base() + self.proc_sigs.len() as u32;
        let line = format!("  sig sig_proc_{}: {}", self.proc_sigs.len(), key);
        self.proc_sigs.push(line);
        self.proc_sig_ids.insert(key, id);
        Ok(id)
    }

    /// Canonical signature token of a type use.
    pub fn sig_type_name(&self, ty: &TypeRef) -> Result<String, EmitError> {
        Ok(self.sir_type_of(ty)?.to_string())
    }

    /// Map a type use onto its runtime [`SirType`].
    pub fn sir_type_of(&self, ty: &TypeRef) -> Result<SirType, EmitError> {
        if ty.proc.is_some() {
            return Ok(SirType::Ref("closure".into()));
        }
        let base = match ty.name.as_str() {
            "void" => SirType::Void,
            "bool" => SirType::Bool,
            "char" => SirType::Char,
            "i8" => SirType::I8,
            "i16" => SirType::I16,
            "i32" => SirType::I32,
            "i64" => SirType::I64,
            "u8" => SirType::U8,
            "u16" => SirType::U16,
            "u32" => SirType::U32,
            "u64" => SirType::U64,
            "f32" => SirType::F32,
            "f64" => SirType::F64,
            "string" => SirType::String,
            name if self.enum_values.contains_key(name) => SirType::I32,
            name if self.artifacts.contains_key(name) => SirType::Ref(name.into()),
            name if self.type_params.contains(name) => SirType::Ref(name.into()),
            name => {
                return Err(EmitError(format!("unsupported type in signature: {name}")))
            }
        };
        let mut out = base;
        for dim in ty.dims.iter().rev() {
            out = match dim {
                TypeDim::List => SirType::List(Box::new(out)),
                TypeDim::Fixed(_) => SirType::Array(Box::new(out)),
            };
        }
        Ok(out)
    }

    /// Runtime type id for `newobj`, `newarray` and `newlist` immediates.
    pub fn runtime_type_id(&self, sir: &SirType) -> u32 {
        match sir {
            SirType::Ref(name) => self
                .layouts
                .get(name.as_str())
                .map(|layout| layout.type_id)
                .unwrap_or(type_id::HANDLE),
            SirType::List(_) | SirType::Array(_) => type_id::HANDLE,
            other => other.primitive_id().unwrap_or(type_id::HANDLE),
        }
    }

    /// Resolve an enum member value.
    pub fn enum_value(&self, enum_name: &str, member: &str) -> Option<i64> {
        self.enum_values.get(enum_name)?.get(member).copied()
    }

    /// Resolve a qualifier (alias or dotted path) to a canonical reserved
    /// module that the source imported.
    pub fn reserved_module_of(&self, qualifier: &str) -> Option<&'static str> {
        if let Some(canonical) = self.aliases.get(qualifier) {
            return Some(canonical);
        }
        let canonical = sir_asm::reserved::canonicalize_import_path(qualifier)?;
        self.reserved_imports.contains(canonical).then_some(canonical)
    }

    /// Global index of the dl manifest handle for `module`, when one was
    /// recorded.
    pub fn manifest_global_for(&self, module: &str) -> Option<u32> {
        let name = self
            .global_dl_modules
            .iter()
            .find(|(_, m)| m.as_str() == module)
            .map(|(name, _)| name)?;
        self.global_indices.get(name).copied()
    }
}

/// Compute declaration-order natural-alignment layouts, assigning runtime
/// type ids and global field ids in artifact order.
pub(crate) fn compute_layouts(cx: &mut EmitCtx<'_>) -> Result<(), EmitError> {
    let mut next_field_id = 0u32;
    for (index, name) in cx.artifact_order.clone().iter().enumerate() {
        let artifact = cx.artifacts[name.as_str()];
        let mut fields = Vec::with_capacity(artifact.fields.len());
        let mut field_index = HashMap::new();
        let mut offset = 0u32;
        let mut max_align = 1u32;
        for field in &artifact.fields {
            let sir = cx.sir_type_of(&field.ty)?;
            let align = sir.field_align();
            let size = sir.field_size();
            offset = align_to(offset, align);
            field_index.insert(field.name.clone(), fields.len());
            fields.push(FieldLayout {
                name: field.name.clone(),
                ty: field.ty.clone(),
                sir,
                offset,
            });
            offset += size;
            max_align = max_align.max(align);
        }
        let layout = ArtifactLayout {
            size: align_to(offset, max_align),
            type_id: sir_asm::FIRST_USER_TYPE_ID + index as u32,
            field_id_base: next_field_id,
            fields,
            field_index,
        };
        next_field_id += artifact.fields.len() as u32;
        cx.layouts.insert(name.clone(), layout);
    }
    Ok(())
}

pub(crate) fn align_to(offset: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// Collect every lambda in emission order: top-level bodies first, then
/// each lifted body in discovery order. The emitter consumes creation
/// sites in exactly this order.
pub(crate) fn collect_lambdas<'a>(bodies: &[&'a [Stmt]], cx: &mut EmitCtx<'a>) {
    for body in bodies {
        collect_from_stmts(body, cx);
    }
    let mut index = 0;
    while index < cx.lambdas.len() {
        let body = cx.lambdas[index].body;
        collect_from_stmts(body, cx);
        index += 1;
    }
}

fn collect_from_stmts<'a>(stmts: &'a [Stmt], cx: &mut EmitCtx<'a>) {
    for stmt in stmts {
        match stmt {
            Stmt::Let(var) => {
                if let Some(init) = &var.init {
                    collect_from_expr(init, cx);
                }
            }
            Stmt::Assign { target, value, .. } => {
                collect_from_expr(target, cx);
                collect_from_expr(value, cx);
            }
            Stmt::If { cond, then_body, else_body, .. } => {
                collect_from_expr(cond, cx);
                collect_from_stmts(then_body, cx);
                collect_from_stmts(else_body, cx);
            }
            Stmt::While { cond, body, .. } => {
                collect_from_expr(cond, cx);
                collect_from_stmts(body, cx);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    collect_from_expr(value, cx);
                }
            }
            Stmt::Expr(expr) => collect_from_expr(expr, cx),
            Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }
}

fn collect_from_expr<'a>(expr: &'a Expr, cx: &mut EmitCtx<'a>) {
    match &expr.kind {
        ExprKind::Lambda { params, ret, body } => {
            let emit_name = format!("__lambda_{}", cx.lambdas.len());
            cx.lambdas.push(LambdaSpec {
                emit_name,
                params,
                ret,
                body,
                captures: Vec::new(),
            });
            // Nested lambdas inside `body` are collected by the caller's
            // queue pass, preserving emission order.
        }
        ExprKind::Unary { operand, .. } => collect_from_expr(operand, cx),
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_from_expr(lhs, cx);
            collect_from_expr(rhs, cx);
        }
        ExprKind::Call { callee, args } => {
            collect_from_expr(callee, cx);
            for arg in args {
                collect_from_expr(arg, cx);
            }
        }
        ExprKind::Field { base, .. } => collect_from_expr(base, cx),
        ExprKind::Index { base, index } => {
            collect_from_expr(base, cx);
            collect_from_expr(index, cx);
        }
        ExprKind::ArrayLit(items)
        | ExprKind::ListLit(items) => {
            for item in items {
                collect_from_expr(item, cx);
            }
        }
        ExprKind::ArtifactLit { args, .. } => {
            for arg in args {
                collect_from_expr(arg, cx);
            }
        }
        _ => {}
    }
}

/// Parse integer literal text: decimal, `0x` hex or `0b` binary.
pub fn parse_integer_literal(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = if let Some(hex) =
        digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) =
        digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B"))
    {
        u64::from_str_radix(bin, 2).ok()?
    } else {
        digits.parse::<u64>().ok()?
    };
    let value = magnitude as i64;
    Some(if negative { value.wrapping_neg() } else { value })
}

/// Escape a string for a `const … string "…"` line.
pub(crate) fn escape_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\x{:02X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Split a format string on `{}` placeholders. Returns the literal
/// segments; the placeholder count is `segments.len() - 1`.
pub(crate) fn split_format_segments(fmt: &str) -> Result<Vec<String>, EmitError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    segments.push(std::mem::take(&mut current));
                } else {
                    return Err(EmitError(
                        "invalid format string: expected '{}' placeholder".into(),
                    ));
                }
            }
            '}' => {
                return Err(EmitError("invalid format string: unmatched '}'".into()))
            }
            c => current.push(c),
        }
    }
    segments.push(current);
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_literal_radices() {
        assert_eq!(parse_integer_literal("42"), Some(42));
        assert_eq!(parse_integer_literal("-7"), Some(-7));
        assert_eq!(parse_integer_literal("0x2A"), Some(42));
        assert_eq!(parse_integer_literal("0b1010"), Some(10));
        assert_eq!(parse_integer_literal("12x"), None);
    }

    #[test]
    fn escapes_round_the_loader() {
        assert_eq!(escape_string_literal("a\"b\\c\n"), "a\\\"b\\\\c\\n");
        assert_eq!(escape_string_literal("\u{1}"), "\\x01");
    }

    #[test]
    fn format_segments() {
        let segments = split_format_segments("x={} y={}!").unwrap();
        assert_eq!(segments, vec!["x=", " y=", "!"]);
        assert!(split_format_segments("{oops}").is_err());
        assert!(split_format_segments("}").is_err());
        assert_eq!(split_format_segments("plain").unwrap(), vec!["plain"]);
    }

    #[test]
    fn alignment() {
        assert_eq!(align_to(0, 4), 0);
        assert_eq!(align_to(1, 4), 4);
        assert_eq!(align_to(4, 8), 8);
        assert_eq!(align_to(8, 8), 8);
    }
}
