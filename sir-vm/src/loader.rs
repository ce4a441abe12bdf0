//! Line-oriented IR text parser.
//!
//! Comments run from `;` or `#` to end of line. A line ending in `:` inside
//! a function body defines a label; `func <name> [key=value …]` opens a
//! function and `end` closes it. Section headers (`types:`, `sigs:`,
//! `consts:`, `globals:`, `imports:`) switch the active section. Labels are
//! resolved in two passes per function so forward references are legal.

use std::collections::HashMap;

use sir_asm::{CodeBuilder, ImportFlags, Label, Layout, Opcode, SirType};

use crate::error::IrParseError;
use crate::module::{
    ConstDef, ConstValue, FieldDef, GlobalDef, ImportDef, IrFunction, IrModule,
    Signature, TypeDef, TypeKind,
};

#[derive(Debug)]
enum RawInst {
    Label { line: usize, name: String },
    Op { line: usize, mnemonic: String, args: Vec<String> },
}

#[derive(Debug)]
struct PendingFunc {
    name: String,
    locals: u16,
    stack_max: u32,
    sig_id: u32,
    insts: Vec<RawInst>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Section {
    None,
    Types,
    Sigs,
    Consts,
    Globals,
    Imports,
}

/// Parse textual IR into an executable [`IrModule`].
pub fn parse_module(text: &str) -> Result<IrModule, IrParseError> {
    let mut module = IrModule::default();
    let mut section = Section::None;
    let mut current: Option<PendingFunc> = None;
    let mut entry_name = String::new();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if current.is_some() {
            if line == "end" {
                if let Some(func) = current.take() {
                    module.functions.push(lower_function(func)?);
                }
                continue;
            }
            let func = current.as_mut().ok_or_else(|| {
                IrParseError::new(line_no, "instruction outside func")
            })?;
            if let Some(name) = line.strip_suffix(':') {
                func.insts.push(RawInst::Label { line: line_no, name: name.trim().into() });
                continue;
            }
            let mut tokens = line.split_whitespace();
            let mnemonic = tokens
                .next()
                .ok_or_else(|| IrParseError::new(line_no, "empty instruction"))?;
            func.insts.push(RawInst::Op {
                line: line_no,
                mnemonic: mnemonic.into(),
                args: tokens.map(String::from).collect(),
            });
            continue;
        }

        match line {
            "types:" => {
                section = Section::Types;
                continue;
            }
            "sigs:" => {
                section = Section::Sigs;
                continue;
            }
            "consts:" => {
                section = Section::Consts;
                continue;
            }
            "globals:" => {
                section = Section::Globals;
                continue;
            }
            "imports:" => {
                section = Section::Imports;
                continue;
            }
            _ => {}
        }

        if let Some(rest) = line.strip_prefix("func ") {
            section = Section::None;
            current = Some(parse_func_header(rest, line_no)?);
            continue;
        }
        if let Some(rest) = line.strip_prefix("entry ") {
            let mut tokens = rest.split_whitespace();
            match (tokens.next(), tokens.next()) {
                (Some(name), None) => entry_name = name.into(),
                _ => {
                    return Err(IrParseError::new(
                        line_no,
                        "entry expects a function name",
                    ))
                }
            }
            continue;
        }

        match section {
            Section::Types => parse_type_line(&mut module, line, line_no)?,
            Section::Sigs => module.sigs.push(parse_sig_line(line, line_no)?),
            Section::Consts => module.consts.push(parse_const_line(line, line_no)?),
            Section::Globals => parse_global_line(&mut module, line, line_no)?,
            Section::Imports => parse_import_line(&mut module, line, line_no)?,
            Section::None => {
                return Err(IrParseError::new(line_no, "instruction outside func"))
            }
        }
    }

    if let Some(func) = current {
        return Err(IrParseError::whole_module(format!(
            "func {} is missing its end",
            func.name
        )));
    }
    if module.functions.is_empty() {
        return Err(IrParseError::whole_module("module has no functions"));
    }

    if !module.sigs.is_empty() {
        for func in &module.functions {
            if func.sig_id as usize >= module.sigs.len() {
                return Err(IrParseError::whole_module(format!(
                    "func {} references signature {} outside the sig table",
                    func.name, func.sig_id
                )));
            }
        }
    }

    if !entry_name.is_empty() {
        module.entry = module
            .function_index(&entry_name)
            .ok_or_else(|| IrParseError::whole_module("entry function not found"))?;
    }

    tracing::debug!(
        functions = module.functions.len(),
        imports = module.imports.len(),
        entry = %module.functions[module.entry as usize].name,
        "parsed ir module"
    );
    Ok(module)
}

fn parse_func_header(rest: &str, line_no: usize) -> Result<PendingFunc, IrParseError> {
    let mut tokens = rest.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| IrParseError::new(line_no, "func missing name"))?;
    let mut func = PendingFunc {
        name: name.into(),
        locals: 0,
        stack_max: 0,
        sig_id: 0,
        insts: Vec::new(),
    };
    for kv in tokens {
        let Some((key, value)) = kv.split_once('=') else { continue };
        let Some(num) = parse_uint(value) else { continue };
        match key {
            "locals" => func.locals = num as u16,
            "stack" => func.stack_max = num as u32,
            "sig" => func.sig_id = num as u32,
            _ => {}
        }
    }
    Ok(func)
}

fn parse_type_line(
    module: &mut IrModule,
    line: &str,
    line_no: usize,
) -> Result<(), IrParseError> {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("type") => {
            let name = tokens
                .next()
                .ok_or_else(|| IrParseError::new(line_no, "type missing name"))?;
            let mut size = 0;
            let mut kind = None;
            for kv in tokens {
                match kv.split_once('=') {
                    Some(("size", value)) => {
                        size = parse_uint(value).ok_or_else(|| {
                            IrParseError::new(line_no, "type size must be numeric")
                        })? as u32;
                    }
                    Some(("kind", "artifact")) => kind = Some(TypeKind::Artifact),
                    Some(("kind", "i32")) => kind = Some(TypeKind::I32),
                    Some(("kind", other)) => {
                        return Err(IrParseError::new(
                            line_no,
                            format!("unknown type kind: {other}"),
                        ))
                    }
                    _ => {}
                }
            }
            let kind = kind
                .ok_or_else(|| IrParseError::new(line_no, "type missing kind"))?;
            module.types.push(TypeDef { name: name.into(), size, kind });
            Ok(())
        }
        Some("field") => {
            let owner = module.types.len().checked_sub(1).ok_or_else(|| {
                IrParseError::new(line_no, "field outside a type declaration")
            })? as u32;
            let name = tokens
                .next()
                .ok_or_else(|| IrParseError::new(line_no, "field missing name"))?;
            let ty_token = tokens
                .next()
                .ok_or_else(|| IrParseError::new(line_no, "field missing type"))?;
            let ty: SirType = ty_token
                .parse()
                .map_err(|e| IrParseError::new(line_no, format!("{e}")))?;
            let offset_kv = tokens
                .next()
                .and_then(|kv| kv.strip_prefix("offset="))
                .ok_or_else(|| IrParseError::new(line_no, "field missing offset"))?;
            let offset = parse_uint(offset_kv).ok_or_else(|| {
                IrParseError::new(line_no, "field offset must be numeric")
            })? as u32;
            module.fields.push(FieldDef { name: name.into(), owner, ty, offset });
            Ok(())
        }
        Some(other) => Err(IrParseError::new(
            line_no,
            format!("unexpected token in types section: {other}"),
        )),
        None => Ok(()),
    }
}

fn parse_sig_line(line: &str, line_no: usize) -> Result<Signature, IrParseError> {
    let rest = line
        .strip_prefix("sig ")
        .ok_or_else(|| IrParseError::new(line_no, "expected sig entry"))?;
    let (name, shape) = rest
        .split_once(':')
        .ok_or_else(|| IrParseError::new(line_no, "sig missing ':'"))?;
    let shape = shape.trim();
    let open = shape
        .strip_prefix('(')
        .ok_or_else(|| IrParseError::new(line_no, "sig missing parameter list"))?;
    let (params_text, ret_text) = open
        .split_once(')')
        .ok_or_else(|| IrParseError::new(line_no, "sig missing ')'"))?;
    let ret_text = ret_text
        .trim()
        .strip_prefix("->")
        .ok_or_else(|| IrParseError::new(line_no, "sig missing return type"))?
        .trim();

    let mut params = Vec::new();
    for token in split_type_list(params_text) {
        let ty: SirType = token
            .parse()
            .map_err(|e| IrParseError::new(line_no, format!("{e}")))?;
        params.push(ty);
    }
    let ret: SirType = ret_text
        .parse()
        .map_err(|e| IrParseError::new(line_no, format!("{e}")))?;
    Ok(Signature { name: name.trim().into(), params, ret })
}

/// Split a comma-separated type list, respecting `<…>` nesting.
fn split_type_list(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                let token = text[start..i].trim();
                if !token.is_empty() {
                    out.push(token.into());
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    let token = text[start..].trim();
    if !token.is_empty() {
        out.push(token.into());
    }
    out
}

fn parse_const_line(line: &str, line_no: usize) -> Result<ConstDef, IrParseError> {
    let rest = line
        .strip_prefix("const ")
        .ok_or_else(|| IrParseError::new(line_no, "expected const entry"))?;
    let mut tokens = rest.splitn(3, char::is_whitespace);
    let name = tokens
        .next()
        .ok_or_else(|| IrParseError::new(line_no, "const missing name"))?;
    let ty_token = tokens
        .next()
        .ok_or_else(|| IrParseError::new(line_no, "const missing type"))?;
    let value_text = tokens
        .next()
        .ok_or_else(|| IrParseError::new(line_no, "const missing value"))?
        .trim();
    let ty: SirType = ty_token
        .parse()
        .map_err(|e| IrParseError::new(line_no, format!("{e}")))?;
    let value = match ty {
        SirType::String => ConstValue::Str(unquote_string(value_text, line_no)?),
        SirType::F32 | SirType::F64 => {
            let value = parse_float(value_text).ok_or_else(|| {
                IrParseError::new(line_no, "const expects a float value")
            })?;
            ConstValue::Float(value)
        }
        _ => {
            let value = parse_int(value_text).ok_or_else(|| {
                IrParseError::new(line_no, "const expects an integer value")
            })?;
            ConstValue::Int(value)
        }
    };
    Ok(ConstDef { name: name.into(), ty, value })
}

fn parse_global_line(
    module: &mut IrModule,
    line: &str,
    line_no: usize,
) -> Result<(), IrParseError> {
    let rest = line
        .strip_prefix("global ")
        .ok_or_else(|| IrParseError::new(line_no, "expected global entry"))?;
    let mut tokens = rest.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| IrParseError::new(line_no, "global missing name"))?;
    let ty_token = tokens
        .next()
        .ok_or_else(|| IrParseError::new(line_no, "global missing type"))?;
    let ty: SirType = ty_token
        .parse()
        .map_err(|e| IrParseError::new(line_no, format!("{e}")))?;
    let mut init = None;
    if let Some(kv) = tokens.next() {
        let const_name = kv.strip_prefix("init=").ok_or_else(|| {
            IrParseError::new(line_no, "global expects init=<const>")
        })?;
        let index = module
            .consts
            .iter()
            .position(|c| c.name == const_name)
            .ok_or_else(|| {
                IrParseError::new(line_no, format!("unknown const: {const_name}"))
            })?;
        init = Some(index as u32);
    }
    module.globals.push(GlobalDef { name: name.into(), ty, init });
    Ok(())
}

fn parse_import_line(
    module: &mut IrModule,
    line: &str,
    line_no: usize,
) -> Result<(), IrParseError> {
    let rest = line
        .strip_prefix("import ")
        .ok_or_else(|| IrParseError::new(line_no, "expected import entry"))?;
    let mut tokens = rest.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| IrParseError::new(line_no, "import missing name"))?;
    let module_name = tokens
        .next()
        .ok_or_else(|| IrParseError::new(line_no, "import missing module"))?;
    let symbol = tokens
        .next()
        .ok_or_else(|| IrParseError::new(line_no, "import missing symbol"))?;
    let mut sig = None;
    let mut flags = ImportFlags::empty();
    for kv in tokens {
        match kv.split_once('=') {
            Some(("sig", sig_name)) => {
                let index = module
                    .sigs
                    .iter()
                    .position(|s| s.name == sig_name)
                    .ok_or_else(|| {
                        IrParseError::new(line_no, format!("unknown sig: {sig_name}"))
                    })?;
                sig = Some(index as u32);
            }
            Some(("flags", value)) => {
                let bits = parse_uint(value).ok_or_else(|| {
                    IrParseError::new(line_no, "import flags must be numeric")
                })? as u32;
                flags = ImportFlags::from_bits_truncate(bits);
            }
            _ => {}
        }
    }
    let sig =
        sig.ok_or_else(|| IrParseError::new(line_no, "import missing sig="))?;
    module.imports.push(ImportDef {
        name: name.into(),
        module: module_name.into(),
        symbol: symbol.into(),
        sig,
        flags,
    });
    Ok(())
}

fn lower_function(func: PendingFunc) -> Result<IrFunction, IrParseError> {
    let mut builder = CodeBuilder::new();
    let mut labels: HashMap<String, Label> = HashMap::new();

    for inst in &func.insts {
        if let RawInst::Label { name, .. } = inst {
            labels
                .entry(name.clone())
                .or_insert_with(|| builder.new_label());
        }
    }

    let mut first_op_seen = false;
    for inst in &func.insts {
        match inst {
            RawInst::Label { line, name } => {
                let label = labels[name];
                builder
                    .bind_label(label)
                    .map_err(|e| IrParseError::new(*line, e.to_string()))?;
            }
            RawInst::Op { line, mnemonic, args } => {
                let canonical = canonical_mnemonic(mnemonic);
                let op = Opcode::from_mnemonic(canonical).ok_or_else(|| {
                    IrParseError::new(*line, format!("unknown op: {mnemonic}"))
                })?;
                if !first_op_seen {
                    if op != Opcode::Enter {
                        return Err(IrParseError::new(
                            *line,
                            format!("missing enter in func {}", func.name),
                        ));
                    }
                    first_op_seen = true;
                }
                lower_op(&mut builder, &labels, op, args, *line)?;
            }
        }
    }
    if !first_op_seen {
        return Err(IrParseError::whole_module(format!(
            "missing enter in func {}",
            func.name
        )));
    }

    let code = builder.finish()?;
    Ok(IrFunction {
        name: func.name,
        code,
        local_count: func.locals,
        stack_max: func.stack_max,
        sig_id: func.sig_id,
    })
}

fn lower_op(
    builder: &mut CodeBuilder,
    labels: &HashMap<String, Label>,
    op: Opcode,
    args: &[String],
    line: usize,
) -> Result<(), IrParseError> {
    let expects = |n: usize| -> Result<(), IrParseError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(IrParseError::new(
                line,
                format!("{} expects {} argument(s)", op.mnemonic(), n),
            ))
        }
    };
    let label_of = |name: &str| -> Result<Label, IrParseError> {
        labels
            .get(name)
            .copied()
            .ok_or_else(|| IrParseError::new(line, format!("unknown label: {name}")))
    };

    match op.layout() {
        Layout::None => {
            expects(0)?;
            builder.simple(op);
        }
        Layout::I8 | Layout::I16 | Layout::I32 | Layout::I64 => {
            expects(1)?;
            let value = parse_int(&args[0]).ok_or_else(|| {
                IrParseError::new(line, format!("{} expects value", op.mnemonic()))
            })?;
            builder.with_signed(op, value);
        }
        Layout::U8 | Layout::U16 | Layout::U32 | Layout::U64 => {
            expects(1)?;
            let value = parse_uint(&args[0]).ok_or_else(|| {
                IrParseError::new(line, format!("{} expects value", op.mnemonic()))
            })?;
            builder.with_unsigned(op, value);
        }
        Layout::F32 | Layout::F64 => {
            expects(1)?;
            let value = parse_float(&args[0]).ok_or_else(|| {
                IrParseError::new(line, format!("{} expects value", op.mnemonic()))
            })?;
            builder.with_float(op, value);
        }
        Layout::U32U8 => {
            expects(2)?;
            let (Some(id), Some(count)) = (parse_uint(&args[0]), parse_uint(&args[1]))
            else {
                return Err(IrParseError::new(
                    line,
                    format!("{} expects numeric args", op.mnemonic()),
                ));
            };
            builder.with_id_count(op, id as u32, count as u8);
        }
        Layout::U32U32 => {
            expects(2)?;
            let (Some(first), Some(second)) =
                (parse_uint(&args[0]), parse_uint(&args[1]))
            else {
                return Err(IrParseError::new(
                    line,
                    format!("{} expects numeric args", op.mnemonic()),
                ));
            };
            builder.with_id_pair(op, first as u32, second as u32);
        }
        Layout::Jump => {
            expects(1)?;
            builder.with_jump(op, label_of(&args[0])?);
        }
        Layout::Table => {
            if args.len() < 2 {
                return Err(IrParseError::new(
                    line,
                    "jmptable expects default and cases",
                ));
            }
            let default = label_of(&args[0])?;
            let mut cases = Vec::with_capacity(args.len() - 1);
            for case in &args[1..] {
                cases.push(label_of(case)?);
            }
            builder.jmp_table(&cases, default);
        }
    }
    Ok(())
}

fn canonical_mnemonic(mnemonic: &str) -> &str {
    match mnemonic {
        "load.local" => "ldloc",
        "store.local" => "stloc",
        "load.global" => "ldglob",
        "store.global" => "stglob",
        "load.upvalue" => "ldupv",
        "store.upvalue" => "stupv",
        other => other,
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find([';', '#']) {
        Some(cut) => &line[..cut],
        None => line,
    }
}

/// Unsigned literal: decimal, `0x` hex or `0b` binary.
pub(crate) fn parse_uint(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        return u64::from_str_radix(bin, 2).ok();
    }
    text.parse().ok()
}

/// Signed literal: the unsigned forms with an optional leading minus.
pub(crate) fn parse_int(text: &str) -> Option<i64> {
    if let Some(rest) = text.strip_prefix('-') {
        let magnitude = parse_uint(rest)?;
        if magnitude > i64::MAX as u64 + 1 {
            return None;
        }
        return Some((magnitude as i64).wrapping_neg());
    }
    parse_uint(text).map(|v| v as i64)
}

pub(crate) fn parse_float(text: &str) -> Option<f64> {
    text.parse().ok()
}

fn unquote_string(text: &str, line_no: usize) -> Result<String, IrParseError> {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .ok_or_else(|| IrParseError::new(line_no, "string const must be quoted"))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                let (Some(hi), Some(lo)) =
                    (hi.and_then(|c| c.to_digit(16)), lo.and_then(|c| c.to_digit(16)))
                else {
                    return Err(IrParseError::new(line_no, "invalid \\x escape"));
                };
                out.push((hi * 16 + lo) as u8 as char);
            }
            _ => return Err(IrParseError::new(line_no, "invalid string escape")),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_function_parses() {
        let text = "\
func main locals=0 stack=1 sig=0
  enter 0
  const.i32 42
  ret
end
entry main
";
        let module = parse_module(text).unwrap();
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.functions[0].name, "main");
        assert_eq!(module.entry, 0);
        assert_eq!(
            module.functions[0].code[0],
            Opcode::Enter as u8,
        );
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let text = "\
; leading comment
func main stack=1
  enter 0      ; trailing comment
  # a hash comment
  const.i32 1
  ret
end
entry main
";
        let module = parse_module(text).unwrap();
        assert_eq!(module.functions[0].stack_max, 1);
    }

    #[test]
    fn labels_resolve_forward() {
        let text = "\
func main
  enter 0
  const.bool 1
  jmp.true done
  const.i32 0
  ret
done:
  const.i32 1
  ret
end
entry main
";
        assert!(parse_module(text).is_ok());
    }

    #[test]
    fn unknown_op_is_fatal_with_line() {
        let text = "func main\n  enter 0\n  frobnicate\nend\nentry main\n";
        let err = parse_module(text).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("unknown op: frobnicate"));
    }

    #[test]
    fn unknown_label_is_fatal() {
        let text = "func main\n  enter 0\n  jmp nowhere\nend\nentry main\n";
        let err = parse_module(text).unwrap_err();
        assert!(err.message.contains("unknown label: nowhere"));
    }

    #[test]
    fn missing_entry_function_is_fatal() {
        let text = "func main\n  enter 0\n  ret\nend\nentry other\n";
        let err = parse_module(text).unwrap_err();
        assert_eq!(err.message, "entry function not found");
    }

    #[test]
    fn missing_enter_is_fatal() {
        let text = "func main\n  const.i32 1\n  ret\nend\nentry main\n";
        let err = parse_module(text).unwrap_err();
        assert!(err.message.contains("missing enter"));
    }

    #[test]
    fn numeric_literal_radices() {
        assert_eq!(parse_uint("0x2A"), Some(42));
        assert_eq!(parse_uint("0b101"), Some(5));
        assert_eq!(parse_int("-0x10"), Some(-16));
        assert_eq!(parse_int("7"), Some(7));
        assert_eq!(parse_uint("12abc"), None);
    }

    #[test]
    fn sections_populate_the_module() {
        let text = "\
types:
  type Point size=8 kind=artifact
  field x i32 offset=0
  field y i32 offset=4
sigs:
  sig main: () -> i32
  sig sig_import_0: () -> i32
consts:
  const greeting string \"hi\\n\"
  const __ginit_g i32 42
globals:
  global g i32 init=__ginit_g
imports:
  import import_0 core.os args_count sig=sig_import_0
func main locals=0 stack=1 sig=0
  enter 0
  ldglob 0
  ret
end
entry main
";
        let module = parse_module(text).unwrap();
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.fields.len(), 2);
        assert_eq!(module.fields[1].offset, 4);
        assert_eq!(module.sigs.len(), 2);
        assert_eq!(
            module.consts[0].value,
            ConstValue::Str("hi\n".into())
        );
        assert_eq!(module.globals[0].init, Some(1));
        assert_eq!(module.imports[0].module, "core.os");
        assert_eq!(module.imports[0].sig, 1);
    }

    #[test]
    fn jmptable_parses_with_cases() {
        let text = "\
func main
  enter 0
  const.i32 0
  jmptable dflt c0 c1
c0:
  const.i32 10
  ret
c1:
  const.i32 11
  ret
dflt:
  const.i32 99
  ret
end
entry main
";
        assert!(parse_module(text).is_ok());
    }
}
