//! Runtime model of a loaded SIR module: everything the interpreter needs
//! from the textual sections, with names resolved to indices.

use sir_asm::{ImportFlags, SirType, FIRST_USER_TYPE_ID};

/// Kind of a declared type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeKind {
    /// Record with heap layout; fields live in [`IrModule::fields`].
    Artifact,
    /// Enum lowered to a 32-bit integer; never heap-allocated.
    I32,
}

/// One `type` entry of the `types:` section.
#[derive(Clone, Debug)]
pub struct TypeDef {
    /// Declared name.
    pub name: String,
    /// Payload size in bytes (artifacts) or value size (enums).
    pub size: u32,
    /// Layout kind.
    pub kind: TypeKind,
}

/// One `field` entry; `fid` is the index into [`IrModule::fields`].
#[derive(Clone, Debug)]
pub struct FieldDef {
    /// Declared name.
    pub name: String,
    /// Index of the owning type in [`IrModule::types`].
    pub owner: u32,
    /// Field type token.
    pub ty: SirType,
    /// Byte offset within the artifact payload.
    pub offset: u32,
}

/// One `sig` entry; the index in [`IrModule::sigs`] is the numeric
/// signature id used by `func … sig=` and `call.indirect`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Signature {
    /// Signature name, referenced by `imports:` entries.
    pub name: String,
    /// Parameter types.
    pub params: Vec<SirType>,
    /// Return type.
    pub ret: SirType,
}

impl Signature {
    /// Structural equality, ignoring the name. Indirect calls compare
    /// shapes, not identities.
    pub fn same_shape(&self, other: &Signature) -> bool {
        self.params == other.params && self.ret == other.ret
    }

    /// Whether calls through this signature leave a value on the stack.
    pub fn returns_value(&self) -> bool {
        self.ret != SirType::Void
    }
}

/// Payload of a `const` entry.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    /// Integer constant, stored widened.
    Int(i64),
    /// Float constant.
    Float(f64),
    /// String constant, interned into the heap at initialization.
    Str(String),
}

/// One `const` entry; the index in [`IrModule::consts`] is the id used by
/// `const.string`.
#[derive(Clone, Debug)]
pub struct ConstDef {
    /// Const name, referenced by `globals:` entries.
    pub name: String,
    /// Declared type token.
    pub ty: SirType,
    /// The value.
    pub value: ConstValue,
}

/// One `global` entry; the index is the slot used by `ldglob`/`stglob`.
#[derive(Clone, Debug)]
pub struct GlobalDef {
    /// Declared name.
    pub name: String,
    /// Declared type token.
    pub ty: SirType,
    /// Index of the initializer const, if any.
    pub init: Option<u32>,
}

/// One `import` entry; the index is the id used by `syscall`.
#[derive(Clone, Debug)]
pub struct ImportDef {
    /// Import name (`import_<n>`).
    pub name: String,
    /// Canonical module name (`core.os`, …).
    pub module: String,
    /// Symbol within the module.
    pub symbol: String,
    /// Index of the import's signature in [`IrModule::sigs`].
    pub sig: u32,
    /// Flags word.
    pub flags: ImportFlags,
}

/// One parsed and encoded function body.
#[derive(Clone, Debug)]
pub struct IrFunction {
    /// Function name as declared by its `func` line.
    pub name: String,
    /// Encoded bytecode.
    pub code: Vec<u8>,
    /// Locals reservation from the `locals=` key.
    pub local_count: u16,
    /// Declared maximum operand-stack height from the `stack=` key.
    pub stack_max: u32,
    /// Numeric signature id from the `sig=` key.
    pub sig_id: u32,
}

/// A loaded module, ready for execution.
#[derive(Clone, Debug, Default)]
pub struct IrModule {
    /// Declared types, in file order; type id = index + [`FIRST_USER_TYPE_ID`].
    pub types: Vec<TypeDef>,
    /// Global field table; `fid` = index, in file order.
    pub fields: Vec<FieldDef>,
    /// Signature table; numeric sig id = index, in file order.
    pub sigs: Vec<Signature>,
    /// Const pool; const id = index, in file order.
    pub consts: Vec<ConstDef>,
    /// Global slots, in file order.
    pub globals: Vec<GlobalDef>,
    /// Import table; `syscall` id = index, in file order.
    pub imports: Vec<ImportDef>,
    /// Function bodies, in file order.
    pub functions: Vec<IrFunction>,
    /// Index of the entry function.
    pub entry: u32,
}

impl IrModule {
    /// Index of the named function, if defined.
    pub fn function_index(&self, name: &str) -> Option<u32> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| i as u32)
    }

    /// The synthesized global-initializer function, if emitted.
    pub fn global_init_index(&self) -> Option<u32> {
        self.function_index("__global_init")
    }

    /// Resolve a runtime type id to its [`TypeDef`].
    pub fn type_by_id(&self, type_id: u32) -> Option<&TypeDef> {
        let index = type_id.checked_sub(FIRST_USER_TYPE_ID)?;
        self.types.get(index as usize)
    }

    /// The signature of the function at `index`.
    pub fn function_sig(&self, index: u32) -> Option<&Signature> {
        let func = self.functions.get(index as usize)?;
        self.sigs.get(func.sig_id as usize)
    }
}
