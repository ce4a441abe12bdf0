//! The validated program tree consumed by the emitter.
//!
//! Declarations, statements and expressions are closed tagged variants;
//! the validator and emitter switch on them exhaustively. The tree is
//! produced by the front end (lexer/parser), which lives outside this
//! crate; the constructors here exist for embedders and tests.

/// Source location; `line` 0 means unknown.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Span {
    /// One-based line.
    pub line: u32,
    /// One-based column.
    pub column: u32,
}

impl Span {
    /// A location-free span.
    pub const fn none() -> Self {
        Span { line: 0, column: 0 }
    }

    /// A concrete location.
    pub const fn at(line: u32, column: u32) -> Self {
        Span { line, column }
    }
}

/// One dimension qualifier on a type: a fixed size or a resizable-list
/// marker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TypeDim {
    /// Fixed-length array dimension.
    Fixed(u32),
    /// Resizable list dimension.
    List,
}

/// Procedure-type shape carried by a [`TypeRef`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcType {
    /// Parameter types.
    pub params: Vec<TypeRef>,
    /// Return type.
    pub ret: TypeRef,
    /// Callback flag; callback types are legal only as parameters.
    pub is_callback: bool,
}

/// A type use: name, type arguments, dimension qualifiers and optional
/// procedure shape. `dims[0]` is the outermost dimension.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TypeRef {
    /// Base type name.
    pub name: String,
    /// Generic arguments.
    pub type_args: Vec<TypeRef>,
    /// Dimension qualifiers, outermost first.
    pub dims: Vec<TypeDim>,
    /// Procedure shape, when this is a procedure type.
    pub proc: Option<Box<ProcType>>,
}

impl TypeRef {
    /// A bare named type.
    pub fn named(name: &str) -> Self {
        TypeRef { name: name.into(), ..TypeRef::default() }
    }

    /// The `void` type.
    pub fn void() -> Self {
        TypeRef::named("void")
    }

    /// A resizable list of `elem`.
    pub fn list_of(mut elem: TypeRef) -> Self {
        elem.dims.insert(0, TypeDim::List);
        elem
    }

    /// A fixed-size array of `elem`.
    pub fn array_of(mut elem: TypeRef, size: u32) -> Self {
        elem.dims.insert(0, TypeDim::Fixed(size));
        elem
    }

    /// A procedure type.
    pub fn proc_of(params: Vec<TypeRef>, ret: TypeRef) -> Self {
        TypeRef {
            name: "proc".into(),
            proc: Some(Box::new(ProcType { params, ret, is_callback: false })),
            ..TypeRef::default()
        }
    }

    /// Whether this is the `void` type.
    pub fn is_void(&self) -> bool {
        self.proc.is_none() && self.dims.is_empty() && self.name == "void"
    }

    /// Whether this is a callback-flagged procedure type.
    pub fn is_callback(&self) -> bool {
        self.proc.as_ref().is_some_and(|p| p.is_callback)
    }
}

/// Mutability of a variable or global.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mutability {
    /// Assignable after initialization.
    Mutable,
    /// Fixed after initialization.
    Immutable,
}

/// `import <path> [as <alias>]`.
#[derive(Clone, Debug)]
pub struct ImportDecl {
    /// The path as written (`Core.OS`, `core_fs`, …).
    pub path: String,
    /// Optional explicit alias.
    pub alias: Option<String>,
    /// Declaration location.
    pub span: Span,
}

/// `extern [<module>.]<name>(params) -> ret`.
#[derive(Clone, Debug)]
pub struct ExternDecl {
    /// Optional host module.
    pub module: Option<String>,
    /// Symbol name.
    pub name: String,
    /// Parameters.
    pub params: Vec<Param>,
    /// Return type.
    pub ret: TypeRef,
    /// Declaration location.
    pub span: Span,
}

/// One enum member; values are kept as literal text and parsed during
/// validation and emission.
#[derive(Clone, Debug)]
pub struct EnumMember {
    /// Member name.
    pub name: String,
    /// Explicit value text, required by validation.
    pub value: Option<String>,
    /// Declaration location.
    pub span: Span,
}

/// An enum declaration.
#[derive(Clone, Debug)]
pub struct EnumDecl {
    /// Enum name.
    pub name: String,
    /// Members with explicit integer values.
    pub members: Vec<EnumMember>,
    /// Declaration location.
    pub span: Span,
}

/// A record field.
#[derive(Clone, Debug)]
pub struct FieldDecl {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: TypeRef,
    /// Declaration location.
    pub span: Span,
}

/// A record type with named fields and associated methods. Methods take
/// an implicit first parameter of the artifact's type.
#[derive(Clone, Debug)]
pub struct ArtifactDecl {
    /// Artifact name.
    pub name: String,
    /// Generic parameter names.
    pub generics: Vec<String>,
    /// Fields, in declaration order.
    pub fields: Vec<FieldDecl>,
    /// Methods.
    pub methods: Vec<FuncDecl>,
    /// Declaration location.
    pub span: Span,
}

/// A namespace grouping functions and variables.
#[derive(Clone, Debug)]
pub struct ModuleDecl {
    /// Module name.
    pub name: String,
    /// Member functions.
    pub functions: Vec<FuncDecl>,
    /// Member variables; rejected by SIR emission.
    pub variables: Vec<VarDecl>,
    /// Declaration location.
    pub span: Span,
}

/// One function parameter.
#[derive(Clone, Debug)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: TypeRef,
    /// Declaration location.
    pub span: Span,
}

impl Param {
    /// A location-free parameter.
    pub fn new(name: &str, ty: TypeRef) -> Self {
        Param { name: name.into(), ty, span: Span::none() }
    }
}

/// A function declaration.
#[derive(Clone, Debug)]
pub struct FuncDecl {
    /// Function name.
    pub name: String,
    /// Generic parameter names.
    pub generics: Vec<String>,
    /// Parameters.
    pub params: Vec<Param>,
    /// Return type.
    pub ret: TypeRef,
    /// Body statements.
    pub body: Vec<Stmt>,
    /// Declaration location.
    pub span: Span,
}

/// A variable declaration: a global at the top level, a local in a body.
#[derive(Clone, Debug)]
pub struct VarDecl {
    /// Variable name.
    pub name: String,
    /// Declared type.
    pub ty: TypeRef,
    /// Mutability.
    pub mutability: Mutability,
    /// Optional initializer.
    pub init: Option<Expr>,
    /// Declaration location.
    pub span: Span,
}

/// A top-level declaration.
#[derive(Clone, Debug)]
pub enum Decl {
    /// `import …`
    Import(ImportDecl),
    /// `extern …`
    Extern(ExternDecl),
    /// `enum …`
    Enum(EnumDecl),
    /// `artifact …`
    Artifact(ArtifactDecl),
    /// `module …`
    Module(ModuleDecl),
    /// `fun …`
    Function(FuncDecl),
    /// `let`/`var` at the top level.
    Variable(VarDecl),
}

/// A statement.
#[derive(Clone, Debug)]
pub enum Stmt {
    /// Local declaration.
    Let(VarDecl),
    /// Assignment to a local, global, upvalue, field or element.
    Assign {
        /// Assignment target expression.
        target: Expr,
        /// Value expression.
        value: Expr,
        /// Statement location.
        span: Span,
    },
    /// Two-way conditional.
    If {
        /// Condition.
        cond: Expr,
        /// Taken when true.
        then_body: Vec<Stmt>,
        /// Taken when false.
        else_body: Vec<Stmt>,
        /// Statement location.
        span: Span,
    },
    /// Pre-tested loop.
    While {
        /// Condition.
        cond: Expr,
        /// Loop body.
        body: Vec<Stmt>,
        /// Statement location.
        span: Span,
    },
    /// Return from the enclosing function.
    Return {
        /// Returned value, when the function returns one.
        value: Option<Expr>,
        /// Statement location.
        span: Span,
    },
    /// Expression evaluated for effect; a produced value is discarded.
    Expr(Expr),
    /// Exit the innermost loop.
    Break(Span),
    /// Re-test the innermost loop.
    Continue(Span),
}

/// Binary operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    /// `+` (numeric addition or string concatenation)
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%` (integers only)
    Mod,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `and`
    LogicalAnd,
    /// `or`
    LogicalOr,
}

/// Unary operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Boolean negation.
    Not,
}

/// Expression variants.
#[derive(Clone, Debug)]
pub enum ExprKind {
    /// Integer literal, kept as written (decimal, `0x`, `0b`).
    IntLit(String),
    /// Float literal, kept as written.
    FloatLit(String),
    /// Boolean literal.
    BoolLit(bool),
    /// Character literal.
    CharLit(char),
    /// String literal, unescaped.
    StrLit(String),
    /// The null reference.
    NullLit,
    /// Name reference.
    Ident(String),
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Call; the callee may be a name, a dotted path or a closure value.
    Call {
        /// Callee expression.
        callee: Box<Expr>,
        /// Arguments, in order.
        args: Vec<Expr>,
    },
    /// Member access: field, method, module function, enum member or
    /// reserved-import symbol, depending on the base.
    Field {
        /// Base expression.
        base: Box<Expr>,
        /// Member name.
        name: String,
    },
    /// Element access.
    Index {
        /// Container expression.
        base: Box<Expr>,
        /// Index expression.
        index: Box<Expr>,
    },
    /// Fixed-length array literal.
    ArrayLit(Vec<Expr>),
    /// List literal.
    ListLit(Vec<Expr>),
    /// Artifact construction with positional field values.
    ArtifactLit {
        /// Artifact name.
        name: String,
        /// One value per field, in declaration order.
        args: Vec<Expr>,
    },
    /// Anonymous function; lifted to a top-level function by the emitter.
    Lambda {
        /// Parameters.
        params: Vec<Param>,
        /// Return type.
        ret: TypeRef,
        /// Body statements.
        body: Vec<Stmt>,
    },
}

/// An expression with its location.
#[derive(Clone, Debug)]
pub struct Expr {
    /// The variant.
    pub kind: ExprKind,
    /// Source location.
    pub span: Span,
}

impl Expr {
    /// Wrap a kind with no location.
    pub fn new(kind: ExprKind) -> Self {
        Expr { kind, span: Span::none() }
    }

    /// Integer literal from text.
    pub fn int(text: &str) -> Self {
        Expr::new(ExprKind::IntLit(text.into()))
    }

    /// Float literal from text.
    pub fn float(text: &str) -> Self {
        Expr::new(ExprKind::FloatLit(text.into()))
    }

    /// String literal.
    pub fn str(text: &str) -> Self {
        Expr::new(ExprKind::StrLit(text.into()))
    }

    /// Name reference.
    pub fn ident(name: &str) -> Self {
        Expr::new(ExprKind::Ident(name.into()))
    }

    /// Binary operation.
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::new(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    /// Member access.
    pub fn field(base: Expr, name: &str) -> Self {
        Expr::new(ExprKind::Field { base: Box::new(base), name: name.into() })
    }

    /// Call of an arbitrary callee.
    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Call { callee: Box::new(callee), args })
    }

    /// Call of a dotted path such as `Core.OS.args_count`.
    pub fn call_path(path: &[&str], args: Vec<Expr>) -> Self {
        let mut callee = Expr::ident(path[0]);
        for segment in &path[1..] {
            callee = Expr::field(callee, segment);
        }
        Expr::call(callee, args)
    }
}

/// An ordered sequence of declarations plus optional top-level script
/// statements.
#[derive(Clone, Debug, Default)]
pub struct Program {
    /// Top-level declarations, in order.
    pub decls: Vec<Decl>,
    /// Top-level script statements; their presence selects the
    /// `__script_entry` entry point.
    pub script: Vec<Stmt>,
}
