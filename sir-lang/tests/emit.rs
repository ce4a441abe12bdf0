use sir_lang::ast::*;
use sir_lang::emit_sir;
use test_case::test_case;

fn fun(name: &str, ret: &str, body: Vec<Stmt>) -> Decl {
    Decl::Function(FuncDecl {
        name: name.into(),
        generics: vec![],
        params: vec![],
        ret: TypeRef::named(ret),
        body,
        span: Span::none(),
    })
}

fn ret(expr: Expr) -> Stmt {
    Stmt::Return { value: Some(expr), span: Span::none() }
}

#[test]
fn addition_lowers_to_typed_opcodes() {
    // fun main() -> i32 { return 41 + 1 }
    let program = Program {
        decls: vec![fun(
            "main",
            "i32",
            vec![ret(Expr::binary(BinaryOp::Add, Expr::int("41"), Expr::int("1")))],
        )],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("const.i32 41"));
    assert!(text.contains("const.i32 1"));
    assert!(text.contains("add.i32"));
    assert!(text.contains("  ret"));
    assert!(text.trim_end().ends_with("entry main"));
}

// Property: any spelling of Core.FS produces exactly the four canonical
// core.fs imports.
#[test_case("Core.FS" ; "spelling_core_dot_fs")]
#[test_case("core_fs" ; "spelling_core_fs")]
#[test_case("core.fs" ; "spelling_core_dot_fs_lower")]
#[test_case("CORE_FS" ; "spelling_core_fs_upper")]
fn import_canonicalization_is_alias_independent(spelling: &str) {
    let program = Program {
        decls: vec![
            Decl::Import(ImportDecl {
                path: spelling.into(),
                alias: None,
                span: Span::none(),
            }),
            fun("main", "i32", vec![ret(Expr::int("0"))]),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    for symbol in ["open", "close", "read", "write"] {
        let needle = format!("core.fs {symbol} sig=");
        assert_eq!(
            text.matches(&needle).count(),
            1,
            "{spelling}: expected exactly one import of core.fs.{symbol}",
        );
    }
}

#[test]
fn artifact_layout_uses_natural_alignment() {
    // artifact P { x: i32, y: i32 } => size 8, offsets 0 and 4.
    let program = Program {
        decls: vec![
            Decl::Artifact(ArtifactDecl {
                name: "P".into(),
                generics: vec![],
                fields: vec![
                    FieldDecl { name: "x".into(), ty: TypeRef::named("i32"), span: Span::none() },
                    FieldDecl { name: "y".into(), ty: TypeRef::named("i32"), span: Span::none() },
                ],
                methods: vec![],
                span: Span::none(),
            }),
            fun("main", "i32", vec![ret(Expr::int("0"))]),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("type P size=8 kind=artifact"));
    assert!(text.contains("field x i32 offset=0"));
    assert!(text.contains("field y i32 offset=4"));
}

#[test]
fn mixed_width_fields_are_padded() {
    // i8 then i64 then i16: offsets 0, 8, 16; size padded to 24.
    let program = Program {
        decls: vec![
            Decl::Artifact(ArtifactDecl {
                name: "Mixed".into(),
                generics: vec![],
                fields: vec![
                    FieldDecl { name: "a".into(), ty: TypeRef::named("i8"), span: Span::none() },
                    FieldDecl { name: "b".into(), ty: TypeRef::named("i64"), span: Span::none() },
                    FieldDecl { name: "c".into(), ty: TypeRef::named("i16"), span: Span::none() },
                ],
                methods: vec![],
                span: Span::none(),
            }),
            fun("main", "i32", vec![ret(Expr::int("0"))]),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("type Mixed size=24 kind=artifact"));
    assert!(text.contains("field a i8 offset=0"));
    assert!(text.contains("field b i64 offset=8"));
    assert!(text.contains("field c i16 offset=16"));
}

#[test]
fn method_names_are_mangled() {
    let method = FuncDecl {
        name: "getx".into(),
        generics: vec![],
        params: vec![],
        ret: TypeRef::named("i32"),
        body: vec![ret(Expr::field(Expr::ident("self"), "x"))],
        span: Span::none(),
    };
    let program = Program {
        decls: vec![
            Decl::Artifact(ArtifactDecl {
                name: "P".into(),
                generics: vec![],
                fields: vec![FieldDecl {
                    name: "x".into(),
                    ty: TypeRef::named("i32"),
                    span: Span::none(),
                }],
                methods: vec![method],
                span: Span::none(),
            }),
            fun("main", "i32", vec![ret(Expr::int("0"))]),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("func P__getx"));
    assert!(text.contains("sig P__getx: (ref<P>) -> i32"));
}

#[test]
fn script_statements_select_the_script_entry() {
    let program = Program {
        decls: vec![],
        script: vec![Stmt::Let(VarDecl {
            name: "x".into(),
            ty: TypeRef::named("i32"),
            mutability: Mutability::Mutable,
            init: Some(Expr::int("1")),
            span: Span::none(),
        })],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("func __script_entry"));
    assert!(text.trim_end().ends_with("entry __script_entry"));
}

#[test]
fn globals_get_init_consts_and_initializer_function() {
    let program = Program {
        decls: vec![
            Decl::Variable(VarDecl {
                name: "counter".into(),
                ty: TypeRef::named("i32"),
                mutability: Mutability::Mutable,
                init: Some(Expr::int("7")),
                span: Span::none(),
            }),
            fun("main", "i32", vec![ret(Expr::ident("counter"))]),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("const __ginit_counter i32 7"));
    assert!(text.contains("global counter i32 init=__ginit_counter"));
    assert!(text.contains("func __global_init"));
    assert!(text.contains("stglob 0"));
}

#[test]
fn module_functions_are_mangled() {
    let program = Program {
        decls: vec![
            Decl::Module(ModuleDecl {
                name: "Math".into(),
                functions: vec![FuncDecl {
                    name: "one".into(),
                    generics: vec![],
                    params: vec![],
                    ret: TypeRef::named("i32"),
                    body: vec![ret(Expr::int("1"))],
                    span: Span::none(),
                }],
                variables: vec![],
                span: Span::none(),
            }),
            fun(
                "main",
                "i32",
                vec![ret(Expr::call_path(&["Math", "one"], vec![]))],
            ),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("func Math__one"));
    assert!(text.contains("call 0 0"));
}

#[test]
fn module_variables_are_rejected() {
    let program = Program {
        decls: vec![
            Decl::Module(ModuleDecl {
                name: "M".into(),
                functions: vec![],
                variables: vec![VarDecl {
                    name: "state".into(),
                    ty: TypeRef::named("i32"),
                    mutability: Mutability::Mutable,
                    init: None,
                    span: Span::none(),
                }],
                span: Span::none(),
            }),
            fun("main", "i32", vec![ret(Expr::int("0"))]),
        ],
        script: vec![],
    };
    let err = emit_sir(&program).unwrap_err();
    assert_eq!(err.0, "module variables are not supported in SIR emission");
}

#[test]
fn empty_program_is_rejected_with_diagnostic() {
    let program = Program {
        decls: vec![Decl::Enum(EnumDecl {
            name: "E".into(),
            members: vec![EnumMember {
                name: "A".into(),
                value: Some("1".into()),
                span: Span::none(),
            }],
            span: Span::none(),
        })],
        script: vec![],
    };
    let err = emit_sir(&program).unwrap_err();
    assert_eq!(err.0, "program has no functions or top-level statements");
}

#[test]
fn unsupported_import_path_is_rejected() {
    let program = Program {
        decls: vec![
            Decl::Import(ImportDecl {
                path: "Core.Net".into(),
                alias: None,
                span: Span::none(),
            }),
            fun("main", "i32", vec![ret(Expr::int("0"))]),
        ],
        script: vec![],
    };
    let err = emit_sir(&program).unwrap_err();
    assert_eq!(err.0, "unsupported import path: Core.Net");
}

#[test]
fn duplicate_extern_import_is_rejected() {
    let ext = |span| ExternDecl {
        module: Some("mathlib".into()),
        name: "compute".into(),
        params: vec![Param::new("x", TypeRef::named("i32"))],
        ret: TypeRef::named("f64"),
        span,
    };
    let program = Program {
        decls: vec![
            Decl::Extern(ext(Span::none())),
            Decl::Extern(ext(Span::none())),
            fun("main", "i32", vec![ret(Expr::int("0"))]),
        ],
        script: vec![],
    };
    let err = emit_sir(&program).unwrap_err();
    assert_eq!(err.0, "duplicate extern import: mathlib.compute");
}

#[test]
fn extern_with_unsupported_abi_type_is_rejected() {
    let program = Program {
        decls: vec![
            Decl::Extern(ExternDecl {
                module: Some("mathlib".into()),
                name: "consume".into(),
                params: vec![Param::new("data", TypeRef::list_of(TypeRef::named("i32")))],
                ret: TypeRef::void(),
                span: Span::none(),
            }),
            fun("main", "i32", vec![ret(Expr::int("0"))]),
        ],
        script: vec![],
    };
    let err = emit_sir(&program).unwrap_err();
    assert_eq!(
        err.0,
        "extern 'mathlib.consume' parameter 'data' has unsupported ABI type"
    );
}

#[test]
fn scalar_extern_gets_a_dynamic_companion() {
    // S6: extern mathlib.compute(i32) -> f64 synthesizes both the direct
    // import and a call$0 companion under core.dl.
    let program = Program {
        decls: vec![
            Decl::Extern(ExternDecl {
                module: Some("mathlib".into()),
                name: "compute".into(),
                params: vec![Param::new("x", TypeRef::named("i32"))],
                ret: TypeRef::named("f64"),
                span: Span::none(),
            }),
            fun("main", "i32", vec![ret(Expr::int("0"))]),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("import import_0 mathlib compute sig=sig_import_0"));
    assert!(text.contains("import import_1 core.dl call$0 sig=sig_import_1 flags=1"));
    assert!(text.contains("sig sig_import_1: (i64, i32) -> f64"));
}

#[test]
fn enums_emit_as_i32_types_and_constants() {
    let program = Program {
        decls: vec![
            Decl::Enum(EnumDecl {
                name: "Color".into(),
                members: vec![
                    EnumMember { name: "Red".into(), value: Some("1".into()), span: Span::none() },
                    EnumMember { name: "Blue".into(), value: Some("0x10".into()), span: Span::none() },
                ],
                span: Span::none(),
            }),
            fun("main", "i32", vec![ret(Expr::field(Expr::ident("Color"), "Blue"))]),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("type Color size=4 kind=i32"));
    assert!(text.contains("const.i32 16"));
}

#[test]
fn stack_heights_are_declared_per_function() {
    let program = Program {
        decls: vec![fun(
            "main",
            "i32",
            vec![ret(Expr::binary(
                BinaryOp::Add,
                Expr::binary(BinaryOp::Mul, Expr::int("2"), Expr::int("3")),
                Expr::int("4"),
            ))],
        )],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    // 2 and 3 on the stack simultaneously, then product plus 4.
    assert!(text.contains("func main locals=0 stack=2 sig=0"));
}

#[test]
fn lambdas_are_lifted_with_captured_locals() {
    // let base = 10; let f = |x: i32| -> i32 { return base + x }
    let lambda = Expr::new(ExprKind::Lambda {
        params: vec![Param::new("x", TypeRef::named("i32"))],
        ret: TypeRef::named("i32"),
        body: vec![ret(Expr::binary(
            BinaryOp::Add,
            Expr::ident("base"),
            Expr::ident("x"),
        ))],
    });
    let program = Program {
        decls: vec![fun(
            "main",
            "i32",
            vec![
                Stmt::Let(VarDecl {
                    name: "base".into(),
                    ty: TypeRef::named("i32"),
                    mutability: Mutability::Mutable,
                    init: Some(Expr::int("10")),
                    span: Span::none(),
                }),
                Stmt::Let(VarDecl {
                    name: "f".into(),
                    ty: TypeRef::default(),
                    mutability: Mutability::Mutable,
                    init: Some(lambda),
                    span: Span::none(),
                }),
                ret(Expr::call(Expr::ident("f"), vec![Expr::int("32")])),
            ],
        )],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("func __lambda_0"));
    assert!(text.contains("newclosure 1 1"), "one boxed capture expected");
    assert!(text.contains("ldupv 0"));
    assert!(text.contains("callcheck"));
    assert!(text.contains("call.indirect"));
}
