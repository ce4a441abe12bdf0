//! End-to-end scenarios: program tree -> SIR text -> parsed module ->
//! execution, with the capture host.

mod common;

use common::vm_with_host;
use sir_lang::ast::*;
use sir_lang::emit_sir;
use sir_vm::{loader, DlReturn, RecordingHost};

fn fun(name: &str, ret: &str, params: Vec<Param>, body: Vec<Stmt>) -> Decl {
    Decl::Function(FuncDecl {
        name: name.into(),
        generics: vec![],
        params,
        ret: TypeRef::named(ret),
        body,
        span: Span::none(),
    })
}

fn ret(expr: Expr) -> Stmt {
    Stmt::Return { value: Some(expr), span: Span::none() }
}

fn let_var(name: &str, ty: TypeRef, init: Expr) -> Stmt {
    Stmt::Let(VarDecl {
        name: name.into(),
        ty,
        mutability: Mutability::Mutable,
        init: Some(init),
        span: Span::none(),
    })
}

fn run_program(program: &Program, host: RecordingHost) -> (Option<u64>, RecordingHost) {
    let text = emit_sir(program).expect("program emits");
    let mut vm = vm_with_host(&text, host);
    let result = vm.run().expect("program runs");
    let (result, host) = (result, std::mem::take(vm.host_mut()));
    (result, host)
}

#[test]
fn s1_addition_round_trips_and_returns_42() {
    let program = Program {
        decls: vec![fun(
            "main",
            "i32",
            vec![],
            vec![ret(Expr::binary(BinaryOp::Add, Expr::int("41"), Expr::int("1")))],
        )],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();

    // Emit -> parse round-trip: the parsed entry matches the chosen one.
    let module = loader::parse_module(&text).unwrap();
    assert_eq!(module.functions[module.entry as usize].name, "main");

    let (result, _) = run_program(&program, RecordingHost::with_args(&["prog"]));
    assert_eq!(result, Some(42));
}

#[test]
fn s2_reserved_os_import_reads_argv() {
    let program = Program {
        decls: vec![
            Decl::Import(ImportDecl {
                path: "Core.OS".into(),
                alias: None,
                span: Span::none(),
            }),
            fun(
                "main",
                "i32",
                vec![],
                vec![ret(Expr::call_path(&["Core", "OS", "args_count"], vec![]))],
            ),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("core.os args_count sig="));

    let host = RecordingHost::with_args(&["prog", "a", "b"]);
    let (result, _) = run_program(&program, host);
    assert_eq!(result, Some(3));
}

#[test]
fn s3_artifact_method_computes_squared_distance() {
    let dist_sq = FuncDecl {
        name: "distSq".into(),
        generics: vec![],
        params: vec![],
        ret: TypeRef::named("i32"),
        body: vec![ret(Expr::binary(
            BinaryOp::Add,
            Expr::binary(
                BinaryOp::Mul,
                Expr::field(Expr::ident("self"), "x"),
                Expr::field(Expr::ident("self"), "x"),
            ),
            Expr::binary(
                BinaryOp::Mul,
                Expr::field(Expr::ident("self"), "y"),
                Expr::field(Expr::ident("self"), "y"),
            ),
        ))],
        span: Span::none(),
    };
    let program = Program {
        decls: vec![
            Decl::Artifact(ArtifactDecl {
                name: "P".into(),
                generics: vec![],
                fields: vec![
                    FieldDecl { name: "x".into(), ty: TypeRef::named("i32"), span: Span::none() },
                    FieldDecl { name: "y".into(), ty: TypeRef::named("i32"), span: Span::none() },
                ],
                methods: vec![dist_sq],
                span: Span::none(),
            }),
            fun(
                "main",
                "i32",
                vec![],
                vec![
                    let_var(
                        "p",
                        TypeRef::named("P"),
                        Expr::new(ExprKind::ArtifactLit {
                            name: "P".into(),
                            args: vec![Expr::int("3"), Expr::int("4")],
                        }),
                    ),
                    ret(Expr::call(
                        Expr::field(Expr::ident("p"), "distSq"),
                        vec![],
                    )),
                ],
            ),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("type P size=8 kind=artifact"));
    assert!(text.contains("field x i32 offset=0"));
    assert!(text.contains("field y i32 offset=4"));

    let (result, _) = run_program(&program, RecordingHost::with_args(&["prog"]));
    assert_eq!(result, Some(25));
}

#[test]
fn s4_list_literal_indexes_in_order() {
    let program = Program {
        decls: vec![fun(
            "main",
            "i32",
            vec![],
            vec![
                let_var(
                    "l",
                    TypeRef::list_of(TypeRef::named("i32")),
                    Expr::new(ExprKind::ListLit(vec![
                        Expr::int("1"),
                        Expr::int("2"),
                        Expr::int("3"),
                        Expr::int("4"),
                    ])),
                ),
                ret(Expr::binary(
                    BinaryOp::Add,
                    Expr::new(ExprKind::Index {
                        base: Box::new(Expr::ident("l")),
                        index: Box::new(Expr::int("0")),
                    }),
                    Expr::binary(
                        BinaryOp::Mul,
                        Expr::new(ExprKind::Index {
                            base: Box::new(Expr::ident("l")),
                            index: Box::new(Expr::int("3")),
                        }),
                        Expr::int("10"),
                    ),
                )),
            ],
        )],
        script: vec![],
    };
    let (result, _) = run_program(&program, RecordingHost::with_args(&["prog"]));
    assert_eq!(result, Some(41));
}

#[test]
fn s5_closure_survives_collection_between_creation_and_call() {
    // let x = 7; let f = || -> i32 { return x };
    // churn the heap past the collection threshold; f() is still 7.
    let lambda = Expr::new(ExprKind::Lambda {
        params: vec![],
        ret: TypeRef::named("i32"),
        body: vec![ret(Expr::ident("x"))],
    });
    let churn_body = vec![
        let_var("s", TypeRef::named("string"), Expr::binary(
            BinaryOp::Add,
            Expr::str("a"),
            Expr::str("b"),
        )),
        Stmt::Assign {
            target: Expr::ident("i"),
            value: Expr::binary(BinaryOp::Add, Expr::ident("i"), Expr::int("1")),
            span: Span::none(),
        },
    ];
    let program = Program {
        decls: vec![fun(
            "main",
            "i32",
            vec![],
            vec![
                let_var("x", TypeRef::named("i32"), Expr::int("7")),
                let_var("f", TypeRef::default(), lambda),
                let_var("i", TypeRef::named("i32"), Expr::int("0")),
                Stmt::While {
                    cond: Expr::binary(
                        BinaryOp::Lt,
                        Expr::ident("i"),
                        Expr::int("20000"),
                    ),
                    body: churn_body,
                    span: Span::none(),
                },
                ret(Expr::call(Expr::ident("f"), vec![])),
            ],
        )],
        script: vec![],
    };
    let (result, _) = run_program(&program, RecordingHost::with_args(&["prog"]));
    assert_eq!(result, Some(7));
}

#[test]
fn s6_extern_routes_through_the_dynamic_companion() {
    let program = Program {
        decls: vec![
            Decl::Import(ImportDecl {
                path: "Core.DL".into(),
                alias: None,
                span: Span::none(),
            }),
            Decl::Extern(ExternDecl {
                module: Some("mathlib".into()),
                name: "compute".into(),
                params: vec![Param::new("x", TypeRef::named("i32"))],
                ret: TypeRef::named("f64"),
                span: Span::none(),
            }),
            Decl::Variable(VarDecl {
                name: "mathlib_handle".into(),
                ty: TypeRef::named("i64"),
                mutability: Mutability::Mutable,
                init: Some(Expr::call_path(
                    &["Core", "DL", "open"],
                    vec![Expr::str("mathlib")],
                )),
                span: Span::none(),
            }),
            fun(
                "main",
                "i32",
                vec![],
                vec![
                    Stmt::Expr(Expr::call_path(
                        &["mathlib", "compute"],
                        vec![Expr::int("5")],
                    )),
                    ret(Expr::int("0")),
                ],
            ),
        ],
        script: vec![],
    };
    let text = emit_sir(&program).unwrap();
    assert!(text.contains("mathlib compute sig="));
    assert!(text.contains("core.dl call$0"));

    let mut host = RecordingHost::with_args(&["prog"]);
    host.dl_handle = 5555;
    host.dl_answer = 2.5f64.to_bits();
    let (result, host) = run_program(&program, host);
    assert_eq!(result, Some(0));
    assert_eq!(host.dl_calls, vec![(DlReturn::F64, 5555, vec![5])]);
}

#[test]
fn script_programs_print_through_the_host() {
    let program = Program {
        decls: vec![],
        script: vec![
            let_var("x", TypeRef::named("i32"), Expr::int("42")),
            Stmt::Expr(Expr::call(
                Expr::ident("println"),
                vec![Expr::str("x={}"), Expr::ident("x")],
            )),
        ],
    };
    let (result, host) = run_program(&program, RecordingHost::with_args(&["prog"]));
    assert_eq!(result, Some(0));
    assert_eq!(host.stdout_text(), "x=42\n");
}

#[test]
fn reserved_log_import_reaches_the_host() {
    let program = Program {
        decls: vec![
            Decl::Import(ImportDecl {
                path: "Core.Log".into(),
                alias: Some("log".into()),
                span: Span::none(),
            }),
            fun(
                "main",
                "i32",
                vec![],
                vec![
                    Stmt::Expr(Expr::call_path(
                        &["log", "log"],
                        vec![Expr::str("ready"), Expr::int("2")],
                    )),
                    ret(Expr::int("0")),
                ],
            ),
        ],
        script: vec![],
    };
    let (_, host) = run_program(&program, RecordingHost::with_args(&["prog"]));
    assert_eq!(host.logs, vec![("ready".to_owned(), 2)]);
}

#[test]
fn while_loops_and_assignment_compute_iteratively() {
    // sum of 1..=10 via a while loop.
    let program = Program {
        decls: vec![fun(
            "main",
            "i32",
            vec![],
            vec![
                let_var("sum", TypeRef::named("i32"), Expr::int("0")),
                let_var("i", TypeRef::named("i32"), Expr::int("1")),
                Stmt::While {
                    cond: Expr::binary(BinaryOp::Le, Expr::ident("i"), Expr::int("10")),
                    body: vec![
                        Stmt::Assign {
                            target: Expr::ident("sum"),
                            value: Expr::binary(
                                BinaryOp::Add,
                                Expr::ident("sum"),
                                Expr::ident("i"),
                            ),
                            span: Span::none(),
                        },
                        Stmt::Assign {
                            target: Expr::ident("i"),
                            value: Expr::binary(
                                BinaryOp::Add,
                                Expr::ident("i"),
                                Expr::int("1"),
                            ),
                            span: Span::none(),
                        },
                    ],
                    span: Span::none(),
                },
                ret(Expr::ident("sum")),
            ],
        )],
        script: vec![],
    };
    let (result, _) = run_program(&program, RecordingHost::with_args(&["prog"]));
    assert_eq!(result, Some(55));
}

#[test]
fn enum_values_flow_through_calls() {
    let program = Program {
        decls: vec![
            Decl::Enum(EnumDecl {
                name: "Mode".into(),
                members: vec![
                    EnumMember { name: "Off".into(), value: Some("0".into()), span: Span::none() },
                    EnumMember { name: "On".into(), value: Some("41".into()), span: Span::none() },
                ],
                span: Span::none(),
            }),
            fun(
                "bump",
                "i32",
                vec![Param::new("m", TypeRef::named("Mode"))],
                vec![ret(Expr::binary(
                    BinaryOp::Add,
                    Expr::ident("m"),
                    Expr::int("1"),
                ))],
            ),
            fun(
                "main",
                "i32",
                vec![],
                vec![ret(Expr::call(
                    Expr::ident("bump"),
                    vec![Expr::field(Expr::ident("Mode"), "On")],
                ))],
            ),
        ],
        script: vec![],
    };
    let (result, _) = run_program(&program, RecordingHost::with_args(&["prog"]));
    assert_eq!(result, Some(42));
}
