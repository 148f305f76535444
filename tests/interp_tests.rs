/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * End-to-end interpreter tests: whole programs assembled as syntax trees
 * and run through `Interp::evaluate`, the way an embedding host would.
 *
 * License:
 * This file is part of the Pyrite project.
 *
 * Pyrite is dual-licensed under the terms of:
 *   - The MIT License
 *   - The Apache License, Version 2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under these licenses is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *
 * ==========================================================================
 */

use pretty_assertions::assert_eq;
use pyrite::ast::{
    Arg, BinOp, CmpOp, ExceptHandler, Expr, FuncDef, Param, Stmt, Target,
};
use pyrite::{ExcKind, FatalError, Interp, TopError, Value};

fn run(program: &[Stmt]) -> Value {
    Interp::with_prelude().evaluate(program).unwrap()
}

fn run_err(program: &[Stmt]) -> TopError {
    Interp::with_prelude().evaluate(program).unwrap_err()
}

fn def(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Stmt {
    Stmt::FuncDef(FuncDef {
        name: name.into(),
        params,
        vararg: None,
        kwarg: None,
        body,
        decorators: vec![],
    })
}

fn method(name: &str, params: Vec<&str>, body: Vec<Stmt>) -> Stmt {
    def(
        name,
        params.into_iter().map(Param::required).collect(),
        body,
    )
}

fn set_self_attr(attr: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        target: Target::Attribute {
            object: Expr::name("self"),
            name: attr.into(),
        },
        value,
    }
}

fn class(name: &str, parent: Option<&str>, body: Vec<Stmt>) -> Stmt {
    Stmt::ClassDef {
        name: name.into(),
        parent: parent.map(Expr::name),
        body,
        decorators: vec![],
    }
}

#[test]
fn binder_handles_positionals_defaults_and_catch_alls() {
    // def f(a, b=10, *rest, **kw): return (a, b, rest, kw["x"])
    // f(1, 2, 3, 4, x=5)
    let program = [
        Stmt::FuncDef(FuncDef {
            name: "f".into(),
            params: vec![
                Param::required("a"),
                Param::defaulted("b", Expr::Int(10)),
            ],
            vararg: Some("rest".into()),
            kwarg: Some("kw".into()),
            body: vec![Stmt::Return(Some(Expr::Tuple(vec![
                Expr::name("a"),
                Expr::name("b"),
                Expr::name("rest"),
                Expr::name("kw").index(Expr::str_("x")),
            ])))],
            decorators: vec![],
        }),
        Stmt::Expr(Expr::name("f").call_with(vec![
            Arg::Pos(Expr::Int(1)),
            Arg::Pos(Expr::Int(2)),
            Arg::Pos(Expr::Int(3)),
            Arg::Pos(Expr::Int(4)),
            Arg::Keyword {
                name: "x".into(),
                value: Expr::Int(5),
            },
        ])),
    ];
    assert_eq!(
        run(&program),
        Value::tuple(vec![
            Value::Int(1),
            Value::Int(2),
            Value::list(vec![Value::Int(3), Value::Int(4)]),
            Value::Int(5),
        ])
    );
}

#[test]
fn late_bound_defaults_produce_fresh_values_per_call() {
    // def f(xs=[]): return xs ; f() is f() → False
    let program = [
        Stmt::FuncDef(FuncDef {
            name: "f".into(),
            params: vec![Param::defaulted("xs", Expr::List(vec![]))],
            vararg: None,
            kwarg: None,
            body: vec![Stmt::Return(Some(Expr::name("xs")))],
            decorators: vec![],
        }),
        Stmt::Expr(Expr::compare(
            CmpOp::Is,
            Expr::name("f").call(vec![]),
            Expr::name("f").call(vec![]),
        )),
    ];
    assert_eq!(run(&program), Value::Bool(false));
}

#[test]
fn cooperative_super_chain_builds_the_full_state() {
    // class A: __init__ sets n = 1
    // class B(A): __init__ calls super().__init__(), then n += 4, extra = 1
    let program = [
        class(
            "A",
            None,
            vec![method(
                "__init__",
                vec!["self"],
                vec![set_self_attr("n", Expr::Int(1))],
            )],
        ),
        class(
            "B",
            Some("A"),
            vec![method(
                "__init__",
                vec!["self"],
                vec![
                    Stmt::Expr(
                        Expr::Super { args: None }.attr("__init__").call(vec![]),
                    ),
                    set_self_attr(
                        "n",
                        Expr::binary(
                            BinOp::Add,
                            Expr::name("self").attr("n"),
                            Expr::Int(4),
                        ),
                    ),
                    set_self_attr("extra", Expr::Int(1)),
                ],
            )],
        ),
        Stmt::assign("b", Expr::name("B").call(vec![])),
        Stmt::Expr(Expr::Tuple(vec![
            Expr::name("b").attr("n"),
            Expr::name("b").attr("extra"),
        ])),
    ];
    assert_eq!(
        run(&program),
        Value::tuple(vec![Value::Int(5), Value::Int(1)])
    );
}

#[test]
fn explicit_super_resolves_above_the_named_class() {
    // Three levels; super(B, c).name() starts above B and finds A's method.
    let program = [
        class(
            "A",
            None,
            vec![method(
                "name",
                vec!["self"],
                vec![Stmt::Return(Some(Expr::str_("A")))],
            )],
        ),
        class(
            "B",
            Some("A"),
            vec![method(
                "name",
                vec!["self"],
                vec![Stmt::Return(Some(Expr::str_("B")))],
            )],
        ),
        class(
            "C",
            Some("B"),
            vec![method(
                "name",
                vec!["self"],
                vec![Stmt::Return(Some(Expr::str_("C")))],
            )],
        ),
        Stmt::assign("c", Expr::name("C").call(vec![])),
        Stmt::Expr(
            Expr::Super {
                args: Some((
                    Box::new(Expr::name("B")),
                    Box::new(Expr::name("c")),
                )),
            }
            .attr("name")
            .call(vec![]),
        ),
    ];
    assert_eq!(run(&program), Value::str("A"));
}

#[test]
fn classmethod_factories_construct_the_receiving_subclass() {
    // class Base: @classmethod def make(cls): return cls()
    // class Sub(Base): pass ; type(Sub.make()) → "Sub"
    let program = [
        class(
            "Base",
            None,
            vec![Stmt::FuncDef(FuncDef {
                name: "make".into(),
                params: vec![Param::required("cls")],
                vararg: None,
                kwarg: None,
                body: vec![Stmt::Return(Some(Expr::name("cls").call(vec![])))],
                decorators: vec![Expr::name("classmethod")],
            })],
        ),
        class("Sub", Some("Base"), vec![Stmt::Pass]),
        Stmt::Expr(
            Expr::name("type").call(vec![Expr::name("Sub").attr("make").call(vec![])]),
        ),
    ];
    assert_eq!(run(&program), Value::str("Sub"));
}

#[test]
fn properties_route_through_getter_and_setter() {
    let program = [
        class(
            "Box",
            None,
            vec![
                method(
                    "__init__",
                    vec!["self"],
                    vec![set_self_attr("_x", Expr::Int(0))],
                ),
                Stmt::FuncDef(FuncDef {
                    name: "x".into(),
                    params: vec![Param::required("self")],
                    vararg: None,
                    kwarg: None,
                    body: vec![Stmt::Return(Some(Expr::name("self").attr("_x")))],
                    decorators: vec![Expr::name("property")],
                }),
                Stmt::FuncDef(FuncDef {
                    name: "x".into(),
                    params: vec![Param::required("self"), Param::required("v")],
                    vararg: None,
                    kwarg: None,
                    body: vec![set_self_attr(
                        "_x",
                        Expr::binary(BinOp::Mul, Expr::name("v"), Expr::Int(2)),
                    )],
                    decorators: vec![Expr::name("x").attr("setter")],
                }),
            ],
        ),
        Stmt::assign("b", Expr::name("Box").call(vec![])),
        Stmt::Assign {
            target: Target::Attribute {
                object: Expr::name("b"),
                name: "x".into(),
            },
            value: Expr::Int(5),
        },
        Stmt::Expr(Expr::name("b").attr("x")),
    ];
    assert_eq!(run(&program), Value::Int(10));
}

#[test]
fn writing_a_setterless_property_is_an_attribute_error() {
    let program = [
        class(
            "RO",
            None,
            vec![Stmt::FuncDef(FuncDef {
                name: "x".into(),
                params: vec![Param::required("self")],
                vararg: None,
                kwarg: None,
                body: vec![Stmt::Return(Some(Expr::Int(1)))],
                decorators: vec![Expr::name("property")],
            })],
        ),
        Stmt::assign("r", Expr::name("RO").call(vec![])),
        Stmt::Assign {
            target: Target::Attribute {
                object: Expr::name("r"),
                name: "x".into(),
            },
            value: Expr::Int(9),
        },
    ];
    assert!(matches!(run_err(&program), TopError::Uncaught { kind, .. }
        if kind == ExcKind::AttributeError));
}

#[test]
fn operator_dunders_dispatch_on_the_left_instance() {
    let program = [
        class(
            "Vec",
            None,
            vec![
                method(
                    "__init__",
                    vec!["self", "x"],
                    vec![set_self_attr("x", Expr::name("x"))],
                ),
                method(
                    "__add__",
                    vec!["self", "other"],
                    vec![Stmt::Return(Some(Expr::name("Vec").call(vec![
                        Expr::binary(
                            BinOp::Add,
                            Expr::name("self").attr("x"),
                            Expr::name("other").attr("x"),
                        ),
                    ])))],
                ),
            ],
        ),
        Stmt::Expr(
            Expr::binary(
                BinOp::Add,
                Expr::name("Vec").call(vec![Expr::Int(1)]),
                Expr::name("Vec").call(vec![Expr::Int(2)]),
            )
            .attr("x"),
        ),
    ];
    assert_eq!(run(&program), Value::Int(3));

    // No reflected form: int + Vec stays a TypeError.
    let program = [
        class(
            "Vec",
            None,
            vec![method(
                "__add__",
                vec!["self", "other"],
                vec![Stmt::Return(Some(Expr::Int(0)))],
            )],
        ),
        Stmt::Expr(Expr::binary(
            BinOp::Add,
            Expr::Int(1),
            Expr::name("Vec").call(vec![]),
        )),
    ];
    assert!(matches!(run_err(&program), TopError::Uncaught { kind, .. }
        if kind == ExcKind::TypeError));
}

#[test]
fn except_clauses_try_in_order_and_match_by_hierarchy() {
    // KeyError raised; the TypeError clause is skipped, Exception catches.
    let program = [
        Stmt::Try {
            body: vec![Stmt::Raise(Some(
                Expr::name("KeyError").call(vec![Expr::str_("k")]),
            ))],
            handlers: vec![
                ExceptHandler {
                    kind: Some("TypeError".into()),
                    name: None,
                    body: vec![Stmt::assign("out", Expr::str_("type"))],
                },
                ExceptHandler {
                    kind: Some("Exception".into()),
                    name: Some("e".into()),
                    body: vec![Stmt::assign("out", Expr::name("e").attr("kind"))],
                },
            ],
            finally: vec![],
        },
        Stmt::Expr(Expr::name("out")),
    ];
    assert_eq!(run(&program), Value::str("KeyError"));
}

#[test]
fn for_else_runs_on_exhaustion_but_not_after_break() {
    let search = |needle: i64| -> Vec<Stmt> {
        vec![
            Stmt::assign("found", Expr::Bool(false)),
            Stmt::For {
                target: Target::Name("x".into()),
                iter: Expr::List(vec![Expr::Int(1), Expr::Int(2), Expr::Int(3)]),
                body: vec![Stmt::If {
                    test: Expr::compare(CmpOp::Eq, Expr::name("x"), Expr::Int(needle)),
                    body: vec![
                        Stmt::assign("found", Expr::Bool(true)),
                        Stmt::Break,
                    ],
                    orelse: vec![],
                }],
                orelse: vec![Stmt::assign("found", Expr::str_("exhausted"))],
            },
            Stmt::Expr(Expr::name("found")),
        ]
    };
    assert_eq!(run(&search(2)), Value::Bool(true));
    assert_eq!(run(&search(9)), Value::str("exhausted"));
}

#[test]
fn finally_runs_once_on_every_exit_path() {
    // A shared one-slot counter bumped by each finally.
    let bump = Stmt::Assign {
        target: Target::Index {
            object: Expr::name("count"),
            index: Expr::Int(0),
        },
        value: Expr::binary(
            BinOp::Add,
            Expr::name("count").index(Expr::Int(0)),
            Expr::Int(1),
        ),
    };
    let program = [
        Stmt::assign("count", Expr::List(vec![Expr::Int(0)])),
        // 1. normal completion
        Stmt::Try {
            body: vec![Stmt::Pass],
            handlers: vec![],
            finally: vec![bump.clone()],
        },
        // 2. return path
        def(
            "f",
            vec![],
            vec![Stmt::Try {
                body: vec![Stmt::Return(Some(Expr::Int(7)))],
                handlers: vec![],
                finally: vec![bump.clone()],
            }],
        ),
        Stmt::Expr(Expr::name("f").call(vec![])),
        // 3. raise path (caught outside the finally's try)
        Stmt::Try {
            body: vec![Stmt::Try {
                body: vec![Stmt::Raise(Some(Expr::name("ValueError").call(vec![])))],
                handlers: vec![],
                finally: vec![bump.clone()],
            }],
            handlers: vec![ExceptHandler {
                kind: None,
                name: None,
                body: vec![Stmt::Pass],
            }],
            finally: vec![],
        },
        // 4 + 5. break and continue paths inside a loop
        Stmt::assign("i", Expr::Int(0)),
        Stmt::While {
            test: Expr::compare(CmpOp::Lt, Expr::name("i"), Expr::Int(2)),
            body: vec![
                Stmt::AugAssign {
                    target: Target::Name("i".into()),
                    op: BinOp::Add,
                    value: Expr::Int(1),
                },
                Stmt::Try {
                    body: vec![Stmt::If {
                        test: Expr::compare(CmpOp::Eq, Expr::name("i"), Expr::Int(1)),
                        body: vec![Stmt::Continue],
                        orelse: vec![Stmt::Break],
                    }],
                    handlers: vec![],
                    finally: vec![bump.clone()],
                },
            ],
            orelse: vec![],
        },
        Stmt::Expr(Expr::name("count").index(Expr::Int(0))),
    ];
    assert_eq!(run(&program), Value::Int(5));
}

#[test]
fn with_suppresses_only_when_exit_returns_truthy() {
    let cm = |suppress: bool| {
        class(
            "CM",
            None,
            vec![
                method(
                    "__enter__",
                    vec!["self"],
                    vec![Stmt::Return(Some(Expr::name("self")))],
                ),
                method(
                    "__exit__",
                    vec!["self", "kind", "exc", "tb"],
                    vec![
                        set_self_attr("saw", Expr::name("kind")),
                        Stmt::Return(Some(Expr::Bool(suppress))),
                    ],
                ),
            ],
        )
    };

    let program = [
        cm(true),
        Stmt::assign("c", Expr::name("CM").call(vec![])),
        Stmt::With {
            context: Expr::name("c"),
            target: None,
            body: vec![Stmt::Raise(Some(
                Expr::name("ValueError").call(vec![Expr::str_("boom")]),
            ))],
        },
        Stmt::Expr(Expr::name("c").attr("saw")),
    ];
    // Suppressed, and __exit__ saw the kind name.
    assert_eq!(run(&program), Value::str("ValueError"));

    let program = [
        cm(false),
        Stmt::With {
            context: Expr::name("CM").call(vec![]),
            target: None,
            body: vec![Stmt::Raise(Some(
                Expr::name("ValueError").call(vec![Expr::str_("boom")]),
            ))],
        },
    ];
    assert!(matches!(run_err(&program), TopError::Uncaught { kind, .. }
        if kind == ExcKind::ValueError));
}

#[test]
fn truthiness_prefers_bool_over_len() {
    let program = [
        class(
            "Empty",
            None,
            vec![method(
                "__len__",
                vec!["self"],
                vec![Stmt::Return(Some(Expr::Int(0)))],
            )],
        ),
        class(
            "Forced",
            None,
            vec![
                method(
                    "__len__",
                    vec!["self"],
                    vec![Stmt::Return(Some(Expr::Int(0)))],
                ),
                method(
                    "__bool__",
                    vec!["self"],
                    vec![Stmt::Return(Some(Expr::Bool(true)))],
                ),
            ],
        ),
        Stmt::Expr(Expr::Tuple(vec![
            Expr::name("bool").call(vec![Expr::name("Empty").call(vec![])]),
            Expr::name("bool").call(vec![Expr::name("Forced").call(vec![])]),
        ])),
    ];
    assert_eq!(
        run(&program),
        Value::tuple(vec![Value::Bool(false), Value::Bool(true)])
    );
}

#[test]
fn user_iterators_end_on_stop_iteration_and_stay_exhausted() {
    // A countdown: 2, 1, then StopIteration. Driven through a for loop,
    // then probed again with next(it, default).
    let program = [
        class(
            "Down",
            None,
            vec![
                method(
                    "__init__",
                    vec!["self"],
                    vec![set_self_attr("n", Expr::Int(2))],
                ),
                method("__iter__", vec!["self"], vec![Stmt::Return(Some(Expr::name("self")))]),
                method(
                    "__next__",
                    vec!["self"],
                    vec![
                        Stmt::If {
                            test: Expr::compare(
                                CmpOp::Eq,
                                Expr::name("self").attr("n"),
                                Expr::Int(0),
                            ),
                            body: vec![Stmt::Raise(Some(
                                Expr::name("StopIteration").call(vec![]),
                            ))],
                            orelse: vec![],
                        },
                        set_self_attr(
                            "n",
                            Expr::binary(
                                BinOp::Sub,
                                Expr::name("self").attr("n"),
                                Expr::Int(1),
                            ),
                        ),
                        Stmt::Return(Some(Expr::name("self").attr("n"))),
                    ],
                ),
            ],
        ),
        Stmt::assign("it", Expr::name("iter").call(vec![Expr::name("Down").call(vec![])])),
        Stmt::assign("seen", Expr::List(vec![])),
        Stmt::For {
            target: Target::Name("x".into()),
            iter: Expr::name("it"),
            body: vec![Stmt::Assign {
                target: Target::Slice {
                    object: Expr::name("seen"),
                    start: Some(Expr::name("len").call(vec![Expr::name("seen")])),
                    stop: None,
                    step: None,
                },
                value: Expr::List(vec![Expr::name("x")]),
            }],
            orelse: vec![],
        },
        Stmt::Expr(Expr::Tuple(vec![
            Expr::name("seen"),
            Expr::name("next").call(vec![Expr::name("it"), Expr::str_("done")]),
        ])),
    ];
    assert_eq!(
        run(&program),
        Value::tuple(vec![
            Value::list(vec![Value::Int(1), Value::Int(0)]),
            Value::str("done"),
        ])
    );
}

#[test]
fn nonlocal_rebinding_is_visible_to_sibling_closures() {
    let program = [
        def(
            "outer",
            vec![],
            vec![
                Stmt::assign("n", Expr::Int(0)),
                def(
                    "inc",
                    vec![],
                    vec![
                        Stmt::Nonlocal(vec!["n".into()]),
                        Stmt::assign(
                            "n",
                            Expr::binary(BinOp::Add, Expr::name("n"), Expr::Int(1)),
                        ),
                    ],
                ),
                def("get", vec![], vec![Stmt::Return(Some(Expr::name("n")))]),
                Stmt::Expr(Expr::name("inc").call(vec![])),
                Stmt::Expr(Expr::name("inc").call(vec![])),
                Stmt::Return(Some(Expr::name("get").call(vec![]))),
            ],
        ),
        Stmt::Expr(Expr::name("outer").call(vec![])),
    ];
    assert_eq!(run(&program), Value::Int(2));
}

#[test]
fn cancellation_unwinds_as_fatal_but_still_runs_finally() {
    let mut interp = Interp::with_prelude();
    interp.register_native("trip", |_interp, call| {
        call.cancel.cancel();
        Ok(Value::None)
    });
    let program = [
        Stmt::assign("cleaned", Expr::Bool(false)),
        Stmt::Try {
            body: vec![Stmt::While {
                test: Expr::Bool(true),
                body: vec![Stmt::Expr(Expr::name("trip").call(vec![]))],
                orelse: vec![],
            }],
            // A bare except must NOT see the fatal unwind.
            handlers: vec![ExceptHandler {
                kind: None,
                name: None,
                body: vec![Stmt::assign("cleaned", Expr::str_("caught"))],
            }],
            finally: vec![Stmt::assign("cleaned", Expr::Bool(true))],
        },
    ];
    let err = interp.evaluate(&program).unwrap_err();
    assert!(matches!(err, TopError::Fatal(FatalError::Cancelled)));
    let env = interp.globals();
    assert_eq!(
        pyrite::Environment::lookup(&env, "cleaned"),
        Some(Value::Bool(true))
    );
}

#[test]
fn recursion_limit_is_fatal() {
    let program = [
        def(
            "f",
            vec![],
            vec![Stmt::Return(Some(Expr::name("f").call(vec![])))],
        ),
        Stmt::Expr(Expr::name("f").call(vec![])),
    ];
    assert!(matches!(
        run_err(&program),
        TopError::Fatal(FatalError::RecursionLimit)
    ));
}

#[test]
fn exit_requests_surface_as_exit_and_are_catchable() {
    let program = [Stmt::Expr(Expr::name("exit").call(vec![Expr::Int(3)]))];
    assert!(matches!(run_err(&program), TopError::Exit(3)));

    let program = [
        Stmt::Try {
            body: vec![Stmt::Expr(Expr::name("exit").call(vec![Expr::Int(3)]))],
            handlers: vec![ExceptHandler {
                kind: Some("SystemExit".into()),
                name: Some("e".into()),
                body: vec![Stmt::assign("out", Expr::name("e").attr("code"))],
            }],
            finally: vec![],
        },
        Stmt::Expr(Expr::name("out")),
    ];
    assert_eq!(run(&program), Value::Int(3));
}

#[test]
fn repr_round_trips_flat_literals() {
    let program = [Stmt::Expr(Expr::name("repr").call(vec![Expr::List(vec![
        Expr::Int(1),
        Expr::str_("a"),
        Expr::Tuple(vec![Expr::Float(2.5), Expr::None, Expr::Bool(true)]),
    ])]))];
    assert_eq!(run(&program), Value::str("[1, \"a\", (2.5, None, True)]"));
}

#[test]
fn str_dunder_feeds_print_style_rendering() {
    let program = [
        class(
            "Tag",
            None,
            vec![method(
                "__str__",
                vec!["self"],
                vec![Stmt::Return(Some(Expr::str_("#tag")))],
            )],
        ),
        Stmt::Expr(Expr::name("str").call(vec![Expr::name("Tag").call(vec![])])),
    ];
    assert_eq!(run(&program), Value::str("#tag"));
}

#[test]
fn evaluate_yields_the_last_expression_value() {
    let program = [
        Stmt::assign("x", Expr::Int(2)),
        Stmt::Expr(Expr::binary(BinOp::Mul, Expr::name("x"), Expr::Int(3))),
        Stmt::assign("y", Expr::Int(9)),
    ];
    // Trailing assignment is not an expression; the last expression wins.
    assert_eq!(run(&program), Value::Int(6));

    assert_eq!(run(&[Stmt::Pass]), Value::None);
}

#[test]
fn uncaught_exceptions_report_kind_and_message() {
    let program = [Stmt::Raise(Some(
        Expr::name("ValueError").call(vec![Expr::str_("bad input")]),
    ))];
    match run_err(&program) {
        TopError::Uncaught { kind, message } => {
            assert_eq!(kind, ExcKind::ValueError);
            assert_eq!(message, "bad input");
        }
        other => panic!("expected uncaught exception, got {other:?}"),
    }
}
