/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * Interpreter Entry & Runtime Bootstrap
 * -------------------------------------
 * This module is the primary runtime entrypoint. It owns the interpreter
 * instance (root frame, cancellation token, recursion accounting), installs
 * the prelude of built-in callables, and exposes the host surface:
 * evaluate / call_function / new_instance / raise_kind / register_native.
 *
 * All actual evaluation logic is delegated to the submodules:
 *
 *  - statements.rs   → statement execution (exec_stmt / ExecSignal)
 *  - expressions.rs  → expression evaluation (eval_expr)
 *  - calls.rs        → call binding and function invocation
 *  - classes.rs      → class construction, dispatch, super()
 *  - iterators.rs    → the iterator protocol
 *  - display.rs      → stringify (str / repr)
 *  - helpers.rs      → truthiness, equality, ordering, indexing, slicing
 *  - environment.rs  → scope frames
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

pub mod calls;
pub mod classes;
pub mod display;
pub mod environment;
pub mod expressions;
pub mod helpers;
pub mod iterators;
pub mod statements;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::ast::Stmt;
use crate::error::{
    raise_kind, stop_iteration, system_exit, type_error, value_error, EvalError, EvalResult,
    ExcKind, ExceptionObject, FatalError, TopError, ALL_KINDS,
};
use crate::value::{NativeFunction, Value};

use display::StrMode;
use environment::{EnvRef, Environment};
use statements::ExecSignal;

/// Out-of-band cancellation signal shared between the host and one running
/// evaluation. Checked between statements and offered to every native call;
/// when set, the evaluation unwinds as a FATAL error, running pending
/// `finally` / `__exit__` cleanups on the way out.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything a native function receives: already-bound argument values and
/// the cancellation token (to be polled inside blocking work).
pub struct NativeCall {
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
    pub cancel: CancelToken,
}

impl NativeCall {
    /// Positional-arity check; keyword arguments must be consumed
    /// explicitly by natives that accept them.
    pub fn expect_args(&self, name: &str, min: usize, max: usize) -> EvalResult<()> {
        let n = self.args.len();
        if n < min || n > max {
            let expected = if min == max {
                format!("{min}")
            } else {
                format!("{min} to {max}")
            };
            return Err(type_error(format!(
                "{name}() takes {expected} argument(s) but {n} were given"
            )));
        }
        Ok(())
    }
}

/// One isolated evaluator instance: a root frame, a cancellation token and
/// recursion accounting. Concurrency is achieved by running multiple
/// instances, never by sharing one instance's frames.
pub struct Interp {
    pub(crate) globals: EnvRef,
    pub(crate) cancel: CancelToken,
    pub(crate) max_depth: usize,
    pub(crate) depth: usize,
    /// Exception values of the `except` handlers currently executing,
    /// innermost last; bare `raise` re-propagates the top entry.
    pub(crate) handler_stack: Vec<Value>,
    /// True while a `finally` block or `__exit__` method runs. Cleanup code
    /// must finish even when the host has cancelled the evaluation.
    pub(crate) in_cleanup: bool,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    /// A fresh instance with an empty root frame.
    pub fn new() -> Self {
        Self {
            globals: Rc::new(RefCell::new(Environment::new(None))),
            cancel: CancelToken::new(),
            max_depth: 256,
            depth: 0,
            handler_stack: Vec::new(),
            in_cleanup: false,
        }
    }

    /// A fresh instance with the built-in callables and exception
    /// constructors pre-registered.
    pub fn with_prelude() -> Self {
        let mut interp = Self::new();
        interp.install_prelude();
        interp
    }

    pub fn globals(&self) -> EnvRef {
        Rc::clone(&self.globals)
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn set_max_depth(&mut self, depth: usize) {
        self.max_depth = depth;
    }

    /// Whether the current evaluation should stop for cancellation. Always
    /// false inside cleanup code (`finally` / `__exit__`), which runs to
    /// completion even while a cancellation unwinds.
    pub(crate) fn cancelled_now(&self) -> bool {
        !self.in_cleanup && self.cancel.is_cancelled()
    }

    /// Runs cleanup code with cancellation polling suspended.
    pub(crate) fn run_cleanup<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let prev = self.in_cleanup;
        self.in_cleanup = true;
        let result = f(self);
        self.in_cleanup = prev;
        result
    }

    /// Installs a host callable into the root frame.
    pub fn register_native<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut Interp, NativeCall) -> EvalResult<Value> + 'static,
    {
        let native = Value::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            func: Arc::new(func),
        }));
        self.globals.borrow_mut().define(name, native);
    }

    /// Builds an exception of the given kind, ready to be returned from a
    /// native function or inspected by the host.
    pub fn raise_kind(&self, kind: ExcKind, message: impl Into<String>) -> EvalError {
        raise_kind(kind, message)
    }

    /// Evaluates a top-level tree against the root frame. Yields the value
    /// of the final expression statement (else none). Unhandled CATCHABLE
    /// conditions, FATAL conditions and exit requests surface as `TopError`.
    pub fn evaluate(&mut self, program: &[Stmt]) -> Result<Value, TopError> {
        debug!(statements = program.len(), "evaluating top-level tree");
        let globals = Rc::clone(&self.globals);
        let mut last = Value::None;
        for stmt in program {
            if self.cancelled_now() {
                debug!("evaluation cancelled between statements");
                return Err(TopError::Fatal(FatalError::Cancelled));
            }
            let signal = match stmt {
                Stmt::Expr(expr) => match self.eval_expr(expr, &globals) {
                    Ok(v) => {
                        last = v;
                        Ok(ExecSignal::None)
                    }
                    Err(e) => Err(e),
                },
                other => self.exec_stmt(other, &globals),
            };
            match signal {
                Ok(ExecSignal::None) => {}
                Ok(ExecSignal::Return(_)) => {
                    return Err(TopError::Fatal(FatalError::Malformed(
                        "'return' outside function".into(),
                    )))
                }
                Ok(ExecSignal::Break) | Ok(ExecSignal::Continue) => {
                    return Err(TopError::Fatal(FatalError::Malformed(
                        "'break' or 'continue' outside loop".into(),
                    )))
                }
                Err(err) => return Err(self.report(err)),
            }
        }
        Ok(last)
    }

    /// Calls any callable value with pre-evaluated arguments. The host-side
    /// twin of an in-script call expression.
    pub fn call_function(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        self.call_value(callee.clone(), args, kwargs)
    }

    /// Instantiates a class value and runs its `__init__` chain.
    pub fn new_instance(
        &mut self,
        class: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        match class {
            Value::Class(cls) => self.construct_instance(cls, args, kwargs),
            other => Err(type_error(format!(
                "'{}' is not a class",
                other.type_name()
            ))),
        }
    }

    fn report(&self, err: EvalError) -> TopError {
        match err {
            EvalError::Fatal(f) => TopError::Fatal(f),
            EvalError::Raise(Value::Exception(exc)) => {
                if exc.kind == ExcKind::SystemExit {
                    TopError::Exit(exc.exit_code.unwrap_or(0))
                } else {
                    debug!(kind = %exc.kind, message = %exc.message, "uncaught exception");
                    TopError::Uncaught {
                        kind: exc.kind,
                        message: exc.message.clone(),
                    }
                }
            }
            EvalError::Raise(other) => TopError::Fatal(FatalError::Internal(format!(
                "raise of non-exception value '{}'",
                other.type_name()
            ))),
        }
    }

    // ---------------------------------------------------------------------
    // Prelude
    // ---------------------------------------------------------------------

    fn install_prelude(&mut self) {
        self.register_native("print", |interp, call| {
            let mut parts = Vec::with_capacity(call.args.len());
            for v in &call.args {
                parts.push(interp.stringify(v, StrMode::Str)?);
            }
            println!("{}", parts.join(" "));
            Ok(Value::None)
        });

        self.register_native("len", |interp, call| {
            call.expect_args("len", 1, 1)?;
            let n = interp.value_len(&call.args[0])?;
            Ok(Value::Int(n))
        });

        self.register_native("str", |interp, call| {
            call.expect_args("str", 0, 1)?;
            match call.args.first() {
                Some(v) => Ok(Value::str(interp.stringify(v, StrMode::Str)?)),
                None => Ok(Value::str("")),
            }
        });

        self.register_native("repr", |interp, call| {
            call.expect_args("repr", 1, 1)?;
            Ok(Value::str(interp.stringify(&call.args[0], StrMode::Repr)?))
        });

        self.register_native("bool", |interp, call| {
            call.expect_args("bool", 0, 1)?;
            match call.args.first() {
                Some(v) => Ok(Value::Bool(interp.truthy(v)?)),
                None => Ok(Value::Bool(false)),
            }
        });

        self.register_native("int", |_interp, call| {
            call.expect_args("int", 0, 1)?;
            match call.args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Int(n)) => Ok(Value::Int(*n)),
                Some(Value::Float(f)) => Ok(Value::Int(*f as i64)),
                Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
                Some(Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    value_error(format!("invalid literal for int(): '{s}'"))
                }),
                Some(other) => Err(type_error(format!(
                    "int() argument must be a number or string, not '{}'",
                    other.type_name()
                ))),
            }
        });

        self.register_native("float", |_interp, call| {
            call.expect_args("float", 0, 1)?;
            match call.args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Int(n)) => Ok(Value::Float(*n as f64)),
                Some(Value::Float(f)) => Ok(Value::Float(*f)),
                Some(Value::Bool(b)) => Ok(Value::Float(f64::from(u8::from(*b)))),
                Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                    value_error(format!("could not convert string to float: '{s}'"))
                }),
                Some(other) => Err(type_error(format!(
                    "float() argument must be a number or string, not '{}'",
                    other.type_name()
                ))),
            }
        });

        self.register_native("type", |_interp, call| {
            call.expect_args("type", 1, 1)?;
            Ok(Value::str(call.args[0].type_name()))
        });

        self.register_native("range", |_interp, call| {
            call.expect_args("range", 1, 3)?;
            let get = |v: &Value| {
                v.as_int().ok_or_else(|| {
                    type_error(format!(
                        "range() arguments must be integers, not '{}'",
                        v.type_name()
                    ))
                })
            };
            let (start, stop, step) = match call.args.len() {
                1 => (0, get(&call.args[0])?, 1),
                2 => (get(&call.args[0])?, get(&call.args[1])?, 1),
                _ => (
                    get(&call.args[0])?,
                    get(&call.args[1])?,
                    get(&call.args[2])?,
                ),
            };
            if step == 0 {
                return Err(value_error("range() step must not be zero"));
            }
            Ok(crate::value::IteratorObject::from_range(start, stop, step))
        });

        self.register_native("iter", |interp, call| {
            call.expect_args("iter", 1, 1)?;
            interp.make_iterator(call.args[0].clone())
        });

        self.register_native("next", |interp, call| {
            call.expect_args("next", 1, 2)?;
            let step = match &call.args[0] {
                Value::Iterator(it) => interp.iter_next(it)?,
                other => {
                    return Err(type_error(format!(
                        "'{}' object is not an iterator",
                        other.type_name()
                    )))
                }
            };
            match step {
                Some(v) => Ok(v),
                None => match call.args.get(1) {
                    Some(default) => Ok(default.clone()),
                    None => Err(stop_iteration()),
                },
            }
        });

        self.register_native("exit", |_interp, call| {
            call.expect_args("exit", 0, 1)?;
            let code = match call.args.first() {
                Some(Value::Int(n)) => *n,
                Some(Value::None) | None => 0,
                Some(other) => {
                    return Err(type_error(format!(
                        "exit() code must be an integer, not '{}'",
                        other.type_name()
                    )))
                }
            };
            Err(system_exit(code))
        });

        // One constructor per exception kind, so scripts can write
        // `raise ValueError("...")` with the same shape as any other call.
        for kind in ALL_KINDS {
            let kind = *kind;
            if kind == ExcKind::SystemExit {
                self.register_native(kind.name(), |_interp, call| {
                    call.expect_args("SystemExit", 0, 1)?;
                    let code = match call.args.first() {
                        Some(Value::Int(n)) => *n,
                        Some(Value::None) | None => 0,
                        Some(other) => {
                            return Err(type_error(format!(
                                "SystemExit() code must be an integer, not '{}'",
                                other.type_name()
                            )))
                        }
                    };
                    Ok(Value::Exception(Rc::new(ExceptionObject::exit(code))))
                });
                continue;
            }
            self.register_native(kind.name(), move |interp, call| {
                call.expect_args(kind.name(), 0, 1)?;
                let message = match call.args.first() {
                    Some(v) => interp.stringify(v, StrMode::Str)?,
                    None => String::new(),
                };
                Ok(Value::Exception(Rc::new(ExceptionObject::new(
                    kind, message,
                ))))
            });
        }
    }
}
