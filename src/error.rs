/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     error.rs
 * Purpose:  The two-tier error model. CATCHABLE conditions are exception
 *           values drawn from a fixed single-rooted kind hierarchy and flow
 *           through try/except; FATAL conditions bypass every script-level
 *           handler and surface straight to the host.
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

use std::fmt;
use std::rc::Rc;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::value::Value;

/// The fixed exception-kind hierarchy. `Exception` is the single root; every
/// other kind has it as parent. New kinds are added here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcKind {
    Exception,
    ValueError,
    TypeError,
    NameError,
    ZeroDivisionError,
    IndexError,
    KeyError,
    AttributeError,
    AssertionError,
    RuntimeError,
    StopIteration,
    SystemExit,
}

pub const ALL_KINDS: &[ExcKind] = &[
    ExcKind::Exception,
    ExcKind::ValueError,
    ExcKind::TypeError,
    ExcKind::NameError,
    ExcKind::ZeroDivisionError,
    ExcKind::IndexError,
    ExcKind::KeyError,
    ExcKind::AttributeError,
    ExcKind::AssertionError,
    ExcKind::RuntimeError,
    ExcKind::StopIteration,
    ExcKind::SystemExit,
];

static KIND_BY_NAME: Lazy<FxHashMap<&'static str, ExcKind>> = Lazy::new(|| {
    ALL_KINDS.iter().map(|k| (k.name(), *k)).collect()
});

impl ExcKind {
    pub fn name(self) -> &'static str {
        match self {
            ExcKind::Exception => "Exception",
            ExcKind::ValueError => "ValueError",
            ExcKind::TypeError => "TypeError",
            ExcKind::NameError => "NameError",
            ExcKind::ZeroDivisionError => "ZeroDivisionError",
            ExcKind::IndexError => "IndexError",
            ExcKind::KeyError => "KeyError",
            ExcKind::AttributeError => "AttributeError",
            ExcKind::AssertionError => "AssertionError",
            ExcKind::RuntimeError => "RuntimeError",
            ExcKind::StopIteration => "StopIteration",
            ExcKind::SystemExit => "SystemExit",
        }
    }

    pub fn from_name(name: &str) -> Option<ExcKind> {
        KIND_BY_NAME.get(name).copied()
    }

    pub fn parent(self) -> Option<ExcKind> {
        match self {
            ExcKind::Exception => None,
            _ => Some(ExcKind::Exception),
        }
    }

    /// True when an `except handler_kind:` clause catches a raised `self`:
    /// the raised kind equals the handler's kind or any declared ancestor.
    pub fn matches(self, handler_kind: ExcKind) -> bool {
        let mut cur = Some(self);
        while let Some(k) = cur {
            if k == handler_kind {
                return true;
            }
            cur = k.parent();
        }
        false
    }
}

impl fmt::Display for ExcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A CATCHABLE condition reified as a runtime value. A process-exit request
/// is the `SystemExit` kind carrying its code.
#[derive(Debug, Clone)]
pub struct ExceptionObject {
    pub kind: ExcKind,
    pub message: String,
    pub exit_code: Option<i64>,
}

impl ExceptionObject {
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn exit(code: i64) -> Self {
        Self {
            kind: ExcKind::SystemExit,
            message: String::new(),
            exit_code: Some(code),
        }
    }
}

/// A FATAL condition: malformed-program-level or engine-level, never visible
/// to script handlers. Owed `finally` / `__exit__` cleanups still run while
/// one of these unwinds.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FatalError {
    #[error("evaluation cancelled by host")]
    Cancelled,

    #[error("maximum recursion depth exceeded")]
    RecursionLimit,

    #[error("malformed program: {0}")]
    Malformed(String),

    #[error("internal interpreter error: {0}")]
    Internal(String),
}

/// Everything the evaluator can fail with. Internal evaluation flows
/// through `EvalResult` with `?`; exactly one of FATAL/CATCHABLE applies.
#[derive(Debug, Clone)]
pub enum EvalError {
    Fatal(FatalError),
    /// Always carries a `Value::Exception`.
    Raise(Value),
}

pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    /// The exception value, when this is a CATCHABLE raise.
    pub fn raised(&self) -> Option<&Value> {
        match self {
            EvalError::Raise(v) => Some(v),
            EvalError::Fatal(_) => None,
        }
    }
}

impl From<FatalError> for EvalError {
    fn from(f: FatalError) -> Self {
        EvalError::Fatal(f)
    }
}

/// What the host sees when a top-level evaluation does not complete
/// normally. An unhandled exit request is reported as the requested code
/// rather than a generic failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TopError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("{kind}: {message}")]
    Uncaught { kind: ExcKind, message: String },

    #[error("exit requested with code {0}")]
    Exit(i64),
}

/// Builds a raise of the given kind. This is the single point where
/// internal failures become exception values; the `*_error` helpers below
/// are the fixed failure-category → kind table.
pub fn raise_kind(kind: ExcKind, message: impl Into<String>) -> EvalError {
    EvalError::Raise(Value::Exception(Rc::new(ExceptionObject::new(kind, message))))
}

pub fn type_error(message: impl Into<String>) -> EvalError {
    raise_kind(ExcKind::TypeError, message)
}

pub fn value_error(message: impl Into<String>) -> EvalError {
    raise_kind(ExcKind::ValueError, message)
}

pub fn name_error(name: &str) -> EvalError {
    raise_kind(ExcKind::NameError, format!("name '{name}' is not defined"))
}

pub fn zero_division_error(what: &str) -> EvalError {
    raise_kind(ExcKind::ZeroDivisionError, format!("{what} by zero"))
}

pub fn index_error(message: impl Into<String>) -> EvalError {
    raise_kind(ExcKind::IndexError, message)
}

pub fn key_error(key_repr: impl Into<String>) -> EvalError {
    raise_kind(ExcKind::KeyError, key_repr)
}

pub fn attribute_error(message: impl Into<String>) -> EvalError {
    raise_kind(ExcKind::AttributeError, message)
}

pub fn assertion_error(message: impl Into<String>) -> EvalError {
    raise_kind(ExcKind::AssertionError, message)
}

pub fn runtime_error(message: impl Into<String>) -> EvalError {
    raise_kind(ExcKind::RuntimeError, message)
}

pub fn stop_iteration() -> EvalError {
    raise_kind(ExcKind::StopIteration, "")
}

pub fn system_exit(code: i64) -> EvalError {
    EvalError::Raise(Value::Exception(Rc::new(ExceptionObject::exit(code))))
}
