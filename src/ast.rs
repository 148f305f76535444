/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     ast.rs
 * Purpose:  The syntax tree the evaluator walks. Trees are produced by an
 *           external front end (or assembled directly by a host) and handed
 *           to the interpreter; every node is serde-serializable so hosts
 *           can ship pre-parsed programs across process boundaries.
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

use serde::{Deserialize, Serialize};

/// A single function parameter: required when `default` is `None`,
/// defaulted otherwise. Default expressions are stored unevaluated and
/// evaluated per call in the function's defining environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

impl Param {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn defaulted(name: impl Into<String>, default: Expr) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

/// One argument at a call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    /// Ordinary positional argument.
    Pos(Expr),
    /// `name=value` keyword argument.
    Keyword { name: String, value: Expr },
    /// `*expr` — splat an iterable into positional arguments.
    Star(Expr),
    /// `**expr` — splat a string-keyed dict into keyword arguments.
    KwStar(Expr),
}

/// Binary operators subject to dunder dispatch on the left operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

/// One `for target in iter [if cond]*` clause of a comprehension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompClause {
    pub target: Target,
    pub iter: Expr,
    pub conds: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,

    Name(String),

    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Short-circuit `and` / `or`; yields the deciding operand itself.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `then if test else orelse` conditional expression.
    Cond {
        test: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
    },

    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },

    Attribute {
        object: Box<Expr>,
        name: String,
    },

    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },

    Slice {
        object: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },

    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },

    ListComp {
        element: Box<Expr>,
        clauses: Vec<CompClause>,
    },

    SetComp {
        element: Box<Expr>,
        clauses: Vec<CompClause>,
    },

    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        clauses: Vec<CompClause>,
    },

    /// `super()` (zero-argument form, inferred from the lexically enclosing
    /// method) or `super(Cls, obj)`.
    Super {
        args: Option<(Box<Expr>, Box<Expr>)>,
    },
}

/// An assignment / deletion / loop-binding target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Name(String),
    Attribute {
        object: Expr,
        name: String,
    },
    Index {
        object: Expr,
        index: Expr,
    },
    Slice {
        object: Expr,
        start: Option<Expr>,
        stop: Option<Expr>,
        step: Option<Expr>,
    },
    /// Destructuring: `a, *b, c = seq`. At most one element may be Starred.
    Tuple(Vec<Target>),
    Starred(Box<Target>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<Param>,
    /// Name of the `*args` catch-all parameter, if declared.
    pub vararg: Option<String>,
    /// Name of the `**kwargs` catch-all parameter, if declared.
    pub kwarg: Option<String>,
    pub body: Vec<Stmt>,
    /// Decorator expressions, outermost first; applied bottom-up.
    pub decorators: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptHandler {
    /// Exception kind name to match, `None` for a bare `except:`.
    pub kind: Option<String>,
    /// `as name` binding for the caught value.
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// `_` — matches anything, binds nothing.
    Wildcard,
    /// Bare name — matches anything, binds the subject.
    Capture(String),
    /// Literal equality against an evaluated literal expression.
    Literal(Expr),
    /// Type test: a built-in type name or a class name in scope, with an
    /// optional capture of the subject.
    Type {
        name: String,
        binding: Option<String>,
    },
    /// Structural list match; at most one element may be `Star`.
    List(Vec<Pattern>),
    /// `*name` (or bare `*`) remainder inside a list pattern.
    Star(Option<String>),
    /// Structural dict match with an optional `**rest` capture.
    Dict {
        entries: Vec<(Expr, Pattern)>,
        rest: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Expr),

    Assign {
        target: Target,
        value: Expr,
    },

    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
    },

    Delete(Target),

    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },

    While {
        test: Expr,
        body: Vec<Stmt>,
        /// Runs only when the condition goes false, never after `break`.
        orelse: Vec<Stmt>,
    },

    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
        /// Runs only on exhaustion, never after `break`.
        orelse: Vec<Stmt>,
    },

    FuncDef(FuncDef),

    ClassDef {
        name: String,
        parent: Option<Expr>,
        body: Vec<Stmt>,
        decorators: Vec<Expr>,
    },

    Return(Option<Expr>),
    Break,
    Continue,
    Pass,

    /// `raise expr`, or bare `raise` to re-propagate the caught exception.
    Raise(Option<Expr>),

    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        finally: Vec<Stmt>,
    },

    Assert {
        test: Expr,
        message: Option<Expr>,
    },

    With {
        context: Expr,
        target: Option<String>,
        body: Vec<Stmt>,
    },

    Match {
        subject: Expr,
        cases: Vec<MatchCase>,
    },

    Global(Vec<String>),
    Nonlocal(Vec<String>),
}

// Constructor helpers for hosts that assemble trees directly (and for the
// test suite). These keep deeply nested trees readable at call sites.
impl Expr {
    pub fn str_(s: impl Into<String>) -> Expr {
        Expr::Str(s.into())
    }

    pub fn name(n: impl Into<String>) -> Expr {
        Expr::Name(n.into())
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn attr(self, name: impl Into<String>) -> Expr {
        Expr::Attribute {
            object: Box::new(self),
            name: name.into(),
        }
    }

    pub fn index(self, index: Expr) -> Expr {
        Expr::Index {
            object: Box::new(self),
            index: Box::new(index),
        }
    }

    /// Call with positional arguments only.
    pub fn call(self, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: Box::new(self),
            args: args.into_iter().map(Arg::Pos).collect(),
        }
    }

    /// Call with an explicit argument list (keywords, splats).
    pub fn call_with(self, args: Vec<Arg>) -> Expr {
        Expr::Call {
            callee: Box::new(self),
            args,
        }
    }
}

impl Stmt {
    pub fn assign(name: impl Into<String>, value: Expr) -> Stmt {
        Stmt::Assign {
            target: Target::Name(name.into()),
            value,
        }
    }
}
