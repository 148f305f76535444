/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     expressions.rs
 * Purpose:  Expression evaluation: literals and displays, operators with
 *           dunder dispatch on the left operand, short-circuit logic,
 *           call-site argument assembly, comprehensions and `super()`.
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

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{Arg, BinOp, CmpOp, CompClause, Expr, LogicalOp, Stmt, UnaryOp};
use crate::error::{
    name_error, runtime_error, type_error, value_error, zero_division_error, EvalResult,
};
use crate::value::{FunctionObject, Key, SuperProxy, Value};

use super::environment::{EnvRef, Environment};
use super::Interp;

fn binop_dunder(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "__add__",
        BinOp::Sub => "__sub__",
        BinOp::Mul => "__mul__",
        BinOp::TrueDiv => "__truediv__",
        BinOp::FloorDiv => "__floordiv__",
        BinOp::Mod => "__mod__",
    }
}

fn binop_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::TrueDiv => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
    }
}

/// Floor division with the quotient rounded toward negative infinity.
fn floor_div_i64(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Modulo with the result taking the divisor's sign.
fn floor_mod_i64(a: i64, b: i64) -> i64 {
    let m = a.wrapping_rem(b);
    if m != 0 && ((m < 0) != (b < 0)) {
        m + b
    } else {
        m
    }
}

fn floor_mod_f64(a: f64, b: f64) -> f64 {
    let m = a % b;
    if m != 0.0 && ((m < 0.0) != (b < 0.0)) {
        m + b
    } else {
        m
    }
}

/// Upper bound on the element or byte count a sequence repetition may
/// produce. Past it the script gets a catchable error instead of the host
/// aborting on allocation.
const MAX_REPEAT_LEN: u64 = 1 << 28;

fn repeat_count(len: usize, n: i64) -> EvalResult<usize> {
    if n <= 0 || len == 0 {
        return Ok(0);
    }
    match (len as u64).checked_mul(n as u64) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(n as usize),
        _ => Err(value_error("repeated sequence is too large")),
    }
}

fn float_binop(op: BinOp, a: f64, b: f64) -> EvalResult<Value> {
    match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        BinOp::TrueDiv => {
            if b == 0.0 {
                return Err(zero_division_error("division"));
            }
            Ok(Value::Float(a / b))
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division_error("division"));
            }
            Ok(Value::Float((a / b).floor()))
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(zero_division_error("modulo"));
            }
            Ok(Value::Float(floor_mod_f64(a, b)))
        }
    }
}

impl Interp {
    pub fn eval_expr(&mut self, expr: &Expr, env: &EnvRef) -> EvalResult<Value> {
        match expr {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),

            Expr::Name(name) => {
                Environment::lookup(env, name).ok_or_else(|| name_error(name))
            }

            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item, env)?);
                }
                Ok(Value::list(out))
            }

            Expr::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item, env)?);
                }
                Ok(Value::tuple(out))
            }

            Expr::Set(items) => {
                let mut out = FxHashSet::default();
                for item in items {
                    let v = self.eval_expr(item, env)?;
                    out.insert(Key::from_value(&v)?);
                }
                Ok(Value::set(out))
            }

            Expr::Dict(entries) => {
                let mut out = FxHashMap::default();
                for (k, v) in entries {
                    let key = self.eval_expr(k, env)?;
                    let value = self.eval_expr(v, env)?;
                    out.insert(Key::from_value(&key)?, value);
                }
                Ok(Value::dict(out))
            }

            Expr::Unary { op, operand } => {
                let v = self.eval_expr(operand, env)?;
                self.eval_unary(*op, v)
            }

            Expr::Binary { op, left, right } => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                self.eval_binary(*op, l, r)
            }

            Expr::Logical { op, left, right } => {
                let l = self.eval_expr(left, env)?;
                let l_true = self.truthy(&l)?;
                match op {
                    // The deciding operand itself is the result.
                    LogicalOp::And if !l_true => Ok(l),
                    LogicalOp::Or if l_true => Ok(l),
                    _ => self.eval_expr(right, env),
                }
            }

            Expr::Compare { op, left, right } => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                let result = match op {
                    CmpOp::Eq => self.values_equal(&l, &r)?,
                    CmpOp::NotEq => {
                        if matches!(l, Value::Instance(_)) {
                            if let Some(v) = self.call_dunder(&l, "__ne__", vec![r.clone()])? {
                                return Ok(Value::Bool(self.truthy(&v)?));
                            }
                        }
                        !self.values_equal(&l, &r)?
                    }
                    CmpOp::Lt | CmpOp::Gt | CmpOp::Le | CmpOp::Ge => {
                        self.compare_order(*op, &l, &r)?
                    }
                    CmpOp::In => self.contains(&r, &l)?,
                    CmpOp::NotIn => !self.contains(&r, &l)?,
                    CmpOp::Is => Value::identical(&l, &r),
                    CmpOp::IsNot => !Value::identical(&l, &r),
                };
                Ok(Value::Bool(result))
            }

            Expr::Cond { test, then, orelse } => {
                let t = self.eval_expr(test, env)?;
                if self.truthy(&t)? {
                    self.eval_expr(then, env)
                } else {
                    self.eval_expr(orelse, env)
                }
            }

            Expr::Call { callee, args } => {
                let callee = self.eval_expr(callee, env)?;
                let (pos, kw) = self.assemble_args(args, env)?;
                self.call_value(callee, pos, kw)
            }

            Expr::Attribute { object, name } => {
                let obj = self.eval_expr(object, env)?;
                self.get_attr(&obj, name)
            }

            Expr::Index { object, index } => {
                let obj = self.eval_expr(object, env)?;
                let idx = self.eval_expr(index, env)?;
                self.value_index(&obj, &idx)
            }

            Expr::Slice {
                object,
                start,
                stop,
                step,
            } => {
                let obj = self.eval_expr(object, env)?;
                let start = self.eval_slice_bound(start.as_deref(), env)?;
                let stop = self.eval_slice_bound(stop.as_deref(), env)?;
                let step = self.eval_slice_bound(step.as_deref(), env)?;
                self.value_slice(&obj, start, stop, step)
            }

            Expr::Lambda { params, body } => {
                Ok(Value::Function(Rc::new(FunctionObject {
                    name: "<lambda>".into(),
                    params: params.clone(),
                    vararg: None,
                    kwarg: None,
                    body: Rc::from(vec![Stmt::Return(Some((**body).clone()))]),
                    env: Rc::clone(env),
                })))
            }

            Expr::ListComp { element, clauses } => {
                let child = Environment::new_child(env);
                let mut out = Vec::new();
                let mut emit = |interp: &mut Interp, env: &EnvRef| {
                    out.push(interp.eval_expr(element, env)?);
                    Ok(())
                };
                self.run_comp(clauses, 0, &child, &mut emit)?;
                Ok(Value::list(out))
            }

            Expr::SetComp { element, clauses } => {
                let child = Environment::new_child(env);
                let mut out = FxHashSet::default();
                let mut emit = |interp: &mut Interp, env: &EnvRef| {
                    let v = interp.eval_expr(element, env)?;
                    out.insert(Key::from_value(&v)?);
                    Ok(())
                };
                self.run_comp(clauses, 0, &child, &mut emit)?;
                Ok(Value::set(out))
            }

            Expr::DictComp {
                key,
                value,
                clauses,
            } => {
                let child = Environment::new_child(env);
                let mut out = FxHashMap::default();
                let mut emit = |interp: &mut Interp, env: &EnvRef| {
                    let k = interp.eval_expr(key, env)?;
                    let v = interp.eval_expr(value, env)?;
                    out.insert(Key::from_value(&k)?, v);
                    Ok(())
                };
                self.run_comp(clauses, 0, &child, &mut emit)?;
                Ok(Value::dict(out))
            }

            Expr::Super { args } => self.eval_super(args.as_ref(), env),
        }
    }

    fn eval_slice_bound(
        &mut self,
        bound: Option<&Expr>,
        env: &EnvRef,
    ) -> EvalResult<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(expr) => {
                let v = self.eval_expr(expr, env)?;
                v.as_int().map(Some).ok_or_else(|| {
                    type_error(format!(
                        "slice indices must be integers, not '{}'",
                        v.type_name()
                    ))
                })
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: Value) -> EvalResult<Value> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!self.truthy(&operand)?)),
            UnaryOp::Neg => match &operand {
                Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Bool(b) => Ok(Value::Int(-i64::from(*b))),
                Value::Instance(_) => {
                    match self.call_dunder(&operand, "__neg__", vec![])? {
                        Some(v) => Ok(v),
                        None => Err(type_error(format!(
                            "bad operand type for unary -: '{}'",
                            operand.type_name()
                        ))),
                    }
                }
                other => Err(type_error(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            },
        }
    }

    /// Binary operators: when the left operand is an instance whose class
    /// defines the matching dunder, that method decides the result; there is
    /// no reflected dispatch on the right operand.
    pub(crate) fn eval_binary(&mut self, op: BinOp, left: Value, right: Value) -> EvalResult<Value> {
        if matches!(left, Value::Instance(_)) {
            if let Some(v) = self.call_dunder(&left, binop_dunder(op), vec![right.clone()])? {
                return Ok(v);
            }
            return Err(type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                binop_symbol(op),
                left.type_name(),
                right.type_name()
            )));
        }

        match (op, &left, &right) {
            (BinOp::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            (BinOp::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
            (BinOp::Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
            (BinOp::TrueDiv, Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err(zero_division_error("division"));
                }
                Ok(Value::Float(*a as f64 / *b as f64))
            }
            (BinOp::FloorDiv, Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err(zero_division_error("integer division"));
                }
                Ok(Value::Int(floor_div_i64(*a, *b)))
            }
            (BinOp::Mod, Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err(zero_division_error("integer modulo"));
                }
                Ok(Value::Int(floor_mod_i64(*a, *b)))
            }

            (_, Value::Float(a), Value::Float(b)) => float_binop(op, *a, *b),
            (_, Value::Int(a), Value::Float(b)) => float_binop(op, *a as f64, *b),
            (_, Value::Float(a), Value::Int(b)) => float_binop(op, *a, *b as f64),

            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                Ok(Value::str(format!("{a}{b}")))
            }
            (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
                let reps = repeat_count(s.len(), *n)?;
                Ok(Value::str(s.repeat(reps)))
            }

            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let mut out = a.borrow().clone();
                out.extend(b.borrow().iter().cloned());
                Ok(Value::list(out))
            }
            (BinOp::Mul, Value::List(items), Value::Int(n))
            | (BinOp::Mul, Value::Int(n), Value::List(items)) => {
                let src = items.borrow();
                let reps = repeat_count(src.len(), *n)?;
                let mut out = Vec::with_capacity(src.len() * reps);
                for _ in 0..reps {
                    out.extend(src.iter().cloned());
                }
                Ok(Value::list(out))
            }

            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                let mut out = a.to_vec();
                out.extend(b.iter().cloned());
                Ok(Value::tuple(out))
            }
            (BinOp::Mul, Value::Tuple(items), Value::Int(n))
            | (BinOp::Mul, Value::Int(n), Value::Tuple(items)) => {
                let reps = repeat_count(items.len(), *n)?;
                let mut out = Vec::with_capacity(items.len() * reps);
                for _ in 0..reps {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::tuple(out))
            }

            _ => Err(type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                binop_symbol(op),
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    /// Evaluates a call site's argument list into flat positional and
    /// keyword vectors, expanding `*` and `**` splats.
    pub(crate) fn assemble_args(
        &mut self,
        args: &[Arg],
        env: &EnvRef,
    ) -> EvalResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut pos = Vec::new();
        let mut kw: Vec<(String, Value)> = Vec::new();
        for arg in args {
            match arg {
                Arg::Pos(expr) => pos.push(self.eval_expr(expr, env)?),
                Arg::Keyword { name, value } => {
                    if kw.iter().any(|(n, _)| n == name) {
                        return Err(type_error(format!(
                            "keyword argument repeated: '{name}'"
                        )));
                    }
                    let v = self.eval_expr(value, env)?;
                    kw.push((name.clone(), v));
                }
                Arg::Star(expr) => {
                    let v = self.eval_expr(expr, env)?;
                    pos.extend(self.collect_iterable(&v)?);
                }
                Arg::KwStar(expr) => {
                    let v = self.eval_expr(expr, env)?;
                    let Value::Dict(map) = &v else {
                        return Err(type_error(format!(
                            "** argument must be a dict, not '{}'",
                            v.type_name()
                        )));
                    };
                    for (key, value) in map.borrow().iter() {
                        let Key::Str(name) = key else {
                            return Err(type_error("** argument keys must be strings"));
                        };
                        if kw.iter().any(|(n, _)| n.as_str() == name.as_ref()) {
                            return Err(type_error(format!(
                                "keyword argument repeated: '{name}'"
                            )));
                        }
                        kw.push((name.to_string(), value.clone()));
                    }
                }
            }
        }
        Ok((pos, kw))
    }

    fn run_comp(
        &mut self,
        clauses: &[CompClause],
        idx: usize,
        env: &EnvRef,
        emit: &mut dyn FnMut(&mut Interp, &EnvRef) -> EvalResult<()>,
    ) -> EvalResult<()> {
        if idx == clauses.len() {
            return emit(self, env);
        }
        let clause = &clauses[idx];
        let iterable = self.eval_expr(&clause.iter, env)?;
        let iter = self.make_iterator(iterable)?;
        let Value::Iterator(it) = iter else {
            return Ok(());
        };
        // Loop names belong to the comprehension frame even when an outer
        // scope already binds the same name.
        self.declare_target_names(&clause.target, env);
        'items: while let Some(item) = self.iter_next(&it)? {
            self.bind_target(&clause.target, item, env)?;
            for cond in &clause.conds {
                let c = self.eval_expr(cond, env)?;
                if !self.truthy(&c)? {
                    continue 'items;
                }
            }
            self.run_comp(clauses, idx + 1, env, emit)?;
        }
        Ok(())
    }

    /// `super()` resolution. The zero-argument form reads the hidden frame
    /// bindings installed for method calls; the explicit form validates that
    /// the receiver's class descends from the named anchor.
    fn eval_super(
        &mut self,
        args: Option<&(Box<Expr>, Box<Expr>)>,
        env: &EnvRef,
    ) -> EvalResult<Value> {
        let (anchor, receiver) = match args {
            None => {
                let class = Environment::lookup(env, "__class__").ok_or_else(|| {
                    runtime_error("super(): no enclosing method")
                })?;
                let receiver = Environment::lookup(env, "__self__").ok_or_else(|| {
                    runtime_error("super(): no enclosing method")
                })?;
                let Value::Class(anchor) = class else {
                    return Err(runtime_error("super(): no enclosing method"));
                };
                (anchor, receiver)
            }
            Some((class_expr, recv_expr)) => {
                let class = self.eval_expr(class_expr, env)?;
                let receiver = self.eval_expr(recv_expr, env)?;
                let Value::Class(anchor) = class else {
                    return Err(type_error("super(): first argument must be a class"));
                };
                let receiver_class = match &receiver {
                    Value::Instance(i) => Rc::clone(&i.class),
                    Value::Class(c) => Rc::clone(c),
                    other => {
                        return Err(type_error(format!(
                            "super(): second argument must be an instance or class, not '{}'",
                            other.type_name()
                        )))
                    }
                };
                if !receiver_class.is_subclass_of(&anchor) {
                    return Err(type_error(format!(
                        "super(): '{}' is not a subclass of '{}'",
                        receiver_class.name, anchor.name
                    )));
                }
                (anchor, receiver)
            }
        };
        Ok(Value::Super(Rc::new(SuperProxy { anchor, receiver })))
    }
}
