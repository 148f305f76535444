/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     statements.rs
 * Purpose:  Statement execution. Control flow travels as an `ExecSignal`
 *           through ordinary returns; exceptions travel as `Err`. The
 *           try/finally and `with` forms are the only places the two lanes
 *           interact.
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

use rustc_hash::FxHashMap;

use crate::ast::{ExceptHandler, Expr, MatchCase, Pattern, Stmt, Target};
use crate::error::{
    assertion_error, raise_kind, runtime_error, type_error, value_error, EvalError, EvalResult,
    ExcKind, FatalError,
};
use crate::value::{FunctionObject, Key, Value};

use super::display::StrMode;
use super::environment::{EnvRef, Environment};
use super::Interp;

/// How a block finished: fell through, or was cut short by one of the
/// structured jumps. Raises travel separately as `Err`.
#[derive(Debug, Clone)]
pub enum ExecSignal {
    None,
    Return(Value),
    Break,
    Continue,
}

impl Interp {
    /// Runs a block until it finishes or a jump/raise escapes. Cancellation
    /// is polled between statements.
    pub fn exec_block(&mut self, stmts: &[Stmt], env: &EnvRef) -> EvalResult<ExecSignal> {
        for stmt in stmts {
            if self.cancelled_now() {
                return Err(FatalError::Cancelled.into());
            }
            match self.exec_stmt(stmt, env)? {
                ExecSignal::None => {}
                signal => return Ok(signal),
            }
        }
        Ok(ExecSignal::None)
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt, env: &EnvRef) -> EvalResult<ExecSignal> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval_expr(expr, env)?;
                Ok(ExecSignal::None)
            }

            Stmt::Assign { target, value } => {
                let v = self.eval_expr(value, env)?;
                self.bind_target(target, v, env)?;
                Ok(ExecSignal::None)
            }

            Stmt::AugAssign { target, op, value } => {
                let current = self.read_target(target, env)?;
                let rhs = self.eval_expr(value, env)?;
                let result = self.eval_binary(*op, current, rhs)?;
                self.bind_target(target, result, env)?;
                Ok(ExecSignal::None)
            }

            Stmt::Delete(target) => {
                self.delete_target(target, env)?;
                Ok(ExecSignal::None)
            }

            Stmt::If { test, body, orelse } => {
                let t = self.eval_expr(test, env)?;
                if self.truthy(&t)? {
                    self.exec_block(body, env)
                } else {
                    self.exec_block(orelse, env)
                }
            }

            Stmt::While { test, body, orelse } => {
                loop {
                    if self.cancelled_now() {
                        return Err(FatalError::Cancelled.into());
                    }
                    let t = self.eval_expr(test, env)?;
                    if !self.truthy(&t)? {
                        // The else block belongs to normal loop completion.
                        return self.exec_block(orelse, env);
                    }
                    match self.exec_block(body, env)? {
                        ExecSignal::None | ExecSignal::Continue => {}
                        ExecSignal::Break => return Ok(ExecSignal::None),
                        signal @ ExecSignal::Return(_) => return Ok(signal),
                    }
                }
            }

            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval_expr(iter, env)?;
                let iter = self.make_iterator(iterable)?;
                let Value::Iterator(it) = iter else {
                    return Ok(ExecSignal::None);
                };
                loop {
                    if self.cancelled_now() {
                        return Err(FatalError::Cancelled.into());
                    }
                    let Some(item) = self.iter_next(&it)? else {
                        return self.exec_block(orelse, env);
                    };
                    self.bind_target(target, item, env)?;
                    match self.exec_block(body, env)? {
                        ExecSignal::None | ExecSignal::Continue => {}
                        ExecSignal::Break => return Ok(ExecSignal::None),
                        signal @ ExecSignal::Return(_) => return Ok(signal),
                    }
                }
            }

            Stmt::FuncDef(def) => {
                let mut value = Value::Function(Rc::new(FunctionObject {
                    name: def.name.clone(),
                    params: def.params.clone(),
                    vararg: def.vararg.clone(),
                    kwarg: def.kwarg.clone(),
                    body: Rc::from(def.body.clone()),
                    env: Rc::clone(env),
                }));
                // Innermost decorator first.
                for decorator in def.decorators.iter().rev() {
                    let d = self.eval_expr(decorator, env)?;
                    value = self.call_value(d, vec![value], vec![])?;
                }
                env.borrow_mut().define(def.name.clone(), value);
                Ok(ExecSignal::None)
            }

            Stmt::ClassDef {
                name,
                parent,
                body,
                decorators,
            } => {
                let mut value = self.build_class(name, parent.as_ref(), body, env)?;
                for decorator in decorators.iter().rev() {
                    let d = self.eval_expr(decorator, env)?;
                    value = self.call_value(d, vec![value], vec![])?;
                }
                env.borrow_mut().define(name.clone(), value);
                Ok(ExecSignal::None)
            }

            Stmt::Return(expr) => {
                let v = match expr {
                    Some(e) => self.eval_expr(e, env)?,
                    None => Value::None,
                };
                Ok(ExecSignal::Return(v))
            }

            Stmt::Break => Ok(ExecSignal::Break),
            Stmt::Continue => Ok(ExecSignal::Continue),
            Stmt::Pass => Ok(ExecSignal::None),

            Stmt::Raise(Some(expr)) => {
                let v = self.eval_expr(expr, env)?;
                match v {
                    Value::Exception(_) => Err(EvalError::Raise(v)),
                    other => Err(type_error(format!(
                        "exceptions must be exception values, not '{}'",
                        other.type_name()
                    ))),
                }
            }

            Stmt::Raise(None) => match self.handler_stack.last() {
                Some(active) => Err(EvalError::Raise(active.clone())),
                None => Err(runtime_error("no active exception to re-raise")),
            },

            Stmt::Try {
                body,
                handlers,
                finally,
            } => self.exec_try(body, handlers, finally, env),

            Stmt::Assert { test, message } => {
                let t = self.eval_expr(test, env)?;
                if self.truthy(&t)? {
                    return Ok(ExecSignal::None);
                }
                let msg = match message {
                    Some(m) => {
                        let v = self.eval_expr(m, env)?;
                        self.stringify(&v, StrMode::Str)?
                    }
                    None => String::new(),
                };
                Err(assertion_error(msg))
            }

            Stmt::With {
                context,
                target,
                body,
            } => self.exec_with(context, target.as_deref(), body, env),

            Stmt::Match { subject, cases } => self.exec_match(subject, cases, env),

            Stmt::Global(names) => {
                let mut e = env.borrow_mut();
                for name in names {
                    e.declare_global(name.clone());
                }
                Ok(ExecSignal::None)
            }

            Stmt::Nonlocal(names) => {
                let mut e = env.borrow_mut();
                for name in names {
                    e.declare_nonlocal(name.clone());
                }
                Ok(ExecSignal::None)
            }
        }
    }

    // ---------------------------------------------------------------------
    // try / except / finally
    // ---------------------------------------------------------------------

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        finally: &[Stmt],
        env: &EnvRef,
    ) -> EvalResult<ExecSignal> {
        let mut outcome = self.exec_block(body, env);

        // Handlers only ever see CATCHABLE raises; FATAL skips straight to
        // finally.
        if let Err(EvalError::Raise(raised)) = &outcome {
            let raised = raised.clone();
            if let Some(handler) = self.find_handler(handlers, &raised)? {
                if let Some(name) = &handler.name {
                    env.borrow_mut().define(name.clone(), raised.clone());
                }
                self.handler_stack.push(raised);
                let handled = self.exec_block(&handler.body, env);
                self.handler_stack.pop();
                outcome = handled;
            }
        }

        // finally runs exactly once on every exit path, cancellation
        // included; its own jump or raise supersedes the in-flight outcome.
        match self.run_cleanup(|interp| interp.exec_block(finally, env)) {
            Ok(ExecSignal::None) => outcome,
            Ok(signal) => Ok(signal),
            Err(err) => Err(err),
        }
    }

    fn find_handler<'h>(
        &self,
        handlers: &'h [ExceptHandler],
        raised: &Value,
    ) -> EvalResult<Option<&'h ExceptHandler>> {
        let Value::Exception(exc) = raised else {
            return Ok(None);
        };
        for handler in handlers {
            match &handler.kind {
                None => return Ok(Some(handler)),
                Some(kind_name) => {
                    let kind = ExcKind::from_name(kind_name).ok_or_else(|| {
                        FatalError::Malformed(format!(
                            "unknown exception kind '{kind_name}' in except clause"
                        ))
                    })?;
                    if exc.kind.matches(kind) {
                        return Ok(Some(handler));
                    }
                }
            }
        }
        Ok(None)
    }

    // ---------------------------------------------------------------------
    // with
    // ---------------------------------------------------------------------

    fn exec_with(
        &mut self,
        context: &Expr,
        target: Option<&str>,
        body: &[Stmt],
        env: &EnvRef,
    ) -> EvalResult<ExecSignal> {
        let ctx = self.eval_expr(context, env)?;
        let supported = matches!(&ctx, Value::Instance(inst)
            if inst.class.protocols.contains_key("__enter__")
                && inst.class.protocols.contains_key("__exit__"));
        if !supported {
            return Err(type_error(format!(
                "'{}' object does not support the context manager protocol",
                ctx.type_name()
            )));
        }

        let entered = self
            .call_dunder(&ctx, "__enter__", vec![])?
            .unwrap_or(Value::None);
        if let Some(name) = target {
            env.borrow_mut().define(name.to_string(), entered);
        }

        let outcome = self.exec_block(body, env);

        // __exit__ runs on every exit path, FATAL unwinds included, but
        // only a CATCHABLE raise is described to it (and suppressible).
        let exit_args = match &outcome {
            Err(EvalError::Raise(raised @ Value::Exception(exc))) => vec![
                Value::str(exc.kind.name()),
                raised.clone(),
                Value::None,
            ],
            _ => vec![Value::None, Value::None, Value::None],
        };
        let suppressible = matches!(&outcome, Err(EvalError::Raise(_)));
        let exit_result = self
            .run_cleanup(|interp| interp.call_dunder(&ctx, "__exit__", exit_args))?
            .unwrap_or(Value::None);

        if suppressible && self.truthy(&exit_result)? {
            return Ok(ExecSignal::None);
        }
        outcome
    }

    // ---------------------------------------------------------------------
    // match
    // ---------------------------------------------------------------------

    fn exec_match(
        &mut self,
        subject: &Expr,
        cases: &[MatchCase],
        env: &EnvRef,
    ) -> EvalResult<ExecSignal> {
        let value = self.eval_expr(subject, env)?;
        for case in cases {
            let Some(bindings) = self.match_pattern(&case.pattern, &value, env)? else {
                continue;
            };
            // Bindings are visible to the guard; a failed guard moves on to
            // the next case with the bindings left in place.
            for (name, v) in bindings {
                Environment::assign(env, &name, v)?;
            }
            if let Some(guard) = &case.guard {
                let g = self.eval_expr(guard, env)?;
                if !self.truthy(&g)? {
                    continue;
                }
            }
            return self.exec_block(&case.body, env);
        }
        Ok(ExecSignal::None)
    }

    /// Tries a pattern against a subject, returning the bindings it would
    /// introduce. `None` means no match.
    fn match_pattern(
        &mut self,
        pattern: &Pattern,
        subject: &Value,
        env: &EnvRef,
    ) -> EvalResult<Option<Vec<(String, Value)>>> {
        match pattern {
            Pattern::Wildcard => Ok(Some(vec![])),

            Pattern::Capture(name) => Ok(Some(vec![(name.clone(), subject.clone())])),

            Pattern::Literal(expr) => {
                let lit = self.eval_expr(expr, env)?;
                if self.values_equal(subject, &lit)? {
                    Ok(Some(vec![]))
                } else {
                    Ok(None)
                }
            }

            Pattern::Type { name, binding } => {
                let matched = match name.as_str() {
                    "int" | "float" | "str" | "bool" | "list" | "dict" | "set" | "tuple"
                    | "none" => subject.type_name() == name,
                    _ => match Environment::lookup(env, name) {
                        Some(Value::Class(class)) => match subject {
                            Value::Instance(inst) => inst.class.is_subclass_of(&class),
                            _ => false,
                        },
                        _ => {
                            return Err(type_error(format!(
                                "'{name}' is not a type pattern"
                            )))
                        }
                    },
                };
                if !matched {
                    return Ok(None);
                }
                Ok(Some(match binding {
                    Some(name) => vec![(name.clone(), subject.clone())],
                    None => vec![],
                }))
            }

            Pattern::List(patterns) => {
                let items: Vec<Value> = match subject {
                    Value::List(items) => items.borrow().clone(),
                    Value::Tuple(items) => items.to_vec(),
                    _ => return Ok(None),
                };
                self.match_sequence(patterns, &items, env)
            }

            // A bare star only occurs inside a list pattern.
            Pattern::Star(_) => Err(FatalError::Malformed(
                "star pattern outside a list pattern".into(),
            )
            .into()),

            Pattern::Dict { entries, rest } => {
                let Value::Dict(map) = subject else {
                    return Ok(None);
                };
                let mut bindings = Vec::new();
                let mut seen: Vec<Key> = Vec::new();
                for (key_expr, value_pattern) in entries {
                    let key_value = self.eval_expr(key_expr, env)?;
                    let key = Key::from_value(&key_value)?;
                    let Some(found) = map.borrow().get(&key).cloned() else {
                        return Ok(None);
                    };
                    let Some(nested) = self.match_pattern(value_pattern, &found, env)? else {
                        return Ok(None);
                    };
                    bindings.extend(nested);
                    seen.push(key);
                }
                if let Some(rest_name) = rest {
                    let mut remainder = FxHashMap::default();
                    for (k, v) in map.borrow().iter() {
                        if !seen.contains(k) {
                            remainder.insert(k.clone(), v.clone());
                        }
                    }
                    bindings.push((rest_name.clone(), Value::dict(remainder)));
                }
                Ok(Some(bindings))
            }
        }
    }

    fn match_sequence(
        &mut self,
        patterns: &[Pattern],
        items: &[Value],
        env: &EnvRef,
    ) -> EvalResult<Option<Vec<(String, Value)>>> {
        let star_pos = patterns
            .iter()
            .position(|p| matches!(p, Pattern::Star(_)));
        if patterns
            .iter()
            .filter(|p| matches!(p, Pattern::Star(_)))
            .count()
            > 1
        {
            return Err(FatalError::Malformed(
                "multiple star patterns in one list pattern".into(),
            )
            .into());
        }

        let mut bindings = Vec::new();
        match star_pos {
            None => {
                if patterns.len() != items.len() {
                    return Ok(None);
                }
                for (p, v) in patterns.iter().zip(items) {
                    match self.match_pattern(p, v, env)? {
                        Some(nested) => bindings.extend(nested),
                        None => return Ok(None),
                    }
                }
            }
            Some(pos) => {
                let fixed = patterns.len() - 1;
                if items.len() < fixed {
                    return Ok(None);
                }
                let tail_len = patterns.len() - pos - 1;
                let mid_len = items.len() - fixed;
                for (p, v) in patterns[..pos].iter().zip(&items[..pos]) {
                    match self.match_pattern(p, v, env)? {
                        Some(nested) => bindings.extend(nested),
                        None => return Ok(None),
                    }
                }
                if let Pattern::Star(Some(name)) = &patterns[pos] {
                    bindings.push((
                        name.clone(),
                        Value::list(items[pos..pos + mid_len].to_vec()),
                    ));
                }
                for (p, v) in patterns[pos + 1..]
                    .iter()
                    .zip(&items[items.len() - tail_len..])
                {
                    match self.match_pattern(p, v, env)? {
                        Some(nested) => bindings.extend(nested),
                        None => return Ok(None),
                    }
                }
            }
        }
        Ok(Some(bindings))
    }

    // ---------------------------------------------------------------------
    // Assignment targets
    // ---------------------------------------------------------------------

    /// Binds a value to an assignment / loop / destructuring target.
    pub fn bind_target(&mut self, target: &Target, value: Value, env: &EnvRef) -> EvalResult<()> {
        match target {
            Target::Name(name) => Environment::assign(env, name, value),

            Target::Attribute { object, name } => {
                let obj = self.eval_expr(object, env)?;
                self.set_attr(&obj, name, value)
            }

            Target::Index { object, index } => {
                let obj = self.eval_expr(object, env)?;
                let idx = self.eval_expr(index, env)?;
                self.value_set_index(&obj, &idx, value)
            }

            Target::Slice {
                object,
                start,
                stop,
                step,
            } => {
                let obj = self.eval_expr(object, env)?;
                let start = self.eval_target_bound(start.as_ref(), env)?;
                let stop = self.eval_target_bound(stop.as_ref(), env)?;
                let step = self.eval_target_bound(step.as_ref(), env)?;
                self.value_set_slice(&obj, start, stop, step, &value)
            }

            Target::Tuple(targets) => self.destructure(targets, &value, env),

            Target::Starred(_) => Err(FatalError::Malformed(
                "starred assignment target outside destructuring".into(),
            )
            .into()),
        }
    }

    /// Pre-declares the plain names of a loop target in the given frame, so
    /// a later `bind_target` writes them there instead of rebinding an
    /// outer owner of the same name.
    pub(crate) fn declare_target_names(&self, target: &Target, env: &EnvRef) {
        match target {
            Target::Name(name) => {
                let owned = env.borrow().owns(name);
                if !owned {
                    env.borrow_mut().define(name.clone(), Value::None);
                }
            }
            Target::Tuple(targets) => {
                for t in targets {
                    self.declare_target_names(t, env);
                }
            }
            Target::Starred(inner) => self.declare_target_names(inner, env),
            Target::Attribute { .. } | Target::Index { .. } | Target::Slice { .. } => {}
        }
    }

    fn destructure(&mut self, targets: &[Target], value: &Value, env: &EnvRef) -> EvalResult<()> {
        let items = self.collect_iterable(value)?;
        let star_pos = targets
            .iter()
            .position(|t| matches!(t, Target::Starred(_)));
        if targets
            .iter()
            .filter(|t| matches!(t, Target::Starred(_)))
            .count()
            > 1
        {
            return Err(FatalError::Malformed(
                "multiple starred targets in one destructuring".into(),
            )
            .into());
        }

        match star_pos {
            None => {
                if items.len() != targets.len() {
                    return Err(value_error(format!(
                        "cannot unpack {} value(s) into {} target(s)",
                        items.len(),
                        targets.len()
                    )));
                }
                for (t, v) in targets.iter().zip(items) {
                    self.bind_target(t, v, env)?;
                }
                Ok(())
            }
            Some(pos) => {
                let fixed = targets.len() - 1;
                if items.len() < fixed {
                    return Err(value_error(format!(
                        "not enough values to unpack (expected at least {fixed}, got {})",
                        items.len()
                    )));
                }
                let tail_len = targets.len() - pos - 1;
                let mid_len = items.len() - fixed;
                for (t, v) in targets[..pos].iter().zip(&items[..pos]) {
                    self.bind_target(t, v.clone(), env)?;
                }
                let Target::Starred(inner) = &targets[pos] else {
                    return Err(FatalError::Internal("star target vanished".into()).into());
                };
                self.bind_target(
                    inner,
                    Value::list(items[pos..pos + mid_len].to_vec()),
                    env,
                )?;
                for (t, v) in targets[pos + 1..]
                    .iter()
                    .zip(&items[items.len() - tail_len..])
                {
                    self.bind_target(t, v.clone(), env)?;
                }
                Ok(())
            }
        }
    }

    fn eval_target_bound(
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

    /// Reads the current value of an augmented-assignment target.
    fn read_target(&mut self, target: &Target, env: &EnvRef) -> EvalResult<Value> {
        match target {
            Target::Name(name) => Environment::lookup(env, name)
                .ok_or_else(|| raise_kind(ExcKind::NameError, format!("name '{name}' is not defined"))),
            Target::Attribute { object, name } => {
                let obj = self.eval_expr(object, env)?;
                self.get_attr(&obj, name)
            }
            Target::Index { object, index } => {
                let obj = self.eval_expr(object, env)?;
                let idx = self.eval_expr(index, env)?;
                self.value_index(&obj, &idx)
            }
            _ => Err(FatalError::Malformed(
                "unsupported augmented assignment target".into(),
            )
            .into()),
        }
    }

    fn delete_target(&mut self, target: &Target, env: &EnvRef) -> EvalResult<()> {
        match target {
            Target::Name(name) => Environment::remove(env, name),
            Target::Attribute { object, name } => {
                let obj = self.eval_expr(object, env)?;
                self.del_attr(&obj, name)
            }
            Target::Index { object, index } => {
                let obj = self.eval_expr(object, env)?;
                let idx = self.eval_expr(index, env)?;
                self.value_del_index(&obj, &idx)
            }
            Target::Slice {
                object,
                start,
                stop,
                step,
            } => {
                let obj = self.eval_expr(object, env)?;
                let start = self.eval_target_bound(start.as_ref(), env)?;
                let stop = self.eval_target_bound(stop.as_ref(), env)?;
                let step = self.eval_target_bound(step.as_ref(), env)?;
                self.value_del_slice(&obj, start, stop, step)
            }
            Target::Tuple(targets) => {
                for t in targets {
                    self.delete_target(t, env)?;
                }
                Ok(())
            }
            Target::Starred(_) => Err(FatalError::Malformed(
                "cannot delete a starred target".into(),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CmpOp;
    use pretty_assertions::assert_eq;

    fn run(interp: &mut Interp, stmts: &[Stmt]) -> Value {
        interp.evaluate(stmts).unwrap()
    }

    #[test]
    fn while_else_runs_only_without_break() {
        let mut interp = Interp::new();
        // i = 0; while i < 3: i += 1 else: flag = "else"; flag
        let v = run(
            &mut interp,
            &[
                Stmt::assign("i", Expr::Int(0)),
                Stmt::While {
                    test: Expr::compare(CmpOp::Lt, Expr::name("i"), Expr::Int(3)),
                    body: vec![Stmt::AugAssign {
                        target: Target::Name("i".into()),
                        op: crate::ast::BinOp::Add,
                        value: Expr::Int(1),
                    }],
                    orelse: vec![Stmt::assign("flag", Expr::str_("else"))],
                },
                Stmt::Expr(Expr::name("flag")),
            ],
        );
        assert_eq!(v, Value::str("else"));

        // while True: break else: flag2 = "no"; "flag2" not bound
        interp
            .evaluate(&[Stmt::While {
                test: Expr::Bool(true),
                body: vec![Stmt::Break],
                orelse: vec![Stmt::assign("flag2", Expr::str_("no"))],
            }])
            .unwrap();
        let env = interp.globals();
        assert!(Environment::lookup(&env, "flag2").is_none());
    }

    #[test]
    fn destructuring_with_a_starred_middle() {
        let mut interp = Interp::new();
        let v = run(
            &mut interp,
            &[
                Stmt::Assign {
                    target: Target::Tuple(vec![
                        Target::Name("a".into()),
                        Target::Starred(Box::new(Target::Name("mid".into()))),
                        Target::Name("z".into()),
                    ]),
                    value: Expr::List(vec![
                        Expr::Int(1),
                        Expr::Int(2),
                        Expr::Int(3),
                        Expr::Int(4),
                    ]),
                },
                Stmt::Expr(Expr::Tuple(vec![
                    Expr::name("a"),
                    Expr::name("mid"),
                    Expr::name("z"),
                ])),
            ],
        );
        assert_eq!(
            v,
            Value::tuple(vec![
                Value::Int(1),
                Value::list(vec![Value::Int(2), Value::Int(3)]),
                Value::Int(4),
            ])
        );
    }

    #[test]
    fn unpack_length_mismatch_is_a_value_error() {
        let mut interp = Interp::new();
        let err = interp
            .evaluate(&[Stmt::Assign {
                target: Target::Tuple(vec![
                    Target::Name("a".into()),
                    Target::Name("b".into()),
                ]),
                value: Expr::List(vec![Expr::Int(1)]),
            }])
            .unwrap_err();
        assert!(matches!(err, crate::error::TopError::Uncaught { kind, .. }
            if kind == ExcKind::ValueError));
    }

    #[test]
    fn except_clauses_match_in_order_and_by_hierarchy() {
        let mut interp = Interp::with_prelude();
        // try: raise ValueError("v") except TypeError: t except Exception as e: got = e.message
        let v = run(
            &mut interp,
            &[
                Stmt::Try {
                    body: vec![Stmt::Raise(Some(
                        Expr::name("ValueError").call(vec![Expr::str_("v")]),
                    ))],
                    handlers: vec![
                        ExceptHandler {
                            kind: Some("TypeError".into()),
                            name: None,
                            body: vec![Stmt::assign("got", Expr::str_("wrong"))],
                        },
                        ExceptHandler {
                            kind: Some("Exception".into()),
                            name: Some("e".into()),
                            body: vec![Stmt::assign(
                                "got",
                                Expr::name("e").attr("message"),
                            )],
                        },
                    ],
                    finally: vec![],
                },
                Stmt::Expr(Expr::name("got")),
            ],
        );
        assert_eq!(v, Value::str("v"));
    }

    #[test]
    fn bare_raise_reraises_the_active_exception() {
        let mut interp = Interp::with_prelude();
        let err = interp
            .evaluate(&[Stmt::Try {
                body: vec![Stmt::Raise(Some(
                    Expr::name("KeyError").call(vec![Expr::str_("k")]),
                ))],
                handlers: vec![ExceptHandler {
                    kind: None,
                    name: None,
                    body: vec![Stmt::Raise(None)],
                }],
                finally: vec![],
            }])
            .unwrap_err();
        assert!(matches!(err, crate::error::TopError::Uncaught { kind, .. }
            if kind == ExcKind::KeyError));
    }

    #[test]
    fn bare_raise_without_handler_is_a_runtime_error() {
        let mut interp = Interp::new();
        let err = interp.evaluate(&[Stmt::Raise(None)]).unwrap_err();
        assert!(matches!(err, crate::error::TopError::Uncaught { kind, .. }
            if kind == ExcKind::RuntimeError));
    }

    #[test]
    fn finally_supersedes_the_inflight_outcome() {
        let mut interp = Interp::with_prelude();
        // try: raise ValueError() finally: note = "ran" — the raise survives,
        // the finally side effect is visible.
        let err = interp
            .evaluate(&[Stmt::Try {
                body: vec![Stmt::Raise(Some(Expr::name("ValueError").call(vec![])))],
                handlers: vec![],
                finally: vec![Stmt::assign("note", Expr::str_("ran"))],
            }])
            .unwrap_err();
        assert!(matches!(err, crate::error::TopError::Uncaught { kind, .. }
            if kind == ExcKind::ValueError));
        let env = interp.globals();
        assert_eq!(
            Environment::lookup(&env, "note"),
            Some(Value::str("ran"))
        );
    }

    #[test]
    fn match_patterns_bind_and_guard() {
        let mut interp = Interp::new();
        let v = run(
            &mut interp,
            &[
                Stmt::Match {
                    subject: Expr::List(vec![Expr::Int(1), Expr::Int(2), Expr::Int(3)]),
                    cases: vec![
                        MatchCase {
                            pattern: Pattern::List(vec![
                                Pattern::Literal(Expr::Int(9)),
                                Pattern::Star(None),
                            ]),
                            guard: None,
                            body: vec![Stmt::assign("out", Expr::str_("nine"))],
                        },
                        MatchCase {
                            pattern: Pattern::List(vec![
                                Pattern::Capture("head".into()),
                                Pattern::Star(Some("tail".into())),
                            ]),
                            guard: Some(Expr::compare(
                                CmpOp::Eq,
                                Expr::name("head"),
                                Expr::Int(1),
                            )),
                            body: vec![Stmt::assign("out", Expr::name("tail"))],
                        },
                    ],
                },
                Stmt::Expr(Expr::name("out")),
            ],
        );
        assert_eq!(v, Value::list(vec![Value::Int(2), Value::Int(3)]));
    }

    #[test]
    fn type_patterns_match_builtin_kinds() {
        let mut interp = Interp::new();
        let v = run(
            &mut interp,
            &[
                Stmt::Match {
                    subject: Expr::str_("hi"),
                    cases: vec![
                        MatchCase {
                            pattern: Pattern::Type {
                                name: "int".into(),
                                binding: None,
                            },
                            guard: None,
                            body: vec![Stmt::assign("out", Expr::str_("int"))],
                        },
                        MatchCase {
                            pattern: Pattern::Type {
                                name: "str".into(),
                                binding: Some("s".into()),
                            },
                            guard: None,
                            body: vec![Stmt::assign("out", Expr::name("s"))],
                        },
                    ],
                },
                Stmt::Expr(Expr::name("out")),
            ],
        );
        assert_eq!(v, Value::str("hi"));
    }

    #[test]
    fn del_removes_names_and_elements() {
        let mut interp = Interp::new();
        let v = run(
            &mut interp,
            &[
                Stmt::assign(
                    "xs",
                    Expr::List(vec![Expr::Int(1), Expr::Int(2), Expr::Int(3)]),
                ),
                Stmt::Delete(Target::Index {
                    object: Expr::name("xs"),
                    index: Expr::Int(1),
                }),
                Stmt::Expr(Expr::name("xs")),
            ],
        );
        assert_eq!(v, Value::list(vec![Value::Int(1), Value::Int(3)]));

        let err = interp
            .evaluate(&[
                Stmt::Delete(Target::Name("xs".into())),
                Stmt::Expr(Expr::name("xs")),
            ])
            .unwrap_err();
        assert!(matches!(err, crate::error::TopError::Uncaught { kind, .. }
            if kind == ExcKind::NameError));
    }
}
