/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     calls.rs
 * Purpose:  Callable dispatch and argument binding. One binder serves
 *           functions, methods, lambdas and constructors: positionals fill
 *           declared parameters left to right, keywords fill by name,
 *           leftovers go to the catch-alls, defaults fill the rest.
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

use crate::error::{type_error, EvalResult, FatalError};
use crate::value::{ClassObject, FunctionObject, Key, Value};

use super::environment::{EnvRef, Environment};
use super::statements::ExecSignal;
use super::{Interp, NativeCall};

impl Interp {
    /// Calls any callable value with already-evaluated arguments.
    pub fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        match callee {
            Value::Function(func) => self.call_function_object(&func, None, None, args, kwargs),
            Value::BoundMethod(method) => self.call_function_object(
                &method.func,
                Some(method.receiver.clone()),
                method.defining_class.clone(),
                args,
                kwargs,
            ),
            Value::Native(native) => {
                self.enter_frame()?;
                let call = NativeCall {
                    args,
                    kwargs,
                    cancel: self.cancel.clone(),
                };
                let result = (native.func)(self, call);
                self.depth -= 1;
                result
            }
            Value::Class(class) => self.construct_instance(&class, args, kwargs),
            Value::Instance(_) => {
                match self.call_dunder_with_kwargs(&callee, "__call__", args, kwargs)? {
                    Some(v) => Ok(v),
                    None => Err(type_error(format!(
                        "'{}' object is not callable",
                        callee.type_name()
                    ))),
                }
            }
            other => Err(type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Invokes a user-defined function in a fresh frame chained to its
    /// defining environment. A bound receiver becomes the leading positional
    /// argument; the defining class (when known) anchors zero-argument
    /// `super()` through hidden frame bindings.
    pub fn call_function_object(
        &mut self,
        func: &Rc<FunctionObject>,
        receiver: Option<Value>,
        defining_class: Option<Rc<ClassObject>>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        self.enter_frame()?;
        let result = self.run_function(func, receiver, defining_class, args, kwargs);
        self.depth -= 1;
        result
    }

    fn run_function(
        &mut self,
        func: &Rc<FunctionObject>,
        receiver: Option<Value>,
        defining_class: Option<Rc<ClassObject>>,
        mut args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        if let Some(recv) = &receiver {
            args.insert(0, recv.clone());
        }

        let frame = Environment::new_child(&func.env);
        self.bind_params(&frame, func, args, kwargs)?;

        if let Some(class) = defining_class {
            frame
                .borrow_mut()
                .define("__class__", Value::Class(class));
            if let Some(recv) = receiver {
                frame.borrow_mut().define("__self__", recv);
            }
        }

        match self.exec_block(&func.body, &frame)? {
            ExecSignal::Return(v) => Ok(v),
            ExecSignal::None => Ok(Value::None),
            ExecSignal::Break | ExecSignal::Continue => Err(FatalError::Malformed(format!(
                "'break' or 'continue' escaped function '{}'",
                func.name
            ))
            .into()),
        }
    }

    fn enter_frame(&mut self) -> EvalResult<()> {
        if self.depth >= self.max_depth {
            return Err(FatalError::RecursionLimit.into());
        }
        self.depth += 1;
        Ok(())
    }

    /// Binds a call's arguments into a frame:
    ///   1. positionals fill declared parameters left to right,
    ///   2. surplus positionals go to `*args` (error without one),
    ///   3. keywords fill by name (duplicates and unknowns are errors,
    ///      unknowns landing in `**kwargs` when declared),
    ///   4. still-missing parameters take their defaults, evaluated now in
    ///      the defining environment,
    ///   5. a parameter with no value at all is an arity error.
    fn bind_params(
        &mut self,
        frame: &EnvRef,
        func: &FunctionObject,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<()> {
        let declared = func.params.len();
        let mut bound: FxHashMap<&str, Value> = FxHashMap::default();

        let mut args = args.into_iter();
        for param in &func.params {
            match args.next() {
                Some(v) => {
                    bound.insert(param.name.as_str(), v);
                }
                None => break,
            }
        }
        let surplus: Vec<Value> = args.collect();
        if !surplus.is_empty() && func.vararg.is_none() {
            return Err(type_error(format!(
                "{}() takes {} positional argument(s) but {} were given",
                func.name,
                declared,
                declared + surplus.len()
            )));
        }

        let mut extra_kw: Vec<(String, Value)> = Vec::new();
        for (name, value) in kwargs {
            if func.params.iter().any(|p| p.name == name) {
                if bound.contains_key(name.as_str()) {
                    return Err(type_error(format!(
                        "{}() got multiple values for argument '{}'",
                        func.name, name
                    )));
                }
                let param = func
                    .params
                    .iter()
                    .find(|p| p.name == name)
                    .ok_or_else(|| {
                        FatalError::Internal("parameter vanished during binding".into())
                    })?;
                bound.insert(param.name.as_str(), value);
            } else if extra_kw.iter().any(|(n, _)| *n == name) {
                return Err(type_error(format!(
                    "{}() got multiple values for argument '{}'",
                    func.name, name
                )));
            } else if func.kwarg.is_some() {
                extra_kw.push((name, value));
            } else {
                return Err(type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    func.name, name
                )));
            }
        }

        // Defaults are evaluated per call in the defining environment, so a
        // default that reads surrounding state sees its current value.
        for param in &func.params {
            if bound.contains_key(param.name.as_str()) {
                continue;
            }
            match &param.default {
                Some(expr) => {
                    let v = self.eval_expr(expr, &func.env)?;
                    bound.insert(param.name.as_str(), v);
                }
                None => {
                    return Err(type_error(format!(
                        "{}() missing required argument: '{}'",
                        func.name, param.name
                    )))
                }
            }
        }

        {
            let mut f = frame.borrow_mut();
            for param in &func.params {
                if let Some(v) = bound.remove(param.name.as_str()) {
                    f.define(param.name.clone(), v);
                }
            }
            if let Some(vararg) = &func.vararg {
                f.define(vararg.clone(), Value::list(surplus));
            }
            if let Some(kwarg) = &func.kwarg {
                let mut map = FxHashMap::default();
                for (name, value) in extra_kw {
                    map.insert(Key::Str(Rc::from(name.as_str())), value);
                }
                f.define(kwarg.clone(), Value::dict(map));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Param, Stmt};
    use crate::value::FunctionObject;
    use pretty_assertions::assert_eq;

    fn func_returning(name: &str, params: Vec<Param>, result: Expr, interp: &Interp) -> Value {
        Value::Function(Rc::new(FunctionObject {
            name: name.into(),
            params,
            vararg: None,
            kwarg: None,
            body: Rc::from(vec![Stmt::Return(Some(result))]),
            env: interp.globals(),
        }))
    }

    #[test]
    fn positional_and_keyword_binding() {
        let mut interp = Interp::new();
        let f = func_returning(
            "sub",
            vec![Param::required("a"), Param::required("b")],
            Expr::binary(crate::ast::BinOp::Sub, Expr::name("a"), Expr::name("b")),
            &interp,
        );
        let v = interp
            .call_value(f.clone(), vec![Value::Int(10), Value::Int(3)], vec![])
            .unwrap();
        assert_eq!(v, Value::Int(7));

        let v = interp
            .call_value(
                f,
                vec![Value::Int(10)],
                vec![("b".into(), Value::Int(4))],
            )
            .unwrap();
        assert_eq!(v, Value::Int(6));
    }

    #[test]
    fn arity_errors_are_catchable_type_errors() {
        let mut interp = Interp::new();
        let f = func_returning("f", vec![Param::required("a")], Expr::name("a"), &interp);

        let too_many = interp
            .call_value(f.clone(), vec![Value::Int(1), Value::Int(2)], vec![])
            .unwrap_err();
        assert!(too_many.raised().is_some());

        let missing = interp.call_value(f.clone(), vec![], vec![]).unwrap_err();
        assert!(missing.raised().is_some());

        let dup = interp
            .call_value(f, vec![Value::Int(1)], vec![("a".into(), Value::Int(2))])
            .unwrap_err();
        assert!(dup.raised().is_some());
    }

    #[test]
    fn defaults_are_evaluated_in_the_defining_environment() {
        let mut interp = Interp::new();
        interp.globals().borrow_mut().define("base", Value::Int(100));
        let f = func_returning(
            "f",
            vec![Param::defaulted("x", Expr::name("base"))],
            Expr::name("x"),
            &interp,
        );
        assert_eq!(interp.call_value(f.clone(), vec![], vec![]).unwrap(), Value::Int(100));

        // Rebinding the free variable changes the next call's default.
        interp.globals().borrow_mut().define("base", Value::Int(7));
        assert_eq!(interp.call_value(f, vec![], vec![]).unwrap(), Value::Int(7));
    }

    #[test]
    fn catch_alls_receive_the_surplus() {
        let mut interp = Interp::new();
        let f = Value::Function(Rc::new(FunctionObject {
            name: "f".into(),
            params: vec![Param::required("a")],
            vararg: Some("rest".into()),
            kwarg: Some("kw".into()),
            body: Rc::from(vec![Stmt::Return(Some(Expr::Tuple(vec![
                Expr::name("a"),
                Expr::name("rest"),
                Expr::name("kw").index(Expr::str_("x")),
            ])))]),
            env: interp.globals(),
        }));
        let v = interp
            .call_value(
                f,
                vec![Value::Int(1), Value::Int(2), Value::Int(3)],
                vec![("x".into(), Value::Int(9))],
            )
            .unwrap();
        assert_eq!(
            v,
            Value::tuple(vec![
                Value::Int(1),
                Value::list(vec![Value::Int(2), Value::Int(3)]),
                Value::Int(9),
            ])
        );
    }

    #[test]
    fn recursion_depth_is_a_fatal_error() {
        let mut interp = Interp::new();
        interp.set_max_depth(16);
        let f = Value::Function(Rc::new(FunctionObject {
            name: "loop".into(),
            params: vec![],
            vararg: None,
            kwarg: None,
            body: Rc::from(vec![Stmt::Return(Some(
                Expr::name("loop").call(vec![]),
            ))]),
            env: interp.globals(),
        }));
        interp.globals().borrow_mut().define("loop", f.clone());
        let err = interp.call_value(f, vec![], vec![]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::EvalError::Fatal(FatalError::RecursionLimit)
        ));
    }

    #[test]
    fn non_callables_are_rejected() {
        let mut interp = Interp::new();
        assert!(interp.call_value(Value::Int(1), vec![], vec![]).is_err());
        assert!(interp.call_value(Value::str("x"), vec![], vec![]).is_err());
    }
}
