/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     classes.rs
 * Purpose:  The single-inheritance class system: class construction with a
 *           precomputed ancestor chain and dunder protocol table, instance
 *           construction, attribute resolution (methods, properties, static
 *           and class methods) and the `super()` proxy.
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

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{Expr, Stmt, Target};
use crate::error::{attribute_error, type_error, EvalResult, FatalError};
use crate::value::{
    BoundMethod, ClassMember, ClassObject, FunctionObject, InstanceObject, MethodKind, ProtocolFn,
    ProtocolTable, SuperProxy, Value,
};

use super::environment::EnvRef;
use super::Interp;

/// The dunders the dispatch system recognizes. A method with one of these
/// names lands in the class's protocol table at construction time; any other
/// double-underscore name is just an ordinary method.
const DUNDER_NAMES: &[&str] = &[
    "__init__",
    "__str__",
    "__repr__",
    "__len__",
    "__bool__",
    "__eq__",
    "__ne__",
    "__lt__",
    "__gt__",
    "__le__",
    "__ge__",
    "__contains__",
    "__iter__",
    "__next__",
    "__enter__",
    "__exit__",
    "__getitem__",
    "__setitem__",
    "__delitem__",
    "__call__",
    "__add__",
    "__sub__",
    "__mul__",
    "__truediv__",
    "__floordiv__",
    "__mod__",
    "__neg__",
];

fn dunder_key(name: &str) -> Option<&'static str> {
    DUNDER_NAMES.iter().find(|d| **d == name).copied()
}

/// Walks the class and its ancestors, returning the first class owning the
/// named member together with the member itself.
fn find_member(class: &Rc<ClassObject>, name: &str) -> Option<(Rc<ClassObject>, ClassMember)> {
    if let Some(m) = class.members.get(name) {
        return Some((Rc::clone(class), m.clone()));
    }
    for ancestor in &class.ancestors {
        if let Some(m) = ancestor.members.get(name) {
            return Some((Rc::clone(ancestor), m.clone()));
        }
    }
    None
}

impl Interp {
    /// Executes a class body into a finished, immutable class value. The
    /// body may contain method definitions, `name = expr` attribute
    /// bindings, docstrings and `pass`; anything else is malformed.
    pub fn build_class(
        &mut self,
        name: &str,
        parent_expr: Option<&Expr>,
        body: &[Stmt],
        env: &EnvRef,
    ) -> EvalResult<Value> {
        let parent = match parent_expr {
            Some(expr) => match self.eval_expr(expr, env)? {
                Value::Class(c) => Some(c),
                other => {
                    return Err(type_error(format!(
                        "class '{name}' parent must be a class, not '{}'",
                        other.type_name()
                    )))
                }
            },
            None => None,
        };

        let mut ancestors = Vec::new();
        if let Some(p) = &parent {
            ancestors.push(Rc::clone(p));
            ancestors.extend(p.ancestors.iter().cloned());
        }

        let mut members: FxHashMap<String, ClassMember> = FxHashMap::default();
        for stmt in body {
            match stmt {
                Stmt::Pass => {}
                Stmt::Expr(Expr::Str(_)) => {}
                Stmt::Assign {
                    target: Target::Name(attr),
                    value,
                } => {
                    let v = self.eval_expr(value, env)?;
                    members.insert(attr.clone(), ClassMember::Attr(v));
                }
                Stmt::FuncDef(def) => {
                    let func = Rc::new(FunctionObject {
                        name: format!("{name}.{}", def.name),
                        params: def.params.clone(),
                        vararg: def.vararg.clone(),
                        kwarg: def.kwarg.clone(),
                        body: Rc::from(def.body.clone()),
                        env: Rc::clone(env),
                    });
                    self.install_method(name, &mut members, &def.name, func, &def.decorators)?;
                }
                _ => {
                    return Err(FatalError::Malformed(format!(
                        "unsupported statement in body of class '{name}'"
                    ))
                    .into())
                }
            }
        }

        // Protocol table: inherited entries shift one step deeper, own
        // instance methods with recognized dunder names override at depth 0.
        let mut protocols: ProtocolTable = ProtocolTable::default();
        if let Some(p) = &parent {
            for (key, pf) in &p.protocols {
                protocols.insert(
                    *key,
                    ProtocolFn {
                        func: Rc::clone(&pf.func),
                        depth: pf.depth + 1,
                    },
                );
            }
        }
        for (member_name, member) in &members {
            if let (Some(key), ClassMember::Method { func, kind }) =
                (dunder_key(member_name), member)
            {
                if *kind == MethodKind::Instance {
                    protocols.insert(
                        key,
                        ProtocolFn {
                            func: Rc::clone(func),
                            depth: 0,
                        },
                    );
                }
            }
        }

        Ok(Value::Class(Rc::new(ClassObject {
            name: name.to_string(),
            parent,
            ancestors,
            members,
            protocols,
        })))
    }

    fn install_method(
        &mut self,
        class_name: &str,
        members: &mut FxHashMap<String, ClassMember>,
        method_name: &str,
        func: Rc<FunctionObject>,
        decorators: &[Expr],
    ) -> EvalResult<()> {
        match decorators {
            [] => {
                members.insert(
                    method_name.to_string(),
                    ClassMember::Method {
                        func,
                        kind: MethodKind::Instance,
                    },
                );
            }
            [Expr::Name(d)] if d == "staticmethod" => {
                members.insert(
                    method_name.to_string(),
                    ClassMember::Method {
                        func,
                        kind: MethodKind::Static,
                    },
                );
            }
            [Expr::Name(d)] if d == "classmethod" => {
                members.insert(
                    method_name.to_string(),
                    ClassMember::Method {
                        func,
                        kind: MethodKind::Class,
                    },
                );
            }
            [Expr::Name(d)] if d == "property" => {
                members.insert(
                    method_name.to_string(),
                    ClassMember::Property {
                        getter: func,
                        setter: None,
                    },
                );
            }
            [Expr::Attribute { object, name }] if name == "setter" => {
                let Expr::Name(prop) = object.as_ref() else {
                    return Err(FatalError::Malformed(format!(
                        "malformed setter decorator on '{class_name}.{method_name}'"
                    ))
                    .into());
                };
                match members.get_mut(prop) {
                    Some(ClassMember::Property { setter, .. }) => {
                        *setter = Some(func);
                    }
                    _ => {
                        return Err(FatalError::Malformed(format!(
                            "setter for '{prop}' has no matching property in class '{class_name}'"
                        ))
                        .into())
                    }
                }
            }
            _ => {
                return Err(FatalError::Malformed(format!(
                    "unsupported decorator on method '{class_name}.{method_name}'"
                ))
                .into())
            }
        }
        Ok(())
    }

    /// Builds an instance and runs the `__init__` chain when the class (or
    /// an ancestor) defines one.
    pub fn construct_instance(
        &mut self,
        class: &Rc<ClassObject>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        let instance = Value::Instance(Rc::new(InstanceObject {
            class: Rc::clone(class),
            attrs: RefCell::new(FxHashMap::default()),
        }));

        if let Some(pf) = class.protocols.get("__init__") {
            let func = Rc::clone(&pf.func);
            let defining = class.class_at_depth(pf.depth);
            let result = self.call_function_object(
                &func,
                Some(instance.clone()),
                Some(defining),
                args,
                kwargs,
            )?;
            if !matches!(result, Value::None) {
                return Err(type_error(format!(
                    "__init__() should return None, not '{}'",
                    result.type_name()
                )));
            }
        } else if !args.is_empty() || !kwargs.is_empty() {
            return Err(type_error(format!("{}() takes no arguments", class.name)));
        }

        Ok(instance)
    }

    /// Invokes a protocol-table dunder on an instance. `Ok(None)` means the
    /// receiver is not an instance or its class has no such entry.
    pub fn call_dunder(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> EvalResult<Option<Value>> {
        self.call_dunder_with_kwargs(receiver, name, args, vec![])
    }

    pub fn call_dunder_with_kwargs(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Option<Value>> {
        let Value::Instance(inst) = receiver else {
            return Ok(None);
        };
        let Some(pf) = inst.class.protocols.get(name) else {
            return Ok(None);
        };
        let func = Rc::clone(&pf.func);
        let defining = inst.class.class_at_depth(pf.depth);
        self.call_function_object(&func, Some(receiver.clone()), Some(defining), args, kwargs)
            .map(Some)
    }

    // ---------------------------------------------------------------------
    // Attribute protocol
    // ---------------------------------------------------------------------

    pub fn get_attr(&mut self, object: &Value, name: &str) -> EvalResult<Value> {
        match object {
            Value::Instance(inst) => {
                // Properties shadow same-named instance attributes.
                if let Some((defining, ClassMember::Property { getter, .. })) =
                    find_member(&inst.class, name)
                {
                    return self.call_function_object(
                        &getter,
                        Some(object.clone()),
                        Some(defining),
                        vec![],
                        vec![],
                    );
                }
                if let Some(v) = inst.attrs.borrow().get(name) {
                    return Ok(v.clone());
                }
                if let Some((defining, member)) = find_member(&inst.class, name) {
                    return Ok(self.bind_member(object, &inst.class, &defining, member));
                }
                Err(attribute_error(format!(
                    "'{}' object has no attribute '{name}'",
                    inst.class.name
                )))
            }

            Value::Class(class) => {
                if let Some((defining, member)) = find_member(class, name) {
                    return Ok(match member {
                        ClassMember::Method { func, kind } => match kind {
                            MethodKind::Class => Value::BoundMethod(Rc::new(BoundMethod {
                                receiver: Value::Class(Rc::clone(class)),
                                func,
                                defining_class: Some(defining),
                            })),
                            _ => Value::Function(func),
                        },
                        ClassMember::Property { getter, .. } => Value::Function(getter),
                        ClassMember::Attr(v) => v,
                    });
                }
                Err(attribute_error(format!(
                    "class '{}' has no attribute '{name}'",
                    class.name
                )))
            }

            Value::Super(proxy) => self.super_attr(proxy, name),

            Value::Exception(exc) => match name {
                "message" => Ok(Value::str(&exc.message)),
                "kind" => Ok(Value::str(exc.kind.name())),
                "code" => Ok(exc.exit_code.map_or(Value::None, Value::Int)),
                _ => Err(attribute_error(format!(
                    "'{}' exception has no attribute '{name}'",
                    exc.kind
                ))),
            },

            other => Err(attribute_error(format!(
                "'{}' object has no attribute '{name}'",
                other.type_name()
            ))),
        }
    }

    /// Attribute resolution through a `super()` proxy: the search starts at
    /// the anchor's parent, never at the receiver's dynamic class.
    fn super_attr(&mut self, proxy: &Rc<SuperProxy>, name: &str) -> EvalResult<Value> {
        for ancestor in &proxy.anchor.ancestors {
            let Some(member) = ancestor.members.get(name).cloned() else {
                continue;
            };
            let receiver_class = match &proxy.receiver {
                Value::Instance(i) => Rc::clone(&i.class),
                Value::Class(c) => Rc::clone(c),
                _ => Rc::clone(ancestor),
            };
            return match member {
                ClassMember::Property { getter, .. } => self.call_function_object(
                    &getter,
                    Some(proxy.receiver.clone()),
                    Some(Rc::clone(ancestor)),
                    vec![],
                    vec![],
                ),
                other => Ok(self.bind_member(
                    &proxy.receiver,
                    &receiver_class,
                    ancestor,
                    other,
                )),
            };
        }
        Err(attribute_error(format!(
            "'super' object has no attribute '{name}'"
        )))
    }

    /// Binds a found class member against a receiver. Classmethods bind the
    /// receiver's dynamic class, so factories inherited through a subclass
    /// construct the subclass.
    fn bind_member(
        &mut self,
        receiver: &Value,
        receiver_class: &Rc<ClassObject>,
        defining: &Rc<ClassObject>,
        member: ClassMember,
    ) -> Value {
        match member {
            ClassMember::Method { func, kind } => match kind {
                MethodKind::Instance => Value::BoundMethod(Rc::new(BoundMethod {
                    receiver: receiver.clone(),
                    func,
                    defining_class: Some(Rc::clone(defining)),
                })),
                MethodKind::Static => Value::Function(func),
                MethodKind::Class => Value::BoundMethod(Rc::new(BoundMethod {
                    receiver: Value::Class(Rc::clone(receiver_class)),
                    func,
                    defining_class: Some(Rc::clone(defining)),
                })),
            },
            ClassMember::Property { getter, .. } => Value::Function(getter),
            ClassMember::Attr(v) => v,
        }
    }

    pub fn set_attr(&mut self, object: &Value, name: &str, value: Value) -> EvalResult<()> {
        match object {
            Value::Instance(inst) => {
                if let Some((defining, ClassMember::Property { setter, .. })) =
                    find_member(&inst.class, name)
                {
                    return match setter {
                        Some(setter) => {
                            self.call_function_object(
                                &setter,
                                Some(object.clone()),
                                Some(defining),
                                vec![value],
                                vec![],
                            )?;
                            Ok(())
                        }
                        None => Err(attribute_error(format!(
                            "property '{name}' of '{}' has no setter",
                            inst.class.name
                        ))),
                    };
                }
                inst.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            // Classes are frozen once their definition completes.
            Value::Class(class) => Err(attribute_error(format!(
                "class '{}' is immutable",
                class.name
            ))),
            other => Err(attribute_error(format!(
                "'{}' object does not support attribute assignment",
                other.type_name()
            ))),
        }
    }

    pub fn del_attr(&mut self, object: &Value, name: &str) -> EvalResult<()> {
        match object {
            Value::Instance(inst) => {
                if inst.attrs.borrow_mut().remove(name).is_none() {
                    return Err(attribute_error(format!(
                        "'{}' object has no attribute '{name}'",
                        inst.class.name
                    )));
                }
                Ok(())
            }
            other => Err(attribute_error(format!(
                "'{}' object does not support attribute deletion",
                other.type_name()
            ))),
        }
    }
}
