/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     iterators.rs
 * Purpose:  The iteration protocol. Built-in collections iterate over a
 *           snapshot taken when the iterator is created; user objects drive
 *           through `__iter__` / `__next__` with StopIteration ending the
 *           stream. Exhaustion is sticky.
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

use crate::error::{type_error, EvalError, EvalResult, ExcKind};
use crate::value::{IterState, IteratorObject, Value};

use super::Interp;

impl Interp {
    /// Produces an iterator for any iterable value. An existing iterator is
    /// returned unchanged, so `iter(iter(x))` is `iter(x)`.
    pub fn make_iterator(&mut self, value: Value) -> EvalResult<Value> {
        match &value {
            Value::Iterator(_) => Ok(value),
            Value::List(items) => Ok(IteratorObject::from_items(items.borrow().clone())),
            Value::Tuple(items) => Ok(IteratorObject::from_items(items.to_vec())),
            Value::Str(s) => Ok(IteratorObject::from_items(
                s.chars().map(|c| Value::str(c.to_string())).collect(),
            )),
            Value::Dict(map) => Ok(IteratorObject::from_items(
                map.borrow().keys().map(|k| k.to_value()).collect(),
            )),
            Value::Set(set) => Ok(IteratorObject::from_items(
                set.borrow().iter().map(|k| k.to_value()).collect(),
            )),
            Value::Instance(inst) => {
                if inst.class.protocols.contains_key("__iter__") {
                    let produced = match self.call_dunder(&value, "__iter__", vec![])? {
                        Some(v) => v,
                        None => {
                            return Err(type_error(format!(
                                "'{}' object is not iterable",
                                value.type_name()
                            )))
                        }
                    };
                    return match produced {
                        Value::Iterator(_) => Ok(produced),
                        Value::Instance(ref i) if i.class.protocols.contains_key("__next__") => {
                            Ok(IteratorObject::from_object(produced))
                        }
                        other => Err(type_error(format!(
                            "__iter__ returned non-iterator of type '{}'",
                            other.type_name()
                        ))),
                    };
                }
                if inst.class.protocols.contains_key("__next__") {
                    return Ok(IteratorObject::from_object(value));
                }
                Err(type_error(format!(
                    "'{}' object is not iterable",
                    value.type_name()
                )))
            }
            other => Err(type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// One step. `None` means exhausted, and an exhausted iterator keeps
    /// yielding `None` no matter what its source does afterwards.
    pub fn iter_next(&mut self, iterator: &Rc<IteratorObject>) -> EvalResult<Option<Value>> {
        if iterator.exhausted.get() {
            return Ok(None);
        }

        // Extract the user object (when there is one) before re-entering the
        // interpreter, so the state cell is not borrowed across the call.
        let object = {
            let mut state = iterator.state.borrow_mut();
            match &mut *state {
                IterState::Items { items, pos } => {
                    if *pos < items.len() {
                        let v = items[*pos].clone();
                        *pos += 1;
                        return Ok(Some(v));
                    }
                    iterator.exhausted.set(true);
                    return Ok(None);
                }
                IterState::Range { next, stop, step } => {
                    let done = if *step > 0 { *next >= *stop } else { *next <= *stop };
                    if done {
                        iterator.exhausted.set(true);
                        return Ok(None);
                    }
                    let v = *next;
                    *next += *step;
                    return Ok(Some(Value::Int(v)));
                }
                IterState::Object { obj } => obj.clone(),
            }
        };

        match self.call_dunder(&object, "__next__", vec![]) {
            Ok(Some(v)) => Ok(Some(v)),
            Ok(None) => Err(type_error(format!(
                "'{}' object is not an iterator",
                object.type_name()
            ))),
            Err(EvalError::Raise(Value::Exception(ref exc)))
                if exc.kind == ExcKind::StopIteration =>
            {
                iterator.exhausted.set(true);
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    /// Drains an iterable into a vector.
    pub fn collect_iterable(&mut self, value: &Value) -> EvalResult<Vec<Value>> {
        let iter = self.make_iterator(value.clone())?;
        let Value::Iterator(it) = &iter else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        while let Some(v) = self.iter_next(it)? {
            out.push(v);
        }
        Ok(out)
    }
}
