/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     helpers.rs
 * Purpose:  Shared semantic helpers: truthiness, equality and ordering with
 *           dunder dispatch, membership, length, and the index / slice
 *           protocol over the built-in sequence kinds.
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

use crate::ast::CmpOp;
use crate::error::{index_error, key_error, type_error, EvalResult};
use crate::value::{Key, Value};

use super::display::StrMode;
use super::Interp;

impl Interp {
    /// Truthiness: `__bool__` wins for instances, then `__len__`, then
    /// every object is truthy. Built-ins are truthy when non-zero /
    /// non-empty.
    pub fn truthy(&mut self, value: &Value) -> EvalResult<bool> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(n) => Ok(*n != 0),
            Value::Float(f) => Ok(*f != 0.0),
            Value::Str(s) => Ok(!s.is_empty()),
            Value::None => Ok(false),
            Value::List(items) => Ok(!items.borrow().is_empty()),
            Value::Dict(map) => Ok(!map.borrow().is_empty()),
            Value::Set(set) => Ok(!set.borrow().is_empty()),
            Value::Tuple(items) => Ok(!items.is_empty()),
            Value::Instance(_) => {
                if let Some(result) = self.call_dunder(value, "__bool__", vec![])? {
                    return match result {
                        Value::Bool(b) => Ok(b),
                        other => Err(type_error(format!(
                            "__bool__ should return bool, returned '{}'",
                            other.type_name()
                        ))),
                    };
                }
                if let Some(result) = self.call_dunder(value, "__len__", vec![])? {
                    return Ok(dunder_len_to_usize(&result)? != 0);
                }
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    /// `len()`: character count for strings, element count for containers,
    /// `__len__` for instances.
    pub fn value_len(&mut self, value: &Value) -> EvalResult<i64> {
        match value {
            Value::Str(s) => Ok(s.chars().count() as i64),
            Value::List(items) => Ok(items.borrow().len() as i64),
            Value::Dict(map) => Ok(map.borrow().len() as i64),
            Value::Set(set) => Ok(set.borrow().len() as i64),
            Value::Tuple(items) => Ok(items.len() as i64),
            Value::Instance(_) => {
                if let Some(result) = self.call_dunder(value, "__len__", vec![])? {
                    return Ok(dunder_len_to_usize(&result)? as i64);
                }
                Err(type_error(format!(
                    "object of type '{}' has no len()",
                    value.type_name()
                )))
            }
            other => Err(type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))),
        }
    }

    /// Equality with `__eq__` dispatch on the left operand (no reflected
    /// form); everything else compares structurally.
    pub fn values_equal(&mut self, left: &Value, right: &Value) -> EvalResult<bool> {
        if matches!(left, Value::Instance(_)) {
            if let Some(result) = self.call_dunder(left, "__eq__", vec![right.clone()])? {
                return self.truthy(&result);
            }
        }
        Ok(Value::equals_structural(left, right))
    }

    /// Ordering (`<`, `>`, `<=`, `>=`): numerics cross int/float, strings
    /// lexicographically, lists and tuples element-wise, instances through
    /// the ordering dunder on the left operand.
    pub fn compare_order(&mut self, op: CmpOp, left: &Value, right: &Value) -> EvalResult<bool> {
        if matches!(left, Value::Instance(_)) {
            if let Some(result) = self.call_dunder(left, order_dunder(op), vec![right.clone()])? {
                return self.truthy(&result);
            }
        }

        let ordering = match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                return self.compare_sequences(op, &a, &b);
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                let (a, b) = (a.clone(), b.clone());
                return self.compare_sequences(op, &a, &b);
            }
            _ => None,
        };

        match ordering {
            Some(ord) => Ok(match op {
                CmpOp::Lt => ord.is_lt(),
                CmpOp::Gt => ord.is_gt(),
                CmpOp::Le => ord.is_le(),
                CmpOp::Ge => ord.is_ge(),
                _ => false,
            }),
            None => Err(type_error(format!(
                "'{}' not supported between '{}' and '{}'",
                order_symbol(op),
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn compare_sequences(&mut self, op: CmpOp, a: &[Value], b: &[Value]) -> EvalResult<bool> {
        for (x, y) in a.iter().zip(b.iter()) {
            if !self.values_equal(x, y)? {
                return self.compare_order(op, x, y);
            }
        }
        let ord = a.len().cmp(&b.len());
        Ok(match op {
            CmpOp::Lt => ord.is_lt(),
            CmpOp::Gt => ord.is_gt(),
            CmpOp::Le => ord.is_le(),
            CmpOp::Ge => ord.is_ge(),
            _ => false,
        })
    }

    /// `in`: substring for strings, key lookup for dicts and sets, element
    /// equality for sequences, `__contains__` (with an iteration fallback)
    /// for instances.
    pub fn contains(&mut self, container: &Value, item: &Value) -> EvalResult<bool> {
        match container {
            Value::Str(s) => match item {
                Value::Str(needle) => Ok(s.contains(needle.as_ref())),
                other => Err(type_error(format!(
                    "'in <str>' requires string as left operand, not '{}'",
                    other.type_name()
                ))),
            },
            Value::Dict(map) => {
                let key = Key::from_value(item)?;
                Ok(map.borrow().contains_key(&key))
            }
            Value::Set(set) => {
                let key = Key::from_value(item)?;
                Ok(set.borrow().contains(&key))
            }
            Value::List(items) => {
                let snapshot = items.borrow().clone();
                for candidate in &snapshot {
                    if self.values_equal(candidate, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Tuple(items) => {
                let items = items.clone();
                for candidate in items.iter() {
                    if self.values_equal(candidate, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Instance(_) => {
                if let Some(result) =
                    self.call_dunder(container, "__contains__", vec![item.clone()])?
                {
                    return self.truthy(&result);
                }
                let iter = self.make_iterator(container.clone())?;
                if let Value::Iterator(it) = &iter {
                    while let Some(candidate) = self.iter_next(it)? {
                        if self.values_equal(&candidate, item)? {
                            return Ok(true);
                        }
                    }
                    return Ok(false);
                }
                Ok(false)
            }
            other => Err(type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    // ---------------------------------------------------------------------
    // Index protocol
    // ---------------------------------------------------------------------

    pub fn value_index(&mut self, object: &Value, index: &Value) -> EvalResult<Value> {
        match object {
            Value::List(items) => {
                let items = items.borrow();
                let i = normalize_index(object, index, items.len())?;
                Ok(items[i].clone())
            }
            Value::Tuple(items) => {
                let i = normalize_index(object, index, items.len())?;
                Ok(items[i].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = normalize_index(object, index, chars.len())?;
                Ok(Value::str(chars[i].to_string()))
            }
            Value::Dict(map) => {
                let key = Key::from_value(index)?;
                match map.borrow().get(&key) {
                    Some(v) => Ok(v.clone()),
                    None => Err(key_error(self.stringify(index, StrMode::Repr)?)),
                }
            }
            Value::Instance(_) => {
                match self.call_dunder(object, "__getitem__", vec![index.clone()])? {
                    Some(v) => Ok(v),
                    None => Err(type_error(format!(
                        "'{}' object is not subscriptable",
                        object.type_name()
                    ))),
                }
            }
            other => Err(type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    pub fn value_set_index(
        &mut self,
        object: &Value,
        index: &Value,
        value: Value,
    ) -> EvalResult<()> {
        match object {
            Value::List(items) => {
                let i = normalize_index(object, index, items.borrow().len())?;
                items.borrow_mut()[i] = value;
                Ok(())
            }
            Value::Dict(map) => {
                let key = Key::from_value(index)?;
                map.borrow_mut().insert(key, value);
                Ok(())
            }
            Value::Instance(_) => {
                match self.call_dunder(object, "__setitem__", vec![index.clone(), value])? {
                    Some(_) => Ok(()),
                    None => Err(type_error(format!(
                        "'{}' object does not support item assignment",
                        object.type_name()
                    ))),
                }
            }
            other => Err(type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    pub fn value_del_index(&mut self, object: &Value, index: &Value) -> EvalResult<()> {
        match object {
            Value::List(items) => {
                let i = normalize_index(object, index, items.borrow().len())?;
                items.borrow_mut().remove(i);
                Ok(())
            }
            Value::Dict(map) => {
                let key = Key::from_value(index)?;
                if map.borrow_mut().remove(&key).is_none() {
                    return Err(key_error(self.stringify(index, StrMode::Repr)?));
                }
                Ok(())
            }
            Value::Instance(_) => {
                match self.call_dunder(object, "__delitem__", vec![index.clone()])? {
                    Some(_) => Ok(()),
                    None => Err(type_error(format!(
                        "'{}' object does not support item deletion",
                        object.type_name()
                    ))),
                }
            }
            other => Err(type_error(format!(
                "'{}' object does not support item deletion",
                other.type_name()
            ))),
        }
    }

    // ---------------------------------------------------------------------
    // Slice protocol
    // ---------------------------------------------------------------------

    /// Reads `object[start:stop:step]`. Out-of-range bounds clamp instead of
    /// raising; a zero step raises ValueError.
    pub fn value_slice(
        &mut self,
        object: &Value,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> EvalResult<Value> {
        match object {
            Value::List(items) => {
                let snapshot = items.borrow().clone();
                let picked = slice_pick(&snapshot, start, stop, step)?;
                Ok(Value::list(picked))
            }
            Value::Tuple(items) => {
                let picked = slice_pick(items, start, stop, step)?;
                Ok(Value::tuple(picked))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let indices = slice_indices(chars.len(), start, stop, step)?;
                let out: String = indices.into_iter().map(|i| chars[i]).collect();
                Ok(Value::str(out))
            }
            other => Err(type_error(format!(
                "'{}' object is not sliceable",
                other.type_name()
            ))),
        }
    }

    /// Writes `object[start:stop] = iterable` (lists only, unit step). The
    /// replacement may differ in length from the selected range.
    pub fn value_set_slice(
        &mut self,
        object: &Value,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
        value: &Value,
    ) -> EvalResult<()> {
        let Value::List(items) = object else {
            return Err(type_error(format!(
                "'{}' object does not support slice assignment",
                object.type_name()
            )));
        };
        if step.unwrap_or(1) != 1 {
            return Err(type_error("slice assignment requires step 1"));
        }
        let replacement = self.collect_iterable(value)?;
        let len = items.borrow().len();
        let (lo, hi) = slice_range(len, start, stop);
        items.borrow_mut().splice(lo..hi, replacement);
        Ok(())
    }

    /// Deletes `del object[start:stop:step]` (lists only).
    pub fn value_del_slice(
        &mut self,
        object: &Value,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> EvalResult<()> {
        let Value::List(items) = object else {
            return Err(type_error(format!(
                "'{}' object does not support slice deletion",
                object.type_name()
            )));
        };
        let len = items.borrow().len();
        let mut doomed = slice_indices(len, start, stop, step)?;
        doomed.sort_unstable();
        let mut borrow = items.borrow_mut();
        for i in doomed.into_iter().rev() {
            borrow.remove(i);
        }
        Ok(())
    }
}

fn dunder_len_to_usize(result: &Value) -> EvalResult<usize> {
    match result {
        Value::Int(n) if *n >= 0 => Ok(*n as usize),
        Value::Int(_) => Err(crate::error::value_error("__len__ returned a negative value")),
        other => Err(type_error(format!(
            "__len__ should return int, returned '{}'",
            other.type_name()
        ))),
    }
}

fn order_dunder(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "__lt__",
        CmpOp::Gt => "__gt__",
        CmpOp::Le => "__le__",
        _ => "__ge__",
    }
}

fn order_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "<",
        CmpOp::Gt => ">",
        CmpOp::Le => "<=",
        _ => ">=",
    }
}

/// Negative indices count from the end; anything still out of range is an
/// IndexError.
fn normalize_index(object: &Value, index: &Value, len: usize) -> EvalResult<usize> {
    let raw = index.as_int().ok_or_else(|| {
        type_error(format!(
            "'{}' indices must be integers, not '{}'",
            object.type_name(),
            index.type_name()
        ))
    })?;
    let adjusted = if raw < 0 { raw + len as i64 } else { raw };
    if adjusted < 0 || adjusted >= len as i64 {
        return Err(index_error(format!(
            "{} index out of range",
            object.type_name()
        )));
    }
    Ok(adjusted as usize)
}

/// Clamped `[lo, hi)` for a unit-step slice.
fn slice_range(len: usize, start: Option<i64>, stop: Option<i64>) -> (usize, usize) {
    let clamp = |i: i64| -> usize {
        let adjusted = if i < 0 { i + len as i64 } else { i };
        adjusted.clamp(0, len as i64) as usize
    };
    let lo = clamp(start.unwrap_or(0));
    let hi = clamp(stop.unwrap_or(len as i64));
    (lo, hi.max(lo))
}

/// The element indices a general slice selects, in selection order.
/// Mirrors the usual clamping rules for negative bounds and steps.
fn slice_indices(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> EvalResult<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(crate::error::value_error("slice step cannot be zero"));
    }
    let n = len as i64;
    let (default_start, default_stop) = if step > 0 { (0, n) } else { (n - 1, -n - 1) };

    let adjust = |v: i64, lo: i64, hi: i64| -> i64 {
        let v = if v < 0 { v + n } else { v };
        v.clamp(lo, hi)
    };
    let (start, stop) = if step > 0 {
        (
            adjust(start.unwrap_or(default_start), 0, n),
            adjust(stop.unwrap_or(default_stop), 0, n),
        )
    } else {
        (
            adjust(start.unwrap_or(default_start), -1, n - 1),
            adjust(stop.unwrap_or(default_stop), -1, n - 1),
        )
    };

    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        while i > stop {
            out.push(i as usize);
            i += step;
        }
    }
    Ok(out)
}

fn slice_pick(
    items: &[Value],
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> EvalResult<Vec<Value>> {
    let indices = slice_indices(items.len(), start, stop, step)?;
    Ok(indices.into_iter().map(|i| items[i].clone()).collect())
}
