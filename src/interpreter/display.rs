/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     display.rs
 * Purpose:  Value rendering. `str` is the human-facing form, `repr` the
 *           debugging form; instances dispatch through `__str__` / `__repr__`
 *           when their class defines them.
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

use crate::error::{type_error, EvalResult};
use crate::value::Value;

use super::Interp;

/// Nesting cap while rendering containers; self-referential structures
/// bottom out as `...` instead of overflowing the stack.
const MAX_RENDER_DEPTH: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StrMode {
    /// Human-facing: bare string content, `__str__` first.
    Str,
    /// Debugging: quoted strings, `__repr__` first with `__str__` fallback.
    Repr,
}

impl Interp {
    pub fn stringify(&mut self, value: &Value, mode: StrMode) -> EvalResult<String> {
        self.render(value, mode, 0)
    }

    fn render(&mut self, value: &Value, mode: StrMode, depth: usize) -> EvalResult<String> {
        if depth > MAX_RENDER_DEPTH {
            return Ok("...".to_string());
        }
        match value {
            Value::Int(n) => {
                let mut buf = itoa::Buffer::new();
                Ok(buf.format(*n).to_string())
            }
            Value::Float(f) => Ok(render_float(*f)),
            Value::Bool(true) => Ok("True".to_string()),
            Value::Bool(false) => Ok("False".to_string()),
            Value::None => Ok("None".to_string()),
            Value::Str(s) => Ok(match mode {
                StrMode::Str => s.to_string(),
                StrMode::Repr => quote_str(s),
            }),

            Value::List(items) => {
                // Snapshot so a __repr__ that mutates the list cannot
                // invalidate the borrow mid-render.
                let snapshot: Vec<Value> = items.borrow().clone();
                let mut parts = Vec::with_capacity(snapshot.len());
                for item in &snapshot {
                    parts.push(self.render(item, StrMode::Repr, depth + 1)?);
                }
                Ok(format!("[{}]", parts.join(", ")))
            }

            Value::Tuple(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items.iter() {
                    parts.push(self.render(item, StrMode::Repr, depth + 1)?);
                }
                if parts.len() == 1 {
                    Ok(format!("({},)", parts[0]))
                } else {
                    Ok(format!("({})", parts.join(", ")))
                }
            }

            Value::Dict(map) => {
                let snapshot: Vec<(Value, Value)> = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.to_value(), v.clone()))
                    .collect();
                if snapshot.is_empty() {
                    return Ok("{}".to_string());
                }
                let mut parts = Vec::with_capacity(snapshot.len());
                for (k, v) in &snapshot {
                    let ks = self.render(k, StrMode::Repr, depth + 1)?;
                    let vs = self.render(v, StrMode::Repr, depth + 1)?;
                    parts.push(format!("{ks}: {vs}"));
                }
                Ok(format!("{{{}}}", parts.join(", ")))
            }

            Value::Set(set) => {
                let snapshot: Vec<Value> = set.borrow().iter().map(|k| k.to_value()).collect();
                if snapshot.is_empty() {
                    return Ok("set()".to_string());
                }
                let mut parts = Vec::with_capacity(snapshot.len());
                for item in &snapshot {
                    parts.push(self.render(item, StrMode::Repr, depth + 1)?);
                }
                Ok(format!("{{{}}}", parts.join(", ")))
            }

            Value::Function(func) => Ok(format!("<function {}>", func.name)),
            Value::BoundMethod(m) => Ok(format!("<bound method {}>", m.func.name)),
            Value::Native(n) => Ok(format!("<native function {}>", n.name)),
            Value::Class(c) => Ok(format!("<class '{}'>", c.name)),
            Value::Iterator(_) => Ok("<iterator>".to_string()),
            Value::Super(s) => Ok(format!("<super: '{}'>", s.anchor.name)),

            Value::Exception(e) => Ok(match mode {
                StrMode::Str => e.message.clone(),
                StrMode::Repr => format!("{}({})", e.kind, quote_str(&e.message)),
            }),

            Value::Instance(inst) => {
                let order: &[&str] = match mode {
                    StrMode::Str => &["__str__"],
                    StrMode::Repr => &["__repr__", "__str__"],
                };
                for dunder in order {
                    if let Some(result) = self.call_dunder(value, dunder, vec![])? {
                        return match result {
                            Value::Str(s) => Ok(s.to_string()),
                            other => Err(type_error(format!(
                                "{dunder} returned non-string (type '{}')",
                                other.type_name()
                            ))),
                        };
                    }
                }
                Ok(format!("<{} object>", inst.class.name))
            }
        }
    }
}

/// Float rendering: shortest round-trip form, with a trailing `.0` for
/// integral finite values so floats stay visually distinct from ints.
fn render_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut buf = ryu::Buffer::new();
    buf.format(f).to_string()
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
