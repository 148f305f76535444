/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * File:     environment.rs
 * Purpose:  Chained scope frames. Frames form a tree through closures; a
 *           frame lives as long as the longest-lived closure or in-flight
 *           call referencing it.
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

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{name_error, EvalResult};
use crate::value::Value;

/// One scope frame: a name→value map plus an optional enclosing frame, and
/// the per-frame `global` / `nonlocal` declaration sets that redirect
/// assignment.
pub struct Environment {
    values: FxHashMap<String, Value>,
    parent: Option<Rc<RefCell<Environment>>>,
    globals_decl: FxHashSet<String>,
    nonlocals_decl: FxHashSet<String>,
}

pub type EnvRef = Rc<RefCell<Environment>>;

impl Environment {
    pub fn new(parent: Option<EnvRef>) -> Self {
        Self {
            values: FxHashMap::default(),
            parent,
            globals_decl: FxHashSet::default(),
            nonlocals_decl: FxHashSet::default(),
        }
    }

    pub fn new_child(parent: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment::new(Some(Rc::clone(parent)))))
    }

    /// Creates (or overwrites) a binding in this frame.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn declare_global(&mut self, name: impl Into<String>) {
        self.globals_decl.insert(name.into());
    }

    pub fn declare_nonlocal(&mut self, name: impl Into<String>) {
        self.nonlocals_decl.insert(name.into());
    }

    pub fn owns(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Walks frame → parent, returning the first binding found.
    pub fn lookup(frame: &EnvRef, name: &str) -> Option<Value> {
        let mut cur = Rc::clone(frame);
        loop {
            let next = {
                let b = cur.borrow();
                if let Some(v) = b.values.get(name) {
                    return Some(v.clone());
                }
                b.parent.clone()
            };
            match next {
                Some(p) => cur = p,
                None => return None,
            }
        }
    }

    /// The module (root) frame of the chain.
    pub fn module_frame(frame: &EnvRef) -> EnvRef {
        let mut cur = Rc::clone(frame);
        loop {
            let next = cur.borrow().parent.clone();
            match next {
                Some(p) => cur = p,
                None => return cur,
            }
        }
    }

    /// Plain assignment: rebinds the nearest frame in the chain that already
    /// owns the name, else creates a local in the current frame — unless the
    /// current frame declared the name `global` (module frame) or `nonlocal`
    /// (nearest enclosing owner, error when none exists).
    pub fn assign(frame: &EnvRef, name: &str, value: Value) -> EvalResult<()> {
        let (is_global, is_nonlocal) = {
            let b = frame.borrow();
            (
                b.globals_decl.contains(name),
                b.nonlocals_decl.contains(name),
            )
        };

        if is_global {
            Environment::module_frame(frame)
                .borrow_mut()
                .define(name, value);
            return Ok(());
        }

        if is_nonlocal {
            let mut cur = match frame.borrow().parent.clone() {
                Some(p) => p,
                None => return Err(name_error(name)),
            };
            loop {
                if cur.borrow().owns(name) {
                    cur.borrow_mut().define(name, value);
                    return Ok(());
                }
                let next = cur.borrow().parent.clone();
                match next {
                    Some(p) => cur = p,
                    None => return Err(name_error(name)),
                }
            }
        }

        let mut cur = Rc::clone(frame);
        loop {
            if cur.borrow().owns(name) {
                cur.borrow_mut().define(name, value);
                return Ok(());
            }
            let next = cur.borrow().parent.clone();
            match next {
                Some(p) => cur = p,
                None => break,
            }
        }
        frame.borrow_mut().define(name, value);
        Ok(())
    }

    /// `del name`: removes the nearest binding in the chain.
    pub fn remove(frame: &EnvRef, name: &str) -> EvalResult<()> {
        let mut cur = Rc::clone(frame);
        loop {
            if cur.borrow_mut().values.remove(name).is_some() {
                return Ok(());
            }
            let next = cur.borrow().parent.clone();
            match next {
                Some(p) => cur = p,
                None => return Err(name_error(name)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> EnvRef {
        Rc::new(RefCell::new(Environment::new(None)))
    }

    #[test]
    fn lookup_walks_the_chain() {
        let module = root();
        module.borrow_mut().define("x", Value::Int(1));
        let inner = Environment::new_child(&module);
        assert_eq!(Environment::lookup(&inner, "x"), Some(Value::Int(1)));
        assert_eq!(Environment::lookup(&inner, "y"), None);
    }

    #[test]
    fn assignment_rebinds_the_nearest_owner() {
        let module = root();
        module.borrow_mut().define("x", Value::Int(1));
        let inner = Environment::new_child(&module);
        Environment::assign(&inner, "x", Value::Int(2)).unwrap();
        assert!(!inner.borrow().owns("x"));
        assert_eq!(Environment::lookup(&module, "x"), Some(Value::Int(2)));
    }

    #[test]
    fn assignment_defines_locally_when_unowned() {
        let module = root();
        let inner = Environment::new_child(&module);
        Environment::assign(&inner, "fresh", Value::Int(7)).unwrap();
        assert!(inner.borrow().owns("fresh"));
        assert_eq!(Environment::lookup(&module, "fresh"), None);
    }

    #[test]
    fn global_declaration_targets_the_module_frame() {
        let module = root();
        let mid = Environment::new_child(&module);
        let inner = Environment::new_child(&mid);
        inner.borrow_mut().declare_global("g");
        Environment::assign(&inner, "g", Value::Int(9)).unwrap();
        assert!(module.borrow().owns("g"));
        assert!(!inner.borrow().owns("g"));
    }

    #[test]
    fn nonlocal_requires_an_existing_enclosing_binding() {
        let module = root();
        let outer = Environment::new_child(&module);
        outer.borrow_mut().define("n", Value::Int(1));
        let inner = Environment::new_child(&outer);
        inner.borrow_mut().declare_nonlocal("n");
        Environment::assign(&inner, "n", Value::Int(5)).unwrap();
        assert_eq!(Environment::lookup(&outer, "n"), Some(Value::Int(5)));

        let lonely = Environment::new_child(&module);
        lonely.borrow_mut().declare_nonlocal("missing");
        assert!(Environment::assign(&lonely, "missing", Value::None).is_err());
    }

    #[test]
    fn closure_frames_see_later_mutation() {
        let module = root();
        let captured = Environment::new_child(&module);
        captured.borrow_mut().define("cell", Value::Int(1));
        // Another holder of the same frame observes the update.
        let alias = Rc::clone(&captured);
        Environment::assign(&captured, "cell", Value::Int(2)).unwrap();
        assert_eq!(Environment::lookup(&alias, "cell"), Some(Value::Int(2)));
    }

    #[test]
    fn remove_deletes_the_nearest_binding() {
        let module = root();
        module.borrow_mut().define("x", Value::Int(1));
        let inner = Environment::new_child(&module);
        inner.borrow_mut().define("x", Value::Int(2));
        Environment::remove(&inner, "x").unwrap();
        assert_eq!(Environment::lookup(&inner, "x"), Some(Value::Int(1)));
        Environment::remove(&inner, "x").unwrap();
        assert!(Environment::remove(&inner, "x").is_err());
    }
}
