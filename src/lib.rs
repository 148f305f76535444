/*
 * ==========================================================================
 * PYRITE - Embeddable Python-flavored Scripting Core
 * ==========================================================================
 *
 * Pyrite is the evaluator and object-model core of a sandboxed, dynamically
 * typed scripting language with Python-inspired semantics. A host embeds it
 * by handing pre-built syntax trees to an `Interp`, registering native
 * functions for everything that touches the outside world, and observing
 * results and failures through `Value` and `TopError`.
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

pub mod ast;
pub mod error;
pub mod interpreter;
pub mod value;

pub use error::{EvalError, EvalResult, ExcKind, ExceptionObject, FatalError, TopError};
pub use interpreter::display::StrMode;
pub use interpreter::environment::{EnvRef, Environment};
pub use interpreter::{CancelToken, Interp, NativeCall};
pub use value::Value;
