/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Author:   Sam Wilcox
 * Email:    sam@pawx-lang.com
 * Website:  https://www.pawx-lang.com
 * Github:   https://github.com/samwilcox/sandpaw
 *
 * License:
 * This file is part of the SANDPAW sandboxed interpreter project.
 *
 * SANDPAW is dual-licensed under the terms of:
 *   - The MIT license
 *   - The Apache License, Version 2.0
 *
 * You may choose either license to govern your use of this software.
 * Full license text available at:
 *    https://license.pawx-lang.com
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under these licenses is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *
 * ==========================================================================
 */

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::ast::FunctionNode;
use crate::error::SandpawError;
use crate::host::HostFunction;
use crate::interpreter::classes::ClassData;
use crate::interpreter::environment::Environment;
use crate::interpreter::generators::GeneratorData;

/// Sandpaw runtime value representation.
///
/// This is the core type that flows through the evaluator. Every guest
/// expression ultimately evaluates to one of these. Reference variants
/// share their payload through `Rc` so that guest aliasing behaves the
/// way scripts expect.
pub enum Value {
    // Primitive scalars
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(Rc<BigInt>),
    Str(String),
    Symbol(Rc<SymbolData>),

    // Reference values, shared across copies
    Array(Rc<RefCell<ArrayData>>),
    Object(Rc<RefCell<ObjectData>>),

    // Callables
    Function(Rc<FunctionData>),
    HostFunction(Rc<HostFunction>),
    Class(Rc<ClassData>),

    // Coroutines
    Generator(Rc<RefCell<GeneratorData>>),
    AsyncGenerator(Rc<RefCell<GeneratorData>>),

    // Settled promise wrapper (awaitable)
    Promise(Rc<RefCell<PromiseData>>),

    // Guest regular expression
    Regex(Rc<RegexData>),
}

/// Backing storage for guest objects and for read-only host objects.
///
/// Guest objects are prototypeless bags: a missing property reads as
/// `undefined`. Host objects (`host == true`) reject writes and reject
/// non-own reads at the member-access gate.
pub struct ObjectData {
    pub props: IndexMap<String, Value>,
    pub readonly: bool,
    pub host: bool,
}

impl ObjectData {
    pub fn new() -> Self {
        Self {
            props: IndexMap::new(),
            readonly: false,
            host: false,
        }
    }

    pub fn host_readonly(props: IndexMap<String, Value>) -> Self {
        Self {
            props,
            readonly: true,
            host: true,
        }
    }
}

impl Default for ObjectData {
    fn default() -> Self {
        Self::new()
    }
}

/// Backing storage for guest arrays.
pub struct ArrayData {
    pub elements: Vec<Value>,
    pub readonly: bool,
    /// The frozen `raw` side-array of a tagged-template strings array.
    pub raw: Option<Value>,
}

impl ArrayData {
    pub fn new(elements: Vec<Value>) -> Self {
        Self {
            elements,
            readonly: false,
            raw: None,
        }
    }
}

/// A symbol value. `key` is the reserved property-map key the symbol
/// addresses (`@@iterator` and friends for well-known symbols,
/// `@@sym:<id>:<description>` for guest-created ones).
pub struct SymbolData {
    pub key: String,
    pub description: String,
}

/// A guest closure: the shared function node plus its captured scope.
pub struct FunctionData {
    pub node: Rc<FunctionNode>,
    pub env: Rc<RefCell<Environment>>,
    /// The class whose body lexically contains this function, when it is
    /// a method, accessor or field initialiser. Weak: the class owns its
    /// methods, not the other way round.
    pub home_class: RefCell<Option<Weak<ClassData>>>,
    pub home_is_static: Cell<bool>,
    /// Display name for stack traces; may be inferred from the binding.
    pub name: RefCell<Option<String>>,
}

impl FunctionData {
    pub fn new(node: Rc<FunctionNode>, env: Rc<RefCell<Environment>>) -> Self {
        let name = node.name.clone();
        Self {
            node,
            env,
            home_class: RefCell::new(None),
            home_is_static: Cell::new(false),
            name: RefCell::new(name),
        }
    }

    pub fn home_class(&self) -> Option<Rc<ClassData>> {
        self.home_class.borrow().as_ref().and_then(Weak::upgrade)
    }
}

/// A promise that has already settled. Host-async calls settle at the
/// call site, so pending promises never reach guest code.
pub struct PromiseData {
    pub state: PromiseState,
}

pub enum PromiseState {
    Fulfilled(Value),
    Rejected(SandpawError),
}

/// A compiled guest regular expression.
pub struct RegexData {
    pub regex: regex::Regex,
    pub source: String,
    pub flags: String,
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Value::Undefined => Value::Undefined,
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Number(n) => Value::Number(*n),
            Value::BigInt(b) => Value::BigInt(b.clone()),
            Value::Str(s) => Value::Str(s.clone()),
            Value::Symbol(s) => Value::Symbol(s.clone()),
            Value::Array(a) => Value::Array(a.clone()),
            Value::Object(o) => Value::Object(o.clone()),
            Value::Function(f) => Value::Function(f.clone()),
            Value::HostFunction(f) => Value::HostFunction(f.clone()),
            Value::Class(c) => Value::Class(c.clone()),
            Value::Generator(g) => Value::Generator(g.clone()),
            Value::AsyncGenerator(g) => Value::AsyncGenerator(g.clone()),
            Value::Promise(p) => Value::Promise(p.clone()),
            Value::Regex(r) => Value::Regex(r.clone()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::BigInt(b) => write!(f, "BigInt({})", b),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Symbol(s) => write!(f, "Symbol({})", s.description),
            Value::Array(a) => write!(f, "[Array len={}]", a.borrow().elements.len()),
            Value::Object(o) => write!(f, "[Object props={}]", o.borrow().props.len()),
            Value::Function(func) => {
                let name = func.name.borrow();
                write!(f, "[Function {}]", name.as_deref().unwrap_or("anonymous"))
            }
            Value::HostFunction(h) => write!(f, "[HostFunction {}]", h.name),
            Value::Class(c) => {
                write!(f, "[Class {}]", c.name.as_deref().unwrap_or("anonymous"))
            }
            Value::Generator(_) => write!(f, "[Generator]"),
            Value::AsyncGenerator(_) => write!(f, "[AsyncGenerator]"),
            Value::Promise(_) => write!(f, "[Promise]"),
            Value::Regex(r) => write!(f, "[Regex /{}/{}]", r.source, r.flags),
        }
    }
}

impl Value {
    /// Returns a stable type name string (useful for errors).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "Undefined",
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::BigInt(_) => "BigInt",
            Value::Str(_) => "String",
            Value::Symbol(_) => "Symbol",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Function(_) => "Function",
            Value::HostFunction(_) => "Function",
            Value::Class(_) => "Class",
            Value::Generator(_) => "Generator",
            Value::AsyncGenerator(_) => "AsyncGenerator",
            Value::Promise(_) => "Promise",
            Value::Regex(_) => "Regex",
        }
    }

    /// The string `typeof` evaluates to for this value.
    pub fn typeof_str(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Function(_) | Value::HostFunction(_) | Value::Class(_) => "function",
            _ => "object",
        }
    }

    /// Guest truthiness (JS semantics).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::BigInt(b) => **b != BigInt::from(0),
            Value::Str(s) => !s.is_empty(),
            // reference values are always truthy
            _ => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::HostFunction(_) | Value::Class(_)
        )
    }

    /// Pointer identity for reference values; used by the method-binding
    /// cache, the instance registry and the forbidden-identity set.
    pub fn identity_ptr(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(Rc::as_ptr(a) as usize),
            Value::Object(o) => Some(Rc::as_ptr(o) as usize),
            Value::Function(f) => Some(Rc::as_ptr(f) as usize),
            Value::HostFunction(h) => Some(Rc::as_ptr(h) as usize),
            Value::Class(c) => Some(Rc::as_ptr(c) as usize),
            Value::Generator(g) => Some(Rc::as_ptr(g) as usize),
            Value::AsyncGenerator(g) => Some(Rc::as_ptr(g) as usize),
            Value::Promise(p) => Some(Rc::as_ptr(p) as usize),
            Value::Regex(r) => Some(Rc::as_ptr(r) as usize),
            _ => None,
        }
    }

    /// Strict equality (`===`): value compare for primitives, pointer
    /// identity for reference types.
    pub fn equals_strict(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::BigInt(x), Value::BigInt(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Symbol(x), Value::Symbol(y)) => Rc::ptr_eq(x, y),
            _ => match (a.identity_ptr(), b.identity_ptr()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Loose equality (`==`) — conservative:
    /// - same-variant values compare strictly
    /// - `null == undefined`
    /// - number/string and number/bool coerce numerically
    /// - everything else: false
    pub fn equals_loose(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Undefined) | (Value::Undefined, Value::Null) => true,
            (Value::Number(x), Value::Str(s)) | (Value::Str(s), Value::Number(x)) => {
                s.trim().parse::<f64>().map(|y| *x == y).unwrap_or(false)
            }
            (Value::Number(x), Value::Bool(b)) | (Value::Bool(b), Value::Number(x)) => {
                *x == if *b { 1.0 } else { 0.0 }
            }
            (Value::BigInt(x), Value::Number(y)) | (Value::Number(y), Value::BigInt(x)) => {
                y.fract() == 0.0 && **x == BigInt::from(*y as i64)
            }
            _ => Value::equals_strict(a, b),
        }
    }

    /// Human-ish string form for errors and debug output.
    pub fn stringify(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::BigInt(b) => format!("{}n", b),
            Value::Str(s) => s.clone(),
            Value::Symbol(s) => format!("Symbol({})", s.description),
            Value::Array(a) => {
                let inner = a
                    .borrow()
                    .elements
                    .iter()
                    .map(|v| v.stringify())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{}]", inner)
            }
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(_) | Value::HostFunction(_) => "[object Function]".to_string(),
            Value::Class(c) => {
                format!("[class {}]", c.name.as_deref().unwrap_or("anonymous"))
            }
            Value::Generator(_) => "[object Generator]".to_string(),
            Value::AsyncGenerator(_) => "[object AsyncGenerator]".to_string(),
            Value::Promise(_) => "[object Promise]".to_string(),
            Value::Regex(r) => format!("/{}/{}", r.source, r.flags),
        }
    }

    /// Builds the plain error bag bound by `catch` for evaluator-raised
    /// errors (guest-thrown values are preserved as-is instead).
    pub fn error_object(name: &str, message: &str) -> Value {
        let mut props = IndexMap::new();
        props.insert("name".to_string(), Value::Str(name.to_string()));
        props.insert("message".to_string(), Value::Str(message.to_string()));
        Value::Object(Rc::new(RefCell::new(ObjectData {
            props,
            readonly: false,
            host: false,
        })))
    }

    pub fn new_object() -> Value {
        Value::Object(Rc::new(RefCell::new(ObjectData::new())))
    }

    pub fn new_array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(ArrayData::new(elements))))
    }

    pub fn fulfilled_promise(value: Value) -> Value {
        Value::Promise(Rc::new(RefCell::new(PromiseData {
            state: PromiseState::Fulfilled(value),
        })))
    }

    pub fn rejected_promise(error: SandpawError) -> Value {
        Value::Promise(Rc::new(RefCell::new(PromiseData {
            state: PromiseState::Rejected(error),
        })))
    }

    /// Converts host-side JSON into a guest value.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::new_array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let mut props = IndexMap::new();
                for (k, v) in map {
                    props.insert(k.clone(), Value::from_json(v));
                }
                Value::Object(Rc::new(RefCell::new(ObjectData {
                    props,
                    readonly: false,
                    host: false,
                })))
            }
        }
    }

    /// Converts a guest value to JSON. Callables, symbols and coroutines
    /// have no JSON form and come back as `None`.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Undefined | Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Number(n) => serde_json::Number::from_f64(*n).map(serde_json::Value::Number),
            Value::Str(s) => Some(serde_json::Value::String(s.clone())),
            Value::Array(a) => {
                let mut items = Vec::new();
                for v in &a.borrow().elements {
                    items.push(v.to_json()?);
                }
                Some(serde_json::Value::Array(items))
            }
            Value::Object(o) => {
                let mut map = serde_json::Map::new();
                for (k, v) in &o.borrow().props {
                    if k.starts_with("@@") {
                        continue;
                    }
                    map.insert(k.clone(), v.to_json()?);
                }
                Some(serde_json::Value::Object(map))
            }
            _ => None,
        }
    }
}

/// JS-style number rendering: integral doubles print without a decimal
/// point, non-finite values print their names.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_equality_uses_identity_for_reference_values() {
        let a = Value::new_array(vec![Value::Number(1.0)]);
        let b = a.clone();
        let c = Value::new_array(vec![Value::Number(1.0)]);

        assert!(Value::equals_strict(&a, &b));
        assert!(!Value::equals_strict(&a, &c));
    }

    #[test]
    fn loose_equality_coerces_conservatively() {
        assert!(Value::equals_loose(&Value::Null, &Value::Undefined));
        assert!(Value::equals_loose(
            &Value::Number(3.0),
            &Value::Str("3".to_string())
        ));
        assert!(!Value::equals_loose(
            &Value::Str("cat".to_string()),
            &Value::Number(0.0)
        ));
    }

    #[test]
    fn typeof_strings() {
        assert_eq!(Value::Undefined.typeof_str(), "undefined");
        assert_eq!(Value::Null.typeof_str(), "object");
        assert_eq!(Value::Number(1.0).typeof_str(), "number");
    }

    #[test]
    fn number_formatting_is_js_like() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }
}
