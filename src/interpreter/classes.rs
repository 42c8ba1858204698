/*
 * =============================================================================
 *  SANDPAW - Safe Claws for Untrusted Code!
 * =============================================================================
 *
 *  File:     classes.rs
 *  Purpose:  Runtime class system for the Sandpaw evaluator. Implements
 *            class definition, instance construction with the derived
 *            `this` / `super` protocol, field initialisation, getter and
 *            setter dispatch, private member storage, and static blocks.
 *
 *  Author:   Sam Wilcox
 *  Email:    sam@pawx-lang.com
 *  Website:  https://www.pawx-lang.com
 *  GitHub:   https://github.com/samwilcox/sandpaw
 *
 * -----------------------------------------------------------------------------
 *  License:
 * -----------------------------------------------------------------------------
 *  This file is part of the SANDPAW sandboxed interpreter project.
 *
 *  SANDPAW is dual-licensed under the terms of:
 *    - The MIT License
 *    - The Apache License, Version 2.0
 *
 *  You may choose either license to govern your use of this software.
 *
 *  Full license text available at:
 *      https://license.pawx-lang.com
 *
 * -----------------------------------------------------------------------------
 *  Warranty Disclaimer:
 * -----------------------------------------------------------------------------
 *  Unless required by applicable law or agreed to in writing, this software is
 *  distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 *  either express or implied.
 *
 * =============================================================================
 */

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::ast::{ClassMember, ClassNode, Expr, MemberName, MethodKind};
use crate::error::{ErrorKind, SandpawError};
use crate::interpreter::calls;
use crate::interpreter::engine::{EngineState, Frame};
use crate::interpreter::environment::{Environment, ThisState};
use crate::interpreter::expressions::eval_expr;
use crate::interpreter::features::FeatureTag;
use crate::interpreter::helpers::{self, OBJECT_BASE_BYTES};
use crate::interpreter::statements::{exec_block, ExecSignal};
use crate::value::{FunctionData, ObjectData, Value};

/// How often dead instances are swept out of a private store, in writes.
const PRIVATE_STORE_COMPACTION: u64 = 1024;

/// An instance-field initialiser recorded at class definition time and
/// replayed for every construction.
pub struct FieldInit {
    pub key: FieldKey,
    pub value: Option<Expr>,
}

pub enum FieldKey {
    Public(String),
    Private(String),
    Computed(Expr),
}

/// The runtime representation of a guest class.
pub struct ClassData {
    pub name: Option<String>,
    pub parent: Option<Rc<ClassData>>,
    /// The environment the class body closed over.
    pub env: Rc<RefCell<Environment>>,
    pub constructor: Option<Rc<FunctionData>>,

    pub instance_methods: IndexMap<String, Rc<FunctionData>>,
    pub instance_getters: IndexMap<String, Rc<FunctionData>>,
    pub instance_setters: IndexMap<String, Rc<FunctionData>>,
    pub static_methods: IndexMap<String, Rc<FunctionData>>,
    pub static_getters: IndexMap<String, Rc<FunctionData>>,
    pub static_setters: IndexMap<String, Rc<FunctionData>>,

    pub field_inits: Vec<FieldInit>,
    pub static_props: RefCell<IndexMap<String, Value>>,

    pub private_instance_methods: IndexMap<String, Rc<FunctionData>>,
    pub private_static_methods: IndexMap<String, Rc<FunctionData>>,
    pub private_static_fields: RefCell<IndexMap<String, Value>>,
    /// Every private name the class body declares; the ownership
    /// predicate for private access.
    pub private_names: HashSet<String>,

    /// Per-instance private-field storage, weakly keyed by instance
    /// identity and swept on a cadence.
    private_store: RefCell<HashMap<usize, PrivateEntry>>,
    store_writes: Cell<u64>,
}

struct PrivateEntry {
    instance: Weak<RefCell<ObjectData>>,
    fields: HashMap<String, Value>,
}

/* ============================================================================
 * Class Definition
 * ============================================================================
 */

/// Builds a runtime class value from a parsed class body, evaluating
/// computed member keys, static fields and static blocks in source
/// order.
pub fn eval_class(
    engine: &Rc<EngineState>,
    env: &Rc<RefCell<Environment>>,
    node: &Rc<ClassNode>,
) -> Result<Value, SandpawError> {
    let parent = match &node.parent {
        Some(expr) => match eval_expr(expr, env, engine)? {
            Value::Class(parent) => Some(parent),
            other => {
                return Err(SandpawError::type_mismatch(format!(
                    "cannot extend {}",
                    other.type_name()
                )))
            }
        },
        None => None,
    };

    let class_env = Environment::child(env);

    let mut constructor: Option<Rc<FunctionData>> = None;
    let mut instance_methods = IndexMap::new();
    let mut instance_getters = IndexMap::new();
    let mut instance_setters = IndexMap::new();
    let mut static_methods = IndexMap::new();
    let mut static_getters = IndexMap::new();
    let mut static_setters = IndexMap::new();
    let mut private_instance_methods = IndexMap::new();
    let mut private_static_methods = IndexMap::new();
    let mut private_names = HashSet::new();
    let mut field_inits = Vec::new();

    // Static fields and blocks run after the class value exists, in the
    // order they appear.
    enum StaticInit<'a> {
        Field { key: StaticKey, value: Option<&'a Expr> },
        Block(&'a [crate::ast::Stmt]),
    }
    enum StaticKey {
        Public(String),
        Private(String),
    }
    let mut static_inits = Vec::new();

    for member in &node.members {
        match member {
            ClassMember::Method {
                key,
                kind,
                func,
                is_static,
            } => {
                if matches!(kind, MethodKind::Getter | MethodKind::Setter) {
                    engine.check_feature(FeatureTag::GettersSetters)?;
                }
                let method = Rc::new(FunctionData::new(func.clone(), class_env.clone()));
                method.home_is_static.set(*is_static);

                match key {
                    MemberName::Private(name) => {
                        engine.check_feature(FeatureTag::PrivateMembers)?;
                        private_names.insert(name.clone());
                        if *is_static {
                            private_static_methods.insert(name.clone(), method);
                        } else {
                            private_instance_methods.insert(name.clone(), method);
                        }
                    }
                    _ => {
                        let name = member_key_string(engine, &class_env, key)?;
                        let table = match (kind, *is_static) {
                            (MethodKind::Constructor, _) => {
                                constructor = Some(method);
                                continue;
                            }
                            (MethodKind::Getter, false) => &mut instance_getters,
                            (MethodKind::Setter, false) => &mut instance_setters,
                            (MethodKind::Method, false) => &mut instance_methods,
                            (MethodKind::Getter, true) => &mut static_getters,
                            (MethodKind::Setter, true) => &mut static_setters,
                            (MethodKind::Method, true) => &mut static_methods,
                        };
                        table.insert(name, method);
                    }
                }
            }

            ClassMember::Field {
                key,
                value,
                is_static,
            } => {
                engine.check_feature(FeatureTag::ClassFields)?;
                if *is_static {
                    let key = match key {
                        MemberName::Private(name) => {
                            engine.check_feature(FeatureTag::PrivateMembers)?;
                            private_names.insert(name.clone());
                            StaticKey::Private(name.clone())
                        }
                        other => StaticKey::Public(member_key_string(
                            engine, &class_env, other,
                        )?),
                    };
                    static_inits.push(StaticInit::Field {
                        key,
                        value: value.as_ref(),
                    });
                } else {
                    let key = match key {
                        MemberName::Identifier(name) => FieldKey::Public(name.clone()),
                        MemberName::Private(name) => {
                            engine.check_feature(FeatureTag::PrivateMembers)?;
                            private_names.insert(name.clone());
                            FieldKey::Private(name.clone())
                        }
                        MemberName::Computed(expr) => FieldKey::Computed(expr.clone()),
                    };
                    field_inits.push(FieldInit {
                        key,
                        value: value.clone(),
                    });
                }
            }

            ClassMember::StaticBlock { body } => {
                engine.check_feature(FeatureTag::StaticBlocks)?;
                static_inits.push(StaticInit::Block(body));
            }
        }
    }

    let class = Rc::new(ClassData {
        name: node.name.clone(),
        parent,
        env: class_env.clone(),
        constructor,
        instance_methods,
        instance_getters,
        instance_setters,
        static_methods,
        static_getters,
        static_setters,
        field_inits,
        static_props: RefCell::new(IndexMap::new()),
        private_instance_methods,
        private_static_methods,
        private_static_fields: RefCell::new(IndexMap::new()),
        private_names,
        private_store: RefCell::new(HashMap::new()),
        store_writes: Cell::new(0),
    });

    // Stamp the home class onto every method so `super` and private
    // names resolve lexically.
    let stamp = |table: &IndexMap<String, Rc<FunctionData>>| {
        for method in table.values() {
            *method.home_class.borrow_mut() = Some(Rc::downgrade(&class));
        }
    };
    stamp(&class.instance_methods);
    stamp(&class.instance_getters);
    stamp(&class.instance_setters);
    stamp(&class.static_methods);
    stamp(&class.static_getters);
    stamp(&class.static_setters);
    stamp(&class.private_instance_methods);
    stamp(&class.private_static_methods);
    if let Some(ctor) = &class.constructor {
        *ctor.home_class.borrow_mut() = Some(Rc::downgrade(&class));
    }

    let class_value = Value::Class(class.clone());

    // Static fields and blocks, once, in source order, with `this`
    // bound to the class value.
    for init in static_inits {
        match init {
            StaticInit::Field { key, value } => {
                let value = match value {
                    Some(expr) => {
                        eval_in_class_frame(engine, &class, &class_value, |env| {
                            eval_expr(expr, env, engine)
                        })?
                    }
                    None => Value::Undefined,
                };
                match key {
                    StaticKey::Public(name) => {
                        class.static_props.borrow_mut().insert(name, value);
                    }
                    StaticKey::Private(name) => {
                        class.private_static_fields.borrow_mut().insert(name, value);
                    }
                }
            }
            StaticInit::Block(body) => {
                let signal = eval_in_class_frame(engine, &class, &class_value, |env| {
                    exec_block(body, env, engine)
                })?;
                if let ExecSignal::Return(_) = signal {
                    return Err(SandpawError::type_mismatch(
                        "'return' is not allowed in a static block",
                    ));
                }
            }
        }
    }

    Ok(class_value)
}

/// Runs a closure in a fresh class-body frame: `this` is the class
/// value and the home class is set for `super` / private resolution.
fn eval_in_class_frame<T>(
    engine: &Rc<EngineState>,
    class: &Rc<ClassData>,
    class_value: &Value,
    run: impl FnOnce(&Rc<RefCell<Environment>>) -> Result<T, SandpawError>,
) -> Result<T, SandpawError> {
    let env = Environment::function_child(&class.env);
    env.borrow_mut().this_slot = ThisState::Ready(class_value.clone());

    engine.push_frame(Frame {
        function_name: class.name.clone(),
        line: None,
        column: None,
        home_class: Some(class.clone()),
        home_is_static: true,
        super_called: Cell::new(false),
        pending_instance: RefCell::new(None),
    })?;
    let result = run(&env);
    engine.pop_frame();
    result
}

fn member_key_string(
    engine: &Rc<EngineState>,
    env: &Rc<RefCell<Environment>>,
    key: &MemberName,
) -> Result<String, SandpawError> {
    match key {
        MemberName::Identifier(name) => Ok(name.clone()),
        MemberName::Private(name) => Ok(format!("#{}", name)),
        MemberName::Computed(expr) => {
            let value = eval_expr(expr, env, engine)?;
            Ok(helpers::to_property_key(&value))
        }
    }
}

/* ============================================================================
 * Instance Construction
 * ============================================================================
 */

/// Instantiates a guest class: allocates the instance, records its
/// identity, and drives the constructor chain.
pub fn construct_instance(
    engine: &Rc<EngineState>,
    class: &Rc<ClassData>,
    args: Vec<Value>,
) -> Result<Value, SandpawError> {
    engine.charge_memory(OBJECT_BASE_BYTES)?;
    let instance = Value::new_object();
    if let Value::Object(data) = &instance {
        engine.instances.borrow_mut().register(data, class.clone());
    }
    run_constructor(engine, class, &instance, args)
}

/// Runs the constructor protocol for one class level and returns the
/// effective instance (which a constructor may have replaced).
fn run_constructor(
    engine: &Rc<EngineState>,
    class: &Rc<ClassData>,
    instance: &Value,
    args: Vec<Value>,
) -> Result<Value, SandpawError> {
    let Some(ctor) = &class.constructor else {
        // No constructor at this level: chain implicitly, then
        // initialise this level's fields.
        let effective = match &class.parent {
            Some(parent) => run_constructor(engine, parent, instance, args)?,
            None => instance.clone(),
        };
        init_instance_fields(engine, class, &effective)?;
        return Ok(effective);
    };

    let env = Environment::function_child(&ctor.env);
    env.borrow_mut().this_slot = if class.parent.is_some() {
        ThisState::Uninitialized
    } else {
        ThisState::Ready(instance.clone())
    };
    calls::bind_params(engine, &env, ctor, args)?;

    // Base classes initialise fields before the body runs; derived
    // classes wait for super().
    if class.parent.is_none() {
        init_instance_fields(engine, class, instance)?;
    }

    engine.push_frame(Frame {
        function_name: class.name.clone().or_else(|| Some("constructor".to_string())),
        line: Some(ctor.node.span.line),
        column: Some(ctor.node.span.column),
        home_class: Some(class.clone()),
        home_is_static: false,
        super_called: Cell::new(false),
        pending_instance: RefCell::new(Some(instance.clone())),
    })?;

    let outcome = run_constructor_body(engine, ctor, &env);
    let super_called = engine.super_called();
    engine.pop_frame();

    let signal = outcome?;

    if class.parent.is_some() && !super_called {
        return Err(SandpawError::new(
            ErrorKind::SuperNotCalled,
            "derived constructor finished without calling super()",
        ));
    }

    // super() may have replaced `this`.
    let effective = match &env.borrow().this_slot {
        ThisState::Ready(value) => value.clone(),
        _ => instance.clone(),
    };

    match signal {
        // A constructor returning an object replaces the instance.
        ExecSignal::Return(value) if matches!(&value, Value::Object(_) | Value::Array(_)) => {
            Ok(value)
        }
        _ => Ok(effective),
    }
}

fn run_constructor_body(
    engine: &Rc<EngineState>,
    ctor: &Rc<FunctionData>,
    env: &Rc<RefCell<Environment>>,
) -> Result<ExecSignal, SandpawError> {
    match &ctor.node.body {
        crate::ast::FunctionBody::Block(body) => exec_block(body, env, engine),
        crate::ast::FunctionBody::Expression(_) => Err(SandpawError::type_mismatch(
            "constructors require a block body",
        )),
    }
}

/// Evaluates this class level's instance-field initialisers against an
/// instance, in declaration order.
fn init_instance_fields(
    engine: &Rc<EngineState>,
    class: &Rc<ClassData>,
    instance: &Value,
) -> Result<(), SandpawError> {
    if class.field_inits.is_empty() {
        return Ok(());
    }

    let env = Environment::function_child(&class.env);
    env.borrow_mut().this_slot = ThisState::Ready(instance.clone());

    engine.push_frame(Frame {
        function_name: class.name.clone(),
        line: None,
        column: None,
        home_class: Some(class.clone()),
        home_is_static: false,
        super_called: Cell::new(false),
        pending_instance: RefCell::new(None),
    })?;

    let result = (|| {
        for field in &class.field_inits {
            let value = match &field.value {
                Some(expr) => eval_expr(expr, &env, engine)?,
                None => Value::Undefined,
            };
            match &field.key {
                FieldKey::Public(name) => {
                    define_own_field(engine, instance, name, value)?;
                }
                FieldKey::Private(name) => {
                    write_private_field(class, instance, name, value, true)?;
                }
                FieldKey::Computed(expr) => {
                    let key_value = eval_expr(expr, &env, engine)?;
                    let key = helpers::to_property_key(&key_value);
                    define_own_field(engine, instance, &key, value)?;
                }
            }
        }
        Ok(())
    })();

    engine.pop_frame();
    result
}

/// Field definitions create own data properties directly, bypassing
/// setter dispatch, but still honouring the forced-name gate.
fn define_own_field(
    engine: &Rc<EngineState>,
    instance: &Value,
    key: &str,
    value: Value,
) -> Result<(), SandpawError> {
    helpers::check_property_key(key, true)?;
    engine.charge_memory(helpers::BYTES_PER_OBJECT_PROP)?;
    if let Value::Object(data) = instance {
        data.borrow_mut().props.insert(key.to_string(), value);
    }
    Ok(())
}

/* ============================================================================
 * Property Dispatch
 * ============================================================================
 */

/// Reads a property off a class instance: own properties first, then
/// getters and methods up the class chain.
pub fn instance_get(
    engine: &Rc<EngineState>,
    class: &Rc<ClassData>,
    instance: &Value,
    key: &str,
) -> Result<Value, SandpawError> {
    if let Value::Object(data) = instance {
        if let Some(value) = data.borrow().props.get(key) {
            return Ok(value.clone());
        }
    }

    let mut current = Some(class.clone());
    while let Some(c) = current {
        if let Some(getter) = c.instance_getters.get(key) {
            return calls::call_function_sync(engine, getter, vec![], Some(instance.clone()));
        }
        if let Some(method) = c.instance_methods.get(key) {
            // Reading a method yields the underlying function; member
            // call sites pass the receiver themselves.
            return Ok(Value::Function(method.clone()));
        }
        current = c.parent.clone();
    }

    Ok(Value::Undefined)
}

/// Writes a property on a class instance, dispatching to the nearest
/// setter up the chain before falling back to an own write.
pub fn instance_set(
    engine: &Rc<EngineState>,
    class: &Rc<ClassData>,
    instance: &Value,
    key: &str,
    value: Value,
) -> Result<Value, SandpawError> {
    let mut current = Some(class.clone());
    while let Some(c) = current {
        if let Some(setter) = c.instance_setters.get(key) {
            calls::call_function_sync(
                engine,
                setter,
                vec![value.clone()],
                Some(instance.clone()),
            )?;
            return Ok(value);
        }
        current = c.parent.clone();
    }

    if let Value::Object(data) = instance {
        engine.charge_memory(helpers::BYTES_PER_OBJECT_PROP)?;
        data.borrow_mut().props.insert(key.to_string(), value.clone());
    }
    Ok(value)
}

/// Reads a static member off a class value, walking the parent chain.
pub fn static_get(
    engine: &Rc<EngineState>,
    class: &Rc<ClassData>,
    key: &str,
) -> Result<Value, SandpawError> {
    if key == "name" {
        return Ok(class
            .name
            .as_ref()
            .map(|n| Value::Str(n.clone()))
            .unwrap_or(Value::Undefined));
    }

    let mut current = Some(class.clone());
    while let Some(c) = current {
        if let Some(getter) = c.static_getters.get(key) {
            let receiver = Value::Class(class.clone());
            return calls::call_function_sync(engine, getter, vec![], Some(receiver));
        }
        if let Some(value) = c.static_props.borrow().get(key) {
            return Ok(value.clone());
        }
        if let Some(method) = c.static_methods.get(key) {
            return Ok(Value::Function(method.clone()));
        }
        current = c.parent.clone();
    }
    Ok(Value::Undefined)
}

/// Writes a static member, dispatching to static setters first.
pub fn static_set(
    engine: &Rc<EngineState>,
    class: &Rc<ClassData>,
    key: &str,
    value: Value,
) -> Result<Value, SandpawError> {
    let mut current = Some(class.clone());
    while let Some(c) = current {
        if let Some(setter) = c.static_setters.get(key) {
            let receiver = Value::Class(class.clone());
            calls::call_function_sync(engine, setter, vec![value.clone()], Some(receiver))?;
            return Ok(value);
        }
        current = c.parent.clone();
    }
    class.static_props.borrow_mut().insert(key.to_string(), value.clone());
    Ok(value)
}

/// Whether the class chain defines an instance member with this name.
pub fn class_has_member(class: &Rc<ClassData>, key: &str) -> bool {
    let mut current = Some(class.clone());
    while let Some(c) = current {
        if c.instance_methods.contains_key(key)
            || c.instance_getters.contains_key(key)
            || c.instance_setters.contains_key(key)
        {
            return true;
        }
        current = c.parent.clone();
    }
    false
}

/// Whether the class chain defines a static member with this name.
pub fn class_has_static(class: &Rc<ClassData>, key: &str) -> bool {
    let mut current = Some(class.clone());
    while let Some(c) = current {
        if c.static_methods.contains_key(key)
            || c.static_getters.contains_key(key)
            || c.static_props.borrow().contains_key(key)
        {
            return true;
        }
        current = c.parent.clone();
    }
    false
}

/* ============================================================================
 * Private Members
 * ============================================================================
 */

/// Resolves the home class for a private access and verifies it owns
/// the name. Addressing is lexical: the class of the running method,
/// never the dynamic type of the receiver.
fn private_home(
    engine: &Rc<EngineState>,
    name: &str,
) -> Result<Rc<ClassData>, SandpawError> {
    let Some((home, _)) = engine.current_home_class() else {
        return Err(private_undefined(name));
    };
    if !home.private_names.contains(name) {
        return Err(private_undefined(name));
    }
    Ok(home)
}

fn private_undefined(name: &str) -> SandpawError {
    SandpawError::new(
        ErrorKind::PrivateFieldUndefined,
        format!("private member '#{}' is not accessible here", name),
    )
}

/// Reads `target.#name`.
pub fn private_get(
    engine: &Rc<EngineState>,
    target: &Value,
    name: &str,
) -> Result<Value, SandpawError> {
    let home = private_home(engine, name)?;

    match target {
        Value::Class(class) => {
            if !Rc::ptr_eq(class, &home) {
                return Err(private_undefined(name));
            }
            if let Some(value) = home.private_static_fields.borrow().get(name) {
                return Ok(value.clone());
            }
            if let Some(method) = home.private_static_methods.get(name) {
                return Ok(Value::Function(method.clone()));
            }
            Err(private_undefined(name))
        }
        Value::Object(data) => {
            let store = home.private_store.borrow();
            if let Some(entry) = store.get(&(Rc::as_ptr(data) as usize)) {
                if let Some(value) = entry.fields.get(name) {
                    return Ok(value.clone());
                }
            }
            drop(store);
            if let Some(method) = home.private_instance_methods.get(name) {
                return Ok(Value::Function(method.clone()));
            }
            Err(private_undefined(name))
        }
        _ => Err(private_undefined(name)),
    }
}

/// Writes `target.#name = value`.
pub fn private_set(
    engine: &Rc<EngineState>,
    target: &Value,
    name: &str,
    value: Value,
) -> Result<Value, SandpawError> {
    let home = private_home(engine, name)?;

    match target {
        Value::Class(class) => {
            if !Rc::ptr_eq(class, &home) {
                return Err(private_undefined(name));
            }
            home.private_static_fields
                .borrow_mut()
                .insert(name.to_string(), value.clone());
            Ok(value)
        }
        Value::Object(_) => {
            write_private_field(&home, target, name, value.clone(), false)?;
            Ok(value)
        }
        _ => Err(private_undefined(name)),
    }
}

/// Writes into the weak per-instance private store. `create` is set by
/// field initialisation, which may introduce the instance's entry;
/// plain assignment requires the field to exist already.
fn write_private_field(
    class: &Rc<ClassData>,
    instance: &Value,
    name: &str,
    value: Value,
    create: bool,
) -> Result<(), SandpawError> {
    let Value::Object(data) = instance else {
        return Err(private_undefined(name));
    };
    let ptr = Rc::as_ptr(data) as usize;

    let writes = class.store_writes.get() + 1;
    class.store_writes.set(writes);
    if writes % PRIVATE_STORE_COMPACTION == 0 {
        class
            .private_store
            .borrow_mut()
            .retain(|_, entry| entry.instance.strong_count() > 0);
    }

    let mut store = class.private_store.borrow_mut();
    match store.get_mut(&ptr) {
        Some(entry) => {
            if !create && !entry.fields.contains_key(name) {
                return Err(private_undefined(name));
            }
            entry.fields.insert(name.to_string(), value);
            Ok(())
        }
        None if create => {
            let mut fields = HashMap::new();
            fields.insert(name.to_string(), value);
            store.insert(
                ptr,
                PrivateEntry {
                    instance: Rc::downgrade(data),
                    fields,
                },
            );
            Ok(())
        }
        None => Err(private_undefined(name)),
    }
}

/* ============================================================================
 * Super Dispatch
 * ============================================================================
 */

/// `super(args)` in a derived constructor: runs the parent constructor
/// against the instance under construction, then this level's fields,
/// and rebinds `this` (the parent may have returned a replacement).
pub fn super_call(
    engine: &Rc<EngineState>,
    env: &Rc<RefCell<Environment>>,
    args: Vec<Value>,
) -> Result<Value, SandpawError> {
    let Some((home, _)) = engine.current_home_class() else {
        return Err(SandpawError::new(
            ErrorKind::SuperNotCalled,
            "super() outside a derived constructor",
        ));
    };
    let Some(parent) = home.parent.clone() else {
        return Err(SandpawError::new(
            ErrorKind::SuperNotCalled,
            "super() requires a parent class",
        ));
    };

    let instance = engine
        .frames
        .borrow()
        .last()
        .and_then(|frame| frame.pending_instance.borrow().clone());
    let Some(instance) = instance else {
        return Err(SandpawError::new(
            ErrorKind::SuperNotCalled,
            "super() outside a constructor frame",
        ));
    };

    engine.mark_super_called()?;

    let effective = run_constructor(engine, &parent, &instance, args)?;
    init_instance_fields(engine, &home, &effective)?;
    Environment::set_this(env, effective);

    Ok(Value::Undefined)
}

/// `super.key` reads: resolution starts at the parent of the method's
/// home class, static or instance side as recorded on the frame.
pub fn super_get(
    engine: &Rc<EngineState>,
    env: &Rc<RefCell<Environment>>,
    key: &str,
) -> Result<Value, SandpawError> {
    let Some((home, is_static)) = engine.current_home_class() else {
        return Err(SandpawError::type_mismatch("'super' outside a method"));
    };
    let Some(parent) = home.parent.clone() else {
        return Ok(Value::Undefined);
    };

    if is_static {
        return static_get(engine, &parent, key);
    }

    let this = Environment::this_value(env)?;
    let mut current = Some(parent);
    while let Some(c) = current {
        if let Some(getter) = c.instance_getters.get(key) {
            return calls::call_function_sync(engine, getter, vec![], Some(this.clone()));
        }
        if let Some(method) = c.instance_methods.get(key) {
            return Ok(Value::Function(method.clone()));
        }
        current = c.parent.clone();
    }
    Ok(Value::Undefined)
}

/// `super.key = value` writes, mirroring the read-side resolution.
pub fn super_set(
    engine: &Rc<EngineState>,
    env: &Rc<RefCell<Environment>>,
    key: &str,
    value: Value,
) -> Result<Value, SandpawError> {
    let Some((home, is_static)) = engine.current_home_class() else {
        return Err(SandpawError::type_mismatch("'super' outside a method"));
    };
    let Some(parent) = home.parent.clone() else {
        return Err(SandpawError::type_mismatch("no parent class for 'super'"));
    };

    if is_static {
        return static_set(engine, &parent, key, value);
    }

    let this = Environment::this_value(env)?;
    let mut current = Some(parent);
    while let Some(c) = current {
        if let Some(setter) = c.instance_setters.get(key) {
            calls::call_function_sync(engine, setter, vec![value.clone()], Some(this.clone()))?;
            return Ok(value);
        }
        current = c.parent.clone();
    }

    // No setter anywhere up the chain: fall back to an own write on the
    // receiver.
    helpers::member_set(engine, &this, key, value)
}
