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

use std::collections::HashMap;
use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::SandpawError;
use crate::value::Value;

/// How a binding was declared, which controls redeclaration, hoisting
/// and assignment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// `let`: visible at or below the declaring environment.
    BlockScoped,
    /// `const`: block scoped and immune to normal assignment.
    Immutable,
    /// `var`: hoisted to the nearest function scope or the root.
    FunctionScoped,
}

#[derive(Clone)]
pub struct Binding {
    pub value: Value,
    pub kind: BindingKind,
    /// Set for globals injected by the host, so they can be rotated with
    /// `force_set(…, globals_only = true)` and restored after a call.
    pub injected: bool,
}

/// The `this` slot of an environment.
///
/// `Uninitialized` is the derived-constructor state: the slot exists but
/// reading it fails until `super(…)` completes.
#[derive(Clone)]
pub enum ThisState {
    Absent,
    Uninitialized,
    Ready(Value),
}

/// One node of the lexical scope chain.
pub struct Environment {
    bindings: HashMap<String, Binding>,
    parent: Option<Rc<RefCell<Environment>>>,
    pub this_slot: ThisState,
    pub is_function_scope: bool,
}

impl Environment {
    /// Creates the root environment (a function scope for hoisting).
    pub fn new_root() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            bindings: HashMap::new(),
            parent: None,
            this_slot: ThisState::Absent,
            is_function_scope: true,
        }))
    }

    /// Creates a block-scope child.
    pub fn child(parent: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
            this_slot: ThisState::Absent,
            is_function_scope: false,
        }))
    }

    /// Creates a function-scope child (the frame env of a call).
    pub fn function_child(parent: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
            this_slot: ThisState::Absent,
            is_function_scope: true,
        }))
    }

    pub fn parent(&self) -> Option<Rc<RefCell<Environment>>> {
        self.parent.clone()
    }

    /// Declares a binding.
    ///
    /// Function-scoped declarations hoist to the nearest function scope
    /// (or the root); redeclaring the same name function-scoped updates
    /// the value, while colliding with a block/immutable binding fails.
    /// Block and immutable declarations fail on any name already bound
    /// in the current environment.
    pub fn declare(
        env: &Rc<RefCell<Environment>>,
        name: &str,
        value: Value,
        kind: BindingKind,
    ) -> Result<(), SandpawError> {
        match kind {
            BindingKind::FunctionScoped => {
                let target = Self::nearest_function_scope(env);
                let mut target_ref = target.borrow_mut();
                if let Some(existing) = target_ref.bindings.get_mut(name) {
                    match existing.kind {
                        BindingKind::FunctionScoped => {
                            existing.value = value;
                            return Ok(());
                        }
                        _ => return Err(SandpawError::duplicate_declaration(name)),
                    }
                }
                target_ref.bindings.insert(
                    name.to_string(),
                    Binding {
                        value,
                        kind,
                        injected: false,
                    },
                );
                Ok(())
            }
            BindingKind::BlockScoped | BindingKind::Immutable => {
                let mut env_ref = env.borrow_mut();
                if env_ref.bindings.contains_key(name) {
                    return Err(SandpawError::duplicate_declaration(name));
                }
                env_ref.bindings.insert(
                    name.to_string(),
                    Binding {
                        value,
                        kind,
                        injected: false,
                    },
                );
                Ok(())
            }
        }
    }

    /// Declares or replaces an injected host global in this environment.
    /// Returns the previous binding so the caller can restore it.
    pub fn inject_global(
        env: &Rc<RefCell<Environment>>,
        name: &str,
        value: Value,
    ) -> Option<Binding> {
        env.borrow_mut().bindings.insert(
            name.to_string(),
            Binding {
                value,
                kind: BindingKind::FunctionScoped,
                injected: true,
            },
        )
    }

    /// Restores (or removes) a binding previously replaced by
    /// [`Environment::inject_global`].
    pub fn restore_binding(
        env: &Rc<RefCell<Environment>>,
        name: &str,
        previous: Option<Binding>,
    ) {
        let mut env_ref = env.borrow_mut();
        match previous {
            Some(binding) => {
                env_ref.bindings.insert(name.to_string(), binding);
            }
            None => {
                env_ref.bindings.remove(name);
            }
        }
    }

    fn nearest_function_scope(env: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        let mut current = env.clone();
        loop {
            if current.borrow().is_function_scope {
                return current;
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return current,
            }
        }
    }

    /// Reads a binding, walking the chain.
    pub fn get(env: &Rc<RefCell<Environment>>, name: &str) -> Result<Value, SandpawError> {
        Self::try_get(env, name).ok_or_else(|| SandpawError::undefined_variable(name))
    }

    /// Reads a binding without failing; `typeof` uses this.
    pub fn try_get(env: &Rc<RefCell<Environment>>, name: &str) -> Option<Value> {
        let mut current = env.clone();
        loop {
            if let Some(binding) = current.borrow().bindings.get(name) {
                return Some(binding.value.clone());
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return None,
            }
        }
    }

    /// Assigns to the nearest binding; immutable bindings reject.
    pub fn set(
        env: &Rc<RefCell<Environment>>,
        name: &str,
        value: Value,
    ) -> Result<(), SandpawError> {
        let mut current = env.clone();
        loop {
            {
                let mut env_ref = current.borrow_mut();
                if let Some(binding) = env_ref.bindings.get_mut(name) {
                    if binding.kind == BindingKind::Immutable {
                        return Err(SandpawError::assign_to_const(name));
                    }
                    binding.value = value;
                    return Ok(());
                }
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return Err(SandpawError::undefined_variable(name)),
            }
        }
    }

    /// Assigns bypassing immutability. With `globals_only` only injected
    /// bindings may be touched. Returns whether a binding was written.
    pub fn force_set(
        env: &Rc<RefCell<Environment>>,
        name: &str,
        value: Value,
        globals_only: bool,
    ) -> bool {
        let mut current = env.clone();
        loop {
            {
                let mut env_ref = current.borrow_mut();
                if let Some(binding) = env_ref.bindings.get_mut(name) {
                    if globals_only && !binding.injected {
                        return false;
                    }
                    binding.value = value;
                    return true;
                }
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    /// Whether the name resolves anywhere up the chain.
    pub fn has(env: &Rc<RefCell<Environment>>, name: &str) -> bool {
        Self::try_get(env, name).is_some()
    }

    /// Removes a binding from this environment only.
    pub fn delete(&mut self, name: &str) -> bool {
        self.bindings.remove(name).is_some()
    }

    /// Resolves `this` by walking to the nearest non-absent slot.
    /// An uninitialized slot (derived constructor before `super`) fails.
    pub fn this_value(env: &Rc<RefCell<Environment>>) -> Result<Value, SandpawError> {
        let mut current = env.clone();
        loop {
            {
                let env_ref = current.borrow();
                match &env_ref.this_slot {
                    ThisState::Ready(v) => return Ok(v.clone()),
                    ThisState::Uninitialized => {
                        return Err(SandpawError::new(
                            crate::error::ErrorKind::ThisNotInitialized,
                            "'this' is not available before super() completes",
                        ));
                    }
                    ThisState::Absent => {}
                }
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => return Ok(Value::Undefined),
            }
        }
    }

    /// Writes the nearest existing `this` slot, falling back to the
    /// nearest function scope. Needed when a derived-class `super()`
    /// returns a replacement instance.
    pub fn set_this(env: &Rc<RefCell<Environment>>, value: Value) {
        let mut current = env.clone();
        loop {
            {
                let mut env_ref = current.borrow_mut();
                if !matches!(env_ref.this_slot, ThisState::Absent) {
                    env_ref.this_slot = ThisState::Ready(value);
                    return;
                }
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => break,
            }
        }
        let target = Self::nearest_function_scope(env);
        target.borrow_mut().this_slot = ThisState::Ready(value);
    }

    /// All bindings visible from this environment, innermost shadowing
    /// winning. Used by scope inspection.
    pub fn visible_bindings(env: &Rc<RefCell<Environment>>) -> IndexMap<String, Value> {
        let mut out: IndexMap<String, Value> = IndexMap::new();
        let mut current = env.clone();
        loop {
            {
                let env_ref = current.borrow();
                for (name, binding) in &env_ref.bindings {
                    if !out.contains_key(name) {
                        out.insert(name.clone(), binding.value.clone());
                    }
                }
            }
            let parent = current.borrow().parent.clone();
            match parent {
                Some(p) => current = p,
                None => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_hoists_to_function_scope() {
        let root = Environment::new_root();
        let block = Environment::child(&root);

        Environment::declare(&block, "x", Value::Number(1.0), BindingKind::FunctionScoped)
            .unwrap();
        assert!(Environment::has(&root, "x"));
    }

    #[test]
    fn let_stays_in_its_block() {
        let root = Environment::new_root();
        let block = Environment::child(&root);

        Environment::declare(&block, "x", Value::Number(1.0), BindingKind::BlockScoped).unwrap();
        assert!(Environment::try_get(&root, "x").is_none());
        assert!(Environment::try_get(&block, "x").is_some());
    }

    #[test]
    fn const_rejects_assignment_but_not_force_set() {
        let root = Environment::new_root();
        Environment::declare(&root, "k", Value::Number(1.0), BindingKind::Immutable).unwrap();

        assert!(Environment::set(&root, "k", Value::Number(2.0)).is_err());
        assert!(Environment::force_set(&root, "k", Value::Number(2.0), false));
        match Environment::get(&root, "k").unwrap() {
            Value::Number(n) => assert_eq!(n, 2.0),
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn globals_only_force_set_skips_plain_bindings() {
        let root = Environment::new_root();
        Environment::declare(&root, "a", Value::Number(1.0), BindingKind::BlockScoped).unwrap();
        assert!(!Environment::force_set(&root, "a", Value::Number(9.0), true));

        Environment::inject_global(&root, "g", Value::Number(1.0));
        assert!(Environment::force_set(&root, "g", Value::Number(9.0), true));
    }

    #[test]
    fn duplicate_block_declaration_fails() {
        let root = Environment::new_root();
        Environment::declare(&root, "x", Value::Null, BindingKind::BlockScoped).unwrap();
        assert!(
            Environment::declare(&root, "x", Value::Null, BindingKind::BlockScoped).is_err()
        );
    }

    #[test]
    fn uninitialized_this_fails_until_ready() {
        let root = Environment::new_root();
        let frame = Environment::function_child(&root);
        frame.borrow_mut().this_slot = ThisState::Uninitialized;

        assert!(Environment::this_value(&frame).is_err());
        Environment::set_this(&frame, Value::Number(5.0));
        assert!(Environment::this_value(&frame).is_ok());
    }
}
