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

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::{ArrayData, ObjectData, Value};

/// Wraps a host value before it becomes visible to guest code.
///
/// Primitives pass through untouched. Objects and arrays are rebuilt as
/// read-only host containers, member by member, so a guest write can
/// never reach host-owned storage. Callables stay as they are; the
/// member-access gate already blocks their meta surface.
pub fn wrap_host_value(value: Value) -> Value {
    match value {
        Value::Object(data) => {
            let source = data.borrow();
            if source.host {
                drop(source);
                return Value::Object(data);
            }
            let mut props = IndexMap::new();
            for (key, member) in &source.props {
                props.insert(key.clone(), wrap_host_value(member.clone()));
            }
            Value::Object(Rc::new(RefCell::new(ObjectData::host_readonly(props))))
        }
        Value::Array(data) => {
            let source = data.borrow();
            if source.readonly {
                drop(source);
                return Value::Array(data);
            }
            let elements = source
                .elements
                .iter()
                .map(|v| wrap_host_value(v.clone()))
                .collect();
            Value::Array(Rc::new(RefCell::new(ArrayData {
                elements,
                readonly: true,
                raw: None,
            })))
        }
        other => other,
    }
}

/// Scrubs filesystem-path-looking fragments out of a host error message
/// before it crosses into guest-visible form. Applied when the
/// sanitise-stack-traces switch is on.
pub fn sanitize_host_message(message: &str) -> String {
    message
        .split_whitespace()
        .map(|word| {
            let looks_like_path = word.contains('/') || word.contains('\\');
            if looks_like_path && word.len() > 1 {
                "<path>"
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_objects_become_readonly_hosts() {
        let obj = Value::new_object();
        if let Value::Object(data) = &obj {
            data.borrow_mut()
                .props
                .insert("x".to_string(), Value::Number(1.0));
        }

        let wrapped = wrap_host_value(obj);
        match wrapped {
            Value::Object(data) => {
                let data = data.borrow();
                assert!(data.readonly);
                assert!(data.host);
                assert!(data.props.contains_key("x"));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn nested_arrays_are_wrapped_too() {
        let inner = Value::new_array(vec![Value::Number(2.0)]);
        let outer = Value::new_array(vec![inner]);

        match wrap_host_value(outer) {
            Value::Array(data) => {
                let data = data.borrow();
                assert!(data.readonly);
                match &data.elements[0] {
                    Value::Array(inner) => assert!(inner.borrow().readonly),
                    other => panic!("expected array, got {:?}", other),
                }
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn path_fragments_are_scrubbed() {
        let msg = sanitize_host_message("ENOENT: open /etc/passwd failed");
        assert!(!msg.contains("/etc/passwd"));
        assert!(msg.contains("<path>"));
    }
}
