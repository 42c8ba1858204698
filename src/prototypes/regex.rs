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

/*!
 * Guest regular expressions, backed by the `regex` crate. The supported
 * flags are `i` (case-insensitive), `m` (multi-line) and `s` (dot
 * matches newline); they translate to inline flag groups.
 */

use std::rc::Rc;

use crate::error::SandpawError;
use crate::host::HostFunction;
use crate::value::{RegexData, Value};

/// Compiles a guest regex literal into a value.
pub fn compile(pattern: &str, flags: &str) -> Result<Value, SandpawError> {
    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' => inline.push('i'),
            'm' => inline.push('m'),
            's' => inline.push('s'),
            'g' | 'u' | 'y' => {} // matched per call; no inline equivalent
            other => {
                return Err(SandpawError::type_mismatch(format!(
                    "unsupported regex flag '{}'",
                    other
                )))
            }
        }
    }

    let full = if inline.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", inline, pattern)
    };

    let regex = regex::Regex::new(&full)
        .map_err(|err| SandpawError::type_mismatch(format!("invalid regex: {}", err)))?;

    Ok(Value::Regex(Rc::new(RegexData {
        regex,
        source: pattern.to_string(),
        flags: flags.to_string(),
    })))
}

/// Serves a member read on a regex receiver.
pub fn method(data: &Rc<RegexData>, name: &str) -> Result<Value, SandpawError> {
    match name {
        "source" => Ok(Value::Str(data.source.clone())),
        "flags" => Ok(Value::Str(data.flags.clone())),
        "test" => {
            let data = data.clone();
            Ok(HostFunction::sync("test", move |args| {
                let Some(Value::Str(subject)) = args.first() else {
                    return Err(SandpawError::type_mismatch("test() expects a string"));
                };
                Ok(Value::Bool(data.regex.is_match(subject)))
            }))
        }
        "exec" => {
            let data = data.clone();
            Ok(HostFunction::sync("exec", move |args| {
                let Some(Value::Str(subject)) = args.first() else {
                    return Err(SandpawError::type_mismatch("exec() expects a string"));
                };
                match data.regex.captures(subject) {
                    Some(captures) => {
                        let groups = captures
                            .iter()
                            .map(|group| match group {
                                Some(m) => Value::Str(m.as_str().to_string()),
                                None => Value::Undefined,
                            })
                            .collect();
                        Ok(Value::new_array(groups))
                    }
                    None => Ok(Value::Null),
                }
            }))
        }
        _ => Ok(Value::Undefined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_flag_translates() {
        let value = compile("cat", "i").unwrap();
        let Value::Regex(data) = value else {
            panic!("expected a regex value")
        };
        assert!(data.regex.is_match("CAT"));
        assert_eq!(data.source, "cat");
        assert_eq!(data.flags, "i");
    }

    #[test]
    fn unknown_flags_are_rejected(){
        assert!(compile("x", "q").is_err());
    }
}
