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
 * String method surface. Strings are value types, so methods close over
 * a copy of the receiver's content.
 */

use crate::error::SandpawError;
use crate::host::HostFunction;
use crate::interpreter::helpers;
use crate::value::Value;

/// Serves a method read on a string receiver.
pub fn method(receiver: &str, name: &str) -> Result<Value, SandpawError> {
    let s = receiver.to_string();
    let value = match name {
        "slice" => HostFunction::sync("slice", move |args| {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(&args, chars.len());
            Ok(Value::Str(chars[start..end].iter().collect()))
        }),
        "substring" => HostFunction::sync("substring", move |args| {
            let chars: Vec<char> = s.chars().collect();
            let mut start = clamp_index(arg_number(&args, 0).unwrap_or(0.0).max(0.0), chars.len());
            let mut end =
                clamp_index(arg_number(&args, 1).unwrap_or(chars.len() as f64).max(0.0), chars.len());
            if start > end {
                std::mem::swap(&mut start, &mut end);
            }
            Ok(Value::Str(chars[start..end].iter().collect()))
        }),
        "toUpperCase" => {
            HostFunction::sync("toUpperCase", move |_| Ok(Value::Str(s.to_uppercase())))
        }
        "toLowerCase" => {
            HostFunction::sync("toLowerCase", move |_| Ok(Value::Str(s.to_lowercase())))
        }
        "trim" => HostFunction::sync("trim", move |_| Ok(Value::Str(s.trim().to_string()))),
        "trimStart" => {
            HostFunction::sync("trimStart", move |_| Ok(Value::Str(s.trim_start().to_string())))
        }
        "trimEnd" => {
            HostFunction::sync("trimEnd", move |_| Ok(Value::Str(s.trim_end().to_string())))
        }
        "split" => HostFunction::sync("split", move |args| {
            let parts: Vec<Value> = match args.first() {
                Some(Value::Str(sep)) if sep.is_empty() => {
                    s.chars().map(|c| Value::Str(c.to_string())).collect()
                }
                Some(Value::Str(sep)) => {
                    s.split(sep.as_str()).map(|p| Value::Str(p.to_string())).collect()
                }
                _ => vec![Value::Str(s.clone())],
            };
            Ok(Value::new_array(parts))
        }),
        "includes" => HostFunction::sync("includes", move |args| {
            Ok(Value::Bool(matches_str(&args).map(|n| s.contains(&n)).unwrap_or(false)))
        }),
        "startsWith" => HostFunction::sync("startsWith", move |args| {
            Ok(Value::Bool(matches_str(&args).map(|n| s.starts_with(&n)).unwrap_or(false)))
        }),
        "endsWith" => HostFunction::sync("endsWith", move |args| {
            Ok(Value::Bool(matches_str(&args).map(|n| s.ends_with(&n)).unwrap_or(false)))
        }),
        "indexOf" => HostFunction::sync("indexOf", move |args| {
            let found = matches_str(&args)
                .and_then(|needle| s.find(&needle))
                .map(|byte| s[..byte].chars().count() as f64)
                .unwrap_or(-1.0);
            Ok(Value::Number(found))
        }),
        "lastIndexOf" => HostFunction::sync("lastIndexOf", move |args| {
            let found = matches_str(&args)
                .and_then(|needle| s.rfind(&needle))
                .map(|byte| s[..byte].chars().count() as f64)
                .unwrap_or(-1.0);
            Ok(Value::Number(found))
        }),
        "repeat" => HostFunction::sync("repeat", move |args| {
            let count = arg_number(&args, 0).unwrap_or(0.0);
            if count < 0.0 {
                return Err(SandpawError::type_mismatch("repeat() count must be non-negative"));
            }
            Ok(Value::Str(s.repeat(count as usize)))
        }),
        "replace" => HostFunction::sync("replace", move |args| {
            let (Some(Value::Str(from)), Some(Value::Str(to))) = (args.first(), args.get(1))
            else {
                return Err(SandpawError::type_mismatch("replace() expects two strings"));
            };
            Ok(Value::Str(s.replacen(from.as_str(), to, 1)))
        }),
        "replaceAll" => HostFunction::sync("replaceAll", move |args| {
            let (Some(Value::Str(from)), Some(Value::Str(to))) = (args.first(), args.get(1))
            else {
                return Err(SandpawError::type_mismatch("replaceAll() expects two strings"));
            };
            Ok(Value::Str(s.replace(from.as_str(), to)))
        }),
        "padStart" => HostFunction::sync("padStart", move |args| {
            Ok(Value::Str(pad(&s, &args, true)))
        }),
        "padEnd" => HostFunction::sync("padEnd", move |args| {
            Ok(Value::Str(pad(&s, &args, false)))
        }),
        "charAt" => HostFunction::sync("charAt", move |args| {
            let index = arg_number(&args, 0).unwrap_or(0.0);
            let ch = if index >= 0.0 {
                s.chars().nth(index as usize)
            } else {
                None
            };
            Ok(Value::Str(ch.map(|c| c.to_string()).unwrap_or_default()))
        }),
        "charCodeAt" => HostFunction::sync("charCodeAt", move |args| {
            let index = arg_number(&args, 0).unwrap_or(0.0);
            let code = if index >= 0.0 {
                s.chars().nth(index as usize).map(|c| c as u32 as f64)
            } else {
                None
            };
            Ok(code.map(Value::Number).unwrap_or(Value::Number(f64::NAN)))
        }),
        "at" => HostFunction::sync("at", move |args| {
            let chars: Vec<char> = s.chars().collect();
            let raw = arg_number(&args, 0).unwrap_or(0.0);
            let index = if raw < 0.0 {
                chars.len() as i64 + raw as i64
            } else {
                raw as i64
            };
            if index < 0 || index as usize >= chars.len() {
                return Ok(Value::Undefined);
            }
            Ok(Value::Str(chars[index as usize].to_string()))
        }),
        "concat" => HostFunction::sync("concat", move |args| {
            let mut out = s.clone();
            for arg in &args {
                out.push_str(&helpers::to_template_string(arg));
            }
            Ok(Value::Str(out))
        }),
        "toString" => HostFunction::sync("toString", move |_| Ok(Value::Str(s.clone()))),
        _ => return Ok(Value::Undefined),
    };
    Ok(value)
}

fn matches_str(args: &[Value]) -> Option<String> {
    match args.first() {
        Some(Value::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

fn arg_number(args: &[Value], index: usize) -> Option<f64> {
    match args.get(index) {
        Some(Value::Number(n)) => Some(*n),
        _ => None,
    }
}

fn clamp_index(raw: f64, len: usize) -> usize {
    if raw < 0.0 {
        len.saturating_sub((-raw) as usize)
    } else {
        (raw as usize).min(len)
    }
}

fn slice_bounds(args: &[Value], len: usize) -> (usize, usize) {
    let start = clamp_index(arg_number(args, 0).unwrap_or(0.0), len);
    let end = clamp_index(arg_number(args, 1).unwrap_or(len as f64), len);
    (start, end.max(start))
}

fn pad(s: &str, args: &[Value], at_start: bool) -> String {
    let target = arg_number(args, 0).unwrap_or(0.0).max(0.0) as usize;
    let filler = match args.get(1) {
        Some(Value::Str(f)) if !f.is_empty() => f.clone(),
        _ => " ".to_string(),
    };
    let current = s.chars().count();
    if current >= target {
        return s.to_string();
    }
    let mut padding = String::new();
    while padding.chars().count() < target - current {
        padding.push_str(&filler);
    }
    let padding: String = padding.chars().take(target - current).collect();
    if at_start {
        format!("{}{}", padding, s)
    } else {
        format!("{}{}", s, padding)
    }
}
