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

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Property names that guest code may never read or write on any value.
/// These are the prototype-pollution and host-escape vectors.
static DANGEROUS_PROPERTY_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "__proto__",
        "constructor",
        "prototype",
        "__defineGetter__",
        "__defineSetter__",
        "__lookupGetter__",
        "__lookupSetter__",
        "caller",
        "callee",
        "arguments",
        "bind",
        "call",
        "apply",
    ]
    .into_iter()
    .collect()
});

/// The subset that stays blocked even on prototypeless guest bags,
/// where the rest of the validation is skipped.
static FORCED_NAMES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["__proto__", "constructor", "prototype"].into_iter().collect());

/// Forbidden well-known symbol keys (stored under their reserved `@@`
/// property-map keys). Iterator symbols are deliberately absent: the
/// iteration protocol needs them.
static DANGEROUS_SYMBOL_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "@@toPrimitive",
        "@@hasInstance",
        "@@species",
        "@@unscopables",
        "@@isConcatSpreadable",
    ]
    .into_iter()
    .collect()
});

/// Global names that may never be injected or resolved, because the
/// values behind them would let guest code synthesise new code or reach
/// host reflection.
static FORBIDDEN_GLOBAL_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Function",
        "AsyncFunction",
        "GeneratorFunction",
        "AsyncGeneratorFunction",
        "eval",
        "Proxy",
        "Reflect",
        "WebAssembly",
        "importScripts",
        "require",
        "process",
        "module",
        "globalThisHost",
    ]
    .into_iter()
    .collect()
});

pub fn is_dangerous_property(name: &str) -> bool {
    DANGEROUS_PROPERTY_NAMES.contains(name)
}

pub fn is_forced_name(name: &str) -> bool {
    FORCED_NAMES.contains(name)
}

pub fn is_dangerous_symbol_key(key: &str) -> bool {
    DANGEROUS_SYMBOL_KEYS.contains(key)
}

pub fn is_forbidden_global(name: &str) -> bool {
    FORBIDDEN_GLOBAL_NAMES.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pollution_vectors_are_listed() {
        assert!(is_dangerous_property("__proto__"));
        assert!(is_dangerous_property("constructor"));
        assert!(is_dangerous_property("prototype"));
        assert!(!is_dangerous_property("length"));
    }

    #[test]
    fn forced_names_are_a_subset() {
        assert!(is_forced_name("__proto__"));
        assert!(!is_forced_name("apply"));
        assert!(is_dangerous_property("apply"));
    }

    #[test]
    fn iterator_symbols_stay_usable() {
        assert!(is_dangerous_symbol_key("@@toPrimitive"));
        assert!(!is_dangerous_symbol_key("@@iterator"));
        assert!(!is_dangerous_symbol_key("@@asyncIterator"));
    }

    #[test]
    fn code_synthesis_globals_are_forbidden() {
        assert!(is_forbidden_global("Function"));
        assert!(is_forbidden_global("eval"));
        assert!(!is_forbidden_global("console"));
    }
}
