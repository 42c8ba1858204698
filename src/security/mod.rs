/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Security Surface
 * ----------------
 * Everything that stands between host objects and guest code lives under
 * this module, so the whole boundary can be audited and tested as one
 * surface:
 *
 *  - dangerous.rs → static tables of forbidden names, symbols and globals
 *  - proxy.rs     → read-only wrapping of host values, error sanitising
 *
 * --------------------------------------------------------------------------
 * Author:   Sam Wilcox
 * Email:    sam@pawx-lang.com
 * Website:  https://www.pawx-lang.com
 * Github:   https://github.com/samwilcox/sandpaw
 *
 * License:
 * This file is part of the SANDPAW sandboxed interpreter project.
 *
 * SANDPAW is dual-licensed under the terms of:
 *   - The MIT License
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

pub mod dangerous;
pub mod proxy;

pub use dangerous::{
    is_dangerous_property, is_dangerous_symbol_key, is_forbidden_global, is_forced_name,
};
pub use proxy::{sanitize_host_message, wrap_host_value};
