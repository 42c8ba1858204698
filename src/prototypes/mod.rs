/*
 * ==========================================================================
 * SANDPAW - Safe Claws for Untrusted Code!
 * ==========================================================================
 *
 * Built-in Method Surfaces
 * ------------------------
 * The method tables served by the member-access gate for built-in
 * receivers, plus the always-installed globals:
 *
 *  - array.rs   → array methods (bound per receiver, cached)
 *  - string.rs  → string methods
 *  - regex.rs   → guest regular expressions
 *  - globals.rs → undefined/NaN/Infinity, Symbol, Promise, globalThis
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

pub mod array;
pub mod globals;
pub mod regex;
pub mod string;
