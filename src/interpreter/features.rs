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
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SandpawError};

/// The fixed set of gateable language features (ES5 through the
/// ES2022-level surface, plus the async/generator tags and bigint
/// literals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureTag {
    Variables,
    Functions,
    ArrowFunctions,
    Classes,
    ClassFields,
    PrivateMembers,
    StaticBlocks,
    GettersSetters,
    Generators,
    AsyncAwait,
    AsyncGenerators,
    Loops,
    DoWhile,
    ForOf,
    ForAwaitOf,
    ForIn,
    Switch,
    TryCatch,
    Throw,
    Labels,
    Destructuring,
    Spread,
    TemplateLiterals,
    TaggedTemplates,
    OptionalChaining,
    NullishCoalescing,
    LogicalAssignment,
    Exponentiation,
    BigIntLiterals,
    RegexLiterals,
    Conditional,
    SequenceExpressions,
    UpdateExpressions,
    New,
    TypeOf,
}

impl fmt::Display for FeatureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            FeatureTag::Variables => "variables",
            FeatureTag::Functions => "functions",
            FeatureTag::ArrowFunctions => "arrow-functions",
            FeatureTag::Classes => "classes",
            FeatureTag::ClassFields => "class-fields",
            FeatureTag::PrivateMembers => "private-members",
            FeatureTag::StaticBlocks => "static-blocks",
            FeatureTag::GettersSetters => "getters-setters",
            FeatureTag::Generators => "generators",
            FeatureTag::AsyncAwait => "async-await",
            FeatureTag::AsyncGenerators => "async-generators",
            FeatureTag::Loops => "loops",
            FeatureTag::DoWhile => "do-while",
            FeatureTag::ForOf => "for-of",
            FeatureTag::ForAwaitOf => "for-await-of",
            FeatureTag::ForIn => "for-in",
            FeatureTag::Switch => "switch",
            FeatureTag::TryCatch => "try-catch",
            FeatureTag::Throw => "throw",
            FeatureTag::Labels => "labels",
            FeatureTag::Destructuring => "destructuring",
            FeatureTag::Spread => "spread",
            FeatureTag::TemplateLiterals => "template-literals",
            FeatureTag::TaggedTemplates => "tagged-templates",
            FeatureTag::OptionalChaining => "optional-chaining",
            FeatureTag::NullishCoalescing => "nullish-coalescing",
            FeatureTag::LogicalAssignment => "logical-assignment",
            FeatureTag::Exponentiation => "exponentiation",
            FeatureTag::BigIntLiterals => "bigint-literals",
            FeatureTag::RegexLiterals => "regex-literals",
            FeatureTag::Conditional => "conditional",
            FeatureTag::SequenceExpressions => "sequence-expressions",
            FeatureTag::UpdateExpressions => "update-expressions",
            FeatureTag::New => "new",
            FeatureTag::TypeOf => "typeof",
        };
        f.write_str(tag)
    }
}

/// Per-call feature gate: everything, a whitelist, or a blacklist.
#[derive(Debug, Clone, Default)]
pub enum FeatureControl {
    #[default]
    AllowAll,
    Whitelist(HashSet<FeatureTag>),
    Blacklist(HashSet<FeatureTag>),
}

impl FeatureControl {
    pub fn check(&self, tag: FeatureTag) -> Result<(), SandpawError> {
        let enabled = match self {
            FeatureControl::AllowAll => true,
            FeatureControl::Whitelist(tags) => tags.contains(&tag),
            FeatureControl::Blacklist(tags) => !tags.contains(&tag),
        };
        if enabled {
            Ok(())
        } else {
            Err(SandpawError::new(
                ErrorKind::FeatureNotEnabled(tag),
                format!("the '{}' feature is not enabled", tag),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_blocks_everything_else() {
        let control = FeatureControl::Whitelist([FeatureTag::Loops].into_iter().collect());
        assert!(control.check(FeatureTag::Loops).is_ok());
        assert!(control.check(FeatureTag::Classes).is_err());
    }

    #[test]
    fn blacklist_blocks_only_listed() {
        let control = FeatureControl::Blacklist([FeatureTag::Generators].into_iter().collect());
        assert!(control.check(FeatureTag::Loops).is_ok());
        assert!(control.check(FeatureTag::Generators).is_err());
    }
}
