// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Maps original bundle identifiers to team-prefixed ones and enforces
//! the Tree Consistency Invariant (spec §4.3).

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::flags::SignFlags;

/// Replace any character outside `[A-Za-z0-9-.]` with `-`.
pub fn sanitize_identifier(original: &str) -> String {
    original
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Deterministic default prefix: a short hash of the root identifier and
/// team id, used when the caller doesn't supply `--prefix` (spec §6).
pub fn default_prefix(root_original_id: &str, team_id: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    use std::hash::{Hash, Hasher};
    root_original_id.hash(&mut hasher);
    team_id.hash(&mut hasher);
    format!("id{:016x}", hasher.finish())
}

/// Maps every original identifier in a bundle tree to its new identifier,
/// honouring `force_original_id` and the tree consistency invariant.
pub struct IdentifierAllocator<'a> {
    prefix: &'a str,
    flags: &'a SignFlags,
    allocated: HashMap<String, String>,
}

impl<'a> IdentifierAllocator<'a> {
    pub fn new(prefix: &'a str, flags: &'a SignFlags) -> Self {
        Self {
            prefix,
            flags,
            allocated: HashMap::new(),
        }
    }

    /// Allocate (or return the cached allocation for) `original_id`,
    /// optionally under `parent_original_id` whose new identifier must
    /// already be allocated.
    pub fn allocate(
        &mut self,
        original_id: &str,
        parent_original_id: Option<&str>,
    ) -> Result<String> {
        if let Some(existing) = self.allocated.get(original_id) {
            return Ok(existing.clone());
        }

        let new_id = if self.flags.force_original_id {
            original_id.to_string()
        } else {
            format!("{}.{}", self.prefix, sanitize_identifier(original_id))
        };

        if let Some(parent_original) = parent_original_id {
            let parent_is_prefix = original_id
                .strip_prefix(parent_original)
                .map(|suffix| suffix.starts_with('.'))
                .unwrap_or(false);
            if parent_is_prefix {
                let parent_new = self.allocated.get(parent_original).ok_or_else(|| {
                    Error::NestedIdentifierMismatch {
                        parent: parent_original.to_string(),
                        child: original_id.to_string(),
                    }
                })?;
                let child_is_prefix = new_id
                    .strip_prefix(parent_new.as_str())
                    .map(|suffix| suffix.starts_with('.'))
                    .unwrap_or(false);
                if !child_is_prefix {
                    return Err(Error::NestedIdentifierMismatch {
                        parent: parent_new.clone(),
                        child: new_id,
                    });
                }
            }
        }

        self.allocated.insert(original_id.to_string(), new_id.clone());
        Ok(new_id)
    }
}

/// Reuse-or-update policy for an identifier that already exists on the
/// team (spec §4.3 "Conflict resolution").
pub fn resolve_conflict(
    existing_capabilities: &std::collections::HashSet<String>,
    required_capabilities: &std::collections::HashSet<String>,
) -> ConflictResolution {
    if required_capabilities.is_subset(existing_capabilities) {
        ConflictResolution::Reuse
    } else {
        ConflictResolution::Update
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    Reuse,
    Update,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_disallowed_characters() {
        assert_eq!(sanitize_identifier("com.example!hello world"), "com.example-hello-world");
    }

    #[test]
    fn allocates_stable_prefixed_identifiers() {
        let flags = SignFlags::default();
        let mut allocator = IdentifierAllocator::new("abc123", &flags);
        let root = allocator.allocate("com.example.hello", None).unwrap();
        assert_eq!(root, "abc123.com.example.hello");
        let again = allocator.allocate("com.example.hello", None).unwrap();
        assert_eq!(root, again);
    }

    #[test]
    fn preserves_parent_child_prefix_relation() {
        let flags = SignFlags::default();
        let mut allocator = IdentifierAllocator::new("abc123", &flags);
        let parent = allocator.allocate("com.example.hello", None).unwrap();
        let child = allocator
            .allocate("com.example.hello.share", Some("com.example.hello"))
            .unwrap();
        assert!(child.starts_with(&format!("{parent}.")));
    }

    #[test]
    fn force_original_id_is_identity() {
        let mut flags = SignFlags::default();
        flags.force_original_id = true;
        let mut allocator = IdentifierAllocator::new("abc123", &flags);
        let id = allocator.allocate("com.example.hello", None).unwrap();
        assert_eq!(id, "com.example.hello");
    }

    #[test]
    fn reuses_identifier_when_capabilities_are_a_superset() {
        let existing: std::collections::HashSet<String> =
            ["push".to_string(), "icloud".to_string()].into_iter().collect();
        let required: std::collections::HashSet<String> = ["push".to_string()].into_iter().collect();
        assert_eq!(resolve_conflict(&existing, &required), ConflictResolution::Reuse);
    }
}
