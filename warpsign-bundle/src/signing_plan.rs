//! The `SigningPlan`: the derived, per-`AppBundle` result of reconciliation.

use std::path::PathBuf;

/// A single Mach-O identifier-string rewrite to apply before signing.
#[derive(Debug, Clone)]
pub struct MachORewrite {
    pub binary_path: PathBuf,
    pub old_identifier: String,
    pub new_identifier: String,
}

/// Derived, per-bundle signing state.
#[derive(Debug, Clone)]
pub struct SigningPlan {
    pub bundle_path: PathBuf,
    pub original_bundle_id: String,
    pub new_bundle_id: String,
    pub entitlements: plist::Dictionary,
    pub profile_key: crate::team_context::ProfileKey,
    pub rewrites: Vec<MachORewrite>,
}

/// True when `child` is a direct child (by `.`-prefix) of `parent`,
/// the relation the Tree Consistency Invariant (spec §4.3) requires to
/// hold identically for both the original and the rewritten identifier.
pub fn is_nested(child: &str, parent: &str) -> bool {
    child
        .strip_prefix(parent)
        .map(|suffix| suffix.starts_with('.'))
        .unwrap_or(false)
}

impl SigningPlan {
    pub fn is_nested_under(&self, parent: &SigningPlan) -> bool {
        is_nested(&self.original_bundle_id, &parent.original_bundle_id)
    }

    pub fn new_id_nested_under(&self, parent: &SigningPlan) -> bool {
        is_nested(&self.new_bundle_id, &parent.new_bundle_id)
    }
}
