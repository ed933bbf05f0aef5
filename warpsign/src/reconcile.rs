// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Entitlement Reconciler (spec §4.2). Pure: given declared
//! entitlements, the team's state, and caller flags, computes the
//! signable entitlement set plus the portal mutations required to make
//! it valid. Does no I/O itself — the orchestrator applies the
//! mutations through the Portal Client.

use std::collections::{HashMap, HashSet};

use plist::Value;
use warpsign_bundle::{CertificateKind, TeamContext};

use crate::allocate::sanitize_identifier;
use crate::error::Result;
use crate::flags::SignFlags;

const STRIP_UNCONDITIONAL: &[&str] = &[
    "application-identifier",
    "com.apple.developer.team-identifier",
    "keychain-access-groups",
    "get-task-allow",
];

/// The entitlement-key -> portal-capability map, loaded from
/// `capabilities.toml` rather than hard-coded (spec §9 open question).
#[derive(Debug, Clone)]
pub struct CapabilityMap(HashMap<String, String>);

#[derive(serde::Deserialize)]
struct CapabilitiesFile {
    capabilities: HashMap<String, String>,
}

impl CapabilityMap {
    pub fn load_default() -> Self {
        let raw = include_str!("../capabilities.toml");
        Self::parse(raw).expect("bundled capabilities.toml must parse")
    }

    pub fn load_from_str(raw: &str) -> Result<Self> {
        Self::parse(raw).map_err(|e| crate::error::Error::CapabilityMapInvalid(e.to_string()))
    }

    fn parse(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: CapabilitiesFile = toml::from_str(raw)?;
        Ok(Self(file.capabilities))
    }

    pub fn capability_for(&self, entitlement_key: &str) -> Option<&str> {
        self.0.get(entitlement_key).map(|s| s.as_str())
    }
}

/// A portal-side mutation the orchestrator must apply before signing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mutation {
    EnsureIdentifier { bundle_id: String, name: String },
    EnableCapability { bundle_id: String, capability: String },
    EnsureAppGroup { identifier: String, name: String },
}

#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub entitlements: plist::Dictionary,
    pub mutations: Vec<Mutation>,
    pub warnings: Vec<String>,
}

/// Reconcile one bundle's declared entitlements into a signable set.
///
/// `new_bundle_id` and `new_group_id` are supplied by the caller (backed
/// by the Identifier Allocator) rather than computed here, keeping this
/// function free of any allocator state.
pub fn reconcile(
    declared: &plist::Dictionary,
    new_bundle_id: &str,
    team: &TeamContext,
    cert_kind: CertificateKind,
    flags: &SignFlags,
    capabilities: &CapabilityMap,
    mut rewrite_group_id: impl FnMut(&str) -> String,
) -> Result<ReconcilePlan> {
    let mut plan = ReconcilePlan::default();

    plan.mutations.push(Mutation::EnsureIdentifier {
        bundle_id: new_bundle_id.to_string(),
        name: new_bundle_id.to_string(),
    });

    for (key, value) in declared.iter() {
        if STRIP_UNCONDITIONAL.contains(&key.as_str()) {
            if key == "get-task-allow" && flags.patch_debug && cert_kind == CertificateKind::Development {
                plan.entitlements.insert(key.clone(), Value::Boolean(true));
            } else {
                plan.warnings.push(format!("stripped '{key}' (unconditional)"));
            }
            continue;
        }

        if let Some(capability) = capabilities.capability_for(key) {
            let enabled = team.capability_enabled(capability);
            if !enabled {
                if flags.require_capabilities {
                    return Err(crate::error::Error::Portal(
                        warpsign_portal::Error::CapabilityUnavailable(capability.to_string()),
                    ));
                }
                plan.warnings.push(format!(
                    "stripped '{key}': capability '{capability}' not enabled for this team"
                ));
                continue;
            }
            plan.mutations.push(Mutation::EnableCapability {
                bundle_id: new_bundle_id.to_string(),
                capability: capability.to_string(),
            });
            plan.entitlements.insert(key.clone(), rewrite_identifier_values(value, new_bundle_id, &mut rewrite_group_id));
            continue;
        }

        if is_identifier_coupled_key(key) {
            let rewritten = rewrite_identifier_values(value, new_bundle_id, &mut rewrite_group_id);
            if key == "com.apple.security.application-groups" {
                if let Value::Array(groups) = &rewritten {
                    for group in groups {
                        if let Some(identifier) = group.as_string() {
                            plan.mutations.push(Mutation::EnsureAppGroup {
                                identifier: identifier.to_string(),
                                name: identifier.to_string(),
                            });
                        }
                    }
                }
            }
            plan.entitlements.insert(key.clone(), rewritten);
            continue;
        }

        if flags.passthrough_unknown_entitlements {
            plan.entitlements.insert(key.clone(), value.clone());
        } else {
            plan.warnings.push(format!("stripped '{key}': unrecognised entitlement"));
        }
    }

    apply_derived_entitlements(&mut plan.entitlements, new_bundle_id, &team.team_id, declared, cert_kind);

    Ok(plan)
}

fn is_identifier_coupled_key(key: &str) -> bool {
    matches!(
        key,
        "com.apple.security.application-groups"
            | "com.apple.developer.icloud-container-identifiers"
            | "com.apple.developer.ubiquity-container-identifiers"
    )
}

fn rewrite_identifier_values(
    value: &Value,
    new_bundle_id: &str,
    rewrite_group_id: &mut impl FnMut(&str) -> String,
) -> Value {
    match value {
        Value::String(s) => Value::String(rewrite_one_identifier_string(s, new_bundle_id, rewrite_group_id)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| rewrite_identifier_values(v, new_bundle_id, rewrite_group_id))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn rewrite_one_identifier_string(
    s: &str,
    new_bundle_id: &str,
    rewrite_group_id: &mut impl FnMut(&str) -> String,
) -> String {
    if let Some(suffix) = s.strip_prefix("iCloud.") {
        return format!("iCloud.{}", rewrite_group_id(suffix));
    }
    if s.starts_with("group.") {
        return rewrite_group_id(s);
    }
    new_bundle_id.to_string()
}

fn apply_derived_entitlements(
    entitlements: &mut plist::Dictionary,
    new_bundle_id: &str,
    team_id: &str,
    declared: &plist::Dictionary,
    cert_kind: CertificateKind,
) {
    entitlements.insert(
        "application-identifier".to_string(),
        Value::String(format!("{team_id}.{new_bundle_id}")),
    );
    entitlements.insert(
        "com.apple.developer.team-identifier".to_string(),
        Value::String(team_id.to_string()),
    );
    if !entitlements.contains_key("keychain-access-groups") {
        entitlements.insert(
            "keychain-access-groups".to_string(),
            Value::Array(vec![Value::String(format!("{team_id}.*"))]),
        );
    }

    if let Some(env) = declared.get("aps-environment") {
        let _ = env;
        let value = match cert_kind {
            CertificateKind::Development => "development",
            CertificateKind::Distribution => "production",
        };
        entitlements.insert("aps-environment".to_string(), Value::String(value.to_string()));
    }
}

/// Prefix-sanitizing group-id rewrite helper suitable as the
/// `rewrite_group_id` callback, for callers that don't need portal
/// conflict resolution on app groups.
pub fn default_group_rewrite(prefix: &str) -> impl FnMut(&str) -> String + '_ {
    move |original: &str| format!("{}.{}", prefix, sanitize_identifier(original))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpsign_bundle::{Certificate, CertificateKind as Kind};

    fn team(enabled: &[&str]) -> TeamContext {
        let cert = Certificate {
            serial: "1".into(),
            key_fingerprint: "fp".into(),
            kind: Kind::Development,
        };
        let mut team = TeamContext::new("TEAM123456", cert);
        team.enabled_capabilities = enabled.iter().map(|s| s.to_string()).collect();
        team
    }

    #[test]
    fn strips_unconditional_keys() {
        let mut declared = plist::Dictionary::new();
        declared.insert("application-identifier".into(), Value::String("X.com.example".into()));
        let plan = reconcile(
            &declared,
            "abc.com.example.hello",
            &team(&[]),
            Kind::Development,
            &SignFlags::default(),
            &CapabilityMap::load_default(),
            |s| s.to_string(),
        )
        .unwrap();
        assert!(plan.warnings.iter().any(|w| w.contains("application-identifier")));
        assert_eq!(
            plan.entitlements.get("application-identifier").and_then(|v| v.as_string()),
            Some("TEAM123456.abc.com.example.hello")
        );
    }

    #[test]
    fn strips_unavailable_capability_with_warning() {
        let mut declared = plist::Dictionary::new();
        declared.insert(
            "com.apple.developer.healthkit".into(),
            Value::Boolean(true),
        );
        let plan = reconcile(
            &declared,
            "abc.com.example.hello",
            &team(&[]),
            Kind::Development,
            &SignFlags::default(),
            &CapabilityMap::load_default(),
            |s| s.to_string(),
        )
        .unwrap();
        assert!(plan.entitlements.get("com.apple.developer.healthkit").is_none());
        assert!(plan.warnings.iter().any(|w| w.contains("health")));
    }

    #[test]
    fn fails_hard_when_capability_required() {
        let mut declared = plist::Dictionary::new();
        declared.insert("com.apple.developer.healthkit".into(), Value::Boolean(true));
        let mut flags = SignFlags::default();
        flags.require_capabilities = true;
        let result = reconcile(
            &declared,
            "abc.com.example.hello",
            &team(&[]),
            Kind::Development,
            &flags,
            &CapabilityMap::load_default(),
            |s| s.to_string(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn enables_push_with_environment_matching_certificate() {
        let mut declared = plist::Dictionary::new();
        declared.insert("aps-environment".into(), Value::String("development".into()));
        let plan = reconcile(
            &declared,
            "abc.com.example.hello",
            &team(&["push"]),
            Kind::Distribution,
            &SignFlags::default(),
            &CapabilityMap::load_default(),
            |s| s.to_string(),
        )
        .unwrap();
        assert_eq!(
            plan.entitlements.get("aps-environment").and_then(|v| v.as_string()),
            Some("production")
        );
        assert!(plan
            .mutations
            .iter()
            .any(|m| matches!(m, Mutation::EnableCapability { capability, .. } if capability == "push")));
    }
}
