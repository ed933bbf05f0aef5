//! The authenticated team state (`TeamContext`) and the portal entities it
//! caches: capabilities, identifiers, app groups, iCloud containers, and
//! provisioning profiles.

use std::collections::{HashMap, HashSet};

/// A capability kind the Developer Portal can enable on an identifier.
///
/// Deliberately an open string set rather than a hard-coded enum: spec §9
/// notes Apple's capability list is versioned and the reconciler's map
/// must stay configurable.
pub type CapabilityKey = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateKind {
    Development,
    Distribution,
}

#[derive(Debug, Clone)]
pub struct Certificate {
    pub serial: String,
    pub key_fingerprint: String,
    pub kind: CertificateKind,
}

#[derive(Debug, Clone, Default)]
pub struct Identifier {
    pub portal_id: String,
    pub bundle_id: String,
    pub name: String,
    pub capabilities: HashSet<CapabilityKey>,
}

#[derive(Debug, Clone)]
pub struct AppGroup {
    pub portal_id: String,
    pub group_identifier: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ICloudContainer {
    pub portal_id: String,
    pub container_identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileKey {
    pub identifier: String,
    pub certificate_serial: String,
    pub device_udids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub portal_id: String,
    pub key: ProfileKey,
    /// DER-encoded mobile provisioning bytes, as returned by the portal.
    pub encoded_profile: Vec<u8>,
}

/// The authenticated team: a local cache of portal state, mutated only
/// through the Portal Client's typed operations.
#[derive(Debug, Clone)]
pub struct TeamContext {
    pub team_id: String,
    pub certificate: Certificate,
    pub enabled_capabilities: HashSet<CapabilityKey>,
    pub identifiers: HashMap<String, Identifier>,
    pub app_groups: HashMap<String, AppGroup>,
    pub icloud_containers: HashMap<String, ICloudContainer>,
    pub profiles: HashMap<ProfileKey, Profile>,
}

impl TeamContext {
    pub fn new(team_id: impl Into<String>, certificate: Certificate) -> Self {
        Self {
            team_id: team_id.into(),
            certificate,
            enabled_capabilities: HashSet::new(),
            identifiers: HashMap::new(),
            app_groups: HashMap::new(),
            icloud_containers: HashMap::new(),
            profiles: HashMap::new(),
        }
    }

    pub fn identifier(&self, bundle_id: &str) -> Option<&Identifier> {
        self.identifiers.get(bundle_id)
    }

    pub fn capability_enabled(&self, key: &str) -> bool {
        self.enabled_capabilities.contains(key)
    }
}
