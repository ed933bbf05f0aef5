// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Sign Orchestrator (spec §4.6): unpack -> inventory -> reconcile ->
//! mutate -> rewrite -> sign -> repack, one control thread with bounded
//! parallelism for the embarrassingly parallel phases (spec §5).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use warpsign_bundle::{AppBundle, CertificateKind, ProfileKey, SigningPlan, TeamContext};
use warpsign_portal::PortalClient;

use crate::allocate::{default_group_rewrite, IdentifierAllocator};
use crate::error::{Error, Result};
use crate::flags::SignFlags;
use crate::progress::{Phase, ProgressEvent, ProgressSink};
use crate::reconcile::{reconcile, CapabilityMap, Mutation};
use crate::signer::{SignRequest, Signer};

pub struct OrchestratorConfig {
    pub prefix: String,
    pub flags: SignFlags,
    pub fan_out: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            flags: SignFlags::default(),
            fan_out: 4,
        }
    }
}

pub struct Orchestrator<'a> {
    config: OrchestratorConfig,
    capability_map: CapabilityMap,
    signer: &'a dyn Signer,
    progress: &'a dyn ProgressSink,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: OrchestratorConfig, signer: &'a dyn Signer, progress: &'a dyn ProgressSink) -> Self {
        Self {
            config,
            capability_map: CapabilityMap::load_default(),
            signer,
            progress,
        }
    }

    /// Run the full pipeline. `team` is mutated in place as portal
    /// mutations are applied; `portal` is `None` when every identifier
    /// and profile the run needs already exists (no I/O is attempted
    /// unless a mutation is actually required, per spec §4.6 step 3).
    pub fn run(
        &self,
        ipa_path: &Path,
        out_path: &Path,
        team: &mut TeamContext,
        portal: Option<&PortalClient>,
        cancel: &AtomicBool,
    ) -> Result<()> {
        self.emit(Phase::Unpack, 0, 1, ipa_path.display().to_string());
        let scratch = warpsign_bundle::archive::unpack(ipa_path, &std::env::temp_dir())?;
        let cleanup = ScratchGuard(&scratch);

        let result = self.run_in_scratch(&scratch, out_path, team, portal, cancel);

        if cancel.load(Ordering::SeqCst) {
            drop(cleanup);
            return Err(Error::Cancelled);
        }
        let outcome = result;
        drop(cleanup);
        outcome
    }

    fn run_in_scratch(
        &self,
        scratch: &Path,
        out_path: &Path,
        team: &mut TeamContext,
        portal: Option<&PortalClient>,
        cancel: &AtomicBool,
    ) -> Result<()> {
        self.emit(Phase::Inventory, 0, 1, "walking bundle tree".into());
        let root_app_path = warpsign_bundle::find_root_app(scratch)?;
        let mut root = warpsign_bundle::build_inventory(&root_app_path)?;

        let prefix = if self.config.prefix.is_empty() {
            crate::allocate::default_prefix(&root.original_bundle_id, &team.team_id)
        } else {
            self.config.prefix.clone()
        };

        let mut allocator = IdentifierAllocator::new(&prefix, &self.config.flags);
        let mut mutations = Vec::new();
        let plans = self.build_plans(&root, None, team, &mut allocator, &mut mutations)?;

        if cancel.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }

        self.emit(Phase::PortalMutations, 0, mutations.len(), "applying identifier/capability mutations".into());
        self.apply_mutations(&mutations, team, portal)?;

        self.emit(Phase::Profiles, 0, plans.len(), "materializing provisioning profiles".into());
        self.materialize_profiles(&plans, team, portal)?;

        self.emit(Phase::Rewrite, 0, plans.len(), "rewriting plists and binaries".into());
        self.rewrite_all(&mut root, &plans)?;

        if cancel.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }

        self.emit(Phase::Sign, 0, plans.len(), "invoking signer".into());
        self.sign_in_order(&plans)?;

        self.emit(Phase::Repack, 0, 1, out_path.display().to_string());
        warpsign_bundle::archive::repack(scratch, out_path)?;

        Ok(())
    }

    /// Compute a `SigningPlan` for `bundle` and all its descendants,
    /// depth-first so the parent's new identifier exists before any
    /// child's invariant check (spec §4.3's Tree Consistency Invariant).
    fn build_plans(
        &self,
        bundle: &AppBundle,
        parent_plan: Option<&SigningPlan>,
        team: &TeamContext,
        allocator: &mut IdentifierAllocator<'_>,
        mutations: &mut Vec<Mutation>,
    ) -> Result<Vec<SigningPlan>> {
        let new_bundle_id = allocator.allocate(
            &bundle.original_bundle_id,
            parent_plan.map(|p| p.original_bundle_id.as_str()),
        )?;

        if let Some(parent) = parent_plan {
            let original_is_nested = warpsign_bundle::is_nested(&bundle.original_bundle_id, &parent.original_bundle_id);
            let new_is_nested = warpsign_bundle::is_nested(&new_bundle_id, &parent.new_bundle_id);
            if original_is_nested && !new_is_nested {
                return Err(Error::NestedIdentifierMismatch {
                    parent: parent.new_bundle_id.clone(),
                    child: new_bundle_id,
                });
            }
        }

        let cert_kind = team.certificate.kind;
        let reconciled = reconcile(
            &bundle.declared_entitlements,
            &new_bundle_id,
            team,
            cert_kind,
            &self.config.flags,
            &self.capability_map,
            default_group_rewrite(&prefix_of(&new_bundle_id)),
        )?;

        let rewrites = bundle
            .executable_path
            .iter()
            .map(|executable| warpsign_bundle::MachORewrite {
                binary_path: executable.clone(),
                old_identifier: bundle.original_bundle_id.clone(),
                new_identifier: new_bundle_id.clone(),
            })
            .collect();

        let profile_key = warpsign_bundle::ProfileKey {
            identifier: new_bundle_id.clone(),
            certificate_serial: team.certificate.serial.clone(),
            device_udids: Vec::new(),
        };

        let plan = SigningPlan {
            bundle_path: bundle.path.clone(),
            original_bundle_id: bundle.original_bundle_id.clone(),
            new_bundle_id,
            entitlements: reconciled.entitlements,
            profile_key,
            rewrites,
        };

        for warning in &reconciled.warnings {
            log::warn!("{}: {warning}", bundle.path.display());
        }

        mutations.extend(reconciled.mutations);

        let mut out = vec![plan];
        for child in &bundle.nested {
            let parent_ref = out[0].clone();
            out.extend(self.build_plans(child, Some(&parent_ref), team, allocator, mutations)?);
        }

        Ok(out)
    }

    /// Apply the portal mutations the reconciler produced: register any new
    /// identifier, enable any newly-required capability on it, and ensure
    /// any app group it references exists (spec §4.2/§4.6 step 5). Processed
    /// in two passes so every `EnableCapability` mutation can look up the
    /// identifier its `EnsureIdentifier` counterpart just created.
    fn apply_mutations(
        &self,
        mutations: &[Mutation],
        team: &mut TeamContext,
        portal: Option<&PortalClient>,
    ) -> Result<()> {
        let mut seen_identifiers: HashSet<String> = HashSet::new();
        for mutation in mutations {
            let Mutation::EnsureIdentifier { bundle_id, name } = mutation else {
                continue;
            };
            if !seen_identifiers.insert(bundle_id.clone()) || team.identifiers.contains_key(bundle_id) {
                continue;
            }
            let portal_id = if let Some(client) = portal {
                client.ensure_identifier(&team.team_id, name, bundle_id)?.app_id_id
            } else {
                String::new()
            };
            team.identifiers.insert(
                bundle_id.clone(),
                warpsign_bundle::Identifier {
                    portal_id,
                    bundle_id: bundle_id.clone(),
                    name: name.clone(),
                    capabilities: HashSet::new(),
                },
            );
        }

        let mut seen_groups: HashSet<String> = HashSet::new();
        for mutation in mutations {
            match mutation {
                Mutation::EnableCapability { bundle_id, capability } => {
                    let already_enabled = team
                        .identifiers
                        .get(bundle_id)
                        .is_some_and(|i| i.capabilities.contains(capability));
                    if already_enabled {
                        continue;
                    }

                    let app_id_id = team.identifiers.get(bundle_id).map(|i| i.portal_id.clone());
                    if let (Some(client), Some(app_id_id)) = (portal, app_id_id.as_deref()) {
                        if !app_id_id.is_empty() {
                            let mut features = HashMap::new();
                            features.insert(capability.clone(), plist::Value::String("on".to_string()));
                            client.update_identifier_capabilities(&team.team_id, app_id_id, features)?;
                        }
                    }

                    if let Some(identifier) = team.identifiers.get_mut(bundle_id) {
                        identifier.capabilities.insert(capability.clone());
                    }
                    team.enabled_capabilities.insert(capability.clone());
                }
                Mutation::EnsureAppGroup { identifier, name } => {
                    if !seen_groups.insert(identifier.clone()) || team.app_groups.contains_key(identifier) {
                        continue;
                    }
                    let group = if let Some(client) = portal {
                        let created = client.ensure_app_group(&team.team_id, name, identifier)?;
                        warpsign_bundle::AppGroup {
                            portal_id: created.application_group_id,
                            group_identifier: created.identifier,
                            name: created.name,
                        }
                    } else {
                        warpsign_bundle::AppGroup {
                            portal_id: String::new(),
                            group_identifier: identifier.clone(),
                            name: name.clone(),
                        }
                    };
                    team.app_groups.insert(identifier.clone(), group);
                }
                Mutation::EnsureIdentifier { .. } => {}
            }
        }

        Ok(())
    }

    /// Materialize a provisioning profile for every plan and embed it as
    /// `embedded.mobileprovision` in the bundle (spec §4.6 step 6). A
    /// profile already cached under the same `ProfileKey` (same identifier,
    /// certificate, and device set) is reused without any portal call,
    /// which is what makes re-signing the same input idempotent (spec §8).
    fn materialize_profiles(
        &self,
        plans: &[SigningPlan],
        team: &mut TeamContext,
        portal: Option<&PortalClient>,
    ) -> Result<()> {
        let device_udids: Vec<String> = match (team.certificate.kind, portal) {
            (CertificateKind::Development, Some(client)) => client
                .list_devices(&team.team_id)?
                .into_iter()
                .map(|d| d.device_number)
                .collect(),
            _ => Vec::new(),
        };

        for plan in plans {
            let key = ProfileKey {
                identifier: plan.new_bundle_id.clone(),
                certificate_serial: team.certificate.serial.clone(),
                device_udids: device_udids.clone(),
            };

            if !team.profiles.contains_key(&key) {
                let app_id_id = team
                    .identifiers
                    .get(&plan.new_bundle_id)
                    .map(|i| i.portal_id.clone())
                    .unwrap_or_default();

                let (portal_id, encoded_profile) = if let (Some(client), false) = (portal, app_id_id.is_empty()) {
                    let profile = client.ensure_profile(
                        &team.team_id,
                        &plan.new_bundle_id,
                        &app_id_id,
                        std::slice::from_ref(&team.certificate.serial),
                        &device_udids,
                    )?;
                    let bytes = profile
                        .encoded_profile
                        .as_ref()
                        .and_then(|v| v.as_data())
                        .map(|d| d.to_vec())
                        .unwrap_or_default();
                    (profile.provisioning_profile_id, bytes)
                } else {
                    (String::new(), Vec::new())
                };

                team.profiles.insert(
                    key.clone(),
                    warpsign_bundle::Profile {
                        portal_id,
                        key: key.clone(),
                        encoded_profile,
                    },
                );
            }

            if let Some(profile) = team.profiles.get(&key) {
                if !profile.encoded_profile.is_empty() {
                    std::fs::write(plan.bundle_path.join("embedded.mobileprovision"), &profile.encoded_profile)?;
                }
            }
        }

        Ok(())
    }

    fn rewrite_all(&self, root: &mut AppBundle, plans: &[SigningPlan]) -> Result<()> {
        let root_path = root.path.clone();
        let bundles = root.iter_mut_flat();
        let total = bundles.len();

        bundles
            .into_par_iter()
            .enumerate()
            .try_for_each(|(i, bundle)| -> Result<()> {
                let plan = plans
                    .iter()
                    .find(|p| p.bundle_path == bundle.path)
                    .expect("every bundle has a plan");

                let is_root = bundle.path == root_path;

                if let Some(dict) = bundle.info_plist.as_dictionary_mut() {
                    dict.insert(
                        "CFBundleIdentifier".to_string(),
                        plist::Value::String(plan.new_bundle_id.clone()),
                    );
                    if is_root && self.config.flags.patch_file_sharing {
                        dict.insert(
                            "UIFileSharingEnabled".to_string(),
                            plist::Value::Boolean(true),
                        );
                    }
                    if is_root && self.config.flags.patch_promotion {
                        dict.insert(
                            "CADisableMinimumFrameDurationOnPhone".to_string(),
                            plist::Value::Boolean(true),
                        );
                    }
                }
                bundle.write_info_plist()?;

                if is_root {
                    if let Some(icon_source) = &self.config.flags.icon {
                        apply_icon(bundle, icon_source)?;
                    }
                }

                for rewrite in &plan.rewrites {
                    let mut data = std::fs::read(&rewrite.binary_path)?;
                    warpsign_macho::rewrite_macho(&mut data, &rewrite.old_identifier, &rewrite.new_identifier)?;
                    std::fs::write(&rewrite.binary_path, data)?;
                }

                log::debug!("rewrote {}/{}: {}", i + 1, total, bundle.path.display());
                Ok(())
            })?;

        Ok(())
    }

    /// Invoke the signer in reverse topological order: every descendant
    /// before its parent (spec §4.6 step 7, §5 ordering guarantee).
    fn sign_in_order(&self, plans: &[SigningPlan]) -> Result<()> {
        let mut ordered: Vec<&SigningPlan> = plans.iter().collect();
        ordered.sort_by_key(|p| std::cmp::Reverse(p.bundle_path.components().count()));

        for plan in ordered {
            let entitlements_path = plan.bundle_path.join("Entitlements.plist");
            let doc = warpsign_bundle::PlistDocument {
                root: plist::Value::Dictionary(plan.entitlements.clone()),
                format: warpsign_bundle::PlistFormat::Xml,
            };
            doc.write_file(&entitlements_path)?;

            let request = SignRequest {
                bundle_path: &plan.bundle_path,
                entitlements_path: &entitlements_path,
                certificate_identity: &plan.profile_key.certificate_serial,
            };
            self.signer.sign(&request).map_err(|source| Error::SignerFailed {
                bundle: plan.bundle_path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn emit(&self, phase: Phase, current: usize, total: usize, detail: String) {
        self.progress.emit(ProgressEvent {
            phase,
            current,
            total,
            detail,
        });
    }
}

/// Replace the bundle's primary icon file with `icon_source`'s bytes,
/// keeping whatever name `Info.plist` already declares for it.
fn apply_icon(bundle: &mut AppBundle, icon_source: &Path) -> Result<()> {
    let icon_bytes = std::fs::read(icon_source)?;
    let icon_name = primary_icon_file(bundle).unwrap_or_else(|| "AppIcon60x60@2x.png".to_string());
    std::fs::write(bundle.path.join(icon_name), icon_bytes)?;
    Ok(())
}

/// Resolve the filename of the bundle's primary icon from `CFBundleIconFile`
/// or the modern `CFBundleIcons.CFBundlePrimaryIcon.CFBundleIconFiles` list.
fn primary_icon_file(bundle: &AppBundle) -> Option<String> {
    let dict = bundle.info_plist.as_dictionary()?;
    if let Some(name) = dict.get("CFBundleIconFile").and_then(|v| v.as_string()) {
        return Some(name.to_string());
    }
    dict.get("CFBundleIcons")
        .and_then(|v| v.as_dictionary())
        .and_then(|icons| icons.get("CFBundlePrimaryIcon"))
        .and_then(|v| v.as_dictionary())
        .and_then(|primary| primary.get("CFBundleIconFiles"))
        .and_then(|v| v.as_array())
        .and_then(|files| files.first())
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn prefix_of(new_bundle_id: &str) -> String {
    new_bundle_id
        .split_once('.')
        .map(|(prefix, _)| prefix.to_string())
        .unwrap_or_else(|| new_bundle_id.to_string())
}

struct ScratchGuard<'a>(&'a Path);

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(self.0);
    }
}
