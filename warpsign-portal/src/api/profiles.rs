// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

use crate::client::PortalClient;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub provisioning_profile_id: String,
    pub name: String,
    #[serde(default)]
    pub app_id_id: String,
    #[serde(default)]
    pub encoded_profile: Option<plist::Value>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfilesResponse {
    provisioning_profiles: Vec<Profile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    provisioning_profile: Profile,
}

#[derive(Debug, Deserialize)]
struct QhAck {
    #[serde(rename = "resultCode", default)]
    _result_code: i64,
}

impl PortalClient {
    pub fn list_profiles(&self, team_id: &str) -> Result<Vec<Profile>> {
        let mut body = plist::Dictionary::new();
        body.insert("teamId".into(), plist::Value::String(team_id.into()));
        let response: ProfilesResponse = self.qh_request("listProvisioningProfiles", body)?;
        Ok(response.provisioning_profiles)
    }

    /// Create (or, if `replace_id` is set, regenerate) a provisioning
    /// profile binding `app_id_id` to `certificate_ids` and `device_ids`.
    pub fn create_profile(
        &self,
        team_id: &str,
        name: &str,
        app_id_id: &str,
        certificate_ids: &[String],
        device_ids: &[String],
        replace_id: Option<&str>,
    ) -> Result<Profile> {
        let mut body = plist::Dictionary::new();
        body.insert("teamId".into(), plist::Value::String(team_id.into()));
        body.insert("provisioningProfileName".into(), plist::Value::String(name.into()));
        body.insert("appIdId".into(), plist::Value::String(app_id_id.into()));
        body.insert(
            "certificateIds".into(),
            plist::Value::String(certificate_ids.join(",")),
        );
        body.insert(
            "deviceIds".into(),
            plist::Value::String(device_ids.join(",")),
        );
        if let Some(existing) = replace_id {
            body.insert(
                "provisioningProfileId".into(),
                plist::Value::String(existing.into()),
            );
            let response: ProfileResponse = self.qh_request("regenProvisioningProfile", body)?;
            return Ok(response.provisioning_profile);
        }

        let response: ProfileResponse = self.qh_request("createProvisioningProfile", body)?;
        Ok(response.provisioning_profile)
    }

    pub fn delete_profile(&self, team_id: &str, profile_id: &str) -> Result<()> {
        let mut body = plist::Dictionary::new();
        body.insert("teamId".into(), plist::Value::String(team_id.into()));
        body.insert(
            "provisioningProfileId".into(),
            plist::Value::String(profile_id.into()),
        );
        let _: QhAck = self.qh_request("deleteProvisioningProfile", body)?;
        Ok(())
    }

    /// Find a profile for `app_id_id`, regenerating it against
    /// `certificate_ids`/`device_ids` if one exists, or creating a fresh
    /// one otherwise. The portal's listing doesn't expose a profile's
    /// bound certificates/devices, so this can't skip the regenerate call
    /// when an existing profile already matches; callers that need to
    /// avoid redundant portal calls should cache by `ProfileKey` instead.
    pub fn ensure_profile(
        &self,
        team_id: &str,
        name: &str,
        app_id_id: &str,
        certificate_ids: &[String],
        device_ids: &[String],
    ) -> Result<Profile> {
        let existing = self
            .list_profiles(team_id)?
            .into_iter()
            .find(|p| p.app_id_id == app_id_id);

        match existing {
            Some(profile) => self.create_profile(
                team_id,
                name,
                app_id_id,
                certificate_ids,
                device_ids,
                Some(&profile.provisioning_profile_id),
            ),
            None => self.create_profile(team_id, name, app_id_id, certificate_ids, device_ids, None),
        }
        .map_err(|e| match e {
            Error::UnexpectedResponse(msg) => Error::ProfileCreationFailed(msg),
            other => other,
        })
    }
}
