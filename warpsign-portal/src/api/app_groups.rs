// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

use crate::client::PortalClient;
use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppGroup {
    pub application_group_id: String,
    pub name: String,
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppGroupsResponse {
    application_groups: Vec<AppGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppGroupResponse {
    application_group: AppGroup,
}

impl PortalClient {
    pub fn list_app_groups(&self, team_id: &str) -> Result<Vec<AppGroup>> {
        let mut body = plist::Dictionary::new();
        body.insert("teamId".into(), plist::Value::String(team_id.into()));
        let response: AppGroupsResponse = self.qh_request("listApplicationGroups", body)?;
        Ok(response.application_groups)
    }

    pub fn create_app_group(&self, team_id: &str, name: &str, identifier: &str) -> Result<AppGroup> {
        let mut body = plist::Dictionary::new();
        body.insert("teamId".into(), plist::Value::String(team_id.into()));
        body.insert("name".into(), plist::Value::String(name.into()));
        body.insert("identifier".into(), plist::Value::String(identifier.into()));
        let response: AppGroupResponse = self.qh_request("addApplicationGroup", body)?;
        Ok(response.application_group)
    }

    pub fn ensure_app_group(&self, team_id: &str, name: &str, identifier: &str) -> Result<AppGroup> {
        if let Some(existing) = self
            .list_app_groups(team_id)?
            .into_iter()
            .find(|g| g.identifier == identifier)
        {
            return Ok(existing);
        }
        self.create_app_group(team_id, name, identifier)
    }
}
