// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use serde::Deserialize;

use crate::client::PortalClient;
use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    pub app_id_id: String,
    pub name: String,
    pub identifier: String,
    #[serde(default)]
    pub is_wild_card: bool,
    #[serde(default)]
    pub features: HashMap<String, plist::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentifiersResponse {
    app_ids: Vec<Identifier>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentifierResponse {
    app_id: Identifier,
}

impl PortalClient {
    pub fn list_identifiers(&self, team_id: &str) -> Result<Vec<Identifier>> {
        let mut body = plist::Dictionary::new();
        body.insert("teamId".into(), plist::Value::String(team_id.into()));
        let response: IdentifiersResponse = self.qh_request("listAppIds", body)?;
        Ok(response.app_ids)
    }

    pub fn find_identifier(&self, team_id: &str, identifier: &str) -> Result<Option<Identifier>> {
        Ok(self
            .list_identifiers(team_id)?
            .into_iter()
            .find(|i| i.identifier == identifier))
    }

    pub fn create_identifier(&self, team_id: &str, name: &str, identifier: &str) -> Result<Identifier> {
        let mut body = plist::Dictionary::new();
        body.insert("teamId".into(), plist::Value::String(team_id.into()));
        body.insert("name".into(), plist::Value::String(sanitize_name(name)));
        body.insert("identifier".into(), plist::Value::String(identifier.into()));
        let response: IdentifierResponse = self.qh_request("addAppId", body)?;
        Ok(response.app_id)
    }

    /// Create `identifier` if it doesn't already exist under `team_id`,
    /// otherwise return the existing registration unmodified.
    pub fn ensure_identifier(&self, team_id: &str, name: &str, identifier: &str) -> Result<Identifier> {
        if let Some(existing) = self.find_identifier(team_id, identifier)? {
            return Ok(existing);
        }
        self.create_identifier(team_id, name, identifier)
    }

    /// Enable the capabilities named in `features` on an existing
    /// identifier. `features` maps a portal feature key (e.g.
    /// `push`, `appGroups`) to its plist-encoded value.
    pub fn update_identifier_capabilities(
        &self,
        team_id: &str,
        app_id_id: &str,
        features: HashMap<String, plist::Value>,
    ) -> Result<Identifier> {
        let mut body = plist::Dictionary::new();
        body.insert("teamId".into(), plist::Value::String(team_id.into()));
        body.insert("appIdId".into(), plist::Value::String(app_id_id.into()));
        for (key, value) in features {
            body.insert(key, value);
        }
        let response: IdentifierResponse = self.qh_request("updateAppId", body)?;
        Ok(response.app_id)
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-' || *c == '.')
        .collect()
}
