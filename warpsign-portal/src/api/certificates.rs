// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

use crate::client::PortalClient;
use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub certificate_id: String,
    pub name: String,
    pub certificate_type: CertificateTypeInfo,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateTypeInfo {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificatesResponse {
    certificates: Vec<Certificate>,
}

impl PortalClient {
    pub fn list_certificates(&self, team_id: &str) -> Result<Vec<Certificate>> {
        let mut body = plist::Dictionary::new();
        body.insert("teamId".into(), plist::Value::String(team_id.into()));
        let response: CertificatesResponse = self.qh_request("listAllDevelopmentCerts", body)?;
        Ok(response.certificates)
    }
}
