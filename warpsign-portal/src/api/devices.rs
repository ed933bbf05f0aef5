// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

use crate::client::PortalClient;
use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    pub name: String,
    pub device_number: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevicesResponse {
    devices: Vec<Device>,
}

impl PortalClient {
    pub fn list_devices(&self, team_id: &str) -> Result<Vec<Device>> {
        let mut body = plist::Dictionary::new();
        body.insert("teamId".into(), plist::Value::String(team_id.into()));
        let response: DevicesResponse = self.qh_request("listDevices", body)?;
        Ok(response.devices)
    }
}
