// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

use crate::client::PortalClient;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub team_id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamsResponse {
    teams: Vec<Team>,
}

impl PortalClient {
    pub fn list_teams(&self) -> Result<Vec<Team>> {
        let response: TeamsResponse = self.qh_request("listTeams", plist::Dictionary::new())?;
        Ok(response.teams)
    }

    /// Resolve a single team, applying the explicit `prefer` override when
    /// more than one team is available (spec §4.1: an ambiguous team list
    /// with no override is a hard stop, never a silent first-pick).
    pub fn resolve_team(&self, prefer: Option<&str>) -> Result<Team> {
        let teams = self.list_teams()?;
        match (teams.len(), prefer) {
            (0, _) => Err(Error::UnexpectedResponse("account belongs to no teams".into())),
            (1, _) => Ok(teams.into_iter().next().unwrap()),
            (_, Some(team_id)) => teams
                .into_iter()
                .find(|t| t.team_id == team_id)
                .ok_or_else(|| Error::UnexpectedResponse(format!("team '{team_id}' not found"))),
            (_, None) => Err(Error::TeamAmbiguous),
        }
    }
}
