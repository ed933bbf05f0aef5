// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed operations against the legacy `QH65B2` developer-services
//! endpoints, grouped the way the identifier/capability/profile/device
//! graph is grouped on the portal itself.

mod app_groups;
mod certificates;
mod devices;
mod identifiers;
mod profiles;
mod teams;

pub use app_groups::AppGroup;
pub use certificates::Certificate;
pub use devices::Device;
pub use identifiers::Identifier;
pub use profiles::Profile;
pub use teams::Team;
