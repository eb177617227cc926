// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Network settings and selection of the network that supplies a default.

use crate::OptionValue;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Resource class claimed by the network whose resolvers should be used.
pub const DEFAULT_FOR_DNS: &str = "dns";

/// Resource class claimed by the network whose gateway should be used.
pub const DEFAULT_FOR_GATEWAY: &str = "gateway";

/// A single network this instance is attached to.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema,
)]
#[serde(default)]
pub struct Network {
    #[serde(rename = "type")]
    pub network_type: String,
    pub ip: String,
    pub netmask: String,
    pub gateway: String,
    /// Resolver addresses, in order of preference.
    pub dns: Vec<String>,
    /// Resource classes for which this network is the preferred source.
    pub default: BTreeSet<String>,
    pub mac: String,
    pub cloud_properties: BTreeMap<String, OptionValue>,
}

impl Network {
    pub fn is_default_for(&self, resource_class: &str) -> bool {
        self.default.contains(resource_class)
    }

    pub fn has_ip(&self) -> bool {
        !self.ip.is_empty()
    }
}

/// All networks, keyed by caller-assigned network name.
///
/// Iteration is ordered by name; where more than one network could satisfy a
/// selection, the first by name is chosen.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct Networks(BTreeMap<String, Network>);

impl Networks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, network: Network) {
        self.0.insert(name.into(), network);
    }

    pub fn get(&self, name: &str) -> Option<&Network> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Network)> {
        self.0.iter().map(|(name, network)| (name.as_str(), network))
    }

    /// Returns the network that should supply `resource_class`.
    ///
    /// A network that explicitly claims the class wins. Failing that, a
    /// lone network is the implicit default. With several networks and no
    /// claimant, there is no default.
    pub fn default_network_for(&self, resource_class: &str) -> Option<&Network> {
        if let Some(network) =
            self.0.values().find(|n| n.is_default_for(resource_class))
        {
            return Some(network);
        }
        if self.0.len() == 1 {
            return self.0.values().next();
        }
        None
    }

    /// Returns the address this instance should advertise.
    ///
    /// An address on a network that claims any default is preferred;
    /// otherwise any assigned address will do.
    pub fn default_ip(&self) -> Option<&str> {
        self.0
            .values()
            .find(|n| !n.default.is_empty() && n.has_ip())
            .or_else(|| self.0.values().find(|n| n.has_ip()))
            .map(|n| n.ip.as_str())
    }
}

impl FromIterator<(String, Network)> for Networks {
    fn from_iter<T: IntoIterator<Item = (String, Network)>>(iter: T) -> Self {
        Networks(iter.into_iter().collect())
    }
}
