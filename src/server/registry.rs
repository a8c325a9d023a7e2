//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The identity-keyed connection registry.

use crate::endpoint::{EndpointInfo, InstanceEndpoint, InstanceId};
use crate::protocol::Advertise;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Maps instance identities to their logical endpoints and decides, for
/// each advertise, whether it is the identity's first sighting.
///
/// Two pieces of state, updated together under one lock:
///
/// - the *known* set: identities that have produced their one-time
///   new-connection notification;
/// - the endpoint map: per-identity stream queues, created lazily so that
///   callers can register interest in an identity before the instance has
///   ever connected.
///
/// The two are distinct on purpose. A lazily created endpoint does not mark
/// the identity known; the notification fires when the instance actually
/// advertises.
pub(crate) struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

struct RegistryState {
    known: HashSet<InstanceId>,
    endpoints: HashMap<InstanceId, InstanceEndpoint>,
}

impl ConnectionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                known: HashSet::new(),
                endpoints: HashMap::new(),
            }),
        }
    }

    /// Looks up the endpoint for `instance_id`, creating its queue lazily.
    pub(crate) fn endpoint_for(&self, instance_id: InstanceId) -> InstanceEndpoint {
        let mut state = self.state.lock();
        state
            .endpoints
            .entry(instance_id)
            .or_insert_with(|| InstanceEndpoint::new(instance_id))
            .clone()
    }

    /// Records an advertise: returns the identity's endpoint, plus the
    /// one-time notification if this is the first sighting since the
    /// identity was added (or re-added after removal).
    pub(crate) fn observe_advertise(
        &self,
        advertise: &Advertise,
    ) -> (InstanceEndpoint, Option<EndpointInfo>) {
        let instance_id = advertise.instance_id();
        let mut state = self.state.lock();
        let endpoint = state
            .endpoints
            .entry(instance_id)
            .or_insert_with(|| InstanceEndpoint::new(instance_id))
            .clone();
        let notification = state.known.insert(instance_id).then(|| {
            EndpointInfo::new(endpoint.clone(), instance_id, advertise.process_id())
        });
        (endpoint, notification)
    }

    /// Removes an identity.
    ///
    /// Returns whether the identity was known, along with its endpoint (if
    /// any) for the caller to dispose outside the lock. After removal a new
    /// advertise of the same identity is treated as brand-new.
    pub(crate) fn remove(&self, instance_id: InstanceId) -> (bool, Option<InstanceEndpoint>) {
        let mut state = self.state.lock();
        let was_known = state.known.remove(&instance_id);
        let endpoint = state.endpoints.remove(&instance_id);
        (was_known, endpoint)
    }

    /// Clears the registry, returning every endpoint for disposal.
    pub(crate) fn drain(&self) -> Vec<InstanceEndpoint> {
        let mut state = self.state.lock();
        state.known.clear();
        state.endpoints.drain().map(|(_, endpoint)| endpoint).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertise(id: InstanceId, pid: u64) -> Advertise {
        Advertise::new(id, pid)
    }

    #[test]
    fn test_first_sighting_notifies_once() {
        let registry = ConnectionRegistry::new();
        let id = InstanceId::new();

        let (_, first) = registry.observe_advertise(&advertise(id, 100));
        assert!(first.is_some());

        // A reconnect of the same identity is not a new sighting.
        let (_, second) = registry.observe_advertise(&advertise(id, 100));
        assert!(second.is_none());
    }

    #[test]
    fn test_reconnect_reuses_endpoint() {
        let registry = ConnectionRegistry::new();
        let id = InstanceId::new();

        let (first, _) = registry.observe_advertise(&advertise(id, 100));
        let (second, _) = registry.observe_advertise(&advertise(id, 100));
        assert_eq!(first.instance_id(), second.instance_id());
    }

    #[test]
    fn test_notification_carries_first_pid() {
        let registry = ConnectionRegistry::new();
        let id = InstanceId::new();

        let (_, info) = registry.observe_advertise(&advertise(id, 41));
        assert_eq!(info.unwrap().process_id(), 41);

        // The same process restarting under a different pid does not
        // produce a second notification.
        let (_, info) = registry.observe_advertise(&advertise(id, 42));
        assert!(info.is_none());
    }

    #[test]
    fn test_removal_rearms_notification() {
        let registry = ConnectionRegistry::new();
        let id = InstanceId::new();

        registry.observe_advertise(&advertise(id, 100));
        let (was_known, endpoint) = registry.remove(id);
        assert!(was_known);
        assert!(endpoint.is_some());

        let (_, info) = registry.observe_advertise(&advertise(id, 100));
        assert!(info.is_some(), "a removed identity is brand-new again");
    }

    #[test]
    fn test_remove_unknown_identity() {
        let registry = ConnectionRegistry::new();
        let (was_known, endpoint) = registry.remove(InstanceId::new());
        assert!(!was_known);
        assert!(endpoint.is_none());
    }

    #[test]
    fn test_lazy_endpoint_does_not_mark_identity_known() {
        let registry = ConnectionRegistry::new();
        let id = InstanceId::new();

        // A caller registers interest before the instance ever connects.
        let lazy = registry.endpoint_for(id);

        // The advertise still counts as a first sighting, on the same
        // endpoint the caller already holds.
        let (endpoint, info) = registry.observe_advertise(&advertise(id, 7));
        assert!(info.is_some());
        assert_eq!(lazy.instance_id(), endpoint.instance_id());
    }

    #[test]
    fn test_drain_clears_everything() {
        let registry = ConnectionRegistry::new();
        let id = InstanceId::new();
        registry.observe_advertise(&advertise(id, 1));

        let endpoints = registry.drain();
        assert_eq!(endpoints.len(), 1);

        // Identities are forgotten too.
        let (_, info) = registry.observe_advertise(&advertise(id, 1));
        assert!(info.is_some());
    }
}
