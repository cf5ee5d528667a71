//! Mechanism lookup table, keyed by [`MechanismKind`].

use std::collections::HashMap;
use std::sync::Arc;

use keyrack_core::kinds::MechanismKind;

use crate::aws_sso::AwsSsoMechanism;
use crate::github_app::GithubAppMechanism;
use crate::replica::ReplicaMechanism;
use crate::traits::Mechanism;

/// One adapter per mechanism family.
pub struct MechanismRegistry {
    map: HashMap<MechanismKind, Arc<dyn Mechanism>>,
}

impl Default for MechanismRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MechanismRegistry {
    /// Registry with the three production adapters.
    pub fn new() -> Self {
        let mut map: HashMap<MechanismKind, Arc<dyn Mechanism>> = HashMap::new();
        map.insert(
            MechanismKind::PermanentViaReplica,
            Arc::new(ReplicaMechanism),
        );
        map.insert(
            MechanismKind::EphemeralViaGithubApp,
            Arc::new(GithubAppMechanism::default()),
        );
        map.insert(MechanismKind::EphemeralViaAwsSso, Arc::new(AwsSsoMechanism));
        Self { map }
    }

    /// Replace the adapter for one kind (tests, enterprise API endpoints).
    pub fn with_mechanism(mut self, mechanism: Arc<dyn Mechanism>) -> Self {
        self.map.insert(mechanism.kind(), mechanism);
        self
    }

    /// The adapter for a kind.  Total: every kind has a default adapter.
    pub fn mechanism(&self, kind: MechanismKind) -> Arc<dyn Mechanism> {
        self.map
            .get(&kind)
            .cloned()
            .expect("registry holds an adapter for every mechanism kind")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_is_covered() {
        let registry = MechanismRegistry::new();
        for kind in MechanismKind::ALL {
            assert_eq!(registry.mechanism(kind).kind(), kind);
        }
    }
}
