//! Collection of all runtime features.
//!
//! Steps to add a new feature are outlined below. Note that these steps only
//! cover the process of getting a feature into the core runtime.
//! 1. Generate a new keypair with `sealevel-keygen new --no-passphrase --no-outfile`
//! 2. Add the public key to the bottom of this file, then add an entry to `FEATURE_NAMES`
//! 3. Set the epoch activation schedule out of band

use {
    crate::{clock::Slot, pubkey::Pubkey},
    lazy_static::lazy_static,
    std::collections::{HashMap, HashSet},
};

pub mod deprecate_executable_meta_update_in_bpf_loader {
    crate::declare_id!("8k6rDHpnmMw9FwN9KPN5rRBKEPntVYhrC97Dbm6vNUBK");
}

pub mod enable_bpf_loader_set_authority_checked_ix {
    crate::declare_id!("B8zoCc2F2Y5g1U3QPuJZ418PotUmCfGY9yUvVG1bPSue");
}

pub mod enable_bpf_loader_extend_program_ix {
    crate::declare_id!("AG5BPTe9DzfbMMxaCDDxoRmYUsZ4fn8NP4d9qnhKn9xg");
}

lazy_static! {
    /// Map of feature identifiers to user-visible description.
    pub static ref FEATURE_NAMES: HashMap<Pubkey, &'static str> = [
        (deprecate_executable_meta_update_in_bpf_loader::id(), "stop updating the executable meta on loader deploy"),
        (enable_bpf_loader_set_authority_checked_ix::id(), "enable the SetAuthorityChecked loader instruction"),
        (enable_bpf_loader_extend_program_ix::id(), "enable the ExtendProgram loader instruction"),
    ]
    .iter()
    .cloned()
    .collect();
}

/// `FeatureSet` holds the set of currently active and inactive features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    pub active: HashMap<Pubkey, Slot>,
    pub inactive: HashSet<Pubkey>,
}

impl Default for FeatureSet {
    // All features are disabled by default.
    fn default() -> Self {
        Self {
            active: HashMap::new(),
            inactive: FEATURE_NAMES.keys().cloned().collect(),
        }
    }
}

impl FeatureSet {
    pub fn is_active(&self, feature_id: &Pubkey) -> bool {
        self.active.contains_key(feature_id)
    }

    pub fn activated_slot(&self, feature_id: &Pubkey) -> Option<Slot> {
        self.active.get(feature_id).copied()
    }

    /// All features enabled, useful for testing.
    pub fn all_enabled() -> Self {
        Self {
            active: FEATURE_NAMES.keys().cloned().map(|key| (key, 0)).collect(),
            inactive: HashSet::new(),
        }
    }

    /// Activate a feature.
    pub fn activate(&mut self, feature_id: &Pubkey, slot: Slot) {
        self.inactive.remove(feature_id);
        self.active.insert(*feature_id, slot);
    }

    /// Deactivate a feature.
    pub fn deactivate(&mut self, feature_id: &Pubkey) {
        self.active.remove(feature_id);
        self.inactive.insert(*feature_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_set_activate_deactivate() {
        let mut feature_set = FeatureSet::default();

        let feature = enable_bpf_loader_extend_program_ix::id();
        assert!(!feature_set.is_active(&feature));
        feature_set.activate(&feature, 0);
        assert!(feature_set.is_active(&feature));
        feature_set.deactivate(&feature);
        assert!(!feature_set.is_active(&feature));

        assert_eq!(FeatureSet::all_enabled().inactive.len(), 0);
        assert_eq!(FeatureSet::default().active.len(), 0);
    }
}
