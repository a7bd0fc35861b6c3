use {
    crate::invoke_context::ProcessInstructionWithContext,
    sealevel_sdk::{clock::Slot, pubkey::Pubkey},
    std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
    },
};

/// A deployment becomes visible to other transactions one slot after the
/// deploying transaction lands.
pub const DELAY_VISIBILITY_SLOT_OFFSET: Slot = 1;

/// The program image held by a cache entry.
///
/// The runtime treats program bytes as opaque once they passed deployment
/// verification; executing them is the execution engine's concern.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadedProgramType {
    /// Verified program image, ready for the execution engine.
    Verified(Vec<u8>),
    /// Tombstone for programs which did not pass verification.
    FailedVerification,
    /// Tombstone for programs that were closed.
    Closed,
    /// A native program with its entrypoint.
    Builtin(ProcessInstructionWithContext),
}

#[derive(Debug)]
pub struct LoadedProgram {
    /// The program image or a tombstone.
    pub program: LoadedProgramType,
    /// The loader that owns the program account.
    pub loader_key: Pubkey,
    /// Size of account that stores the program and program data.
    pub account_size: usize,
    /// Slot in which the program was (re)deployed.
    pub deployment_slot: Slot,
    /// Slot in which this entry becomes visible to other transactions.
    pub effective_slot: Slot,
    /// How often this entry was used by an instruction.
    pub ix_usage_counter: AtomicU64,
}

impl LoadedProgram {
    /// Creates a verified cache entry for freshly deployed program bytes.
    ///
    /// An empty image never represents a deployable program and is rejected
    /// here; anything beyond that structural check is delegated to the
    /// execution engine.
    pub fn new(
        loader_key: &Pubkey,
        deployment_slot: Slot,
        account_size: usize,
        program_bytes: &[u8],
    ) -> Result<Self, InvalidProgramImage> {
        if program_bytes.is_empty() {
            return Err(InvalidProgramImage);
        }
        Ok(Self {
            program: LoadedProgramType::Verified(program_bytes.to_vec()),
            loader_key: *loader_key,
            account_size,
            deployment_slot,
            effective_slot: deployment_slot.saturating_add(DELAY_VISIBILITY_SLOT_OFFSET),
            ix_usage_counter: AtomicU64::default(),
        })
    }

    /// Creates a tombstone for a closed or verification-failed program.
    pub fn new_tombstone(slot: Slot, reason: LoadedProgramType) -> Self {
        debug_assert!(matches!(
            reason,
            LoadedProgramType::FailedVerification | LoadedProgramType::Closed
        ));
        Self {
            program: reason,
            loader_key: Pubkey::default(),
            account_size: 0,
            deployment_slot: slot,
            effective_slot: slot,
            ix_usage_counter: AtomicU64::default(),
        }
    }

    /// Creates a cache entry for a builtin program with its entrypoint.
    pub fn new_builtin(
        deployment_slot: Slot,
        account_size: usize,
        entrypoint: ProcessInstructionWithContext,
    ) -> Self {
        Self {
            program: LoadedProgramType::Builtin(entrypoint),
            loader_key: Pubkey::default(),
            account_size,
            deployment_slot,
            effective_slot: deployment_slot,
            ix_usage_counter: AtomicU64::default(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(
            self.program,
            LoadedProgramType::FailedVerification | LoadedProgramType::Closed
        )
    }
}

/// The rejection of a program image by deployment verification.
#[derive(Debug, PartialEq, Eq)]
pub struct InvalidProgramImage;

/// Programs (re)deployed, closed or otherwise modified by the transaction
/// currently being processed.
#[derive(Debug, Default)]
pub struct LoadedProgramsForTxBatch {
    entries: HashMap<Pubkey, Arc<LoadedProgram>>,
    slot: Slot,
}

impl LoadedProgramsForTxBatch {
    pub fn new(slot: Slot) -> Self {
        Self {
            entries: HashMap::new(),
            slot,
        }
    }

    /// Refill the cache with a single entry, returning the replaced one.
    pub fn replenish(
        &mut self,
        key: Pubkey,
        entry: Arc<LoadedProgram>,
    ) -> Option<Arc<LoadedProgram>> {
        self.entries.insert(key, entry)
    }

    pub fn find(&self, key: &Pubkey) -> Option<Arc<LoadedProgram>> {
        self.entries.get(key).cloned()
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn set_slot_for_tests(&mut self, slot: Slot) {
        self.slot = slot;
    }

    pub fn touch(&self, key: &Pubkey) {
        if let Some(entry) = self.entries.get(key) {
            entry.ix_usage_counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_image_is_rejected() {
        assert_eq!(
            LoadedProgram::new(&Pubkey::new_unique(), 0, 0, &[]).err(),
            Some(InvalidProgramImage)
        );
    }

    #[test]
    fn test_replenish_and_find() {
        let key = Pubkey::new_unique();
        let mut cache = LoadedProgramsForTxBatch::new(10);
        assert!(cache.find(&key).is_none());

        let entry = Arc::new(
            LoadedProgram::new(&Pubkey::new_unique(), 10, 42, &[0xde, 0xad]).unwrap(),
        );
        assert!(cache.replenish(key, entry).is_none());
        let found = cache.find(&key).unwrap();
        assert_eq!(found.deployment_slot, 10);
        assert_eq!(
            found.effective_slot,
            10 + DELAY_VISIBILITY_SLOT_OFFSET
        );
        assert!(!found.is_tombstone());

        let tombstone = Arc::new(LoadedProgram::new_tombstone(11, LoadedProgramType::Closed));
        assert!(cache.replenish(key, tombstone).is_some());
        assert!(cache.find(&key).unwrap().is_tombstone());
    }
}
