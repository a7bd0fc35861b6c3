//! Ledger time: slots, epochs, and the clock sysvar payload.

use serde_derive::{Deserialize, Serialize};

/// The unit of time given to a leader for encoding a block.
pub type Slot = u64;

/// The unit of time a given leader schedule is honored.
pub type Epoch = u64;

/// An approximate measure of real-world time, expressed as Unix time.
pub type UnixTimestamp = i64;

/// A representation of network time published once per slot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clock {
    /// The current network/bank slot.
    pub slot: Slot,
    /// The timestamp of the first slot in this epoch.
    pub epoch_start_timestamp: UnixTimestamp,
    /// The bank epoch.
    pub epoch: Epoch,
    /// The future epoch for which the leader schedule has most recently been calculated.
    pub leader_schedule_epoch: Epoch,
    /// The approximate real world time of the current slot.
    pub unix_timestamp: UnixTimestamp,
}
