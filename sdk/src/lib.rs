//! Core types of the Sealevel ledger shared by the runtime and the builtin
//! programs.

pub mod account;
pub mod account_utils;
pub mod bpf_loader;
pub mod bpf_loader_deprecated;
pub mod bpf_loader_upgradeable;
pub mod clock;
pub mod feature_set;
pub mod hash;
pub mod instruction;
pub mod loader_upgradeable_instruction;
pub mod native_loader;
pub mod program_utils;
pub mod pubkey;
pub mod rent;
pub mod system_instruction;
pub mod system_program;
pub mod sysvar;
pub mod transaction_context;
