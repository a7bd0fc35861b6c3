//! Named accounts for synthesized data accounts for bank state, etc.

use crate::pubkey::Pubkey;

pub mod clock;
pub mod rent;

// Owner of all sysvar accounts.
crate::declare_id!("Sysvar1111111111111111111111111111111111111");

/// A type that holds sysvar data and has an associated sysvar `Pubkey`.
pub trait SysvarId {
    fn id() -> Pubkey;

    /// Returns `true` if the given pubkey is the sysvar's address.
    fn check_id(pubkey: &Pubkey) -> bool;
}

/// A type that holds sysvar data.
pub trait Sysvar:
    SysvarId + Default + Sized + serde::Serialize + serde::de::DeserializeOwned
{
}

/// Declares an id for a sysvar and implements `SysvarId` for its payload type.
#[macro_export]
macro_rules! declare_sysvar_id {
    ($name:expr, $type:ty) => {
        $crate::declare_id!($name);

        impl $crate::sysvar::SysvarId for $type {
            fn id() -> $crate::pubkey::Pubkey {
                id()
            }

            fn check_id(pubkey: &$crate::pubkey::Pubkey) -> bool {
                check_id(pubkey)
            }
        }
    };
}
