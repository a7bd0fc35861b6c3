//! The upgradeable bytecode loader.
//!
//! A deployed program consists of a Program account and a ProgramData account
//! living at an address derived from the Program account. The Program account
//! is what transactions name as the program id; the ProgramData account holds
//! the active bytecode together with the upgrade metadata.

use {
    crate::pubkey::Pubkey,
    serde_derive::{Deserialize, Serialize},
};

crate::declare_id!("BPFLoaderUpgradeab1e11111111111111111111111");

/// Upgradeable loader account states.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum UpgradeableLoaderState {
    /// Account is not initialized.
    Uninitialized,
    /// A Buffer account.
    Buffer {
        /// Authority address
        authority_address: Option<Pubkey>,
        // The raw program data follows this serialized structure in the
        // account's data.
    },
    /// A Program account.
    Program {
        /// Address of the ProgramData account.
        programdata_address: Pubkey,
    },
    /// A ProgramData account.
    ProgramData {
        /// Slot that the program was last modified.
        slot: u64,
        /// Address of the Program's upgrade authority.
        upgrade_authority_address: Option<Pubkey>,
        // The raw program data follows this serialized structure in the
        // account's data.
    },
}

impl UpgradeableLoaderState {
    /// Size of an uninitialized account.
    pub const fn size_of_uninitialized() -> usize {
        4 // see test_state_size_of_uninitialized
    }

    /// Size of a buffer account's serialized metadata.
    pub const fn size_of_buffer_metadata() -> usize {
        37 // see test_state_size_of_buffer_metadata
    }

    /// Size of a programdata account's serialized metadata.
    pub const fn size_of_programdata_metadata() -> usize {
        45 // see test_state_size_of_programdata_metadata
    }

    /// Size of a serialized program account.
    pub const fn size_of_program() -> usize {
        36 // see test_state_size_of_program
    }

    /// Size of a buffer account with the given program data length.
    pub fn size_of_buffer(program_len: usize) -> usize {
        Self::size_of_buffer_metadata().saturating_add(program_len)
    }

    /// Size of a programdata account with the given program data length.
    pub fn size_of_programdata(program_len: usize) -> usize {
        Self::size_of_programdata_metadata().saturating_add(program_len)
    }
}

/// Returns the ProgramData address of a program.
pub fn get_program_data_address(program_address: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[program_address.as_ref()], &id()).0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_is_instance(state: &UpgradeableLoaderState, expected_len: usize) {
        assert_eq!(
            bincode::serialized_size(state).unwrap() as usize,
            expected_len
        );
    }

    #[test]
    fn test_state_size_of_uninitialized() {
        assert_is_instance(
            &UpgradeableLoaderState::Uninitialized,
            UpgradeableLoaderState::size_of_uninitialized(),
        );
    }

    #[test]
    fn test_state_size_of_buffer_metadata() {
        assert_is_instance(
            &UpgradeableLoaderState::Buffer {
                authority_address: Some(Pubkey::default()),
            },
            UpgradeableLoaderState::size_of_buffer_metadata(),
        );
    }

    #[test]
    fn test_state_size_of_program() {
        assert_is_instance(
            &UpgradeableLoaderState::Program {
                programdata_address: Pubkey::default(),
            },
            UpgradeableLoaderState::size_of_program(),
        );
    }

    #[test]
    fn test_state_size_of_programdata_metadata() {
        assert_is_instance(
            &UpgradeableLoaderState::ProgramData {
                slot: 0,
                upgrade_authority_address: Some(Pubkey::default()),
            },
            UpgradeableLoaderState::size_of_programdata_metadata(),
        );
    }

    #[test]
    fn test_state_wire_layout() {
        // tag, option flag, then the authority bytes
        let authority_address = Pubkey::new_unique();
        let bytes = bincode::serialize(&UpgradeableLoaderState::Buffer {
            authority_address: Some(authority_address),
        })
        .unwrap();
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[5..37], authority_address.as_ref());

        let bytes = bincode::serialize(&UpgradeableLoaderState::Buffer {
            authority_address: None,
        })
        .unwrap();
        assert_eq!(&bytes, &[1, 0, 0, 0, 0]);

        let bytes = bincode::serialize(&UpgradeableLoaderState::ProgramData {
            slot: 0x1122_3344_5566_7788,
            upgrade_authority_address: None,
        })
        .unwrap();
        assert_eq!(&bytes[0..4], &[3, 0, 0, 0]);
        assert_eq!(
            &bytes[4..12],
            &[0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );
        assert_eq!(bytes[12], 0);
    }

    #[test]
    fn test_state_round_trip_is_idempotent() {
        let states = [
            UpgradeableLoaderState::Uninitialized,
            UpgradeableLoaderState::Buffer {
                authority_address: None,
            },
            UpgradeableLoaderState::Buffer {
                authority_address: Some(Pubkey::new_unique()),
            },
            UpgradeableLoaderState::Program {
                programdata_address: Pubkey::new_unique(),
            },
            UpgradeableLoaderState::ProgramData {
                slot: 42,
                upgrade_authority_address: Some(Pubkey::new_unique()),
            },
        ];
        for state in states.iter() {
            let bytes = bincode::serialize(state).unwrap();
            let decoded: UpgradeableLoaderState = bincode::deserialize(&bytes).unwrap();
            assert_eq!(state, &decoded);
            assert_eq!(bytes, bincode::serialize(&decoded).unwrap());
        }
    }

    #[test]
    fn test_state_unknown_tag_fails_to_decode() {
        let mut bytes = bincode::serialize(&UpgradeableLoaderState::Uninitialized).unwrap();
        bytes[0] = 4;
        assert!(bincode::deserialize::<UpgradeableLoaderState>(&bytes).is_err());
    }

    #[test]
    fn test_get_program_data_address_is_derived() {
        let program_address = Pubkey::new_unique();
        let (derived, _bump) =
            Pubkey::find_program_address(&[program_address.as_ref()], &id());
        assert_eq!(derived, get_program_data_address(&program_address));
    }
}
