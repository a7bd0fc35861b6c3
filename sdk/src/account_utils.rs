//! Useful extras for `Account` state.

use {
    crate::{
        account::{AccountSharedData, ReadableAccount, WritableAccount},
        instruction::InstructionError,
    },
    bincode::ErrorKind,
    serde::{de::DeserializeOwned, Serialize},
};

/// Convenience trait to covert bincode errors to instruction errors.
pub trait StateMut<T> {
    fn state(&self) -> Result<T, InstructionError>;
    fn set_state(&mut self, state: &T) -> Result<(), InstructionError>;
}

impl<T> StateMut<T> for AccountSharedData
where
    T: Serialize + DeserializeOwned,
{
    fn state(&self) -> Result<T, InstructionError> {
        self.deserialize_data()
            .map_err(|_| InstructionError::InvalidAccountData)
    }
    fn set_state(&mut self, state: &T) -> Result<(), InstructionError> {
        self.serialize_data(state).map_err(|err| match *err {
            ErrorKind::SizeLimit => InstructionError::AccountDataTooSmall,
            _ => InstructionError::GenericError,
        })
    }
}

impl AccountSharedData {
    pub fn deserialize_data<T: DeserializeOwned>(&self) -> Result<T, bincode::Error> {
        bincode::deserialize(self.data())
    }

    pub fn serialize_data<T: Serialize>(&mut self, state: &T) -> Result<(), bincode::Error> {
        if bincode::serialized_size(state)? > self.data().len() as u64 {
            return Err(Box::new(ErrorKind::SizeLimit));
        }
        bincode::serialize_into(self.data_as_mut_slice(), state)
    }
}
