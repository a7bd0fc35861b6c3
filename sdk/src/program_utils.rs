//! Contains a single utility function for deserializing from [bincode].

use {crate::instruction::InstructionError, bincode::config::Options};

/// Deserialize with a limit based the maximum amount of data a program can expect to get.
/// This function should be used in place of direct deserialization to help prevent OOM errors.
pub fn limited_deserialize<T>(instruction_data: &[u8], limit: u64) -> Result<T, InstructionError>
where
    T: serde::de::DeserializeOwned,
{
    bincode::options()
        .with_limit(limit)
        .with_fixint_encoding() // As per bincode::config::legacy
        .allow_trailing_bytes() // As per bincode::config::legacy
        .deserialize_from(instruction_data)
        .map_err(|_| InstructionError::InvalidInstructionData)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_deserialize() {
        #[derive(Debug, PartialEq, serde_derive::Deserialize, serde_derive::Serialize)]
        enum Foo {
            Bar(Vec<u8>),
        }

        let item = Foo::Bar([1; 4].to_vec());
        let serialized = bincode::serialize(&item).unwrap();
        assert!(limited_deserialize::<Foo>(&serialized, serialized.len() as u64).is_ok());
        assert_eq!(
            limited_deserialize::<Foo>(&serialized, serialized.len() as u64 - 1),
            Err(InstructionError::InvalidInstructionData),
        );
    }
}
