use {
    crate::hash::hashv,
    serde_derive::{Deserialize, Serialize},
    std::{fmt, mem, str::FromStr},
    thiserror::Error,
};

/// Number of bytes in a pubkey.
pub const PUBKEY_BYTES: usize = 32;
/// Maximum length of a derived `Pubkey` seed.
pub const MAX_SEED_LEN: usize = 32;
/// Maximum number of seeds.
pub const MAX_SEEDS: usize = 16;
/// Maximum string length of a base58 encoded pubkey.
const MAX_BASE58_LEN: usize = 44;

const PDA_MARKER: &[u8; 21] = b"ProgramDerivedAddress";

#[derive(Error, Debug, Serialize, Clone, PartialEq, Eq)]
pub enum PubkeyError {
    /// Length of the seed is too long for address generation.
    #[error("Length of the seed is too long for address generation")]
    MaxSeedLengthExceeded,
    #[error("Provided seeds do not result in a valid address")]
    InvalidSeeds,
    #[error("Provided owner is not allowed")]
    IllegalOwner,
}

#[repr(transparent)]
#[derive(
    Serialize, Deserialize, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
pub struct Pubkey([u8; 32]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsePubkeyError {
    #[error("String is the wrong size")]
    WrongSize,
    #[error("Invalid Base58 string")]
    Invalid,
}

impl FromStr for Pubkey {
    type Err = ParsePubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_BASE58_LEN {
            return Err(ParsePubkeyError::WrongSize);
        }
        let pubkey_vec = bs58::decode(s)
            .into_vec()
            .map_err(|_| ParsePubkeyError::Invalid)?;
        if pubkey_vec.len() != mem::size_of::<Pubkey>() {
            Err(ParsePubkeyError::WrongSize)
        } else {
            let mut bytes = [0u8; PUBKEY_BYTES];
            bytes.copy_from_slice(&pubkey_vec);
            Ok(Pubkey(bytes))
        }
    }
}

pub fn bytes_are_curve_point<T: AsRef<[u8]>>(bytes: T) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY::from_slice(bytes.as_ref())
        .decompress()
        .is_some()
}

impl Pubkey {
    pub const fn new_from_array(pubkey_array: [u8; 32]) -> Self {
        Self(pubkey_array)
    }

    /// Decodes a base58 string at compile time. Used by `declare_id!` so that
    /// well-known addresses are plain constants.
    ///
    /// Panics (at compile time in const contexts) when the string is not a
    /// valid base58 encoding of exactly 32 bytes.
    pub const fn from_str_const(encoded: &str) -> Self {
        let encoded = encoded.as_bytes();
        assert!(
            encoded.len() <= MAX_BASE58_LEN,
            "base58 encoded pubkey too long"
        );
        let mut bytes = [0u8; PUBKEY_BYTES];
        let mut i = 0;
        while i < encoded.len() {
            let mut carry = base58_digit(encoded[i]) as u32;
            let mut j = PUBKEY_BYTES - 1;
            loop {
                let accum = (bytes[j] as u32) * 58 + carry;
                bytes[j] = (accum & 0xff) as u8;
                carry = accum >> 8;
                if j == 0 {
                    break;
                }
                j -= 1;
            }
            assert!(carry == 0, "base58 value does not fit in 32 bytes");
            i += 1;
        }
        Self(bytes)
    }

    pub fn new_unique() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static I: AtomicU64 = AtomicU64::new(1);

        let mut b = [0u8; 32];
        let i = I.fetch_add(1, Ordering::Relaxed);
        b[0..8].copy_from_slice(&i.to_le_bytes());
        Self(b)
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn is_on_curve(&self) -> bool {
        bytes_are_curve_point(self)
    }

    /// Derives a program address from seeds and a program id.
    ///
    /// The address is of the same form as a `Pubkey`, except it is ensured
    /// to not be on the ed25519 curve and thus has no associated private
    /// key. Because not every seed and program id combination falls off the
    /// curve, an extra bump seed may be required; use
    /// `find_program_address` to calculate it.
    pub fn create_program_address(
        seeds: &[&[u8]],
        program_id: &Pubkey,
    ) -> Result<Pubkey, PubkeyError> {
        if seeds.len() > MAX_SEEDS {
            return Err(PubkeyError::MaxSeedLengthExceeded);
        }
        for seed in seeds.iter() {
            if seed.len() > MAX_SEED_LEN {
                return Err(PubkeyError::MaxSeedLengthExceeded);
            }
        }

        let mut hash_inputs = Vec::with_capacity(seeds.len().saturating_add(2));
        hash_inputs.extend_from_slice(seeds);
        hash_inputs.push(program_id.as_ref());
        hash_inputs.push(PDA_MARKER);
        let hash = hashv(&hash_inputs);

        if bytes_are_curve_point(hash) {
            return Err(PubkeyError::InvalidSeeds);
        }

        Ok(Pubkey::new_from_array(hash.to_bytes()))
    }

    /// Finds a valid program address and its corresponding bump seed, which
    /// must be appended to the seeds when signing a nested instruction for
    /// the derived address.
    ///
    /// Panics in the very unlikely event that no bump seed produces an
    /// address off the curve.
    pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> (Pubkey, u8) {
        Self::try_find_program_address(seeds, program_id)
            .unwrap_or_else(|| panic!("Unable to find a viable program address bump seed"))
    }

    pub fn try_find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<(Pubkey, u8)> {
        let mut bump_seed = [u8::MAX];
        for _ in 0..u8::MAX {
            {
                let mut seeds_with_bump = seeds.to_vec();
                seeds_with_bump.push(&bump_seed);
                match Self::create_program_address(&seeds_with_bump, program_id) {
                    Ok(address) => return Some((address, bump_seed[0])),
                    Err(PubkeyError::InvalidSeeds) => (),
                    _ => break,
                }
            }
            bump_seed[0] = bump_seed[0].saturating_sub(1);
        }
        None
    }
}

const fn base58_digit(c: u8) -> u8 {
    const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    let mut i = 0;
    while i < ALPHABET.len() {
        if ALPHABET[i] == c {
            return i as u8;
        }
        i += 1;
    }
    panic!("invalid base58 character")
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl AsMut<[u8]> for Pubkey {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0[..]
    }
}

impl From<[u8; 32]> for Pubkey {
    fn from(from: [u8; 32]) -> Self {
        Self(from)
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

/// Declares the id of a program or well-known account as a module-level
/// constant with `check_id` / `id` accessors.
#[macro_export]
macro_rules! declare_id {
    ($address:expr) => {
        /// The static id.
        pub const ID: $crate::pubkey::Pubkey = $crate::pubkey::Pubkey::from_str_const($address);

        /// Confirms that a given pubkey is equivalent to the id.
        pub fn check_id(id: &$crate::pubkey::Pubkey) -> bool {
            id == &ID
        }

        /// Returns the id.
        pub fn id() -> $crate::pubkey::Pubkey {
            ID
        }

        #[cfg(test)]
        #[test]
        fn test_id() {
            assert!(check_id(&id()));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_const_matches_runtime_decoding() {
        for encoded in [
            "11111111111111111111111111111111",
            "BPFLoaderUpgradeab1e11111111111111111111111",
            "NativeLoader1111111111111111111111111111111",
            "SysvarC1ock11111111111111111111111111111111",
            "SysvarRent111111111111111111111111111111111",
        ] {
            let parsed = Pubkey::from_str(encoded).unwrap();
            assert_eq!(parsed, Pubkey::from_str_const(encoded));
            assert_eq!(parsed.to_string(), encoded);
        }
    }

    #[test]
    fn test_new_unique() {
        assert_ne!(Pubkey::new_unique(), Pubkey::new_unique());
    }

    #[test]
    fn test_create_program_address_seed_limits() {
        let program_id = Pubkey::new_unique();
        let exceeded_seed = &[127; MAX_SEED_LEN + 1];
        assert_eq!(
            Pubkey::create_program_address(&[exceeded_seed], &program_id),
            Err(PubkeyError::MaxSeedLengthExceeded)
        );
        let max_seed = &[0; MAX_SEED_LEN];
        assert!(Pubkey::create_program_address(&[max_seed], &program_id).is_ok());
        let exceeded_seeds: Vec<&[u8]> = vec![&[1u8][..]; MAX_SEEDS + 1];
        assert_eq!(
            Pubkey::create_program_address(&exceeded_seeds, &program_id),
            Err(PubkeyError::MaxSeedLengthExceeded)
        );
    }

    #[test]
    fn test_create_program_address_is_deterministic() {
        let program_id = Pubkey::from_str_const("BPFLoaderUpgradeab1e11111111111111111111111");
        let a = Pubkey::create_program_address(&[b"Talking", b"Squirrels"], &program_id).unwrap();
        let b = Pubkey::create_program_address(&[b"Talking", b"Squirrels"], &program_id).unwrap();
        let c = Pubkey::create_program_address(&[b"Talking"], &program_id).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_find_program_address_off_curve() {
        for _ in 0..1_000 {
            let program_id = Pubkey::new_unique();
            let (address, bump_seed) =
                Pubkey::find_program_address(&[b"Lil'", b"Bits"], &program_id);
            assert!(!address.is_on_curve());
            assert_eq!(
                address,
                Pubkey::create_program_address(&[b"Lil'", b"Bits", &[bump_seed]], &program_id)
                    .unwrap()
            );
        }
    }
}
