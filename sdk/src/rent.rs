//! Configuration for network rent.

use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Copy, Clone, Debug)]
pub struct Rent {
    /// Rental rate in lamports per byte-year.
    pub lamports_per_byte_year: u64,
    /// Amount of time (in years) a balance must include rent for the account
    /// to be rent exempt.
    pub exemption_threshold: f64,
    /// The percentage of collected rent that is burned.
    pub burn_percent: u8,
}

/// Default rental rate in lamports/byte-year, based on:
/// 10^9 lamports per SEA, $1 per SEA, $0.01 per megabyte day, $3.65 per megabyte year.
pub const DEFAULT_LAMPORTS_PER_BYTE_YEAR: u64 = 1_000_000_000 / 100 * 365 / (1024 * 1024);

/// Default amount of time (in years) the balance has to include rent for.
pub const DEFAULT_EXEMPTION_THRESHOLD: f64 = 2.0;

/// Default percentage of collected rent that is burned.
pub const DEFAULT_BURN_PERCENT: u8 = 50;

/// Account storage overhead for calculation of base rent: the number of bytes
/// required to store an account with no data.
pub const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;

impl Default for Rent {
    fn default() -> Self {
        Self {
            lamports_per_byte_year: DEFAULT_LAMPORTS_PER_BYTE_YEAR,
            exemption_threshold: DEFAULT_EXEMPTION_THRESHOLD,
            burn_percent: DEFAULT_BURN_PERCENT,
        }
    }
}

impl Rent {
    /// Minimum balance due for rent-exemption of a given account data size.
    pub fn minimum_balance(&self, data_len: usize) -> u64 {
        let bytes = data_len as u64;
        (((ACCOUNT_STORAGE_OVERHEAD + bytes) * self.lamports_per_byte_year) as f64
            * self.exemption_threshold) as u64
    }

    /// Whether a given balance and data size is exempt from rent collection.
    pub fn is_exempt(&self, balance: u64, data_len: usize) -> bool {
        balance >= self.minimum_balance(data_len)
    }

    /// A rent configuration that collects no rent, for tests.
    pub fn free() -> Self {
        Self {
            lamports_per_byte_year: 0,
            ..Rent::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_balance_scales_with_data_len() {
        let rent = Rent::default();
        assert!(rent.minimum_balance(0) > 0);
        assert!(rent.minimum_balance(100) > rent.minimum_balance(10));
        assert!(rent.is_exempt(rent.minimum_balance(365), 365));
        assert!(!rent.is_exempt(rent.minimum_balance(365) - 1, 365));
    }
}
