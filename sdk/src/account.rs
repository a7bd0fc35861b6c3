use {
    crate::{
        clock::Epoch,
        instruction::InstructionError,
        pubkey::Pubkey,
        sysvar::{Sysvar, SysvarId},
    },
    serde_derive::{Deserialize, Serialize},
};

/// An account record as stored in the ledger.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct Account {
    /// Lamports in the account.
    pub lamports: u64,
    /// Data held in this account.
    pub data: Vec<u8>,
    /// The program that owns this account. If executable, the program that loads this account.
    pub owner: Pubkey,
    /// This account's data contains a loaded program (and is now read-only).
    pub executable: bool,
    /// The epoch at which this account will next owe rent.
    pub rent_epoch: Epoch,
}

/// An account record held by a transaction in flight. Mutations go through
/// the accessor methods so invariants stay enforceable at the borrow layer.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct AccountSharedData {
    lamports: u64,
    data: Vec<u8>,
    owner: Pubkey,
    executable: bool,
    rent_epoch: Epoch,
}

impl From<AccountSharedData> for Account {
    fn from(other: AccountSharedData) -> Self {
        Self {
            lamports: other.lamports,
            data: other.data,
            owner: other.owner,
            executable: other.executable,
            rent_epoch: other.rent_epoch,
        }
    }
}

impl From<Account> for AccountSharedData {
    fn from(other: Account) -> Self {
        Self {
            lamports: other.lamports,
            data: other.data,
            owner: other.owner,
            executable: other.executable,
            rent_epoch: other.rent_epoch,
        }
    }
}

pub trait ReadableAccount: Sized {
    fn lamports(&self) -> u64;
    fn data(&self) -> &[u8];
    fn owner(&self) -> &Pubkey;
    fn executable(&self) -> bool;
    fn rent_epoch(&self) -> Epoch;
}

pub trait WritableAccount: ReadableAccount {
    fn set_lamports(&mut self, lamports: u64);
    fn checked_add_lamports(&mut self, lamports: u64) -> Result<(), InstructionError> {
        self.set_lamports(
            self.lamports()
                .checked_add(lamports)
                .ok_or(InstructionError::ArithmeticOverflow)?,
        );
        Ok(())
    }
    fn checked_sub_lamports(&mut self, lamports: u64) -> Result<(), InstructionError> {
        self.set_lamports(
            self.lamports()
                .checked_sub(lamports)
                .ok_or(InstructionError::ArithmeticOverflow)?,
        );
        Ok(())
    }
    fn set_data(&mut self, data: Vec<u8>);
    fn data_as_mut_slice(&mut self) -> &mut [u8];
    fn set_owner(&mut self, owner: Pubkey);
    fn set_executable(&mut self, executable: bool);
    fn set_rent_epoch(&mut self, epoch: Epoch);
    fn create(
        lamports: u64,
        data: Vec<u8>,
        owner: Pubkey,
        executable: bool,
        rent_epoch: Epoch,
    ) -> Self;
}

impl ReadableAccount for Account {
    fn lamports(&self) -> u64 {
        self.lamports
    }
    fn data(&self) -> &[u8] {
        &self.data
    }
    fn owner(&self) -> &Pubkey {
        &self.owner
    }
    fn executable(&self) -> bool {
        self.executable
    }
    fn rent_epoch(&self) -> Epoch {
        self.rent_epoch
    }
}

impl ReadableAccount for AccountSharedData {
    fn lamports(&self) -> u64 {
        self.lamports
    }
    fn data(&self) -> &[u8] {
        &self.data
    }
    fn owner(&self) -> &Pubkey {
        &self.owner
    }
    fn executable(&self) -> bool {
        self.executable
    }
    fn rent_epoch(&self) -> Epoch {
        self.rent_epoch
    }
}

impl WritableAccount for AccountSharedData {
    fn set_lamports(&mut self, lamports: u64) {
        self.lamports = lamports;
    }
    fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }
    fn data_as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
    fn set_owner(&mut self, owner: Pubkey) {
        self.owner = owner;
    }
    fn set_executable(&mut self, executable: bool) {
        self.executable = executable;
    }
    fn set_rent_epoch(&mut self, epoch: Epoch) {
        self.rent_epoch = epoch;
    }
    fn create(
        lamports: u64,
        data: Vec<u8>,
        owner: Pubkey,
        executable: bool,
        rent_epoch: Epoch,
    ) -> Self {
        Self {
            lamports,
            data,
            owner,
            executable,
            rent_epoch,
        }
    }
}

impl AccountSharedData {
    pub fn new(lamports: u64, space: usize, owner: &Pubkey) -> Self {
        Self::create(lamports, vec![0u8; space], *owner, false, Epoch::default())
    }

    /// Grows or shrinks the data, zero-filling any newly visible bytes.
    pub(crate) fn resize(&mut self, new_len: usize, value: u8) {
        self.data.resize(new_len, value);
    }
}

/// Creates the account a sysvar would live in, for use in tests.
pub fn create_account_shared_data_for_test<S>(sysvar: &S) -> AccountSharedData
where
    S: Sysvar + SysvarId,
{
    AccountSharedData::create(
        1,
        bincode::serialize(sysvar).unwrap(),
        crate::sysvar::id(),
        false,
        Epoch::default(),
    )
}
