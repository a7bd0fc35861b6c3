//! The system program: account creation, space allocation, owner assignment
//! and lamport transfers.
//!
//! Only the subset of the opcode table the runtime itself relies on is
//! processed here; the remaining opcodes decode (their wire discriminants are
//! stable) but are rejected.

use {
    sealevel_program_runtime::{ic_msg, invoke_context::InvokeContext},
    sealevel_sdk::{
        instruction::InstructionError,
        program_utils::limited_deserialize,
        pubkey::Pubkey,
        system_instruction::{SystemError, SystemInstruction, MAX_PERMITTED_DATA_LENGTH},
        system_program,
        transaction_context::{
            BorrowedAccount, IndexOfAccount, InstructionContext, TransactionContext,
        },
    },
    std::collections::HashSet,
};

pub const DEFAULT_COMPUTE_UNITS: u64 = 150;

/// Maximum input size for an instruction to deserialize, equal to the
/// serialized size limit of a transaction packet.
const MAX_INSTRUCTION_DATA_LEN: u64 = 1232;

fn get_signers(
    transaction_context: &TransactionContext,
    instruction_context: &InstructionContext,
) -> Result<HashSet<Pubkey>, InstructionError> {
    let mut signers = HashSet::new();
    for instruction_account_index in 0..instruction_context.get_number_of_instruction_accounts() {
        if instruction_context.is_instruction_account_signer(instruction_account_index)? {
            signers.insert(*transaction_context.get_key_of_account_at_index(
                instruction_context
                    .get_index_of_instruction_account_in_transaction(instruction_account_index)?,
            )?);
        }
    }
    Ok(signers)
}

fn allocate(
    account: &mut BorrowedAccount,
    address: &Pubkey,
    space: u64,
    signers: &HashSet<Pubkey>,
    invoke_context: &InvokeContext,
) -> Result<(), InstructionError> {
    if !signers.contains(address) {
        ic_msg!(invoke_context, "Allocate: 'to' account {} must sign", address);
        return Err(InstructionError::MissingRequiredSignature);
    }

    // if it looks like the `to` account is already in use, bail
    if !account.get_data().is_empty() || !system_program::check_id(account.get_owner()) {
        ic_msg!(invoke_context, "Allocate: account {} already in use", address);
        return Err(SystemError::AccountAlreadyInUse.into());
    }

    if space > MAX_PERMITTED_DATA_LENGTH {
        ic_msg!(
            invoke_context,
            "Allocate: requested {}, max allowed {}",
            space,
            MAX_PERMITTED_DATA_LENGTH
        );
        return Err(SystemError::InvalidAccountDataLength.into());
    }

    account.set_data_length(space as usize)?;

    Ok(())
}

fn assign(
    account: &mut BorrowedAccount,
    address: &Pubkey,
    owner: &Pubkey,
    signers: &HashSet<Pubkey>,
    invoke_context: &InvokeContext,
) -> Result<(), InstructionError> {
    // no work to do, just return
    if account.get_owner() == owner {
        return Ok(());
    }

    if !signers.contains(address) {
        ic_msg!(invoke_context, "Assign: account {} must sign", address);
        return Err(InstructionError::MissingRequiredSignature);
    }

    account.set_owner(owner)
}

fn allocate_and_assign(
    to: &mut BorrowedAccount,
    to_address: &Pubkey,
    space: u64,
    owner: &Pubkey,
    signers: &HashSet<Pubkey>,
    invoke_context: &InvokeContext,
) -> Result<(), InstructionError> {
    allocate(to, to_address, space, signers, invoke_context)?;
    assign(to, to_address, owner, signers, invoke_context)
}

#[allow(clippy::too_many_arguments)]
fn create_account(
    from_account_index: IndexOfAccount,
    to_account_index: IndexOfAccount,
    to_address: &Pubkey,
    lamports: u64,
    space: u64,
    owner: &Pubkey,
    signers: &HashSet<Pubkey>,
    invoke_context: &InvokeContext,
    transaction_context: &TransactionContext,
    instruction_context: &InstructionContext,
) -> Result<(), InstructionError> {
    // if it looks like the `to` account is already in use, bail
    {
        let mut to = instruction_context
            .try_borrow_instruction_account(transaction_context, to_account_index)?;
        if to.get_lamports() > 0 {
            ic_msg!(
                invoke_context,
                "Create Account: account {} already in use",
                to_address
            );
            return Err(SystemError::AccountAlreadyInUse.into());
        }

        allocate_and_assign(&mut to, to_address, space, owner, signers, invoke_context)?;
    }
    transfer(
        from_account_index,
        to_account_index,
        lamports,
        invoke_context,
        transaction_context,
        instruction_context,
    )
}

fn transfer_verified(
    from_account_index: IndexOfAccount,
    to_account_index: IndexOfAccount,
    lamports: u64,
    invoke_context: &InvokeContext,
    transaction_context: &TransactionContext,
    instruction_context: &InstructionContext,
) -> Result<(), InstructionError> {
    let mut from = instruction_context
        .try_borrow_instruction_account(transaction_context, from_account_index)?;
    if !from.get_data().is_empty() {
        ic_msg!(invoke_context, "Transfer: `from` must not carry data");
        return Err(InstructionError::InvalidArgument);
    }
    if lamports > from.get_lamports() {
        ic_msg!(
            invoke_context,
            "Transfer: insufficient lamports {}, need {}",
            from.get_lamports(),
            lamports
        );
        return Err(SystemError::ResultWithNegativeLamports.into());
    }

    from.checked_sub_lamports(lamports)?;
    drop(from);
    let mut to = instruction_context
        .try_borrow_instruction_account(transaction_context, to_account_index)?;
    to.checked_add_lamports(lamports)?;
    Ok(())
}

fn transfer(
    from_account_index: IndexOfAccount,
    to_account_index: IndexOfAccount,
    lamports: u64,
    invoke_context: &InvokeContext,
    transaction_context: &TransactionContext,
    instruction_context: &InstructionContext,
) -> Result<(), InstructionError> {
    if !instruction_context.is_instruction_account_signer(from_account_index)? {
        ic_msg!(
            invoke_context,
            "Transfer: `from` account {} must sign",
            transaction_context.get_key_of_account_at_index(
                instruction_context
                    .get_index_of_instruction_account_in_transaction(from_account_index)?,
            )?,
        );
        return Err(InstructionError::MissingRequiredSignature);
    }

    transfer_verified(
        from_account_index,
        to_account_index,
        lamports,
        invoke_context,
        transaction_context,
        instruction_context,
    )
}

pub fn process_instruction(invoke_context: &mut InvokeContext) -> Result<(), InstructionError> {
    invoke_context.consume_checked(DEFAULT_COMPUTE_UNITS)?;
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    let instruction_data = instruction_context.get_instruction_data();
    let instruction = limited_deserialize(instruction_data, MAX_INSTRUCTION_DATA_LEN)?;

    let signers = get_signers(transaction_context, instruction_context)?;
    match instruction {
        SystemInstruction::CreateAccount {
            lamports,
            space,
            owner,
        } => {
            instruction_context.check_number_of_instruction_accounts(2)?;
            let to_address = *transaction_context.get_key_of_account_at_index(
                instruction_context.get_index_of_instruction_account_in_transaction(1)?,
            )?;
            create_account(
                0,
                1,
                &to_address,
                lamports,
                space,
                &owner,
                &signers,
                invoke_context,
                transaction_context,
                instruction_context,
            )
        }
        SystemInstruction::Assign { owner } => {
            instruction_context.check_number_of_instruction_accounts(1)?;
            let mut account =
                instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
            let address = *transaction_context.get_key_of_account_at_index(
                instruction_context.get_index_of_instruction_account_in_transaction(0)?,
            )?;
            assign(&mut account, &address, &owner, &signers, invoke_context)
        }
        SystemInstruction::Transfer { lamports } => {
            instruction_context.check_number_of_instruction_accounts(2)?;
            transfer(
                0,
                1,
                lamports,
                invoke_context,
                transaction_context,
                instruction_context,
            )
        }
        SystemInstruction::Allocate { space } => {
            instruction_context.check_number_of_instruction_accounts(1)?;
            let mut account =
                instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
            let address = *transaction_context.get_key_of_account_at_index(
                instruction_context.get_index_of_instruction_account_in_transaction(0)?,
            )?;
            allocate(&mut account, &address, space, &signers, invoke_context)
        }
        _ => {
            ic_msg!(invoke_context, "Unsupported system instruction");
            Err(InstructionError::InvalidInstructionData)
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        sealevel_program_runtime::invoke_context::mock_process_instruction,
        sealevel_sdk::{
            account::{AccountSharedData, ReadableAccount, WritableAccount},
            instruction::AccountMeta,
            system_instruction,
        },
    };

    fn process_instruction(
        instruction_data: &[u8],
        transaction_accounts: Vec<(Pubkey, AccountSharedData)>,
        instruction_accounts: Vec<AccountMeta>,
        expected_result: Result<(), InstructionError>,
    ) -> Vec<AccountSharedData> {
        mock_process_instruction(
            &system_program::id(),
            Vec::new(),
            instruction_data,
            transaction_accounts,
            instruction_accounts,
            expected_result,
            super::process_instruction,
            |_invoke_context| {},
            |_invoke_context| {},
        )
    }

    #[test]
    fn test_create_account() {
        let new_owner = Pubkey::from([9; 32]);
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let from_account = AccountSharedData::new(100, 0, &system_program::id());
        let to_account = AccountSharedData::new(0, 0, &Pubkey::default());

        let accounts = process_instruction(
            &bincode::serialize(&SystemInstruction::CreateAccount {
                lamports: 50,
                space: 2,
                owner: new_owner,
            })
            .unwrap(),
            vec![(from, from_account), (to, to_account)],
            vec![
                AccountMeta::new(from, true),
                AccountMeta::new(to, true),
            ],
            Ok(()),
        );

        let from_lamports = accounts.first().unwrap().lamports();
        let to_lamports = accounts.get(1).unwrap().lamports();
        assert_eq!(from_lamports, 50);
        assert_eq!(to_lamports, 50);
        assert_eq!(accounts.get(1).unwrap().owner(), &new_owner);
        assert_eq!(accounts.get(1).unwrap().data(), &[0, 0]);
    }

    #[test]
    fn test_create_account_in_use() {
        let new_owner = Pubkey::new_unique();
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let from_account = AccountSharedData::new(100, 0, &system_program::id());
        // an account with lamports is in use
        let to_account = AccountSharedData::new(1, 0, &Pubkey::default());

        process_instruction(
            &bincode::serialize(&SystemInstruction::CreateAccount {
                lamports: 50,
                space: 2,
                owner: new_owner,
            })
            .unwrap(),
            vec![(from, from_account), (to, to_account)],
            vec![
                AccountMeta::new(from, true),
                AccountMeta::new(to, true),
            ],
            Err(SystemError::AccountAlreadyInUse.into()),
        );
    }

    #[test]
    fn test_create_account_missing_to_signature() {
        let new_owner = Pubkey::new_unique();
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let from_account = AccountSharedData::new(100, 0, &system_program::id());
        let to_account = AccountSharedData::new(0, 0, &Pubkey::default());

        process_instruction(
            &bincode::serialize(&SystemInstruction::CreateAccount {
                lamports: 50,
                space: 2,
                owner: new_owner,
            })
            .unwrap(),
            vec![(from, from_account), (to, to_account)],
            vec![
                AccountMeta::new(from, true),
                AccountMeta::new(to, false),
            ],
            Err(InstructionError::MissingRequiredSignature),
        );
    }

    #[test]
    fn test_create_account_data_too_large() {
        let new_owner = Pubkey::new_unique();
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let from_account = AccountSharedData::new(100, 0, &system_program::id());
        let to_account = AccountSharedData::new(0, 0, &Pubkey::default());

        process_instruction(
            &bincode::serialize(&SystemInstruction::CreateAccount {
                lamports: 50,
                space: MAX_PERMITTED_DATA_LENGTH.saturating_add(1),
                owner: new_owner,
            })
            .unwrap(),
            vec![(from, from_account), (to, to_account)],
            vec![
                AccountMeta::new(from, true),
                AccountMeta::new(to, true),
            ],
            Err(SystemError::InvalidAccountDataLength.into()),
        );
    }

    #[test]
    fn test_transfer_lamports() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let from_account = AccountSharedData::new(100, 0, &system_program::id());
        let to_account = AccountSharedData::new(1, 0, &Pubkey::new_unique());
        let transaction_accounts = vec![(from, from_account), (to, to_account)];
        let instruction_accounts = vec![
            AccountMeta::new(from, true),
            AccountMeta::new(to, false),
        ];

        let accounts = process_instruction(
            &bincode::serialize(&SystemInstruction::Transfer { lamports: 50 }).unwrap(),
            transaction_accounts.clone(),
            instruction_accounts.clone(),
            Ok(()),
        );
        assert_eq!(accounts.first().unwrap().lamports(), 50);
        assert_eq!(accounts.get(1).unwrap().lamports(), 51);

        // Attempt to move more lamports than are in the account
        process_instruction(
            &bincode::serialize(&SystemInstruction::Transfer { lamports: 101 }).unwrap(),
            transaction_accounts.clone(),
            instruction_accounts,
            Err(SystemError::ResultWithNegativeLamports.into()),
        );

        // `from` did not sign
        process_instruction(
            &bincode::serialize(&SystemInstruction::Transfer { lamports: 50 }).unwrap(),
            transaction_accounts,
            vec![
                AccountMeta::new(from, false),
                AccountMeta::new(to, false),
            ],
            Err(InstructionError::MissingRequiredSignature),
        );
    }

    #[test]
    fn test_transfer_with_data_fails() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let from_account = AccountSharedData::new(100, 1, &system_program::id());
        let to_account = AccountSharedData::new(1, 0, &Pubkey::new_unique());

        process_instruction(
            &bincode::serialize(&SystemInstruction::Transfer { lamports: 50 }).unwrap(),
            vec![(from, from_account), (to, to_account)],
            vec![
                AccountMeta::new(from, true),
                AccountMeta::new(to, false),
            ],
            Err(InstructionError::InvalidArgument),
        );
    }

    #[test]
    fn test_assign() {
        let new_owner = Pubkey::from([9; 32]);
        let pubkey = Pubkey::new_unique();
        let account = AccountSharedData::new(100, 0, &system_program::id());

        // owner does not change, no signature needed
        process_instruction(
            &bincode::serialize(&SystemInstruction::Assign {
                owner: system_program::id(),
            })
            .unwrap(),
            vec![(pubkey, account.clone())],
            vec![AccountMeta::new(pubkey, false)],
            Ok(()),
        );

        // missing signature
        process_instruction(
            &bincode::serialize(&SystemInstruction::Assign { owner: new_owner }).unwrap(),
            vec![(pubkey, account.clone())],
            vec![AccountMeta::new(pubkey, false)],
            Err(InstructionError::MissingRequiredSignature),
        );

        let accounts = process_instruction(
            &bincode::serialize(&SystemInstruction::Assign { owner: new_owner }).unwrap(),
            vec![(pubkey, account)],
            vec![AccountMeta::new(pubkey, true)],
            Ok(()),
        );
        assert_eq!(accounts.first().unwrap().owner(), &new_owner);
    }

    #[test]
    fn test_allocate() {
        let pubkey = Pubkey::new_unique();
        let account = AccountSharedData::new(100, 0, &system_program::id());

        let accounts = process_instruction(
            &bincode::serialize(&SystemInstruction::Allocate { space: 8 }).unwrap(),
            vec![(pubkey, account.clone())],
            vec![AccountMeta::new(pubkey, true)],
            Ok(()),
        );
        assert_eq!(accounts.first().unwrap().data().len(), 8);

        // an account with data is in use
        let mut account_in_use = account;
        account_in_use.set_data(vec![1]);
        process_instruction(
            &bincode::serialize(&SystemInstruction::Allocate { space: 8 }).unwrap(),
            vec![(pubkey, account_in_use)],
            vec![AccountMeta::new(pubkey, true)],
            Err(SystemError::AccountAlreadyInUse.into()),
        );
    }

    #[test]
    fn test_nonce_instructions_are_rejected() {
        let pubkey = Pubkey::new_unique();
        let account = AccountSharedData::new(100, 0, &system_program::id());

        process_instruction(
            &bincode::serialize(&SystemInstruction::AdvanceNonceAccount).unwrap(),
            vec![(pubkey, account)],
            vec![AccountMeta::new(pubkey, true)],
            Err(InstructionError::InvalidInstructionData),
        );
    }

    #[test]
    fn test_create_account_via_builder_round_trips() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let instruction = system_instruction::create_account(&from, &to, 1, 2, &Pubkey::default());
        assert_eq!(instruction.program_id, system_program::id());
        let decoded: SystemInstruction = bincode::deserialize(&instruction.data).unwrap();
        assert_eq!(
            decoded,
            SystemInstruction::CreateAccount {
                lamports: 1,
                space: 2,
                owner: Pubkey::default(),
            }
        );
    }
}
