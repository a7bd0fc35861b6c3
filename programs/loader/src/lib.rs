//! The upgradeable bytecode loader.
//!
//! Owns the lifecycle of deployable programs: buffers of candidate bytecode
//! are created and written, promoted into executable programs, upgraded in
//! place, handed between authorities, extended and closed. Executing the
//! deployed bytecode is the execution engine's concern; the loader only
//! admits verified images into the per-transaction program cache.

#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::indexing_slicing)]

use {
    sealevel_program_runtime::{
        ic_logger_msg, ic_msg,
        invoke_context::InvokeContext,
        loaded_programs::{LoadedProgram, LoadedProgramType},
        log_collector::LogCollector,
        sysvar_cache::get_sysvar_with_account_check,
    },
    sealevel_sdk::{
        bpf_loader, bpf_loader_deprecated,
        bpf_loader_upgradeable::{self, UpgradeableLoaderState},
        clock::Slot,
        feature_set::{
            deprecate_executable_meta_update_in_bpf_loader,
            enable_bpf_loader_extend_program_ix, enable_bpf_loader_set_authority_checked_ix,
        },
        instruction::{AccountMeta, InstructionError},
        loader_upgradeable_instruction::UpgradeableLoaderInstruction,
        native_loader,
        program_utils::limited_deserialize,
        pubkey::Pubkey,
        system_instruction::{self, MAX_PERMITTED_DATA_LENGTH},
        transaction_context::{InstructionContext, TransactionContext},
    },
    std::{
        cell::RefCell,
        rc::Rc,
        sync::{atomic::Ordering, Arc},
    },
};

pub const DEFAULT_LOADER_COMPUTE_UNITS: u64 = 570;
pub const DEPRECATED_LOADER_COMPUTE_UNITS: u64 = 1_140;
pub const UPGRADEABLE_LOADER_COMPUTE_UNITS: u64 = 2_370;

/// Maximum input size for an instruction to deserialize, equal to the
/// serialized size limit of a transaction packet.
const MAX_INSTRUCTION_DATA_LEN: u64 = 1232;

pub fn check_loader_id(id: &Pubkey) -> bool {
    bpf_loader::check_id(id)
        || bpf_loader_deprecated::check_id(id)
        || bpf_loader_upgradeable::check_id(id)
}

/// Runs deployment verification over a program image and turns it into a
/// cache entry.
pub fn load_program_from_bytes(
    log_collector: Option<Rc<RefCell<LogCollector>>>,
    program_bytes: &[u8],
    loader_key: &Pubkey,
    account_size: usize,
    deployment_slot: Slot,
) -> Result<LoadedProgram, InstructionError> {
    LoadedProgram::new(loader_key, deployment_slot, account_size, program_bytes).map_err(|err| {
        ic_logger_msg!(log_collector, "{:?}", err);
        InstructionError::InvalidAccountData
    })
}

/// Verifies the new program bytes and replaces the program's entry in the
/// per-transaction cache.
///
/// Runs before any observable account mutation in every path that redeploys
/// bytecode, so a rejected image aborts the instruction cleanly.
macro_rules! deploy_program {
    ($invoke_context:expr, $program_id:expr, $loader_key:expr,
     $account_size:expr, $slot:expr, $cleanup:block, $program_bytes:expr $(,)?) => {{
        let entry = load_program_from_bytes(
            $invoke_context.get_log_collector(),
            $program_bytes,
            $loader_key,
            $account_size,
            $slot,
        )?;
        if let Some(replaced) = $invoke_context.find_program_in_cache(&$program_id) {
            entry
                .ix_usage_counter
                .store(replaced.ix_usage_counter.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        $cleanup
        $invoke_context
            .programs_modified_by_tx
            .replenish($program_id, Arc::new(entry));
    }};
}

/// The account's current authority must be present, match the provided key
/// and have signed the instruction.
fn check_authority(
    current_authority: &Option<Pubkey>,
    provided_authority: &Pubkey,
    authority_is_signer: bool,
    log_collector: &Option<Rc<RefCell<LogCollector>>>,
) -> Result<(), InstructionError> {
    let Some(current_authority) = current_authority else {
        ic_logger_msg!(log_collector, "Authority was revoked, the account is immutable");
        return Err(InstructionError::Immutable);
    };
    if current_authority != provided_authority {
        ic_logger_msg!(log_collector, "Provided authority does not match");
        return Err(InstructionError::IncorrectAuthority);
    }
    if !authority_is_signer {
        ic_logger_msg!(log_collector, "Signature of the authority is missing");
        return Err(InstructionError::MissingRequiredSignature);
    }
    Ok(())
}

/// Copies `bytes` into the account at instruction index zero, starting at
/// `offset` into its data.
fn write_program_data(
    offset: usize,
    bytes: &[u8],
    invoke_context: &mut InvokeContext,
) -> Result<(), InstructionError> {
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    let mut account = instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
    let end_offset = offset.saturating_add(bytes.len());
    account
        .get_data_mut()?
        .get_mut(offset..end_offset)
        .ok_or_else(|| {
            ic_msg!(
                invoke_context,
                "Write of {} bytes at offset {} overflows the account",
                bytes.len(),
                offset
            );
            InstructionError::AccountDataTooSmall
        })?
        .copy_from_slice(bytes);
    Ok(())
}

pub fn process_instruction(invoke_context: &mut InvokeContext) -> Result<(), InstructionError> {
    let log_collector = invoke_context.get_log_collector();
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    let program_account =
        instruction_context.try_borrow_last_program_account(transaction_context)?;

    // Management instructions address one of the loaders directly. Compute is
    // charged up front, which for the legacy loaders is all that remains of
    // them.
    if native_loader::check_id(program_account.get_owner()) {
        let program_id = *program_account.get_key();
        drop(program_account);
        if bpf_loader_upgradeable::check_id(&program_id) {
            invoke_context.consume_checked(UPGRADEABLE_LOADER_COMPUTE_UNITS)?;
            return process_loader_upgradeable_instruction(invoke_context);
        }
        if bpf_loader::check_id(&program_id) {
            invoke_context.consume_checked(DEFAULT_LOADER_COMPUTE_UNITS)?;
            ic_logger_msg!(
                log_collector,
                "Management instructions of the legacy loader are not supported"
            );
            return Err(InstructionError::UnsupportedProgramId);
        }
        if bpf_loader_deprecated::check_id(&program_id) {
            invoke_context.consume_checked(DEPRECATED_LOADER_COMPUTE_UNITS)?;
            ic_logger_msg!(
                log_collector,
                "Management instructions of the deprecated loader are not supported"
            );
            return Err(InstructionError::UnsupportedProgramId);
        }
        ic_logger_msg!(log_collector, "Not a loader program id");
        return Err(InstructionError::IncorrectProgramId);
    }

    // Anything else is the invocation of an already deployed program
    if !program_account.is_executable() {
        ic_logger_msg!(log_collector, "Program account is not executable");
        return Err(InstructionError::UnsupportedProgramId);
    }
    let program_key = *program_account.get_key();
    drop(program_account);

    let Some(entry) = invoke_context.find_program_in_cache(&program_key) else {
        ic_logger_msg!(log_collector, "Program {} is not loaded", program_key);
        return Err(InstructionError::InvalidAccountData);
    };
    entry.ix_usage_counter.fetch_add(1, Ordering::Relaxed);
    match &entry.program {
        // Running the verified image belongs to the execution engine
        LoadedProgramType::Verified(_) => Ok(()),
        LoadedProgramType::FailedVerification | LoadedProgramType::Closed => {
            ic_logger_msg!(log_collector, "Program {} is not deployed", program_key);
            Err(InstructionError::InvalidAccountData)
        }
        LoadedProgramType::Builtin(_) => Err(InstructionError::IncorrectProgramId),
    }
}

fn process_loader_upgradeable_instruction(
    invoke_context: &mut InvokeContext,
) -> Result<(), InstructionError> {
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    match limited_deserialize(
        instruction_context.get_instruction_data(),
        MAX_INSTRUCTION_DATA_LEN,
    )? {
        UpgradeableLoaderInstruction::InitializeBuffer => {
            process_initialize_buffer(invoke_context)
        }
        UpgradeableLoaderInstruction::Write { offset, bytes } => {
            process_write(invoke_context, offset, &bytes)
        }
        UpgradeableLoaderInstruction::DeployWithMaxDataLen { max_data_len } => {
            process_deploy_with_max_data_len(invoke_context, max_data_len)
        }
        UpgradeableLoaderInstruction::Upgrade => process_upgrade(invoke_context),
        UpgradeableLoaderInstruction::SetAuthority => {
            process_set_authority(invoke_context, false)
        }
        UpgradeableLoaderInstruction::SetAuthorityChecked => {
            if !invoke_context
                .feature_set
                .is_active(&enable_bpf_loader_set_authority_checked_ix::id())
            {
                return Err(InstructionError::InvalidInstructionData);
            }
            process_set_authority(invoke_context, true)
        }
        UpgradeableLoaderInstruction::Close => process_close(invoke_context),
        UpgradeableLoaderInstruction::ExtendProgram { additional_bytes } => {
            if !invoke_context
                .feature_set
                .is_active(&enable_bpf_loader_extend_program_ix::id())
            {
                return Err(InstructionError::InvalidInstructionData);
            }
            process_extend_program(invoke_context, additional_bytes)
        }
    }
}

fn process_initialize_buffer(invoke_context: &mut InvokeContext) -> Result<(), InstructionError> {
    let log_collector = invoke_context.get_log_collector();
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    instruction_context.check_number_of_instruction_accounts(2)?;

    let mut buffer = instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
    if !matches!(buffer.get_state()?, UpgradeableLoaderState::Uninitialized) {
        ic_logger_msg!(log_collector, "Account is already initialized");
        return Err(InstructionError::AccountAlreadyInitialized);
    }

    let authority_key = *transaction_context.get_key_of_account_at_index(
        instruction_context.get_index_of_instruction_account_in_transaction(1)?,
    )?;
    buffer.set_state(&UpgradeableLoaderState::Buffer {
        authority_address: Some(authority_key),
    })
}

fn process_write(
    invoke_context: &mut InvokeContext,
    offset: u32,
    bytes: &[u8],
) -> Result<(), InstructionError> {
    let log_collector = invoke_context.get_log_collector();
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    instruction_context.check_number_of_instruction_accounts(2)?;

    {
        let buffer =
            instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
        let UpgradeableLoaderState::Buffer { authority_address } = buffer.get_state()? else {
            ic_logger_msg!(log_collector, "Not a buffer account");
            return Err(InstructionError::InvalidAccountData);
        };
        let authority_key = *transaction_context.get_key_of_account_at_index(
            instruction_context.get_index_of_instruction_account_in_transaction(1)?,
        )?;
        check_authority(
            &authority_address,
            &authority_key,
            instruction_context.is_instruction_account_signer(1)?,
            &log_collector,
        )?;
    }

    write_program_data(
        UpgradeableLoaderState::size_of_buffer_metadata().saturating_add(offset as usize),
        bytes,
        invoke_context,
    )
}

fn process_deploy_with_max_data_len(
    invoke_context: &mut InvokeContext,
    max_data_len: usize,
) -> Result<(), InstructionError> {
    let log_collector = invoke_context.get_log_collector();
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    let program_id = *instruction_context.get_last_program_key(transaction_context)?;

    instruction_context.check_number_of_instruction_accounts(4)?;
    let rent = get_sysvar_with_account_check::rent(invoke_context, instruction_context, 4)?;
    let clock = get_sysvar_with_account_check::clock(invoke_context, instruction_context, 5)?;
    instruction_context.check_number_of_instruction_accounts(8)?;
    let payer_key = *transaction_context.get_key_of_account_at_index(
        instruction_context.get_index_of_instruction_account_in_transaction(0)?,
    )?;
    let programdata_key = *transaction_context.get_key_of_account_at_index(
        instruction_context.get_index_of_instruction_account_in_transaction(1)?,
    )?;
    let authority_key = *transaction_context.get_key_of_account_at_index(
        instruction_context.get_index_of_instruction_account_in_transaction(7)?,
    )?;

    // The program account must be fresh, large enough for its header and
    // rent exempt
    let program_key = {
        let program =
            instruction_context.try_borrow_instruction_account(transaction_context, 2)?;
        if !matches!(program.get_state()?, UpgradeableLoaderState::Uninitialized) {
            ic_logger_msg!(log_collector, "Program account is already initialized");
            return Err(InstructionError::AccountAlreadyInitialized);
        }
        if program.get_data().len() < UpgradeableLoaderState::size_of_program() {
            ic_logger_msg!(log_collector, "Program account is too small");
            return Err(InstructionError::AccountDataTooSmall);
        }
        if program.get_lamports() < rent.minimum_balance(program.get_data().len()) {
            ic_logger_msg!(log_collector, "Program account is not rent exempt");
            return Err(InstructionError::ExecutableAccountNotRentExempt);
        }
        *program.get_key()
    };

    // The buffer must hold at least one byte of bytecode, and its authority,
    // while it still has one, must be the deploying authority
    let buffer_payload_offset = UpgradeableLoaderState::size_of_buffer_metadata();
    let (buffer_key, payload_len) = {
        let buffer =
            instruction_context.try_borrow_instruction_account(transaction_context, 3)?;
        match buffer.get_state()? {
            UpgradeableLoaderState::Buffer { authority_address } => {
                if let Some(buffer_authority) = authority_address {
                    if buffer_authority != authority_key {
                        ic_logger_msg!(
                            log_collector,
                            "Buffer authority does not match the deploy authority"
                        );
                        return Err(InstructionError::IncorrectAuthority);
                    }
                }
                if !instruction_context.is_instruction_account_signer(7)? {
                    ic_logger_msg!(log_collector, "Deploy authority did not sign");
                    return Err(InstructionError::MissingRequiredSignature);
                }
            }
            _ => {
                ic_logger_msg!(log_collector, "Source is not a buffer account");
                return Err(InstructionError::InvalidArgument);
            }
        }
        let payload_len = buffer.get_data().len().saturating_sub(buffer_payload_offset);
        if buffer.get_data().len() < buffer_payload_offset || payload_len == 0 {
            ic_logger_msg!(log_collector, "Buffer account holds no bytecode");
            return Err(InstructionError::InvalidAccountData);
        }
        (*buffer.get_key(), payload_len)
    };
    if max_data_len < payload_len {
        ic_logger_msg!(log_collector, "Max data length cannot hold the buffer contents");
        return Err(InstructionError::AccountDataTooSmall);
    }
    let programdata_len = UpgradeableLoaderState::size_of_programdata(max_data_len);
    if programdata_len > MAX_PERMITTED_DATA_LENGTH as usize {
        ic_logger_msg!(log_collector, "Max data length exceeds the account size limit");
        return Err(InstructionError::InvalidArgument);
    }

    // The programdata account lives at the address derived from the program
    // account, so the loader alone can sign for its creation
    let (derived_programdata_key, bump_seed) =
        Pubkey::find_program_address(&[program_key.as_ref()], &program_id);
    if programdata_key != derived_programdata_key {
        ic_logger_msg!(log_collector, "ProgramData address did not match the derived address");
        return Err(InstructionError::InvalidArgument);
    }

    // The buffer refunds the payer, which in turn funds the programdata
    // account below
    {
        let mut payer =
            instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
        let mut buffer =
            instruction_context.try_borrow_instruction_account(transaction_context, 3)?;
        let drained = buffer.get_lamports();
        payer.checked_add_lamports(drained)?;
        buffer.set_lamports(0)?;
    }

    let mut create_account = system_instruction::create_account(
        &payer_key,
        &programdata_key,
        rent.minimum_balance(programdata_len).max(1),
        programdata_len as u64,
        &program_id,
    );
    // the buffer rides along so the nested lamport accounting sees the drain
    create_account
        .accounts
        .push(AccountMeta::new(buffer_key, false));
    let programdata_signer =
        Pubkey::create_program_address(&[program_key.as_ref(), &[bump_seed]], &program_id)?;
    invoke_context.native_invoke(create_account, &[programdata_signer])?;

    // Verify the staged bytecode before any of it becomes observable
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    let buffer = instruction_context.try_borrow_instruction_account(transaction_context, 3)?;
    deploy_program!(
        invoke_context,
        program_key,
        &program_id,
        UpgradeableLoaderState::size_of_program().saturating_add(programdata_len),
        clock.slot,
        {
            drop(buffer);
        },
        buffer
            .get_data()
            .get(buffer_payload_offset..)
            .ok_or(InstructionError::AccountDataTooSmall)?,
    );
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;

    // Move the bytecode out of the buffer into the fresh programdata account
    let programdata_payload_offset = UpgradeableLoaderState::size_of_programdata_metadata();
    {
        let mut programdata =
            instruction_context.try_borrow_instruction_account(transaction_context, 1)?;
        let mut buffer =
            instruction_context.try_borrow_instruction_account(transaction_context, 3)?;
        programdata.set_state(&UpgradeableLoaderState::ProgramData {
            slot: clock.slot,
            upgrade_authority_address: Some(authority_key),
        })?;
        let payload_end = programdata_payload_offset.saturating_add(payload_len);
        programdata
            .get_data_mut()?
            .get_mut(programdata_payload_offset..payload_end)
            .ok_or(InstructionError::AccountDataTooSmall)?
            .copy_from_slice(
                buffer
                    .get_data()
                    .get(buffer_payload_offset..)
                    .ok_or(InstructionError::AccountDataTooSmall)?,
            );
        buffer.set_data_length(UpgradeableLoaderState::size_of_buffer(0))?;
    }

    // Bind the program account to its programdata account
    {
        let mut program =
            instruction_context.try_borrow_instruction_account(transaction_context, 2)?;
        program.set_state(&UpgradeableLoaderState::Program {
            programdata_address: programdata_key,
        })?;
        if !invoke_context
            .feature_set
            .is_active(&deprecate_executable_meta_update_in_bpf_loader::id())
        {
            program.set_executable(true)?;
        }
    }

    ic_logger_msg!(log_collector, "Deployed program {:?}", program_key);
    Ok(())
}

fn process_upgrade(invoke_context: &mut InvokeContext) -> Result<(), InstructionError> {
    let log_collector = invoke_context.get_log_collector();
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    let program_id = *instruction_context.get_last_program_key(transaction_context)?;

    instruction_context.check_number_of_instruction_accounts(3)?;
    let programdata_key = *transaction_context.get_key_of_account_at_index(
        instruction_context.get_index_of_instruction_account_in_transaction(0)?,
    )?;
    let rent = get_sysvar_with_account_check::rent(invoke_context, instruction_context, 4)?;
    let clock = get_sysvar_with_account_check::clock(invoke_context, instruction_context, 5)?;
    instruction_context.check_number_of_instruction_accounts(7)?;
    let authority_key = *transaction_context.get_key_of_account_at_index(
        instruction_context.get_index_of_instruction_account_in_transaction(6)?,
    )?;

    // The program being upgraded must be a live program of this loader,
    // bound to the given programdata account
    let program_key = {
        let program =
            instruction_context.try_borrow_instruction_account(transaction_context, 1)?;
        if !program.is_executable() {
            ic_logger_msg!(log_collector, "Program account is not executable");
            return Err(InstructionError::AccountNotExecutable);
        }
        if !program.is_writable() {
            ic_logger_msg!(log_collector, "Program account is not writable");
            return Err(InstructionError::InvalidArgument);
        }
        if program.get_owner() != &program_id {
            ic_logger_msg!(log_collector, "Program account is not owned by the loader");
            return Err(InstructionError::IncorrectProgramId);
        }
        match program.get_state()? {
            UpgradeableLoaderState::Program {
                programdata_address,
            } if programdata_address == programdata_key => {}
            UpgradeableLoaderState::Program { .. } => {
                ic_logger_msg!(log_collector, "Program account is bound elsewhere");
                return Err(InstructionError::InvalidArgument);
            }
            _ => {
                ic_logger_msg!(log_collector, "Invalid program account");
                return Err(InstructionError::InvalidAccountData);
            }
        }
        *program.get_key()
    };

    // The buffer must carry the replacement bytecode and the upgrade
    // authority must own it
    let buffer_payload_offset = UpgradeableLoaderState::size_of_buffer_metadata();
    let (buffer_lamports, payload_len) = {
        let buffer =
            instruction_context.try_borrow_instruction_account(transaction_context, 2)?;
        match buffer.get_state()? {
            UpgradeableLoaderState::Buffer { authority_address } => {
                if authority_address != Some(authority_key) {
                    ic_logger_msg!(
                        log_collector,
                        "Buffer authority does not match the upgrade authority"
                    );
                    return Err(InstructionError::IncorrectAuthority);
                }
                if !instruction_context.is_instruction_account_signer(6)? {
                    ic_logger_msg!(log_collector, "Upgrade authority did not sign");
                    return Err(InstructionError::MissingRequiredSignature);
                }
            }
            _ => {
                ic_logger_msg!(log_collector, "Source is not a buffer account");
                return Err(InstructionError::InvalidArgument);
            }
        }
        let payload_len = buffer.get_data().len().saturating_sub(buffer_payload_offset);
        if buffer.get_data().len() < buffer_payload_offset || payload_len == 0 {
            ic_logger_msg!(log_collector, "Buffer account holds no bytecode");
            return Err(InstructionError::InvalidAccountData);
        }
        (buffer.get_lamports(), payload_len)
    };

    // The programdata account must fit the replacement, stay rent exempt
    // once the buffer balance folds in, and be held by the same authority
    let (required_balance, programdata_len) = {
        let programdata =
            instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
        let programdata_len = programdata.get_data().len();
        let required_balance = rent.minimum_balance(programdata_len).max(1);
        if programdata_len < UpgradeableLoaderState::size_of_programdata(payload_len) {
            ic_logger_msg!(log_collector, "ProgramData account is too small");
            return Err(InstructionError::AccountDataTooSmall);
        }
        if programdata
            .get_lamports()
            .saturating_add(buffer_lamports)
            < required_balance
        {
            ic_logger_msg!(log_collector, "Not enough lamports to keep the rent exemption");
            return Err(InstructionError::InsufficientFunds);
        }
        match programdata.get_state()? {
            UpgradeableLoaderState::ProgramData {
                slot,
                upgrade_authority_address,
            } => {
                if clock.slot == slot {
                    ic_logger_msg!(log_collector, "Program was already deployed in this slot");
                    return Err(InstructionError::InvalidArgument);
                }
                check_authority(
                    &upgrade_authority_address,
                    &authority_key,
                    instruction_context.is_instruction_account_signer(6)?,
                    &log_collector,
                )?;
            }
            _ => {
                ic_logger_msg!(log_collector, "Invalid programdata account");
                return Err(InstructionError::InvalidAccountData);
            }
        }
        (required_balance, programdata_len)
    };

    // Verify the staged bytecode before any of it becomes observable
    let buffer = instruction_context.try_borrow_instruction_account(transaction_context, 2)?;
    deploy_program!(
        invoke_context,
        program_key,
        &program_id,
        UpgradeableLoaderState::size_of_program().saturating_add(programdata_len),
        clock.slot,
        {
            drop(buffer);
        },
        buffer
            .get_data()
            .get(buffer_payload_offset..)
            .ok_or(InstructionError::AccountDataTooSmall)?,
    );
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;

    // Swap in the replacement bytecode and zero whatever remains of the old
    let programdata_payload_offset = UpgradeableLoaderState::size_of_programdata_metadata();
    let payload_end = programdata_payload_offset.saturating_add(payload_len);
    let mut programdata =
        instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
    programdata.set_state(&UpgradeableLoaderState::ProgramData {
        slot: clock.slot,
        upgrade_authority_address: Some(authority_key),
    })?;
    {
        let buffer =
            instruction_context.try_borrow_instruction_account(transaction_context, 2)?;
        programdata
            .get_data_mut()?
            .get_mut(programdata_payload_offset..payload_end)
            .ok_or(InstructionError::AccountDataTooSmall)?
            .copy_from_slice(
                buffer
                    .get_data()
                    .get(buffer_payload_offset..)
                    .ok_or(InstructionError::AccountDataTooSmall)?,
            );
    }
    programdata
        .get_data_mut()?
        .get_mut(payload_end..)
        .ok_or(InstructionError::AccountDataTooSmall)?
        .fill(0);

    // Settle the lamports: the programdata account keeps its rent exemption,
    // the buffer empties, and the remainder spills
    let mut buffer = instruction_context.try_borrow_instruction_account(transaction_context, 2)?;
    let mut spill = instruction_context.try_borrow_instruction_account(transaction_context, 3)?;
    let spill_amount = programdata
        .get_lamports()
        .saturating_add(buffer_lamports)
        .saturating_sub(required_balance);
    spill.checked_add_lamports(spill_amount)?;
    buffer.set_lamports(0)?;
    programdata.set_lamports(required_balance)?;
    buffer.set_data_length(UpgradeableLoaderState::size_of_buffer(0))?;

    ic_logger_msg!(log_collector, "Upgraded program {:?}", program_key);
    Ok(())
}

/// Transfers a buffer or programdata account to a new authority, or with no
/// new authority revokes it for good. `SetAuthorityChecked` additionally
/// requires the incoming authority to sign.
fn process_set_authority(
    invoke_context: &mut InvokeContext,
    require_new_signer: bool,
) -> Result<(), InstructionError> {
    let log_collector = invoke_context.get_log_collector();
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    instruction_context
        .check_number_of_instruction_accounts(if require_new_signer { 3 } else { 2 })?;

    let mut account = instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
    let current_authority_key = *transaction_context.get_key_of_account_at_index(
        instruction_context.get_index_of_instruction_account_in_transaction(1)?,
    )?;
    // the new authority account is optional, leaving it out revokes
    let new_authority_key = instruction_context
        .get_index_of_instruction_account_in_transaction(2)
        .and_then(|index_in_transaction| {
            transaction_context.get_key_of_account_at_index(index_in_transaction)
        })
        .ok()
        .copied();
    let authority_is_signer = instruction_context.is_instruction_account_signer(1)?;

    match account.get_state()? {
        UpgradeableLoaderState::Buffer { authority_address } => {
            if new_authority_key.is_none() {
                ic_logger_msg!(log_collector, "Buffer authority is not optional");
                return Err(InstructionError::IncorrectAuthority);
            }
            check_authority(
                &authority_address,
                &current_authority_key,
                authority_is_signer,
                &log_collector,
            )?;
            if require_new_signer && !instruction_context.is_instruction_account_signer(2)? {
                ic_logger_msg!(log_collector, "New authority did not sign");
                return Err(InstructionError::MissingRequiredSignature);
            }
            account.set_state(&UpgradeableLoaderState::Buffer {
                authority_address: new_authority_key,
            })?;
        }
        UpgradeableLoaderState::ProgramData {
            slot,
            upgrade_authority_address,
        } => {
            check_authority(
                &upgrade_authority_address,
                &current_authority_key,
                authority_is_signer,
                &log_collector,
            )?;
            if require_new_signer && !instruction_context.is_instruction_account_signer(2)? {
                ic_logger_msg!(log_collector, "New authority did not sign");
                return Err(InstructionError::MissingRequiredSignature);
            }
            account.set_state(&UpgradeableLoaderState::ProgramData {
                slot,
                upgrade_authority_address: new_authority_key,
            })?;
        }
        _ => {
            ic_logger_msg!(log_collector, "Account does not carry an authority");
            return Err(InstructionError::InvalidArgument);
        }
    }

    ic_logger_msg!(log_collector, "Set authority to {:?}", new_authority_key);
    Ok(())
}

fn process_close(invoke_context: &mut InvokeContext) -> Result<(), InstructionError> {
    let log_collector = invoke_context.get_log_collector();
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    let program_id = *instruction_context.get_last_program_key(transaction_context)?;

    instruction_context.check_number_of_instruction_accounts(2)?;
    if instruction_context.get_index_of_instruction_account_in_transaction(0)?
        == instruction_context.get_index_of_instruction_account_in_transaction(1)?
    {
        ic_logger_msg!(log_collector, "Lamports of a closed account cannot be paid to itself");
        return Err(InstructionError::InvalidArgument);
    }

    let mut close_account =
        instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
    let close_key = *close_account.get_key();
    let close_account_state = close_account.get_state()?;
    // whatever it held before, a closed account shrinks to a bare tag
    close_account.set_data_length(UpgradeableLoaderState::size_of_uninitialized())?;
    match close_account_state {
        UpgradeableLoaderState::Uninitialized => {
            let mut recipient =
                instruction_context.try_borrow_instruction_account(transaction_context, 1)?;
            recipient.checked_add_lamports(close_account.get_lamports())?;
            close_account.set_lamports(0)?;

            ic_logger_msg!(log_collector, "Closed Uninitialized {}", close_key);
        }
        UpgradeableLoaderState::Buffer { authority_address } => {
            instruction_context.check_number_of_instruction_accounts(3)?;
            drop(close_account);
            drain_closed_account(
                &authority_address,
                transaction_context,
                instruction_context,
                &log_collector,
            )?;

            ic_logger_msg!(log_collector, "Closed Buffer {}", close_key);
        }
        UpgradeableLoaderState::ProgramData {
            slot,
            upgrade_authority_address,
        } => {
            instruction_context.check_number_of_instruction_accounts(4)?;
            drop(close_account);

            // The paired program account is retired along with its bytecode
            let program_key = {
                let program =
                    instruction_context.try_borrow_instruction_account(transaction_context, 3)?;
                if !program.is_writable() {
                    ic_logger_msg!(log_collector, "Program account is not writable");
                    return Err(InstructionError::InvalidArgument);
                }
                if program.get_owner() != &program_id {
                    ic_logger_msg!(log_collector, "Program account is not owned by the loader");
                    return Err(InstructionError::IncorrectProgramId);
                }
                let clock = invoke_context.get_sysvar_cache().get_clock()?;
                if clock.slot == slot {
                    ic_logger_msg!(log_collector, "Program was already deployed in this slot");
                    return Err(InstructionError::InvalidArgument);
                }
                match program.get_state()? {
                    UpgradeableLoaderState::Program {
                        programdata_address,
                    } if programdata_address == close_key => {}
                    _ => {
                        ic_logger_msg!(
                            log_collector,
                            "Program account is not bound to the closed account"
                        );
                        return Err(InstructionError::InvalidArgument);
                    }
                }
                *program.get_key()
            };

            drain_closed_account(
                &upgrade_authority_address,
                transaction_context,
                instruction_context,
                &log_collector,
            )?;
            let tombstone_slot = invoke_context.get_sysvar_cache().get_clock()?.slot;
            invoke_context.programs_modified_by_tx.replenish(
                program_key,
                Arc::new(LoadedProgram::new_tombstone(
                    tombstone_slot,
                    LoadedProgramType::Closed,
                )),
            );

            ic_logger_msg!(log_collector, "Closed Program {}", program_key);
        }
        _ => {
            ic_logger_msg!(log_collector, "Account does not support closing");
            return Err(InstructionError::InvalidArgument);
        }
    }

    Ok(())
}

/// Pays the closed account's balance out to the recipient and rewrites it as
/// uninitialized, with the authority at instruction index two approving.
fn drain_closed_account(
    authority_address: &Option<Pubkey>,
    transaction_context: &TransactionContext,
    instruction_context: &InstructionContext,
    log_collector: &Option<Rc<RefCell<LogCollector>>>,
) -> Result<(), InstructionError> {
    let authority_key = *transaction_context.get_key_of_account_at_index(
        instruction_context.get_index_of_instruction_account_in_transaction(2)?,
    )?;
    check_authority(
        authority_address,
        &authority_key,
        instruction_context.is_instruction_account_signer(2)?,
        log_collector,
    )?;

    let mut close_account =
        instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
    let mut recipient =
        instruction_context.try_borrow_instruction_account(transaction_context, 1)?;
    recipient.checked_add_lamports(close_account.get_lamports())?;
    close_account.set_lamports(0)?;
    close_account.set_state(&UpgradeableLoaderState::Uninitialized)
}

fn process_extend_program(
    invoke_context: &mut InvokeContext,
    additional_bytes: u32,
) -> Result<(), InstructionError> {
    let log_collector = invoke_context.get_log_collector();
    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    let program_id = *instruction_context.get_last_program_key(transaction_context)?;

    if additional_bytes == 0 {
        ic_logger_msg!(log_collector, "Additional bytes must be greater than 0");
        return Err(InstructionError::InvalidInstructionData);
    }

    // Account layout: 0 programdata, 1 program, then the system program and
    // the payer, both only needed when the growth requires a rent top-up
    let programdata =
        instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
    let programdata_key = *programdata.get_key();
    if programdata.get_owner() != &program_id {
        ic_logger_msg!(log_collector, "ProgramData account is not owned by the loader");
        return Err(InstructionError::InvalidAccountOwner);
    }
    if !programdata.is_writable() {
        ic_logger_msg!(log_collector, "ProgramData account is not writable");
        return Err(InstructionError::InvalidArgument);
    }

    let program_key = {
        let program =
            instruction_context.try_borrow_instruction_account(transaction_context, 1)?;
        if !program.is_writable() {
            ic_logger_msg!(log_collector, "Program account is not writable");
            return Err(InstructionError::InvalidArgument);
        }
        if program.get_owner() != &program_id {
            ic_logger_msg!(log_collector, "Program account is not owned by the loader");
            return Err(InstructionError::InvalidAccountOwner);
        }
        match program.get_state()? {
            UpgradeableLoaderState::Program {
                programdata_address,
            } if programdata_address == programdata_key => {}
            UpgradeableLoaderState::Program { .. } => {
                ic_logger_msg!(log_collector, "Program account is bound elsewhere");
                return Err(InstructionError::InvalidArgument);
            }
            _ => {
                ic_logger_msg!(log_collector, "Invalid program account");
                return Err(InstructionError::InvalidAccountData);
            }
        }
        *program.get_key()
    };

    let old_len = programdata.get_data().len();
    let new_len = old_len.saturating_add(additional_bytes as usize);
    if new_len > MAX_PERMITTED_DATA_LENGTH as usize {
        ic_logger_msg!(
            log_collector,
            "Extending to {} bytes exceeds the {} byte account limit",
            new_len,
            MAX_PERMITTED_DATA_LENGTH
        );
        return Err(InstructionError::InvalidRealloc);
    }

    let clock_slot = invoke_context.get_sysvar_cache().get_clock()?.slot;
    let upgrade_authority_address = match programdata.get_state()? {
        UpgradeableLoaderState::ProgramData {
            slot,
            upgrade_authority_address,
        } => {
            if clock_slot == slot {
                ic_logger_msg!(log_collector, "Program was already extended in this slot");
                return Err(InstructionError::InvalidArgument);
            }
            if upgrade_authority_address.is_none() {
                ic_logger_msg!(log_collector, "An immutable program cannot be extended");
                return Err(InstructionError::Immutable);
            }
            upgrade_authority_address
        }
        _ => {
            ic_logger_msg!(log_collector, "Invalid programdata account");
            return Err(InstructionError::InvalidAccountData);
        }
    };

    let required_payment = {
        let rent = invoke_context.get_sysvar_cache().get_rent()?;
        rent.minimum_balance(new_len)
            .max(1)
            .saturating_sub(programdata.get_lamports())
    };

    // nothing may stay borrowed across the nested invocation
    drop(programdata);

    if required_payment > 0 {
        let payer_key = *transaction_context.get_key_of_account_at_index(
            instruction_context.get_index_of_instruction_account_in_transaction(3)?,
        )?;
        invoke_context.native_invoke(
            system_instruction::transfer(&payer_key, &programdata_key, required_payment),
            &[],
        )?;
    }

    let transaction_context = &invoke_context.transaction_context;
    let instruction_context = transaction_context.get_current_instruction_context()?;
    let mut programdata =
        instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
    programdata.set_data_length(new_len)?;

    // The grown image has to pass verification like any other deployment
    deploy_program!(
        invoke_context,
        program_key,
        &program_id,
        UpgradeableLoaderState::size_of_program().saturating_add(new_len),
        clock_slot,
        {
            drop(programdata);
        },
        programdata
            .get_data()
            .get(UpgradeableLoaderState::size_of_programdata_metadata()..)
            .ok_or(InstructionError::AccountDataTooSmall)?,
    );

    let mut programdata =
        instruction_context.try_borrow_instruction_account(transaction_context, 0)?;
    programdata.set_state(&UpgradeableLoaderState::ProgramData {
        slot: clock_slot,
        upgrade_authority_address,
    })?;

    ic_logger_msg!(
        log_collector,
        "Extended program data by {} bytes",
        additional_bytes
    );
    Ok(())
}

pub mod test_utils {
    use {super::*, sealevel_sdk::account::ReadableAccount};

    /// Seeds the per-transaction cache from every loader-owned account, the
    /// way the bank primes it when the transaction is loaded.
    pub fn load_all_invoked_programs(invoke_context: &mut InvokeContext) {
        for index in 0..invoke_context.transaction_context.get_number_of_accounts() {
            let (program_key, loaded_program) = {
                let account = invoke_context
                    .transaction_context
                    .get_account_at_index(index)
                    .unwrap()
                    .borrow();
                if !check_loader_id(account.owner()) {
                    continue;
                }
                let program_key = *invoke_context
                    .transaction_context
                    .get_key_of_account_at_index(index)
                    .unwrap();
                let Ok(loaded_program) = load_program_from_bytes(
                    None,
                    account.data(),
                    account.owner(),
                    account.data().len(),
                    0,
                ) else {
                    continue;
                };
                (program_key, loaded_program)
            };
            invoke_context
                .programs_modified_by_tx
                .replenish(program_key, Arc::new(loaded_program));
        }
    }
}
