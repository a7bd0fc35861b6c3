//! Stable program log messages.
//!
//! The format of these log messages should not be modified to avoid breaking
//! downstream consumers of program logging.

use {
    crate::{ic_logger_msg, log_collector::LogCollector},
    sealevel_sdk::{instruction::InstructionError, pubkey::Pubkey},
    std::{cell::RefCell, rc::Rc},
};

/// Log a program invoke.
///
/// The general form is:
///
/// ```notrust
/// "Program <address> invoke [<depth>]"
/// ```
pub fn program_invoke(
    log_collector: &Option<Rc<RefCell<LogCollector>>>,
    program_id: &Pubkey,
    invoke_depth: usize,
) {
    ic_logger_msg!(log_collector, "Program {} invoke [{}]", program_id, invoke_depth);
}

/// Log successful program execution.
///
/// The general form is:
///
/// ```notrust
/// "Program <address> success"
/// ```
pub fn program_success(log_collector: &Option<Rc<RefCell<LogCollector>>>, program_id: &Pubkey) {
    ic_logger_msg!(log_collector, "Program {} success", program_id);
}

/// Log program execution failure.
///
/// The general form is:
///
/// ```notrust
/// "Program <address> failed: <program error details>"
/// ```
pub fn program_failure(
    log_collector: &Option<Rc<RefCell<LogCollector>>>,
    program_id: &Pubkey,
    err: &InstructionError,
) {
    ic_logger_msg!(log_collector, "Program {} failed: {}", program_id, err);
}
