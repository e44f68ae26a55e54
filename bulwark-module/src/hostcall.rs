use crate::error::Error;
use crate::types::Signature;

/// Results are returned in registers, which bounds how many a hostcall may have.
pub const MAX_HOSTCALL_RESULTS: usize = 2;

/// Prefix of the symbol of the trampoline standing in for a hostcall.
pub const TRAMPOLINE_SYM_PREFIX: &str = "bulwark_trampoline_";

/// Prefix of the symbol of a trampoline's trap table.
pub const TRAP_TABLE_SYM_PREFIX: &str = "bulwark_trap_table_";

pub fn trampoline_sym_for(hostcall_sym: &str) -> String {
    format!("{}{}", TRAMPOLINE_SYM_PREFIX, hostcall_sym)
}

pub fn trap_table_sym_for(func_sym: &str) -> String {
    format!("{}{}", TRAP_TABLE_SYM_PREFIX, func_sym)
}

/// Check that a hostcall can be given a trampoline.
///
/// Every trampoline backend applies this, so a hostcall is either accepted everywhere or
/// rejected everywhere.
pub fn validate_hostcall(symbol: &str, signature: &Signature) -> Result<(), Error> {
    let malformed = |message: String| Error::MalformedHostcall {
        symbol: symbol.to_owned(),
        message,
    };
    if symbol.is_empty() || symbol.contains('\0') {
        return Err(malformed(format!("{:?} is not a valid symbol name", symbol)));
    }
    if signature.results.len() > MAX_HOSTCALL_RESULTS {
        return Err(malformed(format!(
            "{} has {} results, at most {} are supported",
            signature,
            signature.results.len(),
            MAX_HOSTCALL_RESULTS
        )));
    }
    Ok(())
}

/// The value of an instance's stack limit slot.
///
/// `stack_base` is the highest address of the stack allocation, which grows down from it. The
/// limit is `reservation` bytes above the lowest address of the stack, so a hostcall is only
/// entered with at least that much stack left beneath it.
///
/// The caller guarantees `reservation <= stack_size <= stack_base`.
pub fn hostcall_stack_limit(stack_base: u64, stack_size: u64, reservation: u64) -> u64 {
    debug_assert!(reservation <= stack_size);
    debug_assert!(stack_size <= stack_base);
    stack_base - stack_size + reservation
}

/// The guard every hostcall trampoline applies before entering its hostcall.
///
/// A stack pointer exactly at the limit is insufficient.
#[inline]
pub fn hostcall_headroom_sufficient(stack_pointer: u64, stack_limit: u64) -> bool {
    stack_pointer > stack_limit
}
