//! Common types for the Bulwark guarded hostcall toolchain.
//!
//! These types are used both by `bulwarkc`, which emits hostcall trampolines, and by
//! `bulwark-runtime`, which lays out instances so that those trampolines can find the
//! per-instance stack limit.

#![deny(bare_trait_objects)]

pub mod bindings;
pub mod error;
mod functions;
mod hostcall;
mod runtime;
mod traps;
mod types;

pub use crate::error::Error;
pub use crate::functions::ImportFunction;
pub use crate::hostcall::{
    hostcall_headroom_sufficient, hostcall_stack_limit, trampoline_sym_for, trap_table_sym_for,
    validate_hostcall, MAX_HOSTCALL_RESULTS, TRAMPOLINE_SYM_PREFIX, TRAP_TABLE_SYM_PREFIX,
};
pub use crate::runtime::InstanceRuntimeData;
pub use crate::traps::{TrapCode, TrapManifest, TrapSite};
pub use crate::types::{Signature, ValueType};
