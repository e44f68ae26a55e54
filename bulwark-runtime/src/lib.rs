//! `bulwark-runtime` runs guest programs in sandboxes whose hostcalls are all entered through
//! stack-guarding trampolines.
//!
//! A guest that calls a hostcall with less stack left than the instance's hostcall reservation
//! traps with `TrapCode::StackOverflow`, exactly as if it had exhausted the stack itself:
//!
//! ```no_run
//! use bulwark_module::bindings::Bindings;
//! use bulwark_module::{ImportFunction, Signature, TrapCode, ValueType};
//! use bulwark_runtime::{Error, Limits, Linker, MmapRegion, MockModuleBuilder, Region, Val};
//!
//! let hello = Signature::new(vec![ValueType::I32], vec![]);
//! let module = MockModuleBuilder::new()
//!     .with_import(ImportFunction::new("env", "hello", hello.clone()))
//!     .with_export_func("main", |vmctx, _| {
//!         vmctx.with_frame(100 * 1024, |vmctx| vmctx.call_import(0, &[Val::I32(1)]))
//!     })
//!     .build();
//!
//! let mut bindings = std::collections::HashMap::new();
//! bindings.insert("hello".to_owned(), "host_hello".to_owned());
//! let mut linker = Linker::new(Bindings::env(bindings));
//! linker.define("host_hello", hello, |_, _| vec![]).unwrap();
//!
//! let region = MmapRegion::create(1, &Limits::default()).unwrap();
//! let mut inst = region.new_instance(linker.link(module).unwrap()).unwrap();
//! match inst.run("main", &[]) {
//!     Err(Error::RuntimeFault(details)) => {
//!         assert_eq!(details.trapcode, Some(TrapCode::StackOverflow))
//!     }
//!     res => panic!("unexpected result: {:?}", res),
//! }
//! ```

#![deny(bare_trait_objects)]

#[macro_use]
pub mod error;

pub mod alloc;
pub mod fault;
pub mod hostcall;
pub mod instance;
pub mod module;
pub mod region;
mod sysdeps;
pub mod val;
pub mod vmctx;

pub use crate::alloc::{validate_hostcall_reservation, Limits};
pub use crate::error::Error;
pub use crate::hostcall::{Hostcall, LinkedModule, Linker, Trampoline};
pub use crate::instance::{FaultDetails, Instance, State, TerminationDetails};
pub use crate::module::{MockModuleBuilder, Module};
pub use crate::region::mmap::MmapRegion;
pub use crate::region::{Region, RegionCreate, RegionInternal};
pub use crate::val::Val;
pub use crate::vmctx::Vmctx;
pub use bulwark_module::TrapCode;
