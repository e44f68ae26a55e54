//! Ahead-of-time compilation of hostcall trampolines.
//!
//! Given a guest module's function imports and the bindings that map them to host symbols,
//! `bulwarkc` emits one trampoline per host symbol. The guest is linked against the
//! trampolines, never against the hostcalls themselves, so every hostcall is entered only after
//! its trampoline has checked that the guest stack has room for it.

#![deny(bare_trait_objects)]

mod compiler;
mod error;
mod imports;
mod output;
pub mod trampoline;
mod traps;

pub use crate::{
    compiler::{Compiler, CompilerBuilder, Hostcall, ImportLink, OptLevel},
    error::Error,
    imports::{function_imports, read_bytes, read_module},
    output::{CraneliftFuncs, ObjectFile},
    traps::translate_trapcode,
};
pub use bulwark_module::bindings::Bindings;
use bulwark_module::ImportFunction;
use std::path::{Path, PathBuf};
use target_lexicon::Triple;

enum BulwarkcInput {
    Bytes(Vec<u8>),
    Path(PathBuf),
    Imports(Vec<ImportFunction>),
}

pub struct Bulwarkc {
    input: BulwarkcInput,
    bindings: Vec<Bindings>,
    builder: CompilerBuilder,
}

pub trait AsBulwarkc {
    fn as_bulwarkc(&mut self) -> &mut Bulwarkc;
}

impl AsBulwarkc for Bulwarkc {
    fn as_bulwarkc(&mut self) -> &mut Bulwarkc {
        self
    }
}

pub trait BulwarkcOpts {
    fn bindings(&mut self, bindings: Bindings);
    fn with_bindings(self, bindings: Bindings) -> Self;

    fn target(&mut self, target: Triple);
    fn with_target(self, target: Triple) -> Self;

    fn opt_level(&mut self, opt_level: OptLevel);
    fn with_opt_level(self, opt_level: OptLevel) -> Self;
}

impl<T: AsBulwarkc> BulwarkcOpts for T {
    fn bindings(&mut self, bindings: Bindings) {
        self.as_bulwarkc().bindings.push(bindings);
    }

    fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings(bindings);
        self
    }

    fn target(&mut self, target: Triple) {
        self.as_bulwarkc().builder.target(target);
    }

    fn with_target(mut self, target: Triple) -> Self {
        self.target(target);
        self
    }

    fn opt_level(&mut self, opt_level: OptLevel) {
        self.as_bulwarkc().builder.opt_level(opt_level);
    }

    fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level(opt_level);
        self
    }
}

impl Bulwarkc {
    fn with_input(input: BulwarkcInput) -> Self {
        Self {
            input,
            bindings: vec![],
            builder: CompilerBuilder::new(),
        }
    }

    /// Compile trampolines for the imports of the module at `input`, in either the binary or
    /// text format.
    pub fn new<P: AsRef<Path>>(input: P) -> Self {
        Self::with_input(BulwarkcInput::Path(input.as_ref().to_owned()))
    }

    pub fn try_from_bytes<B: AsRef<[u8]>>(bytes: B) -> Result<Self, Error> {
        let input = read_bytes(bytes.as_ref().to_vec())?;
        Ok(Self::with_input(BulwarkcInput::Bytes(input)))
    }

    /// Compile trampolines for an explicit list of imports, without a guest module.
    pub fn from_imports(imports: Vec<ImportFunction>) -> Self {
        Self::with_input(BulwarkcInput::Imports(imports))
    }

    pub fn compiler(&self) -> Result<Compiler, Error> {
        let mut bindings = Bindings::empty();
        for binding in self.bindings.iter() {
            bindings.extend(binding)?;
        }

        match &self.input {
            BulwarkcInput::Bytes(bytes) => self.builder.create_from_wasm(bytes, &bindings),
            BulwarkcInput::Path(path) => {
                let module_binary = read_module(path)?;
                self.builder.create_from_wasm(&module_binary, &bindings)
            }
            BulwarkcInput::Imports(imports) => self.builder.create(imports, &bindings),
        }
    }

    pub fn object_file<P: AsRef<Path>>(&self, output: P) -> Result<(), Error> {
        let compiler = self.compiler()?;
        let obj = compiler.object_file()?;
        obj.write(output.as_ref())?;

        Ok(())
    }

    pub fn clif_ir<P: AsRef<Path>>(&self, output: P) -> Result<(), Error> {
        let compiler = self.compiler()?;
        compiler.cranelift_funcs()?.write(&output)?;

        Ok(())
    }
}
