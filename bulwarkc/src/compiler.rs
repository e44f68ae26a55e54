use crate::error::Error;
use crate::imports::function_imports;
use crate::output::{CraneliftFuncs, ObjectFile};
use crate::trampoline::{self, clif_signature, TrampolineSpec, TrampolineTarget};
use crate::traps::{trap_manifest, write_trap_table};
use bulwark_module::bindings::Bindings;
use bulwark_module::{trampoline_sym_for, ImportFunction, Signature, TrapCode};
use cranelift_codegen::{
    ir,
    isa::{self, OwnedTargetIsa},
    settings::{self, Configurable, SetError},
    Context as ClifContext,
};
use cranelift_module::{FuncId, Linkage as ClifLinkage, Module as ClifModule};
use cranelift_object::{ObjectBuilder, ObjectModule};
use log::{debug, info};
use std::collections::HashMap;
use target_lexicon::Triple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    None,
    Speed,
    SpeedAndSize,
}

impl Default for OptLevel {
    fn default() -> OptLevel {
        OptLevel::SpeedAndSize
    }
}

impl OptLevel {
    pub fn to_flag(&self) -> &str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

pub struct CompilerBuilder {
    target: Triple,
    opt_level: OptLevel,
}

impl CompilerBuilder {
    pub fn new() -> Self {
        Self {
            target: Triple::host(),
            opt_level: OptLevel::default(),
        }
    }

    pub fn target(&mut self, target: Triple) {
        self.target = target;
    }

    pub fn with_target(mut self, target: Triple) -> Self {
        self.target(target);
        self
    }

    pub fn opt_level(&mut self, opt_level: OptLevel) {
        self.opt_level = opt_level;
    }

    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level(opt_level);
        self
    }

    pub fn create(
        &self,
        imports: &[ImportFunction],
        bindings: &Bindings,
    ) -> Result<Compiler, Error> {
        Compiler::new(imports, self.target.clone(), self.opt_level, bindings)
    }

    /// Compile trampolines for every function a WebAssembly module imports.
    pub fn create_from_wasm(
        &self,
        wasm_binary: &[u8],
        bindings: &Bindings,
    ) -> Result<Compiler, Error> {
        let imports = function_imports(wasm_binary)?;
        self.create(&imports, bindings)
    }
}

impl Default for CompilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A host symbol that needs a trampoline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hostcall {
    pub symbol: String,
    pub signature: Signature,
}

/// How the loader should satisfy one guest import.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportLink {
    pub module: String,
    pub name: String,
    pub hostcall: String,
    pub trampoline: String,
}

struct DeclaredTrampoline<'a> {
    hostcall: &'a Hostcall,
    trampoline_sym: String,
    hostcall_id: FuncId,
    trampoline_id: FuncId,
}

pub struct Compiler {
    isa: OwnedTargetIsa,
    hostcalls: Vec<Hostcall>,
    import_links: Vec<ImportLink>,
}

impl Compiler {
    /// Resolve `imports` through `bindings`.
    ///
    /// Every import must resolve. Imports bound to the same host symbol share one trampoline,
    /// so they must agree on its signature.
    pub fn new(
        imports: &[ImportFunction],
        target: Triple,
        opt_level: OptLevel,
        bindings: &Bindings,
    ) -> Result<Self, Error> {
        let isa = Self::target_isa(&target, opt_level)?;

        let mut hostcalls: Vec<Hostcall> = vec![];
        let mut by_symbol: HashMap<String, usize> = HashMap::new();
        let mut import_links = Vec::with_capacity(imports.len());

        for import in imports {
            let symbol = bindings
                .translate(&import.module, &import.name)
                .map_err(|source| Error::UnresolvedSymbol {
                    module: import.module.clone(),
                    name: import.name.clone(),
                    source,
                })?;
            debug!(
                "import {}::{} {} bound to {}",
                import.module, import.name, import.signature, symbol
            );

            match by_symbol.get(symbol) {
                Some(&ix) => {
                    if hostcalls[ix].signature != import.signature {
                        return Err(Error::SignatureMismatch {
                            symbol: symbol.to_owned(),
                            first: hostcalls[ix].signature.clone(),
                            second: import.signature.clone(),
                        });
                    }
                }
                None => {
                    by_symbol.insert(symbol.to_owned(), hostcalls.len());
                    hostcalls.push(Hostcall {
                        symbol: symbol.to_owned(),
                        signature: import.signature.clone(),
                    });
                }
            }

            import_links.push(ImportLink {
                module: import.module.clone(),
                name: import.name.clone(),
                hostcall: symbol.to_owned(),
                trampoline: trampoline_sym_for(symbol),
            });
        }

        info!(
            "{} imports resolved to {} hostcalls for {}",
            import_links.len(),
            hostcalls.len(),
            target
        );

        Ok(Self {
            isa,
            hostcalls,
            import_links,
        })
    }

    pub fn builder() -> CompilerBuilder {
        CompilerBuilder::new()
    }

    pub fn hostcalls(&self) -> &[Hostcall] {
        &self.hostcalls
    }

    /// For each guest import, the trampoline symbol it must be linked against.
    pub fn import_links(&self) -> &[ImportLink] {
        &self.import_links
    }

    pub fn object_file(self) -> Result<ObjectFile, Error> {
        let mut clif_module = self.clif_module()?;
        let declared = self.declare(&mut clif_module)?;

        for decl in declared.iter() {
            let func = self.trampoline(decl)?;
            let mut clif_context = ClifContext::for_function(func);
            clif_module
                .define_function(decl.trampoline_id, &mut clif_context)
                .map_err(|source| Error::FunctionDefinition {
                    symbol: decl.trampoline_sym.clone(),
                    source,
                })?;

            // Write out a trap table for the compiled trampoline.
            let compiled = clif_context.compiled_code().ok_or_else(|| {
                Error::Unsupported(format!("{} was defined without code", decl.trampoline_sym))
            })?;
            let manifest = trap_manifest(compiled.buffer.traps())?;
            if !manifest
                .traps()
                .iter()
                .any(|site| site.code == TrapCode::StackOverflow)
            {
                return Err(Error::MissingTrapSite {
                    symbol: decl.trampoline_sym.clone(),
                    expected: TrapCode::StackOverflow,
                });
            }
            write_trap_table(&mut clif_module, &manifest, &decl.trampoline_sym)?;
            debug!(
                "defined {} ({} bytes, {} trap sites)",
                decl.trampoline_sym,
                compiled.code_buffer().len(),
                manifest.traps().len()
            );
        }

        Ok(ObjectFile::new(clif_module.finish()))
    }

    pub fn cranelift_funcs(self) -> Result<CraneliftFuncs, Error> {
        let mut clif_module = self.clif_module()?;
        let declared = self.declare(&mut clif_module)?;

        let funcs = declared
            .iter()
            .map(|decl| -> Result<(String, ir::Function), Error> {
                Ok((decl.trampoline_sym.clone(), self.trampoline(decl)?))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(CraneliftFuncs::new(funcs))
    }

    fn clif_module(&self) -> Result<ObjectModule, Error> {
        let builder = ObjectBuilder::new(
            self.isa.clone(),
            "bulwark_trampolines",
            cranelift_module::default_libcall_names(),
        )?;
        Ok(ObjectModule::new(builder))
    }

    /// Hostcalls are imports of the object; their trampolines are its exports.
    fn declare<'a>(
        &'a self,
        clif_module: &mut ObjectModule,
    ) -> Result<Vec<DeclaredTrampoline<'a>>, Error> {
        self.hostcalls
            .iter()
            .map(|hostcall| -> Result<DeclaredTrampoline<'a>, Error> {
                let sig = clif_signature(&*self.isa, &hostcall.signature);
                let hostcall_id =
                    clif_module.declare_function(&hostcall.symbol, ClifLinkage::Import, &sig)?;
                let trampoline_sym = trampoline_sym_for(&hostcall.symbol);
                let trampoline_id =
                    clif_module.declare_function(&trampoline_sym, ClifLinkage::Export, &sig)?;
                Ok(DeclaredTrampoline {
                    hostcall,
                    trampoline_sym,
                    hostcall_id,
                    trampoline_id,
                })
            })
            .collect()
    }

    fn trampoline(&self, decl: &DeclaredTrampoline<'_>) -> Result<ir::Function, Error> {
        let func = trampoline::generate(
            &*self.isa,
            &TrampolineSpec {
                hostcall_sym: &decl.hostcall.symbol,
                signature: &decl.hostcall.signature,
            },
            &TrampolineTarget {
                trampoline: ir::UserExternalName::new(0, decl.trampoline_id.as_u32()),
                hostcall: ir::UserExternalName::new(0, decl.hostcall_id.as_u32()),
            },
        )?;
        cranelift_codegen::verifier::verify_function(&func, &*self.isa).map_err(|errors| {
            Error::Verification {
                symbol: decl.trampoline_sym.clone(),
                message: errors.to_string(),
            }
        })?;
        Ok(func)
    }

    fn target_isa(target: &Triple, opt_level: OptLevel) -> Result<OwnedTargetIsa, Error> {
        let mut flags_builder = settings::builder();
        let isa_builder = if *target == Triple::host() {
            cranelift_native::builder().map_err(|e| Error::Unsupported(e.to_owned()))?
        } else {
            isa::lookup(target.clone())
                .map_err(|e| Error::Unsupported(format!("target {}: {}", target, e)))?
        };
        let setting = |e: SetError| Error::Unsupported(format!("codegen setting: {}", e));
        flags_builder.enable("enable_verifier").map_err(setting)?;
        flags_builder.enable("is_pic").map_err(setting)?;
        flags_builder
            .set("opt_level", opt_level.to_flag())
            .map_err(setting)?;
        let isa = isa_builder
            .finish(settings::Flags::new(flags_builder))
            .map_err(|e| Error::Unsupported(format!("target {}: {}", target, e)))?;
        if isa.pointer_bits() != 64 {
            return Err(Error::Unsupported(format!(
                "target {} is not 64-bit; the instance stack limit is a 64-bit slot",
                target
            )));
        }
        Ok(isa)
    }
}
