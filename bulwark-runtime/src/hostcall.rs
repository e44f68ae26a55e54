//! Hostcalls, the trampolines that guard them, and linking guest modules against them.
//!
//! A guest never holds a hostcall directly. [`Linker::link()`](struct.Linker.html#method.link)
//! resolves each of a module's imports to a host symbol through its `Bindings`, and gives the
//! resulting [`LinkedModule`](struct.LinkedModule.html) one [`Trampoline`](struct.Trampoline.html)
//! per distinct symbol. `Vmctx::call_import()` only consults that table, so every hostcall is
//! entered behind the stack-headroom guard.

use crate::error::Error;
use crate::module::{GuestFunc, Module};
use crate::val::{vals_match_types, Val};
use crate::vmctx::Vmctx;
use bulwark_module::bindings::Bindings;
use bulwark_module::{
    hostcall_headroom_sufficient, trampoline_sym_for, validate_hostcall, Signature, TrapCode,
};
use std::collections::HashMap;
use std::sync::Arc;

/// The host implementation of a hostcall.
pub type HostFunc = Arc<dyn Fn(&mut Vmctx<'_>, &[Val]) -> Vec<Val> + Send + Sync>;

/// A host function under the symbol that bindings resolve imports to.
#[derive(Clone)]
pub struct Hostcall {
    pub symbol: String,
    pub signature: Signature,
    pub func: HostFunc,
}

impl std::fmt::Debug for Hostcall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hostcall")
            .field("symbol", &self.symbol)
            .field("signature", &self.signature)
            .finish()
    }
}

/// The only entry point through which guest code reaches a hostcall.
///
/// A trampoline has exactly the signature of its hostcall. Before entering the hostcall it checks
/// the guest stack pointer against the instance's stack limit; a stack pointer at or below the
/// limit raises `TrapCode::StackOverflow` without running the hostcall.
#[derive(Debug)]
pub struct Trampoline {
    symbol: String,
    hostcall: Hostcall,
}

impl Trampoline {
    /// Generate the trampoline for a hostcall.
    ///
    /// This depends only on the hostcall's symbol and signature, so trampolines for different
    /// hostcalls can be generated independently.
    pub fn generate(hostcall: &Hostcall) -> Result<Trampoline, Error> {
        validate_hostcall(&hostcall.symbol, &hostcall.signature)
            .map_err(|e| bulwark_incorrect_module!("{}", e))?;
        Ok(Trampoline {
            symbol: trampoline_sym_for(&hostcall.symbol),
            hostcall: hostcall.clone(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn hostcall_symbol(&self) -> &str {
        &self.hostcall.symbol
    }

    pub fn signature(&self) -> &Signature {
        &self.hostcall.signature
    }

    /// Enter the hostcall if the guest has enough stack headroom, returning its results
    /// unmodified.
    ///
    /// Arguments or results that do not match the signature raise `TrapCode::BadSignature`.
    pub fn call(&self, vmctx: &mut Vmctx<'_>, args: &[Val]) -> Vec<Val> {
        let stack_pointer = vmctx.stack_pointer();
        let stack_limit = vmctx.stack_limit();
        if !hostcall_headroom_sufficient(stack_pointer, stack_limit) {
            tracing::debug!(
                hostcall = %self.hostcall.symbol,
                stack_pointer,
                stack_limit,
                "insufficient stack for hostcall"
            );
            vmctx.trap(TrapCode::StackOverflow);
        }
        if !vals_match_types(args, &self.hostcall.signature.params) {
            tracing::debug!(hostcall = %self.hostcall.symbol, ?args, "argument type mismatch");
            vmctx.trap(TrapCode::BadSignature);
        }
        let results = (self.hostcall.func)(vmctx, args);
        if !vals_match_types(&results, &self.hostcall.signature.results) {
            tracing::debug!(hostcall = %self.hostcall.symbol, ?results, "result type mismatch");
            vmctx.trap(TrapCode::BadSignature);
        }
        results
    }
}

/// Host functions and the bindings that map guest imports to them.
pub struct Linker {
    bindings: Bindings,
    hostcalls: HashMap<String, Hostcall>,
}

impl Linker {
    pub fn new(bindings: Bindings) -> Self {
        Linker {
            bindings,
            hostcalls: HashMap::new(),
        }
    }

    /// Define the host function for `symbol`.
    pub fn define<F>(
        &mut self,
        symbol: &str,
        signature: Signature,
        func: F,
    ) -> Result<&mut Self, Error>
    where
        F: Fn(&mut Vmctx<'_>, &[Val]) -> Vec<Val> + Send + Sync + 'static,
    {
        if self.hostcalls.contains_key(symbol) {
            return Err(Error::InvalidArgument("hostcall symbol is already defined"));
        }
        self.hostcalls.insert(
            symbol.to_owned(),
            Hostcall {
                symbol: symbol.to_owned(),
                signature,
                func: Arc::new(func),
            },
        );
        Ok(self)
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Link a module against the defined hostcalls.
    ///
    /// Fails if an import is not bound, if its bound symbol has no host function, or if the
    /// import's signature differs from the hostcall's. Imports bound to the same symbol share a
    /// trampoline.
    pub fn link(&self, module: Arc<dyn Module>) -> Result<Arc<LinkedModule>, Error> {
        let mut trampolines: Vec<Arc<Trampoline>> = vec![];
        let mut by_symbol: HashMap<&str, usize> = HashMap::new();
        let mut import_trampolines = Vec::with_capacity(module.imports().len());

        for import in module.imports() {
            let symbol = self.bindings.translate(&import.module, &import.name)?;
            let ix = match by_symbol.get(symbol) {
                Some(&ix) => ix,
                None => {
                    let hostcall = self
                        .hostcalls
                        .get(symbol)
                        .ok_or_else(|| Error::SymbolNotFound(symbol.to_owned()))?;
                    let trampoline = Trampoline::generate(hostcall)?;
                    tracing::debug!(
                        trampoline = trampoline.symbol(),
                        signature = %hostcall.signature,
                        "generated trampoline"
                    );
                    trampolines.push(Arc::new(trampoline));
                    by_symbol.insert(symbol, trampolines.len() - 1);
                    trampolines.len() - 1
                }
            };
            let expected = trampolines[ix].signature();
            if &import.signature != expected {
                return Err(bulwark_incorrect_module!(
                    "import {}::{} has signature {}, but it is bound to `{}` with signature {}",
                    import.module,
                    import.name,
                    import.signature,
                    symbol,
                    expected
                ));
            }
            import_trampolines.push(ix);
        }

        Ok(Arc::new(LinkedModule {
            module,
            trampolines,
            import_trampolines,
        }))
    }
}

/// A module whose imports all resolve to trampolines.
pub struct LinkedModule {
    module: Arc<dyn Module>,
    trampolines: Vec<Arc<Trampoline>>,
    import_trampolines: Vec<usize>,
}

impl LinkedModule {
    pub fn module(&self) -> &Arc<dyn Module> {
        &self.module
    }

    /// One trampoline per distinct hostcall symbol, in order of first import.
    pub fn trampolines(&self) -> &[Arc<Trampoline>] {
        &self.trampolines
    }

    /// The trampoline that import `index` resolves to.
    pub fn import_trampoline(&self, index: usize) -> Option<&Arc<Trampoline>> {
        self.import_trampolines
            .get(index)
            .map(|&ix| &self.trampolines[ix])
    }

    pub fn import_index(&self, module: &str, name: &str) -> Option<usize> {
        self.module
            .imports()
            .iter()
            .position(|import| import.module == module && import.name == name)
    }

    pub fn get_export_func(&self, sym: &str) -> Result<GuestFunc, Error> {
        self.module.get_export_func(sym)
    }
}
