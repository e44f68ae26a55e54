use crate::error::Error;
use crate::module::{GuestFunc, Module};
use crate::val::Val;
use crate::vmctx::Vmctx;
use bulwark_module::ImportFunction;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct MockModuleBuilder {
    imports: Vec<ImportFunction>,
    export_funcs: HashMap<String, GuestFunc>,
}

impl MockModuleBuilder {
    pub fn new() -> Self {
        MockModuleBuilder::default()
    }

    pub fn with_import(mut self, import: ImportFunction) -> Self {
        self.imports.push(import);
        self
    }

    pub fn with_imports(mut self, imports: impl IntoIterator<Item = ImportFunction>) -> Self {
        self.imports.extend(imports);
        self
    }

    pub fn with_export_func<F>(mut self, sym: &str, func: F) -> Self
    where
        F: Fn(&mut Vmctx<'_>, &[Val]) -> Vec<Val> + Send + Sync + 'static,
    {
        self.export_funcs.insert(sym.to_owned(), Arc::new(func));
        self
    }

    pub fn build(self) -> Arc<dyn Module> {
        Arc::new(MockModule {
            imports: self.imports,
            export_funcs: self.export_funcs,
        })
    }
}

pub struct MockModule {
    imports: Vec<ImportFunction>,
    export_funcs: HashMap<String, GuestFunc>,
}

impl Module for MockModule {
    fn imports(&self) -> &[ImportFunction] {
        &self.imports
    }

    fn get_export_func(&self, sym: &str) -> Result<GuestFunc, Error> {
        self.export_funcs
            .get(sym)
            .cloned()
            .ok_or_else(|| Error::SymbolNotFound(sym.to_owned()))
    }
}
