use crate::error::Error;
use cranelift_codegen::ir;
use cranelift_object::ObjectProduct;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Trampolines as textual Cranelift IR, in the order they were generated.
pub struct CraneliftFuncs {
    funcs: Vec<(String, ir::Function)>,
}

impl CraneliftFuncs {
    pub fn new(funcs: Vec<(String, ir::Function)>) -> Self {
        Self { funcs }
    }

    pub fn funcs(&self) -> &[(String, ir::Function)] {
        &self.funcs
    }

    pub fn to_clif(&self) -> Result<String, Error> {
        use cranelift_codegen::write_function;
        let mut buffer = String::new();
        for (symbol, func) in self.funcs.iter() {
            buffer.push_str(&format!("; {}\n", symbol));
            write_function(&mut buffer, func)
                .map_err(|e| Error::OutputFunction(e, symbol.clone()))?;
            buffer.push('\n');
        }
        Ok(buffer)
    }

    /// This outputs a .clif file
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let buffer = self.to_clif()?;
        let mut file = File::create(path)?;
        file.write_all(buffer.as_bytes())?;
        Ok(())
    }
}

pub struct ObjectFile {
    product: ObjectProduct,
}

impl ObjectFile {
    pub fn new(product: ObjectProduct) -> Self {
        Self { product }
    }

    pub fn to_bytes(self) -> Result<Vec<u8>, Error> {
        self.product
            .emit()
            .map_err(|source| Error::ObjectArtifact(source, "Write error".to_owned()))
    }

    pub fn write<P: AsRef<Path>>(self, path: P) -> Result<(), Error> {
        if path.as_ref().file_name().is_none() {
            return Err(Error::Input(format!(
                "Path must be filename {:?}",
                path.as_ref()
            )));
        }
        let bytes = self.to_bytes()?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        Ok(())
    }
}
