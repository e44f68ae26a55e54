use crate::error::Error;
use bulwark_module::{ImportFunction, Signature, ValueType};
use std::fs;
use std::path::Path;
use wasmparser::{FuncType, Parser, Payload, Type, TypeRef, ValType, Validator};

/// Read a guest module from a file, in either the binary or text format.
pub fn read_module<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, Error> {
    let contents = fs::read(path.as_ref())?;
    read_bytes(contents)
}

pub fn read_bytes(bytes: Vec<u8>) -> Result<Vec<u8>, Error> {
    if wasm_preamble(&bytes) {
        return Ok(bytes);
    }
    let converted = wat::parse_bytes(&bytes)
        .map_err(|e| Error::Input(format!("wat2wasm error: {}", e)))?;
    Ok(converted.into_owned())
}

fn wasm_preamble(buf: &[u8]) -> bool {
    buf.len() > 4 && buf[0..4] == [0, 97, 115, 109]
}

/// The functions a guest module imports, in import order.
///
/// The module is validated first; anything other than a function import is skipped, since only
/// functions are reached through hostcall trampolines.
pub fn function_imports(wasm_binary: &[u8]) -> Result<Vec<ImportFunction>, Error> {
    Validator::new().validate_all(wasm_binary)?;

    let mut types: Vec<Option<FuncType>> = vec![];
    let mut imports = vec![];
    for payload in Parser::new(0).parse_all(wasm_binary) {
        match payload? {
            Payload::TypeSection(reader) => {
                for ty in reader {
                    match ty? {
                        Type::Func(ft) => types.push(Some(ft)),
                        #[allow(unreachable_patterns)]
                        _ => types.push(None),
                    }
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import?;
                    if let TypeRef::Func(ix) = import.ty {
                        let ft = types.get(ix as usize).and_then(|t| t.as_ref()).ok_or_else(|| {
                            Error::Input(format!(
                                "import {}::{} refers to missing function type {}",
                                import.module, import.name, ix
                            ))
                        })?;
                        let symbol = format!("{}::{}", import.module, import.name);
                        imports.push(ImportFunction::new(
                            import.module,
                            import.name,
                            signature_from_functype(&symbol, ft)?,
                        ));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(imports)
}

fn signature_from_functype(symbol: &str, ft: &FuncType) -> Result<Signature, Error> {
    let convert = |tys: &[ValType]| -> Result<Vec<ValueType>, Error> {
        tys.iter()
            .map(|ty| match ty {
                ValType::I32 => Ok(ValueType::I32),
                ValType::I64 => Ok(ValueType::I64),
                ValType::F32 => Ok(ValueType::F32),
                ValType::F64 => Ok(ValueType::F64),
                other => Err(Error::UnsupportedSignature {
                    symbol: symbol.to_owned(),
                    message: format!("value type {:?} cannot cross the hostcall boundary", other),
                }),
            })
            .collect()
    };
    Ok(Signature::new(convert(ft.params())?, convert(ft.results())?))
}
