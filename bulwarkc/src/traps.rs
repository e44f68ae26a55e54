use crate::error::Error;
use bulwark_module::{trap_table_sym_for, TrapCode, TrapManifest, TrapSite};
use cranelift_codegen::{ir, MachTrap};
use cranelift_module::{DataDescription, DataId, Linkage, Module};

/// Trampolines only trap on a failed headroom check; any other trap in one is a bug.
pub fn translate_trapcode(code: ir::TrapCode) -> Result<TrapCode, Error> {
    match code {
        ir::TrapCode::StackOverflow => Ok(TrapCode::StackOverflow),
        other => Err(Error::UnknownTrapCode(format!("{:?}", other))),
    }
}

pub fn trap_manifest(traps: &[MachTrap]) -> Result<TrapManifest, Error> {
    let sites = traps
        .iter()
        .map(|trap| {
            Ok(TrapSite {
                offset: trap.offset,
                code: translate_trapcode(trap.code)?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(TrapManifest::new(sites))
}

/// Emit the trap table of `func_sym` as an exported data symbol next to it.
pub fn write_trap_table<M: Module>(
    module: &mut M,
    manifest: &TrapManifest,
    func_sym: &str,
) -> Result<DataId, Error> {
    let trap_sym = trap_table_sym_for(func_sym);
    let mut trap_sym_desc = DataDescription::new();
    trap_sym_desc.define(manifest.serialize().into_boxed_slice());
    trap_sym_desc.set_align(4);

    let trap_data_id = module.declare_data(&trap_sym, Linkage::Export, false, false)?;
    module.define_data(trap_data_id, &trap_sym_desc)?;

    Ok(trap_data_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stack_overflow_translates() {
        assert_eq!(
            translate_trapcode(ir::TrapCode::StackOverflow).unwrap(),
            TrapCode::StackOverflow
        );
        assert!(matches!(
            translate_trapcode(ir::TrapCode::HeapOutOfBounds),
            Err(Error::UnknownTrapCode(_))
        ));
    }
}
