//! Cranelift IR for hostcall trampolines.
//!
//! A trampoline has exactly the signature of the hostcall it stands in for. It compares the
//! stack pointer it was entered with against the instance's stack limit and traps with
//! `stk_ovf` when the stack pointer is at or below it. Otherwise it passes every argument
//! through to the hostcall and returns the hostcall's results as they are.
//!
//! ```text
//! function u0:1(i64 vmctx, i32) -> f64 {
//!     sig0 = (i64 vmctx, i32) -> f64
//!     fn0 = u0:0 sig0
//!
//! block0(v0: i64, v1: i32):
//!     v2 = get_stack_pointer.i64
//!     v3 = load.i64 notrap aligned readonly v0-8
//!     v4 = icmp ule v2, v3
//!     brif v4, block2, block1
//!
//! block1:
//!     v5 = call fn0(v0, v1)
//!     return v5
//!
//! block2 cold:
//!     trap stk_ovf
//! }
//! ```

use crate::error::Error;
use bulwark_module::{
    validate_hostcall, Error as ModuleError, InstanceRuntimeData, Signature, ValueType,
};
use cranelift_codegen::ir::{
    self, condcodes::IntCC, types, AbiParam, ArgumentPurpose, ExtFuncData, ExternalName,
    InstBuilder, MemFlags, TrapCode, UserExternalName, UserFuncName,
};
use cranelift_codegen::isa::TargetIsa;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};

/// What a trampoline forwards to.
#[derive(Clone, Debug)]
pub struct TrampolineSpec<'a> {
    pub hostcall_sym: &'a str,
    pub signature: &'a Signature,
}

/// The external names the trampoline is defined under and calls, as declared in the module
/// the trampoline will be emitted into.
#[derive(Clone, Debug)]
pub struct TrampolineTarget {
    pub trampoline: UserExternalName,
    pub hostcall: UserExternalName,
}

fn clif_type(ty: ValueType) -> ir::Type {
    match ty {
        ValueType::I32 => types::I32,
        ValueType::I64 => types::I64,
        ValueType::F32 => types::F32,
        ValueType::F64 => types::F64,
    }
}

/// The native signature shared by a hostcall and its trampoline: `vmctx` first, then the
/// guest-visible parameters.
pub fn clif_signature(isa: &dyn TargetIsa, signature: &Signature) -> ir::Signature {
    let mut sig = ir::Signature::new(isa.default_call_conv());
    sig.params.push(AbiParam::special(
        isa.pointer_type(),
        ArgumentPurpose::VMContext,
    ));
    sig.params
        .extend(signature.params.iter().map(|ty| AbiParam::new(clif_type(*ty))));
    sig.returns
        .extend(signature.results.iter().map(|ty| AbiParam::new(clif_type(*ty))));
    sig
}

pub fn check_signature(spec: &TrampolineSpec<'_>) -> Result<(), Error> {
    validate_hostcall(spec.hostcall_sym, spec.signature).map_err(|e| match e {
        ModuleError::MalformedHostcall { symbol, message } => {
            Error::UnsupportedSignature { symbol, message }
        }
        other => Error::Bindings(other),
    })
}

/// Build the trampoline for one hostcall.
///
/// This depends on nothing but its arguments, so trampolines for different hostcalls can be
/// generated independently and in any order.
pub fn generate(
    isa: &dyn TargetIsa,
    spec: &TrampolineSpec<'_>,
    target: &TrampolineTarget,
) -> Result<ir::Function, Error> {
    check_signature(spec)?;
    let pointer_type = isa.pointer_type();
    if pointer_type != types::I64 {
        return Err(Error::Unsupported(format!(
            "hostcall trampolines require a 64-bit target, pointer type is {}",
            pointer_type
        )));
    }

    let sig = clif_signature(isa, spec.signature);
    let mut func = ir::Function::with_name_signature(
        UserFuncName::User(target.trampoline.clone()),
        sig.clone(),
    );
    let mut func_ctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(&mut func, &mut func_ctx);

    let hostcall_name = builder
        .func
        .declare_imported_user_function(target.hostcall.clone());
    let hostcall_sig = builder.import_signature(sig);
    let hostcall = builder.import_function(ExtFuncData {
        name: ExternalName::user(hostcall_name),
        signature: hostcall_sig,
        colocated: false,
    });

    let entry = builder.create_block();
    let enter_hostcall = builder.create_block();
    let stack_overflow = builder.create_block();

    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    builder.seal_block(entry);
    let args = builder.block_params(entry).to_vec();
    let vmctx = args[0];

    let sp = builder.ins().get_stack_pointer(pointer_type);
    let mut flags = MemFlags::trusted();
    flags.set_readonly();
    let stack_limit = builder.ins().load(
        types::I64,
        flags,
        vmctx,
        InstanceRuntimeData::vmctx_offset_of_stack_limit(),
    );
    let exhausted = builder
        .ins()
        .icmp(IntCC::UnsignedLessThanOrEqual, sp, stack_limit);
    builder
        .ins()
        .brif(exhausted, stack_overflow, &[], enter_hostcall, &[]);

    builder.switch_to_block(enter_hostcall);
    builder.seal_block(enter_hostcall);
    let call = builder.ins().call(hostcall, &args);
    let results = builder.inst_results(call).to_vec();
    builder.ins().return_(&results);

    builder.switch_to_block(stack_overflow);
    builder.seal_block(stack_overflow);
    builder.set_cold_block(stack_overflow);
    builder.ins().trap(TrapCode::StackOverflow);

    builder.finalize();
    Ok(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_codegen::ir::{InstructionData, Opcode};
    use cranelift_codegen::settings;

    fn isa() -> cranelift_codegen::isa::OwnedTargetIsa {
        let flags = settings::Flags::new(settings::builder());
        cranelift_native::builder()
            .unwrap()
            .finish(flags)
            .unwrap()
    }

    fn target() -> TrampolineTarget {
        TrampolineTarget {
            trampoline: UserExternalName::new(0, 1),
            hostcall: UserExternalName::new(0, 0),
        }
    }

    fn opcodes(func: &ir::Function) -> Vec<Opcode> {
        func.layout
            .blocks()
            .flat_map(|b| func.layout.block_insts(b))
            .map(|inst| func.dfg.insts[inst].opcode())
            .collect()
    }

    #[test]
    fn guard_then_forward() {
        let isa = isa();
        let sig = Signature::new(vec![ValueType::I32, ValueType::F32], vec![ValueType::F64]);
        let func = generate(
            &*isa,
            &TrampolineSpec {
                hostcall_sym: "host_hello",
                signature: &sig,
            },
            &target(),
        )
        .unwrap();

        assert_eq!(func.signature, clif_signature(&*isa, &sig));
        assert_eq!(
            opcodes(&func),
            vec![
                Opcode::GetStackPointer,
                Opcode::Load,
                Opcode::Icmp,
                Opcode::Brif,
                Opcode::Call,
                Opcode::Return,
                Opcode::Trap,
            ]
        );

        for block in func.layout.blocks() {
            for inst in func.layout.block_insts(block) {
                match func.dfg.insts[inst] {
                    InstructionData::IntCompare { cond, .. } => {
                        assert_eq!(cond, IntCC::UnsignedLessThanOrEqual)
                    }
                    InstructionData::Load { offset, .. } => assert_eq!(
                        i32::from(offset),
                        InstanceRuntimeData::vmctx_offset_of_stack_limit()
                    ),
                    InstructionData::Trap { code, .. } => {
                        assert_eq!(code, TrapCode::StackOverflow)
                    }
                    InstructionData::Call { .. } => {
                        // vmctx plus both guest arguments, in order
                        let args = func.dfg.inst_args(inst);
                        let entry = func.layout.entry_block().unwrap();
                        assert_eq!(args, func.dfg.block_params(entry));
                    }
                    _ => {}
                }
            }
        }

        cranelift_codegen::verifier::verify_function(&func, &*isa).unwrap();
    }

    #[test]
    fn malformed_signatures() {
        let isa = isa();
        let sig = Signature::new(vec![], vec![ValueType::I64; 3]);
        let res = generate(
            &*isa,
            &TrampolineSpec {
                hostcall_sym: "host_triple",
                signature: &sig,
            },
            &target(),
        );
        assert!(matches!(res, Err(Error::UnsupportedSignature { .. })));

        let sig = Signature::default();
        let res = generate(
            &*isa,
            &TrampolineSpec {
                hostcall_sym: "",
                signature: &sig,
            },
            &target(),
        );
        assert!(matches!(res, Err(Error::UnsupportedSignature { .. })));
    }
}
