use bulwark_module::{
    trampoline_sym_for, trap_table_sym_for, ImportFunction, Signature, TrapCode, TrapManifest,
    TrapSite, ValueType,
};
use bulwarkc::{Bindings, Bulwarkc, BulwarkcOpts, Compiler, Error, ImportLink};
use object::{Object, ObjectSection, ObjectSymbol};
use std::collections::HashMap;

fn bindings() -> Bindings {
    Bindings::from_str(
        r#"{
            "env": {
                "hello": "host_hello",
                "add": "host_add",
                "add_again": "host_add",
                "clock": "host_clock"
            }
        }"#,
    )
    .unwrap()
}

fn imports() -> Vec<ImportFunction> {
    use ValueType::*;
    vec![
        ImportFunction::new("env", "hello", Signature::new(vec![I32], vec![])),
        ImportFunction::new("env", "add", Signature::new(vec![I64, I64], vec![I64])),
        ImportFunction::new("env", "add_again", Signature::new(vec![I64, I64], vec![I64])),
        ImportFunction::new("env", "clock", Signature::new(vec![], vec![F64])),
    ]
}

fn compiler() -> Compiler {
    Compiler::builder().create(&imports(), &bindings()).unwrap()
}

struct ObjectSymbols {
    defined: HashMap<String, Vec<u8>>,
    undefined: Vec<String>,
}

fn read_symbols(bytes: &[u8]) -> ObjectSymbols {
    let file = object::File::parse(bytes).unwrap();
    let mut defined = HashMap::new();
    let mut undefined = vec![];
    for sym in file.symbols() {
        let name = sym.name().unwrap().trim_start_matches('_').to_owned();
        if !name.starts_with("bulwark_") && !name.starts_with("host_") {
            continue;
        }
        if sym.is_undefined() {
            undefined.push(name);
            continue;
        }
        let section = match sym.section_index() {
            Some(index) => file.section_by_index(index).unwrap(),
            None => continue,
        };
        let data = section.data().unwrap();
        let start = (sym.address() - section.address()) as usize;
        let size = match sym.size() as usize {
            // Mach-O does not record symbol sizes; every trap table here has one site
            0 if name.starts_with("bulwark_trap_table_") => TrapSite::SERIALIZED_SIZE,
            size => size,
        };
        defined.insert(name, data[start..(start + size).min(data.len())].to_vec());
    }
    undefined.sort();
    ObjectSymbols { defined, undefined }
}

#[test]
fn one_trampoline_per_hostcall() {
    let c = compiler();
    let symbols: Vec<&str> = c.hostcalls().iter().map(|h| h.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["host_hello", "host_add", "host_clock"]);

    let links = c.import_links();
    assert_eq!(links.len(), 4);
    assert_eq!(
        links[2],
        ImportLink {
            module: "env".to_owned(),
            name: "add_again".to_owned(),
            hostcall: "host_add".to_owned(),
            trampoline: "bulwark_trampoline_host_add".to_owned(),
        }
    );
    for link in links {
        assert_eq!(link.trampoline, trampoline_sym_for(&link.hostcall));
    }
}

#[test]
fn object_exports_trampolines_and_trap_tables() {
    let bytes = compiler().object_file().unwrap().to_bytes().unwrap();
    let symbols = read_symbols(&bytes);

    assert_eq!(
        symbols.undefined,
        vec!["host_add", "host_clock", "host_hello"],
        "hostcalls are imported by the object, not defined by it"
    );

    for hostcall in &["host_hello", "host_add", "host_clock"] {
        let trampoline = trampoline_sym_for(hostcall);
        let code = symbols
            .defined
            .get(&trampoline)
            .unwrap_or_else(|| panic!("{} is defined", trampoline));

        let table = symbols
            .defined
            .get(&trap_table_sym_for(&trampoline))
            .unwrap_or_else(|| panic!("{} has a trap table", trampoline));
        let manifest = TrapManifest::deserialize(table).unwrap();
        assert_eq!(manifest.traps().len(), 1);
        let site = manifest.traps()[0];
        assert_eq!(site.code, TrapCode::StackOverflow);
        if !code.is_empty() {
            assert!((site.offset as usize) < code.len());
        }
    }
}

#[test]
fn clif_shows_the_guard() {
    let funcs = compiler().cranelift_funcs().unwrap();
    assert_eq!(funcs.funcs().len(), 3);
    let clif = funcs.to_clif().unwrap();
    assert!(clif.contains("; bulwark_trampoline_host_add"));
    assert_eq!(clif.matches("get_stack_pointer.i64").count(), 3);
    assert_eq!(clif.matches("icmp ule").count(), 3);
    assert_eq!(clif.matches("trap stk_ovf").count(), 3);
}

#[test]
fn trampoline_signature_matches_hostcall() {
    let c = compiler();
    let hostcalls = c.hostcalls().to_vec();
    let funcs = c.cranelift_funcs().unwrap();
    for (hostcall, (_, func)) in hostcalls.iter().zip(funcs.funcs().iter()) {
        // vmctx, then the guest-visible parameters
        assert_eq!(func.signature.params.len(), hostcall.signature.params.len() + 1);
        assert_eq!(func.signature.returns.len(), hostcall.signature.results.len());
        // the hostcall it calls has the very same signature
        let (_, callee) = func.dfg.ext_funcs.iter().next().unwrap();
        assert_eq!(func.dfg.signatures[callee.signature], func.signature);
    }
}

#[test]
fn unresolved_import() {
    let mut imports = imports();
    imports.push(ImportFunction::new("env", "missing", Signature::default()));
    match Compiler::builder().create(&imports, &bindings()) {
        Err(Error::UnresolvedSymbol { module, name, .. }) => {
            assert_eq!(module, "env");
            assert_eq!(name, "missing");
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("unresolved import compiled"),
    }
}

#[test]
fn shared_hostcall_with_conflicting_signatures() {
    let mut imports = imports();
    imports[2] = ImportFunction::new(
        "env",
        "add_again",
        Signature::new(vec![ValueType::I32, ValueType::I32], vec![ValueType::I32]),
    );
    match Compiler::builder().create(&imports, &bindings()) {
        Err(Error::SignatureMismatch { symbol, .. }) => assert_eq!(symbol, "host_add"),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("conflicting signatures compiled"),
    }
}

#[test]
fn too_many_results() {
    let imports = vec![ImportFunction::new(
        "env",
        "hello",
        Signature::new(vec![], vec![ValueType::I32; 3]),
    )];
    let c = Compiler::builder().create(&imports, &bindings()).unwrap();
    match c.object_file() {
        Err(Error::UnsupportedSignature { symbol, .. }) => assert_eq!(symbol, "host_hello"),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("malformed signature compiled"),
    }
}

#[test]
fn compile_wat_to_object_file() {
    let wat = r#"
        (module
            (import "env" "hello" (func $hello (param i32)))
            (import "env" "clock" (func $clock (result f64)))
            (func (export "main")
                (call $hello (i32.const 1))))
    "#;
    let dir = tempfile::Builder::new().prefix("bulwarkc").tempdir().unwrap();
    let obj = dir.path().join("trampolines.o");
    let clif = dir.path().join("trampolines.clif");

    let c = Bulwarkc::try_from_bytes(wat).unwrap().with_bindings(bindings());
    c.object_file(&obj).unwrap();
    c.clif_ir(&clif).unwrap();

    let symbols = read_symbols(&std::fs::read(&obj).unwrap());
    assert!(symbols.defined.contains_key("bulwark_trampoline_host_hello"));
    assert!(symbols.defined.contains_key("bulwark_trampoline_host_clock"));
    assert!(!symbols.defined.contains_key("bulwark_trampoline_host_add"));

    let text = std::fs::read_to_string(&clif).unwrap();
    assert_eq!(text.matches("trap stk_ovf").count(), 2);
}

#[test]
fn module_without_bindings_fails() {
    let wat = r#"(module (import "env" "hello" (func (param i32))))"#;
    let dir = tempfile::Builder::new().prefix("bulwarkc").tempdir().unwrap();
    let res = Bulwarkc::try_from_bytes(wat)
        .unwrap()
        .object_file(dir.path().join("out.o"));
    assert!(matches!(res, Err(Error::UnresolvedSymbol { .. })));
}

#[test]
fn generation_is_independent_per_hostcall() {
    use bulwarkc::trampoline::{generate, TrampolineSpec, TrampolineTarget};
    use cranelift_codegen::ir::UserExternalName;
    use cranelift_codegen::settings;
    use std::sync::Arc;

    let isa = cranelift_native::builder()
        .unwrap()
        .finish(settings::Flags::new(settings::builder()))
        .unwrap();
    let imports = Arc::new(imports());

    let generate_all = |isa: &dyn cranelift_codegen::isa::TargetIsa, imports: &[ImportFunction]| {
        imports
            .iter()
            .enumerate()
            .map(|(ix, import)| {
                let func = generate(
                    isa,
                    &TrampolineSpec {
                        hostcall_sym: &import.name,
                        signature: &import.signature,
                    },
                    &TrampolineTarget {
                        trampoline: UserExternalName::new(0, 2 * ix as u32 + 1),
                        hostcall: UserExternalName::new(0, 2 * ix as u32),
                    },
                )
                .unwrap();
                func.display().to_string()
            })
            .collect::<Vec<_>>()
    };

    // the same hostcall yields the same trampoline whichever thread generates it
    let threads: Vec<_> = (0..imports.len())
        .map(|ix| {
            let isa = isa.clone();
            let imports = imports.clone();
            std::thread::spawn(move || generate_all(&*isa, &imports[ix..=ix]).remove(0))
        })
        .collect();
    for (ix, t) in threads.into_iter().enumerate() {
        let text = t.join().unwrap();
        assert_eq!(text, generate_all(&*isa, &imports[ix..=ix]).remove(0));
    }
}
