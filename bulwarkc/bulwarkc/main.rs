mod options;

#[macro_use]
extern crate clap;

use crate::options::{CodegenOutput, ErrorStyle, Options};
use anyhow::{format_err, Error};
use bulwark_module::bindings::Bindings;
use bulwarkc::{Bulwarkc, BulwarkcOpts};
use log::info;
use serde::Serialize;
use std::process;

#[derive(Clone, Debug, Serialize)]
pub struct SerializedBulwarkcError {
    error: String,
}

impl From<Error> for SerializedBulwarkcError {
    fn from(e: Error) -> Self {
        SerializedBulwarkcError {
            error: format!("{:#}", e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum BindingError {
    #[error("adding bindings from {1}")]
    ExtendError(#[source] bulwark_module::Error, String),
    #[error("bindings file {1}")]
    FileError(#[source] bulwark_module::Error, String),
}

fn main() {
    env_logger::init();

    let opts = match Options::get() {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("Error: {:#}\n", err);
            process::exit(1);
        }
    };

    if let Err(err) = run(&opts) {
        match opts.error_style {
            ErrorStyle::Human => {
                eprintln!("Error: {:#}\n", err);
            }
            ErrorStyle::Json => {
                let errs: Vec<SerializedBulwarkcError> = vec![err.into()];
                match serde_json::to_string(&errs) {
                    Ok(json) => eprintln!("{}", json),
                    Err(e) => eprintln!("Error: serializing error report: {}", e),
                }
            }
        }
        process::exit(1);
    }
}

pub fn run(opts: &Options) -> Result<(), Error> {
    info!("bulwarkc {:?}", opts);

    let input = &match opts.input.len() {
        0 => Err(format_err!("must provide at least one input")),
        1 => Ok(opts.input[0].clone()),
        _ => Err(format_err!("provided too many inputs: {:?}", opts.input)),
    }?;

    let mut bindings = Bindings::empty();
    for file in opts.binding_files.iter() {
        let file_bindings = Bindings::from_file(file).map_err(|source| {
            let file = format!("{:?}", file);
            BindingError::FileError(source, file)
        })?;

        bindings.extend(&file_bindings).map_err(|source| {
            let file = format!("{:?}", file);
            BindingError::ExtendError(source, file)
        })?;
    }

    let c = Bulwarkc::new(input)
        .with_bindings(bindings)
        .with_opt_level(opts.opt_level)
        .with_target(opts.target.clone());

    match opts.codegen {
        CodegenOutput::Obj => c.object_file(&opts.output)?,
        CodegenOutput::Clif => c.clif_ir(&opts.output)?,
    }
    Ok(())
}
