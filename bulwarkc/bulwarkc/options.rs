use anyhow::{bail, Error};
use bulwarkc::OptLevel;
use clap::{Arg, ArgMatches};
use std::path::PathBuf;
use std::str::FromStr;
use target_lexicon::Triple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenOutput {
    Clif,
    Obj,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorStyle {
    Human,
    Json,
}

impl Default for ErrorStyle {
    fn default() -> Self {
        ErrorStyle::Human
    }
}

#[derive(Debug)]
pub struct Options {
    pub output: PathBuf,
    pub input: Vec<PathBuf>,
    pub codegen: CodegenOutput,
    pub binding_files: Vec<PathBuf>,
    pub opt_level: OptLevel,
    pub error_style: ErrorStyle,
    pub target: Triple,
}

impl Options {
    pub fn from_args(m: &ArgMatches<'_>) -> Result<Self, Error> {
        let input: Vec<PathBuf> = m
            .values_of("input")
            .unwrap_or_default()
            .map(PathBuf::from)
            .collect();

        let output = PathBuf::from(m.value_of("output").unwrap_or("a.out"));

        let binding_files: Vec<PathBuf> = m
            .values_of("bindings")
            .unwrap_or_default()
            .map(PathBuf::from)
            .collect();

        let codegen = match m.value_of("emit") {
            None | Some("obj") => CodegenOutput::Obj,
            Some("clif") => CodegenOutput::Clif,
            Some(other) => bail!("unknown value for emit: {}", other),
        };

        let opt_level = match m.value_of("opt_level") {
            None => OptLevel::SpeedAndSize,
            Some("0") | Some("none") => OptLevel::None,
            Some("1") | Some("speed") => OptLevel::Speed,
            Some("2") | Some("speed_and_size") => OptLevel::SpeedAndSize,
            Some(other) => bail!("unknown value for opt-level: {}", other),
        };

        let target = match m.value_of("target") {
            None => Triple::host(),
            Some(t) => match Triple::from_str(t) {
                Ok(triple) => triple,
                Err(e) => bail!("specified target {} is invalid: {}", t, e),
            },
        };

        let error_style = match m.value_of("error_style") {
            None => ErrorStyle::default(),
            Some("human") => ErrorStyle::Human,
            Some("json") => ErrorStyle::Json,
            Some(other) => bail!("unknown value for error-style: {}", other),
        };

        Ok(Options {
            output,
            input,
            codegen,
            binding_files,
            opt_level,
            error_style,
            target,
        })
    }

    pub fn get() -> Result<Self, Error> {
        let _ = include_str!("../Cargo.toml");
        let m = app_from_crate!()
            .arg(
                Arg::with_name("emit")
                    .long("emit")
                    .takes_value(true)
                    .possible_values(&["obj", "clif"])
                    .help("type of code to generate (default: obj)"),
            )
            .arg(
                Arg::with_name("output")
                    .short("o")
                    .long("output")
                    .takes_value(true)
                    .multiple(false)
                    .help("output destination, defaults to a.out if unspecified"),
            )
            .arg(
                Arg::with_name("target")
                    .long("target")
                    .takes_value(true)
                    .multiple(false)
                    .help(
                        format!(
                            "target to compile for, defaults to {} if unspecified",
                            Triple::host()
                        )
                        .as_str(),
                    ),
            )
            .arg(
                Arg::with_name("bindings")
                    .long("bindings")
                    .takes_value(true)
                    .multiple(true)
                    .number_of_values(1)
                    .help("path to bindings json file"),
            )
            .arg(
                Arg::with_name("opt_level")
                    .long("opt-level")
                    .takes_value(true)
                    .possible_values(&["0", "1", "2", "none", "speed", "speed_and_size"])
                    .help("optimization level (default: 'speed_and_size'). 0 is alias to 'none', 1 to 'speed', 2 to 'speed_and_size'"),
            )
            .arg(
                Arg::with_name("error_style")
                    .long("error-style")
                    .takes_value(true)
                    .possible_values(&["human", "json"])
                    .help("Style of error reporting (default: human)"),
            )
            .arg(
                Arg::with_name("input")
                    .multiple(false)
                    .required(true)
                    .help("input file: a WebAssembly module whose function imports need trampolines"),
            )
            .get_matches();

        Self::from_args(&m)
    }
}
