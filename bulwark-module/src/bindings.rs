//! Resolution of guest imports to host symbols.
//!
//! Bindings are a two-level map from import namespace and import name to the symbol of the
//! hostcall implementing it. On disk they are a JSON object of objects:
//!
//! ```json
//! { "env": { "hello": "host_hello" } }
//! ```

use crate::error::Error;
use serde_json::{self, Map, Value};
use std::collections::{hash_map::Entry, HashMap};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    bindings: HashMap<String, HashMap<String, String>>,
}

impl Bindings {
    pub fn new(bindings: HashMap<String, HashMap<String, String>>) -> Bindings {
        Self { bindings }
    }

    /// Bindings for the conventional `env` namespace only.
    pub fn env(env_bindings: HashMap<String, String>) -> Bindings {
        let mut bindings = HashMap::new();
        bindings.insert("env".to_owned(), env_bindings);
        Self::new(bindings)
    }

    pub fn empty() -> Bindings {
        Self::default()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Bindings, Error> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_str(&contents)
    }

    pub fn from_str(s: &str) -> Result<Bindings, Error> {
        let top: Value = serde_json::from_str(s)?;
        Self::from_json(&top)
    }

    pub fn from_json(top: &Value) -> Result<Bindings, Error> {
        let top = top.as_object().ok_or(Error::ParseJsonObjError)?;
        let mut bindings = HashMap::new();
        for (module, names) in top.iter() {
            let names = names.as_object().ok_or_else(|| Error::ParseError {
                key: module.clone(),
                value: names.to_string(),
            })?;
            let mut module_bindings = HashMap::new();
            for (name, symbol) in names.iter() {
                let symbol = symbol.as_str().ok_or_else(|| Error::ParseError {
                    key: format!("{}::{}", module, name),
                    value: symbol.to_string(),
                })?;
                module_bindings.insert(name.clone(), symbol.to_owned());
            }
            bindings.insert(module.clone(), module_bindings);
        }
        Ok(Self::new(bindings))
    }

    /// Merge `other` into `self`.
    ///
    /// Binding the same import to the same symbol twice is allowed; binding it to a different
    /// symbol is an error and leaves `self` with whatever was merged before the conflict.
    pub fn extend(&mut self, other: &Bindings) -> Result<(), Error> {
        for (module, names) in other.bindings.iter() {
            let existing = self
                .bindings
                .entry(module.clone())
                .or_insert_with(HashMap::new);
            for (name, symbol) in names.iter() {
                match existing.entry(name.clone()) {
                    Entry::Occupied(e) => {
                        if e.get() != symbol {
                            return Err(Error::RebindError {
                                key: format!("{}::{}", module, name),
                                binding: e.get().clone(),
                                attempt: symbol.clone(),
                            });
                        }
                    }
                    Entry::Vacant(e) => {
                        e.insert(symbol.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Look up the host symbol bound to `module::symbol`.
    pub fn translate(&self, module: &str, symbol: &str) -> Result<&str, Error> {
        let names = self
            .bindings
            .get(module)
            .ok_or_else(|| Error::UnknownModule {
                module: module.to_owned(),
                symbol: symbol.to_owned(),
            })?;
        names
            .get(symbol)
            .map(|s| s.as_str())
            .ok_or_else(|| Error::UnknownSymbol {
                module: module.to_owned(),
                symbol: symbol.to_owned(),
            })
    }

    pub fn to_string(&self) -> Result<String, Error> {
        let s = serde_json::to_string(&self.to_json())?;
        Ok(s)
    }

    fn to_json(&self) -> Value {
        let mut top = Map::new();
        for (module, names) in self.bindings.iter() {
            let mut inner = Map::new();
            for (name, symbol) in names.iter() {
                inner.insert(name.clone(), Value::String(symbol.clone()));
            }
            top.insert(module.clone(), Value::Object(inner));
        }
        Value::Object(top)
    }
}
