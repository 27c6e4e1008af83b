// Copyright 2021 Dmitry Tantsur <dtantsur@protonmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Built-in defaults and vendor profiles.
//!
//! Both are parsed from data bundled with the crate on first access and cached for the lifetime
//! of the process. Callers always receive copies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use log::debug;
use serde_yaml::{Mapping, Value};

use crate::utils;
use crate::{Error, ErrorKind};

const DEFAULTS_JSON: &str = include_str!("defaults.json");
const VENDORS_YAML: &str = include_str!("vendors.yaml");

#[derive(Debug)]
struct Builtins {
    defaults: Mapping,
    vendors: HashMap<String, Mapping>,
}

lazy_static! {
    static ref BUILTINS: Mutex<Option<Arc<Builtins>>> = Mutex::new(None);
}

fn parse_defaults() -> Result<Mapping, Error> {
    let json: serde_json::Value = serde_json::from_str(DEFAULTS_JSON).map_err(|e| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Cannot parse built-in defaults: {}", e),
        )
    })?;
    match serde_yaml::to_value(json)? {
        Value::Mapping(mapping) => Ok(utils::normalize_keys(mapping)),
        other => Err(Error::new(
            ErrorKind::InvalidConfig,
            format!("Built-in defaults are {:?}, not a mapping", other),
        )),
    }
}

/// Parse a `clouds-public.yaml`-style document into profiles keyed by name.
pub(crate) fn parse_profiles(
    mut root: Mapping,
    source: &str,
) -> Result<HashMap<String, Mapping>, Error> {
    let profiles = match root.remove("public-clouds") {
        Some(Value::Mapping(mapping)) => mapping,
        Some(Value::Null) | None => Mapping::new(),
        Some(other) => {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                format!("public-clouds object in {} must be a mapping, got {:?}", source, other),
            ));
        }
    };

    let mut result = HashMap::with_capacity(profiles.len());
    for (name, profile) in profiles {
        match (name, profile) {
            (Value::String(name), Value::Mapping(profile)) => {
                let _ = result.insert(name, utils::normalize_keys(profile));
            }
            (name, _) => {
                return Err(Error::new(
                    ErrorKind::InvalidConfig,
                    format!("Profile {:?} in {} is not a mapping", name, source),
                ));
            }
        }
    }
    Ok(result)
}

fn load() -> Result<Builtins, Error> {
    let defaults = parse_defaults()?;
    let vendors = match serde_yaml::from_str(VENDORS_YAML)? {
        Value::Mapping(root) => parse_profiles(root, "built-in vendor profiles")?,
        other => {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                format!("Built-in vendor profiles are {:?}, not a mapping", other),
            ));
        }
    };
    debug!(
        "Loaded {} built-in defaults and {} vendor profiles",
        defaults.len(),
        vendors.len()
    );
    Ok(Builtins { defaults, vendors })
}

fn builtins() -> Result<Arc<Builtins>, Error> {
    // The lock is held during loading so that concurrent first callers wait for a single load.
    let mut guard = BUILTINS.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(ref cached) = *guard {
        return Ok(Arc::clone(cached));
    }

    let loaded = Arc::new(load()?);
    *guard = Some(Arc::clone(&loaded));
    Ok(loaded)
}

/// Get a copy of the built-in defaults.
pub fn get_defaults() -> Result<Mapping, Error> {
    builtins().map(|b| b.defaults.clone())
}

/// Get a copy of a bundled vendor profile.
///
/// Returns `None` if no such profile is bundled.
pub fn get_profile<S: AsRef<str>>(name: S) -> Result<Option<Mapping>, Error> {
    builtins().map(|b| b.vendors.get(name.as_ref()).cloned())
}

/// Names of all bundled vendor profiles.
pub fn profile_names() -> Result<Vec<String>, Error> {
    let mut result: Vec<String> = builtins()?.vendors.keys().cloned().collect();
    result.sort();
    Ok(result)
}
