// Copyright 2018-2020 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Support for `OS_` environment variables.

use std::collections::BTreeMap;
use std::env;
use std::fmt::Debug;
use std::sync::Mutex;

use log::{debug, trace};
use serde_yaml::Mapping;

const PREFIX: &str = "OS_";

/// Variables used by test runners, never treated as configuration.
const IGNORED_PREFIXES: &[&str] = &["OS_TEST", "OS_STD", "OS_LOG_CAPTURE"];

/// Variables that select or modify behavior and never become part of a cloud.
pub(crate) const SELECTORS: &[&str] = &[
    "OS_CLOUD",
    "OS_CLOUD_NAME",
    "OS_CLIENT_CONFIG_FILE",
    "OS_CLIENT_SECURE_FILE",
    "OS_PREFER_IPV6",
    "OS_FORCE_IPV4",
];

/// Source of environment variables.
///
/// The process environment is used by default, tests and embedding applications can provide
/// their own implementation.
pub trait Environment: Debug + Send + Sync {
    /// All variables as name-value pairs.
    fn vars(&self) -> Vec<(String, String)>;

    /// Get a variable.
    fn get(&self, name: &str) -> Option<String>;

    /// Remove a variable, returning its value.
    fn remove(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealEnvironment;

impl Environment for RealEnvironment {
    fn vars(&self) -> Vec<(String, String)> {
        env::vars_os()
            .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
                (Ok(name), Ok(value)) => Some((name, value)),
                (Ok(name), Err(_)) => {
                    trace!("Skipping variable {} with a non-UTF-8 value", name);
                    None
                }
                (Err(name), _) => {
                    trace!("Skipping variable with a non-UTF-8 name {:?}", name);
                    None
                }
            })
            .collect()
    }

    fn get(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }

    fn remove(&self, name: &str) -> Option<String> {
        let result = env::var(name).ok();
        if result.is_some() {
            env::remove_var(name);
        }
        result
    }
}

/// Environment backed by an in-memory map.
#[derive(Debug, Default)]
pub struct MemoryEnvironment {
    vars: Mutex<BTreeMap<String, String>>,
}

impl MemoryEnvironment {
    /// Create an empty environment.
    #[inline]
    pub fn new() -> MemoryEnvironment {
        MemoryEnvironment::default()
    }

    /// Add a variable.
    pub fn with<K, V>(self, name: K, value: V) -> MemoryEnvironment
    where
        K: Into<String>,
        V: Into<String>,
    {
        let _ = self
            .vars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryEnvironment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        MemoryEnvironment {
            vars: Mutex::new(
                iter.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl Environment for MemoryEnvironment {
    fn vars(&self) -> Vec<(String, String)> {
        self.vars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn get(&self, name: &str) -> Option<String> {
        self.vars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    fn remove(&self, name: &str) -> Option<String> {
        self.vars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }
}

/// Remove a variable, treating an empty value as missing.
pub(crate) fn pop_non_empty(env: &dyn Environment, name: &str) -> Option<String> {
    env.remove(name).filter(|value| !value.is_empty())
}

/// Convert a configuration key to the environment variable that may carry it.
#[inline]
pub(crate) fn var_name(key: &str) -> String {
    format!("{}{}", PREFIX, key.to_uppercase())
}

/// Collect configuration keys from `OS_` variables.
///
/// `OS_FOO_BAR` becomes `foo_bar`. Test runner variables and selectors are skipped.
pub(crate) fn env_overrides(env: &dyn Environment) -> Mapping {
    let mut result = Mapping::new();
    for (name, value) in env.vars() {
        if !name.starts_with(PREFIX)
            || IGNORED_PREFIXES.iter().any(|p| name.starts_with(p))
            || SELECTORS.contains(&name.as_str())
        {
            continue;
        }

        let key = name[PREFIX.len()..].to_lowercase();
        trace!("Using {} from the environment as {}", name, key);
        let _ = result.insert(key.into(), value.into());
    }
    result
}

/// Build a cloud from the environment overrides.
///
/// Returns `None` if the only variable is the region name, which does not describe a cloud.
pub(crate) fn env_cloud(overrides: &Mapping) -> Option<Mapping> {
    let meaningful = overrides
        .iter()
        .any(|(key, _)| key.as_str() != Some("region_name"));
    if meaningful {
        debug!(
            "Creating a cloud from {} environment variables",
            overrides.len()
        );
        Some(overrides.clone())
    } else {
        None
    }
}
