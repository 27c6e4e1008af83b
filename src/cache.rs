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

//! Settings from the `cache` section of the configuration file.

use std::path::PathBuf;

use log::{debug, warn};
use serde_yaml::{Mapping, Value};

use crate::utils;
use crate::{Error, ErrorKind};

const NULL_CLASS: &str = "dogpile.cache.null";
const MEMORY_CLASS: &str = "dogpile.cache.memory";

/// Cache settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    expiration_time: u64,
    path: PathBuf,
    class: String,
    arguments: Mapping,
    expiration: Mapping,
}

fn default_path() -> PathBuf {
    match dirs::cache_dir() {
        Some(dir) => dir.join("openstack"),
        None => {
            warn!("Cannot find the cache directory, using the current one");
            PathBuf::from(".")
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    }
}

fn parse_seconds(key: &str, value: &Value) -> Result<u64, Error> {
    let parsed = match value {
        Value::Number(num) => num.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("cache {} must be a non-negative integer, got {:?}", key, value),
        )
    })
}

fn sub_mapping(section: &Mapping, key: &str) -> Result<Mapping, Error> {
    match section.get(key) {
        Some(Value::Mapping(mapping)) => Ok(mapping.clone()),
        Some(Value::Null) | None => Ok(Mapping::new()),
        Some(other) => Err(Error::new(
            ErrorKind::InvalidConfig,
            format!("cache {} must be a mapping, got {:?}", key, other),
        )),
    }
}

impl Default for CacheConfig {
    fn default() -> CacheConfig {
        CacheConfig {
            expiration_time: 0,
            path: default_path(),
            class: NULL_CLASS.into(),
            arguments: Mapping::new(),
            expiration: Mapping::new(),
        }
    }
}

impl CacheConfig {
    /// Parse the `cache` section.
    ///
    /// `max_age` is accepted as a legacy name of `expiration_time`. Without an explicit `class`
    /// an in-memory cache is used when the expiration time is positive.
    pub fn from_section(section: Option<&Value>) -> Result<CacheConfig, Error> {
        let section = match section {
            Some(Value::Mapping(section)) => utils::normalize_keys(section.clone()),
            Some(Value::Null) | None => return Ok(CacheConfig::default()),
            Some(other) => {
                return Err(Error::new(
                    ErrorKind::InvalidConfig,
                    format!("cache section must be a mapping, got {:?}", other),
                ));
            }
        };

        let expiration_time = match (section.get("expiration_time"), section.get("max_age")) {
            (Some(value), _) => parse_seconds("expiration_time", value)?,
            (None, Some(value)) => {
                debug!("Using legacy cache max_age as expiration_time");
                parse_seconds("max_age", value)?
            }
            (None, None) => 0,
        };

        let class = match utils::get_str(&section, "class") {
            Some(class) => class.to_string(),
            None if expiration_time > 0 => MEMORY_CLASS.into(),
            None => NULL_CLASS.into(),
        };

        let path = utils::get_str(&section, "path")
            .map(expand_home)
            .unwrap_or_else(default_path);

        Ok(CacheConfig {
            expiration_time,
            path,
            class,
            arguments: sub_mapping(&section, "arguments")?,
            expiration: sub_mapping(&section, "expiration")?,
        })
    }

    /// Default expiration time in seconds, 0 means no caching.
    #[inline]
    pub fn expiration_time(&self) -> u64 {
        self.expiration_time
    }

    /// Cache location.
    #[inline]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Cache backend class name.
    #[inline]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Backend arguments.
    #[inline]
    pub fn arguments(&self) -> &Mapping {
        &self.arguments
    }

    /// Per-resource expiration times.
    #[inline]
    pub fn expiration(&self) -> &Mapping {
        &self.expiration
    }
}
