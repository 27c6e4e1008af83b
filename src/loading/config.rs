// Copyright 2018-2021 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Support for cloud configuration files.

use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_yaml::{Mapping, Value};

use crate::utils;
use crate::{Error, ErrorKind};

/// Names of the main configuration file.
pub const CONFIG_FILES: &[&str] = &["clouds.yaml", "clouds.yml"];
/// Names of the vendor profiles file.
pub const VENDOR_FILES: &[&str] = &["clouds-public.yaml", "clouds-public.yml"];
/// Names of the file with secrets.
pub const SECURE_FILES: &[&str] = &["secure.yaml", "secure.yml"];

/// Directories searched for configuration files, in the priority order.
///
/// These are the current directory, the user configuration directory of the platform,
/// `~/.config/openstack`, the site configuration directory and `/etc/openstack`.
pub fn config_dirs() -> Vec<PathBuf> {
    let mut result = Vec::with_capacity(5);
    match env::current_dir() {
        Ok(current) => result.push(current),
        Err(e) => warn!("Cannot determine the current directory: {}", e),
    }

    if let Some(config) = dirs::config_dir() {
        result.push(config.join("openstack"));
    }

    if let Some(home) = dirs::home_dir() {
        result.push(home.join(".config").join("openstack"));
    } else {
        warn!("Cannot find home directory");
    }

    if cfg!(unix) {
        result.push(PathBuf::from("/etc/xdg/openstack"));
    }
    result.push(PathBuf::from("/etc/openstack"));

    let mut unique = Vec::with_capacity(result.len());
    for dir in result {
        if !unique.contains(&dir) {
            unique.push(dir);
        }
    }
    unique
}

/// All candidate paths for the given file names.
pub fn search_paths(names: &[&str]) -> Vec<PathBuf> {
    config_dirs()
        .into_iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .collect()
}

/// Read a YAML file with a mapping at the root.
///
/// Returns `None` if the file does not exist. An empty file is an empty mapping.
pub fn read_yaml(path: &Path) -> Result<Option<Mapping>, Error> {
    let content = match File::open(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::new(
                ErrorKind::IoError,
                format!("Cannot read {}: {}", path.display(), e),
            ));
        }
    };

    match serde_yaml::from_reader(content).map_err(|e| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Cannot parse {}: {}", path.display(), e),
        )
    })? {
        Value::Mapping(mapping) => Ok(Some(mapping)),
        Value::Null => Ok(Some(Mapping::new())),
        other => Err(Error::new(
            ErrorKind::InvalidConfig,
            format!("Root of {} is {:?}, not a mapping", path.display(), other),
        )),
    }
}

/// Load the first existing file out of the candidates.
pub fn load_first(paths: &[PathBuf]) -> Result<Option<(PathBuf, Mapping)>, Error> {
    for path in paths {
        if let Some(mapping) = read_yaml(path)? {
            debug!("Loaded configuration from {}", path.display());
            return Ok(Some((path.clone(), mapping)));
        }
    }
    Ok(None)
}

/// Extract the `clouds` mapping from a configuration file root.
pub(crate) fn clouds_mapping(root: &mut Mapping, source: &str) -> Result<Mapping, Error> {
    match root.remove("clouds") {
        Some(Value::Mapping(clouds)) => Ok(clouds),
        Some(Value::Null) | None => Ok(Mapping::new()),
        Some(other) => Err(Error::new(
            ErrorKind::InvalidConfig,
            format!("clouds object in {} must be a mapping, got {:?}", source, other),
        )),
    }
}

/// Update a single cloud in a configuration file.
///
/// A missing file is treated as empty. The `set_config` values are merged into the existing
/// cloud (which is created if needed) and the whole file is rewritten. Concurrent writers are
/// not coordinated.
pub fn set_one_cloud<P, S>(config_file: P, cloud: S, set_config: Mapping) -> Result<(), Error>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let path = config_file.as_ref();
    let cloud = cloud.as_ref();
    let mut root = read_yaml(path)?.unwrap_or_default();
    let clouds = utils::ensure_mapping(&mut root, "clouds");
    let stanza = utils::ensure_mapping(clouds, cloud);
    utils::merge_mappings(set_config, stanza, true);

    let content = serde_yaml::to_string(&root)?;
    fs::write(path, content).map_err(|e| {
        Error::new(
            ErrorKind::IoError,
            format!("Cannot write {}: {}", path.display(), e),
        )
    })?;
    debug!("Updated cloud {} in {}", cloud, path.display());
    Ok(())
}
