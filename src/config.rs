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

//! Cloud configuration resolver.
//!
//! Sources are merged in the following order, later sources winning:
//!
//! 1. built-in defaults,
//! 2. the vendor profile referenced by the cloud,
//! 3. the cloud entry in `clouds.yaml` (with `secure.yaml` merged over it),
//! 4. `OS_*` environment variables,
//! 5. explicitly passed arguments.
//!
//! The `auth` mapping is merged key by key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, trace, warn};
use serde_yaml::{Mapping, Value};

use crate::auth::{self, AuthOptionSchema, AuthPlugin, BuiltinPlugins, PluginLoader};
use crate::cache::CacheConfig;
use crate::compat;
use crate::defaults;
use crate::loading::{self, CloudConfig, Environment, RealEnvironment};
use crate::utils;
use crate::{Error, ErrorKind};

/// Name of the cloud created from environment variables unless `OS_CLOUD_NAME` is set.
pub const DEFAULT_ENV_CLOUD: &str = "envvars";

const BOOL_KEYS: &[&str] = &["insecure", "cache"];
const FORMAT_EXCLUSIONS: &[&str] = &["password"];

#[derive(Debug, Clone, PartialEq)]
struct Region {
    name: String,
    values: Mapping,
}

impl Region {
    fn anonymous(name: Option<String>) -> Region {
        Region {
            name: name.unwrap_or_default(),
            values: Mapping::new(),
        }
    }
}

fn expand_region(value: &Value) -> Result<Region, Error> {
    match value {
        Value::Mapping(region) => {
            let name = region
                .get("name")
                .and_then(utils::scalar_to_string)
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidConfig,
                        format!("Region entry {:?} has no name", region),
                    )
                })?;
            let values = match region.get("values") {
                Some(Value::Mapping(values)) => utils::normalize_keys(values.clone()),
                Some(Value::Null) | None => Mapping::new(),
                Some(other) => {
                    return Err(Error::new(
                        ErrorKind::InvalidConfig,
                        format!("Values of region {} must be a mapping, got {:?}", name, other),
                    ));
                }
            };
            Ok(Region { name, values })
        }
        other => utils::scalar_to_string(other)
            .map(|name| Region {
                name,
                values: Mapping::new(),
            })
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidConfig,
                    format!("Invalid region entry {:?}", other),
                )
            }),
    }
}

fn expand_regions(values: &[Value]) -> Result<Vec<Region>, Error> {
    values.iter().map(expand_region).collect()
}

/// Regions declared by a cloud or a profile, `None` if there are none.
fn declared_regions(config: &Mapping) -> Result<Option<Vec<Region>>, Error> {
    let regions = match (config.get("regions"), config.get("region_name")) {
        (Some(Value::Sequence(regions)), _) => expand_regions(regions)?,
        (Some(Value::Null), _) | (None, None) | (None, Some(Value::Null)) => Vec::new(),
        (Some(other), _) => vec![expand_region(other)?],
        (None, Some(Value::Sequence(names))) => expand_regions(names)?,
        (None, Some(name)) => {
            let name = utils::scalar_to_string(name).unwrap_or_default();
            let names: Vec<&str> = name
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect();
            if names.len() > 1 {
                warn!(
                    "Comma separated lists in region_name are deprecated, use a regions list instead"
                );
            }
            names
                .into_iter()
                .map(|name| Region {
                    name: name.to_string(),
                    values: Mapping::new(),
                })
                .collect()
        }
    };
    Ok(if regions.is_empty() {
        None
    } else {
        Some(regions)
    })
}

/// Remove top-level and `auth` entries with null values.
fn strip_nulls(config: &mut Mapping) {
    fn strip(mapping: &mut Mapping) {
        let nulls: Vec<Value> = mapping
            .iter()
            .filter(|(_, value)| value.is_null())
            .map(|(key, _)| key.clone())
            .collect();
        for key in nulls {
            let _ = mapping.remove(&key);
        }
    }

    strip(config);
    if let Some(Value::Mapping(auth)) = config.get_mut("auth") {
        strip(auth);
    }
}

/// Coerce `insecure` and `cache` to booleans, a present `insecure` also sets `verify`.
///
/// Other values of `verify` are kept as they are.
fn coerce_booleans(config: &mut Mapping) {
    for key in BOOL_KEYS {
        if let Some(value) = config.get_mut(*key) {
            if !value.is_bool() {
                *value = Value::Bool(utils::get_boolean(value));
            }
        }
    }

    if let Some(insecure) = config.get("insecure").and_then(Value::as_bool) {
        let _ = config.insert("verify".into(), Value::Bool(!insecure));
    }
}

fn interpolate_strings(mapping: &mut Mapping, lookup: &HashMap<String, String>) {
    for (key, value) in mapping.iter_mut() {
        let excluded = key
            .as_str()
            .map(|key| FORMAT_EXCLUSIONS.contains(&key))
            .unwrap_or(true);
        if excluded {
            continue;
        }

        if let Value::String(template) = value {
            if template.contains('{') || template.contains('}') {
                *template = utils::interpolate(template, |name: &str| lookup.get(name).cloned());
            }
        }
    }
}

/// Expand `{key}` templates in top-level and `auth` values in a single pass.
///
/// Top-level scalars take priority over `auth` scalars with the same name.
fn interpolate_config(config: &mut Mapping) {
    let mut lookup = HashMap::new();
    let scalars = |mapping: &Mapping| -> Vec<(String, String)> {
        mapping
            .iter()
            .filter_map(|(key, value)| {
                key.as_str()
                    .and_then(|key| utils::scalar_to_string(value).map(|v| (key.to_string(), v)))
            })
            .collect()
    };
    if let Some(Value::Mapping(auth)) = config.get("auth") {
        lookup.extend(scalars(auth));
    }
    lookup.extend(scalars(config));

    interpolate_strings(config, &lookup);
    if let Some(Value::Mapping(auth)) = config.get_mut("auth") {
        interpolate_strings(auth, &lookup);
    }
}

fn find_winning_value(mapping: &Mapping, keys: &[String]) -> Option<Value> {
    keys.iter()
        .filter_map(|key| mapping.get(key.as_str()))
        .find(|value| !utils::is_empty_value(value))
        .cloned()
}

/// Move the options of the schema into `auth` under their destination names.
///
/// For every option the canonical name is preferred over deprecated names, and `auth` is
/// preferred over the top level. All source keys are removed. Returns the names of required
/// options without a value.
fn apply_schema(config: &mut Mapping, schema: &dyn AuthOptionSchema) -> Vec<String> {
    let mut auth = match config.remove("auth") {
        Some(Value::Mapping(auth)) => auth,
        _ => Mapping::new(),
    };

    let mut missing = Vec::new();
    for option in schema.options() {
        let keys = option.source_keys();
        let winner =
            find_winning_value(&auth, &keys).or_else(|| find_winning_value(config, &keys));
        for key in &keys {
            let _ = config.remove(key.as_str());
            let _ = auth.remove(key.as_str());
        }

        match winner {
            Some(value) => {
                let _ = auth.insert(option.dest().into(), value);
            }
            None if option.is_required() => missing.push(option.name().to_string()),
            None => {}
        }
    }

    let _ = config.insert("auth".into(), Value::Mapping(auth));
    missing
}

/// Builder for [OpenStackConfig](struct.OpenStackConfig.html).
#[derive(Debug, Default)]
pub struct OpenStackConfigBuilder {
    config_files: Option<Vec<PathBuf>>,
    vendor_files: Option<Vec<PathBuf>>,
    secure_files: Option<Vec<PathBuf>>,
    override_defaults: Option<Mapping>,
    force_ipv4: Option<bool>,
    environment: Option<Arc<dyn Environment>>,
    plugin_loader: Option<Arc<dyn PluginLoader>>,
    legacy_plugin_loader: Option<Arc<dyn PluginLoader>>,
    skip_yaml_config: bool,
}

fn into_paths<I, P>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths.into_iter().map(Into::into).collect()
}

fn section_source(path: &Path) -> String {
    path.display().to_string()
}

impl OpenStackConfigBuilder {
    /// Use these `clouds.yaml` candidates instead of the standard locations.
    pub fn with_config_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.config_files = Some(into_paths(paths));
        self
    }

    /// Use these `clouds-public.yaml` candidates instead of the standard locations.
    pub fn with_vendor_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.vendor_files = Some(into_paths(paths));
        self
    }

    /// Use these `secure.yaml` candidates instead of the standard locations.
    pub fn with_secure_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.secure_files = Some(into_paths(paths));
        self
    }

    /// Values to merge over the built-in defaults.
    pub fn with_override_defaults(mut self, defaults: Mapping) -> Self {
        self.override_defaults = Some(defaults);
        self
    }

    /// Force (or disable forcing) IPv4 regardless of the `client` settings.
    pub fn with_force_ipv4(mut self, force_ipv4: bool) -> Self {
        self.force_ipv4 = Some(force_ipv4);
        self
    }

    /// Use a custom source of environment variables.
    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Use a custom loader of authentication plugins.
    pub fn with_plugin_loader<L: PluginLoader + 'static>(mut self, loader: L) -> Self {
        self.plugin_loader = Some(Arc::new(loader));
        self
    }

    /// Loader to try when the main loader does not know the authentication type.
    pub fn with_legacy_plugin_loader<L: PluginLoader + 'static>(mut self, loader: L) -> Self {
        self.legacy_plugin_loader = Some(Arc::new(loader));
        self
    }

    /// Whether to read configuration files at all (the default is true).
    pub fn with_load_yaml_config(mut self, load: bool) -> Self {
        self.skip_yaml_config = !load;
        self
    }

    /// Load the configuration.
    ///
    /// Selector variables (`OS_CLOUD`, `OS_CLOUD_NAME`, `OS_CLIENT_CONFIG_FILE`,
    /// `OS_CLIENT_SECURE_FILE`, `OS_PREFER_IPV6`, `OS_FORCE_IPV4`) are removed from the
    /// environment.
    pub fn build(self) -> Result<OpenStackConfig, Error> {
        let environment: Arc<dyn Environment> = match self.environment {
            Some(environment) => environment,
            None => Arc::new(RealEnvironment),
        };
        let env = environment.as_ref();

        let mut config_files = self
            .config_files
            .unwrap_or_else(|| loading::search_paths(loading::CONFIG_FILES));
        if let Some(path) = loading::pop_non_empty(env, "OS_CLIENT_CONFIG_FILE") {
            config_files.insert(0, path.into());
        }
        let mut secure_files = self
            .secure_files
            .unwrap_or_else(|| loading::search_paths(loading::SECURE_FILES));
        if let Some(path) = loading::pop_non_empty(env, "OS_CLIENT_SECURE_FILE") {
            secure_files.insert(0, path.into());
        }
        let vendor_files = self
            .vendor_files
            .unwrap_or_else(|| loading::search_paths(loading::VENDOR_FILES));

        let env_cloud_name = loading::pop_non_empty(env, "OS_CLOUD_NAME")
            .unwrap_or_else(|| DEFAULT_ENV_CLOUD.to_string());
        let mut default_cloud = loading::pop_non_empty(env, "OS_CLOUD");
        let prefer_ipv6_env = loading::pop_non_empty(env, "OS_PREFER_IPV6");
        let force_ipv4_env = loading::pop_non_empty(env, "OS_FORCE_IPV4");

        let mut config_filename = None;
        let mut clouds = Mapping::new();
        let mut extra = Mapping::new();
        let mut vendors = HashMap::new();
        if self.skip_yaml_config {
            debug!("Loading configuration files is disabled");
        } else {
            if let Some((path, mut root)) = loading::load_first(&config_files)? {
                clouds = loading::clouds_mapping(&mut root, &section_source(&path))?;
                extra = utils::normalize_keys(root);
                config_filename = Some(path);
            } else {
                debug!("No clouds.yaml found in {:?}", config_files);
            }

            if let Some((path, mut root)) = loading::load_first(&secure_files)? {
                let secure = loading::clouds_mapping(&mut root, &section_source(&path))?;
                utils::merge_mappings(secure, &mut clouds, true);
            }

            if let Some((path, root)) = loading::load_first(&vendor_files)? {
                vendors = defaults::parse_profiles(root, &section_source(&path))?;
            }
        }

        if clouds.contains_key(env_cloud_name.as_str()) {
            return Err(Error::new(
                ErrorKind::ConflictingConfig,
                format!(
                    "{} defines a cloud named {}, but it is also the name of the cloud \
                     created from environment variables; rename one of them or set \
                     OS_CLOUD_NAME",
                    config_filename
                        .as_deref()
                        .map(section_source)
                        .unwrap_or_else(|| "Configuration".into()),
                    env_cloud_name
                ),
            ));
        }

        let env_overrides = loading::env_overrides(env);
        if let Some(env_cloud) = loading::env_cloud(&env_overrides) {
            let _ = clouds.insert(env_cloud_name.clone().into(), Value::Mapping(env_cloud));
            if default_cloud.is_none() {
                default_cloud = Some(env_cloud_name.clone());
            }
        }

        let mut defaults = defaults::get_defaults()?;
        if let Some(override_defaults) = self.override_defaults {
            utils::merge_mappings(utils::normalize_keys(override_defaults), &mut defaults, true);
        }

        let force_ipv4 = match self.force_ipv4 {
            Some(force_ipv4) => force_ipv4,
            None => {
                let client = match extra.get("client") {
                    Some(Value::Mapping(client)) => client.clone(),
                    _ => Mapping::new(),
                };
                let prefer_ipv6 = prefer_ipv6_env
                    .map(Value::from)
                    .or_else(|| client.get("prefer_ipv6").cloned())
                    .map(|value| utils::get_boolean(&value))
                    .unwrap_or(true);
                let force_ipv4 = force_ipv4_env
                    .map(Value::from)
                    .or_else(|| {
                        client
                            .get("force_ipv4")
                            .or_else(|| client.get("broken_ipv6"))
                            .cloned()
                    })
                    .map(|value| utils::get_boolean(&value))
                    .unwrap_or(false);
                force_ipv4 || !prefer_ipv6
            }
        };

        let cache = CacheConfig::from_section(extra.get("cache"))?;
        let plugin_loader: Arc<dyn PluginLoader> = match self.plugin_loader {
            Some(loader) => loader,
            None => Arc::new(BuiltinPlugins::new()),
        };

        debug!(
            "Loaded {} cloud(s), default cloud is {:?}",
            clouds.len(),
            default_cloud
        );
        Ok(OpenStackConfig {
            defaults,
            clouds,
            extra,
            vendors,
            config_files,
            config_filename,
            env_cloud_name,
            default_cloud,
            env_overrides,
            force_ipv4,
            cache,
            environment,
            plugin_loader,
            legacy_plugin_loader: self.legacy_plugin_loader,
        })
    }
}

/// Loaded cloud configuration, source of resolved [CloudConfig](struct.CloudConfig.html)
/// objects.
#[derive(Debug)]
pub struct OpenStackConfig {
    defaults: Mapping,
    clouds: Mapping,
    extra: Mapping,
    vendors: HashMap<String, Mapping>,
    config_files: Vec<PathBuf>,
    config_filename: Option<PathBuf>,
    env_cloud_name: String,
    default_cloud: Option<String>,
    env_overrides: Mapping,
    force_ipv4: bool,
    cache: CacheConfig,
    environment: Arc<dyn Environment>,
    plugin_loader: Arc<dyn PluginLoader>,
    legacy_plugin_loader: Option<Arc<dyn PluginLoader>>,
}

impl OpenStackConfig {
    /// Load the configuration from the standard locations and the process environment.
    #[inline]
    pub fn new() -> Result<OpenStackConfig, Error> {
        OpenStackConfig::builder().build()
    }

    /// Start building a configuration.
    #[inline]
    pub fn builder() -> OpenStackConfigBuilder {
        OpenStackConfigBuilder::default()
    }

    /// Update a cloud in a configuration file, see [set_one_cloud](fn.set_one_cloud.html).
    #[inline]
    pub fn set_one_cloud<P, S>(config_file: P, cloud: S, set_config: Mapping) -> Result<(), Error>
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        loading::set_one_cloud(config_file, cloud, set_config)
    }

    /// Path to the loaded `clouds.yaml`, if any.
    #[inline]
    pub fn config_filename(&self) -> Option<&Path> {
        self.config_filename.as_deref()
    }

    /// Name of the cloud created from environment variables.
    #[inline]
    pub fn env_cloud_name(&self) -> &str {
        &self.env_cloud_name
    }

    /// Cloud used when none is requested explicitly.
    #[inline]
    pub fn default_cloud(&self) -> Option<&str> {
        self.default_cloud.as_deref()
    }

    /// Names of all known clouds, including the environment cloud.
    pub fn get_cloud_names(&self) -> Vec<String> {
        self.clouds
            .iter()
            .filter_map(|(key, _)| key.as_str().map(String::from))
            .collect()
    }

    /// Names of the regions of a cloud, a single empty name if none are declared.
    pub fn get_region_names<S: AsRef<str>>(&self, cloud: S) -> Result<Vec<String>, Error> {
        let (stanza, profile) = self.cloud_sources(Some(cloud.as_ref()))?;
        let regions = self.known_regions(&stanza, profile.as_ref())?;
        Ok(if regions.is_empty() {
            vec![String::new()]
        } else {
            regions.into_iter().map(|region| region.name).collect()
        })
    }

    /// Resolve every cloud in every region without validating authentication.
    pub fn get_all_clouds(&self) -> Result<Vec<CloudConfig>, Error> {
        let mut result = Vec::new();
        for cloud in self.get_cloud_names() {
            for region in self.get_region_names(&cloud)? {
                let mut kwargs = Mapping::new();
                if !region.is_empty() {
                    let _ = kwargs.insert("region_name".into(), region.into());
                }
                result.push(self.get_one_cloud(Some(cloud.as_str()), false, None, kwargs)?);
            }
        }
        Ok(result)
    }

    /// A top-level section of `clouds.yaml` other than `clouds`.
    ///
    /// Values from the file are merged over `defaults`.
    pub fn get_extra_config<S: AsRef<str>>(
        &self,
        key: S,
        defaults: Option<Mapping>,
    ) -> Result<Mapping, Error> {
        let key = utils::normalize_key(key.as_ref());
        if key == "clouds" {
            return Err(Error::new(
                ErrorKind::InvalidConfig,
                "clouds is not an extra configuration section",
            ));
        }

        let mut result = utils::normalize_keys(defaults.unwrap_or_default());
        match self.extra.get(key.as_str()) {
            Some(Value::Mapping(section)) => {
                utils::merge_mappings(section.clone(), &mut result, true);
            }
            Some(Value::Null) | None => {}
            Some(other) => {
                return Err(Error::new(
                    ErrorKind::InvalidConfig,
                    format!("Section {} must be a mapping, got {:?}", key, other),
                ));
            }
        }
        Ok(result)
    }

    /// Cache settings.
    #[inline]
    pub fn cache_config(&self) -> &CacheConfig {
        &self.cache
    }

    /// Default cache expiration time in seconds.
    #[inline]
    pub fn get_cache_expiration_time(&self) -> u64 {
        self.cache.expiration_time()
    }

    /// Cache location.
    #[inline]
    pub fn get_cache_path(&self) -> &Path {
        self.cache.path()
    }

    /// Cache backend class.
    #[inline]
    pub fn get_cache_class(&self) -> &str {
        self.cache.class()
    }

    /// Cache backend arguments.
    #[inline]
    pub fn get_cache_arguments(&self) -> &Mapping {
        self.cache.arguments()
    }

    /// Per-resource cache expiration times.
    #[inline]
    pub fn get_cache_expiration(&self) -> &Mapping {
        self.cache.expiration()
    }

    /// The stanza of a cloud and the vendor profile it references.
    fn cloud_sources(&self, cloud: Option<&str>) -> Result<(Mapping, Option<Mapping>), Error> {
        let name = match cloud {
            Some(name) => name,
            None => return Ok((Mapping::new(), None)),
        };

        let stanza = match self.clouds.get(name) {
            Some(Value::Mapping(stanza)) => utils::normalize_keys(stanza.clone()),
            Some(Value::Null) => Mapping::new(),
            Some(other) => {
                return Err(Error::new(
                    ErrorKind::InvalidConfig,
                    format!("Cloud {} must be a mapping, got {:?}", name, other),
                ));
            }
            None => {
                return Err(Error::new(
                    ErrorKind::CloudNotFound,
                    format!("Cloud {} was not found", name),
                ));
            }
        };

        let profile = self.vendor_profile(name, &stanza)?;
        Ok((stanza, profile))
    }

    fn vendor_profile(&self, cloud: &str, stanza: &Mapping) -> Result<Option<Mapping>, Error> {
        let profile_name = match (
            utils::get_str(stanza, "profile"),
            utils::get_str(stanza, "cloud"),
        ) {
            (Some(name), _) => name,
            (None, Some(name)) => {
                warn!(
                    "Cloud {} uses the deprecated cloud key to reference vendor profile {}, \
                     use profile instead",
                    cloud, name
                );
                name
            }
            (None, None) => return Ok(None),
        };
        if profile_name == self.env_cloud_name {
            return Ok(None);
        }

        let mut profile = match self.vendors.get(profile_name) {
            Some(profile) => profile.clone(),
            None => match defaults::get_profile(profile_name)? {
                Some(profile) => profile,
                None => {
                    warn!(
                        "Couldn't find the vendor profile {} for the cloud {}",
                        profile_name, cloud
                    );
                    return Ok(None);
                }
            },
        };

        let status = profile
            .remove("status")
            .and_then(|value| utils::scalar_to_string(&value))
            .unwrap_or_else(|| "active".into());
        let message = profile
            .remove("message")
            .and_then(|value| utils::scalar_to_string(&value))
            .unwrap_or_default();
        match status.as_str() {
            "deprecated" => warn!("Vendor profile {} is deprecated: {}", profile_name, message),
            "shutdown" => {
                return Err(Error::new(
                    ErrorKind::InvalidConfig,
                    format!(
                        "Cloud {} references vendor profile {} that no longer exists: {}",
                        cloud, profile_name, message
                    ),
                ));
            }
            _ => {}
        }

        debug!("Cloud {} uses vendor profile {}", cloud, profile_name);
        Ok(Some(profile))
    }

    fn known_regions(
        &self,
        stanza: &Mapping,
        profile: Option<&Mapping>,
    ) -> Result<Vec<Region>, Error> {
        if let Some(regions) = declared_regions(stanza)? {
            return Ok(regions);
        }
        Ok(match profile {
            Some(profile) => declared_regions(profile)?.unwrap_or_default(),
            None => Vec::new(),
        })
    }

    /// Pick the region: explicit one, then the environment one, then the first known one.
    ///
    /// An explicit region must be one of the known regions (if any). A region from the
    /// environment that the cloud does not know is ignored.
    fn select_region(
        &self,
        cloud: Option<&str>,
        mut regions: Vec<Region>,
        requested: Option<String>,
    ) -> Result<Region, Error> {
        let from_env = utils::get_str(&self.env_overrides, "region_name")
            .filter(|name| !name.is_empty())
            .map(String::from);

        let cloud = match cloud {
            Some(cloud) if !regions.is_empty() => cloud,
            _ => return Ok(Region::anonymous(requested.or(from_env))),
        };

        if let Some(requested) = requested {
            return regions
                .iter()
                .find(|region| region.name == requested)
                .cloned()
                .ok_or_else(|| {
                    let names: Vec<&str> =
                        regions.iter().map(|region| region.name.as_str()).collect();
                    Error::new(
                        ErrorKind::InvalidConfig,
                        format!(
                            "Region {} is not a valid region name for cloud {}. \
                             Valid choices are {}",
                            requested,
                            cloud,
                            names.join(", ")
                        ),
                    )
                });
        }

        if let Some(from_env) = from_env {
            if let Some(region) = regions.iter().find(|region| region.name == from_env) {
                return Ok(region.clone());
            }
            debug!(
                "Ignoring region {} from the environment, cloud {} does not have it",
                from_env, cloud
            );
        }

        Ok(regions.remove(0))
    }

    /// Schema used to move option values into `auth` before merging.
    fn schema_for(&self, auth_type: Option<&Value>) -> Option<Arc<dyn AuthOptionSchema>> {
        if auth::is_unset_auth_type(auth_type) {
            return None;
        }
        let name = auth_type.and_then(utils::scalar_to_string)?;
        match self.plugin_loader.load(&name) {
            Ok(schema) => Some(schema),
            Err(err) => {
                let legacy = self
                    .legacy_plugin_loader
                    .as_ref()
                    .and_then(|loader| loader.load(&name).ok());
                if legacy.is_none() {
                    debug!("Cannot load options of {}: {}", name, err);
                }
                legacy
            }
        }
    }

    fn searched_files(&self) -> String {
        let files: Vec<String> = self
            .config_files
            .iter()
            .map(|path| section_source(path))
            .collect();
        files.join(", ")
    }

    /// Remove the environment variables that supplied authentication options.
    fn pop_consumed(&self, schema: &dyn AuthOptionSchema) {
        for option in schema.options() {
            for key in option.source_keys() {
                if self.env_overrides.contains_key(key.as_str()) {
                    let name = loading::var_name(&key);
                    if self.environment.remove(&name).is_some() {
                        trace!("Consumed {} from the environment", name);
                    }
                }
            }
        }
    }

    fn finish_auth(
        &self,
        config: &mut Mapping,
        schema: &dyn AuthOptionSchema,
        cloud: &str,
    ) -> Result<Arc<dyn AuthPlugin>, Error> {
        let missing = apply_schema(config, schema);
        if let Some(option) = missing.first() {
            return Err(Error::new(
                ErrorKind::MissingAuthOption,
                format!(
                    "Cloud '{}': missing value {} required for auth plugin {} \
                     (searched files: {})",
                    cloud,
                    option,
                    schema.name(),
                    self.searched_files()
                ),
            ));
        }

        let plugin = match config.get("auth") {
            Some(Value::Mapping(auth)) => schema.create(auth)?,
            _ => schema.create(&Mapping::new())?,
        };
        self.pop_consumed(schema);
        Ok(plugin)
    }

    fn validate_auth(
        &self,
        config: &mut Mapping,
        cloud: &str,
    ) -> Result<Arc<dyn AuthPlugin>, Error> {
        if auth::is_unset_auth_type(config.get("auth_type")) {
            debug!("No authentication type for cloud '{}', using admin_token", cloud);
            let _ = config.insert("auth_type".into(), "admin_token".into());
            let _ = utils::ensure_mapping(config, "auth").insert("token".into(), "notused".into());
        }

        let auth_type = config
            .get("auth_type")
            .and_then(utils::scalar_to_string)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidConfig,
                    format!("Cloud '{}': auth_type must be a string", cloud),
                )
            })?;

        let schema = match self.plugin_loader.load(&auth_type) {
            Ok(schema) => schema,
            Err(err) => {
                let legacy = match self.legacy_plugin_loader {
                    Some(ref legacy) => legacy,
                    None => return Err(err),
                };
                debug!("Deferring {} for cloud '{}' to the legacy loader", err, cloud);
                let mut candidate = config.clone();
                return match legacy
                    .load(&auth_type)
                    .and_then(|schema| self.finish_auth(&mut candidate, schema.as_ref(), cloud))
                {
                    Ok(plugin) => {
                        *config = candidate;
                        Ok(plugin)
                    }
                    Err(legacy_err) => {
                        debug!("Legacy loader failed as well: {}", legacy_err);
                        Err(err)
                    }
                };
            }
        };

        self.finish_auth(config, schema.as_ref(), cloud)
    }

    /// Arguments passed by the caller as one layer.
    ///
    /// Empty values in `args` are ignored, `kwargs` win over `args`.
    fn explicit_layer(args: Option<&Mapping>, kwargs: Mapping) -> Mapping {
        let mut layer = Mapping::new();
        if let Some(args) = args {
            for (key, value) in args {
                if !utils::is_empty_value(value) {
                    let _ = layer.insert(key.clone(), value.clone());
                }
            }
        }
        let mut layer = utils::fix_args(layer);

        let mut kwargs = utils::fix_args(kwargs);
        strip_nulls(&mut kwargs);
        utils::merge_mappings(kwargs, &mut layer, true);
        layer
    }

    /// Resolve the configuration of one cloud.
    ///
    /// The cloud is `cloud`, or the `cloud` argument, or `OS_CLOUD`, or the environment cloud
    /// if one exists. Otherwise an anonymous cloud is built from the defaults and arguments.
    ///
    /// `args` holds externally parsed options (e.g. from a command line), its null and empty
    /// values are ignored. `kwargs` holds explicit overrides. In both, hyphens are converted to
    /// underscores and `os_` prefixes are stripped.
    ///
    /// With `validate` the authentication options are checked against the plugin schema and
    /// the plugin is created. Without it, missing options are not an error and no plugin is
    /// attached.
    pub fn get_one_cloud(
        &self,
        cloud: Option<&str>,
        validate: bool,
        args: Option<&Mapping>,
        kwargs: Mapping,
    ) -> Result<CloudConfig, Error> {
        let mut layer = OpenStackConfig::explicit_layer(args, kwargs);
        let selected = layer
            .remove("cloud")
            .and_then(|value| utils::scalar_to_string(&value));
        let cloud = cloud
            .map(String::from)
            .or(selected)
            .or_else(|| self.default_cloud.clone())
            .filter(|name| !name.is_empty());
        debug!("Resolving cloud {:?}", cloud);

        let (stanza, profile) = self.cloud_sources(cloud.as_deref())?;
        let regions = self.known_regions(&stanza, profile.as_ref())?;
        let requested = layer
            .remove("region_name")
            .and_then(|value| utils::scalar_to_string(&value))
            .filter(|name| !name.is_empty());
        let region = self.select_region(cloud.as_deref(), regions, requested)?;
        trace!("Selected region {:?}", region);

        let mut config = self.defaults.clone();
        if let Some(profile) = profile {
            utils::merge_mappings(profile, &mut config, true);
        }
        utils::merge_mappings(stanza, &mut config, true);
        let _ = config.remove("cloud");
        let _ = config.remove("regions");
        utils::merge_mappings(region.values, &mut config, true);
        let _ = config.insert("region_name".into(), region.name.into());
        compat::fix_aliases(&mut config);

        let mut env_layer = self.env_overrides.clone();
        let _ = env_layer.remove("region_name");
        compat::fix_aliases(&mut env_layer);
        compat::fix_aliases(&mut layer);

        let auth_type = [&layer, &env_layer, &config]
            .iter()
            .find_map(|source| source.get("auth_type"))
            .cloned();
        if let Some(schema) = self.schema_for(auth_type.as_ref()) {
            let _ = apply_schema(&mut config, schema.as_ref());
            let _ = apply_schema(&mut env_layer, schema.as_ref());
            let _ = apply_schema(&mut layer, schema.as_ref());
        }
        utils::merge_mappings(env_layer, &mut config, true);
        utils::merge_mappings(layer, &mut config, true);
        compat::expand_domain(&mut config);

        strip_nulls(&mut config);
        coerce_booleans(&mut config);
        interpolate_config(&mut config);

        let cloud_name = cloud.unwrap_or_default();
        let auth_plugin = if validate {
            Some(self.validate_auth(&mut config, &cloud_name)?)
        } else {
            if let Some(schema) = self.schema_for(config.get("auth_type")) {
                let _ = apply_schema(&mut config, schema.as_ref());
            }
            None
        };

        let mut force_ipv4 = match config.remove("force_ipv4") {
            Some(value) => utils::get_boolean(&value),
            None => self.force_ipv4,
        };
        if let Some(prefer_ipv6) = config.remove("prefer_ipv6") {
            if !utils::get_boolean(&prefer_ipv6) {
                force_ipv4 = true;
            }
        }

        let config = utils::normalize_keys(config);
        let region = utils::get_str(&config, "region_name")
            .unwrap_or_default()
            .to_string();
        debug!("Resolved cloud '{}' in region '{}'", cloud_name, region);
        Ok(CloudConfig::new(
            cloud_name,
            region,
            config,
            force_ipv4,
            auth_plugin,
        ))
    }
}

#[cfg(test)]
pub mod test {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use maplit::btreemap;
    use serde_yaml::{Mapping, Value};

    use super::{apply_schema, interpolate_config, OpenStackConfig, OpenStackConfigBuilder};
    use crate::auth::{AuthOption, BuiltinPlugins, GenericSchema, PluginLoader};
    use crate::loading::{Environment, MemoryEnvironment};
    use crate::utils::test::to_yaml;
    use crate::ErrorKind;

    const CLOUDS: &str = r#"
clouds:
  devstack:
    region_name: RegionOne
    auth:
      auth_url: http://127.0.0.1/identity
      username: u
      password: p
      project_name: demo
  legacy:
    auth_type: password
    tenant_name: T
    auth:
      auth_url: http://127.0.0.1/identity
      username: u
      password: p
  multi:
    regions:
      - name: R1
        values:
          compute_api_version: '2.1'
      - R2
    auth:
      auth_url: http://{region_name}.example.com
      username: u
      password: p
  nopassword:
    auth:
      auth_url: http://127.0.0.1/identity
      username: u
  vendor:
    profile: vexxhost
    auth:
      username: u
      password: p
  deprecated:
    profile: switchengines
    auth:
      username: u
      password: p
  gone:
    profile: datacentred
  comma:
    region_name: A,B
cache:
  expiration_time: 120
client:
  force_ipv4: true
ansible:
  use_hostnames: true
"#;

    fn builder(dir: &Path, env: Arc<dyn Environment>) -> OpenStackConfigBuilder {
        OpenStackConfig::builder()
            .with_config_files(vec![dir.join("clouds.yaml")])
            .with_secure_files(vec![dir.join("secure.yaml")])
            .with_vendor_files(vec![dir.join("clouds-public.yaml")])
            .with_environment(env)
    }

    fn load(clouds: &str, env: MemoryEnvironment) -> (tempfile::TempDir, OpenStackConfig) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clouds.yaml"), clouds).unwrap();
        let config = builder(dir.path(), Arc::new(env)).build().unwrap();
        (dir, config)
    }

    fn kwargs(yaml: &str) -> Mapping {
        to_yaml(yaml)
    }

    #[test]
    fn test_empty_everything() {
        let dir = tempfile::tempdir().unwrap();
        let config = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .build()
            .unwrap();
        let cc = config.get_one_cloud(None, false, None, Mapping::new()).unwrap();
        assert_eq!(cc.name(), "");
        assert_eq!(cc.region(), "");
        assert_eq!(cc.get("interface").unwrap(), "public");
        assert!(cc.auth_plugin().is_none());
        assert!(config.get_cloud_names().is_empty());
        assert!(config.config_filename().is_none());
    }

    #[test]
    fn test_named_cloud() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let cc = config
            .get_one_cloud(Some("devstack"), false, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.name(), "devstack");
        assert_eq!(cc.region(), "RegionOne");
        assert_eq!(cc.get_auth_args()["username"], "u");
        assert_eq!(cc.get("identity_api_version").unwrap(), "2.0");
    }

    #[test]
    fn test_validated_cloud() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let cc = config
            .get_one_cloud(Some("devstack"), true, None, Mapping::new())
            .unwrap();
        let plugin = cc.auth_plugin().unwrap();
        assert_eq!(plugin.auth_type(), "password");
        assert_eq!(plugin.get("username"), Some("u"));
        assert_eq!(plugin.get("project_name"), Some("demo"));
    }

    #[test]
    fn test_cloud_not_found() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let err = config
            .get_one_cloud(Some("missing"), false, None, Mapping::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CloudNotFound);
    }

    #[test]
    fn test_env_cloud() {
        let env = MemoryEnvironment::new()
            .with("OS_USERNAME", "testuser")
            .with("OS_PROJECT_NAME", "testproject")
            .with("OS_AUTH_URL", "https://example.com");
        let (_dir, config) = load("", env);
        assert_eq!(config.default_cloud(), Some("envvars"));
        let cc = config.get_one_cloud(None, false, None, Mapping::new()).unwrap();
        assert_eq!(cc.name(), "envvars");
        let auth = cc.get_auth_args();
        assert_eq!(auth["username"], "testuser");
        assert_eq!(auth["project_name"], "testproject");
        assert_eq!(auth["auth_url"], "https://example.com");
    }

    #[test]
    fn test_env_cloud_renamed() {
        let env = MemoryEnvironment::new()
            .with("OS_CLOUD_NAME", "fromenv")
            .with("OS_AUTH_URL", "https://example.com");
        let (_dir, config) = load(CLOUDS, env);
        assert_eq!(config.env_cloud_name(), "fromenv");
        assert!(config.get_cloud_names().contains(&"fromenv".to_string()));
    }

    #[test]
    fn test_env_cloud_name_conflict() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clouds.yaml"), "clouds: {override: {}}").unwrap();
        let env = MemoryEnvironment::new().with("OS_CLOUD_NAME", "override");
        let err = builder(dir.path(), Arc::new(env)).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictingConfig);
    }

    #[test]
    fn test_default_env_cloud_name_conflict() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clouds.yaml"), "clouds: {envvars: {}}").unwrap();
        let err = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictingConfig);
    }

    #[test]
    fn test_os_cloud_selects() {
        let env = Arc::new(MemoryEnvironment::new().with("OS_CLOUD", "devstack"));
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clouds.yaml"), CLOUDS).unwrap();
        let config = builder(dir.path(), env.clone()).build().unwrap();
        let cc = config.get_one_cloud(None, false, None, Mapping::new()).unwrap();
        assert_eq!(cc.name(), "devstack");
        assert!(env.get("OS_CLOUD").is_none());
    }

    #[test]
    fn test_tenant_name() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let cc = config
            .get_one_cloud(Some("legacy"), false, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.get_auth_args()["project_name"], "T");
        assert!(cc.get("tenant_name").is_none());
    }

    #[test]
    fn test_validation_toggle() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        assert!(config
            .get_one_cloud(Some("nopassword"), false, None, Mapping::new())
            .is_ok());
        let err = config
            .get_one_cloud(Some("nopassword"), true, None, Mapping::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingAuthOption);
        let message = err.to_string();
        assert!(message.contains("nopassword"));
        assert!(message.contains("password"));
        assert!(message.contains("clouds.yaml"));
    }

    #[test]
    fn test_kwargs_win() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let cc = config
            .get_one_cloud(
                Some("devstack"),
                true,
                None,
                kwargs("{os-username: other, auth: {project_name: demo2}, api_timeout: 30}"),
            )
            .unwrap();
        let auth = cc.get_auth_args();
        assert_eq!(auth["username"], "other");
        assert_eq!(auth["project_name"], "demo2");
        assert_eq!(auth["password"], "p");
        assert_eq!(cc.get("api_timeout").unwrap(), "30");
    }

    #[test]
    fn test_env_beats_file() {
        let env = Arc::new(MemoryEnvironment::new().with("OS_PASSWORD", "fromenv"));
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clouds.yaml"), CLOUDS).unwrap();
        let config = builder(dir.path(), env.clone()).build().unwrap();
        let cc = config
            .get_one_cloud(Some("devstack"), true, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.auth_plugin().unwrap().get("password"), Some("fromenv"));
        // Consumed by validation
        assert!(env.get("OS_PASSWORD").is_none());
    }

    #[test]
    fn test_args_namespace() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let args = to_yaml(
            r#"
os_region_name: R2
snack_type: cookie
os_username: ''
interface: ~
"#,
        );
        let cc = config
            .get_one_cloud(Some("multi"), false, Some(&args), Mapping::new())
            .unwrap();
        assert_eq!(cc.region(), "R2");
        assert_eq!(cc.get("snack_type").unwrap(), "cookie");
        assert_eq!(cc.get_auth_args()["username"], "u");
        assert_eq!(cc.get("interface").unwrap(), "public");
    }

    #[test]
    fn test_kwargs_beat_args() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let args = to_yaml("snack_type: cookie");
        let cc = config
            .get_one_cloud(None, false, Some(&args), kwargs("snack-type: cake"))
            .unwrap();
        assert_eq!(cc.get("snack_type").unwrap(), "cake");
    }

    #[test]
    fn test_cloud_from_args() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let cc = config
            .get_one_cloud(None, false, None, kwargs("cloud: devstack"))
            .unwrap();
        assert_eq!(cc.name(), "devstack");
        assert!(cc.get("cloud").is_none());
    }

    #[test]
    fn test_regions() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        assert_eq!(config.get_region_names("multi").unwrap(), vec!["R1", "R2"]);
        assert_eq!(config.get_region_names("nopassword").unwrap(), vec![""]);

        let first = config
            .get_one_cloud(Some("multi"), false, None, Mapping::new())
            .unwrap();
        assert_eq!(first.region(), "R1");
        assert_eq!(first.get_api_version("compute").unwrap(), "2.1");
        assert_eq!(
            first.get_auth_args()["auth_url"],
            "http://R1.example.com"
        );
        assert!(first.get("regions").is_none());

        let second = config
            .get_one_cloud(Some("multi"), false, None, kwargs("region_name: R2"))
            .unwrap();
        assert_eq!(second.region(), "R2");
        assert_eq!(second.get_api_version("compute").unwrap(), "2");
    }

    #[test]
    fn test_invalid_region() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let err = config
            .get_one_cloud(Some("multi"), false, None, kwargs("region_name: R3"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(err.to_string().contains("R1, R2"));
    }

    #[test]
    fn test_env_region() {
        let env = MemoryEnvironment::new().with("OS_REGION_NAME", "R2");
        let (_dir, config) = load(CLOUDS, env);
        assert!(config.default_cloud().is_none());
        let cc = config
            .get_one_cloud(Some("multi"), false, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.region(), "R2");
        // Unknown to this cloud
        let cc = config
            .get_one_cloud(Some("devstack"), false, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.region(), "RegionOne");
    }

    #[test]
    fn test_comma_regions() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        assert_eq!(config.get_region_names("comma").unwrap(), vec!["A", "B"]);
        let cc = config
            .get_one_cloud(Some("comma"), false, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.region(), "A");
    }

    #[test]
    fn test_vendor_profile() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let cc = config
            .get_one_cloud(Some("vendor"), true, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.get("identity_api_version").unwrap(), "3");
        assert_eq!(
            cc.auth_plugin().unwrap().get("auth_url"),
            Some("https://auth.vexxhost.net/v3")
        );
        assert!(!config.get_region_names("vendor").unwrap().is_empty());
    }

    #[test]
    fn test_vendor_profile_deprecated() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let cc = config
            .get_one_cloud(Some("deprecated"), false, None, Mapping::new())
            .unwrap();
        assert!(cc.get("status").is_none());
    }

    #[test]
    fn test_vendor_profile_shutdown() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let err = config
            .get_one_cloud(Some("gone"), false, None, Mapping::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_vendor_profile_missing() {
        let (_dir, config) = load(
            "clouds: {mine: {profile: nonexistent, region_name: X}}",
            MemoryEnvironment::new(),
        );
        let cc = config
            .get_one_cloud(Some("mine"), false, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.region(), "X");
    }

    #[test]
    fn test_vendor_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("clouds.yaml"),
            "clouds: {mine: {profile: vexxhost}}",
        )
        .unwrap();
        fs::write(
            dir.path().join("clouds-public.yaml"),
            "public-clouds: {vexxhost: {auth: {auth_url: 'http://local'}, regions: [L1]}}",
        )
        .unwrap();
        let config = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .build()
            .unwrap();
        let cc = config
            .get_one_cloud(Some("mine"), false, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.region(), "L1");
        assert_eq!(cc.get_auth_args()["auth_url"], "http://local");
    }

    #[test]
    fn test_legacy_cloud_key() {
        let (_dir, config) = load(
            "clouds: {mine: {cloud: vexxhost}}",
            MemoryEnvironment::new(),
        );
        let cc = config
            .get_one_cloud(Some("mine"), false, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.get("identity_api_version").unwrap(), "3");
        assert!(cc.get("cloud").is_none());
    }

    #[test]
    fn test_secure_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clouds.yaml"), CLOUDS).unwrap();
        fs::write(
            dir.path().join("secure.yaml"),
            "clouds: {nopassword: {auth: {password: secret}}}",
        )
        .unwrap();
        let config = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .build()
            .unwrap();
        let cc = config
            .get_one_cloud(Some("nopassword"), true, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.get_auth_args()["password"], "secret");
        assert_eq!(cc.get_auth_args()["username"], "u");
    }

    #[test]
    fn test_client_config_file_env() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom.yaml");
        fs::write(&custom, "clouds: {custom: {region_name: C}}").unwrap();
        let env = MemoryEnvironment::new()
            .with("OS_CLIENT_CONFIG_FILE", custom.to_str().unwrap());
        let config = builder(dir.path(), Arc::new(env)).build().unwrap();
        assert_eq!(config.config_filename(), Some(custom.as_path()));
        assert_eq!(config.get_cloud_names(), vec!["custom"]);
    }

    #[test]
    fn test_skip_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clouds.yaml"), CLOUDS).unwrap();
        let config = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .with_load_yaml_config(false)
            .build()
            .unwrap();
        assert!(config.get_cloud_names().is_empty());
    }

    #[test]
    fn test_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .with_override_defaults(to_yaml("interface: internal\nsnack-type: cookie"))
            .build()
            .unwrap();
        let cc = config.get_one_cloud(None, false, None, Mapping::new()).unwrap();
        assert_eq!(cc.get("interface").unwrap(), "internal");
        assert_eq!(cc.get("snack_type").unwrap(), "cookie");
    }

    #[test]
    fn test_unset_auth_type() {
        let (_dir, config) = load(
            "clouds: {noauth: {auth_type: 'None', auth: {endpoint: 'http://ironic:6385'}}}",
            MemoryEnvironment::new(),
        );
        let cc = config
            .get_one_cloud(Some("noauth"), true, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.get("auth_type").unwrap(), "admin_token");
        let plugin = cc.auth_plugin().unwrap();
        assert_eq!(plugin.get("token"), Some("notused"));
        assert_eq!(plugin.get("endpoint"), Some("http://ironic:6385"));
    }

    #[test]
    fn test_unknown_plugin() {
        let (_dir, config) = load(
            "clouds: {krb: {auth_type: kerberos, auth: {auth_url: 'http://x'}}}",
            MemoryEnvironment::new(),
        );
        let err = config
            .get_one_cloud(Some("krb"), true, None, Mapping::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PluginLoadFailure);
        assert!(config
            .get_one_cloud(Some("krb"), false, None, Mapping::new())
            .is_ok());
    }

    #[test]
    fn test_legacy_loader() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("clouds.yaml"),
            "clouds: {krb: {auth_type: kerberos, auth_url: 'http://x'}}",
        )
        .unwrap();
        let legacy = BuiltinPlugins::empty().with(GenericSchema::new(
            "kerberos",
            vec![AuthOption::new("auth_url").required()],
        ));
        let config = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .with_legacy_plugin_loader(legacy)
            .build()
            .unwrap();
        let cc = config
            .get_one_cloud(Some("krb"), true, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.get_auth_args()["auth_url"], "http://x");
        assert_eq!(cc.auth_plugin().unwrap().auth_type(), "kerberos");
    }

    #[test]
    fn test_legacy_loader_fails_too() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("clouds.yaml"),
            "clouds: {krb: {auth_type: kerberos}}",
        )
        .unwrap();
        let legacy = BuiltinPlugins::empty().with(GenericSchema::new(
            "kerberos",
            vec![AuthOption::new("principal").required()],
        ));
        let config = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .with_legacy_plugin_loader(legacy)
            .build()
            .unwrap();
        let err = config
            .get_one_cloud(Some("krb"), true, None, Mapping::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PluginLoadFailure);
    }

    #[test]
    fn test_custom_loader() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("clouds.yaml"),
            "clouds: {custom: {auth_type: magic, auth: {spell: abracadabra}}}",
        )
        .unwrap();
        let loader = BuiltinPlugins::empty().with(GenericSchema::new(
            "magic",
            vec![AuthOption::new("spell").required().secret()],
        ));
        assert!(loader.load("magic").is_ok());
        let config = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .with_plugin_loader(loader)
            .build()
            .unwrap();
        let cc = config
            .get_one_cloud(Some("custom"), true, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.auth_plugin().unwrap().get("spell"), Some("abracadabra"));
    }

    #[test]
    fn test_booleans() {
        let (_dir, config) = load(
            "clouds: {b: {insecure: 'True', cache: 'no'}}",
            MemoryEnvironment::new(),
        );
        let cc = config.get_one_cloud(Some("b"), false, None, Mapping::new()).unwrap();
        assert_eq!(cc.get("insecure").and_then(Value::as_bool), Some(true));
        assert_eq!(cc.get("verify").and_then(Value::as_bool), Some(false));
        assert_eq!(cc.get("cache").and_then(Value::as_bool), Some(false));
        assert!(!cc.is_cache_enabled());
    }

    #[test]
    fn test_force_ipv4() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let cc = config
            .get_one_cloud(Some("devstack"), false, None, Mapping::new())
            .unwrap();
        assert!(cc.force_ipv4());

        let cc = config
            .get_one_cloud(Some("devstack"), false, None, kwargs("force_ipv4: false"))
            .unwrap();
        assert!(!cc.force_ipv4());
        assert!(cc.get("force_ipv4").is_none());
    }

    #[test]
    fn test_prefer_ipv6_env() {
        let env = MemoryEnvironment::new().with("OS_PREFER_IPV6", "false");
        let (_dir, config) = load("clouds: {}", env);
        let cc = config.get_one_cloud(None, false, None, Mapping::new()).unwrap();
        assert!(cc.force_ipv4());

        let dir = tempfile::tempdir().unwrap();
        let config = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .build()
            .unwrap();
        let cc = config
            .get_one_cloud(None, false, None, kwargs("prefer_ipv6: false"))
            .unwrap();
        assert!(cc.force_ipv4());
    }

    #[test]
    fn test_extra_and_cache() {
        let (_dir, config) = load(CLOUDS, MemoryEnvironment::new());
        let ansible = config
            .get_extra_config("ansible", Some(to_yaml("expand_hostvars: false")))
            .unwrap();
        assert_eq!(ansible["use_hostnames"].as_bool(), Some(true));
        assert_eq!(ansible["expand_hostvars"].as_bool(), Some(false));
        assert!(config.get_extra_config("missing", None).unwrap().is_empty());
        assert!(config.get_extra_config("clouds", None).is_err());

        assert_eq!(config.get_cache_expiration_time(), 120);
        assert_eq!(config.get_cache_class(), "dogpile.cache.memory");
        assert!(config.get_cache_arguments().is_empty());
        assert!(config.get_cache_expiration().is_empty());
        assert!(config.get_cache_path().ends_with("openstack"));
    }

    #[test]
    fn test_all_clouds() {
        let (_dir, config) = load(
            r#"
clouds:
  one:
    region_name: A
  two:
    regions: [B, C]
"#,
            MemoryEnvironment::new(),
        );
        let all: Vec<(String, String)> = config
            .get_all_clouds()
            .unwrap()
            .into_iter()
            .map(|cc| (cc.name().to_string(), cc.region().to_string()))
            .collect();
        assert_eq!(
            all,
            vec![
                ("one".to_string(), "A".to_string()),
                ("two".to_string(), "B".to_string()),
                ("two".to_string(), "C".to_string()),
            ]
        );
    }

    #[test]
    fn test_set_one_cloud_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clouds.yaml");
        OpenStackConfig::set_one_cloud(&path, "foo", to_yaml("region_name: R")).unwrap();
        let config = builder(dir.path(), Arc::new(MemoryEnvironment::new()))
            .build()
            .unwrap();
        let cc = config
            .get_one_cloud(Some("foo"), false, None, Mapping::new())
            .unwrap();
        assert_eq!(cc.region(), "R");
    }

    #[test]
    fn test_domain_propagation() {
        let (_dir, config) = load(
            "clouds: {d: {auth: {domain_id: D, auth_url: 'http://x', password: p}}}",
            MemoryEnvironment::new(),
        );
        let cc = config.get_one_cloud(Some("d"), true, None, Mapping::new()).unwrap();
        let auth = cc.get_auth_args();
        assert_eq!(auth["user_domain_id"], "D");
        assert_eq!(auth["project_domain_id"], "D");
        assert!(!auth.contains_key("domain_id"));
        assert!(cc.get("domain_id").is_none());
    }

    #[test]
    fn test_domain_does_not_override_other_layers() {
        let (_dir, config) = load(
            "clouds: {d: {auth: {user_domain_id: X, auth_url: 'http://x', password: p}}}",
            MemoryEnvironment::new(),
        );
        let cc = config
            .get_one_cloud(Some("d"), true, None, kwargs("auth: {domain_id: D}"))
            .unwrap();
        let auth = cc.get_auth_args();
        assert_eq!(auth["user_domain_id"], "X");
        assert_eq!(auth["project_domain_id"], "D");
        assert!(!auth.contains_key("domain_id"));
    }

    #[test]
    fn test_endpoint_type_in_file() {
        let (_dir, config) = load(
            r#"
clouds:
  c:
    endpoint_type: internal
    compute_endpoint_type: admin
"#,
            MemoryEnvironment::new(),
        );
        let cc = config.get_one_cloud(Some("c"), false, None, Mapping::new()).unwrap();
        assert_eq!(cc.get_interface(None), Some("internal"));
        assert_eq!(cc.get_interface(Some("compute")), Some("admin"));
        assert!(cc.get("endpoint_type").is_none());

        let cc = config
            .get_one_cloud(Some("c"), false, None, kwargs("interface: public"))
            .unwrap();
        assert_eq!(cc.get_interface(None), Some("public"));
    }

    #[test]
    fn test_verify_kept() {
        let (_dir, config) = load(
            "clouds: {v: {verify: /etc/ssl/ca.pem}}",
            MemoryEnvironment::new(),
        );
        let cc = config.get_one_cloud(Some("v"), false, None, Mapping::new()).unwrap();
        assert_eq!(cc.get("verify").unwrap(), "/etc/ssl/ca.pem");
    }

    #[test]
    fn test_no_hyphens() {
        let (_dir, config) = load(
            "clouds: {h: {compute-api-version: 2, auth: {user-domain-name: Default}}}",
            MemoryEnvironment::new(),
        );
        let cc = config.get_one_cloud(Some("h"), false, None, Mapping::new()).unwrap();
        assert!(cc.iter().all(|key| !key.contains('-')));
        assert_eq!(cc.get_api_version("compute").unwrap(), "2");
        assert_eq!(cc.get_auth_args()["user_domain_name"], "Default");
    }

    #[test]
    fn test_apply_schema() {
        let schema = GenericSchema::new(
            "test",
            vec![
                AuthOption::new("project_id").with_deprecated("tenant_id"),
                AuthOption::new("username").required(),
                AuthOption::new("password").required(),
            ],
        );
        let mut config = to_yaml(
            r#"
tenant_id: deprecated-top
project_id: current-top
username: top
auth:
  tenant_id: deprecated-auth
  username: ''"#,
        );
        let missing = apply_schema(&mut config, &schema);
        assert_eq!(missing, vec!["password"]);
        let expected = btreemap! {
            "project_id" => "deprecated-auth",
            "username" => "top",
        };
        let auth = config["auth"].as_mapping().unwrap();
        assert_eq!(auth.len(), expected.len());
        for (key, value) in expected {
            assert_eq!(auth[key], value);
        }
        assert!(!config.contains_key("tenant_id"));
        assert!(!config.contains_key("project_id"));
        assert!(!config.contains_key("username"));
    }

    #[test]
    fn test_interpolation_single_pass() {
        let mut config = to_yaml(
            r#"
region_name: R1
first: "{second}"
second: "{region_name}"
literal: "{{not_a_key}}"
unknown: "{nothing}"
auth:
  auth_url: "https://{region_name}.example.com"
  password: "{region_name}"
"#,
        );
        interpolate_config(&mut config);
        assert_eq!(config["first"], "{region_name}");
        assert_eq!(config["second"], "R1");
        assert_eq!(config["literal"], "{not_a_key}");
        assert_eq!(config["unknown"], "{nothing}");
        assert_eq!(config["auth"]["auth_url"], "https://R1.example.com");
        assert_eq!(config["auth"]["password"], "{region_name}");
    }

    #[test]
    fn test_non_string_auth_type() {
        let (_dir, config) = load("clouds: {n: {auth_type: [a]}}", MemoryEnvironment::new());
        let err = config
            .get_one_cloud(Some("n"), true, None, Mapping::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert_eq!(
            config
                .get_one_cloud(Some("n"), false, None, Mapping::new())
                .unwrap()
                .get("auth_type")
                .unwrap(),
            &Value::Sequence(vec![Value::from("a")])
        );
    }
}
