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

//! Resolved cloud configuration.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use log::warn;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use url::Url;

use crate::auth::AuthPlugin;
use crate::utils;
use crate::{Error, ErrorKind, InterfaceType};

const SERVICE_SUFFIXES: &[&str] = &[
    "_api_version",
    "_service_type",
    "_service_name",
    "_endpoint_override",
    "_interface",
];

/// TLS verification mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verify {
    /// Verification is disabled (`insecure` or `verify: false`).
    Disabled,
    /// Verify using the system certificate store.
    System,
    /// Verify using the CA bundle at the given path.
    CaFile(String),
}

/// TLS client certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCert {
    /// Path to the certificate.
    pub cert: String,
    /// Path to the private key, if it is not a part of the certificate file.
    pub key: Option<String>,
}

/// Configuration of one cloud in one region.
///
/// Created by [OpenStackConfig::get_one_cloud](struct.OpenStackConfig.html#method.get_one_cloud)
/// and read-only afterwards. Keys are normalized: no hyphens, no `os_` prefixes and scalar
/// values other than booleans are strings.
#[derive(Debug, Clone, Serialize)]
pub struct CloudConfig {
    name: String,
    region: String,
    config: Mapping,
    force_ipv4: bool,
    #[serde(skip)]
    auth_plugin: Option<Arc<dyn AuthPlugin>>,
}

impl PartialEq for CloudConfig {
    fn eq(&self, other: &CloudConfig) -> bool {
        self.name == other.name && self.region == other.region && self.config == other.config
    }
}

/// Build a per-service key, e.g. `compute_api_version`.
fn make_key(key: &str, service_type: Option<&str>) -> String {
    match service_type {
        Some(service) if !service.is_empty() => {
            format!("{}_{}", utils::normalize_key(&service.to_lowercase()), key)
        }
        _ => key.to_string(),
    }
}

impl CloudConfig {
    pub(crate) fn new(
        name: String,
        region: String,
        config: Mapping,
        force_ipv4: bool,
        auth_plugin: Option<Arc<dyn AuthPlugin>>,
    ) -> CloudConfig {
        CloudConfig {
            name,
            region,
            config,
            force_ipv4,
            auth_plugin,
        }
    }

    /// Cloud name, empty for an anonymous cloud.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Region name, may be empty.
    #[inline]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The whole resolved configuration.
    #[inline]
    pub fn config(&self) -> &Mapping {
        &self.config
    }

    /// Whether only IPv4 addresses should be used.
    #[inline]
    pub fn force_ipv4(&self) -> bool {
        self.force_ipv4
    }

    /// Whether IPv6 addresses are preferred when available.
    #[inline]
    pub fn prefer_ipv6(&self) -> bool {
        !self.force_ipv4
    }

    /// Authentication plugin, `None` if validation was skipped.
    #[inline]
    pub fn auth_plugin(&self) -> Option<&Arc<dyn AuthPlugin>> {
        self.auth_plugin.as_ref()
    }

    /// Get a configuration value.
    ///
    /// Hyphens in the key are treated as underscores, an `os_` prefix is ignored if the prefixed
    /// key is not present. Unknown keys yield `None`.
    pub fn get<S: AsRef<str>>(&self, key: S) -> Option<&Value> {
        let key = utils::normalize_key(key.as_ref());
        self.config.get(key.as_str()).or_else(|| {
            key.strip_prefix("os_")
                .and_then(|stripped| self.config.get(stripped))
        })
    }

    #[inline]
    fn get_string(&self, key: &str) -> Option<&str> {
        utils::get_str(&self.config, key)
    }

    /// Iterate over the top-level keys.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.config.iter().filter_map(|(key, _)| key.as_str())
    }

    /// A copy of the authentication arguments.
    pub fn get_auth_args(&self) -> Mapping {
        match self.config.get("auth") {
            Some(Value::Mapping(auth)) => auth.clone(),
            _ => Mapping::new(),
        }
    }

    /// Endpoint interface for the service (or the global one).
    pub fn get_interface(&self, service_type: Option<&str>) -> Option<&str> {
        let global = self.get_string("interface");
        match service_type {
            Some(_) => self
                .get_string(&make_key("interface", service_type))
                .or(global),
            None => global,
        }
    }

    /// Endpoint interface for the service parsed into an `InterfaceType`.
    pub fn get_interface_type(
        &self,
        service_type: Option<&str>,
    ) -> Result<Option<InterfaceType>, Error> {
        self.get_interface(service_type)
            .map(InterfaceType::from_str)
            .transpose()
    }

    /// Region for the service, falls back to the cloud region.
    pub fn get_region_name(&self, service_type: Option<&str>) -> &str {
        service_type
            .and_then(|_| self.get_string(&make_key("region_name", service_type)))
            .unwrap_or(self.region.as_str())
    }

    /// Configured API version of the service.
    pub fn get_api_version(&self, service_type: &str) -> Option<&str> {
        self.get_string(&make_key("api_version", Some(service_type)))
    }

    /// Service type to look up in the catalog.
    ///
    /// Block storage version 2 is published as `volumev2`.
    pub fn get_service_type(&self, service_type: &str) -> String {
        if let Some(overridden) = self.get_string(&make_key("service_type", Some(service_type))) {
            return overridden.to_string();
        }

        if service_type == "volume"
            && self
                .get_api_version(service_type)
                .map(|v| v.starts_with('2'))
                .unwrap_or(false)
        {
            return "volumev2".to_string();
        }

        service_type.to_string()
    }

    /// Service name to look up in the catalog.
    pub fn get_service_name(&self, service_type: &str) -> Option<&str> {
        self.get_string(&make_key("service_name", Some(service_type)))
    }

    /// Endpoint override for the service.
    pub fn get_endpoint(&self, service_type: &str) -> Option<&str> {
        self.get_string(&make_key("endpoint_override", Some(service_type)))
            .or_else(|| self.get_string(&make_key("endpoint", Some(service_type))))
    }

    /// All endpoint overrides keyed by service type.
    ///
    /// Each service is present both with underscores and with dashes, e.g.
    /// `baremetal_introspection` and `baremetal-introspection`.
    pub fn get_endpoint_overrides(&self) -> Result<HashMap<String, Url>, Error> {
        let mut result = HashMap::new();
        for (key, value) in &self.config {
            let key = match key.as_str() {
                Some(key) => key,
                None => continue,
            };
            if let Some(service_type) = key.strip_suffix("_endpoint_override") {
                if let Value::String(value) = value {
                    let url = Url::parse(value).map_err(|e| {
                        Error::new(
                            ErrorKind::InvalidConfig,
                            format!("Invalid {} `{}`: {}", key, value, e),
                        )
                    })?;
                    let _ = result.insert(service_type.to_string(), url.clone());
                    let _ = result.insert(service_type.replace('_', "-"), url);
                } else {
                    return Err(Error::new(
                        ErrorKind::InvalidConfig,
                        format!("{} must be a string, got {:?}", key, value),
                    ));
                }
            }
        }
        Ok(result)
    }

    /// Service types mentioned in the per-service options.
    pub fn get_services(&self) -> Vec<String> {
        let services: BTreeSet<String> = self
            .iter()
            .filter(|key| !key.starts_with('_'))
            .filter_map(|key| {
                SERVICE_SUFFIXES
                    .iter()
                    .find_map(|suffix| key.strip_suffix(suffix))
                    .filter(|service| !service.is_empty())
                    .map(String::from)
            })
            .collect();
        services.into_iter().collect()
    }

    /// TLS verification settings and the client certificate.
    pub fn get_requests_verify_args(&self) -> (Verify, Option<ClientCert>) {
        let verify_enabled = self.config.get("verify").map(utils::get_boolean).unwrap_or(true);
        let verify = if verify_enabled {
            match self.get_string("cacert") {
                Some(cacert) if !cacert.is_empty() => Verify::CaFile(cacert.to_string()),
                _ => Verify::System,
            }
        } else {
            if self.config.contains_key("cacert") {
                warn!(
                    "Cloud {}: cacert is ignored because verification is disabled",
                    self.name
                );
            }
            Verify::Disabled
        };

        let cert = self
            .get_string("cert")
            .filter(|cert| !cert.is_empty())
            .map(|cert| ClientCert {
                cert: cert.to_string(),
                key: self
                    .get_string("key")
                    .filter(|key| !key.is_empty())
                    .map(String::from),
            });
        (verify, cert)
    }

    /// Whether caching is enabled for this cloud.
    pub fn is_cache_enabled(&self) -> bool {
        self.config
            .get("cache")
            .map(utils::get_boolean)
            .unwrap_or(false)
    }
}
