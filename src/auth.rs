// Copyright 2019 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Authentication plugins and their option schemas.
//!
//! The resolver never knows concrete plugin types. It asks a [PluginLoader](trait.PluginLoader.html)
//! for the [AuthOptionSchema](trait.AuthOptionSchema.html) of an authentication type, validates
//! the configuration against the declared [AuthOption](struct.AuthOption.html)s and lets the
//! schema create an [AuthPlugin](trait.AuthPlugin.html) from the resulting `auth` mapping.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_yaml::{Mapping, Value};
use static_assertions::{assert_impl_all, assert_obj_safe};
use url::Url;

use crate::utils;
use crate::{Error, ErrorKind};

/// A single option declared by an authentication plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOption {
    name: String,
    deprecated: Vec<String>,
    required: bool,
    secret: bool,
    dest: Option<String>,
}

impl AuthOption {
    /// Create an optional, non-secret option.
    pub fn new<S: Into<String>>(name: S) -> AuthOption {
        AuthOption {
            name: name.into(),
            deprecated: Vec::new(),
            required: false,
            secret: false,
            dest: None,
        }
    }

    /// Mark the option as required.
    #[inline]
    pub fn required(mut self) -> AuthOption {
        self.required = true;
        self
    }

    /// Mark the option as secret (it will not be shown in debug output).
    #[inline]
    pub fn secret(mut self) -> AuthOption {
        self.secret = true;
        self
    }

    /// Add a deprecated name for the option.
    ///
    /// Deprecated names are checked in the order they are added.
    #[inline]
    pub fn with_deprecated<S: Into<String>>(mut self, name: S) -> AuthOption {
        self.deprecated.push(name.into());
        self
    }

    /// Set the key under which the plugin expects the value.
    #[inline]
    pub fn with_dest<S: Into<String>>(mut self, dest: S) -> AuthOption {
        self.dest = Some(dest.into());
        self
    }

    /// Name of the option.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deprecated names of the option, in the priority order.
    #[inline]
    pub fn deprecated(&self) -> &[String] {
        &self.deprecated
    }

    /// Whether the option is required.
    #[inline]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the option is secret.
    #[inline]
    pub fn is_secret(&self) -> bool {
        self.secret
    }

    /// Key under which the value is installed into `auth`.
    pub fn dest(&self) -> String {
        utils::normalize_key(self.dest.as_deref().unwrap_or(&self.name))
    }

    /// All normalized keys that may hold a value for this option.
    ///
    /// The current name goes first, followed by deprecated names.
    pub fn source_keys(&self) -> Vec<String> {
        std::iter::once(&self.name)
            .chain(self.deprecated.iter())
            .map(|name| utils::normalize_key(name))
            .collect()
    }
}

/// An instance of an authentication plugin created from a resolved configuration.
pub trait AuthPlugin: fmt::Debug + Send + Sync {
    /// Authentication type this plugin was created for.
    fn auth_type(&self) -> &str;

    /// Value of an option, if set.
    fn get(&self, option: &str) -> Option<&str>;

    /// Value of an option parsed as a URL.
    fn get_url(&self, option: &str) -> Result<Option<Url>, Error> {
        self.get(option)
            .map(|value| {
                Url::parse(value).map_err(|e| {
                    Error::new(
                        ErrorKind::InvalidConfig,
                        format!("Invalid {} `{}`: {}", option, value, e),
                    )
                })
            })
            .transpose()
    }
}

assert_obj_safe!(AuthPlugin);

/// Option schema of an authentication type.
pub trait AuthOptionSchema: fmt::Debug + Send + Sync {
    /// Name of the authentication type.
    fn name(&self) -> &str;

    /// Options declared by the authentication type.
    fn options(&self) -> &[AuthOption];

    /// Create a plugin instance from a validated `auth` mapping.
    fn create(&self, auth: &Mapping) -> Result<Arc<dyn AuthPlugin>, Error>;
}

assert_obj_safe!(AuthOptionSchema);

/// Source of authentication option schemas.
pub trait PluginLoader: fmt::Debug + Send + Sync {
    /// Load the schema of the given authentication type.
    ///
    /// Must fail with `PluginLoadFailure` for unknown types.
    fn load(&self, auth_type: &str) -> Result<Arc<dyn AuthOptionSchema>, Error>;
}

assert_obj_safe!(PluginLoader);

/// Authentication plugin holding the resolved option values.
///
/// Secret values are replaced by their hashes in the debug output.
#[derive(Clone)]
pub struct Credentials {
    auth_type: String,
    values: BTreeMap<String, String>,
    secrets: Vec<String>,
}

assert_impl_all!(Credentials: Send, Sync);

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if self.secrets.contains(key) {
                let mut hasher = DefaultHasher::new();
                value.hash(&mut hasher);
                let _ = map.entry(key, &format!("hash({})", hasher.finish()));
            } else {
                let _ = map.entry(key, value);
            }
        }
        map.finish()?;
        write!(f, " ({})", self.auth_type)
    }
}

impl AuthPlugin for Credentials {
    fn auth_type(&self) -> &str {
        &self.auth_type
    }

    fn get(&self, option: &str) -> Option<&str> {
        self.values.get(option).map(String::as_str)
    }
}

/// Schema defined by a static list of options.
#[derive(Debug, Clone)]
pub struct GenericSchema {
    name: String,
    options: Vec<AuthOption>,
}

impl GenericSchema {
    /// Create a schema.
    pub fn new<S: Into<String>>(name: S, options: Vec<AuthOption>) -> GenericSchema {
        GenericSchema {
            name: name.into(),
            options,
        }
    }
}

impl AuthOptionSchema for GenericSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> &[AuthOption] {
        &self.options
    }

    fn create(&self, auth: &Mapping) -> Result<Arc<dyn AuthPlugin>, Error> {
        let mut values = BTreeMap::new();
        let mut secrets = Vec::new();
        for option in &self.options {
            let dest = option.dest();
            if let Some(value) = auth.get(dest.as_str()) {
                let value = utils::scalar_to_string(value).ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidConfig,
                        format!("{} must be a scalar, got {:?}", dest, value),
                    )
                })?;
                if option.is_secret() {
                    secrets.push(dest.clone());
                }
                let _ = values.insert(dest, value);
            }
        }

        Ok(Arc::new(Credentials {
            auth_type: self.name.clone(),
            values,
            secrets,
        }))
    }
}

fn scope_options() -> Vec<AuthOption> {
    vec![
        AuthOption::new("auth_url").required(),
        AuthOption::new("project_id").with_deprecated("tenant-id"),
        AuthOption::new("project_name").with_deprecated("tenant-name"),
        AuthOption::new("project_domain_id"),
        AuthOption::new("project_domain_name"),
        AuthOption::new("domain_id"),
        AuthOption::new("domain_name"),
        AuthOption::new("trust_id"),
        AuthOption::new("system_scope"),
        AuthOption::new("default_domain_id"),
        AuthOption::new("default_domain_name"),
    ]
}

fn user_options() -> Vec<AuthOption> {
    vec![
        AuthOption::new("user_id"),
        AuthOption::new("username").with_deprecated("user-name"),
        AuthOption::new("user_domain_id"),
        AuthOption::new("user_domain_name"),
    ]
}

fn password_options() -> Vec<AuthOption> {
    let mut result = scope_options();
    result.extend(user_options());
    result.push(AuthOption::new("password").required().secret());
    result
}

fn token_options() -> Vec<AuthOption> {
    let mut result = scope_options();
    result.push(AuthOption::new("token").required().secret());
    result
}

fn application_credential_options() -> Vec<AuthOption> {
    let mut result = vec![AuthOption::new("auth_url").required()];
    result.extend(user_options());
    result.push(AuthOption::new("application_credential_id"));
    result.push(AuthOption::new("application_credential_name"));
    result.push(
        AuthOption::new("application_credential_secret")
            .required()
            .secret(),
    );
    result
}

/// Registry of the authentication types known to this crate.
///
/// Supported types are `password`, `v3password`, `token`, `v3token`, `v3applicationcredential`,
/// `admin_token`, `none` and `http_basic`. More can be added with [register](#method.register).
#[derive(Debug, Clone)]
pub struct BuiltinPlugins {
    schemas: HashMap<String, Arc<dyn AuthOptionSchema>>,
}

impl Default for BuiltinPlugins {
    fn default() -> BuiltinPlugins {
        let mut result = BuiltinPlugins {
            schemas: HashMap::new(),
        };
        result.register(GenericSchema::new("password", password_options()));
        result.register(GenericSchema::new("v3password", password_options()));
        result.register(GenericSchema::new("token", token_options()));
        result.register(GenericSchema::new("v3token", token_options()));
        result.register(GenericSchema::new(
            "v3applicationcredential",
            application_credential_options(),
        ));
        result.register(GenericSchema::new(
            "admin_token",
            vec![
                AuthOption::new("endpoint"),
                AuthOption::new("token").required().secret(),
            ],
        ));
        result.register(GenericSchema::new(
            "none",
            vec![AuthOption::new("endpoint")],
        ));
        result.register(GenericSchema::new(
            "http_basic",
            vec![
                AuthOption::new("endpoint").required(),
                AuthOption::new("username").required(),
                AuthOption::new("password").required().secret(),
            ],
        ));
        result
    }
}

impl BuiltinPlugins {
    /// Create a registry with all built-in types.
    #[inline]
    pub fn new() -> BuiltinPlugins {
        BuiltinPlugins::default()
    }

    /// Create a registry without any types.
    #[inline]
    pub fn empty() -> BuiltinPlugins {
        BuiltinPlugins {
            schemas: HashMap::new(),
        }
    }

    /// Register a new authentication type, replacing an existing one with the same name.
    pub fn register<T: AuthOptionSchema + 'static>(&mut self, schema: T) {
        let _ = self
            .schemas
            .insert(schema.name().to_string(), Arc::new(schema));
    }

    /// Add a new authentication type.
    #[inline]
    pub fn with<T: AuthOptionSchema + 'static>(mut self, schema: T) -> BuiltinPlugins {
        self.register(schema);
        self
    }
}

impl PluginLoader for BuiltinPlugins {
    fn load(&self, auth_type: &str) -> Result<Arc<dyn AuthOptionSchema>, Error> {
        self.schemas.get(auth_type).cloned().ok_or_else(|| {
            Error::new(
                ErrorKind::PluginLoadFailure,
                format!("Unsupported authentication type: {}", auth_type),
            )
        })
    }
}

/// Whether the value should select the pass-through authentication.
#[inline]
pub(crate) fn is_unset_auth_type(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty() || s == "None",
        _ => false,
    }
}
