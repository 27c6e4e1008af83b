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

//! Backwards compatibility fixups for legacy option names.

use log::debug;
use serde_yaml::{Mapping, Value};

use crate::utils;

/// Where a canonical key lives after collapsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Top level of the cloud configuration.
    Top,
    /// The `auth` sub-mapping.
    Auth,
}

/// A canonical key with its legacy names.
#[derive(Debug)]
struct Alias {
    canonical: &'static str,
    /// Legacy names, the first one has the highest priority.
    legacy: &'static [&'static str],
    target: Target,
}

const PROJECT_ALIASES: &[Alias] = &[
    Alias {
        canonical: "project_id",
        legacy: &["tenant_id", "tenant-id", "project-id"],
        target: Target::Auth,
    },
    Alias {
        canonical: "project_name",
        legacy: &["tenant_name", "tenant-name", "project-name"],
        target: Target::Auth,
    },
    Alias {
        canonical: "domain_id",
        legacy: &["domain-id"],
        target: Target::Auth,
    },
    Alias {
        canonical: "domain_name",
        legacy: &["domain-name"],
        target: Target::Auth,
    },
    Alias {
        canonical: "user_domain_id",
        legacy: &["user-domain-id"],
        target: Target::Auth,
    },
    Alias {
        canonical: "user_domain_name",
        legacy: &["user-domain-name"],
        target: Target::Auth,
    },
    Alias {
        canonical: "project_domain_id",
        legacy: &["project-domain-id"],
        target: Target::Auth,
    },
    Alias {
        canonical: "project_domain_name",
        legacy: &["project-domain-name"],
        target: Target::Auth,
    },
    Alias {
        canonical: "token",
        legacy: &["auth_token", "auth-token"],
        target: Target::Auth,
    },
];

const AUTH_PLUGIN_ALIASES: &[Alias] = &[Alias {
    canonical: "auth_type",
    legacy: &["auth_plugin", "auth-plugin", "auth-type"],
    target: Target::Top,
}];

const TIMEOUT_ALIASES: &[Alias] = &[Alias {
    canonical: "api_timeout",
    legacy: &["timeout", "api-timeout"],
    target: Target::Top,
}];

const DOMAIN_KEYS: &[&str] = &["domain_id", "domain_name"];
const DOMAIN_PREFIXES: &[&str] = &["user", "project"];

fn take(mapping: &mut Mapping, key: &str) -> Option<Value> {
    mapping
        .remove(key)
        .filter(|value| !utils::is_empty_value(value))
}

fn collapse_one(config: &mut Mapping, alias: &Alias) {
    let names = std::iter::once(alias.canonical).chain(alias.legacy.iter().copied());
    let mut winner = None;
    for name in names {
        // Every location is drained, only the first found value is kept.
        let in_auth = if alias.target == Target::Auth {
            config
                .get_mut("auth")
                .and_then(Value::as_mapping_mut)
                .and_then(|auth| take(auth, name))
        } else {
            None
        };
        let at_top = take(config, name);
        if winner.is_none() {
            winner = in_auth.or(at_top);
        }
    }

    if let Some(value) = winner {
        match alias.target {
            Target::Top => {
                let _ = config.insert(alias.canonical.into(), value);
            }
            Target::Auth => {
                let value = utils::scalar_to_string(&value)
                    .map(Value::String)
                    .unwrap_or(value);
                let _ = utils::ensure_mapping(config, "auth").insert(alias.canonical.into(), value);
            }
        }
    }
}

fn collapse_aliases(config: &mut Mapping, table: &[Alias]) {
    for alias in table {
        collapse_one(config, alias);
    }
}

/// Collapse project, tenant and domain aliases into `auth`.
pub fn fix_backwards_project(config: &mut Mapping) {
    collapse_aliases(config, PROJECT_ALIASES);
}

/// Collapse `auth_plugin` into `auth_type`, replacing the deprecated `v2password` type.
pub fn fix_backwards_auth_plugin(config: &mut Mapping) {
    collapse_aliases(config, AUTH_PLUGIN_ALIASES);
    if utils::get_str(config, "auth_type") == Some("v2password") {
        debug!("Replacing deprecated v2password authentication with password");
        let _ = config.insert("auth_type".into(), "password".into());
    }
}

/// Rename `*endpoint_type` keys to `*interface`.
///
/// A `*endpoint_type` key replaces its `*interface` counterpart, which may come from the
/// built-in defaults.
pub fn fix_backwards_interface(config: &mut Mapping) {
    let legacy: Vec<String> = config
        .iter()
        .filter_map(|(key, _)| key.as_str())
        .filter(|key| key.ends_with("endpoint_type"))
        .map(String::from)
        .collect();
    for key in legacy {
        let target = format!("{}interface", key.trim_end_matches("endpoint_type"));
        if let Some(value) = config.remove(key.as_str()) {
            debug!("Using legacy {} as {}", key, target);
            let _ = config.insert(target.into(), value);
        }
    }
    collapse_aliases(config, TIMEOUT_ALIASES);
}

/// Propagate `domain_id` and `domain_name` from `auth` to user and project domains.
pub fn expand_domain(config: &mut Mapping) {
    let auth = match config.get_mut("auth").and_then(Value::as_mapping_mut) {
        Some(auth) => auth,
        None => return,
    };

    for key in DOMAIN_KEYS {
        if let Some(value) = auth.remove(*key) {
            for prefix in DOMAIN_PREFIXES {
                let prefixed = format!("{}_{}", prefix, key);
                if !auth.contains_key(prefixed.as_str()) {
                    let _ = auth.insert(prefixed.into(), value.clone());
                }
            }
        }
    }
}

/// Collapse all legacy aliases in their fixed order.
///
/// Domain expansion is not included: it must see the fully merged `auth`.
pub fn fix_aliases(config: &mut Mapping) {
    fix_backwards_project(config);
    fix_backwards_auth_plugin(config);
    fix_backwards_interface(config);
}
