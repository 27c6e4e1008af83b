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

//! OpenStack cloud configuration.
//!
//! Resolves the settings of a named cloud from built-in defaults, vendor profiles,
//! `clouds.yaml` and `secure.yaml` files, `OS_*` environment variables and explicit
//! arguments.
//!
//! ```rust,no_run
//! let config = osconfig::OpenStackConfig::new().expect("Cannot load configuration");
//! let cloud = config
//!     .get_one_cloud(Some("devstack"), true, None, Default::default())
//!     .expect("Cannot resolve cloud");
//! println!("Region: {}", cloud.region());
//! ```

#![crate_name = "osconfig"]
#![crate_type = "lib"]
// NOTE: we do not use generic deny(warnings) to avoid breakages with new
// versions of the compiler. Add more warnings here as you discover them.
// Taken from https://github.com/rust-unofficial/patterns/
#![deny(
    dead_code,
    improper_ctypes,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    trivial_casts,
    trivial_numeric_casts,
    unconditional_recursion,
    unsafe_code,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_doc_comments,
    unused_import_braces,
    unused_parens,
    unused_qualifications,
    unused_results,
    while_true
)]
#![allow(
    clippy::new_ret_no_self,
    clippy::should_implement_trait,
    clippy::wrong_self_convention
)]

mod auth;
mod cache;
mod compat;
mod config;
mod defaults;
mod error;
mod interface;
mod loading;
mod utils;

pub use crate::auth::{
    AuthOption, AuthOptionSchema, AuthPlugin, BuiltinPlugins, Credentials, GenericSchema,
    PluginLoader,
};
pub use crate::cache::CacheConfig;
pub use crate::config::{OpenStackConfig, OpenStackConfigBuilder, DEFAULT_ENV_CLOUD};
pub use crate::defaults::{get_defaults, get_profile, profile_names};
pub use crate::error::{Error, ErrorKind};
pub use crate::interface::InterfaceType;
pub use crate::loading::{
    config_dirs, read_yaml, search_paths, set_one_cloud, ClientCert, CloudConfig, Environment,
    MemoryEnvironment, RealEnvironment, Verify, CONFIG_FILES, SECURE_FILES, VENDOR_FILES,
};
