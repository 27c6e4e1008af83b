// Copyright 2020 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Support for loading configuration from external input.

mod cloud;
mod config;
mod env;

pub use cloud::{ClientCert, CloudConfig, Verify};
pub use config::{
    config_dirs, read_yaml, search_paths, set_one_cloud, CONFIG_FILES, SECURE_FILES,
    VENDOR_FILES,
};
pub(crate) use config::{clouds_mapping, load_first};
pub use env::{Environment, MemoryEnvironment, RealEnvironment};
pub(crate) use env::{env_cloud, env_overrides, pop_non_empty, var_name};
