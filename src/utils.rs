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

//! Internal utilities

use log::{trace, warn};
use serde_yaml::{Mapping, Value};

/// Merge two nested serde_yaml::Mapping structs.
///
/// The values from src are merged into dest. With `overwrite`, values in src override values
/// in dest, otherwise only missing keys are filled in.
pub fn merge_mappings(src: Mapping, dest: &mut Mapping, overwrite: bool) {
    for (src_key, src_value) in src.into_iter() {
        match src_value {
            Value::Mapping(src_mapping) => {
                if let Some(dest_value) = dest.get_mut(&src_key) {
                    match dest_value.as_mapping_mut() {
                        Some(dest_mapping) => {
                            merge_mappings(src_mapping, dest_mapping, overwrite);
                        }
                        None => {
                            if overwrite || dest_value.is_null() {
                                warn!(
                                    "Type mismatch while merging mappings. Expected {:?} to be a Mapping. Overriding destination.",
                                    dest_value
                                );
                                *dest_value = Value::Mapping(src_mapping);
                            }
                        }
                    }
                } else {
                    let _ = dest.insert(src_key, Value::Mapping(src_mapping));
                }
            }
            other => {
                if overwrite || !dest.contains_key(&src_key) {
                    let _ = dest.insert(src_key, other);
                }
            }
        }
    }
}

/// Convert a key to its canonical form (underscores instead of hyphens).
#[inline]
pub fn normalize_key(key: &str) -> String {
    key.replace('-', "_")
}

/// Normalize keys recursively: hyphens become underscores, numbers become strings.
///
/// Booleans are kept intact. Normalizing an already normalized mapping is a no-op.
pub fn normalize_keys(config: Mapping) -> Mapping {
    let mut result = Mapping::with_capacity(config.len());
    for (key, value) in config.into_iter() {
        let key = match key {
            Value::String(s) => Value::String(normalize_key(&s)),
            other => other,
        };
        let value = match value {
            Value::Mapping(map) => Value::Mapping(normalize_keys(map)),
            Value::Number(num) => Value::String(num.to_string()),
            other => other,
        };
        let _ = result.insert(key, value);
    }
    result
}

/// Massage explicitly passed options.
///
/// Hyphens are replaced with underscores and `os_` prefixes are stripped. A prefixed key wins
/// over the same key without a prefix. Nested mappings are processed recursively.
pub fn fix_args(args: Mapping) -> Mapping {
    let mut plain = Mapping::with_capacity(args.len());
    let mut prefixed = Mapping::new();
    for (key, value) in args.into_iter() {
        let key = match key.as_str() {
            Some(key) => normalize_key(key),
            None => {
                let _ = plain.insert(key, value);
                continue;
            }
        };
        let value = match value {
            Value::Mapping(map) => Value::Mapping(fix_args(map)),
            other => other,
        };
        if let Some(stripped) = key.strip_prefix("os_") {
            let _ = prefixed.insert(stripped.into(), value);
        } else {
            let _ = plain.insert(key.into(), value);
        }
    }
    for (key, value) in prefixed {
        let _ = plain.insert(key, value);
    }
    plain
}

/// Interpret a configuration value as a boolean.
///
/// Only an actual `true` or a string equal to `true` (in any case) are considered true.
pub fn get_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(value) => *value,
        Value::String(value) => value.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Convert a scalar value to its string form.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Whether a value is absent for the purpose of option lookup.
#[inline]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Get a string value from a mapping.
#[inline]
pub fn get_str<'m>(mapping: &'m Mapping, key: &str) -> Option<&'m str> {
    mapping.get(key).and_then(Value::as_str)
}

/// Get a nested mapping, creating an empty one if it is missing or not a mapping.
pub fn ensure_mapping<'m>(mapping: &'m mut Mapping, key: &str) -> &'m mut Mapping {
    let is_mapping = mapping.get(key).map(Value::is_mapping).unwrap_or(false);
    if !is_mapping {
        let _ = mapping.insert(key.into(), Value::Mapping(Mapping::new()));
    }
    match mapping.get_mut(key) {
        Some(Value::Mapping(map)) => map,
        _ => unreachable!("{} has just been inserted as a mapping", key),
    }
}

/// Expand `{key}` placeholders once.
///
/// Placeholders that `lookup` cannot resolve are left verbatim. `{{` and `}}` produce literal
/// braces. The result of an expansion is never expanded again.
pub fn interpolate<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        result.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            result.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                let name = &tail[1..end];
                if let Some(value) = lookup(name) {
                    trace!("Expanded {{{}}} to {}", name, value);
                    result.push_str(&value);
                } else {
                    result.push_str(&tail[..=end]);
                }
                rest = &tail[end + 1..];
                continue;
            }
        }

        result.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    result.push_str(rest);
    result
}
