use std::path::Path;

use serde_yaml::{Mapping, Value};

use super::ENV_PREFIX;
use crate::error::ConfigError;

/// Sections that environment variables may override.
const SECTIONS: &[&str] = &["cache", "backoff", "resolver", "session"];

/// Load a YAML file, if present, and deep-merge it into `tree`.
pub(crate) fn merge_yaml_file(path: &Path, tree: &mut Value) -> Result<(), ConfigError> {
    if path.exists() {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
        merge_yaml_str(&content, tree)?;
    }
    Ok(())
}

/// Parse a YAML string and deep-merge it into `tree`.
pub(crate) fn merge_yaml_str(content: &str, tree: &mut Value) -> Result<(), ConfigError> {
    let overlay: Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
    match overlay {
        // An empty file parses as null.
        Value::Null => Ok(()),
        Value::Mapping(_) => {
            deep_merge(tree, overlay);
            Ok(())
        }
        other => Err(ConfigError::Load(format!(
            "expected a mapping at the document root, got {other:?}"
        ))),
    }
}

fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

/// Overlay `TENANTGATE_<SECTION>_<KEY>` variables onto `tree`.
///
/// Values are parsed as YAML scalars so `"30"` becomes a number and `"true"`
/// a boolean. Variables naming an unknown section are ignored.
pub(crate) fn overlay_env(
    tree: &mut Value,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<(), ConfigError> {
    for (env_key, env_val) in vars {
        let Some(rest) = env_key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let rest = rest.to_ascii_lowercase();
        let Some((section, key)) = rest.split_once('_') else {
            continue;
        };
        if !SECTIONS.contains(&section) || key.is_empty() {
            continue;
        }

        let value: Value = serde_yaml::from_str(&env_val).map_err(|e| ConfigError::Env {
            key: env_key.clone(),
            message: e.to_string(),
        })?;

        let Value::Mapping(root) = tree else {
            return Err(ConfigError::Load("config root is not a mapping".into()));
        };
        let section_value = root
            .entry(Value::String(section.to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if !section_value.is_mapping() {
            *section_value = Value::Mapping(Mapping::new());
        }
        if let Value::Mapping(section_map) = section_value {
            section_map.insert(Value::String(key.to_string()), value);
        }
    }
    Ok(())
}
