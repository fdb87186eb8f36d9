//! Builds the runtime [`Config`] by layering sources over the compiled-in
//! defaults.

use super::{validate_config_security, Config};
use serde_json::Value;
use std::path::Path;

/// Merge order, later sources winning per field:
///
/// 1. compiled-in defaults
/// 2. raw JSON in the `WOLFDEN_CONFIG_JSON` env var
/// 3. the file named by `WOLFDEN_CONFIG_PATH`
/// 4. `config.json` in the working directory
/// 5. `WOLFDEN__`-prefixed env vars, `__` separating nesting
///    (`WOLFDEN__PORT=8080`, `WOLFDEN__LOGGING__LEVEL=debug`)
///
/// A broken source is reported on stderr and skipped; this function never
/// fails. Deployments that must refuse to boot on a bad config run
/// [`validate_config_security`](super::validate_config_security) on the
/// result and treat its error as fatal.
#[must_use]
pub fn load() -> Config {
    let mut tree = serde_json::to_value(Config::default())
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    if let Ok(raw) = std::env::var("WOLFDEN_CONFIG_JSON") {
        if let Some(inline) = json_from(&raw, "WOLFDEN_CONFIG_JSON") {
            deep_merge(&mut tree, inline);
        }
    }
    if let Ok(path) = std::env::var("WOLFDEN_CONFIG_PATH") {
        overlay_file(&mut tree, Path::new(&path));
    }
    overlay_file(&mut tree, Path::new("config.json"));
    overlay_env(&mut tree);

    let config = serde_json::from_value::<Config>(tree).unwrap_or_else(|err| {
        eprintln!("merged configuration did not deserialize ({err}); falling back to defaults");
        Config::default()
    });

    // Non-fatal here; main re-runs the check and aborts on error
    if let Err(reason) = validate_config_security(&config) {
        eprintln!("configuration warning: {reason}");
    }
    config
}

fn json_from(raw: &str, source: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!("ignoring config from {source}: {err}");
            None
        }
    }
}

fn overlay_file(tree: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            if let Some(value) = json_from(&contents, &path.display().to_string()) {
                deep_merge(tree, value);
            }
        }
        Err(err) => eprintln!("could not read {}: {err}", path.display()),
    }
}

/// Recursive object merge; scalars and arrays replace wholesale.
fn deep_merge(tree: &mut Value, overlay: Value) {
    match overlay {
        Value::Object(incoming) => {
            let Value::Object(base) = tree else {
                *tree = Value::Object(incoming);
                return;
            };
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        leaf => *tree = leaf,
    }
}

fn overlay_env(tree: &mut Value) {
    for (key, raw) in std::env::vars() {
        let Some(dotted) = key.strip_prefix("WOLFDEN__") else {
            continue;
        };
        let path: Vec<String> = dotted
            .split("__")
            .filter(|piece| !piece.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();
        if !path.is_empty() {
            insert_path(tree, &path, env_value(&raw));
        }
    }
}

/// Env values become JSON scalars where they parse as such, strings
/// otherwise; a comma splits into an array.
fn env_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.contains(',') {
        Value::Array(trimmed.split(',').map(|piece| scalar(piece.trim())).collect())
    } else {
        scalar(trimmed)
    }
}

fn scalar(piece: &str) -> Value {
    if piece.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_str(piece).unwrap_or_else(|_| Value::String(piece.to_string()))
}

fn insert_path(tree: &mut Value, path: &[String], value: Value) {
    match path {
        [] => *tree = value,
        [leaf] => {
            as_object(tree).insert(leaf.clone(), value);
        }
        [head, rest @ ..] => {
            let child = as_object(tree)
                .entry(head.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            insert_path(child, rest, value);
        }
    }
}

fn as_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }
    match value.as_object_mut() {
        Some(map) => map,
        // Coerced to an object two lines up
        None => unreachable!("value was just made an object"),
    }
}
