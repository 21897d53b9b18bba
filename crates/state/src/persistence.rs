//! User preference file.

use serde_json::{Map, Value};
use std::path::Path;

use crate::config::Config;
use crate::ConfigError;

/// Reads the preference file as a partial configuration document.
///
/// A missing file is an empty tier. A file that cannot be read or is not a
/// JSON object is logged and treated as empty so a corrupt preference file
/// never blocks startup.
pub fn load_user_layer(path: &Path) -> Value {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Value::Object(Map::new());
        }
        Err(err) => {
            tracing::warn!(target: "grimoire::config", path = %path.display(), error = %err, "user config unreadable, ignoring");
            return Value::Object(Map::new());
        }
    };
    match serde_json::from_str::<Value>(&data) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            tracing::warn!(target: "grimoire::config", path = %path.display(), "user config is not an object, ignoring");
            Value::Object(Map::new())
        }
        Err(err) => {
            tracing::warn!(target: "grimoire::config", path = %path.display(), error = %err, "user config is not valid JSON, ignoring");
            Value::Object(Map::new())
        }
    }
}

/// Writes the full configuration as the new preference file.
pub fn save_user_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let body = serde_json::to_string_pretty(config)?;
    std::fs::write(path, body).map_err(write_err)?;
    tracing::debug!(target: "grimoire::config", path = %path.display(), "saved user config");
    Ok(())
}
