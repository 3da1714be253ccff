//! Runtime `key=value` overrides and the reserved-key check.
//!
//! Keys are dotted paths into the TOML tree (`model.seed=7`). Values are read
//! as TOML literals when they parse as one and as plain strings otherwise, so
//! `render.alpha=0.5` is a float and `model.modelname=foo` is a string.

use crate::error::ConfigError;

use super::Config;

/// Split a `key=value` entry into its dotted key and TOML value.
pub fn parse_override(entry: &str) -> Result<(String, toml::Value), ConfigError> {
    let (key, raw) = entry.split_once('=').ok_or_else(|| ConfigError::Override {
        entry: entry.to_string(),
        message: "expected key=value".to_string(),
    })?;

    let key = key.trim();
    if key.is_empty() || key.split('.').any(str::is_empty) {
        return Err(ConfigError::Override {
            entry: entry.to_string(),
            message: "empty key".to_string(),
        });
    }

    let raw = raw.trim();
    let value = toml::from_str::<toml::Table>(&format!("v = {raw}"))
        .ok()
        .and_then(|mut table| table.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()));

    Ok((key.to_string(), value))
}

fn set_path(root: &mut toml::Value, key: &str, value: toml::Value) -> Result<(), String> {
    let mut parts = key.split('.').peekable();
    let mut node = root;
    while let Some(part) = parts.next() {
        let table = node
            .as_table_mut()
            .ok_or_else(|| format!("{part:?} is not inside a table"))?;
        if parts.peek().is_none() {
            table.insert(part.to_string(), value);
            return Ok(());
        }
        node = table
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    }
    Ok(())
}

pub(super) fn collect_keys(value: &toml::Value, out: &mut Vec<String>) {
    if let Some(table) = value.as_table() {
        for (key, child) in table {
            out.push(key.clone());
            collect_keys(child, out);
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim_start_matches('-').replace('-', "_")
}

impl Config {
    /// Merge `key=value` overrides into this config.
    ///
    /// The merged result is re-deserialized, so a value of the wrong type
    /// for a known key fails here rather than later.
    pub fn apply_overrides<S: AsRef<str>>(&mut self, entries: &[S]) -> Result<(), ConfigError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut root = toml::Value::try_from(&*self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        let mut raw_keys = std::mem::take(&mut self.raw_keys);

        for entry in entries {
            let entry = entry.as_ref();
            let (key, value) = parse_override(entry)?;
            tracing::debug!("Config override {} = {}", key, value);
            set_path(&mut root, &key, value).map_err(|message| ConfigError::Override {
                entry: entry.to_string(),
                message,
            })?;
            raw_keys.extend(key.split('.').map(str::to_string));
        }

        *self = root.try_into()?;
        self.raw_keys = raw_keys;
        Ok(())
    }

    /// Reject any section or key whose name is also a command-line option.
    ///
    /// Covers known fields as well as unknown keys seen in the config file
    /// or in overrides. `reserved` holds option names as clap reports them;
    /// leading dashes and `-`/`_` spelling differences are ignored.
    pub fn check_reserved_keys<S: AsRef<str>>(&self, reserved: &[S]) -> Result<(), ConfigError> {
        let root = toml::Value::try_from(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        let mut keys = Vec::new();
        collect_keys(&root, &mut keys);
        keys.extend(self.raw_keys.iter().cloned());

        let reserved: Vec<String> = reserved.iter().map(|r| normalize(r.as_ref())).collect();
        match keys.into_iter().find(|k| reserved.contains(&normalize(k))) {
            Some(key) => Err(ConfigError::ReservedKey { key }),
            None => Ok(()),
        }
    }
}
