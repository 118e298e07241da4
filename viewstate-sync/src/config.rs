use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable pointing at a JSON config file.
pub const CONFIG_ENV: &str = "VIEWSTATE_SYNC_CONFIG";

/// Placeholder replaced by the property name in `delegate_template`.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Naming conventions of the presenter pattern.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Exact name of the class holding the source-of-truth properties
    pub state_class: String,
    /// Substring identifying the presenter class among the file's top-level classes
    pub presenter_marker: String,
    /// Exact name of the presenter property initialized with the proxy object
    pub proxy_property: String,
    /// Member declaration inserted into the proxy; `{name}` is the property name
    pub delegate_template: String,
    /// Indentation step used when the proxy body has no member to copy it from
    pub indent_unit: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            state_class: "State".to_string(),
            presenter_marker: "Presenter".to_string(),
            proxy_property: "viewStateProxy".to_string(),
            delegate_template: "override val {name} by owner.delegateFor(\"{name}\")".to_string(),
            indent_unit: "    ".to_string(),
        }
    }
}

impl SyncConfig {
    /// Resolves the configuration.
    ///
    /// Priority order:
    /// 1. Explicit path (the `--config` flag)
    /// 2. Environment variable VIEWSTATE_SYNC_CONFIG
    /// 3. Built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        };

        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON or YAML config file; the format follows the extension, and files
    /// with any other extension are tried as JSON first.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|s| s.to_str());
        if matches!(extension, Some("yaml") | Some("yml")) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config YAML: {}", path.display()))
        } else {
            serde_json::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .with_context(|| {
                    format!("Failed to parse config file (tried both JSON and YAML): {}", path.display())
                })
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("state_class", &self.state_class),
            ("presenter_marker", &self.presenter_marker),
            ("proxy_property", &self.proxy_property),
        ] {
            if value.trim().is_empty() {
                bail!("Config key '{}' must not be empty", key);
            }
        }
        if !self.delegate_template.contains(NAME_PLACEHOLDER) {
            bail!(
                "Config key 'delegate_template' must contain the {} placeholder",
                NAME_PLACEHOLDER
            );
        }
        if self.indent_unit.chars().any(|c| c != ' ' && c != '\t') {
            bail!("Config key 'indent_unit' may only contain spaces and tabs");
        }
        Ok(())
    }
}

/// Replaces every `{name}` in `template`.
///
/// Inside a string literal a backticked name loses its backticks, so
/// `` `is` `` becomes the key `"is"` while the declaration keeps `` `is` ``.
pub fn render_template(template: &str, name: &str) -> String {
    let bare = name
        .strip_prefix('`')
        .and_then(|n| n.strip_suffix('`'))
        .unwrap_or(name);

    let mut out = String::with_capacity(template.len() + name.len());
    let mut in_string = false;
    let mut rest = template;
    while let Some(idx) = rest.find(NAME_PLACEHOLDER) {
        let (head, tail) = rest.split_at(idx);
        if unescaped_quotes(head) % 2 == 1 {
            in_string = !in_string;
        }
        out.push_str(head);
        out.push_str(if in_string { bare } else { name });
        rest = &tail[NAME_PLACEHOLDER.len()..];
    }
    out.push_str(rest);
    out
}

fn unescaped_quotes(text: &str) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for c in text.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => count += 1,
            _ => escaped = false,
        }
    }
    count
}
