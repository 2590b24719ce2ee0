//! Settings registry and `clink_settings` persistence, plus the session
//! descriptor passed to `initialise`.
//!
//! The registry is a name-sorted `Vec`, binary-searched on access, rather
//! than an intrusive doubly-linked list — nothing here needs insertion
//! order or O(1) unlink, and a sorted vector keeps iteration (for
//! serialization) trivially stable.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

mod schema;
pub use schema::{DupeMode, EscMode, ExpandMode, IgnoreCase, Value, ValueType};

/// One named setting: its current value, type (for the persisted `# type:`
/// header), and a short description (for the `# name:` header).
#[derive(Debug, Clone)]
pub struct Setting {
    name: &'static str,
    description: &'static str,
    value: Value,
}

impl Setting {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn ty(&self) -> ValueType {
        self.value.ty()
    }
}

/// All known settings, sorted by name for binary search.
#[derive(Debug, Clone)]
pub struct SettingsRegistry {
    entries: Vec<Setting>,
}

impl Default for SettingsRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SettingsRegistry {
    /// Build the registry with its documented default settings.
    pub fn with_defaults() -> Self {
        let mut entries = vec![
            Setting {
                name: "history.shared",
                description: "share history across concurrent sessions",
                value: Value::Bool(false),
            },
            Setting {
                name: "history.ignore_space",
                description: "skip lines starting with whitespace",
                value: Value::Bool(true),
            },
            Setting {
                name: "history.dupe_mode",
                description: "how to handle a line matching prior history",
                value: Value::DupeMode(DupeMode::ErasePrev),
            },
            Setting {
                name: "history.expand_mode",
                description: "bash-style history expansion (!) scope",
                value: Value::ExpandMode(ExpandMode::NotQuoted),
            },
            Setting {
                name: "match.ignore_case",
                description: "case sensitivity for match generation",
                value: Value::IgnoreCase(IgnoreCase::Relaxed),
            },
            Setting {
                name: "match.query_threshold",
                description: "match count above which to prompt before listing",
                value: Value::Int(100),
            },
            Setting {
                name: "match.vertical",
                description: "lay matches out in columns (false) or rows (true)",
                value: Value::Bool(false),
            },
            Setting {
                name: "match.column_pad",
                description: "spaces padded between match display columns",
                value: Value::Int(2),
            },
            Setting {
                name: "match.max_width",
                description: "max display width of a single match entry",
                value: Value::Int(0),
            },
            Setting {
                name: "input.esc",
                description: "what the bare Escape key surfaces as",
                value: Value::EscMode(EscMode::Raw),
            },
            Setting {
                name: "files.hidden",
                description: "include hidden files in filename matches",
                value: Value::Bool(true),
            },
            Setting {
                name: "files.system",
                description: "include system files in filename matches",
                value: Value::Bool(false),
            },
            Setting {
                name: "files.unc_paths",
                description: "allow UNC paths in filename matches",
                value: Value::Bool(false),
            },
        ];
        entries.sort_by_key(|s| s.name);
        Self { entries }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.binary_search_by_key(&name, |s| s.name).ok()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index_of(name).map(|i| &self.entries[i].value)
    }

    /// Overwrite a setting's value if `name` is known and `value`'s type
    /// matches the registered type. Returns `false` (and logs once) on an
    /// unknown name or type mismatch; callers continue with the prior
    /// value.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        let Some(idx) = self.index_of(name) else {
            warn!(target: "config", name, "unknown_setting");
            return false;
        };
        if self.entries[idx].ty() != value.ty() {
            warn!(
                target: "config",
                name,
                expected = ?self.entries[idx].ty(),
                got = ?value.ty(),
                "setting_type_mismatch"
            );
            return false;
        }
        self.entries[idx].value = value;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.entries.iter()
    }

    /// Render in the `clink_settings` text format: a `# name:` / `#
    /// type:` comment pair above each `key = value` line, blank line
    /// between entries.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for setting in &self.entries {
            out.push_str("# name: ");
            out.push_str(setting.description);
            out.push('\n');
            out.push_str("# type: ");
            out.push_str(setting.ty().as_str());
            out.push('\n');
            out.push_str(setting.name);
            out.push_str(" = ");
            out.push_str(&setting.value.to_text());
            out.push_str("\n\n");
        }
        out
    }

    /// Parse `clink_settings` text, applying every `key = value` body line
    /// found. Comment (`#`) and blank lines are skipped; an unknown key or
    /// a value that fails to parse for its registered type is logged and
    /// skipped, leaving the default in place — a malformed settings file
    /// must never prevent startup.
    pub fn apply_text(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, raw_value)) = line.split_once('=') else {
                warn!(target: "config", line, "malformed_settings_line");
                continue;
            };
            let key = key.trim();
            let raw_value = raw_value.trim();
            let Some(idx) = self.index_of(key) else {
                warn!(target: "config", key, "unknown_setting_in_file");
                continue;
            };
            match Value::from_text(self.entries[idx].ty(), raw_value) {
                Some(value) => self.entries[idx].value = value,
                None => warn!(target: "config", key, raw_value, "unparsable_setting_value"),
            }
        }
    }
}

/// The `desc` argument to `initialise`: where persisted state lives,
/// whether this session inherits an ancestor's session id, logging
/// controls, and quiet mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub state_dir: PathBuf,
    #[serde(default)]
    pub inherit_session_id: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "SessionDescriptor::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub quiet: bool,
}

impl SessionDescriptor {
    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Best-effort default: platform config dir, falling back to a `.clink`
    /// directory relative to the current working directory.
    pub fn discover_state_dir() -> PathBuf {
        if let Some(dir) = dirs::config_dir() {
            return dir.join("clink");
        }
        PathBuf::from(".clink")
    }

    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            inherit_session_id: false,
            session_id: None,
            log_level: Self::default_log_level(),
            quiet: false,
        }
    }
}

pub fn settings_path(state_dir: &Path) -> PathBuf {
    state_dir.join("clink_settings")
}

/// Best-effort load of `clink_settings` from `state_dir`. A missing or
/// unreadable file yields the defaults; a present file is parsed leniently
/// on top of the defaults so a partial/older file still works.
pub fn load_from(state_dir: &Path) -> Result<SettingsRegistry> {
    let mut registry = SettingsRegistry::with_defaults();
    let path = settings_path(state_dir);
    match fs::read_to_string(&path) {
        Ok(text) => {
            info!(target: "config", path = %path.display(), "settings_loaded");
            registry.apply_text(&text);
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(target: "config", path = %path.display(), "settings_file_absent_using_defaults");
        }
        Err(err) => {
            warn!(target: "config", path = %path.display(), error = %err, "settings_load_failed_using_defaults");
        }
    }
    Ok(registry)
}

/// Persist the registry to `clink_settings` under `state_dir`, creating the
/// directory if needed.
pub fn save_to(state_dir: &Path, registry: &SettingsRegistry) -> Result<()> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("creating state dir {}", state_dir.display()))?;
    let path = settings_path(state_dir);
    fs::write(&path, registry.serialize())
        .with_context(|| format!("writing settings file {}", path.display()))?;
    Ok(())
}
