use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{DenyReason, GateError, Result};

/// How the sandboxed side wants to use a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionMode {
    /// Request/response.
    Invoke,
    /// Fire-and-forget.
    Send,
    /// Subscribe (`on` and `once`).
    On,
}

impl InteractionMode {
    pub const ALL: [InteractionMode; 3] =
        [InteractionMode::Invoke, InteractionMode::Send, InteractionMode::On];

    pub fn as_str(self) -> &'static str {
        match self {
            InteractionMode::Invoke => "invoke",
            InteractionMode::Send => "send",
            InteractionMode::On => "on",
        }
    }
}

impl std::fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if `name` matches `^[a-zA-Z0-9._:-]+$`.
pub fn is_valid_channel_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
}

/// Exact names and prefixes permitted for one mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelRules {
    #[serde(default)]
    pub exact: BTreeSet<String>,
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl ChannelRules {
    pub fn new<E, P>(exact: E, prefixes: P) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            exact: exact.into_iter().map(Into::into).collect(),
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact membership or a matching prefix. Shape is not checked here.
    pub fn matches(&self, channel: &str) -> bool {
        self.exact.contains(channel)
            || self
                .prefixes
                .iter()
                .any(|prefix| channel.starts_with(prefix.as_str()))
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixes.is_empty()
    }
}

/// Per-mode allow-list tables.
///
/// An empty registry denies everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelRegistry {
    #[serde(default)]
    pub invoke: ChannelRules,
    #[serde(default)]
    pub send: ChannelRules,
    #[serde(default)]
    pub on: ChannelRules,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self, mode: InteractionMode) -> &ChannelRules {
        match mode {
            InteractionMode::Invoke => &self.invoke,
            InteractionMode::Send => &self.send,
            InteractionMode::On => &self.on,
        }
    }

    pub fn rules_mut(&mut self, mode: InteractionMode) -> &mut ChannelRules {
        match mode {
            InteractionMode::Invoke => &mut self.invoke,
            InteractionMode::Send => &mut self.send,
            InteractionMode::On => &mut self.on,
        }
    }

    /// Shape check and allow-list check for one mode.
    pub fn check(&self, mode: InteractionMode, channel: &str) -> Result<()> {
        let reason = if !is_valid_channel_name(channel) {
            DenyReason::InvalidName
        } else if !self.rules(mode).matches(channel) {
            DenyReason::NotAllowed
        } else {
            return Ok(());
        };

        debug!(%mode, channel, %reason, "blocked IPC channel");
        Err(GateError::AccessDenied {
            mode,
            channel: channel.to_string(),
            reason,
        })
    }

    pub fn is_allowed(&self, mode: InteractionMode, channel: &str) -> bool {
        self.check(mode, channel).is_ok()
    }

    /// Parse a registry from JSON text and validate its entries.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Self::from_json_str_with_config(raw, &RegistryConfig::default())
    }

    pub fn from_json_str_with_config(raw: &str, config: &RegistryConfig) -> Result<Self> {
        let registry: ChannelRegistry = serde_json::from_str(raw)?;
        registry.validate(config)?;
        Ok(registry)
    }

    /// Load a registry file.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_file_with_config(path, &RegistryConfig::default())
    }

    /// Load a registry file with explicit limits. Symlinks are refused.
    pub fn from_file_with_config(path: &Path, config: &RegistryConfig) -> Result<Self> {
        let metadata = std::fs::symlink_metadata(path)
            .map_err(|err| GateError::LoadFailed(format!("{}: {err}", path.display())))?;
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            return Err(GateError::LoadFailed(format!(
                "refusing to load registry symlink: {}",
                path.display()
            )));
        }
        if !file_type.is_file() {
            return Err(GateError::LoadFailed(format!("not a regular file: {}", path.display())));
        }
        if metadata.len() > config.max_file_size as u64 {
            return Err(GateError::LoadFailed(format!(
                "registry file too large ({} bytes): {}",
                metadata.len(),
                path.display()
            )));
        }

        let file = std::fs::File::open(path).map_err(|err| {
            GateError::LoadFailed(format!("failed opening {}: {err}", path.display()))
        })?;
        let read_limit = u64::try_from(config.max_file_size.saturating_add(1)).unwrap_or(u64::MAX);
        let mut content = String::new();
        file.take(read_limit)
            .read_to_string(&mut content)
            .map_err(|err| {
                GateError::LoadFailed(format!("failed reading {}: {err}", path.display()))
            })?;
        if content.len() > config.max_file_size {
            return Err(GateError::LoadFailed(format!(
                "registry file too large while reading: {}",
                path.display()
            )));
        }

        let registry = Self::from_json_str_with_config(&content, config)?;
        debug!(
            path = %path.display(),
            invoke = registry.invoke.len(),
            send = registry.send.len(),
            on = registry.on.len(),
            "loaded channel registry"
        );
        Ok(registry)
    }

    fn validate(&self, config: &RegistryConfig) -> Result<()> {
        for mode in InteractionMode::ALL {
            let rules = self.rules(mode);
            if rules.len() > config.max_entries_per_mode {
                return Err(GateError::InvalidRegistry(format!(
                    "{mode} table has {} entries (max {})",
                    rules.len(),
                    config.max_entries_per_mode
                )));
            }
            if let Some(bad) = rules.exact.iter().find(|name| !is_valid_channel_name(name)) {
                return Err(GateError::InvalidRegistry(format!(
                    "{mode} exact entry {bad:?} is not a valid channel name"
                )));
            }
            // A prefix is a channel-name fragment, so the same alphabet applies.
            if let Some(bad) = rules.prefixes.iter().find(|prefix| !is_valid_channel_name(prefix)) {
                return Err(GateError::InvalidRegistry(format!(
                    "{mode} prefix {bad:?} is not a valid channel prefix"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChannelRegistry {
        ChannelRegistry {
            invoke: ChannelRules::new(["get-platform"], ["settings."]),
            send: ChannelRules::new(["hide"], ["toggle-"]),
            on: ChannelRules::new(["notification"], ["gsm-"]),
        }
    }

    #[test]
    fn channel_name_shape() {
        assert!(is_valid_channel_name("settings.save"));
        assert!(is_valid_channel_name("a_b:c-d.e9"));
        assert!(!is_valid_channel_name(""));
        assert!(!is_valid_channel_name("settings save"));
        assert!(!is_valid_channel_name("path/like"));
        assert!(!is_valid_channel_name("ünicode"));
    }

    #[test]
    fn exact_and_prefix_matches() {
        let registry = sample();
        assert!(registry.is_allowed(InteractionMode::Invoke, "get-platform"));
        assert!(registry.is_allowed(InteractionMode::Invoke, "settings.save"));
        assert!(!registry.is_allowed(InteractionMode::Invoke, "settings"));
        assert!(!registry.is_allowed(InteractionMode::Send, "get-platform"));
        assert!(registry.is_allowed(InteractionMode::On, "gsm-status"));
    }

    #[test]
    fn allowed_prefix_does_not_bypass_shape_check() {
        let registry = sample();
        let err = registry
            .check(InteractionMode::Invoke, "settings.save all")
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::AccessDenied {
                reason: DenyReason::InvalidName,
                ..
            }
        ));
    }

    #[test]
    fn denial_names_mode_and_channel() {
        let err = sample().check(InteractionMode::Send, "shutdown").unwrap_err();
        assert!(err.is_access_violation());
        let text = err.to_string();
        assert!(text.contains("send"));
        assert!(text.contains("shutdown"));
    }

    #[test]
    fn empty_registry_denies_everything() {
        let registry = ChannelRegistry::new();
        for mode in InteractionMode::ALL {
            assert!(!registry.is_allowed(mode, "anything"));
        }
    }

    #[test]
    fn parses_json_tables() {
        let registry = ChannelRegistry::from_json_str(
            r#"{"invoke":{"exact":["ping"],"prefixes":["obs."]},"on":{"prefixes":["state-"]}}"#,
        )
        .unwrap();
        assert!(registry.is_allowed(InteractionMode::Invoke, "obs.scenes"));
        assert!(registry.is_allowed(InteractionMode::On, "state-cleared"));
        assert!(registry.send.is_empty());
    }

    #[test]
    fn rejects_unknown_fields_and_bad_entries() {
        assert!(matches!(
            ChannelRegistry::from_json_str(r#"{"invokes":{}}"#),
            Err(GateError::InvalidJson(_))
        ));
        assert!(matches!(
            ChannelRegistry::from_json_str(r#"{"send":{"exact":["bad name"]}}"#),
            Err(GateError::InvalidRegistry(_))
        ));
        assert!(matches!(
            ChannelRegistry::from_json_str(r#"{"on":{"prefixes":[""]}}"#),
            Err(GateError::InvalidRegistry(_))
        ));
    }

    #[test]
    fn entry_limit_is_enforced() {
        let config = RegistryConfig {
            max_entries_per_mode: 1,
            ..RegistryConfig::default()
        };
        let result = ChannelRegistry::from_json_str_with_config(
            r#"{"invoke":{"exact":["a"],"prefixes":["b."]}}"#,
            &config,
        );
        assert!(matches!(result, Err(GateError::InvalidRegistry(_))));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.json");
        std::fs::write(&path, serde_json::to_vec(&sample()).unwrap()).unwrap();

        let loaded = ChannelRegistry::from_file(&path).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn oversized_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.json");
        std::fs::write(&path, vec![b' '; 64]).unwrap();

        let config = RegistryConfig {
            max_file_size: 16,
            ..RegistryConfig::default()
        };
        assert!(matches!(
            ChannelRegistry::from_file_with_config(&path, &config),
            Err(GateError::LoadFailed(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn symlinked_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.json");
        std::fs::write(&target, b"{}").unwrap();
        let link = dir.path().join("link.json");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(matches!(ChannelRegistry::from_file(&link), Err(GateError::LoadFailed(_))));
    }
}
