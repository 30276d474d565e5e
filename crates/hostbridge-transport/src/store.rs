use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};

/// File stem of the shared config under the app config directory.
pub const DEFAULT_CONFIG_NAME: &str = "shared_config";

/// Key holding the persisted control-channel port.
pub const PORT_KEY: &str = "port";

/// Port used when nothing has been persisted yet.
pub const DEFAULT_PORT: u16 = 8766;

/// A small JSON-object config file shared between the host and its worker.
///
/// Writes are read-modify-write so keys owned by other components survive.
/// A missing file reads as empty. A corrupt file reads as empty with a
/// warning and is replaced on the next write.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    path: PathBuf,
}

impl SharedConfig {
    /// Use an explicit file path.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `<config dir>/<app_name>/shared_config.json`.
    pub fn open_default(app_name: &str) -> Result<Self> {
        let dir = dirs::config_dir().ok_or(TransportError::NoConfigDir)?;
        Ok(Self::open(
            dir.join(app_name)
                .join(format!("{DEFAULT_CONFIG_NAME}.json")),
        ))
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a raw value.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.load()?.remove(key))
    }

    /// Write a raw value, keeping every other key.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self.load()?;
        map.insert(key.to_string(), value);
        self.save(&map)
    }

    /// Persisted port, or [`DEFAULT_PORT`] if absent or not a valid port.
    pub fn preferred_port(&self) -> Result<u16> {
        self.port_under(PORT_KEY)
    }

    /// Persisted port under an explicit key.
    pub fn port_under(&self, key: &str) -> Result<u16> {
        match self.get(key)? {
            None => Ok(DEFAULT_PORT),
            Some(value) => match value.as_u64().and_then(|v| u16::try_from(v).ok()) {
                Some(port) => Ok(port),
                None => {
                    warn!(key, %value, path = ?self.path, "ignoring invalid persisted port");
                    Ok(DEFAULT_PORT)
                }
            },
        }
    }

    /// Persist a port under an explicit key.
    pub fn store_port(&self, key: &str, port: u16) -> Result<()> {
        self.set(key, Value::from(port))
    }

    fn load(&self) -> Result<Map<String, Value>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(TransportError::ConfigRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => {
                warn!(path = ?self.path, "shared config is not a JSON object; ignoring");
                Ok(Map::new())
            }
            Err(err) => {
                warn!(path = ?self.path, error = %err, "shared config is corrupt; ignoring");
                Ok(Map::new())
            }
        }
    }

    fn save(&self, map: &Map<String, Value>) -> Result<()> {
        let write_err = |source: std::io::Error| TransportError::ConfigWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let body = serde_json::to_vec_pretty(map)
            .map_err(|err| write_err(std::io::Error::other(err)))?;

        // Write beside the target then rename so readers never see a torn file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        debug!(path = ?self.path, "shared config written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> SharedConfig {
        SharedConfig::open(dir.path().join("shared_config.json"))
    }

    #[test]
    fn missing_file_yields_default_port() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        assert_eq!(config.preferred_port().unwrap(), DEFAULT_PORT);
        assert!(config.get("anything").unwrap().is_none());
    }

    #[test]
    fn stored_port_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        config.store_port(PORT_KEY, 9100).unwrap();
        assert_eq!(config.preferred_port().unwrap(), 9100);

        let reopened = config_in(&dir);
        assert_eq!(reopened.preferred_port().unwrap(), 9100);
    }

    #[test]
    fn write_preserves_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        std::fs::write(config.path(), r#"{"theme":"dark","port":8766}"#).unwrap();

        config.store_port(PORT_KEY, 8770).unwrap();

        assert_eq!(config.get("theme").unwrap(), Some(Value::from("dark")));
        assert_eq!(config.preferred_port().unwrap(), 8770);
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        std::fs::write(config.path(), b"{not json").unwrap();

        assert_eq!(config.preferred_port().unwrap(), DEFAULT_PORT);

        config.store_port(PORT_KEY, 8800).unwrap();
        assert_eq!(config.preferred_port().unwrap(), 8800);
    }

    #[test]
    fn out_of_range_port_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        std::fs::write(config.path(), r#"{"port":70000}"#).unwrap();

        assert_eq!(config.preferred_port().unwrap(), DEFAULT_PORT);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = SharedConfig::open(dir.path().join("nested/app/shared_config.json"));

        config.store_port(PORT_KEY, 8766).unwrap();
        assert!(config.path().exists());
    }
}
