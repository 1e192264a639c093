//! Server-side configuration, read from `/etc/fleetops/<name>.toml`.
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//!
//! [storage]
//! data_dir = "/var/lib/fleetops"
//!
//! [engine]
//! due_soon_threshold = 50.0
//! ```

use std::path::{Path, PathBuf};

use equipment::EngineConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Optional explicit database file; defaults to `{data_dir}/data.sqlite`.
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Listen address; the command line wins when both are given.
    #[serde(default)]
    pub listen: Option<String>,
}

impl ServerConfig {
    /// A bare context name maps to `/etc/fleetops/<name>.toml`.
    /// Anything containing `/` or `.` is taken as a path.
    pub fn resolve_path(name: &str) -> PathBuf {
        if name.contains('/') || name.contains('.') {
            PathBuf::from(name)
        } else {
            PathBuf::from(format!("/etc/fleetops/{name}.toml"))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&content)?;
        config.verify()?;
        Ok(config)
    }

    fn verify(&self) -> anyhow::Result<()> {
        if self.storage.data_dir.is_empty() {
            anyhow::bail!("Storage data_dir is empty in configuration.");
        }
        let t = self.engine.due_soon_threshold;
        if !t.is_finite() || t < 0.0 {
            anyhow::bail!("engine.due_soon_threshold must be a non-negative number (got {t})");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("site.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn resolve_names_and_paths() {
        assert_eq!(
            ServerConfig::resolve_path("quarry"),
            PathBuf::from("/etc/fleetops/quarry.toml")
        );
        assert_eq!(
            ServerConfig::resolve_path("./local.toml"),
            PathBuf::from("./local.toml")
        );
        assert_eq!(
            ServerConfig::resolve_path("/srv/fleet/cfg"),
            PathBuf::from("/srv/fleet/cfg")
        );
    }

    #[test]
    fn load_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
listen = "127.0.0.1:9000"

[storage]
data_dir = "/var/lib/fleetops"

[engine]
due_soon_threshold = 120.0
"#,
        );
        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.storage.data_dir, "/var/lib/fleetops");
        assert!(cfg.storage.sqlite_path.is_none());
        assert_eq!(cfg.engine.due_soon_threshold, 120.0);
        assert_eq!(cfg.listen.as_deref(), Some("127.0.0.1:9000"));
    }

    #[test]
    fn engine_section_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[storage]\ndata_dir = \"/tmp/f\"\n");
        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.engine.due_soon_threshold, 50.0);
        assert!(cfg.listen.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[storage]\ndata_dir = \"\"\n");
        assert!(ServerConfig::load(&path).is_err());

        let path = write(
            &dir,
            "[storage]\ndata_dir = \"/tmp/f\"\n[engine]\ndue_soon_threshold = -1.0\n",
        );
        assert!(ServerConfig::load(&path).is_err());

        assert!(ServerConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
