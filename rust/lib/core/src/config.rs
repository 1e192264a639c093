use std::path::{Path, PathBuf};

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Storage locations and listen address handed to the storage layer and
/// the HTTP server once the binary has read its own config file.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding the service's persistent state.
    pub data_dir: Option<PathBuf>,

    /// Explicit SQLite file. Falls back to `{data_dir}/data.sqlite`.
    pub sqlite_path: Option<PathBuf>,

    pub listen: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sqlite_path: None,
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Config rooted at `data_dir` with the default listen address.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: Some(data_dir.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Override the listen address when one is given.
    pub fn listen_on(mut self, listen: Option<String>) -> Self {
        if let Some(addr) = listen {
            self.listen = addr;
        }
        self
    }

    pub fn resolve_sqlite_path(&self) -> PathBuf {
        match (&self.sqlite_path, &self.data_dir) {
            (Some(p), _) => p.clone(),
            (None, Some(dir)) => dir.join("data.sqlite"),
            (None, None) => PathBuf::from("data.sqlite"),
        }
    }
}
