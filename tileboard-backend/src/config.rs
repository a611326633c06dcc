/// Configuration for the tileboard server and clients.
///
/// Layout and limits come from an optional `server.json`
/// (`~/.config/tileboard/server.json` or `$TILEBOARD_CONFIG`). Backend
/// address and keys come from the environment and are never written to disk.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tileboard_core::types::DEFAULT_BOARD_SIZE;
use tileboard_core::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_board_size")]
    pub board_size: u32,
    /// Object storage bucket holding palette images.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Folder inside the bucket that uploads land in.
    #[serde(default = "default_upload_prefix")]
    pub upload_prefix: String,
}

fn default_port() -> u16 {
    8787
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_board_size() -> u32 {
    DEFAULT_BOARD_SIZE
}

fn default_bucket() -> String {
    "palette".to_string()
}

fn default_upload_prefix() -> String {
    "uploaded".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            board_size: default_board_size(),
            bucket: default_bucket(),
            upload_prefix: default_upload_prefix(),
        }
    }
}

impl ServerConfig {
    /// Base URL clients use to reach the write endpoints.
    pub fn endpoint_url(&self) -> String {
        format!("http://{}:{}", self.bind_address, self.port)
    }
}

/// Default config path: `$TILEBOARD_CONFIG` or ~/.config/tileboard/server.json
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("TILEBOARD_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tileboard")
        .join("server.json")
}

/// Load config from path. Returns defaults if the file is missing or broken.
pub fn load_config(path: &Path) -> ServerConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(target: "tileboard.config", "Failed to parse config {}: {}", path.display(), e);
            ServerConfig::default()
        }),
        Err(_) => {
            log::info!(target: "tileboard.config", "No config at {}, using defaults", path.display());
            ServerConfig::default()
        }
    }
}

/// Backend address and keys.
#[derive(Clone, Default)]
pub struct Credentials {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub service_key: Option<String>,
    /// Serve from the in-memory store instead of the hosted backend.
    pub memory_store: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "<set>"))
            .field("service_key", &self.service_key.as_ref().map(|_| "<set>"))
            .field("memory_store", &self.memory_store)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };
        Self {
            url: first(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"])
                .map(|u| u.trim_end_matches('/').to_string()),
            anon_key: first(&["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]),
            service_key: first(&["SUPABASE_SERVICE_ROLE"]),
            memory_store: first(&["TILEBOARD_MEMORY_STORE"])
                .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
        }
    }

    /// Address and privileged key for server-side writes.
    pub fn service(&self) -> Result<(&str, &str), StoreError> {
        match (self.url.as_deref(), self.service_key.as_deref()) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(StoreError::Config(
                "Missing SUPABASE_URL or SUPABASE_SERVICE_ROLE".to_string(),
            )),
        }
    }

    /// Address and public key for client reads, paints and realtime.
    pub fn anon(&self) -> Result<(&str, &str), StoreError> {
        match (self.url.as_deref(), self.anon_key.as_deref()) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(StoreError::Config(
                "Missing SUPABASE_URL or SUPABASE_ANON_KEY".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.json"));
        assert_eq!(config.port, 8787);
        assert_eq!(config.board_size, 9);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        fs::write(&path, r#"{ "board_size": 11, "port": 9000 }"#).unwrap();
        let config = load_config(&path);
        assert_eq!(config.board_size, 11);
        assert_eq!(config.port, 9000);
        assert_eq!(config.bucket, "palette");
        assert_eq!(config.endpoint_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config(&path).port, 8787);
    }

    #[test]
    fn test_credentials_fallback_names() {
        let env: HashMap<&str, &str> = [
            ("NEXT_PUBLIC_SUPABASE_URL", "https://x.supabase.co/"),
            ("NEXT_PUBLIC_SUPABASE_ANON_KEY", "anon"),
        ]
        .into_iter()
        .collect();
        let creds = Credentials::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(creds.anon().unwrap(), ("https://x.supabase.co", "anon"));
        let err = creds.service().unwrap_err();
        assert_eq!(err.to_string(), "Missing SUPABASE_URL or SUPABASE_SERVICE_ROLE");
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let creds = Credentials::from_lookup(|k| match k {
            "SUPABASE_URL" => Some("https://x".into()),
            "SUPABASE_SERVICE_ROLE" => Some("   ".into()),
            _ => None,
        });
        assert!(creds.service().is_err());
        assert!(!creds.memory_store);
    }
}
