use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AmityError, Result};

/// Minimum length for a production JWT secret
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Centralized configuration for the amity server and CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmityConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub auth: AuthSection,
    pub uploads: UploadsSection,
    pub geo: GeoSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind, e.g. "127.0.0.1:3030"
    pub bind: String,
    /// Allow any origin (development only)
    pub cors_permissive: bool,
    /// Origins allowed when not permissive
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3030".to_string(),
            cors_permissive: false,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub jwt_secret: Option<String>,
    /// Lifetime of an access token
    pub token_ttl_secs: u64,
    /// Lifetime of a login session
    pub session_ttl_secs: u64,
    /// Accept a built-in secret when none is configured
    pub dev_mode: bool,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: 24 * 60 * 60,
            session_ttl_secs: 30 * 24 * 60 * 60,
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsSection {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

impl Default for UploadsSection {
    fn default() -> Self {
        Self {
            dir: AmityConfig::config_dir().join("uploads"),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoSection {
    /// Base URL; the ZIP code is appended as a path segment
    pub zip_lookup_url: String,
    pub timeout_secs: u64,
}

impl Default for GeoSection {
    fn default() -> Self {
        Self {
            zip_lookup_url: "https://api.zippopotam.us/us".to_string(),
            timeout_secs: 5,
        }
    }
}

impl AmityConfig {
    /// Config directory: ~/.amity
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".amity")
    }

    /// Config file path: ~/.amity/config.toml
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default path, falling back to defaults when
    /// the file does not exist. Environment overrides are always applied.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            Self::read_file(&path)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        config.finish(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load config from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AmityError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut config = Self::read_file(path)?;
        config.finish(|key| env::var(key).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AmityError::config_parse(path, e))
    }

    /// Expand `${VAR}` references, then apply environment overrides.
    pub fn finish<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.expand_variables(&lookup);
        self.apply_env_overrides(&lookup);
    }

    fn apply_env_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database.url = Some(url);
        }
        if let Some(secret) = lookup("AMITY_JWT_SECRET").filter(|v| !v.is_empty()) {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(bind) = lookup("AMITY_BIND").filter(|v| !v.is_empty()) {
            self.server.bind = bind;
        }
        if let Some(dir) = lookup("AMITY_UPLOAD_DIR").filter(|v| !v.is_empty()) {
            self.uploads.dir = PathBuf::from(dir);
        }
    }

    fn expand_variables<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.server.bind = expand_string(&self.server.bind, lookup);
        if let Some(ref url) = self.database.url {
            self.database.url = Some(expand_string(url, lookup));
        }
        if let Some(ref secret) = self.auth.jwt_secret {
            self.auth.jwt_secret = Some(expand_string(secret, lookup));
        }
        let dir = self.uploads.dir.display().to_string();
        self.uploads.dir = PathBuf::from(expand_string(&dir, lookup));
        self.geo.zip_lookup_url = expand_string(&self.geo.zip_lookup_url, lookup);
    }

    /// Check the config for problems. Returns one message per problem.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            problems.push(format!("server.bind '{}' is not a socket address", self.server.bind));
        }

        match self.database.url.as_deref() {
            None | Some("") => problems.push("database.url is not set (or DATABASE_URL)".to_string()),
            Some(url) if !url.starts_with("postgres") => {
                problems.push(format!("database.url '{}' is not a postgres URL", url))
            }
            _ => {}
        }

        if self.database.max_connections == 0 {
            problems.push("database.max_connections must be at least 1".to_string());
        }

        match self.auth.jwt_secret.as_deref() {
            Some(secret) if secret.len() >= MIN_JWT_SECRET_LEN => {}
            Some(_) => problems.push(format!(
                "auth.jwt_secret must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )),
            None if self.auth.dev_mode => {}
            None => problems.push("auth.jwt_secret is not set (or AMITY_JWT_SECRET)".to_string()),
        }

        if self.auth.token_ttl_secs == 0 || self.auth.session_ttl_secs == 0 {
            problems.push("auth TTLs must be positive".to_string());
        }

        if self.uploads.max_bytes == 0 {
            problems.push("uploads.max_bytes must be positive".to_string());
        }

        problems
    }

    /// Render as TOML (used by `config init` and `config show`)
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Expand `${VAR}` references in a string. Unknown variables become empty.
fn expand_string<F>(s: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                result.push_str(&lookup(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: AmityConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3030");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.auth.token_ttl_secs, 86400);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config: AmityConfig = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0:8080"

            [auth]
            dev_mode = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(!config.server.cors_permissive);
        assert!(config.auth.dev_mode);
        assert_eq!(config.auth.session_ttl_secs, 30 * 24 * 60 * 60);
    }

    #[test]
    fn expands_variables() {
        let lookup = env_of(&[("PGHOST", "db.internal"), ("SECRET", "s3cr3t")]);
        assert_eq!(
            expand_string("postgres://${PGHOST}/amity", &lookup),
            "postgres://db.internal/amity"
        );
        assert_eq!(expand_string("${SECRET}-${MISSING}", &lookup), "s3cr3t-");
        assert_eq!(expand_string("no vars", &lookup), "no vars");
        assert_eq!(expand_string("dangling ${oops", &lookup), "dangling ${oops");
    }

    #[test]
    fn env_overrides_win() {
        let mut config = AmityConfig::default();
        config.database.url = Some("postgres://file/amity".into());

        config.finish(env_of(&[
            ("DATABASE_URL", "postgres://env/amity"),
            ("AMITY_BIND", "0.0.0.0:9000"),
        ]));

        assert_eq!(config.database.url.as_deref(), Some("postgres://env/amity"));
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn empty_env_values_ignored() {
        let mut config = AmityConfig::default();
        config.database.url = Some("postgres://file/amity".into());
        config.finish(env_of(&[("DATABASE_URL", "")]));
        assert_eq!(config.database.url.as_deref(), Some("postgres://file/amity"));
    }

    #[test]
    fn validate_reports_problems() {
        let config = AmityConfig::default();
        let problems = config.validate();
        assert!(problems.iter().any(|p| p.contains("database.url")));
        assert!(problems.iter().any(|p| p.contains("jwt_secret")));

        let mut config = AmityConfig::default();
        config.database.url = Some("postgres://localhost/amity".into());
        config.auth.jwt_secret = Some("x".repeat(MIN_JWT_SECRET_LEN));
        assert!(config.validate().is_empty());

        config.auth.jwt_secret = Some("short".into());
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn dev_mode_allows_missing_secret() {
        let mut config = AmityConfig::default();
        config.database.url = Some("postgres://localhost/amity".into());
        config.auth.dev_mode = true;
        assert!(config.validate().is_empty());
    }

    #[test]
    fn load_from_missing_path_errors() {
        let err = AmityConfig::load_from(Path::new("/nonexistent/amity.toml")).unwrap_err();
        assert!(matches!(err, AmityError::ConfigNotFound { .. }));
    }

    #[test]
    fn load_from_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\nbind = ").unwrap();

        let err = AmityConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, AmityError::ConfigParse { .. }));
    }

    #[test]
    fn toml_roundtrip_preserves_values() {
        let mut config = AmityConfig::default();
        config.geo.timeout_secs = 9;
        let text = config.to_toml_string().unwrap();
        let parsed: AmityConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
