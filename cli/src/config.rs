use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const DEFAULT_USER: &str = "default";

const DB_ENV: &str = "TALLY_DB";
const USER_ENV: &str = "TALLY_USER";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    /// User the CLI commands act on.
    pub user_id: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "tally").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Self::from_parts(
            data_dir,
            std::env::var_os(DB_ENV).map(PathBuf::from),
            std::env::var(USER_ENV).ok(),
        ))
    }

    fn from_parts(data_dir: PathBuf, db_override: Option<PathBuf>, user: Option<String>) -> Self {
        let db_path = db_override
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| data_dir.join("tally.db"));
        let user_id = user
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_USER.to_string());
        Config {
            db_path,
            data_dir,
            user_id,
        }
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true on first run.
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        tracing::info!(path = %path.display(), "generated new API key");
        Ok((key, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_live_in_data_dir() {
        let config = Config::from_parts(PathBuf::from("/data/tally"), None, None);
        assert_eq!(config.db_path, PathBuf::from("/data/tally/tally.db"));
        assert_eq!(config.user_id, DEFAULT_USER);
    }

    #[test]
    fn test_overrides_apply() {
        let config = Config::from_parts(
            PathBuf::from("/data/tally"),
            Some(PathBuf::from("/tmp/other.db")),
            Some(" alice ".to_string()),
        );
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.user_id, "alice");
    }

    #[test]
    fn test_blank_user_falls_back() {
        let config = Config::from_parts(PathBuf::from("/d"), None, Some("   ".to_string()));
        assert_eq!(config.user_id, DEFAULT_USER);
    }

    #[test]
    fn test_api_key_is_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_parts(dir.path().to_path_buf(), None, None);
        let (key, created) = config.load_or_create_api_key().unwrap();
        assert!(created);
        assert_eq!(key.len(), 64);
        let (again, created) = config.load_or_create_api_key().unwrap();
        assert!(!created);
        assert_eq!(again, key);
    }
}
