use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "MAC_BRIDGE_CONFIG";
const CONFIG_FILE: &str = "config.json";
const APP_DIR: &str = "mac-bridge";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BRAND: &str = "vaillant";
const DEFAULT_COUNTRY: &str = "germany";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<HueSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vaillant: Option<VaillantSettings>,
    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HueSettings {
    pub bridge_ip: Option<String>,
    pub app_key: Option<String>,
    /// The bridge serves a self-signed certificate; set to false once it is trusted.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaillantSettings {
    pub email: Option<String>,
    pub password: Option<String>,
    pub brand: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integration {
    Hue,
    Vaillant,
}

impl Integration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hue => "hue",
            Self::Vaillant => "vaillant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HueCredentials {
    pub bridge_ip: String,
    pub app_key: String,
    pub accept_invalid_certs: bool,
}

impl HueCredentials {
    pub fn base_url(&self) -> String {
        if self.bridge_ip.starts_with("http://") || self.bridge_ip.starts_with("https://") {
            self.bridge_ip.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.bridge_ip)
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct VaillantCredentials {
    pub email: String,
    pub password: String,
    pub brand: String,
    pub country: String,
}

impl std::fmt::Debug for VaillantCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaillantCredentials")
            .field("email", &self.email)
            .field("password", &"***")
            .field("brand", &self.brand)
            .field("country", &self.country)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Hue(HueCredentials),
    Vaillant(VaillantCredentials),
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ConfigDocument {
    pub fn credentials_for(&self, integration: Integration) -> Option<Credentials> {
        match integration {
            Integration::Hue => self.hue_credentials().map(Credentials::Hue),
            Integration::Vaillant => self.vaillant_credentials().map(Credentials::Vaillant),
        }
    }

    pub fn hue_credentials(&self) -> Option<HueCredentials> {
        let hue = self.hue.as_ref()?;
        Some(HueCredentials {
            bridge_ip: present(&hue.bridge_ip)?,
            app_key: present(&hue.app_key)?,
            accept_invalid_certs: hue.accept_invalid_certs,
        })
    }

    pub fn vaillant_credentials(&self) -> Option<VaillantCredentials> {
        let vaillant = self.vaillant.as_ref()?;
        Some(VaillantCredentials {
            email: present(&vaillant.email)?,
            password: vaillant.password.clone().filter(|p| !p.is_empty())?,
            brand: present(&vaillant.brand).unwrap_or_else(|| DEFAULT_BRAND.to_string()),
            country: present(&vaillant.country).unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
        })
    }
}

/// Read-only view over the configuration file. Every call to [`ConfigStore::load`]
/// re-reads the file, so edits take effect on the next tool call.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(CONFIG_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> ConfigDocument {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ConfigDocument::default();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "unreadable config, ignoring");
                return ConfigDocument::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "malformed config, ignoring");
                ConfigDocument::default()
            }
        }
    }

    pub fn credentials_for(&self, integration: Integration) -> Option<Credentials> {
        self.load().credentials_for(integration)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store_with(content: &str) -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, content).unwrap();
        (dir, ConfigStore::new(path))
    }

    #[test]
    fn missing_file_is_empty_document() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("absent.json"));
        let doc = store.load();
        assert!(doc.hue.is_none());
        assert!(doc.vaillant.is_none());
        assert_eq!(doc.http.timeout_secs, 10);
    }

    #[test]
    fn malformed_file_degrades_to_empty() {
        let (_dir, store) = store_with("{ not json");
        assert!(store.credentials_for(Integration::Hue).is_none());
        assert!(store.credentials_for(Integration::Vaillant).is_none());
    }

    #[test]
    fn hue_requires_both_fields() {
        let (_dir, store) = store_with(r#"{"hue": {"bridge_ip": "192.168.1.2", "app_key": ""}}"#);
        assert!(store.credentials_for(Integration::Hue).is_none());

        let (_dir, store) = store_with(r#"{"hue": {"bridge_ip": "192.168.1.2", "app_key": "abc"}}"#);
        match store.credentials_for(Integration::Hue) {
            Some(Credentials::Hue(creds)) => {
                assert_eq!(creds.app_key, "abc");
                assert!(creds.accept_invalid_certs);
                assert_eq!(creds.base_url(), "https://192.168.1.2");
            }
            other => panic!("unexpected credentials: {:?}", other),
        }
    }

    #[test]
    fn hue_base_url_keeps_explicit_scheme() {
        let creds = HueCredentials {
            bridge_ip: "http://127.0.0.1:8080/".to_string(),
            app_key: "k".to_string(),
            accept_invalid_certs: false,
        };
        assert_eq!(creds.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn vaillant_defaults_brand_and_country() {
        let (_dir, store) =
            store_with(r#"{"vaillant": {"email": "me@example.com", "password": "pw"}}"#);
        let creds = store.load().vaillant_credentials().unwrap();
        assert_eq!(creds.brand, "vaillant");
        assert_eq!(creds.country, "germany");
        assert!(!format!("{:?}", creds).contains("pw"));
    }

    #[test]
    fn vaillant_without_password_is_not_configured() {
        let (_dir, store) = store_with(r#"{"vaillant": {"email": "me@example.com"}}"#);
        assert!(store.credentials_for(Integration::Vaillant).is_none());
    }

    #[test]
    fn http_timeout_is_configurable() {
        let (_dir, store) = store_with(r#"{"http": {"timeout_secs": 3}}"#);
        assert_eq!(store.load().http.timeout(), Duration::from_secs(3));
    }
}
