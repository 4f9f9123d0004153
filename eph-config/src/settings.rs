use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use eph_core::{BackendKind, ExpiryPolicy, Result, WorkspaceError, WorkspaceId};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Which long-running parts of the service to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Api,
    Reaper,
    #[default]
    All,
}

impl Mode {
    pub fn runs_api(&self) -> bool {
        matches!(self, Mode::Api | Mode::All)
    }

    pub fn runs_reaper(&self) -> bool {
        matches!(self, Mode::Reaper | Mode::All)
    }
}

impl FromStr for Mode {
    type Err = WorkspaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "api" => Ok(Mode::Api),
            "reaper" | "controlloop" => Ok(Mode::Reaper),
            "all" | "" => Ok(Mode::All),
            other => Err(WorkspaceError::Config(format!("unknown mode '{other}'"))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Api => "api",
            Mode::Reaper => "reaper",
            Mode::All => "all",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Pulumi,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_mode")]
    pub mode: Mode,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Bearer token required on `/v1/api/*` when set.
    #[serde(default = "default_api_token")]
    pub api_token: Option<String>,

    #[serde(default)]
    pub reaper: ReaperSettings,

    #[serde(default)]
    pub expiry: ExpirySettings,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub provisioning: ProvisioningSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaperSettings {
    #[serde(default = "default_reaper_interval")]
    pub interval_secs: u64,

    /// Pause after every destroy before evaluating the next workspace.
    #[serde(default = "default_destroy_cooldown")]
    pub destroy_cooldown_secs: u64,

    /// Pause between destroying a pinned workspace and recreating it.
    #[serde(default = "default_pinned_cooldown")]
    pub pinned_cooldown_secs: u64,

    /// Destroy every listed workspace regardless of expiry.
    #[serde(default = "default_force_delete_all")]
    pub force_delete_all: bool,

    #[serde(default)]
    pub pinned: Vec<PinnedWorkspace>,
}

/// A long-lived workspace the reaper keeps alive by recreating it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PinnedWorkspace {
    pub name: String,
    #[serde(default)]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpirySettings {
    #[serde(default = "default_expiration_days")]
    pub default_days: u32,

    #[serde(default = "default_max_days")]
    pub max_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_engine_kind")]
    pub kind: EngineKind,

    #[serde(default = "default_engine_binary")]
    pub binary: String,

    /// Directory holding one engine program per backend family.
    #[serde(default = "default_programs_dir")]
    pub programs_dir: PathBuf,

    #[serde(default = "default_engine_project")]
    pub project: String,
}

/// Values every provisioned workspace is configured with.
#[derive(Clone, Deserialize)]
pub struct ProvisioningSettings {
    #[serde(default = "default_base_domain")]
    pub base_domain: String,
    #[serde(default = "default_gcp_project")]
    pub gcp_project: String,
    #[serde(default = "default_gcp_zone")]
    pub gcp_zone: String,
    #[serde(default = "default_auth_domain")]
    pub auth_domain: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_client_secret")]
    pub client_secret: String,
    #[serde(default = "default_root_token")]
    pub root_token: String,
    #[serde(default = "default_enterprise_license")]
    pub enterprise_license: String,
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,
    #[serde(default = "default_console_oauth_secret")]
    pub console_oauth_secret: String,
    #[serde(default = "default_pachd_oauth_secret")]
    pub pachd_oauth_secret: String,
}

impl fmt::Debug for ProvisioningSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningSettings")
            .field("base_domain", &self.base_domain)
            .field("gcp_project", &self.gcp_project)
            .field("gcp_zone", &self.gcp_zone)
            .field("auth_domain", &self.auth_domain)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

fn env_string(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn env_parsed<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(fallback)
}

fn default_mode() -> Mode {
    env_parsed("EPH_MODE", Mode::All)
}

fn default_bind_addr() -> String {
    env_string("EPH_BIND", "0.0.0.0:2323")
}

fn default_api_token() -> Option<String> {
    std::env::var("EPH_API_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty())
}

fn default_reaper_interval() -> u64 {
    env_parsed("EPH_REAPER_INTERVAL", 1800) // 30 minutes
}

fn default_destroy_cooldown() -> u64 {
    10
}

fn default_pinned_cooldown() -> u64 {
    300
}

fn default_force_delete_all() -> bool {
    matches!(
        std::env::var("EPH_REAPER_DELETE_ALL").as_deref(),
        Ok("true") | Ok("True") | Ok("1")
    )
}

fn default_expiration_days() -> u32 {
    env_parsed("EPH_DEFAULT_EXPIRATION_DAYS", 1)
}

fn default_max_days() -> u32 {
    90
}

fn default_engine_kind() -> EngineKind {
    match std::env::var("EPH_ENGINE").as_deref() {
        Ok("memory") => EngineKind::Memory,
        _ => EngineKind::Pulumi,
    }
}

fn default_engine_binary() -> String {
    env_string("EPH_PULUMI_BINARY", "pulumi")
}

fn default_programs_dir() -> PathBuf {
    PathBuf::from(env_string("EPH_PROGRAMS_DIR", "programs"))
}

fn default_engine_project() -> String {
    "helium".to_string()
}

fn default_base_domain() -> String {
    env_string("EPH_BASE_DOMAIN", "workspaces.local")
}

fn default_gcp_project() -> String {
    env_string("EPH_GCP_PROJECT", "")
}

fn default_gcp_zone() -> String {
    env_string("EPH_GCP_ZONE", "us-east1-b")
}

fn default_auth_domain() -> String {
    env_string("EPH_AUTH_DOMAIN", "")
}

fn default_client_id() -> String {
    env_string("EPH_CLIENT_ID", "")
}

fn default_client_secret() -> String {
    env_string("EPH_CLIENT_SECRET", "")
}

fn default_root_token() -> String {
    env_string("EPH_ROOT_TOKEN", "")
}

fn default_enterprise_license() -> String {
    env_string("EPH_ENTERPRISE_LICENSE", "")
}

fn default_postgres_password() -> String {
    env_string("EPH_POSTGRES_PASSWORD", "")
}

fn default_console_oauth_secret() -> String {
    env_string("EPH_CONSOLE_OAUTH_SECRET", "")
}

fn default_pachd_oauth_secret() -> String {
    env_string("EPH_PACHD_OAUTH_SECRET", "")
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_reaper_interval(),
            destroy_cooldown_secs: default_destroy_cooldown(),
            pinned_cooldown_secs: default_pinned_cooldown(),
            force_delete_all: default_force_delete_all(),
            pinned: Vec::new(),
        }
    }
}

impl Default for ExpirySettings {
    fn default() -> Self {
        Self {
            default_days: default_expiration_days(),
            max_days: default_max_days(),
        }
    }
}

impl ExpirySettings {
    pub fn policy(&self) -> ExpiryPolicy {
        ExpiryPolicy {
            default_days: self.default_days.max(1),
            max_days: self.max_days,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            kind: default_engine_kind(),
            binary: default_engine_binary(),
            programs_dir: default_programs_dir(),
            project: default_engine_project(),
        }
    }
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            base_domain: default_base_domain(),
            gcp_project: default_gcp_project(),
            gcp_zone: default_gcp_zone(),
            auth_domain: default_auth_domain(),
            client_id: default_client_id(),
            client_secret: default_client_secret(),
            root_token: default_root_token(),
            enterprise_license: default_enterprise_license(),
            postgres_password: default_postgres_password(),
            console_oauth_secret: default_console_oauth_secret(),
            pachd_oauth_secret: default_pachd_oauth_secret(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            bind_addr: default_bind_addr(),
            api_token: default_api_token(),
            reaper: ReaperSettings::default(),
            expiry: ExpirySettings::default(),
            engine: EngineSettings::default(),
            provisioning: ProvisioningSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Load settings from the YAML file named by `EPH_CONFIG`, or from the
    /// environment alone when it is unset.
    pub fn load() -> Result<Self> {
        match std::env::var("EPH_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::from_env()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkspaceError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let settings = Self::from_yaml(&content)?;
        info!(path = %path.display(), "loaded settings file");
        Ok(settings)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::from_env());
        }
        serde_yaml_ng::from_str(content)
            .map_err(|e| WorkspaceError::Config(format!("invalid settings: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.reaper.interval_secs == 0 {
            return Err(WorkspaceError::Config(
                "reaper.interval_secs must be greater than zero".into(),
            ));
        }
        if self.expiry.max_days == 0 {
            return Err(WorkspaceError::Config(
                "expiry.max_days must be greater than zero".into(),
            ));
        }
        if self.expiry.default_days > self.expiry.max_days {
            return Err(WorkspaceError::Config(format!(
                "expiry.default_days ({}) exceeds expiry.max_days ({})",
                self.expiry.default_days, self.expiry.max_days
            )));
        }
        for pinned in &self.reaper.pinned {
            WorkspaceId::parse(&pinned.name)?;
            pinned.backend.parse::<BackendKind>()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_KEYS: &[&str] = &[
        "EPH_MODE",
        "EPH_BIND",
        "EPH_API_TOKEN",
        "EPH_REAPER_INTERVAL",
        "EPH_REAPER_DELETE_ALL",
        "EPH_DEFAULT_EXPIRATION_DAYS",
        "EPH_ENGINE",
        "EPH_PROGRAMS_DIR",
        "EPH_CONFIG",
        "EPH_BASE_DOMAIN",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let settings = Settings::from_env();

        assert_eq!(settings.mode, Mode::All);
        assert_eq!(settings.bind_addr, "0.0.0.0:2323");
        assert!(settings.api_token.is_none());
        assert_eq!(settings.reaper.interval_secs, 1800);
        assert_eq!(settings.reaper.destroy_cooldown_secs, 10);
        assert_eq!(settings.reaper.pinned_cooldown_secs, 300);
        assert!(!settings.reaper.force_delete_all);
        assert_eq!(settings.expiry.default_days, 1);
        assert_eq!(settings.expiry.max_days, 90);
        assert_eq!(settings.engine.kind, EngineKind::Pulumi);
        assert_eq!(settings.engine.project, "helium");
        assert!(settings.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("EPH_MODE", "reaper");
        std::env::set_var("EPH_REAPER_INTERVAL", "60");
        std::env::set_var("EPH_DEFAULT_EXPIRATION_DAYS", "7");
        std::env::set_var("EPH_ENGINE", "memory");
        std::env::set_var("EPH_API_TOKEN", "s3cret");

        let settings = Settings::from_env();
        assert_eq!(settings.mode, Mode::Reaper);
        assert!(!settings.mode.runs_api());
        assert_eq!(settings.reaper.interval_secs, 60);
        assert_eq!(settings.expiry.default_days, 7);
        assert_eq!(settings.engine.kind, EngineKind::Memory);
        assert_eq!(settings.api_token.as_deref(), Some("s3cret"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_force_delete_accepts_variants() {
        for (raw, expected) in [("true", true), ("True", true), ("1", true), ("yes", false)] {
            clear_env();
            std::env::set_var("EPH_REAPER_DELETE_ALL", raw);
            assert_eq!(ReaperSettings::default().force_delete_all, expected, "{raw}");
        }
        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_default_days_becomes_one_day() {
        clear_env();
        std::env::set_var("EPH_DEFAULT_EXPIRATION_DAYS", "0");
        let settings = Settings::from_env();
        assert_eq!(settings.expiry.policy().default_days, 1);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_file_fills_missing_fields_from_env() {
        clear_env();
        std::env::set_var("EPH_BIND", "127.0.0.1:9000");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "mode: api\nreaper:\n  interval_secs: 120\n  pinned:\n    - name: nightly-cluster\n      backend: gcp_cluster_only\n"
        )
        .unwrap();
        std::env::set_var("EPH_CONFIG", file.path());

        let settings = Settings::load().unwrap();
        assert_eq!(settings.mode, Mode::Api);
        assert_eq!(settings.bind_addr, "127.0.0.1:9000");
        assert_eq!(settings.reaper.interval_secs, 120);
        assert_eq!(settings.reaper.destroy_cooldown_secs, 10);
        assert_eq!(
            settings.reaper.pinned,
            vec![PinnedWorkspace {
                name: "nightly-cluster".into(),
                backend: "gcp_cluster_only".into(),
            }]
        );
        assert!(settings.validate().is_ok());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_validate_rejects_bad_values() {
        clear_env();
        let mut settings = Settings::from_env();
        settings.reaper.interval_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::from_env();
        settings.expiry.default_days = 100;
        assert!(settings.validate().is_err());

        let mut settings = Settings::from_env();
        settings.reaper.pinned.push(PinnedWorkspace {
            name: "ok-name".into(),
            backend: "azure".into(),
        });
        assert!(matches!(
            settings.validate(),
            Err(WorkspaceError::BackendUnmatched(_))
        ));
    }

    #[test]
    fn test_secrets_are_not_debug_printed() {
        let provisioning = ProvisioningSettings {
            root_token: "do-not-print".into(),
            ..ProvisioningSettings::default()
        };
        assert!(!format!("{provisioning:?}").contains("do-not-print"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("API".parse::<Mode>().unwrap(), Mode::Api);
        assert_eq!("controlloop".parse::<Mode>().unwrap(), Mode::Reaper);
        assert!("web".parse::<Mode>().is_err());
    }
}
