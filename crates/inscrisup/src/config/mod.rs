use crate::admissions::catalog::{ClassCatalog, ClassCode, ClassConfig};
use crate::admissions::reconcile::BoardingPacketGuard;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub admissions: AdmissionsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            admissions: AdmissionsConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Credentials the admissions platform must present on every push call.
#[derive(Clone, PartialEq, Eq)]
pub struct PushCredentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for PushCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushCredentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// Everything the reconciliation side of the service needs to run.
#[derive(Debug, Clone)]
pub struct AdmissionsConfig {
    pub classes: ClassCatalog,
    pub store_path: PathBuf,
    pub source_dir: PathBuf,
    pub push_credentials: Option<PushCredentials>,
    pub boarding_guard: BoardingPacketGuard,
}

impl AdmissionsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let classes = match env::var("INSCRISUP_CLASSES") {
            Ok(raw) => parse_class_list(&raw)?,
            Err(_) => ClassCatalog::default(),
        };

        let store_path = env::var("INSCRISUP_STORE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("inscrisup-store.json"));
        let source_dir = env::var("INSCRISUP_SOURCE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("parcoursup-export"));

        let push_credentials = match (
            env::var("INSCRISUP_PUSH_LOGIN"),
            env::var("INSCRISUP_PUSH_PASSWORD"),
        ) {
            (Ok(login), Ok(password)) if !login.is_empty() => {
                Some(PushCredentials { login, password })
            }
            _ => None,
        };

        let boarding_guard = match env::var("INSCRISUP_BOARDING_GUARD") {
            Ok(raw) => BoardingPacketGuard::parse(&raw)
                .ok_or(ConfigError::InvalidBoardingGuard { value: raw })?,
            Err(_) => BoardingPacketGuard::default(),
        };

        Ok(Self {
            classes,
            store_path,
            source_dir,
            push_credentials,
            boarding_guard,
        })
    }
}

/// Parses `code=name[:capacity[:overbooking]]` entries separated by `;`.
pub fn parse_class_list(raw: &str) -> Result<ClassCatalog, ConfigError> {
    let mut classes = Vec::new();

    for entry in raw.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
        let invalid = || ConfigError::InvalidClass {
            entry: entry.to_string(),
        };

        let (code, rest) = entry.split_once('=').ok_or_else(invalid)?;
        let mut parts = rest.split(':').map(str::trim);
        let name = parts.next().filter(|name| !name.is_empty()).ok_or_else(invalid)?;
        let capacity = match parts.next() {
            Some(value) => value.parse::<u16>().map_err(|_| invalid())?,
            None => 0,
        };
        let overbooking = match parts.next() {
            Some(value) => value.parse::<u16>().map_err(|_| invalid())?,
            None => 0,
        };
        if parts.next().is_some() || code.trim().is_empty() {
            return Err(invalid());
        }

        classes.push(ClassConfig {
            code: ClassCode::new(code.trim()),
            name: name.to_string(),
            capacity,
            overbooking,
        });
    }

    Ok(ClassCatalog::new(classes))
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidClass { entry: String },
    InvalidBoardingGuard { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidClass { entry } => write!(
                f,
                "INSCRISUP_CLASSES entry '{}' must look like code=name[:capacity[:overbooking]]",
                entry
            ),
            ConfigError::InvalidBoardingGuard { value } => write!(
                f,
                "INSCRISUP_BOARDING_GUARD '{}' must be 'pending-send-packet' or 'always'",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidClass { .. }
            | ConfigError::InvalidBoardingGuard { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "INSCRISUP_CLASSES",
            "INSCRISUP_STORE",
            "INSCRISUP_SOURCE_DIR",
            "INSCRISUP_PUSH_LOGIN",
            "INSCRISUP_PUSH_PASSWORD",
            "INSCRISUP_BOARDING_GUARD",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.admissions.push_credentials.is_none());
        assert_eq!(
            config.admissions.boarding_guard,
            BoardingPacketGuard::PendingSendPacket
        );
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn reads_class_catalog_and_credentials() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("INSCRISUP_CLASSES", "MPSI=MPSI 1:48:4; PCSI=PCSI");
        env::set_var("INSCRISUP_PUSH_LOGIN", "lycee");
        env::set_var("INSCRISUP_PUSH_PASSWORD", "secret");
        env::set_var("INSCRISUP_BOARDING_GUARD", "always");

        let config = AppConfig::load().expect("config loads");
        let mpsi = config
            .admissions
            .classes
            .get(&ClassCode::new("MPSI"))
            .expect("MPSI configured");
        assert_eq!(mpsi.name, "MPSI 1");
        assert_eq!(mpsi.capacity, 48);
        assert_eq!(mpsi.overbooking, 4);
        assert_eq!(config.admissions.classes.len(), 2);
        assert_eq!(
            config.admissions.push_credentials,
            Some(PushCredentials {
                login: "lycee".to_string(),
                password: "secret".to_string(),
            })
        );
        assert_eq!(config.admissions.boarding_guard, BoardingPacketGuard::Always);
        reset_env();
    }

    #[test]
    fn rejects_malformed_class_entry() {
        match parse_class_list("MPSI") {
            Err(ConfigError::InvalidClass { entry }) => assert_eq!(entry, "MPSI"),
            other => panic!("expected invalid class, got {other:?}"),
        }
        assert!(parse_class_list("MPSI=MPSI:lots").is_err());
    }
}
