//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CliArgs, Command, DatabaseOverride, IssueKeyArgs, KeysArgs, KeysCommand, MigrateArgs,
    ServeArgs, ServeOverrides, SetSystemWorkspaceArgs, TenantsArgs, TenantsCommand,
};

use std::{net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::injection::InjectionKey;
use crate::domain::templates::validate_code;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "stampa";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_AUTH_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_INJECTOR_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_INJECTOR_CONCURRENCY: u32 = 8;
const DEFAULT_SYSTEM_WORKSPACE: &str = "system";
const DEFAULT_CATALOG_REFRESH_SECS: u64 = 60;
const DEFAULT_API_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_API_RATE_LIMIT_MAX_REQUESTS: u64 = 600;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub render: RenderSettings,
    pub resolver: ResolverSettings,
    pub api_rate_limit: ApiRateLimitSettings,
    pub plugins: PluginSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub auth_timeout: Duration,
    pub injector_timeout: Duration,
    pub request_timeout: Duration,
    pub injector_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Used for tenants without their own system workspace.
    pub default_system_workspace: String,
    /// `None` disables periodic catalog refresh.
    pub refresh_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ApiRateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub max_requests: NonZeroU32,
}

/// Declarative mappers and injectors installed at startup.
#[derive(Debug, Clone, Default)]
pub struct PluginSettings {
    pub builtin_injectors: bool,
    pub json_mappers: Vec<JsonMapperSettings>,
    pub payload_injectors: Vec<PayloadInjectorSettings>,
    pub shared_injectors: Vec<SharedInjectorSettings>,
    /// Seed for the engine's shared data.
    pub shared: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct JsonMapperSettings {
    pub document_type: String,
    pub required: Vec<String>,
    pub extract: Vec<ExtractRule>,
}

/// Copies the value at `pointer` into the injectables under `key`.
#[derive(Debug, Clone)]
pub struct ExtractRule {
    pub key: InjectionKey,
    pub pointer: String,
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct PayloadInjectorSettings {
    pub key: InjectionKey,
    pub pointer: String,
    pub default: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct SharedInjectorSettings {
    pub key: InjectionKey,
    pub shared_key: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("STAMPA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        Some(Command::Keys(args)) => match &args.command {
            KeysCommand::Issue(issue) => raw.apply_database_override(&issue.database),
        },
        Some(Command::Tenants(args)) => match &args.command {
            TenantsCommand::SetSystemWorkspace(set) => raw.apply_database_override(&set.database),
        },
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    render: RawRenderSettings,
    resolver: RawResolverSettings,
    api_rate_limit: RawApiRateLimitSettings,
    plugins: RawPluginSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(ms) = overrides.render_request_timeout_ms {
            self.render.request_timeout_ms = Some(ms);
        }
        if let Some(ms) = overrides.render_injector_timeout_ms {
            self.render.injector_timeout_ms = Some(ms);
        }
        if let Some(count) = overrides.render_injector_concurrency {
            self.render.injector_concurrency = Some(count);
        }
        if let Some(code) = overrides.resolver_system_workspace.as_ref() {
            self.resolver.default_system_workspace = Some(code.clone());
        }
        if let Some(window) = overrides.api_rate_limit_window_seconds {
            self.api_rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.api_rate_limit_max_requests {
            self.api_rate_limit.max_requests = Some(max);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            render,
            resolver,
            api_rate_limit,
            plugins,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            render: build_render_settings(render)?,
            resolver: build_resolver_settings(resolver)?,
            api_rate_limit: build_api_rate_limit_settings(api_rate_limit)?,
            plugins: build_plugin_settings(plugins)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let auth_timeout = positive_millis(
        render.auth_timeout_ms.unwrap_or(DEFAULT_AUTH_TIMEOUT_MS),
        "render.auth_timeout_ms",
    )?;
    let injector_timeout = positive_millis(
        render
            .injector_timeout_ms
            .unwrap_or(DEFAULT_INJECTOR_TIMEOUT_MS),
        "render.injector_timeout_ms",
    )?;
    let request_timeout = positive_millis(
        render
            .request_timeout_ms
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        "render.request_timeout_ms",
    )?;
    if injector_timeout > request_timeout {
        return Err(LoadError::invalid(
            "render.injector_timeout_ms",
            "must not exceed render.request_timeout_ms",
        ));
    }

    let injector_concurrency = non_zero_u32(
        render
            .injector_concurrency
            .unwrap_or(DEFAULT_INJECTOR_CONCURRENCY)
            .into(),
        "render.injector_concurrency",
    )?;

    Ok(RenderSettings {
        auth_timeout,
        injector_timeout,
        request_timeout,
        injector_concurrency: injector_concurrency.get() as usize,
    })
}

fn build_resolver_settings(resolver: RawResolverSettings) -> Result<ResolverSettings, LoadError> {
    let default_system_workspace = resolver
        .default_system_workspace
        .unwrap_or_else(|| DEFAULT_SYSTEM_WORKSPACE.to_string());
    validate_code("system workspace", &default_system_workspace).map_err(|err| {
        LoadError::invalid("resolver.default_system_workspace", err.to_string())
    })?;

    let refresh_secs = resolver
        .refresh_interval_seconds
        .unwrap_or(DEFAULT_CATALOG_REFRESH_SECS);
    let refresh_interval = (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs));

    Ok(ResolverSettings {
        default_system_workspace,
        refresh_interval,
    })
}

fn build_api_rate_limit_settings(
    rate_limit: RawApiRateLimitSettings,
) -> Result<ApiRateLimitSettings, LoadError> {
    let window_seconds_val = rate_limit
        .window_seconds
        .unwrap_or(DEFAULT_API_RATE_LIMIT_WINDOW_SECS);
    let window_seconds = non_zero_u32(window_seconds_val, "api_rate_limit.window_seconds")?;

    let max_requests_val = rate_limit
        .max_requests
        .unwrap_or(DEFAULT_API_RATE_LIMIT_MAX_REQUESTS);
    let max_requests = non_zero_u32(max_requests_val, "api_rate_limit.max_requests")?;

    Ok(ApiRateLimitSettings {
        window_seconds,
        max_requests,
    })
}

fn build_plugin_settings(plugins: RawPluginSettings) -> Result<PluginSettings, LoadError> {
    let json_mappers = plugins
        .json_mappers
        .into_iter()
        .map(|mapper| {
            validate_code("document type", &mapper.document_type).map_err(|err| {
                LoadError::invalid("plugins.json_mappers.document_type", err.to_string())
            })?;
            for pointer in &mapper.required {
                check_pointer(pointer, "plugins.json_mappers.required")?;
            }
            let extract = mapper
                .extract
                .into_iter()
                .map(|rule| {
                    check_pointer(&rule.pointer, "plugins.json_mappers.extract.pointer")?;
                    Ok(ExtractRule {
                        key: parse_key(&rule.key, "plugins.json_mappers.extract.key")?,
                        pointer: rule.pointer,
                        optional: rule.optional,
                    })
                })
                .collect::<Result<Vec<_>, LoadError>>()?;
            Ok(JsonMapperSettings {
                document_type: mapper.document_type,
                required: mapper.required,
                extract,
            })
        })
        .collect::<Result<Vec<_>, LoadError>>()?;

    let payload_injectors = plugins
        .payload_injectors
        .into_iter()
        .map(|injector| {
            check_pointer(&injector.pointer, "plugins.payload_injectors.pointer")?;
            Ok(PayloadInjectorSettings {
                key: parse_key(&injector.key, "plugins.payload_injectors.key")?,
                pointer: injector.pointer,
                default: injector.default,
            })
        })
        .collect::<Result<Vec<_>, LoadError>>()?;

    let shared_injectors = plugins
        .shared_injectors
        .into_iter()
        .map(|injector| {
            if injector.shared_key.trim().is_empty() {
                return Err(LoadError::invalid(
                    "plugins.shared_injectors.shared_key",
                    "must not be empty",
                ));
            }
            Ok(SharedInjectorSettings {
                key: parse_key(&injector.key, "plugins.shared_injectors.key")?,
                shared_key: injector.shared_key,
            })
        })
        .collect::<Result<Vec<_>, LoadError>>()?;

    Ok(PluginSettings {
        builtin_injectors: plugins.builtin_injectors.unwrap_or(true),
        json_mappers,
        payload_injectors,
        shared_injectors,
        shared: plugins.shared,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    auth_timeout_ms: Option<u64>,
    injector_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    injector_concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawResolverSettings {
    default_system_workspace: Option<String>,
    refresh_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPluginSettings {
    builtin_injectors: Option<bool>,
    json_mappers: Vec<RawJsonMapper>,
    payload_injectors: Vec<RawPayloadInjector>,
    shared_injectors: Vec<RawSharedInjector>,
    shared: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawJsonMapper {
    document_type: String,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    extract: Vec<RawExtractRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawExtractRule {
    key: String,
    pointer: String,
    #[serde(default)]
    optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPayloadInjector {
    key: String,
    pointer: String,
    #[serde(default)]
    default: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSharedInjector {
    key: String,
    shared_key: String,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

/// JSON pointers are either empty (whole document) or start with `/`.
fn check_pointer(pointer: &str, key: &'static str) -> Result<(), LoadError> {
    if pointer.is_empty() || pointer.starts_with('/') {
        Ok(())
    } else {
        Err(LoadError::invalid(
            key,
            format!("`{pointer}` is not a JSON pointer"),
        ))
    }
}

fn parse_key(raw: &str, key: &'static str) -> Result<InjectionKey, LoadError> {
    raw.parse::<InjectionKey>()
        .map_err(|err| LoadError::invalid(key, err.to_string()))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
