use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the stampa binary.
#[derive(Debug, Parser)]
#[command(name = "stampa", version, about = "Multi-tenant document rendering service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STAMPA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
    /// API key management.
    Keys(KeysArgs),
    /// Tenant administration.
    Tenants(TenantsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the whole-request render deadline.
    #[arg(long = "render-request-timeout-ms", value_name = "MILLIS")]
    pub render_request_timeout_ms: Option<u64>,

    /// Override the per-injector timeout.
    #[arg(long = "render-injector-timeout-ms", value_name = "MILLIS")]
    pub render_injector_timeout_ms: Option<u64>,

    /// Override how many injectors run at once for one request.
    #[arg(long = "render-injector-concurrency", value_name = "COUNT")]
    pub render_injector_concurrency: Option<u32>,

    /// Override the default system workspace code.
    #[arg(long = "resolver-system-workspace", value_name = "CODE")]
    pub resolver_system_workspace: Option<String>,

    /// Override the API rate limit window size.
    #[arg(long = "api-rate-limit-window-seconds", value_name = "SECONDS")]
    pub api_rate_limit_window_seconds: Option<u64>,

    /// Override the API rate limit request ceiling.
    #[arg(long = "api-rate-limit-max-requests", value_name = "COUNT")]
    pub api_rate_limit_max_requests: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Clone)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum KeysCommand {
    /// Issue a new API key and print its token once.
    Issue(IssueKeyArgs),
}

#[derive(Debug, Args, Clone)]
pub struct IssueKeyArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Human-readable key name.
    #[arg(long, value_name = "NAME")]
    pub name: String,

    /// Bind the key to one tenant. Omit for a system key.
    #[arg(long, value_name = "CODE")]
    pub tenant: Option<String>,

    /// Comma-separated scopes (render, template_read, template_write).
    #[arg(long, value_delimiter = ',', default_value = "render", value_name = "SCOPES")]
    pub scopes: Vec<String>,

    /// Days until the key expires.
    #[arg(long = "expires-in-days", value_name = "DAYS")]
    pub expires_in_days: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct TenantsArgs {
    #[command(subcommand)]
    pub command: TenantsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TenantsCommand {
    /// Point a tenant at its own system workspace.
    SetSystemWorkspace(SetSystemWorkspaceArgs),
}

#[derive(Debug, Args, Clone)]
pub struct SetSystemWorkspaceArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Tenant code.
    #[arg(long, value_name = "CODE")]
    pub tenant: String,

    /// Workspace code holding the tenant's house templates. Omit to fall
    /// back to the configured default.
    #[arg(long, value_name = "CODE")]
    pub workspace: Option<String>,
}
