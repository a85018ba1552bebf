mod config;

use clap::{Parser, Subcommand};
use config::{Config, LoggingConfig, MetricsConfig};
use machine::resources::{methods_for, resources};
use machine::{
    ClientError, CredentialError, Credentials, EventManagerError, HttpConnector,
    MachineConfigurator,
};
use metrics_exporter_statsd::StatsdBuilder;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use url::Url;

/// Reads and writes event manager components in a machine's configuration.
#[derive(Parser, Debug)]
#[command(name = "eventing")]
struct Cli {
    /// YAML config file
    #[arg(long, env = "EVENTING_CONFIG")]
    config: Option<PathBuf>,

    /// URL of the page the credential cookie was issued for
    #[arg(long, env = "EVENTING_PAGE_URL")]
    page_url: Option<Url>,

    /// Cookie header holding the machine credentials
    #[arg(long, env = "EVENTING_COOKIE", hide_env_values = true)]
    cookie: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug, PartialEq)]
enum CliCommand {
    /// Print the main part's configuration
    ShowConfig,
    /// List configured event managers
    List,
    /// Create, update or rename an event manager
    Save {
        #[arg(long)]
        name: String,
        /// JSON object, or @path to a file holding one
        #[arg(long)]
        attributes: String,
        /// Name of the event manager being edited, when renaming
        #[arg(long)]
        original_name: Option<String>,
    },
    /// List configured resources and the methods rules can call on them
    Resources,
    /// Print the methods of a resource API
    Methods { api: String },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("--page-url and --cookie are required for this command")]
    MissingPageContext,
    #[error("{0}")]
    Credentials(#[from] CredentialError),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error("{0}")]
    EventManager(#[from] EventManagerError),
    #[error("invalid attributes: {0}")]
    InvalidAttributes(String),
    #[error("unknown resource API: {0}")]
    UnknownApi(String),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not serialize output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.config.as_deref().map(Config::from_file).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = init_logging(&config.logging);

    if let Some(metrics_config) = &config.metrics
        && let Err(e) = init_metrics(metrics_config)
    {
        tracing::warn!(error = %e, "Continuing without metrics");
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Could not start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "eventing failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_deref().unwrap_or("info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(config.prefix.as_str()))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    shared::metrics_defs::describe_all(machine::metrics_defs::ALL_METRICS);
    Ok(())
}

async fn run(cli: Cli, config: Config) -> Result<(), CliError> {
    // The method table is static, no credentials needed.
    if let CliCommand::Methods { api } = &cli.command {
        return print_methods(api);
    }

    let (Some(page_url), Some(cookie)) = (cli.page_url, cli.cookie) else {
        return Err(CliError::MissingPageContext);
    };

    let credentials = Credentials::resolve(&page_url, &cookie)?;
    tracing::info!(
        machine_id = %credentials.machine_id,
        hostname = %credentials.hostname,
        "Resolved machine credentials"
    );

    let connector = HttpConnector::new(Duration::from_secs(
        config.endpoints.request_timeout_secs,
    ));
    let client = machine::connect(&connector, &credentials, &config.endpoints).await?;
    let configurator = MachineConfigurator::new(Some(client), credentials.machine_id.clone());

    match cli.command {
        CliCommand::ShowConfig => match configurator.get_machine_config().await? {
            Some(machine_part) => {
                if machine_part.config.is_degraded() {
                    tracing::warn!("Stored config could not be parsed, showing an empty config");
                }
                print_json(&json!({
                    "part": {"id": machine_part.part.id, "name": machine_part.part.name},
                    "config": machine_part.config.config(),
                }))
            }
            None => {
                tracing::warn!(machine_id = %configurator.machine_id(), "Machine has no main part");
                print_json(&JsonValue::Null)
            }
        },
        CliCommand::List => print_json(&configurator.list_event_managers().await?),
        CliCommand::Save {
            name,
            attributes,
            original_name,
        } => {
            let attributes = parse_attributes(&attributes)?;
            let saved = configurator
                .save_event_manager(&name, attributes, original_name.as_deref())
                .await?;
            print_json(&json!({"saved": saved, "name": name}))
        }
        CliCommand::Resources => {
            let config = configurator
                .get_machine_config()
                .await?
                .map(|machine_part| machine_part.config.config())
                .unwrap_or_default();
            print_json(&resources(&config))
        }
        CliCommand::Methods { api } => print_methods(&api),
    }
}

fn print_methods(api: &str) -> Result<(), CliError> {
    let methods = methods_for(api).ok_or_else(|| CliError::UnknownApi(api.to_string()))?;
    print_json(&methods)
}

/// Parses `--attributes`, which is inline JSON or `@path` to a JSON file.
fn parse_attributes(raw: &str) -> Result<Map<String, JsonValue>, CliError> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => raw.to_string(),
    };

    match serde_json::from_str::<JsonValue>(&text) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(other) => Err(CliError::InvalidAttributes(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(CliError::InvalidAttributes(e.to_string())),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_save_command() {
        let cli = Cli::try_parse_from([
            "eventing",
            "--page-url",
            "https://app.example.com/machine/m1",
            "--cookie",
            "m1={}",
            "save",
            "--name",
            "ev2",
            "--attributes",
            r#"{"mode": "active"}"#,
            "--original-name",
            "ev1",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            CliCommand::Save {
                name: "ev2".into(),
                attributes: r#"{"mode": "active"}"#.into(),
                original_name: Some("ev1".into()),
            }
        );
        assert_eq!(cli.page_url.unwrap().path(), "/machine/m1");
    }

    #[test]
    fn parse_rejects_invalid_page_url() {
        assert!(Cli::try_parse_from(["eventing", "--page-url", "not a url", "list"]).is_err());
    }

    #[test]
    fn attributes_inline_and_file() {
        let inline = parse_attributes(r#"{"x": 1}"#).unwrap();
        assert_eq!(inline["x"], json!(1));

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, r#"{{"rules": [], "mode": "inactive"}}"#).unwrap();
        let from_file = parse_attributes(&format!("@{}", tmp.path().display())).unwrap();
        assert_eq!(from_file["mode"], json!("inactive"));
    }

    #[test]
    fn attributes_must_be_object() {
        assert!(matches!(
            parse_attributes("[1, 2]"),
            Err(CliError::InvalidAttributes(_))
        ));
        assert!(matches!(
            parse_attributes("{oops"),
            Err(CliError::InvalidAttributes(_))
        ));
        assert!(matches!(
            parse_attributes("@/nonexistent/attributes.json"),
            Err(CliError::Io(_))
        ));
    }

    #[tokio::test]
    async fn methods_needs_no_credentials() {
        let cli = Cli::try_parse_from(["eventing", "methods", "rdk:component:sensor"]).unwrap();
        assert!(run(cli, Config::default()).await.is_ok());

        let cli = Cli::try_parse_from(["eventing", "methods", "acme:component:x"]).unwrap();
        assert!(matches!(
            run(cli, Config::default()).await,
            Err(CliError::UnknownApi(_))
        ));
    }

    #[tokio::test]
    async fn missing_page_context() {
        let cli = Cli {
            config: None,
            page_url: None,
            cookie: None,
            command: CliCommand::List,
        };
        assert!(matches!(
            run(cli, Config::default()).await,
            Err(CliError::MissingPageContext)
        ));
    }

    #[tokio::test]
    async fn missing_cookie_fails_before_connecting() {
        let cli = Cli {
            config: None,
            page_url: Some(Url::parse("https://app.example.com/machine/m1").unwrap()),
            cookie: Some("other=1".into()),
            command: CliCommand::List,
        };
        assert!(matches!(
            run(cli, Config::default()).await,
            Err(CliError::Credentials(CredentialError::CookieMissing(_)))
        ));
    }
}
