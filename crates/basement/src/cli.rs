//! Command-line interface.

use std::path::PathBuf;

use basement_config::Overrides;
use clap::{Args, Parser, Subcommand};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "basement", version, about = "Observable HTTP service bootstrap", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// What to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Server(ServerArgs),
}

/// Flags for `basement server`.
///
/// Every flag is optional; only flags that were given override the loaded
/// configuration.
#[derive(Debug, Clone, Default, Args)]
pub struct ServerArgs {
    /// Listen port
    #[arg(long)]
    pub port: Option<u16>,

    /// Serve plain HTTP
    #[arg(long)]
    pub disable_tls: bool,

    /// TLS certificate chain (PEM)
    #[arg(long, value_name = "FILE")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, value_name = "FILE")]
    pub tls_cert_key: Option<PathBuf>,

    /// Do not publish traces, logs or metrics
    #[arg(long)]
    pub disable_telemetry: bool,

    /// OTLP gRPC collector endpoint
    #[arg(long, value_name = "HOST:PORT")]
    pub telemetry_collector: Option<String>,
}

impl ServerArgs {
    /// The configuration overrides these flags stand for.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            disable_tls: self.disable_tls.then_some(true),
            tls_cert_file: self.tls_cert.clone(),
            tls_cert_key_file: self.tls_cert_key.clone(),
            disable_telemetry: self.disable_telemetry.then_some(true),
            telemetry_collector: self.telemetry_collector.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_args(argv: &[&str]) -> (Option<PathBuf>, ServerArgs) {
        let cli = Cli::try_parse_from(argv).unwrap();
        let Command::Server(args) = cli.command;
        (cli.config, args)
    }

    #[test]
    fn test_no_flags_override_nothing() {
        let (config, args) = server_args(&["basement", "server"]);
        assert!(config.is_none());
        assert_eq!(args.overrides(), Overrides::default());
    }

    #[test]
    fn test_all_flags() {
        let (config, args) = server_args(&[
            "basement",
            "server",
            "--port",
            "9443",
            "--disable-tls",
            "--tls-cert",
            "/etc/tls/tls.crt",
            "--tls-cert-key",
            "/etc/tls/tls.key",
            "--disable-telemetry",
            "--telemetry-collector",
            "otel:4317",
            "--config",
            "basement.toml",
        ]);

        assert_eq!(config, Some(PathBuf::from("basement.toml")));
        assert_eq!(
            args.overrides(),
            Overrides {
                port: Some(9443),
                disable_tls: Some(true),
                tls_cert_file: Some(PathBuf::from("/etc/tls/tls.crt")),
                tls_cert_key_file: Some(PathBuf::from("/etc/tls/tls.key")),
                disable_telemetry: Some(true),
                telemetry_collector: Some("otel:4317".to_string()),
            }
        );
    }

    #[test]
    fn test_global_config_before_subcommand() {
        let (config, _) = server_args(&["basement", "-c", "basement.json", "server"]);
        assert_eq!(config, Some(PathBuf::from("basement.json")));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["basement"]).is_err());
    }

    #[test]
    fn test_invalid_port() {
        assert!(Cli::try_parse_from(["basement", "server", "--port", "70000"]).is_err());
    }
}
