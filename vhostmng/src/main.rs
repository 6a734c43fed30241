//! vhostmng - Virtual host and certificate manager
//!
//! This is the main entry point for the vhostmng CLI.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vhostmng_core::{Dialect, Host, Settings, SettingsLoader, TlsStrategy};
use vhostmng_deploy::{CertificatePaths, Manager};

/// vhostmng - Find, edit and secure web server virtual hosts
#[derive(Parser)]
#[command(name = "vhostmng")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (TOML or JSON)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Server root directory
    #[arg(long, global = true)]
    server_root: Option<PathBuf>,

    /// Configuration keyword set
    #[arg(long, global = true, value_enum)]
    dialect: Option<DialectArg>,

    /// Server binary used for version, test and reload
    #[arg(long, global = true)]
    control_bin: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Nginx,
    Httpd,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Clone,
    InPlace,
}

#[derive(Subcommand)]
enum Commands {
    /// List virtual hosts
    Hosts {
        /// Only hosts answering to this name
        #[arg(long)]
        server_name: Option<String>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Deploy a certificate to every host answering to a name
    #[command(name = "deploy-certificate")]
    DeployCertificate {
        /// Host name
        #[arg(long)]
        server_name: String,

        /// Private key
        #[arg(long)]
        key: String,

        /// Certificate followed by its chain
        #[arg(long)]
        fullchain: Option<String>,

        /// Leaf certificate only
        #[arg(long)]
        cert: Option<String>,

        /// Intermediate chain only
        #[arg(long)]
        chain: Option<String>,

        /// How plaintext hosts get TLS
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
    },

    /// Make the server listen on a port
    #[command(name = "ensure-port")]
    EnsurePort {
        port: String,

        /// Listen for TLS
        #[arg(long)]
        https: bool,
    },

    /// Test the server configuration
    Check,

    /// Reload the server
    Restart,

    /// Check that a configuration file parses
    Lint {
        file: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays clean
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let mut settings = load_settings(&cli)?;

    match cli.command {
        Commands::Hosts { server_name, json } => {
            let manager = Manager::open(settings)?;
            let hosts = match &server_name {
                Some(name) => manager.hosts_by_server_name(name),
                None => manager.hosts(),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&hosts)?);
            } else if hosts.is_empty() {
                println!("No virtual hosts found");
            } else {
                for host in &hosts {
                    print_host(host);
                }
            }
        }

        Commands::DeployCertificate {
            server_name,
            key,
            fullchain,
            cert,
            chain,
            strategy,
        } => {
            if let Some(strategy) = strategy {
                settings.tls_strategy = Some(match strategy {
                    StrategyArg::Clone => TlsStrategy::Clone,
                    StrategyArg::InPlace => TlsStrategy::InPlace,
                });
            }
            let paths = CertificatePaths {
                certificate: cert,
                key: Some(key),
                chain,
                fullchain,
            };

            let mut manager = Manager::open(settings)?;
            let hosts = manager
                .deploy(&server_name, &paths)
                .with_context(|| format!("Failed to deploy certificate for {}", server_name))?;
            for host in &hosts {
                print_host(host);
            }
            println!("✅ Certificate deployed to {} host(s)", hosts.len());
        }

        Commands::EnsurePort { port, https } => {
            let mut manager = Manager::open(settings)?;
            if !manager.ensure_port(&port, https)? {
                println!("✅ Already listening on {}", port);
                return Ok(());
            }

            let saved = manager.save_changes().and_then(|_| manager.check_configuration());
            if let Err(e) = saved {
                let rollback = manager.rollback_changes();
                return Err(e.with_rollback(rollback).into());
            }
            manager.commit_changes()?;
            manager.restart()?;
            println!("✅ Now listening on {}", port);
        }

        Commands::Check => {
            let manager = Manager::open(settings)?;
            match manager.check_configuration() {
                Ok(()) => println!("✅ Configuration is valid!"),
                Err(e) => {
                    eprintln!("❌ Configuration Error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Restart => {
            Manager::open(settings)?.restart()?;
            println!("🔄 Server reloaded");
        }

        Commands::Lint { file } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            match vhostmng_config::report::check(&file, &source) {
                Ok(config) => {
                    println!("✅ '{}' is valid ({} entries)", file.display(), config.entries.len());
                }
                Err(report) => {
                    eprintln!("{}", report);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("vhostmng v{}", vhostmng_core::VERSION);
            match Manager::open(settings).and_then(|m| m.version()) {
                Ok(version) => println!("Server v{}", version),
                Err(e) => tracing::debug!("No server version: {}", e),
            }
        }
    }

    Ok(())
}

/// Settings file, then command-line overrides
fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = SettingsLoader::load_or_default(cli.settings.as_deref())?;

    if let Some(root) = &cli.server_root {
        settings.server_root = root.clone();
    }
    if let Some(dialect) = cli.dialect {
        settings.dialect = match dialect {
            DialectArg::Nginx => Dialect::nginx(),
            DialectArg::Httpd => Dialect::httpd(),
        };
    }
    if let Some(bin) = &cli.control_bin {
        settings.control_bin = bin.clone();
    }

    tracing::debug!("⚙️ Server root {:?}", settings.server_root);
    Ok(settings)
}

fn print_host(host: &Host) {
    let mut flags = Vec::new();
    if host.ssl {
        flags.push("🔒");
    }
    if !host.enabled {
        flags.push("(disabled)");
    }
    println!(
        "🌐 {} [{}] {} {}",
        if host.server_name.is_empty() { "_" } else { &host.server_name },
        host.addresses_string(false),
        host.file_path.display(),
        flags.join(" ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
