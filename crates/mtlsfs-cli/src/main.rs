#![deny(unsafe_code)]

// Use mimalloc for reduced allocation latency (enabled by default).
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod exit_code;

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;
#[cfg(feature = "tokio-console")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mtlsfs_core::AdminConfig;
use mtlsfs_server::{parse_listen_addr, FileServer, ServerConfig, ServerError, TlsConfig};

const BANNER: &str = include_str!("banner.txt");

/// Long flags that may also be written with a single dash, Go style.
const LONG_FLAGS: [&str; 9] = [
    "cafile", "certfile", "keyfile", "listen", "admin", "root", "verbose", "help", "version",
];

/// HTTPS file server that scopes each client to the directory named by the
/// Organization in its certificate
#[derive(Parser, Debug)]
#[command(name = "mtlsfs")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Serve ./<Org>/ to each client, let the Admin organization write
    mtlsfs -cafile ca.pem -certfile server.pem -keyfile server.key

    # Custom port and admin organization
    mtlsfs --cafile ca.pem --certfile server.pem --keyfile server.key \\
        --listen 127.0.0.1:9443 --admin Operators
")]
struct Cli {
    /// CA bundle used to verify client certificates
    #[arg(long, value_name = "FILE", env = "MTLSFS_CAFILE")]
    cafile: PathBuf,

    /// Server certificate (PEM)
    #[arg(long, value_name = "FILE", env = "MTLSFS_CERTFILE")]
    certfile: PathBuf,

    /// Server private key (PEM)
    #[arg(long, value_name = "FILE", env = "MTLSFS_KEYFILE")]
    keyfile: PathBuf,

    /// Address to listen on (`:port` listens on all interfaces)
    #[arg(long, value_name = "ADDR", default_value = mtlsfs_server::DEFAULT_LISTEN, env = "MTLSFS_LISTEN")]
    listen: String,

    /// Organization allowed to upload and delete
    #[arg(long, value_name = "ORG", default_value = "Admin", env = "MTLSFS_ADMIN")]
    admin: String,

    /// Directory served; each organization reads from its subdirectory
    #[arg(long, value_name = "DIR", default_value = ".", env = "MTLSFS_ROOT")]
    root: PathBuf,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = normalize_args(std::env::args_os());
    if args.len() <= 1 {
        println!("{}", Cli::command().render_help());
        return ExitCode::from(exit_code::USAGE);
    }

    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(exit_code::USAGE)
            } else {
                ExitCode::from(exit_code::SUCCESS)
            };
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Rewrite `-cafile x` and `-listen=:9443` to their `--` forms.
///
/// Short flags such as `-v` and `-vv` are left alone.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 {
                return arg;
            }
            let Some(s) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = s.strip_prefix('-') else {
                return arg;
            };
            if rest.starts_with('-') {
                return arg;
            }
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            if LONG_FLAGS.contains(&name) {
                OsString::from(format!("-{s}"))
            } else {
                arg
            }
        })
        .collect()
}

fn run(cli: Cli) -> Result<()> {
    setup_tracing(cli.verbose);
    println!("{BANNER}");

    let listen = parse_listen_addr(&cli.listen)?;
    let tls = TlsConfig {
        ca_file: cli.cafile,
        cert_file: cli.certfile,
        key_file: cli.keyfile,
    };
    let mut config = ServerConfig::new(tls);
    config.listen = listen;
    config.root = cli.root;
    config.admin = AdminConfig::new(cli.admin);

    info!(
        ca_file = %config.tls.ca_file.display(),
        cert_file = %config.tls.cert_file.display(),
        key_file = %config.tls.key_file.display(),
        listen = %config.listen,
        admin = config.admin.organization(),
        root = %config.root.display(),
        "Server configuration"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async move {
        let server = FileServer::start(config)
            .await
            .context("Failed to start server")?;
        info!(url = %server.url(), "Listening, press Ctrl-C to stop");

        tokio::signal::ctrl_c()
            .await
            .context("Failed to wait for Ctrl-C")?;

        info!("Shutting down");
        server.stop().await;
        Ok(())
    })
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    #[cfg(feature = "tokio-console")]
    {
        use std::net::SocketAddr;
        use tracing_subscriber::Layer;

        let console_port: u16 = std::env::var("TOKIO_CONSOLE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(6669);
        let console_addr: SocketAddr = ([127, 0, 0, 1], console_port).into();
        let fmt_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

        let console_layer = console_subscriber::ConsoleLayer::builder()
            .server_addr(console_addr)
            .spawn();
        tracing_subscriber::registry()
            .with(console_layer)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).with_filter(fmt_filter))
            .init();
        tracing::info!("tokio-console enabled, connect with: tokio-console http://127.0.0.1:{}", console_port);
    }

    #[cfg(not(feature = "tokio-console"))]
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code by walking the error chain.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(server_err) = cause.downcast_ref::<ServerError>() {
            return match server_err {
                ServerError::InvalidListenAddress { .. } => exit_code::USAGE,
                _ => exit_code::STARTUP_FAILED,
            };
        }
    }
    exit_code::STARTUP_FAILED
}
