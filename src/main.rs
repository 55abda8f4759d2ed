use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::path::PathBuf;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::EnvFilter;
use twentyone::store;

mod client;
mod ui;

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: twentyone [--api-url <url>] [--session-file <path>] [--log-dir <path>] [--register]\n\
         \n\
         Flags:\n\
           --api-url <url>       Authority endpoint (default {})\n\
           --session-file <path> Where the signed-in session is persisted\n\
                                 (defaults to ~/.twentyone/session.json)\n\
           --log-dir <path>      Directory for rolling log files\n\
                                 (defaults to ~/.twentyone/logs)\n\
           --register            Create a new account instead of signing in",
        twentyone::authority::DEFAULT_API_URL,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<(client::AppConfig, PathBuf)> {
    let mut args = std::env::args().skip(1);
    let mut api_url: Option<String> = None;
    let mut session_file: Option<String> = None;
    let mut log_dir: Option<String> = None;
    let mut register = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--api-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--api-url requires a URL argument"))?;
                if api_url.is_some() {
                    return Err(eyre!("--api-url may only be specified once"));
                }
                api_url = Some(url);
            }
            "--session-file" => {
                let path = args
                    .next()
                    .ok_or_else(|| eyre!("--session-file requires a path argument"))?;
                if session_file.is_some() {
                    return Err(eyre!("--session-file may only be specified once"));
                }
                session_file = Some(path);
            }
            "--log-dir" => {
                let path = args
                    .next()
                    .ok_or_else(|| eyre!("--log-dir requires a path argument"))?;
                if log_dir.is_some() {
                    return Err(eyre!("--log-dir may only be specified once"));
                }
                log_dir = Some(path);
            }
            "--register" => register = true,
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let session_file = store::resolve_session_file(session_file.as_deref())?;
    let log_dir = match log_dir {
        Some(raw) => PathBuf::from(shellexpand::tilde(&raw).into_owned()),
        None => session_file
            .parent()
            .map(|dir| dir.join("logs"))
            .ok_or_else(|| eyre!("cannot derive a log directory from the session file"))?,
    };

    Ok((
        client::AppConfig {
            api_url: api_url
                .unwrap_or_else(|| twentyone::authority::DEFAULT_API_URL.to_string()),
            session_file,
            register,
        },
        log_dir,
    ))
}

// The TUI owns stdout, so logs go to a rolling file instead.
fn init_tracing(log_dir: &PathBuf) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("failed to create log directory {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, "twentyone.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let (config, log_dir) = parse_cli_args()?;
    let _guard = init_tracing(&log_dir)?;
    tracing::info!(api_url = %config.api_url, "starting twentyone client");
    client::run_app(config).await
}
