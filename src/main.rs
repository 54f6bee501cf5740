//! entrypoint for mitm-proxy

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::level_filters::LevelFilter;

use mitm_proxy::config::Args;
use mitm_proxy::error::ErrorWithExitCode;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    mitm_proxy::trace::init_tracing(LevelFilter::INFO);

    let shutdown = CancellationToken::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_shutdown.cancel();
        }
    });

    match mitm_proxy::run(args, shutdown).await {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Some(err) = err.downcast_ref::<ErrorWithExitCode>() {
                error!("exit with error ({}): {err}", err.exit_code());
                std::process::exit(err.exit_code());
            } else {
                error!("exit with error: {err}");
                std::process::exit(1);
            }
        }
    }
}
