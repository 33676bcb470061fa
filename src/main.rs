use std::io;
use std::process::exit;

use clap::Parser;
use redi_rs::config::RedisConfig;
use redi_rs::server::RedisServer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "redi-rs", about = "A Redis-compatible in-memory key/value server")]
struct Args {
    /// Listen port (1..65535)
    #[arg(short, long, default_value = "1337")]
    port: String,
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let port = match args.port.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => port as u16,
        _ => {
            eprintln!("invalid port value '{}'", args.port);
            exit(42);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RedisConfig { port, ..RedisConfig::default() };
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.worker_threads {
        builder.worker_threads(workers);
    }
    builder.build()?.block_on(serve(config))
}

async fn serve(config: RedisConfig) -> io::Result<()> {
    let server = RedisServer::new(config).await;
    let listener = server.listen().await?;
    tokio::select! {
        result = server.run(listener) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, saving before exit");
            if let Err(err) = server.snapshots.save().await {
                error!(%err, "save on shutdown failed");
            }
            exit(0);
        }
    }
}
