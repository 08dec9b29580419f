use std::sync::Arc;

use clap::Parser;
use fuser::MountOption;

use chatfs::chat::HttpChatTransport;
use chatfs::config::{self, Cli};
use chatfs::fs::FsWrapper;
use chatfs::writer::Writer;
use chatfs::{bootstrap, live, Engine};

fn init_tracing(verbose: bool) {
    let filter = if verbose { "chatfs=debug,info" } else { "chatfs=info,warn" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match config::resolve(cli) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "configuration error");
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().expect("failed to start tokio runtime");

    let transport: Arc<dyn chatfs::chat::ChatTransport> = match HttpChatTransport::new(
        config.api_base_url.clone(),
        config.ws_url.clone(),
        config.token.clone(),
        config.self_id.clone(),
    ) {
        Ok(transport) => Arc::new(transport),
        Err(err) => {
            tracing::error!(%err, "failed to build chat transport");
            std::process::exit(1);
        }
    };

    let mut db = config.database_backend.new_db();
    let bootstrap_result = match runtime.block_on(bootstrap::bootstrap(transport.clone(), &config.guild, db.as_mut(), config.compact)) {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(%err, "bootstrap failed");
            std::process::exit(1);
        }
    };

    let writer = runtime.block_on(async {
        Writer::spawn(transport.clone(), bootstrap_result.tx_channel.clone(), bootstrap_result.data_channel.clone())
    });

    let engine = Engine::new(
        db,
        writer,
        transport,
        bootstrap_result.tx_channel.clone(),
        bootstrap_result.data_channel,
        config.cache_backend,
        runtime,
    );

    {
        let engine = engine.clone();
        let tx_channel = bootstrap_result.tx_channel;
        engine.block_on(async move {
            tokio::spawn(live::run(engine.clone(), tx_channel));
        });
    }

    let fs = FsWrapper::new(engine.clone(), &config);

    let mut options = vec![MountOption::AutoUnmount, MountOption::FSName("chatfs".to_string())];
    for raw in &config.mount_options {
        options.push(MountOption::CUSTOM(raw.clone()));
    }

    tracing::info!(mountpoint = %config.mountpoint.display(), "mounting");
    if let Err(err) = fuser::mount2(fs, &config.mountpoint, &options) {
        tracing::error!(%err, "mount failed");
        std::process::exit(1);
    }
}
