#![deny(clippy::all, warnings)]

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::json;
use tracing::info;

use hbcdn_core::api::ApiServer;
use hbcdn_core::scheduler::{run_scheduler, Schedule};
use hbcdn_core::{AppConfig, Services};

mod cli;

use cli::{CommandCli, HbcdnCli};

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = HbcdnCli::parse();

    let config = AppConfig::from_env().map_err(|err| eyre!("{err:#}"))?;
    init_tracing(&config.user.log_level, cli.verbose);

    match cli.command {
        CommandCli::Serve => serve(config),
        CommandCli::Reconcile { json } => reconcile_once(config, json),
    }
}

fn serve(config: AppConfig) -> Result<()> {
    let schedule = Schedule::from_settings(
        config.user.watcher_periodic_scan_seconds,
        &config.user.watcher_cron_expression,
    )
    .map_err(|err| eyre!("{err:#}"))?;

    let services = Services::bootstrap(config).map_err(|err| eyre!("{err:#}"))?;
    let reconciler = services.build_reconciler();
    let api = ApiServer::start(
        services.api_context(),
        &services.config.user.api_host,
        services.config.user.api_port,
    )
    .map_err(|err| eyre!("{err:#}"))?;
    info!("download API listening on {}", api.addr());

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .map_err(|err| eyre!("failed to register signal handler: {err}"))?;
    }

    run_scheduler(&schedule, &shutdown, || {
        reconciler.run_cycle();
    });

    drop(api);
    info!("service stopped");
    Ok(())
}

fn reconcile_once(config: AppConfig, as_json: bool) -> Result<()> {
    let services = Services::bootstrap(config).map_err(|err| eyre!("{err:#}"))?;
    let result = services.build_reconciler().run_cycle();

    if as_json {
        let payload = json!({
            "added": result.added,
            "updated": result.updated,
            "unchanged": result.unchanged,
            "removed": result.removed,
            "failed": result.failed,
            "exported_files": result
                .exported_files
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>(),
        });
        println!("{payload}");
    }
    Ok(())
}

fn init_tracing(log_level: &str, verbose: u8) {
    let level = match verbose {
        0 => match log_level {
            "warning" => "warn",
            other => other,
        },
        1 => "debug",
        _ => "trace",
    };
    let filter = format!("hbcdn={level},hbcdn_cli={level},hbcdn_core={level},hbcdn_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
