mod bootstrap;

use anyhow::Result;
use tank_core::settings::Settings;
use tank_data::export::export_report;
use tank_data::report::Report;
use tank_runtime::orchestrator::BatchOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Settings::load()?;

    bootstrap::setup_logging(&config.log_level, config.log_file.as_deref())?;

    tracing::info!("Tank Monitor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Mode: {}, offset: {}, sigma: {}",
        if config.from_csv { "file" } else { "url" },
        config.utc_offset,
        config.anomaly_sigma
    );

    let sources = bootstrap::collect_sources(&config)?;
    if sources.is_empty() {
        anyhow::bail!("no tanks configured; use --tank NAME=SOURCE, --data-dir or a config file");
    }

    let orchestrator = BatchOrchestrator::from_run_config(&config);
    let batch = orchestrator.run(sources).await;

    let report = Report::build(&batch, &config.window);
    print!("{}", report.render_text());

    if let Some(dir) = &config.output_dir {
        let written = export_report(&report, dir)?;
        println!("Wrote {} file(s) to {}", written.len(), dir.display());
    }

    if batch.metadata.tanks_analyzed == 0 {
        anyhow::bail!("all {} tank(s) failed", batch.metadata.tanks_failed);
    }

    Ok(())
}
