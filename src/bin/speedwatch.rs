use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use speedwatch::{
    collector::Collector,
    config::{Config, read_config_file},
    ingest::ingest_dir,
    probe::CommandProbe,
    render::{JsonRenderer, ReportJob},
    scheduler::{Clock, FileSentinel, LocalClock, Scheduler, SchedulerHandle},
    storage::{self, MeasurementStore},
    util::get_config_path,
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Periodic network speed measurements")]
struct Args {
    /// Config file (defaults to $SPEEDWATCH_CONFIG or ./speedwatch.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log everything, including per-target probe output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Measure on every period boundary until interrupted (default)
    Run,

    /// Measure every target once and exit
    CollectOnce,

    /// Regenerate the plots from the stored history and exit
    RenderOnce,

    /// Backfill the store from a directory of saved probe JSON documents
    Ingest { dir: PathBuf },
}

fn init(args: &Args) {
    dotenv::dotenv().ok();

    let level = if args.verbose {
        LevelFilter::TRACE
    } else if args.quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };

    let filter = filter::Targets::new().with_targets(vec![
        ("speedwatch", level),
        ("sqlx", LevelFilter::WARN),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(&args);
    trace!("started with args: {args:?}");

    let config_path = args.config.clone().unwrap_or_else(get_config_path);
    let config = read_config_file(&config_path)?;

    let store = open_store(&config).await?;

    let result = match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, store.clone()).await,
        Command::CollectOnce => collect_once(&config, store.clone()).await,
        Command::RenderOnce => report_job(&config, store.clone()).render_all().await.map(|_| ()),
        Command::Ingest { dir } => ingest_dir(store.as_ref(), &dir).await.map(|_| ()),
    };

    if let Err(e) = store.close().await {
        warn!("failed to close store: {e}");
    }

    result
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn MeasurementStore>> {
    let store = storage::open(&config.storage())
        .await
        .context("failed to open measurement store")?;

    match store.health_check().await {
        Ok(health) if health.healthy => info!("store healthy: {}", health.message),
        Ok(health) => warn!("store unhealthy: {}", health.message),
        Err(e) => warn!("store health check failed: {e}"),
    }

    match store.get_stats().await {
        Ok(stats) => info!("{stats}"),
        Err(e) => warn!("failed to read store statistics: {e}"),
    }

    Ok(store)
}

fn collector(config: &Config, store: Arc<dyn MeasurementStore>) -> Collector {
    Collector::new(
        config.targets.clone(),
        Arc::new(CommandProbe::from_config(&config.probe)),
        store,
        config.probe.timeout(),
    )
    .with_concurrency(config.probe.concurrency)
}

fn report_job(config: &Config, store: Arc<dyn MeasurementStore>) -> ReportJob {
    ReportJob::new(
        store,
        config.targets.clone(),
        Arc::new(JsonRenderer::new(&config.render.output_dir)),
    )
}

async fn run(config: &Config, store: Arc<dyn MeasurementStore>) -> anyhow::Result<()> {
    let settings = config.schedule.settings()?;
    let collector = Arc::new(collector(config, store.clone()));
    let sentinel = Arc::new(FileSentinel::new(&config.schedule.sentinel));

    let mut scheduler = Scheduler::new(settings, collector, sentinel);
    if config.render.after_collect {
        scheduler = scheduler.with_hook(Arc::new(report_job(config, store)));
    }

    let (handle, task) = SchedulerHandle::spawn(scheduler);
    handle.supervise(task, tokio::signal::ctrl_c()).await
}

async fn collect_once(config: &Config, store: Arc<dyn MeasurementStore>) -> anyhow::Result<()> {
    let written = collector(config, store.clone())
        .collect_all(LocalClock.now())
        .await?;

    if written > 0 && config.render.after_collect {
        report_job(config, store).render_all().await?;
    }

    Ok(())
}
