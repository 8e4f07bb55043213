//! Rendering of series sets into plot artifacts
//!
//! A renderer turns one [`SeriesSet`] into one file. The bundled
//! [`JsonRenderer`] writes a self-describing plot document (axes, panels,
//! scaled points) that any charting front end can draw.
//!
//! [`ReportJob`] regenerates the [`STANDARD_PLOTS`] from the store and runs
//! as a scheduler hook after every successful cycle.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::scheduler::CycleHook;
use crate::series::{History, MetricFamily, SeriesSet, TransformOptions};
use crate::storage::MeasurementStore;
use crate::{Target, TargetId};

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `set` as the artifact called `name`, returning where it was written
    async fn render(&self, name: &str, set: &SeriesSet) -> Result<PathBuf>;
}

/// One of the plots regenerated on every report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotSpec {
    pub name: &'static str,
    pub family: MetricFamily,
    pub options: TransformOptions,
}

const fn plot(
    name: &'static str,
    family: MetricFamily,
    overlay: bool,
    truncate: bool,
) -> PlotSpec {
    PlotSpec {
        name,
        family,
        options: TransformOptions { overlay, truncate },
    }
}

pub const STANDARD_PLOTS: [PlotSpec; 8] = [
    plot("bandwidth", MetricFamily::Throughput, false, false),
    plot("bandwidth-recent", MetricFamily::Throughput, false, true),
    plot("tod-bandwidth", MetricFamily::Throughput, true, false),
    plot("tod-bandwidth-recent", MetricFamily::Throughput, true, true),
    plot("latency", MetricFamily::Ping, false, false),
    plot("latency-recent", MetricFamily::Ping, false, true),
    plot("tod-latency", MetricFamily::Ping, true, false),
    plot("tod-latency-recent", MetricFamily::Ping, true, true),
];

#[derive(Debug, Serialize)]
struct PlotDocument<'a> {
    name: &'a str,
    x_label: &'static str,
    /// `epoch_seconds` or `hour_of_day`
    x_unit: &'static str,
    x_range: Option<(f64, f64)>,
    x_ticks: Vec<f64>,
    panels: Vec<Panel<'a>>,
}

#[derive(Debug, Serialize)]
struct Panel<'a> {
    metric: &'static str,
    y_label: &'static str,
    series: Vec<PanelSeries<'a>>,
}

#[derive(Debug, Serialize)]
struct PanelSeries<'a> {
    target_id: TargetId,
    label: &'a str,
    points: Vec<[f64; 2]>,
}

impl<'a> PlotDocument<'a> {
    fn new(name: &'a str, set: &'a SeriesSet) -> Self {
        let panels = set
            .family
            .metrics()
            .iter()
            .map(|metric| Panel {
                metric: metric.key(),
                y_label: metric.label(),
                series: set
                    .targets
                    .iter()
                    .filter_map(|target| {
                        let points = target.metrics.get(metric)?;
                        Some(PanelSeries {
                            target_id: target.target_id,
                            label: &target.label,
                            points: points
                                .iter()
                                .map(|point| [point.x, point.y / metric.scale()])
                                .collect(),
                        })
                    })
                    .collect(),
            })
            .collect();

        Self {
            name,
            x_label: set.axis.label(),
            x_unit: if set.options.overlay {
                "hour_of_day"
            } else {
                "epoch_seconds"
            },
            x_range: set.axis.range(),
            x_ticks: set.axis.ticks(),
            panels,
        }
    }
}

/// Writes `<output_dir>/<name>.json`
#[derive(Debug, Clone)]
pub struct JsonRenderer {
    output_dir: PathBuf,
}

impl JsonRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Renderer for JsonRenderer {
    async fn render(&self, name: &str, set: &SeriesSet) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;

        let document = serde_json::to_vec_pretty(&PlotDocument::new(name, set))
            .context("failed to serialize plot document")?;

        // readers never see a half written plot
        let path = self.output_dir.join(format!("{name}.json"));
        let staging = self.output_dir.join(format!(".{name}.json.tmp"));
        tokio::fs::write(&staging, document)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, &path)
            .await
            .with_context(|| format!("failed to move plot into {}", path.display()))?;

        debug!("rendered {}", path.display());
        Ok(path)
    }
}

/// Regenerates the standard plots from the full history
pub struct ReportJob {
    store: Arc<dyn MeasurementStore>,
    targets: Vec<Target>,
    renderer: Arc<dyn Renderer>,
}

impl ReportJob {
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        targets: Vec<Target>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            store,
            targets,
            renderer,
        }
    }

    /// Render every standard plot; a failing plot does not stop the others
    ///
    /// Returns the paths of the plots that were written.
    #[instrument(skip(self))]
    pub async fn render_all(&self) -> Result<Vec<PathBuf>> {
        let history = History::load(self.store.as_ref())
            .await
            .context("failed to load measurement history")?;

        let mut written = Vec::with_capacity(STANDARD_PLOTS.len());
        for plot in &STANDARD_PLOTS {
            let set = history.series(&self.targets, plot.family, plot.options);
            match self.renderer.render(plot.name, &set).await {
                Ok(path) => written.push(path),
                Err(e) => error!("failed to render {}: {e:#}", plot.name),
            }
        }

        info!(
            "rendered {} of {} plots from {} measurements",
            written.len(),
            STANDARD_PLOTS.len(),
            history.len()
        );
        Ok(written)
    }
}

#[async_trait]
impl CycleHook for ReportJob {
    async fn after_cycle(&self) -> Result<()> {
        self.render_all().await.map(|_| ())
    }
}
