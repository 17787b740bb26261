//! Six-stage processing pipeline.
//!
//! Stages read an immutable [`Context`] plus the tables of earlier stages and return new
//! tables. Nothing is cached between runs, so every run recomputes from the inputs.

use crate::{
    candle::{self, CandleSet},
    config::ChartConfig,
    error::ChartError,
    frame::ToFrame,
    imbalance::{self, ImbalanceTable},
    link::{self, LinkedTables},
    metrics::{self, MetricTable},
    model::{Bar, Granularity, Tick},
    output::{ChartOutput, ColumnarRecord},
    profile::{self, VolumeProfileTable},
    viewport::Viewport,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Processing stage, retained by [`ChartError::Processing`] when it fails.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BarLinker,
    Imbalance,
    VolumeProfile,
    CandleGeometry,
    SummaryMetrics,
    Serializer,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::BarLinker => "bar_linker",
            Stage::Imbalance => "imbalance",
            Stage::VolumeProfile => "volume_profile",
            Stage::CandleGeometry => "candle_geometry",
            Stage::SummaryMetrics => "summary_metrics",
            Stage::Serializer => "serializer",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validated inputs shared by every stage of one run.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub ticks: &'a [Tick],
    pub bars: &'a [Bar],
    pub config: &'a ChartConfig,
    pub granularity: Granularity,
}

/// Typed tables produced by a run, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartTables {
    pub linked: LinkedTables,
    pub orderflow: ImbalanceTable,
    pub orderflow2: VolumeProfileTable,
    pub candles: CandleSet,
    pub labels: MetricTable,
}

/// Result of a run: typed tables, the serialized output and the initial viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedChart {
    tables: ChartTables,
    output: ChartOutput,
    viewport: Option<Viewport>,
}

impl ProcessedChart {
    pub fn tables(&self) -> &ChartTables {
        &self.tables
    }

    pub fn output(&self) -> &ChartOutput {
        &self.output
    }

    /// Initial visible window, `None` when there are no bars.
    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    pub fn into_output(self) -> ChartOutput {
        self.output
    }
}

/// Run every stage in order. The first failure aborts the run.
pub fn run(context: Context<'_>) -> Result<ProcessedChart, ChartError> {
    let Context {
        ticks,
        bars,
        config,
        granularity,
    } = context;

    let linked = stage(Stage::BarLinker, || link::link(ticks, bars, config))?;

    let orderflow = stage(Stage::Imbalance, || {
        Ok::<_, ChartError>(imbalance::compute(&linked.ticks, &config.imbalance))
    })?;

    let orderflow2 = stage(Stage::VolumeProfile, || {
        Ok::<_, ChartError>(profile::normalize(
            &orderflow,
            config.glyph_width,
            config.glyph_indent,
        ))
    })?;

    let candles = stage(Stage::CandleGeometry, || candle::build_all(&linked.bars))?;

    let labels = stage(Stage::SummaryMetrics, || {
        Ok::<_, ChartError>(metrics::compute(
            &linked.bars,
            &linked.ticks,
            config.cumulative_window,
        ))
    })?;

    let tables = ChartTables {
        linked,
        orderflow,
        orderflow2,
        candles,
        labels,
    };

    let output = stage(Stage::Serializer, || serialize(&tables))?;

    let viewport = Viewport::from_bars(
        &tables.linked.bars,
        granularity,
        config.visible_levels,
        config.visible_bars,
    );

    info!(
        bars = tables.linked.bars.len(),
        ticks = tables.linked.ticks.len(),
        %granularity,
        "processed orderflow chart"
    );

    Ok(ProcessedChart {
        tables,
        output,
        viewport,
    })
}

/// Convert every typed table into its columnar record.
pub fn serialize(tables: &ChartTables) -> Result<ChartOutput, ChartError> {
    fn record<T>(table: &T) -> Result<ColumnarRecord, ChartError>
    where
        T: ToFrame + ?Sized,
    {
        Ok(ColumnarRecord::from_frame(&table.to_frame()?))
    }

    Ok(ChartOutput {
        orderflow: record(&tables.orderflow)?,
        labels: record(&tables.labels)?,
        green_hl: record(&tables.candles.green_hl)?,
        red_hl: record(&tables.candles.red_hl)?,
        green_oc: record(&tables.candles.green_oc)?,
        red_oc: record(&tables.candles.red_oc)?,
        orderflow2: record(&tables.orderflow2)?,
        ohlc: record(tables.linked.bars.as_slice())?,
    })
}

fn stage<T, E, F>(stage: Stage, run: F) -> Result<T, ChartError>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<ChartError>,
{
    debug!(%stage, "stage started");
    let output = run().map_err(|error| ChartError::processing(stage, error))?;
    debug!(%stage, "stage completed");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ShapeError};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_stage_display() {
        struct TestCase {
            input: Stage,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0
                input: Stage::BarLinker,
                expected: "bar_linker",
            },
            TestCase {
                // TC1
                input: Stage::SummaryMetrics,
                expected: "summary_metrics",
            },
            TestCase {
                // TC2
                input: Stage::Serializer,
                expected: "serializer",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.to_string(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_stage_wraps_failures() {
        let error = stage(Stage::CandleGeometry, || {
            Err::<(), _>(ShapeError::UnpairedExtent(1))
        })
        .unwrap_err();

        assert_eq!(
            error,
            ChartError::processing(Stage::CandleGeometry, ShapeError::UnpairedExtent(1))
        );
    }

    #[test]
    fn test_run_reports_failing_stage() {
        let time = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let ticks = vec![
            Tick::new(time, 100.0, 1.0, 1.0),
            Tick::new(time, 100.25, 1.0, 1.0),
        ];
        let bars = vec![
            Bar::new(time, 100.0, 100.25, 100.0, 100.25),
            Bar::new(time, 100.0, 100.25, 100.0, 100.25),
        ];
        let config = ChartConfig::default();
        let context = Context {
            ticks: &ticks,
            bars: &bars,
            config: &config,
            granularity: Granularity::from_ticks(&ticks).unwrap(),
        };

        let error = run(context).unwrap_err();

        assert_eq!(error.stage(), Some(Stage::BarLinker));
        assert!(matches!(
            error.root(),
            ChartError::Configuration(ConfigError::AmbiguousBucket { .. })
        ));
    }
}
