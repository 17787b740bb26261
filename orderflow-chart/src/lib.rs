//! # Orderflow Chart
//! Turns a tick table (per price level bid/ask sizes) and a bar table (OHLC) into the eight
//! columnar tables an orderflow footprint chart is drawn from:
//! * `orderflow`: per level imbalance and fixed-width bid/ask ladder text.
//! * `orderflow2`: per level volume relative to the busiest level of its bar.
//! * `green_hl`, `red_hl`, `green_oc`, `red_oc`: gapped candle polylines.
//! * `labels`: per bar delta, rolling cumulative delta, rate of change and volume.
//! * `ohlc`: the linked bar table.
//!
//! ## Example
//! ```rust,no_run
//! use orderflow_chart::{ChartConfig, Frame, OrderFlowChart};
//!
//! fn render(ticks: &Frame, bars: &Frame) -> Result<String, Box<dyn std::error::Error>> {
//!     let chart = OrderFlowChart::from_frames(ticks, bars, ChartConfig::default())?;
//!     let processed = chart.process()?;
//!     Ok(processed.output().to_json()?)
//! }
//! ```

use crate::{
    model::{Bar, Granularity, Tick},
    pipeline::Context,
};
use tracing::debug;

/// Candle Geometry Builder producing the `*_hl` and `*_oc` tables.
pub mod candle;

/// [`ChartConfig`] with column sources and rendering parameters.
pub mod config;

/// All [`Error`](std::error::Error)s generated in `orderflow-chart`.
pub mod error;

/// Columnar [`Frame`] used for input tables and serialization.
pub mod frame;

/// Imbalance Engine producing the `orderflow` table.
pub mod imbalance;

/// Bar Linker attaching identifiers and order keys to bars and ticks.
pub mod link;

/// Summary Metrics Engine producing the `labels` table.
pub mod metrics;

/// Tick, bar and identity types.
pub mod model;

/// Output Serializer producing [`ColumnarRecord`](output::ColumnarRecord)s.
pub mod output;

/// Six-stage processing pipeline.
pub mod pipeline;

/// Volume Profile Normalizer producing the `orderflow2` table.
pub mod profile;

/// Initial visible chart window.
pub mod viewport;

pub use config::ChartConfig;
pub use error::{ChartError, ConfigError, ShapeError};
pub use frame::{Column, DType, Frame, ToFrame};
pub use model::{BarId, OrderKey};
pub use output::{ChartOutput, ColumnarRecord};
pub use pipeline::{ProcessedChart, Stage};
pub use viewport::Viewport;

/// Validated tick and bar tables ready to be processed into chart tables.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFlowChart {
    ticks: Vec<Tick>,
    bars: Vec<Bar>,
    config: ChartConfig,
    granularity: Granularity,
}

impl OrderFlowChart {
    /// Validate the configuration, tick sizes, the bar OHLC invariant and the tick price
    /// granularity.
    pub fn new(ticks: Vec<Tick>, bars: Vec<Bar>, config: ChartConfig) -> Result<Self, ChartError> {
        config.validate()?;
        model::validate_ticks(&ticks)?;
        model::validate_bars(&bars)?;
        let granularity = Granularity::from_ticks(&ticks)?;

        debug!(
            ticks = ticks.len(),
            bars = bars.len(),
            %granularity,
            "constructed orderflow chart"
        );

        Ok(Self {
            ticks,
            bars,
            config,
            granularity,
        })
    }

    /// Read the tick and bar tables from [`Frame`]s, honouring the configured columns.
    pub fn from_frames(ticks: &Frame, bars: &Frame, config: ChartConfig) -> Result<Self, ChartError> {
        config.validate()?;
        let ticks = model::ticks_from_frame(ticks, &config)?;
        let bars = model::bars_from_frame(bars, &config)?;
        Self::new(ticks, bars, config)
    }

    /// Run the full pipeline. Every call recomputes all tables from the stored inputs.
    pub fn process(&self) -> Result<ProcessedChart, ChartError> {
        pipeline::run(Context {
            ticks: &self.ticks,
            bars: &self.bars,
            config: &self.config,
            granularity: self.granularity,
        })
    }

    /// Price increment between adjacent levels.
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }
}
