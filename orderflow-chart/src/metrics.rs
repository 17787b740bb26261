//! Summary Metrics Engine: per-bar delta, rolling cumulative delta, rate of change and volume.
//!
//! Each metric keeps its raw value, a literal text rendering of it, and `tanh(raw)` for colour
//! mapping, so the display text never loses precision to the bounded value.

use crate::{
    error::ShapeError,
    frame::{Column, Frame, ToFrame, format_float},
    link::{LinkedBar, LinkedTick},
    model::{BarId, OrderKey},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy, prelude::FromPrimitive};
use std::collections::VecDeque;
use tracing::debug;

/// Decimal places kept by the rate of change.
const ROC_DECIMALS: u32 = 2;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum MetricKind {
    Delta,
    CumulativeDelta,
    RateOfChange,
    Volume,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Delta,
        MetricKind::CumulativeDelta,
        MetricKind::RateOfChange,
        MetricKind::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Delta => "delta",
            MetricKind::CumulativeDelta => "cum_delta",
            MetricKind::RateOfChange => "roc",
            MetricKind::Volume => "volume",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The four metric series, one value per bar in bar-table order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct MetricSeries {
    pub delta: Vec<f64>,
    pub cumulative_delta: Vec<f64>,
    pub rate_of_change: Vec<f64>,
    pub volume: Vec<f64>,
}

impl MetricSeries {
    pub fn get(&self, kind: MetricKind) -> &[f64] {
        match kind {
            MetricKind::Delta => &self.delta,
            MetricKind::CumulativeDelta => &self.cumulative_delta,
            MetricKind::RateOfChange => &self.rate_of_change,
            MetricKind::Volume => &self.volume,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct MetricEntry {
    pub bar_id: BarId,
    pub order_key: OrderKey,
    pub timestamp: DateTime<Utc>,
    pub kind: MetricKind,
    pub raw: f64,
    /// Literal rendering of `raw`
    pub text: String,
    /// `tanh(raw)`, bounded to (-1, 1)
    pub value: f64,
}

impl MetricEntry {
    fn new(bar: &LinkedBar, kind: MetricKind, raw: f64) -> Self {
        Self {
            bar_id: bar.bar_id.clone(),
            order_key: bar.order_key,
            timestamp: bar.bar.timestamp,
            kind,
            raw,
            text: format_float(raw),
            value: raw.tanh(),
        }
    }
}

/// The `labels` table.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct MetricTable {
    pub series: MetricSeries,
    /// Four entries per bar, bars in table order, kinds in [`MetricKind::ALL`] order.
    pub entries: Vec<MetricEntry>,
}

/// Compute all metrics for `bars` from the ticks linked to them.
pub fn compute(bars: &[LinkedBar], ticks: &[LinkedTick], window: usize) -> MetricTable {
    let mut ask_totals = vec![0.0; bars.len()];
    let mut bid_totals = vec![0.0; bars.len()];
    for linked in ticks {
        ask_totals[linked.bar_index] += linked.tick.ask_size;
        bid_totals[linked.bar_index] += linked.tick.bid_size;
    }

    let delta = ask_totals
        .iter()
        .zip(&bid_totals)
        .map(|(ask, bid)| ask - bid)
        .collect::<Vec<_>>();
    let volume = ask_totals
        .iter()
        .zip(&bid_totals)
        .map(|(ask, bid)| ask + bid)
        .collect::<Vec<_>>();
    let cumulative_delta = cumulative_delta(&delta, window);
    let rate_of_change = rate_of_change(&cumulative_delta);

    let series = MetricSeries {
        delta,
        cumulative_delta,
        rate_of_change,
        volume,
    };

    let entries = bars
        .iter()
        .enumerate()
        .flat_map(|(index, bar)| {
            MetricKind::ALL.map(|kind| MetricEntry::new(bar, kind, series.get(kind)[index]))
        })
        .collect::<Vec<_>>();

    debug!(bars = bars.len(), window, "computed summary metrics");

    MetricTable { series, entries }
}

/// Rolling sum of the `window` most recent values, inclusive, using fewer at the start.
pub fn cumulative_delta(delta: &[f64], window: usize) -> Vec<f64> {
    let mut recent = VecDeque::with_capacity(window);
    delta
        .iter()
        .map(|value| {
            if recent.len() >= window {
                recent.pop_front();
            }
            recent.push_back(*value);
            recent.iter().sum()
        })
        .collect()
}

/// Percentage change between consecutive cumulative deltas, rounded to two decimals.
///
/// The first bar, divisions by zero, and non-finite results are 0.
pub fn rate_of_change(cumulative_delta: &[f64]) -> Vec<f64> {
    let mut roc = Vec::with_capacity(cumulative_delta.len());
    if cumulative_delta.is_empty() {
        return roc;
    }

    roc.push(0.0);
    roc.extend(cumulative_delta.windows(2).map(|pair| {
        let (previous, current) = (pair[0], pair[1]);
        if previous == 0.0 {
            return 0.0;
        }
        round_roc((current - previous) / previous * 100.0)
    }));
    roc
}

/// Round half to even at [`ROC_DECIMALS`], on the shortest decimal form of `value`.
///
/// Outside the range of [`Decimal`] the rounding happens in `f64`.
fn round_roc(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }

    Decimal::from_f64(value)
        .map(|value| value.round_dp_with_strategy(ROC_DECIMALS, RoundingStrategy::MidpointNearestEven))
        .and_then(|value| value.to_string().parse().ok())
        .unwrap_or_else(|| {
            let scale = 10f64.powi(ROC_DECIMALS as i32);
            (value * scale).round_ties_even() / scale
        })
}

impl ToFrame for MetricTable {
    fn to_frame(&self) -> Result<Frame, ShapeError> {
        let entries = &self.entries;
        Frame::new()
            .with_column("identifier", Column::texts(entries.iter().map(|e| e.bar_id.as_str())))?
            .with_column("order_key", Column::ints(entries.iter().map(|e| e.order_key.0)))?
            .with_column("timestamp", Column::times(entries.iter().map(|e| e.timestamp)))?
            .with_column("type", Column::texts(entries.iter().map(|e| e.kind.as_str())))?
            .with_column("raw", Column::floats(entries.iter().map(|e| e.raw)))?
            .with_column("value", Column::floats(entries.iter().map(|e| e.value)))?
            .with_column("text", Column::texts(entries.iter().map(|e| e.text.as_str())))
    }
}
