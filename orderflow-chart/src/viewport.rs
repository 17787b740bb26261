use crate::{
    link::LinkedBar,
    model::{BarId, Granularity},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Initial visible window of the chart: the most recent bars and the price levels below the
/// last bar's high.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Viewport {
    pub price_top: f64,
    pub price_bottom: f64,
    /// May be negative when fewer bars than the visible width exist.
    pub bar_start: i64,
    pub bar_end: i64,
    /// Category axis positions, one per bar.
    pub tick_values: Vec<BarId>,
    pub tick_labels: Vec<DateTime<Utc>>,
}

impl Viewport {
    /// `None` when there are no bars to show.
    pub fn from_bars(
        bars: &[LinkedBar],
        granularity: Granularity,
        visible_levels: u32,
        visible_bars: usize,
    ) -> Option<Self> {
        let last = bars.last()?;

        let price_top = last.bar.high + 1.0;
        let price_bottom = price_top - (f64::from(visible_levels) * granularity.value()).trunc();
        let bar_end = bars.len() as i64;

        Some(Self {
            price_top,
            price_bottom,
            bar_start: bar_end - visible_bars as i64,
            bar_end,
            tick_values: bars.iter().map(|bar| bar.bar_id.clone()).collect(),
            tick_labels: bars.iter().map(|bar| bar.bar.timestamp).collect(),
        })
    }

    pub fn price_range(&self) -> (f64, f64) {
        (self.price_bottom, self.price_top)
    }

    pub fn bar_range(&self) -> (i64, i64) {
        (self.bar_start, self.bar_end)
    }
}
