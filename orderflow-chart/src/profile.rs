//! Volume Profile Normalizer: per-bar relative weight of each price level.

use crate::{
    error::ShapeError,
    frame::{Column, Frame, ToFrame},
    imbalance::ImbalanceTable,
    model::{BarId, OrderKey},
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use tracing::debug;

const GLYPH: char = '█';

#[derive(Clone, PartialEq, Debug)]
pub struct VolumeProfileRow {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub bar_id: BarId,
    pub order_key: OrderKey,
    /// total_size / max total_size of the bar, in (0, 1]. `None` if the bar has no volume.
    pub relative_weight: Option<f64>,
    pub glyph_text: String,
}

/// The `orderflow2` table.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct VolumeProfileTable {
    pub rows: Vec<VolumeProfileRow>,
}

/// Rescale every level's total size by the largest total size of its bar.
pub fn normalize(table: &ImbalanceTable, glyph_width: usize, glyph_indent: usize) -> VolumeProfileTable {
    let mut bar_max = FnvHashMap::<&BarId, f64>::default();
    for row in &table.rows {
        let max = bar_max.entry(&row.bar_id).or_insert(f64::NEG_INFINITY);
        *max = max.max(row.total_size);
    }

    let silent_bars = bar_max.values().filter(|max| **max <= 0.0).count();
    if silent_bars > 0 {
        debug!(silent_bars, "bars without volume have undefined relative weight");
    }

    let rows = table
        .rows
        .iter()
        .map(|row| {
            let relative_weight = bar_max
                .get(&row.bar_id)
                .filter(|max| **max > 0.0)
                .map(|max| row.total_size / max);

            VolumeProfileRow {
                timestamp: row.timestamp,
                price: row.price,
                bid_size: row.bid_size,
                ask_size: row.ask_size,
                bar_id: row.bar_id.clone(),
                order_key: row.order_key,
                relative_weight,
                glyph_text: glyph_text(relative_weight, glyph_width, glyph_indent),
            }
        })
        .collect();

    VolumeProfileTable { rows }
}

/// `indent` spaces followed by `round(weight * width)` glyphs.
pub fn glyph_text(relative_weight: Option<f64>, width: usize, indent: usize) -> String {
    let glyphs = relative_weight.map_or(0, |weight| (weight * width as f64).round() as usize);
    let mut text = String::with_capacity(indent + glyphs * GLYPH.len_utf8());
    text.extend(std::iter::repeat_n(' ', indent));
    text.extend(std::iter::repeat_n(GLYPH, glyphs));
    text
}

impl ToFrame for VolumeProfileTable {
    fn to_frame(&self) -> Result<Frame, ShapeError> {
        let rows = &self.rows;
        Frame::new()
            .with_column("timestamp", Column::times(rows.iter().map(|r| r.timestamp)))?
            .with_column("bid_size", Column::floats(rows.iter().map(|r| r.bid_size)))?
            .with_column("price", Column::floats(rows.iter().map(|r| r.price)))?
            .with_column("ask_size", Column::floats(rows.iter().map(|r| r.ask_size)))?
            .with_column("identifier", Column::texts(rows.iter().map(|r| r.bar_id.as_str())))?
            .with_column("order_key", Column::ints(rows.iter().map(|r| r.order_key.0)))?
            .with_column(
                "relative_weight",
                Column::Float(rows.iter().map(|r| r.relative_weight).collect()),
            )?
            .with_column("glyph_text", Column::texts(rows.iter().map(|r| r.glyph_text.as_str())))
    }
}
