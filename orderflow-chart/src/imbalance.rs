//! Imbalance Engine: per price-level bid/ask imbalance and the fixed-width ladder text.

use crate::{
    config::ImbalanceSource,
    error::ShapeError,
    frame::{Column, Frame, ToFrame},
    link::LinkedTick,
    model::{BarId, OrderKey},
};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::{debug, info, warn};

/// Width of each side of the ladder text.
const LADDER_SIDE_WIDTH: usize = 4;

#[derive(Clone, PartialEq, Debug)]
pub struct ImbalanceRow {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub bar_id: BarId,
    pub order_key: OrderKey,
    /// bid + ask
    pub total_size: f64,
    pub display_text: String,
    /// Signed ratio in [-1, 1], or the external value. `None` if undefined.
    pub imbalance: Option<f64>,
}

/// The `orderflow` table.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct ImbalanceTable {
    pub rows: Vec<ImbalanceRow>,
}

/// Compute imbalance and ladder text for every tick, preserving tick order.
pub fn compute(ticks: &[LinkedTick], source: &ImbalanceSource) -> ImbalanceTable {
    let imbalances = match source {
        ImbalanceSource::Computed => {
            info!("calculating imbalance, no imbalance column was provided");
            computed_imbalances(ticks)
        }
        ImbalanceSource::Column(column) => {
            info!(%column, "using supplied imbalance column");
            ticks.iter().map(|linked| linked.tick.imbalance).collect()
        }
    };

    let undefined = imbalances.iter().filter(|value| value.is_none()).count();
    if undefined > 0 {
        warn!(undefined, "imbalance left undefined for some price levels");
    }

    let bids = ticks.iter().map(|linked| linked.tick.bid_size).collect::<Vec<_>>();
    let asks = ticks.iter().map(|linked| linked.tick.ask_size).collect::<Vec<_>>();
    let texts = ladder_text(&bids, &asks);

    let rows = ticks
        .iter()
        .zip(texts)
        .zip(imbalances)
        .map(|((linked, display_text), imbalance)| ImbalanceRow {
            timestamp: linked.tick.timestamp,
            price: linked.tick.price,
            bid_size: linked.tick.bid_size,
            ask_size: linked.tick.ask_size,
            bar_id: linked.bar_id.clone(),
            order_key: linked.order_key,
            total_size: linked.tick.total_size(),
            display_text,
            imbalance,
        })
        .collect::<Vec<_>>();

    debug!(rows = rows.len(), "computed imbalance table");
    ImbalanceTable { rows }
}

/// `(bid - prior_ask) / (bid + prior_ask)` along each bar's ladder, read in ascending price.
///
/// The lowest level of a bar has no predecessor and uses its own ask. Undefined ratios are
/// filled forward, then backward, within the bar. Results land back on the input rows.
pub fn computed_imbalances(ticks: &[LinkedTick]) -> Vec<Option<f64>> {
    let mut imbalances = vec![None; ticks.len()];

    let bars = ticks
        .iter()
        .enumerate()
        .into_group_map_by(|(_, linked)| linked.bar_index);

    for rows in bars.into_values() {
        let rows = rows
            .into_iter()
            .sorted_by(|(_, a), (_, b)| a.tick.price.total_cmp(&b.tick.price))
            .map(|(row, _)| row)
            .collect::<Vec<_>>();

        let mut values = rows
            .iter()
            .scan(None, |prior_ask: &mut Option<f64>, &row| {
                let tick = &ticks[row].tick;
                let prior = prior_ask.unwrap_or(tick.ask_size);
                *prior_ask = Some(tick.ask_size);
                Some(ratio(tick.bid_size - prior, tick.bid_size + prior))
            })
            .collect::<Vec<_>>();

        fill_forward_backward(&mut values);

        for (row, value) in rows.into_iter().zip(values) {
            imbalances[row] = value;
        }
    }

    imbalances
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    let value = numerator / denominator;
    value.is_finite().then_some(value)
}

/// Fill `None` from the previous defined value, then remaining leading `None` from the next.
pub fn fill_forward_backward(values: &mut [Option<f64>]) {
    let mut last = None;
    for value in values.iter_mut() {
        match value {
            Some(defined) => last = Some(*defined),
            None => *value = last,
        }
    }

    let mut next = None;
    for value in values.iter_mut().rev() {
        match value {
            Some(defined) => next = Some(*defined),
            None => *value = next,
        }
    }
}

/// Fixed-width ladder rows: bid right-aligned, ask left-aligned, each width 4, joined by two spaces.
pub fn ladder_text(bids: &[f64], asks: &[f64]) -> Vec<String> {
    bids.iter()
        .zip(asks)
        .map(|(bid, ask)| {
            format!(
                "{:>width$}  {:<width$}",
                bid.trunc() as i64,
                ask.trunc() as i64,
                width = LADDER_SIDE_WIDTH
            )
        })
        .collect()
}

impl ToFrame for ImbalanceTable {
    fn to_frame(&self) -> Result<Frame, ShapeError> {
        let rows = &self.rows;
        Frame::new()
            .with_column("timestamp", Column::times(rows.iter().map(|r| r.timestamp)))?
            .with_column("bid_size", Column::floats(rows.iter().map(|r| r.bid_size)))?
            .with_column("price", Column::floats(rows.iter().map(|r| r.price)))?
            .with_column("ask_size", Column::floats(rows.iter().map(|r| r.ask_size)))?
            .with_column("identifier", Column::texts(rows.iter().map(|r| r.bar_id.as_str())))?
            .with_column("order_key", Column::ints(rows.iter().map(|r| r.order_key.0)))?
            .with_column("total_size", Column::floats(rows.iter().map(|r| r.total_size)))?
            .with_column("display_text", Column::texts(rows.iter().map(|r| r.display_text.as_str())))?
            .with_column("imbalance", Column::Float(rows.iter().map(|r| r.imbalance).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tick;
    use chrono::TimeZone;

    fn linked(bar_index: usize, price: f64, bid_size: f64, ask_size: f64) -> LinkedTick {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 10, bar_index as u32, 0).unwrap();
        LinkedTick {
            bar_id: BarId::from(format!("bar-{bar_index}").as_str()),
            order_key: OrderKey(bar_index as i64),
            bar_index,
            tick: Tick::new(timestamp, price, bid_size, ask_size),
        }
    }

    #[test]
    fn test_ladder_text() {
        struct TestCase {
            bid: f64,
            ask: f64,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: single digit sizes
                bid: 10.0,
                ask: 5.0,
                expected: "  10  5   ",
            },
            TestCase {
                // TC1: fractional sizes are truncated
                bid: 8.9,
                ask: 12.2,
                expected: "   8  12  ",
            },
            TestCase {
                // TC2: wider than the field is not truncated
                bid: 12345.0,
                ask: 0.0,
                expected: "12345  0   ",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = ladder_text(&[test.bid], &[test.ask]);
            assert_eq!(actual, vec![test.expected.to_string()], "TC{} failed", index);
        }
    }

    #[test]
    fn test_computed_imbalances_use_prior_ask_within_bar() {
        let ticks = vec![
            linked(0, 100.0, 10.0, 5.0),
            linked(0, 100.25, 8.0, 12.0),
            linked(1, 100.5, 6.0, 3.0),
        ];

        let imbalances = computed_imbalances(&ticks);

        // (10 - 5) / (10 + 5)
        assert_eq!(imbalances[0], Some(5.0 / 15.0));
        // (8 - 5) / (8 + 5)
        assert_eq!(imbalances[1], Some(3.0 / 13.0));
        // First tick of bar 1 uses its own ask: (6 - 3) / (6 + 3)
        assert_eq!(imbalances[2], Some(3.0 / 9.0));

        for value in imbalances.into_iter().flatten() {
            assert!((-1.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_computed_imbalances_follow_price_order() {
        let ladder = [(100.0, 10.0, 5.0), (100.25, 8.0, 12.0), (100.5, 6.0, 2.0)];
        let ascending = ladder
            .iter()
            .map(|(price, bid, ask)| linked(0, *price, *bid, *ask))
            .collect::<Vec<_>>();
        let descending = ascending.iter().rev().cloned().collect::<Vec<_>>();

        let by_price = |ticks: &[LinkedTick]| {
            ticks
                .iter()
                .zip(computed_imbalances(ticks))
                .map(|(linked, imbalance)| (linked.tick.price.to_bits(), imbalance))
                .sorted_by_key(|(price, _)| *price)
                .collect::<Vec<_>>()
        };

        let ascending = by_price(&ascending);
        assert_eq!(ascending, by_price(&descending));
        // 100.25 reads the ask of 100.0: (8 - 5) / (8 + 5)
        assert_eq!(ascending[1].1, Some(3.0 / 13.0));
        // 100.5 reads the ask of 100.25: (6 - 12) / (6 + 12)
        assert_eq!(ascending[2].1, Some(-6.0 / 18.0));
    }

    #[test]
    fn test_computed_imbalances_fill_undefined_within_bar() {
        let ticks = vec![
            linked(0, 100.0, 0.0, 0.0),
            linked(0, 100.25, 4.0, 0.0),
            linked(0, 100.5, 0.0, 0.0),
            linked(1, 101.0, 0.0, 0.0),
        ];

        let imbalances = computed_imbalances(&ticks);

        // Row 0 is 0/0, back-filled from row 1: (4 - 0) / (4 + 0)
        assert_eq!(imbalances[0], Some(1.0));
        assert_eq!(imbalances[1], Some(1.0));
        // Row 2 is 0/0, forward-filled
        assert_eq!(imbalances[2], Some(1.0));
        // Bar 1 has nothing to fill from
        assert_eq!(imbalances[3], None);
    }

    #[test]
    fn test_compute_with_supplied_column() {
        let mut tick = linked(0, 100.0, 10.0, 5.0);
        tick.tick.imbalance = Some(0.42);

        let table = compute(&[tick], &ImbalanceSource::Column("imbalance".into()));

        assert_eq!(table.rows[0].imbalance, Some(0.42));
        assert_eq!(table.rows[0].total_size, 15.0);

        let frame = table.to_frame().unwrap();
        let names = frame.columns().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names.iter().filter(|name| **name == "imbalance").count(), 1);
    }

    #[test]
    fn test_fill_forward_backward() {
        let mut values = vec![None, Some(1.0), None, Some(-0.5), None];
        fill_forward_backward(&mut values);
        assert_eq!(
            values,
            vec![Some(1.0), Some(1.0), Some(1.0), Some(-0.5), Some(-0.5)]
        );
    }
}
