//! Bar Linker: attach a unique [`BarId`] and an [`OrderKey`] to every bar and tick.
//!
//! Ticks are joined to bars explicitly, never by row position:
//! - caller-supplied identifiers are resolved through a hash index of bar identifiers,
//! - synthesized identifiers are broadcast to the ticks inside each bar's time bucket.
//!
//! Either way a tick that resolves to no bar is an orphan and fails the run.

use crate::{
    config::{ChartConfig, IdentifierSource, OrderSource},
    error::ConfigError,
    model::{Bar, BarId, Direction, OrderKey, Tick},
};
use chrono::{DateTime, TimeDelta, Utc};
use fnv::FnvHashMap;
use tracing::debug;

/// [`Bar`] with its resolved identity.
#[derive(Clone, PartialEq, Debug)]
pub struct LinkedBar {
    pub bar_id: BarId,
    pub order_key: OrderKey,
    pub bar: Bar,
}

impl LinkedBar {
    pub fn direction(&self) -> Direction {
        self.bar.direction()
    }
}

/// [`Tick`] attributed to exactly one [`LinkedBar`].
#[derive(Clone, PartialEq, Debug)]
pub struct LinkedTick {
    pub bar_id: BarId,
    pub order_key: OrderKey,
    /// Row of the owning bar in [`LinkedTables::bars`]
    pub bar_index: usize,
    pub tick: Tick,
}

/// Bar and tick tables after linking, both in their input row order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct LinkedTables {
    pub bars: Vec<LinkedBar>,
    pub ticks: Vec<LinkedTick>,
}

/// Assign bar identity and attribute every tick to its bar.
pub fn link(ticks: &[Tick], bars: &[Bar], config: &ChartConfig) -> Result<LinkedTables, ConfigError> {
    let order_keys = order_keys(bars, &config.order)?;

    let (bar_ids, bar_indices) = match &config.identifier {
        IdentifierSource::Synthesized => {
            let bar_ids = bars.iter().map(|_| BarId::random()).collect::<Vec<_>>();
            let bar_indices = bucket_by_time(ticks, bars, config.bar_duration)?;
            (bar_ids, bar_indices)
        }
        IdentifierSource::Column(_) => {
            let bar_ids = supplied_bar_ids(bars)?;
            let bar_indices = join_by_identifier(ticks, &bar_ids)?;
            (bar_ids, bar_indices)
        }
    };

    let bars = bars
        .iter()
        .zip(bar_ids)
        .zip(order_keys)
        .map(|((bar, bar_id), order_key)| LinkedBar {
            bar_id,
            order_key,
            bar: bar.clone(),
        })
        .collect::<Vec<_>>();

    ensure_unique_order(&bars)?;

    let ticks = ticks
        .iter()
        .zip(bar_indices)
        .map(|(tick, bar_index)| LinkedTick {
            bar_id: bars[bar_index].bar_id.clone(),
            order_key: bars[bar_index].order_key,
            bar_index,
            tick: tick.clone(),
        })
        .collect::<Vec<_>>();

    debug!(
        bars = bars.len(),
        ticks = ticks.len(),
        "linked ticks to bars"
    );

    Ok(LinkedTables { bars, ticks })
}

fn order_keys(bars: &[Bar], source: &OrderSource) -> Result<Vec<OrderKey>, ConfigError> {
    match source {
        OrderSource::Sequence => Ok((0..bars.len() as i64).map(OrderKey).collect()),
        OrderSource::Column(_) => bars
            .iter()
            .map(|bar| {
                bar.order_key.ok_or(ConfigError::Invalid {
                    field: "order_key",
                    reason: "order column configured but a bar has no order key",
                })
            })
            .collect(),
    }
}

fn supplied_bar_ids(bars: &[Bar]) -> Result<Vec<BarId>, ConfigError> {
    bars.iter()
        .map(|bar| {
            bar.identifier.clone().ok_or(ConfigError::Invalid {
                field: "identifier",
                reason: "identifier column configured but a bar has no identifier",
            })
        })
        .collect()
}

/// Resolve each tick's identifier through a hash index of unique bar identifiers.
fn join_by_identifier(ticks: &[Tick], bar_ids: &[BarId]) -> Result<Vec<usize>, ConfigError> {
    let mut index = FnvHashMap::with_capacity_and_hasher(bar_ids.len(), Default::default());
    for (bar_index, bar_id) in bar_ids.iter().enumerate() {
        if index.insert(bar_id, bar_index).is_some() {
            return Err(ConfigError::DuplicateIdentifier(bar_id.clone()));
        }
    }

    ticks
        .iter()
        .enumerate()
        .map(|(row, tick)| match &tick.identifier {
            None => Err(ConfigError::OrphanTick {
                row,
                timestamp: tick.timestamp,
            }),
            Some(identifier) => index.get(identifier).copied().ok_or_else(|| {
                ConfigError::UnknownIdentifier {
                    row,
                    identifier: identifier.clone(),
                }
            }),
        })
        .collect()
}

/// Attribute each tick to the bar whose bucket `[start, next start)` holds its timestamp.
///
/// A configured `bar_duration` additionally closes each bucket at `start + bar_duration`.
fn bucket_by_time(
    ticks: &[Tick],
    bars: &[Bar],
    bar_duration: Option<TimeDelta>,
) -> Result<Vec<usize>, ConfigError> {
    let mut starts = bars
        .iter()
        .enumerate()
        .map(|(bar_index, bar)| (bar.timestamp, bar_index))
        .collect::<Vec<(DateTime<Utc>, usize)>>();
    starts.sort();

    if let Some(pair) = starts.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(ConfigError::AmbiguousBucket {
            first: pair[0].1,
            second: pair[1].1,
            timestamp: pair[0].0,
        });
    }

    ticks
        .iter()
        .enumerate()
        .map(|(row, tick)| {
            let orphan = ConfigError::OrphanTick {
                row,
                timestamp: tick.timestamp,
            };

            let after = starts.partition_point(|(start, _)| *start <= tick.timestamp);
            let (start, bar_index) = match after.checked_sub(1) {
                Some(position) => starts[position],
                None => return Err(orphan),
            };

            match bar_duration {
                Some(duration) if tick.timestamp >= start + duration => Err(orphan),
                _ => Ok(bar_index),
            }
        })
        .collect()
}

/// Two bars sharing `(timestamp, order_key)` would sort ambiguously into candle segments.
fn ensure_unique_order(bars: &[LinkedBar]) -> Result<(), ConfigError> {
    let mut seen = FnvHashMap::with_capacity_and_hasher(bars.len(), Default::default());
    for bar in bars {
        if let Some(first) = seen.insert((bar.bar.timestamp, bar.order_key), &bar.bar_id) {
            return Err(ConfigError::AmbiguousOrderKey {
                first: first.clone(),
                second: bar.bar_id.clone(),
                timestamp: bar.bar.timestamp,
                order_key: bar.order_key.0,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn time(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 10, minute, 0).unwrap()
    }

    fn bar(minute: u32) -> Bar {
        Bar::new(time(minute), 100.0, 101.0, 99.0, 100.5)
    }

    fn tick(minute: u32) -> Tick {
        Tick::new(time(minute), 100.0, 1.0, 1.0)
    }

    #[test]
    fn test_link_synthesized_buckets() {
        let bars = vec![bar(0), bar(5), bar(10)];
        let ticks = vec![tick(0), tick(4), tick(5), tick(12), tick(59)];

        let linked = link(&ticks, &bars, &ChartConfig::default()).unwrap();

        let bar_indices = linked.ticks.iter().map(|t| t.bar_index).collect::<Vec<_>>();
        assert_eq!(bar_indices, vec![0, 0, 1, 2, 2]);

        let order_keys = linked.bars.iter().map(|b| b.order_key.0).collect::<Vec<_>>();
        assert_eq!(order_keys, vec![0, 1, 2]);

        // Referential integrity: every tick's bar_id names a linked bar
        for tick in &linked.ticks {
            assert_eq!(tick.bar_id, linked.bars[tick.bar_index].bar_id);
            assert_eq!(tick.order_key, linked.bars[tick.bar_index].order_key);
        }

        // Synthesized identifiers are unique
        assert_ne!(linked.bars[0].bar_id, linked.bars[1].bar_id);
        assert_ne!(linked.bars[1].bar_id, linked.bars[2].bar_id);
    }

    #[test]
    fn test_link_synthesized_unsorted_bars() {
        let bars = vec![bar(10), bar(0)];
        let ticks = vec![tick(1), tick(11)];

        let linked = link(&ticks, &bars, &ChartConfig::default()).unwrap();
        let bar_indices = linked.ticks.iter().map(|t| t.bar_index).collect::<Vec<_>>();

        assert_eq!(bar_indices, vec![1, 0]);
    }

    #[test]
    fn test_link_errors() {
        struct TestCase {
            ticks: Vec<Tick>,
            bars: Vec<Bar>,
            config: ChartConfig,
            expected: ConfigError,
        }

        let identified = ChartConfig::default().with_identifier_column("identifier");

        let tests = vec![
            TestCase {
                // TC0: tick before the first bar bucket
                ticks: vec![tick(0)],
                bars: vec![bar(1)],
                config: ChartConfig::default(),
                expected: ConfigError::OrphanTick {
                    row: 0,
                    timestamp: time(0),
                },
            },
            TestCase {
                // TC1: tick beyond a bounded last bucket
                ticks: vec![tick(1), tick(7)],
                bars: vec![bar(1)],
                config: ChartConfig::default().with_bar_duration(TimeDelta::minutes(5)),
                expected: ConfigError::OrphanTick {
                    row: 1,
                    timestamp: time(7),
                },
            },
            TestCase {
                // TC2: two bars in the same time bucket
                ticks: vec![tick(1)],
                bars: vec![bar(1), bar(1)],
                config: ChartConfig::default(),
                expected: ConfigError::AmbiguousBucket {
                    first: 0,
                    second: 1,
                    timestamp: time(1),
                },
            },
            TestCase {
                // TC3: duplicate supplied identifier
                ticks: vec![tick(1).with_identifier("a")],
                bars: vec![bar(1).with_identifier("a"), bar(2).with_identifier("a")],
                config: identified.clone(),
                expected: ConfigError::DuplicateIdentifier(BarId::from("a")),
            },
            TestCase {
                // TC4: tick referencing a missing bar
                ticks: vec![tick(1).with_identifier("a"), tick(1).with_identifier("z")],
                bars: vec![bar(1).with_identifier("a")],
                config: identified.clone(),
                expected: ConfigError::UnknownIdentifier {
                    row: 1,
                    identifier: BarId::from("z"),
                },
            },
            TestCase {
                // TC5: supplied order keys colliding at the same timestamp
                ticks: vec![tick(1).with_identifier("a")],
                bars: vec![
                    bar(1).with_identifier("a").with_order_key(3),
                    bar(1).with_identifier("b").with_order_key(3),
                ],
                config: identified.clone().with_order_column("sequence"),
                expected: ConfigError::AmbiguousOrderKey {
                    first: BarId::from("a"),
                    second: BarId::from("b"),
                    timestamp: time(1),
                    order_key: 3,
                },
            },
            TestCase {
                // TC6: tick exactly at start + bar_duration is past the half-open bucket
                ticks: vec![tick(5), tick(6)],
                bars: vec![bar(1)],
                config: ChartConfig::default().with_bar_duration(TimeDelta::minutes(5)),
                expected: ConfigError::OrphanTick {
                    row: 1,
                    timestamp: time(6),
                },
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = link(&test.ticks, &test.bars, &test.config).unwrap_err();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_link_supplied_identifiers_share_timestamp() {
        let bars = vec![
            bar(1).with_identifier("a"),
            bar(1).with_identifier("b"),
        ];
        let ticks = vec![
            tick(1).with_identifier("b"),
            tick(1).with_identifier("a"),
        ];
        let config = ChartConfig::default().with_identifier_column("identifier");

        let linked = link(&ticks, &bars, &config).unwrap();

        assert_eq!(linked.ticks[0].bar_index, 1);
        assert_eq!(linked.ticks[0].order_key, OrderKey(1));
        assert_eq!(linked.ticks[1].bar_index, 0);
        assert_eq!(linked.ticks[1].order_key, OrderKey(0));
    }
}
