//! Input rows: order-book [`Tick`]s observed per price level, and the OHLC [`Bar`]s they belong to.

use crate::{
    config::{ChartConfig, IdentifierSource, ImbalanceSource, OrderSource},
    error::{ConfigError, ShapeError},
    frame::Frame,
};
use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

pub const TICK_TABLE: &str = "tick";
pub const BAR_TABLE: &str = "bar";

/// Unique key linking a [`Bar`] to its [`Tick`]s.
#[derive(
    Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From, Deserialize, Serialize,
)]
pub struct BarId(pub SmolStr);

impl BarId {
    /// Fresh random identifier.
    pub fn random() -> Self {
        Self(SmolStr::new(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for BarId {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}

/// Tie-breaking ordinal of bars sharing a timestamp. Not a count.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Display, From, Deserialize, Serialize,
)]
pub struct OrderKey(pub i64);

/// Candle direction of a bar.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub enum Direction {
    /// close >= open
    Green,
    /// close < open
    Red,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Green => "green",
            Direction::Red => "red",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One price-level observation within a bar.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    /// Caller-supplied bar identifier
    pub identifier: Option<BarId>,
    /// Caller-supplied imbalance
    pub imbalance: Option<f64>,
}

impl Tick {
    pub fn new(timestamp: DateTime<Utc>, price: f64, bid_size: f64, ask_size: f64) -> Self {
        Self {
            timestamp,
            price,
            bid_size,
            ask_size,
            identifier: None,
            imbalance: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<BarId>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_imbalance(mut self, imbalance: f64) -> Self {
        self.imbalance = Some(imbalance);
        self
    }

    pub fn total_size(&self) -> f64 {
        self.bid_size + self.ask_size
    }
}

/// Aggregated OHLC interval.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Caller-supplied bar identifier
    pub identifier: Option<BarId>,
    /// Caller-supplied order key
    pub order_key: Option<OrderKey>,
}

impl Bar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            identifier: None,
            order_key: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<BarId>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_order_key(mut self, order_key: i64) -> Self {
        self.order_key = Some(OrderKey(order_key));
        self
    }

    pub fn direction(&self) -> Direction {
        if self.close >= self.open {
            Direction::Green
        } else {
            Direction::Red
        }
    }

    /// `low <= open, close <= high`
    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }
}

/// Fixed price increment between adjacent price levels.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Display, Serialize)]
pub struct Granularity(f64);

impl Granularity {
    /// Absolute difference between the first two distinct prices of the tick table.
    pub fn from_ticks(ticks: &[Tick]) -> Result<Self, ConfigError> {
        let mut prices = ticks.iter().map(|tick| tick.price);
        let first = prices.next().ok_or(ConfigError::UndefinedGranularity)?;
        let second = prices.find(|price| *price != first);

        match second {
            None => Err(ConfigError::NonPositiveGranularity(0.0)),
            Some(second) => {
                let step = (second - first).abs();
                if !step.is_finite() {
                    Err(ConfigError::UndefinedGranularity)
                } else if step <= 0.0 {
                    Err(ConfigError::NonPositiveGranularity(step))
                } else {
                    Ok(Self(step))
                }
            }
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Read the tick table, honouring the configured identifier and imbalance columns.
pub fn ticks_from_frame(frame: &Frame, config: &ChartConfig) -> Result<Vec<Tick>, ShapeError> {
    let timestamps = frame.timestamps(TICK_TABLE, "timestamp")?;
    let prices = frame.floats(TICK_TABLE, "price")?;
    let bid_sizes = non_negative(TICK_TABLE, "bid_size", frame.floats(TICK_TABLE, "bid_size")?)?;
    let ask_sizes = non_negative(TICK_TABLE, "ask_size", frame.floats(TICK_TABLE, "ask_size")?)?;

    let identifiers = match &config.identifier {
        IdentifierSource::Synthesized => None,
        IdentifierSource::Column(column) => Some(frame.keys(TICK_TABLE, column)?),
    };
    let imbalances = match &config.imbalance {
        ImbalanceSource::Computed => None,
        ImbalanceSource::Column(column) => Some(frame.optional_floats(TICK_TABLE, column)?),
    };

    Ok(timestamps
        .into_iter()
        .zip(prices)
        .zip(bid_sizes.into_iter().zip(ask_sizes))
        .enumerate()
        .map(|(row, ((timestamp, price), (bid_size, ask_size)))| Tick {
            timestamp,
            price,
            bid_size,
            ask_size,
            identifier: identifiers.as_ref().map(|ids| BarId(ids[row].clone())),
            imbalance: imbalances.as_ref().and_then(|values| values[row]),
        })
        .collect())
}

/// Read the bar table, honouring the configured identifier and order columns.
pub fn bars_from_frame(frame: &Frame, config: &ChartConfig) -> Result<Vec<Bar>, ShapeError> {
    let timestamps = frame.timestamps(BAR_TABLE, "timestamp")?;
    let opens = frame.floats(BAR_TABLE, "open")?;
    let highs = frame.floats(BAR_TABLE, "high")?;
    let lows = frame.floats(BAR_TABLE, "low")?;
    let closes = frame.floats(BAR_TABLE, "close")?;

    let identifiers = match &config.identifier {
        IdentifierSource::Synthesized => None,
        IdentifierSource::Column(column) => Some(frame.keys(BAR_TABLE, column)?),
    };
    let order_keys = match &config.order {
        OrderSource::Sequence => None,
        OrderSource::Column(column) => Some(frame.ints(BAR_TABLE, column)?),
    };

    Ok(timestamps
        .into_iter()
        .zip(opens.into_iter().zip(highs))
        .zip(lows.into_iter().zip(closes))
        .enumerate()
        .map(|(row, ((timestamp, (open, high)), (low, close)))| Bar {
            timestamp,
            open,
            high,
            low,
            close,
            identifier: identifiers.as_ref().map(|ids| BarId(ids[row].clone())),
            order_key: order_keys.as_ref().map(|keys| OrderKey(keys[row])),
        })
        .collect())
}

/// Validate every bar satisfies the OHLC ordering invariant.
pub fn validate_bars(bars: &[Bar]) -> Result<(), ShapeError> {
    match bars.iter().position(|bar| !bar.is_consistent()) {
        Some(row) => Err(ShapeError::InvalidBar { row }),
        None => Ok(()),
    }
}

/// Validate no tick carries a negative bid or ask size.
pub fn validate_ticks(ticks: &[Tick]) -> Result<(), ShapeError> {
    ticks
        .iter()
        .enumerate()
        .flat_map(|(row, tick)| [(row, "bid_size", tick.bid_size), (row, "ask_size", tick.ask_size)])
        .find(|(_, _, value)| *value < 0.0)
        .map_or(Ok(()), |(row, column, value)| {
            Err(ShapeError::NegativeValue {
                table: TICK_TABLE,
                column: column.to_string(),
                row,
                value,
            })
        })
}

fn non_negative(
    table: &'static str,
    column: &str,
    values: Vec<f64>,
) -> Result<Vec<f64>, ShapeError> {
    match values.iter().position(|value| *value < 0.0) {
        Some(row) => Err(ShapeError::NegativeValue {
            table,
            column: column.to_string(),
            row,
            value: values[row],
        }),
        None => Ok(values),
    }
}
