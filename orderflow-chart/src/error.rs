use crate::{model::BarId, pipeline::Stage};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// All errors generated in `orderflow-chart`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChartError {
    #[error("ConfigurationError: {0}")]
    Configuration(#[from] ConfigError),

    #[error("DataShapeError: {0}")]
    DataShape(#[from] ShapeError),

    #[error("ProcessingError: stage {stage} failed: {source}")]
    Processing {
        stage: Stage,
        source: Box<ChartError>,
    },
}

impl ChartError {
    /// Wrap an error raised inside a pipeline [`Stage`].
    pub fn processing<E>(stage: Stage, error: E) -> Self
    where
        E: Into<ChartError>,
    {
        Self::Processing {
            stage,
            source: Box::new(error.into()),
        }
    }

    /// The pipeline [`Stage`] that failed, if the error was raised during processing.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ChartError::Processing { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Underlying cause with every [`ChartError::Processing`] layer removed.
    pub fn root(&self) -> &ChartError {
        match self {
            ChartError::Processing { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), ChartError::Configuration(_))
    }

    pub fn is_data_shape(&self) -> bool {
        matches!(self.root(), ChartError::DataShape(_))
    }
}

/// Invalid configuration, or inputs that cannot be linked under the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("granularity must be strictly positive, found {0}")]
    NonPositiveGranularity(f64),

    #[error("granularity is undefined: tick table needs two distinct finite prices")]
    UndefinedGranularity,

    #[error("tick row {row} at {timestamp} is not covered by any bar bucket")]
    OrphanTick { row: usize, timestamp: DateTime<Utc> },

    #[error("tick row {row} references unknown bar identifier {identifier}")]
    UnknownIdentifier { row: usize, identifier: BarId },

    #[error("bar identifier {0} is not unique")]
    DuplicateIdentifier(BarId),

    #[error("bar rows {first} and {second} share timestamp {timestamp}, ticks cannot be bucketed by time")]
    AmbiguousBucket {
        first: usize,
        second: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("bars {first} and {second} share timestamp {timestamp} and order key {order_key}")]
    AmbiguousOrderKey {
        first: BarId,
        second: BarId,
        timestamp: DateTime<Utc>,
        order_key: i64,
    },

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Input or intermediate table does not have the shape a stage requires.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("{table} table is missing required column `{column}`")]
    MissingColumn { table: &'static str, column: String },

    #[error("column `{column}` has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("{table} table column `{column}` has a missing value at row {row}")]
    MissingValue {
        table: &'static str,
        column: String,
        row: usize,
    },

    #[error("{table} table column `{column}` has negative value {value} at row {row}")]
    NegativeValue {
        table: &'static str,
        column: String,
        row: usize,
        value: f64,
    },

    #[error("{table} table column `{column}` holds {found} values, expected {expected}")]
    ColumnType {
        table: &'static str,
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("bar row {row} violates low <= open, close <= high")]
    InvalidBar { row: usize },

    #[error("candle geometry requires two endpoints per bar, found {0} extent points")]
    UnpairedExtent(usize),

    #[error("sorted extent pair mixes bars {first} and {second}")]
    InterleavedExtent { first: BarId, second: BarId },

    #[error("unknown column type descriptor `{0}`")]
    UnknownDType(String),

    #[error("column `{column}` value `{value}` is not a valid {dtype}")]
    Unparseable {
        column: String,
        value: String,
        dtype: &'static str,
    },
}
