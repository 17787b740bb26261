//! Columnar table representation shared by ingestion and the output serializer.
//!
//! A [`Frame`] is an ordered map of column name to a typed [`Column`]. Input tables arrive as
//! frames, every derived table converts into one through [`ToFrame`], and the
//! [`ColumnarRecord`](crate::output::ColumnarRecord) stringifies a frame for the renderer.

use crate::error::ShapeError;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::str::FromStr;

/// Text written for a missing or undefined value.
pub const MISSING: &str = "nan";

/// Semantic type of a [`Column`], described with the renderer's dtype vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum DType {
    #[serde(rename = "float64")]
    Float64,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "datetime64[ns, UTC]")]
    DateTime,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Float64 => "float64",
            DType::Int64 => "int64",
            DType::Object => "object",
            DType::DateTime => "datetime64[ns, UTC]",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DType {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float64" => Ok(DType::Float64),
            "int64" => Ok(DType::Int64),
            "object" => Ok(DType::Object),
            "datetime64[ns, UTC]" => Ok(DType::DateTime),
            other => Err(ShapeError::UnknownDType(other.to_string())),
        }
    }
}

/// Typed column. `None` marks a missing or undefined value.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
    Time(Vec<Option<DateTime<Utc>>>),
}

impl Column {
    pub fn floats<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        Column::Float(values.into_iter().map(|value| (!value.is_nan()).then_some(value)).collect())
    }

    pub fn ints<I>(values: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        Column::Int(values.into_iter().map(Some).collect())
    }

    pub fn texts<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Column::Text(values.into_iter().map(|value| Some(value.into())).collect())
    }

    pub fn times<I>(values: I) -> Self
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        Column::Time(values.into_iter().map(Some).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Float(values) => values.len(),
            Column::Int(values) => values.len(),
            Column::Text(values) => values.len(),
            Column::Time(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Column::Float(_) => DType::Float64,
            Column::Int(_) => DType::Int64,
            Column::Text(_) => DType::Object,
            Column::Time(_) => DType::DateTime,
        }
    }

    /// Stringify every value, missing values becoming [`MISSING`].
    pub fn render(&self) -> Vec<String> {
        fn render_all<T>(values: &[Option<T>], render: impl Fn(&T) -> String) -> Vec<String> {
            values
                .iter()
                .map(|value| value.as_ref().map_or_else(|| MISSING.to_string(), &render))
                .collect()
        }

        match self {
            Column::Float(values) => render_all(values, |value| format_float(*value)),
            Column::Int(values) => render_all(values, i64::to_string),
            Column::Text(values) => render_all(values, String::clone),
            Column::Time(values) => render_all(values, format_time),
        }
    }

    /// Rebuild a typed column from rendered values and their [`DType`].
    ///
    /// Every cell equal to [`MISSING`] comes back as `None`, including an `object` cell whose
    /// text was literally `"nan"`.
    pub fn parse(column: &str, dtype: DType, values: &[String]) -> Result<Self, ShapeError> {
        fn parse_all<T>(
            column: &str,
            dtype: DType,
            values: &[String],
            parse: impl Fn(&str) -> Option<T>,
        ) -> Result<Vec<Option<T>>, ShapeError> {
            values
                .iter()
                .map(|value| {
                    if value == MISSING {
                        return Ok(None);
                    }
                    parse(value).map(Some).ok_or_else(|| ShapeError::Unparseable {
                        column: column.to_string(),
                        value: value.clone(),
                        dtype: dtype.as_str(),
                    })
                })
                .collect()
        }

        Ok(match dtype {
            DType::Float64 => Column::Float(parse_all(column, dtype, values, |value| {
                value.parse::<f64>().ok()
            })?),
            DType::Int64 => Column::Int(parse_all(column, dtype, values, |value| {
                value.parse::<i64>().ok()
            })?),
            DType::Object => Column::Text(parse_all(column, dtype, values, |value| {
                Some(value.to_string())
            })?),
            DType::DateTime => Column::Time(parse_all(column, dtype, values, |value| {
                DateTime::parse_from_rfc3339(value)
                    .ok()
                    .map(|time| time.with_timezone(&Utc))
            })?),
        })
    }

    fn type_name(&self) -> &'static str {
        match self {
            Column::Float(_) => "float",
            Column::Int(_) => "integer",
            Column::Text(_) => "text",
            Column::Time(_) => "timestamp",
        }
    }
}

/// Render a float the way the chart front end expects: integral values keep a trailing `.0`,
/// and magnitudes outside `[1e-4, 1e16)` use exponent form, eg/ `1e+20`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        MISSING.to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if value != 0.0 && !(1e-4..1e16).contains(&value.abs()) {
        exponent_form(value)
    } else if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Shortest mantissa with a signed exponent of at least two digits.
fn exponent_form(value: f64) -> String {
    let rendered = format!("{value:e}");
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => rendered,
    }
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Ordered collection of equal-length named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: IndexMap<String, Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append (or replace) a column, rejecting one whose length differs from the frame's.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<(), ShapeError> {
        let name = name.into();
        if let Some(expected) = self.columns.values().next().map(Column::len) {
            let replacing_only_column = self.columns.len() == 1 && self.columns.contains_key(&name);
            if column.len() != expected && !replacing_only_column {
                return Err(ShapeError::LengthMismatch {
                    column: name,
                    expected,
                    actual: column.len(),
                });
            }
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Builder form of [`Frame::insert`].
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self, ShapeError> {
        self.insert(name, column)?;
        Ok(self)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, Column::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(name, column)| (name.as_str(), column))
    }

    fn required(&self, table: &'static str, name: &str) -> Result<&Column, ShapeError> {
        self.columns.get(name).ok_or_else(|| ShapeError::MissingColumn {
            table,
            column: name.to_string(),
        })
    }

    /// Numeric column with no missing values. Integer columns are widened.
    pub fn floats(&self, table: &'static str, name: &str) -> Result<Vec<f64>, ShapeError> {
        self.optional_floats(table, name)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                value.ok_or_else(|| ShapeError::MissingValue {
                    table,
                    column: name.to_string(),
                    row,
                })
            })
            .collect()
    }

    /// Numeric column that may contain missing values.
    pub fn optional_floats(
        &self,
        table: &'static str,
        name: &str,
    ) -> Result<Vec<Option<f64>>, ShapeError> {
        match self.required(table, name)? {
            Column::Float(values) => Ok(values.clone()),
            Column::Int(values) => Ok(values.iter().map(|value| value.map(|v| v as f64)).collect()),
            other => Err(ShapeError::ColumnType {
                table,
                column: name.to_string(),
                expected: "float",
                found: other.type_name(),
            }),
        }
    }

    pub fn ints(&self, table: &'static str, name: &str) -> Result<Vec<i64>, ShapeError> {
        match self.required(table, name)? {
            Column::Int(values) => values
                .iter()
                .enumerate()
                .map(|(row, value)| {
                    value.ok_or_else(|| ShapeError::MissingValue {
                        table,
                        column: name.to_string(),
                        row,
                    })
                })
                .collect(),
            other => Err(ShapeError::ColumnType {
                table,
                column: name.to_string(),
                expected: "integer",
                found: other.type_name(),
            }),
        }
    }

    pub fn timestamps(
        &self,
        table: &'static str,
        name: &str,
    ) -> Result<Vec<DateTime<Utc>>, ShapeError> {
        match self.required(table, name)? {
            Column::Time(values) => values
                .iter()
                .enumerate()
                .map(|(row, value)| {
                    value.ok_or_else(|| ShapeError::MissingValue {
                        table,
                        column: name.to_string(),
                        row,
                    })
                })
                .collect(),
            other => Err(ShapeError::ColumnType {
                table,
                column: name.to_string(),
                expected: "timestamp",
                found: other.type_name(),
            }),
        }
    }

    /// Identifier-like column: text or integer values, none missing.
    pub fn keys(&self, table: &'static str, name: &str) -> Result<Vec<SmolStr>, ShapeError> {
        let missing = |row| ShapeError::MissingValue {
            table,
            column: name.to_string(),
            row,
        };

        match self.required(table, name)? {
            Column::Text(values) => values
                .iter()
                .enumerate()
                .map(|(row, value)| value.as_deref().map(SmolStr::new).ok_or_else(|| missing(row)))
                .collect(),
            Column::Int(values) => values
                .iter()
                .enumerate()
                .map(|(row, value)| {
                    value
                        .map(|value| SmolStr::new(value.to_string()))
                        .ok_or_else(|| missing(row))
                })
                .collect(),
            other => Err(ShapeError::ColumnType {
                table,
                column: name.to_string(),
                expected: "text or integer",
                found: other.type_name(),
            }),
        }
    }
}

/// Conversion of a derived table into its columnar [`Frame`].
pub trait ToFrame {
    fn to_frame(&self) -> Result<Frame, ShapeError>;
}
