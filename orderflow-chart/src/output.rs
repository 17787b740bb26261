//! Output Serializer: transport-neutral columnar records consumed by the chart renderer.

use crate::{
    error::ShapeError,
    frame::{Column, DType, Frame, ToFrame},
    link::LinkedBar,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One table as `{column: [text, ...], ..., "dtypes": {column: descriptor}}`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ColumnarRecord {
    #[serde(flatten)]
    pub columns: IndexMap<String, Vec<String>>,
    pub dtypes: IndexMap<String, DType>,
}

impl ColumnarRecord {
    /// Stringify every column of `frame`, keeping column and row order.
    pub fn from_frame(frame: &Frame) -> Self {
        let (columns, dtypes) = frame
            .columns()
            .map(|(name, column)| {
                (
                    (name.to_string(), column.render()),
                    (name.to_string(), column.dtype()),
                )
            })
            .unzip();

        Self { columns, dtypes }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.values().next().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.dtypes.get(name).copied()
    }

    /// Parse a rendered column back into a typed [`Column`] using its recorded dtype.
    ///
    /// Rendered `"nan"` is always read as missing, so an `object` cell holding the text `nan`
    /// does not survive the round trip.
    pub fn parse_column(&self, name: &str) -> Result<Column, ShapeError> {
        let missing = || ShapeError::MissingColumn {
            table: "record",
            column: name.to_string(),
        };

        let values = self.columns.get(name).ok_or_else(missing)?;
        let dtype = self.dtype(name).ok_or_else(missing)?;
        Column::parse(name, dtype, values)
    }

    /// Rebuild the whole typed [`Frame`].
    pub fn to_frame(&self) -> Result<Frame, ShapeError> {
        self.columns.keys().try_fold(Frame::new(), |frame, name| {
            frame.with_column(name.as_str(), self.parse_column(name)?)
        })
    }
}

/// The eight tables handed to the renderer.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ChartOutput {
    pub orderflow: ColumnarRecord,
    pub labels: ColumnarRecord,
    pub green_hl: ColumnarRecord,
    pub red_hl: ColumnarRecord,
    pub green_oc: ColumnarRecord,
    pub red_oc: ColumnarRecord,
    pub orderflow2: ColumnarRecord,
    pub ohlc: ColumnarRecord,
}

impl ChartOutput {
    pub const TABLES: [&'static str; 8] = [
        "orderflow",
        "labels",
        "green_hl",
        "red_hl",
        "green_oc",
        "red_oc",
        "orderflow2",
        "ohlc",
    ];

    /// Every table with its name, in output order.
    pub fn tables(&self) -> [(&'static str, &ColumnarRecord); 8] {
        [
            ("orderflow", &self.orderflow),
            ("labels", &self.labels),
            ("green_hl", &self.green_hl),
            ("red_hl", &self.red_hl),
            ("green_oc", &self.green_oc),
            ("red_oc", &self.red_oc),
            ("orderflow2", &self.orderflow2),
            ("ohlc", &self.ohlc),
        ]
    }

    pub fn get(&self, name: &str) -> Option<&ColumnarRecord> {
        self.tables()
            .into_iter()
            .find_map(|(table, record)| (table == name).then_some(record))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// The `ohlc` table: linked bars as ingested.
impl ToFrame for [LinkedBar] {
    fn to_frame(&self) -> Result<Frame, ShapeError> {
        Frame::new()
            .with_column("timestamp", Column::times(self.iter().map(|b| b.bar.timestamp)))?
            .with_column("open", Column::floats(self.iter().map(|b| b.bar.open)))?
            .with_column("high", Column::floats(self.iter().map(|b| b.bar.high)))?
            .with_column("low", Column::floats(self.iter().map(|b| b.bar.low)))?
            .with_column("close", Column::floats(self.iter().map(|b| b.bar.close)))?
            .with_column("identifier", Column::texts(self.iter().map(|b| b.bar_id.as_str())))?
            .with_column("order_key", Column::ints(self.iter().map(|b| b.order_key.0)))
    }
}
