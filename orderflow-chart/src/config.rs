use crate::error::ConfigError;
use chrono::TimeDelta;
use smol_str::SmolStr;

/// Number of most recent bars summed into the cumulative delta.
pub const DEFAULT_CUMULATIVE_WINDOW: usize = 10;

/// Number of glyph characters drawn for a level with relative weight 1.
pub const DEFAULT_GLYPH_WIDTH: usize = 10;

/// Leading spaces pushing the volume profile glyphs right of the ladder text.
pub const DEFAULT_GLYPH_INDENT: usize = 20;

/// Price levels initially visible below the last bar high.
pub const DEFAULT_VISIBLE_LEVELS: u32 = 48;

/// Bars initially visible at the right edge of the chart.
pub const DEFAULT_VISIBLE_BARS: usize = 9;

/// Where each bar's identifier comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentifierSource {
    /// Fresh identifier per bar, ticks attributed by timestamp bucket.
    #[default]
    Synthesized,
    /// Identifier column present in both the tick and the bar table.
    Column(SmolStr),
}

impl IdentifierSource {
    pub fn column(&self) -> Option<&SmolStr> {
        match self {
            IdentifierSource::Synthesized => None,
            IdentifierSource::Column(column) => Some(column),
        }
    }
}

/// Where each bar's order key comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OrderSource {
    /// Monotonic sequence number in bar ingestion order.
    #[default]
    Sequence,
    /// Integer column of the bar table.
    Column(SmolStr),
}

impl OrderSource {
    pub fn column(&self) -> Option<&SmolStr> {
        match self {
            OrderSource::Sequence => None,
            OrderSource::Column(column) => Some(column),
        }
    }
}

/// Where each tick's imbalance comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImbalanceSource {
    /// Derived from bid size against the previous level's ask size.
    #[default]
    Computed,
    /// Column of the tick table, used verbatim.
    Column(SmolStr),
}

impl ImbalanceSource {
    pub fn column(&self) -> Option<&SmolStr> {
        match self {
            ImbalanceSource::Computed => None,
            ImbalanceSource::Column(column) => Some(column),
        }
    }
}

/// Orderflow chart processing configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartConfig {
    pub identifier: IdentifierSource,
    pub order: OrderSource,
    pub imbalance: ImbalanceSource,
    /// Rolling window (in bars) of the cumulative delta
    pub cumulative_window: usize,
    pub glyph_width: usize,
    pub glyph_indent: usize,
    /// Upper bound on a synthesized bar bucket. `None` leaves the last bucket open-ended.
    pub bar_duration: Option<TimeDelta>,
    pub visible_levels: u32,
    pub visible_bars: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            identifier: IdentifierSource::default(),
            order: OrderSource::default(),
            imbalance: ImbalanceSource::default(),
            cumulative_window: DEFAULT_CUMULATIVE_WINDOW,
            glyph_width: DEFAULT_GLYPH_WIDTH,
            glyph_indent: DEFAULT_GLYPH_INDENT,
            bar_duration: None,
            visible_levels: DEFAULT_VISIBLE_LEVELS,
            visible_bars: DEFAULT_VISIBLE_BARS,
        }
    }
}

impl ChartConfig {
    /// Link ticks to bars through a shared identifier column.
    pub fn with_identifier_column(mut self, column: impl Into<SmolStr>) -> Self {
        self.identifier = IdentifierSource::Column(column.into());
        self
    }

    /// Take bar order keys from an integer column of the bar table.
    pub fn with_order_column(mut self, column: impl Into<SmolStr>) -> Self {
        self.order = OrderSource::Column(column.into());
        self
    }

    /// Use an externally supplied imbalance column of the tick table.
    pub fn with_imbalance_column(mut self, column: impl Into<SmolStr>) -> Self {
        self.imbalance = ImbalanceSource::Column(column.into());
        self
    }

    pub fn with_cumulative_window(mut self, window: usize) -> Self {
        self.cumulative_window = window;
        self
    }

    pub fn with_glyph_width(mut self, width: usize) -> Self {
        self.glyph_width = width;
        self
    }

    pub fn with_glyph_indent(mut self, indent: usize) -> Self {
        self.glyph_indent = indent;
        self
    }

    /// Close every synthesized bar bucket at `timestamp + duration`.
    pub fn with_bar_duration(mut self, duration: TimeDelta) -> Self {
        self.bar_duration = Some(duration);
        self
    }

    pub fn with_viewport(mut self, visible_levels: u32, visible_bars: usize) -> Self {
        self.visible_levels = visible_levels;
        self.visible_bars = visible_bars;
        self
    }

    /// Reject values no run could process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cumulative_window == 0 {
            return Err(ConfigError::Invalid {
                field: "cumulative_window",
                reason: "must be at least one bar",
            });
        }

        if self.glyph_width == 0 {
            return Err(ConfigError::Invalid {
                field: "glyph_width",
                reason: "must be at least one character",
            });
        }

        if let Some(duration) = self.bar_duration {
            if duration <= TimeDelta::zero() {
                return Err(ConfigError::Invalid {
                    field: "bar_duration",
                    reason: "must be strictly positive",
                });
            }
        }

        let columns = [
            self.identifier.column(),
            self.order.column(),
            self.imbalance.column(),
        ];
        if columns.into_iter().flatten().any(SmolStr::is_empty) {
            return Err(ConfigError::Invalid {
                field: "column",
                reason: "column names must not be empty",
            });
        }

        Ok(())
    }
}
