//! Candle Geometry Builder: gapped polylines drawing each bar's high-low and open-close extents.
//!
//! Every bar contributes exactly three points, `[endpoint, endpoint, gap]`. The renderer draws
//! the whole group as one line, so the gap (a point without a price) is what keeps neighbouring
//! bars from being joined.

use crate::{
    error::ShapeError,
    frame::{Column, Frame, ToFrame},
    link::LinkedBar,
    model::{BarId, Direction, OrderKey},
};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use tracing::debug;

/// Pair of bar values a segment connects.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Extent {
    HighLow,
    OpenClose,
}

impl Extent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Extent::HighLow => "hl",
            Extent::OpenClose => "oc",
        }
    }

    /// Both endpoint prices of `bar`, in merge order (low before high, open before close).
    fn endpoints(&self, bar: &LinkedBar) -> [f64; 2] {
        match self {
            Extent::HighLow => [bar.bar.low, bar.bar.high],
            Extent::OpenClose => [bar.bar.open, bar.bar.close],
        }
    }
}

/// Extent value of one bar, tagged with the bar's identity.
#[derive(Clone, PartialEq, Debug, Constructor)]
pub struct ExtentPoint {
    pub bar_id: BarId,
    pub order_key: OrderKey,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Point of a candle polyline.
#[derive(Clone, PartialEq, Debug)]
pub enum CandlePoint {
    Draw(ExtentPoint),
    /// No-draw marker closing the segment of `bar_id`.
    Gap { bar_id: BarId },
}

impl CandlePoint {
    pub fn bar_id(&self) -> &BarId {
        match self {
            CandlePoint::Draw(point) => &point.bar_id,
            CandlePoint::Gap { bar_id } => bar_id,
        }
    }

    pub fn extent_point(&self) -> Option<&ExtentPoint> {
        match self {
            CandlePoint::Draw(point) => Some(point),
            CandlePoint::Gap { .. } => None,
        }
    }

    pub fn price(&self) -> Option<f64> {
        self.extent_point().map(|point| point.price)
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, CandlePoint::Gap { .. })
    }
}

/// One of the `green_hl`, `red_hl`, `green_oc`, `red_oc` tables.
#[derive(Clone, PartialEq, Debug)]
pub struct CandleSegments {
    pub extent: Extent,
    pub direction: Direction,
    pub points: Vec<CandlePoint>,
}

impl CandleSegments {
    pub fn name(&self) -> String {
        format!("{}_{}", self.direction.as_str(), self.extent.as_str())
    }
}

/// All four candle geometry tables.
#[derive(Clone, PartialEq, Debug)]
pub struct CandleSet {
    pub green_hl: CandleSegments,
    pub red_hl: CandleSegments,
    pub green_oc: CandleSegments,
    pub red_oc: CandleSegments,
}

/// Split bars by direction, then build both extents for both groups.
pub fn build_all(bars: &[LinkedBar]) -> Result<CandleSet, ShapeError> {
    let (green, red): (Vec<&LinkedBar>, Vec<&LinkedBar>) = bars
        .iter()
        .partition(|bar| bar.direction() == Direction::Green);

    debug!(green = green.len(), red = red.len(), "split bars by direction");

    Ok(CandleSet {
        green_hl: build(&green, Extent::HighLow, Direction::Green)?,
        red_hl: build(&red, Extent::HighLow, Direction::Red)?,
        green_oc: build(&green, Extent::OpenClose, Direction::Green)?,
        red_oc: build(&red, Extent::OpenClose, Direction::Red)?,
    })
}

/// Build the gapped polyline of `extent` over bars already filtered to `direction`.
pub fn build(
    bars: &[&LinkedBar],
    extent: Extent,
    direction: Direction,
) -> Result<CandleSegments, ShapeError> {
    let points = segments(extent_points(bars, extent))?;
    Ok(CandleSegments {
        extent,
        direction,
        points,
    })
}

/// Merge both endpoint values of every bar into one sequence.
pub fn extent_points(bars: &[&LinkedBar], extent: Extent) -> Vec<ExtentPoint> {
    bars.iter()
        .flat_map(|bar| {
            extent.endpoints(bar).map(|price| {
                ExtentPoint::new(bar.bar_id.clone(), bar.order_key, bar.bar.timestamp, price)
            })
        })
        .collect()
}

/// Order points by (time, order key, price) and close every bar's pair with a gap.
///
/// Equivalent to duplicating the second point of each sorted pair, re-sorting, and replacing
/// every third point with a no-draw marker.
pub fn segments(mut points: Vec<ExtentPoint>) -> Result<Vec<CandlePoint>, ShapeError> {
    if points.len() % 2 != 0 {
        return Err(ShapeError::UnpairedExtent(points.len()));
    }

    points.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.order_key.cmp(&b.order_key))
            .then(a.price.total_cmp(&b.price))
    });

    let mut polyline = Vec::with_capacity(points.len() / 2 * 3);
    let mut points = points.into_iter();
    while let (Some(first), Some(second)) = (points.next(), points.next()) {
        if first.bar_id != second.bar_id {
            return Err(ShapeError::InterleavedExtent {
                first: first.bar_id,
                second: second.bar_id,
            });
        }

        let gap = CandlePoint::Gap {
            bar_id: second.bar_id.clone(),
        };
        polyline.extend([CandlePoint::Draw(first), CandlePoint::Draw(second), gap]);
    }

    Ok(polyline)
}

impl ToFrame for CandleSegments {
    fn to_frame(&self) -> Result<Frame, ShapeError> {
        let points = &self.points;

        Frame::new()
            .with_column("identifier", Column::texts(points.iter().map(|p| p.bar_id().as_str())))?
            .with_column("price", Column::Float(points.iter().map(CandlePoint::price).collect()))?
            .with_column(
                "order_key",
                Column::Int(points.iter().map(|p| p.extent_point().map(|p| p.order_key.0)).collect()),
            )?
            .with_column(
                "timestamp",
                Column::Time(points.iter().map(|p| p.extent_point().map(|p| p.timestamp)).collect()),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Bar;
    use chrono::TimeZone;

    fn linked(id: &str, minute: u32, order_key: i64, ohlc: [f64; 4]) -> LinkedBar {
        let [open, high, low, close] = ohlc;
        LinkedBar {
            bar_id: BarId::from(id),
            order_key: OrderKey(order_key),
            bar: Bar::new(
                Utc.with_ymd_and_hms(2024, 1, 2, 10, minute, 0).unwrap(),
                open,
                high,
                low,
                close,
            ),
        }
    }

    #[test]
    fn test_single_bar_high_low() {
        let bar = linked("a", 0, 0, [101.0, 105.0, 100.0, 104.0]);

        let segments = build(&[&bar], Extent::HighLow, Direction::Green).unwrap();

        assert_eq!(segments.points.len(), 3);
        assert_eq!(segments.points[0].price(), Some(100.0));
        assert_eq!(segments.points[1].price(), Some(105.0));
        assert!(segments.points[2].is_gap());
        assert!(segments.points.iter().all(|p| p.bar_id().as_str() == "a"));
    }

    #[test]
    fn test_every_bar_contributes_draw_draw_gap() {
        let bars = vec![
            linked("c", 2, 2, [100.0, 103.0, 99.0, 102.0]),
            linked("a", 0, 0, [100.0, 101.0, 99.0, 100.5]),
            linked("b", 0, 1, [100.5, 102.0, 100.0, 101.0]),
        ];
        let bars = bars.iter().collect::<Vec<_>>();

        let segments = build(&bars, Extent::OpenClose, Direction::Green).unwrap();

        assert_eq!(segments.points.len(), 9);
        for (index, chunk) in segments.points.chunks(3).enumerate() {
            assert!(!chunk[0].is_gap(), "bar {} failed", index);
            assert!(!chunk[1].is_gap(), "bar {} failed", index);
            assert!(chunk[2].is_gap(), "bar {} failed", index);
            assert_eq!(chunk[0].bar_id(), chunk[2].bar_id(), "bar {} failed", index);
            assert!(chunk[0].price() <= chunk[1].price(), "bar {} failed", index);
        }

        // Ordered by time, then order key
        let order = segments
            .points
            .chunks(3)
            .map(|chunk| chunk[0].bar_id().as_str().to_string())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_flat_bar_yields_zero_length_segment() {
        let bar = linked("flat", 0, 0, [100.0, 100.0, 100.0, 100.0]);

        let segments = build(&[&bar], Extent::OpenClose, Direction::Green).unwrap();

        assert_eq!(segments.points[0].price(), Some(100.0));
        assert_eq!(segments.points[1].price(), Some(100.0));
        assert!(segments.points[2].is_gap());
    }

    #[test]
    fn test_segments_shape_errors() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let point = |id: &str, order_key: i64, price: f64| {
            ExtentPoint::new(BarId::from(id), OrderKey(order_key), timestamp, price)
        };

        assert_eq!(
            segments(vec![point("a", 0, 1.0), point("a", 0, 2.0), point("b", 1, 1.0)]).unwrap_err(),
            ShapeError::UnpairedExtent(3)
        );

        assert_eq!(
            segments(vec![
                point("a", 0, 1.0),
                point("a", 0, 3.0),
                point("b", 0, 2.0),
                point("b", 0, 4.0),
            ])
            .unwrap_err(),
            ShapeError::InterleavedExtent {
                first: BarId::from("a"),
                second: BarId::from("b"),
            }
        );
    }

    #[test]
    fn test_build_all_splits_by_direction() {
        let bars = vec![
            linked("up", 0, 0, [100.0, 103.0, 99.0, 102.0]),
            linked("down", 1, 1, [102.0, 103.0, 98.0, 99.0]),
            linked("doji", 2, 2, [99.0, 100.0, 98.0, 99.0]),
        ];

        let set = build_all(&bars).unwrap();

        assert_eq!(set.green_hl.points.len(), 6);
        assert_eq!(set.green_oc.points.len(), 6);
        assert_eq!(set.red_hl.points.len(), 3);
        assert_eq!(set.red_oc.points.len(), 3);
        assert_eq!(set.red_oc.points[0].price(), Some(99.0));
        assert_eq!(set.red_oc.points[1].price(), Some(102.0));
        assert_eq!(set.red_hl.name(), "red_hl");

        let frame = set.green_hl.to_frame().unwrap();
        assert_eq!(frame.len(), 6);
    }
}
