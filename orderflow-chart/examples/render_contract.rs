use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use orderflow_chart::{ChartConfig, Column, Frame, OrderFlowChart};
use tracing::{info, warn};

const BARS: i64 = 12;
const LEVELS: i64 = 6;
const TICK_SIZE: f64 = 0.25;

#[rustfmt::skip]
fn main() {
    // Initialise INFO Tracing log subscriber
    init_logging();

    let (ticks, bars) = match synthetic_session() {
        Ok(frames) => frames,
        Err(error) => {
            warn!(%error, "failed to build input frames");
            return;
        }
    };

    // Synthesized bar identifiers, five minute bars
    let config = ChartConfig::default()
        .with_bar_duration(TimeDelta::minutes(5));

    let processed = match OrderFlowChart::from_frames(&ticks, &bars, config).and_then(|chart| chart.process()) {
        Ok(processed) => processed,
        Err(error) => {
            warn!(%error, stage = ?error.stage(), "failed to process orderflow chart");
            return;
        }
    };

    if let Some(viewport) = processed.viewport() {
        info!(
            price_range = ?viewport.price_range(),
            bar_range = ?viewport.bar_range(),
            "initial viewport"
        );
    }

    for (name, record) in processed.output().tables() {
        info!(table = name, rows = record.len(), columns = record.columns.len(), "output table");
    }

    match processed.output().to_json_pretty() {
        Ok(json) => println!("{json}"),
        Err(error) => warn!(%error, "failed to serialise output"),
    }
}

/// Deterministic session drifting up then down, with bid and ask sizes varying per level.
fn synthetic_session() -> Result<(Frame, Frame), orderflow_chart::ShapeError> {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
    let bar_time = |bar: i64| -> DateTime<Utc> { start + TimeDelta::minutes(5 * bar) };

    let mut tick_times = Vec::new();
    let mut prices = Vec::new();
    let mut bids = Vec::new();
    let mut asks = Vec::new();

    let mut bar_times = Vec::new();
    let (mut opens, mut highs, mut lows, mut closes) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());

    for bar in 0..BARS {
        let drift = if bar < BARS / 2 { bar } else { BARS - bar };
        let low = 4800.0 + drift as f64 * TICK_SIZE * 2.0;
        let high = low + (LEVELS - 1) as f64 * TICK_SIZE;

        for level in 0..LEVELS {
            tick_times.push(bar_time(bar) + TimeDelta::seconds(level * 20));
            prices.push(low + level as f64 * TICK_SIZE);
            bids.push(((bar * 7 + level * 3) % 23 + 1) as f64);
            asks.push(((bar * 5 + level * 11) % 19 + 1) as f64);
        }

        let rising = bar % 3 != 2;
        bar_times.push(bar_time(bar));
        opens.push(if rising { low + TICK_SIZE } else { high - TICK_SIZE });
        closes.push(if rising { high - TICK_SIZE } else { low + TICK_SIZE });
        highs.push(high);
        lows.push(low);
    }

    let ticks = Frame::new()
        .with_column("timestamp", Column::times(tick_times))?
        .with_column("price", Column::floats(prices))?
        .with_column("bid_size", Column::floats(bids))?
        .with_column("ask_size", Column::floats(asks))?;

    let bars = Frame::new()
        .with_column("timestamp", Column::times(bar_times))?
        .with_column("open", Column::floats(opens))?
        .with_column("high", Column::floats(highs))?
        .with_column("low", Column::floats(lows))?
        .with_column("close", Column::floats(closes))?;

    Ok((ticks, bars))
}

// Initialise an INFO `Subscriber` for `Tracing` logs and install it as the global default.
fn init_logging() {
    tracing_subscriber::fmt()
        // Filter messages based on the INFO
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        // Disable colours on release builds
        .with_ansi(cfg!(debug_assertions))
        // Install this Tracing subscriber as global default
        .init()
}
