//! Time-series rendering seam.
//!
//! The flow API reports timestamps in seconds; chart sinks take milliseconds.

use flowlink_shared::TimeseriesPoint;

/// Points for one series, ready to append to a chart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartTrace {
    /// Timestamps in milliseconds.
    pub x: Vec<i64>,
    /// `None` marks a gap.
    pub y: Vec<Option<f64>>,
}

impl ChartTrace {
    pub fn from_points(points: &[TimeseriesPoint]) -> Self {
        let mut trace = Self {
            x: Vec::with_capacity(points.len()),
            y: Vec::with_capacity(points.len()),
        };
        for point in points {
            trace.x.push(point.timestamp_millis());
            trace.y.push(point.value());
        }
        trace
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Something that draws series, e.g. a chart widget.
pub trait ChartSink {
    fn extend_series(&self, series_id: &str, trace: &ChartTrace);
}

/// Convert wire points and append them to `series_id`.
pub fn render_series(sink: &dyn ChartSink, series_id: &str, points: &[TimeseriesPoint]) {
    let trace = ChartTrace::from_points(points);
    tracing::debug!("Updating TS trace for {} ({} points)", series_id, trace.len());
    sink.extend_series(series_id, &trace);
}

/// Sink that only logs what it would draw.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ChartSink for LogSink {
    fn extend_series(&self, series_id: &str, trace: &ChartTrace) {
        match (trace.x.last(), trace.y.last()) {
            (Some(ts), Some(Some(value))) => tracing::info!(
                "Series {}: {} points, last = {} @ {}ms",
                series_id,
                trace.len(),
                value,
                ts
            ),
            (Some(ts), Some(None)) => tracing::info!(
                "Series {}: {} points, last is empty @ {}ms",
                series_id,
                trace.len(),
                ts
            ),
            _ => tracing::info!("Series {}: no points", series_id),
        }
    }
}
