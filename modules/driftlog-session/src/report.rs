//! Reconciliation report: server stream records against bulk-uploaded events.
//!
//! Two views of the same session are compared:
//! - the table aligns rows by list position;
//! - the cross-clock delta joins on sequence number.
//!
//! The two disagree when the lists dropped different events. Both behaviours
//! are kept as they are.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use driftlog_client::{ClientError, LabApi};
use driftlog_common::{fmt_span, fmt_time, Event, ListResponse, StreamRecord};

use crate::offset::OffsetEstimator;

pub const NO_DATA: &str = "no data";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to fetch data ({0})")]
    Fetch(#[from] ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinMax {
    pub min: i64,
    pub max: i64,
}

impl MinMax {
    fn of(values: impl IntoIterator<Item = i64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(MinMax { min: v, max: v }),
            Some(m) => Some(MinMax {
                min: m.min.min(v),
                max: m.max.max(v),
            }),
        })
    }

    fn describe(range: Option<Self>) -> String {
        format!(
            "{}..{}",
            fmt_span(range.map(|r| r.min)),
            fmt_span(range.map(|r| r.max))
        )
    }
}

/// Earliest, latest and span of one source's timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub span: Option<i64>,
}

impl Window {
    fn of(times: &[i64]) -> Self {
        match MinMax::of(times.iter().copied()) {
            Some(range) => Window {
                start: Some(range.min),
                end: Some(range.max),
                span: Some(range.max - range.min),
            },
            None => Window::default(),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "start {}  end {}  span {}",
            fmt_time(self.start),
            fmt_time(self.end),
            fmt_span(self.span)
        )
    }
}

/// One table row. Either side is empty when that list is shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub stream: String,
    pub bulk: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub rows: Vec<ReportRow>,
    pub stream_count: usize,
    pub bulk_count: usize,
    pub stream_window: Window,
    pub bulk_window: Window,
    pub stream_intervals: Option<MinMax>,
    pub bulk_intervals: Option<MinMax>,
    /// `serverTime - (clientTime + offset)` over sequence numbers present in both sources.
    pub cross_delta: Option<MinMax>,
    pub offset_ms: i64,
    pub summary: String,
}

impl Report {
    pub fn has_data(&self) -> bool {
        !self.rows.is_empty()
    }

    /// The row table and per-source windows, without the summary line.
    pub fn fmt_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_data() {
            return Ok(());
        }
        let width = self
            .rows
            .iter()
            .map(|r| r.stream.chars().count())
            .max()
            .unwrap_or(0)
            .max("stream".len());
        writeln!(f, "{:<width$} || bulk", "stream")?;
        for row in &self.rows {
            writeln!(f, "{:<width$} || {}", row.stream, row.bulk)?;
        }
        writeln!(f, "stream  {}", self.stream_window)?;
        writeln!(f, "bulk    {}", self.bulk_window)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_table(f)?;
        write!(f, "{}", self.summary)
    }
}

fn stream_cell(record: &StreamRecord) -> String {
    format!(
        "#{} {} {} | server {} | client {}",
        record.event.seq,
        record.event.kind,
        record.event.message,
        fmt_time(record.server_millis()),
        fmt_time(record.event.client_millis())
    )
}

fn bulk_cell(event: &Event) -> String {
    format!(
        "#{} {} {} | local {}",
        event.seq,
        event.kind,
        event.message,
        fmt_time(event.client_millis())
    )
}

/// Differences between neighbours, in list order.
fn intervals(times: &[i64]) -> Option<MinMax> {
    MinMax::of(times.windows(2).map(|w| w[1] - w[0]))
}

/// Join on sequence number and compute `server - (client + offset)` per match.
/// A later bulk event with a repeated sequence number shadows an earlier one.
pub fn cross_deltas(stream: &[StreamRecord], bulk: &[Event], offset_ms: i64) -> Vec<i64> {
    let bulk_by_seq: HashMap<u64, &Event> = bulk.iter().map(|e| (e.seq, e)).collect();
    stream
        .iter()
        .filter_map(|record| {
            let pair = bulk_by_seq.get(&record.event.seq)?;
            let server = record.server_millis()?;
            let client = pair.client_millis()?;
            Some(server - (client + offset_ms))
        })
        .collect()
}

/// Build the report from already-fetched server records.
///
/// `local_override` replaces the server's bulk snapshot when non-empty, which
/// covers a report rendered right after a flush.
pub fn build_report(
    list: &ListResponse,
    local_override: &[Event],
    offset_ms: i64,
    offset_line: &str,
) -> Report {
    let stream = &list.stream;
    let bulk: &[Event] = if local_override.is_empty() {
        &list.bulk.events
    } else {
        local_override
    };

    let row_count = stream.len().max(bulk.len());
    let rows = (0..row_count)
        .map(|i| ReportRow {
            stream: stream.get(i).map(stream_cell).unwrap_or_default(),
            bulk: bulk.get(i).map(bulk_cell).unwrap_or_default(),
        })
        .collect::<Vec<_>>();

    let stream_times: Vec<i64> = stream.iter().filter_map(|r| r.server_millis()).collect();
    let bulk_times: Vec<i64> = bulk.iter().filter_map(|e| e.client_millis()).collect();

    let stream_intervals = intervals(&stream_times);
    let bulk_intervals = intervals(&bulk_times);
    let cross_delta = MinMax::of(cross_deltas(stream, bulk, offset_ms));

    let summary = if rows.is_empty() {
        NO_DATA.to_string()
    } else {
        let mut line = format!(
            "Records stream={}, bulk={}. Intervals stream {}, bulk {}. {}",
            stream.len(),
            bulk.len(),
            MinMax::describe(stream_intervals),
            MinMax::describe(bulk_intervals),
            offset_line
        );
        if let Some(delta) = cross_delta {
            line.push_str(&format!(
                "; Δ(server vs bulk+offset) {}",
                MinMax::describe(Some(delta))
            ));
        }
        line
    };

    Report {
        rows,
        stream_count: stream.len(),
        bulk_count: bulk.len(),
        stream_window: Window::of(&stream_times),
        bulk_window: Window::of(&bulk_times),
        stream_intervals,
        bulk_intervals,
        cross_delta,
        offset_ms,
        summary,
    }
}

/// Fetch both server views and build the report. Any fetch failure aborts
/// the whole report.
pub async fn render_report(
    api: &dyn LabApi,
    local_override: &[Event],
    offset: &OffsetEstimator,
) -> Result<Report, ReportError> {
    let list = api.list().await?;
    Ok(build_report(
        &list,
        local_override,
        offset.offset_ms(),
        offset.status(),
    ))
}
