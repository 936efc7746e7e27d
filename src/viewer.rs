//! Consumers of accepted batches.
//!
//! Delivery order between the two flows is not fixed: a history page may
//! land after a newer poll. Viewers that render a contiguous list should key
//! on record id, as [`BufferedViewer`] does, rather than on arrival order.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::model::{LogId, LogRecord, Placement};

/// Receives batches the synchronizer accepted.
///
/// `add_logs` is called once per accepted merge, never for empty or stale
/// responses. It runs while the window lock is held, so implementations must
/// not call back into the same session's merge path.
pub trait LogViewer: Send + Sync + 'static {
    fn add_logs(&self, records: Vec<LogRecord>, placement: Placement);
}

impl<T: LogViewer> LogViewer for Arc<T> {
    fn add_logs(&self, records: Vec<LogRecord>, placement: Placement) {
        (**self).add_logs(records, placement)
    }
}

/// Keeps every delivered record, ordered and deduplicated by id.
///
/// An inspection sink for tests and tooling: it holds every record and the
/// id list of every delivery for the life of the viewer, so memory grows with
/// the session. Interactive front ends should implement [`LogViewer`]
/// themselves.
#[derive(Debug, Default)]
pub struct BufferedViewer {
    inner: Mutex<Buffer>,
}

#[derive(Debug, Default)]
struct Buffer {
    records: BTreeMap<LogId, LogRecord>,
    deliveries: Vec<Delivery>,
    duplicates: usize,
}

/// One `add_logs` call as the viewer saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub placement: Placement,
    pub ids: Vec<LogId>,
}

impl BufferedViewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids currently held, ascending.
    pub fn ids(&self) -> Vec<LogId> {
        self.lock().records.keys().copied().collect()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().deliveries.clone()
    }

    /// Records received more than once.
    pub fn duplicates(&self) -> usize {
        self.lock().duplicates
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogViewer for BufferedViewer {
    fn add_logs(&self, records: Vec<LogRecord>, placement: Placement) {
        let mut buffer = self.lock();
        let ids = records.iter().map(|r| r.id).collect();
        for record in records {
            if buffer.records.insert(record.id, record).is_some() {
                buffer.duplicates += 1;
            }
        }
        buffer.deliveries.push(Delivery { placement, ids });
    }
}

/// Prints batches to stdout, one record per line.
///
/// A terminal cannot insert above what it already printed, so history pages
/// are framed by a marker line instead. The first write error (stdout closed,
/// broken pipe) is logged and marks the viewer closed; later batches are
/// dropped. Check [`is_closed`](Self::is_closed) to stop following.
#[derive(Debug, Default)]
pub struct StdoutViewer {
    closed: AtomicBool,
}

impl StdoutViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn deliver(&self, out: &mut impl Write, records: &[LogRecord], placement: Placement) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = write_batch(out, records, placement) {
            if !self.closed.swap(true, Ordering::AcqRel) {
                warn!(error = %e, "stdout is gone, no longer printing records");
            }
        }
    }
}

fn write_batch(out: &mut impl Write, records: &[LogRecord], placement: Placement) -> io::Result<()> {
    if placement == Placement::Prepend {
        if let (Some(first), Some(last)) = (records.first(), records.last()) {
            writeln!(out, "--- history {}..={} ---", first.id, last.id)?;
        }
    }
    for record in records {
        writeln!(out, "{}", record)?;
    }
    out.flush()
}

impl LogViewer for StdoutViewer {
    fn add_logs(&self, records: Vec<LogRecord>, placement: Placement) {
        let stdout = io::stdout();
        self.deliver(&mut stdout.lock(), &records, placement);
    }
}
