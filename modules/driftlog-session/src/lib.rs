pub mod buffer;
pub mod clock;
pub mod error;
pub mod flush;
pub mod identity;
pub mod logger;
pub mod offset;
pub mod physics;
pub mod report;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use buffer::LocalBuffer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SessionError;
pub use flush::{flush, FlushError};
pub use identity::user_id;
pub use logger::{send_best_effort, EventLogger, SendStatus, SettleSummary};
pub use offset::{estimate_offset, OffsetError, OffsetEstimator};
pub use physics::{Ball, Field, StepOutcome};
pub use report::{build_report, cross_deltas, render_report, MinMax, Report, ReportError, ReportRow, Window};
pub use session::{Controls, ReportView, Session, SessionConfig};
pub use store::{FileStore, KvStore, MemoryStore, StoreError};
