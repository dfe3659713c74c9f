//! Attendance statistics.
//!
//! Pure aggregation over a roster and record set, plus the clock that
//! anchors date-relative figures.

pub mod aggregator;
pub mod clock;

pub use aggregator::*;
pub use clock::{Clock, FixedClock, SystemClock};
