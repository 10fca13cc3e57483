//! Time abstractions shared by the sync engine and background workers.

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
