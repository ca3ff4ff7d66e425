//! RTT correlation and bandwidth/arrival-rate estimation.

mod ack_window;
mod time_window;

pub use ack_window::AckWindow;
pub use time_window::TimeWindow;
