//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements     | Connects to               |
//! |------------|----------------|---------------------------|
//! | `log_sink` | EventSink      | Serial log output         |
//! | `time`     | MonotonicClock | ESP32 high-res timer      |
//!
//! The bus drivers in [`crate::drivers`] implement `FrameWriter` and
//! `SampleReader` directly over `embedded-hal` pins.

pub mod log_sink;
pub mod time;
