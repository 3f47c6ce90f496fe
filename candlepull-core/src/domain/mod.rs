//! Domain types for candlepull

pub mod candle;
pub mod instrument;
pub mod period;

pub use candle::Candle;
pub use instrument::{Instrument, InstrumentClass, ResetPolicy, Venue};
pub use period::Period;
