pub mod collector;

pub use collector::{CaptureCollector, StartResult};
