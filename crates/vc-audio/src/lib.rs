//! Realtime streaming voice conversion: fixed-size rolling histories, RMS
//! gating, loudness matching and SOLA block stitching around an external
//! voice model, driven by a duplex audio port.

mod cpal_port;
mod engine;
mod gate;
mod history;
mod loudness;
mod port;
mod processor;
mod sola;
mod stats;
#[cfg(test)]
mod test_support;

pub use cpal_port::{list_input_devices, list_output_devices, CpalPort};
pub use engine::StreamEngine;
pub use gate::NoiseGate;
pub use history::FrameHistory;
pub use loudness::LoudnessMatcher;
pub use port::{AudioIoPort, BlockCallback, PortConfig};
pub use processor::{BlockProcessor, Collaborators};
pub use sola::{SolaAligner, SolaState};
pub use stats::{EngineStats, LevelMeter, StatsSnapshot};
