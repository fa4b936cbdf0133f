//! J.A.R.V.I.S., a Portuguese-speaking desktop assistant.
//!
//! Commands arrive from the console, the microphone or Telegram, go
//! through one routing table and either drive the desktop or reach a
//! language model. See [`agent::Agent`] for the pipeline and
//! [`worker`] for how front-ends share it.

pub mod actions;
pub mod agent;
pub mod apps;
pub mod cleanup;
pub mod codegen;
pub mod config;
pub mod console;
pub mod debugger;
pub mod desktop;
pub mod error;
pub mod jarvis_io;
pub mod listening;
pub mod llm;
pub mod memory;
pub mod persona;
mod process;
pub mod router;
pub mod telegram;
pub mod tips;
pub mod vision;
pub mod worker;

#[cfg(feature = "voice")]
pub mod speech;
#[cfg(feature = "voice")]
pub mod tts_engine;
#[cfg(feature = "voice")]
pub mod voice;
