//! # niimbot-client
//!
//! Async engine for NIIMBOT label printers.
//!
//! This crate provides:
//! - A command sequencer keeping exactly one command in flight
//! - Response timeouts and error frame handling
//! - A high-level API for settings, queries and print control
//! - Whole-label printing from any [`niimbot_protocol::PixelSource`]
//! - An RFCOMM serial link for Linux

pub mod channel;
pub mod config;
pub mod error;
pub mod job;
pub mod printer;
pub mod sequencer;

pub use channel::{open_rfcomm, spawn_reader, Channel, RfcommLink, StreamChannel, DEFAULT_DEVICE};
pub use config::{ConfigError, PrinterConfig};
pub use error::PrinterError;
pub use job::PrintJob;
pub use printer::Printer;
pub use sequencer::{CommandHandle, InboundSink, Sequencer};
