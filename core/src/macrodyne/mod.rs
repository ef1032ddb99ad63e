//! # Macrodyne Synchrophasor Protocol
//!
//! This module implements the binary frame codec of Macrodyne 1690M and 1690G phasor
//! measurement units. A Macrodyne device streams data frames whose layout is selected by
//! a 16-bit online data format word; channel names and scaling are not on the wire and
//! come from an external device description in the BPA PDCstream INI layout.
//!
//! ## Submodules
//!
//! - `commands`: Native device command codes and command frames.
//! - `common`: Shared types (`FrameError`, `ProtocolVersion`, format and status flags).
//! - `config`: The configuration response frame, the resolved configuration view and the
//!   shared, reloadable configuration model.
//! - `connection`: Connection-string parameters of a device link.
//! - `data_frame`: Data frame decoding and encoding.
//! - `description`: Device description definitions, sources and image rendering.
//! - `endian`: Byte-order aware primitive encoding and decoding.
//! - `frame_header`: Frame classification and the per-frame header.
//! - `header_frame`: The unit ID response frame.
//! - `layout`: Layout plans derived from a format word.
//! - `parser`: A stateful parser for one device link.
//! - `phasors`: Phasor, reference and frequency values and their scaling.
//! - `random`: Random frame generation for tests and benchmarks.
//! - `units`: Phasor types and nominal frequency.
//! - `utils`: Checksum and BCD timestamp helpers.
//!
//! ## Usage
//!
//! Create a `ConfigurationModel` (directly or from `ConnectionParameters`), wrap it in a
//! `FrameParser`, send the parser's initial commands and feed every received frame to
//! `FrameParser::parse`.

pub mod commands;
pub mod common;
pub mod config;
pub mod connection;
pub mod data_frame;
pub mod description;
pub mod endian;
pub mod frame_header;
pub mod header_frame;
pub mod layout;
pub mod parser;
pub mod phasors;
pub mod random;
pub mod units;
pub mod utils;
