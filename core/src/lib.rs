//! # Macrodyne Synchrophasor Frame Codec
//!
//! This crate decodes and encodes the binary frames of Macrodyne 1690M and 1690G phasor
//! measurement units and binds each device to its external device description. It covers
//! frame classification, the bitmask-driven data frame layout, command frames, the
//! configuration and header responses, and the reloadable configuration model shared by
//! the decoders of one device link.
//!
//! ## Submodules
//!
//! - `macrodyne`: The protocol codec.
//!   - `commands`: Native command codes and command frames.
//!   - `common`: Shared types (`FrameError`, `ProtocolVersion`, format and status flags).
//!   - `config`: The resolved configuration view and the shared configuration model.
//!   - `data_frame`: Data frame decoding and encoding.
//!   - `description`: Device description definitions and sources.
//!   - `parser`: A stateful parser for one device link.
//! - `utils`: A reader for key/value-section (INI) documents.
//!
//! ## Usage
//!
//! The crate has no I/O of its own beyond reading description files; the transport hands
//! it one contiguous frame at a time and sends the command frames it produces.

pub mod macrodyne;
pub mod utils;
