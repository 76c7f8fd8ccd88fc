//! Export of simulation runs.
//!
//! A [`SimulationRun`] bundles the registry, configuration, every frame and
//! the concatenated event list. It exports to JSON for inspection and to
//! `bitcode` for compact, bit-exact comparison of two runs. Single frames
//! can be encoded with a versioned header and decoded back.

use crate::engine::Engine;
use crate::event::Event;
use crate::registry::Registry;
use crate::sim::EngineConfig;
use crate::timeline::Frame;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying an encoded frame.
pub const FRAME_MAGIC: u32 = 0xF10E_0001;

/// Current frame format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", FRAME_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Simulation run
// ---------------------------------------------------------------------------

/// Everything a session produced, borrowed from the engine.
#[derive(Debug, Serialize)]
pub struct SimulationRun<'a> {
    pub registry: &'a Registry,
    pub config: &'a EngineConfig,
    pub frames: &'a [Frame],
    /// Events of every frame, in frame order.
    pub events: Vec<&'a Event>,
}

impl SimulationRun<'_> {
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_bitcode(&self) -> Result<Vec<u8>, ExportError> {
        bitcode::serialize(self).map_err(|e| ExportError::Encode(e.to_string()))
    }
}

impl Engine {
    /// The run so far: every held frame, including precomputed futures.
    pub fn simulation_run(&self) -> SimulationRun<'_> {
        let frames = self.timeline().frames();
        SimulationRun {
            registry: self.registry(),
            config: self.config(),
            frames,
            events: frames.iter().flat_map(|f| f.events.iter()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame encoding
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct EncodedFrame {
    magic: u32,
    version: u32,
    frame: Frame,
}

impl Frame {
    /// Encode with a magic/version header.
    pub fn encode(&self) -> Result<Vec<u8>, ExportError> {
        let wrapped = EncodedFrame {
            magic: FRAME_MAGIC,
            version: FORMAT_VERSION,
            frame: self.clone(),
        };
        bitcode::serialize(&wrapped).map_err(|e| ExportError::Encode(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Frame, DecodeError> {
        let wrapped: EncodedFrame =
            bitcode::deserialize(data).map_err(|e| DecodeError::Decode(e.to_string()))?;
        if wrapped.magic != FRAME_MAGIC {
            return Err(DecodeError::InvalidMagic(wrapped.magic));
        }
        if wrapped.version != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(wrapped.version));
        }
        Ok(wrapped.frame)
    }
}
