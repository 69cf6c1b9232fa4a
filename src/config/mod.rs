//! Configuration models for the camera, slots, timing and detection backend.

pub mod verifier;

pub use verifier::{
    CameraConfig, DetectionConfig, DetectionMode, SimulationConfig, SimulationStep, SlotConfig,
    TimingConfig, VerifierConfig,
};
