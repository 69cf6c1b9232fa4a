//! Builders to construct verifier components from configuration.

pub mod orchestrator_builder;

pub use orchestrator_builder::{
    build_backend, build_orchestrator, build_orchestrator_with, build_registry,
};
