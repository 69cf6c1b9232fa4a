//! Verification core: camera lock, slot workers, inference workers and the orchestrator.

pub mod audit;
pub mod camera_lock;
pub mod collaborators;
pub mod detection;
pub mod error;
pub mod inference_worker;
pub mod orchestrator;
pub mod policy;
pub mod slot_registry;
pub mod slot_worker;

pub use audit::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, build_audit_event};
pub use camera_lock::{CameraLease, CameraLock};
pub use collaborators::{
    Actuator, ActuatorCommand, BackendStream, CameraControl, DetectionBackend, EnvironmentSensor,
    FrameSource, StreamingBackend,
};
pub use detection::{DetectionEvent, DetectionMatcher, Job, Verdict};
pub use error::{AppResult, BackendError, LockError, VerifierError};
pub use inference_worker::{InferenceWorker, StreamExit, StreamLines, StreamingInferenceWorker};
pub use orchestrator::{
    DetectionEngine, Orchestrator, OrchestratorSettings, SlotStatus, SlotWorkerHandle, TickReport,
};
pub use policy::{CoolingPolicy, RestartPolicy};
pub use slot_registry::{OccupancyMap, Slot, SlotRegistry};
pub use slot_worker::{DetectionStrategy, SlotWorker, WorkerContext, WorkerExit};
