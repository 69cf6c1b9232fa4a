//! Infrastructure adapters: queues, mailbox, camera, capture, backends, sensor and actuator.

pub mod actuator;
pub mod backend;
pub mod camera;
pub mod capture;
pub mod mailbox;
pub mod queue;
pub mod sensor;

pub use actuator::LogActuator;
pub use backend::{CommandTemplate, ProcessBackend};
pub use camera::IsapiCamera;
pub use capture::FfmpegFrameSource;
pub use mailbox::{VerdictMailbox, VerdictReceiver, VerdictSender};
pub use queue::{BoundedRing, DetectionFeed, FeedPolicy, FeedReader, JobQueue};
pub use sensor::ThermalZoneSensor;
