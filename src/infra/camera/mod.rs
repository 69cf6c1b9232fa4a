//! PTZ camera control over ISAPI.

pub mod digest;
pub mod isapi;

pub use digest::DigestChallenge;
pub use isapi::IsapiCamera;
