//! Frame acquisition from the camera stream.

pub mod ffmpeg;

pub use ffmpeg::FfmpegFrameSource;
