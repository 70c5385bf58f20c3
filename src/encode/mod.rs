pub mod ffmpeg;
pub mod jpeg;
