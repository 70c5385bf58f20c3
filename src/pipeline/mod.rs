pub mod controller;
pub mod frames;
pub mod progress;
