// Library exports for the emotion tracker

#[cfg(feature = "camera")]
pub mod camera;
#[cfg(feature = "onnx")]
pub mod classifier;
pub mod config;
#[cfg(feature = "onnx")]
pub mod detector;
pub mod error;
pub mod font;
pub mod models;
pub mod monitor;
pub mod overlay;
pub mod pipeline;
pub mod preprocess;
pub mod selector;
pub mod source;
pub mod stabilizer;
pub mod state;
