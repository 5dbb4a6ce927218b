pub mod color;
pub mod features;
pub mod hough;
pub mod loader;
pub mod transforms;

pub use loader::ImageLoader;
pub use transforms::{ImageTransforms, MODEL_INPUT_SIZE};
