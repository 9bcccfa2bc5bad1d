pub mod error_classifier;
pub mod sandbox;
pub mod synthesizer;

pub use error_classifier::*;
pub use sandbox::*;
pub use synthesizer::*;
