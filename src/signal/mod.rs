pub mod detector;
pub mod normalizer;

pub use detector::{EventDetector, EvdtParams};
pub use normalizer::Normalizer;
