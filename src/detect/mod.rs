mod backend;
mod stub;

pub use backend::{RawDetection, SpeciesClassifier, SpeciesGuess, TrackerBackend};
pub use stub::{AnnotationSidecar, FixedLabelClassifier, ScriptedBackend};
