mod classifier;
mod engine;
mod labels;
mod preprocess;

pub use classifier::{Classification, Classifier, ClassifyError};
pub use engine::{Engine, LoadError};
pub use labels::LabelTable;
pub use preprocess::DecodeError;
