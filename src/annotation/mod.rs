pub mod builder;
pub mod io;
pub mod paralog;

pub use builder::{AnnotationBuilder, AnnotationKeys, AnnotationModel};
pub use io::{parse_attributes, AnnotationReader, AnnotationRecord, Attributes};
pub use paralog::{ParalogColumns, ParalogSet};
