pub mod types;
pub mod transcript;
pub mod gene;

pub use gene::{Gene, TranscriptCandidate};
pub use transcript::{derive_exon_boundaries, Transcript};
pub use types::AppPriority;
