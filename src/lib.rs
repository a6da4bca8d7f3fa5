//! splice_psi
//!
//! Pure-Rust splice-site PSI annotation.
//! This crate picks one primary transcript per protein-coding gene from a GTF
//! annotation, normalizes PSI from LeafCutter, rMATS and SpliSER outputs into
//! per-site observations, and annotates every transcript with the sites that
//! fall inside its span.

pub mod types;
pub mod error;
pub mod io;
pub mod model;
pub mod annotation;
pub mod psi;
pub mod index;
pub mod assemble;

pub use error::{Error, Result, RunSummary};
pub use index::{SiteEntry, SiteIndex};

pub use annotation::{AnnotationBuilder, AnnotationKeys, AnnotationModel, ParalogColumns, ParalogSet};

pub use types::{BoundaryType, SitePsi, SiteRole, SpliceForm, Strand};

pub use model::transcript::Transcript;
pub use model::gene::{Gene, TranscriptCandidate};

pub use psi::{
    EventType, LeafcutterSites, PsiTable, QuantificationSource, RmatsSites, SourceKind,
    SpliserSites,
};
pub use assemble::{AnnotatedTranscriptRow, JoinOptions, SpliceTableAssembler, SpliceTableRow};
