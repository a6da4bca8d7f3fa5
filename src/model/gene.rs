use std::cmp::{Ordering, Reverse};

use crate::model::types::AppPriority;
use crate::types::Strand;

/// A `transcript` row of a protein-coding gene, competing to be the gene's primary isoform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptCandidate {
    pub transcript_id: String,
    pub gene_id: String,
    pub gene_name: Option<String>,
    pub seqname: String,
    pub strand: Strand,
    pub start: i64,
    pub end: i64,
    pub priority: AppPriority,
    /// Position of the record in the annotation; breaks any remaining ties.
    pub order: usize,
}

impl TranscriptCandidate {
    /// Ranking key: APPRIS priority ascending, end descending, start ascending.
    fn rank_key(&self) -> (AppPriority, Reverse<i64>, i64, usize) {
        (self.priority, Reverse(self.end), self.start, self.order)
    }
}

/// Gene model: the candidate transcripts seen for one `gene_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gene {
    pub id: String,
    pub name: Option<String>,
    candidates: Vec<TranscriptCandidate>,
}

impl Gene {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            candidates: Vec::new(),
        }
    }

    pub fn add_candidate(&mut self, candidate: TranscriptCandidate) {
        if self.name.is_none() {
            self.name = candidate.gene_name.clone();
        }
        self.candidates.push(candidate);
    }

    pub fn candidates(&self) -> &[TranscriptCandidate] {
        &self.candidates
    }

    /// Pick the gene's primary transcript.
    ///
    /// Best APPRIS priority wins; ties go to the transcript ending furthest
    /// downstream, then to the one starting furthest upstream, then to the
    /// first one in the annotation.
    pub fn select_primary_transcript(&self) -> Option<&TranscriptCandidate> {
        self.candidates
            .iter()
            .min_by(|a, b| compare_candidates(a, b))
    }
}

fn compare_candidates(a: &TranscriptCandidate, b: &TranscriptCandidate) -> Ordering {
    a.rank_key().cmp(&b.rank_key())
}
