use crate::annotation::paralog::ParalogSet;
use crate::model::gene::TranscriptCandidate;
use crate::types::Strand;

/// Primary transcript with its internal splice boundaries.
///
/// `internal_exon_starts` and `internal_exon_ends` are ascending, equally long
/// and never empty: the transcript's own first start and last end are removed
/// because they are transcript ends, not splice junctions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub transcript_id: String,
    pub gene_id: String,
    pub gene_name: Option<String>,
    pub chrom: String,
    pub strand: Strand,
    pub tx_start: i64,
    pub tx_end: i64,
    pub paralog_status: bool,
    internal_exon_starts: Vec<i64>,
    internal_exon_ends: Vec<i64>,
}

impl Transcript {
    /// Build a transcript from its selected candidate row and its exon coordinates.
    ///
    /// Returns `None` for single-exon transcripts.
    pub fn from_candidate(
        candidate: &TranscriptCandidate,
        exon_starts: &[i64],
        exon_ends: &[i64],
    ) -> Option<Self> {
        let (starts, ends) = derive_exon_boundaries(exon_starts, exon_ends)?;
        Some(Self {
            transcript_id: candidate.transcript_id.clone(),
            gene_id: candidate.gene_id.clone(),
            gene_name: candidate.gene_name.clone(),
            chrom: candidate.seqname.clone(),
            strand: candidate.strand,
            tx_start: candidate.start,
            tx_end: candidate.end,
            paralog_status: false,
            internal_exon_starts: starts,
            internal_exon_ends: ends,
        })
    }

    pub fn internal_exon_starts(&self) -> &[i64] {
        &self.internal_exon_starts
    }

    pub fn internal_exon_ends(&self) -> &[i64] {
        &self.internal_exon_ends
    }

    /// Number of internal junction boundaries (same for starts and ends).
    pub fn n_internal(&self) -> usize {
        self.internal_exon_starts.len()
    }

    /// Set and return whether the versioned gene id has an annotated paralog.
    pub fn mark_paralog_status(&mut self, paralogs: &ParalogSet) -> bool {
        self.paralog_status = paralogs.contains(&self.gene_id);
        self.paralog_status
    }
}

/// Sort exon coordinates and drop the transcript's outer boundaries.
///
/// The smallest start and the largest end are removed. Transcripts with
/// fewer than two exons carry no internal junction and yield `None`.
pub fn derive_exon_boundaries(starts: &[i64], ends: &[i64]) -> Option<(Vec<i64>, Vec<i64>)> {
    if starts.len() < 2 || starts.len() != ends.len() {
        return None;
    }

    let mut starts = starts.to_vec();
    let mut ends = ends.to_vec();
    starts.sort_unstable();
    ends.sort_unstable();

    starts.remove(0);
    ends.pop();

    Some((starts, ends))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::AppPriority;

    fn candidate() -> TranscriptCandidate {
        TranscriptCandidate {
            transcript_id: "T1".into(),
            gene_id: "ENSG01.3".into(),
            gene_name: Some("Alpha".into()),
            seqname: "chr1".into(),
            strand: Strand::Minus,
            start: 100,
            end: 900,
            priority: AppPriority::UNTAGGED,
            order: 0,
        }
    }

    #[test]
    fn boundaries_drop_outer_ends_after_sorting() {
        // exons given in minus-strand (descending) order
        let starts = [700, 400, 100];
        let ends = [900, 500, 200];
        let (s, e) = derive_exon_boundaries(&starts, &ends).unwrap();
        assert_eq!(s, vec![400, 700]);
        assert_eq!(e, vec![200, 500]);
    }

    #[test]
    fn single_exon_has_no_boundaries() {
        assert!(derive_exon_boundaries(&[100], &[900]).is_none());
        assert!(derive_exon_boundaries(&[], &[]).is_none());
    }

    #[test]
    fn from_candidate_keeps_equal_nonempty_lists() {
        let tx = Transcript::from_candidate(&candidate(), &[100, 300], &[200, 900]).unwrap();
        assert_eq!(tx.internal_exon_starts(), &[300]);
        assert_eq!(tx.internal_exon_ends(), &[200]);
        assert_eq!(tx.n_internal(), 1);
        assert_eq!(tx.strand, Strand::Minus);
        assert!(!tx.paralog_status);
    }

    #[test]
    fn paralog_status_uses_versioned_gene_id() {
        let mut tx = Transcript::from_candidate(&candidate(), &[100, 300], &[200, 900]).unwrap();

        let set = ParalogSet::from_ids(["ENSG01.3"]);
        assert!(tx.mark_paralog_status(&set));

        let set = ParalogSet::from_ids(["ENSG01.4"]);
        assert!(!tx.mark_paralog_status(&set));
        assert!(!tx.paralog_status);
    }
}
