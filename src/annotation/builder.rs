use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use log::{debug, info, warn};

use crate::annotation::io::{AnnotationReader, AnnotationRecord};
use crate::annotation::paralog::ParalogSet;
use crate::error::{Error, Result, RunSummary};
use crate::io::open_bufread;
use crate::model::gene::{Gene, TranscriptCandidate};
use crate::model::transcript::Transcript;
use crate::model::types::AppPriority;

/// Which attribute keys and feature names drive the model.
///
/// Defaults follow GENCODE GTF conventions.
#[derive(Debug, Clone)]
pub struct AnnotationKeys {
    pub gene_id_key: String,
    pub gene_name_key: String,
    pub gene_type_key: String,
    pub transcript_id_key: String,
    pub tag_key: String,

    /// Only genes with this `gene_type` take part in primary selection.
    pub gene_type: String,

    pub transcript_feature: String,
    pub exon_feature: String,
}

impl Default for AnnotationKeys {
    fn default() -> Self {
        Self {
            gene_id_key: "gene_id".into(),
            gene_name_key: "gene_name".into(),
            gene_type_key: "gene_type".into(),
            transcript_id_key: "transcript_id".into(),
            tag_key: "tag".into(),
            gene_type: "protein_coding".into(),
            transcript_feature: "transcript".into(),
            exon_feature: "exon".into(),
        }
    }
}

/// Exon coordinates collected per transcript id.
#[derive(Debug, Clone, Default)]
struct ExonSites {
    starts: Vec<i64>,
    ends: Vec<i64>,
}

/// Primary transcripts of an annotation, in annotation order.
#[derive(Debug, Clone, Default)]
pub struct AnnotationModel {
    pub transcripts: Vec<Transcript>,
    pub n_genes: usize,
    pub summary: RunSummary,
}

/// Builds an [`AnnotationModel`] from a GTF file.
///
/// - parses the whole file (optionally gzipped)
/// - keeps one primary transcript per protein-coding gene
/// - derives internal exon boundaries and paralog status
#[derive(Debug, Clone, Default)]
pub struct AnnotationBuilder {
    pub keys: AnnotationKeys,
}

impl AnnotationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gene_type(mut self, gene_type: &str) -> Self {
        self.keys.gene_type = gene_type.to_string();
        self
    }

    pub fn gene_id_key(mut self, key: &str) -> Self {
        self.keys.gene_id_key = key.to_string();
        self
    }

    pub fn transcript_id_key(mut self, key: &str) -> Self {
        self.keys.transcript_id_key = key.to_string();
        self
    }

    /// Build the model from anything implementing `BufRead`.
    ///
    /// Malformed lines and transcript rows lacking ids are skipped and counted;
    /// only read failures abort.
    pub fn build_from_reader<R: BufRead>(
        &self,
        reader: R,
        paralogs: &ParalogSet,
    ) -> Result<AnnotationModel> {
        let keys = &self.keys;
        let mut summary = RunSummary::default();

        let mut exons: HashMap<String, ExonSites> = HashMap::new();
        let mut genes: HashMap<String, Gene> = HashMap::new();
        let mut gene_order: Vec<String> = Vec::new();
        let mut n_candidates = 0usize;

        for rec in AnnotationReader::new(reader).records() {
            let rec = match rec {
                Ok(rec) => rec,
                Err(e @ Error::Parse { .. }) => {
                    debug!("Skipping annotation record: {e}");
                    summary.rows_skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            summary.rows_read += 1;

            if rec.is_feature(&keys.exon_feature) {
                let Some(tx_id) = rec.attr(&keys.transcript_id_key) else {
                    summary.rows_skipped += 1;
                    continue;
                };
                let sites = exons.entry(tx_id.to_string()).or_default();
                sites.starts.push(rec.start);
                sites.ends.push(rec.end);
            } else if rec.is_feature(&keys.transcript_feature)
                && rec.attr(&keys.gene_type_key) == Some(keys.gene_type.as_str())
            {
                let Some(candidate) = self.candidate_from_record(&rec, n_candidates) else {
                    debug!(
                        "Skipping transcript on line {}: missing gene or transcript id",
                        rec.line_no
                    );
                    summary.rows_skipped += 1;
                    continue;
                };
                n_candidates += 1;

                let gene = genes.entry(candidate.gene_id.clone()).or_insert_with(|| {
                    gene_order.push(candidate.gene_id.clone());
                    Gene::new(candidate.gene_id.clone(), None)
                });
                gene.add_candidate(candidate);
            }
        }

        let mut primaries: Vec<&TranscriptCandidate> = gene_order
            .iter()
            .filter_map(|gid| genes.get(gid))
            .filter_map(Gene::select_primary_transcript)
            .collect();
        primaries.sort_by_key(|c| c.order);

        let mut transcripts = Vec::with_capacity(primaries.len());
        for cand in primaries {
            let built = exons
                .get(&cand.transcript_id)
                .and_then(|sites| Transcript::from_candidate(cand, &sites.starts, &sites.ends));
            match built {
                Some(mut tx) => {
                    tx.mark_paralog_status(paralogs);
                    transcripts.push(tx);
                }
                None => {
                    debug!("Dropping {}: fewer than two exons", cand.transcript_id);
                    summary.single_exon += 1;
                }
            }
        }
        summary.rows_emitted = transcripts.len();

        if summary.rows_skipped > 0 {
            warn!("Skipped {} malformed annotation records", summary.rows_skipped);
        }
        info!(
            "Selected {} primary transcripts from {} {} genes",
            transcripts.len(),
            genes.len(),
            keys.gene_type
        );

        Ok(AnnotationModel {
            transcripts,
            n_genes: genes.len(),
            summary,
        })
    }

    /// Build the model from a file path; `.gz` is decompressed on the fly.
    pub fn build_from_path<P: AsRef<Path>>(
        &self,
        path: P,
        paralogs: &ParalogSet,
    ) -> Result<AnnotationModel> {
        let path = path.as_ref();
        info!("Reading annotation {}", path.display());
        let reader = open_bufread(path)?;
        self.build_from_reader(reader, paralogs)
    }

    fn candidate_from_record(
        &self,
        rec: &AnnotationRecord,
        order: usize,
    ) -> Option<TranscriptCandidate> {
        let keys = &self.keys;
        let transcript_id = rec.attr(&keys.transcript_id_key)?.to_string();
        let gene_id = rec.attr(&keys.gene_id_key)?.to_string();
        Some(TranscriptCandidate {
            transcript_id,
            gene_id,
            gene_name: rec.attr(&keys.gene_name_key).map(str::to_string),
            seqname: rec.seqname.clone(),
            strand: rec.strand,
            start: rec.start,
            end: rec.end,
            priority: AppPriority::from_tags(rec.attrs.get_all(&keys.tag_key)),
            order,
        })
    }
}

// -------------------- tests --------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Strand;
    use std::io::Cursor;

    const PC: &str = "gene_type \"protein_coding\";";

    fn tx_line(chr: &str, start: i64, end: i64, strand: &str, gene: &str, tx: &str, extra: &str) -> String {
        format!(
            "{chr}\tHAVANA\ttranscript\t{start}\t{end}\t.\t{strand}\t.\tgene_id \"{gene}\"; transcript_id \"{tx}\"; gene_name \"N{gene}\"; {PC} {extra}\n"
        )
    }

    fn exon_line(chr: &str, start: i64, end: i64, strand: &str, gene: &str, tx: &str) -> String {
        format!(
            "{chr}\tHAVANA\texon\t{start}\t{end}\t.\t{strand}\t.\tgene_id \"{gene}\"; transcript_id \"{tx}\"; {PC}\n"
        )
    }

    fn build(gtf: &str, paralogs: &ParalogSet) -> AnnotationModel {
        AnnotationBuilder::new()
            .build_from_reader(Cursor::new(gtf.as_bytes()), paralogs)
            .unwrap()
    }

    #[test]
    fn selects_appris_principal_and_trims_boundaries() {
        let mut gtf = String::new();
        gtf += &tx_line("chr1", 100, 900, "+", "G1.1", "T1", "tag \"basic\";");
        gtf += &exon_line("chr1", 100, 200, "+", "G1.1", "T1");
        gtf += &exon_line("chr1", 800, 900, "+", "G1.1", "T1");
        gtf += &tx_line("chr1", 100, 700, "+", "G1.1", "T2", "tag \"basic\"; tag \"appris_principal_1\";");
        gtf += &exon_line("chr1", 100, 200, "+", "G1.1", "T2");
        gtf += &exon_line("chr1", 300, 400, "+", "G1.1", "T2");
        gtf += &exon_line("chr1", 600, 700, "+", "G1.1", "T2");

        let model = build(&gtf, &ParalogSet::from_ids(["G1.1"]));
        assert_eq!(model.transcripts.len(), 1);
        let tx = &model.transcripts[0];
        assert_eq!(tx.transcript_id, "T2");
        assert_eq!(tx.gene_name.as_deref(), Some("NG1.1"));
        assert_eq!(tx.internal_exon_starts(), &[300, 600]);
        assert_eq!(tx.internal_exon_ends(), &[200, 400]);
        assert!(tx.paralog_status);
    }

    #[test]
    fn exactly_one_primary_per_gene_in_annotation_order() {
        let mut gtf = String::new();
        gtf += &tx_line("chr2", 50, 500, "-", "G2.1", "T20", "");
        gtf += &exon_line("chr2", 50, 100, "-", "G2.1", "T20");
        gtf += &exon_line("chr2", 400, 500, "-", "G2.1", "T20");
        gtf += &tx_line("chr1", 10, 90, "+", "G1.1", "T10", "");
        gtf += &exon_line("chr1", 10, 20, "+", "G1.1", "T10");
        gtf += &exon_line("chr1", 80, 90, "+", "G1.1", "T10");
        gtf += &tx_line("chr2", 60, 600, "-", "G2.1", "T21", "");
        gtf += &exon_line("chr2", 60, 100, "-", "G2.1", "T21");
        gtf += &exon_line("chr2", 500, 600, "-", "G2.1", "T21");

        let model = build(&gtf, &ParalogSet::default());
        let ids: Vec<_> = model.transcripts.iter().map(|t| t.transcript_id.as_str()).collect();
        // T21 wins G2 (end 600 > 500) and keeps its own position after T10
        assert_eq!(ids, vec!["T10", "T21"]);
        assert_eq!(model.n_genes, 2);
        assert_eq!(model.transcripts[1].strand, Strand::Minus);
        assert!(!model.transcripts[0].paralog_status);
    }

    #[test]
    fn non_coding_genes_and_single_exon_primaries_are_dropped() {
        let mut gtf = String::new();
        gtf += "chr1\tENSEMBL\ttranscript\t1\t500\t.\t+\t.\tgene_id \"L1\"; transcript_id \"TL\"; gene_type \"lncRNA\";\n";
        gtf += "chr1\tENSEMBL\texon\t1\t100\t.\t+\t.\tgene_id \"L1\"; transcript_id \"TL\"; gene_type \"lncRNA\";\n";
        gtf += "chr1\tENSEMBL\texon\t400\t500\t.\t+\t.\tgene_id \"L1\"; transcript_id \"TL\"; gene_type \"lncRNA\";\n";
        gtf += &tx_line("chr1", 1000, 2000, "+", "G3.1", "T30", "tag \"appris_principal_1\";");
        gtf += &exon_line("chr1", 1000, 2000, "+", "G3.1", "T30");

        let model = build(&gtf, &ParalogSet::default());
        assert!(model.transcripts.is_empty());
        assert_eq!(model.summary.single_exon, 1);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let mut gtf = String::new();
        gtf += "chr1\tHAVANA\ttranscript\tabc\t900\t.\t+\t.\tgene_id \"G1.1\"; transcript_id \"T1\"; gene_type \"protein_coding\";\n";
        gtf += "chr1\tHAVANA\ttranscript\t100\t900\t.\t+\t.\tgene_type \"protein_coding\";\n";
        gtf += &tx_line("chr1", 100, 900, "+", "G1.1", "T2", "");
        gtf += &exon_line("chr1", 100, 200, "+", "G1.1", "T2");
        gtf += &exon_line("chr1", 300, 900, "+", "G1.1", "T2");

        let model = build(&gtf, &ParalogSet::default());
        assert_eq!(model.transcripts.len(), 1);
        assert_eq!(model.transcripts[0].transcript_id, "T2");
        assert_eq!(model.summary.rows_skipped, 2);
    }
}
