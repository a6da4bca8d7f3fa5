//! Splice table assembly.
//!
//! The base splice table has one headerless tab-separated row per primary
//! transcript. Annotation joins every row against a [`SiteIndex`] and appends
//! the matched positions and PSI values as two more columns.

use std::collections::HashMap;
use std::fmt::Display;
use std::io::{Read, Write};
use std::num::NonZeroUsize;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::{Error, Result, RunSummary};
use crate::index::SiteIndex;
use crate::model::Transcript;
use crate::types::format_psi;

/// Columns of the base splice table used by the join.
pub const CHROM_COL: usize = 2;
pub const START_COL: usize = 4;
pub const END_COL: usize = 5;

/// Join items as `a,b,c,`. An empty list serializes to a single `,`.
pub fn join_list<T: Display>(items: impl IntoIterator<Item = T>) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str(&item.to_string());
        out.push(',');
    }
    if out.is_empty() {
        out.push(',');
    }
    out
}

/// One row of a splice table, kept as raw text fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceTableRow {
    fields: Vec<String>,
}

impl SpliceTableRow {
    pub fn from_fields(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// `transcript_id, paralog, seqname, strand, start, end, exon_end_sites, exon_start_sites`
    pub fn from_transcript(t: &Transcript) -> Self {
        Self {
            fields: vec![
                t.transcript_id.clone(),
                u8::from(t.paralog_status).to_string(),
                t.chrom.clone(),
                t.strand.to_string(),
                t.tx_start.to_string(),
                t.tx_end.to_string(),
                join_list(t.internal_exon_ends()),
                join_list(t.internal_exon_starts()),
            ],
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn chrom(&self) -> Option<&str> {
        self.fields.get(CHROM_COL).map(String::as_str)
    }

    /// Inclusive transcript span from the start/end columns.
    pub fn span(&self) -> Result<(i64, i64)> {
        let col = |i: usize, name: &str| -> Result<i64> {
            let raw = self
                .fields
                .get(i)
                .ok_or_else(|| Error::parse("splice table row", format!("missing {name} column")))?;
            raw.trim()
                .parse::<i64>()
                .map_err(|_| Error::parse("splice table row", format!("non-integer {name} '{raw}'")))
        };
        Ok((col(START_COL, "start")?, col(END_COL, "end")?))
    }

    pub fn to_line(&self) -> String {
        self.fields.join("\t")
    }
}

/// Read a headerless tab-separated splice table. Blank lines are ignored and
/// rows that are not valid UTF-8 are skipped.
pub fn read_splice_table<R: Read>(reader: R) -> Result<Vec<SpliceTableRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for rec in rdr.records() {
        let rec = match rec {
            Ok(rec) => rec,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                debug!("Skipping splice table row: {e}");
                skipped += 1;
                continue;
            }
        };
        if rec.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(SpliceTableRow::from_fields(
            rec.iter().map(str::to_string).collect(),
        ));
    }
    if skipped > 0 {
        warn!("Skipped {skipped} undecodable splice table rows");
    }
    Ok(rows)
}

pub fn write_splice_table<W: Write>(mut writer: W, rows: &[SpliceTableRow]) -> Result<usize> {
    for row in rows {
        writeln!(writer, "{}", row.to_line())?;
    }
    writer.flush()?;
    Ok(rows.len())
}

/// Write the base splice table for built transcripts, in the given order.
pub fn write_transcripts<W: Write>(writer: W, transcripts: &[Transcript]) -> Result<usize> {
    let rows: Vec<SpliceTableRow> = transcripts.iter().map(SpliceTableRow::from_transcript).collect();
    write_splice_table(writer, &rows)
}

/// A splice table row with its matched observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedTranscriptRow {
    pub row: SpliceTableRow,
    pub positions: String,
    pub psi_values: String,
}

impl AnnotatedTranscriptRow {
    /// True when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.positions == "," || self.psi_values == ","
    }

    pub fn to_line(&self) -> String {
        format!("{}\t{}\t{}", self.row.to_line(), self.positions, self.psi_values)
    }
}

pub fn write_annotated<W: Write>(mut writer: W, rows: &[AnnotatedTranscriptRow]) -> Result<usize> {
    for row in rows {
        writeln!(writer, "{}", row.to_line())?;
    }
    writer.flush()?;
    Ok(rows.len())
}

#[derive(Debug, Clone)]
pub struct JoinOptions {
    /// Worker threads for the join.
    pub threads: usize,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

/// Joins splice table rows against a site index.
pub struct SpliceTableAssembler<'a> {
    index: &'a SiteIndex,
    opts: JoinOptions,
}

impl<'a> SpliceTableAssembler<'a> {
    pub fn new(index: &'a SiteIndex) -> Self {
        Self {
            index,
            opts: JoinOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: JoinOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Match one row. Matches are in ascending position order.
    pub fn annotate_row(&self, row: &SpliceTableRow) -> Result<AnnotatedTranscriptRow> {
        let chrom = row
            .chrom()
            .ok_or_else(|| Error::parse("splice table row", "missing seqname column"))?;
        let (start, end) = row.span()?;
        let hits = self.index.query(chrom, start, end);

        Ok(AnnotatedTranscriptRow {
            row: row.clone(),
            positions: join_list(hits.iter().map(|e| e.position)),
            psi_values: join_list(hits.iter().map(|e| format_psi(e.psi))),
        })
    }

    /// Annotate all rows, dropping rows that fail to parse or match nothing.
    ///
    /// Rows are processed in per-chromosome groups on a local pool; output keeps input order.
    pub fn annotate(&self, rows: &[SpliceTableRow]) -> Result<(Vec<AnnotatedTranscriptRow>, RunSummary)> {
        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            groups.entry(row.chrom().unwrap_or("")).or_default().push(i);
        }
        let groups: Vec<Vec<usize>> = groups.into_values().collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.opts.threads.max(1))
            .build()?;

        let results: Vec<(Vec<(usize, AnnotatedTranscriptRow)>, RunSummary)> = pool.install(|| {
            groups
                .par_iter()
                .map(|idxs| self.annotate_group(rows, idxs))
                .collect()
        });

        let mut summary = RunSummary {
            rows_read: rows.len(),
            ..Default::default()
        };
        let mut out: Vec<(usize, AnnotatedTranscriptRow)> = Vec::with_capacity(rows.len());
        for (annotated, s) in results {
            summary.merge(&s);
            out.extend(annotated);
        }
        out.sort_by_key(|(i, _)| *i);
        summary.rows_emitted = out.len();

        if summary.rows_skipped > 0 {
            warn!("Skipped {} splice table rows with an unusable span", summary.rows_skipped);
        }
        info!(
            "Annotated {} of {} transcripts ({} without matches)",
            out.len(),
            rows.len(),
            summary.empty_matches
        );
        Ok((out.into_iter().map(|(_, r)| r).collect(), summary))
    }

    fn annotate_group(
        &self,
        rows: &[SpliceTableRow],
        idxs: &[usize],
    ) -> (Vec<(usize, AnnotatedTranscriptRow)>, RunSummary) {
        let mut summary = RunSummary::default();
        let mut out = Vec::with_capacity(idxs.len());
        for &i in idxs {
            match self.annotate_row(&rows[i]) {
                Ok(a) if a.is_empty() => summary.empty_matches += 1,
                Ok(a) => out.push((i, a)),
                Err(e) => {
                    debug!("splice table row {}: {e}", i + 1);
                    summary.rows_skipped += 1;
                }
            }
        }
        (out, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::SourceKind;
    use crate::types::SitePsi;
    use std::io::Cursor;

    fn index() -> SiteIndex {
        SiteIndex::from_sites(
            SourceKind::Leafcutter,
            vec![
                SitePsi::new("chr1", 900, 0.9),
                SitePsi::new("chr1", 480, 0.6),
                SitePsi::new("chr1", 150, 0.2),
                SitePsi::new("chr2", 200, 1.0),
            ],
        )
    }

    const TABLE: &str = "\
T1\t0\tchr1\t+\t100\t500\t200,\t300,
T2\t1\tchr1\t-\t1000\t2000\t1200,\t1300,
T3\t0\tchr2\t+\tNA\t500\t200,\t300,
T4\t0\tchr2\t-\t100\t300\t150,\t250,
";

    fn annotate(threads: usize) -> (Vec<AnnotatedTranscriptRow>, RunSummary) {
        let rows = read_splice_table(Cursor::new(TABLE.as_bytes())).unwrap();
        SpliceTableAssembler::new(&index())
            .with_options(JoinOptions { threads })
            .annotate(&rows)
            .unwrap()
    }

    #[test]
    fn join_list_keeps_trailing_comma() {
        assert_eq!(join_list([150, 480]), "150,480,");
        assert_eq!(join_list(Vec::<i64>::new()), ",");
    }

    #[test]
    fn transcript_span_matches_are_appended() {
        let (rows, summary) = annotate(2);
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].row.fields()[0], "T1");
        assert_eq!(rows[0].positions, "150,480,");
        assert_eq!(rows[0].psi_values, "0.2,0.6,");
        assert_eq!(
            rows[0].to_line(),
            "T1\t0\tchr1\t+\t100\t500\t200,\t300,\t150,480,\t0.2,0.6,"
        );

        assert_eq!(rows[1].row.fields()[0], "T4");
        assert_eq!(rows[1].psi_values, "1.0,");

        assert_eq!(summary.empty_matches, 1);
        assert_eq!(summary.rows_skipped, 1);
        assert_eq!(summary.rows_emitted, 2);
    }

    #[test]
    fn output_is_identical_across_runs_and_pool_sizes() {
        let render = |rows: Vec<AnnotatedTranscriptRow>| {
            let mut buf = Vec::new();
            write_annotated(&mut buf, &rows).unwrap();
            buf
        };
        let a = render(annotate(1).0);
        let b = render(annotate(4).0);
        assert_eq!(a, b);
    }

    #[test]
    fn non_utf8_splice_table_row_is_skipped() {
        let mut table = b"T1\t0\tchr1\t+\t100\t500\t200,\t300,\n".to_vec();
        table.extend_from_slice(b"T\xff\t0\tchr1\t+\t100\t500\t200,\t300,\n");
        let rows = read_splice_table(Cursor::new(table)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields()[0], "T1");
    }

    #[test]
    fn bad_span_is_a_parse_error() {
        let row = SpliceTableRow::from_fields(vec!["T".into(), "0".into(), "chr1".into()]);
        assert!(matches!(row.span(), Err(Error::Parse { .. })));
    }

    #[test]
    fn transcripts_serialize_to_base_table() {
        use crate::model::TranscriptCandidate;
        use crate::model::types::AppPriority;
        use crate::types::Strand;

        let cand = TranscriptCandidate {
            transcript_id: "ENST1".into(),
            gene_id: "ENSG1.3".into(),
            gene_name: Some("G".into()),
            seqname: "chr1".into(),
            strand: Strand::Minus,
            start: 100,
            end: 900,
            priority: AppPriority::UNTAGGED,
            order: 0,
        };
        let mut t = Transcript::from_candidate(&cand, &[100, 300, 600], &[200, 400, 900]).unwrap();
        t.paralog_status = true;

        let mut buf = Vec::new();
        write_transcripts(&mut buf, &[t]).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "ENST1\t1\tchr1\t-\t100\t900\t200,400,\t300,600,\n"
        );
    }

    #[test]
    fn gtf_to_annotated_table_roundtrip() {
        use crate::annotation::{AnnotationBuilder, ParalogSet};
        use crate::io::{create_writer, open_bufread};

        let dir = tempfile::tempdir().unwrap();
        let gtf = dir.path().join("genes.gtf");
        let table = dir.path().join("splice_table.tsv");

        let attrs = "gene_id \"G1.1\"; transcript_id \"T1\"; gene_type \"protein_coding\";";
        let gtf_text = format!(
            "#!genome-build test\n\
             chr1\tHAVANA\ttranscript\t100\t900\t.\t+\t.\t{attrs} tag \"appris_principal_1\";\n\
             chr1\tHAVANA\texon\t100\t200\t.\t+\t.\t{attrs}\n\
             chr1\tHAVANA\texon\t300\t400\t.\t+\t.\t{attrs}\n\
             chr1\tHAVANA\texon\t600\t900\t.\t+\t.\t{attrs}\n"
        );
        std::fs::write(&gtf, gtf_text).unwrap();

        let model = AnnotationBuilder::new()
            .build_from_path(&gtf, &ParalogSet::from_ids(["G1.1"]))
            .unwrap();
        assert_eq!(model.transcripts.len(), 1);
        write_transcripts(create_writer(&table).unwrap(), &model.transcripts).unwrap();

        let rows = read_splice_table(open_bufread(&table).unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].to_line(), "T1\t1\tchr1\t+\t100\t900\t200,400,\t300,600,");

        let idx = SiteIndex::from_sites(
            SourceKind::Rmats,
            vec![
                SitePsi::new("chr1", 200, 0.25),
                SitePsi::new("chr1", 950, 0.5),
                SitePsi::new("chr1", 600, 1.0),
                SitePsi::new("chr2", 300, 0.75),
            ],
        );
        let (annotated, summary) = SpliceTableAssembler::new(&idx).annotate(&rows).unwrap();
        assert_eq!(summary.rows_emitted, 1);

        let mut out = Vec::new();
        write_annotated(&mut out, &annotated).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "T1\t1\tchr1\t+\t100\t900\t200,400,\t300,600,\t200,600,\t0.25,1.0,\n"
        );
    }
}
