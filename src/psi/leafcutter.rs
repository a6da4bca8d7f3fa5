//! LeafCutter cluster PSI.
//!
//! The input has one row per intron. The row key encodes the intron as
//! `chrom:start:end:clu_<n>_<strand>` and every other column is the PSI of one
//! replicate. Introns are averaged across replicates, then summed per cluster
//! boundary.

use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info, warn};

use crate::error::{Error, Result, RunSummary};
use crate::io::open_bufread;
use crate::psi::aggregate::{ClusterAccumulator, ClusterKey};
use crate::psi::{QuantificationSource, SourceKind};
use crate::types::{mean_defined, parse_optional_f64, BoundaryType, SitePsi, Strand};

/// Decoded intron row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntronKey {
    pub chrom: String,
    pub intron_start: i64,
    pub intron_end: i64,
    pub cluster_id: String,
    pub strand: Strand,
}

impl IntronKey {
    /// Last base of the upstream exon.
    pub fn exon_end(&self) -> i64 {
        self.intron_start - 1
    }

    /// First base of the downstream exon.
    pub fn exon_start(&self) -> i64 {
        self.intron_end + 1
    }
}

impl FromStr for IntronKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = |msg: &str| Error::parse(format!("intron key '{s}'"), msg.to_string());

        let fields: Vec<&str> = s.trim().split(':').collect();
        if fields.len() != 4 {
            return Err(bad("expected chrom:start:end:cluster_strand"));
        }
        let intron_start: i64 = fields[1].parse().map_err(|_| bad("non-numeric intron start"))?;
        let intron_end: i64 = fields[2].parse().map_err(|_| bad("non-numeric intron end"))?;

        let cluster_strand = fields[3];
        let strand_sym = cluster_strand
            .get(cluster_strand.len().saturating_sub(1)..)
            .ok_or_else(|| bad("empty cluster field"))?;
        let strand = Strand::from_symbol(strand_sym).ok_or_else(|| bad("missing strand suffix"))?;
        let cluster_id = cluster_strand[..cluster_strand.len() - 1]
            .trim_end_matches('_')
            .to_string();
        if cluster_id.is_empty() {
            return Err(bad("empty cluster id"));
        }

        Ok(IntronKey {
            chrom: fields[0].to_string(),
            intron_start,
            intron_end,
            cluster_id,
            strand,
        })
    }
}

/// One intron with its replicate-averaged PSI.
#[derive(Debug, Clone, PartialEq)]
pub struct IntronPsi {
    pub intron_info: String,
    pub key: IntronKey,
    /// `None` when every replicate is missing.
    pub average_psi: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
enum Delimiter {
    Tab,
    Comma,
    Whitespace,
}

impl Delimiter {
    fn sniff(header: &str) -> Self {
        if header.contains('\t') {
            Delimiter::Tab
        } else if header.contains(',') {
            Delimiter::Comma
        } else {
            Delimiter::Whitespace
        }
    }

    fn split<'a>(self, line: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::Tab => line.split('\t').collect(),
            Delimiter::Comma => line.split(',').collect(),
            Delimiter::Whitespace => line.split_whitespace().collect(),
        }
    }
}

/// Read a LeafCutter PSI table.
///
/// The header may omit the row-key column (R row names) or name it; the
/// delimiter is detected from the header. Rows with an undecodable key or a
/// non-numeric PSI cell are skipped.
pub fn read_intron_table<R: BufRead>(reader: R) -> Result<(Vec<IntronPsi>, RunSummary)> {
    let mut summary = RunSummary::default();
    let mut lines = reader.split(b'\n');

    let header = loop {
        match lines.next() {
            None => return Ok((Vec::new(), summary)),
            Some(line) => {
                let line = String::from_utf8(line?)
                    .map_err(|_| Error::parse("LeafCutter header", "invalid UTF-8"))?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
        }
    };
    let delim = Delimiter::sniff(&header);
    let n_header = delim.split(header.trim_end_matches('\r')).len();

    let mut introns = Vec::new();
    for (i, line) in lines.enumerate() {
        let bytes = line?;
        let Ok(line) = std::str::from_utf8(&bytes) else {
            debug!("LeafCutter row {}: invalid UTF-8", i + 2);
            summary.rows_read += 1;
            summary.rows_skipped += 1;
            continue;
        };
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        summary.rows_read += 1;

        let fields = delim.split(line);
        // An unnamed key column makes data rows one field wider than the header.
        if fields.len() != n_header && fields.len() != n_header + 1 {
            debug!("LeafCutter row {}: {} fields, header has {}", i + 2, fields.len(), n_header);
            summary.rows_skipped += 1;
            continue;
        }

        let intron_info = fields[0].trim().trim_matches('"');
        let key = match intron_info.parse::<IntronKey>() {
            Ok(k) => k,
            Err(e) => {
                debug!("LeafCutter row {}: {e}", i + 2);
                summary.rows_skipped += 1;
                continue;
            }
        };

        let replicates: std::result::Result<Vec<Option<f64>>, _> =
            fields[1..].iter().map(|v| parse_optional_f64(v.trim_matches('"'))).collect();
        let Ok(replicates) = replicates else {
            debug!("LeafCutter row {}: non-numeric PSI", i + 2);
            summary.rows_skipped += 1;
            continue;
        };

        let average_psi = mean_defined(replicates);
        if average_psi.is_none() {
            summary.undefined_psi += 1;
        }
        introns.push(IntronPsi {
            intron_info: intron_info.to_string(),
            key,
            average_psi,
        });
    }

    Ok((introns, summary))
}

/// Sum intron PSI onto both flanking exon boundaries of every intron.
///
/// Introns with undefined PSI contribute nothing. Per intron the
/// `exon_start` entry is registered before the `exon_end` entry.
pub fn accumulate_clusters(introns: &[IntronPsi]) -> ClusterAccumulator {
    let mut acc = ClusterAccumulator::new();
    for intron in introns {
        let Some(psi) = intron.average_psi else {
            continue;
        };
        let k = &intron.key;
        for (position, boundary) in [
            (k.exon_start(), BoundaryType::ExonStart),
            (k.exon_end(), BoundaryType::ExonEnd),
        ] {
            acc.add(
                ClusterKey::new(k.cluster_id.clone(), position, boundary),
                psi,
                &intron.intron_info,
                &k.chrom,
                k.strand,
            );
        }
    }
    acc
}

/// Normalized LeafCutter sites.
#[derive(Debug, Clone, Default)]
pub struct LeafcutterSites {
    pub clusters: ClusterAccumulator,
    pub summary: RunSummary,
}

impl LeafcutterSites {
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let (introns, mut summary) = read_intron_table(reader)?;
        if introns.is_empty() && summary.rows_read > 0 {
            return Err(Error::schema(
                "<leafcutter table>",
                "no row key could be decoded as chrom:start:end:cluster_strand",
            ));
        }
        let clusters = accumulate_clusters(&introns);
        summary.rows_emitted = clusters.len();
        if summary.rows_skipped > 0 {
            warn!("Skipped {} malformed LeafCutter rows", summary.rows_skipped);
        }
        info!(
            "LeafCutter: {} introns -> {} cluster sites",
            introns.len(),
            clusters.len()
        );
        Ok(Self { clusters, summary })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let reader = open_bufread(path)?;
        Self::from_reader(reader).map_err(|e| match e {
            Error::Schema { message, .. } => Error::schema(path, message),
            other => other,
        })
    }
}

impl QuantificationSource for LeafcutterSites {
    fn kind(&self) -> SourceKind {
        SourceKind::Leafcutter
    }

    fn site_psi(&self) -> Result<Vec<SitePsi>> {
        Ok(self.clusters.site_psi())
    }
}
