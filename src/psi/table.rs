//! Per-source intermediate CSV tables.
//!
//! Each adapter writes its normalized sites as a comma-separated table with a
//! header. `annotate` reads them back through [`PsiTable`].

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, RunSummary};
use crate::io::open_bufread;
use crate::psi::aggregate::ClusterAccumulator;
use crate::psi::rmats::RmatsSite;
use crate::psi::spliser::SpliserSite;
use crate::psi::{QuantificationSource, SourceKind};
use crate::types::{BoundaryType, SitePsi};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafcutterSiteRow {
    pub cluster_id: String,
    pub position: i64,
    #[serde(rename = "type")]
    pub boundary: BoundaryType,
    pub psi: f64,
    pub intron_info: String,
    pub chromosome: String,
    pub strand: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmatsSiteRow {
    pub splice_site: i64,
    pub chr: String,
    #[serde(rename = "geneSymbol")]
    pub gene_symbol: String,
    pub average_psi_across_samples: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpliserSiteRow {
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Site")]
    pub site: i64,
    #[serde(rename = "Strand")]
    pub strand: String,
    #[serde(rename = "Gene")]
    pub gene: String,
    #[serde(rename = "mean_SSE")]
    pub mean_sse: f64,
    pub mean_alpha: Option<f64>,
    pub mean_beta: Option<f64>,
}

/// Rows that carry a normalized site observation.
trait SiteRow: DeserializeOwned {
    fn site(self) -> SitePsi;
}

impl SiteRow for LeafcutterSiteRow {
    fn site(self) -> SitePsi {
        SitePsi::new(self.chromosome, self.position, self.psi)
    }
}

impl SiteRow for RmatsSiteRow {
    fn site(self) -> SitePsi {
        SitePsi::new(self.chr, self.splice_site, self.average_psi_across_samples)
    }
}

impl SiteRow for SpliserSiteRow {
    fn site(self) -> SitePsi {
        SitePsi::new(self.region, self.site, self.mean_sse)
    }
}

fn write_rows<W: Write, T: Serialize>(writer: W, rows: impl IntoIterator<Item = T>) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut n = 0;
    for row in rows {
        wtr.serialize(row)?;
        n += 1;
    }
    wtr.flush()?;
    Ok(n)
}

/// `cluster_id, position, type, psi, intron_info, chromosome, strand`
pub fn write_leafcutter<W: Write>(writer: W, clusters: &ClusterAccumulator) -> Result<usize> {
    write_rows(
        writer,
        clusters.iter().map(|(k, s)| LeafcutterSiteRow {
            cluster_id: k.cluster_id.clone(),
            position: k.position,
            boundary: k.boundary,
            psi: s.psi,
            intron_info: s.intron_info.clone(),
            chromosome: s.chrom.clone(),
            strand: s.strand.to_string(),
        }),
    )
}

/// `splice_site, chr, geneSymbol, average_psi_across_samples`
pub fn write_rmats<W: Write>(writer: W, sites: &[RmatsSite]) -> Result<usize> {
    write_rows(
        writer,
        sites.iter().map(|s| RmatsSiteRow {
            splice_site: s.key.position,
            chr: s.key.chrom.clone(),
            gene_symbol: s.key.gene_symbol.clone(),
            average_psi_across_samples: s.psi,
        }),
    )
}

/// `Region, Site, Strand, Gene, mean_SSE, mean_alpha, mean_beta`
pub fn write_spliser<W: Write>(writer: W, sites: &[SpliserSite]) -> Result<usize> {
    write_rows(
        writer,
        sites.iter().map(|s| SpliserSiteRow {
            region: s.region.clone(),
            site: s.site,
            strand: s.strand.clone(),
            gene: s.gene.clone(),
            mean_sse: s.mean_sse,
            mean_alpha: s.mean_alpha,
            mean_beta: s.mean_beta,
        }),
    )
}

fn read_rows<R: Read, T: SiteRow>(reader: R) -> Result<(Vec<SitePsi>, RunSummary)> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut summary = RunSummary::default();
    let mut sites = Vec::new();
    for row in rdr.deserialize::<T>() {
        summary.rows_read += 1;
        match row {
            Ok(r) => {
                let site = r.site();
                if site.psi.is_nan() {
                    summary.undefined_psi += 1;
                    continue;
                }
                sites.push(site);
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                debug!("skipping PSI row: {e}");
                summary.rows_skipped += 1;
            }
        }
    }
    summary.rows_emitted = sites.len();
    Ok((sites, summary))
}

/// Read the normalized sites of an intermediate table written by this crate.
pub fn read_sites<R: Read>(kind: SourceKind, reader: R) -> Result<(Vec<SitePsi>, RunSummary)> {
    match kind {
        SourceKind::Leafcutter => read_rows::<R, LeafcutterSiteRow>(reader),
        SourceKind::Rmats => read_rows::<R, RmatsSiteRow>(reader),
        SourceKind::Spliser => read_rows::<R, SpliserSiteRow>(reader),
    }
}

/// An intermediate table on disk, read lazily.
#[derive(Debug, Clone)]
pub struct PsiTable {
    pub kind: SourceKind,
    pub path: PathBuf,
}

impl PsiTable {
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QuantificationSource for PsiTable {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn site_psi(&self) -> Result<Vec<SitePsi>> {
        let reader = open_bufread(&self.path)?;
        let (sites, summary) = read_sites(self.kind, reader)?;
        if summary.rows_read > 0 && sites.is_empty() && summary.rows_skipped == summary.rows_read {
            return Err(Error::schema(
                &self.path,
                format!("no row matches the {} table layout", self.kind),
            ));
        }
        if summary.rows_skipped > 0 {
            warn!(
                "Skipped {} malformed rows in {}",
                summary.rows_skipped,
                self.path.display()
            );
        }
        info!(
            "Loaded {} {} sites from {}",
            sites.len(),
            self.kind,
            self.path.display()
        );
        Ok(sites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::aggregate::ClusterKey;
    use crate::psi::rmats::SiteKey;
    use crate::types::Strand;
    use std::io::Cursor;

    #[test]
    fn leafcutter_table_layout() {
        let mut acc = ClusterAccumulator::new();
        acc.add(
            ClusterKey::new("clu_1", 500, BoundaryType::ExonStart),
            1.0,
            "chr1:100:499:clu_1_+",
            "chr1",
            Strand::Plus,
        );
        let mut buf = Vec::new();
        assert_eq!(write_leafcutter(&mut buf, &acc).unwrap(), 1);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "cluster_id,position,type,psi,intron_info,chromosome,strand\nclu_1,500,exon_start,1.0,chr1:100:499:clu_1_+,chr1,+\n"
        );

        let (sites, _) = read_sites(SourceKind::Leafcutter, Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(sites, vec![SitePsi::new("chr1", 500, 1.0)]);
    }

    #[test]
    fn rmats_table_layout() {
        let sites = vec![RmatsSite {
            key: SiteKey {
                position: 150,
                chrom: "chr1".into(),
                gene_symbol: "G".into(),
            },
            psi: 0.25,
        }];
        let mut buf = Vec::new();
        write_rmats(&mut buf, &sites).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("splice_site,chr,geneSymbol,average_psi_across_samples\n"));
        assert!(text.ends_with("150,chr1,G,0.25\n"));
    }

    #[test]
    fn spliser_missing_means_are_empty_cells() {
        let sites = vec![SpliserSite {
            region: "chr2".into(),
            site: 9,
            strand: "-".into(),
            gene: "G".into(),
            mean_sse: 0.5,
            mean_alpha: None,
            mean_beta: Some(2.0),
        }];
        let mut buf = Vec::new();
        write_spliser(&mut buf, &sites).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("chr2,9,-,G,0.5,,2.0\n"));

        let (read, _) = read_sites(SourceKind::Spliser, Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(read, vec![SitePsi::new("chr2", 9, 0.5)]);
    }

    #[test]
    fn malformed_rows_are_counted_not_fatal() {
        let text = "splice_site,chr,geneSymbol,average_psi_across_samples\nabc,chr1,G,0.1\n10,chr1,G,0.2\n";
        let (sites, summary) = read_sites(SourceKind::Rmats, Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(sites, vec![SitePsi::new("chr1", 10, 0.2)]);
        assert_eq!(summary.rows_skipped, 1);
    }

    #[test]
    fn wrong_layout_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("psi.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let err = PsiTable::new(SourceKind::Leafcutter, &path)
            .site_psi()
            .unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }
}
