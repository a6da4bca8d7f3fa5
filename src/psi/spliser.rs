//! SpliSER splice-site strength estimates.
//!
//! The combined SpliSER table has one row per site and, per sample, a block of
//! columns whose names end in `SSE`, `alpha` or `beta`. Each row is reduced to
//! the mean of each block.

use std::io::Read;
use std::path::Path;

use log::{debug, info, warn};

use crate::error::{Error, Result, RunSummary};
use crate::io::open_bufread;
use crate::psi::{QuantificationSource, SourceKind};
use crate::types::{mean_defined, parse_optional_f64, SitePsi};

/// One SpliSER site with its sample means.
#[derive(Debug, Clone, PartialEq)]
pub struct SpliserSite {
    pub region: String,
    pub site: i64,
    pub strand: String,
    pub gene: String,
    pub mean_sse: f64,
    pub mean_alpha: Option<f64>,
    pub mean_beta: Option<f64>,
}

struct SpliserColumns {
    region: usize,
    site: usize,
    strand: usize,
    gene: usize,
    sse: Vec<usize>,
    alpha: Vec<usize>,
    beta: Vec<usize>,
}

impl SpliserColumns {
    fn locate(headers: &csv::StringRecord, origin: &Path) -> Result<Self> {
        let require = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| Error::schema(origin, format!("SpliSER table lacks column '{name}'")))
        };
        let suffixed = |suffix: &str| -> Vec<usize> {
            headers
                .iter()
                .enumerate()
                .filter(|(_, h)| h.trim().ends_with(suffix) && !h.trim().starts_with("mean_"))
                .map(|(i, _)| i)
                .collect()
        };

        let cols = Self {
            region: require("Region")?,
            site: require("Site")?,
            strand: require("Strand")?,
            gene: require("Gene")?,
            sse: suffixed("SSE"),
            alpha: suffixed("alpha"),
            beta: suffixed("beta"),
        };
        if cols.sse.is_empty() {
            return Err(Error::schema(origin, "no column ending in 'SSE'"));
        }
        Ok(cols)
    }

    fn mean_of(rec: &csv::StringRecord, cols: &[usize]) -> Option<Option<f64>> {
        let mut values = Vec::with_capacity(cols.len());
        for &i in cols {
            values.push(parse_optional_f64(rec.get(i).unwrap_or("")).ok()?);
        }
        Some(mean_defined(values))
    }
}

/// Mean SSE per site.
#[derive(Debug, Clone, Default)]
pub struct SpliserSites {
    pub sites: Vec<SpliserSite>,
    pub summary: RunSummary,
}

impl SpliserSites {
    /// Read a tab-separated SpliSER table.
    ///
    /// Rows with a non-numeric site or value are skipped; rows without any
    /// defined SSE are dropped.
    pub fn from_reader<R: Read>(reader: R, origin: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();
        let cols = SpliserColumns::locate(&headers, origin)?;
        debug!(
            "SpliSER columns: {} SSE, {} alpha, {} beta",
            cols.sse.len(),
            cols.alpha.len(),
            cols.beta.len()
        );

        let mut summary = RunSummary::default();
        let mut sites = Vec::new();
        for rec in rdr.records() {
            summary.rows_read += 1;
            let rec = match rec {
                Ok(rec) => rec,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    debug!("SpliSER row {}: {e}", summary.rows_read);
                    summary.rows_skipped += 1;
                    continue;
                }
            };
            let field = |i: usize| rec.get(i).map(str::trim).unwrap_or("");

            let Ok(site) = field(cols.site).parse::<i64>() else {
                debug!("SpliSER row {}: bad site '{}'", summary.rows_read, field(cols.site));
                summary.rows_skipped += 1;
                continue;
            };
            let (Some(sse), Some(alpha), Some(beta)) = (
                SpliserColumns::mean_of(&rec, &cols.sse),
                SpliserColumns::mean_of(&rec, &cols.alpha),
                SpliserColumns::mean_of(&rec, &cols.beta),
            ) else {
                debug!("SpliSER row {}: non-numeric value", summary.rows_read);
                summary.rows_skipped += 1;
                continue;
            };
            let Some(mean_sse) = sse else {
                summary.undefined_psi += 1;
                continue;
            };

            sites.push(SpliserSite {
                region: field(cols.region).to_string(),
                site,
                strand: field(cols.strand).to_string(),
                gene: field(cols.gene).to_string(),
                mean_sse,
                mean_alpha: alpha,
                mean_beta: beta,
            });
        }

        if summary.rows_skipped > 0 {
            warn!("Skipped {} malformed SpliSER rows", summary.rows_skipped);
        }
        summary.rows_emitted = sites.len();
        info!(
            "SpliSER: {} rows -> {} sites with defined SSE",
            summary.rows_read,
            sites.len()
        );
        Ok(Self { sites, summary })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_reader(open_bufread(path)?, path)
    }
}

impl QuantificationSource for SpliserSites {
    fn kind(&self) -> SourceKind {
        SourceKind::Spliser
    }

    fn site_psi(&self) -> Result<Vec<SitePsi>> {
        Ok(self
            .sites
            .iter()
            .map(|s| SitePsi::new(s.region.clone(), s.site, s.mean_sse))
            .collect())
    }
}
