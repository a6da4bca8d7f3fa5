use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io::create_writer;
use crate::psi::{QuantificationSource, SourceKind};
use crate::types::SitePsi;

const MAGIC: &[u8; 4] = b"SPI1";
const VERSION_STR: &str = env!("CARGO_PKG_VERSION");

/// One indexed observation. The chromosome is implied by the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub position: i64,
    pub psi: f64,
}

/// Observations of one chromosome, sorted by position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChrSites {
    entries: Vec<SiteEntry>,
}

impl ChrSites {
    fn push(&mut self, position: i64, psi: f64) {
        self.entries.push(SiteEntry { position, psi });
    }

    /// Stable, so equal positions keep their insertion order.
    fn finalize(&mut self) {
        self.entries.sort_by_key(|e| e.position);
    }

    pub fn entries(&self) -> &[SiteEntry] {
        &self.entries
    }

    /// Entries with `start <= position <= end`.
    pub fn range(&self, start: i64, end: i64) -> &[SiteEntry] {
        if start > end {
            return &[];
        }
        let lo = self.entries.partition_point(|e| e.position < start);
        let hi = self.entries.partition_point(|e| e.position <= end);
        &self.entries[lo..hi]
    }
}

/// The owning index type:
/// - chromosome dictionary (chr name -> chr_id)
/// - per-chromosome position-sorted observations
///
/// The index is read-only once built, so join workers share it by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteIndex {
    pub source: SourceKind,

    pub chr_names: Vec<String>,
    chr_to_id: HashMap<String, usize>,

    pub chr_sites: Vec<ChrSites>,
}

/// Human-readable summary of the `SiteIndex`.
///
/// Prints the source and totals, then per chromosome the number of sites,
/// the covered position range and the mean PSI.
impl fmt::Display for SiteIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "SiteIndex: {} sites from {}, {} chromosomes",
            self.len(),
            self.source,
            self.chr_names.len()
        )?;

        for (chr_name, chr) in self.chr_names.iter().zip(&self.chr_sites) {
            let entries = chr.entries();
            let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
                writeln!(f, "  - {chr_name}: sites=0")?;
                continue;
            };
            let mean_psi = entries.iter().map(|e| e.psi).sum::<f64>() / entries.len() as f64;
            writeln!(
                f,
                "  - {}: sites={}, span={}-{}, mean_psi={:.3}",
                chr_name,
                entries.len(),
                first.position,
                last.position,
                mean_psi
            )?;
        }

        Ok(())
    }
}

impl SiteIndex {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            chr_names: Vec::new(),
            chr_to_id: HashMap::new(),
            chr_sites: Vec::new(),
        }
    }

    /// Build an index from normalized observations.
    ///
    /// Chromosome order is first-seen order of the input.
    pub fn from_sites(source: SourceKind, sites: impl IntoIterator<Item = SitePsi>) -> Self {
        let mut idx = Self::new(source);
        for s in sites {
            let chr_id = idx.intern_chr(&s.chrom);
            idx.chr_sites[chr_id].push(s.position, s.psi);
        }
        idx.finalize();
        idx
    }

    pub fn from_source<S: QuantificationSource + ?Sized>(source: &S) -> Result<Self> {
        let idx = Self::from_sites(source.kind(), source.site_psi()?);
        info!(
            "Indexed {} {} sites on {} chromosomes",
            idx.len(),
            idx.source,
            idx.chr_names.len()
        );
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.chr_sites.iter().map(|c| c.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chr_id(&self, chrom: &str) -> Option<usize> {
        self.chr_to_id.get(chrom).copied()
    }

    /// Observations on `chrom` with `start <= position <= end`, ascending by position.
    pub fn query(&self, chrom: &str, start: i64, end: i64) -> &[SiteEntry] {
        match self.chr_id(chrom) {
            Some(id) => self.chr_sites[id].range(start, end),
            None => &[],
        }
    }

    fn intern_chr(&mut self, chr: &str) -> usize {
        if let Some(&id) = self.chr_to_id.get(chr) {
            return id;
        }
        let id = self.chr_names.len();
        self.chr_names.push(chr.to_string());
        self.chr_to_id.insert(chr.to_string(), id);
        self.chr_sites.push(ChrSites::default());
        id
    }

    fn finalize(&mut self) {
        for cs in &mut self.chr_sites {
            cs.finalize();
        }
    }

    /// Serialize this index with a small header (magic + crate version) and a bincode payload.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut f = create_writer(path)?;
        let io_err = |e: std::io::Error| Error::io(e, path);

        f.write_all(MAGIC).map_err(io_err)?;

        // version string from Cargo.toml
        let v = VERSION_STR.as_bytes();
        let len = v.len() as u16;
        f.write_all(&len.to_le_bytes()).map_err(io_err)?;
        f.write_all(v).map_err(io_err)?;

        let payload = bincode::serialize(self).map_err(|e| Error::Index(e.to_string()))?;
        f.write_all(&payload).map_err(io_err)?;
        f.flush().map_err(io_err)?;

        Ok(())
    }

    /// Load an index written by `save()`. Rejects wrong file types and version mismatches.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |e: std::io::Error| Error::io(e, path);
        let mut f = File::open(path).map_err(io_err)?;

        let mut magic = [0u8; 4];
        f.read_exact(&mut magic).map_err(io_err)?;
        if &magic != MAGIC {
            return Err(Error::Index(format!(
                "{} is not a site index file (bad magic)",
                path.display()
            )));
        }

        let mut len_buf = [0u8; 2];
        f.read_exact(&mut len_buf).map_err(io_err)?;
        let len = u16::from_le_bytes(len_buf) as usize;

        let mut ver_buf = vec![0u8; len];
        f.read_exact(&mut ver_buf).map_err(io_err)?;
        let file_version = String::from_utf8_lossy(&ver_buf);

        if file_version != VERSION_STR {
            return Err(Error::Index(format!(
                "index version mismatch: file={}, binary={}",
                file_version, VERSION_STR
            )));
        }

        let mut payload = Vec::new();
        f.read_to_end(&mut payload).map_err(io_err)?;
        let idx: Self = bincode::deserialize(&payload).map_err(|e| Error::Index(e.to_string()))?;

        Ok(idx)
    }
}
