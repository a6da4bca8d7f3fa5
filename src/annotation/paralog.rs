use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::io::open_bufread;

/// Column names of the paralog reference table.
#[derive(Debug, Clone)]
pub struct ParalogColumns {
    pub gene_id: String,
    pub paralog_id: String,
}

impl Default for ParalogColumns {
    fn default() -> Self {
        Self {
            gene_id: "Gene stable ID version".into(),
            paralog_id: "Human paralogue gene stable ID".into(),
        }
    }
}

/// Versioned gene ids that have at least one annotated paralog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParalogSet {
    genes: HashSet<String>,
}

impl ParalogSet {
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            genes: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Read a tab-separated paralog table with a header line.
    ///
    /// Rows whose paralog column is empty do not mark their gene.
    pub fn from_reader<R: Read>(reader: R, columns: &ParalogColumns, origin: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| Error::schema(origin, format!("missing column '{name}'")))
        };
        let gene_col = find(&columns.gene_id)?;
        let paralog_col = find(&columns.paralog_id)?;

        let mut genes = HashSet::new();
        for rec in rdr.records() {
            let rec = match rec {
                Ok(rec) => rec,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    debug!("{}: skipping unreadable row: {e}", origin.display());
                    continue;
                }
            };
            let gene = rec.get(gene_col).map(str::trim).unwrap_or("");
            let paralog = rec.get(paralog_col).map(str::trim).unwrap_or("");
            if !gene.is_empty() && !paralog.is_empty() {
                genes.insert(gene.to_string());
            }
        }
        Ok(Self { genes })
    }

    pub fn from_path(path: &Path, columns: &ParalogColumns) -> Result<Self> {
        let reader = open_bufread(path)?;
        let set = Self::from_reader(reader, columns, path)?;
        info!("Loaded {} genes with paralogs from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn contains(&self, gene_id: &str) -> bool {
        self.genes.contains(gene_id)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}
