//! rMATS event tables.
//!
//! Every event type names its exon coordinates differently. The rule tables
//! below say, per event type, which coordinate is the donor or acceptor of the
//! inclusion and skip forms, and on which strand a boundary is shared by both
//! forms (so it is used in every read and its PSI is fixed at 1).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::{Error, Result, RunSummary};
use crate::io::open_bufread;
use crate::psi::{QuantificationSource, SourceKind};
use crate::types::{mean_defined, parse_optional_f64, SitePsi, SiteRole, SpliceForm, Strand};

/// rMATS alternative-splicing event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Skipped exon
    Se,
    /// Mutually exclusive exons
    Mxe,
    /// Alternative 3' splice site
    A3ss,
    /// Alternative 5' splice site
    A5ss,
    /// Retained intron
    Ri,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Se,
        EventType::Mxe,
        EventType::A3ss,
        EventType::A5ss,
        EventType::Ri,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Se => "SE",
            EventType::Mxe => "MXE",
            EventType::A3ss => "A3SS",
            EventType::A5ss => "A5SS",
            EventType::Ri => "RI",
        }
    }

    /// Junction-count result file of this event type inside an rMATS output directory.
    pub fn file_name(self) -> &'static str {
        match self {
            EventType::Se => "SE.MATS.JC.txt",
            EventType::Mxe => "MXE.MATS.JC.txt",
            EventType::A3ss => "A3SS.MATS.JC.txt",
            EventType::A5ss => "A5SS.MATS.JC.txt",
            EventType::Ri => "RI.MATS.JC.txt",
        }
    }

    fn rules(self) -> &'static [SiteRule] {
        match self {
            EventType::Se => &SE_RULES,
            EventType::Mxe => &MXE_RULES,
            EventType::A3ss => &A3SS_RULES,
            EventType::A5ss => &A5SS_RULES,
            EventType::Ri => &RI_RULES,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinate columns of the rMATS event tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Coord {
    ExonStart,
    ExonEnd,
    FirstExonStart,
    FirstExonEnd,
    SecondExonStart,
    SecondExonEnd,
    LongExonStart,
    LongExonEnd,
    ShortES,
    ShortEE,
    RiExonStart,
    RiExonEnd,
    UpstreamEE,
    DownstreamES,
}

impl Coord {
    fn column(self) -> &'static str {
        match self {
            Coord::ExonStart => "exonStart_0base",
            Coord::ExonEnd => "exonEnd",
            Coord::FirstExonStart => "1stExonStart_0base",
            Coord::FirstExonEnd => "1stExonEnd",
            Coord::SecondExonStart => "2ndExonStart_0base",
            Coord::SecondExonEnd => "2ndExonEnd",
            Coord::LongExonStart => "longExonStart_0base",
            Coord::LongExonEnd => "longExonEnd",
            Coord::ShortES => "shortES",
            Coord::ShortEE => "shortEE",
            Coord::RiExonStart => "riExonStart_0base",
            Coord::RiExonEnd => "riExonEnd",
            Coord::UpstreamEE => "upstreamEE",
            Coord::DownstreamES => "downstreamES",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SiteChoice {
    Fixed(Coord),
    /// `then` on `strand`, `otherwise` on every other strand value.
    OnStrand {
        strand: Strand,
        then: Coord,
        otherwise: Coord,
    },
}

impl SiteChoice {
    fn resolve(self, strand: Strand) -> Coord {
        match self {
            SiteChoice::Fixed(c) => c,
            SiteChoice::OnStrand {
                strand: s,
                then,
                otherwise,
            } => {
                if strand == s {
                    then
                } else {
                    otherwise
                }
            }
        }
    }

    fn coords(self) -> [Coord; 2] {
        match self {
            SiteChoice::Fixed(c) => [c, c],
            SiteChoice::OnStrand { then, otherwise, .. } => [then, otherwise],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SiteRule {
    role: SiteRole,
    form: SpliceForm,
    site: SiteChoice,
    /// On this strand the boundary belongs to both forms and its PSI is 1.
    always_used_on: Option<Strand>,
}

const fn rule(role: SiteRole, form: SpliceForm, site: SiteChoice) -> SiteRule {
    SiteRule {
        role,
        form,
        site,
        always_used_on: None,
    }
}

const fn on_plus(then: Coord, otherwise: Coord) -> SiteChoice {
    SiteChoice::OnStrand {
        strand: Strand::Plus,
        then,
        otherwise,
    }
}

const fn on_minus(then: Coord, otherwise: Coord) -> SiteChoice {
    SiteChoice::OnStrand {
        strand: Strand::Minus,
        then,
        otherwise,
    }
}

use Coord::*;
use SiteRole::{Acceptor, Donor};
use SpliceForm::{Inclusion, Skip};

const SE_RULES: [SiteRule; 2] = [
    rule(Donor, Inclusion, SiteChoice::Fixed(ExonStart)),
    rule(Acceptor, Inclusion, SiteChoice::Fixed(ExonEnd)),
];

const MXE_RULES: [SiteRule; 4] = [
    rule(Donor, Inclusion, on_plus(FirstExonStart, SecondExonStart)),
    rule(Acceptor, Inclusion, on_plus(FirstExonEnd, SecondExonEnd)),
    rule(Donor, Skip, on_plus(SecondExonStart, FirstExonStart)),
    rule(Acceptor, Skip, on_plus(SecondExonEnd, FirstExonEnd)),
];

const A5SS_RULES: [SiteRule; 3] = [
    SiteRule {
        always_used_on: Some(Strand::Plus),
        ..rule(Donor, Inclusion, SiteChoice::Fixed(LongExonStart))
    },
    SiteRule {
        always_used_on: Some(Strand::Minus),
        ..rule(Acceptor, Inclusion, SiteChoice::Fixed(LongExonEnd))
    },
    rule(Acceptor, Skip, on_minus(ShortES, ShortEE)),
];

const A3SS_RULES: [SiteRule; 3] = [
    SiteRule {
        always_used_on: Some(Strand::Minus),
        ..rule(Donor, Inclusion, SiteChoice::Fixed(LongExonStart))
    },
    SiteRule {
        always_used_on: Some(Strand::Plus),
        ..rule(Acceptor, Inclusion, SiteChoice::Fixed(LongExonEnd))
    },
    rule(Acceptor, Skip, on_minus(ShortEE, ShortES)),
];

const RI_RULES: [SiteRule; 4] = [
    rule(Donor, Inclusion, SiteChoice::Fixed(RiExonStart)),
    rule(Acceptor, Inclusion, SiteChoice::Fixed(RiExonEnd)),
    rule(Donor, Skip, SiteChoice::Fixed(UpstreamEE)),
    rule(Acceptor, Skip, SiteChoice::Fixed(DownstreamES)),
];

/// One splice site extracted from one rMATS event.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteObservation {
    pub event_id: String,
    pub gene_symbol: String,
    pub chrom: String,
    pub strand: Strand,
    pub position: i64,
    pub role: SiteRole,
    pub event: EventType,
    pub form: SpliceForm,
    pub psi: Option<f64>,
    pub fdr: Option<f64>,
}

/// Mean of the `IncLevel1` replicate list, skipping `NA`.
pub fn inclusion_level(list: &str) -> std::result::Result<Option<f64>, std::num::ParseFloatError> {
    let values = list
        .split(',')
        .map(str::trim)
        .filter(|v| *v != "NA")
        .map(|v| v.parse::<f64>().map(Some))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(mean_defined(values))
}

struct EventRow {
    id: String,
    gene_symbol: String,
    chrom: String,
    strand: Strand,
    psi_inclusion: Option<f64>,
    fdr: Option<f64>,
    coords: HashMap<Coord, i64>,
}

struct EventColumns {
    id: usize,
    gene_symbol: usize,
    chrom: usize,
    strand: usize,
    inc_level: usize,
    fdr: Option<usize>,
    coords: Vec<(Coord, usize)>,
}

impl EventColumns {
    fn locate(event: EventType, headers: &csv::StringRecord, origin: &Path) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                Error::schema(origin, format!("{event} table lacks column '{name}'"))
            })
        };

        let mut coords: Vec<(Coord, usize)> = Vec::new();
        for r in event.rules() {
            for c in r.site.coords() {
                if !coords.iter().any(|(k, _)| *k == c) {
                    coords.push((c, require(c.column())?));
                }
            }
        }

        Ok(Self {
            id: require("ID")?,
            gene_symbol: require("geneSymbol")?,
            chrom: require("chr")?,
            strand: require("strand")?,
            inc_level: require("IncLevel1")?,
            fdr: find("FDR"),
            coords,
        })
    }

    fn parse(&self, rec: &csv::StringRecord) -> Option<EventRow> {
        let field = |i: usize| rec.get(i).map(str::trim);

        let strand = Strand::from_symbol(field(self.strand)?)?;
        let psi_inclusion = inclusion_level(field(self.inc_level)?).ok()?;
        let fdr = match self.fdr {
            Some(i) => parse_optional_f64(field(i)?).ok()?,
            None => None,
        };
        let mut coords = HashMap::with_capacity(self.coords.len());
        for (c, i) in &self.coords {
            coords.insert(*c, field(*i)?.parse::<i64>().ok()?);
        }

        Some(EventRow {
            id: field(self.id)?.to_string(),
            gene_symbol: field(self.gene_symbol)?.to_string(),
            chrom: field(self.chrom)?.to_string(),
            strand,
            psi_inclusion,
            fdr,
            coords,
        })
    }
}

/// Apply an event type's rule table to parsed events.
///
/// Output is grouped by rule, then by event, matching the table order.
fn apply_rules(event: EventType, rows: &[EventRow]) -> Vec<SiteObservation> {
    let rules = event.rules();
    let mut out = Vec::with_capacity(rules.len() * rows.len());
    for r in rules {
        for row in rows {
            let coord = r.site.resolve(row.strand);
            let Some(&position) = row.coords.get(&coord) else {
                continue;
            };
            let psi = if r.always_used_on == Some(row.strand) {
                Some(1.0)
            } else {
                match r.form {
                    SpliceForm::Inclusion => row.psi_inclusion,
                    SpliceForm::Skip => row.psi_inclusion.map(|p| 1.0 - p),
                }
            };
            out.push(SiteObservation {
                event_id: row.id.clone(),
                gene_symbol: row.gene_symbol.clone(),
                chrom: row.chrom.clone(),
                strand: row.strand,
                position,
                role: r.role,
                event,
                form: r.form,
                psi,
                fdr: row.fdr,
            });
        }
    }
    out
}

/// Extract donor/acceptor observations from one rMATS event table.
pub fn extract_splice_sites<R: Read>(
    event: EventType,
    reader: R,
    origin: &Path,
) -> Result<(Vec<SiteObservation>, RunSummary)> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let columns = EventColumns::locate(event, &headers, origin)?;

    let mut summary = RunSummary::default();
    let mut rows = Vec::new();
    for rec in rdr.records() {
        summary.rows_read += 1;
        let rec = match rec {
            Ok(rec) => rec,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                debug!("{}: skipping unreadable {event} row: {e}", origin.display());
                summary.rows_skipped += 1;
                continue;
            }
        };
        match columns.parse(&rec) {
            Some(row) => {
                if row.psi_inclusion.is_none() {
                    summary.undefined_psi += 1;
                }
                rows.push(row);
            }
            None => {
                debug!("{}: skipping malformed {event} row {:?}", origin.display(), rec.position());
                summary.rows_skipped += 1;
            }
        }
    }

    let sites = apply_rules(event, &rows);
    summary.rows_emitted = sites.len();
    Ok((sites, summary))
}

/// Grouping key of the per-site averages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey {
    pub position: i64,
    pub chrom: String,
    pub gene_symbol: String,
}

/// Average PSI per `(position, chrom, gene)` over every event and form landing on it.
///
/// Undefined values are ignored; a site with nothing defined keeps `None`.
/// Observations without a gene symbol are not grouped.
pub fn average_by_site(obs: &[SiteObservation]) -> BTreeMap<SiteKey, Option<f64>> {
    let mut groups: BTreeMap<SiteKey, Vec<Option<f64>>> = BTreeMap::new();
    for o in obs {
        if o.gene_symbol.is_empty() || o.chrom.is_empty() {
            continue;
        }
        groups
            .entry(SiteKey {
                position: o.position,
                chrom: o.chrom.clone(),
                gene_symbol: o.gene_symbol.clone(),
            })
            .or_default()
            .push(o.psi);
    }
    groups
        .into_iter()
        .map(|(k, v)| (k, mean_defined(v)))
        .collect()
}

/// Per-site averages of one rMATS output directory.
#[derive(Debug, Clone)]
pub struct DirectorySites {
    pub name: String,
    pub sites: BTreeMap<SiteKey, Option<f64>>,
    pub summary: RunSummary,
}

/// Process one rMATS output directory.
///
/// Returns `Err(MissingInput)` when none of the five event tables exist.
/// A missing or unreadable table is logged and the others are used.
pub fn process_directory(dir: &Path) -> Result<DirectorySites> {
    let name = dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());

    if !EventType::ALL.iter().any(|e| dir.join(e.file_name()).is_file()) {
        return Err(Error::MissingInput(dir.to_path_buf()));
    }

    let mut summary = RunSummary::default();
    let mut all = Vec::new();
    for event in EventType::ALL {
        let path = dir.join(event.file_name());
        if !path.is_file() {
            warn!("File not found for {event} in {}: {}", dir.display(), path.display());
            summary.files_missing += 1;
            continue;
        }
        let extracted =
            open_bufread(&path).and_then(|reader| extract_splice_sites(event, reader, &path));
        match extracted {
            Ok((sites, s)) => {
                summary.merge(&s);
                all.extend(sites);
            }
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                summary.units_failed += 1;
            }
        }
    }

    let sites = average_by_site(&all);
    debug!("{name}: {} observations -> {} sites", all.len(), sites.len());
    Ok(DirectorySites {
        name,
        sites,
        summary,
    })
}

/// A site with its PSI averaged across directories.
#[derive(Debug, Clone, PartialEq)]
pub struct RmatsSite {
    pub key: SiteKey,
    pub psi: f64,
}

/// Average each site over the directories that report it.
///
/// This is a mean of per-directory means, not a pooled replicate mean.
/// Sites undefined in every directory are dropped. Output is sorted by key.
pub fn combine_directories(dirs: &[DirectorySites]) -> Vec<RmatsSite> {
    let mut columns: BTreeMap<&SiteKey, Vec<Option<f64>>> = BTreeMap::new();
    for d in dirs {
        for (k, v) in &d.sites {
            columns.entry(k).or_default().push(*v);
        }
    }
    columns
        .into_iter()
        .filter_map(|(k, v)| {
            mean_defined(v).map(|psi| RmatsSite {
                key: k.clone(),
                psi,
            })
        })
        .collect()
}

/// Non-hidden sub-directories of `parent`, sorted by name.
pub fn list_result_dirs(parent: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(parent).map_err(|e| Error::io(e, parent))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(e, parent))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_dir() && !hidden {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Normalized rMATS sites across all result directories.
#[derive(Debug, Clone, Default)]
pub struct RmatsSites {
    pub sites: Vec<RmatsSite>,
    pub directories: Vec<String>,
    pub summary: RunSummary,
}

impl RmatsSites {
    /// Process every directory in parallel on a pool of `threads` workers.
    ///
    /// A directory that fails is logged and contributes nothing.
    pub fn from_directories(dirs: &[PathBuf], threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()?;

        let results: Vec<(PathBuf, Result<DirectorySites>)> = pool.install(|| {
            dirs.par_iter()
                .map(|d| (d.clone(), process_directory(d)))
                .collect()
        });

        let mut summary = RunSummary::default();
        let mut done = Vec::new();
        for (dir, res) in results {
            match res {
                Ok(d) => {
                    summary.merge(&d.summary);
                    done.push(d);
                }
                Err(Error::MissingInput(_)) => {
                    warn!(
                        "Skipping {} as it does not contain any rMATS event tables",
                        dir.display()
                    );
                    summary.files_missing += 1;
                }
                Err(e) => {
                    warn!("Error processing {}: {e}", dir.display());
                    summary.units_failed += 1;
                }
            }
        }

        let sites = combine_directories(&done);
        summary.rows_emitted = sites.len();
        info!(
            "rMATS: {} of {} directories -> {} sites",
            done.len(),
            dirs.len(),
            sites.len()
        );
        Ok(Self {
            sites,
            directories: done.into_iter().map(|d| d.name).collect(),
            summary,
        })
    }

    pub fn from_parent_dir(parent: &Path, threads: usize) -> Result<Self> {
        let dirs = list_result_dirs(parent)?;
        if dirs.is_empty() {
            warn!("No result directories found under {}", parent.display());
        }
        Self::from_directories(&dirs, threads)
    }
}

impl QuantificationSource for RmatsSites {
    fn kind(&self) -> SourceKind {
        SourceKind::Rmats
    }

    fn site_psi(&self) -> Result<Vec<SitePsi>> {
        Ok(self
            .sites
            .iter()
            .map(|s| SitePsi::new(s.key.chrom.clone(), s.key.position, s.psi))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const A5SS_HEADER: &str = "ID\tGeneID\tgeneSymbol\tchr\tstrand\tlongExonStart_0base\tlongExonEnd\tshortES\tshortEE\tflankingES\tflankingEE\tIncLevel1\tFDR";
    const SE_HEADER: &str = "ID\tGeneID\tgeneSymbol\tchr\tstrand\texonStart_0base\texonEnd\tupstreamES\tupstreamEE\tdownstreamES\tdownstreamEE\tIncLevel1\tFDR";

    fn extract(event: EventType, table: &str) -> Vec<SiteObservation> {
        extract_splice_sites(event, Cursor::new(table.as_bytes()), Path::new("test"))
            .unwrap()
            .0
    }

    fn find(obs: &[SiteObservation], pos: i64) -> &SiteObservation {
        obs.iter().find(|o| o.position == pos).unwrap()
    }

    #[test]
    fn inclusion_level_skips_na() {
        assert!((inclusion_level("0.2,NA,0.4").unwrap().unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(inclusion_level("NA,NA").unwrap(), None);
        assert!(inclusion_level("0.2,x").is_err());
    }

    #[test]
    fn se_emits_inclusion_donor_and_acceptor() {
        let table = format!("{SE_HEADER}\n1\tENSG1\t\"GENE1\"\tchr1\t+\t100\t200\t10\t50\t300\t400\t0.8,0.6\t0.01\n");
        let obs = extract(EventType::Se, &table);
        assert_eq!(obs.len(), 2);

        let donor = find(&obs, 100);
        assert_eq!(donor.role, SiteRole::Donor);
        assert_eq!(donor.form, SpliceForm::Inclusion);
        assert_eq!(donor.gene_symbol, "GENE1");
        assert!((donor.psi.unwrap() - 0.7).abs() < 1e-12);

        let acceptor = find(&obs, 200);
        assert_eq!(acceptor.role, SiteRole::Acceptor);
        assert_eq!(acceptor.fdr, Some(0.01));
    }

    #[test]
    fn a5ss_plus_forces_long_exon_start_to_one() {
        let table = format!("{A5SS_HEADER}\n7\tENSG1\tG\tchr2\t+\t100\t300\t100\t250\t500\t600\t0.2,0.4\t0.5\n");
        let obs = extract(EventType::A5ss, &table);
        assert_eq!(obs.len(), 3);

        let donor = find(&obs, 100);
        assert_eq!(donor.role, SiteRole::Donor);
        assert_eq!(donor.psi, Some(1.0));

        let long_end = find(&obs, 300);
        assert!((long_end.psi.unwrap() - 0.3).abs() < 1e-12);

        // + strand skip acceptor is shortEE
        let skip = find(&obs, 250);
        assert_eq!(skip.form, SpliceForm::Skip);
        assert!((skip.psi.unwrap() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn a5ss_minus_forces_long_exon_end_and_uses_short_es() {
        let table = format!("{A5SS_HEADER}\n7\tENSG1\tG\tchr2\t-\t100\t300\t180\t300\t10\t50\tNA,NA\t0.5\n");
        let obs = extract(EventType::A5ss, &table);

        assert_eq!(find(&obs, 100).psi, None);
        let long_end = obs
            .iter()
            .find(|o| o.position == 300 && o.form == SpliceForm::Inclusion)
            .unwrap();
        assert_eq!(long_end.psi, Some(1.0));
        let skip = find(&obs, 180);
        assert_eq!(skip.form, SpliceForm::Skip);
        assert_eq!(skip.psi, None);
    }

    #[test]
    fn a3ss_strand_rules_mirror_a5ss() {
        let header = A5SS_HEADER;
        let table = format!(
            "{header}\n1\tE\tG\tchr1\t+\t100\t300\t150\t300\t10\t50\t0.6\t0\n2\tE\tG\tchr1\t-\t1100\t1300\t1100\t1250\t10\t50\t0.6\t0\n"
        );
        let obs = extract(EventType::A3ss, &table);

        // + : long exon end forced, skip acceptor is shortES
        let plus: Vec<_> = obs.iter().filter(|o| o.strand == Strand::Plus).collect();
        assert_eq!(plus.iter().find(|o| o.position == 300).unwrap().psi, Some(1.0));
        assert_eq!(plus.iter().find(|o| o.position == 100).unwrap().psi, Some(0.6));
        assert!(plus.iter().any(|o| o.position == 150 && o.form == SpliceForm::Skip));

        // - : long exon start forced, skip acceptor is shortEE
        let minus: Vec<_> = obs.iter().filter(|o| o.strand == Strand::Minus).collect();
        let start = minus
            .iter()
            .find(|o| o.position == 1100 && o.form == SpliceForm::Inclusion)
            .unwrap();
        assert_eq!(start.psi, Some(1.0));
        assert!(minus.iter().any(|o| o.position == 1250 && o.form == SpliceForm::Skip));
    }

    #[test]
    fn mxe_swaps_exons_by_strand() {
        let header = "ID\tGeneID\tgeneSymbol\tchr\tstrand\t1stExonStart_0base\t1stExonEnd\t2ndExonStart_0base\t2ndExonEnd\tupstreamES\tupstreamEE\tdownstreamES\tdownstreamEE\tIncLevel1\tFDR";
        let table = format!(
            "{header}\n1\tE\tG\tchr1\t+\t100\t200\t300\t400\t0\t50\t500\t600\t0.9\t0\n2\tE\tG\tchr1\t-\t1100\t1200\t1300\t1400\t0\t50\t500\t600\t0.9\t0\n"
        );
        let obs = extract(EventType::Mxe, &table);
        assert_eq!(obs.len(), 8);

        let incl = |strand: Strand, role: SiteRole| {
            obs.iter()
                .find(|o| o.strand == strand && o.role == role && o.form == SpliceForm::Inclusion)
                .unwrap()
                .position
        };
        assert_eq!(incl(Strand::Plus, SiteRole::Donor), 100);
        assert_eq!(incl(Strand::Plus, SiteRole::Acceptor), 200);
        assert_eq!(incl(Strand::Minus, SiteRole::Donor), 1300);
        assert_eq!(incl(Strand::Minus, SiteRole::Acceptor), 1400);

        let skip = obs
            .iter()
            .find(|o| o.strand == Strand::Minus && o.role == SiteRole::Donor && o.form == SpliceForm::Skip)
            .unwrap();
        assert_eq!(skip.position, 1100);
        assert!((skip.psi.unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn ri_uses_flanking_exons_for_skip_form() {
        let header = "ID\tGeneID\tgeneSymbol\tchr\tstrand\triExonStart_0base\triExonEnd\tupstreamES\tupstreamEE\tdownstreamES\tdownstreamEE\tIncLevel1\tFDR";
        let table = format!("{header}\n1\tE\tG\tchr1\t+\t100\t500\t100\t200\t400\t500\t0.25\t0\n");
        let obs = extract(EventType::Ri, &table);
        let positions: Vec<_> = obs.iter().map(|o| (o.position, o.form)).collect();
        assert_eq!(
            positions,
            vec![
                (100, SpliceForm::Inclusion),
                (500, SpliceForm::Inclusion),
                (200, SpliceForm::Skip),
                (400, SpliceForm::Skip),
            ]
        );
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let table = format!(
            "{SE_HEADER}\n1\tE\tG\tchr1\t+\tabc\t200\t0\t0\t0\t0\t0.5\t0\n2\tE\tG\tchr1\t+\t100\t200\t0\t0\t0\t0\t0.5\t0\n"
        );
        let (obs, summary) =
            extract_splice_sites(EventType::Se, Cursor::new(table.as_bytes()), Path::new("t")).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(summary.rows_skipped, 1);
    }

    #[test]
    fn non_utf8_row_is_skipped() {
        let mut table = format!("{SE_HEADER}\n").into_bytes();
        table.extend_from_slice(b"1\tE\tG\xff\tchr1\t+\t100\t200\t0\t0\t0\t0\t0.5\t0\n");
        table.extend_from_slice(b"2\tE\tG\tchr1\t+\t300\t400\t0\t0\t0\t0\t0.5\t0\n");
        let (obs, summary) =
            extract_splice_sites(EventType::Se, Cursor::new(table), Path::new("t")).unwrap();
        assert_eq!(obs.len(), 2);
        assert!(obs.iter().all(|o| o.event_id == "2"));
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.rows_skipped, 1);
    }

    #[test]
    fn missing_coordinate_column_is_schema_error() {
        let table = "ID\tgeneSymbol\tchr\tstrand\tIncLevel1\n1\tG\tchr1\t+\t0.5\n";
        let err = extract_splice_sites(EventType::Se, Cursor::new(table.as_bytes()), Path::new("t"))
            .unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[test]
    fn sites_average_across_events_then_directories() {
        let obs = |pos: i64, psi: Option<f64>| SiteObservation {
            event_id: "1".into(),
            gene_symbol: "G".into(),
            chrom: "chr1".into(),
            strand: Strand::Plus,
            position: pos,
            role: SiteRole::Donor,
            event: EventType::Se,
            form: SpliceForm::Inclusion,
            psi,
            fdr: None,
        };

        let d1 = DirectorySites {
            name: "d1".into(),
            sites: average_by_site(&[obs(10, Some(0.2)), obs(10, Some(0.4)), obs(20, None)]),
            summary: RunSummary::default(),
        };
        let d2 = DirectorySites {
            name: "d2".into(),
            sites: average_by_site(&[obs(10, Some(1.0)), obs(30, Some(0.5))]),
            summary: RunSummary::default(),
        };

        let sites = combine_directories(&[d1, d2]);
        let got: Vec<_> = sites.iter().map(|s| (s.key.position, s.psi)).collect();
        // (0.3 + 1.0) / 2, site 20 undefined everywhere
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, 10);
        assert!((got[0].1 - 0.65).abs() < 1e-12);
        assert_eq!(got[1], (30, 0.5));
    }

    #[test]
    fn directories_are_processed_best_effort() {
        let root = tempfile::tempdir().unwrap();
        let good = root.path().join("sampleA");
        let empty = root.path().join("sampleB");
        let hidden = root.path().join(".cache");
        for d in [&good, &empty, &hidden] {
            std::fs::create_dir(d).unwrap();
        }
        std::fs::write(
            good.join("SE.MATS.JC.txt"),
            format!("{SE_HEADER}\n1\tE\tG\tchr1\t+\t100\t200\t0\t0\t0\t0\t0.5,0.7\t0\n"),
        )
        .unwrap();

        let dirs = list_result_dirs(root.path()).unwrap();
        assert_eq!(dirs, vec![good.clone(), empty.clone()]);

        let rm = RmatsSites::from_parent_dir(root.path(), 2).unwrap();
        assert_eq!(rm.directories, vec!["sampleA".to_string()]);
        assert_eq!(rm.sites.len(), 2);
        assert!((rm.sites[0].psi - 0.6).abs() < 1e-12);
        // sampleB has nothing, sampleA misses four of five tables
        assert_eq!(rm.summary.files_missing, 5);

        let psi = rm.site_psi().unwrap();
        assert_eq!(psi[0].chrom, "chr1");
        assert_eq!(psi[0].position, 100);
    }
    #[test]
    fn one_bad_table_does_not_drop_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("SE.MATS.JC.txt"),
            format!("{SE_HEADER}\n1\tE\tG\tchr1\t+\t100\t200\t0\t0\t0\t0\t0.5\t0\n"),
        )
        .unwrap();
        std::fs::write(dir.path().join("A3SS.MATS.JC.txt"), "ID\tgeneSymbol\n1\tG\n").unwrap();

        let d = process_directory(dir.path()).unwrap();
        assert_eq!(d.sites.len(), 2);
        assert_eq!(d.summary.units_failed, 1);
        assert_eq!(d.summary.files_missing, 3);
    }
}
