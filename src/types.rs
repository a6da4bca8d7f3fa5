use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Genomic strand/orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    Plus,
    Minus,
    Unknown,
}

impl Strand {
    /// Parse the single-character strand notation used by GTF, rMATS and LeafCutter.
    ///
    /// `.` and `?` map to `Unknown`; anything else is rejected.
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s.trim() {
            "+" => Some(Strand::Plus),
            "-" => Some(Strand::Minus),
            "." | "?" => Some(Strand::Unknown),
            _ => None,
        }
    }

    #[inline]
    pub fn symbol(self) -> char {
        match self {
            Strand::Plus => '+',
            Strand::Minus => '-',
            Strand::Unknown => '.',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Donor (5') or acceptor (3') side of an intron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteRole {
    Donor,
    Acceptor,
}

impl fmt::Display for SiteRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteRole::Donor => "donor",
            SiteRole::Acceptor => "acceptor",
        };
        write!(f, "{s}")
    }
}

/// Which isoform of a splicing event a site belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpliceForm {
    Inclusion,
    Skip,
}

impl fmt::Display for SpliceForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpliceForm::Inclusion => "inclusion",
            SpliceForm::Skip => "skip",
        };
        write!(f, "{s}")
    }
}

/// Exon boundary flanking an intron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryType {
    ExonStart,
    ExonEnd,
}

impl BoundaryType {
    pub fn as_str(self) -> &'static str {
        match self {
            BoundaryType::ExonStart => "exon_start",
            BoundaryType::ExonEnd => "exon_end",
        }
    }
}

impl fmt::Display for BoundaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoundaryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exon_start" => Ok(BoundaryType::ExonStart),
            "exon_end" => Ok(BoundaryType::ExonEnd),
            other => Err(format!("unknown boundary type '{other}'")),
        }
    }
}

/// A normalized splice-site measurement: the common currency of every PSI source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitePsi {
    pub chrom: String,
    pub position: i64,
    pub psi: f64,
}

impl SitePsi {
    pub fn new(chrom: impl Into<String>, position: i64, psi: f64) -> Self {
        Self {
            chrom: chrom.into(),
            position,
            psi,
        }
    }
}

/// Mean of the defined values; `None` if nothing is defined.
pub fn mean_defined<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, n) = values
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .fold((0.0f64, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Parse a numeric table cell. Empty cells and the usual missing markers are `None`.
pub fn parse_optional_f64(s: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let s = s.trim();
    match s {
        "" | "NA" | "NaN" | "nan" | "N/A" | "." => Ok(None),
        _ => {
            let v: f64 = s.parse()?;
            Ok(if v.is_nan() { None } else { Some(v) })
        }
    }
}

/// Render a PSI value the way the downstream tables expect it:
/// shortest round-trip digits, with integral values keeping a trailing `.0`.
/// Magnitudes below `1e-4` or from `1e16` up use a signed, two-digit exponent
/// (`5e-05`, `1e+16`).
pub fn format_psi(v: f64) -> String {
    let magnitude = v.abs();
    if v.is_finite() && v != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let sci = format!("{v:e}");
        let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
        let (sign, digits) = match exp.strip_prefix('-') {
            Some(d) => ('-', d),
            None => ('+', exp),
        };
        format!("{mantissa}e{sign}{digits:0>2}")
    } else if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}
