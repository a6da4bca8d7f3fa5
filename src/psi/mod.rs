//! PSI normalization.
//!
//! Each quantification tool leaves a differently shaped table behind. The
//! adapters in this module turn those tables into [`SitePsi`] observations;
//! everything downstream only sees that common form.

pub mod aggregate;
pub mod leafcutter;
pub mod rmats;
pub mod spliser;
pub mod table;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::SitePsi;

pub use aggregate::{ClusterAccumulator, ClusterKey, ClusterSite};
pub use leafcutter::{IntronKey, LeafcutterSites};
pub use rmats::{EventType, RmatsSites};
pub use spliser::SpliserSites;
pub use table::PsiTable;

/// The upstream tool a PSI table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Leafcutter,
    Rmats,
    Spliser,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Leafcutter => "leafcutter",
            SourceKind::Rmats => "rmats",
            SourceKind::Spliser => "spliser",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leafcutter" => Ok(SourceKind::Leafcutter),
            "rmats" => Ok(SourceKind::Rmats),
            "spliser" => Ok(SourceKind::Spliser),
            other => Err(format!(
                "unknown PSI source '{other}' (expected leafcutter, rmats or spliser)"
            )),
        }
    }
}

/// Anything that can hand out normalized splice-site PSI.
///
/// How the numbers were produced (alignment, clustering, testing) is not the
/// concern of the annotation engine; it only relies on this capability.
pub trait QuantificationSource {
    fn kind(&self) -> SourceKind;

    /// Normalized observations with defined PSI, in the source's own order.
    fn site_psi(&self) -> Result<Vec<SitePsi>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_parses_case_insensitively() {
        assert_eq!("LeafCutter".parse::<SourceKind>().unwrap(), SourceKind::Leafcutter);
        assert_eq!("rmats".parse::<SourceKind>().unwrap(), SourceKind::Rmats);
        assert_eq!(SourceKind::Spliser.to_string(), "spliser");
        assert!("majiq".parse::<SourceKind>().is_err());
    }
}
