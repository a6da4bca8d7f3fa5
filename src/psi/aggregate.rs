use indexmap::IndexMap;

use crate::types::{BoundaryType, SitePsi, Strand};

/// Identity of a cluster-level splice site.
///
/// Keys compare by value, so equal cluster ids coming from different rows
/// land on the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey {
    pub cluster_id: String,
    pub position: i64,
    pub boundary: BoundaryType,
}

impl ClusterKey {
    pub fn new(cluster_id: impl Into<String>, position: i64, boundary: BoundaryType) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            position,
            boundary,
        }
    }
}

/// Running total for one [`ClusterKey`].
///
/// `intron_info`, `chrom` and `strand` come from the first intron that touched the site.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSite {
    pub psi: f64,
    pub intron_info: String,
    pub chrom: String,
    pub strand: Strand,
    pub n_introns: usize,
}

/// Sums intron PSI per cluster boundary.
///
/// Introns of one cluster that share a boundary are separate usages of the
/// same site, so their PSI values add up. Entries iterate in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ClusterAccumulator {
    sites: IndexMap<ClusterKey, ClusterSite>,
}

impl ClusterAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        key: ClusterKey,
        psi: f64,
        intron_info: &str,
        chrom: &str,
        strand: Strand,
    ) {
        let site = self.sites.entry(key).or_insert_with(|| ClusterSite {
            psi: 0.0,
            intron_info: intron_info.to_string(),
            chrom: chrom.to_string(),
            strand,
            n_introns: 0,
        });
        site.psi += psi;
        site.n_introns += 1;
    }

    pub fn get(&self, key: &ClusterKey) -> Option<&ClusterSite> {
        self.sites.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClusterKey, &ClusterSite)> {
        self.sites.iter()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Flatten to normalized observations, in accumulation order.
    pub fn site_psi(&self) -> Vec<SitePsi> {
        self.sites
            .iter()
            .map(|(k, s)| SitePsi::new(s.chrom.clone(), k.position, s.psi))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_boundary_sums_not_averages() {
        let mut acc = ClusterAccumulator::new();
        let key = ClusterKey::new("clu_1", 500, BoundaryType::ExonStart);
        acc.add(key.clone(), 0.3, "chr1:100:499:clu_1_+", "chr1", Strand::Plus);
        acc.add(key.clone(), 0.4, "chr1:200:499:clu_1_+", "chr1", Strand::Plus);

        let site = acc.get(&key).unwrap();
        assert!((site.psi - 0.7).abs() < 1e-12);
        assert_eq!(site.n_introns, 2);
        assert_eq!(site.intron_info, "chr1:100:499:clu_1_+");
    }

    #[test]
    fn boundary_type_and_cluster_split_keys() {
        let mut acc = ClusterAccumulator::new();
        acc.add(ClusterKey::new("c1", 10, BoundaryType::ExonStart), 0.1, "a", "chr1", Strand::Plus);
        acc.add(ClusterKey::new("c1", 10, BoundaryType::ExonEnd), 0.2, "a", "chr1", Strand::Plus);
        acc.add(ClusterKey::new("c2", 10, BoundaryType::ExonStart), 0.3, "b", "chr1", Strand::Plus);
        assert_eq!(acc.len(), 3);

        let sites = acc.site_psi();
        assert_eq!(sites.iter().map(|s| s.psi).collect::<Vec<_>>(), vec![0.1, 0.2, 0.3]);
    }
}
