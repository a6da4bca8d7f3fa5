use std::fmt;

/// APPRIS principal-isoform rank of a transcript.
///
/// `appris_principal_1` through `appris_principal_5` map to 1..=5; a
/// transcript without any principal tag ranks 6. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppPriority(u8);

impl AppPriority {
    pub const UNTAGGED: AppPriority = AppPriority(6);

    /// Rank from the `tag` values of a transcript record.
    ///
    /// Tags are checked by substring, best rank first.
    pub fn from_tags<'a, I>(tags: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let tags: Vec<&str> = tags.into_iter().collect();
        (1u8..=5)
            .find(|rank| {
                let needle = format!("appris_principal_{rank}");
                tags.iter().any(|t| t.contains(&needle))
            })
            .map(AppPriority)
            .unwrap_or(Self::UNTAGGED)
    }

    pub fn rank(self) -> u8 {
        self.0
    }
}

impl fmt::Display for AppPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_tags_rank_in_order() {
        assert_eq!(AppPriority::from_tags(["basic", "appris_principal_3"]).rank(), 3);
        assert_eq!(
            AppPriority::from_tags(["appris_principal_4", "appris_principal_1"]).rank(),
            1
        );
        assert_eq!(AppPriority::from_tags(["basic", "CCDS"]), AppPriority::UNTAGGED);
        assert_eq!(AppPriority::from_tags(Vec::<&str>::new()), AppPriority::UNTAGGED);
    }

    #[test]
    fn alternative_tags_do_not_count() {
        assert_eq!(
            AppPriority::from_tags(["appris_alternative_1"]),
            AppPriority::UNTAGGED
        );
        assert!(AppPriority::from_tags(["appris_principal_2"]) < AppPriority::UNTAGGED);
    }
}
