//! Two-layer classification: graph verdict merged with textual corroboration

use serde::{Deserialize, Serialize};

use crate::corroborate::Corroboration;
use crate::model::Function;
use crate::policy::Policy;
use crate::reachability::ReachabilityStatus;

/// Final confidence tier for a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Reachable,
    /// Graph found no path but another production file mentions it. Advisory.
    LikelyReachable,
    /// Neither layer found a use. Blocking.
    Unreachable,
}

impl Tier {
    pub fn is_blocking(self) -> bool {
        self == Tier::Unreachable
    }
}

/// One row of the merge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRule {
    pub status: ReachabilityStatus,
    pub reference_found: bool,
    pub tier: Tier,
}

const fn rule(status: ReachabilityStatus, reference_found: bool, tier: Tier) -> MergeRule {
    MergeRule {
        status,
        reference_found,
        tier,
    }
}

/// Graph verdict x textual reference -> tier. Exhaustive over both inputs.
pub const MERGE_TABLE: [MergeRule; 8] = [
    rule(ReachabilityStatus::EntryPoint, false, Tier::Reachable),
    rule(ReachabilityStatus::EntryPoint, true, Tier::Reachable),
    rule(ReachabilityStatus::Reachable, false, Tier::Reachable),
    rule(ReachabilityStatus::Reachable, true, Tier::Reachable),
    rule(ReachabilityStatus::Unreachable, true, Tier::LikelyReachable),
    rule(ReachabilityStatus::Unreachable, false, Tier::Unreachable),
    rule(ReachabilityStatus::TestOnly, true, Tier::LikelyReachable),
    rule(ReachabilityStatus::TestOnly, false, Tier::Unreachable),
];

/// Look up the tier for a graph status and corroboration result.
pub fn merge(status: ReachabilityStatus, reference_found: bool) -> Tier {
    MERGE_TABLE
        .iter()
        .find(|r| r.status == status && r.reference_found == reference_found)
        .map(|r| r.tier)
        .unwrap_or(Tier::Unreachable)
}

/// Outcome after policy filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    Classified { tier: Tier },
    /// Matched an `allowed_orphans` rule; excluded from all tier counts.
    Allowed { rule: String },
}

impl Disposition {
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Disposition::Classified { tier } => Some(*tier),
            Disposition::Allowed { .. } => None,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.tier().is_some_and(Tier::is_blocking)
    }
}

/// Apply the policy filter, then the merge table.
pub fn classify(function: &Function, status: ReachabilityStatus, corroboration: &Corroboration, policy: &Policy) -> Disposition {
    if let Some(rule) = policy.allowed_orphan(function) {
        return Disposition::Allowed {
            rule: rule.as_str().to_string(),
        };
    }
    Disposition::Classified {
        tier: merge(status, corroboration.found()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::function;
    use std::path::PathBuf;

    const STATUSES: [ReachabilityStatus; 4] = [
        ReachabilityStatus::EntryPoint,
        ReachabilityStatus::Reachable,
        ReachabilityStatus::TestOnly,
        ReachabilityStatus::Unreachable,
    ];

    #[test]
    fn test_table_is_exhaustive_and_unique() {
        for status in STATUSES {
            for found in [false, true] {
                let rows = MERGE_TABLE
                    .iter()
                    .filter(|r| r.status == status && r.reference_found == found)
                    .count();
                assert_eq!(rows, 1, "{status:?}/{found}");
            }
        }
    }

    #[test]
    fn test_merge_rows() {
        assert_eq!(merge(ReachabilityStatus::EntryPoint, false), Tier::Reachable);
        assert_eq!(merge(ReachabilityStatus::Reachable, false), Tier::Reachable);
        assert_eq!(merge(ReachabilityStatus::Unreachable, true), Tier::LikelyReachable);
        assert_eq!(merge(ReachabilityStatus::TestOnly, true), Tier::LikelyReachable);
        assert_eq!(merge(ReachabilityStatus::Unreachable, false), Tier::Unreachable);
        assert_eq!(merge(ReachabilityStatus::TestOnly, false), Tier::Unreachable);
    }

    #[test]
    fn test_corroboration_never_blocks() {
        for status in STATUSES {
            assert!(!merge(status, true).is_blocking());
        }
    }

    #[test]
    fn test_allowed_orphan_never_blocks() {
        let policy = Policy::parse("allowed_orphans:\n  - src/legacy/shim.ts:*\n").unwrap();
        let shim = function("src/legacy/shim.ts", "legacyExport", true);
        let disposition = classify(&shim, ReachabilityStatus::Unreachable, &Corroboration::default(), &policy);
        assert_eq!(
            disposition,
            Disposition::Allowed {
                rule: "src/legacy/shim.ts:*".to_string()
            }
        );
        assert!(!disposition.is_blocking());

        let other = function("src/pricing.ts", "computeDiscount", true);
        let disposition = classify(&other, ReachabilityStatus::Unreachable, &Corroboration::default(), &policy);
        assert!(disposition.is_blocking());

        let corroborated = Corroboration {
            production_refs: vec![PathBuf::from("src/pricing-config.ts")],
            test_refs: Vec::new(),
        };
        let disposition = classify(&other, ReachabilityStatus::Unreachable, &corroborated, &policy);
        assert_eq!(disposition.tier(), Some(Tier::LikelyReachable));
    }
}
