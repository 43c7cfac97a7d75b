//! Placement strategies over candidate nodes

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use workmesh_registry::NodeResources;
use workmesh_shared::ResourceVector;

/// Strategy selection, wired to the `[scheduler] strategy` config option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Default,
    BestFit,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn PlacementStrategy> {
        match self {
            StrategyKind::Default => Box::new(LargestCpuStrategy),
            StrategyKind::BestFit => Box::new(BestFitStrategy),
        }
    }
}

/// Pluggable selection over candidates that already fit the requirement
///
/// Equal scores break ties on lexicographic node id, so a decision is
/// reproducible for a given ledger snapshot.
pub trait PlacementStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn select<'a>(
        &self,
        candidates: &'a [NodeResources],
        requirement: &ResourceVector,
    ) -> Option<&'a NodeResources>;
}

/// Default strategy: the node with the largest remaining cpu
pub struct LargestCpuStrategy;

impl PlacementStrategy for LargestCpuStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn select<'a>(
        &self,
        candidates: &'a [NodeResources],
        _requirement: &ResourceVector,
    ) -> Option<&'a NodeResources> {
        candidates.iter().min_by(|a, b| {
            b.available
                .cpu
                .partial_cmp(&a.available.cpu)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.node_id.cmp(&b.node_id))
        })
    }
}

/// Best-fit strategy: the node left with the least slack after placement
pub struct BestFitStrategy;

impl PlacementStrategy for BestFitStrategy {
    fn name(&self) -> &'static str {
        "best-fit"
    }

    fn select<'a>(
        &self,
        candidates: &'a [NodeResources],
        requirement: &ResourceVector,
    ) -> Option<&'a NodeResources> {
        candidates.iter().min_by(|a, b| {
            a.available
                .slack_l1(requirement)
                .partial_cmp(&b.available.slack_l1(requirement))
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.node_id.cmp(&b.node_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workmesh_registry::NodeType;
    use workmesh_shared::NodeId;

    fn peer(id: &str, cpu: f64) -> NodeResources {
        NodeResources::new(
            NodeId::from(id),
            NodeType::Peer,
            "10.0.0.1:8900",
            ResourceVector::new(cpu, 0, 16 << 30, 0),
        )
    }

    #[test]
    fn test_default_picks_largest_cpu_best_fit_picks_least_slack() {
        // peer A has 3 cores free, peer B has 6; the request needs 2
        let candidates = vec![peer("peer-a", 3.0), peer("peer-b", 6.0)];
        let requirement = ResourceVector::new(2.0, 0, 0, 0);

        let chosen = LargestCpuStrategy
            .select(&candidates, &requirement)
            .unwrap();
        assert_eq!(chosen.node_id, NodeId::from("peer-b"));

        let chosen = BestFitStrategy.select(&candidates, &requirement).unwrap();
        assert_eq!(chosen.node_id, NodeId::from("peer-a"));
    }

    #[test]
    fn test_equal_scores_break_on_lexicographic_node_id() {
        let candidates = vec![peer("zeta", 4.0), peer("alpha", 4.0), peer("mid", 4.0)];
        let requirement = ResourceVector::new(1.0, 0, 0, 0);

        let chosen = LargestCpuStrategy
            .select(&candidates, &requirement)
            .unwrap();
        assert_eq!(chosen.node_id, NodeId::from("alpha"));

        let chosen = BestFitStrategy.select(&candidates, &requirement).unwrap();
        assert_eq!(chosen.node_id, NodeId::from("alpha"));
    }

    #[test]
    fn test_empty_candidates_yield_nothing() {
        let requirement = ResourceVector::new(1.0, 0, 0, 0);
        assert!(LargestCpuStrategy.select(&[], &requirement).is_none());
        assert!(BestFitStrategy.select(&[], &requirement).is_none());
    }

    #[test]
    fn test_strategy_kind_config_names() {
        assert_eq!(
            serde_json::to_string(&StrategyKind::BestFit).unwrap(),
            "\"best-fit\""
        );
        assert_eq!(
            serde_json::from_str::<StrategyKind>("\"default\"").unwrap(),
            StrategyKind::Default
        );
    }
}
