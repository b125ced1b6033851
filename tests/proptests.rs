//! Property-based coverage for the pieces of the schedule/domain-graph
//! machinery that are easiest to get subtly wrong across many inputs: split
//! divisibility bookkeeping and domain-graph equivalence closure.

use proptest::prelude::*;

use tensorfuse_core::domain_graph::{DomainGraph, EquivalenceKind};
use tensorfuse_core::ir::iter_domain::IterType;
use tensorfuse_core::ir::{Fusion, LiteralValue};

proptest! {
    /// `split_id`'s non-divisible flag on the inner ID must agree exactly
    /// with `extent % factor != 0` for every literal extent/factor pair.
    #[test]
    fn split_non_divisible_flag_matches_modulo(extent in 1i64..10_000, factor in 1i64..1_000) {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent_id = fusion.add_literal(LiteralValue::Int(extent));
        let factor_id = fusion.add_literal(LiteralValue::Int(factor));
        let root = fusion.add_root_iter_domain(zero, extent_id, IterType::Iteration);
        let (_outer, inner) = fusion.split_id(root, factor_id, true);
        prop_assert_eq!(
            fusion.iter_domain(inner).is_non_divisible_split,
            extent % factor != 0
        );
    }

    /// `are_mapped` under any equivalence kind is reflexive for every
    /// registered id and symmetric for any mapped pair, regardless of how
    /// many ids the graph was built from.
    #[test]
    fn domain_graph_mapping_is_reflexive_and_symmetric(count in 1usize..16) {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(8));
        let ids: Vec<_> = (0..count)
            .map(|_| fusion.add_root_iter_domain(zero, extent, IterType::Iteration))
            .collect();
        let mut graph = DomainGraph::build(&fusion);
        for &id in &ids {
            prop_assert!(graph.are_mapped(id, id, EquivalenceKind::Exact));
        }
        if count >= 2 {
            graph.map_ids(ids[0], ids[1], EquivalenceKind::Exact).unwrap();
            prop_assert!(graph.are_mapped(ids[0], ids[1], EquivalenceKind::Exact));
            prop_assert!(graph.are_mapped(ids[1], ids[0], EquivalenceKind::Exact));
        }
    }

    /// Merging two IDs never changes under which kind they were merged:
    /// the merge is visible immediately and only under that kind.
    #[test]
    fn domain_graph_mapping_is_kind_scoped(count in 2usize..8) {
        let mut fusion = Fusion::new();
        let zero = fusion.add_literal(LiteralValue::Int(0));
        let extent = fusion.add_literal(LiteralValue::Int(8));
        let ids: Vec<_> = (0..count)
            .map(|_| fusion.add_root_iter_domain(zero, extent, IterType::Iteration))
            .collect();
        let mut graph = DomainGraph::build(&fusion);
        graph.map_ids(ids[0], ids[1], EquivalenceKind::Exact).unwrap();
        prop_assert!(graph.are_mapped(ids[0], ids[1], EquivalenceKind::Exact));
        prop_assert!(!graph.are_mapped(ids[0], ids[1], EquivalenceKind::Permissive));
        prop_assert!(!graph.are_mapped(ids[0], ids[1], EquivalenceKind::Loop));
    }
}
