use crate::error::EngineError;
use crate::formula::extract_references;
use crate::graph::DependencyGraph;
use crate::store::{CompiledItem, CompiledTemplate};

/// Builds the in-period dependency graph of a template.
///
/// Every item becomes a node, in template order. An edge is added for each
/// unqualified reference, bare or time-offset, to an item of the same
/// template. Namespaced references (`rawinput:X`, `pl:X`) are leaves. A
/// time-offset reference to the item itself reads another period's snapshot,
/// so `RE = RE[t-1] + NET` does not depend on itself.
pub fn build_graph(items: &[CompiledItem]) -> Result<DependencyGraph, EngineError> {
    let mut graph = DependencyGraph::new();
    for item in items {
        graph.add_node(&item.code);
    }

    for item in items {
        let Some(formula) = &item.formula else { continue };
        let refs = extract_references(formula).map_err(|source| EngineError::Parse {
            code: item.code.clone(),
            formula: formula.clone(),
            source,
        })?;
        for r in refs {
            if !r.is_unqualified() || !graph.contains(&r.code) {
                continue;
            }
            if r.offset != 0 && r.code == item.code {
                continue;
            }
            graph.add_edge(&item.code, &r.code);
        }
    }
    Ok(graph)
}

/// Items that must be recomputed when `code` changes within a period, in
/// evaluation order. The code itself is excluded.
pub fn impact_of(template: &CompiledTemplate, code: &str) -> Vec<String> {
    let affected = template.graph().downstream_from(&[code]);
    template
        .evaluation_order()
        .into_iter()
        .filter(|c| *c != code && affected.contains(*c))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LineItem, Template};

    fn compile(items: Vec<LineItem>) -> CompiledTemplate {
        CompiledTemplate::compile(&Template::new("T", items)).expect("compile failed")
    }

    #[test]
    fn test_prefixed_self_reference_is_not_an_edge() {
        let t = compile(vec![
            LineItem::computed("REVENUE", "rawinput:REVENUE + rawinput:ADJUSTMENT"),
            LineItem::computed("NET", "REVENUE * 0.9"),
        ]);
        assert!(!t.graph().has_edge("REVENUE", "REVENUE"));
        assert!(t.graph().has_edge("NET", "REVENUE"));
        assert_eq!(t.graph().edge_count(), 1);
    }

    #[test]
    fn test_lagged_reference_to_another_item_is_an_edge() {
        let t = compile(vec![
            LineItem::computed("OPENING_CASH", "CASH[t-1]"),
            LineItem::computed("CASH", "CASH[t-1] + FLOW"),
            LineItem::raw("FLOW"),
            LineItem::computed("NEXT_FLOW", "FLOW[t+1]"),
        ]);
        assert!(t.graph().has_edge("OPENING_CASH", "CASH"));
        assert!(t.graph().has_edge("NEXT_FLOW", "FLOW"));
        assert_eq!(impact_of(&t, "FLOW"), vec!["CASH", "OPENING_CASH", "NEXT_FLOW"]);
    }

    #[test]
    fn test_lagged_self_reference_is_not_an_edge() {
        let t = compile(vec![
            LineItem::computed("RE", "RE[t-1] + NET"),
            LineItem::computed("NET", "40"),
            LineItem::computed("RUNWAY", "RUNWAY[t+1] - 1"),
        ]);
        assert!(!t.graph().has_edge("RE", "RE"));
        assert!(!t.graph().has_edge("RUNWAY", "RUNWAY"));
        assert!(t.graph().has_edge("RE", "NET"));
    }

    #[test]
    fn test_lagged_cross_reference_can_close_a_cycle() {
        let template = Template::new(
            "T",
            vec![LineItem::computed("A", "B[t-1] + 1"), LineItem::computed("B", "A + 1")],
        );
        match CompiledTemplate::compile(&template) {
            Err(EngineError::CyclicDependency { cycle }) => {
                assert!(cycle.contains(&"A".to_string()) && cycle.contains(&"B".to_string()), "{:?}", cycle);
            }
            other => panic!("expected a cycle, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_unknown_codes_are_not_nodes() {
        let t = compile(vec![LineItem::computed("NET", "REVENUE - COST")]);
        assert_eq!(t.graph().node_count(), 1);
        assert_eq!(t.graph().edge_count(), 0);
    }

    #[test]
    fn test_order_respects_every_edge() {
        let t = compile(vec![
            LineItem::computed("EQUITY", "RE + CAPITAL"),
            LineItem::computed("RE", "RE[t-1] + NET"),
            LineItem::computed("NET", "REVENUE - COST"),
            LineItem::raw("CAPITAL"),
            LineItem::raw("REVENUE"),
            LineItem::raw("COST"),
        ]);
        let order = t.evaluation_order();
        for item in t.items() {
            for dep in t.graph().dependencies_of(&item.code) {
                let pos = |c: &str| order.iter().position(|x| *x == c).unwrap();
                assert!(pos(dep) < pos(&item.code), "{} must precede {}", dep, item.code);
            }
        }
    }

    #[test]
    fn test_impact_of_follows_readers() {
        let t = compile(vec![
            LineItem::raw("REVENUE"),
            LineItem::raw("COST"),
            LineItem::computed("GROSS", "REVENUE - COST"),
            LineItem::computed("TAX", "GROSS * 0.25"),
            LineItem::computed("NET", "GROSS - TAX"),
            LineItem::computed("HEADCOUNT_COST", "COST / 10"),
        ]);
        assert_eq!(impact_of(&t, "REVENUE"), vec!["GROSS", "TAX", "NET"]);
        assert_eq!(impact_of(&t, "NET"), Vec::<String>::new());
    }
}
