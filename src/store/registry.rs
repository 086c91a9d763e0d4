//! The one-time template load. Everything that can be rejected without
//! evaluating a formula is rejected here.
use super::types::{LineItem, Severity, Template, ValidationRule};
use crate::analysis::topology;
use crate::error::EngineError;
use crate::formula::{extract_dependencies, parse, Expr, ParseError};
use crate::graph::DependencyGraph;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledItem {
    pub code: String,
    /// Trimmed formula text, `None` for raw-input items.
    pub formula: Option<String>,
    pub expr: Option<Expr>,
    /// Template-local codes the formula reads at any offset.
    pub dependencies: BTreeSet<String>,
    pub definition: LineItem,
}

impl CompiledItem {
    pub fn is_computed(&self) -> bool { self.expr.is_some() }

    /// Formula text, or the raw-input locator, for error reports.
    pub fn source_text(&self) -> &str {
        self.formula
            .as_deref()
            .or(self.definition.raw_input_reference.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub rule: ValidationRule,
    pub expr: Expr,
}

impl CompiledRule {
    pub fn compile(rule: ValidationRule) -> Result<Self, EngineError> {
        let expr = parse(&rule.formula).map_err(|source| EngineError::Parse {
            code: rule.id.clone(),
            formula: rule.formula.clone(),
            source,
        })?;
        Ok(Self { rule, expr })
    }

    pub fn is_error(&self) -> bool { self.rule.severity == Severity::Error }
}

/// Which bare codes the raw-input provider may claim, and under which key.
///
/// Only formula-less items appear here. An item that has a formula is
/// never read from raw inputs through its bare code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimTable {
    raw_keys: HashMap<String, String>,
}

impl ClaimTable {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, code: &str, key: &str) {
        self.raw_keys.insert(code.to_string(), key.to_string());
    }

    pub fn raw_key(&self, code: &str) -> Option<&str> {
        self.raw_keys.get(code).map(String::as_str)
    }

    pub fn claims(&self, code: &str) -> bool { self.raw_keys.contains_key(code) }
    pub fn len(&self) -> usize { self.raw_keys.len() }
    pub fn is_empty(&self) -> bool { self.raw_keys.is_empty() }
}

/// A parsed, ordered, immutable template. Share it across periods and
/// parallel runs with `Arc`.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    code: String,
    items: Vec<CompiledItem>,
    positions: HashMap<String, usize>,
    order: Vec<usize>,
    graph: DependencyGraph,
    claims: ClaimTable,
    rules: Vec<CompiledRule>,
}

impl CompiledTemplate {
    pub fn compile(template: &Template) -> Result<Self, EngineError> {
        let mut items = Vec::with_capacity(template.items.len());
        let mut positions = HashMap::with_capacity(template.items.len());
        let mut claims = ClaimTable::new();

        for definition in &template.items {
            let code = definition.code.trim();
            if code.is_empty() {
                return Err(EngineError::Template("line item with an empty code".into()));
            }
            if positions.insert(code.to_string(), items.len()).is_some() {
                return Err(EngineError::DuplicateLineItem { code: code.to_string() });
            }

            let formula = definition.active_formula().map(str::to_string);
            let (expr, dependencies) = match &formula {
                Some(text) => {
                    let at_item = |source: ParseError| EngineError::Parse {
                        code: code.to_string(),
                        formula: text.clone(),
                        source,
                    };
                    (Some(parse(text).map_err(at_item)?), extract_dependencies(text).map_err(at_item)?)
                }
                None => {
                    claims.insert(code, &definition.raw_input_key());
                    (None, BTreeSet::new())
                }
            };
            items.push(CompiledItem {
                code: code.to_string(),
                formula,
                expr,
                dependencies,
                definition: definition.clone(),
            });
        }

        let graph = topology::build_graph(&items)?;
        let order = graph
            .topological_order()?
            .iter()
            .filter_map(|code| positions.get(code).copied())
            .collect::<Vec<_>>();

        let rules = template
            .rules
            .iter()
            .cloned()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            template = %template.code,
            items = items.len(),
            edges = graph.edge_count(),
            raw_inputs = claims.len(),
            rules = rules.len(),
            "compiled template"
        );

        Ok(Self { code: template.code.clone(), items, positions, order, graph, claims, rules })
    }

    pub fn code(&self) -> &str { &self.code }
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn items(&self) -> &[CompiledItem] { &self.items }
    pub fn item(&self, position: usize) -> &CompiledItem { &self.items[position] }
    pub fn position(&self, code: &str) -> Option<usize> { self.positions.get(code).copied() }
    pub fn get(&self, code: &str) -> Option<&CompiledItem> { self.position(code).map(|p| &self.items[p]) }
    pub fn contains(&self, code: &str) -> bool { self.positions.contains_key(code) }
    pub fn graph(&self) -> &DependencyGraph { &self.graph }
    pub fn claims(&self) -> &ClaimTable { &self.claims }
    pub fn rules(&self) -> &[CompiledRule] { &self.rules }

    /// Item positions in evaluation order.
    pub fn order(&self) -> &[usize] { &self.order }

    pub fn evaluation_order(&self) -> Vec<&str> {
        self.order.iter().map(|&p| self.items[p].code.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LineItem;

    fn template(items: Vec<LineItem>) -> Template {
        Template::new("T", items)
    }

    #[test]
    fn test_claim_table_only_holds_formula_less_items() {
        let compiled = CompiledTemplate::compile(&template(vec![
            LineItem::raw("PRICE").with_raw_input_reference("driver-source: UNIT_PRICE"),
            LineItem::raw("VOLUME"),
            LineItem::computed("REVENUE", "PRICE * VOLUME").with_raw_input_reference("driver:REVENUE"),
        ]))
        .unwrap();

        assert_eq!(compiled.claims().raw_key("PRICE"), Some("UNIT_PRICE"));
        assert_eq!(compiled.claims().raw_key("VOLUME"), Some("VOLUME"));
        assert!(!compiled.claims().claims("REVENUE"));
        assert_eq!(compiled.evaluation_order(), vec!["PRICE", "VOLUME", "REVENUE"]);
    }

    #[test]
    fn test_duplicate_and_empty_codes_rejected() {
        let err = CompiledTemplate::compile(&template(vec![LineItem::raw("A"), LineItem::raw("A")]))
            .unwrap_err();
        assert_eq!(err, EngineError::DuplicateLineItem { code: "A".into() });

        let err = CompiledTemplate::compile(&template(vec![LineItem::raw(" ")])).unwrap_err();
        assert!(matches!(err, EngineError::Template(_)));
    }

    #[test]
    fn test_parse_errors_are_eager() {
        let err = CompiledTemplate::compile(&template(vec![
            LineItem::raw("A"),
            LineItem::computed("B", "A +"),
        ]))
        .unwrap_err();
        match err {
            EngineError::Parse { code, formula, source } => {
                assert_eq!(code, "B");
                assert_eq!(formula, "A +");
                assert_eq!(source.position, 3);
            }
            other => panic!("expected parse error, got {:?}", other),
        }

        let bad_rule = template(vec![LineItem::raw("A")])
            .with_rule(ValidationRule::new("R1", "A >", Default::default()));
        assert!(matches!(
            CompiledTemplate::compile(&bad_rule),
            Err(EngineError::Parse { code, .. }) if code == "R1"
        ));
    }

    #[test]
    fn test_cycle_rejected_at_load() {
        let err = CompiledTemplate::compile(&template(vec![
            LineItem::computed("A", "B + 1"),
            LineItem::computed("B", "A + 1"),
        ]))
        .unwrap_err();
        assert_eq!(err, EngineError::CyclicDependency { cycle: vec!["A".into(), "B".into(), "A".into()] });
    }

    #[test]
    fn test_dependencies_include_lagged_codes() {
        let compiled = CompiledTemplate::compile(&template(vec![
            LineItem::raw("NET"),
            LineItem::computed("RE", "RE[t-1] + NET"),
        ]))
        .unwrap();
        let re = compiled.get("RE").unwrap();
        assert_eq!(re.dependencies.iter().collect::<Vec<_>>(), vec!["NET", "RE"]);
        assert!(!compiled.graph().has_edge("RE", "RE"));
        assert!(compiled.graph().has_edge("RE", "NET"));
    }
}
