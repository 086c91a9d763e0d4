use crate::compute::Snapshot;
use crate::formula::{Namespace, Reference};
use crate::store::CompiledTemplate;
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the in-period dependency tree below `code` with every node's
/// value and formula. A node already printed is shown again only as a
/// reference to the level where it first appeared.
pub fn format_trace(template: &CompiledTemplate, snapshot: &Snapshot, code: &str) -> String {
    let mut tracer = Tracer {
        template,
        snapshot,
        visited_at_level: HashMap::new(),
        output: String::new(),
    };

    if template.contains(code) {
        let _ = writeln!(tracer.output, "AUDIT TRACE for '{}':", code);
        let _ = writeln!(tracer.output, "--------------------------------------------------");
        tracer.trace_item(code, 1, "");
    } else {
        let _ = writeln!(tracer.output, "Error: unknown line item '{}'", code);
    }
    tracer.output
}

struct Tracer<'a> {
    template: &'a CompiledTemplate,
    snapshot: &'a Snapshot,
    visited_at_level: HashMap<String, usize>,
    output: String,
}

enum Child<'r> {
    Item(&'r str),
    Leaf(&'r Reference),
}

impl<'a> Tracer<'a> {
    fn trace_item(&mut self, code: &str, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(code) {
            let _ = writeln!(self.output, "{}{} -> (Ref to L{})", prefix, code, first_seen);
            return;
        }
        self.visited_at_level.insert(code.to_string(), level);

        let template = self.template;
        let Some(item) = template.get(code) else { return };
        let header = format!("[L{}] {}{}", level, code, self.format_value(code));

        match (&item.formula, &item.expr) {
            (Some(formula), Some(expr)) => {
                let _ = writeln!(self.output, "{}{} = {}", prefix, header, formula);
                let mut children: Vec<Child> = Vec::new();
                for r in expr.references() {
                    let child = if r.is_unqualified() && r.offset == 0 && template.contains(&r.code) {
                        Child::Item(&r.code)
                    } else {
                        Child::Leaf(r)
                    };
                    let duplicate = children.iter().any(|c| match (c, &child) {
                        (Child::Item(a), Child::Item(b)) => a == b,
                        (Child::Leaf(a), Child::Leaf(b)) => a == b,
                        _ => false,
                    });
                    if !duplicate {
                        children.push(child);
                    }
                }
                self.recurse_children(prefix, &children, level);
            }
            _ => {
                let source = item.definition.raw_input_reference.as_deref().unwrap_or(code);
                let _ = writeln!(self.output, "{}{} -> Input({})", prefix, header, source.trim());
            }
        }
    }

    fn recurse_children(&mut self, prefix: &str, children: &[Child], level: usize) {
        let stem = build_child_stem(prefix);
        for (i, child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            let full_prefix = format!("{}{}", stem, connector);
            match child {
                Child::Item(code) => self.trace_item(code, level + 1, &full_prefix),
                Child::Leaf(r) => {
                    let _ = writeln!(self.output, "{}{} ({})", full_prefix, r, describe_leaf(r));
                }
            }
        }
    }

    fn format_value(&self, code: &str) -> String {
        match self.snapshot.get(code) {
            Some(v) => format!("[{:.3}]", v),
            None => "[?]".to_string(),
        }
    }
}

fn describe_leaf(r: &Reference) -> &'static str {
    match (&r.namespace, r.offset) {
        (Some(Namespace::RawInput), _) => "raw input",
        (Some(Namespace::Domain(_)), _) => "peer domain",
        (None, o) if o < 0 => "prior period",
        (None, o) if o > 0 => "lookahead",
        (None, _) => "external",
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}
