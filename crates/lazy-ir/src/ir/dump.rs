//! Graph traversal and text dumps for diagnostics.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::Arc;

use super::node::NodePtr;
use super::value::{node_key, Value};

/// Unique nodes reachable from `roots`, each listed after all of its operands.
pub fn post_order(roots: &[Value]) -> Vec<NodePtr> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<(NodePtr, bool)> = roots
        .iter()
        .rev()
        .map(|root| (Arc::clone(root.node()), false))
        .collect();

    while let Some((node, expanded)) = stack.pop() {
        let key = node_key(&*node);
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(key) {
            continue;
        }
        stack.push((Arc::clone(&node), true));
        for operand in node.operands().iter().rev() {
            if !visited.contains(&node_key(&**operand.node())) {
                stack.push((Arc::clone(operand.node()), false));
            }
        }
    }
    order
}

/// Renders the graph below `roots`, one node per line in post order:
///
/// ```text
/// %0 = f32[] prim::Constant, value=1
/// %1 = f32[] aten::neg(%0)
/// ROOT (%1)
/// ```
pub fn dump_text(roots: &[Value]) -> String {
    let nodes = post_order(roots);
    let ids: HashMap<usize, usize> = nodes
        .iter()
        .enumerate()
        .map(|(id, node)| (node_key(&**node), id))
        .collect();
    let value_name = |value: &Value| {
        let id = ids[&node_key(&**value.node())];
        if value.index() == 0 {
            format!("%{id}")
        } else {
            format!("%{id}.{}", value.index())
        }
    };

    let mut out = String::new();
    for (id, node) in nodes.iter().enumerate() {
        let summary = node.describe();
        if node.operands().is_empty() {
            let _ = writeln!(out, "%{id} = {summary}");
            continue;
        }
        let operands: Vec<String> = node.operands().iter().map(&value_name).collect();
        let operands = operands.join(", ");
        match node.as_graph_node() {
            Some(core) => {
                let label = core.shape_label();
                let head = format!("{label} {}", node.op());
                let rest = summary.strip_prefix(head.as_str()).unwrap_or_default();
                let _ = writeln!(out, "%{id} = {head}({operands}){rest}");
            }
            None => {
                let _ = writeln!(out, "%{id} = {}({operands})", node.op());
            }
        }
    }
    let roots: Vec<String> = roots.iter().map(&value_name).collect();
    let _ = writeln!(out, "ROOT ({})", roots.join(", "));
    out
}
