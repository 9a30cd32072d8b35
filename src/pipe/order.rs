//! Orderings applied to files before they are concatenated or injected.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use glob::Pattern;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use swc_ecma_ast::{CallExpr, Callee, Expr, Lit, MemberProp};
use swc_ecma_visit::{Visit, VisitWith};

use crate::error::StepError;
use crate::js::Script;
use crate::output::Output;

/// Moves files whose name matches one of `patterns` to the front, grouped
/// in pattern order. Everything else keeps its relative order.
pub fn by_patterns(files: &mut [Output], patterns: &[String]) -> Result<(), StepError> {
    let patterns = patterns
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<Result<Vec<_>, _>>()?;

    files.sort_by_key(|file| {
        let name = file.path.file_name().unwrap_or_default();
        patterns
            .iter()
            .position(|p| p.matches(name))
            .unwrap_or(patterns.len())
    });

    Ok(())
}

/// Angular modules a script defines and the ones it needs.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Modules {
    pub defines: Vec<String>,
    pub requires: Vec<String>,
}

/// Finds `angular.module('name', [deps])` definitions and
/// `angular.module('name')` lookups. Unparseable scripts declare nothing.
pub fn modules(name: &str, code: &str) -> Modules {
    let Ok((script, _)) = Script::parse(name, code) else {
        return Modules::default();
    };

    let mut finder = ModuleFinder {
        script: &script,
        modules: Modules::default(),
    };
    script.program().visit_with(&mut finder);

    let Modules {
        defines,
        mut requires,
    } = finder.modules;
    requires.retain(|m| !defines.contains(m));

    Modules { defines, requires }
}

struct ModuleFinder<'a> {
    script: &'a Script,
    modules: Modules,
}

impl ModuleFinder<'_> {
    fn string(&self, expr: &Expr) -> Option<String> {
        let Expr::Lit(Lit::Str(s)) = expr else {
            return None;
        };
        unquote(self.script.snippet(s.span)?)
    }

    fn push(list: &mut Vec<String>, name: String) {
        if !list.contains(&name) {
            list.push(name);
        }
    }
}

fn unquote(literal: String) -> Option<String> {
    let inner = literal
        .strip_prefix(['\'', '"'])?
        .strip_suffix(['\'', '"'])?;
    Some(inner.to_owned())
}

fn is_angular_module(callee: &Callee) -> bool {
    let Callee::Expr(expr) = callee else {
        return false;
    };
    let Expr::Member(member) = &**expr else {
        return false;
    };
    let Expr::Ident(object) = &*member.obj else {
        return false;
    };
    let MemberProp::Ident(prop) = &member.prop else {
        return false;
    };

    &*object.sym == "angular" && &*prop.sym == "module"
}

impl Visit for ModuleFinder<'_> {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        if is_angular_module(&call.callee)
            && let Some(first) = call.args.first()
            && let Some(name) = self.string(&first.expr)
        {
            match call.args.get(1).map(|arg| &*arg.expr) {
                Some(Expr::Array(deps)) => {
                    for dep in deps.elems.iter().flatten() {
                        if let Some(dep) = self.string(&dep.expr) {
                            Self::push(&mut self.modules.requires, dep);
                        }
                    }
                    Self::push(&mut self.modules.defines, name);
                }
                _ => Self::push(&mut self.modules.requires, name),
            }
        }

        call.visit_children_with(self);
    }
}

/// Whether any of `files` defines the Angular module `module`.
pub fn defines(files: &[Output], module: &str) -> bool {
    files
        .iter()
        .any(|file| modules(file.path.as_str(), &file.text()).defines.iter().any(|m| m == module))
}

/// Orders scripts so that every Angular module is defined before the files
/// that use it. Modules defined nowhere (vendor modules) impose no order.
/// Ties keep the input order.
pub fn angular_filesort(files: Vec<Output>) -> Result<Vec<Output>, StepError> {
    let modules: Vec<Modules> = files
        .iter()
        .map(|file| modules(file.path.as_str(), &file.text()))
        .collect();

    let mut owners: HashMap<&str, usize> = HashMap::new();
    for (i, m) in modules.iter().enumerate() {
        for name in &m.defines {
            owners.entry(name.as_str()).or_insert(i);
        }
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(files.len(), 0);
    let nodes: Vec<NodeIndex> = (0..files.len()).map(|i| graph.add_node(i)).collect();

    for (i, m) in modules.iter().enumerate() {
        for name in &m.requires {
            if let Some(&owner) = owners.get(name.as_str())
                && owner != i
            {
                graph.update_edge(nodes[owner], nodes[i], ());
            }
        }
    }

    let mut indegree: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(files.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
            let j = graph[next];
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    if order.len() < files.len() {
        let stuck = (0..files.len())
            .find(|i| !order.contains(i))
            .map(|i| files[i].path.clone())
            .unwrap_or_default();
        return Err(StepError::OrderCycle(stuck));
    }

    let mut slots: Vec<Option<Output>> = files.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
