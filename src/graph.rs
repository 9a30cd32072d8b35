//! Build targets and the prerequisite graph between them.
//!
//! The catalog of targets is fixed. Each target names the targets that must
//! have finished before it starts; [`TaskGraph`] checks those declarations
//! once at startup and turns a requested target into a sequential plan.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use clap::ValueEnum;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{DfsPostOrder, Reversed};

use crate::config::Profile;
use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum Target {
    CleanDev,
    CleanProd,
    ValidatePartials,
    ValidateAppScripts,
    #[value(name = "validate-devserver-scripts")]
    ValidateDevServerScripts,
    BuildPartialsDev,
    ConvertPartialsToJs,
    BuildAppScriptsDev,
    BuildAppScriptsProd,
    BuildStylesDev,
    BuildStylesProd,
    BuildVendorScriptsDev,
    BuildVendorScriptsProd,
    BuildIndexDev,
    BuildIndexProd,
    BuildAppDev,
    BuildAppProd,
    CleanBuildAppDev,
    CleanBuildAppProd,
    WatchDev,
    WatchProd,
    /// Clean production build, used when no target is given.
    Default,
}

impl Target {
    pub const ALL: [Target; 22] = [
        Target::CleanDev,
        Target::CleanProd,
        Target::ValidatePartials,
        Target::ValidateAppScripts,
        Target::ValidateDevServerScripts,
        Target::BuildPartialsDev,
        Target::ConvertPartialsToJs,
        Target::BuildAppScriptsDev,
        Target::BuildAppScriptsProd,
        Target::BuildStylesDev,
        Target::BuildStylesProd,
        Target::BuildVendorScriptsDev,
        Target::BuildVendorScriptsProd,
        Target::BuildIndexDev,
        Target::BuildIndexProd,
        Target::BuildAppDev,
        Target::BuildAppProd,
        Target::CleanBuildAppDev,
        Target::CleanBuildAppProd,
        Target::WatchDev,
        Target::WatchProd,
        Target::Default,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Target::CleanDev => "clean-dev",
            Target::CleanProd => "clean-prod",
            Target::ValidatePartials => "validate-partials",
            Target::ValidateAppScripts => "validate-app-scripts",
            Target::ValidateDevServerScripts => "validate-devserver-scripts",
            Target::BuildPartialsDev => "build-partials-dev",
            Target::ConvertPartialsToJs => "convert-partials-to-js",
            Target::BuildAppScriptsDev => "build-app-scripts-dev",
            Target::BuildAppScriptsProd => "build-app-scripts-prod",
            Target::BuildStylesDev => "build-styles-dev",
            Target::BuildStylesProd => "build-styles-prod",
            Target::BuildVendorScriptsDev => "build-vendor-scripts-dev",
            Target::BuildVendorScriptsProd => "build-vendor-scripts-prod",
            Target::BuildIndexDev => "build-index-dev",
            Target::BuildIndexProd => "build-index-prod",
            Target::BuildAppDev => "build-app-dev",
            Target::BuildAppProd => "build-app-prod",
            Target::CleanBuildAppDev => "clean-build-app-dev",
            Target::CleanBuildAppProd => "clean-build-app-prod",
            Target::WatchDev => "watch-dev",
            Target::WatchProd => "watch-prod",
            Target::Default => "default",
        }
    }

    /// Targets that must complete before this one starts.
    pub fn prerequisites(self) -> &'static [Target] {
        match self {
            Target::CleanBuildAppDev => &[Target::CleanDev],
            Target::CleanBuildAppProd => &[Target::CleanProd],
            Target::WatchDev => &[Target::CleanBuildAppDev],
            Target::WatchProd => &[Target::CleanBuildAppProd],
            Target::Default => &[Target::CleanProd],
            _ => &[],
        }
    }

    /// Profile of the output tree the target writes to, if any.
    pub fn profile(self) -> Option<Profile> {
        match self {
            Target::CleanDev
            | Target::BuildPartialsDev
            | Target::BuildAppScriptsDev
            | Target::BuildStylesDev
            | Target::BuildVendorScriptsDev
            | Target::BuildIndexDev
            | Target::BuildAppDev
            | Target::CleanBuildAppDev
            | Target::WatchDev => Some(Profile::Dev),
            Target::CleanProd
            | Target::BuildAppScriptsProd
            | Target::BuildStylesProd
            | Target::BuildVendorScriptsProd
            | Target::BuildIndexProd
            | Target::BuildAppProd
            | Target::CleanBuildAppProd
            | Target::WatchProd
            | Target::Default => Some(Profile::Prod),
            Target::ValidatePartials
            | Target::ValidateAppScripts
            | Target::ValidateDevServerScripts
            | Target::ConvertPartialsToJs => None,
        }
    }

    /// The graph of every target in the catalog.
    pub fn graph() -> Result<TaskGraph<Target>, GraphError> {
        TaskGraph::new(Target::ALL.iter().map(|&t| (t, t.prerequisites())))
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated prerequisite graph. Edges point from a prerequisite to the task
/// that needs it.
#[derive(Debug)]
pub struct TaskGraph<K> {
    graph: DiGraph<K, ()>,
    nodes: HashMap<K, NodeIndex>,
}

impl<K> TaskGraph<K>
where
    K: Copy + Eq + Hash + Display,
{
    /// Builds the graph from `(task, prerequisites)` declarations.
    ///
    /// Fails if a task is declared twice, if a prerequisite is not declared
    /// itself, or if the declarations form a cycle.
    pub fn new<'a>(declarations: impl IntoIterator<Item = (K, &'a [K])>) -> Result<Self, GraphError>
    where
        K: 'a,
    {
        let declarations: Vec<(K, &[K])> = declarations.into_iter().collect();

        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        for &(task, _) in &declarations {
            if nodes.contains_key(&task) {
                return Err(GraphError::Duplicate(task.to_string()));
            }
            nodes.insert(task, graph.add_node(task));
        }

        for &(task, prerequisites) in &declarations {
            let to = nodes[&task];
            for prerequisite in prerequisites {
                let Some(&from) = nodes.get(prerequisite) else {
                    return Err(GraphError::Missing {
                        task: task.to_string(),
                        prerequisite: prerequisite.to_string(),
                    });
                };
                graph.add_edge(from, to, ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(GraphError::Cycle(graph[cycle.node_id()].to_string()));
        }

        Ok(Self { graph, nodes })
    }

    /// Every prerequisite of `target`, transitively and each once, in an
    /// order in which they can run, followed by `target` itself.
    pub fn plan(&self, target: K) -> Result<Vec<K>, GraphError> {
        let &start = self
            .nodes
            .get(&target)
            .ok_or_else(|| GraphError::Unknown(target.to_string()))?;

        let reversed = Reversed(&self.graph);
        let mut dfs = DfsPostOrder::new(reversed, start);
        let mut plan = Vec::new();

        while let Some(node) = dfs.next(reversed) {
            plan.push(self.graph[node]);
        }

        Ok(plan)
    }
}
