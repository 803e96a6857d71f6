use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::core::{Package, World};
use crate::util::InternedString;

type NodeKey = (InternedString, InternedString);

fn key_of(pkg: &Package) -> NodeKey {
    (pkg.ns(), pkg.name())
}

/// Shared node/edge collection logic: nodes are numbered in
/// (namespace-insertion-order, package-insertion-order), which is what
/// makes ready-set tie-breaking deterministic.
struct EdgeSet {
    nodes: Vec<Arc<Package>>,
    index: HashMap<NodeKey, usize>,
    // dependent -> dependencies, in registration order
    edges: Vec<Vec<usize>>,
}

impl EdgeSet {
    fn collect(world: &World) -> EdgeSet {
        let mut nodes = Vec::new();
        let mut index = HashMap::new();
        for ns in world.namespaces() {
            for pkg in ns.packages() {
                index.insert(key_of(&pkg), nodes.len());
                nodes.push(pkg);
            }
        }
        let mut edges = vec![Vec::new(); nodes.len()];
        for (i, pkg) in nodes.iter().enumerate() {
            for dep in pkg.depends() {
                let j = index[&key_of(dep.package())];
                if !edges[i].contains(&j) {
                    edges[i].push(j);
                }
            }
        }
        EdgeSet {
            nodes,
            index,
            edges,
        }
    }
}

/// Global view of every package and its dependency edges, used for cycle
/// detection before any build starts.
#[derive(Default)]
pub struct DependencyGraph {
    nodes: Vec<Arc<Package>>,
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> DependencyGraph {
        DependencyGraph::default()
    }

    /// Scan every package across the world's namespaces and snapshot the
    /// edge set.
    pub fn fill(&mut self, world: &World) {
        let set = EdgeSet::collect(world);
        self.nodes = set.nodes;
        self.edges = set.edges;
    }

    /// Every package participating in a strongly connected component of
    /// size > 1, plus every package with a self-loop. Empty means the graph
    /// is safe to build.
    pub fn cycled_packages(&self) -> Vec<Arc<Package>> {
        let sccs = tarjan(self.nodes.len(), &self.edges);
        let mut cycled = Vec::new();
        for scc in sccs {
            if scc.len() > 1 {
                cycled.extend(scc);
                continue;
            }
            let n = scc[0];
            if self.edges[n].contains(&n) {
                cycled.push(n);
            }
        }
        cycled.sort_unstable();
        cycled.into_iter().map(|n| self.nodes[n].clone()).collect()
    }
}

/// Tarjan's strongly-connected-components algorithm, iterative so deep
/// dependency chains cannot overflow the stack.
fn tarjan(n: usize, edges: &[Vec<usize>]) -> Vec<Vec<usize>> {
    #[derive(Clone, Copy)]
    struct NodeState {
        index: usize,
        lowlink: usize,
        on_stack: bool,
        visited: bool,
    }

    let mut state = vec![
        NodeState {
            index: 0,
            lowlink: 0,
            on_stack: false,
            visited: false,
        };
        n
    ];
    let mut next_index = 0;
    let mut stack = Vec::new();
    let mut sccs = Vec::new();

    for root in 0..n {
        if state[root].visited {
            continue;
        }
        // (node, next-edge-offset) pairs emulate the recursion
        let mut call_stack = vec![(root, 0)];
        while let Some(&(v, edge_pos)) = call_stack.last() {
            if !state[v].visited {
                state[v].visited = true;
                state[v].index = next_index;
                state[v].lowlink = next_index;
                next_index += 1;
                stack.push(v);
                state[v].on_stack = true;
            }
            if let Some(&w) = edges[v].get(edge_pos) {
                call_stack.last_mut().expect("frame just observed").1 += 1;
                if !state[w].visited {
                    call_stack.push((w, 0));
                } else if state[w].on_stack {
                    state[v].lowlink = state[v].lowlink.min(state[w].index);
                }
                continue;
            }
            // all edges of v handled
            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                state[parent].lowlink = state[parent].lowlink.min(state[v].lowlink);
            }
            if state[v].lowlink == state[v].index {
                let mut scc = Vec::new();
                loop {
                    let w = stack.pop().expect("tarjan stack underflow");
                    state[w].on_stack = false;
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }
                sccs.push(scc);
            }
        }
    }
    sccs
}

/// The execution-phase view of the same edges. The graph monotonically
/// shrinks: `delete_node` is called exactly once per successfully built
/// package, and the ready-set cursor hands out packages whose remaining
/// dependencies have all been deleted.
#[derive(Default)]
pub struct TopoGraph {
    nodes: Vec<Arc<Package>>,
    index: HashMap<NodeKey, usize>,
    // remaining outgoing dependencies per node
    deps: Vec<HashSet<usize>>,
    // reverse edges: who depends on this node
    rdeps: Vec<Vec<usize>>,
    deleted: Vec<bool>,
    ready: BTreeSet<usize>,
}

impl TopoGraph {
    pub fn new() -> TopoGraph {
        TopoGraph::default()
    }

    pub fn fill(&mut self, world: &World) {
        let set = EdgeSet::collect(world);
        let n = set.nodes.len();
        self.deps = set.edges.iter().map(|e| e.iter().cloned().collect()).collect();
        self.rdeps = vec![Vec::new(); n];
        for (i, deps) in set.edges.iter().enumerate() {
            for &j in deps {
                self.rdeps[j].push(i);
            }
        }
        self.nodes = set.nodes;
        self.index = set.index;
        self.deleted = vec![false; n];
        self.ready = BTreeSet::new();
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.iter().all(|&d| d)
    }

    /// Recompute the ready-set: live nodes with no remaining dependencies
    /// that have not been built yet.
    pub fn topological(&mut self) {
        self.ready = (0..self.nodes.len())
            .filter(|&i| !self.deleted[i] && !self.nodes[i].is_built() && self.deps[i].is_empty())
            .collect();
    }

    /// Hand out the lowest-numbered ready package, or `None` when nothing
    /// is dispatchable right now.
    pub fn topo_next(&mut self) -> Option<Arc<Package>> {
        let i = self.ready.iter().next().cloned()?;
        self.ready.remove(&i);
        Some(self.nodes[i].clone())
    }

    /// Remove a built package and the edges that terminate in it, readying
    /// dependents whose last dependency this was.
    pub fn delete_node(&mut self, pkg: &Package) {
        let Some(&i) = self.index.get(&key_of(pkg)) else {
            return;
        };
        if self.deleted[i] {
            return;
        }
        self.deleted[i] = true;
        self.ready.remove(&i);
        for &r in &self.rdeps[i] {
            self.deps[r].remove(&i);
        }
    }
}
