//! Parent/child forest over a flat set of tables.
//!
//! Tables are stored as nodes of a petgraph arena with a name index; an edge
//! runs from each parent table to each of its collection tables. Tables whose
//! declared parent is missing are kept as orphans and reported.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::warn;

use super::{SchemaError, SchemaResult, TableConf};

/// Forest of tables keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TableForest {
    graph: DiGraph<TableConf, ()>,
    index: HashMap<String, NodeIndex>,
    roots: Vec<NodeIndex>,
    orphans: Vec<NodeIndex>,
}

impl TableForest {
    /// Build the forest in two passes: index every table by name, then wire
    /// children to parents.
    pub fn build(tables: impl IntoIterator<Item = TableConf>) -> SchemaResult<Self> {
        let mut forest = TableForest::default();

        for table in tables {
            if forest.index.contains_key(&table.table_name) {
                return Err(SchemaError::DuplicateTable(table.table_name));
            }
            let name = table.table_name.clone();
            let idx = forest.graph.add_node(table);
            forest.index.insert(name, idx);
        }

        let nodes: Vec<NodeIndex> = forest.graph.node_indices().collect();
        for idx in nodes {
            let parent = forest.graph[idx].parent_table.clone();
            match parent {
                None if forest.graph[idx].is_root_table => forest.roots.push(idx),
                Some(parent) => match forest.index.get(&parent) {
                    Some(&parent_idx) => {
                        forest.graph.add_edge(parent_idx, idx, ());
                    }
                    None => {
                        warn!(table = %forest.graph[idx].table_name, parent = %parent, "Parent table not found");
                        forest.orphans.push(idx);
                    }
                },
                None => {
                    warn!(table = %forest.graph[idx].table_name, "Collection table without a parent");
                    forest.orphans.push(idx);
                }
            }
        }

        if let Err(cycle) = toposort(&forest.graph, None) {
            let name = forest.graph[cycle.node_id()].table_name.clone();
            return Err(SchemaError::Cycle(name));
        }

        Ok(forest)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn get(&self, name: &str) -> Option<&TableConf> {
        self.index.get(name).map(|&idx| &self.graph[idx])
    }

    /// Root tables in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = &TableConf> {
        self.roots.iter().map(|&idx| &self.graph[idx])
    }

    pub fn root(&self, name: &str) -> Option<&TableConf> {
        self.get(name).filter(|t| t.is_root_table)
    }

    /// Tables whose declared parent does not exist.
    pub fn orphans(&self) -> impl Iterator<Item = &TableConf> {
        self.orphans.iter().map(|&idx| &self.graph[idx])
    }

    pub fn parent(&self, name: &str) -> Option<&TableConf> {
        let idx = *self.index.get(name)?;
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .next()
            .map(|p| &self.graph[p])
    }

    /// Direct collection tables, in document order (position, then the
    /// order the tables were supplied in).
    pub fn children(&self, name: &str) -> Vec<&TableConf> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        self.child_indices(idx)
            .into_iter()
            .map(|c| &self.graph[c])
            .collect()
    }

    /// All tables below `name`, parents before children.
    pub fn descendants(&self, name: &str) -> Vec<&TableConf> {
        let mut out = Vec::new();
        if let Some(&idx) = self.index.get(name) {
            for child in self.child_indices(idx) {
                self.collect_preorder(child, &mut out);
            }
        }
        out
    }

    /// The root table that owns `name` (itself for roots).
    pub fn root_of(&self, name: &str) -> Option<&TableConf> {
        let mut current = self.get(name)?;
        while let Some(parent) = self.parent(&current.table_name) {
            current = parent;
        }
        current.is_root_table.then_some(current)
    }

    /// Every table with parents before children: each root tree in turn,
    /// then orphan subtrees.
    pub fn tables_in_order(&self) -> Vec<&TableConf> {
        let mut out = Vec::with_capacity(self.len());
        for &idx in self.roots.iter().chain(self.orphans.iter()) {
            self.collect_preorder(idx, &mut out);
        }
        out
    }

    /// Clone the tables back out, parents first.
    pub fn to_tables(&self) -> Vec<TableConf> {
        self.tables_in_order().into_iter().cloned().collect()
    }

    fn child_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        children.sort_by(|a, b| {
            let (ta, tb) = (&self.graph[*a], &self.graph[*b]);
            ta.position.cmp(&tb.position).then_with(|| a.index().cmp(&b.index()))
        });
        children
    }

    fn collect_preorder<'a>(&'a self, idx: NodeIndex, out: &mut Vec<&'a TableConf>) {
        out.push(&self.graph[idx]);
        for child in self.child_indices(idx) {
            self.collect_preorder(child, out);
        }
    }
}
