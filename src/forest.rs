#![allow(dead_code)]
//! Reporting forest built from canonical people.
//!
//! The forest is a flat `by_id` index whose nodes list their direct reports
//! in scan order, plus the ordered list of roots. Nested [`TreeNode`]s are
//! materialized from it on demand for renderers and JSON output.
//!
//! Building never fails: a missing, dangling or self-referencing manager makes
//! the person a root. For manager cycles (A reports to B, B reports to A) one
//! member of each cycle is also listed as a root so every person stays
//! reachable; its reporting edge is kept. Traversals track visited ids and
//! never revisit a node.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::canonical::CanonicalPerson;

/// Renderer-specific value attached to a [`TreeNode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Annotation {
    Flag(bool),
    Text(String),
}

impl From<bool> for Annotation {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for Annotation {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Annotation {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Nested node: the wire shape consumed by chart and JSON renderers.
///
/// Annotations are flattened next to the fixed fields, so
/// `annotate("isLeader", true)` serializes as `"isLeader": true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub title: String,
    pub department: String,
    pub children: Vec<TreeNode>,
    #[serde(flatten)]
    pub annotations: BTreeMap<String, Annotation>,
}

impl TreeNode {
    pub fn annotate(&mut self, key: &str, value: impl Into<Annotation>) {
        self.annotations.insert(key.to_string(), value.into());
    }

    pub fn annotation(&self, key: &str) -> Option<&Annotation> {
        self.annotations.get(key)
    }

    /// True when the annotation is `Flag(true)`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.annotations.get(key), Some(Annotation::Flag(true)))
    }

    /// Ids of this node and all nested children, depth-first.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            ids.push(node.id.clone());
            stack.extend(node.children.iter().rev());
        }
        ids
    }
}

/// Flat entry of the `by_id` index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForestNode {
    pub id: String,
    pub name: String,
    pub title: String,
    pub department: String,
    /// Manager as linked in the forest. `None` for roots, except cycle
    /// members promoted to root, which keep their manager.
    pub manager_id: Option<String>,
    /// Direct reports in canonical scan order.
    pub children: Vec<String>,
}

impl From<&CanonicalPerson> for ForestNode {
    fn from(person: &CanonicalPerson) -> Self {
        Self {
            id: person.person_id.clone(),
            name: person.name.clone(),
            title: person.title.clone().unwrap_or_default(),
            department: person.department.clone().unwrap_or_default(),
            manager_id: None,
            children: Vec::new(),
        }
    }
}

/// A manager id pointing at nobody in the forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingReference {
    pub person_id: String,
    pub manager_id: String,
}

/// A reporting edge removed to break a manager cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleBreak {
    pub person_id: String,
    pub manager_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForestReport {
    pub dangling: Vec<DanglingReference>,
    pub cycle_breaks: Vec<CycleBreak>,
    /// Person ids seen more than once; later occurrences are ignored.
    pub duplicate_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForestStats {
    pub people: usize,
    pub roots: usize,
    pub max_depth: usize,
}

/// People grouped under one department name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentGroup {
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Forest {
    roots: Vec<String>,
    by_id: HashMap<String, ForestNode>,
    /// Person ids in canonical scan order.
    order: Vec<String>,
    report: ForestReport,
}

impl Forest {
    /// Link canonical people into a forest.
    pub fn build(people: &[CanonicalPerson]) -> Self {
        let mut forest = Forest::default();

        for person in people {
            if forest.by_id.contains_key(&person.person_id) {
                warn!("Duplicate person id '{}' ignored", person.person_id);
                forest.report.duplicate_ids.push(person.person_id.clone());
                continue;
            }
            forest.order.push(person.person_id.clone());
            forest
                .by_id
                .insert(person.person_id.clone(), ForestNode::from(person));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for person in people {
            let id = person.person_id.as_str();
            if !seen.insert(id) {
                continue;
            }

            let manager = match person.manager_id.as_deref() {
                None => None,
                Some(manager) if manager == id => {
                    forest.report.cycle_breaks.push(CycleBreak {
                        person_id: id.to_string(),
                        manager_id: manager.to_string(),
                    });
                    None
                }
                Some(manager) if !forest.by_id.contains_key(manager) => {
                    forest.report.dangling.push(DanglingReference {
                        person_id: id.to_string(),
                        manager_id: manager.to_string(),
                    });
                    None
                }
                Some(manager) => Some(manager),
            };

            match manager {
                Some(manager) => forest.link(manager, id),
                None => forest.roots.push(id.to_string()),
            }
        }

        forest.break_cycles();

        let stats = forest.stats();
        info!(
            "Built forest: {} people, {} root(s), depth {}",
            stats.people, stats.roots, stats.max_depth
        );
        if stats.roots > 1 {
            warn!("Multiple roots detected: {:?}", forest.roots);
        }
        if !forest.report.dangling.is_empty() {
            warn!(
                "{} dangling manager reference(s) promoted to root",
                forest.report.dangling.len()
            );
        }

        forest
    }

    fn link(&mut self, manager: &str, id: &str) {
        if let Some(node) = self.by_id.get_mut(id) {
            node.manager_id = Some(manager.to_string());
        }
        if let Some(parent) = self.by_id.get_mut(manager) {
            parent.children.push(id.to_string());
        }
    }

    /// Promote one member of every unreachable cycle to root.
    ///
    /// Anyone not reachable from a root sits on, or below, a cycle of
    /// manager links. Walking up from such a person finds the cycle; its
    /// earliest-scanned member is added to the roots and stays in its
    /// manager's children.
    fn break_cycles(&mut self) {
        let mut reached: HashSet<String> = HashSet::new();
        for root in &self.roots {
            self.collect_subtree(root, &mut reached);
        }
        if reached.len() == self.by_id.len() {
            return;
        }

        let rank: HashMap<String, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();

        for id in self.order.clone() {
            if reached.contains(&id) {
                continue;
            }

            let Some(entry) = self.cycle_entry(&id, &rank) else {
                continue;
            };
            if let Some(manager) = self.by_id.get(&entry).and_then(|n| n.manager_id.clone()) {
                warn!("Manager cycle detected: '{}' reports to '{}', promoted to root", entry, manager);
                self.report.cycle_breaks.push(CycleBreak {
                    person_id: entry.clone(),
                    manager_id: manager,
                });
            }
            self.roots.push(entry.clone());
            self.collect_subtree(&entry, &mut reached);
        }

        self.roots.sort_by_key(|id| rank.get(id).copied().unwrap_or(usize::MAX));
    }

    /// Earliest-scanned member of the cycle above `start`.
    fn cycle_entry(&self, start: &str, rank: &HashMap<String, usize>) -> Option<String> {
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        let mut current = start;

        loop {
            path.push(current);
            on_path.insert(current);
            let manager = self.by_id.get(current)?.manager_id.as_deref()?;
            if on_path.contains(manager) {
                let from = path.iter().position(|id| *id == manager)?;
                return path[from..]
                    .iter()
                    .min_by_key(|id| rank.get(**id).copied().unwrap_or(usize::MAX))
                    .map(|id| id.to_string());
            }
            current = manager;
        }
    }

    /// Ids of `root` and everyone below it not already in `visited`.
    fn collect_subtree(&self, root: &str, visited: &mut HashSet<String>) {
        let mut stack = vec![root.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.by_id.get(&current) {
                stack.extend(
                    node.children
                        .iter()
                        .filter(|c| !visited.contains(*c))
                        .cloned(),
                );
            }
        }
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn by_id(&self) -> &HashMap<String, ForestNode> {
        &self.by_id
    }

    pub fn get(&self, id: &str) -> Option<&ForestNode> {
        self.by_id.get(id)
    }

    pub fn report(&self) -> &ForestReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Nodes in canonical scan order.
    pub fn nodes(&self) -> impl Iterator<Item = &ForestNode> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    /// `id` plus all of its transitive reports. Empty for unknown ids.
    pub fn subtree_of(&self, id: &str) -> HashSet<String> {
        let mut members = HashSet::new();
        if self.by_id.contains_key(id) {
            self.collect_subtree(id, &mut members);
        }
        members
    }

    /// Materialize the nested tree rooted at `id`.
    pub fn tree(&self, id: &str) -> Option<TreeNode> {
        self.materialize(id, &mut HashSet::new())
    }

    /// Nested trees for every root, in root order. Each person appears once.
    pub fn trees(&self) -> Vec<TreeNode> {
        let mut visited = HashSet::new();
        self.roots
            .iter()
            .filter_map(|root| self.materialize(root, &mut visited))
            .collect()
    }

    fn materialize(&self, id: &str, visited: &mut HashSet<String>) -> Option<TreeNode> {
        let node = self.by_id.get(id)?;
        if !visited.insert(id.to_string()) {
            return None;
        }
        let children = node
            .children
            .iter()
            .filter_map(|child| self.materialize(child, visited))
            .collect();
        Some(TreeNode {
            id: node.id.clone(),
            name: node.name.clone(),
            title: node.title.clone(),
            department: node.department.clone(),
            children,
            annotations: BTreeMap::new(),
        })
    }

    /// Case-insensitive name substring search, in scan order.
    pub fn find_by_name(&self, query: &str) -> Vec<&ForestNode> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.nodes()
            .filter(|n| n.name.to_lowercase().contains(&query))
            .collect()
    }

    /// People grouped by department name, sorted by department.
    pub fn departments(&self) -> Vec<DepartmentGroup> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in self.nodes() {
            groups
                .entry(department_name(&node.department))
                .or_default()
                .push(node.id.clone());
        }
        groups
            .into_iter()
            .map(|(name, members)| DepartmentGroup { name, members })
            .collect()
    }

    pub fn stats(&self) -> ForestStats {
        let mut max_depth = 0;
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<(&str, usize)> = self.roots.iter().map(|r| (r.as_str(), 1)).collect();
        while let Some((id, depth)) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            max_depth = max_depth.max(depth);
            if let Some(node) = self.by_id.get(id) {
                stack.extend(node.children.iter().map(|c| (c.as_str(), depth + 1)));
            }
        }
        ForestStats {
            people: self.by_id.len(),
            roots: self.roots.len(),
            max_depth,
        }
    }
}

/// Department label without the trailing "(Head, Name)" qualifier.
///
/// `"HR Planning  (Doe, Jane)"` -> `"HR Planning"`; blank -> `"Unknown"`.
pub fn department_name(raw: &str) -> String {
    let name = raw.split('(').next().unwrap_or("").trim();
    if name.is_empty() {
        "Unknown".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str, name: &str, mgr: Option<&str>) -> CanonicalPerson {
        CanonicalPerson {
            person_id: id.to_string(),
            name: name.to_string(),
            manager_id: mgr.map(str::to_string),
            title: None,
            department: None,
            location: None,
            cells: Vec::new(),
        }
    }

    fn ids(set: &HashSet<String>) -> Vec<&str> {
        let mut ids: Vec<&str> = set.iter().map(String::as_str).collect();
        ids.sort();
        ids
    }

    fn assert_all_reachable(forest: &Forest) {
        let mut reached = HashSet::new();
        for root in forest.roots() {
            reached.extend(forest.subtree_of(root));
        }
        assert_eq!(reached.len(), forest.len());
    }

    #[test]
    fn test_single_root_with_child() {
        let forest = Forest::build(&[
            person("P1_Ana", "Ana", None),
            person("P2_Ben", "Ben", Some("P1_Ana")),
        ]);
        assert_eq!(forest.roots(), &["P1_Ana".to_string()]);
        assert_eq!(forest.get("P1_Ana").unwrap().children, vec!["P2_Ben"]);

        let trees = forest.trees();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].name, "Ana");
        assert_eq!(trees[0].children.len(), 1);
        assert_eq!(trees[0].children[0].name, "Ben");
    }

    #[test]
    fn test_children_keep_scan_order() {
        let forest = Forest::build(&[
            person("C", "C", Some("A")),
            person("A", "A", None),
            person("B", "B", Some("A")),
            person("D", "D", Some("A")),
        ]);
        assert_eq!(forest.get("A").unwrap().children, vec!["C", "B", "D"]);
    }

    #[test]
    fn test_by_id_indexes_every_person() {
        let people = [
            person("C", "C", Some("A")),
            person("A", "A", None),
            person("B", "B", Some("A")),
            person("D", "D", Some("GONE")),
        ];
        let forest = Forest::build(&people);
        let by_id = forest.by_id();
        assert_eq!(by_id.len(), people.len());
        for p in &people {
            assert_eq!(by_id[&p.person_id].id, p.person_id);
        }
        assert_eq!(by_id["A"].children, vec!["C", "B"]);
        assert!(by_id["D"].children.is_empty());
        assert_eq!(by_id["C"].manager_id.as_deref(), Some("A"));
        assert_eq!(by_id["D"].manager_id, None);
    }

    #[test]
    fn test_dangling_manager_is_root() {
        let forest = Forest::build(&[
            person("A", "A", None),
            person("B", "B", Some("GONE")),
        ]);
        assert_eq!(forest.roots(), &["A".to_string(), "B".to_string()]);
        assert_eq!(
            forest.report().dangling,
            vec![DanglingReference {
                person_id: "B".to_string(),
                manager_id: "GONE".to_string(),
            }]
        );
    }

    #[test]
    fn test_two_cycle_is_broken_and_reachable() {
        let forest = Forest::build(&[person("A", "A", Some("B")), person("B", "B", Some("A"))]);
        assert_eq!(forest.roots(), &["A".to_string()]);
        assert_eq!(ids(&forest.subtree_of("A")), vec!["A", "B"]);
        assert_eq!(ids(&forest.subtree_of("B")), vec!["A", "B"]);
        assert_eq!(forest.get("B").unwrap().children, vec!["A"]);
        assert_eq!(forest.get("A").unwrap().manager_id.as_deref(), Some("B"));
        assert_eq!(forest.report().cycle_breaks[0].manager_id, "B");
        assert_eq!(forest.trees().len(), 1);
        assert_eq!(forest.trees()[0].ids(), vec!["A", "B"]);
        assert_eq!(forest.report().cycle_breaks.len(), 1);
        assert_eq!(forest.report().cycle_breaks[0].person_id, "A");
        assert_all_reachable(&forest);
    }

    #[test]
    fn test_cycle_with_hanging_branch() {
        // D hangs below a B -> C -> B loop; the loop member scanned first is promoted.
        let forest = Forest::build(&[
            person("A", "A", None),
            person("D", "D", Some("B")),
            person("C", "C", Some("B")),
            person("B", "B", Some("C")),
        ]);
        assert_eq!(forest.roots(), &["A".to_string(), "C".to_string()]);
        assert_eq!(ids(&forest.subtree_of("C")), vec!["B", "C", "D"]);
        assert_eq!(ids(&forest.subtree_of("B")), vec!["B", "C", "D"]);
        assert_all_reachable(&forest);
        assert_eq!(forest.trees().iter().map(|t| t.ids().len()).sum::<usize>(), 4);
    }

    #[test]
    fn test_self_managed_person_is_root() {
        let forest = Forest::build(&[person("A", "A", Some("A"))]);
        assert_eq!(forest.roots(), &["A".to_string()]);
        assert!(forest.get("A").unwrap().children.is_empty());
    }

    #[test]
    fn test_duplicate_ids_ignored() {
        let forest = Forest::build(&[person("A", "Ana", None), person("A", "Other", None)]);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest.get("A").unwrap().name, "Ana");
        assert_eq!(forest.report().duplicate_ids, vec!["A"]);
        assert_eq!(forest.roots().len(), 1);
    }

    #[test]
    fn test_subtree_of() {
        let forest = Forest::build(&[
            person("A", "A", None),
            person("B", "B", Some("A")),
            person("C", "C", Some("B")),
            person("D", "D", Some("A")),
            person("E", "E", None),
        ]);
        assert_eq!(ids(&forest.subtree_of("B")), vec!["B", "C"]);
        assert_eq!(ids(&forest.subtree_of("A")), vec!["A", "B", "C", "D"]);
        assert!(forest.subtree_of("missing").is_empty());
        assert_eq!(forest.tree("B").unwrap().ids(), vec!["B", "C"]);
        assert_eq!(
            forest.stats(),
            ForestStats {
                people: 5,
                roots: 2,
                max_depth: 3
            }
        );
    }

    #[test]
    fn test_tree_node_json_shape() {
        let mut forest_people = vec![person("P1", "Ana", None)];
        forest_people[0].title = Some("Director".to_string());
        forest_people[0].department = Some("HR".to_string());
        forest_people.push(person("P2", "Ben", Some("P1")));
        let forest = Forest::build(&forest_people);

        let mut tree = forest.tree("P1").unwrap();
        tree.annotate("isLeader", true);
        tree.annotate("shortTitle", "Director");
        assert!(tree.flag("isLeader"));

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "P1",
                "name": "Ana",
                "title": "Director",
                "department": "HR",
                "isLeader": true,
                "shortTitle": "Director",
                "children": [
                    {"id": "P2", "name": "Ben", "title": "", "department": "", "children": []}
                ]
            })
        );
    }

    #[test]
    fn test_find_by_name_and_departments() {
        let mut people = vec![
            person("A", "Florence Moussoux", None),
            person("B", "Ben", Some("A")),
            person("C", "Cy", Some("A")),
        ];
        people[0].department = Some("HR Planning  (Moussoux, Florence)".to_string());
        people[1].department = Some("HR Planning".to_string());
        let forest = Forest::build(&people);

        let found = forest.find_by_name("florence");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "A");
        assert!(forest.find_by_name("  ").is_empty());

        assert_eq!(
            forest.departments(),
            vec![
                DepartmentGroup {
                    name: "HR Planning".to_string(),
                    members: vec!["A".to_string(), "B".to_string()],
                },
                DepartmentGroup {
                    name: "Unknown".to_string(),
                    members: vec!["C".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_department_name() {
        assert_eq!(department_name("HR Planning  (Moussoux, Florence)"), "HR Planning");
        assert_eq!(department_name("Relocation Services"), "Relocation Services");
        assert_eq!(department_name(""), "Unknown");
        assert_eq!(department_name("(Doe, Jane)"), "Unknown");
    }

    #[test]
    fn test_empty_forest() {
        let forest = Forest::build(&[]);
        assert!(forest.is_empty());
        assert!(forest.trees().is_empty());
        assert_eq!(forest.stats().max_depth, 0);
    }
}
