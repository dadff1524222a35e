//! Interactive chart view: presentation annotations on top of the forest.
//!
//! Nothing here changes the forest. The chart is a fresh set of
//! [`TreeNode`]s decorated through the annotation map, with two kinds of
//! synthesized nodes that exist only in this view: a wrapper root when there
//! are several roots, and keyword groups under a single root.

use tracing::{debug, info};

use crate::config::{ChartConfig, GroupRule};
use crate::forest::{Forest, TreeNode};

pub const VIRTUAL_ROOT_ID: &str = "VIRTUAL_ROOT";

pub const IS_LEADER: &str = "isLeader";
pub const IS_GROUP: &str = "isGroup";
pub const SHORT_TITLE: &str = "shortTitle";
pub const COLLAPSED: &str = "collapsed";
pub const COMPACT: &str = "compact";

/// Build the single-rooted chart tree. `None` for an empty forest.
pub fn build_chart(forest: &Forest, config: &ChartConfig) -> Option<TreeNode> {
    let mut trees = forest.trees();
    for tree in &mut trees {
        annotate_people(tree, config.short_title_max);
    }

    let mut root = match trees.len() {
        0 => return None,
        1 => {
            let mut root = trees.remove(0);
            group_reports(&mut root, config);
            root
        }
        n => {
            info!("Wrapping {} roots under a virtual root", n);
            let mut root = synthetic_node(VIRTUAL_ROOT_ID, &config.virtual_root_name, "");
            root.children = trees;
            root
        }
    };

    apply_collapse(&mut root, true, config.expanded_group.as_deref());
    Some(root)
}

/// Title up to the first comma, truncated to `max` characters with an ellipsis.
pub fn short_title(title: &str, max: usize) -> String {
    let clause = title.split(',').next().unwrap_or("").trim();
    if clause.chars().count() <= max {
        return clause.to_string();
    }
    let keep: String = clause.chars().take(max.saturating_sub(3)).collect();
    format!("{}…", keep.trim_end())
}

/// Leaders are people with a department (organization) entry of their own.
fn annotate_people(node: &mut TreeNode, short_title_max: usize) {
    let leader = !node.department.trim().is_empty();
    let short = short_title(&node.title, short_title_max);
    node.annotate(IS_LEADER, leader);
    node.annotate(SHORT_TITLE, short);
    for child in &mut node.children {
        annotate_people(child, short_title_max);
    }
}

fn synthetic_node(id: &str, name: &str, title: &str) -> TreeNode {
    let mut node = TreeNode {
        id: id.to_string(),
        name: name.to_string(),
        title: title.to_string(),
        department: String::new(),
        children: Vec::new(),
        annotations: Default::default(),
    };
    node.annotate(IS_LEADER, true);
    node.annotate(IS_GROUP, true);
    node.annotate(SHORT_TITLE, name);
    node
}

fn group_node(rule: &GroupRule) -> TreeNode {
    let mut node = synthetic_node(&rule.id, &rule.label, &rule.description);
    node.annotate(COMPACT, rule.compact);
    node
}

/// Sort the root's direct reports into keyword groups.
///
/// Reports matching no rule go to the fallback group, or stay directly under
/// the root when there is none. Empty groups are omitted.
fn group_reports(root: &mut TreeNode, config: &ChartConfig) {
    if config.group_rules.is_empty() && config.fallback_group.is_none() {
        return;
    }

    let mut groups: Vec<TreeNode> = config.group_rules.iter().map(group_node).collect();
    let mut fallback = config.fallback_group.as_ref().map(group_node);
    let mut ungrouped = Vec::new();

    for child in std::mem::take(&mut root.children) {
        let title = child.title.to_lowercase();
        let matched = config.group_rules.iter().position(|rule| {
            rule.keywords
                .iter()
                .any(|k| !k.is_empty() && title.contains(&k.to_lowercase()))
        });
        match (matched, fallback.as_mut()) {
            (Some(idx), _) => groups[idx].children.push(child),
            (None, Some(group)) => group.children.push(child),
            (None, None) => ungrouped.push(child),
        }
    }

    root.children = groups
        .into_iter()
        .chain(fallback)
        .filter(|g| !g.children.is_empty())
        .collect();
    debug!(
        "Grouped root reports into {:?}",
        root.children.iter().map(|g| g.id.as_str()).collect::<Vec<_>>()
    );
    root.children.extend(ungrouped);
}

/// Root starts expanded; groups start collapsed except `expanded_group`;
/// everyone else with reports starts collapsed unless they are a leader.
fn apply_collapse(node: &mut TreeNode, is_root: bool, expanded_group: Option<&str>) {
    if node.children.is_empty() {
        return;
    }

    let collapsed = if is_root {
        false
    } else if node.flag(IS_GROUP) {
        expanded_group != Some(node.id.as_str())
    } else {
        !node.flag(IS_LEADER)
    };
    node.annotate(COLLAPSED, collapsed);

    for child in &mut node.children {
        apply_collapse(child, false, expanded_group);
    }
}
