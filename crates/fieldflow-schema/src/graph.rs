use std::collections::{HashMap, VecDeque};

use fieldflow_config::FieldDef;

/// Parent/dependent structure of a form's `dependsOn` links.
///
/// Each field has at most one parent, so the graph is a forest. Dependents
/// are kept in schema declaration order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
  /// field -> fields whose `dependsOn` names it.
  dependents: HashMap<String, Vec<String>>,
  /// field -> its `dependsOn`.
  parents: HashMap<String, String>,
  /// Fields with no parent.
  roots: Vec<String>,
}

impl DependencyGraph {
  /// Build the graph from field definitions.
  pub fn new(fields: &[FieldDef]) -> Self {
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    let mut parents = HashMap::new();
    let mut roots = Vec::new();

    for field in fields {
      dependents.entry(field.name.clone()).or_default();
      match &field.depends_on {
        Some(parent) => {
          dependents
            .entry(parent.clone())
            .or_default()
            .push(field.name.clone());
          parents.insert(field.name.clone(), parent.clone());
        }
        None => roots.push(field.name.clone()),
      }
    }

    Self {
      dependents,
      parents,
      roots,
    }
  }

  /// Fields that directly depend on `field`.
  pub fn dependents(&self, field: &str) -> &[String] {
    self
      .dependents
      .get(field)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// The field `field` depends on, if any.
  pub fn parent(&self, field: &str) -> Option<&str> {
    self.parents.get(field).map(String::as_str)
  }

  /// Fields with no parent.
  pub fn roots(&self) -> &[String] {
    &self.roots
  }

  /// Every field reachable through dependents, breadth first.
  pub fn descendants(&self, field: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut queue: VecDeque<&str> = VecDeque::from([field]);

    while let Some(current) = queue.pop_front() {
      for child in self.dependents(current) {
        out.push(child.clone());
        queue.push_back(child);
      }
    }

    out
  }

  /// Number of `dependsOn` hops between `field` and its root.
  pub fn depth(&self, field: &str) -> usize {
    let mut depth = 0;
    let mut current = field;
    while let Some(parent) = self.parent(current) {
      depth += 1;
      current = parent;
    }
    depth
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chain() -> Vec<FieldDef> {
    vec![
      FieldDef::new("base"),
      FieldDef::new("table").depends_on("base"),
      FieldDef::new("column").depends_on("table"),
      FieldDef::new("view").depends_on("table"),
      FieldDef::new("note"),
    ]
  }

  #[test]
  fn test_dependents_in_declaration_order() {
    let graph = DependencyGraph::new(&chain());
    assert_eq!(graph.dependents("table"), &["column".to_string(), "view".to_string()]);
    assert!(graph.dependents("column").is_empty());
    assert!(graph.dependents("missing").is_empty());
  }

  #[test]
  fn test_roots_and_parents() {
    let graph = DependencyGraph::new(&chain());
    assert_eq!(graph.roots(), &["base".to_string(), "note".to_string()]);
    assert_eq!(graph.parent("column"), Some("table"));
    assert_eq!(graph.parent("base"), None);
  }

  #[test]
  fn test_descendants_and_depth() {
    let graph = DependencyGraph::new(&chain());
    assert_eq!(graph.descendants("base"), vec!["table", "column", "view"]);
    assert_eq!(graph.depth("column"), 2);
    assert_eq!(graph.depth("note"), 0);
  }
}
