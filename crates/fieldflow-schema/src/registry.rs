use std::collections::{HashMap, HashSet};

use fieldflow_config::{FieldDef, FormDef};

use crate::error::SchemaError;
use crate::graph::DependencyGraph;

/// Validated, immutable field specs for one form instance.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
  node_type: String,
  fields: Vec<FieldDef>,
  index: HashMap<String, usize>,
  graph: DependencyGraph,
}

impl FieldRegistry {
  /// Validate a form definition and index its fields.
  ///
  /// This process:
  /// 1. Rejects duplicate field names
  /// 2. Checks every `dependsOn` and `visibleWhen` reference
  /// 3. Rejects dependency cycles
  pub fn new(form: FormDef) -> Result<Self, SchemaError> {
    let mut index = HashMap::with_capacity(form.fields.len());
    for (i, field) in form.fields.iter().enumerate() {
      if index.insert(field.name.clone(), i).is_some() {
        return Err(SchemaError::DuplicateField {
          field: field.name.clone(),
        });
      }
    }

    for field in &form.fields {
      if let Some(parent) = &field.depends_on {
        if parent == &field.name {
          return Err(SchemaError::SelfDependency {
            field: field.name.clone(),
          });
        }
        if !index.contains_key(parent) {
          return Err(SchemaError::UnknownDependency {
            field: field.name.clone(),
            depends_on: parent.clone(),
          });
        }
      }

      if let Some(condition) = &field.visible_when
        && !index.contains_key(condition.field())
      {
        return Err(SchemaError::UnknownVisibilityField {
          field: field.name.clone(),
          references: condition.field().to_string(),
        });
      }
    }

    detect_cycle(&form.fields, &index)?;

    let graph = DependencyGraph::new(&form.fields);

    Ok(Self {
      node_type: form.node_type,
      fields: form.fields,
      index,
      graph,
    })
  }

  pub fn node_type(&self) -> &str {
    &self.node_type
  }

  /// Fields in schema order.
  pub fn fields(&self) -> &[FieldDef] {
    &self.fields
  }

  pub fn get(&self, name: &str) -> Option<&FieldDef> {
    self.index.get(name).map(|&i| &self.fields[i])
  }

  pub fn contains(&self, name: &str) -> bool {
    self.index.contains_key(name)
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }

  /// Specs of every field whose `dependsOn` is `name`.
  pub fn dependents_of(&self, name: &str) -> impl Iterator<Item = &FieldDef> + '_ {
    self
      .graph
      .dependents(name)
      .iter()
      .filter_map(|child| self.get(child))
  }

  pub fn len(&self) -> usize {
    self.fields.len()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }
}

/// Follow each field's parent chain; with one parent per field a cycle shows
/// up as revisiting a field on the same walk.
fn detect_cycle(fields: &[FieldDef], index: &HashMap<String, usize>) -> Result<(), SchemaError> {
  let mut cleared: HashSet<&str> = HashSet::new();

  for field in fields {
    let mut path: Vec<&str> = Vec::new();
    let mut on_path: HashSet<&str> = HashSet::new();
    let mut current = Some(field.name.as_str());

    while let Some(name) = current {
      if cleared.contains(name) {
        break;
      }
      if !on_path.insert(name) {
        let start = path.iter().position(|p| *p == name).unwrap_or(0);
        let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
        cycle.push(name.to_string());
        return Err(SchemaError::DependencyCycle { path: cycle });
      }
      path.push(name);
      current = index
        .get(name)
        .and_then(|&i| fields[i].depends_on.as_deref());
    }

    cleared.extend(path);
  }

  Ok(())
}
