//! Field visibility.
//!
//! Rules, in precedence order:
//! 1. `hidden` fields are never visible
//! 2. tab-restricted fields are visible only on their tab
//! 3. a field with `dependsOn = P` needs a non-empty value for `P`
//! 4. `visibleWhen` and registered overrides may hide it further
//!
//! Evaluation is pure and cheap enough to run on every render.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use fieldflow_config::{FieldDef, FieldValues, is_truthy};

use crate::registry::FieldRegistry;

/// Extra predicate for one field. Returning `false` hides the field even when
/// its dependency is satisfied; it can never reveal a field rules 1-3 hide.
pub type VisibilityOverride = Arc<dyn Fn(&FieldDef, &FieldValues) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct Visibility {
  active_tab: Option<String>,
  overrides: HashMap<String, Vec<VisibilityOverride>>,
}

impl fmt::Debug for Visibility {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Visibility")
      .field("active_tab", &self.active_tab)
      .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl Visibility {
  pub fn new() -> Self {
    Self::default()
  }

  /// Show the fields assigned to `tab`. Without an active tab every tabbed
  /// field is hidden.
  pub fn with_active_tab(mut self, tab: impl Into<String>) -> Self {
    self.active_tab = Some(tab.into());
    self
  }

  pub fn set_active_tab(&mut self, tab: Option<String>) {
    self.active_tab = tab;
  }

  pub fn active_tab(&self) -> Option<&str> {
    self.active_tab.as_deref()
  }

  /// Layer a predicate on top of the generic rules for `field`.
  pub fn add_override<F>(&mut self, field: impl Into<String>, predicate: F)
  where
    F: Fn(&FieldDef, &FieldValues) -> bool + Send + Sync + 'static,
  {
    self
      .overrides
      .entry(field.into())
      .or_default()
      .push(Arc::new(predicate));
  }

  /// Whether `field` should be rendered given the current values.
  pub fn is_visible(&self, field: &FieldDef, values: &FieldValues) -> bool {
    if field.hidden {
      return false;
    }

    if let Some(tab) = &field.ui_tab
      && self.active_tab.as_ref() != Some(tab)
    {
      return false;
    }

    if let Some(parent) = &field.depends_on
      && !values.get(parent).is_some_and(is_truthy)
    {
      return false;
    }

    if let Some(condition) = &field.visible_when
      && !condition.matches(values)
    {
      return false;
    }

    self
      .overrides
      .get(&field.name)
      .is_none_or(|preds| preds.iter().all(|p| p(field, values)))
  }

  /// Visible fields in schema order.
  pub fn visible_fields<'r>(
    &self,
    registry: &'r FieldRegistry,
    values: &FieldValues,
  ) -> Vec<&'r FieldDef> {
    registry
      .fields()
      .iter()
      .filter(|field| self.is_visible(field, values))
      .collect()
  }
}
