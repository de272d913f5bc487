//! One open configuration form.
//!
//! A [`FetchSession`] owns the form's values, its visibility rules and the
//! fetch orchestration for its dynamic fields. Hosts drive it with
//! [`FetchSession::set_value`] and read back values, options, errors and the
//! loading signal.
//!
//! # Usage
//!
//! ```ignore
//! let registry = FieldRegistry::new(form)?;
//! let session = FetchSession::builder(registry, Arc::new(loader))
//!   .integration_id("int-1")
//!   .open();
//!
//! session.set_value("server", json!("S1"))?;
//! session.wait_idle().await;
//! let channels = session.options("channel");
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use fieldflow_config::{DynamicOption, EngineConfig, FieldDef, FieldValues, FormDef};
use fieldflow_loader::{DataLoader, MapperRegistry};
use fieldflow_schema::{FieldRegistry, Visibility};
use fieldflow_state::{FormState, WriteOutcome};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::SessionError;
use crate::events::{NoopNotifier, SessionEvent, SessionNotifier};
use crate::field_errors::FieldError;
use crate::orchestrator::FetchOrchestrator;
use crate::preferences::{NoopPreferences, PreferenceSink};

/// Point-in-time view of a session, for rendering or debugging.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
  pub session_id: String,
  pub node_type: String,
  pub values: FieldValues,
  /// Visible field names in schema order.
  pub visible: Vec<String>,
  /// Option lists by field name and by source key.
  pub options: BTreeMap<String, Vec<DynamicOption>>,
  pub errors: BTreeMap<String, FieldError>,
  pub loading: bool,
}

/// Configures a [`FetchSession`] before it is opened.
pub struct SessionBuilder {
  registry: FieldRegistry,
  loader: Arc<dyn DataLoader>,
  config: EngineConfig,
  integration_id: String,
  mappers: MapperRegistry,
  visibility: Visibility,
  notifier: Arc<dyn SessionNotifier>,
  preferences: Arc<dyn PreferenceSink>,
  initial: Option<(String, FieldValues)>,
}

impl SessionBuilder {
  pub fn config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn integration_id(mut self, integration_id: impl Into<String>) -> Self {
    self.integration_id = integration_id.into();
    self
  }

  pub fn mappers(mut self, mappers: MapperRegistry) -> Self {
    self.mappers = mappers;
    self
  }

  pub fn visibility(mut self, visibility: Visibility) -> Self {
    self.visibility = visibility;
    self
  }

  pub fn notifier(mut self, notifier: Arc<dyn SessionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn preferences(mut self, preferences: Arc<dyn PreferenceSink>) -> Self {
    self.preferences = preferences;
    self
  }

  /// Seed the form from a saved node instance.
  pub fn initial_values(mut self, instance_id: impl Into<String>, values: FieldValues) -> Self {
    self.initial = Some((instance_id.into(), values));
    self
  }

  /// Open the session: apply defaults, then start fetches for root dynamic
  /// fields and for every field whose parent already has a value.
  ///
  /// Must be called from within a tokio runtime.
  pub fn open(self) -> FetchSession {
    let registry = Arc::new(self.registry);

    let mut state = FormState::new();
    if let Some((instance_id, values)) = self.initial {
      state.load_initial(&instance_id, values);
    }
    let state = Arc::new(Mutex::new(state));

    let retry_after = self.config.retry_after();
    let orchestrator = FetchOrchestrator::new(registry.clone(), state.clone(), self.loader, self.config)
      .with_mappers(self.mappers)
      .with_notifier(self.notifier.clone())
      .with_integration_id(self.integration_id);

    let watchdog = spawn_watchdog(orchestrator.clone(), self.notifier.clone(), retry_after);

    let session = FetchSession {
      id: Uuid::new_v4().to_string(),
      registry,
      state,
      visibility: RwLock::new(self.visibility),
      orchestrator,
      notifier: self.notifier,
      preferences: self.preferences,
      watchdog: Mutex::new(Some(watchdog)),
      closed: AtomicBool::new(false),
    };

    info!(
      session_id = %session.id,
      node_type = %session.registry.node_type(),
      fields = session.registry.len(),
      "session opened"
    );
    session.prime();
    session
  }
}

/// An open form: values, visibility and the fetches behind its dynamic
/// fields. Closing (or dropping) it cancels all outstanding work.
pub struct FetchSession {
  id: String,
  registry: Arc<FieldRegistry>,
  state: Arc<Mutex<FormState>>,
  visibility: RwLock<Visibility>,
  orchestrator: FetchOrchestrator,
  notifier: Arc<dyn SessionNotifier>,
  preferences: Arc<dyn PreferenceSink>,
  watchdog: Mutex<Option<JoinHandle<()>>>,
  closed: AtomicBool,
}

impl FetchSession {
  pub fn builder(registry: FieldRegistry, loader: Arc<dyn DataLoader>) -> SessionBuilder {
    SessionBuilder {
      registry,
      loader,
      config: EngineConfig::default(),
      integration_id: String::new(),
      mappers: MapperRegistry::with_builtins(),
      visibility: Visibility::new(),
      notifier: Arc::new(NoopNotifier),
      preferences: Arc::new(NoopPreferences),
      initial: None,
    }
  }

  /// Validate `form` and start building a session for it.
  pub fn from_form(form: FormDef, loader: Arc<dyn DataLoader>) -> Result<SessionBuilder, SessionError> {
    Ok(Self::builder(FieldRegistry::new(form)?, loader))
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn registry(&self) -> &FieldRegistry {
    &self.registry
  }

  /// Write a field value.
  ///
  /// Every write is reported to the preference sink. A changed value also
  /// clears every downstream value, drops the field's error and refreshes the
  /// options of its dependents; writing the current value does nothing else.
  #[instrument(skip(self, value), fields(session_id = %self.id))]
  pub fn set_value(&self, field: &str, value: Value) -> Result<WriteOutcome, SessionError> {
    self.ensure_open()?;
    if !self.registry.contains(field) {
      return Err(SessionError::UnknownField {
        field: field.to_string(),
      });
    }

    let outcome = self.lock_state().set(&self.registry, field, value.clone());
    self.preferences.update_field(field, &value);
    if !outcome.changed {
      debug!(field, "value unchanged");
      return Ok(outcome);
    }

    self.orchestrator.clear_error(field);

    if !outcome.cleared.is_empty() {
      info!(field, cleared = ?outcome.cleared, "cleared dependent values");
      self.notifier.notify(SessionEvent::FieldsCleared {
        fields: outcome.cleared.clone(),
      });
    }

    self.orchestrator.on_field_changed(field, &value);
    for cleared in &outcome.cleared {
      self.orchestrator.on_field_changed(cleared, &Value::Null);
    }

    Ok(outcome)
  }

  pub fn clear_value(&self, field: &str) -> Result<WriteOutcome, SessionError> {
    self.set_value(field, Value::Null)
  }

  /// Re-seed the form from a node instance.
  ///
  /// The same `instance_id` is ignored. A new one cancels every fetch,
  /// drops options and errors, and re-runs defaults and initial fetches.
  /// Returns whether the form was re-seeded.
  #[instrument(skip(self, values), fields(session_id = %self.id))]
  pub fn load_initial(&self, instance_id: &str, values: FieldValues) -> Result<bool, SessionError> {
    self.ensure_open()?;
    let replaced = self.lock_state().load_initial(instance_id, values);
    if replaced {
      info!("form re-seeded");
      self.orchestrator.reset();
      self.prime();
    }
    Ok(replaced)
  }

  /// Fetch a field's options again. Refused while a rate-limit cooldown runs.
  #[instrument(skip(self), fields(session_id = %self.id))]
  pub fn retry_field(&self, field: &str) -> Result<(), SessionError> {
    self.ensure_open()?;
    self.orchestrator.retry_field(field)
  }

  pub fn value(&self, field: &str) -> Option<Value> {
    self.lock_state().get(field).cloned()
  }

  pub fn values(&self) -> FieldValues {
    self.lock_state().values().clone()
  }

  pub fn options(&self, field: &str) -> Option<Vec<DynamicOption>> {
    self.orchestrator.options().get(field)
  }

  pub fn error(&self, field: &str) -> Option<FieldError> {
    self.orchestrator.errors().get(field)
  }

  pub fn is_loading(&self) -> bool {
    self.orchestrator.loading().is_loading()
  }

  /// Receiver for the form-wide loading signal.
  pub fn loading_signal(&self) -> watch::Receiver<bool> {
    self.orchestrator.loading().subscribe()
  }

  /// Wait until the loading signal is off.
  pub async fn wait_idle(&self) {
    self.orchestrator.loading().wait_idle().await;
  }

  pub fn is_visible(&self, field: &str) -> Result<bool, SessionError> {
    let def = self
      .registry
      .get(field)
      .ok_or_else(|| SessionError::UnknownField {
        field: field.to_string(),
      })?;
    let state = self.lock_state();
    Ok(self.read_visibility().is_visible(def, state.values()))
  }

  /// Visible field names in schema order.
  pub fn visible_fields(&self) -> Vec<String> {
    let state = self.lock_state();
    self
      .read_visibility()
      .visible_fields(&self.registry, state.values())
      .into_iter()
      .map(|f| f.name.clone())
      .collect()
  }

  pub fn set_active_tab(&self, tab: Option<String>) {
    self.write_visibility().set_active_tab(tab);
  }

  /// Add a host predicate that can further hide `field`.
  pub fn add_visibility_override<F>(&self, field: impl Into<String>, predicate: F)
  where
    F: Fn(&FieldDef, &FieldValues) -> bool + Send + Sync + 'static,
  {
    self.write_visibility().add_override(field, predicate);
  }

  pub fn snapshot(&self) -> SessionSnapshot {
    SessionSnapshot {
      session_id: self.id.clone(),
      node_type: self.registry.node_type().to_string(),
      values: self.values(),
      visible: self.visible_fields(),
      options: self.orchestrator.options().snapshot(),
      errors: self.orchestrator.errors().snapshot(),
      loading: self.is_loading(),
    }
  }

  /// Cancel every fetch, stop the stall watchdog and hide the loading signal.
  /// Later writes fail with [`SessionError::Closed`].
  pub fn close(&self) {
    if self.closed.swap(true, Ordering::SeqCst) {
      return;
    }
    if let Some(watchdog) = self
      .watchdog
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .take()
    {
      watchdog.abort();
    }
    self.orchestrator.shutdown();
    info!(session_id = %self.id, "session closed");
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  fn prime(&self) {
    let (applied, values) = {
      let mut state = self.lock_state();
      let applied = state.apply_defaults(&self.registry);
      (applied, state.values().clone())
    };
    if !applied.is_empty() {
      debug!(fields = ?applied, "defaults applied");
    }

    self.orchestrator.load_independent();
    for field in self.registry.fields() {
      if let Some(value) = values.get(&field.name) {
        self.orchestrator.on_field_changed(&field.name, value);
      }
    }
  }

  fn ensure_open(&self) -> Result<(), SessionError> {
    if self.is_closed() {
      Err(SessionError::Closed)
    } else {
      Ok(())
    }
  }

  fn lock_state(&self) -> MutexGuard<'_, FormState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn read_visibility(&self) -> std::sync::RwLockReadGuard<'_, Visibility> {
    self.visibility.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write_visibility(&self) -> std::sync::RwLockWriteGuard<'_, Visibility> {
    self.visibility.write().unwrap_or_else(|e| e.into_inner())
  }
}

impl Drop for FetchSession {
  fn drop(&mut self) {
    self.close();
  }
}

/// Forwards loading transitions as events and, while loading stays on,
/// restarts stalled fetches every `retry_after`.
fn spawn_watchdog(
  orchestrator: FetchOrchestrator,
  notifier: Arc<dyn SessionNotifier>,
  retry_after: Duration,
) -> JoinHandle<()> {
  let mut signal = orchestrator.loading().subscribe();
  tokio::spawn(async move {
    loop {
      if !wait_for(&mut signal, true).await {
        return;
      }
      notifier.notify(SessionEvent::LoadingChanged { loading: true });

      loop {
        tokio::select! {
          idle = wait_for(&mut signal, false) => {
            if !idle {
              return;
            }
            notifier.notify(SessionEvent::LoadingChanged { loading: false });
            break;
          }
          _ = tokio::time::sleep(retry_after) => {
            let retried = orchestrator.retry_stalled();
            if retried > 0 {
              info!(retried, "restarted stalled fetches");
            }
          }
        }
      }
    }
  })
}

/// Wait for the signal to take `value`. False once the sender is gone.
async fn wait_for(signal: &mut watch::Receiver<bool>, value: bool) -> bool {
  signal.wait_for(|loading| *loading == value).await.is_ok()
}
