//! Fetch orchestration for dependent fields.
//!
//! When a field changes, each of its direct dependents with a dynamic source
//! gets its options (re)loaded:
//!
//! 1. An empty trigger value invalidates the dependent: its generation is
//!    cancelled and its options are removed. Nothing is fetched.
//! 2. A new trigger value starts a new generation, drops stale options and
//!    spawns a fetch. The previous generation's fetch is cancelled.
//! 3. The same trigger value is a no-op while a fetch is in flight or
//!    options are present.
//!
//! Identical requests share one loader call through the [`Deduplicator`].
//! A settled fetch only writes options or an error if its generation is still
//! current; otherwise the result is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use fieldflow_config::{EngineConfig, FieldDef, is_empty};
use fieldflow_loader::{DataLoader, LoadRequest, LoadResult, MapperRegistry};
use fieldflow_schema::FieldRegistry;
use fieldflow_state::FormState;
use futures::FutureExt;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::dedup::{Deduplicator, SharedFetch};
use crate::error::SessionError;
use crate::events::{NoopNotifier, SessionEvent, SessionNotifier};
use crate::field_errors::{FieldError, FieldErrors};
use crate::generation::{Begin, GenerationToken, Generations, PairKey};
use crate::loading::LoadingAggregator;
use crate::options::OptionsStore;
use crate::params::resolve_params;
use crate::request::RequestKey;

/// A fetch that has been started and not yet settled.
#[derive(Debug, Clone)]
struct InFlight {
  key: RequestKey,
  token: GenerationToken,
  /// Parent field the fetch was triggered by; `None` for root fields.
  trigger: Option<String>,
  dependency: Value,
  attempt: u32,
  started_at: Instant,
}

/// Starts, deduplicates, cancels and settles option fetches for the
/// dependents of changed fields.
#[derive(Clone)]
pub struct FetchOrchestrator {
  registry: Arc<FieldRegistry>,
  state: Arc<Mutex<FormState>>,
  loader: Arc<dyn DataLoader>,
  mappers: Arc<MapperRegistry>,
  notifier: Arc<dyn SessionNotifier>,
  config: Arc<EngineConfig>,
  integration_id: Arc<str>,
  dedup: Deduplicator<RequestKey, LoadResult>,
  generations: Generations,
  options: OptionsStore,
  errors: FieldErrors,
  loading: LoadingAggregator,
  in_flight: Arc<Mutex<HashMap<PairKey, InFlight>>>,
}

impl FetchOrchestrator {
  pub fn new(
    registry: Arc<FieldRegistry>,
    state: Arc<Mutex<FormState>>,
    loader: Arc<dyn DataLoader>,
    config: EngineConfig,
  ) -> Self {
    let loading = LoadingAggregator::new(config.min_visible(), config.emergency_ceiling());
    Self {
      registry,
      state,
      loader,
      mappers: Arc::new(MapperRegistry::with_builtins()),
      notifier: Arc::new(NoopNotifier),
      config: Arc::new(config),
      integration_id: Arc::from(""),
      dedup: Deduplicator::new(),
      generations: Generations::default(),
      options: OptionsStore::new(),
      errors: FieldErrors::new(),
      loading,
      in_flight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn with_mappers(mut self, mappers: MapperRegistry) -> Self {
    self.mappers = Arc::new(mappers);
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn SessionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Integration the loader requests are made for.
  pub fn with_integration_id(mut self, integration_id: impl Into<String>) -> Self {
    self.integration_id = Arc::from(integration_id.into());
    self
  }

  pub fn options(&self) -> &OptionsStore {
    &self.options
  }

  pub fn errors(&self) -> &FieldErrors {
    &self.errors
  }

  pub fn loading(&self) -> &LoadingAggregator {
    &self.loading
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Number of fetches started and not yet settled.
  pub fn in_flight(&self) -> usize {
    self.lock_in_flight().len()
  }

  /// React to `field` taking `value`: refresh, keep or invalidate the
  /// options of each direct dependent.
  #[instrument(skip(self, value))]
  pub fn on_field_changed(&self, field: &str, value: &Value) {
    for dependent in self.registry.dependents_of(field) {
      if is_empty(value) {
        self.invalidate(dependent);
        continue;
      }
      let Some(source) = dependent.dynamic_source.as_deref() else {
        continue;
      };
      self.request(dependent, source, Some((field, value)));
    }
  }

  /// Load options for dynamic fields that depend on nothing.
  pub fn load_independent(&self) {
    for field in self.registry.fields() {
      if field.depends_on.is_some() {
        continue;
      }
      if let Some(source) = field.dynamic_source.as_deref() {
        self.request(field, source, None);
      }
    }
  }

  /// Drop a field's error, e.g. because the user picked a value.
  pub fn clear_error(&self, field: &str) {
    self.errors.clear(field);
  }

  /// Fetch a field's options again, bypassing deduplication and the
  /// unchanged-dependency check. Current options stay until the new result
  /// arrives.
  pub fn retry_field(&self, name: &str) -> Result<(), SessionError> {
    let field = self
      .registry
      .get(name)
      .ok_or_else(|| SessionError::UnknownField {
        field: name.to_string(),
      })?;
    let nothing = || SessionError::NothingToRetry {
      field: name.to_string(),
    };

    let source = field.dynamic_source.as_deref().ok_or_else(nothing)?;

    if let Some(remaining) = self.errors.get(name).and_then(|e| e.cooldown_remaining()) {
      return Err(SessionError::RetryCoolingDown {
        field: name.to_string(),
        remaining_ms: remaining.as_millis() as u64,
      });
    }

    let trigger = match &field.depends_on {
      Some(parent) => {
        let value = self
          .lock_state()
          .get(parent)
          .filter(|v| !is_empty(v))
          .cloned()
          .ok_or_else(nothing)?;
        Some((parent.as_str(), value))
      }
      None => None,
    };
    let dependency = trigger.as_ref().map(|(_, v)| v.clone()).unwrap_or(Value::Null);

    self.errors.clear(name);
    self
      .dedup
      .evict(&RequestKey::new(name, source, &dependency));
    let token = self
      .generations
      .force(&PairKey::new(name, source), &dependency);

    info!(field = name, source_key = source, "retrying fetch");
    self.start(field, source, trigger.as_ref().map(|(p, v)| (*p, v)), token, 0);
    Ok(())
  }

  /// Restart fetches that have been in flight for longer than the retry
  /// threshold, up to the configured number of attempts each. Returns how
  /// many were restarted.
  pub fn retry_stalled(&self) -> usize {
    let retry_after = self.config.retry_after();
    let max_attempts = self.config.max_retry_attempts;

    let stalled: Vec<(PairKey, InFlight)> = self
      .lock_in_flight()
      .iter()
      .filter(|(_, f)| f.attempt < max_attempts && f.started_at.elapsed() >= retry_after)
      .map(|(pair, f)| (pair.clone(), f.clone()))
      .collect();

    let mut retried = 0;
    for (pair, stale) in stalled {
      let Some(field) = self.registry.get(&pair.field) else {
        continue;
      };
      self.dedup.evict(&stale.key);
      let token = self.generations.force(&pair, &stale.dependency);

      warn!(
        field = %pair.field,
        source_key = %pair.source,
        attempt = stale.attempt + 1,
        "fetch stalled, retrying"
      );
      let trigger = stale.trigger.as_deref().map(|p| (p, &stale.dependency));
      self.start(field, &pair.source, trigger, token, stale.attempt + 1);
      retried += 1;
    }
    retried
  }

  /// Cancel all fetches and forget options and errors.
  pub fn reset(&self) {
    self.generations.reset();
    self.dedup.clear();
    self.lock_in_flight().clear();
    self.options.clear();
    self.errors.clear_all();
  }

  /// Cancel all fetches for good and hide the loading indicator.
  pub fn shutdown(&self) {
    self.generations.shutdown();
    self.dedup.clear();
    self.lock_in_flight().clear();
    self.loading.clear();
  }

  fn request(&self, field: &FieldDef, source: &str, trigger: Option<(&str, &Value)>) {
    let dependency = trigger.map(|(_, v)| v.clone()).unwrap_or(Value::Null);
    let pair = PairKey::new(&field.name, source);

    let token = match self.generations.begin(&pair, &dependency) {
      Begin::Fresh(token) => {
        self.options.remove(&field.name, source);
        token
      }
      Begin::Reused(token) => {
        if self.lock_in_flight().contains_key(&pair) || self.options.contains(&field.name) {
          debug!(field = %field.name, "dependency unchanged, keeping options");
          return;
        }
        token
      }
    };

    self.errors.clear(&field.name);
    self.start(field, source, trigger, token, 0);
  }

  fn invalidate(&self, field: &FieldDef) {
    if let Some(source) = field.dynamic_source.as_deref() {
      let pair = PairKey::new(&field.name, source);
      let cancelled = self.generations.invalidate(&pair);
      self.lock_in_flight().remove(&pair);
      self.options.remove(&field.name, source);
      if cancelled {
        debug!(field = %field.name, "dependency cleared, options invalidated");
      }
    }
    self.errors.clear(&field.name);
  }

  fn start(
    &self,
    field: &FieldDef,
    source: &str,
    trigger: Option<(&str, &Value)>,
    token: GenerationToken,
    attempt: u32,
  ) {
    let dependency = trigger.map(|(_, v)| v.clone()).unwrap_or(Value::Null);
    let key = RequestKey::new(&field.name, source, &dependency);
    let task_id = Uuid::new_v4().to_string();

    let params = {
      let state = self.lock_state();
      resolve_params(field, trigger, state.values())
    };

    let fetch: SharedFetch<LoadResult> = match params {
      Ok(params) => {
        let request = LoadRequest {
          source_key: source.to_string(),
          integration_id: self.integration_id.to_string(),
          params,
        };
        let loader = self.loader.clone();
        self
          .dedup
          .acquire(key.clone(), move || async move { loader.load_data(&request).await })
      }
      Err(error) => futures::future::ready(Err(error)).boxed().shared(),
    };

    self.loading.set_task(&task_id, true);
    self.lock_in_flight().insert(
      token.pair().clone(),
      InFlight {
        key,
        token: token.clone(),
        trigger: trigger.map(|(p, _)| p.to_string()),
        dependency: dependency.clone(),
        attempt,
        started_at: Instant::now(),
      },
    );

    info!(
      field = %field.name,
      source_key = source,
      generation = token.generation(),
      attempt,
      "fetch started"
    );
    self.notifier.notify(SessionEvent::FetchStarted {
      field: field.name.clone(),
      source_key: source.to_string(),
      dependency,
      generation: token.generation(),
    });

    let this = self.clone();
    let field = field.name.clone();
    let source = source.to_string();
    tokio::spawn(async move {
      let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = fetch => Some(result),
      };
      this.settle(&field, &source, &token, outcome);
      this.loading.set_task(&task_id, false);
    });
  }

  /// Apply a settled fetch if its generation is still current.
  fn settle(
    &self,
    field: &str,
    source: &str,
    token: &GenerationToken,
    outcome: Option<LoadResult>,
  ) {
    {
      let mut in_flight = self.lock_in_flight();
      if in_flight
        .get(token.pair())
        .is_some_and(|f| f.token.generation() == token.generation())
      {
        in_flight.remove(token.pair());
      }
    }

    let discarded = SessionEvent::FetchDiscarded {
      field: field.to_string(),
      generation: token.generation(),
    };

    let Some(result) = outcome else {
      debug!(field, generation = token.generation(), "fetch cancelled");
      self.notifier.notify(discarded);
      return;
    };

    let applied = self.generations.if_current(token, || match &result {
      Ok(items) => {
        let options = self.mappers.map(source, items);
        let count = options.len();
        self.options.set(field, source, options);
        self.errors.clear(field);
        SessionEvent::OptionsUpdated {
          field: field.to_string(),
          source_key: source.to_string(),
          count,
        }
      }
      Err(error) => {
        let field_error = FieldError::from_load_error(error, self.config.rate_limit_cooldown());
        let event = SessionEvent::FetchFailed {
          field: field.to_string(),
          kind: field_error.kind,
          message: field_error.message.clone(),
        };
        self.errors.set(field, field_error);
        event
      }
    });

    match applied {
      Some(event) => {
        match (&event, &result) {
          (SessionEvent::OptionsUpdated { count, .. }, _) => {
            info!(field, source_key = source, count, "options updated");
          }
          (_, Err(error)) => {
            warn!(field, source_key = source, error = %error, "fetch failed");
          }
          _ => {}
        }
        self.notifier.notify(event);
      }
      None => {
        debug!(field, generation = token.generation(), "stale result discarded");
        self.notifier.notify(discarded);
      }
    }
  }

  fn lock_state(&self) -> MutexGuard<'_, FormState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<PairKey, InFlight>> {
    self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
  }
}
