//! Per-(field, source) fetch generations.
//!
//! Every fetch for a dependent field runs under a [`GenerationToken`]. A new
//! dependency value starts a new generation and cancels the previous one, so
//! a late response can always tell whether it is still wanted. Generation
//! numbers come from one counter for the whole registry and are never reused,
//! including across [`Generations::reset`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Identifies the fetch slot of one dynamic field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
  pub field: String,
  pub source: String,
}

impl PairKey {
  pub fn new(field: impl Into<String>, source: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      source: source.into(),
    }
  }
}

impl fmt::Display for PairKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.field, self.source)
  }
}

/// Stamp handed to one fetch. Its result may only land while the stamp is
/// current; the embedded cancellation fires when it is superseded.
#[derive(Debug, Clone)]
pub struct GenerationToken {
  pair: PairKey,
  generation: u64,
  cancel: CancellationToken,
}

impl GenerationToken {
  pub fn pair(&self) -> &PairKey {
    &self.pair
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Resolves once this generation is superseded or the registry shuts down.
  pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
    self.cancel.cancelled()
  }
}

/// Outcome of [`Generations::begin`].
#[derive(Debug, Clone)]
pub enum Begin {
  /// The dependency changed; earlier generations were cancelled.
  Fresh(GenerationToken),
  /// Same dependency as the current generation.
  Reused(GenerationToken),
}

impl Begin {
  pub fn token(&self) -> &GenerationToken {
    match self {
      Begin::Fresh(token) | Begin::Reused(token) => token,
    }
  }

  pub fn is_fresh(&self) -> bool {
    matches!(self, Begin::Fresh(_))
  }
}

struct Slot {
  generation: u64,
  dependency: Value,
  cancel: CancellationToken,
}

struct Inner {
  slots: HashMap<PairKey, Slot>,
  counter: u64,
}

/// Per `(field, source)` generation counter and cancellation tree.
#[derive(Clone)]
pub struct Generations {
  inner: Arc<Mutex<Inner>>,
  root: CancellationToken,
}

impl Default for Generations {
  fn default() -> Self {
    Self::new(CancellationToken::new())
  }
}

impl Generations {
  /// Generation tokens are children of `root`; cancelling it cancels them all.
  pub fn new(root: CancellationToken) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner {
        slots: HashMap::new(),
        counter: 0,
      })),
      root,
    }
  }

  /// Start a generation for `dependency`, or reuse the current one when the
  /// dependency has not changed.
  pub fn begin(&self, pair: &PairKey, dependency: &Value) -> Begin {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(slot) = inner.slots.get(pair)
      && slot.dependency == *dependency
      && !slot.cancel.is_cancelled()
    {
      return Begin::Reused(GenerationToken {
        pair: pair.clone(),
        generation: slot.generation,
        cancel: slot.cancel.clone(),
      });
    }
    Begin::Fresh(self.install(&mut inner, pair, dependency.clone()))
  }

  /// Start a new generation even if the dependency is unchanged.
  pub fn force(&self, pair: &PairKey, dependency: &Value) -> GenerationToken {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    self.install(&mut inner, pair, dependency.clone())
  }

  /// Cancel the current generation and leave the slot empty.
  pub fn invalidate(&self, pair: &PairKey) -> bool {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    match inner.slots.remove(pair) {
      Some(slot) => {
        slot.cancel.cancel();
        true
      }
      None => false,
    }
  }

  pub fn is_current(&self, token: &GenerationToken) -> bool {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    Self::current_in(&inner, token)
  }

  /// Run `apply` only if `token` is still current. The check and `apply`
  /// happen under the registry lock, so no new generation can start in
  /// between.
  pub fn if_current<R>(&self, token: &GenerationToken, apply: impl FnOnce() -> R) -> Option<R> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    if Self::current_in(&inner, token) {
      Some(apply())
    } else {
      None
    }
  }

  pub fn current_generation(&self, pair: &PairKey) -> Option<u64> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.slots.get(pair).map(|s| s.generation)
  }

  /// Cancel every generation and forget all slots.
  pub fn reset(&self) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    for (_, slot) in inner.slots.drain() {
      slot.cancel.cancel();
    }
  }

  /// Cancel everything, including generations started later.
  pub fn shutdown(&self) {
    self.root.cancel();
    self.reset();
  }

  fn install(&self, inner: &mut Inner, pair: &PairKey, dependency: Value) -> GenerationToken {
    inner.counter += 1;
    let generation = inner.counter;
    let cancel = self.root.child_token();

    let previous = inner.slots.insert(
      pair.clone(),
      Slot {
        generation,
        dependency,
        cancel: cancel.clone(),
      },
    );
    if let Some(previous) = previous {
      previous.cancel.cancel();
    }

    GenerationToken {
      pair: pair.clone(),
      generation,
      cancel,
    }
  }

  fn current_in(inner: &Inner, token: &GenerationToken) -> bool {
    !token.is_cancelled()
      && inner
        .slots
        .get(&token.pair)
        .is_some_and(|s| s.generation == token.generation)
  }
}
