//! Form-wide loading indicator.
//!
//! Many fetches feed one boolean. The aggregator is a small state machine:
//!
//! ```text
//!            task added                last task removed (held >= min)
//!   Idle ----------------> Loading ---------------------------------> Idle
//!                           |   ^
//!   last task removed       |   | task added (hide timer aborted)
//!   (held < min)            v   |
//!                        PendingHide --- min visible reached --------> Idle
//! ```
//!
//! Once shown, the indicator stays on for at least `min_visible` and never
//! flickers off between overlapping fetches. An emergency ceiling forces it
//! off if an episode runs longer than `ceiling`, whatever the tasks say.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

/// Where the aggregated loading signal is in its show/hide cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingPhase {
  Idle,
  Loading,
  PendingHide,
}

struct State {
  phase: LoadingPhase,
  tasks: HashMap<String, Instant>,
  started_at: Option<Instant>,
  /// Bumped every time the indicator goes back to idle.
  episode: u64,
  hide_timer: Option<JoinHandle<()>>,
  ceiling_timer: Option<JoinHandle<()>>,
}

struct Shared {
  state: Mutex<State>,
  signal: watch::Sender<bool>,
  min_visible: Duration,
  ceiling: Duration,
}

/// Folds per-fetch loading tasks into one debounced boolean signal.
///
/// Once raised, the signal stays on for at least `min_visible`, and it is
/// forced off if tasks are still registered after `ceiling`.
#[derive(Clone)]
pub struct LoadingAggregator {
  shared: Arc<Shared>,
}

impl LoadingAggregator {
  pub fn new(min_visible: Duration, ceiling: Duration) -> Self {
    let (signal, _) = watch::channel(false);
    Self {
      shared: Arc::new(Shared {
        state: Mutex::new(State {
          phase: LoadingPhase::Idle,
          tasks: HashMap::new(),
          started_at: None,
          episode: 0,
          hide_timer: None,
          ceiling_timer: None,
        }),
        signal,
        min_visible,
        ceiling,
      }),
    }
  }

  /// Register (`active = true`) or unregister a loading task.
  ///
  /// Unregistering an unknown task is a no-op. Must be called from within a
  /// tokio runtime, since it may arm timers.
  pub fn set_task(&self, task_id: &str, active: bool) {
    let now = Instant::now();
    let mut state = self.lock();

    if active {
      state.tasks.entry(task_id.to_string()).or_insert(now);
      match state.phase {
        LoadingPhase::Idle => {
          state.phase = LoadingPhase::Loading;
          state.started_at = Some(now);
          let episode = state.episode;
          state.ceiling_timer = Some(self.arm_ceiling(episode));
          self.shared.signal.send_replace(true);
          debug!(task_id, "loading shown");
        }
        LoadingPhase::PendingHide => {
          if let Some(timer) = state.hide_timer.take() {
            timer.abort();
          }
          state.phase = LoadingPhase::Loading;
        }
        LoadingPhase::Loading => {}
      }
      return;
    }

    if state.tasks.remove(task_id).is_none() || !state.tasks.is_empty() {
      return;
    }
    if state.phase != LoadingPhase::Loading {
      return;
    }

    let started_at = state.started_at.unwrap_or(now);
    let deadline = started_at + self.shared.min_visible;
    if now >= deadline {
      self.go_idle(&mut state);
    } else {
      state.phase = LoadingPhase::PendingHide;
      let episode = state.episode;
      state.hide_timer = Some(self.arm_hide(episode, deadline));
    }
  }

  /// Current signal value.
  pub fn is_loading(&self) -> bool {
    *self.shared.signal.borrow()
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.shared.signal.subscribe()
  }

  pub fn phase(&self) -> LoadingPhase {
    self.lock().phase
  }

  pub fn active_tasks(&self) -> usize {
    self.lock().tasks.len()
  }

  /// Drop every task and hide the indicator immediately.
  pub fn clear(&self) {
    let mut state = self.lock();
    if state.phase != LoadingPhase::Idle || !state.tasks.is_empty() {
      self.go_idle(&mut state);
    }
  }

  /// Wait until the indicator is off.
  pub async fn wait_idle(&self) {
    let mut rx = self.subscribe();
    let _ = rx.wait_for(|loading| !*loading).await;
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, State> {
    self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn go_idle(&self, state: &mut State) {
    Self::idle(&self.shared, state);
  }

  fn idle(shared: &Shared, state: &mut State) {
    state.phase = LoadingPhase::Idle;
    state.tasks.clear();
    state.started_at = None;
    state.episode += 1;
    if let Some(timer) = state.hide_timer.take() {
      timer.abort();
    }
    if let Some(timer) = state.ceiling_timer.take() {
      timer.abort();
    }
    shared.signal.send_replace(false);
    debug!("loading hidden");
  }

  fn arm_hide(&self, episode: u64, deadline: Instant) -> JoinHandle<()> {
    let weak: Weak<Shared> = Arc::downgrade(&self.shared);
    tokio::spawn(async move {
      sleep_until(deadline).await;
      let Some(shared) = weak.upgrade() else {
        return;
      };
      let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
      if state.episode == episode
        && state.phase == LoadingPhase::PendingHide
        && state.tasks.is_empty()
      {
        state.hide_timer = None;
        Self::idle(&shared, &mut state);
      }
    })
  }

  fn arm_ceiling(&self, episode: u64) -> JoinHandle<()> {
    let weak: Weak<Shared> = Arc::downgrade(&self.shared);
    let ceiling = self.shared.ceiling;
    tokio::spawn(async move {
      sleep(ceiling).await;
      let Some(shared) = weak.upgrade() else {
        return;
      };
      let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
      if state.episode == episode && state.phase != LoadingPhase::Idle {
        warn!(
          tasks = state.tasks.len(),
          ceiling_ms = ceiling.as_millis() as u64,
          "loading exceeded ceiling, forcing indicator off"
        );
        state.ceiling_timer = None;
        Self::idle(&shared, &mut state);
      }
    })
  }
}

impl Drop for Shared {
  fn drop(&mut self) {
    let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
    if let Some(timer) = state.hide_timer.take() {
      timer.abort();
    }
    if let Some(timer) = state.ceiling_timer.take() {
      timer.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const MIN: Duration = Duration::from_millis(300);
  const CEILING: Duration = Duration::from_millis(30_000);

  fn aggregator() -> LoadingAggregator {
    LoadingAggregator::new(MIN, CEILING)
  }

  #[tokio::test(start_paused = true)]
  async fn test_short_task_held_for_min_visible() {
    let loading = aggregator();
    let shown_at = Instant::now();

    loading.set_task("a", true);
    assert!(loading.is_loading());

    sleep(Duration::from_millis(50)).await;
    loading.set_task("a", false);
    assert!(loading.is_loading());
    assert_eq!(loading.phase(), LoadingPhase::PendingHide);

    loading.wait_idle().await;
    assert!(shown_at.elapsed() >= MIN);
    assert_eq!(loading.phase(), LoadingPhase::Idle);
  }

  #[tokio::test(start_paused = true)]
  async fn test_long_task_hides_immediately() {
    let loading = aggregator();

    loading.set_task("a", true);
    sleep(Duration::from_millis(500)).await;
    loading.set_task("a", false);

    assert!(!loading.is_loading());
  }

  #[tokio::test(start_paused = true)]
  async fn test_overlapping_tasks_single_episode() {
    let loading = aggregator();

    loading.set_task("a", true);
    sleep(Duration::from_millis(100)).await;
    loading.set_task("b", true);
    sleep(Duration::from_millis(50)).await;
    loading.set_task("a", false);
    sleep(Duration::from_millis(50)).await;
    loading.set_task("b", false);

    // Still inside the minimum window.
    assert!(loading.is_loading());

    // Re-activation during the hide window keeps the same episode.
    loading.set_task("c", true);
    assert_eq!(loading.phase(), LoadingPhase::Loading);
    sleep(Duration::from_millis(400)).await;
    assert!(loading.is_loading());
    loading.set_task("c", false);
    assert!(!loading.is_loading());
  }

  #[tokio::test(start_paused = true)]
  async fn test_unknown_task_removal_ignored() {
    let loading = aggregator();
    loading.set_task("ghost", false);
    assert!(!loading.is_loading());

    loading.set_task("a", true);
    loading.set_task("ghost", false);
    assert_eq!(loading.active_tasks(), 1);
    assert!(loading.is_loading());
  }

  #[tokio::test(start_paused = true)]
  async fn test_ceiling_forces_off() {
    let loading = aggregator();

    loading.set_task("stuck", true);
    sleep(CEILING + Duration::from_millis(1)).await;

    assert!(!loading.is_loading());
    assert_eq!(loading.active_tasks(), 0);

    // A late completion of the stuck task changes nothing.
    loading.set_task("stuck", false);
    assert!(!loading.is_loading());
  }

  #[tokio::test(start_paused = true)]
  async fn test_clear() {
    let loading = aggregator();
    loading.set_task("a", true);
    loading.set_task("b", true);

    loading.clear();
    assert!(!loading.is_loading());
    assert_eq!(loading.phase(), LoadingPhase::Idle);
  }
}
