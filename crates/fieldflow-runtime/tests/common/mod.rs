#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fieldflow_config::{FieldDef, FieldValues, FormDef};
use fieldflow_loader::{DataLoader, LoadError, LoadRequest, LoadResult};
use fieldflow_runtime::{FetchSession, SessionEvent};
use fieldflow_schema::FieldRegistry;
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// What the scripted loader answers for one request, and after how long.
pub struct Reply {
  pub delay: Duration,
  pub result: LoadResult,
}

pub fn ok(delay_ms: u64, items: Value) -> Reply {
  Reply {
    delay: Duration::from_millis(delay_ms),
    result: Ok(items.as_array().cloned().unwrap_or_default()),
  }
}

pub fn fail(delay_ms: u64, error: LoadError) -> Reply {
  Reply {
    delay: Duration::from_millis(delay_ms),
    result: Err(error),
  }
}

type Script = Box<dyn Fn(&LoadRequest) -> Reply + Send + Sync>;

/// Loader that records every call and answers from a script.
pub struct ScriptedLoader {
  calls: Mutex<Vec<LoadRequest>>,
  script: Script,
}

impl ScriptedLoader {
  pub fn new(script: impl Fn(&LoadRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
    Arc::new(Self {
      calls: Mutex::new(Vec::new()),
      script: Box::new(script),
    })
  }

  pub fn calls(&self) -> Vec<LoadRequest> {
    self.calls.lock().unwrap().clone()
  }

  pub fn calls_for(&self, source_key: &str) -> Vec<LoadRequest> {
    self
      .calls()
      .into_iter()
      .filter(|c| c.source_key == source_key)
      .collect()
  }
}

#[async_trait]
impl DataLoader for ScriptedLoader {
  async fn load_data(&self, request: &LoadRequest) -> LoadResult {
    self.calls.lock().unwrap().push(request.clone());
    let reply = (self.script)(request);
    tokio::time::sleep(reply.delay).await;
    reply.result
  }
}

/// Guilds load at open, channels depend on the server, threads on the
/// channel. `message` is a plain field.
pub fn chat_form() -> FormDef {
  FormDef::new(
    "discord_action_send_message",
    vec![
      FieldDef::new("server").dynamic_source("discord_guilds"),
      FieldDef::new("channel")
        .depends_on("server")
        .dynamic_source("discord_channels"),
      FieldDef::new("thread")
        .depends_on("channel")
        .dynamic_source("discord_threads"),
      FieldDef::new("message"),
    ],
  )
}

pub fn chat_registry() -> FieldRegistry {
  FieldRegistry::new(chat_form()).unwrap()
}

/// Channels are named after the server they were loaded for.
pub fn catalog(channel_delay_ms: u64) -> impl Fn(&LoadRequest) -> Reply + Send + Sync + 'static {
  move |request: &LoadRequest| match request.source_key.as_str() {
    "discord_guilds" => ok(
      10,
      json!([{ "id": "S1", "name": "One" }, { "id": "S2", "name": "Two" }]),
    ),
    "discord_channels" => {
      let server = request
        .params
        .get("server")
        .and_then(Value::as_str)
        .unwrap_or_default();
      ok(
        channel_delay_ms,
        json!([{ "id": format!("{}-general", server), "name": "general", "type": 0 }]),
      )
    }
    "discord_threads" => ok(20, json!([{ "id": "T1", "name": "standup" }])),
    other => fail(10, LoadError::Other(format!("unknown source {}", other))),
  }
}

pub fn values(v: Value) -> FieldValues {
  v.as_object().cloned().unwrap_or_default()
}

pub fn option_values(session: &FetchSession, key: &str) -> Vec<Value> {
  session
    .options(key)
    .unwrap_or_default()
    .into_iter()
    .map(|o| o.value)
    .collect()
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}

pub fn loading_transitions(events: &[SessionEvent]) -> Vec<bool> {
  events
    .iter()
    .filter_map(|e| match e {
      SessionEvent::LoadingChanged { loading } => Some(*loading),
      _ => None,
    })
    .collect()
}
