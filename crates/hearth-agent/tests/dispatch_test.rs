//! Dispatch loop against a scripted reasoner and in-memory devices.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use hearth_agent::{DispatchConfig, DispatchLoop};
use hearth_core::llm::{Decision, Reasoner, ToolDefinition};
use hearth_core::message::{Message, MessageRole, ToolInvocation};
use hearth_core::{Error, Result};
use hearth_devices::{DeviceKind, DeviceService, MemoryTransport, ReadingStore};
use hearth_tools::device_registry;
use parking_lot::Mutex;
use serde_json::json;

/// Replays queued decisions and records every history it was shown.
struct ScriptedReasoner {
    script: Mutex<VecDeque<Result<Decision>>>,
    seen: Mutex<Vec<Vec<Message>>>,
    /// Returned once the script runs out.
    fallback: Option<Decision>,
}

impl ScriptedReasoner {
    fn new(script: Vec<Result<Decision>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
            fallback: None,
        }
    }

    fn looping(decision: Decision) -> Self {
        Self {
            fallback: Some(decision),
            ..Self::new(Vec::new())
        }
    }

    fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, history: &[Message], tools: &[ToolDefinition]) -> Result<Decision> {
        assert_eq!(tools.len(), 2);
        self.seen.lock().push(history.to_vec());

        let next = self.script.lock().pop_front();
        match next {
            Some(decision) => decision,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| Error::Internal("script exhausted".to_string())),
        }
    }
}

struct Room {
    transport: Arc<MemoryTransport>,
    store: Arc<ReadingStore>,
    service: Arc<DeviceService>,
}

/// Devices that apply every command they receive.
fn room() -> Room {
    let transport = Arc::new(MemoryTransport::new());
    let store = Arc::new(ReadingStore::new());

    let device_store = store.clone();
    transport.on_publish(move |topic, payload| {
        let kind = if topic.contains("light") {
            DeviceKind::Light
        } else {
            DeviceKind::Door
        };
        if payload != "-1" {
            if let Ok(value) = payload.parse() {
                device_store.set(kind, value);
            }
        }
    });

    let service = Arc::new(DeviceService::new(transport.clone(), store.clone()));
    Room {
        transport,
        store,
        service,
    }
}

fn dispatcher(room: &Room, reasoner: Arc<ScriptedReasoner>) -> DispatchLoop {
    DispatchLoop::new(reasoner, Arc::new(device_registry(room.service.clone())))
}

fn control(device: &str, action: &str) -> ToolInvocation {
    ToolInvocation::new("device_control", json!({"device": device, "action": action}))
}

#[tokio::test(start_paused = true)]
async fn test_direct_answer() {
    let room = room();
    let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(Decision::answer("Hello!"))]));
    let dispatch = dispatcher(&room, reasoner.clone());

    let outcome = dispatch.run("hi").await.unwrap();

    assert_eq!(outcome.answer, "Hello!");
    assert_eq!(outcome.turns, 1);
    assert!(room.transport.published().is_empty());

    let seen = reasoner.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0][0].role, MessageRole::System);
    assert_eq!(seen[0][1], Message::user("hi"));
}

#[tokio::test(start_paused = true)]
async fn test_two_device_request() {
    let room = room();
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(Decision::invoke(vec![
            control("light", "on"),
            control("door", "close"),
        ])),
        Ok(Decision::answer("The light is on and the door is closed.")),
    ]));
    let dispatch = dispatcher(&room, reasoner.clone());

    let outcome = dispatch
        .run("turn on the light and close the door in the room")
        .await
        .unwrap();

    assert_eq!(outcome.answer, "The light is on and the door is closed.");
    assert_eq!(outcome.turns, 2);
    assert_eq!(room.store.get(DeviceKind::Light), 1);
    assert_eq!(room.store.get(DeviceKind::Door), 2);

    // Calls run in the order the reasoner listed them.
    let published: Vec<String> = room
        .transport
        .published()
        .into_iter()
        .map(|m| m.payload)
        .collect();
    assert_eq!(published, vec!["1", "2"]);

    let second_turn = &reasoner.seen()[1];
    let tool_messages: Vec<&Message> = second_turn
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 2);
    assert_eq!(tool_messages[0].content, "light is on");
    assert_eq!(tool_messages[1].content, "door is closed");
    assert_eq!(tool_messages[1].tool_name.as_deref(), Some("device_control"));
}

#[tokio::test(start_paused = true)]
async fn test_invoke_without_calls_is_final() {
    let room = room();
    let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(Decision::Invoke {
        content: "Nothing to do.".to_string(),
        calls: Vec::new(),
    })]));
    let dispatch = dispatcher(&room, reasoner.clone());

    let outcome = dispatch.run("thanks").await.unwrap();

    assert_eq!(outcome.answer, "Nothing to do.");
    assert_eq!(outcome.turns, 1);
    assert_eq!(outcome.history.last(), Some(&Message::assistant("Nothing to do.")));
    assert_eq!(reasoner.seen().len(), 1);
    assert!(room.transport.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tool_errors_reach_reasoner() {
    let room = room();
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(Decision::invoke(vec![
            control("light", "open"),
            ToolInvocation::new("device_state", json!({"device": "window"})),
            ToolInvocation::new("fan_speed", json!({})),
            ToolInvocation::new("device_state", json!({})),
        ])),
        Ok(Decision::answer("I can only switch the light on or off.")),
    ]));
    let dispatch = dispatcher(&room, reasoner.clone());

    let outcome = dispatch.run("open the light").await.unwrap();
    assert_eq!(outcome.answer, "I can only switch the light on or off.");

    let results: Vec<String> = reasoner.seen()[1]
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(
        results,
        vec![
            "Invalid action 'open' for device 'light'".to_string(),
            "Invalid device".to_string(),
            "Tool not found: fan_speed".to_string(),
            "Invalid arguments: Missing required parameter: device".to_string(),
        ]
    );
    assert!(room.transport.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_broker_is_reported() {
    let room = room();
    room.transport.set_connected(false);
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(Decision::invoke(vec![control("door", "open")])),
        Ok(Decision::answer("I cannot reach the devices right now.")),
    ]));
    let dispatch = dispatcher(&room, reasoner.clone());

    let outcome = dispatch.run("open the door").await.unwrap();

    assert_eq!(outcome.answer, "I cannot reach the devices right now.");
    let last = reasoner.seen()[1].last().cloned().unwrap();
    assert_eq!(last.content, "Not connected to the server");
}

#[tokio::test(start_paused = true)]
async fn test_turn_limit() {
    let room = room();
    let reasoner = Arc::new(ScriptedReasoner::looping(Decision::invoke(vec![
        ToolInvocation::new("device_state", json!({"device": "light"})),
    ])));
    room.store.set(DeviceKind::Light, 0);
    let dispatch = dispatcher(&room, reasoner.clone()).with_config(DispatchConfig {
        max_turns: 5,
        ..DispatchConfig::default()
    });

    let err = dispatch.run("is the light on?").await.unwrap_err();
    assert!(matches!(err, Error::TurnLimitExceeded(5)));
    assert_eq!(reasoner.seen().len(), 5);

    let sentence = dispatch.answer("is the light on?").await;
    assert!(sentence.contains("within 5 steps"), "{}", sentence);
}

#[tokio::test(start_paused = true)]
async fn test_reasoner_failure_becomes_sentence() {
    let room = room();
    let reasoner = Arc::new(ScriptedReasoner::new(vec![Err(Error::Llm(
        "connection refused".to_string(),
    ))]));
    let dispatch = dispatcher(&room, reasoner);

    let sentence = dispatch.answer("turn off the light").await;
    assert_eq!(
        sentence,
        "Sorry, I could not complete the request: LLM error: connection refused"
    );
}

#[tokio::test(start_paused = true)]
async fn test_each_request_starts_fresh() {
    let room = room();
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        Ok(Decision::invoke(vec![control("light", "off")])),
        Ok(Decision::answer("The light is off.")),
        Ok(Decision::answer("The door is closed.")),
    ]));
    let dispatch = dispatcher(&room, reasoner.clone()).with_config(DispatchConfig {
        omit_system_prompt: true,
        ..DispatchConfig::default()
    });

    assert_eq!(dispatch.answer("turn off the light").await, "The light is off.");
    assert_eq!(dispatch.answer("is the door closed?").await, "The door is closed.");

    let seen = reasoner.seen();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2], vec![Message::user("is the door closed?")]);
}

#[tokio::test(start_paused = true)]
async fn test_custom_system_prompt() {
    let room = room();
    let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(Decision::answer("ok"))]));
    let dispatch = dispatcher(&room, reasoner.clone()).with_config(DispatchConfig {
        system_prompt: Some("Only answer yes or no.".to_string()),
        ..DispatchConfig::default()
    });

    dispatch.run("anything").await.unwrap();
    assert_eq!(reasoner.seen()[0][0], Message::system("Only answer yes or no."));
}
