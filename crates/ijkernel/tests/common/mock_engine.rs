//
// mock_engine.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//

//! An in-process execution engine that answers requests from a script, so
//! kernel behaviour can be tested without a JavaScript runtime.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ijkernel::execution_session::engine::{Engine, EngineEvent, EngineLauncher};
use ijshared::engine_message::{
    EngineAction, EngineError, EngineRequest, EngineResponse, Inspection, OutputStream,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One step of the engine's answer to a request.
#[derive(Debug, Clone)]
pub enum Step {
    /// Write a line to stdout or stderr
    Output(OutputStream, String),

    /// Wait before the next step
    Delay(Duration),

    /// Answer the request
    Respond(EngineResponse),

    /// Exit without answering
    Crash,
}

pub type Script = Arc<dyn Fn(&EngineRequest) -> Vec<Step> + Send + Sync>;

fn text(value: &str) -> EngineResponse {
    let mut mime = serde_json::Map::new();
    mime.insert(String::from("text/plain"), json!(value));
    EngineResponse::mime(mime)
}

fn reference_error(code: &str) -> EngineResponse {
    EngineResponse::error(EngineError {
        ename: String::from("ReferenceError"),
        evalue: format!("{} is not defined", code),
        traceback: vec![format!("ReferenceError: {} is not defined", code)],
    })
}

fn run(code: &str) -> Vec<Step> {
    let code = code.trim();
    if let Some(ms) = code.strip_prefix("sleep ") {
        let ms: u64 = ms.trim().parse().unwrap_or(100);
        return vec![
            Step::Delay(Duration::from_millis(ms)),
            Step::Respond(text("undefined")),
        ];
    }
    if let Some(message) = code
        .strip_prefix("console.log('")
        .and_then(|rest| rest.strip_suffix("')"))
    {
        return vec![
            Step::Output(OutputStream::Stdout, format!("{}\n", message)),
            Step::Respond(text("undefined")),
        ];
    }
    if let Some(message) = code
        .strip_prefix("console.error('")
        .and_then(|rest| rest.strip_suffix("')"))
    {
        return vec![
            Step::Output(OutputStream::Stderr, format!("{}\n", message)),
            Step::Respond(text("undefined")),
        ];
    }
    if let Some(message) = code
        .strip_prefix("throw new Error('")
        .and_then(|rest| rest.strip_suffix("')"))
    {
        return vec![Step::Respond(EngineResponse::error(EngineError {
            ename: String::from("Error"),
            evalue: message.to_string(),
            traceback: vec![format!("Error: {}", message), String::from("    at repl:1:7")],
        }))];
    }
    match code {
        "crash" => vec![Step::Crash],
        "1+1" | "1 + 1" => vec![Step::Respond(text("2"))],
        "undefined" => vec![Step::Respond(text("undefined"))],
        "empty" => vec![Step::Respond(EngineResponse::mime(serde_json::Map::new()))],
        "'hello'" => vec![Step::Respond(text("'hello'"))],
        _ if code.starts_with("var ") || code.starts_with("let ") => {
            vec![Step::Respond(text("undefined"))]
        }
        _ => vec![Step::Respond(reference_error(code))],
    }
}

fn list_properties(code: &str) -> Vec<Step> {
    let names: &[&str] = match code {
        "global" => &["Array", "ArrayBuffer", "console", "globalVar", "undefined"],
        "Array" => &["from", "isArray", "length", "name", "of", "prototype"],
        "arr" => &["concat", "length", "pop", "push", "slice"],
        "console" => &["error", "info", "log", "warn"],
        "obj" => &["foo", "foo bar", "foobar"],
        _ => return vec![Step::Respond(reference_error(code))],
    };
    vec![Step::Respond(EngineResponse::names(
        names.iter().map(|name| name.to_string()).collect(),
    ))]
}

fn inspect(code: &str) -> Vec<Step> {
    let inspection = match code {
        "Array" => Inspection {
            string: String::from("[Function: Array]"),
            type_name: String::from("function"),
            constructor_list: Some(vec![String::from("Function"), String::from("Object")]),
            length: Some(1),
        },
        "arr" => Inspection {
            string: String::from("[ 1, 2, 3 ]"),
            type_name: String::from("object"),
            constructor_list: Some(vec![String::from("Array"), String::from("Object")]),
            length: Some(3),
        },
        "arr.push" | "Array.prototype.push" => Inspection {
            string: String::from("[Function: push]"),
            type_name: String::from("function"),
            constructor_list: Some(vec![String::from("Function"), String::from("Object")]),
            length: Some(1),
        },
        "globalVar" => Inspection {
            string: String::from("42"),
            type_name: String::from("number"),
            constructor_list: Some(vec![String::from("Number"), String::from("Object")]),
            length: None,
        },
        _ => return vec![Step::Respond(reference_error(code))],
    };
    vec![Step::Respond(EngineResponse::inspection(inspection))]
}

/// A tiny JavaScript-flavoured script: enough arithmetic, output, errors,
/// property listings and inspections to drive every handler.
pub fn default_script() -> Script {
    Arc::new(|request: &EngineRequest| match request.action {
        EngineAction::Run => run(&request.code),
        EngineAction::ListProperties => list_properties(&request.code),
        EngineAction::Inspect => inspect(&request.code),
    })
}

/// What the tests can observe about the engines a launcher started.
#[derive(Debug, Default)]
pub struct EngineLog {
    /// The process IDs of every engine launched, in order
    pub launched: Vec<u32>,

    /// The process IDs of every engine killed, in order
    pub killed: Vec<u32>,

    /// Every request received, with the process ID of the engine receiving it
    pub requests: Vec<(u32, EngineRequest)>,
}

static NEXT_PID: AtomicU32 = AtomicU32::new(40000);

pub struct ScriptedEngine {
    pid: u32,
    script: Script,
    log: Arc<Mutex<EngineLog>>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    player: Option<JoinHandle<()>>,
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn send(&mut self, request: &EngineRequest) -> Result<(), anyhow::Error> {
        self.log
            .lock()
            .unwrap()
            .requests
            .push((self.pid, request.clone()));
        let steps = (self.script)(request);
        let events_tx = self.events_tx.clone();
        self.player = Some(tokio::spawn(async move {
            for step in steps {
                let event = match step {
                    Step::Delay(duration) => {
                        tokio::time::sleep(duration).await;
                        continue;
                    }
                    Step::Output(stream, text) => EngineEvent::Output(stream, text),
                    Step::Respond(response) => EngineEvent::Response(response),
                    Step::Crash => EngineEvent::Exited,
                };
                let _ = events_tx.send(event);
            }
        }));
        Ok(())
    }

    async fn next_event(&mut self) -> EngineEvent {
        self.events_rx.recv().await.unwrap_or(EngineEvent::Exited)
    }

    async fn kill(&mut self) -> Result<(), anyhow::Error> {
        if let Some(player) = self.player.take() {
            player.abort();
        }
        self.log.lock().unwrap().killed.push(self.pid);
        Ok(())
    }
}

/// Launches scripted engines with fresh fake process IDs.
pub struct ScriptedLauncher {
    script: Script,
    pub log: Arc<Mutex<EngineLog>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::with_script(default_script())
    }

    pub fn with_script(script: Script) -> Self {
        Self {
            script,
            log: Arc::new(Mutex::new(EngineLog::default())),
        }
    }

    pub fn launched(&self) -> Vec<u32> {
        self.log.lock().unwrap().launched.clone()
    }

    pub fn killed(&self) -> Vec<u32> {
        self.log.lock().unwrap().killed.clone()
    }

    /// The code of every request received, in order
    pub fn requests(&self) -> Vec<(u32, EngineRequest)> {
        self.log.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl EngineLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn Engine>, anyhow::Error> {
        let pid = NEXT_PID.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().launched.push(pid);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Box::new(ScriptedEngine {
            pid,
            script: self.script.clone(),
            log: self.log.clone(),
            events_tx,
            events_rx,
            player: None,
        }))
    }
}

/// A launcher that always fails.
pub struct BrokenLauncher;

#[async_trait]
impl EngineLauncher for BrokenLauncher {
    async fn launch(&self) -> Result<Box<dyn Engine>, anyhow::Error> {
        Err(anyhow::anyhow!("no engine available"))
    }
}
