//
// execution_session_test.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//

//! Tests for the execution session: single-flight execution, restarts,
//! crash recovery and startup scripts

use std::sync::Arc;
use std::time::Duration;

use ijkernel::error::KernelError;
use ijkernel::execution_session::engine::EngineLauncher;
use ijkernel::execution_session::startup::discover_scripts;
use ijkernel::execution_session::{ExecutionSession, MAX_RELAUNCHES};
use ijkernel::outbox::Outbound;
use ijshared::engine_message::EngineAction;
use ijshared::jupyter_message::JupyterChannel;
use serde_json::json;

#[path = "common/mod.rs"]
mod common;

use common::mock_engine::{BrokenLauncher, ScriptedLauncher};
use common::{parent_message, test_outbox};

async fn start_session(
    launcher: &Arc<ScriptedLauncher>,
    scripts: Vec<std::path::PathBuf>,
) -> (ExecutionSession, async_channel::Receiver<Outbound>) {
    let (outbox, outbound_rx) = test_outbox("5.3");
    let session = ExecutionSession::start(
        launcher.clone() as Arc<dyn EngineLauncher>,
        scripts,
        outbox,
    )
    .await
    .expect("Failed to start session");
    (session, outbound_rx)
}

fn plain_text(outcome: &ijkernel::execution_session::task::TaskOutcome) -> String {
    outcome.as_ref().expect("successful outcome").mime.as_ref().unwrap()["text/plain"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_requests_run_one_at_a_time_in_order() {
    let launcher = Arc::new(ScriptedLauncher::new());
    let (session, _rx) = start_session(&launcher, vec![]).await;
    let parent = parent_message("execute_request");

    // A slow request first: if the engine were sent the others before it
    // answered, their responses would be attributed to the wrong tasks
    let (slow, fast, last) = tokio::join!(
        session.run("sleep 150", parent.clone()),
        session.run("1+1", parent.clone()),
        session.run("'hello'", parent.clone()),
    );
    assert_eq!(plain_text(&slow.unwrap()), "undefined");
    assert_eq!(plain_text(&fast.unwrap()), "2");
    assert_eq!(plain_text(&last.unwrap()), "'hello'");

    let codes: Vec<String> = launcher
        .requests()
        .into_iter()
        .map(|(_, request)| request.code)
        .collect();
    assert_eq!(codes, vec!["sleep 150", "1+1", "'hello'"]);
}

#[tokio::test]
async fn test_engine_errors_are_outcomes() {
    let launcher = Arc::new(ScriptedLauncher::new());
    let (session, _rx) = start_session(&launcher, vec![]).await;

    let outcome = session
        .run("throw new Error('boom')", parent_message("execute_request"))
        .await
        .expect("task completes");
    let error = outcome.unwrap_err();
    assert_eq!(error.ename, "Error");
    assert_eq!(error.evalue, "boom");
    assert_eq!(error.traceback.len(), 2);
}

#[tokio::test]
async fn test_list_properties_and_inspect() {
    let launcher = Arc::new(ScriptedLauncher::new());
    let (session, _rx) = start_session(&launcher, vec![]).await;
    let parent = parent_message("complete_request");

    let names = session
        .list_properties("console", parent.clone())
        .await
        .unwrap()
        .unwrap()
        .names
        .unwrap();
    assert_eq!(names, vec!["error", "info", "log", "warn"]);

    let inspection = session
        .inspect("Array", parent)
        .await
        .unwrap()
        .unwrap()
        .inspection
        .unwrap();
    assert_eq!(inspection.type_name, "function");

    let actions: Vec<EngineAction> = launcher
        .requests()
        .into_iter()
        .map(|(_, request)| request.action)
        .collect();
    assert_eq!(actions, vec![EngineAction::ListProperties, EngineAction::Inspect]);
}

#[tokio::test]
async fn test_output_is_attributed_to_running_request() {
    let launcher = Arc::new(ScriptedLauncher::new());
    let (session, outbound_rx) = start_session(&launcher, vec![]).await;
    let parent = parent_message("execute_request");

    session
        .run("console.log('hi there')", parent.clone())
        .await
        .unwrap()
        .unwrap();

    match outbound_rx.try_recv().expect("stream message queued") {
        Outbound::Message(channel, message) => {
            assert_eq!(channel, JupyterChannel::IOPub);
            assert_eq!(message.msg_type(), "stream");
            assert_eq!(message.content, json!({"name": "stdout", "text": "hi there\n"}));
            assert_eq!(message.parent_header["msg_id"], json!(parent.header.msg_id));
        }
        Outbound::Shutdown => panic!("Unexpected shutdown"),
    }
}

#[tokio::test]
async fn test_restart_abandons_tasks_and_replaces_engine() {
    let launcher = Arc::new(ScriptedLauncher::new());
    let (session, _rx) = start_session(&launcher, vec![]).await;
    let first_pid = session.pid().await.expect("engine pid");
    assert_eq!(launcher.launched(), vec![first_pid]);

    let parent = parent_message("execute_request");
    let running = tokio::spawn({
        let session = session.clone();
        let parent = parent.clone();
        async move { session.run("sleep 5000", parent).await }
    });
    let pending = tokio::spawn({
        let session = session.clone();
        let parent = parent.clone();
        async move { session.run("1+1", parent).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let new_pid = session.restart().await.expect("restart succeeds");
    assert!(new_pid.is_some());
    assert_ne!(new_pid, Some(first_pid));
    assert_eq!(session.pid().await, new_pid);
    assert_eq!(launcher.killed(), vec![first_pid]);

    assert!(matches!(
        running.await.unwrap(),
        Err(KernelError::TaskAbandoned)
    ));
    assert!(matches!(
        pending.await.unwrap(),
        Err(KernelError::TaskAbandoned)
    ));

    // The new engine works
    let outcome = session.run("1+1", parent).await.unwrap();
    assert_eq!(plain_text(&outcome), "2");
}

#[tokio::test]
async fn test_crash_fails_active_task_and_relaunches() {
    let launcher = Arc::new(ScriptedLauncher::new());
    let (session, _rx) = start_session(&launcher, vec![]).await;
    let parent = parent_message("execute_request");

    let (crashed, after) = tokio::join!(
        session.run("crash", parent.clone()),
        session.run("1+1", parent.clone()),
    );
    let error = crashed.unwrap().unwrap_err();
    assert_eq!(error.ename, "EngineExited");

    // The pending request runs on the new engine
    assert_eq!(plain_text(&after.unwrap()), "2");
    let launched = launcher.launched();
    assert_eq!(launched.len(), 2);
    let requests = launcher.requests();
    assert_eq!(requests.last().unwrap().0, launched[1]);
}

#[tokio::test]
async fn test_engine_that_keeps_crashing_is_given_up() {
    // A startup script that takes down every engine it runs on
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("boom.js"), "crash").unwrap();
    let scripts = discover_scripts(dir.path()).unwrap();

    let launcher = Arc::new(ScriptedLauncher::new());
    let (session, _rx) = start_session(&launcher, scripts).await;
    let parent = parent_message("execute_request");

    let outcome = tokio::time::timeout(Duration::from_secs(5), session.run("1+1", parent.clone()))
        .await
        .expect("Timed out waiting for the request to fail")
        .unwrap();
    assert_eq!(outcome.unwrap_err().ename, "EngineUnavailable");

    assert_eq!(launcher.launched().len(), 1 + MAX_RELAUNCHES as usize);
    assert_eq!(session.pid().await, None);

    // Later requests fail straight away
    let outcome = session.run("1+1", parent).await.unwrap();
    assert_eq!(outcome.unwrap_err().ename, "EngineUnavailable");

    // and a restart starts over
    assert!(session.restart().await.unwrap().is_some());
}

#[tokio::test]
async fn test_startup_scripts_run_on_every_start() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("02-second.js"), "var b = 2").unwrap();
    std::fs::write(dir.path().join("01-first.js"), "var a = 1").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a script").unwrap();
    let scripts = discover_scripts(dir.path()).unwrap();
    assert_eq!(scripts.len(), 2);

    let launcher = Arc::new(ScriptedLauncher::new());
    let (session, _rx) = start_session(&launcher, scripts).await;
    let parent = parent_message("execute_request");
    session.run("1+1", parent.clone()).await.unwrap().unwrap();

    let codes: Vec<String> = launcher
        .requests()
        .into_iter()
        .map(|(_, request)| request.code)
        .collect();
    assert_eq!(codes, vec!["var a = 1", "var b = 2", "1+1"]);

    // And again after a restart, on the new engine
    let new_pid = session.restart().await.unwrap().unwrap();
    session.run("1+1", parent).await.unwrap().unwrap();
    let replayed: Vec<String> = launcher
        .requests()
        .into_iter()
        .filter(|(pid, _)| *pid == new_pid)
        .map(|(_, request)| request.code)
        .collect();
    assert_eq!(replayed, vec!["var a = 1", "var b = 2", "1+1"]);
}

#[test]
fn test_single_startup_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("init.js");
    std::fs::write(&script, "let x = 1").unwrap();
    assert_eq!(discover_scripts(&script).unwrap(), vec![script]);
    assert!(discover_scripts(&dir.path().join("missing.js")).is_err());
}

#[tokio::test]
async fn test_kill_stops_the_engine() {
    let launcher = Arc::new(ScriptedLauncher::new());
    let (session, _rx) = start_session(&launcher, vec![]).await;
    let pid = session.pid().await.unwrap();

    session.kill().await;
    assert_eq!(launcher.killed(), vec![pid]);
    assert_eq!(session.pid().await, None);

    let outcome = session
        .run("1+1", parent_message("execute_request"))
        .await
        .unwrap();
    assert_eq!(outcome.unwrap_err().ename, "EngineUnavailable");
}

#[tokio::test]
async fn test_launch_failure() {
    let (outbox, _rx) = test_outbox("5.3");
    let result = ExecutionSession::start(Arc::new(BrokenLauncher), vec![], outbox).await;
    match result {
        Err(err @ KernelError::EngineLaunchFailed(_)) => {
            assert!(err.to_string().contains("no engine available"));
        }
        Err(other) => panic!("Unexpected error: {}", other),
        Ok(_) => panic!("Expected the launch to fail"),
    }
}
