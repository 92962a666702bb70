//
// execution_queue_test.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//

//! Unit tests for ExecutionQueue functionality

use ijkernel::execution_queue::ExecutionQueue;
use ijkernel::execution_session::task::{Task, TaskOutcome};
use ijshared::engine_message::{EngineAction, EngineRequest, EngineResponse};
use tokio::sync::oneshot;

/// Helper function to create a test task
fn create_test_task(code: &str) -> (Task, oneshot::Receiver<TaskOutcome>) {
    Task::new(EngineRequest::new(EngineAction::Run, code), None)
}

#[test]
fn test_execution_queue_basics() {
    let mut queue = ExecutionQueue::new();

    // Empty queue
    assert!(queue.active.is_none());
    assert_eq!(queue.pending.len(), 0);
    assert!(queue.is_idle());

    // First task runs immediately
    let (task1, _rx1) = create_test_task("first()");
    let task1_id = task1.id.clone();
    assert!(queue.process_request(task1));
    assert_eq!(queue.active.as_ref().unwrap().id, task1_id);
    assert_eq!(queue.pending.len(), 0);

    // Second task gets queued
    let (task2, _rx2) = create_test_task("second()");
    let task2_id = task2.id.clone();
    assert!(!queue.process_request(task2));
    assert_eq!(queue.active.as_ref().unwrap().id, task1_id);
    assert_eq!(queue.pending.len(), 1);
    assert_eq!(queue.pending[0].id, task2_id);
    assert!(!queue.is_idle());
}

#[test]
fn test_execution_queue_is_fifo() {
    let mut queue = ExecutionQueue::new();
    let mut receivers = Vec::new();
    for code in ["a", "b", "c", "d"] {
        let (task, rx) = create_test_task(code);
        queue.process_request(task);
        receivers.push(rx);
    }

    let mut order = Vec::new();
    while let Some(task) = queue.take_active() {
        order.push(task.request.code.clone());
        queue.next_request();
    }
    assert_eq!(order, vec!["a", "b", "c", "d"]);
    assert!(queue.is_idle());
}

#[test]
fn test_next_request_waits_for_active() {
    let mut queue = ExecutionQueue::new();
    let (task1, _rx1) = create_test_task("first()");
    let (task2, _rx2) = create_test_task("second()");
    queue.process_request(task1);
    queue.process_request(task2);

    // Still busy with the first task
    assert!(queue.next_request().is_none());
    assert_eq!(queue.pending.len(), 1);

    queue.take_active();
    let next = queue.next_request().expect("pending task");
    assert_eq!(next.request.code, "second()");
    assert!(queue.next_request().is_none());
}

#[test]
fn test_clear_abandons_tasks() {
    let mut queue = ExecutionQueue::new();
    let (task1, mut rx1) = create_test_task("first()");
    let (task2, mut rx2) = create_test_task("second()");
    queue.process_request(task1);
    queue.process_request(task2);

    assert_eq!(queue.clear(), 2);
    assert!(queue.is_idle());

    // Dropped tasks close their outcome channels
    assert!(matches!(
        rx1.try_recv(),
        Err(oneshot::error::TryRecvError::Closed)
    ));
    assert!(matches!(
        rx2.try_recv(),
        Err(oneshot::error::TryRecvError::Closed)
    ));
}

#[test]
fn test_completed_task_delivers_outcome() {
    let (task, mut rx) = create_test_task("1+1");
    task.complete(EngineResponse::names(vec![String::from("x")]));
    let outcome = rx.try_recv().expect("outcome delivered");
    assert_eq!(outcome.unwrap().names, Some(vec![String::from("x")]));

    let (task, mut rx) = create_test_task("boom");
    task.complete(EngineResponse::error(ijshared::engine_message::EngineError::new(
        "Error", "boom",
    )));
    let outcome = rx.try_recv().expect("outcome delivered");
    assert_eq!(outcome.unwrap_err().evalue, "boom");
}
