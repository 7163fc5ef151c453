//! Host execution bridge: single-flight, timeouts and failure reporting.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{spawn_host, workbook_tools, ScriptedProvider, Workbook};
use hostpilot::agent_loop::AgentLoop;
use hostpilot::bridge::{HostBridge, HostSignal};
use hostpilot::error::PilotError;
use hostpilot::types::{input_from_value, ToolCallStatus, ToolInput};

/// Signal that accepts every wake request and counts them; nothing drains.
fn counting_signal() -> (Arc<dyn HostSignal>, Arc<AtomicUsize>) {
    let raises = Arc::new(AtomicUsize::new(0));
    let counter = raises.clone();
    let signal = move || -> Result<(), PilotError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    };
    (Arc::new(signal), raises)
}

async fn wait_for_raises(raises: &AtomicUsize, expected: usize) {
    for _ in 0..200 {
        if raises.load(Ordering::SeqCst) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("bridge never raised the host signal {expected} times");
}

#[tokio::test]
async fn concurrent_invokes_occupy_the_slot_one_at_a_time() {
    let (signal, raises) = counting_signal();
    let bridge = Arc::new(HostBridge::new(workbook_tools(), signal));
    let mut book = Workbook::default();

    let callers: Vec<_> = (0..3)
        .map(|i| {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                let input = input_from_value(json!({ "cell": format!("A{i}"), "value": i }));
                bridge.invoke("set_cell", input, &CancellationToken::new()).await
            })
        })
        .collect();

    for installed in 1..=3 {
        wait_for_raises(&raises, installed).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        // The other callers are parked behind the gate, not in the slot.
        assert_eq!(raises.load(Ordering::SeqCst), installed);
        assert!(bridge.has_pending());
        assert!(bridge.drain(&mut book));
    }
    assert!(!bridge.drain(&mut book));

    let mut messages = Vec::new();
    for caller in callers {
        let result = caller.await.unwrap();
        assert!(result.success, "{}", result.message);
        messages.push(result.message);
    }
    messages.sort();
    assert_eq!(messages, vec!["A0 = 0", "A1 = 1", "A2 = 2"]);
    assert_eq!(book.cells.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn hung_host_times_out_and_frees_the_slot() {
    let (signal, raises) = counting_signal();
    let bridge = HostBridge::new(workbook_tools(), signal).with_timeout(Duration::from_secs(30));

    let started = tokio::time::Instant::now();
    let result = bridge
        .invoke("list_sheets", ToolInput::new(), &CancellationToken::new())
        .await;
    let elapsed = started.elapsed();

    assert!(!result.success);
    assert_eq!(
        result.message,
        "Tool 'list_sheets' timed out after 30.0s waiting for the host"
    );
    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed < Duration::from_secs(31));
    assert!(!bridge.has_pending());

    // The next request is not blocked by the abandoned one.
    let again = bridge
        .invoke("list_sheets", ToolInput::new(), &CancellationToken::new())
        .await;
    assert!(again.message.contains("timed out"));
    assert_eq!(raises.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn queued_caller_shares_the_timeout_budget() {
    let (signal, raises) = counting_signal();
    let bridge = HostBridge::new(workbook_tools(), signal).with_timeout(Duration::from_secs(30));
    let started = tokio::time::Instant::now();

    let shared = &bridge;
    let timed = move |name: &'static str| async move {
        let result = shared.invoke(name, ToolInput::new(), &CancellationToken::new()).await;
        (result, started.elapsed())
    };
    let ((first, first_after), (second, second_after)) =
        tokio::join!(timed("list_sheets"), timed("explode"));

    for (result, after) in [(&first, first_after), (&second, second_after)] {
        assert!(!result.success);
        assert!(result.message.contains("timed out after 30.0s"), "{}", result.message);
        assert!(after >= Duration::from_secs(30), "{after:?}");
        assert!(after < Duration::from_secs(31), "{after:?}");
    }
    assert!(raises.load(Ordering::SeqCst) >= 1);
    assert!(!bridge.has_pending());
}

#[tokio::test(start_paused = true)]
async fn timed_out_tool_is_fed_back_to_the_provider() {
    let (signal, _raises) = counting_signal();
    let bridge = Arc::new(HostBridge::new(workbook_tools(), signal).with_timeout(Duration::from_secs(30)));
    let provider = Arc::new(
        ScriptedProvider::new()
            .tool_call("call_1", "list_sheets", json!({}))
            .text("The host did not respond."),
    );
    let agent = AgentLoop::new(provider.clone(), bridge);

    let outcome = agent.process_turn("list sheets", CancellationToken::new()).await;
    assert!(outcome.is_finalized(), "{outcome:?}");

    let retry_round = provider.request(1);
    let call = &retry_round[1].tool_calls()[0];
    assert_eq!(call.status(), ToolCallStatus::Failed);
    assert!(call.result().unwrap().message.contains("timed out"));
    assert_eq!(agent.messages().len(), 3);
}

#[tokio::test]
async fn cancelled_wait_withdraws_the_request() {
    let (signal, _raises) = counting_signal();
    let bridge = HostBridge::new(workbook_tools(), signal);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let (result, ()) = tokio::join!(
        bridge.invoke("list_sheets", ToolInput::new(), &cancel),
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        }
    );

    assert!(!result.success);
    assert_eq!(result.message, "Tool 'list_sheets' cancelled");
    assert!(!bridge.has_pending());
}

#[tokio::test]
async fn unavailable_host_fails_without_dispatch() {
    let (signal, raises) = counting_signal();
    let bridge = HostBridge::new(workbook_tools(), signal);
    bridge.availability().set_available(false);

    let result = bridge
        .invoke("list_sheets", ToolInput::new(), &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.message.contains("no active document"), "{}", result.message);
    assert_eq!(raises.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn host_side_availability_is_rechecked_on_drain() {
    let closed = Workbook {
        closed: true,
        ..Default::default()
    };
    let (bridge, _host) = spawn_host(workbook_tools(), closed, Duration::from_secs(5));

    let result = bridge
        .invoke("list_sheets", ToolInput::new(), &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.message, "no active document is open in the host");
}

#[tokio::test]
async fn rejected_wake_request_is_a_failed_result() {
    let reject = || -> Result<(), PilotError> { Err(PilotError::Signal("event queue is shutting down".into())) };
    let bridge = HostBridge::new(workbook_tools(), Arc::new(reject));

    let result = bridge
        .invoke("list_sheets", ToolInput::new(), &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert!(result.message.contains("event queue is shutting down"), "{}", result.message);
    assert!(!bridge.has_pending());
}

#[tokio::test]
async fn panicking_tool_reports_its_message() {
    let (bridge, host) = spawn_host(workbook_tools(), Workbook::default(), Duration::from_secs(5));

    let result = bridge
        .invoke("explode", ToolInput::new(), &CancellationToken::new())
        .await;
    assert!(!result.success);
    assert_eq!(result.message, "Tool 'explode' failed: formula engine crashed");

    // The host thread survives the panic.
    let next = bridge
        .invoke("set_cell", input_from_value(json!({ "cell": "C3", "value": "12" })), &CancellationToken::new())
        .await;
    assert!(next.success, "{}", next.message);

    drop(bridge);
    let book = tokio::task::spawn_blocking(move || host.shutdown())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(book.cells.get("C3"), Some(&12));
}
