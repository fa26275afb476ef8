//! Unit tests for the server process state machine.

use mcp_stdio_bridge::supervisor::{ProcessEvent, ProcessState};

#[test]
fn launch_then_handshake_reaches_ready() {
    let state = ProcessState::Dead
        .next(ProcessEvent::Launch)
        .next(ProcessEvent::HandshakeCompleted);
    assert_eq!(state, ProcessState::Ready);
    assert!(state.is_ready());
}

#[test]
fn exit_from_starting_or_ready_is_dead() {
    assert_eq!(
        ProcessState::Starting.next(ProcessEvent::Exited),
        ProcessState::Dead
    );
    assert_eq!(
        ProcessState::Ready.next(ProcessEvent::Exited),
        ProcessState::Dead
    );
}

#[test]
fn launch_failure_returns_to_dead() {
    assert_eq!(
        ProcessState::Starting.next(ProcessEvent::LaunchFailed),
        ProcessState::Dead
    );
}

#[test]
fn restart_cycle_goes_through_starting() {
    let dead = ProcessState::Ready.next(ProcessEvent::Exited);
    let restarting = dead.next(ProcessEvent::Launch);
    assert_eq!(restarting, ProcessState::Starting);
    assert!(!restarting.is_ready());
}

#[test]
fn inapplicable_events_leave_state_unchanged() {
    assert_eq!(
        ProcessState::Dead.next(ProcessEvent::HandshakeCompleted),
        ProcessState::Dead
    );
    assert_eq!(
        ProcessState::Ready.next(ProcessEvent::Launch),
        ProcessState::Ready
    );
    assert_eq!(
        ProcessState::Dead.next(ProcessEvent::Exited),
        ProcessState::Dead
    );
    assert_eq!(
        ProcessState::Ready.next(ProcessEvent::LaunchFailed),
        ProcessState::Ready
    );
}
