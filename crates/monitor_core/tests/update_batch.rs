use std::sync::Once;

use monitor_core::{update, BatchEffect, BatchMsg, BatchProgress, BatchState, BatchStatus};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(monitor_logging::initialize_for_tests);
}

fn progress(status: BatchStatus, current: u64, total: u64) -> BatchProgress {
    BatchProgress {
        status,
        total,
        current,
        success: current,
        failed: 0,
        failed_items: Vec::new(),
    }
}

fn fetched(state: BatchState, batch_id: &str, p: BatchProgress) -> (BatchState, Vec<BatchEffect>) {
    update(
        state,
        BatchMsg::ProgressFetched {
            batch_id: batch_id.to_string(),
            progress: p,
        },
    )
}

fn submitted(batch_id: &str, total: u64) -> (BatchState, Vec<BatchEffect>) {
    update(
        BatchState::new(),
        BatchMsg::Submitted {
            batch_id: batch_id.to_string(),
            total,
        },
    )
}

#[test]
fn submission_persists_before_polling() {
    init_logging();
    let (mut state, effects) = submitted("batch-1", 3);

    assert_eq!(
        effects,
        vec![
            BatchEffect::PersistBatchId {
                batch_id: "batch-1".into()
            },
            BatchEffect::StartPolling {
                batch_id: "batch-1".into()
            },
        ]
    );
    let view = state.view();
    assert_eq!(view.batch_id.as_deref(), Some("batch-1"));
    assert_eq!(view.progress, Some(BatchProgress::started(3)));
    assert!(view.polling);
    assert!(state.consume_dirty());
}

#[test]
fn running_snapshot_replaces_without_effects() {
    init_logging();
    let (state, _) = submitted("batch-1", 3);
    let (state, effects) = fetched(state, "batch-1", progress(BatchStatus::Running, 2, 3));

    assert!(effects.is_empty());
    assert_eq!(state.progress(), Some(&progress(BatchStatus::Running, 2, 3)));
    assert!(state.is_polling());
}

#[test]
fn done_stops_polling_and_clears_storage() {
    init_logging();
    let (state, _) = submitted("batch-1", 3);
    let (state, effects) = fetched(state, "batch-1", progress(BatchStatus::Done, 3, 3));

    assert_eq!(effects, vec![BatchEffect::StopPolling, BatchEffect::ClearBatchId]);
    assert!(!state.is_polling());
    assert_eq!(state.batch_id(), None);
    let last = state.progress().unwrap();
    assert_eq!(last.status, BatchStatus::Done);
    assert_eq!(last.current, last.total);
}

#[test]
fn cancelled_is_terminal_and_late_ticks_are_ignored() {
    init_logging();
    let (state, _) = submitted("batch-1", 5);
    let (state, effects) = fetched(state, "batch-1", progress(BatchStatus::Cancelled, 2, 5));
    assert_eq!(effects, vec![BatchEffect::StopPolling, BatchEffect::ClearBatchId]);

    let (state, effects) = fetched(state, "batch-1", progress(BatchStatus::Running, 3, 5));
    assert!(effects.is_empty());
    assert_eq!(state.progress().unwrap().status, BatchStatus::Cancelled);
}

#[test]
fn poll_failure_abandons_batch_but_keeps_last_snapshot() {
    init_logging();
    let (state, _) = submitted("batch-1", 4);
    let (state, _) = fetched(state, "batch-1", progress(BatchStatus::Running, 1, 4));
    let (state, effects) = update(
        state,
        BatchMsg::PollFailed {
            batch_id: "batch-1".into(),
        },
    );

    assert_eq!(effects, vec![BatchEffect::StopPolling, BatchEffect::ClearBatchId]);
    assert_eq!(state.batch_id(), None);
    assert_eq!(state.progress(), Some(&progress(BatchStatus::Running, 1, 4)));
}

#[test]
fn restored_running_batch_resumes_polling() {
    init_logging();
    let (state, effects) = update(
        BatchState::new(),
        BatchMsg::Restored {
            batch_id: "batch-7".into(),
        },
    );
    assert_eq!(
        effects,
        vec![BatchEffect::FetchOnce {
            batch_id: "batch-7".into()
        }]
    );
    assert!(!state.is_polling());

    let (state, effects) = fetched(state, "batch-7", progress(BatchStatus::Running, 1, 2));
    assert_eq!(
        effects,
        vec![BatchEffect::StartPolling {
            batch_id: "batch-7".into()
        }]
    );
    assert!(state.is_polling());
}

#[test]
fn restored_finished_batch_only_clears_storage() {
    init_logging();
    let (state, _) = update(
        BatchState::new(),
        BatchMsg::Restored {
            batch_id: "batch-7".into(),
        },
    );
    let (state, effects) = fetched(state, "batch-7", progress(BatchStatus::Done, 2, 2));

    assert_eq!(effects, vec![BatchEffect::ClearBatchId]);
    assert_eq!(state.batch_id(), None);
}

#[test]
fn cancel_is_sent_without_touching_state() {
    init_logging();
    let (mut state, _) = submitted("batch-1", 2);
    assert!(state.consume_dirty());

    let (mut state, effects) = update(state, BatchMsg::CancelRequested);
    assert_eq!(
        effects,
        vec![BatchEffect::SendCancel {
            batch_id: "batch-1".into()
        }]
    );
    assert!(state.is_polling());
    assert!(!state.consume_dirty());

    let (_, effects) = update(BatchState::new(), BatchMsg::CancelRequested);
    assert!(effects.is_empty());
}

#[test]
fn resubmission_stops_previous_loop_first() {
    init_logging();
    let (state, _) = submitted("batch-1", 2);
    let (state, effects) = update(
        state,
        BatchMsg::Submitted {
            batch_id: "batch-2".into(),
            total: 1,
        },
    );
    assert_eq!(effects[0], BatchEffect::StopPolling);
    assert_eq!(state.batch_id(), Some("batch-2"));

    // A straggling response for the old batch must not leak into the new one.
    let (state, effects) = fetched(state, "batch-1", progress(BatchStatus::Done, 2, 2));
    assert!(effects.is_empty());
    assert_eq!(state.progress(), Some(&BatchProgress::started(1)));
}

#[test]
fn detach_keeps_id_for_recovery() {
    init_logging();
    let (state, _) = submitted("batch-1", 2);
    let (state, effects) = update(state, BatchMsg::Detached);

    assert_eq!(effects, vec![BatchEffect::StopPolling]);
    assert_eq!(state.batch_id(), Some("batch-1"));
    assert!(!state.is_polling());

    let (_, effects) = update(
        state,
        BatchMsg::Restored {
            batch_id: "batch-1".into(),
        },
    );
    assert_eq!(
        effects,
        vec![BatchEffect::FetchOnce {
            batch_id: "batch-1".into()
        }]
    );
}
