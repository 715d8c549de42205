use crate::{BatchEffect, BatchMsg, BatchProgress, BatchState};

/// Pure update function: applies a message to the batch state and returns any effects.
///
/// The server is authoritative: every fetched snapshot replaces the local one and
/// only a non-running status ends tracking.
pub fn update(mut state: BatchState, msg: BatchMsg) -> (BatchState, Vec<BatchEffect>) {
    let effects = match msg {
        BatchMsg::Submitted { batch_id, total } => {
            let mut effects = Vec::with_capacity(3);
            if state.is_polling() {
                effects.push(BatchEffect::StopPolling);
            }
            state.track(batch_id.clone(), Some(BatchProgress::started(total)));
            state.set_polling(true);
            // Persist before polling starts so a reload mid-batch can recover.
            effects.push(BatchEffect::PersistBatchId {
                batch_id: batch_id.clone(),
            });
            effects.push(BatchEffect::StartPolling { batch_id });
            effects
        }
        BatchMsg::Restored { batch_id } => {
            if state.is_tracking(&batch_id) {
                if state.is_polling() {
                    return (state, Vec::new());
                }
                return (state, vec![BatchEffect::FetchOnce { batch_id }]);
            }
            let mut effects = Vec::with_capacity(2);
            if state.is_polling() {
                effects.push(BatchEffect::StopPolling);
                state.set_polling(false);
            }
            state.track(batch_id.clone(), None);
            effects.push(BatchEffect::FetchOnce { batch_id });
            effects
        }
        BatchMsg::ProgressFetched { batch_id, progress } => {
            if !state.is_tracking(&batch_id) {
                return (state, Vec::new());
            }
            let terminal = progress.is_terminal();
            state.replace_progress(progress);
            if terminal {
                let mut effects = Vec::with_capacity(2);
                if state.is_polling() {
                    effects.push(BatchEffect::StopPolling);
                }
                state.forget();
                effects.push(BatchEffect::ClearBatchId);
                effects
            } else if !state.is_polling() {
                state.set_polling(true);
                vec![BatchEffect::StartPolling { batch_id }]
            } else {
                Vec::new()
            }
        }
        BatchMsg::PollFailed { batch_id } => {
            if !state.is_tracking(&batch_id) {
                return (state, Vec::new());
            }
            let mut effects = Vec::with_capacity(2);
            if state.is_polling() {
                effects.push(BatchEffect::StopPolling);
            }
            state.forget();
            effects.push(BatchEffect::ClearBatchId);
            effects
        }
        BatchMsg::CancelRequested => match state.batch_id() {
            Some(batch_id) => vec![BatchEffect::SendCancel {
                batch_id: batch_id.to_string(),
            }],
            None => Vec::new(),
        },
        BatchMsg::Detached => {
            if state.is_polling() {
                state.set_polling(false);
                vec![BatchEffect::StopPolling]
            } else {
                Vec::new()
            }
        }
    };

    (state, effects)
}
