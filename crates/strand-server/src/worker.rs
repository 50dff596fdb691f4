use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

use strand_utils::{ThreadPriority, thread_boot};
use tracing::error;

use crate::handler::{ConnectionHandler, HandlerFactory};
use crate::shared::Shared;
use crate::state::{Handback, HandlerOutcome, SockState, WorkUnit};

/// Run every hook implied by `unit.state`, in `New` → `Read` → `Shut`
/// order. A unit's state can carry more than one flag at once (a socket can
/// become readable and hang up in the same poller wakeup), so this is not
/// an either/or dispatch: each flag present gets its hook, and a failure in
/// an earlier hook adds `Shut` to the ones still to run rather than
/// skipping them.
fn dispatch<H: ConnectionHandler>(handler: &mut H, unit: &mut WorkUnit) -> HandlerOutcome {
    let mut state = unit.state;
    let stream = &mut unit.stream;

    if state.contains(SockState::NEW) {
        let outcome = run_hook(|| handler.handshake(stream));
        if outcome == HandlerOutcome::Shut {
            state |= SockState::SHUT;
        }
    }

    if state.contains(SockState::READ) {
        let outcome = run_hook(|| handler.request_response(stream));
        if outcome == HandlerOutcome::Shut {
            state |= SockState::SHUT;
        }
    }

    if state.contains(SockState::SHUT) {
        run_hook(|| {
            handler.shutdown(stream);
            HandlerOutcome::Shut
        });
        return HandlerOutcome::Shut;
    }

    HandlerOutcome::Continue
}

fn run_hook(hook: impl FnOnce() -> HandlerOutcome) -> HandlerOutcome {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(outcome) => outcome,
        Err(_) => {
            error!("connection handler panicked, closing connection");
            HandlerOutcome::Shut
        }
    }
}

/// Spawn one worker thread. It blocks on the shared queue, dispatches each
/// [`WorkUnit`] to a freshly constructed handler instance, and hands the
/// connection back to the acceptor afterward. Workers above `min_servers`
/// exit once they've sat idle for `idle_ttl`.
pub fn spawn<F>(
    shared: Arc<Shared>,
    handback: Sender<Handback>,
    factory: Arc<F>,
    idle_ttl: std::time::Duration,
    core: Option<usize>,
    priority: ThreadPriority,
) -> JoinHandle<()>
where
    F: HandlerFactory + 'static,
{
    shared.active_workers.fetch_add(1, Ordering::SeqCst);
    std::thread::spawn(move || {
        thread_boot(core, priority);
        let mut handler = factory.make();
        loop {
            let popped: Option<WorkUnit> = {
                let mut queue = shared.queue.lock().expect("work queue mutex poisoned");
                loop {
                    if let Some(unit) = queue.pop_front() {
                        break Some(unit);
                    }
                    if shared.stop.load(Ordering::SeqCst) {
                        break None;
                    }
                    let (guard, timeout) =
                        shared.signal.wait_timeout(queue, idle_ttl).expect("condvar wait failed");
                    queue = guard;
                    if timeout.timed_out()
                        && queue.is_empty()
                        && shared.active_workers.load(Ordering::SeqCst) > shared.min_servers
                    {
                        shared.active_workers.fetch_sub(1, Ordering::SeqCst);
                        return;
                    }
                }
            };
            let Some(mut unit) = popped else {
                shared.active_workers.fetch_sub(1, Ordering::SeqCst);
                return;
            };
            let token = unit.token;
            let outcome = dispatch(&mut handler, &mut unit);
            shared.requests.fetch_add(1, Ordering::Relaxed);
            if handback.send(Handback { token, stream: unit.stream, outcome }).is_err() {
                return;
            }
        }
    })
}
