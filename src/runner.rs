//! The request loop controller.
//!
//! One `Runner` owns at most one active run. A run executes on a worker
//! thread, reports back through a typed event channel, and honors a
//! cooperative cancel flag checked before each attempt and before each
//! inter-attempt delay. In-flight requests are never interrupted.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
    mpsc::Sender,
};
use std::thread;
use std::time::Duration;

use crate::portal::api::{CartonItemRequest, SubmitCartonItem};
use crate::session::{self, SessionSource};

/// Parameters for one run, immutable for its duration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunParams {
    /// Numeric carton identifier.
    pub carton_id: i64,
    /// Opaque vendor identifier.
    pub vendor_id: String,
    /// Opaque SKU code.
    pub sku_code: String,
    /// Number of attempts to make.
    pub count: u32,
    /// Delay between attempts in milliseconds.
    pub delay_ms: u64,
}

/// Events pushed from the run loop to the presenter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunEvent {
    /// An attempt succeeded; counters after it.
    Progress {
        /// Attempts finished so far.
        completed: u32,
        /// Total attempts in this run.
        total: u32,
    },
    /// An attempt failed, or (with no attempt index) the run aborted before
    /// the first request.
    Error {
        /// 1-based attempt index; `None` for pre-flight failures.
        request_number: Option<u32>,
        /// Advisory text for the log.
        message: String,
    },
    /// The run finished all attempts.
    Complete {
        /// Attempts that got a 2xx.
        successful: u32,
        /// Attempts that failed.
        failed: u32,
    },
    /// The run ended early because a stop was requested.
    Stopped,
}

/// Counters for one run. Owned by the loop; snapshotted for status queries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunState {
    /// Whether the loop is currently executing.
    pub is_running: bool,
    /// Attempts finished so far.
    pub completed: u32,
    /// Total attempts in this run.
    pub total: u32,
    /// Successful attempts.
    pub successful: u32,
    /// Failed attempts.
    pub failed: u32,
}

/// Snapshot answering "is a run active and how far along is it".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStatus {
    pub is_running: bool,
    pub completed: u32,
    pub total: u32,
}

/// Drives runs against the portal.
pub struct Runner {
    submitter: Arc<dyn SubmitCartonItem>,
    session: Arc<dyn SessionSource>,
    events: Sender<RunEvent>,
    state: Arc<Mutex<RunState>>,
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(
        submitter: Arc<dyn SubmitCartonItem>,
        session: Arc<dyn SessionSource>,
        events: Sender<RunEvent>,
    ) -> Self {
        Self {
            submitter,
            session,
            events,
            state: Arc::new(Mutex::new(RunState::default())),
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start a run on a worker thread.
    ///
    /// A start while a run is active is a silent no-op; returns whether the
    /// run was accepted.
    pub fn start(&self, params: RunParams) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("start ignored; a run is already active");
            return false;
        }
        self.cancel.store(false, Ordering::SeqCst);
        {
            let mut state = lock_state(&self.state);
            *state = RunState {
                is_running: true,
                total: params.count,
                ..RunState::default()
            };
        }

        let submitter = Arc::clone(&self.submitter);
        let session = Arc::clone(&self.session);
        let events = self.events.clone();
        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);
        let cancel = Arc::clone(&self.cancel);
        thread::spawn(move || {
            match session::resolve(session.as_ref()) {
                Ok(cookie_header) => {
                    tracing::info!(count = params.count, "run started");
                    run_loop(
                        &params,
                        submitter.as_ref(),
                        &cookie_header,
                        &cancel,
                        &state,
                        &events,
                    );
                }
                Err(err) => {
                    tracing::warn!("run aborted before first request: {err}");
                    let _ = events.send(RunEvent::Error {
                        request_number: None,
                        message: err.to_string(),
                    });
                }
            }
            lock_state(&state).is_running = false;
            running.store(false, Ordering::SeqCst);
        });
        true
    }

    /// Request a cooperative stop of the active run, if any.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Return a snapshot of the current run state.
    pub fn status(&self) -> RunStatus {
        let state = lock_state(&self.state);
        RunStatus {
            is_running: state.is_running,
            completed: state.completed,
            total: state.total,
        }
    }
}

/// Execute the attempts sequentially, updating `state` and emitting events.
///
/// Failures never abort the loop; the only early exit is the cancel flag,
/// observed before each attempt and before each delay.
fn run_loop(
    params: &RunParams,
    submitter: &dyn SubmitCartonItem,
    cookie_header: &str,
    cancel: &AtomicBool,
    state: &Mutex<RunState>,
    events: &Sender<RunEvent>,
) {
    let request = CartonItemRequest {
        carton_id: params.carton_id,
        vendor_id: params.vendor_id.clone(),
        sku_code: params.sku_code.clone(),
    };

    let mut stopped = false;
    for attempt in 1..=params.count {
        if cancel.load(Ordering::SeqCst) {
            stopped = true;
            break;
        }

        match submitter.submit(&request, cookie_header, attempt) {
            Ok(()) => {
                let mut guard = lock_state(state);
                guard.completed = attempt;
                guard.successful += 1;
                drop(guard);
                let _ = events.send(RunEvent::Progress {
                    completed: attempt,
                    total: params.count,
                });
            }
            Err(err) => {
                let mut guard = lock_state(state);
                guard.completed = attempt;
                guard.failed += 1;
                drop(guard);
                tracing::warn!(attempt, "attempt failed: {err}");
                let _ = events.send(RunEvent::Error {
                    request_number: Some(attempt),
                    message: err.to_string(),
                });
            }
        }

        if attempt < params.count && !cancel.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(params.delay_ms));
        }
    }

    if stopped {
        tracing::info!("run stopped by user");
        let _ = events.send(RunEvent::Stopped);
    } else {
        let guard = lock_state(state);
        tracing::info!(
            successful = guard.successful,
            failed = guard.failed,
            "run complete"
        );
        let _ = events.send(RunEvent::Complete {
            successful: guard.successful,
            failed: guard.failed,
        });
    }
}

fn lock_state(state: &Mutex<RunState>) -> std::sync::MutexGuard<'_, RunState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::api::CreateItemError;
    use crate::session::SessionSource;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc::{Receiver, channel};
    use std::time::{Duration, Instant};

    struct FixedSession(Option<&'static str>);

    impl SessionSource for FixedSession {
        fn cookie_header(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    /// Submitter scripted per attempt; records every attempt it sees.
    struct ScriptedSubmitter {
        fail_on: Vec<u32>,
        seen: AtomicU32,
        on_attempt: Option<Box<dyn Fn(u32) + Send + Sync>>,
    }

    impl ScriptedSubmitter {
        fn ok() -> Self {
            Self::failing_on(Vec::new())
        }

        fn failing_on(fail_on: Vec<u32>) -> Self {
            Self {
                fail_on,
                seen: AtomicU32::new(0),
                on_attempt: None,
            }
        }

        fn attempts(&self) -> u32 {
            self.seen.load(Ordering::SeqCst)
        }
    }

    impl SubmitCartonItem for ScriptedSubmitter {
        fn submit(
            &self,
            _request: &CartonItemRequest,
            _cookie_header: &str,
            attempt: u32,
        ) -> Result<(), CreateItemError> {
            self.seen.store(attempt, Ordering::SeqCst);
            if let Some(hook) = &self.on_attempt {
                hook(attempt);
            }
            if self.fail_on.contains(&attempt) {
                Err(CreateItemError::Status {
                    code: 500,
                    detail: "Internal Server Error".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn params(count: u32) -> RunParams {
        RunParams {
            carton_id: 101,
            vendor_id: "VND".to_string(),
            sku_code: "SKU".to_string(),
            count,
            delay_ms: 0,
        }
    }

    fn run_sync(
        params: &RunParams,
        submitter: &dyn SubmitCartonItem,
        cancel: &AtomicBool,
    ) -> (RunState, Vec<RunEvent>) {
        let state = Mutex::new(RunState {
            is_running: true,
            total: params.count,
            ..RunState::default()
        });
        let (tx, rx) = channel();
        run_loop(params, submitter, "sid=test", cancel, &state, &tx);
        drop(tx);
        (lock_state(&state).clone(), rx.iter().collect())
    }

    fn drain_until_terminal(rx: &Receiver<RunEvent>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("run did not finish in time");
            let terminal = matches!(
                event,
                RunEvent::Complete { .. }
                    | RunEvent::Stopped
                    | RunEvent::Error {
                        request_number: None,
                        ..
                    }
            );
            events.push(event);
            if terminal {
                return events;
            }
        }
    }

    fn wait_until_idle(runner: &Runner) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while runner.status().is_running {
            assert!(Instant::now() < deadline, "runner never went idle");
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Replay events and check `completed == successful + failed` after each.
    fn assert_counter_invariant(total: u32, events: &[RunEvent]) {
        let mut successful = 0u32;
        let mut failed = 0u32;
        for event in events {
            match event {
                RunEvent::Progress { completed, .. } => {
                    successful += 1;
                    assert_eq!(*completed, successful + failed);
                    assert!(*completed <= total);
                }
                RunEvent::Error {
                    request_number: Some(attempt),
                    ..
                } => {
                    failed += 1;
                    assert_eq!(*attempt, successful + failed);
                    assert!(*attempt <= total);
                }
                RunEvent::Complete {
                    successful: s,
                    failed: f,
                } => {
                    assert_eq!((*s, *f), (successful, failed));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn five_successes_emit_five_progress_and_one_complete() {
        let submitter = ScriptedSubmitter::ok();
        let cancel = AtomicBool::new(false);
        let (state, events) = run_sync(&params(5), &submitter, &cancel);

        let progress: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, RunEvent::Progress { .. }))
            .collect();
        assert_eq!(progress.len(), 5);
        assert_eq!(
            events.last(),
            Some(&RunEvent::Complete {
                successful: 5,
                failed: 0
            })
        );
        assert_eq!(state.completed, 5);
        assert_counter_invariant(5, &events);
    }

    #[test]
    fn failed_attempt_does_not_abort_the_loop() {
        let submitter = ScriptedSubmitter::failing_on(vec![2]);
        let cancel = AtomicBool::new(false);
        let (state, events) = run_sync(&params(3), &submitter, &cancel);

        assert_eq!(submitter.attempts(), 3);
        assert!(events.iter().any(|event| matches!(
            event,
            RunEvent::Error {
                request_number: Some(2),
                message
            } if message.contains("HTTP 500")
        )));
        assert_eq!(
            events.last(),
            Some(&RunEvent::Complete {
                successful: 2,
                failed: 1
            })
        );
        assert_eq!(state.successful, 2);
        assert_eq!(state.failed, 1);
        assert_counter_invariant(3, &events);
    }

    #[test]
    fn stop_during_attempt_two_halts_before_attempt_three() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut submitter = ScriptedSubmitter::ok();
        let cancel_hook = Arc::clone(&cancel);
        // Stop arrives while attempt 2 is in flight; the request finishes,
        // then the loop must exit before attempt 3.
        submitter.on_attempt = Some(Box::new(move |attempt| {
            if attempt == 2 {
                cancel_hook.store(true, Ordering::SeqCst);
            }
        }));

        let (state, events) = run_sync(&params(5), &submitter, &cancel);

        assert_eq!(submitter.attempts(), 2);
        assert_eq!(events.last(), Some(&RunEvent::Stopped));
        assert!(state.completed <= 2);
        assert_counter_invariant(5, &events);
    }

    #[test]
    fn stop_before_first_attempt_sends_stopped_only() {
        let submitter = ScriptedSubmitter::ok();
        let cancel = AtomicBool::new(true);
        let (state, events) = run_sync(&params(4), &submitter, &cancel);

        assert_eq!(submitter.attempts(), 0);
        assert_eq!(events, vec![RunEvent::Stopped]);
        assert_eq!(state.completed, 0);
    }

    #[test]
    fn missing_session_aborts_before_any_request() {
        let submitter = Arc::new(ScriptedSubmitter::ok());
        let (tx, rx) = channel();
        let runner = Runner::new(
            Arc::clone(&submitter) as Arc<dyn SubmitCartonItem>,
            Arc::new(FixedSession(None)),
            tx,
        );

        assert!(runner.start(params(3)));
        let events = drain_until_terminal(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RunEvent::Error {
                request_number: None,
                message
            } if message.contains("Not logged in")
        ));
        wait_until_idle(&runner);
        assert_eq!(submitter.attempts(), 0);
    }

    #[test]
    fn start_while_running_is_a_noop() {
        // Gate the first attempt so the first run is reliably still active
        // when the second start arrives.
        let (gate_tx, gate_rx) = channel::<()>();
        struct GatedSubmitter {
            gate: StdMutex<Receiver<()>>,
            seen: AtomicU32,
        }
        impl SubmitCartonItem for GatedSubmitter {
            fn submit(
                &self,
                _request: &CartonItemRequest,
                _cookie_header: &str,
                attempt: u32,
            ) -> Result<(), CreateItemError> {
                self.seen.store(attempt, Ordering::SeqCst);
                let _ = self
                    .gate
                    .lock()
                    .expect("gate receiver poisoned")
                    .recv_timeout(Duration::from_secs(5));
                Ok(())
            }
        }

        let submitter = Arc::new(GatedSubmitter {
            gate: StdMutex::new(gate_rx),
            seen: AtomicU32::new(0),
        });
        let (tx, rx) = channel();
        let runner = Runner::new(
            Arc::clone(&submitter) as Arc<dyn SubmitCartonItem>,
            Arc::new(FixedSession(Some("sid=test"))),
            tx,
        );

        assert!(runner.start(params(1)));
        let deadline = Instant::now() + Duration::from_secs(5);
        while submitter.seen.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "first attempt never started");
            thread::sleep(Duration::from_millis(5));
        }

        let status_before = runner.status();
        assert!(!runner.start(params(99)));
        assert_eq!(runner.status(), status_before);

        gate_tx.send(()).unwrap();
        let events = drain_until_terminal(&rx);
        // Only the first run ever produced events; total stays 1, not 99.
        assert_eq!(
            events,
            vec![
                RunEvent::Progress {
                    completed: 1,
                    total: 1
                },
                RunEvent::Complete {
                    successful: 1,
                    failed: 0
                }
            ]
        );
        wait_until_idle(&runner);
    }

    #[test]
    fn status_reflects_run_lifecycle() {
        let (tx, rx) = channel();
        let runner = Runner::new(
            Arc::new(ScriptedSubmitter::ok()),
            Arc::new(FixedSession(Some("sid=test"))),
            tx,
        );
        assert_eq!(runner.status(), RunStatus::default());

        assert!(runner.start(params(2)));
        drain_until_terminal(&rx);
        wait_until_idle(&runner);

        let status = runner.status();
        assert!(!status.is_running);
        assert_eq!(status.completed, 2);
        assert_eq!(status.total, 2);
    }
}
