//! Bridges persisted settings and the run loop to the egui UI.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, channel};

use crate::portal::api::{PortalClient, SubmitCartonItem};
use crate::runner::{RunEvent, RunParams, Runner};
use crate::session::{CapturedSessionSource, SessionSource};
use crate::settings::{FormValues, SettingsStore};

use super::state::{LogLine, RunViewState, StatusLineState, StatusTone, UiState};

/// Upper bound on requests per run.
pub const MAX_REQUEST_COUNT: u32 = 1000;
/// Lower bound on the configurable inter-request delay.
pub const MIN_DELAY_MS: u64 = 200;
/// Delay used until the user touches the advanced section.
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// Maintains presenter state and relays commands to the runner.
pub struct AppController {
    /// State rendered by the UI layer.
    pub ui: UiState,
    store: SettingsStore,
    runner: Runner,
    events: Receiver<RunEvent>,
}

impl AppController {
    /// Production wiring: portal HTTP client, captured-cookie session.
    pub fn new(store: SettingsStore) -> Self {
        let session = CapturedSessionSource::new(store.clone());
        Self::with_parts(store, Arc::new(PortalClient), Arc::new(session))
    }

    /// Wiring seam so tests can substitute the network and the session.
    pub fn with_parts(
        store: SettingsStore,
        submitter: Arc<dyn SubmitCartonItem>,
        session: Arc<dyn SessionSource>,
    ) -> Self {
        let (events_tx, events_rx) = channel();
        let runner = Runner::new(submitter, session, events_tx);
        let mut controller = Self {
            ui: UiState::default(),
            store,
            runner,
            events: events_rx,
        };
        controller.restore_form();
        controller.sync_with_active_run();
        controller
    }

    /// Load persisted form values, then fill identifier fields that are
    /// still empty from the most recent captured payload. Explicit prior
    /// input always wins over captures.
    fn restore_form(&mut self) {
        let settings = self.store.snapshot();
        let form = &mut self.ui.form;
        form.carton_id = settings.form.carton_id.unwrap_or_default();
        form.vendor_id = settings.form.vendor_id.unwrap_or_default();
        form.sku_code = settings.form.sku_code.unwrap_or_default();
        form.request_count = settings
            .form
            .request_count
            .map(|count| count.to_string())
            .unwrap_or_default();
        form.delay_ms = settings.form.delay_ms.unwrap_or(DEFAULT_DELAY_MS);

        if let Some(captured) = settings.captured_payload {
            if form.carton_id.is_empty() {
                form.carton_id = captured.carton_id;
            }
            if form.vendor_id.is_empty() {
                form.vendor_id = captured.vendor_id;
            }
            if form.sku_code.is_empty() {
                form.sku_code = captured.sku_code;
            }
        }
    }

    /// Restore progress display when a run is already active.
    fn sync_with_active_run(&mut self) {
        let status = self.runner.status();
        if status.is_running {
            self.ui.run = RunViewState {
                running: true,
                completed: status.completed,
                total: status.total,
            };
            self.set_status("A run is in progress…", StatusTone::Info);
        }
    }

    /// Handle the start control.
    pub fn start_clicked(&mut self) {
        if self.ui.run.running {
            return;
        }
        let params = match validate_form(&self.ui.form) {
            Ok(params) => params,
            Err(message) => {
                self.set_status(message, StatusTone::Error);
                return;
            }
        };
        if let Err(err) = self.persist_form(&params) {
            // Persistence trouble should not block the run itself.
            tracing::warn!("failed to persist form values: {err}");
        }
        if !self.runner.start(params.clone()) {
            return;
        }
        self.ui.run = RunViewState {
            running: true,
            completed: 0,
            total: params.count,
        };
        self.ui.log.clear();
        self.set_status(
            format!("Starting {} requests…", params.count),
            StatusTone::Info,
        );
    }

    /// Handle the stop control. The presenter leaves the Running state only
    /// when the terminal event arrives.
    pub fn stop_clicked(&mut self) {
        if !self.ui.run.running {
            return;
        }
        self.runner.stop();
        self.set_status(
            "Stop requested; finishing the current request…",
            StatusTone::Info,
        );
    }

    /// Drain pending run events; called once per frame.
    pub fn poll_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: RunEvent) {
        match event {
            RunEvent::Progress { completed, total } => {
                self.ui.run.completed = completed;
                self.ui.run.total = total;
                self.push_log(
                    format!("Request {completed}/{total} completed"),
                    StatusTone::Success,
                );
            }
            RunEvent::Error {
                request_number: Some(attempt),
                message,
            } => {
                self.ui.run.completed = attempt.min(self.ui.run.total);
                self.push_log(
                    format!("Error on request {attempt}: {message}"),
                    StatusTone::Error,
                );
            }
            RunEvent::Error {
                request_number: None,
                message,
            } => {
                self.ui.run.running = false;
                self.push_log(message.clone(), StatusTone::Error);
                self.set_status(message, StatusTone::Error);
            }
            RunEvent::Complete { successful, failed } => {
                self.ui.run.running = false;
                let summary = format!("Completed: {successful} successful, {failed} failed");
                self.push_log(summary.clone(), StatusTone::Success);
                self.set_status(summary, StatusTone::Success);
            }
            RunEvent::Stopped => {
                self.ui.run.running = false;
                self.push_log("Process stopped".to_string(), StatusTone::Info);
                self.set_status("Process stopped", StatusTone::Info);
            }
        }
    }

    fn persist_form(&self, params: &RunParams) -> Result<(), crate::settings::SettingsError> {
        let form = FormValues {
            carton_id: Some(params.carton_id.to_string()),
            vendor_id: Some(params.vendor_id.clone()),
            sku_code: Some(params.sku_code.clone()),
            request_count: Some(params.count),
            delay_ms: Some(params.delay_ms),
        };
        self.store.update(|settings| settings.form = form)
    }

    fn set_status(&mut self, text: impl Into<String>, tone: StatusTone) {
        self.ui.status = Some(StatusLineState {
            text: text.into(),
            tone,
        });
    }

    fn push_log(&mut self, text: String, tone: StatusTone) {
        self.ui.log.push(LogLine { text, tone });
    }
}

/// Check raw form input and produce run parameters.
pub fn validate_form(form: &super::state::FormState) -> Result<RunParams, String> {
    let carton_id = form.carton_id.trim();
    let vendor_id = form.vendor_id.trim();
    let sku_code = form.sku_code.trim();
    if carton_id.is_empty() || vendor_id.is_empty() || sku_code.is_empty() {
        return Err("Fill in carton ID, vendor ID and SKU code first.".to_string());
    }
    let carton_id: i64 = carton_id
        .parse()
        .map_err(|_| "Carton ID must be numeric.".to_string())?;
    let count: u32 = form
        .request_count
        .trim()
        .parse()
        .ok()
        .filter(|count| *count >= 1)
        .ok_or_else(|| "Request count must be a positive number.".to_string())?;
    if count > MAX_REQUEST_COUNT {
        return Err(format!(
            "At most {MAX_REQUEST_COUNT} requests are allowed per run."
        ));
    }
    if form.delay_ms < MIN_DELAY_MS {
        return Err(format!("Delay must be at least {MIN_DELAY_MS} ms."));
    }
    Ok(RunParams {
        carton_id,
        vendor_id: vendor_id.to_string(),
        sku_code: sku_code.to_string(),
        count,
        delay_ms: form.delay_ms,
    })
}
