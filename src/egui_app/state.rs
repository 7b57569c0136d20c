//! Presenter-side state for the egui UI.

/// Tone applied to the status line and log entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusTone {
    /// Neutral information.
    Info,
    /// A successful outcome.
    Success,
    /// A failed outcome or invalid input.
    Error,
}

/// One line in the append-only attempt log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    /// Rendered text.
    pub text: String,
    /// Tone for coloring.
    pub tone: StatusTone,
}

/// Raw form inputs, kept as text until validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormState {
    /// Carton identifier input.
    pub carton_id: String,
    /// Vendor identifier input.
    pub vendor_id: String,
    /// SKU code input.
    pub sku_code: String,
    /// Request count input.
    pub request_count: String,
    /// Delay between requests, exposed under advanced settings.
    pub delay_ms: u64,
}

/// Progress as the presenter sees it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunViewState {
    /// Whether a run is in flight (presenter is in the Running state).
    pub running: bool,
    /// Attempts finished so far.
    pub completed: u32,
    /// Total attempts in the run.
    pub total: u32,
}

impl RunViewState {
    /// Completed fraction in `0.0..=1.0` for the progress bar.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

/// Status line under the controls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusLineState {
    /// Message text.
    pub text: String,
    /// Tone for coloring.
    pub tone: StatusTone,
}

/// All presenter state.
#[derive(Clone, Debug, Default)]
pub struct UiState {
    /// Form inputs.
    pub form: FormState,
    /// Run progress view.
    pub run: RunViewState,
    /// Current status line, if any.
    pub status: Option<StatusLineState>,
    /// Append-only attempt log.
    pub log: Vec<LogLine>,
}
