//! egui rendering for the request form, progress and log.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use egui::{Color32, RichText};

use crate::capture_feed::{self, CaptureFeed};
use crate::egui_app::controller::{AppController, MIN_DELAY_MS};
use crate::egui_app::state::StatusTone;
use crate::observer::TrafficObserver;
use crate::settings::SettingsStore;

/// Preferred window size for the popup-style layout.
pub const INITIAL_WINDOW_SIZE: [f32; 2] = [420.0, 560.0];

/// Top-level eframe application.
pub struct CartonPressApp {
    controller: AppController,
    feed: Option<CaptureFeed>,
}

impl CartonPressApp {
    /// Wire up settings, the capture feed and the runner.
    ///
    /// A feed bind failure disables passive capture but never blocks the
    /// app; the error is logged and the run loop still works off whatever
    /// was captured previously.
    pub fn new() -> Result<Self, String> {
        let store = SettingsStore::open().map_err(|err| err.to_string())?;
        let observer = Arc::new(TrafficObserver::new(store.clone()));
        let feed = match capture_feed::spawn(capture_feed::DEFAULT_FEED_ADDR, observer) {
            Ok(feed) => Some(feed),
            Err(err) => {
                tracing::warn!("capture feed disabled: {err}");
                None
            }
        };
        Ok(Self {
            controller: AppController::new(store),
            feed,
        })
    }

    fn render_form(&mut self, ui: &mut egui::Ui) {
        let running = self.controller.ui.run.running;
        let feed_addr: Option<SocketAddr> = self.feed.as_ref().map(|feed| feed.local_addr());
        let form = &mut self.controller.ui.form;

        ui.label("Carton ID");
        ui.add_enabled(
            !running,
            egui::TextEdit::singleline(&mut form.carton_id).hint_text("e.g. 123456"),
        );
        ui.add_space(4.0);

        ui.label("Vendor ID");
        ui.add_enabled(
            !running,
            egui::TextEdit::singleline(&mut form.vendor_id).hint_text("Vendor identifier"),
        );
        ui.add_space(4.0);

        ui.label("SKU code");
        ui.add_enabled(
            !running,
            egui::TextEdit::singleline(&mut form.sku_code).hint_text("SKU code"),
        );
        ui.add_space(4.0);

        ui.label("Number of requests");
        ui.add_enabled(
            !running,
            egui::TextEdit::singleline(&mut form.request_count).hint_text("1-1000"),
        );

        ui.add_space(6.0);
        ui.collapsing("Advanced settings", |ui| {
            ui.horizontal(|ui| {
                ui.label("Delay between requests");
                ui.add_enabled(
                    !running,
                    egui::DragValue::new(&mut form.delay_ms)
                        .speed(50)
                        .range(MIN_DELAY_MS..=60_000)
                        .suffix(" ms"),
                );
            });
            match feed_addr {
                Some(addr) => {
                    ui.label(
                        RichText::new(format!("Capture feed listening on {addr}"))
                            .color(Color32::GRAY),
                    );
                }
                None => {
                    ui.label(
                        RichText::new("Capture feed disabled (port unavailable)")
                            .color(Color32::GRAY),
                    );
                }
            }
        });
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        let running = self.controller.ui.run.running;
        let mut start_clicked = false;
        let mut stop_clicked = false;
        ui.horizontal(|ui| {
            let start_label = if running { "Running…" } else { "Start requests" };
            if ui
                .add_enabled(!running, egui::Button::new(start_label))
                .clicked()
            {
                start_clicked = true;
            }
            if running && ui.button("Stop").clicked() {
                stop_clicked = true;
            }
        });
        if start_clicked {
            self.controller.start_clicked();
        }
        if stop_clicked {
            self.controller.stop_clicked();
        }
    }

    fn render_progress(&self, ui: &mut egui::Ui) {
        let run = self.controller.ui.run;
        if !run.running && run.total == 0 {
            return;
        }
        ui.add_space(6.0);
        ui.add(
            egui::ProgressBar::new(run.fraction())
                .text(format!("{} / {} completed", run.completed, run.total)),
        );
    }

    fn render_status(&self, ui: &mut egui::Ui) {
        if let Some(status) = &self.controller.ui.status {
            ui.add_space(4.0);
            ui.label(RichText::new(&status.text).color(tone_color(status.tone)));
        }
    }

    fn render_log(&self, ui: &mut egui::Ui) {
        if self.controller.ui.log.is_empty() {
            return;
        }
        ui.add_space(6.0);
        ui.separator();
        egui::ScrollArea::vertical()
            .max_height(180.0)
            .stick_to_bottom(true)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                for line in &self.controller.ui.log {
                    ui.label(
                        RichText::new(&line.text)
                            .color(tone_color(line.tone))
                            .size(12.0),
                    );
                }
            });
    }
}

impl eframe::App for CartonPressApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.controller.poll_events();
        if self.controller.ui.run.running {
            // Keep draining events while a run is active even without input.
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Carton item requests");
            ui.add_space(8.0);
            self.render_form(ui);
            ui.add_space(10.0);
            self.render_controls(ui);
            self.render_progress(ui);
            self.render_status(ui);
            self.render_log(ui);
        });
    }
}

fn tone_color(tone: StatusTone) -> Color32 {
    match tone {
        StatusTone::Info => Color32::from_rgb(120, 170, 220),
        StatusTone::Success => Color32::from_rgb(110, 190, 120),
        StatusTone::Error => Color32::from_rgb(230, 110, 100),
    }
}
