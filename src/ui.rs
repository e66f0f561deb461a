use crossbeam_channel::Receiver;
use eframe::egui;
use egui::text::{CCursor, CCursorRange};
use egui::text_edit::TextEditState;
use std::fs;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::delivery::Deliver;
use crate::events::{UiEvent, UiHandle};
use crate::orchestrator::Orchestrator;
use crate::session::{Generation, Phase, PopupStatus, Session, SubmitOutcome};
use crate::translator::Translate;

/// Also used to locate the native window from other threads.
pub const WINDOW_TITLE: &str = "Korean → English";

#[derive(Debug, Default, Clone, Copy)]
struct PopupKeys {
    submit: bool,
    newline: bool,
    dismiss: bool,
}

impl PopupKeys {
    /// Removes Enter, Shift+Enter and Escape before the editor sees them.
    fn take(ctx: &egui::Context) -> Self {
        ctx.input_mut(|i| {
            let mut keys = PopupKeys::default();
            i.events.retain(|event| match event {
                egui::Event::Key { key: egui::Key::Enter, pressed: true, modifiers, .. } => {
                    if modifiers.shift_only() {
                        keys.newline = true;
                    } else if modifiers.is_none() {
                        keys.submit = true;
                    } else {
                        return true;
                    }
                    false
                }
                egui::Event::Key { key: egui::Key::Escape, pressed: true, .. } => {
                    keys.dismiss = true;
                    false
                }
                _ => true,
            });
            keys
        })
    }
}

/// Per-generation id so a fresh popup starts with empty undo history.
fn editor_id(generation: Generation) -> egui::Id {
    egui::Id::new(("popup-editor", generation))
}

struct PopupApp<T, D> {
    session: Session,
    orchestrator: Orchestrator<T, D>,
    events: Receiver<UiEvent>,
    visible: bool,
    need_focus: bool,
    fonts_set: bool,
}

impl<T: Translate, D: Deliver> PopupApp<T, D> {
    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                UiEvent::ShowPopup => {
                    self.session.open();
                    self.need_focus = true;
                }
                UiEvent::ClosePopup { generation, ack } => {
                    let closed = self.session.finish(generation);
                    let _ = ack.send(closed);
                }
                UiEvent::TranslationFailed { generation, message } => {
                    crate::toast("Translation failed", &message);
                    if !self.session.fail(generation, message) {
                        debug!("Failure for popup #{} arrived after it closed", generation);
                    }
                }
            }
        }
    }

    fn sync_visibility(&mut self, ctx: &egui::Context) {
        let open = self.session.is_open();
        if open != self.visible {
            ctx.send_viewport_cmd(egui::ViewportCommand::Visible(open));
            self.visible = open;
        }
        if open && self.need_focus {
            ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context, editor_id: egui::Id) {
        let keys = PopupKeys::take(ctx);
        if keys.dismiss {
            self.session.cancel();
            return;
        }
        if keys.newline && self.session.phase() == Phase::Open {
            let mut state = TextEditState::load(ctx, editor_id).unwrap_or_default();
            let at = state
                .cursor
                .char_range()
                .map_or(usize::MAX, |range| range.primary.index);
            if let Some(cursor) = self.session.insert_newline(at) {
                state.cursor.set_char_range(Some(CCursorRange::one(CCursor::new(cursor))));
                state.store(ctx, editor_id);
            }
        }
        if keys.submit {
            match self.session.submit() {
                SubmitOutcome::Started(job) => {
                    self.orchestrator.submit(job);
                }
                SubmitOutcome::Busy => info!("Submit ignored: translation in flight"),
                SubmitOutcome::Empty | SubmitOutcome::NoPopup => {}
            }
        }
    }

    fn ensure_fonts(&mut self, ctx: &egui::Context) {
        if self.fonts_set {
            return;
        }
        self.fonts_set = true;
        let candidates = [
            r"C:\Windows\Fonts\malgun.ttf",
            r"C:\Windows\Fonts\gulim.ttc",
            "/usr/share/fonts/truetype/nanum/NanumGothic.ttf",
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        ];
        let Some((path, bytes)) = candidates
            .iter()
            .find_map(|p| fs::read(p).ok().map(|b| (*p, b)))
        else {
            warn!("No Korean font found; Hangul may render as boxes");
            return;
        };
        let mut fonts = egui::FontDefinitions::default();
        fonts.font_data.insert("korean".to_owned(), egui::FontData::from_owned(bytes));
        for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
            fonts.families.entry(family).or_default().insert(0, "korean".to_owned());
        }
        ctx.set_fonts(fonts);
        info!("Loaded Korean font: {}", path);
    }
}

impl<T: Translate, D: Deliver> eframe::App for PopupApp<T, D> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Wake up periodically so we can poll the channel even without user events
        ctx.request_repaint_after(Duration::from_millis(120));
        self.ensure_fonts(ctx);
        self.drain_events();

        if ctx.input(|i| i.viewport().close_requested()) {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.session.cancel();
        }

        let editor = editor_id(self.session.popup().map_or(0, |p| p.generation()));
        if self.session.is_open() {
            self.handle_keys(ctx, editor);
        }
        self.sync_visibility(ctx);

        let char_count = self.session.char_count();
        let editable = self.session.phase() != Phase::Submitting;
        let earlier_in_flight = editable && self.session.busy().is_busy();
        let Some(popup) = self.session.popup_mut() else {
            return;
        };
        let status = popup.status().clone();

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match &status {
                    PopupStatus::Editing if earlier_in_flight => {
                        ui.label("Previous translation still running...");
                    }
                    PopupStatus::Editing => {}
                    PopupStatus::Translating => {
                        ui.spinner();
                        ui.label("Translating...");
                    }
                    PopupStatus::Failed(message) => {
                        ui.colored_label(ui.visuals().error_fg_color, message);
                    }
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!("Characters: {}", char_count));
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    let response = ui.add(
                        egui::TextEdit::multiline(&mut popup.buffer)
                            .id(editor)
                            .desired_rows(10)
                            .desired_width(f32::INFINITY)
                            .lock_focus(true)
                            .interactive(editable),
                    );
                    // The counter above was laid out from the pre-edit buffer.
                    if response.changed() {
                        ui.ctx().request_repaint();
                    }
                    if self.need_focus {
                        response.request_focus();
                        self.need_focus = false;
                    }
                });
        });
    }
}

/// Runs the popup event loop on the main thread (blocking). The window starts hidden.
pub fn run_ui_main_thread<T: Translate, D: Deliver>(
    session: Session,
    orchestrator: Orchestrator<T, D>,
    ui: UiHandle,
    events: Receiver<UiEvent>,
) {
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([400.0, 300.0])
            .with_always_on_top()
            .with_visible(false),
        ..Default::default()
    };
    info!("Main UI: starting event loop");
    let result = eframe::run_native(
        WINDOW_TITLE,
        native_options,
        Box::new(move |cc| {
            ui.attach(&cc.egui_ctx);
            Box::new(PopupApp {
                session,
                orchestrator,
                events,
                visible: false,
                need_focus: false,
                fonts_set: false,
            })
        }),
    );
    match result {
        Ok(()) => info!("Main UI: event loop exited"),
        Err(e) => error!("Main UI error: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranslateError;
    use futures_util::future::BoxFuture;

    struct Echo;

    impl Translate for Echo {
        fn translate<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<String, TranslateError>> {
            Box::pin(async move { Ok(text.to_string()) })
        }
    }

    struct Nowhere;

    impl Deliver for Nowhere {
        fn copy(&self, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn emit(&self, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn app(rt: &tokio::runtime::Runtime) -> (PopupApp<Echo, Nowhere>, UiHandle) {
        let session = Session::new();
        let (ui, events) = UiHandle::channel();
        let orchestrator = Orchestrator::new(
            Echo,
            Nowhere,
            rt.handle().clone(),
            ui.clone(),
            session.active(),
            Duration::ZERO,
        );
        let app = PopupApp {
            session,
            orchestrator,
            events,
            visible: false,
            need_focus: false,
            fonts_set: false,
        };
        (app, ui)
    }

    fn key(key: egui::Key, modifiers: egui::Modifiers) -> egui::Event {
        egui::Event::Key { key, physical_key: None, pressed: true, repeat: false, modifiers }
    }

    #[test]
    fn popup_keys_are_routed_and_consumed() {
        let ctx = egui::Context::default();
        let ctrl_enter = key(egui::Key::Enter, egui::Modifiers::CTRL);
        let raw = egui::RawInput {
            events: vec![
                key(egui::Key::Enter, egui::Modifiers::NONE),
                key(egui::Key::Enter, egui::Modifiers::SHIFT),
                ctrl_enter.clone(),
                key(egui::Key::Escape, egui::Modifiers::NONE),
                egui::Event::Text("가".into()),
            ],
            ..Default::default()
        };

        let mut keys = PopupKeys::default();
        let mut remaining = Vec::new();
        let _ = ctx.run(raw, |ctx| {
            keys = PopupKeys::take(ctx);
            remaining = ctx.input(|i| i.events.clone());
        });

        assert!(keys.submit);
        assert!(keys.newline);
        assert!(keys.dismiss);
        assert_eq!(remaining, vec![ctrl_enter, egui::Event::Text("가".into())]);
    }

    #[test]
    fn plain_typing_sets_no_popup_keys() {
        let ctx = egui::Context::default();
        let raw = egui::RawInput {
            events: vec![egui::Event::Text("안".into()), key(egui::Key::A, egui::Modifiers::NONE)],
            ..Default::default()
        };
        let mut keys = PopupKeys::default();
        let _ = ctx.run(raw, |ctx| keys = PopupKeys::take(ctx));
        assert!(!keys.submit && !keys.newline && !keys.dismiss);
    }

    #[test]
    fn editor_state_is_not_shared_between_popups() {
        assert_ne!(editor_id(1), editor_id(2));
        assert_eq!(editor_id(3), editor_id(3));
    }

    #[test]
    fn rapid_triggers_leave_one_popup() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (mut app, ui) = app(&rt);
        ui.send(UiEvent::ShowPopup);
        ui.send(UiEvent::ShowPopup);
        app.drain_events();

        let popup = app.session.popup().unwrap();
        assert_eq!(popup.generation(), 2);
        assert!(app.session.active().is_current(2));
        assert!(!app.session.active().is_current(1));
        assert!(app.need_focus);
    }

    #[test]
    fn close_is_acknowledged_only_for_live_popup() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (mut app, ui) = app(&rt);
        ui.send(UiEvent::ShowPopup);
        ui.send(UiEvent::ShowPopup);
        app.drain_events();

        let (stale_tx, stale_rx) = crossbeam_channel::bounded(1);
        let (live_tx, live_rx) = crossbeam_channel::bounded(1);
        ui.send(UiEvent::ClosePopup { generation: 1, ack: stale_tx });
        ui.send(UiEvent::ClosePopup { generation: 2, ack: live_tx });
        app.drain_events();

        assert_eq!(stale_rx.try_recv(), Ok(false));
        assert_eq!(live_rx.try_recv(), Ok(true));
        assert!(!app.session.is_open());
    }

    #[test]
    fn failure_event_marks_popup_for_retry() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (mut app, ui) = app(&rt);
        ui.send(UiEvent::ShowPopup);
        app.drain_events();
        app.session.popup_mut().unwrap().buffer.push_str("안녕");

        ui.send(UiEvent::TranslationFailed { generation: 1, message: "offline".into() });
        app.drain_events();

        let popup = app.session.popup().unwrap();
        assert_eq!(popup.status(), &PopupStatus::Failed("offline".into()));
        assert_eq!(popup.buffer, "안녕");
    }
}
