use crossbeam_channel::{Receiver, Sender};
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::session::Generation;

/// Work for the UI thread. Anything that touches the popup goes through here.
#[derive(Debug)]
pub enum UiEvent {
    /// Hotkey fired: replace any open popup with a fresh one.
    ShowPopup,
    /// Translation delivered to the clipboard; tear the popup down.
    /// `ack` answers whether `generation` was still the live popup.
    ClosePopup { generation: Generation, ack: Sender<bool> },
    TranslationFailed { generation: Generation, message: String },
}

/// Sending half of the UI queue, cloned into the hook thread and workers.
#[derive(Clone)]
pub struct UiHandle {
    tx: Sender<UiEvent>,
    ctx: Arc<OnceCell<egui::Context>>,
}

impl UiHandle {
    pub fn channel() -> (Self, Receiver<UiEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx, ctx: Arc::new(OnceCell::new()) }, rx)
    }

    /// Called once from the UI thread so senders can wake the event loop.
    pub fn attach(&self, ctx: &egui::Context) {
        let _ = self.ctx.set(ctx.clone());
    }

    /// Returns false once the UI side is gone.
    ///
    /// A hidden window never repaints, so `ShowPopup` maps it from the sending
    /// thread first; `update` then drains the queue on the next frame.
    pub fn send(&self, event: UiEvent) -> bool {
        let show = matches!(event, UiEvent::ShowPopup);
        if self.tx.send(event).is_err() {
            return false;
        }
        if let Some(ctx) = self.ctx.get() {
            if show {
                ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
                ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
                platform::reveal_window();
            }
            ctx.request_repaint();
        }
        true
    }
}

#[cfg(windows)]
mod platform {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    use tracing::warn;
    use windows::core::PCWSTR;
    use windows::Win32::UI::WindowsAndMessaging as wm;

    use crate::ui::WINDOW_TITLE;

    /// Maps the popup window through the OS, which posts to the UI thread's queue.
    pub fn reveal_window() {
        let title: Vec<u16> = OsStr::new(WINDOW_TITLE).encode_wide().chain(std::iter::once(0)).collect();
        unsafe {
            match wm::FindWindowW(PCWSTR::null(), PCWSTR(title.as_ptr())) {
                Ok(hwnd) if !hwnd.is_invalid() => {
                    let _ = wm::ShowWindow(hwnd, wm::SW_SHOW);
                    let _ = wm::SetForegroundWindow(hwnd);
                }
                Ok(_) => warn!("Popup window not found"),
                Err(e) => warn!("Popup window not found: {}", e),
            }
        }
    }
}

#[cfg(not(windows))]
mod platform {
    pub fn reveal_window() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_commands(ctx: &egui::Context) -> Vec<egui::ViewportCommand> {
        let output = ctx.run(egui::RawInput::default(), |_| {});
        output
            .viewport_output
            .get(&egui::ViewportId::ROOT)
            .map(|v| v.commands.clone())
            .unwrap_or_default()
    }

    #[test]
    fn show_popup_maps_the_window_from_the_sender() {
        let (ui, events) = UiHandle::channel();
        let ctx = egui::Context::default();
        ui.attach(&ctx);

        assert!(ui.send(UiEvent::ShowPopup));
        assert!(matches!(events.try_recv(), Ok(UiEvent::ShowPopup)));

        let commands = root_commands(&ctx);
        assert!(commands.contains(&egui::ViewportCommand::Visible(true)));
        assert!(commands.contains(&egui::ViewportCommand::Focus));
    }

    #[test]
    fn other_events_leave_visibility_to_the_ui() {
        let (ui, events) = UiHandle::channel();
        let ctx = egui::Context::default();
        ui.attach(&ctx);

        assert!(ui.send(UiEvent::TranslationFailed { generation: 1, message: "offline".into() }));
        assert!(events.try_recv().is_ok());
        assert!(!root_commands(&ctx).contains(&egui::ViewportCommand::Visible(true)));
    }

    #[test]
    fn send_fails_once_the_ui_is_gone() {
        let (ui, events) = UiHandle::channel();
        drop(events);
        assert!(!ui.send(UiEvent::ShowPopup));
    }
}
