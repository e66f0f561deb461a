//! Global hotkey: control+backtick, in either of two shapes.
//!
//! `Chord` registers the combination with the OS as one hotkey. `Decomposed`
//! installs a low-level keyboard hook and tracks the control key itself, which
//! lets it swallow the backtick press that completed the chord. Both only post
//! `UiEvent::ShowPopup` and return; the popup is built on the UI thread.

#![cfg_attr(not(windows), allow(dead_code))]

use crate::config::HotkeyMode;
use crate::error::HotkeyError;
use crate::events::UiHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    LeftControl,
    RightControl,
    Trigger,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Let the key through to the focused application.
    Pass,
    /// Chord completed; fire and suppress the key.
    Fire,
    /// Autorepeat of a chord that already fired; suppress only.
    Swallow,
}

/// Modifier state owned by the hook thread for the life of the process.
#[derive(Debug, Default)]
pub struct ModifierState {
    left_ctrl: bool,
    right_ctrl: bool,
    trigger_down: bool,
}

impl ModifierState {
    fn ctrl_held(&self) -> bool {
        self.left_ctrl || self.right_ctrl
    }

    pub fn observe(&mut self, key: KeyKind, transition: Transition) -> Verdict {
        let down = transition == Transition::Down;
        match key {
            KeyKind::LeftControl => self.left_ctrl = down,
            KeyKind::RightControl => self.right_ctrl = down,
            KeyKind::Trigger if down => {
                let repeat = std::mem::replace(&mut self.trigger_down, true);
                return match (self.ctrl_held(), repeat) {
                    (false, _) => Verdict::Pass,
                    (true, false) => Verdict::Fire,
                    (true, true) => Verdict::Swallow,
                };
            }
            KeyKind::Trigger => self.trigger_down = false,
            KeyKind::Other => {}
        }
        Verdict::Pass
    }
}

/// Starts the listener thread and waits until registration succeeded or failed.
pub fn spawn_listener(mode: HotkeyMode, ui: UiHandle) -> Result<(), HotkeyError> {
    platform::spawn_listener(mode, ui)
}

#[cfg(windows)]
mod platform {
    use std::cell::RefCell;
    use std::thread;

    use once_cell::sync::OnceCell;
    use tracing::{info, warn};
    use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::Input::KeyboardAndMouse as km;
    use windows::Win32::UI::WindowsAndMessaging as wm;

    use super::{KeyKind, ModifierState, Transition, Verdict};
    use crate::config::HotkeyMode;
    use crate::error::HotkeyError;
    use crate::events::{UiEvent, UiHandle};

    const HOTKEY_ID: i32 = 1;

    static HOOK_TARGET: OnceCell<UiHandle> = OnceCell::new();

    thread_local! {
        static MODIFIERS: RefCell<ModifierState> = RefCell::new(ModifierState::default());
    }

    pub fn spawn_listener(mode: HotkeyMode, ui: UiHandle) -> Result<(), HotkeyError> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), HotkeyError>>(1);
        thread::Builder::new()
            .name("hotkey".into())
            .spawn(move || match mode {
                HotkeyMode::Chord => run_chord(ui, ready_tx),
                HotkeyMode::Decomposed => run_hook(ui, ready_tx),
            })
            .map_err(|e| HotkeyError::Registration(e.to_string()))?;
        ready_rx
            .recv()
            .map_err(|_| HotkeyError::Registration("listener thread exited".into()))?
    }

    fn run_chord(ui: UiHandle, ready: crossbeam_channel::Sender<Result<(), HotkeyError>>) {
        let modifiers = km::HOT_KEY_MODIFIERS(km::MOD_CONTROL.0 | km::MOD_NOREPEAT.0);
        let registered = unsafe {
            km::RegisterHotKey(HWND(std::ptr::null_mut()), HOTKEY_ID, modifiers, km::VK_OEM_3.0 as u32)
        };
        if let Err(e) = registered {
            let _ = ready.send(Err(HotkeyError::Registration(format!("Ctrl+` ({})", e))));
            return;
        }
        info!("RegisterHotKey Ctrl+` OK");
        let _ = ready.send(Ok(()));

        pump_messages(|msg| {
            if msg.message == wm::WM_HOTKEY && msg.wParam.0 == HOTKEY_ID as usize {
                info!("Hotkey fired (chord)");
                ui.send(UiEvent::ShowPopup);
            }
        });
        let _ = unsafe { km::UnregisterHotKey(HWND(std::ptr::null_mut()), HOTKEY_ID) };
        info!("UnregisterHotKey Ctrl+`");
    }

    fn run_hook(ui: UiHandle, ready: crossbeam_channel::Sender<Result<(), HotkeyError>>) {
        if HOOK_TARGET.set(ui).is_err() {
            let _ = ready.send(Err(HotkeyError::Registration("keyboard hook already installed".into())));
            return;
        }
        let hook = unsafe {
            GetModuleHandleW(None).and_then(|module| {
                wm::SetWindowsHookExW(wm::WH_KEYBOARD_LL, Some(keyboard_proc), HINSTANCE(module.0), 0)
            })
        };
        let hook = match hook {
            Ok(h) => h,
            Err(e) => {
                let _ = ready.send(Err(HotkeyError::Registration(format!("keyboard hook ({})", e))));
                return;
            }
        };
        info!("Low-level keyboard hook installed");
        let _ = ready.send(Ok(()));

        // The hook procedure runs on this thread while it pumps messages.
        pump_messages(|_| {});
        let _ = unsafe { wm::UnhookWindowsHookEx(hook) };
        warn!("Keyboard hook removed");
    }

    fn pump_messages(mut on_message: impl FnMut(&wm::MSG)) {
        loop {
            let mut msg = wm::MSG::default();
            let got = unsafe { wm::GetMessageW(&mut msg, HWND(std::ptr::null_mut()), 0, 0) };
            if got.0 <= 0 {
                break;
            }
            on_message(&msg);
            unsafe {
                let _ = wm::TranslateMessage(&msg);
                wm::DispatchMessageW(&msg);
            }
        }
    }

    fn classify(vk: u32) -> KeyKind {
        let vk = vk as u16;
        // Low-level hooks report the sided codes; a bare VK_CONTROL counts as left.
        if vk == km::VK_LCONTROL.0 || vk == km::VK_CONTROL.0 {
            KeyKind::LeftControl
        } else if vk == km::VK_RCONTROL.0 {
            KeyKind::RightControl
        } else if vk == km::VK_OEM_3.0 {
            KeyKind::Trigger
        } else {
            KeyKind::Other
        }
    }

    unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        if code == wm::HC_ACTION as i32 {
            let info = &*(lparam.0 as *const wm::KBDLLHOOKSTRUCT);
            let transition = match wparam.0 as u32 {
                wm::WM_KEYDOWN | wm::WM_SYSKEYDOWN => Some(Transition::Down),
                wm::WM_KEYUP | wm::WM_SYSKEYUP => Some(Transition::Up),
                _ => None,
            };
            if let Some(transition) = transition {
                let key = classify(info.vkCode);
                match MODIFIERS.with(|m| m.borrow_mut().observe(key, transition)) {
                    Verdict::Pass => {}
                    Verdict::Fire => {
                        if let Some(ui) = HOOK_TARGET.get() {
                            info!("Hotkey fired (hook)");
                            ui.send(UiEvent::ShowPopup);
                        }
                        return LRESULT(1);
                    }
                    Verdict::Swallow => return LRESULT(1),
                }
            }
        }
        wm::CallNextHookEx(wm::HHOOK::default(), code, wparam, lparam)
    }
}

#[cfg(not(windows))]
mod platform {
    use crate::config::HotkeyMode;
    use crate::error::HotkeyError;
    use crate::events::UiHandle;

    pub fn spawn_listener(_mode: HotkeyMode, _ui: UiHandle) -> Result<(), HotkeyError> {
        Err(HotkeyError::Unsupported)
    }
}
