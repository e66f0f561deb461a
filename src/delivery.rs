use crate::config::OutputMode;

/// Result hand-off to the focused application.
pub trait Deliver: Send + Sync + 'static {
    fn copy(&self, text: &str) -> anyhow::Result<()>;
    /// Runs after the popup is gone so the keystrokes reach the previous window.
    fn emit(&self, text: &str) -> anyhow::Result<()>;
}

pub struct SystemDelivery {
    mode: OutputMode,
}

impl SystemDelivery {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }
}

impl Deliver for SystemDelivery {
    fn copy(&self, text: &str) -> anyhow::Result<()> {
        platform::write_clipboard_string(text)
    }

    fn emit(&self, text: &str) -> anyhow::Result<()> {
        match self.mode {
            OutputMode::Paste => platform::send_paste_chord(),
            OutputMode::Type => platform::send_unicode_text(text),
        }
    }
}

#[cfg(windows)]
mod platform {
    use anyhow::{anyhow, bail};
    use windows::Win32::UI::Input::KeyboardAndMouse as km;

    pub fn write_clipboard_string(s: &str) -> anyhow::Result<()> {
        clipboard_win::set_clipboard_string(s).map_err(|e| anyhow!("clipboard write failed: {}", e))
    }

    fn key(vk: km::VIRTUAL_KEY, scan: u16, flags: km::KEYBD_EVENT_FLAGS) -> km::INPUT {
        km::INPUT {
            r#type: km::INPUT_KEYBOARD,
            Anonymous: km::INPUT_0 {
                ki: km::KEYBDINPUT {
                    wVk: vk,
                    wScan: scan,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    fn send(inputs: &[km::INPUT]) -> anyhow::Result<()> {
        let sent = unsafe { km::SendInput(inputs, std::mem::size_of::<km::INPUT>() as i32) };
        if sent as usize != inputs.len() {
            bail!("SendInput injected {} of {} events", sent, inputs.len());
        }
        Ok(())
    }

    pub fn send_paste_chord() -> anyhow::Result<()> {
        let none = km::KEYBD_EVENT_FLAGS(0);
        send(&[
            key(km::VK_CONTROL, 0, none),
            key(km::VK_V, 0, none),
            key(km::VK_V, 0, km::KEYEVENTF_KEYUP),
            key(km::VK_CONTROL, 0, km::KEYEVENTF_KEYUP),
        ])
    }

    pub fn send_unicode_text(text: &str) -> anyhow::Result<()> {
        let inputs: Vec<km::INPUT> = text
            .encode_utf16()
            .flat_map(|unit| {
                [
                    key(km::VIRTUAL_KEY(0), unit, km::KEYEVENTF_UNICODE),
                    key(km::VIRTUAL_KEY(0), unit, km::KEYEVENTF_UNICODE | km::KEYEVENTF_KEYUP),
                ]
            })
            .collect();
        if inputs.is_empty() {
            return Ok(());
        }
        send(&inputs)
    }
}

#[cfg(not(windows))]
mod platform {
    use anyhow::bail;

    pub fn write_clipboard_string(_s: &str) -> anyhow::Result<()> {
        bail!("clipboard access is only implemented on Windows")
    }

    pub fn send_paste_chord() -> anyhow::Result<()> {
        bail!("synthetic input is only implemented on Windows")
    }

    pub fn send_unicode_text(_text: &str) -> anyhow::Result<()> {
        bail!("synthetic input is only implemented on Windows")
    }
}
