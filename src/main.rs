#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

use tracing::{error, info};

mod config;
mod delivery;
mod error;
mod events;
mod hotkey;
mod logger;
mod orchestrator;
mod session;
mod translator;
mod ui;

#[cfg(windows)]
mod tray {
    use std::sync::mpsc::Sender;

    use crossbeam_channel::Receiver;
    use tray_icon::menu::{Menu, MenuEvent, MenuItem};
    use tray_icon::{Icon, TrayIcon, TrayIconBuilder};
    use tracing::info;

    pub struct TrayHandle {
        #[allow(dead_code)]
        tray: TrayIcon,
        menu_event_rx: Receiver<MenuEvent>,
        exit_item: MenuItem,
        action_tx: Sender<TrayAction>,
    }

    #[derive(Clone, Debug)]
    pub enum TrayAction {
        Exit,
    }

    impl TrayHandle {
        pub fn new(action_tx: Sender<TrayAction>) -> anyhow::Result<Self> {
            let menu = Menu::new();
            let exit = MenuItem::new("Exit", true, None);
            menu.append(&exit)?;

            // tiny 16x16 navy square
            let (icon_w, icon_h) = (16, 16);
            let rgba: Vec<u8> = std::iter::repeat([0x1E, 0x3A, 0x8A, 0xFF])
                .take(icon_w * icon_h)
                .flatten()
                .collect();
            let icon = Icon::from_rgba(rgba, icon_w as u32, icon_h as u32)?;

            let tray = TrayIconBuilder::new()
                .with_tooltip("Korean → English (Ctrl+`)")
                .with_menu(Box::new(menu))
                .with_icon(icon)
                .build()?;

            let menu_event_rx = MenuEvent::receiver().clone();
            Ok(Self { tray, menu_event_rx, exit_item: exit, action_tx })
        }

        pub fn pump(&self) {
            // Non-blocking poll of tray menu events
            while let Ok(event) = self.menu_event_rx.try_recv() {
                if event.id == self.exit_item.id() {
                    info!("Tray: Exit clicked");
                    let _ = self.action_tx.send(TrayAction::Exit);
                }
            }
        }
    }
}

pub(crate) fn toast(title: &str, body: &str) {
    #[cfg(windows)]
    {
        let _ = winrt_notification::Toast::new(winrt_notification::Toast::POWERSHELL_APP_ID)
            .title(title)
            .text1(body)
            .show();
    }
    #[cfg(not(windows))]
    {
        let _ = (title, body);
    }
}

#[cfg(windows)]
fn show_message_box(title: &str, text: &str) {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging as wm;
    fn wide(s: &str) -> Vec<u16> {
        OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
    }
    let (text, title) = (wide(text), wide(title));
    unsafe {
        let _ = wm::MessageBoxW(
            HWND(std::ptr::null_mut()),
            windows::core::PCWSTR(text.as_ptr()),
            windows::core::PCWSTR(title.as_ptr()),
            wm::MB_OK | wm::MB_ICONERROR | wm::MB_TOPMOST | wm::MB_SETFOREGROUND,
        );
    }
}

#[cfg(not(windows))]
fn show_message_box(title: &str, text: &str) {
    eprintln!("{}: {}", title, text);
}

fn fatal(message: &str) -> ! {
    error!("{}", message);
    show_message_box("Korean → English", message);
    std::process::exit(1);
}

#[cfg(windows)]
fn spawn_tray() {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    let (tray_tx, tray_rx) = mpsc::channel::<tray::TrayAction>();

    // Tray icon and pump on dedicated thread (keep non-Send types on one thread)
    thread::spawn(move || match tray::TrayHandle::new(tray_tx) {
        Ok(tray) => {
            info!("Tray created");
            use windows::Win32::Foundation::HWND;
            use windows::Win32::UI::WindowsAndMessaging as wm;
            loop {
                unsafe {
                    let mut msg = wm::MSG::default();
                    while wm::PeekMessageW(&mut msg, HWND(std::ptr::null_mut()), 0, 0, wm::PM_REMOVE).into() {
                        let _ = wm::TranslateMessage(&msg);
                        wm::DispatchMessageW(&msg);
                    }
                }
                tray.pump();
                thread::sleep(Duration::from_millis(25));
            }
        }
        Err(e) => {
            error!("Tray failed: {}", e);
            toast("Korean → English", &format!("Tray icon unavailable: {}", e));
        }
    });

    // Exit terminates immediately; in-flight translations are abandoned.
    thread::spawn(move || {
        while let Ok(action) = tray_rx.recv() {
            match action {
                tray::TrayAction::Exit => {
                    info!("Exit action received");
                    std::process::exit(0);
                }
            }
        }
    });
}

#[cfg(not(windows))]
fn spawn_tray() {
    info!("Tray icon is only available on Windows");
}

fn main() {
    logger::init();
    info!("App starting");

    let cfg = config::Config::load();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => fatal(&format!("Failed to start async runtime: {}", e)),
    };
    let translator = match translator::WebTranslator::new(&cfg) {
        Ok(t) => t,
        Err(e) => fatal(&format!("Failed to build HTTP client: {}", e)),
    };

    let (ui_handle, ui_events) = events::UiHandle::channel();

    // Without the hotkey there is no way to trigger a translation.
    if let Err(e) = hotkey::spawn_listener(cfg.hotkey_mode, ui_handle.clone()) {
        fatal(&format!("{}. Is another program using Ctrl+`?", e));
    }

    spawn_tray();

    let session = session::Session::new();
    let orchestrator = orchestrator::Orchestrator::new(
        translator,
        delivery::SystemDelivery::new(cfg.output_mode),
        runtime.handle().clone(),
        ui_handle.clone(),
        session.active(),
        cfg.paste_delay(),
    );

    toast("Korean → English", "Ready. Press Ctrl+` to translate.");

    // Run UI on main thread (blocks)
    ui::run_ui_main_thread(session, orchestrator, ui_handle, ui_events);
    drop(runtime);
}
