/// Global terminate-game-client shortcut via a low-level Windows keyboard
/// hook (`WH_KEYBOARD_LL`).
///
/// The hook runs on a dedicated OS thread with its own message pump so it
/// fires while a full-screen game has focus. On other platforms the API
/// compiles and keeps the binding, but nothing is ever pressed.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::GameClientConfig;
use crate::event::DaemonEvent;

/// Currently bound virtual-key code (0 = no shortcut).
static HOOK_VK: AtomicU32 = AtomicU32::new(0);

/// Where key presses are forwarded. Set once by [`start`].
static HOOK_TX: OnceLock<mpsc::Sender<DaemonEvent>> = OnceLock::new();

/// Named keys beyond letters, digits and F-keys.
const NAMED_KEYS: &[(&str, u32)] = &[
    ("PAUSE", 0x13),
    ("ESCAPE", 0x1B),
    ("PAGEUP", 0x21),
    ("PAGEDOWN", 0x22),
    ("END", 0x23),
    ("HOME", 0x24),
    ("INSERT", 0x2D),
    ("DELETE", 0x2E),
];

/// Converts a key name (`"F4"`, `"K"`, `"Delete"`) to a Windows
/// virtual-key code. Case-insensitive; `None` for anything unrecognised.
pub fn parse_vk(name: &str) -> Option<u32> {
    let upper = name.trim().to_ascii_uppercase();

    if let Some(&(_, vk)) = NAMED_KEYS.iter().find(|(n, _)| *n == upper) {
        return Some(vk);
    }

    if let Some(n) = upper.strip_prefix('F').and_then(|n| n.parse::<u32>().ok()) {
        // F1=0x70 … F24=0x87
        return (1..=24).contains(&n).then(|| 0x6F + n);
    }

    let mut chars = upper.chars();
    match (chars.next(), chars.next()) {
        // VK codes for A–Z and 0–9 equal their ASCII values.
        (Some(c), None) if c.is_ascii_alphanumeric() => Some(c as u32),
        _ => None,
    }
}

/// Handle to the running keyboard hook.
pub struct HotkeyHandle {
    #[cfg(windows)]
    _thread: std::thread::JoinHandle<()>,
    /// Thread ID of the message-pump thread, used to post `WM_QUIT`.
    #[cfg(windows)]
    thread_id: u32,
}

impl HotkeyHandle {
    /// Binds the shortcut to `key`, or unbinds it for `None`.
    ///
    /// Returns `false` when `key` is not a recognised key name; the
    /// shortcut is left unbound in that case.
    pub fn update_key(&self, key: Option<&str>) -> bool {
        let Some(key) = key else {
            HOOK_VK.store(0, Ordering::Relaxed);
            info!("terminate shortcut unregistered");
            return true;
        };
        match parse_vk(key) {
            Some(vk) => {
                HOOK_VK.store(vk, Ordering::Relaxed);
                info!("terminate shortcut registered: {key}");
                true
            }
            None => {
                HOOK_VK.store(0, Ordering::Relaxed);
                warn!("failed to register terminate shortcut {key:?}");
                false
            }
        }
    }

    /// Signals the hook thread to stop and blocks until it exits.
    pub fn stop(self) {
        #[cfg(windows)]
        {
            imp::post_quit(self.thread_id);
            let _ = self._thread.join();
        }
    }
}

/// Binds the shortcut named in `config`. A key that cannot be bound is
/// cleared from `config`, so the running config matches the unbound hook.
pub fn apply_shortcut(handle: &HotkeyHandle, config: &mut GameClientConfig) -> bool {
    let bound = handle.update_key(config.terminate_shortcut.as_deref());
    if !bound {
        config.terminate_shortcut = None;
    }
    bound
}

/// Installs the keyboard hook on its own thread and binds `initial_key`.
///
/// A press of the bound key sends [`DaemonEvent::TerminateRequested`] with
/// a non-blocking `try_send`; presses are dropped while the channel is full.
/// A key that cannot be bound is logged and leaves the shortcut unbound.
pub fn start(initial_key: Option<&str>, tx: mpsc::Sender<DaemonEvent>) -> anyhow::Result<HotkeyHandle> {
    // Silently ignore if called more than once (e.g. in test binaries).
    let _ = HOOK_TX.set(tx);

    #[cfg(windows)]
    let handle = {
        use anyhow::Context;

        let (id_tx, id_rx) = std::sync::mpsc::sync_channel::<u32>(1);
        let thread = std::thread::Builder::new()
            .name("hotkey-pump".into())
            .spawn(move || imp::run_message_pump(id_tx))
            .context("failed to spawn hotkey thread")?;
        let thread_id = id_rx
            .recv()
            .context("hotkey thread exited before installing the hook")?;
        HotkeyHandle { _thread: thread, thread_id }
    };

    #[cfg(not(windows))]
    let handle = HotkeyHandle {};

    handle.update_key(initial_key);
    Ok(handle)
}

#[cfg(windows)]
mod imp {
    use std::sync::atomic::Ordering;
    use std::sync::mpsc as std_mpsc;

    use tracing::{debug, error};
    use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW,
        SetWindowsHookExW, UnhookWindowsHookEx,
        KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT,
    };

    use crate::event::DaemonEvent;
    use super::{HOOK_TX, HOOK_VK};

    unsafe extern "system" fn keyboard_proc(
        n_code: i32,
        w_param: WPARAM,
        l_param: LPARAM,
    ) -> LRESULT {
        if n_code >= 0 && w_param.0 as u32 == WM_KEYDOWN {
            let kb = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
            let target = HOOK_VK.load(Ordering::Relaxed);
            if target != 0 && kb.vkCode == target {
                if let Some(tx) = HOOK_TX.get() {
                    let _ = tx.try_send(DaemonEvent::TerminateRequested);
                }
            }
        }
        CallNextHookEx(None, n_code, w_param, l_param)
    }

    /// Installs `WH_KEYBOARD_LL`, pumps messages until `WM_QUIT`, then
    /// removes the hook. The thread ID is reported before the hook is
    /// installed so [`super::start`] never blocks on a failed install.
    pub fn run_message_pump(id_tx: std_mpsc::SyncSender<u32>) {
        unsafe {
            let _ = id_tx.send(GetCurrentThreadId());
            drop(id_tx);

            let hook = match SetWindowsHookExW(
                WH_KEYBOARD_LL,
                Some(keyboard_proc),
                HINSTANCE::default(),
                0,
            ) {
                Ok(hook) => hook,
                Err(e) => {
                    error!("SetWindowsHookExW failed, shortcut disabled: {e}");
                    return;
                }
            };

            let mut msg = MSG::default();
            // GetMessageW: >0 = message, 0 = WM_QUIT, <0 = error.
            while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                DispatchMessageW(&msg);
            }

            let _ = UnhookWindowsHookEx(hook);
            debug!("hook thread exited");
        }
    }

    /// Posts `WM_QUIT` to `thread_id`, causing its `GetMessageW` loop to exit.
    pub fn post_quit(thread_id: u32) {
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_vk ──────────────────────────────────────────────────────────────

    #[test]
    fn f_keys_are_contiguous_from_0x70() {
        for n in 1u32..=24 {
            let name = format!("F{n}");
            assert_eq!(parse_vk(&name), Some(0x6F + n), "Wrong VK for {name}");
        }
    }

    #[test]
    fn f_keys_out_of_range_are_rejected() {
        assert_eq!(parse_vk("F0"), None);
        assert_eq!(parse_vk("F25"), None);
        assert_eq!(parse_vk("Fx"), None);
    }

    #[test]
    fn letters_and_digits_match_ascii_uppercase() {
        for c in (b'A'..=b'Z').chain(b'0'..=b'9') {
            let name = (c as char).to_string();
            assert_eq!(parse_vk(&name), Some(c as u32), "Failed for {name}");
            assert_eq!(parse_vk(&name.to_lowercase()), Some(c as u32));
        }
    }

    #[test]
    fn named_keys_are_case_insensitive() {
        assert_eq!(parse_vk("Delete"), Some(0x2E));
        assert_eq!(parse_vk("pause"), Some(0x13));
        assert_eq!(parse_vk(" Escape "), Some(0x1B));
    }

    #[test]
    fn unrecognised_names_return_none() {
        for name in ["", " ", "!", "AB", "Ctrl+F4", "Space"] {
            assert_eq!(parse_vk(name), None, "{name:?}");
        }
    }

    // ── HotkeyHandle ──────────────────────────────────────────────────────────

    /// Only one test calls `start()` so a single hook is installed per test
    /// binary on Windows.
    #[test]
    fn update_key_binds_unbinds_and_rejects() {
        let (tx, _rx) = tokio::sync::mpsc::channel::<DaemonEvent>(8);
        let handle = start(Some("F4"), tx).unwrap();
        assert_eq!(HOOK_VK.load(Ordering::Relaxed), 0x73);

        assert!(handle.update_key(Some("K")));
        assert_eq!(HOOK_VK.load(Ordering::Relaxed), b'K' as u32);

        assert!(handle.update_key(None));
        assert_eq!(HOOK_VK.load(Ordering::Relaxed), 0);

        assert!(!handle.update_key(Some("NotAKey")));
        assert_eq!(HOOK_VK.load(Ordering::Relaxed), 0);

        let mut config = GameClientConfig {
            terminate_shortcut: Some("F9".to_string()),
            ..GameClientConfig::default()
        };
        assert!(apply_shortcut(&handle, &mut config));
        assert_eq!(HOOK_VK.load(Ordering::Relaxed), 0x78);
        assert_eq!(config.terminate_shortcut.as_deref(), Some("F9"));

        // A rejected key is dropped from the config along with the binding.
        config.terminate_shortcut = Some("Ctrl+F9".to_string());
        assert!(!apply_shortcut(&handle, &mut config));
        assert_eq!(HOOK_VK.load(Ordering::Relaxed), 0);
        assert_eq!(config.terminate_shortcut, None);

        handle.stop();
    }
}
