//! Platform automation used to drive the browser.
//!
//! The executor only sees [`AutomationBackend`]; which implementation sits
//! behind it is decided once at startup by [`detect_backend`].

use std::{
    process::Command as Process,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::debug;

use crate::error::PlatformError;

const OSASCRIPT: &str = "osascript";

/// Logical keys understood by the browser's video player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    Toggle,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
}

impl MediaKey {
    /// AppleScript `System Events` statement that delivers this key.
    fn stroke(self) -> &'static str {
        match self {
            MediaKey::Toggle => r#"keystroke "k""#,
            MediaKey::Next => r#"keystroke "l""#,
            MediaKey::Previous => r#"keystroke "j""#,
            MediaKey::VolumeUp => "key code 126",
            MediaKey::VolumeDown => "key code 125",
        }
    }
}

/// A synchronous, side-effecting automation mechanism.
pub trait AutomationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn press_key(&self, key: MediaKey) -> Result<(), PlatformError>;

    fn open_url(&self, url: &str) -> Result<(), PlatformError>;
}

/// Drives a browser on macOS through `osascript`.
pub struct MacOsBackend {
    browser: String,
    // System Events is not reentrant; one script at a time across all connections.
    lock: Mutex<()>,
}

impl MacOsBackend {
    pub fn new(browser: impl Into<String>) -> Self {
        Self {
            browser: browser.into(),
            lock: Mutex::new(()),
        }
    }

    fn run_script(&self, script: &str) -> Result<(), PlatformError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(browser = %self.browser, "running automation script");

        let output = Process::new(OSASCRIPT)
            .arg("-e")
            .arg(script)
            .output()
            .map_err(|source| PlatformError::Spawn {
                program: OSASCRIPT,
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        Err(PlatformError::CommandFailed {
            program: OSASCRIPT,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl AutomationBackend for MacOsBackend {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn press_key(&self, key: MediaKey) -> Result<(), PlatformError> {
        self.run_script(&key_script(&self.browser, key))
    }

    fn open_url(&self, url: &str) -> Result<(), PlatformError> {
        self.run_script(&open_script(&self.browser, url))
    }
}

/// Fallback for hosts without an automation mechanism; every call fails.
pub struct UnsupportedBackend {
    os: String,
}

impl UnsupportedBackend {
    pub fn new() -> Self {
        Self::for_os(std::env::consts::OS)
    }

    pub fn for_os(os: impl Into<String>) -> Self {
        Self { os: os.into() }
    }
}

impl Default for UnsupportedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomationBackend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn press_key(&self, _key: MediaKey) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported(self.os.clone()))
    }

    fn open_url(&self, _url: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported(self.os.clone()))
    }
}

/// Picks the backend for the host this process runs on.
pub fn detect_backend(browser: &str) -> Arc<dyn AutomationBackend> {
    if cfg!(target_os = "macos") {
        Arc::new(MacOsBackend::new(browser))
    } else {
        Arc::new(UnsupportedBackend::new())
    }
}

fn key_script(browser: &str, key: MediaKey) -> String {
    format!(
        r#"tell application "{browser}"
    activate
    delay 0.1
    tell application "System Events"
        {stroke}
    end tell
end tell"#,
        browser = escape_applescript(browser),
        stroke = key.stroke(),
    )
}

fn open_script(browser: &str, url: &str) -> String {
    format!(
        r#"tell application "{browser}"
    activate
    open location "{url}"
end tell"#,
        browser = escape_applescript(browser),
        url = escape_applescript(url),
    )
}

/// Escapes text for use inside an AppleScript string literal.
fn escape_applescript(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_and_pause_share_the_toggle_key() {
        let script = key_script("Google Chrome", MediaKey::Toggle);
        assert!(script.contains(r#"tell application "Google Chrome""#));
        assert!(script.contains(r#"keystroke "k""#));
    }

    #[test]
    fn volume_keys_use_arrow_key_codes() {
        assert!(key_script("Safari", MediaKey::VolumeUp).contains("key code 126"));
        assert!(key_script("Safari", MediaKey::VolumeDown).contains("key code 125"));
    }

    #[test]
    fn urls_cannot_break_out_of_the_string_literal() {
        let script = open_script("Google Chrome", r#"https://x.test/"; do shell script "rm"#);
        assert!(script.contains(r#"open location "https://x.test/\"; do shell script \"rm""#));
    }

    #[test]
    fn unsupported_backend_names_the_os() {
        let backend = UnsupportedBackend::for_os("plan9");
        let err = backend.press_key(MediaKey::Next).unwrap_err();
        assert_eq!(err.to_string(), "unsupported operating system: plan9");
        assert!(backend.open_url("https://youtu.be/abc").is_err());
    }
}
