use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    automation::{AutomationBackend, MediaKey},
    command::{Action, Command},
    error::ExecutionError,
};

/// Maps decoded commands onto automation calls.
///
/// Holds no state between calls, so clones are cheap and can be handed to
/// every connection.
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn AutomationBackend>,
    open_enabled: bool,
}

impl Executor {
    pub fn new(backend: Arc<dyn AutomationBackend>) -> Self {
        Self {
            backend,
            open_enabled: true,
        }
    }

    /// When disabled, `open` is treated like any other unrecognized action.
    pub fn with_open_enabled(mut self, enabled: bool) -> Self {
        self.open_enabled = enabled;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Performs the command synchronously.
    ///
    /// Unrecognized actions are accepted and do nothing.
    pub fn execute(&self, command: &Command) -> Result<(), ExecutionError> {
        let result = match command.action() {
            Some(Action::Play | Action::Pause) => self.press(MediaKey::Toggle),
            Some(Action::Next) => self.press(MediaKey::Next),
            Some(Action::Previous) => self.press(MediaKey::Previous),
            Some(Action::VolumeUp) => self.press(MediaKey::VolumeUp),
            Some(Action::VolumeDown) => self.press(MediaKey::VolumeDown),
            Some(Action::Open) if self.open_enabled => self.open(&command.value),
            Some(Action::Open) | None => {
                debug!(action = %command.action, "no matching action");
                return Ok(());
            }
        };

        match &result {
            Ok(()) => info!(action = %command.action, "executed command"),
            Err(err) => warn!(action = %command.action, error = %err, "command failed"),
        }
        result
    }

    /// Runs [`Executor::execute`] on the blocking pool and waits for it.
    pub async fn run(&self, command: Command) -> Result<(), ExecutionError> {
        let executor = self.clone();
        match tokio::task::spawn_blocking(move || executor.execute(&command)).await {
            Ok(result) => result,
            Err(err) => Err(ExecutionError::AutomationFailed(format!(
                "automation task failed: {err}"
            ))),
        }
    }

    fn press(&self, key: MediaKey) -> Result<(), ExecutionError> {
        self.backend.press_key(key).map_err(ExecutionError::from)
    }

    fn open(&self, url: &str) -> Result<(), ExecutionError> {
        if url.is_empty() {
            return Err(ExecutionError::MissingArgument);
        }
        self.backend.open_url(url).map_err(ExecutionError::from)
    }
}
