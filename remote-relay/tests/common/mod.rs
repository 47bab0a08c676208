#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Result, anyhow};
use remote_relay::{
    automation::{AutomationBackend, MediaKey},
    error::PlatformError,
    executor::Executor,
    server::{Relay, RelayConfig, RelayOptions, Transport},
};
use tokio::{sync::oneshot, task::JoinHandle};

/// One observed automation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Key(MediaKey),
    Open(String),
}

/// Backend that records calls instead of touching the desktop.
#[derive(Default)]
pub struct RecordingBackend {
    events: Mutex<Vec<Event>>,
    failure: Option<String>,
}

impl RecordingBackend {
    pub fn failing(os: &str) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failure: Some(os.to_string()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: Event) -> Result<(), PlatformError> {
        if let Some(os) = &self.failure {
            return Err(PlatformError::Unsupported(os.clone()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

impl AutomationBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn press_key(&self, key: MediaKey) -> Result<(), PlatformError> {
        self.record(Event::Key(key))
    }

    fn open_url(&self, url: &str) -> Result<(), PlatformError> {
        self.record(Event::Open(url.to_string()))
    }
}

pub struct RunningRelay {
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl RunningRelay {
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        tokio::time::timeout(Duration::from_secs(5), self.task).await???;
        Ok(())
    }
}

pub async fn start_relay(
    transport: Transport,
    backend: Arc<RecordingBackend>,
    options: RelayOptions,
) -> Result<RunningRelay> {
    let config = RelayConfig {
        listen: "127.0.0.1:0".parse()?,
        transport,
        options,
    };
    let relay = Relay::bind(config, Executor::new(backend)).await?;
    let addr = relay.local_addr()?;

    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(relay.run_until(async move {
        let _ = shutdown_rx.await;
    }));

    Ok(RunningRelay {
        addr,
        shutdown,
        task,
    })
}

/// Polls until the backend has seen `count` calls.
pub async fn wait_for_events(backend: &RecordingBackend, count: usize) -> Result<Vec<Event>> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let events = backend.events();
        if events.len() >= count {
            return Ok(events);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow!("expected {count} events, saw {events:?}"));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
