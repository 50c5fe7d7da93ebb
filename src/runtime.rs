//! Event loop driving a [`FilterEngine`] against a live document.
//!
//! Page events and oracle replies arrive on channels; scans run on the
//! scheduler's clock and never wait on outstanding lookups.

use crate::bridge::{BridgeMessage, BridgePort};
use crate::config::ConfigChange;
use crate::dom::Dom;
use crate::engine::{BridgeOutcome, FilterEngine};
use crate::scheduler::ScanScheduler;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// Nodes were added under the document root.
    DomMutated,
    ConfigChanged(Vec<ConfigChange>),
    /// In-page navigation to a new path or URL.
    Navigated(String),
    Shutdown,
}

/// Host-side sender for page events.
#[derive(Clone)]
pub struct RuntimeHandle {
    events: mpsc::UnboundedSender<PageEvent>,
}

impl RuntimeHandle {
    pub fn dom_mutated(&self) {
        self.send(PageEvent::DomMutated);
    }

    pub fn navigate(&self, path: &str) {
        self.send(PageEvent::Navigated(path.to_string()));
    }

    pub fn config_changed(&self, changes: Vec<ConfigChange>) {
        self.send(PageEvent::ConfigChanged(changes));
    }

    pub fn shutdown(&self) {
        self.send(PageEvent::Shutdown);
    }

    fn send(&self, event: PageEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Filter runtime already stopped");
        }
    }
}

enum Step {
    Event(Option<PageEvent>),
    Reply(Option<Value>),
    Wake,
}

pub struct FilterRuntime<D> {
    engine: FilterEngine,
    dom: Arc<Mutex<D>>,
    scheduler: ScanScheduler,
    events: mpsc::UnboundedReceiver<PageEvent>,
    requests: mpsc::UnboundedSender<Value>,
    replies: mpsc::UnboundedReceiver<Value>,
    oracle_gone: bool,
    retry_due: Option<Instant>,
}

impl<D: Dom + Send + 'static> FilterRuntime<D> {
    /// Wires the runtime up. The returned port is the oracle's end of the
    /// bridge bus.
    pub fn new(engine: FilterEngine, dom: Arc<Mutex<D>>) -> (Self, RuntimeHandle, BridgePort) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let runtime = FilterRuntime {
            scheduler: ScanScheduler::new(engine.settings().min_scan_spacing),
            engine,
            dom,
            events: event_rx,
            requests: request_tx,
            replies: reply_rx,
            oracle_gone: false,
            retry_due: None,
        };
        let port = BridgePort {
            requests: request_rx,
            replies: reply_tx,
        };
        (runtime, RuntimeHandle { events: event_tx }, port)
    }

    /// Runs until shutdown or until every handle is dropped, then hands the
    /// engine back.
    pub async fn run(mut self) -> FilterEngine {
        log::info!(
            "Filter runtime started on {}",
            self.engine.location().path()
        );
        self.scheduler.request(Instant::now());

        loop {
            self.tick(Instant::now());

            let wake = self.next_wake();
            let step = tokio::select! {
                event = self.events.recv() => Step::Event(event),
                reply = self.replies.recv(), if !self.oracle_gone => Step::Reply(reply),
                _ = sleep_until_opt(wake) => Step::Wake,
            };

            let now = Instant::now();
            match step {
                Step::Event(None) | Step::Event(Some(PageEvent::Shutdown)) => break,
                Step::Event(Some(event)) => self.on_event(event, now),
                Step::Reply(Some(reply)) => self.on_reply(&reply, now),
                Step::Reply(None) => {
                    log::warn!("Trust oracle disconnected");
                    self.oracle_gone = true;
                }
                Step::Wake => {}
            }
        }

        let stats = self.engine.stats();
        log::info!(
            "Filter runtime stopped after {} scans ({} lookups, {} resolved)",
            stats.scans,
            stats.lookups_issued,
            stats.lookups_resolved
        );
        self.engine
    }

    fn on_event(&mut self, event: PageEvent, now: Instant) {
        match event {
            PageEvent::DomMutated => self.scheduler.request(now),
            PageEvent::ConfigChanged(changes) => {
                self.engine.apply_config_changes(&changes);
                self.scheduler.request(now);
            }
            PageEvent::Navigated(path) => {
                self.engine.navigate(&path);
                self.retry_due = None;
                let settle = self.engine.settings().navigation_settle;
                self.scheduler.request_at(now + settle);
            }
            PageEvent::Shutdown => {}
        }
    }

    fn on_reply(&mut self, reply: &Value, now: Instant) {
        match self.engine.handle_bridge_message(reply, now) {
            BridgeOutcome::Ignored => {}
            BridgeOutcome::Resolved { .. } => self.scheduler.request(now),
            BridgeOutcome::Empty => {
                self.scheduler.request(now);
                if let Some(delay) = self.engine.schedule_retry() {
                    let due = now + delay;
                    self.retry_due = Some(self.retry_due.map_or(due, |d| d.min(due)));
                }
            }
        }
    }

    fn tick(&mut self, now: Instant) {
        self.engine.expire_lookups(now);

        if self.retry_due.is_some_and(|due| due <= now) {
            self.retry_due = None;
            self.scheduler.request(now);
        }

        if !self.scheduler.begin(now) {
            return;
        }
        let report = {
            let mut dom = self.dom.lock().unwrap_or_else(|e| e.into_inner());
            self.engine.scan(&mut *dom, now)
        };
        if let Some(lookup) = report.lookup {
            self.post(&lookup);
        }
        self.scheduler.finish();
    }

    fn post(&mut self, message: &BridgeMessage) {
        match message.to_value() {
            Ok(value) => {
                if self.requests.send(value).is_err() {
                    log::debug!(
                        "No oracle listening, lookup {} will time out",
                        message.request_id()
                    );
                }
            }
            Err(e) => log::warn!("Failed to post lookup: {e}"),
        }
    }

    fn next_wake(&self) -> Option<Instant> {
        [
            self.scheduler.due_at(),
            self.retry_due,
            self.engine.next_lookup_expiry(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
