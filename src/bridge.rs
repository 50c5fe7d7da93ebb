//! Lookup bridge between the engine and the page-context trust oracle.
//!
//! Both sides share one message bus that also carries unrelated traffic, so
//! every message is tagged with a `type` and correlated by `requestId`.

use crate::trust::TrustRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const REQUEST_TYPE: &str = "antiimp:getUserInfo";
pub const RESPONSE_TYPE: &str = "antiimp:userInfo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    #[serde(rename = "antiimp:getUserInfo", rename_all = "camelCase")]
    GetUserInfo {
        request_id: String,
        screen_names: Vec<String>,
    },
    #[serde(rename = "antiimp:userInfo", rename_all = "camelCase")]
    UserInfo {
        request_id: String,
        #[serde(default)]
        user_info: HashMap<String, TrustRecord>,
    },
}

impl BridgeMessage {
    /// Decodes a bus message. Messages of other types, or ours with a broken
    /// shape, yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let kind = value.get("type")?.as_str()?;
        if kind != REQUEST_TYPE && kind != RESPONSE_TYPE {
            return None;
        }
        match serde_json::from_value(value.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                log::debug!("Dropping malformed {kind} message: {e}");
                None
            }
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).context("Failed to encode bridge message")
    }

    pub fn request_id(&self) -> &str {
        match self {
            BridgeMessage::GetUserInfo { request_id, .. } => request_id,
            BridgeMessage::UserInfo { request_id, .. } => request_id,
        }
    }
}

/// An issued lookup waiting for its reply.
#[derive(Debug, Clone)]
pub struct PendingLookup {
    pub request_id: String,
    pub screen_names: Vec<String>,
    pub issued_at: Instant,
}

/// Client side: issues batched requests and matches replies at most once.
#[derive(Debug)]
pub struct LookupBridge {
    pending: HashMap<String, PendingLookup>,
    timeout: Duration,
    batch_cap: usize,
    sequence: u64,
}

impl LookupBridge {
    pub fn new(timeout: Duration, batch_cap: usize) -> Self {
        Self {
            pending: HashMap::new(),
            timeout,
            batch_cap,
            sequence: 0,
        }
    }

    /// Registers a lookup for up to `batch_cap` names and returns the request
    /// to post. Names past the cap are left for a later scan.
    pub fn issue(&mut self, mut screen_names: Vec<String>, now: Instant) -> Option<BridgeMessage> {
        if screen_names.is_empty() {
            return None;
        }
        if screen_names.len() > self.batch_cap {
            log::debug!(
                "Lookup batch capped at {} of {} names",
                self.batch_cap,
                screen_names.len()
            );
            screen_names.truncate(self.batch_cap);
        }

        let request_id = self.next_request_id();
        log::debug!(
            "Issuing lookup {request_id} for {} names",
            screen_names.len()
        );
        self.pending.insert(
            request_id.clone(),
            PendingLookup {
                request_id: request_id.clone(),
                screen_names: screen_names.clone(),
                issued_at: now,
            },
        );

        Some(BridgeMessage::GetUserInfo {
            request_id,
            screen_names,
        })
    }

    fn next_request_id(&mut self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        loop {
            self.sequence += 1;
            let id = format!("{millis}:{}", self.sequence);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Claims the pending lookup for `request_id`. A second reply, an unknown
    /// id, or a reply after the timeout all yield `None`.
    pub fn resolve(&mut self, request_id: &str, now: Instant) -> Option<PendingLookup> {
        let pending = self.pending.remove(request_id)?;
        if now.duration_since(pending.issued_at) >= self.timeout {
            log::debug!("Lookup {request_id} answered after timeout, ignoring");
            return None;
        }
        Some(pending)
    }

    /// Drops lookups that have waited the full timeout. An entry expires at
    /// exactly [`next_expiry`](Self::next_expiry).
    pub fn expire(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let before = self.pending.len();
        self.pending
            .retain(|_, pending| now.duration_since(pending.issued_at) < timeout);
        let expired = before - self.pending.len();
        if expired > 0 {
            log::debug!("Abandoned {expired} unanswered lookups");
        }
        expired
    }

    /// When the oldest pending lookup times out.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|pending| pending.issued_at + self.timeout)
            .min()
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

/// Both ends of the bus as seen from the oracle side.
pub struct BridgePort {
    /// Requests posted by the engine.
    pub requests: mpsc::UnboundedReceiver<Value>,
    /// Replies back to the engine.
    pub replies: mpsc::UnboundedSender<Value>,
}

/// Oracle backed by a fixed table of records.
///
/// Matches requested names exactly first, then case-insensitively, and only
/// answers with names it knows; an empty answer is a normal outcome.
#[derive(Clone, Default)]
pub struct StaticOracle {
    records: Arc<Mutex<HashMap<String, TrustRecord>>>,
    latency: Duration,
    served: Arc<Mutex<usize>>,
}

impl StaticOracle {
    pub fn new(records: HashMap<String, TrustRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            latency: Duration::ZERO,
            served: Arc::new(Mutex::new(0)),
        }
    }

    /// Loads a `{ screenName: TrustRecord }` JSON map.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read user info: {}", path.as_ref().display()))?;
        let records: HashMap<String, TrustRecord> =
            serde_json::from_str(&content).context("Failed to parse user info map")?;
        Ok(Self::new(records))
    }

    /// Delay before each reply.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Adds or replaces a record; visible to requests answered afterwards.
    pub fn insert(&self, screen_name: &str, record: TrustRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(screen_name.to_string(), record);
    }

    /// Number of requests answered so far.
    pub fn served(&self) -> usize {
        *self.served.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn answer(&self, message: &BridgeMessage) -> Option<BridgeMessage> {
        let BridgeMessage::GetUserInfo {
            request_id,
            screen_names,
        } = message
        else {
            return None;
        };

        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let lower: HashMap<String, &TrustRecord> = records
            .iter()
            .map(|(name, record)| (name.to_lowercase(), record))
            .collect();

        let mut user_info = HashMap::new();
        for name in screen_names.iter().filter(|name| !name.is_empty()) {
            let found = records
                .get(name)
                .or_else(|| lower.get(&name.to_lowercase()).copied());
            if let Some(record) = found {
                user_info.insert(name.clone(), record.clone());
            }
        }

        *self.served.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Some(BridgeMessage::UserInfo {
            request_id: request_id.clone(),
            user_info,
        })
    }

    /// Serves requests from `port` until the engine side hangs up.
    pub fn spawn(self, mut port: BridgePort) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(value) = port.requests.recv().await {
                let Some(request) = BridgeMessage::from_value(&value) else {
                    continue;
                };
                let Some(reply) = self.answer(&request) else {
                    continue;
                };
                if !self.latency.is_zero() {
                    tokio::time::sleep(self.latency).await;
                }
                match reply.to_value() {
                    Ok(value) => {
                        if port.replies.send(value).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("Oracle failed to encode reply: {e}"),
                }
            }
        })
    }
}
