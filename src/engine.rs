//! Scan orchestration: one engine instance per page view.

use crate::bridge::{BridgeMessage, LookupBridge};
use crate::config::{ConfigChange, EngineSettings, FilterConfig};
use crate::cooldown::CooldownTable;
use crate::dom::{query_all, Dom};
use crate::identity::{self, TIMELINE_CELL};
use crate::page::PageLocation;
use crate::policy::{self, Post, Visibility, HIDDEN_REASON};
use crate::retry::RetryScheduler;
use crate::trust::{TrustCache, TrustRecord};
use crate::visibility;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub scans: u64,
    pub lookups_issued: u64,
    pub lookups_resolved: u64,
    pub lookups_expired: u64,
    pub retries_scheduled: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostDecision {
    pub position: usize,
    pub author_id: Option<String>,
    pub is_verified: bool,
    pub visibility: Visibility,
}

/// What a single scan saw and did.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// False when the feature was off or the page did not qualify.
    pub active: bool,
    pub candidates: usize,
    pub shown: usize,
    pub deferred: usize,
    pub hidden: usize,
    /// Containers un-hidden by the fail-open sweep.
    pub revealed: usize,
    /// Authors included in this scan's lookup.
    pub requested: usize,
    pub root_author: Option<String>,
    /// Lookup to post to the oracle, if any author needed one.
    pub lookup: Option<BridgeMessage>,
    pub decisions: Vec<PostDecision>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Not a reply we are waiting for.
    Ignored,
    Resolved { merged: usize },
    /// The oracle knew none of the requested names.
    Empty,
}

pub struct FilterEngine {
    config: FilterConfig,
    settings: EngineSettings,
    location: PageLocation,
    trust: TrustCache,
    cooldown: CooldownTable,
    bridge: LookupBridge,
    retry: RetryScheduler,
    stats: EngineStats,
    last_report: Option<ScanReport>,
}

impl FilterEngine {
    pub fn new(config: FilterConfig, settings: EngineSettings) -> Self {
        FilterEngine {
            trust: TrustCache::new(),
            cooldown: CooldownTable::new(settings.fetch_cooldown, settings.cooldown_capacity),
            bridge: LookupBridge::new(settings.lookup_timeout, settings.lookup_batch_cap),
            retry: RetryScheduler::new(&settings),
            location: PageLocation::default(),
            stats: EngineStats::default(),
            last_report: None,
            config,
            settings,
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn set_config(&mut self, config: FilterConfig) {
        self.config = config;
    }

    pub fn apply_config_changes(&mut self, changes: &[ConfigChange]) {
        self.config.apply_changes(changes);
        log::debug!("Configuration updated: {:?}", self.config);
    }

    pub fn navigate(&mut self, path: &str) {
        self.location = PageLocation::new(path);
        log::debug!("Navigated to {}", self.location.path());
    }

    pub fn location(&self) -> &PageLocation {
        &self.location
    }

    pub fn trust_cache(&self) -> &TrustCache {
        &self.trust
    }

    /// Feeds trust data learned outside the bridge (hover cards, profile pages).
    pub fn record_trust(&mut self, author_id: &str, partial: &TrustRecord) {
        self.trust.merge(author_id, partial);
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn last_report(&self) -> Option<&ScanReport> {
        self.last_report.as_ref()
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry.attempts()
    }

    /// Feature on and the current page is a conversation or quotes view.
    pub fn is_active(&self) -> bool {
        self.config.is_active() && self.location.is_conversation_view()
    }

    /// Outer post articles of every timeline cell, in document order.
    pub fn candidates<D: Dom>(dom: &D) -> Vec<D::Node> {
        let root = dom.document_element();
        let mut seen = HashSet::new();
        query_all(dom, root, &TIMELINE_CELL)
            .into_iter()
            .filter_map(|cell| identity::outer_post_article(dom, cell))
            .filter(|article| seen.insert(*article))
            .collect()
    }

    /// Classifies every candidate, requests missing trust data and applies
    /// the resulting visibility to the document.
    pub fn scan<D: Dom>(&mut self, dom: &mut D, now: Instant) -> ScanReport {
        self.stats.scans += 1;

        if !self.is_active() {
            self.retry.reset();
            let revealed = visibility::reveal_all(dom);
            if revealed > 0 {
                log::debug!("Filtering inactive, revealed {revealed} hidden posts");
            }
            return self.finish_scan(ScanReport {
                revealed,
                ..Default::default()
            });
        }

        if !self.config.show_if_follower_count_at_least_enabled {
            self.retry.reset();
        }

        let posts: Vec<Post<D::Node>> = Self::candidates(dom)
            .into_iter()
            .enumerate()
            .map(|(position, node)| Post {
                node,
                position,
                author_id: identity::author_id(dom, node),
                is_verified: identity::is_verified(dom, node),
            })
            .collect();

        let mut report = ScanReport {
            active: true,
            candidates: posts.len(),
            ..Default::default()
        };
        if posts.is_empty() {
            return self.finish_scan(report);
        }

        report.lookup = self.request_missing(&posts, now);
        if let Some(BridgeMessage::GetUserInfo { screen_names, .. }) = &report.lookup {
            report.requested = screen_names.len();
        }

        let root_author = posts
            .first()
            .and_then(|root| root.author_id.clone())
            .or_else(|| self.location.status_author());

        for post in &posts {
            let decision = policy::decide(post, &self.trust, &self.config, root_author.as_deref());
            match decision {
                Visibility::Show => {
                    visibility::show_post(dom, post.node);
                    report.shown += 1;
                }
                Visibility::Defer => {
                    visibility::show_post(dom, post.node);
                    report.deferred += 1;
                }
                Visibility::Hide => {
                    visibility::hide_post(dom, post.node, HIDDEN_REASON);
                    report.hidden += 1;
                }
            }
            report.decisions.push(PostDecision {
                position: post.position,
                author_id: post.author_id.clone(),
                is_verified: post.is_verified,
                visibility: decision,
            });
        }
        report.root_author = root_author;

        log::debug!(
            "Scan: {} candidates, {} shown, {} deferred, {} hidden, {} requested",
            report.candidates,
            report.shown,
            report.deferred,
            report.hidden,
            report.requested
        );
        self.finish_scan(report)
    }

    fn finish_scan(&mut self, report: ScanReport) -> ScanReport {
        self.last_report = Some(report.clone());
        report
    }

    /// Collects replies whose author still lacks a follower count and is not
    /// cooling down, then issues one capped batch for them.
    fn request_missing<N>(&mut self, posts: &[Post<N>], now: Instant) -> Option<BridgeMessage> {
        let mut seen = HashSet::new();
        let mut wanted: Vec<String> = posts
            .iter()
            .skip(1)
            .filter_map(|post| post.author_id.as_deref())
            .filter(|author| seen.insert(*author))
            .filter(|author| self.trust.needs_lookup(author))
            .filter(|author| !self.cooldown.is_cooling(author, now))
            .map(str::to_string)
            .collect();

        // Names past the cap stay out of cooldown so the next scan picks them up.
        wanted.truncate(self.settings.lookup_batch_cap);
        for author in &wanted {
            self.cooldown.try_acquire(author, now);
        }

        let request = self.bridge.issue(wanted, now);
        if request.is_some() {
            self.stats.lookups_issued += 1;
        }
        request
    }

    /// Applies a message from the bridge bus. Only replies to pending lookups
    /// are acted on.
    pub fn handle_bridge_message(&mut self, value: &Value, now: Instant) -> BridgeOutcome {
        let Some(BridgeMessage::UserInfo {
            request_id,
            user_info,
        }) = BridgeMessage::from_value(value)
        else {
            return BridgeOutcome::Ignored;
        };

        let Some(pending) = self.bridge.resolve(&request_id, now) else {
            return BridgeOutcome::Ignored;
        };
        self.stats.lookups_resolved += 1;

        for (screen_name, record) in &user_info {
            self.trust.merge(screen_name, record);
        }
        log::debug!(
            "Lookup {request_id} resolved {} of {} names",
            user_info.len(),
            pending.screen_names.len()
        );

        if user_info.is_empty() {
            BridgeOutcome::Empty
        } else {
            BridgeOutcome::Resolved {
                merged: user_info.len(),
            }
        }
    }

    pub fn expire_lookups(&mut self, now: Instant) -> usize {
        let expired = self.bridge.expire(now);
        self.stats.lookups_expired += expired as u64;
        expired
    }

    pub fn next_lookup_expiry(&self) -> Option<Instant> {
        self.bridge.next_expiry()
    }

    pub fn lookups_in_flight(&self) -> usize {
        self.bridge.in_flight()
    }

    /// Next retry delay after an empty oracle answer, while follower counts
    /// still matter on this page.
    pub fn schedule_retry(&mut self) -> Option<Duration> {
        if !self.config.show_if_follower_count_at_least_enabled
            || !self.location.is_conversation_view()
        {
            self.retry.reset();
            return None;
        }
        let delay = self.retry.next_delay()?;
        self.stats.retries_scheduled += 1;
        log::debug!(
            "Retry {} scheduled in {}ms",
            self.retry.attempts(),
            delay.as_millis()
        );
        Some(delay)
    }
}
