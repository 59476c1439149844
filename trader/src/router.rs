//! `EventRouter`: extracts a market key from an opaque feed payload and dispatches it to the
//! registered per-market queue, without fully parsing the payload unless it has to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use tradebot_core::{Market, RouterError};

use crate::queues::MarketDataQueue;

#[derive(Debug, Default)]
pub struct RouterStats {
    pub fast_path_success: AtomicU64,
    pub fallback_used: AtomicU64,
    pub parse_failures: AtomicU64,
    pub conflict_detected: AtomicU64,
    pub unknown_market: AtomicU64,
    pub total_routed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStatsSnapshot {
    pub fast_path_success: u64,
    pub fallback_used: u64,
    pub parse_failures: u64,
    pub conflict_detected: u64,
    pub unknown_market: u64,
    pub total_routed: u64,
}

impl RouterStats {
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            fast_path_success: self.fast_path_success.load(Ordering::Relaxed),
            fallback_used: self.fallback_used.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            conflict_detected: self.conflict_detected.load(Ordering::Relaxed),
            unknown_market: self.unknown_market.load(Ordering::Relaxed),
            total_routed: self.total_routed.load(Ordering::Relaxed),
        }
    }
}

/// Tries to pull a clean string value for `key` out of `text` without a full JSON parse.
///
/// Returns `None` if the key is not present at all; `Some(None)` if it is present but its
/// value contains a backslash escape (the caller should abstain to the slow path rather than
/// risk misreading it); `Some(Some(value))` otherwise.
fn lexical_field(text: &str, key: &str) -> Option<Option<String>> {
    let needle = format!("\"{key}\"");
    let key_pos = text.find(&needle)?;
    let after_key = &text[key_pos + needle.len()..];
    let colon_pos = after_key.find(':')?;
    let after_colon = after_key[colon_pos + 1..].trim_start();
    if !after_colon.starts_with('"') {
        return None;
    }
    let body = &after_colon[1..];
    for (i, ch) in body.char_indices() {
        match ch {
            '\\' => return Some(None),
            '"' => return Some(Some(body[..i].to_string())),
            _ => {}
        }
    }
    None
}

/// Outer `None` means the fast path must abstain (an escape was seen); inner options report
/// whether each field was present.
fn fast_extract(text: &str) -> Option<(Option<String>, Option<String>)> {
    let code = match lexical_field(text, "code") {
        Some(None) => return None,
        Some(Some(v)) => Some(v),
        None => None,
    };
    let market = match lexical_field(text, "market") {
        Some(None) => return None,
        Some(Some(v)) => Some(v),
        None => None,
    };
    Some((code, market))
}

fn slow_extract(text: &str) -> Result<(Option<String>, Option<String>), RouterError> {
    let json: serde_json::Value = serde_json::from_str(text).map_err(|_| RouterError::ParseFailure)?;
    let code = json.get("code").and_then(|v| v.as_str()).map(String::from);
    let market = json.get("market").and_then(|v| v.as_str()).map(String::from);
    Ok((code, market))
}

fn resolve_market(code: Option<String>, market: Option<String>) -> Result<Market, RouterError> {
    match (code, market) {
        (Some(c), Some(m)) => {
            if c == m {
                Ok(c)
            } else {
                Err(RouterError::Conflict)
            }
        }
        (Some(c), None) => Ok(c),
        (None, Some(m)) => Ok(m),
        (None, None) => Err(RouterError::ParseFailure),
    }
}

enum RouteKind {
    MarketData,
    PrivateOrder,
}

/// Demultiplexes the single feed stream into per-market queues. Registration happens once,
/// before workers start; the maps are read-only thereafter (routing only takes `&self`).
pub struct EventRouter {
    market_data_queues: HashMap<Market, Arc<MarketDataQueue>>,
    private_order_senders: HashMap<Market, Sender<String>>,
    stats: RouterStats,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("markets", &self.market_data_queues.len())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            market_data_queues: HashMap::new(),
            private_order_senders: HashMap::new(),
            stats: RouterStats::default(),
        }
    }

    pub fn register_market_data(&mut self, market: Market, queue: Arc<MarketDataQueue>) {
        self.market_data_queues.insert(market, queue);
    }

    pub fn register_private_order(&mut self, market: Market, sender: Sender<String>) {
        self.private_order_senders.insert(market, sender);
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn route_market_data(&self, text: &str) -> bool {
        self.route(text, RouteKind::MarketData)
    }

    pub fn route_my_order(&self, text: &str) -> bool {
        self.route(text, RouteKind::PrivateOrder)
    }

    fn route(&self, text: &str, kind: RouteKind) -> bool {
        let (result, used_fast_path) = match fast_extract(text) {
            Some((code, market)) => (resolve_market(code, market), true),
            None => {
                self.stats.fallback_used.fetch_add(1, Ordering::Relaxed);
                let extracted = slow_extract(text).and_then(|(c, m)| resolve_market(c, m));
                (extracted, false)
            }
        };

        let market = match result {
            Ok(m) => {
                if used_fast_path {
                    self.stats.fast_path_success.fetch_add(1, Ordering::Relaxed);
                }
                m
            }
            Err(RouterError::Conflict) => {
                self.stats.conflict_detected.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            Err(_) => {
                self.stats.parse_failures.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        let pushed = match kind {
            RouteKind::MarketData => match self.market_data_queues.get(&market) {
                Some(queue) => {
                    queue.push(text.to_string());
                    true
                }
                None => false,
            },
            RouteKind::PrivateOrder => match self.private_order_senders.get(&market) {
                Some(sender) => sender.send(text.to_string()).is_ok(),
                None => false,
            },
        };

        if !pushed {
            self.stats.unknown_market.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.stats.total_routed.fetch_add(1, Ordering::Relaxed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queues::private_order_channel;
    use std::time::Duration;

    fn router_with_market(market: &str, capacity: usize) -> (EventRouter, Arc<MarketDataQueue>) {
        let mut router = EventRouter::new();
        let queue = Arc::new(MarketDataQueue::new(capacity));
        router.register_market_data(market.to_string(), Arc::clone(&queue));
        (router, queue)
    }

    #[test]
    fn fast_path_routes_on_code_field() {
        let (router, queue) = router_with_market("KRW-BTC", 5000);
        assert!(router.route_market_data(r#"{"code":"KRW-BTC","type":"candle.1m"}"#));
        assert_eq!(router.stats().fast_path_success, 1);
        assert_eq!(router.stats().total_routed, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn conflicting_code_and_market_fields_fail_without_push() {
        let (router, queue) = router_with_market("KRW-BTC", 5000);
        assert!(!router.route_market_data(r#"{"code":"KRW-BTC","market":"KRW-ETH"}"#));
        assert_eq!(router.stats().conflict_detected, 1);
        assert_eq!(router.stats().parse_failures, 0);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn unknown_market_is_counted_and_dropped() {
        let (router, _queue) = router_with_market("KRW-BTC", 5000);
        assert!(!router.route_market_data(r#"{"code":"KRW-ETH"}"#));
        assert_eq!(router.stats().unknown_market, 1);
    }

    #[test]
    fn escaped_value_falls_back_to_full_parse() {
        let (router, queue) = router_with_market("KRW-BTC", 5000);
        assert!(router.route_market_data(r#"{"code":"KRW-BTC","note":"a\\b"}"#));
        assert_eq!(router.stats().fallback_used, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn private_order_routes_through_unbounded_queue() {
        let mut router = EventRouter::new();
        let (tx, rx) = private_order_channel();
        router.register_private_order("KRW-BTC".into(), tx);
        assert!(router.route_my_order(r#"{"market":"KRW-BTC"}"#));
        assert_eq!(rx.pop_timeout(Duration::from_millis(0)).is_some(), true);
    }
}
