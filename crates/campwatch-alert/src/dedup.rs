use campwatch_common::types::{AlertLog, AlertLogEntry, CandidateAlert};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// What happens to one message key when this cycle is merged into the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Fired, and either new or outside its cool-down: notify and stamp `now`.
    Send,
    /// Fired inside its cool-down: keep the previous timestamp.
    Suppress { remaining: Duration },
    /// Did not fire this cycle: keep the entry as it was.
    CarryForward,
}

/// Per-key decision over the union of old log keys and fired messages.
pub fn decide(
    previous: Option<&AlertLogEntry>,
    fired: bool,
    now: DateTime<Utc>,
    cool_down: Duration,
) -> Decision {
    match (previous, fired) {
        (_, false) => Decision::CarryForward,
        (None, true) => Decision::Send,
        (Some(prev), true) => {
            let elapsed = now - prev.last_fired_at;
            if elapsed >= cool_down {
                Decision::Send
            } else {
                Decision::Suppress {
                    remaining: cool_down - elapsed,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suppressed {
    pub message: String,
    pub last_fired_at: DateTime<Utc>,
    pub remaining: Duration,
}

/// Result of merging this cycle's candidates into the alert log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Messages to notify, in candidate order.
    pub to_send: Vec<String>,
    pub suppressed: Vec<Suppressed>,
    /// The log to persist and hand to the next cycle.
    pub log: AlertLog,
}

/// Merges candidates into the log by message key.
///
/// Every key in `log` or `candidates` is visited exactly once. A candidate
/// ends up in `to_send` or `suppressed`, never neither. `last_fired_at` only
/// moves on an actual send, so the cool-down counts from the last
/// notification rather than the last time the condition held. A negative
/// `cool_down` is treated as zero, so `last_fired_at` never moves backwards.
pub fn reconcile(
    candidates: &[CandidateAlert],
    log: AlertLog,
    now: DateTime<Utc>,
    cool_down: Duration,
) -> Reconciliation {
    let cool_down = cool_down.max(Duration::zero());
    let fired: BTreeSet<&str> = candidates.iter().map(|c| c.message.as_str()).collect();
    let keys: BTreeSet<&str> = log.messages().chain(fired.iter().copied()).collect();

    let mut updated = AlertLog::new();
    let mut decisions = BTreeMap::new();

    for key in keys {
        let previous = log.get(key);
        let decision = decide(previous, fired.contains(key), now, cool_down);
        match decision {
            Decision::Send => {
                updated.insert(AlertLogEntry {
                    message: key.to_string(),
                    last_fired_at: now,
                });
            }
            Decision::Suppress { .. } | Decision::CarryForward => {
                if let Some(prev) = previous {
                    updated.insert(prev.clone());
                }
            }
        }
        decisions.insert(key, (decision, previous.map(|p| p.last_fired_at)));
    }

    let mut to_send = Vec::new();
    let mut suppressed = Vec::new();
    let mut seen = BTreeSet::new();

    for candidate in candidates {
        let message = candidate.message.as_str();
        if !seen.insert(message) {
            continue;
        }
        match decisions.get(message) {
            Some((Decision::Send, _)) => to_send.push(message.to_string()),
            Some((Decision::Suppress { remaining }, Some(last_fired_at))) => {
                tracing::debug!(
                    rule = %candidate.rule_name,
                    remaining_secs = remaining.num_seconds(),
                    "Alert suppressed (cool-down active)"
                );
                suppressed.push(Suppressed {
                    message: message.to_string(),
                    last_fired_at: *last_fired_at,
                    remaining: *remaining,
                });
            }
            _ => {}
        }
    }

    Reconciliation {
        to_send,
        suppressed,
        log: updated,
    }
}

/// Drops entries last sent more than `retention` before `now`. Returns the
/// number removed.
pub fn prune_stale(log: &mut AlertLog, now: DateTime<Utc>, retention: Duration) -> usize {
    let before = log.len();
    log.retain(|entry| now - entry.last_fired_at <= retention);
    before - log.len()
}
