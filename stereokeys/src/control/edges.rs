//! Edge detection over per-tick pressed-key sets.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::event::KeyEvent;
use crate::keyboard::{KeyId, PressingKeys};

/// When to emit key-down events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgePolicy {
    /// Down for newly pressed keys only.
    #[default]
    EdgeOnly,
    /// Down for every pressed key, every tick.
    RepeatDown,
}

impl EdgePolicy {
    pub fn from_repeat_flag(repeat: bool) -> Self {
        if repeat {
            EdgePolicy::RepeatDown
        } else {
            EdgePolicy::EdgeOnly
        }
    }
}

impl fmt::Display for EdgePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgePolicy::EdgeOnly => f.write_str("edge-only"),
            EdgePolicy::RepeatDown => f.write_str("repeat-down"),
        }
    }
}

impl FromStr for EdgePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edge-only" => Ok(EdgePolicy::EdgeOnly),
            "repeat-down" => Ok(EdgePolicy::RepeatDown),
            other => Err(format!("unknown edge policy '{}'", other)),
        }
    }
}

/// Turns a sequence of pressed-key sets into down/up events.
///
/// Events for one tick are ordered downs first, then ups, each ascending by
/// key id.
#[derive(Debug, Clone, Default)]
pub struct EdgeDetector {
    policy: EdgePolicy,
    previous: BTreeSet<KeyId>,
}

impl EdgeDetector {
    pub fn new(policy: EdgePolicy) -> Self {
        Self {
            policy,
            previous: BTreeSet::new(),
        }
    }

    pub fn policy(&self) -> EdgePolicy {
        self.policy
    }

    /// Keys pressed during the previous tick.
    pub fn previous(&self) -> &BTreeSet<KeyId> {
        &self.previous
    }

    /// Diff this tick's set against the previous one and remember it.
    pub fn update(&mut self, current: &PressingKeys) -> Vec<KeyEvent> {
        let current: BTreeSet<KeyId> = current.iter().copied().collect();

        let downs = current
            .iter()
            .filter(|key| self.policy == EdgePolicy::RepeatDown || !self.previous.contains(*key))
            .map(|&key| KeyEvent::down(key));
        let ups = self
            .previous
            .difference(&current)
            .map(|&key| KeyEvent::up(key));
        let events: Vec<KeyEvent> = downs.chain(ups).collect();

        self.previous = current;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: KeyId = 4;
    const B: KeyId = 5;

    fn set(keys: &[KeyId]) -> PressingKeys {
        keys.iter().copied().collect()
    }

    fn run(policy: EdgePolicy, ticks: &[&[KeyId]]) -> Vec<Vec<KeyEvent>> {
        let mut detector = EdgeDetector::new(policy);
        ticks.iter().map(|keys| detector.update(&set(keys))).collect()
    }

    #[test]
    fn test_edge_only_sequence() {
        let events = run(EdgePolicy::EdgeOnly, &[&[], &[A], &[A, B], &[B]]);
        assert_eq!(
            events,
            vec![
                vec![],
                vec![KeyEvent::down(A)],
                vec![KeyEvent::down(B)],
                vec![KeyEvent::up(A)],
            ]
        );
    }

    #[test]
    fn test_repeat_down_sequence() {
        let events = run(EdgePolicy::RepeatDown, &[&[], &[A], &[A, B], &[B]]);
        assert_eq!(
            events,
            vec![
                vec![],
                vec![KeyEvent::down(A)],
                vec![KeyEvent::down(A), KeyEvent::down(B)],
                vec![KeyEvent::down(B), KeyEvent::up(A)],
            ]
        );
    }

    #[test]
    fn test_release_everything() {
        let events = run(EdgePolicy::EdgeOnly, &[&[B, A], &[]]);
        assert_eq!(events[1], vec![KeyEvent::up(A), KeyEvent::up(B)]);
    }

    #[test]
    fn test_previous_tracks_last_tick() {
        let mut detector = EdgeDetector::new(EdgePolicy::EdgeOnly);
        detector.update(&set(&[A, B]));
        assert_eq!(detector.previous().iter().copied().collect::<Vec<_>>(), vec![A, B]);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("edge-only".parse::<EdgePolicy>(), Ok(EdgePolicy::EdgeOnly));
        assert_eq!("repeat-down".parse::<EdgePolicy>(), Ok(EdgePolicy::RepeatDown));
        assert!("sometimes".parse::<EdgePolicy>().is_err());
        assert_eq!(EdgePolicy::from_repeat_flag(true), EdgePolicy::RepeatDown);
    }
}
