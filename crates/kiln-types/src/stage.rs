//! The production stage machine.
//!
//! Stages form a fixed total order from [`Stage::Thrown`] to
//! [`Stage::GlazeFired`]. The machine is permissive: appending an event for
//! an earlier stage is allowed, and [`current_stage`] only looks at dates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::piece::StageEvent;

/// One of the seven production steps a piece passes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Thrown,
    Trimmed,
    LeatherHard,
    BoneDry,
    Bisque,
    Glazed,
    GlazeFired,
}

impl Stage {
    /// All stages, initial to terminal.
    pub const ALL: [Stage; 7] = [
        Self::Thrown,
        Self::Trimmed,
        Self::LeatherHard,
        Self::BoneDry,
        Self::Bisque,
        Self::Glazed,
        Self::GlazeFired,
    ];

    /// Position in the production order (0 = thrown).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The immediate successor, or `None` at the terminal stage.
    pub fn next(&self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    /// Machine name, as used in serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thrown => "thrown",
            Self::Trimmed => "trimmed",
            Self::LeatherHard => "leather-hard",
            Self::BoneDry => "bone-dry",
            Self::Bisque => "bisque",
            Self::Glazed => "glazed",
            Self::GlazeFired => "glaze-fired",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Thrown => "Thrown",
            Self::Trimmed => "Trimmed",
            Self::LeatherHard => "Leather Hard",
            Self::BoneDry => "Bone Dry",
            Self::Bisque => "Bisque",
            Self::Glazed => "Glazed",
            Self::GlazeFired => "Glaze Fired",
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Thrown
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| TypeError::UnknownStage(s.to_string()))
    }
}

/// The immediate successor of `current` in the fixed order.
pub fn next_stage(current: Stage) -> Option<Stage> {
    current.next()
}

/// Effective stage of a piece given its stage history.
///
/// Returns the stage of the event with the latest date. Events with equal
/// dates are resolved in favor of the one that appears later in `events`
/// (last inserted wins). An empty history yields [`Stage::Thrown`].
pub fn current_stage(events: &[StageEvent]) -> Stage {
    events
        .iter()
        .fold(None::<&StageEvent>, |latest, event| match latest {
            Some(l) if l.date > event.date => Some(l),
            _ => Some(event),
        })
        .map(|event| event.stage)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn event_at(stage: Stage, secs: i64) -> StageEvent {
        StageEvent::new(stage, Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(), None)
    }

    #[test]
    fn next_follows_fixed_order() {
        assert_eq!(next_stage(Stage::Thrown), Some(Stage::Trimmed));
        assert_eq!(next_stage(Stage::BoneDry), Some(Stage::Bisque));
        assert_eq!(next_stage(Stage::Glazed), Some(Stage::GlazeFired));
    }

    #[test]
    fn terminal_stage_has_no_successor() {
        assert_eq!(next_stage(Stage::GlazeFired), None);
        assert!(Stage::GlazeFired.is_terminal());
        assert!(!Stage::Bisque.is_terminal());
    }

    #[test]
    fn order_is_total_and_strict() {
        for pair in Stage::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
    }

    #[test]
    fn empty_history_defaults_to_thrown() {
        assert_eq!(current_stage(&[]), Stage::Thrown);
    }

    #[test]
    fn latest_date_wins_regardless_of_order() {
        let events = vec![
            event_at(Stage::Bisque, 30),
            event_at(Stage::Thrown, 0),
            event_at(Stage::Trimmed, 10),
        ];
        assert_eq!(current_stage(&events), Stage::Bisque);
    }

    #[test]
    fn equal_dates_resolve_to_last_inserted() {
        let when = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let events = vec![
            StageEvent::new(Stage::Glazed, when, None),
            StageEvent::new(Stage::Trimmed, when, None),
        ];
        assert_eq!(current_stage(&events), Stage::Trimmed);
    }

    #[test]
    fn earlier_stage_with_later_date_supersedes() {
        // History corrections are allowed: the machine does not enforce
        // forward-only progression.
        let mut events = vec![event_at(Stage::Thrown, 0), event_at(Stage::Glazed, 60)];
        events.push(StageEvent::new(
            Stage::BoneDry,
            events[1].date + Duration::seconds(1),
            Some("re-wet and reclaimed".into()),
        ));
        assert_eq!(current_stage(&events), Stage::BoneDry);
    }

    #[test]
    fn parse_accepts_common_spellings() {
        assert_eq!("leather-hard".parse::<Stage>().unwrap(), Stage::LeatherHard);
        assert_eq!("Bone Dry".parse::<Stage>().unwrap(), Stage::BoneDry);
        assert_eq!("glaze_fired".parse::<Stage>().unwrap(), Stage::GlazeFired);
        assert!(matches!(
            "raku".parse::<Stage>(),
            Err(TypeError::UnknownStage(_))
        ));
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&Stage::LeatherHard).unwrap();
        assert_eq!(json, "\"leather-hard\"");
    }

    fn any_stage() -> impl Strategy<Value = Stage> {
        (0usize..Stage::ALL.len()).prop_map(|i| Stage::ALL[i])
    }

    proptest! {
        #[test]
        fn current_stage_matches_last_max_date(
            entries in prop::collection::vec((any_stage(), 0i64..20), 1..24)
        ) {
            let events: Vec<StageEvent> = entries
                .iter()
                .map(|(stage, secs)| event_at(*stage, *secs))
                .collect();

            let max_date = events.iter().map(|e| e.date).max().unwrap();
            let expected = events
                .iter()
                .rev()
                .find(|e| e.date == max_date)
                .map(|e| e.stage)
                .unwrap();

            prop_assert_eq!(current_stage(&events), expected);
        }
    }
}
