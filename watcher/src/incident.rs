use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info};
use zonewatch_common::motion::{DetectionResult, MotionArea};

/// A run of detections with no quiet gap longer than the trigger duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub start_ms: i64,
    /// Time of the last detection in the incident.
    pub end_ms: i64,
    /// Every zone triggered during the incident, sorted.
    pub zones: Vec<String>,
    /// Areas reported by the detection that opened the incident.
    pub areas: Vec<MotionArea>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentUpdate {
    Opened(Incident),
    Closed(Incident),
}

enum IncidentState {
    /// No motion within the trigger duration.
    Idle,
    /// Motion seen recently; the incident stays open until it goes quiet.
    Active {
        start_ms: i64,
        last_motion_ms: i64,
        zones: BTreeSet<String>,
        areas: Vec<MotionArea>,
    },
}

/// Groups per-frame detections into incidents.
///
/// The first detection while idle opens an incident. Later detections extend
/// it and merge their zones. Once `trigger_duration` passes without a
/// detection, the incident closes.
pub struct IncidentTracker {
    state: IncidentState,
    hold_ms: i64,
}

impl IncidentTracker {
    pub fn new(trigger_duration: Duration) -> Self {
        Self {
            state: IncidentState::Idle,
            hold_ms: trigger_duration.as_millis().min(i64::MAX as u128) as i64,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, IncidentState::Active { .. })
    }

    /// Feed one evaluation result observed at `now_ms`.
    ///
    /// Returns at most one `Closed` followed by at most one `Opened`: a
    /// detection arriving after a long gap closes the stale incident and
    /// opens a fresh one.
    pub fn observe(&mut self, now_ms: i64, result: &DetectionResult) -> Vec<IncidentUpdate> {
        let mut updates = Vec::new();

        let expired = matches!(
            &self.state,
            IncidentState::Active { last_motion_ms, .. }
                if now_ms.saturating_sub(*last_motion_ms) >= self.hold_ms
        );
        if expired {
            if let Some(incident) = self.finish() {
                updates.push(IncidentUpdate::Closed(incident));
            }
        }

        if !result.detected {
            return updates;
        }

        match &mut self.state {
            IncidentState::Idle => {
                let zones: BTreeSet<String> = result.triggered_zone_ids.iter().cloned().collect();
                info!(
                    start_ms = now_ms,
                    zones = ?zones,
                    "IDLE→ACTIVE: motion incident opened"
                );
                let incident = Incident {
                    start_ms: now_ms,
                    end_ms: now_ms,
                    zones: zones.iter().cloned().collect(),
                    areas: result.areas.clone(),
                };
                self.state = IncidentState::Active {
                    start_ms: now_ms,
                    last_motion_ms: now_ms,
                    zones,
                    areas: result.areas.clone(),
                };
                updates.push(IncidentUpdate::Opened(incident));
            }
            IncidentState::Active {
                last_motion_ms,
                zones,
                ..
            } => {
                *last_motion_ms = now_ms;
                zones.extend(result.triggered_zone_ids.iter().cloned());
                debug!(now_ms, zones = ?zones, "ACTIVE: motion continues");
            }
        }
        updates
    }

    /// Close the open incident, if any.
    pub fn finish(&mut self) -> Option<Incident> {
        match std::mem::replace(&mut self.state, IncidentState::Idle) {
            IncidentState::Idle => None,
            IncidentState::Active {
                start_ms,
                last_motion_ms,
                zones,
                areas,
            } => {
                info!(
                    start_ms,
                    end_ms = last_motion_ms,
                    zones = ?zones,
                    "ACTIVE→IDLE: motion incident closed"
                );
                Some(Incident {
                    start_ms,
                    end_ms: last_motion_ms,
                    zones: zones.into_iter().collect(),
                    areas,
                })
            }
        }
    }
}
