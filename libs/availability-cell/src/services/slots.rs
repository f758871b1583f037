// libs/availability-cell/src/services/slots.rs
use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{day_of_week, AvailabilityRule, BookedInterval, Slot, SlotParams};

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`
/// intersect iff each starts before the other ends. Back-to-back intervals do
/// not overlap.
pub fn intervals_overlap(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Derive the slots for `date` from the doctor's rules.
///
/// Each active rule for the weekday is walked in `params.step_minutes` steps;
/// a candidate lasts `params.duration_minutes` and is dropped when it would run
/// past the rule's end. A candidate is available only if it starts strictly
/// after `now` and does not overlap any booked interval. Output is ordered by
/// start time, then clinic, with one entry per `(clinic_id, start_time)`.
/// Params outside [`SlotParams::is_valid`] yield no slots.
pub fn compute_slots(
    rules: &[AvailabilityRule],
    clinic_id: Option<Uuid>,
    date: NaiveDate,
    booked: &[BookedInterval],
    now: NaiveDateTime,
    params: SlotParams,
) -> Vec<Slot> {
    if !params.is_valid() {
        warn!(
            "Slot step {} or duration {} minutes out of range, offering no slots",
            params.step_minutes, params.duration_minutes
        );
        return Vec::new();
    }

    let weekday = day_of_week(date);
    let step = Duration::minutes(params.step_minutes);
    let duration = Duration::minutes(params.duration_minutes);

    let mut candidates: BTreeMap<(NaiveTime, Uuid), Slot> = BTreeMap::new();

    let matching = rules.iter().filter(|rule| {
        rule.is_available
            && rule.day_of_week == weekday
            && clinic_id.map_or(true, |clinic| clinic == rule.clinic_id)
    });

    for rule in matching {
        if rule.start_time >= rule.end_time {
            warn!("Skipping availability rule {} with empty window", rule.id);
            continue;
        }

        let rule_end = date.and_time(rule.end_time);
        let mut cursor = date.and_time(rule.start_time);

        while cursor < rule_end {
            let slot_end = cursor + duration;
            if slot_end > rule_end {
                break;
            }

            let occupied = booked
                .iter()
                .any(|interval| intervals_overlap(cursor, slot_end, interval.starts_at, interval.ends_at));

            candidates
                .entry((cursor.time(), rule.clinic_id))
                .or_insert(Slot {
                    clinic_id: rule.clinic_id,
                    start_time: cursor.time(),
                    end_time: slot_end.time(),
                    available: cursor > now && !occupied,
                });

            cursor += step;
        }
    }

    debug!("Computed {} slots for {}", candidates.len(), date);
    candidates.into_values().collect()
}

/// Whether `[starts_at, ends_at)` lies inside one active rule of `clinic_id`
/// on the interval's date.
pub fn fits_within_availability(
    rules: &[AvailabilityRule],
    clinic_id: Uuid,
    starts_at: NaiveDateTime,
    ends_at: NaiveDateTime,
) -> bool {
    let date = starts_at.date();
    rules.iter().any(|rule| {
        rule.clinic_id == clinic_id
            && rule.applies_to(date)
            && date.and_time(rule.start_time) <= starts_at
            && ends_at <= date.and_time(rule.end_time)
    })
}
