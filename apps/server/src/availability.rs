//! Availability slot computation.
//!
//! Given a shop's recurring weekly working-hour template, one-off blocked-time
//! ranges, and the appointments already on the books, compute the open start
//! times for a service on a target date. All interval math works in minutes
//! since midnight over half-open ranges `[start, end)`, so back-to-back
//! appointments never conflict with each other.
//!
//! The generation itself is a pure function; `compute_slots` wraps it with the
//! four reads it needs (service, weekly template, blocks covering the date,
//! booked appointments). Booking handlers call `compute_slots` a second time
//! right before inserting and require the requested start time to still be in
//! the list; the partial unique index on `(barbershop_id, date, time)` closes
//! the remaining race window.

use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::ServicePublic;

/// Default slot grid step (minutes).
pub const DEFAULT_STEP_MINUTES: i64 = 15;

/// Duration assumed when an appointment's service row is gone or carries a
/// non-positive duration.
const FALLBACK_DURATION_MINUTES: i64 = 30;

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("Service not found for this barbershop")]
    ServiceNotFound,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// A half-open interval in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

/// Result of a slot computation: the resolved service snapshot and the
/// bookable start times in ascending order.
#[derive(Debug, Clone, Serialize)]
pub struct SlotComputation {
    pub service: ServicePublic,
    pub slots: Vec<String>,
}

// ── Time helpers ──

/// Parse zero-padded 24-hour `HH:MM` into minutes since midnight.
pub fn time_to_minutes(t: &str) -> Option<i64> {
    let (hh, mm) = t.split_once(':')?;
    if hh.len() != 2 || mm.len() != 2 {
        return None;
    }
    if !hh.bytes().chain(mm.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let h: i64 = hh.parse().ok()?;
    let m: i64 = mm.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Format minutes since midnight back to `HH:MM`.
pub fn minutes_to_time(min: i64) -> String {
    format!("{:02}:{:02}", min / 60, min % 60)
}

/// Calendar weekday of a local date, 0=Sunday .. 6=Saturday.
pub fn weekday_from_date(date: NaiveDate) -> i64 {
    i64::from(date.weekday().num_days_from_sunday())
}

/// Half-open overlap test. Touching endpoints do not overlap.
fn overlaps(a: Interval, b: Interval) -> bool {
    a.start < b.end && a.end > b.start
}

// ── Occupied intervals ──

/// Booked appointment snapshot: its stored start time and the duration of
/// the service it was booked with (null when that service row is gone).
#[derive(Debug, sqlx::FromRow)]
struct BookedRow {
    time: String,
    duration_minutes: Option<i64>,
}

/// Convert booked appointments into occupied intervals.
///
/// Rows whose stored time is not valid `HH:MM` are skipped rather than
/// guessed at; a missing or non-positive duration falls back to 30 minutes.
fn occupied_intervals(rows: &[BookedRow]) -> Vec<Interval> {
    rows.iter()
        .filter_map(|row| {
            let start = time_to_minutes(&row.time)?;
            let duration = match row.duration_minutes {
                Some(d) if d > 0 => d,
                _ => FALLBACK_DURATION_MINUTES,
            };
            Some(Interval {
                start,
                end: start + duration,
            })
        })
        .collect()
}

// ── Slot generation (pure core) ──

/// Enumerate bookable start times across the day's working-hour ranges.
///
/// `now_minutes` carries the current time of day when the target date is
/// today, `None` otherwise; past start times are clamped away and the clamped
/// start rounded up to the next `step` multiple. Ranges are expected sorted
/// by start and non-overlapping (the write path enforces that), so the output
/// is ascending.
fn generate_slots(
    ranges: &[Interval],
    blocked: &[Interval],
    occupied: &[Interval],
    duration: i64,
    step: i64,
    now_minutes: Option<i64>,
) -> Vec<String> {
    let mut slots = Vec::new();

    for range in ranges {
        // Last start that still fits the whole duration inside the range.
        let last_start = range.end - duration;
        if last_start < range.start {
            continue;
        }

        let mut start = range.start;
        if let Some(now) = now_minutes {
            if start < now {
                start = ((now + step - 1) / step) * step;
            }
        }

        let mut t = start;
        while t <= last_start {
            let candidate = Interval {
                start: t,
                end: t + duration,
            };
            let conflict = occupied.iter().any(|o| overlaps(candidate, *o))
                || blocked.iter().any(|b| overlaps(candidate, *b));
            if !conflict {
                slots.push(minutes_to_time(t));
            }
            t += step;
        }
    }

    slots
}

// ── Entry point ──

/// Compute the open slots for a service on a date.
///
/// Deterministic for fixed inputs and a fixed clock: the four reads are
/// snapshots and generation has no side effects. A closed weekday or a
/// fully blocked day yields an empty list, not an error; only a service
/// that does not belong to the shop fails.
pub async fn compute_slots(
    db: &SqlitePool,
    barbershop_id: i64,
    service_id: i64,
    date: NaiveDate,
    step: i64,
) -> Result<SlotComputation, AvailabilityError> {
    let service = sqlx::query_as::<_, ServicePublic>(
        "SELECT id, name, description, price, duration_minutes, deposit_percentage
         FROM services WHERE id = ? AND barbershop_id = ?",
    )
    .bind(service_id)
    .bind(barbershop_id)
    .fetch_optional(db)
    .await?
    .ok_or(AvailabilityError::ServiceNotFound)?;

    let ranges: Vec<(String, String)> = sqlx::query_as(
        "SELECT start_time, end_time FROM working_hours
         WHERE barbershop_id = ? AND weekday = ?
         ORDER BY start_time ASC",
    )
    .bind(barbershop_id)
    .bind(weekday_from_date(date))
    .fetch_all(db)
    .await?;

    // Closed that weekday.
    if ranges.is_empty() {
        return Ok(SlotComputation {
            service,
            slots: vec![],
        });
    }

    let date_iso = date.format("%Y-%m-%d").to_string();

    // Blocks whose date window covers the target date. A null date_to means
    // the block applies to date_from only.
    let blocks: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT start_time, end_time FROM blocked_times
         WHERE barbershop_id = ? AND date_from <= ? AND COALESCE(date_to, date_from) >= ?",
    )
    .bind(barbershop_id)
    .bind(&date_iso)
    .bind(&date_iso)
    .fetch_all(db)
    .await?;

    // A block with no time window shuts the whole day.
    if blocks.iter().any(|(s, e)| s.is_none() && e.is_none()) {
        return Ok(SlotComputation {
            service,
            slots: vec![],
        });
    }

    let blocked: Vec<Interval> = blocks
        .iter()
        .filter_map(|(s, e)| {
            Some(Interval {
                start: time_to_minutes(s.as_deref()?)?,
                end: time_to_minutes(e.as_deref()?)?,
            })
        })
        .collect();

    let booked: Vec<BookedRow> = sqlx::query_as(
        "SELECT a.time, s.duration_minutes FROM appointments a
         LEFT JOIN services s ON s.id = a.service_id
         WHERE a.barbershop_id = ? AND a.date = ? AND a.status != 'canceled'",
    )
    .bind(barbershop_id)
    .bind(&date_iso)
    .fetch_all(db)
    .await?;
    let occupied = occupied_intervals(&booked);

    let duration = if service.duration_minutes > 0 {
        service.duration_minutes
    } else {
        FALLBACK_DURATION_MINUTES
    };

    let range_intervals: Vec<Interval> = ranges
        .iter()
        .filter_map(|(s, e)| {
            Some(Interval {
                start: time_to_minutes(s)?,
                end: time_to_minutes(e)?,
            })
        })
        .collect();

    let now = Local::now();
    let now_minutes = (date == now.date_naive())
        .then(|| i64::from(now.time().hour()) * 60 + i64::from(now.time().minute()));

    let slots = generate_slots(
        &range_intervals,
        &blocked,
        &occupied,
        duration,
        step,
        now_minutes,
    );

    Ok(SlotComputation { service, slots })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: build an interval without boilerplate.
    fn iv(start: i64, end: i64) -> Interval {
        Interval { start, end }
    }

    fn booked(time: &str, duration: Option<i64>) -> BookedRow {
        BookedRow {
            time: time.to_string(),
            duration_minutes: duration,
        }
    }

    // ── time_to_minutes ──

    #[test]
    fn test_parse_time_basic() {
        assert_eq!(time_to_minutes("09:00"), Some(540));
    }

    #[test]
    fn test_parse_time_midnight() {
        assert_eq!(time_to_minutes("00:00"), Some(0));
    }

    #[test]
    fn test_parse_time_last_minute() {
        assert_eq!(time_to_minutes("23:59"), Some(1439));
    }

    #[test]
    fn test_parse_time_hour_out_of_range() {
        assert_eq!(time_to_minutes("24:00"), None);
    }

    #[test]
    fn test_parse_time_minute_out_of_range() {
        assert_eq!(time_to_minutes("10:60"), None);
    }

    #[test]
    fn test_parse_time_not_zero_padded() {
        assert_eq!(time_to_minutes("9:00"), None);
    }

    #[test]
    fn test_parse_time_garbage() {
        assert_eq!(time_to_minutes(""), None);
        assert_eq!(time_to_minutes("nope"), None);
        assert_eq!(time_to_minutes("10-30"), None);
        assert_eq!(time_to_minutes("1030"), None);
        assert_eq!(time_to_minutes("+1:30"), None);
    }

    // ── minutes_to_time ──

    #[test]
    fn test_format_time_basic() {
        assert_eq!(minutes_to_time(540), "09:00");
    }

    #[test]
    fn test_format_time_pads_both_fields() {
        assert_eq!(minutes_to_time(65), "01:05");
    }

    #[test]
    fn test_format_parse_roundtrip() {
        assert_eq!(time_to_minutes(&minutes_to_time(690)), Some(690));
    }

    // ── weekday_from_date ──

    #[test]
    fn test_weekday_sunday_is_zero() {
        let d = NaiveDate::from_ymd_opt(2026, 8, 9).unwrap(); // a Sunday
        assert_eq!(weekday_from_date(d), 0);
    }

    #[test]
    fn test_weekday_wednesday_is_three() {
        let d = NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(); // a Wednesday
        assert_eq!(weekday_from_date(d), 3);
    }

    #[test]
    fn test_weekday_saturday_is_six() {
        let d = NaiveDate::from_ymd_opt(2026, 8, 15).unwrap(); // a Saturday
        assert_eq!(weekday_from_date(d), 6);
    }

    // ── overlaps ──

    #[test]
    fn test_overlap_partial() {
        assert!(overlaps(iv(600, 630), iv(615, 645)));
    }

    #[test]
    fn test_overlap_containment() {
        assert!(overlaps(iv(600, 700), iv(620, 640)));
    }

    #[test]
    fn test_touching_endpoints_do_not_overlap() {
        assert!(!overlaps(iv(600, 630), iv(630, 660)));
        assert!(!overlaps(iv(630, 660), iv(600, 630)));
    }

    #[test]
    fn test_disjoint_do_not_overlap() {
        assert!(!overlaps(iv(600, 630), iv(700, 730)));
    }

    // ── occupied_intervals ──

    #[test]
    fn test_occupied_uses_own_service_duration() {
        let rows = vec![booked("10:00", Some(45))];
        assert_eq!(occupied_intervals(&rows), vec![iv(600, 645)]);
    }

    #[test]
    fn test_occupied_missing_duration_falls_back_to_30() {
        let rows = vec![booked("10:00", None)];
        assert_eq!(occupied_intervals(&rows), vec![iv(600, 630)]);
    }

    #[test]
    fn test_occupied_zero_duration_falls_back_to_30() {
        let rows = vec![booked("10:00", Some(0))];
        assert_eq!(occupied_intervals(&rows), vec![iv(600, 630)]);
    }

    #[test]
    fn test_occupied_skips_malformed_time() {
        let rows = vec![booked("garbage", Some(30)), booked("11:00", Some(30))];
        assert_eq!(occupied_intervals(&rows), vec![iv(660, 690)]);
    }

    // ── generate_slots ──

    #[test]
    fn test_open_day_no_conflicts() {
        let slots = generate_slots(&[iv(540, 660)], &[], &[], 30, 30, None);
        assert_eq!(slots, vec!["09:00", "09:30", "10:00", "10:30"]);
    }

    #[test]
    fn test_no_ranges_means_closed() {
        let slots = generate_slots(&[], &[], &[], 30, 15, None);
        assert!(slots.is_empty());
    }

    #[test]
    fn test_duration_longer_than_range_yields_nothing() {
        // 09:00-10:00 cannot fit a 90-minute service.
        let slots = generate_slots(&[iv(540, 600)], &[], &[], 90, 15, None);
        assert!(slots.is_empty());
    }

    #[test]
    fn test_duration_exactly_range_length_yields_one_slot() {
        let slots = generate_slots(&[iv(540, 600)], &[], &[], 60, 15, None);
        assert_eq!(slots, vec!["09:00"]);
    }

    #[test]
    fn test_last_start_boundary_included() {
        // 09:00-12:00, 30 min: last start is 11:30 exactly.
        let slots = generate_slots(&[iv(540, 720)], &[], &[], 30, 15, None);
        assert_eq!(slots.last().map(String::as_str), Some("11:30"));
    }

    #[test]
    fn test_back_to_back_appointment_does_not_block_next_slot() {
        // 30-minute appointment at 10:00 occupies [600, 630); a candidate at
        // 10:30 touches it and must still be offered.
        let slots = generate_slots(&[iv(540, 720)], &[], &[iv(600, 630)], 30, 15, None);
        assert!(slots.contains(&"10:30".to_string()));
        assert!(!slots.contains(&"10:00".to_string()));
        assert!(!slots.contains(&"10:15".to_string()));
        // The candidate ending exactly where the appointment starts is fine too.
        assert!(slots.contains(&"09:30".to_string()));
    }

    #[test]
    fn test_blocked_interval_excludes_overlapping_candidates() {
        // Block 11:00-11:30; 30-minute candidates 10:45..11:15 all collide.
        let slots = generate_slots(&[iv(540, 720)], &[iv(660, 690)], &[], 30, 15, None);
        assert!(!slots.contains(&"10:45".to_string()));
        assert!(!slots.contains(&"11:00".to_string()));
        assert!(!slots.contains(&"11:15".to_string()));
        assert!(slots.contains(&"11:30".to_string()));
    }

    #[test]
    fn test_split_ranges_keep_ascending_order() {
        let slots = generate_slots(&[iv(540, 600), iv(840, 900)], &[], &[], 30, 30, None);
        assert_eq!(slots, vec!["09:00", "09:30", "14:00", "14:30"]);
    }

    #[test]
    fn test_every_slot_fits_a_range_and_avoids_conflicts() {
        let ranges = [iv(540, 720), iv(780, 1080)];
        let blocked = [iv(660, 690), iv(900, 960)];
        let occupied = [iv(600, 645), iv(810, 840)];
        let duration = 45;
        let slots = generate_slots(&ranges, &blocked, &occupied, duration, 15, None);
        assert!(!slots.is_empty());
        for s in &slots {
            let start = time_to_minutes(s).expect("slot formats as HH:MM");
            let cand = iv(start, start + duration);
            assert!(
                ranges.iter().any(|r| cand.start >= r.start && cand.end <= r.end),
                "slot {} escapes the working ranges",
                s
            );
            assert!(
                !blocked.iter().any(|b| overlaps(cand, *b)),
                "slot {} hits a block",
                s
            );
            assert!(
                !occupied.iter().any(|o| overlaps(cand, *o)),
                "slot {} hits an appointment",
                s
            );
        }
    }

    #[test]
    fn test_today_clamp_rounds_up_to_step() {
        // Now is 14:32 (872): the first offered slot must be 14:45 or later.
        let slots = generate_slots(&[iv(540, 1080)], &[], &[], 30, 15, Some(872));
        assert_eq!(slots.first().map(String::as_str), Some("14:45"));
    }

    #[test]
    fn test_today_clamp_on_exact_step_boundary() {
        // Now is 15:00 sharp: 15:00 itself is still offered.
        let slots = generate_slots(&[iv(540, 1080)], &[], &[], 30, 15, Some(900));
        assert_eq!(slots.first().map(String::as_str), Some("15:00"));
    }

    #[test]
    fn test_today_clamp_ignores_future_ranges() {
        // Afternoon range starts after "now": left untouched, grid stays
        // anchored to the range start.
        let slots = generate_slots(&[iv(840, 900)], &[], &[], 30, 15, Some(600));
        assert_eq!(slots, vec!["14:00", "14:15", "14:30"]);
    }

    #[test]
    fn test_today_clamp_can_empty_a_range() {
        // Now is past the last viable start.
        let slots = generate_slots(&[iv(540, 600)], &[], &[], 30, 15, Some(590));
        assert!(slots.is_empty());
    }

    #[test]
    fn test_generation_is_idempotent() {
        let ranges = [iv(540, 720)];
        let blocked = [iv(660, 690)];
        let occupied = [iv(600, 630)];
        let a = generate_slots(&ranges, &blocked, &occupied, 30, 15, Some(555));
        let b = generate_slots(&ranges, &blocked, &occupied, 30, 15, Some(555));
        assert_eq!(a, b);
    }

    #[test]
    fn test_step_anchors_to_range_start() {
        // Range starting off-grid: candidates step from the range start, not
        // from midnight.
        let slots = generate_slots(&[iv(550, 640)], &[], &[], 30, 30, None);
        assert_eq!(slots, vec!["09:10", "09:40", "10:10"]);
    }

    #[test]
    fn test_wednesday_scenario_end_to_end() {
        // Shop open 09:00-12:00, 30-minute service, step 15, a confirmed
        // appointment at 10:00 (30 min) and a block 11:00-11:30. The
        // appointment knocks out 09:45-10:15, the block 10:45-11:15; 11:30 is
        // the last possible start (720 - 30) and touches the block without
        // overlapping it.
        let occupied = occupied_intervals(&[booked("10:00", Some(30))]);
        let slots = generate_slots(&[iv(540, 720)], &[iv(660, 690)], &occupied, 30, 15, None);
        assert_eq!(slots, vec!["09:00", "09:15", "09:30", "10:30", "11:30"]);
    }

    #[test]
    fn test_booking_race_recheck_sees_new_appointment() {
        // First computation offers 10:30; once a competing booking lands
        // there, a recomputation with the fresh snapshot must not offer it
        // again.
        let ranges = [iv(540, 720)];
        let before = generate_slots(&ranges, &[], &[], 30, 15, None);
        assert!(before.contains(&"10:30".to_string()));

        let occupied = occupied_intervals(&[booked("10:30", Some(30))]);
        let after = generate_slots(&ranges, &[], &occupied, 30, 15, None);
        assert!(!after.contains(&"10:30".to_string()));
    }
}
