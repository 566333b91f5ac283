//! Candidate slot domains at 5-minute granularity.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::series::TimeWindow;

use super::instances::Instance;

pub(crate) const SLOT_MINUTES: u32 = 5;

fn default_window() -> TimeWindow {
    TimeWindow {
        start: NaiveTime::MIN,
        end: NaiveTime::from_hms_opt(23, 59, 0).expect("static time"),
    }
}

/// Sorted, duplicate-free candidate start times for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Domain {
    pub slots: Vec<NaiveDateTime>,
}

impl Domain {
    pub(crate) fn singleton(slot: NaiveDateTime) -> Self {
        Self { slots: vec![slot] }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True when a slot in `[lo, hi]` exists; both bounds inclusive.
    pub(crate) fn has_in_range(&self, lo: NaiveDateTime, hi: NaiveDateTime) -> bool {
        let from = self.slots.partition_point(|slot| *slot < lo);
        from < self.slots.len() && self.slots[from] <= hi
    }

    pub(crate) fn min(&self) -> Option<NaiveDateTime> {
        self.slots.first().copied()
    }

    pub(crate) fn max(&self) -> Option<NaiveDateTime> {
        self.slots.last().copied()
    }
}

/// Builds each instance's domain; `None` marks all-day instances, which do
/// not participate in reflow.
pub(crate) fn build_domains(instances: &[Instance]) -> Vec<Option<Domain>> {
    instances.iter().map(build_domain).collect()
}

fn build_domain(instance: &Instance) -> Option<Domain> {
    if instance.all_day {
        return None;
    }
    if instance.fixed {
        return Some(Domain::singleton(instance.ideal_time));
    }

    let window = instance.time_window.unwrap_or_else(default_window);
    let anchor = instance.ideal_time.date();
    let mut slots = Vec::new();
    for offset in -i64::from(instance.days_before)..=i64::from(instance.days_after) {
        let day = anchor + Duration::days(offset);
        // The window end names an inclusive last minute, so the fit boundary
        // sits one minute past it.
        let boundary = day.and_time(window.end) + Duration::minutes(1);
        let mut time = round_up_to_slot(window.start);
        while let Some(current) = time {
            if current > window.end {
                break;
            }
            let slot = day.and_time(current);
            if slot + Duration::minutes(i64::from(instance.duration)) <= boundary {
                slots.push(slot);
            }
            time = advance_slot(current);
        }
    }
    Some(Domain { slots })
}

/// First slot-aligned time at or after `time`, if the day still has one.
fn round_up_to_slot(time: NaiveTime) -> Option<NaiveTime> {
    let minute = time.minute();
    let remainder = minute % SLOT_MINUTES;
    if remainder == 0 {
        return time.with_second(0);
    }
    let bumped = minute - remainder + SLOT_MINUTES;
    if bumped >= 60 {
        if time.hour() == 23 {
            return None;
        }
        NaiveTime::from_hms_opt(time.hour() + 1, 0, 0)
    } else {
        NaiveTime::from_hms_opt(time.hour(), bumped, 0)
    }
}

fn advance_slot(time: NaiveTime) -> Option<NaiveTime> {
    let minute = time.minute();
    if minute + SLOT_MINUTES >= 60 {
        if time.hour() == 23 {
            return None;
        }
        NaiveTime::from_hms_opt(time.hour() + 1, 0, 0)
    } else {
        NaiveTime::from_hms_opt(time.hour(), minute + SLOT_MINUTES, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{parse_date, parse_datetime};
    use uuid::Uuid;

    fn flexible_instance() -> Instance {
        Instance {
            series_id: Uuid::new_v4(),
            instance_date: parse_date("2025-01-15").unwrap(),
            ideal_time: parse_datetime("2025-01-15T10:00:00").unwrap(),
            duration: 60,
            fixed: false,
            all_day: false,
            time_window: None,
            days_before: 0,
            days_after: 0,
            chain: None,
        }
    }

    #[test]
    fn fixed_instance_has_singleton_domain() {
        let mut instance = flexible_instance();
        instance.fixed = true;
        let domain = build_domain(&instance).unwrap();
        assert_eq!(domain.slots, vec![instance.ideal_time]);
    }

    #[test]
    fn all_day_instances_have_no_domain() {
        let mut instance = flexible_instance();
        instance.all_day = true;
        assert!(build_domain(&instance).is_none());
    }

    #[test]
    fn default_window_spans_the_day_minus_fit() {
        let domain = build_domain(&flexible_instance()).unwrap();
        // 00:00 through 23:00 inclusive for a 60-minute task: 277 slots.
        assert_eq!(domain.min().unwrap(), parse_datetime("2025-01-15T00:00:00").unwrap());
        assert_eq!(domain.max().unwrap(), parse_datetime("2025-01-15T23:00:00").unwrap());
        assert_eq!(domain.len(), 277);
        assert!(domain.slots.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn explicit_window_restricts_and_fits_duration() {
        let mut instance = flexible_instance();
        instance.time_window = Some(TimeWindow {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
        });
        let domain = build_domain(&instance).unwrap();
        // Start slots 09:00..=10:00: a 60-minute task must end by 11:01.
        assert_eq!(domain.min().unwrap(), parse_datetime("2025-01-15T09:00:00").unwrap());
        assert_eq!(domain.max().unwrap(), parse_datetime("2025-01-15T10:00:00").unwrap());
        assert_eq!(domain.len(), 13);
    }

    #[test]
    fn unaligned_window_start_rounds_up() {
        let mut instance = flexible_instance();
        instance.duration = 15;
        instance.time_window = Some(TimeWindow {
            start: NaiveTime::from_hms_opt(9, 3, 0).unwrap(),
            end: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        });
        let domain = build_domain(&instance).unwrap();
        assert_eq!(domain.min().unwrap(), parse_datetime("2025-01-15T09:05:00").unwrap());
        assert_eq!(domain.max().unwrap(), parse_datetime("2025-01-15T09:15:00").unwrap());
    }

    #[test]
    fn day_wiggle_spreads_the_domain() {
        let mut instance = flexible_instance();
        instance.days_before = 1;
        instance.days_after = 2;
        instance.time_window = Some(TimeWindow {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        });
        let domain = build_domain(&instance).unwrap();
        assert_eq!(domain.min().unwrap(), parse_datetime("2025-01-14T09:00:00").unwrap());
        assert_eq!(domain.max().unwrap(), parse_datetime("2025-01-17T09:00:00").unwrap());
        // One fitting start per day for a 60-minute task in a 1-hour window.
        assert_eq!(domain.len(), 4);
    }

    #[test]
    fn range_queries() {
        let domain = build_domain(&flexible_instance()).unwrap();
        assert!(domain.has_in_range(
            parse_datetime("2025-01-15T09:58:00").unwrap(),
            parse_datetime("2025-01-15T10:02:00").unwrap(),
        ));
        assert!(!domain.has_in_range(
            parse_datetime("2025-01-15T23:01:00").unwrap(),
            parse_datetime("2025-01-15T23:04:00").unwrap(),
        ));
    }
}
