//! Instance materialization: series + exceptions + conditions + history in,
//! concrete schedulable instances out.

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::calendar::{add_days, at_midnight};
use crate::completion::{calculate_adaptive_duration, durations_for_adaptive};
use crate::errors::EngineError;
use crate::series::{DurationSpec, InstanceException, ScheduleTime, Series, TimeWindow};
use crate::store::AggregateView;

/// Chain metadata carried from the child's inbound link.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChainEdge {
    pub parent_id: Uuid,
    pub target_distance: u32,
    pub early_wobble: u32,
    pub late_wobble: u32,
}

/// One concrete occurrence, ready for domain computation.
#[derive(Debug, Clone)]
pub(crate) struct Instance {
    pub series_id: Uuid,
    pub instance_date: NaiveDate,
    pub ideal_time: NaiveDateTime,
    pub duration: u32,
    /// True for fixed series and for instances pinned by a completion.
    pub fixed: bool,
    pub all_day: bool,
    pub time_window: Option<TimeWindow>,
    pub days_before: u32,
    pub days_after: u32,
    pub chain: Option<ChainEdge>,
}

impl Instance {
    pub(crate) fn key(&self) -> String {
        format!("{}@{}", self.series_id, self.instance_date)
    }
}

/// Materializes every instance in `[window_start, window_end]`, ordered by
/// (instance date, series id).
pub(crate) fn generate_instances(
    view: AggregateView<'_>,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Result<Vec<Instance>, EngineError> {
    let mut series_sorted: Vec<&Series> = view.series.iter().collect();
    series_sorted.sort_by_key(|series| series.id);

    let mut instances = Vec::new();
    for series in series_sorted {
        if series.start_date > window_end {
            continue;
        }
        let opts = crate::pattern::ExpandOptions {
            end_date: series.end_date,
            count: series.count,
        };
        // A count bound applies to the whole series, so expansion must start
        // at the series start to see the pre-window occurrences it consumes.
        let expand_from = if series.count.is_some() {
            series.start_date
        } else {
            window_start
        };
        let dates = series.pattern.expand(
            expand_from,
            add_days(window_end, 1),
            series.start_date,
            &opts,
        )?;

        for date in dates {
            if date < window_start || date > window_end {
                continue;
            }
            if let Some(condition) = &series.condition {
                if !condition.evaluate(view.series, view.completions, date) {
                    continue;
                }
            }

            let exception = view
                .exceptions
                .iter()
                .find(|record| record.series_id == series.id && record.instance_date == date)
                .map(|record| record.exception);

            let mut pinned = None;
            let mut ideal_time = match series.time {
                ScheduleTime::AllDay => at_midnight(date),
                ScheduleTime::At(time) => date.and_time(time),
            };
            match exception {
                Some(InstanceException::Cancelled) => continue,
                Some(InstanceException::Rescheduled { new_time }) => {
                    ideal_time = new_time;
                }
                Some(InstanceException::Completed { completion_id }) => {
                    pinned = view
                        .completions
                        .iter()
                        .find(|completion| completion.id == completion_id);
                }
                None => {}
            }

            let duration = match (pinned, &series.duration) {
                (Some(completion), _) => completion.duration_minutes.max(1),
                (None, DurationSpec::Fixed { minutes }) => *minutes,
                (None, DurationSpec::Adaptive(config)) => {
                    let durations =
                        durations_for_adaptive(view.completions, series.id, config.mode, date);
                    calculate_adaptive_duration(config, &durations)
                }
            };
            if let Some(completion) = pinned {
                ideal_time = completion.start_time;
            }

            let chain = view
                .links
                .iter()
                .find(|link| link.child_id == series.id)
                .map(|link| ChainEdge {
                    parent_id: link.parent_id,
                    target_distance: link.target_distance,
                    early_wobble: link.early_wobble,
                    late_wobble: link.late_wobble,
                });

            instances.push(Instance {
                series_id: series.id,
                instance_date: date,
                ideal_time,
                duration,
                fixed: series.fixed || pinned.is_some(),
                all_day: series.is_all_day(),
                time_window: series.time_window,
                days_before: series.days_before,
                days_after: series.days_after,
                chain,
            });
        }
    }

    instances.sort_by_key(|instance| (instance.instance_date, instance.series_id));
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{parse_date, parse_datetime};
    use crate::completion::Target;
    use crate::condition::Condition;
    use crate::pattern::Pattern;
    use crate::series::{AdaptiveConfig, AdaptiveMode};
    use crate::store::Planner;
    use chrono::NaiveTime;

    fn daily_series(title: &str) -> Series {
        Series::new(
            title,
            parse_date("2025-01-01").unwrap(),
            Pattern::Daily,
            ScheduleTime::At(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            DurationSpec::Fixed { minutes: 30 },
        )
    }

    fn generate(planner: &Planner, start: &str, end: &str) -> Vec<Instance> {
        generate_instances(
            planner.snapshot(),
            parse_date(start).unwrap(),
            parse_date(end).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn emits_in_date_then_series_order() {
        let mut planner = Planner::new("test");
        planner.create_series(daily_series("A")).unwrap();
        planner.create_series(daily_series("B")).unwrap();
        let instances = generate(&planner, "2025-01-10", "2025-01-11");
        assert_eq!(instances.len(), 4);
        assert!(instances[0].instance_date <= instances[3].instance_date);
        assert!(instances[0].series_id < instances[1].series_id);
        assert_eq!(instances[0].instance_date, instances[1].instance_date);
    }

    #[test]
    fn cancelled_dates_are_skipped() {
        let mut planner = Planner::new("test");
        let id = planner.create_series(daily_series("A")).unwrap();
        planner
            .cancel_instance(id, parse_date("2025-01-10").unwrap())
            .unwrap();
        let instances = generate(&planner, "2025-01-10", "2025-01-11");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].instance_date, parse_date("2025-01-11").unwrap());
    }

    #[test]
    fn reschedule_moves_the_scheduling_day() {
        let mut planner = Planner::new("test");
        let id = planner.create_series(daily_series("A")).unwrap();
        planner
            .reschedule_instance(
                id,
                parse_date("2025-01-10").unwrap(),
                parse_datetime("2025-01-12T14:00:00").unwrap(),
            )
            .unwrap();
        let instances = generate(&planner, "2025-01-10", "2025-01-10");
        assert_eq!(instances.len(), 1);
        // Identity keeps the pattern date; the ideal time carries the move.
        assert_eq!(instances[0].instance_date, parse_date("2025-01-10").unwrap());
        assert_eq!(
            instances[0].ideal_time,
            parse_datetime("2025-01-12T14:00:00").unwrap()
        );
    }

    #[test]
    fn completion_pins_instance_at_actual_time() {
        let mut planner = Planner::new("test");
        let id = planner.create_series(daily_series("A")).unwrap();
        planner
            .log_completion(
                id,
                parse_date("2025-01-10").unwrap(),
                parse_datetime("2025-01-10T09:12:00").unwrap(),
                parse_datetime("2025-01-10T09:57:00").unwrap(),
            )
            .unwrap();
        let instances = generate(&planner, "2025-01-10", "2025-01-10");
        assert_eq!(instances.len(), 1);
        assert!(instances[0].fixed);
        assert_eq!(
            instances[0].ideal_time,
            parse_datetime("2025-01-10T09:12:00").unwrap()
        );
        assert_eq!(instances[0].duration, 45);
    }

    #[test]
    fn condition_suppresses_dates() {
        let mut planner = Planner::new("test");
        let mut series = daily_series("A");
        let target = Target::series(series.id);
        series = series.with_condition(Condition::DaysSinceAtLeast { target, days: 3 });
        let id = planner.create_series(series).unwrap();
        planner
            .log_completion(
                id,
                parse_date("2025-01-10").unwrap(),
                parse_datetime("2025-01-10T09:00:00").unwrap(),
                parse_datetime("2025-01-10T09:30:00").unwrap(),
            )
            .unwrap();
        let instances = generate(&planner, "2025-01-11", "2025-01-13");
        // Jan 11 and 12 are within 3 days of the completion; Jan 13 is due.
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].instance_date, parse_date("2025-01-13").unwrap());
    }

    #[test]
    fn adaptive_duration_reads_history_as_of_the_instance_date() {
        let mut planner = Planner::new("test");
        let mut series = daily_series("A");
        series.duration = DurationSpec::Adaptive(AdaptiveConfig {
            mode: AdaptiveMode::LastN { n: 2 },
            fallback: 20,
            multiplier: 1.0,
            minimum: None,
            maximum: None,
        });
        let id = planner.create_series(series).unwrap();
        for (date, minutes) in [("2025-01-05", 40), ("2025-01-06", 60)] {
            let start = parse_datetime(&format!("{}T09:00:00", date)).unwrap();
            planner
                .log_completion(
                    id,
                    parse_date(date).unwrap(),
                    start,
                    start + chrono::Duration::minutes(minutes),
                )
                .unwrap();
        }
        let instances = generate(&planner, "2025-01-10", "2025-01-10");
        assert_eq!(instances[0].duration, 50);

        // Before any history the fallback applies.
        let early = generate_instances(
            planner.snapshot(),
            parse_date("2025-01-02").unwrap(),
            parse_date("2025-01-02").unwrap(),
        )
        .unwrap();
        assert_eq!(early[0].duration, 20);
    }

    #[test]
    fn count_is_series_global() {
        let mut planner = Planner::new("test");
        let series = daily_series("A").with_count(3);
        planner.create_series(series).unwrap();
        // The three instances land on Jan 1-3; a later window sees none.
        let instances = generate(&planner, "2025-01-02", "2025-01-10");
        let dates: Vec<NaiveDate> = instances.iter().map(|i| i.instance_date).collect();
        assert_eq!(
            dates,
            vec![parse_date("2025-01-02").unwrap(), parse_date("2025-01-03").unwrap()]
        );
        let later = generate(&planner, "2025-01-05", "2025-01-10");
        assert!(later.is_empty());
    }
}
