//! Conditions gate instance generation on completion history.
//!
//! Evaluation is pure over a snapshot; inside reflow `as_of` is the instance
//! date, so a condition like "at least 3 days since the last run" reads the
//! history as it stood on that day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::completion::{count_in_window, days_since_last_completion, Completion, Target};
use crate::series::Series;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Condition {
    /// True when the gap is at least `days`, or when there is no history at
    /// all: a series never done counts as due.
    DaysSinceAtLeast { target: Target, days: u32 },
    /// True only with history, and a gap of at most `days`.
    DaysSinceAtMost { target: Target, days: u32 },
    CompletionsInWindowAtLeast {
        target: Target,
        window_days: u32,
        count: u32,
    },
    CompletionsInWindowAtMost {
        target: Target,
        window_days: u32,
        count: u32,
    },
    AllOf { conditions: Vec<Condition> },
    AnyOf { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn evaluate(
        &self,
        series: &[Series],
        completions: &[Completion],
        as_of: NaiveDate,
    ) -> bool {
        match self {
            Condition::DaysSinceAtLeast { target, days } => {
                match days_since_last_completion(series, completions, target, as_of) {
                    Some(gap) => gap >= i64::from(*days),
                    None => true,
                }
            }
            Condition::DaysSinceAtMost { target, days } => {
                match days_since_last_completion(series, completions, target, as_of) {
                    Some(gap) => gap <= i64::from(*days),
                    None => false,
                }
            }
            Condition::CompletionsInWindowAtLeast {
                target,
                window_days,
                count,
            } => {
                count_in_window(series, completions, target, *window_days, as_of)
                    >= *count as usize
            }
            Condition::CompletionsInWindowAtMost {
                target,
                window_days,
                count,
            } => {
                count_in_window(series, completions, target, *window_days, as_of)
                    <= *count as usize
            }
            Condition::AllOf { conditions } => conditions
                .iter()
                .all(|condition| condition.evaluate(series, completions, as_of)),
            Condition::AnyOf { conditions } => conditions
                .iter()
                .any(|condition| condition.evaluate(series, completions, as_of)),
            Condition::Not { condition } => !condition.evaluate(series, completions, as_of),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{parse_date, parse_datetime};
    use crate::pattern::Pattern;
    use crate::series::{DurationSpec, ScheduleTime};
    use chrono::NaiveTime;

    fn snapshot() -> (Vec<Series>, Vec<Completion>) {
        let series = Series::new(
            "Mow lawn",
            parse_date("2024-01-01").unwrap(),
            Pattern::Daily,
            ScheduleTime::At(NaiveTime::from_hms_opt(10, 0, 0).unwrap()),
            DurationSpec::Fixed { minutes: 45 },
        );
        let start = parse_datetime("2024-01-10T10:00:00").unwrap();
        let completion = Completion::new(
            series.id,
            parse_date("2024-01-10").unwrap(),
            start,
            start + chrono::Duration::minutes(45),
        )
        .unwrap();
        (vec![series], vec![completion])
    }

    #[test]
    fn days_since_at_least_gates_until_due() {
        let (series, completions) = snapshot();
        let condition = Condition::DaysSinceAtLeast {
            target: Target::series(series[0].id),
            days: 7,
        };
        assert!(!condition.evaluate(&series, &completions, parse_date("2024-01-12").unwrap()));
        assert!(condition.evaluate(&series, &completions, parse_date("2024-01-17").unwrap()));
        // No history at all counts as due.
        assert!(condition.evaluate(&series, &[], parse_date("2024-01-12").unwrap()));
    }

    #[test]
    fn days_since_at_most_requires_history() {
        let (series, completions) = snapshot();
        let condition = Condition::DaysSinceAtMost {
            target: Target::series(series[0].id),
            days: 3,
        };
        assert!(condition.evaluate(&series, &completions, parse_date("2024-01-12").unwrap()));
        assert!(!condition.evaluate(&series, &completions, parse_date("2024-01-20").unwrap()));
        assert!(!condition.evaluate(&series, &[], parse_date("2024-01-12").unwrap()));
    }

    #[test]
    fn boolean_composition() {
        let (series, completions) = snapshot();
        let target = Target::series(series[0].id);
        let due = Condition::DaysSinceAtLeast {
            target: target.clone(),
            days: 1,
        };
        let recent = Condition::CompletionsInWindowAtLeast {
            target,
            window_days: 30,
            count: 1,
        };
        let both = Condition::AllOf {
            conditions: vec![due.clone(), recent.clone()],
        };
        let as_of = parse_date("2024-01-15").unwrap();
        assert!(both.evaluate(&series, &completions, as_of));
        let negated = Condition::Not {
            condition: Box::new(both),
        };
        assert!(!negated.evaluate(&series, &completions, as_of));
        let either = Condition::AnyOf {
            conditions: vec![
                Condition::DaysSinceAtMost {
                    target: Target::series(series[0].id),
                    days: 0,
                },
                recent,
            ],
        };
        assert!(either.evaluate(&series, &completions, as_of));
    }

    #[test]
    fn serde_round_trip() {
        let (series, _) = snapshot();
        let condition = Condition::CompletionsInWindowAtMost {
            target: Target::series(series[0].id),
            window_days: 14,
            count: 2,
        };
        let value = serde_json::to_value(&condition).unwrap();
        assert_eq!(value["type"], "completionsInWindowAtMost");
        assert_eq!(value["windowDays"], 14);
        let parsed: Condition = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, condition);
    }
}
