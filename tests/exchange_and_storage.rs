use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use tempfile::TempDir;

use schedule_core::completion::Target;
use schedule_core::pattern::Pattern;
use schedule_core::reflow::{reflow, ReflowInput, ReflowOutput, RelationalConstraint};
use schedule_core::series::{DurationSpec, ScheduleTime, Series};
use schedule_core::storage::{JsonStorage, StorageBackend};
use schedule_core::store::Planner;

fn d(input: &str) -> NaiveDate {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").unwrap()
}

fn t(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

#[test]
fn reflow_input_parses_exchange_shapes() {
    let series = Series::new(
        "Standup",
        d("2025-01-13"),
        Pattern::Weekly { weekday: None },
        ScheduleTime::At(t(9, 30)),
        DurationSpec::Fixed { minutes: 15 },
    );
    let value = json!({
        "series": [serde_json::to_value(&series).unwrap()],
        "constraints": [
            {"type": "mustBeWithin", "source": {"seriesId": series.id}, "dest": {"tag": "food"}, "withinMinutes": 45},
        ],
        "chains": [],
        "today": "2025-01-13",
        "windowStart": "2025-01-13",
        "windowEnd": "2025-01-19",
    });
    let input: ReflowInput = serde_json::from_value(value).unwrap();
    assert_eq!(input.window_end, d("2025-01-19"));
    assert_eq!(input.series[0].title, "Standup");
    match &input.constraints[0] {
        RelationalConstraint::MustBeWithin {
            within_minutes, dest, ..
        } => {
            assert_eq!(*within_minutes, 45);
            assert_eq!(dest, &Target::tag("food"));
        }
        other => panic!("unexpected constraint {:?}", other),
    }

    let output = reflow(&input, &[], &[]).unwrap();
    assert_eq!(output.assignments.len(), 1);
    assert!(output.conflicts.is_empty());
}

#[test]
fn reflow_output_serializes_canonically() {
    let mut planner = Planner::new("exchange");
    planner
        .create_series(
            Series::new(
                "Standup",
                d("2025-01-15"),
                Pattern::Daily,
                ScheduleTime::At(t(9, 0)),
                DurationSpec::Fixed { minutes: 15 },
            )
            .with_end_date(d("2025-01-16"))
            .with_fixed(true),
        )
        .unwrap();
    let output = planner.reflow(d("2025-01-15"), d("2025-01-15")).unwrap();
    let value = serde_json::to_value(&output).unwrap();
    let assignment = &value["assignments"][0];
    assert_eq!(assignment["instanceDate"], "2025-01-15");
    assert_eq!(assignment["time"], "2025-01-15T09:00:00");
    assert!(assignment["seriesId"].is_string());
    assert_eq!(value["conflicts"], json!([]));

    let round_tripped: ReflowOutput = serde_json::from_value(value).unwrap();
    assert_eq!(round_tripped, output);
}

#[test]
fn conflict_exchange_shape_uses_type_and_severity() {
    let mut planner = Planner::new("exchange");
    for title in ["A", "B"] {
        planner
            .create_series(
                Series::new(
                    title,
                    d("2025-01-15"),
                    Pattern::Daily,
                    ScheduleTime::At(t(9, 0)),
                    DurationSpec::Fixed { minutes: 60 },
                )
                .with_end_date(d("2025-01-16"))
                .with_fixed(true),
            )
            .unwrap();
    }
    let output = planner.reflow(d("2025-01-15"), d("2025-01-15")).unwrap();
    let value = serde_json::to_value(&output).unwrap();
    assert_eq!(value["conflicts"][0]["type"], "overlap");
    assert_eq!(value["conflicts"][0]["severity"], "warning");
    assert!(value["conflicts"][0]["message"].is_string());
}

#[test]
fn pattern_exchange_through_a_series() {
    let value = json!({
        "id": uuid::Uuid::new_v4(),
        "title": "Payday",
        "startDate": "2024-01-01",
        "pattern": {"type": "lastWeekdayOfMonth", "weekday": "friday"},
        "time": {"at": "17:00:00"},
        "duration": {"type": "fixed", "minutes": 30},
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": "2024-01-01T00:00:00Z",
    });
    let series: Series = serde_json::from_value(value).unwrap();
    assert_eq!(
        series.pattern,
        Pattern::LastWeekdayOfMonth {
            weekday: chrono::Weekday::Fri
        }
    );
    assert!(series.validate().is_ok());
}

#[test]
fn planner_snapshot_round_trips_through_storage() {
    let dir = TempDir::new().unwrap();
    let storage = JsonStorage::new(dir.path()).unwrap();

    let mut planner = Planner::new("My Planner");
    let id = planner
        .create_series(
            Series::new(
                "Water plants",
                d("2024-01-01"),
                Pattern::EveryNDays { n: 3 },
                ScheduleTime::At(t(8, 0)),
                DurationSpec::Fixed { minutes: 10 },
            )
            .with_tag("home"),
        )
        .unwrap();
    planner
        .log_completion(
            id,
            d("2024-01-04"),
            d("2024-01-04").and_time(t(8, 0)),
            d("2024-01-04").and_time(t(8, 10)),
        )
        .unwrap();

    storage.save(&planner, "My Planner").unwrap();
    assert_eq!(storage.list().unwrap(), vec!["my_planner".to_string()]);

    let loaded = storage.load("My Planner").unwrap();
    assert_eq!(loaded.id, planner.id);
    assert_eq!(loaded.series.len(), 1);
    assert_eq!(loaded.series[0].title, "Water plants");
    assert_eq!(loaded.completions.len(), 1);
    assert_eq!(loaded.completions[0].duration_minutes, 10);
    assert_eq!(
        loaded.exception_for(id, d("2024-01-04")),
        planner.exception_for(id, d("2024-01-04"))
    );

    storage.delete("My Planner").unwrap();
    assert!(storage.load("My Planner").is_err());
}

#[test]
fn reflow_rejects_inverted_windows_before_doing_work() {
    let planner = Planner::new("exchange");
    assert!(planner.reflow(d("2025-01-20"), d("2025-01-10")).is_err());
}
