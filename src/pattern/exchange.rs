//! Wire form of [`Pattern`]: tagged records with the legacy field spellings
//! still accepted on input. Canonical output uses lowercase type tags, `day`,
//! and plural numeric weekday arrays (0=sun).

use std::fmt;

use chrono::Weekday;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::calendar::{weekday_from_index, weekday_from_name, weekday_index};
use crate::errors::EngineError;

use super::{normalize_weekdays, Pattern};

/// Weekday in exchange form: a number 0..=7 (7 wraps to 0) or an English
/// name, full or 3-letter, case-insensitive. Serializes as the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdaySpec(pub Weekday);

impl Serialize for WeekdaySpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(weekday_index(self.0))
    }
}

impl<'de> Deserialize<'de> for WeekdaySpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WeekdayVisitor;

        impl<'de> Visitor<'de> for WeekdayVisitor {
            type Value = WeekdaySpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a weekday number 0..=7 or an English weekday name")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                if value > 7 {
                    return Err(E::custom(format!("weekday index {} out of range 0..=7", value)));
                }
                weekday_from_index(value as u8)
                    .map(WeekdaySpec)
                    .map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                if value < 0 {
                    return Err(E::custom(format!("weekday index {} out of range 0..=7", value)));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                weekday_from_name(value).map(WeekdaySpec).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(WeekdayVisitor)
    }
}

/// Either a single weekday or a list; `weekly` historically accepted both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeekdaySetSpec {
    One(WeekdaySpec),
    Many(Vec<WeekdaySpec>),
}

impl WeekdaySetSpec {
    fn into_weekdays(self) -> Vec<Weekday> {
        match self {
            WeekdaySetSpec::One(day) => vec![day.0],
            WeekdaySetSpec::Many(days) => days.into_iter().map(|day| day.0).collect(),
        }
    }
}

/// The §6 tagged record. Input accepts the legacy unions (`dayOfWeek`,
/// `daysOfWeek`, `dayOfMonth`); output is canonical.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PatternSpec {
    Daily,
    EveryNDays {
        n: u32,
    },
    Weekly {
        #[serde(default, alias = "dayOfWeek", skip_serializing_if = "Option::is_none")]
        days_of_week: Option<WeekdaySetSpec>,
    },
    EveryNWeeks {
        n: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weekday: Option<WeekdaySpec>,
    },
    Monthly {
        #[serde(alias = "dayOfMonth")]
        day: u32,
    },
    LastDayOfMonth,
    Yearly {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        month: Option<u32>,
        #[serde(default, alias = "dayOfMonth", skip_serializing_if = "Option::is_none")]
        day: Option<u32>,
    },
    Weekdays {
        #[serde(alias = "daysOfWeek")]
        days: Vec<WeekdaySpec>,
    },
    WeekdaysOnly,
    WeekendsOnly,
    NthWeekdayOfMonth {
        n: u32,
        weekday: WeekdaySpec,
    },
    LastWeekdayOfMonth {
        weekday: WeekdaySpec,
    },
    NthToLastWeekdayOfMonth {
        n: u32,
        weekday: WeekdaySpec,
    },
    Union {
        patterns: Vec<PatternSpec>,
    },
    Except {
        base: Box<PatternSpec>,
        exceptions: Vec<PatternSpec>,
    },
}

impl TryFrom<PatternSpec> for Pattern {
    type Error = EngineError;

    fn try_from(spec: PatternSpec) -> Result<Self, Self::Error> {
        let pattern = match spec {
            PatternSpec::Daily => Pattern::Daily,
            PatternSpec::EveryNDays { n } => Pattern::EveryNDays { n },
            PatternSpec::Weekly { days_of_week } => match days_of_week {
                None => Pattern::Weekly { weekday: None },
                Some(set) => {
                    let mut days = set.into_weekdays();
                    if days.is_empty() {
                        return Err(EngineError::InvalidPattern(
                            "weekly weekday list must not be empty".into(),
                        ));
                    }
                    normalize_weekdays(&mut days);
                    if days.len() == 1 {
                        Pattern::Weekly {
                            weekday: Some(days[0]),
                        }
                    } else {
                        Pattern::Weekdays { days }
                    }
                }
            },
            PatternSpec::EveryNWeeks { n, weekday } => Pattern::EveryNWeeks {
                n,
                weekday: weekday.map(|day| day.0),
            },
            PatternSpec::Monthly { day } => Pattern::Monthly { day },
            PatternSpec::LastDayOfMonth => Pattern::LastDayOfMonth,
            PatternSpec::Yearly { month, day } => Pattern::Yearly { month, day },
            PatternSpec::Weekdays { days } => {
                let mut days: Vec<Weekday> = days.into_iter().map(|day| day.0).collect();
                normalize_weekdays(&mut days);
                Pattern::Weekdays { days }
            }
            PatternSpec::WeekdaysOnly => Pattern::WeekdaysOnly,
            PatternSpec::WeekendsOnly => Pattern::WeekendsOnly,
            PatternSpec::NthWeekdayOfMonth { n, weekday } => Pattern::NthWeekdayOfMonth {
                n,
                weekday: weekday.0,
            },
            PatternSpec::LastWeekdayOfMonth { weekday } => Pattern::LastWeekdayOfMonth {
                weekday: weekday.0,
            },
            PatternSpec::NthToLastWeekdayOfMonth { n, weekday } => {
                Pattern::NthToLastWeekdayOfMonth {
                    n,
                    weekday: weekday.0,
                }
            }
            PatternSpec::Union { patterns } => Pattern::Union {
                patterns: patterns
                    .into_iter()
                    .map(Pattern::try_from)
                    .collect::<Result<_, _>>()?,
            },
            PatternSpec::Except { base, exceptions } => Pattern::Except {
                base: Box::new(Pattern::try_from(*base)?),
                exceptions: exceptions
                    .into_iter()
                    .map(Pattern::try_from)
                    .collect::<Result<_, _>>()?,
            },
        };
        pattern.validate()?;
        Ok(pattern)
    }
}

impl From<&Pattern> for PatternSpec {
    fn from(pattern: &Pattern) -> Self {
        match pattern {
            Pattern::Daily => PatternSpec::Daily,
            Pattern::EveryNDays { n } => PatternSpec::EveryNDays { n: *n },
            Pattern::Weekly { weekday } => PatternSpec::Weekly {
                days_of_week: weekday.map(|day| WeekdaySetSpec::Many(vec![WeekdaySpec(day)])),
            },
            Pattern::EveryNWeeks { n, weekday } => PatternSpec::EveryNWeeks {
                n: *n,
                weekday: weekday.map(WeekdaySpec),
            },
            Pattern::Monthly { day } => PatternSpec::Monthly { day: *day },
            Pattern::LastDayOfMonth => PatternSpec::LastDayOfMonth,
            Pattern::Yearly { month, day } => PatternSpec::Yearly {
                month: *month,
                day: *day,
            },
            Pattern::Weekdays { days } => PatternSpec::Weekdays {
                days: days.iter().map(|day| WeekdaySpec(*day)).collect(),
            },
            Pattern::WeekdaysOnly => PatternSpec::WeekdaysOnly,
            Pattern::WeekendsOnly => PatternSpec::WeekendsOnly,
            Pattern::NthWeekdayOfMonth { n, weekday } => PatternSpec::NthWeekdayOfMonth {
                n: *n,
                weekday: WeekdaySpec(*weekday),
            },
            Pattern::LastWeekdayOfMonth { weekday } => PatternSpec::LastWeekdayOfMonth {
                weekday: WeekdaySpec(*weekday),
            },
            Pattern::NthToLastWeekdayOfMonth { n, weekday } => {
                PatternSpec::NthToLastWeekdayOfMonth {
                    n: *n,
                    weekday: WeekdaySpec(*weekday),
                }
            }
            Pattern::Union { patterns } => PatternSpec::Union {
                patterns: patterns.iter().map(PatternSpec::from).collect(),
            },
            Pattern::Except { base, exceptions } => PatternSpec::Except {
                base: Box::new(PatternSpec::from(base.as_ref())),
                exceptions: exceptions.iter().map(PatternSpec::from).collect(),
            },
        }
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PatternSpec::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let spec = PatternSpec::deserialize(deserializer)?;
        Pattern::try_from(spec).map_err(de::Error::custom)
    }
}
