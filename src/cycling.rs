//! Per-instance title rotation.
//!
//! Stateless modes derive the item from the instance number alone; gap-leap
//! modes hold a `current_index` that consumers advance on completion, so
//! skipped instances do not move the rotation.

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CyclingMode {
    Sequential,
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CyclingState {
    pub items: Vec<String>,
    pub mode: CyclingMode,
    #[serde(default)]
    pub gap_leap: bool,
    /// Present exactly when `gap_leap` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_index: Option<u32>,
}

impl CyclingState {
    pub fn sequential(items: Vec<String>) -> Self {
        Self {
            items,
            mode: CyclingMode::Sequential,
            gap_leap: false,
            current_index: None,
        }
    }

    pub fn random(items: Vec<String>) -> Self {
        Self {
            items,
            mode: CyclingMode::Random,
            gap_leap: false,
            current_index: None,
        }
    }

    pub fn with_gap_leap(mut self) -> Self {
        self.gap_leap = true;
        self.current_index = Some(0);
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.items.is_empty() {
            return Err(EngineError::Validation(
                "cycling items must not be empty".into(),
            ));
        }
        match (self.gap_leap, self.current_index) {
            (true, Some(index)) => {
                if index as usize >= self.items.len() {
                    return Err(EngineError::Validation(format!(
                        "cycling index {} out of range for {} items",
                        index,
                        self.items.len()
                    )));
                }
                Ok(())
            }
            (true, None) => Err(EngineError::Validation(
                "gap-leap cycling requires a current index".into(),
            )),
            (false, Some(_)) => Err(EngineError::Validation(
                "current index is only valid under gap-leap".into(),
            )),
            (false, None) => Ok(()),
        }
    }

    /// Resolves the item for the instance at `instance_number` (0-based
    /// position among the series' generated dates). Under gap-leap the
    /// instance number is deliberately ignored.
    pub fn resolve(&self, instance_number: u64) -> &str {
        let len = self.items.len() as u64;
        let index = match (self.mode, self.gap_leap) {
            (CyclingMode::Sequential, false) => instance_number % len,
            (CyclingMode::Sequential, true) => u64::from(self.current_index.unwrap_or(0)) % len,
            (CyclingMode::Random, false) => splitmix64(instance_number) % len,
            (CyclingMode::Random, true) => {
                splitmix64(u64::from(self.current_index.unwrap_or(0))) % len
            }
        };
        &self.items[index as usize]
    }

    /// Moves the gap-leap rotation forward one step, wrapping at the end.
    pub fn advance(&mut self) -> Result<(), EngineError> {
        if !self.gap_leap {
            return Err(EngineError::Validation(
                "cycling advance requires gap-leap mode".into(),
            ));
        }
        let len = self.items.len() as u32;
        let current = self.current_index.unwrap_or(0);
        self.current_index = Some((current + 1) % len);
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), EngineError> {
        if !self.gap_leap {
            return Err(EngineError::Validation(
                "cycling reset requires gap-leap mode".into(),
            ));
        }
        self.current_index = Some(0);
        Ok(())
    }
}

/// Deterministic 64-bit mix; the `random` modes must not touch a system RNG.
fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<String> {
        vec!["A".into(), "B".into(), "C".into()]
    }

    #[test]
    fn sequential_wraps_on_instance_number() {
        let cycling = CyclingState::sequential(items());
        assert_eq!(cycling.resolve(0), "A");
        assert_eq!(cycling.resolve(1), "B");
        assert_eq!(cycling.resolve(2), "C");
        assert_eq!(cycling.resolve(3), "A");
    }

    #[test]
    fn gap_leap_ignores_instance_number_and_advances() {
        let mut cycling = CyclingState::sequential(items()).with_gap_leap();
        cycling.current_index = Some(1);
        assert_eq!(cycling.resolve(0), "B");
        assert_eq!(cycling.resolve(17), "B");
        cycling.advance().unwrap();
        assert_eq!(cycling.current_index, Some(2));
        cycling.advance().unwrap();
        assert_eq!(cycling.current_index, Some(0));
    }

    #[test]
    fn random_mode_is_deterministic() {
        let cycling = CyclingState::random(items());
        let first = cycling.resolve(5).to_string();
        assert_eq!(cycling.resolve(5), first);
        let gap = CyclingState::random(items()).with_gap_leap();
        assert_eq!(gap.resolve(0), gap.resolve(99));
    }

    #[test]
    fn reset_returns_to_start() {
        let mut cycling = CyclingState::sequential(items()).with_gap_leap();
        cycling.advance().unwrap();
        cycling.reset().unwrap();
        assert_eq!(cycling.current_index, Some(0));
    }

    #[test]
    fn advance_without_gap_leap_is_rejected() {
        let mut cycling = CyclingState::sequential(items());
        assert!(cycling.advance().is_err());
        assert!(cycling.reset().is_err());
    }

    #[test]
    fn validation_enforces_index_presence() {
        let mut cycling = CyclingState::sequential(items());
        assert!(cycling.validate().is_ok());
        cycling.current_index = Some(0);
        assert!(cycling.validate().is_err());

        let mut cycling = CyclingState::sequential(items()).with_gap_leap();
        assert!(cycling.validate().is_ok());
        cycling.current_index = Some(3);
        assert!(cycling.validate().is_err());
        cycling.current_index = None;
        assert!(cycling.validate().is_err());

        assert!(CyclingState::sequential(vec![]).validate().is_err());
    }
}
