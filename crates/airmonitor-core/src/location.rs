//! Device position lookup.
//!
//! A terminal has no GPS, so the default provider reports the position
//! stored in the configuration.

use anyhow::Result;

use crate::models::Coordinates;

/// Source of the device's last known position.
pub trait LocationProvider: Send + Sync {
    /// `Ok(None)` when no position has been recorded yet.
    fn last_known(&self) -> Result<Option<Coordinates>>;
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinates);

impl LocationProvider for FixedLocation {
    fn last_known(&self) -> Result<Option<Coordinates>> {
        Ok(Some(self.0))
    }
}

/// Used when no position is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn last_known(&self) -> Result<Option<Coordinates>> {
        Ok(None)
    }
}

/// Provider for an optional configured position.
pub fn from_config(position: Option<Coordinates>) -> Box<dyn LocationProvider> {
    match position {
        Some(position) => Box::new(FixedLocation(position)),
        None => Box::new(NoLocation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let fixed = from_config(Some(Coordinates::new(50.0, 19.0)));
        assert_eq!(
            fixed.last_known().unwrap(),
            Some(Coordinates::new(50.0, 19.0))
        );
        assert_eq!(from_config(None).last_known().unwrap(), None);
    }
}
