//! Common identity types for the STS harness.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a controller under test.
///
/// Random (UUID v4) unless derived with [`ControllerId::from_seed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(pub Uuid);

impl ControllerId {
    /// Creates a new random ControllerId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic ControllerId from a seed.
    ///
    /// Configs that omit controller IDs get `from_seed(position)`, so a
    /// replayed config logs the same identities.
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for ControllerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ControllerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Datapath identifier of a simulated switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SwitchId(pub u64);

impl std::fmt::Display for SwitchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_id_from_seed_is_stable() {
        assert_eq!(ControllerId::from_seed(7), ControllerId::from_seed(7));
        assert_ne!(ControllerId::from_seed(7), ControllerId::from_seed(8));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(ControllerId::from_seed(1).to_string().len(), 8);
        assert_eq!(SwitchId(3).to_string(), "s3");
    }
}
