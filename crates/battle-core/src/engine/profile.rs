//! Operating profiles: Battle Mode, Hardware Protection, Audiophile Mode
//!
//! The flags are independent switches; which stages actually run is derived
//! from their combination. Battle mode gates the whole effect chain: with it
//! off the engine output is passed through untouched.
//!
//! | stage                 | runs when                              |
//! |-----------------------|----------------------------------------|
//! | bass boost            | battle (and a boost or tail)           |
//! | sub-harmonic, exciter | battle && !audiophile (and amount > 0) |
//! | compressor            | battle && !audiophile                  |
//! | limiter               | battle && limiter_enabled              |
//! | rumble/DC             | battle && hardware_protection          |
//! | clarity, dither       | battle && audiophile                   |
//!
//! Rate mode is a tempo/pitch concern and does not interact with profiles.

use serde::{Deserialize, Serialize};

/// Ceiling cap applied while hardware protection is on
pub const HARDWARE_PROTECTION_CEILING_DB: f32 = -0.5;

/// Presence boost amount used by Audiophile Mode (+1.2dB at 3kHz)
pub const AUDIOPHILE_CLARITY_AMOUNT: f32 = 0.2;

/// Profile switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatingProfile {
    pub battle_mode: bool,
    pub limiter_enabled: bool,
    pub hardware_protection: bool,
    pub audiophile_mode: bool,
}

impl Default for OperatingProfile {
    fn default() -> Self {
        Self {
            battle_mode: false,
            limiter_enabled: true,
            hardware_protection: true,
            audiophile_mode: false,
        }
    }
}

impl OperatingProfile {
    /// Any effect stage may run
    #[inline]
    pub fn effects_active(&self) -> bool {
        self.battle_mode
    }

    #[inline]
    pub fn compressor_enabled(&self) -> bool {
        self.battle_mode && !self.audiophile_mode
    }

    #[inline]
    pub fn limiter_active(&self) -> bool {
        self.battle_mode && self.limiter_enabled
    }

    /// Rumble high-pass and DC blocker
    #[inline]
    pub fn protection_active(&self) -> bool {
        self.battle_mode && self.hardware_protection
    }

    /// Coloration stages (sub-harmonic, exciter) are bypassed in audiophile mode
    #[inline]
    pub fn coloration_allowed(&self) -> bool {
        self.battle_mode && !self.audiophile_mode
    }

    /// Clarity enhance and dither
    #[inline]
    pub fn audiophile_active(&self) -> bool {
        self.battle_mode && self.audiophile_mode
    }

    /// Ceiling the limiter should enforce for a stored ceiling
    pub fn effective_ceiling_db(&self, ceiling_db: f32) -> f32 {
        if self.hardware_protection {
            ceiling_db.min(HARDWARE_PROTECTION_CEILING_DB)
        } else {
            ceiling_db
        }
    }
}
