//! Signal quality scoring for received packets.
//!
//! The tier is read from SNR. RSSI only shifts the SNR reading by a fixed
//! margin so that a packet sitting on a tier boundary is rounded up when the
//! carrier is strong and down when it is weak. Because the shift depends on
//! RSSI alone, a better SNR at the same RSSI can never land in a worse tier.
//! Hop count is carried through to the report but never affects the tier.

use std::fmt;

/// Qualitative signal tier, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualityTier {
    VeryPoor,
    Poor,
    Fair,
    Good,
    VeryGood,
    Excellent,
}

impl QualityTier {
    /// Numeric grade, 0 (very poor) through 5 (excellent).
    pub fn grade(self) -> u8 {
        self as u8
    }

    pub fn phrase(self) -> &'static str {
        match self {
            QualityTier::VeryPoor => "very poor",
            QualityTier::Poor => "poor",
            QualityTier::Fair => "fair",
            QualityTier::Good => "good",
            QualityTier::VeryGood => "very good",
            QualityTier::Excellent => "excellent",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

/// Exclusive SNR floors (dB) for every tier above `VeryPoor`, best first.
const SNR_FLOORS: [(f32, QualityTier); 5] = [
    (10.0, QualityTier::Excellent),
    (5.0, QualityTier::VeryGood),
    (0.0, QualityTier::Good),
    (-5.0, QualityTier::Fair),
    (-10.0, QualityTier::Poor),
];

/// RSSI above this (dBm) nudges the SNR reading up.
pub const RSSI_STRONG_DBM: i32 = -100;
/// RSSI at or below this (dBm) nudges the SNR reading down.
pub const RSSI_WEAK_DBM: i32 = -110;
const RSSI_MARGIN_DB: f32 = 1.0;

/// Scored signal for one packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalReport {
    pub tier: QualityTier,
    pub hops: u32,
    pub rssi: i32,
    pub snr: f32,
}

impl SignalReport {
    pub fn phrase(&self) -> &'static str {
        self.tier.phrase()
    }

    pub fn grade(&self) -> u8 {
        self.tier.grade()
    }
}

/// Classify a packet. Any numeric input is accepted; NaN SNR reads as very poor.
pub fn score(hops: u32, rssi: i32, snr: f32) -> SignalReport {
    let adjusted = snr + rssi_bias(rssi);
    let tier = SNR_FLOORS
        .iter()
        .find(|(floor, _)| adjusted > *floor)
        .map(|(_, tier)| *tier)
        .unwrap_or(QualityTier::VeryPoor);
    SignalReport {
        tier,
        hops,
        rssi,
        snr,
    }
}

fn rssi_bias(rssi: i32) -> f32 {
    if rssi > RSSI_STRONG_DBM {
        RSSI_MARGIN_DB
    } else if rssi <= RSSI_WEAK_DBM {
        -RSSI_MARGIN_DB
    } else {
        0.0
    }
}
