//! "radio check" / "mesh check": a friendly acknowledgment graded by signal.

use rand::Rng;

use crate::meshtastic::InboundMessage;
use crate::telemetry::{score, QualityTier};

const STRONG: [&str; 3] = [
    "{name}, reading you 5 by 5 from {loc}",
    "Good copy {name}, from {loc}",
    "Ack {name}, got a strong signal from {loc}",
];

const FAIR: [&str; 3] = [
    "{name}, copy from {loc}",
    "Ack {name} from {loc}",
    "{name}, got you here in {loc}",
];

const WEAK: [&str; 3] = [
    "Copy {name}, weak signal from {loc}",
    "{name}, barely got you from {loc}",
    "Ack {name}, but weak signal from {loc}",
];

fn templates(tier: QualityTier) -> &'static [&'static str; 3] {
    match tier {
        QualityTier::Excellent | QualityTier::VeryGood => &STRONG,
        QualityTier::Good | QualityTier::Fair => &FAIR,
        QualityTier::Poor | QualityTier::VeryPoor => &WEAK,
    }
}

/// Pick one template for `tier` and fill in the names.
pub fn acknowledgment<R: Rng + ?Sized>(
    rng: &mut R,
    tier: QualityTier,
    name: &str,
    location: &str,
) -> String {
    let options = templates(tier);
    options[rng.gen_range(0..options.len())]
        .replace("{name}", name)
        .replace("{loc}", location)
}

pub(super) fn reply(msg: &InboundMessage, location: &str) -> String {
    let report = score(msg.hops, msg.rssi, msg.snr);
    let ack = acknowledgment(
        &mut rand::thread_rng(),
        report.tier,
        &msg.sender_label(),
        location,
    );
    format!("{} ({} signal, SNR {:.1}dB)", ack, report.phrase(), msg.snr)
}
