//! `?check`: raw link numbers for the triggering packet.

use crate::meshtastic::InboundMessage;

pub(super) fn reply(msg: &InboundMessage) -> String {
    format!(
        "copy from {} {} away with {}dBm and {:.1}dB SNR",
        msg.hops,
        if msg.hops == 1 { "hop" } else { "hops" },
        msg.rssi,
        msg.snr
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshtastic::NodeId;
    use chrono::Utc;

    #[test]
    fn reports_hops_rssi_and_snr() {
        let mut msg = InboundMessage {
            sender: NodeId(7),
            sender_name: None,
            channel: 1,
            hops: 2,
            rssi: -97,
            snr: -3.5,
            position: None,
            text: "?check".into(),
            received_at: Utc::now(),
        };
        assert_eq!(reply(&msg), "copy from 2 hops away with -97dBm and -3.5dB SNR");
        msg.hops = 1;
        assert!(reply(&msg).starts_with("copy from 1 hop away"));
    }
}
