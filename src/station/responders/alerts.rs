//! `?alerts`: every active alert, chunked to fit the radio.
//!
//! The reply is a header message followed by each alert's fragments. An
//! alert is chunked from three blocks (title line, source line, body) so a
//! short alert fits in one fragment and a long body continues across
//! numbered fragments.

use crate::meshtastic::Position;
use crate::station::chunker::{AlertChunker, ReplyChunk};
use crate::station::weather::WeatherAlert;

use super::Reply;

/// Degrees and decimal minutes, e.g. `(45° 31.00′ N, 122° 40.80′ W)`.
pub fn format_dms(at: Position) -> String {
    fn part(value: f64, positive: char, negative: char) -> String {
        let degrees = value.abs().trunc();
        let minutes = (value.abs() - degrees) * 60.0;
        let hemisphere = if value >= 0.0 { positive } else { negative };
        format!("{}° {:.2}′ {}", degrees as u32, minutes, hemisphere)
    }
    format!(
        "({}, {})",
        part(at.latitude, 'N', 'S'),
        part(at.longitude, 'E', 'W')
    )
}

pub(super) fn reply(at: Position, alerts: &[WeatherAlert], chunker: AlertChunker) -> Reply {
    if alerts.is_empty() {
        return Reply::Single("No active weather alerts for your location.".to_string());
    }
    let total = alerts.len();
    let mut messages = vec![format!(
        "Weather Alerts for {}: {} active alert{}",
        format_dms(at),
        total,
        if total == 1 { "" } else { "s" }
    )];
    for (i, alert) in alerts.iter().enumerate() {
        let blocks = [
            format!("ALERT {}/{}: {}", i + 1, total, alert.title),
            format!("From: {}", alert.source),
            alert.body.clone(),
        ];
        messages.extend(chunker.chunk(&blocks).iter().map(ReplyChunk::render));
    }
    Reply::Sequence(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portland() -> Position {
        Position {
            latitude: 45.5167,
            longitude: -122.68,
        }
    }

    #[test]
    fn dms_uses_hemispheres() {
        assert_eq!(format_dms(portland()), "(45° 31.00′ N, 122° 40.80′ W)");
        assert_eq!(
            format_dms(Position {
                latitude: -33.5,
                longitude: 151.25
            }),
            "(33° 30.00′ S, 151° 15.00′ E)"
        );
    }

    #[test]
    fn no_alerts_is_a_single_reply() {
        assert_eq!(
            reply(portland(), &[], AlertChunker::new(200)),
            Reply::Single("No active weather alerts for your location.".into())
        );
    }

    #[test]
    fn header_then_chunked_alerts() {
        let alerts = vec![
            WeatherAlert {
                title: "Wind Advisory".into(),
                source: "NWS Portland".into(),
                body: "South winds 20 to 30 mph.".into(),
            },
            WeatherAlert {
                title: "Flood Watch".into(),
                source: "NWS Portland".into(),
                body: "Heavy rain may cause rivers to rise. ".repeat(6),
            },
        ];
        let parts = reply(portland(), &alerts, AlertChunker::new(120)).into_parts();
        assert_eq!(
            parts[0],
            "Weather Alerts for (45° 31.00′ N, 122° 40.80′ W): 2 active alerts"
        );
        assert_eq!(
            parts[1],
            "ALERT 1/2: Wind Advisory\nFrom: NWS Portland\nSouth winds 20 to 30 mph. (1/1)"
        );
        assert!(parts[2].starts_with("ALERT 2/2: Flood Watch"));
        assert!(parts.len() > 3);
        assert!(parts[1..].iter().all(|p| p.len() <= 120));
        assert!(parts.last().unwrap().ends_with(&format!("({}/{})", parts.len() - 2, parts.len() - 2)));
    }
}
