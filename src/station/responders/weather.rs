//! `?weather`: current conditions at the station.

use crate::station::weather::Conditions;

pub(super) fn reply(now: &Conditions) -> String {
    let mut text = format!(
        "Weather for Lat {:.2}, Lon {:.2}: {}\n{:.1}°C (feels like {:.1}°C)\nhumidity {}%\nwind {:.1}m/s",
        now.latitude,
        now.longitude,
        capitalize(&now.description),
        now.temperature_c,
        now.feels_like_c,
        now.humidity,
        now.wind_speed_ms
    );
    if let Some(event) = &now.hazard {
        text.push_str(&format!("\n ⚠️ {}", event));
    }
    text
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
