//! `?help` and `?help <command>`.

use super::Responder;

pub(super) fn reply(available: &[&str], topic: Option<&str>) -> String {
    match topic {
        None => format!(
            "Available commands: {}\n\nUse ?help [command] for details.",
            available.join(", ")
        ),
        Some(topic) => {
            let topic = topic.trim_start_matches('?');
            let known = Responder::PRIORITY
                .into_iter()
                .find(|r| r.command() == Some(topic) && available.contains(&topic));
            match known {
                Some(responder) => format!("?{}: {}", topic, responder.description()),
                None => format!("Unknown command: ?{}", topic),
            }
        }
    }
}
