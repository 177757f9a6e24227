//! `?reminders`: the configured scheduled messages.

use crate::schedule::ScheduledRule;

pub(super) fn reply(rules: &[ScheduledRule]) -> String {
    if rules.is_empty() {
        return "No scheduled messages configured.".to_string();
    }
    let mut lines = vec![format!("Scheduled messages ({}):", rules.len())];
    for (i, rule) in rules.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, rule.summary()));
    }
    lines.join("\n")
}
