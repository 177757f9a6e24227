mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use checkmate::schedule::{parse_rules, spawn_scheduler, ScheduledRule, Scheduler};
use checkmate::station::chunker::AlertChunker;
use checkmate::station::dispatch::{start_dispatcher, DispatchConfig};

use common::RecordingLink;

const ALL_DAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

#[test]
fn weekly_rules_fire_once_per_matching_day() {
    let rules = parse_rules(
        "Mon,Wed;19:00;America/Los_Angeles;2;Net in one hour;;;Sat;09:00;UTC;1;Coffee net",
    )
    .expect("rules");
    let mut scheduler = Scheduler::new(rules, Duration::from_secs(30));

    // Monday 2024-03-04 through Sunday 2024-03-10, one tick every 30s
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
    let mut fired = Vec::new();
    for step in 0..(7 * 24 * 120) {
        let now = start + chrono::Duration::seconds(30 * step);
        for announcement in scheduler.due(now) {
            fired.push((now, announcement.channel, announcement.text));
        }
    }

    let texts: Vec<&str> = fired.iter().map(|(_, _, t)| t.as_str()).collect();
    assert_eq!(
        texts,
        vec!["Net in one hour", "Net in one hour", "Coffee net"],
        "fired: {:?}",
        fired
    );
    // 19:00 PST is 03:00 UTC the next day
    assert_eq!(fired[0].0, Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap());
    assert_eq!(fired[0].1, 2);
    assert_eq!(fired[2].0, Utc.with_ymd_and_hms(2024, 3, 9, 9, 0, 0).unwrap());
}

#[test]
fn a_restarted_scheduler_may_repeat_todays_message() {
    let rule = || parse_rules("Sat;09:00;UTC;1;Coffee net").expect("rule");
    let now = Utc.with_ymd_and_hms(2024, 3, 9, 9, 0, 10).unwrap();

    let mut first = Scheduler::new(rule(), Duration::from_secs(30));
    assert_eq!(first.due(now).len(), 1);
    assert!(first.due(now + chrono::Duration::seconds(20)).is_empty());

    // firing state lives only in memory
    let mut restarted = Scheduler::new(rule(), Duration::from_secs(30));
    assert_eq!(restarted.due(now + chrono::Duration::seconds(20)).len(), 1);
}

#[tokio::test]
async fn spawned_scheduler_sends_long_messages_in_parts() {
    let link = Arc::new(RecordingLink::default());
    let (queue, _dispatcher) = start_dispatcher(
        DispatchConfig {
            pacing: Duration::from_millis(10),
            queue_capacity: 8,
        },
        link.clone(),
    );

    let now = Utc::now();
    let text = "Weekly net tonight on the repeater. ".repeat(4);
    let rule = ScheduledRule::from_parts(
        &ALL_DAYS,
        &now.format("%H:%M").to_string(),
        "UTC",
        5,
        &text,
    )
    .expect("rule");
    // a tick window wider than a minute keeps the first tick inside it
    let scheduler = Scheduler::new(vec![rule], Duration::from_secs(120));
    let handle = spawn_scheduler(scheduler, queue, AlertChunker::new(64));

    let expected = AlertChunker::new(64).split_message(text.trim());
    assert!(expected.len() >= 3);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while link.texts().len() < expected.len() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();

    assert_eq!(link.texts(), expected);
    let sent = link.sent();
    assert!(sent.iter().all(|(_, channel, _)| *channel == 5));
    assert!(sent.iter().all(|(_, _, part)| part.len() <= 64));
}
