//! Slack message bodies for alerts and escalations.

use chrono::{DateTime, Duration, Utc};
use nimbus_core::health::EscalationReason;
use nimbus_core::types::{Alert, Severity, Subscription, Urgency};
use serde_json::{json, Value};

const SUMMARY_LIMIT: usize = 200;

pub const ESCALATION_CHANNEL_NOTICE: &str =
    "🚨 *SYSTEM ALERT*: Weather monitoring system requires attention. Admins have been notified.";

pub fn urgency_emoji(urgency: Option<Urgency>) -> &'static str {
    match urgency {
        Some(Urgency::Immediate) => "🚨",
        Some(Urgency::Expected) => "⚠️",
        Some(Urgency::Future) => "📢",
        Some(Urgency::Past) => "📋",
        Some(Urgency::Unknown) | None => "ℹ️",
    }
}

/// Plain-text fallback shown in notifications.
pub fn alert_text(alert: &Alert) -> String {
    let title = if alert.title.is_empty() {
        "New Alert"
    } else {
        alert.title.as_str()
    };
    format!("{} Weather Alert: {}", urgency_emoji(alert.urgency), title)
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit - 3).collect();
    format!("{}...", cut)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %Y %H:%M UTC").to_string()
}

pub fn alert_blocks(alert: &Alert, subscription: &Subscription) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("{} Weather Alert - {}", urgency_emoji(alert.urgency), subscription.name),
                "emoji": true
            }
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*{}*", alert.headline()) }
        }),
    ];

    let fields: Vec<Value> = [
        ("Severity", alert.severity.map(|v| v.as_str())),
        ("Urgency", alert.urgency.map(|v| v.as_str())),
        ("Certainty", alert.certainty.map(|v| v.as_str())),
        ("Status", alert.status.map(|v| v.as_str())),
    ]
    .into_iter()
    .filter_map(|(label, value)| {
        value.map(|value| json!({ "type": "mrkdwn", "text": format!("*{}:* {}", label, value) }))
    })
    .collect();
    if !fields.is_empty() {
        blocks.push(json!({ "type": "section", "fields": fields }));
    }

    if let Some(area) = &alert.area_desc {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Areas Affected:* {}", area) }
        }));
    }

    if !alert.summary.is_empty() {
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*Summary:*\n{}", truncate(&alert.summary, SUMMARY_LIMIT))
            }
        }));
    }

    let window: Vec<String> = [("Effective", alert.effective), ("Expires", alert.expires)]
        .into_iter()
        .filter_map(|(label, at)| at.map(|at| format!("*{}:* {}", label, timestamp(at))))
        .collect();
    if !window.is_empty() {
        blocks.push(json!({
            "type": "context",
            "elements": [{ "type": "mrkdwn", "text": window.join(" | ") }]
        }));
    }

    if !alert.link.is_empty() {
        let style = if alert.severity == Some(Severity::Extreme) {
            "danger"
        } else {
            "primary"
        };
        blocks.push(json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": { "type": "plain_text", "text": "View Full Details", "emoji": true },
                "url": alert.link,
                "value": alert.id,
                "action_id": "view_alert_details",
                "style": style
            }]
        }));
    }

    blocks.push(json!({ "type": "divider" }));
    Value::Array(blocks)
}

pub fn admin_notice(alert: &Alert, subscription: &Subscription) -> String {
    format!(
        "🚨 *CRITICAL WEATHER ALERT* 🚨\n\n{} for {}\nSeverity: {}\n\nCheck the alerts channel for details.",
        alert.headline(),
        subscription.name,
        alert.severity.map(|s| s.as_str()).unwrap_or("Unknown")
    )
}

pub fn escalation_message(reasons: &[EscalationReason], uptime: Duration, now: DateTime<Utc>) -> String {
    let reasons = reasons
        .iter()
        .map(|reason| format!("• {}", reason))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "🚨 *WEATHER ALERTS SYSTEM FAILURE* 🚨\n\nReason:\n{}\nUptime: {} minutes\nTime: {}\n\n*IMMEDIATE ACTION REQUIRED*",
        reasons,
        uptime.num_minutes(),
        timestamp(now)
    )
}
