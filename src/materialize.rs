//! Item to record conversion
//!
//! Reads the properties of an enumerated item through the host and builds
//! the caller-facing record. Each property is one host call; a failure to
//! dereference any of them surfaces as `HostError::Dereference` so the
//! enumeration can skip the item.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::host::{
    AutomationHost, FlagField, HostResult, ItemHandle, NumberField, RuleAction, RuleCondition,
    RuleInfo, TextField, TimeField,
};
use crate::models::{ContactRecord, EmailRecord, EventRecord, RuleRecord};

/// Suffix appended to truncated bodies
const ELLIPSIS: &str = "...";

/// Truncate to `max_chars` characters, appending `...` if anything was cut
pub fn truncate_chars(input: String, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input;
    }
    let mut out: String = input.chars().take(max_chars).collect();
    out.push_str(ELLIPSIS);
    out
}

fn timestamp(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Body preview and full body length in characters
fn body(
    host: &mut dyn AutomationHost,
    item: ItemHandle,
    preview_chars: usize,
) -> HostResult<(String, usize)> {
    let full = host.item_text(item, TextField::Body)?.unwrap_or_default();
    let length = full.chars().count();
    Ok((truncate_chars(full, preview_chars), length))
}

fn importance_label(value: Option<i64>) -> &'static str {
    match value {
        Some(0) => "low",
        Some(2) => "high",
        _ => "normal",
    }
}

fn busy_status_label(value: Option<i64>) -> &'static str {
    match value {
        Some(0) => "free",
        Some(1) => "tentative",
        Some(3) => "out_of_office",
        Some(4) => "working_elsewhere",
        _ => "busy",
    }
}

/// Build an email record
pub fn email(
    host: &mut dyn AutomationHost,
    item: ItemHandle,
    folder: &str,
    preview_chars: usize,
) -> HostResult<EmailRecord> {
    let (body, body_length) = body(host, item, preview_chars)?;
    let attachment_count = host
        .item_number(item, NumberField::AttachmentCount)?
        .unwrap_or(0)
        .clamp(0, i64::from(u32::MAX)) as u32;
    Ok(EmailRecord {
        folder: folder.to_owned(),
        subject: host.item_text(item, TextField::Subject)?.unwrap_or_default(),
        sender: host.item_text(item, TextField::SenderName)?,
        sender_email: host.item_text(item, TextField::SenderEmail)?,
        recipients: host.item_text(item, TextField::To)?,
        cc: host.item_text(item, TextField::Cc)?,
        bcc: host.item_text(item, TextField::Bcc)?,
        received_time: timestamp(host.item_time(item, TimeField::Received)?),
        sent_on: timestamp(host.item_time(item, TimeField::SentOn)?),
        body,
        body_length,
        has_attachments: attachment_count > 0,
        attachment_count,
        importance: importance_label(host.item_number(item, NumberField::Importance)?).to_owned(),
        unread: host.item_flag(item, FlagField::Unread)?,
        categories: host.item_text(item, TextField::Categories)?,
    })
}

/// Build a calendar event record
pub fn event(
    host: &mut dyn AutomationHost,
    item: ItemHandle,
    preview_chars: usize,
) -> HostResult<EventRecord> {
    let (body, body_length) = body(host, item, preview_chars)?;
    let reminder_set = host.item_flag(item, FlagField::ReminderSet)?;
    let reminder_minutes = if reminder_set {
        host.item_number(item, NumberField::ReminderMinutes)?
    } else {
        None
    };
    Ok(EventRecord {
        subject: host.item_text(item, TextField::Subject)?.unwrap_or_default(),
        start: timestamp(host.item_time(item, TimeField::Start)?),
        end: timestamp(host.item_time(item, TimeField::End)?),
        location: host.item_text(item, TextField::Location)?,
        organizer: host.item_text(item, TextField::Organizer)?,
        required_attendees: host.item_text(item, TextField::RequiredAttendees)?,
        optional_attendees: host.item_text(item, TextField::OptionalAttendees)?,
        body,
        body_length,
        is_all_day_event: host.item_flag(item, FlagField::AllDayEvent)?,
        reminder_set,
        reminder_minutes,
        categories: host.item_text(item, TextField::Categories)?,
        busy_status: busy_status_label(host.item_number(item, NumberField::BusyStatus)?).to_owned(),
    })
}

/// Build a contact record
pub fn contact(host: &mut dyn AutomationHost, item: ItemHandle) -> HostResult<ContactRecord> {
    Ok(ContactRecord {
        full_name: host.item_text(item, TextField::FullName)?.unwrap_or_default(),
        email1: host.item_text(item, TextField::Email1)?,
        email2: host.item_text(item, TextField::Email2)?,
        email3: host.item_text(item, TextField::Email3)?,
        company: host.item_text(item, TextField::Company)?,
        job_title: host.item_text(item, TextField::JobTitle)?,
        business_phone: host.item_text(item, TextField::BusinessPhone)?,
        mobile_phone: host.item_text(item, TextField::MobilePhone)?,
        home_phone: host.item_text(item, TextField::HomePhone)?,
        business_address: host.item_text(item, TextField::BusinessAddress)?,
        categories: host.item_text(item, TextField::Categories)?,
    })
}

/// Build a rule record; the description joins the non-empty parts
pub fn rule(info: &RuleInfo) -> RuleRecord {
    let conditions: Vec<String> = info.conditions.iter().map(condition_text).collect();
    let actions: Vec<String> = info.actions.iter().map(action_text).collect();
    let exceptions: Vec<String> = info.exceptions.iter().map(exception_text).collect();

    let description = [("When", &conditions), ("Then", &actions), ("Except", &exceptions)]
        .into_iter()
        .filter(|(_, parts)| !parts.is_empty())
        .map(|(label, parts)| format!("{label}: {}", parts.join("; ")))
        .collect::<Vec<_>>()
        .join(" | ");

    RuleRecord {
        name: info.name.clone(),
        enabled: info.enabled,
        description,
        conditions,
        actions,
        exceptions,
    }
}

fn condition_text(condition: &RuleCondition) -> String {
    match condition {
        RuleCondition::SubjectContains { words } => {
            format!("Subject contains: {}", words.join(", "))
        }
        RuleCondition::BodyContains { words } => format!("Body contains: {}", words.join(", ")),
        RuleCondition::From { names } => format!("From: {}", names.join(", ")),
        RuleCondition::SentTo { names } => format!("Sent to: {}", names.join(", ")),
        RuleCondition::Cc { names } => format!("CC: {}", names.join(", ")),
        RuleCondition::Category { categories } => format!("Category: {}", categories.join(", ")),
        RuleCondition::Importance { level } => {
            let label = match level {
                0 => "Low",
                1 => "Normal",
                2 => "High",
                _ => "Unknown",
            };
            format!("Importance: {label}")
        }
    }
}

fn exception_text(condition: &RuleCondition) -> String {
    match condition {
        RuleCondition::From { names } => format!("Except from: {}", names.join(", ")),
        RuleCondition::Cc { names } => format!("Except if CC: {}", names.join(", ")),
        other => {
            let text = condition_text(other);
            let mut chars = text.chars();
            let lowered: String = chars
                .next()
                .map(|first| first.to_lowercase().chain(chars).collect())
                .unwrap_or_default();
            format!("Except if {lowered}")
        }
    }
}

fn action_text(action: &RuleAction) -> String {
    const UNKNOWN_FOLDER: &str = "(unable to determine)";
    match action {
        RuleAction::MoveToFolder { folder } => {
            format!("Move to folder: {}", folder.as_deref().unwrap_or(UNKNOWN_FOLDER))
        }
        RuleAction::CopyToFolder { folder } => {
            format!("Copy to folder: {}", folder.as_deref().unwrap_or(UNKNOWN_FOLDER))
        }
        RuleAction::Delete => "Delete message".to_owned(),
        RuleAction::MarkAsRead => "Mark as read".to_owned(),
        RuleAction::AssignCategory { categories } => {
            format!("Assign category: {}", categories.join(", "))
        }
        RuleAction::Forward { names } => format!("Forward to: {}", names.join(", ")),
        RuleAction::Redirect { names } => format!("Redirect to: {}", names.join(", ")),
    }
}
