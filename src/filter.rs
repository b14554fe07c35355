//! Restriction predicates
//!
//! A [`Restriction`] is the typed form of the filter handed to
//! [`AutomationHost::restrict`]. It renders to the DASL (`@SQL=`) syntax a COM
//! host expects, and it can be evaluated client-side against any
//! [`FieldSource`] so hosts without restriction support get identical
//! semantics.

use std::collections::HashMap;

use chrono::{DateTime, Duration, DurationRound, Utc};

use crate::host::{AutomationHost, FlagField, HostResult, ItemHandle, TextField, TimeField};

/// Server-side item filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restriction {
    /// Timestamp is present and `>=` the instant
    OnOrAfter(TimeField, DateTime<Utc>),
    /// Timestamp is present and `<=` the instant
    OnOrBefore(TimeField, DateTime<Utc>),
    /// Boolean property is set
    IsTrue(FlagField),
    /// Case-insensitive substring match in any of the fields
    Contains {
        fields: Vec<TextField>,
        needle: String,
    },
    /// Every predicate holds
    All(Vec<Restriction>),
}

/// Read access to the properties a restriction inspects
pub trait FieldSource {
    fn text(&mut self, field: TextField) -> HostResult<Option<String>>;
    fn time(&mut self, field: TimeField) -> HostResult<Option<DateTime<Utc>>>;
    fn flag(&mut self, field: FlagField) -> HostResult<bool>;
}

/// An item read through the host, one property call per field
pub struct HostItem<'a> {
    pub host: &'a mut dyn AutomationHost,
    pub item: ItemHandle,
}

impl FieldSource for HostItem<'_> {
    fn text(&mut self, field: TextField) -> HostResult<Option<String>> {
        self.host.item_text(self.item, field)
    }

    fn time(&mut self, field: TimeField) -> HostResult<Option<DateTime<Utc>>> {
        self.host.item_time(self.item, field)
    }

    fn flag(&mut self, field: FlagField) -> HostResult<bool> {
        self.host.item_flag(self.item, field)
    }
}

impl Restriction {
    /// Text match across several fields
    pub fn contains(fields: &[TextField], needle: impl Into<String>) -> Self {
        Self::Contains {
            fields: fields.to_vec(),
            needle: needle.into(),
        }
    }

    /// AND-combine the given predicates
    ///
    /// Returns `None` for an empty input and the predicate itself for a
    /// single one, so callers never build degenerate conjunctions.
    pub fn all(parts: impl IntoIterator<Item = Restriction>) -> Option<Self> {
        let mut parts: Vec<Restriction> = parts.into_iter().collect();
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Self::All(parts)),
        }
    }

    /// Check that the predicate is well formed
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found: empty needle or
    /// field list, empty conjunction, control characters, or a lower bound
    /// after an upper bound on the same field.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::OnOrAfter(..) | Self::OnOrBefore(..) | Self::IsTrue(_) => Ok(()),
            Self::Contains { fields, needle } => {
                if fields.is_empty() {
                    return Err("text match needs at least one field".to_owned());
                }
                if needle.is_empty() {
                    return Err("text match needle is empty".to_owned());
                }
                if needle.chars().any(|ch| ch.is_control()) {
                    return Err("text match needle contains control characters".to_owned());
                }
                Ok(())
            }
            Self::All(parts) => {
                if parts.is_empty() {
                    return Err("empty conjunction".to_owned());
                }
                for part in parts {
                    part.validate()?;
                }
                let mut lower: HashMap<TimeField, DateTime<Utc>> = HashMap::new();
                let mut upper: HashMap<TimeField, DateTime<Utc>> = HashMap::new();
                for part in parts {
                    match part {
                        Self::OnOrAfter(field, at) => {
                            let entry = lower.entry(*field).or_insert(*at);
                            *entry = (*entry).max(*at);
                        }
                        Self::OnOrBefore(field, at) => {
                            let entry = upper.entry(*field).or_insert(*at);
                            *entry = (*entry).min(*at);
                        }
                        _ => {}
                    }
                }
                for (field, from) in &lower {
                    if let Some(to) = upper.get(field)
                        && from > to
                    {
                        return Err(format!(
                            "empty range on {}: {} is after {}",
                            time_property(*field),
                            dasl_time(*from, Bound::Lower),
                            dasl_time(*to, Bound::Upper)
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    /// Latest lower bound this predicate places on `field`
    ///
    /// Used to stop a newest-first scan at the first item outside the window.
    pub fn lower_bound(&self, field: TimeField) -> Option<DateTime<Utc>> {
        match self {
            Self::OnOrAfter(f, at) if *f == field => Some(*at),
            Self::All(parts) => parts.iter().filter_map(|p| p.lower_bound(field)).max(),
            _ => None,
        }
    }

    /// Render as a DASL filter string (`@SQL=...`)
    pub fn to_filter_string(&self) -> String {
        format!("@SQL={}", self.sql())
    }

    fn sql(&self) -> String {
        match self {
            Self::OnOrAfter(field, at) => {
                format!("\"{}\" >= '{}'", time_property(*field), dasl_time(*at, Bound::Lower))
            }
            Self::OnOrBefore(field, at) => {
                format!("\"{}\" <= '{}'", time_property(*field), dasl_time(*at, Bound::Upper))
            }
            Self::IsTrue(FlagField::Unread) => format!("\"{}\" = 0", flag_property(FlagField::Unread)),
            Self::IsTrue(field) => format!("\"{}\" = 1", flag_property(*field)),
            Self::Contains { fields, needle } => {
                let escaped = needle.replace('\'', "''");
                let clauses = fields
                    .iter()
                    .map(|f| format!("\"{}\" LIKE '%{escaped}%'", text_property(*f)))
                    .collect::<Vec<_>>();
                if clauses.len() == 1 {
                    clauses.join("")
                } else {
                    format!("({})", clauses.join(" OR "))
                }
            }
            Self::All(parts) => parts
                .iter()
                .map(Self::sql)
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }

    /// Evaluate the predicate client-side
    ///
    /// # Errors
    ///
    /// Propagates property read failures from the source.
    pub fn evaluate(&self, source: &mut dyn FieldSource) -> HostResult<bool> {
        match self {
            Self::OnOrAfter(field, at) => Ok(source.time(*field)?.is_some_and(|t| t >= *at)),
            Self::OnOrBefore(field, at) => Ok(source.time(*field)?.is_some_and(|t| t <= *at)),
            Self::IsTrue(field) => source.flag(*field),
            Self::Contains { fields, needle } => {
                let needle = needle.to_lowercase();
                for field in fields {
                    if let Some(value) = source.text(*field)?
                        && value.to_lowercase().contains(&needle)
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::All(parts) => {
                for part in parts {
                    if !part.evaluate(source)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Lower,
    Upper,
}

/// DASL timestamp literal, whole minutes only
///
/// A lower bound is rounded up and an upper bound down, so the rendered
/// filter never admits an item outside the typed range.
fn dasl_time(at: DateTime<Utc>, bound: Bound) -> String {
    let minute = Duration::minutes(1);
    let floor = at.duration_trunc(minute).unwrap_or(at);
    let literal = match bound {
        Bound::Lower if floor < at => floor + minute,
        _ => floor,
    };
    literal.format("%Y-%m-%d %H:%M").to_string()
}

fn time_property(field: TimeField) -> &'static str {
    match field {
        TimeField::Received => "urn:schemas:httpmail:datereceived",
        TimeField::SentOn => "urn:schemas:httpmail:date",
        TimeField::Start => "urn:schemas:calendar:dtstart",
        TimeField::End => "urn:schemas:calendar:dtend",
    }
}

fn flag_property(field: FlagField) -> &'static str {
    match field {
        FlagField::Unread => "urn:schemas:httpmail:read",
        FlagField::AllDayEvent => "urn:schemas:calendar:alldayevent",
        FlagField::ReminderSet => {
            "http://schemas.microsoft.com/mapi/id/{00062008-0000-0000-C000-000000000046}/85030003"
        }
    }
}

fn text_property(field: TextField) -> &'static str {
    match field {
        TextField::Subject => "urn:schemas:httpmail:subject",
        TextField::Body => "urn:schemas:httpmail:textdescription",
        TextField::SenderName => "urn:schemas:httpmail:fromname",
        TextField::SenderEmail => "urn:schemas:httpmail:fromemail",
        TextField::To | TextField::RequiredAttendees => "urn:schemas:httpmail:displayto",
        TextField::Cc | TextField::OptionalAttendees => "urn:schemas:httpmail:displaycc",
        TextField::Bcc => "urn:schemas:httpmail:displaybcc",
        TextField::Categories => "urn:schemas-microsoft-com:office:office#Keywords",
        TextField::Location => "urn:schemas:calendar:location",
        TextField::Organizer => "urn:schemas:calendar:organizer",
        TextField::FullName => "urn:schemas:contacts:cn",
        TextField::Email1 => "urn:schemas:contacts:email1",
        TextField::Email2 => "urn:schemas:contacts:email2",
        TextField::Email3 => "urn:schemas:contacts:email3",
        TextField::Company => "urn:schemas:contacts:o",
        TextField::JobTitle => "urn:schemas:contacts:title",
        TextField::BusinessPhone => "urn:schemas:contacts:officetelephonenumber",
        TextField::MobilePhone => "urn:schemas:contacts:mobile",
        TextField::HomePhone => "urn:schemas:contacts:homePhone",
        TextField::BusinessAddress => "urn:schemas:contacts:workaddress",
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{FieldSource, Restriction};
    use crate::host::{FlagField, HostResult, TextField, TimeField};

    struct Fixture {
        subject: Option<String>,
        received: Option<DateTime<Utc>>,
        unread: bool,
    }

    impl FieldSource for Fixture {
        fn text(&mut self, field: TextField) -> HostResult<Option<String>> {
            Ok(match field {
                TextField::Subject => self.subject.clone(),
                _ => None,
            })
        }

        fn time(&mut self, field: TimeField) -> HostResult<Option<DateTime<Utc>>> {
            Ok(match field {
                TimeField::Received => self.received,
                _ => None,
            })
        }

        fn flag(&mut self, field: FlagField) -> HostResult<bool> {
            Ok(field == FlagField::Unread && self.unread)
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, 9, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn renders_dasl_conjunction() {
        let r = Restriction::all([
            Restriction::OnOrAfter(TimeField::Received, at(14)),
            Restriction::contains(&[TextField::Subject, TextField::Body], "o'brien"),
        ])
        .expect("two parts");
        assert_eq!(
            r.to_filter_string(),
            "@SQL=\"urn:schemas:httpmail:datereceived\" >= '2026-10-14 09:30' AND \
             (\"urn:schemas:httpmail:subject\" LIKE '%o''brien%' OR \
             \"urn:schemas:httpmail:textdescription\" LIKE '%o''brien%')"
        );
    }

    #[test]
    fn all_collapses_trivial_conjunctions() {
        assert!(Restriction::all([]).is_none());
        let single = Restriction::all([Restriction::IsTrue(FlagField::Unread)]);
        assert_eq!(single, Some(Restriction::IsTrue(FlagField::Unread)));
    }

    #[test]
    fn validate_rejects_malformed_predicates() {
        assert!(Restriction::contains(&[TextField::Subject], "").validate().is_err());
        assert!(Restriction::contains(&[], "x").validate().is_err());
        assert!(Restriction::All(vec![]).validate().is_err());
        let inverted = Restriction::All(vec![
            Restriction::OnOrAfter(TimeField::Start, at(20)),
            Restriction::OnOrBefore(TimeField::Start, at(10)),
        ]);
        let err = inverted.validate().expect_err("inverted range must fail");
        assert!(err.contains("empty range"));
    }

    #[test]
    fn evaluate_matches_window_and_text() {
        let r = Restriction::All(vec![
            Restriction::OnOrAfter(TimeField::Received, at(14)),
            Restriction::contains(&[TextField::Subject], "INVOICE"),
        ]);
        let mut hit = Fixture {
            subject: Some("Your invoice #42".to_owned()),
            received: Some(at(15)),
            unread: false,
        };
        assert!(r.evaluate(&mut hit).expect("evaluates"));

        let mut old = Fixture {
            received: Some(at(14) - Duration::minutes(1)),
            ..hit
        };
        assert!(!r.evaluate(&mut old).expect("evaluates"));

        let mut undated = Fixture {
            subject: Some("invoice".to_owned()),
            received: None,
            unread: true,
        };
        assert!(!r.evaluate(&mut undated).expect("evaluates"));
        assert!(Restriction::IsTrue(FlagField::Unread)
            .evaluate(&mut undated)
            .expect("evaluates"));
    }

    #[test]
    fn lower_bound_picks_latest_bound_for_field() {
        let r = Restriction::All(vec![
            Restriction::OnOrAfter(TimeField::Received, at(10)),
            Restriction::OnOrAfter(TimeField::Received, at(12)),
            Restriction::OnOrAfter(TimeField::Start, at(20)),
        ]);
        assert_eq!(r.lower_bound(TimeField::Received), Some(at(12)));
        assert_eq!(r.lower_bound(TimeField::SentOn), None);
    }

    #[test]
    fn dasl_bounds_round_inward_to_whole_minutes() {
        let cutoff = at(14) + Duration::seconds(42);
        let r = Restriction::All(vec![
            Restriction::OnOrAfter(TimeField::Received, cutoff),
            Restriction::OnOrBefore(TimeField::Received, at(15) + Duration::seconds(42)),
        ]);
        assert_eq!(
            r.to_filter_string(),
            "@SQL=\"urn:schemas:httpmail:datereceived\" >= '2026-10-14 09:31' AND \
             \"urn:schemas:httpmail:datereceived\" <= '2026-10-15 09:30'"
        );

        let exact = Restriction::OnOrAfter(TimeField::Received, at(14));
        assert!(exact.to_filter_string().ends_with(">= '2026-10-14 09:30'"));
    }
}
