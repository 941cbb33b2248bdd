use anyhow::{Context, Result};
use chrono::{Datelike, Duration, Month, NaiveDate};
use log::debug;
use regex::{Captures, Regex, RegexBuilder};

/// How far after a delivery keyword a date may appear
const WINDOW_CHARS: usize = 80;

/// A date without a year more than this many days before the reference is next year's
const PAST_TOLERANCE_DAYS: i64 = 180;

const MONTHS: &str =
    r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

#[derive(Debug, Clone, Copy)]
enum DateForm {
    Iso,
    Numeric,
    MonthFirst,
    DayFirst,
    Relative,
}

/// Finds the first parseable date following a delivery-related keyword.
///
/// `reference` is the date the message was received: it supplies the year
/// when the text omits it and anchors "today"/"tomorrow". Numeric dates whose
/// day and month cannot be told apart are skipped rather than guessed.
pub struct DeliveryDateExtractor {
    keywords: Vec<Regex>,
    forms: Vec<(DateForm, Regex)>,
}

impl DeliveryDateExtractor {
    pub fn new(keywords: &[String]) -> Result<Self> {
        let keywords = keywords
            .iter()
            .map(|k| {
                RegexBuilder::new(k)
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("Invalid delivery keyword pattern: {}", k))
            })
            .collect::<Result<Vec<_>>>()?;

        let form = |pattern: String| RegexBuilder::new(&pattern).case_insensitive(true).build();
        let forms = vec![
            (DateForm::Iso, form(r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b".to_string())?),
            (DateForm::Numeric, form(r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4}|\d{2})\b".to_string())?),
            (
                DateForm::MonthFirst,
                form(format!(
                    r"\b({})\.?(?:\s+|-)(\d{{1,2}})(?:st|nd|rd|th)?\b(?:(?:,?\s+|-)(\d{{4}})\b)?",
                    MONTHS
                ))?,
            ),
            (
                DateForm::DayFirst,
                form(format!(
                    r"\b(\d{{1,2}})(?:st|nd|rd|th)?(?:\s+(?:of\s+)?|-)({})\b\.?(?:(?:,?\s+|-)(\d{{4}})\b)?",
                    MONTHS
                ))?,
            ),
            (DateForm::Relative, form(r"\b(today|tomorrow)\b".to_string())?),
        ];

        Ok(DeliveryDateExtractor { keywords, forms })
    }

    pub fn extract(&self, text: &str, reference: NaiveDate) -> Option<NaiveDate> {
        let mut anchors: Vec<usize> = self
            .keywords
            .iter()
            .flat_map(|re| re.find_iter(text).map(|m| m.end()))
            .collect();
        anchors.sort_unstable();
        anchors.dedup();

        for anchor in anchors {
            let window = window_after(text, anchor);
            if let Some(date) = self.first_date(window, reference) {
                debug!("Found delivery date: {}", date);
                return Some(date);
            }
        }

        debug!("No delivery date found");
        None
    }

    fn first_date(&self, window: &str, reference: NaiveDate) -> Option<NaiveDate> {
        let mut candidates: Vec<(usize, DateForm, Captures)> = self
            .forms
            .iter()
            .flat_map(|(kind, re)| re.captures_iter(window).map(move |caps| (*kind, caps)))
            .filter_map(|(kind, caps)| caps.get(0).map(|m| (m.start(), kind, caps)))
            .collect();
        candidates.sort_by_key(|(start, _, _)| *start);

        candidates
            .iter()
            .find_map(|(_, kind, caps)| parse_candidate(*kind, caps, reference))
    }
}

fn window_after(text: &str, start: usize) -> &str {
    let rest = &text[start..];
    match rest.char_indices().nth(WINDOW_CHARS) {
        Some((end, _)) => &rest[..end],
        None => rest,
    }
}

fn parse_candidate(kind: DateForm, caps: &Captures, reference: NaiveDate) -> Option<NaiveDate> {
    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let year = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i32>().ok());

    match kind {
        DateForm::Iso => NaiveDate::from_ymd_opt(year(1)?, number(2)?, number(3)?),
        DateForm::Numeric => {
            let (first, second) = (number(1)?, number(2)?);
            let raw_year = caps.get(3)?.as_str();
            let mut y: i32 = raw_year.parse().ok()?;
            if raw_year.len() == 2 {
                y += 2000;
            }
            let (day, month) = resolve_day_month(first, second)?;
            NaiveDate::from_ymd_opt(y, month, day)
        }
        DateForm::MonthFirst => {
            let month = parse_month(caps.get(1)?.as_str())?;
            let day = number(2)?;
            with_year(year(3), month, day, reference)
        }
        DateForm::DayFirst => {
            let day = number(1)?;
            let month = parse_month(caps.get(2)?.as_str())?;
            with_year(year(3), month, day, reference)
        }
        DateForm::Relative => match caps.get(1)?.as_str().to_lowercase().as_str() {
            "today" => Some(reference),
            "tomorrow" => reference.checked_add_signed(Duration::days(1)),
            _ => None,
        },
    }
}

/// Day and month of an all-numeric date, only when unambiguous
fn resolve_day_month(first: u32, second: u32) -> Option<(u32, u32)> {
    match (first, second) {
        (a, b) if a == b => Some((a, b)),
        (a, b) if a > 12 && b <= 12 => Some((a, b)),
        (a, b) if b > 12 && a <= 12 => Some((b, a)),
        _ => None,
    }
}

fn parse_month(name: &str) -> Option<u32> {
    let key = name.trim_end_matches('.').to_lowercase();
    let key = if key == "sept" { "sep".to_string() } else { key };
    key.parse::<Month>().ok().map(|m| m.number_from_month())
}

fn with_year(year: Option<i32>, month: u32, day: u32, reference: NaiveDate) -> Option<NaiveDate> {
    if let Some(year) = year {
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let candidate = NaiveDate::from_ymd_opt(reference.year(), month, day)?;
    if candidate < reference - Duration::days(PAST_TOLERANCE_DAYS) {
        NaiveDate::from_ymd_opt(reference.year() + 1, month, day)
    } else {
        Some(candidate)
    }
}
