use crate::filter::{Filter, Sorter};
use crate::record::{Priority, Status};
use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

/// Result of parsing a query string. `ignored` keeps the dropped tokens for
/// diagnostics; it never turns into an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub filters: Vec<Filter>,
    pub sorter: Option<Sorter>,
    pub ignored: Vec<String>,
}

/// Lenient parser for `key:value` / `+tag` queries. Unknown keys or values are
/// dropped so a malformed query widens the result instead of failing.
#[derive(Debug, Clone, Default)]
pub struct QueryLanguageParser {
    now: Option<DateTime<Utc>>, // fixed reference clock; None means Utc::now()
}

impl QueryLanguageParser {
    pub fn new() -> Self {
        Self { now: None }
    }

    pub fn with_now(now: DateTime<Utc>) -> Self {
        Self { now: Some(now) }
    }

    pub fn parse(&self, input: &str) -> ParsedQuery {
        let now = self.now.unwrap_or_else(Utc::now);
        let mut out = ParsedQuery::default();
        for token in tokenize(input) {
            match parse_token(&token, now) {
                Some(Term::Filter(f)) => out.filters.push(f),
                Some(Term::Sort(s)) => out.sorter = Some(s),
                None => out.ignored.push(token),
            }
        }
        if !out.ignored.is_empty() {
            tracing::debug!(ignored = ?out.ignored, "dropped unknown query tokens");
        }
        out
    }

    pub fn parse_filters(&self, input: &str) -> Vec<Filter> {
        self.parse(input).filters
    }
}

enum Term {
    Filter(Filter),
    Sort(Sorter),
}

fn parse_token(token: &str, now: DateTime<Utc>) -> Option<Term> {
    if let Some(tag) = token.strip_prefix('+') {
        return (!tag.is_empty()).then(|| Term::Filter(Filter::Tag(tag.to_string())));
    }
    if let Some(tag) = token.strip_prefix('-') {
        // "-3" is not a tag exclusion
        if tag.is_empty() || tag.parse::<f64>().is_ok() {
            return None;
        }
        return Some(Term::Filter(Filter::negate(Filter::Tag(tag.to_string()))));
    }
    let (key, raw) = token.split_once(':')?;
    let value = strip_quotes(raw);
    if value.is_empty() {
        return None;
    }
    let filter = match key.to_ascii_lowercase().as_str() {
        "status" => Filter::Status(value.parse::<Status>().ok()?),
        "project" | "proj" => Filter::Project(value.to_string()),
        "priority" | "pri" => Filter::Priority(value.parse::<Priority>().ok()?),
        "due" => {
            let (start, end) = resolve_date(value, now)?;
            Filter::DueDateRange { start: Some(start), end: Some(end) }
        }
        "due.before" | "due.by" => {
            let (start, _) = resolve_date(value, now)?;
            Filter::DueDateRange { start: None, end: Some(start - Duration::nanoseconds(1)) }
        }
        "due.after" => {
            let (_, end) = resolve_date(value, now)?;
            Filter::DueDateRange { start: Some(end + Duration::nanoseconds(1)), end: None }
        }
        "urgency.gt" | "urgency.over" => Filter::UrgencyRange { min: parse_number(value)?, max: f64::INFINITY },
        "urgency.lt" | "urgency.under" => Filter::UrgencyRange { min: f64::NEG_INFINITY, max: parse_number(value)? },
        "has" => match value.to_ascii_lowercase().as_str() {
            "due" => Filter::HasDueDate,
            "project" => Filter::HasProject,
            _ => return None,
        },
        "desc" | "description" => Filter::TextSearch(value.to_string()),
        "sort" => return parse_sorter(value).map(Term::Sort),
        _ => return None,
    };
    Some(Term::Filter(filter))
}

fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

// sort:urgency | sort:due+ | sort:project-
fn parse_sorter(value: &str) -> Option<Sorter> {
    let (name, dir) = match value.chars().last() {
        Some('+') => (&value[..value.len() - 1], Some(false)),
        Some('-') => (&value[..value.len() - 1], Some(true)),
        _ => (value, None),
    };
    match name.to_ascii_lowercase().as_str() {
        "urgency" => Some(Sorter::Urgency { descending: dir.unwrap_or(true) }),
        "due" => Some(Sorter::DueDate { descending: dir.unwrap_or(false) }),
        "project" => Some(Sorter::Project { descending: dir.unwrap_or(false) }),
        _ => None,
    }
}

// --- relative dates ---

/// Resolves a date word to an inclusive [start, end] window: a whole UTC day
/// for day-granular words, a single instant for `now`.
fn resolve_date(word: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let today = now.date_naive();
    let lower = word.to_ascii_lowercase();
    let day = match lower.as_str() {
        "now" => return Some((now, now)),
        "today" => today,
        "tomorrow" => today.checked_add_days(Days::new(1))?,
        "yesterday" => today.checked_sub_days(Days::new(1))?,
        "sow" => today.checked_sub_days(Days::new(today.weekday().num_days_from_monday() as u64))?,
        "eow" => today.checked_add_days(Days::new(6 - today.weekday().num_days_from_monday() as u64))?,
        "som" => today.with_day(1)?,
        "eom" => today.with_day(1)?.checked_add_months(Months::new(1))?.pred_opt()?,
        "soy" => NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
        "eoy" => NaiveDate::from_ymd_opt(today.year(), 12, 31)?,
        _ => {
            if let Some(wd) = parse_weekday(&lower) {
                next_weekday(today, wd)?
            } else if let Some(offset) = parse_offset(&lower) {
                today.checked_add_days(Days::new(offset))?
            } else {
                NaiveDate::parse_from_str(word, "%Y-%m-%d").ok()?
            }
        }
    };
    Some(day_window(day))
}

fn day_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::default()));
    let end = start + Duration::days(1) - Duration::nanoseconds(1);
    (start, end)
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

// strictly after today: "monday" on a monday is next week's monday
fn next_weekday(today: NaiveDate, wd: Weekday) -> Option<NaiveDate> {
    let from = today.weekday().num_days_from_monday() as i64;
    let to = wd.num_days_from_monday() as i64;
    let mut delta = (to - from).rem_euclid(7);
    if delta == 0 {
        delta = 7;
    }
    today.checked_add_days(Days::new(delta as u64))
}

// "3d" or "2w"
fn parse_offset(s: &str) -> Option<u64> {
    let unit = s.chars().last()?;
    let n: u64 = s[..s.len() - unit.len_utf8()].parse().ok()?;
    match unit {
        'd' => Some(n),
        'w' => n.checked_mul(7),
        _ => None,
    }
}

// --- tokenizer ---

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2 && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"'))) {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

// whitespace-separated; quotes keep spaces inside one token (desc:"two words")
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut quote: Option<char> = None;
    for c in input.chars() {
        match quote {
            Some(q) => {
                word.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                word.push(c);
            }
            None if c.is_whitespace() => {
                if !word.is_empty() {
                    tokens.push(std::mem::take(&mut word));
                }
            }
            None => word.push(c),
        }
    }
    if !word.is_empty() {
        tokens.push(word); // unterminated quote: keep what we have
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // 2024-05-08 is a Wednesday
    fn parser() -> QueryLanguageParser {
        QueryLanguageParser::with_now(Utc.with_ymd_and_hms(2024, 5, 8, 15, 30, 0).unwrap())
    }

    fn day(y: i32, m: u32, d: u32) -> Filter {
        let (start, end) = day_window(NaiveDate::from_ymd_opt(y, m, d).unwrap());
        Filter::DueDateRange { start: Some(start), end: Some(end) }
    }

    #[test]
    fn four_filters_from_example_query() {
        let f = parser().parse_filters("project:work status:pending priority:H +urgent");
        assert_eq!(
            f,
            vec![
                Filter::Project("work".into()),
                Filter::Status(Status::Pending),
                Filter::Priority(Priority::High),
                Filter::Tag("urgent".into()),
            ]
        );
    }

    #[test]
    fn unknown_tokens_are_dropped() {
        let q = parser().parse("invalid:badquery nonsense:value bareword status:nope priority:X");
        assert!(q.filters.is_empty());
        assert_eq!(q.ignored.len(), 5);
    }

    #[test]
    fn empty_query() {
        assert_eq!(parser().parse("   "), ParsedQuery::default());
    }

    #[rstest]
    #[case("due:today", day(2024, 5, 8))]
    #[case("due:tomorrow", day(2024, 5, 9))]
    #[case("due:yesterday", day(2024, 5, 7))]
    #[case("due:eow", day(2024, 5, 12))]
    #[case("due:sow", day(2024, 5, 6))]
    #[case("due:eom", day(2024, 5, 31))]
    #[case("due:som", day(2024, 5, 1))]
    #[case("due:eoy", day(2024, 12, 31))]
    #[case("due:friday", day(2024, 5, 10))]
    #[case("due:wednesday", day(2024, 5, 15))]
    #[case("due:3d", day(2024, 5, 11))]
    #[case("due:2w", day(2024, 5, 22))]
    #[case("due:2024-06-01", day(2024, 6, 1))]
    fn relative_dates(#[case] q: &str, #[case] expected: Filter) {
        assert_eq!(parser().parse_filters(q), vec![expected]);
    }

    #[test]
    fn due_before_and_after_are_open_ranges() {
        let f = parser().parse_filters("due.before:today due.after:tomorrow");
        let (today_start, _) = day_window(NaiveDate::from_ymd_opt(2024, 5, 8).unwrap());
        let (_, tomorrow_end) = day_window(NaiveDate::from_ymd_opt(2024, 5, 9).unwrap());
        assert_eq!(f[0], Filter::DueDateRange { start: None, end: Some(today_start - Duration::nanoseconds(1)) });
        assert_eq!(f[1], Filter::DueDateRange { start: Some(tomorrow_end + Duration::nanoseconds(1)), end: None });
    }

    #[test]
    fn urgency_bounds() {
        let f = parser().parse_filters("urgency.gt:5 urgency.lt:9.5 urgency.gt:abc urgency.lt:NaN");
        assert_eq!(
            f,
            vec![
                Filter::UrgencyRange { min: 5.0, max: f64::INFINITY },
                Filter::UrgencyRange { min: f64::NEG_INFINITY, max: 9.5 },
            ]
        );
    }

    #[test]
    fn exclusions_has_and_text() {
        let f = parser().parse_filters(r#"-later has:due has:project desc:"two words" -5"#);
        assert_eq!(
            f,
            vec![
                Filter::negate(Filter::Tag("later".into())),
                Filter::HasDueDate,
                Filter::HasProject,
                Filter::TextSearch("two words".into()),
            ]
        );
    }

    #[rstest]
    #[case("sort:urgency", Sorter::Urgency { descending: true })]
    #[case("sort:urgency+", Sorter::Urgency { descending: false })]
    #[case("sort:due", Sorter::DueDate { descending: false })]
    #[case("sort:project-", Sorter::Project { descending: true })]
    fn sort_tokens(#[case] q: &str, #[case] expected: Sorter) {
        let parsed = parser().parse(q);
        assert!(parsed.filters.is_empty());
        assert_eq!(parsed.sorter, Some(expected));
    }

    #[test]
    fn lone_prefixes_are_ignored() {
        let q = parser().parse("+ - status: project:");
        assert!(q.filters.is_empty());
        assert_eq!(q.ignored.len(), 4);
    }
}
