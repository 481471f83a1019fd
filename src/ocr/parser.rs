//! Heuristics that pull merchant, date and total out of raw receipt text.
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;
use time::{macros::format_description, Date, Month};

lazy_static! {
    static ref AMOUNT_RE: Regex = Regex::new(r"\b(\d{1,3}(?:,\d{3})+|\d+)[.,](\d{2})\b").unwrap();
    static ref DATE_RE: Regex = Regex::new(
        r"\b(?:(?P<y1>\d{4})[-/.](?P<m1>\d{1,2})[-/.](?P<d1>\d{1,2})|(?P<a>\d{1,2})[-/.](?P<b>\d{1,2})[-/.](?P<y2>\d{4}|\d{2}))\b"
    )
    .unwrap();
    static ref PHONE_RE: Regex =
        Regex::new(r"(?i)\b(?:tel|phone|ph)\b|\(?\d{3}\)?[\s.-]?\d{3}[\s.-]\d{4}").unwrap();
    static ref SUBTOTAL_RE: Regex = Regex::new(r"(?i)sub[\s-]?total").unwrap();
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptData {
    pub raw_text: String,
    pub extracted_merchant: Option<String>,
    /// `YYYY-MM-DD`
    pub extracted_date: Option<String>,
    pub extracted_amount: Option<f64>,
    pub line_count: usize,
}

pub fn parse_receipt(text: &str) -> ReceiptData {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    ReceiptData {
        raw_text: text.trim().to_string(),
        extracted_merchant: find_merchant(&lines),
        extracted_date: find_date(text).map(format_date),
        extracted_amount: find_total(&lines),
        line_count: lines.len(),
    }
}

fn find_merchant(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .find(|line| {
            line.chars().filter(|c| c.is_alphabetic()).count() >= 3
                && !DATE_RE.is_match(line)
                && !AMOUNT_RE.is_match(line)
                && !PHONE_RE.is_match(line)
        })
        .map(|line| line.to_string())
}

/// The last "total" line wins; without one, the largest amount on the receipt.
fn find_total(lines: &[&str]) -> Option<f64> {
    let from_total_line = lines
        .iter()
        .rev()
        .filter(|line| line.to_lowercase().contains("total") && !SUBTOTAL_RE.is_match(line))
        .find_map(|line| amounts_in(line).last().copied());

    from_total_line.or_else(|| {
        lines
            .iter()
            .flat_map(|line| amounts_in(line))
            .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))))
    })
}

fn amounts_in(line: &str) -> Vec<f64> {
    // dates like 15.01.2024 would otherwise read as 15.01
    let without_dates = DATE_RE.replace_all(line, " ");
    AMOUNT_RE
        .captures_iter(&without_dates)
        .filter_map(|c| format!("{}.{}", c[1].replace(',', ""), &c[2]).parse().ok())
        .collect()
}

fn find_date(text: &str) -> Option<Date> {
    DATE_RE.captures_iter(text).find_map(|c| date_from(&c))
}

fn date_from(c: &Captures<'_>) -> Option<Date> {
    let num = |name: &str| c.name(name).and_then(|m| m.as_str().parse::<i32>().ok());

    if let (Some(y), Some(m), Some(d)) = (num("y1"), num("m1"), num("d1")) {
        return calendar_date(y, m, d);
    }

    let (a, b, mut y) = (num("a")?, num("b")?, num("y2")?);
    if y < 100 {
        y += 2000;
    }
    // day-first, then month-first when that reading is impossible
    calendar_date(y, b, a).or_else(|| calendar_date(y, a, b))
}

fn calendar_date(year: i32, month: i32, day: i32) -> Option<Date> {
    let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
    Date::from_calendar_date(year, month, u8::try_from(day).ok()?).ok()
}

fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROCERY: &str = "
        GREEN LEAF MARKET
        123 Main Street
        Tel (555) 123-4567
        Date: 2024-03-15 14:22
        Bananas            1.99
        Oat milk           4.49
        Subtotal           6.48
        Tax                0.52
        TOTAL              7.00
        Card              10.00
    ";

    #[test]
    fn parses_a_typical_receipt() {
        let data = parse_receipt(GROCERY);
        assert_eq!(data.extracted_merchant.as_deref(), Some("GREEN LEAF MARKET"));
        assert_eq!(data.extracted_date.as_deref(), Some("2024-03-15"));
        assert_eq!(data.extracted_amount, Some(7.00));
        assert_eq!(data.line_count, 10);
    }

    #[test]
    fn subtotal_is_not_the_total() {
        let data = parse_receipt("Cafe Luna\nSubtotal 12.00\n");
        // no TOTAL line, so the largest amount wins
        assert_eq!(data.extracted_amount, Some(12.00));
    }

    #[test]
    fn falls_back_to_largest_amount() {
        let data = parse_receipt("Corner Shop\nitem 3.50\nitem 12.25\nitem 1,204.10\n");
        assert_eq!(data.extracted_amount, Some(1204.10));
    }

    #[test]
    fn european_dates_and_decimal_commas() {
        let data = parse_receipt("Bäckerei Schmidt\n15.01.2024\nSumme\nTotal EUR 8,40\n");
        assert_eq!(data.extracted_date.as_deref(), Some("2024-01-15"));
        assert_eq!(data.extracted_amount, Some(8.40));
    }

    #[test]
    fn month_first_dates_when_day_first_is_impossible() {
        let data = parse_receipt("Store\n03/25/24\n");
        assert_eq!(data.extracted_date.as_deref(), Some("2024-03-25"));
    }

    #[test]
    fn invalid_dates_are_skipped() {
        let data = parse_receipt("Store\n2024-13-45\n2024-02-29\n");
        assert_eq!(data.extracted_date.as_deref(), Some("2024-02-29"));
    }

    #[test]
    fn empty_text_yields_nothing() {
        let data = parse_receipt("   \n  ");
        assert_eq!(data.extracted_merchant, None);
        assert_eq!(data.extracted_date, None);
        assert_eq!(data.extracted_amount, None);
        assert_eq!(data.line_count, 0);
    }

    #[test]
    fn serializes_with_frontend_field_names() {
        let json = serde_json::to_value(parse_receipt("Shop\nTotal 5.00")).unwrap();
        assert_eq!(json["extractedMerchant"], "Shop");
        assert_eq!(json["extractedAmount"], 5.0);
        assert!(json.get("rawText").is_some());
    }
}
