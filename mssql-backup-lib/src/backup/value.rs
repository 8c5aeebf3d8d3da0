//! Cell values and their portable text encoding.
//!
//! Drivers decode each cell once, using the column metadata they receive from the server, into the
//! closed [`SqlValue`] set. Normalization is then a total function from that set to text or null.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const OFFSET_FORMAT: &str = "%:z";

/// A structured date/time value as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl Temporal {
    /// The canonical ISO-8601 rendering.
    ///
    /// Fractional seconds are emitted as exactly six digits, and only when the microsecond part is
    /// non-zero. Precision below a microsecond is truncated. No timezone is added beyond the one
    /// carried by the value itself.
    #[must_use]
    pub fn to_iso8601(&self) -> String {
        match self {
            Self::Date(d) => d.format(DATE_FORMAT).to_string(),
            Self::Time(t) => format!("{}{}", t.format(TIME_FORMAT), fraction(t.nanosecond())),
            Self::DateTime(dt) => format!("{}{}", dt.format(DATETIME_FORMAT), fraction(dt.nanosecond())),
            Self::DateTimeOffset(dt) => format!(
                "{}{}{}",
                dt.format(DATETIME_FORMAT),
                fraction(dt.nanosecond()),
                dt.format(OFFSET_FORMAT)
            ),
        }
    }
}

/// `.ffffff`, or nothing for a whole second.
fn fraction(nanos: u32) -> String {
    // chrono represents a leap second as nanos >= 1_000_000_000
    let micros = nanos % 1_000_000_000 / 1_000;
    if micros == 0 { String::new() } else { format!(".{micros:06}") }
}

/// A single database cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Text(String),
    Temporal(Temporal),
}

impl SqlValue {
    /// Build a text value from anything with a `Display` rendering, mapping `None` to `Null`.
    pub fn display<T: ToString>(value: Option<T>) -> Self {
        value.map_or(Self::Null, |v| Self::Text(v.to_string()))
    }

    /// Render binary data as `0x`-prefixed upper-case hex, the form SQL Server uses for literals.
    #[must_use]
    pub fn binary(bytes: Option<&[u8]>) -> Self {
        use core::fmt::Write;

        bytes.map_or(Self::Null, |bytes| {
            let mut text = String::with_capacity(2 + bytes.len() * 2);
            text.push_str("0x");
            for b in bytes {
                let _ = write!(text, "{b:02X}");
            }
            Self::Text(text)
        })
    }

    pub fn temporal<T: Into<Temporal>>(value: Option<T>) -> Self {
        value.map_or(Self::Null, |v| Self::Temporal(v.into()))
    }
}

impl From<NaiveDate> for Temporal {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveTime> for Temporal {
    fn from(value: NaiveTime) -> Self {
        Self::Time(value)
    }
}

impl From<NaiveDateTime> for Temporal {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<DateTime<FixedOffset>> for Temporal {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::DateTimeOffset(value)
    }
}

/// Convert a cell into its portable representation.
#[must_use]
pub fn normalize(value: SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Text(text) => Some(text),
        SqlValue::Temporal(t) => Some(t.to_iso8601()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datetime(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_null_is_null() {
        assert_eq!(normalize(SqlValue::Null), None);
        assert_eq!(normalize(SqlValue::display(None::<i32>)), None);
        assert_eq!(normalize(SqlValue::temporal(None::<NaiveDate>)), None);
        assert_eq!(normalize(SqlValue::binary(None)), None);
    }

    #[test]
    fn test_text_passes_through() {
        assert_eq!(normalize(SqlValue::Text("None".into())), Some("None".into()));
        assert_eq!(normalize(SqlValue::Text(String::new())), Some(String::new()));
    }

    #[test]
    fn test_display_coercion() {
        assert_eq!(normalize(SqlValue::display(Some(42_i64))), Some("42".into()));
        assert_eq!(normalize(SqlValue::display(Some(-1.5_f64))), Some("-1.5".into()));
        assert_eq!(normalize(SqlValue::display(Some(true))), Some("true".into()));
    }

    #[test]
    fn test_binary_renders_hex() {
        assert_eq!(normalize(SqlValue::binary(Some(&[0x00, 0xAB, 0x7f]))), Some("0x00AB7F".into()));
        assert_eq!(normalize(SqlValue::binary(Some(&[]))), Some("0x".into()));
    }

    #[test]
    fn test_datetime_without_fraction() {
        let value = SqlValue::temporal(Some(datetime("2024-03-01 13:45:00")));
        assert_eq!(normalize(value), Some("2024-03-01T13:45:00".into()));
    }

    #[test]
    fn test_datetime_with_fraction() {
        let value = SqlValue::temporal(Some(datetime("2024-03-01 13:45:00.123456")));
        assert_eq!(normalize(value), Some("2024-03-01T13:45:00.123456".into()));
    }

    #[test]
    fn test_date_and_time() {
        let date = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        let time = NaiveTime::from_hms_milli_opt(23, 59, 58, 500).unwrap();
        assert_eq!(normalize(SqlValue::temporal(Some(date))), Some("1999-12-31".into()));
        assert_eq!(normalize(SqlValue::temporal(Some(time))), Some("23:59:58.500000".into()));
    }

    #[test]
    fn test_datetime_offset_keeps_offset() {
        let dt = DateTime::parse_from_rfc3339("2024-03-01T13:45:00.25+05:30").unwrap();
        assert_eq!(normalize(SqlValue::temporal(Some(dt))), Some("2024-03-01T13:45:00.250000+05:30".into()));
    }

    #[test]
    fn test_fraction_is_always_six_digits() {
        let value = SqlValue::temporal(Some(datetime("2024-03-01 13:45:00.5")));
        assert_eq!(normalize(value), Some("2024-03-01T13:45:00.500000".into()));

        let value = SqlValue::temporal(Some(datetime("1753-01-01 00:00:00.003")));
        assert_eq!(normalize(value), Some("1753-01-01T00:00:00.003000".into()));
    }

    #[test]
    fn test_sub_microsecond_precision_is_truncated() {
        // datetime2(7) carries 100ns ticks
        let value = SqlValue::temporal(Some(datetime("2024-03-01 13:45:00.1234567")));
        assert_eq!(normalize(value), Some("2024-03-01T13:45:00.123456".into()));

        let value = SqlValue::temporal(Some(datetime("2024-03-01 13:45:00.0000004")));
        assert_eq!(normalize(value), Some("2024-03-01T13:45:00".into()));

        let time = NaiveTime::from_hms_nano_opt(8, 0, 0, 999_999_999).unwrap();
        assert_eq!(normalize(SqlValue::temporal(Some(time))), Some("08:00:00.999999".into()));
    }

    #[test]
    fn test_iso8601_round_trips() {
        let samples = [
            datetime("2024-03-01 13:45:00"),
            datetime("1753-01-01 00:00:00.003"),
            datetime("9999-12-31 23:59:59.999999"),
            datetime("2000-02-29 12:00:00.000001"),
        ];

        for original in samples {
            let text = normalize(SqlValue::temporal(Some(original))).unwrap();
            let parsed: NaiveDateTime = text.parse().unwrap();
            assert_eq!(parsed, original, "round trip of {text}");
        }

        let offset = DateTime::parse_from_rfc3339("2021-06-30T08:00:00.5-07:00").unwrap();
        let text = normalize(SqlValue::temporal(Some(offset))).unwrap();
        assert_eq!(DateTime::parse_from_rfc3339(&text).unwrap(), offset);
    }
}
