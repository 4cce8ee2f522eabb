use crate::{error::IntervalError, store::TimeRange};
use derive_more::Display;
use std::{fmt, str::FromStr, time::Duration};

/// Unit of an analysis [`Interval`], identified by its single letter code.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum IntervalUnit {
    #[display("s")]
    Second,
    #[display("m")]
    Minute,
    #[display("h")]
    Hour,
    #[display("d")]
    Day,
    #[display("w")]
    Week,
}

impl IntervalUnit {
    pub fn as_secs(&self) -> u64 {
        match self {
            IntervalUnit::Second => 1,
            IntervalUnit::Minute => 60,
            IntervalUnit::Hour => 60 * 60,
            IntervalUnit::Day => 24 * 60 * 60,
            IntervalUnit::Week => 7 * 24 * 60 * 60,
        }
    }

    /// Parse a unit code or full unit word, eg/ "m", "min" or "minutes".
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Some(IntervalUnit::Second),
            "m" | "min" | "mins" | "minute" | "minutes" => Some(IntervalUnit::Minute),
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(IntervalUnit::Hour),
            "d" | "day" | "days" => Some(IntervalUnit::Day),
            "w" | "wk" | "wks" | "week" | "weeks" => Some(IntervalUnit::Week),
            _ => None,
        }
    }
}

/// Analysis window length: a positive integer amount of an [`IntervalUnit`].
///
/// Parsed from operator input such as `"15m"`, `"1 hour"` or `"2 days"`. The trimmed input
/// is retained and used as the snapshot's `interval` label.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Interval {
    amount: u64,
    unit: IntervalUnit,
    label: String,
}

impl Interval {
    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn unit(&self) -> IntervalUnit {
        self.unit
    }

    /// Operator input the interval was parsed from.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn as_secs(&self) -> u64 {
        self.amount * self.unit.as_secs()
    }

    pub fn as_millis(&self) -> i64 {
        // Bounded at parse time
        i64::try_from(self.as_secs() * 1000).unwrap_or(i64::MAX)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.as_secs())
    }

    /// Adjacent windows ending at `now_ms`:
    /// `current = [now - interval, now)` and `last = [now - 2 * interval, now - interval)`.
    pub fn windows(&self, now_ms: i64) -> AnalysisWindows {
        let length = self.as_millis();
        let window_start = now_ms.saturating_sub(length);
        let prior_start = window_start.saturating_sub(length);

        AnalysisWindows {
            current: TimeRange::new(window_start, now_ms),
            last: TimeRange::new(prior_start, window_start),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let label = input.trim();
        if label.is_empty() {
            return Err(IntervalError::Empty);
        }

        let digits_end = label
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(label.len());
        let (digits, rest) = label.split_at(digits_end);

        if digits.is_empty() {
            return Err(IntervalError::MissingAmount(label.to_string()));
        }

        let amount = digits
            .parse::<u64>()
            .map_err(|_| IntervalError::Overflow(label.to_string()))?;

        let unit = IntervalUnit::parse(rest.trim_start()).ok_or_else(|| {
            IntervalError::UnknownUnit {
                input: label.to_string(),
            }
        })?;

        if amount == 0 {
            return Err(IntervalError::Zero(label.to_string()));
        }

        // Keep every derived length representable as i64 milliseconds
        let within_range = amount
            .checked_mul(unit.as_secs())
            .and_then(|secs| secs.checked_mul(1000))
            .is_some_and(|ms| i64::try_from(ms).is_ok());
        if !within_range {
            return Err(IntervalError::Overflow(label.to_string()));
        }

        Ok(Self {
            amount,
            unit,
            label: label.to_string(),
        })
    }
}

/// Paired, adjacent analysis windows.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct AnalysisWindows {
    pub current: TimeRange,
    pub last: TimeRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        struct TestCase {
            input: &'static str,
            expected: Result<(u64, IntervalUnit), IntervalError>,
        }

        let tests = vec![
            TestCase {
                // TC0: compact code
                input: "10m",
                expected: Ok((10, IntervalUnit::Minute)),
            },
            TestCase {
                // TC1: full word with whitespace
                input: "1 hour",
                expected: Ok((1, IntervalUnit::Hour)),
            },
            TestCase {
                // TC2: plural word, mixed case, padded
                input: "  30 Seconds ",
                expected: Ok((30, IntervalUnit::Second)),
            },
            TestCase {
                // TC3: days
                input: "2 days",
                expected: Ok((2, IntervalUnit::Day)),
            },
            TestCase {
                // TC4: week code
                input: "1w",
                expected: Ok((1, IntervalUnit::Week)),
            },
            TestCase {
                // TC5: unsupported unit word sharing a code letter
                input: "3 months",
                expected: Err(IntervalError::UnknownUnit {
                    input: "3 months".to_string(),
                }),
            },
            TestCase {
                // TC6: unknown code
                input: "5y",
                expected: Err(IntervalError::UnknownUnit {
                    input: "5y".to_string(),
                }),
            },
            TestCase {
                // TC7: missing unit
                input: "15",
                expected: Err(IntervalError::UnknownUnit {
                    input: "15".to_string(),
                }),
            },
            TestCase {
                // TC8: missing amount
                input: "hour",
                expected: Err(IntervalError::MissingAmount("hour".to_string())),
            },
            TestCase {
                // TC9: zero length
                input: "0m",
                expected: Err(IntervalError::Zero("0m".to_string())),
            },
            TestCase {
                // TC10: empty
                input: "   ",
                expected: Err(IntervalError::Empty),
            },
            TestCase {
                // TC11: too large
                input: "99999999999999999w",
                expected: Err(IntervalError::Overflow("99999999999999999w".to_string())),
            },
            TestCase {
                // TC12: negative amount
                input: "-5m",
                expected: Err(IntervalError::MissingAmount("-5m".to_string())),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Interval::from_str(test.input)
                .map(|interval| (interval.amount(), interval.unit()));
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_interval_label_and_length() {
        let interval = Interval::from_str(" 1 hour ").unwrap();
        assert_eq!(interval.to_string(), "1 hour");
        assert_eq!(interval.as_secs(), 3600);
        assert_eq!(interval.as_millis(), 3_600_000);
    }

    #[test]
    fn test_windows_are_adjacent() {
        let interval = Interval::from_str("10m").unwrap();
        let windows = interval.windows(1_200_000);

        assert_eq!(windows.current, TimeRange::new(600_000, 1_200_000));
        assert_eq!(windows.last, TimeRange::new(0, 600_000));
        assert_eq!(windows.last.end, windows.current.start);
        assert_eq!(windows.current.end - windows.current.start, interval.as_millis());
    }
}
