//! `sleep` and `time`

use crossbeam::channel::select;
use indexmap::IndexMap;
use std::time::{Duration, Instant};

use super::define;
use crate::environment::{Frame, Namespace};
use crate::error::{combine_callback, EvalError, Reason};
use crate::eval::call_body;
use crate::value::{parse_num, Args, Num, Signature, Value};

pub(super) fn register(ns: &Namespace) {
    define(ns, "sleep", Signature::new().param("duration"), sleep);
    define(
        ns,
        "time",
        Signature::new().param("body").option("on-end", Value::Nil),
        time,
    );
}

/// Block until the duration passes or the evaluator is interrupted.
fn sleep(fm: &mut Frame, args: Args) -> Result<(), EvalError> {
    let duration = parse_sleep_duration(&args.positional[0]).map_err(|r| fm.exception(r))?;
    tracing::trace!(?duration, "sleep");
    let timer = fm.evaluator().context().timer.after(duration);
    let interrupt = fm.interrupt_receiver();
    select! {
        recv(timer) -> _ => Ok(()),
        recv(interrupt) -> _ => Err(fm.exception(Reason::Interrupted)),
    }
}

/// Run a body, passing the elapsed seconds to `&on-end` if given.
fn time(fm: &mut Frame, args: Args) -> Result<(), EvalError> {
    let start = Instant::now();
    let result = call_body(fm, &args.positional[0]);
    let elapsed = start.elapsed();
    tracing::debug!(?elapsed, "time");
    match args.option("on-end") {
        Some(on_end) => {
            let seconds = Value::float(elapsed.as_secs_f64());
            let ended = on_end.call(fm, vec![seconds], IndexMap::new());
            combine_callback(result, ended)
        }
        None => result,
    }
}

/// Interpret a value as a sleep duration.
///
/// Numbers, and strings that parse as numbers (`1`, `0.1`, `1/2`), count
/// seconds. Other strings are durations with unit suffixes such as `1.3s`,
/// `0.1ms` or `3h5m7s`; the units are `ns`, `us` (or `µs`), `ms`, `s`,
/// `m` and `h`.
///
/// # Errors
///
/// `NegativeSleepDuration` for a well-formed negative duration and
/// `InvalidSleepDuration` for anything else that is not a duration.
///
/// ```
/// use std::time::Duration;
/// use quickbeam::builtins::parse_sleep_duration;
/// use quickbeam::Value;
///
/// let d = parse_sleep_duration(&Value::from("1.3s")).unwrap();
/// assert_eq!(d, Duration::from_millis(1300));
/// ```
pub fn parse_sleep_duration(value: &Value) -> Result<Duration, Reason> {
    let invalid = || Reason::InvalidSleepDuration;
    let nanos = match value {
        Value::Num(n) => num_nanos(*n),
        Value::String(s) => match parse_num(s) {
            Some(n) => num_nanos(n),
            None => unit_nanos(s).ok_or_else(invalid)?,
        },
        _ => return Err(invalid()),
    };
    if !nanos.is_finite() {
        return Err(invalid());
    }
    if nanos < 0.0 {
        return Err(Reason::NegativeSleepDuration);
    }
    let nanos = nanos.round();
    if nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos as u64))
}

fn num_nanos(n: Num) -> f64 {
    n.to_f64() * 1e9
}

const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("us", 1e3),
    ("µs", 1e3),
    ("ms", 1e6),
    ("s", 1e9),
    ("m", 60e9),
    ("h", 3600e9),
];

/// Parse `[-+]?(number unit)+` into signed nanoseconds.
fn unit_nanos(s: &str) -> Option<f64> {
    let (sign, mut rest) = match s.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, s.strip_prefix('+').unwrap_or(s)),
    };
    if rest.is_empty() {
        return None;
    }
    let mut total = 0.0;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..digits];
        if !number.bytes().any(|b| b.is_ascii_digit()) {
            return None;
        }
        let number: f64 = number.parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let (_, scale) = UNITS.iter().find(|(name, _)| *name == unit)?;
        total += number * scale;
        rest = &rest[unit_len..];
    }
    Some(sign * total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Duration, Reason> {
        parse_sleep_duration(&Value::from(s))
    }

    #[test]
    fn test_plain_seconds() {
        assert_eq!(parse("0").unwrap(), Duration::ZERO);
        assert_eq!(parse("1").unwrap(), Duration::from_secs(1));
        assert_eq!(parse("0.1").unwrap(), Duration::from_millis(100));
        assert_eq!(parse("1/2").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_unit_suffixes() {
        assert_eq!(parse("1.3s").unwrap(), Duration::from_millis(1300));
        assert_eq!(parse("0.1ms").unwrap(), Duration::from_micros(100));
        assert_eq!(parse("3h5m7s").unwrap(), Duration::from_secs(3 * 3600 + 5 * 60 + 7));
        assert_eq!(parse("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse("+2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_numbers() {
        let d = parse_sleep_duration(&Value::Num(Num::Float(1.7))).unwrap();
        assert_eq!(d, Duration::from_millis(1700));
        let d = parse_sleep_duration(&Value::int(42)).unwrap();
        assert_eq!(d, Duration::from_secs(42));
    }

    #[test]
    fn test_negative() {
        assert!(matches!(parse("-7"), Err(Reason::NegativeSleepDuration)));
        assert!(matches!(parse("-3h"), Err(Reason::NegativeSleepDuration)));
        assert!(matches!(
            parse_sleep_duration(&Value::Num(Num::Float(-7.0))),
            Err(Reason::NegativeSleepDuration)
        ));
    }

    #[test]
    fn test_invalid() {
        for s in ["1x", "", "s", "1s2", "-", "inf", "NaN", "1 s"] {
            assert!(
                matches!(parse(s), Err(Reason::InvalidSleepDuration)),
                "{:?} should be invalid",
                s
            );
        }
        let list = Value::list(vec![Value::from("1")]);
        assert!(matches!(
            parse_sleep_duration(&list),
            Err(Reason::InvalidSleepDuration)
        ));
    }
}
