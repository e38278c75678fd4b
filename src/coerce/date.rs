//! Calendar coercion: one epoch-milliseconds value viewed four ways

use std::rc::Rc;

use crate::amf::value::{AmfDate, DateKind, Value};
use crate::error::{CodecError, Result};

const DAY_MILLIS: f64 = 86_400_000.0;

pub(crate) fn coerce_date(value: &Value, kind: DateKind) -> Result<Value> {
    let millis = match value {
        Value::Date(d) => d.epoch_millis,
        Value::Number(n) => *n,
        Value::Int(i) => f64::from(*i),
        other => return Err(CodecError::invalid_type(other.describe(), "date")),
    };

    let adjusted = match kind {
        DateKind::DateTime | DateKind::Timestamp => millis,
        // Truncate to midnight of the UTC day
        DateKind::DateOnly => millis - millis.rem_euclid(DAY_MILLIS),
        // Keep only the position within the UTC day
        DateKind::TimeOnly => millis.rem_euclid(DAY_MILLIS),
    };

    Ok(Value::Date(Rc::new(AmfDate::with_kind(adjusted, kind))))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2009-02-13T23:31:30.123Z
    const MILLIS: f64 = 1_234_567_890_123.0;

    #[test]
    fn test_datetime_keeps_millis() {
        match coerce_date(&Value::date(MILLIS), DateKind::DateTime).unwrap() {
            Value::Date(d) => {
                assert_eq!(d.epoch_millis, MILLIS);
                assert_eq!(d.kind, DateKind::DateTime);
            }
            other => panic!("expected date, got {other:?}"),
        }
    }

    #[test]
    fn test_date_only_truncates_to_day() {
        match coerce_date(&Value::date(MILLIS), DateKind::DateOnly).unwrap() {
            Value::Date(d) => {
                assert_eq!(d.epoch_millis % DAY_MILLIS, 0.0);
                assert_eq!(d.epoch_millis, MILLIS - MILLIS % DAY_MILLIS);
            }
            other => panic!("expected date, got {other:?}"),
        }
    }

    #[test]
    fn test_time_only_keeps_intra_day() {
        match coerce_date(&Value::date(MILLIS), DateKind::TimeOnly).unwrap() {
            Value::Date(d) => assert_eq!(d.epoch_millis, MILLIS % DAY_MILLIS),
            other => panic!("expected date, got {other:?}"),
        }
    }

    #[test]
    fn test_pre_epoch_truncation_rounds_down() {
        // One hour before the epoch lands on the previous day
        let millis = -3_600_000.0;
        match coerce_date(&Value::Number(millis), DateKind::DateOnly).unwrap() {
            Value::Date(d) => assert_eq!(d.epoch_millis, -DAY_MILLIS),
            other => panic!("expected date, got {other:?}"),
        }
        match coerce_date(&Value::Number(millis), DateKind::TimeOnly).unwrap() {
            Value::Date(d) => assert_eq!(d.epoch_millis, DAY_MILLIS - 3_600_000.0),
            other => panic!("expected date, got {other:?}"),
        }
    }

    #[test]
    fn test_number_source() {
        match coerce_date(&Value::Number(0.0), DateKind::Timestamp).unwrap() {
            Value::Date(d) => {
                assert_eq!(d.epoch_millis, 0.0);
                assert_eq!(d.kind, DateKind::Timestamp);
            }
            other => panic!("expected date, got {other:?}"),
        }
        assert!(coerce_date(&Value::from("now"), DateKind::DateTime).is_err());
    }
}
