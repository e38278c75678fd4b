//! Numeric coercion rules

use crate::amf::value::{format_f64, BigNumber, Value};
use crate::coerce::{NumberKind, NumberType};
use crate::error::{CodecError, Result};

pub(crate) fn coerce_number(value: &Value, nt: NumberType) -> Result<Value> {
    // Strings headed for an arbitrary-precision target short-circuit so the
    // digits never pass through a double
    if let Value::String(s) = value {
        match nt.kind {
            NumberKind::BigInt | NumberKind::BigDecimal => {
                return big_from_str(s, nt.kind);
            }
            _ => {
                let parsed: f64 = s
                    .trim()
                    .parse()
                    .map_err(|_| CodecError::invalid_type(value.describe(), target_name(nt.kind)))?;
                return from_f64(parsed, nt);
            }
        }
    }

    if let Value::BigNumber(b) = value {
        match nt.kind {
            // Pass through untouched, no precision loss
            NumberKind::BigInt | NumberKind::BigDecimal => {
                return big_from_str(b.as_str(), nt.kind);
            }
            _ => {}
        }
    }

    match value.as_f64() {
        Some(n) => from_f64(n, nt),
        None => Err(CodecError::invalid_type(
            value.describe(),
            target_name(nt.kind),
        )),
    }
}

fn from_f64(n: f64, nt: NumberType) -> Result<Value> {
    if n.is_nan() {
        // Not-a-number has no integral or boxed meaning
        return Ok(if nt.nullable {
            Value::Null
        } else {
            match nt.kind {
                NumberKind::I64 | NumberKind::I32 | NumberKind::I16 | NumberKind::I8 => {
                    Value::Int(0)
                }
                _ => Value::Number(0.0),
            }
        });
    }

    Ok(match nt.kind {
        NumberKind::F64 => Value::Number(n),
        NumberKind::F32 => Value::Number(f64::from(n as f32)),
        NumberKind::I64 => Value::Number(n.trunc()),
        NumberKind::I32 => Value::Int(n as i32),
        NumberKind::I16 => Value::Int(i32::from((n as i32) as i16)),
        NumberKind::I8 => Value::Int(i32::from((n as i32) as i8)),
        NumberKind::BigInt => {
            let text = format!("{}", n.trunc() as i64);
            Value::BigNumber(BigNumber::parse(&text).ok_or_else(|| {
                CodecError::invalid_type(format!("number {n}"), "big integer")
            })?)
        }
        NumberKind::BigDecimal => {
            let text = format_f64(n);
            Value::BigNumber(BigNumber::parse(&text).ok_or_else(|| {
                CodecError::invalid_type(format!("number {n}"), "big decimal")
            })?)
        }
    })
}

fn big_from_str(s: &str, kind: NumberKind) -> Result<Value> {
    let big = BigNumber::parse(s)
        .ok_or_else(|| CodecError::invalid_type(format!("string \"{s}\""), target_name(kind)))?;
    if kind == NumberKind::BigInt && !big.is_integral() {
        return Err(CodecError::invalid_type(
            format!("string \"{s}\""),
            "big integer",
        ));
    }
    Ok(Value::BigNumber(big))
}

fn target_name(kind: NumberKind) -> &'static str {
    match kind {
        NumberKind::F64 => "double",
        NumberKind::F32 => "float",
        NumberKind::I64 => "long integer",
        NumberKind::I32 => "integer",
        NumberKind::I16 => "short integer",
        NumberKind::I8 => "byte",
        NumberKind::BigInt => "big integer",
        NumberKind::BigDecimal => "big decimal",
    }
}
