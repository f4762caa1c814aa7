//! The standard-library callables.
//!
//! Every stdlib function is strict and type-checked at the value level:
//! arguments of the wrong tag yield a zero value (usually `null`, `false`
//! for boolean-valued functions) rather than an error. Sequence operations
//! act on both arrays and strings; a string iterates as one-character
//! strings and converts back to a string when every element remains one.

use std::cmp::Ordering;
use std::collections::HashMap;

use asc_def::Ident;

use crate::EvalResult;
use crate::datetime::{
    Date, Timestamp, days_in_month, format_date, format_timestamp, parse_timestamp,
};
use crate::ext;
use crate::interp::Interp;
use crate::value::{Callable, NativeFn, Value, total_cmp};

/// The stdlib bindings laid underneath every evaluation stack.
pub(crate) fn values() -> HashMap<Ident, Value> {
    NATIVES
        .iter()
        .map(|native| (Ident::name(native.name), Value::Callable(Callable::Native(native))))
        .collect()
}

static NATIVES: &[NativeFn] = &[
    // Arithmetic
    NativeFn { name: "+", arity: 2, run: add },
    NativeFn { name: "-", arity: 2, run: sub },
    NativeFn { name: "*", arity: 2, run: mul },
    NativeFn { name: "/", arity: 2, run: div },
    NativeFn { name: "^", arity: 2, run: pow },
    NativeFn { name: "mod", arity: 2, run: modulo },
    NativeFn { name: "floor", arity: 1, run: floor },
    NativeFn { name: "ceil", arity: 1, run: ceil },
    NativeFn { name: "round", arity: 1, run: round },
    NativeFn { name: "trunc", arity: 1, run: trunc },
    NativeFn { name: "sign", arity: 1, run: sign },
    NativeFn { name: "abs", arity: 1, run: abs },
    // Comparison
    NativeFn { name: "==", arity: 2, run: eq },
    NativeFn { name: "!=", arity: 2, run: neq },
    NativeFn { name: ">", arity: 2, run: gt },
    NativeFn { name: "<", arity: 2, run: lt },
    NativeFn { name: ">=", arity: 2, run: ge },
    NativeFn { name: "<=", arity: 2, run: le },
    // Logic
    NativeFn { name: "and", arity: 2, run: and },
    NativeFn { name: "or", arity: 2, run: or },
    NativeFn { name: "not", arity: 1, run: not },
    NativeFn { name: "xor", arity: 2, run: xor },
    // Sequences
    NativeFn { name: "++", arity: 2, run: concat },
    NativeFn { name: "map", arity: 2, run: map },
    NativeFn { name: "flat_map", arity: 2, run: flat_map },
    NativeFn { name: "fold", arity: 3, run: fold },
    NativeFn { name: "fold1", arity: 2, run: fold1 },
    NativeFn { name: "filter", arity: 2, run: filter },
    NativeFn { name: "index", arity: 2, run: index },
    NativeFn { name: "find_index", arity: 2, run: find_index },
    NativeFn { name: "length", arity: 1, run: length },
    NativeFn { name: "contains", arity: 2, run: contains },
    NativeFn { name: "head", arity: 1, run: head },
    NativeFn { name: "tail", arity: 1, run: tail },
    NativeFn { name: "sort", arity: 1, run: sort },
    // Aggregation
    NativeFn { name: "sum", arity: 1, run: sum },
    NativeFn { name: "min", arity: 1, run: min },
    NativeFn { name: "max", arity: 1, run: max },
    NativeFn { name: "avg", arity: 1, run: avg },
    NativeFn { name: "med", arity: 1, run: med },
    // Dates
    NativeFn { name: "date_sub", arity: 3, run: date_sub },
    NativeFn { name: "date_add", arity: 3, run: date_add },
    NativeFn { name: "date_today", arity: 0, run: date_today },
    NativeFn { name: "date_fmt", arity: 2, run: date_fmt },
    NativeFn { name: "date_get", arity: 2, run: date_get },
    NativeFn { name: "date_set", arity: 3, run: date_set },
    // Timestamps
    NativeFn { name: "ts_now", arity: 0, run: ts_now },
    NativeFn { name: "tz_utc", arity: 0, run: tz_utc },
    NativeFn { name: "tz_local", arity: 0, run: tz_local },
    NativeFn { name: "ts_from_unix", arity: 1, run: ts_from_unix },
    NativeFn { name: "ts_to_unix", arity: 1, run: ts_to_unix },
    NativeFn { name: "ts_from_date", arity: 2, run: ts_from_date },
    NativeFn { name: "ts_to_date", arity: 2, run: ts_to_date },
    NativeFn { name: "ts_parse", arity: 1, run: ts_parse },
    NativeFn { name: "ts_to_string", arity: 1, run: ts_to_string },
    NativeFn { name: "ts_fmt", arity: 3, run: ts_fmt },
    NativeFn { name: "ts_add", arity: 3, run: ts_add },
    NativeFn { name: "ts_sub", arity: 3, run: ts_sub },
    NativeFn { name: "ts_get", arity: 3, run: ts_get },
    NativeFn { name: "ts_set", arity: 4, run: ts_set },
    // Formatting
    NativeFn { name: "currency_fmt", arity: 2, run: currency_fmt },
    NativeFn { name: "country_fmt", arity: 1, run: country_fmt },
    NativeFn { name: "phone_fmt", arity: 1, run: phone_fmt },
    // Misc
    NativeFn { name: "if", arity: 3, run: if_fn },
    NativeFn { name: "id", arity: 1, run: id },
];

/// Recognized ISO 4217 currency codes and their minor-unit factor.
static CURRENCIES: &[(&str, u32)] = &[
    ("AUD", 100),
    ("BRL", 100),
    ("CAD", 100),
    ("CHF", 100),
    ("CNY", 100),
    ("CZK", 100),
    ("DKK", 100),
    ("EUR", 100),
    ("GBP", 100),
    ("HKD", 100),
    ("HUF", 100),
    ("IDR", 100),
    ("ILS", 100),
    ("INR", 100),
    ("JPY", 1),
    ("KRW", 1),
    ("MXN", 100),
    ("MYR", 100),
    ("NOK", 100),
    ("NZD", 100),
    ("PHP", 100),
    ("PLN", 100),
    ("RON", 100),
    ("RUB", 100),
    ("SEK", 100),
    ("SGD", 100),
    ("THB", 100),
    ("TRY", 100),
    ("USD", 100),
    ("ZAR", 100),
];

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn num(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => Some(*n),
        _ => None,
    }
}

fn text(v: &Value) -> Option<&str> {
    match v {
        Value::Str(s) => Some(s),
        _ => None,
    }
}

fn boolean(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn callable(v: &Value) -> Option<&Callable> {
    match v {
        Value::Callable(c) => Some(c),
        _ => None,
    }
}

fn date(v: &Value) -> Option<Date> {
    match v {
        Value::Date(d) => Some(*d),
        Value::Str(s) => Date::parse(s),
        _ => None,
    }
}

fn instant(v: &Value) -> Option<Timestamp> {
    match v {
        Value::Timestamp(ts) => Some(*ts),
        Value::Number(n) => Some(Timestamp::from_secs(*n)),
        Value::Str(s) => parse_timestamp(s),
        _ => None,
    }
}

fn integer(v: &Value) -> Option<i64> {
    num(v).map(|n| n.trunc() as i64)
}

fn binary_num(args: &[Value], op: fn(f64, f64) -> f64) -> Value {
    match (num(&args[0]), num(&args[1])) {
        (Some(a), Some(b)) => Value::Number(op(a, b)),
        _ => Value::Null,
    }
}

fn unary_num(args: &[Value], op: fn(f64) -> f64) -> Value {
    match num(&args[0]) {
        Some(n) => Value::Number(op(n)),
        None => Value::Null,
    }
}

// ---------------------------------------------------------------------------
// Sequence plumbing
// ---------------------------------------------------------------------------

/// A stdlib view of a value as a sequence. Strings iterate as one-character
/// strings; anything that is not a string or array is a singleton.
enum Seq {
    Text(Vec<Value>),
    Items(Vec<Value>),
    Single(Value),
}

fn to_seq(v: &Value) -> Seq {
    match v {
        Value::Str(s) => Seq::Text(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Array(items) => Seq::Items(items.clone()),
        other => Seq::Single(other.clone()),
    }
}

impl Seq {
    fn is_text(&self) -> bool {
        matches!(self, Seq::Text(_))
    }

    fn into_items(self) -> Vec<Value> {
        match self {
            Seq::Text(items) | Seq::Items(items) => items,
            Seq::Single(v) => vec![v],
        }
    }
}

/// Convert back to a string when a string came in and the element type
/// remained string; otherwise produce an array.
fn seq_result(items: Vec<Value>, text_input: bool) -> Value {
    if text_input && items.iter().all(|i| matches!(i, Value::Str(_))) {
        let mut out = String::new();
        for item in &items {
            if let Value::Str(s) = item {
                out.push_str(s);
            }
        }
        Value::Str(out)
    } else {
        Value::Array(items)
    }
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

fn add(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(binary_num(args, |a, b| a + b))
}

fn sub(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(binary_num(args, |a, b| a - b))
}

fn mul(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(binary_num(args, |a, b| a * b))
}

fn div(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(binary_num(args, |a, b| if b == 0.0 { 0.0 } else { a / b }))
}

fn pow(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(binary_num(args, f64::powf))
}

/// Sign-of-divisor modulo: `((sign(b)·a mod |b|) + |b|) mod |b|`; zero
/// divisor yields zero.
fn modulo(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(binary_num(args, |a, b| {
        if b == 0.0 {
            0.0
        } else {
            let m = b.abs();
            (((b.signum() * a) % m) + m) % m
        }
    }))
}

fn floor(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(unary_num(args, f64::floor))
}

fn ceil(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(unary_num(args, f64::ceil))
}

fn round(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(unary_num(args, f64::round))
}

fn trunc(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(unary_num(args, f64::trunc))
}

fn sign(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(unary_num(args, |n| if n == 0.0 { 0.0 } else { n.signum() }))
}

fn abs(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(unary_num(args, f64::abs))
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

fn eq(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(args[0] == args[1]))
}

fn neq(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(args[0] != args[1]))
}

/// Same-kind ordering: numbers numerically, strings lexicographically,
/// dates and timestamps chronologically. Mismatched kinds do not compare.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.secs().partial_cmp(&y.secs()),
        _ => None,
    }
}

fn gt(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(matches!(compare(&args[0], &args[1]), Some(Ordering::Greater))))
}

fn lt(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(matches!(compare(&args[0], &args[1]), Some(Ordering::Less))))
}

fn ge(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(matches!(
        compare(&args[0], &args[1]),
        Some(Ordering::Greater | Ordering::Equal)
    )))
}

fn le(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(matches!(
        compare(&args[0], &args[1]),
        Some(Ordering::Less | Ordering::Equal)
    )))
}

// ---------------------------------------------------------------------------
// Logic
// ---------------------------------------------------------------------------

fn and(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(matches!(
        (boolean(&args[0]), boolean(&args[1])),
        (Some(true), Some(true))
    )))
}

fn or(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(matches!(
        (boolean(&args[0]), boolean(&args[1])),
        (Some(true), _) | (_, Some(true))
    )))
}

fn not(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Bool(boolean(&args[0]) == Some(false)))
}

fn xor(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(match (boolean(&args[0]), boolean(&args[1])) {
        (Some(a), Some(b)) => Value::Bool(a != b),
        _ => Value::Bool(false),
    })
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

fn concat(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let a = to_seq(&args[0]);
    let b = to_seq(&args[1]);
    let text = a.is_text() && b.is_text();
    let mut items = a.into_items();
    items.extend(b.into_items());
    Ok(seq_result(items, text))
}

fn map(interp: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let Some(f) = callable(&args[0]) else {
        return Ok(Value::Null);
    };
    match to_seq(&args[1]) {
        // Non-iterables map as singletons: apply once, return the result.
        Seq::Single(v) => interp.apply(f, &[v]),
        seq => {
            let text = seq.is_text();
            let mut out = Vec::new();
            for item in seq.into_items() {
                out.push(interp.apply(f, &[item])?);
            }
            Ok(seq_result(out, text))
        }
    }
}

fn flat_map(interp: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let Some(f) = callable(&args[0]) else {
        return Ok(Value::Null);
    };
    match to_seq(&args[1]) {
        Seq::Single(v) => interp.apply(f, &[v]),
        seq => {
            let text = seq.is_text();
            let mut out = Vec::new();
            for item in seq.into_items() {
                match interp.apply(f, &[item])? {
                    Value::Array(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            Ok(seq_result(out, text))
        }
    }
}

fn fold(interp: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let Some(f) = callable(&args[0]) else {
        return Ok(Value::Null);
    };
    let mut acc = args[1].clone();
    for item in to_seq(&args[2]).into_items() {
        acc = interp.apply(f, &[acc, item])?;
    }
    Ok(acc)
}

fn fold1(interp: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let Some(f) = callable(&args[0]) else {
        return Ok(Value::Null);
    };
    let mut items = to_seq(&args[1]).into_items().into_iter();
    let Some(mut acc) = items.next() else {
        return Ok(Value::Null);
    };
    for item in items {
        acc = interp.apply(f, &[acc, item])?;
    }
    Ok(acc)
}

fn filter(interp: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let Some(f) = callable(&args[0]) else {
        return Ok(Value::Null);
    };
    match to_seq(&args[1]) {
        Seq::Single(v) => {
            let keep = interp.apply(f, &[v.clone()])?;
            Ok(if keep == Value::Bool(true) { v } else { Value::Null })
        }
        seq => {
            let text = seq.is_text();
            let mut out = Vec::new();
            for item in seq.into_items() {
                if interp.apply(f, &[item.clone()])? == Value::Bool(true) {
                    out.push(item);
                }
            }
            Ok(seq_result(out, text))
        }
    }
}

fn index(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let Some(i) = integer(&args[0]) else {
        return Ok(Value::Null);
    };
    if i < 0 {
        return Ok(Value::Null);
    }
    let items = to_seq(&args[1]).into_items();
    Ok(items.get(i as usize).cloned().unwrap_or(Value::Null))
}

fn find_index(interp: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let Some(f) = callable(&args[0]) else {
        return Ok(Value::Null);
    };
    for (i, item) in to_seq(&args[1]).into_items().into_iter().enumerate() {
        if interp.apply(f, &[item])? == Value::Bool(true) {
            return Ok(Value::Number(i as f64));
        }
    }
    Ok(Value::Number(-1.0))
}

fn length(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Number(to_seq(&args[0]).into_items().len() as f64))
}

fn contains(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let needle = &args[0];
    Ok(Value::Bool(
        to_seq(&args[1]).into_items().iter().any(|item| item == needle),
    ))
}

fn head(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(to_seq(&args[0])
        .into_items()
        .into_iter()
        .next()
        .unwrap_or(Value::Null))
}

fn tail(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let seq = to_seq(&args[0]);
    let text = seq.is_text();
    let mut items = seq.into_items();
    if !items.is_empty() {
        items.remove(0);
    }
    Ok(seq_result(items, text))
}

fn sort(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let seq = to_seq(&args[0]);
    let text = seq.is_text();
    let mut items = seq.into_items();
    items.sort_by(total_cmp);
    Ok(seq_result(items, text))
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn numbers(v: &Value) -> Vec<f64> {
    to_seq(v).into_items().iter().filter_map(num).collect()
}

fn sum(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Number(numbers(&args[0]).iter().sum()))
}

fn min(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(to_seq(&args[0])
        .into_items()
        .into_iter()
        .min_by(total_cmp)
        .unwrap_or(Value::Null))
}

fn max(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(to_seq(&args[0])
        .into_items()
        .into_iter()
        .max_by(total_cmp)
        .unwrap_or(Value::Null))
}

fn avg(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let nums = numbers(&args[0]);
    if nums.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::Number(nums.iter().sum::<f64>() / nums.len() as f64))
}

fn med(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let mut nums = numbers(&args[0]);
    if nums.is_empty() {
        return Ok(Value::Null);
    }
    nums.sort_by(f64::total_cmp);
    let mid = nums.len() / 2;
    Ok(Value::Number(if nums.len() % 2 == 1 {
        nums[mid]
    } else {
        (nums[mid - 1] + nums[mid]) / 2.0
    }))
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Fractional months between two dates, normalized against the day count of
/// the first date's month.
fn months_between(a: Date, b: Date) -> f64 {
    let (ya, ma, da) = a.ymd();
    let (yb, mb, db) = b.ymd();
    let whole = (ya - yb) * 12 + (ma as i64 - mb as i64);
    whole as f64 + (da as f64 - db as f64) / days_in_month(ya, ma) as f64
}

fn date_sub(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(unit), Some(a), Some(b)) = (text(&args[0]), date(&args[1]), date(&args[2])) else {
        return Ok(Value::Null);
    };
    let days = (a.days() - b.days()) as f64;
    Ok(match unit {
        "days" => Value::Number(days),
        "weeks" => Value::Number(days / 7.0),
        "months" => Value::Number(months_between(a, b)),
        "years" => Value::Number(months_between(a, b) / 12.0),
        _ => Value::Null,
    })
}

fn date_add(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(unit), Some(n), Some(d)) = (text(&args[0]), integer(&args[1]), date(&args[2]))
    else {
        return Ok(Value::Null);
    };
    let shifted = match unit {
        "days" => Date::from_days(d.days() + n),
        "weeks" => Date::from_days(d.days() + n * 7),
        "months" => d.add_months(n),
        "years" => d.add_months(n * 12),
        _ => return Ok(Value::Null),
    };
    Ok(Value::Str(shifted.to_string()))
}

fn date_today(_: &mut Interp<'_>, _args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Str(Date::today().to_string()))
}

fn date_fmt(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(fmt), Some(d)) = (text(&args[0]), date(&args[1])) else {
        return Ok(Value::Null);
    };
    Ok(Value::Str(format_date(fmt, d)))
}

fn date_get(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(unit), Some(d)) = (text(&args[0]), date(&args[1])) else {
        return Ok(Value::Null);
    };
    Ok(match unit {
        "year" => Value::Number(d.year() as f64),
        "month" => Value::Number(d.month() as f64),
        "day" => Value::Number(d.day() as f64),
        "weekday" => Value::Number(d.weekday() as f64),
        _ => Value::Null,
    })
}

fn date_set(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(unit), Some(n), Some(d)) = (text(&args[0]), integer(&args[1]), date(&args[2]))
    else {
        return Ok(Value::Null);
    };
    let (y, m, day) = d.ymd();
    let updated = match unit {
        "year" => Date::from_ymd(n, m as i64, (day.min(days_in_month(n, m))) as i64),
        "month" if (1..=12).contains(&n) => {
            Date::from_ymd(y, n, (day.min(days_in_month(y, n as u32))) as i64)
        }
        "day" => Date::from_ymd(y, m as i64, n.clamp(1, days_in_month(y, m) as i64)),
        _ => None,
    };
    Ok(updated.map_or(Value::Null, |d| Value::Str(d.to_string())))
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

fn unit_seconds(unit: &str) -> Option<f64> {
    Some(match unit {
        "seconds" => 1.0,
        "minutes" => 60.0,
        "hours" => 3600.0,
        "days" => 86_400.0,
        "weeks" => 604_800.0,
        _ => return None,
    })
}

fn ts_now(_: &mut Interp<'_>, _args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Timestamp(Timestamp::now()))
}

fn tz_utc(_: &mut Interp<'_>, _args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Number(0.0))
}

/// The host's local offset. The core is UTC-fixed; hosts needing a real
/// local zone inject it through a form value.
fn tz_local(_: &mut Interp<'_>, _args: &[Value]) -> EvalResult<Value> {
    Ok(Value::Number(0.0))
}

fn ts_from_unix(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(num(&args[0]).map_or(Value::Null, |n| Value::Timestamp(Timestamp::from_secs(n))))
}

fn ts_to_unix(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(instant(&args[0]).map_or(Value::Null, |ts| Value::Number(ts.secs())))
}

fn ts_from_date(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(d), Some(tz)) = (date(&args[0]), num(&args[1])) else {
        return Ok(Value::Null);
    };
    let secs = d.days() as f64 * 86_400.0 - tz * 60.0;
    Ok(Value::Timestamp(Timestamp::from_secs(secs)))
}

fn ts_to_date(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(tz), Some(ts)) = (num(&args[0]), instant(&args[1])) else {
        return Ok(Value::Null);
    };
    let (y, m, d, _, _, _) = ts.to_local(tz).civil_utc();
    Ok(Date::from_ymd(y, m as i64, d as i64).map_or(Value::Null, |d| Value::Str(d.to_string())))
}

fn ts_parse(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(text(&args[0])
        .and_then(parse_timestamp)
        .map_or(Value::Null, Value::Timestamp))
}

fn ts_to_string(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(instant(&args[0]).map_or(Value::Null, |ts| Value::Str(ts.to_string())))
}

fn ts_fmt(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(fmt), Some(tz), Some(ts)) = (text(&args[0]), num(&args[1]), instant(&args[2]))
    else {
        return Ok(Value::Null);
    };
    Ok(Value::Str(format_timestamp(fmt, ts.to_local(tz))))
}

fn ts_add(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(unit), Some(n), Some(ts)) = (text(&args[0]), num(&args[1]), instant(&args[2]))
    else {
        return Ok(Value::Null);
    };
    if let Some(scale) = unit_seconds(unit) {
        return Ok(Value::Timestamp(Timestamp::from_secs(ts.secs() + n * scale)));
    }
    let months = match unit {
        "months" => n.trunc() as i64,
        "years" => n.trunc() as i64 * 12,
        _ => return Ok(Value::Null),
    };
    let (y, m, d, hh, mm, ss) = ts.civil_utc();
    let date = Date::from_ymd(y, m as i64, d as i64)
        .unwrap_or(Date::from_days(0))
        .add_months(months);
    let (ny, nm, nd) = date.ymd();
    Ok(Value::Timestamp(Timestamp::from_civil_utc(
        ny,
        nm,
        nd,
        hh,
        mm,
        ss,
        ts.subsec(),
    )))
}

fn ts_sub(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(unit), Some(a), Some(b)) = (text(&args[0]), instant(&args[1]), instant(&args[2]))
    else {
        return Ok(Value::Null);
    };
    if let Some(scale) = unit_seconds(unit) {
        return Ok(Value::Number((a.secs() - b.secs()) / scale));
    }
    let (ya, ma, da, ..) = a.civil_utc();
    let (yb, mb, db, ..) = b.civil_utc();
    let (Some(da), Some(db)) = (
        Date::from_ymd(ya, ma as i64, da as i64),
        Date::from_ymd(yb, mb as i64, db as i64),
    ) else {
        return Ok(Value::Null);
    };
    Ok(match unit {
        "months" => Value::Number(months_between(da, db)),
        "years" => Value::Number(months_between(da, db) / 12.0),
        _ => Value::Null,
    })
}

fn ts_get(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(unit), Some(tz), Some(ts)) = (text(&args[0]), num(&args[1]), instant(&args[2]))
    else {
        return Ok(Value::Null);
    };
    let local = ts.to_local(tz);
    let (y, m, d, hh, mm, ss) = local.civil_utc();
    Ok(match unit {
        "year" => Value::Number(y as f64),
        "month" => Value::Number(m as f64),
        "day" => Value::Number(d as f64),
        "weekday" => {
            let date = Date::from_ymd(y, m as i64, d as i64);
            date.map_or(Value::Null, |d| Value::Number(d.weekday() as f64))
        }
        "hour" => Value::Number(hh as f64),
        "minute" => Value::Number(mm as f64),
        "second" => Value::Number(ss as f64),
        _ => Value::Null,
    })
}

fn ts_set(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(unit), Some(n), Some(tz), Some(ts)) = (
        text(&args[0]),
        integer(&args[1]),
        num(&args[2]),
        instant(&args[3]),
    ) else {
        return Ok(Value::Null);
    };
    let local = ts.to_local(tz);
    let (mut y, mut m, mut d, mut hh, mut mm, mut ss) = local.civil_utc();
    match unit {
        "year" => y = n,
        "month" if (1..=12).contains(&n) => m = n as u32,
        "day" => d = n.clamp(1, days_in_month(y, m) as i64) as u32,
        "hour" => hh = n.clamp(0, 23) as u32,
        "minute" => mm = n.clamp(0, 59) as u32,
        "second" => ss = n.clamp(0, 59) as u32,
        _ => return Ok(Value::Null),
    }
    d = d.min(days_in_month(y, m));
    let rebuilt = Timestamp::from_civil_utc(y, m, d, hh, mm, ss, local.subsec());
    Ok(Value::Timestamp(Timestamp::from_secs(
        rebuilt.secs() - tz * 60.0,
    )))
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn currency_fmt(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let (Some(code), Some(amount)) = (text(&args[0]), num(&args[1])) else {
        return Ok(Value::Null);
    };
    let Some(&(_, minor_units)) = CURRENCIES.iter().find(|(c, _)| *c == code) else {
        return Ok(Value::Null);
    };
    Ok(ext::with(|slots| {
        slots
            .format_currency
            .as_ref()
            .map(|f| Value::Str(f(code, minor_units, amount)))
            .unwrap_or(Value::Null)
    }))
}

fn country_fmt(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let Some(code) = text(&args[0]) else {
        return Ok(Value::Null);
    };
    Ok(ext::with(|slots| {
        slots
            .country_name
            .as_ref()
            .and_then(|f| f(code))
            .map_or(Value::Null, Value::Str)
    }))
}

fn phone_fmt(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    let Some(number) = text(&args[0]) else {
        return Ok(Value::Null);
    };
    Ok(ext::with(|slots| {
        slots
            .format_phone
            .as_ref()
            .and_then(|f| f(number))
            .map_or(Value::Null, Value::Str)
    }))
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

fn if_fn(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(if args[0] == Value::Bool(true) {
        args[1].clone()
    } else {
        args[2].clone()
    })
}

fn id(_: &mut Interp<'_>, args: &[Value]) -> EvalResult<Value> {
    Ok(args[0].clone())
}
