use crate::bson::Bson;

/// Coerce numeric types into an `i64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if (f - (f as i64 as f64)).abs() <= f64::EPSILON => Some(f as i64),
        _ => None,
    }
}

/// Whether the `ok` field of a server reply indicates success.
pub(crate) fn is_ok(val: Option<&Bson>) -> bool {
    match val {
        Some(Bson::Boolean(b)) => *b,
        Some(val) => get_int(val).map(|i| i == 1).unwrap_or(false),
        None => false,
    }
}
