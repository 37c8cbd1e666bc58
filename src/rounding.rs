//! Output-boundary rounding. Computation keeps full precision; these helpers are
//! only applied when results are serialized.

use serde::Serializer;
use serde::ser::SerializeSeq;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn one_decimal<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 1))
}

pub fn two_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 2))
}

pub fn three_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 3))
}

pub fn four_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 4))
}

#[allow(clippy::ptr_arg)]
pub fn two_decimals_seq<S: Serializer>(values: &Vec<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    rounded_seq(values, 2, serializer)
}

#[allow(clippy::ptr_arg)]
pub fn four_decimals_seq<S: Serializer>(values: &Vec<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    rounded_seq(values, 4, serializer)
}

fn rounded_seq<S: Serializer>(values: &[f64], decimals: i32, serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(values.len()))?;
    for value in values {
        seq.serialize_element(&round_to(*value, decimals))?;
    }
    seq.end()
}
