//! Exact-integer arithmetic.
//!
//! The numeric model is fixnums, arbitrary-precision bignums, and the two
//! signed infinities. Fixnum operations promote to bignums on overflow;
//! bignum results normalize back to a fixnum when they fit. Division is
//! Euclidean: the remainder is always in `[0, |divisor|)`.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::cmp::Ordering;

use super::error::{ErrorKind, KernelError};
use super::types::{self, Value, ValueRef};

/// Arithmetic view of a value.
enum Num {
    Fix(i64),
    Big(BigInt),
    PosInf,
    NegInf,
}

fn classify(v: &ValueRef) -> Result<Num, KernelError> {
    match &**v {
        Value::Fixnum(n) => Ok(Num::Fix(*n)),
        Value::Bignum(n) => Ok(Num::Big(n.clone())),
        Value::PositiveInfinity => Ok(Num::PosInf),
        Value::NegativeInfinity => Ok(Num::NegInf),
        _ => Err(KernelError::type_error(
            format!("expected an integer, got {}", v.type_name()),
            vec![v.clone()],
        )),
    }
}

fn big_of(n: &Num) -> BigInt {
    match n {
        Num::Fix(v) => BigInt::from(*v),
        Num::Big(v) => v.clone(),
        _ => unreachable!("infinity has no bignum representation"),
    }
}

pub fn add(a: &ValueRef, b: &ValueRef) -> Result<ValueRef, KernelError> {
    match (classify(a)?, classify(b)?) {
        (Num::PosInf, Num::NegInf) | (Num::NegInf, Num::PosInf) => Err(KernelError::new(
            ErrorKind::AddPositiveToNegativeInfinity,
            "cannot add positive and negative infinity",
        )),
        (Num::PosInf, _) | (_, Num::PosInf) => Ok(types::positive_infinity()),
        (Num::NegInf, _) | (_, Num::NegInf) => Ok(types::negative_infinity()),
        (Num::Fix(x), Num::Fix(y)) => match x.checked_add(y) {
            Some(n) => Ok(types::fixnum(n)),
            None => Ok(types::integer(BigInt::from(x) + BigInt::from(y))),
        },
        (x, y) => Ok(types::integer(big_of(&x) + big_of(&y))),
    }
}

pub fn sub(a: &ValueRef, b: &ValueRef) -> Result<ValueRef, KernelError> {
    match (classify(a)?, classify(b)?) {
        (Num::PosInf, Num::PosInf) | (Num::NegInf, Num::NegInf) => Err(KernelError::new(
            ErrorKind::AddPositiveToNegativeInfinity,
            "cannot add positive and negative infinity",
        )),
        (Num::PosInf, _) | (_, Num::NegInf) => Ok(types::positive_infinity()),
        (Num::NegInf, _) | (_, Num::PosInf) => Ok(types::negative_infinity()),
        (Num::Fix(x), Num::Fix(y)) => match x.checked_sub(y) {
            Some(n) => Ok(types::fixnum(n)),
            None => Ok(types::integer(BigInt::from(x) - BigInt::from(y))),
        },
        (x, y) => Ok(types::integer(big_of(&x) - big_of(&y))),
    }
}

pub fn mul(a: &ValueRef, b: &ValueRef) -> Result<ValueRef, KernelError> {
    let (x, y) = (classify(a)?, classify(b)?);
    let infinite = |n: &Num| matches!(n, Num::PosInf | Num::NegInf);
    if infinite(&x) || infinite(&y) {
        if is_zero_num(&x) || is_zero_num(&y) {
            return Err(KernelError::new(
                ErrorKind::MultiplyInfinityByZero,
                "cannot multiply infinity by zero",
            ));
        }
        let negative = num_is_negative(&x) != num_is_negative(&y);
        return Ok(if negative {
            types::negative_infinity()
        } else {
            types::positive_infinity()
        });
    }
    match (x, y) {
        (Num::Fix(x), Num::Fix(y)) => match x.checked_mul(y) {
            Some(n) => Ok(types::fixnum(n)),
            None => Ok(types::integer(BigInt::from(x) * BigInt::from(y))),
        },
        (x, y) => Ok(types::integer(big_of(&x) * big_of(&y))),
    }
}

/// Euclidean division: returns `(div, mod)` with `0 <= mod < |divisor|`.
pub fn div_and_mod(a: &ValueRef, b: &ValueRef) -> Result<(ValueRef, ValueRef), KernelError> {
    let (x, y) = (classify(a)?, classify(b)?);
    if is_zero_num(&y) {
        return Err(KernelError::with_irritants(
            ErrorKind::DivideByZero,
            "division by zero",
            vec![a.clone()],
        ));
    }
    if matches!(x, Num::PosInf | Num::NegInf) || matches!(y, Num::PosInf | Num::NegInf) {
        return Err(KernelError::with_irritants(
            ErrorKind::DivideInfinity,
            "cannot divide with an infinite operand",
            vec![a.clone(), b.clone()],
        ));
    }
    if let (Num::Fix(x), Num::Fix(y)) = (&x, &y) {
        if let (Some(q), Some(r)) = (x.checked_div_euclid(*y), x.checked_rem_euclid(*y)) {
            return Ok((types::fixnum(q), types::fixnum(r)));
        }
    }
    let (xb, yb) = (big_of(&x), big_of(&y));
    let mut r = &xb % &yb;
    if r.is_negative() {
        r += yb.abs();
    }
    let q = (&xb - &r) / &yb;
    Ok((types::integer(q), types::integer(r)))
}

pub fn compare(a: &ValueRef, b: &ValueRef) -> Result<Ordering, KernelError> {
    match (classify(a)?, classify(b)?) {
        (Num::NegInf, Num::NegInf) | (Num::PosInf, Num::PosInf) => Ok(Ordering::Equal),
        (Num::NegInf, _) | (_, Num::PosInf) => Ok(Ordering::Less),
        (Num::PosInf, _) | (_, Num::NegInf) => Ok(Ordering::Greater),
        (Num::Fix(x), Num::Fix(y)) => Ok(x.cmp(&y)),
        (x, y) => Ok(big_of(&x).cmp(&big_of(&y))),
    }
}

pub fn is_zero(v: &ValueRef) -> Result<bool, KernelError> {
    Ok(is_zero_num(&classify(v)?))
}

pub fn is_positive(v: &ValueRef) -> Result<bool, KernelError> {
    match classify(v)? {
        Num::PosInf => Ok(true),
        Num::NegInf => Ok(false),
        Num::Fix(n) => Ok(n > 0),
        Num::Big(n) => Ok(n.is_positive()),
    }
}

pub fn is_negative(v: &ValueRef) -> Result<bool, KernelError> {
    Ok(num_is_negative(&classify(v)?))
}

fn is_zero_num(n: &Num) -> bool {
    match n {
        Num::Fix(v) => *v == 0,
        Num::Big(v) => v.is_zero(),
        _ => false,
    }
}

fn num_is_negative(n: &Num) -> bool {
    match n {
        Num::Fix(v) => *v < 0,
        Num::Big(v) => v.is_negative(),
        Num::PosInf => false,
        Num::NegInf => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{fixnum, negative_infinity, positive_infinity};

    #[test]
    fn test_fixnum_overflow_promotes() {
        let r = add(&fixnum(i64::MAX), &fixnum(1)).unwrap();
        assert!(matches!(&*r, Value::Bignum(_)));
    }

    #[test]
    fn test_bignum_normalizes_back() {
        let big = add(&fixnum(i64::MAX), &fixnum(1)).unwrap();
        let r = sub(&big, &fixnum(1)).unwrap();
        assert!(matches!(&*r, Value::Fixnum(n) if *n == i64::MAX));
    }

    #[test]
    fn test_opposite_infinities_signal() {
        let e = add(&positive_infinity(), &negative_infinity()).unwrap_err();
        assert_eq!(e.kind, ErrorKind::AddPositiveToNegativeInfinity);
        let e = sub(&negative_infinity(), &negative_infinity()).unwrap_err();
        assert_eq!(e.kind, ErrorKind::AddPositiveToNegativeInfinity);
    }

    #[test]
    fn test_infinity_times_zero_signals() {
        let e = mul(&positive_infinity(), &fixnum(0)).unwrap_err();
        assert_eq!(e.kind, ErrorKind::MultiplyInfinityByZero);
        let r = mul(&negative_infinity(), &fixnum(-2)).unwrap();
        assert!(matches!(&*r, Value::PositiveInfinity));
    }

    #[test]
    fn test_euclidean_div_mod() {
        let (q, r) = div_and_mod(&fixnum(-7), &fixnum(2)).unwrap();
        assert!(matches!(&*q, Value::Fixnum(-4)));
        assert!(matches!(&*r, Value::Fixnum(1)));
        let (q, r) = div_and_mod(&fixnum(7), &fixnum(-2)).unwrap();
        assert!(matches!(&*q, Value::Fixnum(-3)));
        assert!(matches!(&*r, Value::Fixnum(1)));
    }

    #[test]
    fn test_division_errors() {
        let e = div_and_mod(&fixnum(1), &fixnum(0)).unwrap_err();
        assert_eq!(e.kind, ErrorKind::DivideByZero);
        let e = div_and_mod(&positive_infinity(), &fixnum(2)).unwrap_err();
        assert_eq!(e.kind, ErrorKind::DivideInfinity);
    }

    #[test]
    fn test_ordering_with_infinities() {
        assert_eq!(
            compare(&negative_infinity(), &fixnum(i64::MIN)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare(&positive_infinity(), &fixnum(i64::MAX)).unwrap(),
            Ordering::Greater
        );
        assert_eq!(compare(&fixnum(3), &fixnum(3)).unwrap(), Ordering::Equal);
    }
}
