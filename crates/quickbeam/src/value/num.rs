//! Numeric values: exact integers, exact rationals and floats

use std::fmt;

/// A number value.
///
/// All three representations share the `number` kind. Strings that look
/// like numbers stay strings until something asks for a number; see
/// [`parse_num`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    /// Exact integer
    Int(i64),
    /// Exact rational with a denominator other than 1
    Rat(Rational),
    /// IEEE 754 double
    Float(f64),
}

/// An exact rational number in lowest terms with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    /// Build a rational, reducing it to lowest terms.
    ///
    /// Returns `None` for a zero denominator or when normalization overflows.
    pub fn new(num: i64, den: i64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let g = gcd(num.unsigned_abs(), den.unsigned_abs());
        let (mut num, mut den) = (num / g as i64, den / g as i64);
        if den < 0 {
            num = num.checked_neg()?;
            den = den.checked_neg()?;
        }
        Some(Self { num, den })
    }

    /// Numerator (carries the sign).
    pub fn numer(&self) -> i64 {
        self.num
    }

    /// Denominator (always positive).
    pub fn denom(&self) -> i64 {
        self.den
    }

    /// Lossy conversion to a float.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

impl Num {
    /// Lossy conversion to a float.
    pub fn to_f64(&self) -> f64 {
        match self {
            Num::Int(n) => *n as f64,
            Num::Rat(r) => r.to_f64(),
            Num::Float(f) => *f,
        }
    }

    /// Whether the number is strictly below zero.
    pub fn is_negative(&self) -> bool {
        match self {
            Num::Int(n) => *n < 0,
            Num::Rat(r) => r.numer() < 0,
            Num::Float(f) => *f < 0.0,
        }
    }

    /// Normalize an exact rational: a denominator of 1 becomes an integer.
    fn from_rational(r: Rational) -> Self {
        if r.denom() == 1 {
            Num::Int(r.numer())
        } else {
            Num::Rat(r)
        }
    }
}

/// Parse a string as a number.
///
/// Accepts integers (`42`, `-7`), exact rationals (`1/2`) and decimal or
/// scientific floats (`0.1`, `1e3`, `inf`). Returns `None` for anything else.
pub fn parse_num(s: &str) -> Option<Num> {
    if s.is_empty() {
        return None;
    }
    if let Some((n, d)) = s.split_once('/') {
        let n = n.parse::<i64>().ok()?;
        let d = d.parse::<i64>().ok()?;
        return Rational::new(n, d).map(Num::from_rational);
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(Num::Int(n));
    }
    // Rust's float grammar is a superset of what a shell user types, but it
    // never accepts trailing garbage like "1x" or unit suffixes like "1s".
    s.parse::<f64>().ok().map(Num::Float)
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num::Int(n) => write!(f, "{}", n),
            Num::Rat(r) => write!(f, "{}/{}", r.numer(), r.denom()),
            Num::Float(x) => format_float(*x, f),
        }
    }
}

fn format_float(x: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if x.is_nan() {
        write!(f, "NaN")
    } else if x.is_infinite() {
        write!(f, "{}Inf", if x > 0.0 { "+" } else { "-" })
    } else if x.fract() == 0.0 && x.abs() < 1e21 {
        write!(f, "{:.1}", x)
    } else {
        write!(f, "{}", x)
    }
}

impl From<i64> for Num {
    fn from(n: i64) -> Self {
        Num::Int(n)
    }
}

impl From<f64> for Num {
    fn from(x: f64) -> Self {
        Num::Float(x)
    }
}
