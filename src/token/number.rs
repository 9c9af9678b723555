//! The `Number` token primitive (§4.2): signed/unsigned integer/float with
//! optional exponent, and the exponent-backtracking rule that makes `2.5e+abc`
//! consume only `2.5`.

use crate::ast::AstValue;

/// Which numeric forms a `Number` token accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberForm {
    Integer,
    Float,
    /// Requires both an integer part and a fractional part (`1.5`, not `1.`/`.5`).
    StrictFloat,
    Scientific,
    Exponent,
    UnsignedInteger,
    UnsignedScientific,
}

/// Options for a `Number` token pattern (§4.2's `(kind, flags)` pair).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumberOptions {
    pub form: NumberForm,
    /// Return the narrowest type that preserves value: narrows `Float` down
    /// to `Int`/`UInt` only when no float marker (`.`, exponent) was present
    /// in the consumed text — never just because the value happens to be
    /// integral.
    pub prefer_simpler: bool,
}

impl NumberOptions {
    pub fn new(form: NumberForm) -> Self {
        NumberOptions { form, prefer_simpler: false }
    }

    #[must_use]
    pub fn with_prefer_simpler(mut self) -> Self {
        self.prefer_simpler = true;
        self
    }
}

/// The result of a successful `Number` match: how many UTF-16 units were
/// consumed and the value, tagged by which literal forms were present.
#[derive(Clone, Copy, Debug)]
pub struct NumberMatch {
    pub length: usize,
    pub value: NumberValue,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NumberValue {
    I64(i64),
    U64(u64),
    F64(f64),
}

impl From<NumberValue> for AstValue {
    fn from(value: NumberValue) -> Self {
        match value {
            NumberValue::I64(v) => AstValue::Int(v),
            NumberValue::U64(v) => AstValue::UInt(v),
            NumberValue::F64(v) => AstValue::Float(v),
        }
    }
}

/// Attempt to match a number at `chars[0..]`, per `options`. `chars` is the
/// remaining UTF-16-decoded input from the current position onward, already
/// capped at the barrier boundary by the caller.
pub fn match_number(chars: &[char], options: NumberOptions) -> Option<NumberMatch> {
    let mut i = 0usize;
    let allow_sign = !matches!(options.form, NumberForm::UnsignedInteger | NumberForm::UnsignedScientific);

    let negative = if allow_sign && i < chars.len() && (chars[i] == '+' || chars[i] == '-') {
        let neg = chars[i] == '-';
        i += 1;
        neg
    } else {
        false
    };

    let int_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let has_int_part = i > int_start;
    if !has_int_part {
        return None;
    }

    let mut has_frac = false;
    let mut frac_end = i;
    let allows_float = matches!(
        options.form,
        NumberForm::Float | NumberForm::StrictFloat | NumberForm::Scientific | NumberForm::UnsignedScientific
    );
    if allows_float && frac_end < chars.len() && chars[frac_end] == '.' {
        let mut j = frac_end + 1;
        let frac_digits_start = j;
        while j < chars.len() && chars[j].is_ascii_digit() {
            j += 1;
        }
        if j > frac_digits_start {
            has_frac = true;
            frac_end = j;
        } else if options.form == NumberForm::StrictFloat {
            // `1.` with no fractional digits does not satisfy StrictFloat;
            // leave the `.` unconsumed and fall through to integer-only.
        } else {
            // `Float` (non-strict) still accepts a bare `1.` form.
            has_frac = true;
            frac_end = j;
        }
    }

    if options.form == NumberForm::StrictFloat && !has_frac {
        return None;
    }

    let mut end = frac_end;
    let mut has_exponent = false;
    let allows_exponent = matches!(
        options.form,
        NumberForm::Scientific | NumberForm::Exponent | NumberForm::UnsignedScientific
    );
    if allows_exponent && end < chars.len() && (chars[end] == 'e' || chars[end] == 'E') {
        // Exponent backtracking (§8 scenario 6): only commit to consuming
        // the exponent marker if digits actually follow it.
        let mut k = end + 1;
        if k < chars.len() && (chars[k] == '+' || chars[k] == '-') {
            k += 1;
        }
        let exp_digits_start = k;
        while k < chars.len() && chars[k].is_ascii_digit() {
            k += 1;
        }
        if k > exp_digits_start {
            has_exponent = true;
            end = k;
        }
        // else: leave `end` at the pre-exponent position; the `e`/`e±` is
        // not consumed at all.
    }

    let text: String = chars[..end].iter().collect();
    let is_float_form = has_frac || has_exponent;

    let value = if is_float_form {
        let parsed: f64 = text.parse().ok()?;
        if options.prefer_simpler && parsed.fract() == 0.0 && parsed.is_finite() {
            // Narrow an exactly-integral float (`5.0`, `5e0`) down to the
            // integer representation only when explicitly requested — by
            // default a literal that spelled out a `.`/exponent stays a
            // float even if its value happens to be a whole number.
            if negative {
                NumberValue::I64(-(parsed.abs() as i64))
            } else if matches!(options.form, NumberForm::UnsignedScientific) {
                NumberValue::U64(parsed as u64)
            } else {
                NumberValue::I64(parsed as i64)
            }
        } else {
            NumberValue::F64(parsed)
        }
    } else if negative {
        let parsed: i64 = text.parse().ok()?;
        NumberValue::I64(-parsed)
    } else if matches!(options.form, NumberForm::UnsignedInteger | NumberForm::UnsignedScientific) {
        let parsed: u64 = text.parse().ok()?;
        NumberValue::U64(parsed)
    } else {
        match text.parse::<i64>() {
            Ok(parsed) => NumberValue::I64(parsed),
            Err(_) => NumberValue::U64(text.parse().ok()?),
        }
    };

    Some(NumberMatch { length: end, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn plain_integer() {
        let m = match_number(&chars("42rest"), NumberOptions::new(NumberForm::Integer)).unwrap();
        assert_eq!(m.length, 2);
        assert_eq!(m.value, NumberValue::I64(42));
    }

    #[test]
    fn negative_integer() {
        let m = match_number(&chars("-7"), NumberOptions::new(NumberForm::Integer)).unwrap();
        assert_eq!(m.value, NumberValue::I64(-7));
    }

    #[test]
    fn strict_float_requires_fraction() {
        assert!(match_number(&chars("1."), NumberOptions::new(NumberForm::StrictFloat)).is_none());
        let m = match_number(&chars("1.5"), NumberOptions::new(NumberForm::StrictFloat)).unwrap();
        assert_eq!(m.value, NumberValue::F64(1.5));
    }

    #[test]
    fn scientific_exponent_backtracks_without_digits() {
        let m = match_number(&chars("2.5e+abc"), NumberOptions::new(NumberForm::Scientific)).unwrap();
        assert_eq!(m.length, 3);
        assert_eq!(m.value, NumberValue::F64(2.5));
    }

    #[test]
    fn scientific_exponent_consumes_signed_digits() {
        let m = match_number(&chars("1.5e-10x"), NumberOptions::new(NumberForm::Scientific)).unwrap();
        assert_eq!(m.length, 7);
        assert_eq!(m.value, NumberValue::F64(1.5e-10));
    }

    #[test]
    fn unsigned_rejects_sign() {
        assert!(match_number(&chars("-5"), NumberOptions::new(NumberForm::UnsignedInteger)).is_none());
        let m = match_number(&chars("5"), NumberOptions::new(NumberForm::UnsignedInteger)).unwrap();
        assert_eq!(m.value, NumberValue::U64(5));
    }

    #[test]
    fn no_digits_fails() {
        assert!(match_number(&chars("abc"), NumberOptions::new(NumberForm::Integer)).is_none());
    }
}
