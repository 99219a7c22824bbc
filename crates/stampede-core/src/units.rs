//! Engineering values with SI prefixes.
//!
//! Prefixes are case-sensitive the way they are written on schematics:
//! `M` is mega and `m` is milli. `meg` is accepted as mega too.

const PREFIXES: &[(&str, f64)] = &[
    ("meg", 1e6),
    ("MEG", 1e6),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("K", 1e3),
    ("m", 1e-3),
    ("u", 1e-6),
    ("\u{b5}", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
];

/// Parse a value such as `4.7k`, `10u`, `2.2M` or `1e-3`.
///
/// A trailing unit symbol (`V`, `A`, `F`, `H`, `Hz`, `s`, `ohm`) after the
/// prefix is ignored, so `100nF` parses as `100e-9`.
pub fn parse_value(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }

    let mut num_end = 0;
    for (i, c) in s.char_indices() {
        let exponent_sign =
            (c == '-' || c == '+') && matches!(s[..i].chars().last(), Some('e' | 'E'));
        let exponent = (c == 'e' || c == 'E')
            && s[i + 1..]
                .chars()
                .next()
                .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+');
        if c.is_ascii_digit()
            || c == '.'
            || (i == 0 && (c == '-' || c == '+'))
            || exponent
            || exponent_sign
        {
            num_end = i + c.len_utf8();
        } else {
            break;
        }
    }
    if num_end == 0 {
        return None;
    }

    let (num_str, rest) = s.split_at(num_end);
    let value: f64 = num_str.parse().ok()?;
    let rest = strip_unit(rest.trim_start());

    if rest.is_empty() {
        return Some(value);
    }
    PREFIXES
        .iter()
        .find(|(p, _)| *p == rest)
        .map(|(_, m)| value * m)
}

fn strip_unit(s: &str) -> &str {
    for unit in ["ohm", "Ohm", "\u{3a9}", "Hz", "V", "A", "F", "H", "s"] {
        if let Some(rest) = s.strip_suffix(unit) {
            return rest;
        }
    }
    s
}

fn scale(value: f64) -> (f64, &'static str) {
    let abs_value = value.abs();
    if abs_value >= 1e12 {
        (value / 1e12, "T")
    } else if abs_value >= 1e9 {
        (value / 1e9, "G")
    } else if abs_value >= 1e6 {
        (value / 1e6, "M")
    } else if abs_value >= 1e3 {
        (value / 1e3, "k")
    } else if abs_value >= 1.0 || abs_value == 0.0 {
        (value, "")
    } else if abs_value >= 1e-3 {
        (value * 1e3, "m")
    } else if abs_value >= 1e-6 {
        (value * 1e6, "u")
    } else if abs_value >= 1e-9 {
        (value * 1e9, "n")
    } else if abs_value >= 1e-12 {
        (value * 1e12, "p")
    } else if abs_value >= 1e-15 {
        (value * 1e15, "f")
    } else {
        (value, "")
    }
}

/// Format a value with an SI prefix.
pub fn format_value(value: f64) -> String {
    let (scaled, suffix) = scale(value);
    format!("{:.4}{}", scaled, suffix)
}

/// Format a value with an SI prefix and unit symbol, e.g. `2.500 V`.
pub fn format_units(value: f64, unit: &str) -> String {
    let (scaled, prefix) = scale(value);
    format!("{:.3} {}{}", scaled, prefix, unit)
}
