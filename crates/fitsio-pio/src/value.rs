//! Header value fields: decoding to text, encoding from typed values, and
//! typed conversion of decoded text.

use std::str;

/// Width of the value field of a card (bytes 10..80).
pub const VALUE_FIELD_LEN: usize = 70;

/// A typed value to be written into a header card.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// FITS logical value (`T` or `F`).
    Logical(bool),
    /// FITS integer value.
    Integer(i64),
    /// FITS floating-point value.
    Float(f64),
    /// FITS character string (content between single quotes).
    String(String),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Logical(b)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Integer(i64::from(n))
                }
            }
        )*
    };
}

value_from_int!(u8, i8, u16, i16, u32, i32, i64);

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

// ── Decoding ──

/// Find the ` /` comment separator in `field`, returning the value part and
/// the trimmed comment.
///
/// Real-world files often omit the space after the slash (`-32 /No. of bits`),
/// so only the leading space is required.
fn split_comment(field: &[u8]) -> (&[u8], Option<&str>) {
    let len = field.len();
    let mut i = 0;
    while i + 1 < len {
        if field[i] == b' ' && field[i + 1] == b'/' {
            let mut comment_start = i + 2;
            if comment_start < len && field[comment_start] == b' ' {
                comment_start += 1;
            }
            let comment = str::from_utf8(&field[comment_start..])
                .ok()
                .map(|s| s.trim_end());
            return (&field[..i], comment.filter(|s| !s.is_empty()));
        }
        i += 1;
    }
    (field, None)
}

/// Parse a quoted string starting at `field[0] == '\''`.
///
/// Doubled quotes inside the string stand for one literal quote. An
/// unterminated string is accepted up to the end of the field.
fn parse_string(field: &[u8]) -> (String, Option<&str>) {
    let mut value = String::new();
    let mut i = 1;
    let len = field.len();

    while i < len {
        if field[i] == b'\'' {
            if i + 1 < len && field[i + 1] == b'\'' {
                value.push('\'');
                i += 2;
            } else {
                i += 1;
                break;
            }
        } else {
            value.push(field[i] as char);
            i += 1;
        }
    }

    // FITS pads strings to at least 8 characters; trailing blanks carry no meaning.
    let trimmed = value.trim_end().to_string();
    let (_, comment) = split_comment(&field[i.min(len)..]);
    (trimmed, comment)
}

/// Decode the 70-byte value field of a card into its textual value and
/// optional comment.
///
/// Strings are unquoted; every other value is the trimmed text in front of
/// the comment separator. Returns `None` for an empty value field.
pub fn parse_value_text(field: &[u8]) -> Option<(String, Option<&str>)> {
    let start = field.iter().position(|&b| b != b' ')?;
    let field = &field[start..];

    if field[0] == b'\'' {
        return Some(parse_string(field));
    }
    if field[0] == b'/' {
        return None;
    }

    let (value_part, comment) = split_comment(field);
    let text = str::from_utf8(value_part).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    Some((text.to_string(), comment))
}

// ── Encoding ──

/// Serialize a [`Value`] into the value field of a card.
///
/// Numeric and logical values are right-justified in the first 20 bytes
/// (columns 11-30 of the card). String values start at byte 0 with a quote.
///
/// Returns `None` for a string that does not fit the field once quoted.
pub fn format_value(value: &Value) -> Option<[u8; VALUE_FIELD_LEN]> {
    let mut buf = [b' '; VALUE_FIELD_LEN];

    match value {
        Value::Logical(b) => {
            buf[19] = if *b { b'T' } else { b'F' };
        }
        Value::Integer(n) => {
            right_justify(n.to_string().as_bytes(), &mut buf[..20]);
        }
        Value::Float(f) => {
            right_justify(format_float(*f, 20).as_bytes(), &mut buf[..20]);
        }
        Value::String(s) => {
            write_string(s, &mut buf)?;
        }
    }

    Some(buf)
}

/// Right-justify `src` within `dest`, padding the left with spaces.
fn right_justify(src: &[u8], dest: &mut [u8]) {
    let len = src.len().min(dest.len());
    let start = dest.len() - len;
    dest.fill(b' ');
    dest[start..].copy_from_slice(&src[..len]);
}

fn format_float(f: f64, max_len: usize) -> String {
    if f == 0.0 {
        return String::from("0.0");
    }
    // Start with full precision and reduce until the result fits.
    let mut precision = 15usize;
    loop {
        let s = format!("{:.prec$E}", f, prec = precision);
        if s.len() <= max_len || precision == 0 {
            return s;
        }
        precision -= 1;
    }
}

fn write_string(s: &str, buf: &mut [u8; VALUE_FIELD_LEN]) -> Option<()> {
    let quotes = s.bytes().filter(|&b| b == b'\'').count();
    if s.len() + quotes + 2 > VALUE_FIELD_LEN {
        return None;
    }

    let mut pos = 0;
    buf[pos] = b'\'';
    pos += 1;
    for ch in s.bytes() {
        buf[pos] = ch;
        pos += 1;
        if ch == b'\'' {
            buf[pos] = b'\'';
            pos += 1;
        }
    }

    // Closing quote no earlier than index 9: at least 8 characters inside.
    pos = pos.max(9);
    buf[pos] = b'\'';
    Some(())
}

// ── Typed conversion ──

/// Types that can be recovered from the text of a header value.
pub trait FromValue: Sized {
    fn from_value(text: &str) -> Option<Self>;
}

impl FromValue for String {
    fn from_value(text: &str) -> Option<Self> {
        Some(text.to_string())
    }
}

impl FromValue for bool {
    fn from_value(text: &str) -> Option<Self> {
        match text.trim() {
            "T" | "t" => Some(true),
            "F" | "f" => Some(false),
            _ => None,
        }
    }
}

macro_rules! from_value_int {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(text: &str) -> Option<Self> {
                    text.trim().parse().ok()
                }
            }
        )*
    };
}

from_value_int!(u8, i8, u16, i16, u32, i32, u64, i64, usize);

/// Parse a float string, accepting the FITS `D` exponent notation.
fn parse_float_str(s: &str) -> Option<f64> {
    s.trim().replace(['D', 'd'], "E").parse::<f64>().ok()
}

impl FromValue for f64 {
    fn from_value(text: &str) -> Option<Self> {
        parse_float_str(text)
    }
}

impl FromValue for f32 {
    fn from_value(text: &str) -> Option<Self> {
        parse_float_str(text).map(|f| f as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: create a 70-byte field from a string, right-padded with spaces.
    fn make_field(s: &str) -> [u8; VALUE_FIELD_LEN] {
        let mut buf = [b' '; VALUE_FIELD_LEN];
        let bytes = s.as_bytes();
        let len = bytes.len().min(VALUE_FIELD_LEN);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    // ---- decoding ----

    #[test]
    fn parse_logical() {
        let field = make_field("                   T");
        let (text, comment) = parse_value_text(&field).unwrap();
        assert_eq!(text, "T");
        assert!(comment.is_none());
    }

    #[test]
    fn parse_integer_with_comment() {
        let field = make_field("                  16 / bits per pixel");
        let (text, comment) = parse_value_text(&field).unwrap();
        assert_eq!(text, "16");
        assert_eq!(comment, Some("bits per pixel"));
    }

    #[test]
    fn parse_comment_without_trailing_space() {
        let field = make_field("                 -32 /No. of bits per pixel");
        let (text, comment) = parse_value_text(&field).unwrap();
        assert_eq!(text, "-32");
        assert_eq!(comment, Some("No. of bits per pixel"));
    }

    #[test]
    fn parse_string_value() {
        let field = make_field("'Hubble  '           / telescope name");
        let (text, comment) = parse_value_text(&field).unwrap();
        assert_eq!(text, "Hubble");
        assert_eq!(comment, Some("telescope name"));
    }

    #[test]
    fn parse_string_with_slash_inside() {
        let field = make_field("'a/b / c '");
        let (text, comment) = parse_value_text(&field).unwrap();
        assert_eq!(text, "a/b / c");
        assert!(comment.is_none());
    }

    #[test]
    fn parse_string_with_embedded_quotes() {
        let field = make_field("'it''s ok '");
        let (text, _) = parse_value_text(&field).unwrap();
        assert_eq!(text, "it's ok");
    }

    #[test]
    fn parse_unterminated_string() {
        let field = make_field("'no closing quote");
        let (text, _) = parse_value_text(&field).unwrap();
        assert_eq!(text, "no closing quote");
    }

    #[test]
    fn parse_empty_field() {
        let field = make_field("");
        assert!(parse_value_text(&field).is_none());
    }

    #[test]
    fn parse_comment_only() {
        let field = make_field("                     / undefined value");
        assert!(parse_value_text(&field).is_none());
    }

    #[test]
    fn parse_value_left_aligned() {
        let field = make_field("1970-01-01");
        let (text, _) = parse_value_text(&field).unwrap();
        assert_eq!(text, "1970-01-01");
    }

    // ---- encoding ----

    #[test]
    fn format_logical_column_30() {
        let buf = format_value(&Value::Logical(true)).unwrap();
        assert_eq!(buf[19], b'T');
        assert!(buf[..19].iter().all(|&b| b == b' '));
    }

    #[test]
    fn format_integer_right_justified() {
        let buf = format_value(&Value::Integer(-32)).unwrap();
        assert_eq!(&buf[17..20], b"-32");
        assert!(buf[20..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn format_float_fits() {
        let buf = format_value(&Value::Float(273.15)).unwrap();
        let text = str::from_utf8(&buf[..20]).unwrap().trim();
        assert!((text.parse::<f64>().unwrap() - 273.15).abs() < 1e-9);
    }

    #[test]
    fn format_zero_float() {
        let buf = format_value(&Value::Float(0.0)).unwrap();
        assert_eq!(&buf[17..20], b"0.0");
    }

    #[test]
    fn format_short_string_is_padded() {
        let buf = format_value(&Value::String("IMAGE".into())).unwrap();
        assert_eq!(&buf[..10], b"'IMAGE   '");
    }

    #[test]
    fn format_string_doubles_quotes() {
        let buf = format_value(&Value::String("it's".into())).unwrap();
        assert_eq!(&buf[..10], b"'it''s   '");
    }

    #[test]
    fn format_longest_string() {
        let buf = format_value(&Value::String("x".repeat(68))).unwrap();
        assert_eq!(buf[0], b'\'');
        assert_eq!(buf[VALUE_FIELD_LEN - 1], b'\'');
        let (text, _) = parse_value_text(&buf).unwrap();
        assert_eq!(text.len(), 68);
    }

    #[test]
    fn format_rejects_string_past_field() {
        assert!(format_value(&Value::String("x".repeat(69))).is_none());
        // Doubled quotes count against the field.
        assert!(format_value(&Value::String("'".repeat(34))).is_some());
        assert!(format_value(&Value::String("'".repeat(35))).is_none());
    }

    #[test]
    fn encode_then_decode_string() {
        let buf = format_value(&Value::String("1991-12-26".into())).unwrap();
        let (text, _) = parse_value_text(&buf).unwrap();
        assert_eq!(text, "1991-12-26");
    }

    #[test]
    fn value_from_conversions() {
        assert_eq!(Value::from(7i16), Value::Integer(7));
        assert_eq!(Value::from(true), Value::Logical(true));
        assert_eq!(Value::from("SCI"), Value::String("SCI".into()));
        assert_eq!(Value::from(0.5f32), Value::Float(0.5));
    }

    // ---- typed conversion ----

    #[test]
    fn from_value_numbers() {
        assert_eq!(i64::from_value("-64"), Some(-64));
        assert_eq!(usize::from_value(" 200 "), Some(200));
        assert_eq!(u8::from_value("300"), None);
        assert_eq!(f64::from_value("2.7315E+02"), Some(273.15));
        assert_eq!(f64::from_value("1.0D-3"), Some(0.001));
    }

    #[test]
    fn from_value_bool() {
        assert_eq!(bool::from_value("T"), Some(true));
        assert_eq!(bool::from_value("F"), Some(false));
        assert_eq!(bool::from_value("yes"), None);
    }
}
