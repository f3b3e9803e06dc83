//! ASCII-only JSON rendering.
//!
//! Both published outputs (FPKGI files, snapshot) and the row hashes require
//! JSON with sorted keys and every non-ASCII character escaped. serde_json
//! escapes control characters only, so these formatters additionally escape
//! anything above 0x7F as `\uXXXX` (surrogate pairs above the BMP).

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter, Serializer};
use serde_json::Value;

/// Compact form: `,`/`:` separators, sorted keys, ASCII escapes.
#[must_use]
pub fn to_string_compact(value: &Value) -> String {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, AsciiCompactFormatter);
    value
        .serialize(&mut serializer)
        .expect("serializing JSON to memory cannot fail");
    String::from_utf8(out).expect("ASCII formatter emits valid UTF-8")
}

/// Pretty form: 2-space indent, sorted keys, ASCII escapes, trailing newline.
#[must_use]
pub fn to_string_pretty(value: &Value) -> String {
    let mut out = Vec::new();
    let mut serializer =
        Serializer::with_formatter(&mut out, AsciiPrettyFormatter(PrettyFormatter::new()));
    value
        .serialize(&mut serializer)
        .expect("serializing JSON to memory cannot fail");
    out.push(b'\n');
    String::from_utf8(out).expect("ASCII formatter emits valid UTF-8")
}

fn write_ascii_fragment<W>(writer: &mut W, fragment: &str) -> io::Result<()>
where
    W: ?Sized + io::Write,
{
    for ch in fragment.chars() {
        if ch.is_ascii() {
            writer.write_all(&[ch as u8])?;
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
        }
    }
    Ok(())
}

struct AsciiCompactFormatter;

impl Formatter for AsciiCompactFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        write_ascii_fragment(writer, fragment)
    }
}

struct AsciiPrettyFormatter<'a>(PrettyFormatter<'a>);

impl Formatter for AsciiPrettyFormatter<'_> {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        write_ascii_fragment(writer, fragment)
    }

    fn begin_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.0.begin_array(writer)
    }

    fn end_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.0.end_array(writer)
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.0.end_array_value(writer)
    }

    fn begin_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.0.begin_object(writer)
    }

    fn end_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.0.end_object(writer)
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.0.begin_object_key(writer, first)
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.0.end_object_value(writer)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn compact_uses_tight_separators_and_sorted_keys() {
        let value = json!({"b": [1, 2], "a": "x"});
        assert_eq!(to_string_compact(&value), r#"{"a":"x","b":[1,2]}"#);
    }

    #[test]
    fn escapes_non_ascii_characters() {
        let value = json!({"name": "Poupée"});
        assert_eq!(to_string_compact(&value), r#"{"name":"Poup\u00e9e"}"#);
    }

    #[test]
    fn escapes_astral_plane_as_surrogate_pair() {
        let value = json!("🎮");
        assert_eq!(to_string_compact(&value), r#""\ud83c\udfae""#);
    }

    #[test]
    fn pretty_indents_two_spaces_with_trailing_newline() {
        let value = json!({"DATA": {"k": "v"}});
        let expected = "{\n  \"DATA\": {\n    \"k\": \"v\"\n  }\n}\n";
        assert_eq!(to_string_pretty(&value), expected);
    }

    #[test]
    fn pretty_renders_empty_object_inline() {
        let value = json!({"DATA": {}});
        assert_eq!(to_string_pretty(&value), "{\n  \"DATA\": {}\n}\n");
    }
}
