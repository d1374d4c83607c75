//! Trace event formatters.
//!
//! One event becomes one line. JSON lines look like
//! `{  "Key": "value" }\r\n` with `"`, `\`, CR and LF escaped and other
//! non-printable bytes written as `\xHH`. XML lines are a single
//! self-closing `<Event .../>` element with entity escaping and numeric
//! references for non-printable bytes.

use crate::trace::TraceEventFields;
use core::fmt::Write as _;

/// Output format, selected when the log opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceFormat {
    /// One XML element per event.
    #[default]
    Xml,
    /// One JSON object per event.
    Json,
}

impl TraceFormat {
    /// Parses a format name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "xml" => Some(Self::Xml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// File extension for the format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }

    pub(crate) fn formatter(self) -> Box<dyn TraceFormatter + Send> {
        match self {
            Self::Xml => Box::new(XmlTraceLogFormatter),
            Self::Json => Box::new(JsonTraceLogFormatter),
        }
    }
}

/// Renders events and the surrounding file framing.
pub(crate) trait TraceFormatter {
    fn header(&self) -> &'static str;
    fn footer(&self) -> &'static str;
    fn format_event(&self, fields: &TraceEventFields) -> String;
}

pub(crate) struct JsonTraceLogFormatter;

fn json_escape(out: &mut String, source: &str) {
    for byte in source.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
}

impl TraceFormatter for JsonTraceLogFormatter {
    fn header(&self) -> &'static str {
        ""
    }

    fn footer(&self) -> &'static str {
        ""
    }

    fn format_event(&self, fields: &TraceEventFields) -> String {
        let mut out = String::from("{  ");
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push('"');
            json_escape(&mut out, key);
            out.push_str("\": \"");
            json_escape(&mut out, value);
            out.push('"');
        }
        out.push_str(" }\r\n");
        out
    }
}

pub(crate) struct XmlTraceLogFormatter;

fn xml_escape(out: &mut String, source: &str) {
    for byte in source.bytes() {
        match byte {
            b'&' => out.push_str("&amp;"),
            b'"' => out.push_str("&quot;"),
            b'<' => out.push_str("&lt;"),
            b'>' => out.push_str("&gt;"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "&#x{byte:02X};");
            }
        }
    }
}

impl TraceFormatter for XmlTraceLogFormatter {
    fn header(&self) -> &'static str {
        "<?xml version=\"1.0\"?>\r\n<Trace>\r\n"
    }

    fn footer(&self) -> &'static str {
        "</Trace>\r\n"
    }

    fn format_event(&self, fields: &TraceEventFields) -> String {
        let mut out = String::from("<Event ");
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            xml_escape(&mut out, key);
            out.push_str("=\"");
            xml_escape(&mut out, value);
            out.push('"');
        }
        out.push_str("/>\r\n");
        out
    }
}
