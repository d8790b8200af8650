//! XML-RPC Codec
//!
//! Encodes method calls and decodes method responses for the daemon's wire
//! protocol. Only the body is handled here; HTTP framing belongs to the
//! channels.
//!
//! # Type Mapping
//!
//! ```text
//! <i4> <int> <i8>        Value::Int        (encoded as <int> when it fits 32 bits)
//! <boolean>              Value::Bool
//! <string> / untyped     Value::String
//! <double>               Value::Double
//! <dateTime.iso8601>     Value::DateTime
//! <base64>               Value::Base64
//! <array>                Value::Array
//! <struct>               Value::Struct
//! <nil/>                 Value::Nil
//! ```

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::CallError;
use crate::value::Value;

/// Deepest array/struct nesting accepted in a response
pub const MAX_DEPTH: usize = 128;

/// Encode a `<methodCall>` document
#[must_use]
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(128 + params.len() * 64);
    out.push_str("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

fn encode_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => match i32::try_from(*i) {
            Ok(small) => out.push_str(&format!("<int>{small}</int>")),
            Err(_) => out.push_str(&format!("<i8>{i}</i8>")),
        },
        Value::Bool(b) => out.push_str(if *b {
            "<boolean>1</boolean>"
        } else {
            "<boolean>0</boolean>"
        }),
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Double(d) => out.push_str(&format!("<double>{d}</double>")),
        Value::DateTime(ts) => {
            out.push_str("<dateTime.iso8601>");
            out.push_str(&escape(ts.as_str()));
            out.push_str("</dateTime.iso8601>");
        }
        Value::Base64(bytes) => {
            out.push_str("<base64>");
            out.push_str(&STANDARD.encode(bytes));
            out.push_str("</base64>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

/// Decode a `<methodResponse>` document
///
/// # Errors
///
/// Returns `CallError::Fault` for fault replies and `CallError::Malformed`
/// for anything that is not a well-formed response.
pub fn decode_response(body: &[u8]) -> Result<Value, CallError> {
    let xml = std::str::from_utf8(body)
        .map_err(|e| CallError::Malformed(format!("Response is not UTF-8: {e}")))?;

    let mut parser = Parser::new(xml);
    parser.expect_start("methodResponse")?;

    match parser.significant()? {
        Event::Start(e) if e.name().as_ref() == b"params" => {
            parser.expect_start("param")?;
            parser.expect_start("value")?;
            parser.value_body()
        }
        Event::Start(e) if e.name().as_ref() == b"fault" => {
            parser.expect_start("value")?;
            let fault = parser.value_body()?;
            Err(fault_from_value(&fault))
        }
        other => Err(unexpected("params or fault", &other)),
    }
}

fn fault_from_value(value: &Value) -> CallError {
    let members = value.as_struct();
    let code = members.and_then(|m| m.get("faultCode")).and_then(Value::as_i64);
    let message = members
        .and_then(|m| m.get("faultString"))
        .and_then(Value::as_str);

    match (code, message) {
        (Some(code), Some(message)) => CallError::Fault {
            code,
            message: message.to_string(),
        },
        _ => CallError::Malformed("Fault without faultCode/faultString".to_string()),
    }
}

fn malformed(err: quick_xml::Error) -> CallError {
    CallError::Malformed(err.to_string())
}

fn describe(event: &Event<'_>) -> String {
    match event {
        Event::Start(e) => format!("<{}>", String::from_utf8_lossy(e.name().as_ref())),
        Event::End(e) => format!("</{}>", String::from_utf8_lossy(e.name().as_ref())),
        Event::Empty(e) => format!("<{}/>", String::from_utf8_lossy(e.name().as_ref())),
        Event::Text(_) | Event::CData(_) => "text".to_string(),
        Event::Eof => "end of document".to_string(),
        _ => "markup".to_string(),
    }
}

fn unexpected(wanted: &str, found: &Event<'_>) -> CallError {
    CallError::Malformed(format!("Expected {wanted}, found {}", describe(found)))
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Value for a self-closing type tag such as `<string/>`
fn empty_typed(tag: &str) -> Result<Value, CallError> {
    match tag {
        "string" => Ok(Value::String(String::new())),
        "nil" => Ok(Value::Nil),
        "array" => Ok(Value::Array(Vec::new())),
        "struct" => Ok(Value::Struct(BTreeMap::new())),
        "base64" => Ok(Value::Base64(Vec::new())),
        other => Err(CallError::Malformed(format!("Empty <{other}/> has no value"))),
    }
}

/// Pull parser over one response document
struct Parser<'a> {
    reader: Reader<&'a [u8]>,
    /// Open array/struct containers
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(xml: &'a str) -> Self {
        Self {
            reader: Reader::from_str(xml),
            depth: 0,
        }
    }

    /// Next event, skipping declarations, comments and processing instructions
    fn raw(&mut self) -> Result<Event<'a>, CallError> {
        loop {
            match self.reader.read_event().map_err(malformed)? {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                event => return Ok(event),
            }
        }
    }

    /// Next event that is not whitespace-only text
    fn significant(&mut self) -> Result<Event<'a>, CallError> {
        loop {
            let event = self.raw()?;
            if let Event::Text(ref text) = event {
                if text.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
            }
            return Ok(event);
        }
    }

    fn expect_start(&mut self, tag: &str) -> Result<(), CallError> {
        match self.significant()? {
            Event::Start(e) if e.name().as_ref() == tag.as_bytes() => Ok(()),
            other => Err(unexpected(&format!("<{tag}>"), &other)),
        }
    }

    fn expect_end(&mut self, tag: &str) -> Result<(), CallError> {
        match self.significant()? {
            Event::End(e) if e.name().as_ref() == tag.as_bytes() => Ok(()),
            other => Err(unexpected(&format!("</{tag}>"), &other)),
        }
    }

    /// Character data up to the closing `tag`
    fn text_until(&mut self, tag: &str) -> Result<String, CallError> {
        let mut text = String::new();
        loop {
            match self.raw()? {
                Event::Text(t) => text.push_str(&t.unescape().map_err(malformed)?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
                Event::End(e) if e.name().as_ref() == tag.as_bytes() => return Ok(text),
                other => return Err(unexpected(&format!("</{tag}>"), &other)),
            }
        }
    }

    /// Contents of a `<value>` element whose start tag was consumed
    fn value_body(&mut self) -> Result<Value, CallError> {
        let mut text = String::new();
        loop {
            match self.raw()? {
                Event::Text(t) => text.push_str(&t.unescape().map_err(malformed)?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
                Event::Start(e) => {
                    let value = self.typed(&tag_name(e.name().as_ref()))?;
                    self.expect_end("value")?;
                    return Ok(value);
                }
                Event::Empty(e) => {
                    let value = empty_typed(&tag_name(e.name().as_ref()))?;
                    self.expect_end("value")?;
                    return Ok(value);
                }
                // Untyped value: the text itself is a string
                Event::End(e) if e.name().as_ref() == b"value" => return Ok(Value::String(text)),
                other => return Err(unexpected("value content", &other)),
            }
        }
    }

    fn typed(&mut self, tag: &str) -> Result<Value, CallError> {
        match tag {
            "i4" | "int" | "i8" => {
                let text = self.text_until(tag)?;
                text.trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|e| CallError::Malformed(format!("Bad <{tag}> '{text}': {e}")))
            }
            "boolean" => match self.text_until(tag)?.trim() {
                "1" => Ok(Value::Bool(true)),
                "0" => Ok(Value::Bool(false)),
                other => Err(CallError::Malformed(format!("Bad <boolean> '{other}'"))),
            },
            "string" => self.text_until(tag).map(Value::String),
            "double" => {
                let text = self.text_until(tag)?;
                text.trim()
                    .parse::<f64>()
                    .map(Value::Double)
                    .map_err(|e| CallError::Malformed(format!("Bad <double> '{text}': {e}")))
            }
            "dateTime.iso8601" => Ok(Value::DateTime(self.text_until(tag)?.trim().to_string())),
            "base64" => {
                let text = self.text_until(tag)?;
                let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(compact)
                    .map(Value::Base64)
                    .map_err(|e| CallError::Malformed(format!("Bad <base64>: {e}")))
            }
            "array" | "struct" => {
                if self.depth >= MAX_DEPTH {
                    return Err(CallError::Malformed(format!(
                        "Nesting too deep (more than {MAX_DEPTH} levels)"
                    )));
                }
                self.depth += 1;
                let value = if tag == "array" {
                    self.array()
                } else {
                    self.structure()
                };
                self.depth -= 1;
                value
            }
            "nil" => {
                self.expect_end("nil")?;
                Ok(Value::Nil)
            }
            other => Err(CallError::Malformed(format!("Unknown value type <{other}>"))),
        }
    }

    fn array(&mut self) -> Result<Value, CallError> {
        let mut items = Vec::new();
        match self.significant()? {
            Event::Empty(e) if e.name().as_ref() == b"data" => {}
            Event::Start(e) if e.name().as_ref() == b"data" => loop {
                match self.significant()? {
                    Event::Start(e) if e.name().as_ref() == b"value" => {
                        items.push(self.value_body()?);
                    }
                    Event::Empty(e) if e.name().as_ref() == b"value" => {
                        items.push(Value::String(String::new()));
                    }
                    Event::End(e) if e.name().as_ref() == b"data" => break,
                    other => return Err(unexpected("<value>", &other)),
                }
            },
            other => return Err(unexpected("<data>", &other)),
        }
        self.expect_end("array")?;
        Ok(Value::Array(items))
    }

    fn structure(&mut self) -> Result<Value, CallError> {
        let mut members = BTreeMap::new();
        loop {
            match self.significant()? {
                Event::Start(e) if e.name().as_ref() == b"member" => {
                    self.expect_start("name")?;
                    let name = self.text_until("name")?;
                    let value = match self.significant()? {
                        Event::Start(e) if e.name().as_ref() == b"value" => self.value_body()?,
                        Event::Empty(e) if e.name().as_ref() == b"value" => {
                            Value::String(String::new())
                        }
                        other => return Err(unexpected("<value>", &other)),
                    };
                    self.expect_end("member")?;
                    members.insert(name, value);
                }
                Event::End(e) if e.name().as_ref() == b"struct" => break,
                other => return Err(unexpected("<member>", &other)),
            }
        }
        Ok(Value::Struct(members))
    }
}
