//! MIME message parsing: multipart detection, depth-first part walk and
//! attachment filename/payload extraction.

use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};

use crate::error::{LostPhotosError, Result};
use crate::parser::header::{
    decode_charset, decode_encoded_words, decode_percent, parse_date, HeaderBlock, HeaderDate,
};

/// Maximum nesting depth followed while walking parts.
const MAX_DEPTH: usize = 32;

/// A fetched message: the `mail-parser` tree plus its raw top-level headers.
pub struct ParsedMessage<'x> {
    message: Message<'x>,
    headers: HeaderBlock,
}

/// A leaf part that carries a `Content-Disposition` header.
#[derive(Debug, Clone)]
pub struct DispositionPart<'a> {
    /// Decoded filename, `None` when the part does not name itself.
    pub filename: Option<String>,
    /// Lowercase `type/subtype`, `text/plain` when absent.
    pub content_type: String,
    /// Content-transfer-decoded body.
    pub payload: &'a [u8],
    /// `true` when `mail-parser` flagged the body as badly encoded.
    pub decode_failed: bool,
}

/// Parse a complete raw message (headers + body).
pub fn parse_message(raw_message: &[u8]) -> Result<ParsedMessage<'_>> {
    let message = MessageParser::default()
        .parse(raw_message)
        .ok_or_else(|| LostPhotosError::Mime("message could not be parsed".into()))?;

    Ok(ParsedMessage {
        message,
        headers: HeaderBlock::from_message(raw_message),
    })
}

impl<'x> ParsedMessage<'x> {
    /// Whether the top-level `Content-Type` is `multipart/*`.
    pub fn is_multipart(&self) -> bool {
        self.headers
            .get("content-type")
            .map(|ct| main_type(ct).eq_ignore_ascii_case("multipart"))
            .unwrap_or(false)
    }

    /// Decoded `From` header.
    pub fn from(&self) -> String {
        self.headers.decoded("from").unwrap_or_default()
    }

    /// Decoded `Subject` header.
    pub fn subject(&self) -> String {
        self.headers.decoded("subject").unwrap_or_default()
    }

    /// Fields of the `Date` header.
    pub fn date(&self) -> Option<HeaderDate> {
        self.headers.get("date").and_then(parse_date)
    }

    /// All leaf parts with a `Content-Disposition`, depth-first.
    ///
    /// Multipart containers are structural and never returned; embedded
    /// `message/rfc822` parts are descended into.
    pub fn disposition_parts(&self) -> Vec<DispositionPart<'_>> {
        let mut out = Vec::new();
        walk(&self.message, self.message.raw_message(), 0, 0, &mut out);
        out
    }
}

/// Depth-first walk over `message`.
///
/// Part offsets of embedded messages point into the outermost message, so
/// `root_raw` is passed down unchanged through every level.
fn walk<'a>(
    message: &'a Message<'_>,
    root_raw: &[u8],
    part_id: usize,
    depth: usize,
    out: &mut Vec<DispositionPart<'a>>,
) {
    if depth > MAX_DEPTH {
        tracing::warn!(depth, "MIME nesting too deep, ignoring remaining parts");
        return;
    }
    let Some(part) = message.parts.get(part_id) else {
        return;
    };

    match &part.body {
        PartType::Multipart(children) => {
            for &child in children {
                walk(message, root_raw, child, depth + 1, out);
            }
        }
        PartType::Message(inner) => walk(inner, root_raw, 0, depth + 1, out),
        _ => match leaf_part(part, root_raw) {
            Some(found) => out.push(found),
            None => tracing::debug!(part_id, depth, "Part has no Content-Disposition, skipping"),
        },
    }
}

/// Describe a leaf part, or `None` when it carries no `Content-Disposition`.
fn leaf_part<'a>(part: &'a MessagePart<'_>, root_raw: &[u8]) -> Option<DispositionPart<'a>> {
    let (filename, content_type) =
        match root_raw.get(part.raw_header_offset()..part.raw_body_offset()) {
            Some(raw_headers) => {
                let headers = HeaderBlock::parse(raw_headers);
                if !headers.contains("content-disposition") {
                    return None;
                }
                (
                    part_filename(&headers),
                    headers
                        .get("content-type")
                        .map(|ct| media_type(ct).to_lowercase()),
                )
            }
            None => {
                tracing::warn!(
                    start = part.raw_header_offset(),
                    end = part.raw_body_offset(),
                    "Part headers out of range, using parsed headers"
                );
                part.content_disposition()?;
                (
                    part.attachment_name()
                        .map(String::from)
                        .filter(|name| !name.trim().is_empty()),
                    part.content_type().map(|ct| match ct.subtype() {
                        Some(sub) => format!("{}/{sub}", ct.ctype()).to_lowercase(),
                        None => ct.ctype().to_lowercase(),
                    }),
                )
            }
        };

    Some(DispositionPart {
        filename,
        content_type: content_type.unwrap_or_else(|| "text/plain".to_string()),
        payload: part.contents(),
        decode_failed: part.is_encoding_problem,
    })
}

/// Filename from `Content-Disposition`, falling back to the `name` of `Content-Type`.
fn part_filename(headers: &HeaderBlock) -> Option<String> {
    headers
        .get("content-disposition")
        .and_then(|v| header_param(v, "filename"))
        .or_else(|| headers.get("content-type").and_then(|v| header_param(v, "name")))
        .filter(|name| !name.trim().is_empty())
}

/// `type/subtype` part of a `Content-Type` value.
fn media_type(value: &str) -> &str {
    value.split(';').next().unwrap_or("").trim()
}

/// `type` part of a `Content-Type` value.
fn main_type(value: &str) -> &str {
    media_type(value).split('/').next().unwrap_or("").trim()
}

/// Look up a parameter of a structured header value and decode it.
///
/// Handles plain values (with RFC 2047 encoded-words), RFC 2231 extended
/// values (`filename*=utf-8''na%C3%AFve.jpg`) and RFC 2231 continuations
/// (`filename*0=…; filename*1=…`). Extended forms take precedence.
pub fn header_param(value: &str, name: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;
    let mut sections: Vec<(u32, bool, String)> = Vec::new();

    for (key, val) in split_params(value) {
        let key = key.to_ascii_lowercase();
        let Some(rest) = key.strip_prefix(name) else {
            continue;
        };
        match rest {
            "" => plain = Some(val),
            "*" => extended = Some(val),
            _ => {
                let Some(rest) = rest.strip_prefix('*') else {
                    continue;
                };
                let (index, is_extended) = match rest.strip_suffix('*') {
                    Some(index) => (index, true),
                    None => (rest, false),
                };
                if let Ok(index) = index.parse::<u32>() {
                    sections.push((index, is_extended, val));
                }
            }
        }
    }

    if let Some(val) = extended {
        let (charset, encoded) = split_charset(&val);
        return Some(decode_charset(charset, &decode_percent(encoded)));
    }

    if !sections.is_empty() {
        sections.sort_by_key(|(index, _, _)| *index);
        let mut charset = "";
        let mut bytes = Vec::new();
        for (i, (_, is_extended, val)) in sections.iter().enumerate() {
            if *is_extended {
                let encoded = if i == 0 {
                    let (cs, encoded) = split_charset(val);
                    charset = cs;
                    encoded
                } else {
                    val.as_str()
                };
                bytes.extend(decode_percent(encoded));
            } else {
                bytes.extend_from_slice(&encoding_rs::mem::encode_latin1_lossy(val));
            }
        }
        return Some(decode_charset(charset, &bytes));
    }

    plain.map(|val| decode_encoded_words(&val))
}

/// Split `charset'language'value`; values without the prefix have no charset.
fn split_charset(value: &str) -> (&str, &str) {
    let mut fields = value.splitn(3, '\'');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(charset), Some(_language), Some(rest)) => (charset, rest),
        _ => ("", value),
    }
}

/// Split `type; key=value; key="quoted; value"` into its parameters.
fn split_params(value: &str) -> Vec<(String, String)> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);

    segments
        .iter()
        .skip(1)
        .filter_map(|segment| segment.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), unquote(v.trim())))
        .collect()
}

/// Remove surrounding quotes and backslash escapes.
fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => value.to_string(),
    }
}
