//! RFC 5322 header handling: folding, encoded-words (RFC 2047), parameters
//! (RFC 2231) and the date prefix used for saved attachments.
//!
//! Raw header bytes are read as ISO-8859-1, so text without a declared
//! charset comes out exactly as its bytes interpreted as Latin-1.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Weekday};
use tracing::warn;

/// Unfolded headers of one message or MIME part.
#[derive(Debug, Clone, Default)]
pub struct HeaderBlock {
    headers: Vec<(String, String)>,
}

impl HeaderBlock {
    /// Parse a raw header block (everything before the first blank line).
    pub fn parse(raw_headers: &[u8]) -> Self {
        let text = decode_header_bytes(raw_headers);
        Self {
            headers: unfold_headers(&text),
        }
    }

    /// Parse the header block at the top of a complete message.
    pub fn from_message(raw_message: &[u8]) -> Self {
        let end = find_header_end(raw_message).unwrap_or(raw_message.len());
        Self::parse(&raw_message[..end])
    }

    /// Raw (still encoded) value of the first header called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of `name` with encoded-words resolved to UTF-8.
    pub fn decoded(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_encoded_words)
    }

    /// Whether a header called `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Decode raw header bytes as ISO-8859-1 (every byte maps to one char).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    encoding_rs::mem::decode_latin1(bytes).into_owned()
}

/// Find the byte offset where headers end (position of the first blank line).
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    if data.starts_with(b"\n") || data.starts_with(b"\r\n") {
        return Some(0);
    }
    (0..data.len()).find(|&i| {
        data[i..].starts_with(b"\n\n") || data[i..].starts_with(b"\r\n\r\n")
    })
}

/// Join folded continuation lines and split each header at its first colon.
///
/// Names are lowercased; values keep their original, still encoded, text.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        let folded = line.starts_with([' ', '\t']);
        match (folded, headers.last_mut()) {
            (true, Some((_, value))) => {
                value.push(' ');
                value.push_str(line.trim());
            }
            (true, None) => {}
            (false, _) => {
                if let Some((name, value)) = line.split_once(':') {
                    headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
                }
            }
        }
    }

    headers
}

/// Decode every RFC 2047 encoded-word in a header value.
///
/// `=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=` becomes `Hola mundo`: the
/// whitespace separating two encoded-words is dropped. Anything that does not
/// parse as an encoded-word is copied through unchanged.
pub fn decode_encoded_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (gap, candidate) = rest.split_at(start);
        let word = &candidate[2..];

        match decode_one_word(word) {
            Some((text, consumed)) => {
                if !(after_word && gap.chars().all(char::is_whitespace)) {
                    out.push_str(gap);
                }
                out.push_str(&text);
                rest = &word[consumed..];
                after_word = true;
            }
            None => {
                out.push_str(gap);
                out.push_str("=?");
                rest = word;
                after_word = false;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Decode `charset?encoding?text?=` (the part after `=?`).
///
/// Returns the decoded text and the number of bytes consumed.
fn decode_one_word(s: &str) -> Option<(String, usize)> {
    let mut fields = s.splitn(3, '?');
    let charset = fields.next()?;
    let encoding = fields.next()?;
    let rest = fields.next()?;
    let end = rest.find("?=")?;
    let encoded_text = &rest[..end];

    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(encoded_text)?,
        "Q" | "q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    let consumed = charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((decode_charset(charset, &bytes), consumed))
}

/// Decode standard base64, ignoring whitespace and tolerating missing padding.
fn decode_base64(input: &str) -> Option<Vec<u8>> {
    fn value(c: u8) -> Option<u32> {
        match c {
            b'A'..=b'Z' => Some(u32::from(c - b'A')),
            b'a'..=b'z' => Some(u32::from(c - b'a') + 26),
            b'0'..=b'9' => Some(u32::from(c - b'0') + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut acc = 0u32;
    let mut bits = 0u32;
    for c in input.bytes() {
        if c == b'=' {
            break;
        }
        if c.is_ascii_whitespace() {
            continue;
        }
        acc = (acc << 6) | value(c)?;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    Some(out)
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut bytes = input.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'_' => result.push(b' '),
            b'=' => {
                let hex: Vec<u8> = bytes.by_ref().take(2).collect();
                match std::str::from_utf8(&hex)
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                {
                    Some(byte) if hex.len() == 2 => result.push(byte),
                    _ => {
                        result.push(b'=');
                        result.extend_from_slice(&hex);
                    }
                }
            }
            b => result.push(b),
        }
    }
    result
}

/// Decode `%XX` escapes (RFC 2231 extended values).
pub fn decode_percent(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(byte) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                result.push(byte);
                i += 3;
                continue;
            }
        }
        result.push(bytes[i]);
        i += 1;
    }
    result
}

/// Decode bytes using a named charset, falling back to ISO-8859-1.
///
/// An RFC 2231 language suffix (`utf-8*en`) is ignored.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset = charset.split('*').next().unwrap_or(charset).trim();
    if charset.is_empty() {
        return decode_header_bytes(bytes);
    }
    if charset.eq_ignore_ascii_case("iso-8859-1") || charset.eq_ignore_ascii_case("latin1") {
        return decode_header_bytes(bytes);
    }
    match encoding_rs::Encoding::for_label(charset.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, _) = encoding.decode(bytes);
            decoded.into_owned()
        }
        None => {
            warn!(charset, "Unknown charset, falling back to ISO-8859-1");
            decode_header_bytes(bytes)
        }
    }
}

/// A `Date` header as written: its wall-clock fields and weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderDate {
    /// Date and time exactly as stated, offset not applied.
    pub wall_clock: NaiveDateTime,
    /// The header's own day-of-week token, or the calendar weekday when the
    /// header has none.
    pub weekday: Weekday,
}

impl From<NaiveDateTime> for HeaderDate {
    fn from(wall_clock: NaiveDateTime) -> Self {
        Self {
            wall_clock,
            weekday: wall_clock.weekday(),
        }
    }
}

/// Parse an email `Date` header, keeping the fields it states.
///
/// The offset is not applied: `Mon, 2 Jan 2006 15:04:05 -0700` yields
/// 15:04:05 on 2 Jan 2006. A weekday token is kept as written even when it
/// disagrees with the calendar.
pub fn parse_date(date_str: &str) -> Option<HeaderDate> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (weekday, no_dow) = split_day_of_week(trimmed);
    let wall_clock = parse_wall_clock(trimmed, no_dow);
    let Some(wall_clock) = wall_clock else {
        warn!(date = trimmed, "Could not parse date");
        return None;
    };

    Some(HeaderDate {
        wall_clock,
        weekday: weekday.unwrap_or_else(|| wall_clock.weekday()),
    })
}

fn parse_wall_clock(full: &str, no_dow: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(full) {
        return Some(dt.naive_local());
    }

    let no_comment = strip_comment(no_dow);
    let candidate = replace_named_tz(no_comment);

    let zoned = ["%d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M %z"];
    for fmt in &zoned {
        if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
            return Some(dt.naive_local());
        }
    }

    let naive = ["%d %b %Y %H:%M:%S", "%d %b %Y %H:%M", "%b %d %H:%M:%S %Y"];
    for fmt in &naive {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(no_comment, fmt) {
            return Some(ndt);
        }
    }

    mail_parser_date(full)
}

/// Format the filename prefix for a message date: `Mon-Jan-2_15:04:05_`.
pub fn date_prefix(date: &HeaderDate) -> String {
    format!(
        "{}-{}",
        date.weekday,
        date.wall_clock.format("%b-%-d_%H:%M:%S_")
    )
}

/// Attempt to parse a date using `mail-parser`'s lenient parser.
fn mail_parser_date(input: &str) -> Option<NaiveDateTime> {
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = mail_parser::MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?;
    NaiveDate::from_ymd_opt(i32::from(dt.year), u32::from(dt.month), u32::from(dt.day))?
        .and_hms_opt(u32::from(dt.hour), u32::from(dt.minute), u32::from(dt.second))
}

/// Split off a leading day-of-week (`Thu, ` or `Thu `).
fn split_day_of_week(s: &str) -> (Option<Weekday>, &str) {
    let Some(token) = s.get(..3) else {
        return (None, s);
    };
    let Ok(day) = token.parse::<Weekday>() else {
        return (None, s);
    };
    let rest = &s[3..];
    match rest.strip_prefix(',').or_else(|| rest.strip_prefix(' ')) {
        Some(rest) => (Some(day), rest.trim_start()),
        None => (None, s),
    }
}

/// Drop a trailing `(comment)` such as `(PST)` or `(UTC)`.
fn strip_comment(s: &str) -> &str {
    match s.find('(') {
        Some(pos) => s[..pos].trim_end(),
        None => s,
    }
}

/// Numeric offset for the zone abbreviations old mail clients still send.
fn zone_offset(abbrev: &str) -> Option<&'static str> {
    let offset = match abbrev {
        "GMT" | "UT" | "UTC" | "Z" => "+0000",
        "EST" => "-0500",
        "EDT" | "AST" => "-0400",
        "CST" => "-0600",
        "CDT" => "-0500",
        "MST" => "-0700",
        "MDT" => "-0600",
        "PST" => "-0800",
        "PDT" => "-0700",
        "BST" | "CET" => "+0100",
        "CEST" | "EET" => "+0200",
        _ => return None,
    };
    Some(offset)
}

/// Swap a trailing zone abbreviation (`10:00:00 EST`) for its numeric offset.
fn replace_named_tz(s: &str) -> String {
    s.rsplit_once(' ')
        .and_then(|(head, zone)| {
            zone_offset(&zone.to_ascii_uppercase()).map(|offset| format!("{head} {offset}"))
        })
        .unwrap_or_else(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_words() {
        let cases = [
            ("=?UTF-8?B?Zm90b3MgZGUgbmF2aWRhZA==?=", "fotos de navidad"),
            ("=?iso-8859-1?q?R=E9sum=E9_2006?=", "Résumé 2006"),
            ("=?UTF-8?B?Qm9h?= =?UTF-8?B?IHRhcmRl?=", "Boa tarde"),
            ("Fwd: =?UTF-8?Q?ni=C3=B1os?= en la playa", "Fwd: niños en la playa"),
            ("=?Windows-1252?Q?Gr=FC=DFe?=", "Grüße"),
            ("=?UTF-8?X?abc?=", "=?UTF-8?X?abc?="),
            ("50% =? off", "50% =? off"),
        ];
        for (input, expected) in cases {
            assert_eq!(decode_encoded_words(input), expected, "input: {input}");
        }
    }

    #[test]
    fn test_raw_bytes_read_as_latin1() {
        let block = HeaderBlock::parse(b"Subject: caf\xe9 \xfcber\r\n");
        assert_eq!(block.decoded("subject").as_deref(), Some("café über"));
    }

    #[test]
    fn test_ascii_is_identity() {
        let block = HeaderBlock::parse(b"From: Alice <alice@example.com>\n");
        assert_eq!(
            block.decoded("From").as_deref(),
            Some("Alice <alice@example.com>")
        );
    }

    #[test]
    fn test_unfold_headers() {
        let text = "Subject: This is a long\n\tsubject line\nFrom: user@example.com\n";
        let headers = unfold_headers(text);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "subject");
        assert_eq!(headers[0].1, "This is a long subject line");
    }

    #[test]
    fn test_from_message_stops_at_blank_line() {
        let block = HeaderBlock::from_message(b"Subject: Hi\r\n\r\nX-Not-A-Header: body\r\n");
        assert!(block.contains("subject"));
        assert!(!block.contains("x-not-a-header"));
    }

    #[test]
    fn test_find_header_end() {
        let data = b"From: a@b.com\nSubject: Hi\n\nBody\n";
        assert_eq!(find_header_end(data), Some(25));
        let data = b"From: a@b.com\r\nSubject: Hi\r\n\r\nBody\r\n";
        assert_eq!(find_header_end(data), Some(26));
    }

    #[test]
    fn test_decode_percent() {
        assert_eq!(decode_percent("na%C3%AFve.jpg"), "naïve.jpg".as_bytes());
        assert_eq!(decode_percent("100%"), b"100%");
    }

    #[test]
    fn test_parse_date_keeps_wall_clock() {
        let dt = parse_date("Mon, 2 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(date_prefix(&dt), "Mon-Jan-2_15:04:05_");
    }

    #[test]
    fn test_parse_date_without_zone() {
        let dt = parse_date("Mon, 2 Jan 2006 15:04:05").unwrap();
        assert_eq!(date_prefix(&dt), "Mon-Jan-2_15:04:05_");
    }

    #[test]
    fn test_parse_date_named_tz_and_comment() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 EST").unwrap();
        assert_eq!(date_prefix(&dt), "Thu-Jan-4_10:00:00_");
        let dt = parse_date("Fri, 17 Nov 2023 08:09:03 +0100 (CET)").unwrap();
        assert_eq!(date_prefix(&dt), "Fri-Nov-17_08:09:03_");
    }

    #[test]
    fn test_parse_date_garbage() {
        assert!(parse_date("").is_none());
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn test_date_prefix_pads_time_not_day() {
        let dt = NaiveDate::from_ymd_opt(2019, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap();
        assert_eq!(date_prefix(&HeaderDate::from(dt)), "Sat-Mar-9_07:05:00_");
    }

    #[test]
    fn test_date_prefix_keeps_header_weekday() {
        let date = parse_date("Tue, 2 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(date.weekday, Weekday::Tue);
        assert_eq!(date_prefix(&date), "Tue-Jan-2_15:04:05_");

        // No token: the calendar supplies the weekday
        let date = parse_date("2 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(date_prefix(&date), "Mon-Jan-2_15:04:05_");
    }
}
