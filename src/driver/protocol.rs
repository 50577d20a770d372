// MIT License - Copyright (c) 2026 ialarm2mqtt contributors
//
// Wire helpers for the Meian TCP protocol: message envelope, payload
// scrambling, and field extraction from the XML-ish exchange format.
// Deliberately minimal; only what the client surface needs.

use crate::error::{IAlarmError, Result};

/// Message header magic.
pub const HEADER: &[u8; 4] = b"@ieM";

/// Rolling XOR table applied to every payload byte.
const SCRAMBLE_KEY: [u8; 16] = [
    0x0c, 0x38, 0x4e, 0x4e, 0x62, 0x38, 0x2d, 0x62,
    0x0e, 0x38, 0x4e, 0x4e, 0x44, 0x38, 0x2d, 0x30,
];

/// Scramble or unscramble a payload in place. The transform is its own
/// inverse.
pub fn scramble(data: &mut [u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= SCRAMBLE_KEY[i % SCRAMBLE_KEY.len()];
    }
}

/// Wrap a plaintext payload into a framed message:
/// `@ieM` + 4 hex digits length + 4 hex digits length echo + scrambled
/// payload + 4 hex digits sequence.
pub fn encode_frame(payload: &str, seq: u32) -> Vec<u8> {
    let mut body = payload.as_bytes().to_vec();
    scramble(&mut body);

    let mut frame = Vec::with_capacity(body.len() + 16);
    frame.extend_from_slice(HEADER);
    frame.extend_from_slice(format!("{:04x}", body.len()).as_bytes());
    frame.extend_from_slice(format!("{:04x}", body.len()).as_bytes());
    frame.extend_from_slice(&body);
    frame.extend_from_slice(format!("{:04}", seq % 10000).as_bytes());
    frame
}

/// Parse the 8-byte length block that follows the header. Both copies must
/// agree.
pub fn parse_length(block: &[u8]) -> Result<usize> {
    if block.len() != 8 {
        return Err(IAlarmError::InvalidResponse {
            details: format!("short length block: {} bytes", block.len()),
        });
    }
    let text = std::str::from_utf8(block).map_err(|_| IAlarmError::InvalidResponse {
        details: "non-ASCII length block".to_string(),
    })?;
    let (a, b) = text.split_at(4);
    let len_a = usize::from_str_radix(a, 16).map_err(|_| IAlarmError::InvalidResponse {
        details: format!("bad length field: {a}"),
    })?;
    let len_b = usize::from_str_radix(b, 16).map_err(|_| IAlarmError::InvalidResponse {
        details: format!("bad length field: {b}"),
    })?;
    if len_a != len_b {
        return Err(IAlarmError::InvalidResponse {
            details: format!("length mismatch: {len_a} != {len_b}"),
        });
    }
    Ok(len_a)
}

/// Unscramble a received payload into text.
pub fn decode_payload(body: &[u8]) -> Result<String> {
    let mut data = body.to_vec();
    scramble(&mut data);
    String::from_utf8(data).map_err(|_| IAlarmError::InvalidResponse {
        details: "payload is not valid UTF-8".to_string(),
    })
}

/// Build the request document for a command, e.g.
/// `<Root><Host><GetAlarmStatus/></Host></Root>` or, with a body,
/// `<Root><Host><SetAlarmStatus><DevStatus>TYP,NONE|1</DevStatus></SetAlarmStatus></Host></Root>`.
pub fn build_request(command: &str, fields: &[(&str, String)]) -> String {
    if fields.is_empty() {
        format!("<Root><Host><{command}/></Host></Root>")
    } else {
        let mut inner = String::new();
        for (name, value) in fields {
            inner.push_str(&format!("<{name}>{value}</{name}>"));
        }
        format!("<Root><Host><{command}>{inner}</{command}></Host></Root>")
    }
}

/// Extract the text content of the first `<tag>...</tag>` pair.
pub fn extract_tag<'a>(document: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = document.find(&open)? + open.len();
    let end = document[start..].find(&close)? + start;
    Some(&document[start..end])
}

/// Strip the type prefix from a typed value.
///
/// Panel values carry a type annotation before a `|` separator, e.g.
/// `S32,0,5|1`, `STR,16|Front Door`, `MAC,17|00:11:22:33:44:55`.
/// Untyped values are returned as-is.
pub fn parse_typed_value(raw: &str) -> &str {
    match raw.split_once('|') {
        Some((_, value)) => value,
        None => raw,
    }
}

/// Extract a typed tag value as an integer.
pub fn extract_int(document: &str, tag: &str) -> Result<i64> {
    let raw = extract_tag(document, tag).ok_or_else(|| IAlarmError::InvalidResponse {
        details: format!("missing <{tag}> in response"),
    })?;
    parse_typed_value(raw)
        .trim()
        .parse()
        .map_err(|_| IAlarmError::InvalidResponse {
            details: format!("<{tag}> is not an integer: {raw}"),
        })
}

/// Extract the `<Ln>` list entries (`<L0>`, `<L1>`, ...) from a paged
/// response, in order.
pub fn extract_list(document: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    for index in 0.. {
        match extract_tag(document, &format!("L{index}")) {
            Some(raw) => entries.push(parse_typed_value(raw)),
            None => break,
        }
    }
    entries
}
