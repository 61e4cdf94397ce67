//! Frame level helpers shared by provider decoders: payload extraction, decompression and
//! keep-alive detection.

use crate::{error::DataError, streams::transport::WsMessage};
use flate2::read::{GzDecoder, ZlibDecoder};
use std::{borrow::Cow, io::Read};

/// Upper bound on an inflated frame, exchange frames are a few KiB at most.
const MAX_INFLATED_LEN: u64 = 4 * 1024 * 1024;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Extract the UTF-8 payload of a data frame, inflating compressed binary frames.
///
/// Returns `Ok(None)` for transport level control frames (Ping, Pong, raw Frame) that carry no
/// provider data, and a [`DataError::Protocol`] for a Close frame.
pub fn payload_text(message: &WsMessage) -> Result<Option<Cow<'_, str>>, DataError> {
    match message {
        WsMessage::Text(text) => Ok(Some(Cow::Borrowed(text.as_str()))),
        WsMessage::Binary(bytes) => {
            let inflated = inflate(bytes)?;
            String::from_utf8(inflated)
                .map(|text| Some(Cow::Owned(text)))
                .map_err(|error| DataError::parse("binary frame", error))
        }
        WsMessage::Close(frame) => Err(DataError::Protocol(format!(
            "close frame received: {frame:?}"
        ))),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => Ok(None),
    }
}

/// Inflate a gzip or zlib compressed buffer. Uncompressed input is returned as is.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, DataError> {
    let mut output = Vec::new();

    let result = if data.starts_with(&GZIP_MAGIC) {
        GzDecoder::new(data)
            .take(MAX_INFLATED_LEN)
            .read_to_end(&mut output)
    } else if looks_like_zlib(data) {
        ZlibDecoder::new(data)
            .take(MAX_INFLATED_LEN)
            .read_to_end(&mut output)
    } else {
        output.extend_from_slice(data);
        Ok(data.len())
    };

    result
        .map(|_| output)
        .map_err(|error| DataError::parse("compressed frame", error))
}

/// Zlib header check: CM = 8 and (CMF * 256 + FLG) divisible by 31.
fn looks_like_zlib(data: &[u8]) -> bool {
    match data {
        [cmf, flg, ..] => cmf & 0x0f == 8 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0,
        _ => false,
    }
}

/// Reply to an application level keep-alive ping, or `None` if `text` is not one.
///
/// A bare token (eg/ `Ping`, `ping`) is echoed with `ping` swapped for `pong`, preserving case.
/// A JSON object carrying a `ping` key (eg/ `{"ping":"3d3c...","time":"..."}`) is echoed with
/// only that key renamed, every value is sent back untouched.
pub fn keep_alive_reply(text: &str) -> Option<WsMessage> {
    let trimmed = text.trim();

    if trimmed.eq_ignore_ascii_case("ping") {
        let pong = trimmed
            .chars()
            .map(|letter| match letter {
                'i' => 'o',
                'I' => 'O',
                other => other,
            })
            .collect::<String>();
        return Some(WsMessage::text(pong));
    }

    if !trimmed.starts_with('{') {
        return None;
    }

    let mut object =
        serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(trimmed).ok()?;
    let (key, token) = [("ping", "pong"), ("Ping", "Pong")]
        .into_iter()
        .find(|(key, _)| object.contains_key(*key))?;

    let token_value = object.remove(key)?;
    object.insert(token.to_string(), token_value);
    serde_json::to_string(&object).ok().map(WsMessage::text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::{
        Compression,
        write::{GzEncoder, ZlibEncoder},
    };
    use std::io::Write;

    pub(crate) fn gzip(payload: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn zlib(payload: &str) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_payload_text() {
        struct TestCase {
            input: WsMessage,
            expected: Result<Option<String>, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0: plain text frame
                input: WsMessage::text(r#"{"e":"kline"}"#.to_string()),
                expected: Ok(Some(r#"{"e":"kline"}"#.to_string())),
            },
            TestCase {
                // TC1: gzip binary frame
                input: WsMessage::binary(gzip(r#"{"dataType":"BTC-USDT@trade"}"#)),
                expected: Ok(Some(r#"{"dataType":"BTC-USDT@trade"}"#.to_string())),
            },
            TestCase {
                // TC2: zlib binary frame
                input: WsMessage::binary(zlib("Ping")),
                expected: Ok(Some("Ping".to_string())),
            },
            TestCase {
                // TC3: uncompressed binary frame
                input: WsMessage::binary(b"ping".to_vec()),
                expected: Ok(Some("ping".to_string())),
            },
            TestCase {
                // TC4: transport ping carries no data
                input: WsMessage::Ping(Default::default()),
                expected: Ok(None),
            },
            TestCase {
                // TC5: close frame is a protocol error
                input: WsMessage::Close(None),
                expected: Err(()),
            },
            TestCase {
                // TC6: corrupt gzip frame is a parse error
                input: WsMessage::binary(vec![0x1f, 0x8b, 0x00, 0x01, 0x02]),
                expected: Err(()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = payload_text(&test.input)
                .map(|text| text.map(Cow::into_owned))
                .map_err(|_| ());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_keep_alive_reply() {
        struct TestCase {
            input: &'static str,
            expected: Option<&'static str>,
        }

        let tests = vec![
            TestCase {
                // TC0: bare capitalised token
                input: "Ping",
                expected: Some("Pong"),
            },
            TestCase {
                // TC1: bare lowercase token
                input: "ping",
                expected: Some("pong"),
            },
            TestCase {
                // TC2: bare token with surrounding whitespace
                input: " PING\n",
                expected: Some("PONG"),
            },
            TestCase {
                // TC3: json ping object
                input: r#"{"ping":"3d3c6c2b","time":"2024-01-01T00:00:00.000+0800"}"#,
                expected: Some(r#"{"pong":"3d3c6c2b","time":"2024-01-01T00:00:00.000+0800"}"#),
            },
            TestCase {
                // TC4: values mentioning ping are echoed untouched
                input: r#"{"ping":"ping-7","note":"Ping"}"#,
                expected: Some(r#"{"note":"Ping","pong":"ping-7"}"#),
            },
            TestCase {
                // TC5: data frame mentioning ping in a value is not a keep-alive
                input: r#"{"dataType":"BTC-USDT@trade","data":[{"m":"shipping"}]}"#,
                expected: None,
            },
            TestCase {
                // TC6: text containing the token is not a bare keep-alive
                input: "ping pong",
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = keep_alive_reply(test.input);
            let expected = test
                .expected
                .map(|reply| WsMessage::text(reply.to_string()));
            assert_eq!(actual, expected, "TC{} failed", index);
        }
    }
}
