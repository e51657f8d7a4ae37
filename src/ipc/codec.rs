//! Framing for the control socket: NUL-separated requests in, lines out.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::protocol::{BindRequest, MAX_REQUEST_SIZE, Request};
use crate::status::EventMask;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("request too large: {0} bytes (max {MAX_REQUEST_SIZE})")]
    TooLarge(usize),
    #[error("unknown request kind 0x{0:02x}")]
    UnknownKind(u8),
    #[error("malformed request: {0}")]
    Malformed(&'static str),
    #[error("subscription without events")]
    NoEvents,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decodes [`Request`]s and encodes them for the client side. Outgoing
/// `String`s are written as newline-terminated lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestCodec;

/// Number of NUL-terminated fields after the kind, or `None` for a
/// subscription.
fn field_count(kind: u8) -> Result<Option<usize>, CodecError> {
    match kind {
        b'B' => Ok(Some(5)),
        b'U' => Ok(Some(1)),
        b'S' => Ok(None),
        other => Err(CodecError::UnknownKind(other)),
    }
}

impl Decoder for RequestCodec {
    type Item = Request;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(&kind) = src.first() else {
            return Ok(None);
        };
        let fields = field_count(kind)?;
        if src.len() < 2 {
            return Ok(None);
        }
        if src[1] != 0 {
            return Err(CodecError::Malformed("kind is not followed by a NUL"));
        }

        let Some(fields) = fields else {
            let Some(&bits) = src.get(2) else {
                return Ok(None);
            };
            src.advance(3);
            let mask = EventMask::from_bits(bits);
            if mask.is_empty() {
                return Err(CodecError::NoEvents);
            }
            return Ok(Some(Request::Subscribe(mask)));
        };

        let mut spans = Vec::with_capacity(fields);
        let mut start = 2;
        for _ in 0..fields {
            let Some(len) = src[start..].iter().position(|&b| b == 0) else {
                if src.len() > MAX_REQUEST_SIZE {
                    return Err(CodecError::TooLarge(src.len()));
                }
                return Ok(None);
            };
            spans.push(start..start + len);
            start += len + 1;
        }
        if start > MAX_REQUEST_SIZE {
            return Err(CodecError::TooLarge(start));
        }

        let frame = src.split_to(start);
        let mut fields = spans
            .into_iter()
            .map(|span| String::from_utf8_lossy(&frame[span]).into_owned());
        let mut next = || fields.next().unwrap_or_default();

        let request = if kind == b'U' {
            Request::Unbind { hotkey: next() }
        } else {
            let title = next();
            let description = next();
            let hotkey = next();
            let command = next();
            let overwrite = match next().as_str() {
                "t" => true,
                "f" => false,
                _ => return Err(CodecError::Malformed("overwrite flag is not 't' or 'f'")),
            };
            Request::Bind(BindRequest {
                title,
                description,
                hotkey,
                command,
                overwrite,
            })
        };
        Ok(Some(request))
    }
}

fn put_field(dst: &mut BytesMut, field: &str) -> Result<(), CodecError> {
    if field.contains('\0') {
        return Err(CodecError::Malformed("field contains a NUL"));
    }
    dst.put_slice(field.as_bytes());
    dst.put_u8(0);
    Ok(())
}

impl Encoder<Request> for RequestCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Request::Bind(bind) => {
                dst.put_slice(b"B\0");
                put_field(dst, &bind.title)?;
                put_field(dst, &bind.description)?;
                put_field(dst, &bind.hotkey)?;
                put_field(dst, &bind.command)?;
                put_field(dst, if bind.overwrite { "t" } else { "f" })?;
            }
            Request::Unbind { hotkey } => {
                dst.put_slice(b"U\0");
                put_field(dst, &hotkey)?;
            }
            Request::Subscribe(mask) => {
                if mask.is_empty() {
                    return Err(CodecError::NoEvents);
                }
                dst.put_slice(b"S\0");
                dst.put_u8(mask.bits());
            }
        }
        Ok(())
    }
}

impl Encoder<String> for RequestCodec {
    type Error = CodecError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<Option<Request>, CodecError> {
        let mut buf = BytesMut::from(bytes);
        RequestCodec.decode(&mut buf)
    }

    #[test]
    fn decode_bind() {
        let request = decode(b"B\0Term\0Open a terminal\0super + Return\0urxvt\0t\0").unwrap();
        assert_eq!(
            request,
            Some(Request::Bind(BindRequest {
                title: "Term".into(),
                description: "Open a terminal".into(),
                hotkey: "super + Return".into(),
                command: "urxvt".into(),
                overwrite: true,
            }))
        );
    }

    #[test]
    fn decode_unbind_and_subscribe() {
        assert_eq!(
            decode(b"U\0super + a\0").unwrap(),
            Some(Request::Unbind {
                hotkey: "super + a".into()
            })
        );
        assert_eq!(
            decode(&[b'S', 0, 0xff]).unwrap(),
            Some(Request::Subscribe(EventMask::ALL))
        );
    }

    #[test]
    fn partial_request_waits_for_more() {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::from(&b"U\0super"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b" + a\0U\0");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Request::Unbind {
                hotkey: "super + a".into()
            })
        );
        // The next request stays buffered.
        assert_eq!(&buf[..], b"U\0");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_requests() {
        assert!(matches!(decode(b"Q\0"), Err(CodecError::UnknownKind(b'Q'))));
        assert!(matches!(decode(b"Ux"), Err(CodecError::Malformed(_))));
        assert!(matches!(decode(&[b'S', 0, 0x80]), Err(CodecError::NoEvents)));
        assert!(matches!(
            decode(b"B\0\0\0a\0b\0yes\0"),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_oversized_request() {
        let mut bytes = b"U\0".to_vec();
        bytes.resize(MAX_REQUEST_SIZE + 1, b'a');
        assert!(matches!(decode(&bytes), Err(CodecError::TooLarge(_))));
    }

    #[test]
    fn encoded_requests_decode() {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::new();
        let bind = Request::Bind(BindRequest {
            hotkey: "super + {a,b}".into(),
            command: "echo {a,b}".into(),
            ..BindRequest::default()
        });
        codec.encode(bind.clone(), &mut buf).unwrap();
        codec
            .encode(Request::Subscribe(EventMask::CHAIN), &mut buf)
            .unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(bind));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Request::Subscribe(EventMask::CHAIN))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_refuses_nul_in_fields() {
        let mut buf = BytesMut::new();
        let err = RequestCodec
            .encode(
                Request::Unbind {
                    hotkey: "a\0b".into(),
                },
                &mut buf,
            )
            .unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn lines_are_newline_terminated() {
        let mut buf = BytesMut::new();
        RequestCodec
            .encode("BBegin chain".to_string(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"BBegin chain\n");
    }
}
