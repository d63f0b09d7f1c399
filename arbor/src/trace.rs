//! W3C trace-context extraction.
//!
//! The host extracts the `traceparent`/`tracestate` headers, parses them
//! into a [`TraceContext`], and provides it to the engine through the
//! request's service container. The engine records the remote trace and
//! parent span ids on its phase spans.

/// A parsed W3C trace context. The default value is the empty (invalid)
/// context, which is also what any malformed header parses to.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TraceContext {
    trace_id: [u8; 16],
    span_id: [u8; 8],
    flags: u8,
    tracestate: Option<String>,
    valid: bool,
}

impl TraceContext {
    /// The empty context.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses the `traceparent` and `tracestate` header values. Any
    /// malformed component yields the empty context.
    pub fn from_headers(traceparent: Option<&str>, tracestate: Option<&str>) -> Self {
        let Some(traceparent) = traceparent else {
            return Self::empty();
        };
        match parse_traceparent(traceparent) {
            Some((trace_id, span_id, flags)) => Self {
                trace_id,
                span_id,
                flags,
                tracestate: tracestate.map(str::to_owned),
                valid: true,
            },
            None => Self::empty(),
        }
    }

    /// Whether this context carries a remote trace.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether the caller sampled this trace.
    pub fn sampled(&self) -> bool {
        self.valid && self.flags & 0x01 != 0
    }

    /// The 32-hex-digit trace id, when valid.
    pub fn trace_id_hex(&self) -> Option<String> {
        self.valid.then(|| hex_string(&self.trace_id))
    }

    /// The 16-hex-digit parent span id, when valid.
    pub fn span_id_hex(&self) -> Option<String> {
        self.valid.then(|| hex_string(&self.span_id))
    }

    /// The carried `tracestate` header, if any.
    pub fn tracestate(&self) -> Option<&str> {
        self.tracestate.as_deref()
    }
}

/// Parses a `traceparent` value:
/// `version(2 hex)-traceId(32 hex)-spanId(16 hex)-flags(2 hex)`,
/// rejecting all-zero ids, uppercase hex, and the reserved version `ff`.
/// Unknown future versions parse leniently from their first four fields.
fn parse_traceparent(value: &str) -> Option<([u8; 16], [u8; 8], u8)> {
    let mut parts = value.trim().split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;

    if version.len() != 2 || version == "ff" {
        return None;
    }
    let version_byte = decode_hex_byte(version)?;
    // Version 00 must have exactly four fields; future versions may append.
    if version_byte == 0 && parts.next().is_some() {
        return None;
    }

    let trace_id: [u8; 16] = decode_hex(trace_id)?.try_into().ok()?;
    let span_id: [u8; 8] = decode_hex(span_id)?.try_into().ok()?;
    let flags = decode_hex_byte(flags)?;

    if trace_id.iter().all(|b| *b == 0) || span_id.iter().all(|b| *b == 0) {
        return None;
    }
    Some((trace_id, span_id, flags))
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = hex_digit(pair[0])?;
            let lo = hex_digit(pair[1])?;
            Some(hi << 4 | lo)
        })
        .collect()
}

fn decode_hex_byte(s: &str) -> Option<u8> {
    decode_hex(s)?.first().copied()
}

// The W3C grammar only allows lowercase hex.
fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    #[test]
    fn parses_a_valid_traceparent() {
        let ctx = TraceContext::from_headers(Some(VALID), Some("congo=t61rcWkgMzE"));
        assert!(ctx.is_valid());
        assert!(ctx.sampled());
        assert_eq!(
            ctx.trace_id_hex().as_deref(),
            Some("0af7651916cd43dd8448eb211c80319c"),
        );
        assert_eq!(ctx.span_id_hex().as_deref(), Some("b7ad6b7169203331"));
        assert_eq!(ctx.tracestate(), Some("congo=t61rcWkgMzE"));
    }

    #[test]
    fn missing_header_is_empty() {
        assert_eq!(TraceContext::from_headers(None, None), TraceContext::empty());
    }

    #[test]
    fn rejects_malformed_inputs() {
        for bad in [
            "",
            "00",
            "00-abc-def-01",
            // all-zero trace id
            "00-00000000000000000000000000000000-b7ad6b7169203331-01",
            // all-zero span id
            "00-0af7651916cd43dd8448eb211c80319c-0000000000000000-01",
            // uppercase hex
            "00-0AF7651916CD43DD8448EB211C80319C-B7AD6B7169203331-01",
            // reserved version
            "ff-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            // version 00 with trailing field
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01-extra",
        ] {
            assert!(
                !TraceContext::from_headers(Some(bad), None).is_valid(),
                "expected `{bad}` to be rejected",
            );
        }
    }

    #[test]
    fn future_versions_parse_leniently() {
        let ctx = TraceContext::from_headers(
            Some("cc-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01-future"),
            None,
        );
        assert!(ctx.is_valid());
    }

    #[test]
    fn unsampled_flags() {
        let ctx = TraceContext::from_headers(
            Some("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-00"),
            None,
        );
        assert!(ctx.is_valid());
        assert!(!ctx.sampled());
    }
}
