//! Oversize-message chunking for datagram transports.
//!
//! A datagram socket can only accept payloads up to the kernel send-buffer
//! size. Messages longer than that are split into ordered byte ranges and
//! each range is sent as its own datagram. No reassembly framing is added:
//! every chunk is a raw slice of the original message, and the collector is
//! expected to concatenate payloads in arrival order. Out-of-order or lost
//! chunks therefore corrupt the collector's view silently; this is the
//! accepted trade-off for best-effort logging and keeps the wire format
//! compatible with collectors that expect raw concatenation.
//!
//! Stream transports never chunk; they write the whole buffer and rely on
//! the transport's own segmentation.

/// A byte range of the original message, independently transmittable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Offset into the original message.
    pub offset: usize,
    /// Length of this chunk.
    pub len: usize,
}

impl Span {
    /// The range covered by this span.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Split a message of `len` bytes into spans of at most `max_unit` bytes.
///
/// Every span has length `max_unit` except the last, which carries the
/// remainder. Concatenating the spans in order reproduces the original
/// message exactly; the span count is `ceil(len / max_unit)` (one span for
/// messages that already fit, including the empty message).
pub fn chunk_spans(len: usize, max_unit: usize) -> Vec<Span> {
    assert!(max_unit > 0, "max_unit must be positive");

    if len <= max_unit {
        return vec![Span { offset: 0, len }];
    }

    let mut spans = Vec::with_capacity(len.div_ceil(max_unit));
    let mut offset = 0;
    while offset < len {
        let chunk = max_unit.min(len - offset);
        spans.push(Span { offset, len: chunk });
        offset += chunk;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(message: &[u8], spans: &[Span]) -> Vec<u8> {
        let mut out = Vec::new();
        for span in spans {
            out.extend_from_slice(&message[span.range()]);
        }
        out
    }

    #[test]
    fn test_message_within_unit_is_single_verbatim_chunk() {
        let spans = chunk_spans(65000, 65507);
        assert_eq!(spans, vec![Span { offset: 0, len: 65000 }]);
    }

    #[test]
    fn test_empty_message_is_single_empty_chunk() {
        assert_eq!(chunk_spans(0, 1024), vec![Span { offset: 0, len: 0 }]);
    }

    #[test]
    fn test_chunk_count_is_ceil() {
        assert_eq!(chunk_spans(10, 3).len(), 4);
        assert_eq!(chunk_spans(9, 3).len(), 3);
        assert_eq!(chunk_spans(11, 10).len(), 2);
        assert_eq!(chunk_spans(100, 10).len(), 10);
    }

    #[test]
    fn test_all_chunks_full_except_last() {
        let spans = chunk_spans(10, 3);
        assert_eq!(spans[0], Span { offset: 0, len: 3 });
        assert_eq!(spans[1], Span { offset: 3, len: 3 });
        assert_eq!(spans[2], Span { offset: 6, len: 3 });
        assert_eq!(spans[3], Span { offset: 9, len: 1 });
    }

    #[test]
    fn test_concatenation_reproduces_message() {
        let message: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        for max_unit in [1, 7, 256, 4096, 9_999, 10_000, 20_000] {
            let spans = chunk_spans(message.len(), max_unit);
            assert_eq!(reassemble(&message, &spans), message, "max_unit={max_unit}");
        }
    }
}
