//! Start line and header block codecs.
//!
//! Decoders are restartable: they consume nothing until the whole head block
//! (terminated by an empty line) is buffered, then parse it with `httparse`
//! using a zero-copy index of header name/value byte ranges. Shared helpers
//! here cover terminator scanning, obs-fold unfolding and the index record.

mod head_encoder;
mod request_head_decoder;
mod response_head_decoder;

pub use head_encoder::RequestHeadEncoder;
pub use head_encoder::ResponseHeadEncoder;
pub use request_head_decoder::RequestHeadDecoder;
pub use response_head_decoder::ResponseHeadDecoder;

pub(crate) use request_head_decoder::DEFAULT_MAX_HEAD_BYTES;

/// Maximum number of headers in one head block.
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Finds the end of the head block (the byte after `CRLFCRLF`).
///
/// `scanned` remembers how far previous calls already looked, so repeated
/// partial arrivals do not rescan the whole buffer.
pub(crate) fn find_head_end(src: &[u8], scanned: &mut usize) -> Option<usize> {
    // back up enough to catch a terminator split across arrivals
    let start = scanned.saturating_sub(3);

    for i in start..src.len().saturating_sub(3) {
        if &src[i..i + 4] == b"\r\n\r\n" {
            return Some(i + 4);
        }
    }

    *scanned = src.len();
    None
}

/// Rewrites obs-fold line breaks (`CRLF` + SP/HTAB) into spaces, in place,
/// so the continuation folds into the previous header's value.
pub(crate) fn unfold_in_place(head: &mut [u8]) {
    if head.len() < 3 {
        return;
    }

    for i in 0..head.len() - 2 {
        if head[i] == b'\r' && head[i + 1] == b'\n' && (head[i + 2] == b' ' || head[i + 2] == b'\t') {
            head[i] = b' ';
            head[i + 1] = b' ';
        }
    }
}

/// Byte ranges of one header's name and value inside the head buffer.
///
/// Recording positions instead of copying keeps header extraction zero-copy:
/// the final `HeaderValue`s share the frozen head buffer.
#[derive(Clone, Copy)]
pub(crate) struct HeaderIndex {
    pub(crate) name: (usize, usize),
    pub(crate) value: (usize, usize),
}

pub(crate) const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

pub(crate) const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    pub(crate) fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let name_end = name_start + header.name.len();
            indices.name = (name_start, name_end);
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            let value_end = value_start + header.value.len();
            indices.value = (value_start, value_end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_end_found_across_split_arrivals() {
        let mut scanned = 0;
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r", &mut scanned), None);
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\n", &mut scanned), Some(18));
    }

    #[test]
    fn unfold_rewrites_continuation_breaks() {
        let mut head = b"A: one\r\n two\r\n\r\n".to_vec();
        unfold_in_place(&mut head);
        assert_eq!(&head[..], b"A: one   two\r\n\r\n");
    }

    #[test]
    fn unfold_keeps_terminator_intact() {
        let mut head = b"A: one\r\n\r\n".to_vec();
        unfold_in_place(&mut head);
        assert_eq!(&head[..], b"A: one\r\n\r\n");
    }
}
