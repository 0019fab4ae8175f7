use bytes::{Buf, Bytes};
use http::HeaderMap;

/// A unit of HTTP traffic flowing through one way of a connection.
///
/// A message stream is always a `Header` followed by zero or more `Payload`
/// items; the generic parameter `T` is the head type (request or response
/// head paired with its payload size), while `Data` is the chunk type.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// The start line and header block of a message.
    Header(T),
    /// A piece of the message entity.
    Payload(PayloadItem<Data>),
}

/// One item produced or consumed while framing a message entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of entity data.
    Chunk(Data),
    /// Trailer fields announced after the final chunk of a chunked entity.
    ///
    /// Delivered at most once, immediately before `Eof`, so the fields can be
    /// merged into the message's header set.
    Trailers(HeaderMap),
    /// End of the entity.
    Eof,
}

/// The wire framing of a message entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Entity with a declared `Content-Length`.
    Length(u64),
    /// Entity using chunked transfer encoding.
    Chunked,
    /// Entity delimited by the transport closing. Only legal for responses.
    UntilClose,
    /// No entity.
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Converts the message into its payload item, if it is one.
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    #[inline]
    pub fn is_trailers(&self) -> bool {
        matches!(self, PayloadItem::Trailers(_))
    }
}

impl PayloadItem {
    /// Returns the contained bytes when this is a `Chunk`.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Consumes the item and returns the contained bytes when this is a `Chunk`.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Consumes the item and returns the trailer fields when this is `Trailers`.
    pub fn into_trailers(self) -> Option<HeaderMap> {
        match self {
            PayloadItem::Trailers(trailers) => Some(trailers),
            _ => None,
        }
    }
}
