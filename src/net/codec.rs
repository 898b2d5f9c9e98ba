//! Wire framing: a 4-byte big-endian length prefix around a JSON body.
//! Length-delimited framing plus a plain serde format, rather than a
//! schema-compiled wire format, since this crate ships no compiled schema.

use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::errors::Error;

/// Frames `T` in and out of a byte stream. One instance handles exactly one
/// message direction; a connection typically pairs a `MessageCodec<Inbound>`
/// with a `MessageCodec<Outbound>` over split halves of the same socket.
pub struct MessageCodec<T> {
    framing: LengthDelimitedCodec,
    _marker: PhantomData<T>,
}

impl<T> MessageCodec<T> {
    pub fn new() -> Self {
        MessageCodec {
            framing: LengthDelimitedCodec::new(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for MessageCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decoder for MessageCodec<T> {
    type Item = T;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<T>, Error> {
        match self.framing.decode(src)? {
            Some(frame) => Ok(Some(serde_json::from_slice(&frame)?)),
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for MessageCodec<T> {
    type Error = Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Error> {
        let body = serde_json::to_vec(&item)?;
        self.framing.encode(Bytes::from(body), dst)?;
        Ok(())
    }
}
