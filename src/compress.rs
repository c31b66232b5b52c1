// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of graystruct.
//
// graystruct is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// graystruct is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with graystruct.  If not,
// see <http://www.gnu.org/licenses/>.

//! Frame compression.
//!
//! GELF collectors accept zlib-wrapped payloads on every input, so that is what we send. The
//! output depends on the version of the compression library but is otherwise deterministic.

use crate::error::{Error, Result};

use backtrace::Backtrace;
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};

use std::io::{Read, Write};

/// Wrap `payload` in a zlib stream at the default compression level.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>> {
    deflate_into(payload, Vec::with_capacity(payload.len() / 2 + 16))
}

/// Deflate `payload` into `sink`, returning the sink once the zlib trailer has been written.
fn deflate_into<W: Write>(payload: &[u8], sink: W) -> Result<W> {
    let mut encoder = ZlibEncoder::new(sink, Compression::default());
    encoder
        .write_all(payload)
        .and_then(|_| encoder.finish())
        .map_err(|err| Error::Compress {
            source: err,
            back: Backtrace::new(),
        })
}

/// Inflate a zlib stream produced by [`compress`] (or any other zlib implementation).
pub fn decompress(frame: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(frame.len() * 4);
    ZlibDecoder::new(frame)
        .read_to_end(&mut buf)
        .map_err(|err| Error::Decompress {
            source: err,
            back: Backtrace::new(),
        })?;
    Ok(buf)
}

#[cfg(test)]
mod test {

    use super::*;

    use proptest::prelude::*;

    #[test]
    fn empty_payload() {
        let frame = compress(b"").unwrap();
        assert!(!frame.is_empty());
        assert_eq!(decompress(&frame).unwrap(), b"");
    }

    #[test]
    fn zlib_header() {
        // CMF byte for deflate with a 32K window, and a valid FCHECK
        let frame = compress(br#"{"version":"1.1"}"#).unwrap();
        assert_eq!(frame[0], 0x78);
        assert_eq!((u16::from(frame[0]) << 8 | u16::from(frame[1])) % 31, 0);
    }

    #[test]
    fn garbage_does_not_inflate() {
        assert!(decompress(b"not a zlib stream").is_err());
    }

    /// A sink that refuses every write
    struct Full;

    impl Write for Full {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn deflate_failures_surface() {
        // A failed deflate must never masquerade as an empty frame
        let err = deflate_into(b"some payload", Full).err().unwrap();
        assert!(matches!(err, Error::Compress { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    proptest! {
        #[test]
        fn round_trip(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            prop_assert_eq!(decompress(&compress(&payload).unwrap()).unwrap(), payload);
        }
    }
}
