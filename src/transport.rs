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

//! The GELF transport layer.
//!
//! This module defines the [`Transport`] trait that all implementations must support, the
//! [`CompressingTransport`] wrapper, and the TCP & UDP implementations. The AMQP implementation
//! lives in [`amqp`](crate::amqp).
//!
//! # Examples
//!
//! To send zlib-compressed GELF over UDP to a Graylog input listening on port 12201 (the default)
//! on localhost:
//!
//! ```rust
//! use graystruct::transport::{CompressingTransport, UdpTransport};
//! let transpo = CompressingTransport::new(UdpTransport::local().unwrap());
//! ```
//!
//! On a non-standard port on another host:
//!
//! ```rust
//! use graystruct::transport::UdpTransport;
//! let transpo = UdpTransport::new("some-host.domain.invalid:5514");
//! assert!(transpo.is_err()); // no such host, after all
//! ```

use crate::{
    compress::compress,
    error::{Error, Result},
};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use std::{
    io::Write,
    net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// The port on which Graylog GELF inputs conventionally listen
pub const DEFAULT_GELF_PORT: u16 = 12201;

/// How long to wait for a connection before giving up
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      transport mechanisms                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all transport layers must support.
///
/// Transports are shared between every thread that logs, so [`send`](Transport::send) takes
/// `&self`; implementations serialize access to their connection internally.
pub trait Transport {
    /// Send one frame on this transport mechanism, in its entirety.
    fn send(&self, frame: &[u8]) -> Result<()>;
    /// Release the underlying connection, if any.
    ///
    /// Best-effort: failures are logged & otherwise ignored. Calling this more than once, or on a
    /// transport that never connected, is harmless.
    fn close(&self);
    /// Should events logged by `logger_name` be sent on this transport at all?
    fn accepts(&self, _logger_name: &str) -> bool {
        true
    }
}

/// Lock `mutex`, carrying on regardless if another sender panicked while holding it; the
/// connection it guards is at worst closed & re-opened.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Recognizes the loggers within a namespace: the namespace itself, and anything nested beneath it
/// (`amiquip`, `amiquip::io_loop`, but not `amiquipper`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExcludeFilter {
    name: String,
}

impl ExcludeFilter {
    pub fn new<S: Into<String>>(name: S) -> Result<ExcludeFilter> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::config("an exclusion filter requires a non-empty name"));
        }
        Ok(ExcludeFilter { name })
    }
    /// Filter on a namespace known at compile time to be non-empty
    pub(crate) fn namespace(name: &'static str) -> ExcludeFilter {
        debug_assert!(!name.is_empty());
        ExcludeFilter {
            name: name.to_string(),
        }
    }
    /// True if events logged by `logger_name` fall within this filter's namespace
    pub fn excludes(&self, logger_name: &str) -> bool {
        match logger_name.strip_prefix(self.name.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with("::") || rest.starts_with('.'),
            None => false,
        }
    }
}

/// A [`Transport`] that compresses each frame before handing it to another [`Transport`].
pub struct CompressingTransport<T: Transport> {
    inner: T,
}

impl<T: Transport> CompressingTransport<T> {
    pub fn new(inner: T) -> CompressingTransport<T> {
        CompressingTransport { inner }
    }
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for CompressingTransport<T> {
    fn send(&self, frame: &[u8]) -> Result<()> {
        self.inner.send(&compress(frame)?)
    }
    fn close(&self) {
        self.inner.close()
    }
    fn accepts(&self, logger_name: &str) -> bool {
        self.inner.accepts(logger_name)
    }
}

fn resolve<A: ToSocketAddrs>(addr: A) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = addr.to_socket_addrs().map_err(Error::transport)?.collect();
    if addrs.is_empty() {
        return Err(Error::config("the collector address resolved to nothing"));
    }
    Ok(addrs)
}

/// Sending GELF frames via TCP streams.
///
/// The connection is opened on the first [`send`](Transport::send). Should a write fail, the
/// connection is dropped & the next [`send`](Transport::send) will open a new one.
///
/// By default frames are written back to back with nothing between them; that suits zlib frames
/// (each stream marks its own end) but not Graylog's GELF TCP input, which reads uncompressed
/// JSON documents each terminated by a null byte. Use [`null_delimited`](TcpTransport::null_delimited)
/// for the latter.
pub struct TcpTransport {
    addrs: Vec<SocketAddr>,
    timeout: Duration,
    delimiter: Option<u8>,
    socket: Mutex<Option<TcpStream>>,
}

impl TcpTransport {
    /// Construct a [`Transport`] implementation via TCP at `addr`.
    pub fn new<A: ToSocketAddrs>(addr: A) -> Result<TcpTransport> {
        TcpTransport::with_timeout(addr, DEFAULT_TIMEOUT)
    }
    /// Construct a [`Transport`] implementation via TCP at `addr`, waiting at most `timeout` for
    /// connections & writes.
    pub fn with_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<TcpTransport> {
        Ok(TcpTransport {
            addrs: resolve(addr)?,
            timeout,
            delimiter: None,
            socket: Mutex::new(None),
        })
    }
    /// Follow every frame with a null byte
    pub fn null_delimited(mut self) -> TcpTransport {
        self.delimiter = Some(0);
        self
    }
    /// Construct a [`Transport`] implementation via TCP at localhost:12201
    pub fn local() -> Result<TcpTransport> {
        TcpTransport::new(("localhost", DEFAULT_GELF_PORT))
    }
    /// Connect now, rather than on the first [`send`](Transport::send)
    pub fn connect(&self) -> Result<()> {
        let mut socket = lock(&self.socket);
        if socket.is_none() {
            *socket = Some(self.open()?);
        }
        Ok(())
    }
    fn open(&self) -> Result<TcpStream> {
        let mut last_err = None;
        for addr in &self.addrs {
            match TcpStream::connect_timeout(addr, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_write_timeout(Some(self.timeout))
                        .map_err(Error::transport)?;
                    debug!("connected to {}", addr);
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(Error::transport(last_err.unwrap_or_else(|| {
            std::io::Error::from(std::io::ErrorKind::AddrNotAvailable)
        })))
    }
}

impl Transport for TcpTransport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        let mut socket = lock(&self.socket);
        let stream = match socket.take() {
            Some(stream) => stream,
            None => self.open()?,
        };
        // `Write` is implemented for `&TcpStream` as well as `TcpStream`, so we needn't hold a
        // mutable reference to the stream to write to it. `write_all()` loops over partial writes.
        let mut writer: &TcpStream = &stream;
        let written = writer.write_all(frame).and_then(|_| match self.delimiter {
            Some(delimiter) => writer.write_all(&[delimiter]),
            None => Ok(()),
        });
        match written.and_then(|_| writer.flush()) {
            Ok(()) => {
                *socket = Some(stream);
                Ok(())
            }
            Err(err) => {
                let _ = stream.shutdown(Shutdown::Both);
                Err(Error::send(err))
            }
        }
    }
    fn close(&self) {
        if let Some(stream) = lock(&self.socket).take() {
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                debug!("ignoring error while shutting down a GELF TCP connection: {}", err);
            }
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close()
    }
}

/// Leading bytes of every chunked GELF datagram
pub const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];

/// The most chunks a GELF message may be split into
pub const MAX_CHUNKS: usize = 128;

/// Default number of frame bytes per datagram; leaves room for the chunk header & IP/UDP headers
/// within a typical 1500-byte MTU
pub const DEFAULT_CHUNK_SIZE: usize = 1420;

/// Split `frame` into chunked GELF datagrams, or return it as a single datagram if it fits.
pub(crate) fn chunk_frame(frame: &[u8], chunk_size: usize, message_id: u64) -> Result<Vec<Bytes>> {
    if frame.len() <= chunk_size {
        return Ok(vec![Bytes::copy_from_slice(frame)]);
    }
    let count = frame.len().div_ceil(chunk_size);
    if count > MAX_CHUNKS {
        return Err(Error::send(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "a {}-byte frame needs {} chunks; GELF allows at most {}",
                frame.len(),
                count,
                MAX_CHUNKS
            ),
        )));
    }
    Ok(frame
        .chunks(chunk_size)
        .enumerate()
        .map(|(seq, chunk)| {
            let mut buf = BytesMut::with_capacity(12 + chunk.len());
            buf.put_slice(&CHUNK_MAGIC);
            buf.put_u64(message_id);
            buf.put_u8(seq as u8);
            buf.put_u8(count as u8);
            buf.put_slice(chunk);
            buf.freeze()
        })
        .collect())
}

/// Sending GELF frames via UDP datagrams.
///
/// Frames longer than the chunk size are split into [chunked] GELF datagrams.
///
/// [chunked]: https://go2docs.graylog.org/current/getting_in_log_data/gelf.html#GELFviaUDP
pub struct UdpTransport {
    addrs: Vec<SocketAddr>,
    chunk_size: usize,
    message_ids: AtomicU64,
    socket: Mutex<Option<UdpSocket>>,
}

impl UdpTransport {
    /// Construct a [`Transport`] implementation via UDP at `addr`.
    pub fn new<A: ToSocketAddrs>(addr: A) -> Result<UdpTransport> {
        let addrs = resolve(addr)?;
        let socket = UdpTransport::open(&addrs)?;
        // Message IDs need only be unique among the messages a collector is reassembling at any
        // one time.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
            ^ (u64::from(std::process::id()) << 32);
        Ok(UdpTransport {
            addrs,
            chunk_size: DEFAULT_CHUNK_SIZE,
            message_ids: AtomicU64::new(seed),
            socket: Mutex::new(Some(socket)),
        })
    }
    /// Construct a [`Transport`] implementation via UDP at localhost:12201
    pub fn local() -> Result<UdpTransport> {
        UdpTransport::new(("localhost", DEFAULT_GELF_PORT))
    }
    /// Send at most `chunk_size` frame bytes per datagram
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<UdpTransport> {
        if chunk_size == 0 {
            return Err(Error::config("the UDP chunk size must be positive"));
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }
    fn open(addrs: &[SocketAddr]) -> Result<UdpSocket> {
        let mut last_err = None;
        for addr in addrs {
            // Bind to any available port on an unspecified address of the right family...
            let local: SocketAddr = if addr.is_ipv4() {
                (Ipv4Addr::UNSPECIFIED, 0).into()
            } else {
                (Ipv6Addr::UNSPECIFIED, 0).into()
            };
            // and connect to the collector at `addr`:
            match UdpSocket::bind(local).and_then(|socket| socket.connect(addr).map(|_| socket)) {
                Ok(socket) => return Ok(socket),
                Err(err) => last_err = Some(err),
            }
        }
        Err(Error::transport(last_err.unwrap_or_else(|| {
            std::io::Error::from(std::io::ErrorKind::AddrNotAvailable)
        })))
    }
}

impl Transport for UdpTransport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        let datagrams = chunk_frame(
            frame,
            self.chunk_size,
            self.message_ids.fetch_add(1, Ordering::Relaxed),
        )?;
        let mut socket = lock(&self.socket);
        let sock = match socket.take() {
            Some(sock) => sock,
            None => UdpTransport::open(&self.addrs)?,
        };
        for datagram in &datagrams {
            match sock.send(datagram) {
                Ok(n) if n == datagram.len() => (),
                Ok(n) => {
                    return Err(Error::send(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        format!("sent {} of {} bytes", n, datagram.len()),
                    )))
                }
                Err(err) => return Err(Error::send(err)),
            }
        }
        *socket = Some(sock);
        Ok(())
    }
    fn close(&self) {
        lock(&self.socket).take();
    }
}
