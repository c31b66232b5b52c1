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

//! Test writing compressed GELF to a Graylog UDP input (port 12201 on the local host, unless
//! another address is given on the command line). The last event is large enough to be chunked.

use graystruct::{
    layer::Layer,
    transport::{CompressingTransport, UdpTransport},
};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    let transport = match std::env::args().nth(1) {
        Some(addr) => UdpTransport::new(addr.as_str()),
        None => UdpTransport::local(),
    }
    .unwrap()
    // Small chunks, so that the big event below is split even after compression
    .with_chunk_size(128)
    .unwrap();
    // Setup the real subsriber...
    let subscriber =
        Registry::default().with(Layer::with_transport(CompressingTransport::new(transport)));
    // and install it.
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("Hello, 世界!");
    debug!("Hello, 世界!");
    info!(transport = "udp", "Hello, 世界!");
    warn!(transport = "udp", "Hello, 世界!");
    error!(transport = "udp", "Hello, 世界!");

    let big: String = (0..2048).map(|i| format!("{:x}", i * 7919 % 4093)).collect();
    info!(transport = "udp", payload = big.as_str(), "a chunked message");
}
