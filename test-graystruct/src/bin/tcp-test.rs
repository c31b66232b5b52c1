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

//! Test writing compressed GELF to a Graylog TCP input (port 12201 on the local host, unless
//! another address is given on the command line).

use graystruct::{
    layer::Layer,
    transport::{CompressingTransport, TcpTransport},
};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    let transport = match std::env::args().nth(1) {
        Some(addr) => TcpTransport::new(addr.as_str()),
        None => TcpTransport::local(),
    }
    .unwrap();
    // Fail now, rather than on the first event, if there's no one listening
    transport.connect().unwrap();
    // Setup the real subsriber...
    let layer = Layer::with_transport(CompressingTransport::new(transport));
    let subscriber = Registry::default().with(layer);
    // and install it.
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("你好, TCP socket.");
    debug!(transport = "tcp", "你好, TCP socket.");
    info!(transport = "tcp", answer = 42, "你好, TCP socket.");
    warn!(transport = "tcp", ratio = 0.5, "你好, TCP socket.");
    error!(transport = "tcp", fatal = false, "你好, TCP socket.");
}
