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

//! Test publishing compressed GELF to the `logging.gelf` exchange of a RabbitMQ broker
//! (`amqp://localhost`, unless another URL is given on the command line). Bind a queue to the
//! exchange first, or the messages will be dropped.

use graystruct::{amqp::AmqpConfig, layer::Layer, transport::CompressingTransport};
use tracing::{error, info, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "amqp://localhost".to_string());
    let transport = AmqpConfig::new(url).connect().unwrap();
    // Setup the real subsriber...
    let layer = Layer::with_transport(CompressingTransport::new(transport));
    let subscriber = Registry::default().with(layer);
    // and install it.
    let _guard = tracing::subscriber::set_default(subscriber);

    info!(transport = "amqp", "Hello, broker!");
    warn!(transport = "amqp", answer = 42, "Hello, broker!");
    error!(transport = "amqp", "Hello, broker!");
    // Never published: the broker client's own namespace is excluded
    info!(target: "amiquip::io_loop", "Hello, feedback loop!");
}
