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

//! Sending GELF frames to an AMQP 0.9.1 broker (RabbitMQ, say).
//!
//! [`AmqpTransport`] publishes every frame as a persistent message to a durable exchange. Note
//! that a durable exchange with no queue bound to it simply drops what is published to it: binding
//! a queue (Graylog's AMQP input does so) is the operator's responsibility.
//!
//! # Examples
//!
//! Broker URLs are validated before any connection is attempted:
//!
//! ```rust
//! use graystruct::amqp::{AmqpConfig, AmqpUrl};
//!
//! let url = AmqpUrl::parse("amqp://localhost", "/").unwrap();
//! assert_eq!((url.host.as_str(), url.port, url.vhost.as_str()), ("localhost", 5672, "/"));
//!
//! let transpo = AmqpConfig::new("http://localhost").connect();
//! assert!(transpo.unwrap_err().is_config());
//! ```

use crate::{
    error::{Error, Result},
    transport::{lock, ExcludeFilter, Transport, DEFAULT_TIMEOUT},
};

use amiquip::{
    AmqpProperties, Channel, Connection, ExchangeDeclareOptions, ExchangeType, Publish,
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::{debug, warn};
use url::Url;

use std::{sync::Mutex, time::Duration};

/// The only URL scheme we speak
pub const AMQP_SCHEME: &str = "amqp";

pub const DEFAULT_PORT: u16 = 5672;

pub const DEFAULT_USER: &str = "guest";

pub const DEFAULT_PASSWORD: &str = "guest";

pub const DEFAULT_VHOST: &str = "/";

pub const DEFAULT_EXCHANGE: &str = "logging.gelf";

pub const DEFAULT_EXCHANGE_TYPE: &str = "fanout";

/// The namespace in which the AMQP client library logs; see [`AmqpTransport::accepts`]
pub const DRIVER_NAMESPACE: &str = "amiquip";

/// AMQP delivery mode for messages that should survive a broker restart
const PERSISTENT: u8 = 2;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         broker URLs                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The parts of an `amqp://[user[:password]@]host[:port][/vhost]` URL, defaults applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AmqpUrl {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

fn decode(text: &str, what: &str) -> Result<String> {
    percent_decode_str(text)
        .decode_utf8()
        .map(|cow| cow.into_owned())
        .map_err(|err| Error::config(format!("the {} is not valid UTF-8: {}", what, err)))
}

impl AmqpUrl {
    /// Parse `url`.
    ///
    /// A non-empty path (less its leading `/`, percent-decoded) names the virtual host; otherwise
    /// `default_vhost` is used.
    pub fn parse(url: &str, default_vhost: &str) -> Result<AmqpUrl> {
        let parsed = Url::parse(url)
            .map_err(|err| Error::config(format!("'{}' is not a broker URL: {}", url, err)))?;
        if parsed.scheme() != AMQP_SCHEME {
            return Err(Error::config(format!(
                "invalid URL scheme (expected \"{}\"): {}",
                AMQP_SCHEME, url
            )));
        }

        let host = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .unwrap_or("localhost")
            .to_string();
        let user = match parsed.username() {
            "" => DEFAULT_USER.to_string(),
            user => decode(user, "user name")?,
        };
        let password = match parsed.password() {
            Some(password) => decode(password, "password")?,
            None => DEFAULT_PASSWORD.to_string(),
        };
        let path = parsed.path();
        let vhost = decode(path.strip_prefix('/').unwrap_or(path), "virtual host")?;

        Ok(AmqpUrl {
            host,
            port: parsed.port().unwrap_or(DEFAULT_PORT),
            user,
            password,
            vhost: if vhost.is_empty() {
                default_vhost.to_string()
            } else {
                vhost
            },
        })
    }
    /// Render this URL in the canonical form the AMQP client expects, every component spelled
    /// out & percent-encoded.
    pub fn to_client_url(&self, connection_timeout: Duration) -> String {
        format!(
            "{}://{}:{}@{}:{}/{}?connection_timeout={}",
            AMQP_SCHEME,
            utf8_percent_encode(&self.user, NON_ALPHANUMERIC),
            utf8_percent_encode(&self.password, NON_ALPHANUMERIC),
            self.host,
            self.port,
            utf8_percent_encode(&self.vhost, NON_ALPHANUMERIC),
            connection_timeout.as_millis()
        )
    }
}

impl std::fmt::Display for AmqpUrl {
    /// The URL with the password elided, suitable for logging
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}@{}:{}/{}",
            AMQP_SCHEME,
            self.user,
            self.host,
            self.port,
            utf8_percent_encode(&self.vhost, NON_ALPHANUMERIC)
        )
    }
}

fn exchange_type(name: &str) -> ExchangeType {
    match name {
        "direct" => ExchangeType::Direct,
        "fanout" => ExchangeType::Fanout,
        "topic" => ExchangeType::Topic,
        "headers" => ExchangeType::Headers,
        other => ExchangeType::Custom(other.to_string()),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        configuration                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Everything needed to construct an [`AmqpTransport`].
#[derive(Clone, Debug)]
pub struct AmqpConfig {
    url: String,
    exchange_name: String,
    exchange_type: String,
    virtual_host: String,
    connection_timeout: Duration,
}

impl AmqpConfig {
    /// Publish to the broker at `url`; everything else defaulted
    pub fn new<S: Into<String>>(url: S) -> AmqpConfig {
        AmqpConfig {
            url: url.into(),
            exchange_name: DEFAULT_EXCHANGE.to_string(),
            exchange_type: DEFAULT_EXCHANGE_TYPE.to_string(),
            virtual_host: DEFAULT_VHOST.to_string(),
            connection_timeout: DEFAULT_TIMEOUT,
        }
    }
    pub fn exchange_name<S: Into<String>>(mut self, name: S) -> Self {
        self.exchange_name = name.into();
        self
    }
    /// `direct`, `fanout`, `topic`, `headers`, or the name of a plugin-provided type
    pub fn exchange_type<S: Into<String>>(mut self, exchange_type: S) -> Self {
        self.exchange_type = exchange_type.into();
        self
    }
    /// The virtual host to use when the URL doesn't name one
    pub fn virtual_host<S: Into<String>>(mut self, vhost: S) -> Self {
        self.virtual_host = vhost.into();
        self
    }
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
    pub fn parse_url(&self) -> Result<AmqpUrl> {
        AmqpUrl::parse(&self.url, &self.virtual_host)
    }
    /// Connect to the broker, open a channel & declare the exchange.
    pub fn connect(self) -> Result<AmqpTransport> {
        AmqpTransport::from_config(self)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          transport                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Session {
    connection: Connection,
    channel: Channel,
}

impl Session {
    fn close(self) {
        if let Err(err) = self.channel.close() {
            warn!("ignoring error while closing an AMQP channel: {}", err);
        }
        if let Err(err) = self.connection.close() {
            warn!("ignoring error while closing an AMQP connection: {}", err);
        }
    }
}

/// Sending GELF frames as persistent messages to a durable AMQP exchange.
///
/// The connection is established at construction. Should a publish fail, the connection is torn
/// down & the next [`send`](Transport::send) will establish (and re-declare) a new one.
pub struct AmqpTransport {
    url: AmqpUrl,
    exchange_name: String,
    exchange_type: String,
    connection_timeout: Duration,
    driver: ExcludeFilter,
    session: Mutex<Option<Session>>,
}

impl AmqpTransport {
    /// Construct a [`Transport`] implementation publishing to the default exchange at `url`.
    pub fn new(url: &str) -> Result<AmqpTransport> {
        AmqpConfig::new(url).connect()
    }
    fn from_config(config: AmqpConfig) -> Result<AmqpTransport> {
        let url = config.parse_url()?;
        let transpo = AmqpTransport {
            url,
            exchange_name: config.exchange_name,
            exchange_type: config.exchange_type,
            connection_timeout: config.connection_timeout,
            driver: ExcludeFilter::namespace(DRIVER_NAMESPACE),
            session: Mutex::new(None),
        };
        let session = transpo.open()?;
        *lock(&transpo.session) = Some(session);
        Ok(transpo)
    }
    pub fn url(&self) -> &AmqpUrl {
        &self.url
    }
    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }
    fn open(&self) -> Result<Session> {
        let mut connection =
            Connection::insecure_open(&self.url.to_client_url(self.connection_timeout))
                .map_err(Error::transport)?;
        let channel = connection.open_channel(None).map_err(Error::transport)?;
        channel
            .exchange_declare(
                exchange_type(&self.exchange_type),
                self.exchange_name.as_str(),
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..ExchangeDeclareOptions::default()
                },
            )
            .map_err(Error::transport)?;
        debug!(
            "declared {} exchange {} on {}",
            self.exchange_type, self.exchange_name, self.url
        );
        Ok(Session {
            connection,
            channel,
        })
    }
}

impl Transport for AmqpTransport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        let mut session = lock(&self.session);
        let current = match session.take() {
            Some(current) => current,
            None => self.open()?,
        };
        // No routing key: a fanout exchange ignores it anyway.
        let publish = Publish::with_properties(
            frame,
            "",
            AmqpProperties::default().with_delivery_mode(PERSISTENT),
        );
        match current
            .channel
            .basic_publish(self.exchange_name.as_str(), publish)
        {
            Ok(()) => {
                *session = Some(current);
                Ok(())
            }
            Err(err) => {
                current.close();
                Err(Error::send(err))
            }
        }
    }
    fn close(&self) {
        if let Some(current) = lock(&self.session).take() {
            current.close();
        }
    }
    /// Events logged by the AMQP client library itself are never published; doing so from within
    /// a publish would loop.
    fn accepts(&self, logger_name: &str) -> bool {
        !self.driver.excludes(logger_name)
    }
}

impl std::fmt::Debug for AmqpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // `AmqpUrl`'s `Display` implementation leaves out the password
        f.debug_struct("AmqpTransport")
            .field("url", &format_args!("{}", self.url))
            .field("exchange_name", &self.exchange_name)
            .field("exchange_type", &self.exchange_type)
            .finish_non_exhaustive()
    }
}

impl Drop for AmqpTransport {
    fn drop(&mut self) {
        self.close()
    }
}
