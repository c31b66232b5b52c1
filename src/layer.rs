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

//! [graystruct](crate) [`Layer`] implementation.
//!
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! [`Layer`](crate::layer::Layer) is the glue between [`tracing`] & the GELF pipeline: each
//! [`Event`] it observes is recorded into a field map, encoded by an
//! [`Encoder`](crate::encoder::Encoder) and handed to a [`Transport`] implementation.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html

use crate::{
    encoder::{Encoder, EXCEPTION_FIELD},
    error::Result,
    event::{CallerInfo, Event, FieldValue, Fields},
    level::Severity,
    transport::{CompressingTransport, ExcludeFilter, Transport, UdpTransport},
};

use tracing_subscriber::layer::Context;

// When the tracing-log feature is enabled, use NormalizeEvent to extract the target & file/line
// metadata from events that originated from the `log` crate. This follows the same pattern used
// by tracing-subscriber's fmt layer.
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

/// Our own diagnostics are logged under this target; they must never be fed back through the
/// pipeline that produced them.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        recording fields                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Records bridged from the `log` crate by tracing-log arrive under this target, with their own
/// target & other metadata carried as `log.*` fields.
const LOG_TARGET: &str = "log";

const LOG_TARGET_FIELD: &str = "log.target";

#[derive(Default)]
struct FieldVisitor {
    fields: Fields,
    // Set for `log` records; their `log.*` fields are metadata, not payload
    bridged: bool,
    log_target: Option<String>,
}

impl FieldVisitor {
    fn record(&mut self, field: &tracing::field::Field, value: FieldValue) {
        if self.bridged && field.name().starts_with("log.") {
            if field.name() == LOG_TARGET_FIELD {
                self.log_target = Some(value.as_text().into_owned());
            }
            return;
        }
        self.fields.insert(field.name().to_string(), value);
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record(field, FieldValue::from(value));
    }
    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.record(field, FieldValue::from(value));
    }
    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.record(field, FieldValue::from(value));
    }
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.record(field, FieldValue::from(value));
    }
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.record(field, FieldValue::from(value));
    }
    /// Errors are recorded as their `Display` text; the first one seen also supplies the
    /// `exception` field, one line per error in its `source()` chain.
    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.record(field, FieldValue::from(value.to_string()));
        let mut chain = vec![value.to_string()];
        let mut source = value.source();
        while let Some(err) = source {
            chain.push(format!("Caused by: {}", err));
            source = err.source();
        }
        self.fields
            .entry(EXCEPTION_FIELD.to_string())
            .or_insert_with(|| FieldValue::from(chain.join("\n")));
    }
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        // The tracing macros `info!()`, `event!()` & the like all take care to "pre-format" the
        // `message` field so that `value` actually refers to a `std::fmt::Arguments` instance,
        // which will print to a debug format without enclosing double-quotes.
        self.record(field, FieldValue::from(format!("{:?}", value)));
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          struct Layer                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation that will send [`Event`]s to a
/// GELF collector.
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
///
/// The event's target serves as the logger name, its level as the severity, & its file, line
/// and module path as caller metadata.
pub struct Layer<T: Transport> {
    encoder: Encoder,
    transport: T,
    own: ExcludeFilter,
}

/// A [`Layer`] implementation that sends compressed GELF via UDP to port 12201 on localhost.
impl Layer<CompressingTransport<UdpTransport>> {
    pub fn try_default() -> Result<Self> {
        Ok(Layer::with_transport(CompressingTransport::new(
            UdpTransport::local()?,
        )))
    }
}

impl<T: Transport> Layer<T> {
    /// construct Layer with custom inners
    pub fn new(encoder: Encoder, transport: T) -> Self {
        Layer {
            encoder,
            transport,
            own: ExcludeFilter::namespace(OWN_TARGET),
        }
    }
    /// Construct a Layer that will encode with the default [`Encoder`] & send via `transport`
    pub fn with_transport(transport: T) -> Self {
        Layer::new(Encoder::default(), transport)
    }
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }
    pub fn transport(&self) -> &T {
        &self.transport
    }
    /// Release the transport's connection; call at shutdown.
    pub fn close(&self) {
        self.transport.close()
    }
    fn ship(&self, event: &Event) -> Result<()> {
        let json = self.encoder.encode_event(event)?;
        self.transport.send(json.as_bytes())
    }
}

/// The [`Layer`] implementation proper.
///
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
impl<S, T> tracing_subscriber::layer::Layer<S> for Layer<T>
where
    S: tracing::Subscriber,
    T: Transport + 'static,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        // For native tracing events, normalized_metadata() returns None and we use the event's
        // own metadata.
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        let mut visitor = FieldVisitor {
            bridged: event.metadata().target() == LOG_TARGET,
            ..FieldVisitor::default()
        };
        event.record(&mut visitor);

        // Without tracing-log normalization a bridged record's metadata names only "log"
        let target = visitor
            .log_target
            .take()
            .unwrap_or_else(|| meta.target().to_string());
        if self.own.excludes(&target) || !self.transport.accepts(&target) {
            return;
        }

        // Fields recorded on the event itself take precedence over call-site metadata
        let mut fields = Fields::new();
        CallerInfo {
            file: meta.file().map(String::from),
            line: meta.line(),
            function: meta.module_path().map(String::from),
        }
        .apply(&mut fields);
        fields.extend(visitor.fields);

        self.ship(&Event::from_fields(
            fields,
            target,
            Severity::from(meta.level()),
        ))
        .unwrap_or_else(|err| {
            ::tracing::error!("failed to send a GELF message: {}", err);
        })
    }
}

#[cfg(test)]
mod smoke {

    use super::*;

    use crate::{compress::decompress, error::Error};

    use tracing::Callsite;
    use tracing_subscriber::{
        layer::SubscriberExt, // Needed to get `with()`
        registry::Registry,
    };

    use std::sync::{Arc, Mutex};

    /// Collects frames in memory
    #[derive(Clone, Default)]
    struct Recorder {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
        closed: Arc<Mutex<usize>>,
        fail: bool,
    }

    impl Transport for Recorder {
        fn send(&self, frame: &[u8]) -> Result<()> {
            if self.fail {
                return Err(Error::send(std::io::Error::from(
                    std::io::ErrorKind::BrokenPipe,
                )));
            }
            self.frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
        fn close(&self) {
            *self.closed.lock().unwrap() += 1;
        }
        fn accepts(&self, logger_name: &str) -> bool {
            !logger_name.starts_with("noisy")
        }
    }

    impl Recorder {
        fn documents(&self) -> Vec<serde_json::Value> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|frame| serde_json::from_slice(&decompress(frame).unwrap()).unwrap())
                .collect()
        }
    }

    fn layer(recorder: &Recorder) -> Layer<CompressingTransport<Recorder>> {
        Layer::new(
            Encoder::builder().use_fqdn(false).local_name("bree.local").build(),
            CompressingTransport::new(recorder.clone()),
        )
    }

    #[test]
    fn structured_event() {
        let recorder = Recorder::default();
        let subscriber = Registry::default().with(layer(&recorder));
        let _guard = tracing::subscriber::set_default(subscriber);

        let line = line!() + 1;
        tracing::warn!(
            target: "app",
            user = "simon",
            answer = 42,
            ratio = 0.5,
            "answered a question"
        );

        let docs = recorder.documents();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc["version"], "1.1");
        assert_eq!(doc["host"], "bree.local");
        assert_eq!(doc["level"], 4);
        assert_eq!(doc["short_message"], "answered a question");
        assert_eq!(doc["_user"], "simon");
        assert_eq!(doc["_answer"], 42);
        assert_eq!(doc["_ratio"], 0.5);
        assert_eq!(doc["_level_name"], "WARNING");
        assert_eq!(doc["_logger"], "app");
        assert_eq!(doc["_function"], module_path!());
        assert_eq!(doc["_file"], file!());
        assert_eq!(doc["_line"], line);
        assert_eq!(doc["_pid"], std::process::id());
    }

    #[derive(Debug)]
    struct Inner;
    impl std::fmt::Display for Inner {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "disk full")
        }
    }
    impl std::error::Error for Inner {}

    #[derive(Debug)]
    struct Outer(Inner);
    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "write failed")
        }
    }
    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn errors_become_full_message() {
        let recorder = Recorder::default();
        let subscriber = Registry::default().with(layer(&recorder));
        let _guard = tracing::subscriber::set_default(subscriber);

        let err = Outer(Inner);
        tracing::error!(
            target: "app",
            error = &err as &(dyn std::error::Error + 'static),
            "saving"
        );

        let doc = &recorder.documents()[0];
        assert_eq!(doc["level"], 3);
        assert_eq!(doc["_error"], "write failed");
        assert_eq!(
            doc["full_message"],
            "saving\nwrite failed\nCaused by: disk full"
        );
    }

    #[test]
    fn filtered_targets() {
        let recorder = Recorder::default();
        let subscriber = Registry::default().with(layer(&recorder));
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!(target: "noisy::driver", "published");
        tracing::info!(target: "graystruct::transport", "connected");
        tracing::info!(target: "graystructure", "kept");

        let docs = recorder.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["_logger"], "graystructure");
    }

    #[test]
    fn bridged_records_filter_on_their_own_target() {
        let recorder = Recorder::default();
        let subscriber = Registry::default().with(layer(&recorder));
        let _guard = tracing::subscriber::set_default(subscriber);

        // The shape tracing-log gives `log` records: target "log", real target in `log.target`
        tracing::info!(
            target: "log",
            { log.target = "noisy::driver", log.module_path = "noisy::driver" },
            "published"
        );
        tracing::info!(
            target: "log",
            { log.target = "app::db", log.module_path = "app::db" },
            "committed"
        );

        let docs = recorder.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["_logger"], "app::db");
        assert_eq!(docs[0]["short_message"], "committed");
        assert!(docs[0].get("_log.target").is_none());
        assert!(docs[0].get("_log.module_path").is_none());
    }

    #[test]
    fn failures_do_not_panic() {
        let recorder = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let layer = layer(&recorder);
        let subscriber = Registry::default().with(layer);
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!(target: "app", "into the void");
        tracing::info!(target: "app", ratio = f64::NAN, "not even encodable");
        assert!(recorder.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn close_reaches_the_transport() {
        let recorder = Recorder::default();
        let layer = layer(&recorder);
        layer.close();
        layer.close();
        assert_eq!(*recorder.closed.lock().unwrap(), 2);
    }

    // I confess, `tracing` internals are a bit opaque to me, yet. Just enough here to easily give
    // myself an Event against which I can test the field visitor.

    struct TestCallsite {
        metadata: &'static tracing::Metadata<'static>,
    }
    impl tracing_core::callsite::Callsite for TestCallsite {
        fn set_interest(&self, _interest: tracing_core::subscriber::Interest) {}
        fn metadata(&self) -> &tracing::Metadata<'static> {
            self.metadata
        }
    }
    impl TestCallsite {
        pub const fn new(metadata: &'static tracing::Metadata<'static>) -> TestCallsite {
            TestCallsite { metadata }
        }
    }

    #[test]
    fn field_visitor() {
        static CALLSITE: TestCallsite = {
            static METADATA: tracing::Metadata = tracing::Metadata::new(
                "test event metadata",
                "test-target",
                tracing::Level::INFO,
                Some(file!()),
                Some(line!()),
                Some(module_path!()),
                tracing::field::FieldSet::new(
                    &["message"],
                    tracing_core::callsite::Identifier(&CALLSITE),
                ),
                tracing_core::metadata::Kind::EVENT,
            );
            TestCallsite::new(&METADATA)
        };

        let fields = CALLSITE.metadata().fields();
        let message = fields.field("message").unwrap();
        let greeting = "Hello, 世界!";
        let values = [(&message, Some(&greeting as &dyn tracing::field::Value))];
        let value_set = fields.value_set(&values);
        let event = tracing::Event::new(CALLSITE.metadata(), &value_set);

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        assert_eq!(
            visitor.fields.get("message"),
            Some(&FieldValue::from("Hello, 世界!"))
        );
        assert_eq!(visitor.fields.len(), 1);
    }

    #[test]
    #[cfg(feature = "graylog")]
    fn test_tracing_via_udp() {
        // Exercise `try_default()`, just to be sure it compiles.
        let _subscriber = Registry::default().with(Layer::try_default().unwrap());

        let subscriber = Registry::default().with(Layer::with_transport(
            CompressingTransport::new(UdpTransport::new("127.0.0.1:12201").unwrap()),
        ));
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!(target: "udp-test", answer = 42, "Hello, 世界!");
        tracing::warn!(target: "udp-test", "Hello, 世界!");
    }
}
