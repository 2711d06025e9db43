use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("parley.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("parley.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("parley.client.request_duration_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("parley.stream.chunks");
pub(crate) static STREAM_BYTES: Counter = Counter::new("parley.stream.bytes");
pub(crate) static STREAM_FRAMES: Counter = Counter::new("parley.stream.frames");
pub(crate) static STREAM_PARSE_ERRORS: Counter = Counter::new("parley.stream.parse_errors");
pub(crate) static STREAM_SERVER_ERRORS: Counter = Counter::new("parley.stream.server_errors");
pub(crate) static STREAM_DURATION: Moments = Moments::new("parley.stream.duration_seconds");

pub(crate) static BUFFERED_PARSE_ERRORS: Counter = Counter::new("parley.buffered.parse_errors");

pub(crate) static STORE_MESSAGES_WRITTEN: Counter = Counter::new("parley.store.messages_written");
pub(crate) static STORE_CHATS_CREATED: Counter = Counter::new("parley.store.chats_created");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_FRAMES);
    collector.register_counter(&STREAM_PARSE_ERRORS);
    collector.register_counter(&STREAM_SERVER_ERRORS);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&BUFFERED_PARSE_ERRORS);

    collector.register_counter(&STORE_MESSAGES_WRITTEN);
    collector.register_counter(&STORE_CHATS_CREATED);
}
