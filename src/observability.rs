use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("vllm_chat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("vllm_chat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("vllm_chat.client.request_duration_seconds");

pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("vllm_chat.stream.fragments");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("vllm_chat.stream.errors");
pub(crate) static STREAM_TTFB: Moments = Moments::new("vllm_chat.stream.ttfb_seconds");

pub(crate) static EXCHANGES: Counter = Counter::new("vllm_chat.session.exchanges");
pub(crate) static EXCHANGE_COMMITS: Counter = Counter::new("vllm_chat.session.commits");
pub(crate) static EXCHANGE_ROLLBACKS: Counter = Counter::new("vllm_chat.session.rollbacks");
pub(crate) static EXCHANGE_DURATION: Moments =
    Moments::new("vllm_chat.session.exchange_duration_seconds");

pub(crate) static SNAPSHOT_SAVES: Counter = Counter::new("vllm_chat.snapshot.saves");
pub(crate) static SNAPSHOT_LOADS: Counter = Counter::new("vllm_chat.snapshot.loads");
pub(crate) static SNAPSHOT_LOAD_ERRORS: Counter = Counter::new("vllm_chat.snapshot.load_errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_moments(&STREAM_TTFB);

    collector.register_counter(&EXCHANGES);
    collector.register_counter(&EXCHANGE_COMMITS);
    collector.register_counter(&EXCHANGE_ROLLBACKS);
    collector.register_moments(&EXCHANGE_DURATION);

    collector.register_counter(&SNAPSHOT_SAVES);
    collector.register_counter(&SNAPSHOT_LOADS);
    collector.register_counter(&SNAPSHOT_LOAD_ERRORS);
}
