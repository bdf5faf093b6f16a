//! The broker-pool connection (§4.5): a cache of per-server IO handles, a metadata
//! cache, and the routing/retry/failover algorithm that sits on top of both.
//!
//! `Connection` owns plain maps mutated through `&mut self` rather than the teacher's
//! `Arc<BrokerConnector>` + `parking_lot::RwLock` sharing model: §5 mandates a
//! single-threaded-per-`Connection` usage pattern (enforced here at compile time, since
//! every method below takes `&mut self`), so the concurrent-sharing machinery the
//! teacher needs has no job to do in this crate.

pub mod topology;

use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;
use std::time::Duration;

use tracing::{info, warn};

use crate::backoff::{Backoff, BackoffConfig};
use crate::error::{Error, ErrorCode};
use crate::io::{IoHandle, IpVersion};
use crate::protocol::api_version::ApiVersion;
use crate::protocol::error::Error as ApiError;
use crate::protocol::messages::{
    ApiVersionsRequest, ApiVersionsResponse, FetchRequest, FetchRequestPartition,
    FetchRequestTopic, FetchResponse, ListOffsetsRequest, ListOffsetsRequestPartition,
    ListOffsetsRequestTopic, ListOffsetsResponse, MetadataRequest, MetadataRequestTopic,
    MetadataResponse, MetadataResponseBroker, ProduceRequest, ProduceRequestPartition, ProduceRequestTopic,
    ProduceResponse, ReadVersionedType, RequestBody, RequestHeader, ResponseHeader,
    WriteVersionedType,
};
use crate::protocol::traits::WriteType;
use crate::topic::Topic;
use topology::BrokerTopology;

pub use crate::protocol::messages::fetch::MinBytes;
pub use crate::protocol::messages::offset::Time;
pub use crate::protocol::messages::produce::RequiredAcks;

/// Immutable construction-time configuration (§4.1, §4.5).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub timeout: Duration,
    pub send_max_attempts: u32,
    pub retry_backoff: Duration,
    pub ip_version: IpVersion,

    /// Error policy flag: see [`crate::io::IoHandle::checked`] and §4.3/§4.4.
    pub raise_error: bool,

    /// Skip the best-effort `ApiVersions` probe at construction (§9 Open Question ii).
    pub dont_load_supported_api_versions: bool,

    pub client_id: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: crate::internals::DEFAULT_IO_TIMEOUT,
            send_max_attempts: crate::internals::DEFAULT_SEND_MAX_ATTEMPTS,
            retry_backoff: crate::internals::DEFAULT_RETRY_BACKOFF,
            ip_version: IpVersion::Any,
            raise_error: true,
            dont_load_supported_api_versions: false,
            client_id: None,
        }
    }
}

pub struct Connection {
    known_servers: BTreeSet<String>,
    io_cache: HashMap<String, IoHandle>,
    topology: BrokerTopology,
    metadata: HashMap<String, Topic>,
    last_errors: HashMap<String, Error>,
    supported_versions: HashMap<String, ApiVersionsResponse>,
    next_correlation_id: i32,
    config: ConnectionConfig,
}

impl Connection {
    /// Validates `servers` and seeds `known_servers`. No IO happens here: sockets are
    /// opened lazily on first use (§4.5's `Uncached -> Connected` state machine).
    pub fn new(servers: Vec<(String, u16)>, config: ConnectionConfig) -> Result<Self, Error> {
        if servers.is_empty() {
            return Err(Error::MismatchArgument {
                message: "at least one broker must be given".to_string(),
            });
        }

        let mut known_servers = BTreeSet::new();
        for (host, port) in &servers {
            if host.is_empty() {
                return Err(Error::MismatchArgument {
                    message: "broker host must not be empty".to_string(),
                });
            }
            known_servers.insert(format!("{host}:{port}"));
        }

        Ok(Self {
            known_servers,
            io_cache: HashMap::new(),
            topology: BrokerTopology::default(),
            metadata: HashMap::new(),
            last_errors: HashMap::new(),
            supported_versions: HashMap::new(),
            next_correlation_id: 0,
            config,
        })
    }

    pub fn get_known_servers(&self) -> Vec<String> {
        self.known_servers.iter().cloned().collect()
    }

    pub fn is_server_known(&self, server: &str) -> bool {
        self.known_servers.contains(server)
    }

    pub fn is_server_connected(&self, server: &str) -> bool {
        self.io_cache.get(server).is_some_and(|h| !h.is_closed())
    }

    /// Connected, or connectable right now: probes by opening (and caching) a handle,
    /// retrying up to `send_max_attempts` times, and never reporting a transient probe
    /// failure as "not alive" until the attempt budget is spent.
    pub async fn is_server_alive(&mut self, server: &str) -> bool {
        if self.is_server_connected(server) {
            return true;
        }

        for attempt in 0..self.config.send_max_attempts {
            match self.ensure_io(server).await {
                Ok(_) => {
                    self.last_errors.remove(server);
                    return true;
                }
                Err(err) => {
                    warn!(server, attempt, %err, "probe failed");
                    self.last_errors.insert(server.to_string(), err);
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
            }
        }
        false
    }

    pub fn close_connection(&mut self, server: &str) {
        self.io_cache.remove(server);
    }

    pub async fn close(&mut self) {
        for (_, mut handle) in self.io_cache.drain() {
            handle.close().await;
        }
    }

    /// Known servers with a non-empty last error since the last successful op against
    /// that server (§4.5). Populated by `call`/`send_without_response` on an IO failure
    /// and by `get_metadata`/`is_server_alive` on their own failures; cleared by whichever
    /// of those succeeds against that server next.
    pub fn cluster_errors(&self) -> &HashMap<String, Error> {
        &self.last_errors
    }

    pub fn exists_topic_partition(&self, topic: &str, partition: i32) -> bool {
        self.metadata
            .get(topic)
            .is_some_and(|t| t.partitions.contains_key(&partition))
    }

    /// Opens and caches a handle for `server` if one isn't already cached. Does not
    /// itself return the handle: callers fetch it from `io_cache` afterward, which keeps
    /// this free of the indirect-recursion a `&mut IoHandle`-returning version would
    /// create once it also has to run the `ApiVersions` probe through the same request
    /// path (`ensure_io` -> probe -> `call` -> `ensure_io`).
    async fn ensure_io(&mut self, server: &str) -> Result<(), Error> {
        if self.io_cache.contains_key(server) {
            return Ok(());
        }

        let (host, port) = split_host_port(server)?;
        let handle = IoHandle::open(
            host,
            port,
            self.config.timeout,
            self.config.ip_version,
            self.config.raise_error,
        )
        .await?;
        self.io_cache.insert(server.to_string(), handle);

        if !self.config.dont_load_supported_api_versions {
            self.probe_api_versions(server).await;
        }
        Ok(())
    }

    /// Best-effort version negotiation probe (§9 Open Question ii): failure here is
    /// logged and otherwise ignored. Callers that need exact per-api version bounds can
    /// consult `supported_versions` directly; every request this crate sends already
    /// pins a fixed version it knows the legacy wire format for. Talks directly to the
    /// handle `ensure_io` just inserted rather than going through `call`/`ensure_io`
    /// again.
    async fn probe_api_versions(&mut self, server: &str) {
        let correlation_id = self.next_correlation_id;
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);
        let client_id = self.config.client_id.clone();

        let Some(io) = self.io_cache.get_mut(server) else {
            return;
        };

        match send_and_receive(io, correlation_id, client_id.as_deref(), ApiVersionsRequest, ApiVersion(0)).await {
            Ok(resp) => {
                info!(server, "negotiated api versions");
                self.supported_versions.insert(server.to_string(), resp);
            }
            Err(err) => {
                warn!(server, %err, "api_versions probe failed, continuing without it");
            }
        }
    }

    /// Ensures a handle exists for `server`, then frames `body` behind the common
    /// request header, sends it, and decodes the response (§4.2, §4.5 step 3). The
    /// handle is dropped from the cache on any IO failure, per the `Errored -> Closed`
    /// transition of §4.5's state machine.
    async fn call<B>(
        &mut self,
        server: &str,
        body: B,
        version: ApiVersion,
    ) -> Result<B::ResponseBody, Error>
    where
        B: RequestBody + WriteVersionedType<Vec<u8>>,
        B::ResponseBody: ReadVersionedType<std::io::Cursor<Vec<u8>>>,
    {
        let client_id = self.config.client_id.clone();
        if let Err(err) = self.ensure_io(server).await {
            self.last_errors.insert(server.to_string(), clone_error(&err));
            return Err(err);
        }

        let correlation_id = self.next_correlation_id;
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);

        let io = self.io_cache.get_mut(server).expect("ensure_io just inserted it");
        let result = send_and_receive(io, correlation_id, client_id.as_deref(), body, version).await;

        match &result {
            Ok(_) => {
                self.last_errors.remove(server);
            }
            Err(err) => {
                // §4.5 step 4: "IO-level failure ... record in cluster_errors, close the
                // handle". Recorded here (not just at the metadata-refresh call site)
                // so a send/recv failure mid-routing against an already-cached server
                // shows up in `cluster_errors()` too.
                self.last_errors.insert(server.to_string(), clone_error(err));
                self.io_cache.remove(server);
            }
        }
        result
    }

    /// Like `call`, but for requests the broker never acknowledges (`RequiredAcks::
    /// NoResponse`): frames and sends `body`, then returns without reading anything off
    /// the socket. A send failure still drops the handle from the cache, same as `call`.
    async fn send_without_response<B>(
        &mut self,
        server: &str,
        body: B,
        version: ApiVersion,
    ) -> Result<(), Error>
    where
        B: RequestBody + WriteVersionedType<Vec<u8>>,
    {
        let client_id = self.config.client_id.clone();
        if let Err(err) = self.ensure_io(server).await {
            self.last_errors.insert(server.to_string(), clone_error(&err));
            return Err(err);
        }

        let correlation_id = self.next_correlation_id;
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);

        let io = self.io_cache.get_mut(server).expect("ensure_io just inserted it");
        let result = send_only(io, correlation_id, client_id.as_deref(), body, version).await;

        match &result {
            Ok(()) => {
                self.last_errors.remove(server);
            }
            Err(err) => {
                self.last_errors.insert(server.to_string(), clone_error(err));
                self.io_cache.remove(server);
            }
        }
        result
    }

    /// Refreshes the metadata cache from the first reachable known server, replacing
    /// the topic/partition map and node table atomically on success (§4.5).
    pub async fn get_metadata(&mut self, topic: Option<&str>) -> Result<(), Error> {
        if topic.is_some_and(str::is_empty) {
            return Err(Error::MismatchArgument {
                message: "topic must not be empty".to_string(),
            });
        }

        let topics = topic
            .map(|t| vec![MetadataRequestTopic { name: t.to_string() }])
            .unwrap_or_default();
        let request = MetadataRequest { topics };

        let servers: Vec<String> = self.known_servers.iter().cloned().collect();
        let mut last_err = None;

        for server in &servers {
            match self.call::<MetadataRequest>(server, request_clone(&request), ApiVersion(0)).await
            {
                Ok(resp) => {
                    // `call` already cleared `last_errors` for `server` on success.
                    self.apply_metadata(resp);
                    return Ok(());
                }
                Err(err) => {
                    // `call` already recorded `err` into `last_errors` for `server`.
                    warn!(server, %err, "metadata refresh failed, trying next known server");
                    last_err = Some(err);
                }
            }
        }

        Err(Error::MetadataAttemptsFail {
            message: last_err.map(|e| e.to_string()).unwrap_or_else(|| "no known servers".to_string()),
        })
    }

    fn apply_metadata(&mut self, resp: MetadataResponse) {
        self.topology.update(&resp.brokers);

        let mut metadata = HashMap::new();
        for topic in &resp.topics {
            metadata.insert(topic.name.clone(), Topic::from_metadata(topic));
        }
        self.metadata = metadata;
    }

    /// Resolves the current leader server for `topic`/`partition` from the metadata
    /// cache, honoring §3's invariant that a partition with a non-zero error code "may
    /// have an undefined leader and must not be routed to": such a partition is
    /// classified the same way a per-response error would be (§4.5 step 4) rather than
    /// surfaced as a flat `UnknownTopicOrPartition`, so a transient `LeaderNotAvailable`
    /// during leader election triggers a metadata refresh and retry instead of a
    /// terminal error. A partition absent from the cache entirely (the topic doesn't
    /// exist, or was never returned by the broker) is non-retryable.
    fn resolve_leader(&self, topic: &str, partition: i32) -> RetryOutcome<String> {
        let partition_meta = self
            .metadata
            .get(topic)
            .and_then(|t| t.partitions.get(&partition))
            .ok_or_else(|| {
                ControlFlow::Break(Error::UnknownTopicOrPartition {
                    topic: topic.to_string(),
                    partition,
                })
            })?;

        if let Some(err) = partition_meta.error {
            return Err(classify_api_error(err, topic, partition));
        }

        self.topology
            .get_broker(partition_meta.leader_id)
            .map(|b| format!("{}:{}", b.host, b.port))
            .ok_or_else(|| {
                ControlFlow::Continue(Error::LeaderNotAvailable {
                    topic: topic.to_string(),
                    partition,
                })
            })
    }

    async fn ensure_metadata_for(&mut self, topics: &[&str]) -> Result<(), Error> {
        let missing = topics.iter().any(|t| !self.metadata.contains_key(*t));
        if missing {
            self.get_metadata(None).await?;
        }
        Ok(())
    }

    /// Sends a batch of records for one topic-partition, routing to the current leader
    /// and retrying per §4.5 step 4's classification.
    ///
    /// `RequiredAcks::NoResponse` (§8 scenario 5) short-circuits this: the broker never
    /// frames a reply for that mode, so this returns `Ok(None)` ("an empty response
    /// record") as soon as the request has been written, without waiting on an
    /// acknowledgement or consuming the retry budget.
    pub async fn produce(
        &mut self,
        topic: &str,
        partition: i32,
        records: crate::protocol::record::MessageSet,
        required_acks: RequiredAcks,
        timeout_ms: i32,
    ) -> Result<Option<i64>, Error> {
        self.ensure_metadata_for(&[topic]).await?;

        if required_acks == RequiredAcks::NoResponse {
            let server = self.resolve_leader(topic, partition).map_err(|cf| match cf {
                ControlFlow::Break(err) | ControlFlow::Continue(err) => err,
            })?;
            let request = ProduceRequest {
                required_acks,
                timeout_ms,
                topics: vec![ProduceRequestTopic {
                    name: topic.to_string(),
                    partitions: vec![ProduceRequestPartition {
                        partition_index: partition,
                        records,
                    }],
                }],
            };
            self.send_without_response::<ProduceRequest>(&server, request, ApiVersion(0)).await?;
            return Ok(None);
        }

        let mut backoff = Backoff::new(self.retry_config());
        loop {
            let server = match self.resolve_leader(topic, partition) {
                Ok(s) => s,
                Err(ControlFlow::Break(err)) => return Err(err),
                Err(ControlFlow::Continue(err)) => match backoff.next() {
                    Some(delay) => {
                        warn!(topic, partition, attempt = backoff.attempt(), %err, "retrying produce, leader unresolved");
                        let _ = self.get_metadata(Some(topic)).await;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => return Err(err),
                },
            };

            let request = ProduceRequest {
                required_acks,
                timeout_ms,
                topics: vec![ProduceRequestTopic {
                    name: topic.to_string(),
                    partitions: vec![ProduceRequestPartition {
                        partition_index: partition,
                        records: records_clone(&records),
                    }],
                }],
            };

            let outcome = match self.call::<ProduceRequest>(&server, request, ApiVersion(0)).await {
                Ok(resp) => classify_produce(resp, topic, partition),
                Err(err) => Err(classify_connection_error(err, topic, partition)),
            };

            match outcome {
                Ok(offset) => return Ok(Some(offset)),
                Err(ControlFlow::Break(err)) => return Err(err),
                Err(ControlFlow::Continue(err)) => match backoff.next() {
                    Some(delay) => {
                        warn!(topic, partition, attempt = backoff.attempt(), %err, "retrying produce");
                        if self.metadata_needs_refresh(&err) {
                            let _ = self.get_metadata(Some(topic)).await;
                        }
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    /// Fetches records from one topic-partition starting at `fetch_offset`.
    pub async fn fetch(
        &mut self,
        topic: &str,
        partition: i32,
        fetch_offset: i64,
        max_wait_ms: i32,
        min_bytes: MinBytes,
        partition_max_bytes: i32,
    ) -> Result<FetchResult, Error> {
        self.ensure_metadata_for(&[topic]).await?;

        let mut backoff = Backoff::new(self.retry_config());
        loop {
            let server = match self.resolve_leader(topic, partition) {
                Ok(s) => s,
                Err(ControlFlow::Break(err)) => return Err(err),
                Err(ControlFlow::Continue(err)) => match backoff.next() {
                    Some(delay) => {
                        warn!(topic, partition, attempt = backoff.attempt(), %err, "retrying fetch, leader unresolved");
                        let _ = self.get_metadata(Some(topic)).await;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => return Err(err),
                },
            };

            let request = FetchRequest {
                replica_id: -1,
                max_wait_ms,
                min_bytes,
                topics: vec![FetchRequestTopic {
                    topic: topic.to_string(),
                    partitions: vec![FetchRequestPartition {
                        partition,
                        fetch_offset,
                        partition_max_bytes,
                    }],
                }],
            };

            let outcome = match self.call::<FetchRequest>(&server, request, ApiVersion(0)).await {
                Ok(resp) => classify_fetch(resp, topic, partition),
                Err(err) => Err(classify_connection_error(err, topic, partition)),
            };

            match outcome {
                Ok(v) => return Ok(v),
                Err(ControlFlow::Break(err)) => return Err(err),
                Err(ControlFlow::Continue(err)) => match backoff.next() {
                    Some(delay) => {
                        warn!(topic, partition, attempt = backoff.attempt(), %err, "retrying fetch");
                        if self.metadata_needs_refresh(&err) {
                            let _ = self.get_metadata(Some(topic)).await;
                        }
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    /// Looks up the offset boundary for one topic-partition at `time`.
    pub async fn list_offsets(
        &mut self,
        topic: &str,
        partition: i32,
        time: Time,
        max_num_offsets: i32,
    ) -> Result<Vec<i64>, Error> {
        self.ensure_metadata_for(&[topic]).await?;

        let mut backoff = Backoff::new(self.retry_config());
        loop {
            let server = match self.resolve_leader(topic, partition) {
                Ok(s) => s,
                Err(ControlFlow::Break(err)) => return Err(err),
                Err(ControlFlow::Continue(err)) => match backoff.next() {
                    Some(delay) => {
                        warn!(topic, partition, attempt = backoff.attempt(), %err, "retrying list_offsets, leader unresolved");
                        let _ = self.get_metadata(Some(topic)).await;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => return Err(err),
                },
            };

            let request = ListOffsetsRequest {
                replica_id: -1,
                topics: vec![ListOffsetsRequestTopic {
                    name: topic.to_string(),
                    partitions: vec![ListOffsetsRequestPartition {
                        partition_index: partition,
                        timestamp: time,
                        max_num_offsets: Some(max_num_offsets),
                    }],
                }],
            };

            let outcome = match self.call::<ListOffsetsRequest>(&server, request, ApiVersion(0)).await {
                Ok(resp) => classify_list_offsets(resp, topic, partition),
                Err(err) => Err(classify_connection_error(err, topic, partition)),
            };

            match outcome {
                Ok(v) => return Ok(v),
                Err(ControlFlow::Break(err)) => return Err(err),
                Err(ControlFlow::Continue(err)) => match backoff.next() {
                    Some(delay) => {
                        warn!(topic, partition, attempt = backoff.attempt(), %err, "retrying list_offsets");
                        if self.metadata_needs_refresh(&err) {
                            let _ = self.get_metadata(Some(topic)).await;
                        }
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    fn retry_config(&self) -> BackoffConfig {
        BackoffConfig {
            max_attempts: self.config.send_max_attempts,
            base_delay: self.config.retry_backoff,
            max_delay: self.config.retry_backoff * 10,
        }
    }

    fn metadata_needs_refresh(&self, err: &Error) -> bool {
        matches!(
            err.code(),
            ErrorCode::LeaderNotAvailable | ErrorCode::NotLeaderForPartition
        )
    }

    /// The central entry point (§1, §4.5): "send this request, give me back the parsed
    /// response, transparently routed and retried." Dispatches `request` to whichever of
    /// `produce`/`fetch`/`list_offsets`/`get_metadata` matches its tagged variant and
    /// wraps the typed result back up as a `Response` of the matching shape. The typed
    /// methods remain available directly for callers (and the facade boundary, §1) that
    /// already know which operation they want and would rather not match on `Response`
    /// to unwrap it again; this is the single-verb dispatch surface for callers that want
    /// to hold one `Request` value end to end.
    pub async fn receive_response_to_request(&mut self, request: Request) -> Result<Response, Error> {
        match request {
            Request::Produce {
                topic,
                partition,
                records,
                required_acks,
                timeout_ms,
            } => {
                let offset = self
                    .produce(&topic, partition, records, required_acks, timeout_ms)
                    .await?;
                Ok(Response::Produce(offset))
            }
            Request::Fetch {
                topic,
                partition,
                fetch_offset,
                max_wait_ms,
                min_bytes,
                partition_max_bytes,
            } => {
                let result = self
                    .fetch(&topic, partition, fetch_offset, max_wait_ms, min_bytes, partition_max_bytes)
                    .await?;
                Ok(Response::Fetch(result))
            }
            Request::ListOffsets {
                topic,
                partition,
                time,
                max_num_offsets,
            } => {
                let offsets = self.list_offsets(&topic, partition, time, max_num_offsets).await?;
                Ok(Response::ListOffsets(offsets))
            }
            Request::Metadata { topic } => {
                self.get_metadata(topic.as_deref()).await?;
                Ok(Response::Metadata)
            }
        }
    }
}

/// Tagged-variant realization of §4.5's single request verb: one value per `ApiKey` this
/// crate speaks, carrying exactly the parameters its matching typed method
/// (`produce`/`fetch`/`list_offsets`/`get_metadata`) takes.
#[derive(Debug, Clone)]
pub enum Request {
    Produce {
        topic: String,
        partition: i32,
        records: crate::protocol::record::MessageSet,
        required_acks: RequiredAcks,
        timeout_ms: i32,
    },
    Fetch {
        topic: String,
        partition: i32,
        fetch_offset: i64,
        max_wait_ms: i32,
        min_bytes: MinBytes,
        partition_max_bytes: i32,
    },
    ListOffsets {
        topic: String,
        partition: i32,
        time: Time,
        max_num_offsets: i32,
    },
    Metadata {
        topic: Option<String>,
    },
}

/// The response shape matching whichever `Request` variant produced it.
#[derive(Debug)]
pub enum Response {
    Produce(Option<i64>),
    Fetch(FetchResult),
    ListOffsets(Vec<i64>),
    /// `get_metadata` mutates the connection's own metadata cache rather than handing
    /// data back to the caller; this variant just confirms the refresh succeeded.
    Metadata,
}

type RetryOutcome<T> = Result<T, ControlFlow<Error, Error>>;

fn classify_produce(
    resp: ProduceResponse,
    topic: &str,
    partition: i32,
) -> RetryOutcome<i64> {
    let entry = resp
        .topics
        .into_iter()
        .find(|t| t.name == topic)
        .and_then(|t| t.partitions.into_iter().find(|p| p.partition_index == partition));

    match entry {
        Some(p) => classify_partition_error(p.error_code, topic, partition, p.base_offset),
        None => Err(ControlFlow::Break(Error::DescriptionMismatch {
            message: format!("no partition {partition} in produce response for {topic}"),
        })),
    }
}

fn classify_fetch(resp: FetchResponse, topic: &str, partition: i32) -> RetryOutcome<FetchResult> {
    let entry = resp
        .responses
        .into_iter()
        .find(|t| t.topic == topic)
        .and_then(|t| t.partitions.into_iter().find(|p| p.partition_index == partition));

    match entry {
        Some(p) => classify_partition_error(
            p.error_code,
            topic,
            partition,
            FetchResult { high_watermark: p.high_watermark, records: p.records },
        ),
        None => Err(ControlFlow::Break(Error::DescriptionMismatch {
            message: format!("no partition {partition} in fetch response for {topic}"),
        })),
    }
}

fn classify_list_offsets(
    resp: ListOffsetsResponse,
    topic: &str,
    partition: i32,
) -> RetryOutcome<Vec<i64>> {
    let entry = resp
        .topics
        .into_iter()
        .find(|t| t.name == topic)
        .and_then(|t| t.partitions.into_iter().find(|p| p.partition_index == partition));

    match entry {
        Some(p) => classify_partition_error(p.error_code, topic, partition, p.offsets),
        None => Err(ControlFlow::Break(Error::DescriptionMismatch {
            message: format!("no partition {partition} in list_offsets response for {topic}"),
        })),
    }
}

/// Shared per-partition error classification (§4.5 step 4): stale leadership is
/// retryable, anything else is final. Used both for a response's per-partition error
/// code and for a cached metadata partition carrying a non-zero error (§3).
fn classify_api_error(err: ApiError, topic: &str, partition: i32) -> ControlFlow<Error, Error> {
    if err.is_stale_leadership() {
        ControlFlow::Continue(Error::from_api_error(err, topic, partition))
    } else if err == ApiError::UnknownTopicOrPartition {
        ControlFlow::Break(Error::UnknownTopicOrPartition {
            topic: topic.to_string(),
            partition,
        })
    } else {
        ControlFlow::Break(Error::from_api_error(err, topic, partition))
    }
}

/// Shared per-partition error classification (§4.5 step 4): success passes the value
/// through, anything else defers to `classify_api_error`.
fn classify_partition_error<T>(
    error_code: Option<ApiError>,
    topic: &str,
    partition: i32,
    value: T,
) -> RetryOutcome<T> {
    match error_code {
        None => Ok(value),
        Some(e) => Err(classify_api_error(e, topic, partition)),
    }
}

fn classify_connection_error(err: Error, topic: &str, partition: i32) -> ControlFlow<Error, Error> {
    match err.code() {
        ErrorCode::CannotSend | ErrorCode::CannotRecv | ErrorCode::NoConnection => {
            ControlFlow::Continue(err)
        }
        ErrorCode::UnknownTopicOrPartition => ControlFlow::Break(Error::UnknownTopicOrPartition {
            topic: topic.to_string(),
            partition,
        }),
        _ => ControlFlow::Break(err),
    }
}

/// Result of a single-partition fetch: the broker's current high watermark plus the
/// (possibly truncated, §4.2 robustness rule ii) decoded message set.
#[derive(Debug)]
pub struct FetchResult {
    pub high_watermark: i64,
    pub records: crate::protocol::record::MessageSet,
}

fn split_host_port(server: &str) -> Result<(&str, u16), Error> {
    let (host, port) = server.rsplit_once(':').ok_or_else(|| Error::MismatchArgument {
        message: format!("invalid server address: {server}"),
    })?;
    let port: u16 = port.parse().map_err(|_| Error::MismatchArgument {
        message: format!("invalid port in server address: {server}"),
    })?;
    Ok((host, port))
}

fn wire_error(message: &str) -> Error {
    Error::DescriptionMismatch {
        message: message.to_string(),
    }
}

/// Frames `body` behind the common request header, sends it over `io`, and decodes the
/// response header + body, validating the echoed correlation id (§4.2, §4.5 step 3).
/// Free of any reference to `Connection`/`io_cache` so the `ApiVersions` probe can call it
/// directly on a just-opened handle without re-entering `ensure_io`.
async fn send_and_receive<B>(
    io: &mut IoHandle,
    correlation_id: i32,
    client_id: Option<&str>,
    body: B,
    version: ApiVersion,
) -> Result<B::ResponseBody, Error>
where
    B: RequestBody + WriteVersionedType<Vec<u8>>,
    B::ResponseBody: ReadVersionedType<std::io::Cursor<Vec<u8>>>,
{
    let header = RequestHeader {
        request_api_key: B::API_KEY,
        request_api_version: version,
        correlation_id,
        client_id: client_id.map(str::to_string),
    };

    let mut payload = Vec::new();
    header
        .write_versioned(&mut payload, B::header_version(version))
        .map_err(|e| wire_error(&e.to_string()))?;
    body.write_versioned(&mut payload, version)
        .map_err(|e| wire_error(&e.to_string()))?;

    let mut framed = Vec::with_capacity(payload.len() + 4);
    let len = i32::try_from(payload.len()).map_err(|_| wire_error("request too large to frame"))?;
    len.write(&mut framed).map_err(|e| wire_error(&e.to_string()))?;
    framed.extend_from_slice(&payload);

    io.send(&framed).await?;

    let len_bytes = io.receive(4).await?;
    let response_len = i32::from_be_bytes(len_bytes.try_into().expect("exactly 4 bytes"));
    if response_len < 4 {
        return Err(Error::ResponseMessageNotReceived {
            message: format!("declared response length {response_len} is too short"),
        });
    }

    let response_bytes = io.receive(response_len as usize).await?;
    let mut cursor = std::io::Cursor::new(response_bytes);
    let response_header = ResponseHeader::read_versioned(&mut cursor, ApiVersion(0))
        .map_err(|e| wire_error(&e.to_string()))?;
    if response_header.correlation_id != correlation_id {
        return Err(Error::DescriptionMismatch {
            message: format!(
                "correlation id mismatch: expected {correlation_id}, got {}",
                response_header.correlation_id
            ),
        });
    }

    B::ResponseBody::read_versioned(&mut cursor, version).map_err(|e| wire_error(&e.to_string()))
}

/// Frames and sends `body` without reading any reply (the `RequiredAcks::NoResponse`
/// case: the broker doesn't frame one). Shares `send_and_receive`'s header/framing logic
/// but stops once the bytes are on the wire.
async fn send_only<B>(
    io: &mut IoHandle,
    correlation_id: i32,
    client_id: Option<&str>,
    body: B,
    version: ApiVersion,
) -> Result<(), Error>
where
    B: RequestBody + WriteVersionedType<Vec<u8>>,
{
    let header = RequestHeader {
        request_api_key: B::API_KEY,
        request_api_version: version,
        correlation_id,
        client_id: client_id.map(str::to_string),
    };

    let mut payload = Vec::new();
    header
        .write_versioned(&mut payload, B::header_version(version))
        .map_err(|e| wire_error(&e.to_string()))?;
    body.write_versioned(&mut payload, version)
        .map_err(|e| wire_error(&e.to_string()))?;

    let mut framed = Vec::with_capacity(payload.len() + 4);
    let len = i32::try_from(payload.len()).map_err(|_| wire_error("request too large to frame"))?;
    len.write(&mut framed).map_err(|e| wire_error(&e.to_string()))?;
    framed.extend_from_slice(&payload);

    io.send(&framed).await?;
    Ok(())
}

/// Copies `err` into a source-less `Error` of the *same* variant, so a value recorded
/// into `last_errors`/`cluster_errors()` still reports its real [`ErrorCode`] (§4.4's
/// taxonomy is what callers match on) rather than collapsing to `DescriptionMismatch`.
/// Mirrors `io::IoHandle`'s own `clone_error`, extended to every variant this module can
/// hand it (not just the three IO-level ones the handle itself produces).
fn clone_error(err: &Error) -> Error {
    match err {
        Error::MismatchArgument { message } => Error::MismatchArgument {
            message: message.clone(),
        },
        Error::CannotSend { host, port, message, .. } => Error::CannotSend {
            host: host.clone(),
            port: *port,
            message: message.clone(),
            source: None,
        },
        Error::CannotRecv { host, port, message, .. } => Error::CannotRecv {
            host: host.clone(),
            port: *port,
            message: message.clone(),
            source: None,
        },
        Error::CannotBind { host, port, message, .. } => Error::CannotBind {
            host: host.clone(),
            port: *port,
            message: message.clone(),
            source: None,
        },
        Error::ResponseMessageNotReceived { message } => Error::ResponseMessageNotReceived {
            message: message.clone(),
        },
        Error::NoConnection { message } => Error::NoConnection {
            message: message.clone(),
        },
        Error::NoKnownBrokers => Error::NoKnownBrokers,
        Error::UnknownTopicOrPartition { topic, partition } => Error::UnknownTopicOrPartition {
            topic: topic.clone(),
            partition: *partition,
        },
        Error::LeaderNotAvailable { topic, partition } => Error::LeaderNotAvailable {
            topic: topic.clone(),
            partition: *partition,
        },
        Error::NotLeaderForPartition { topic, partition } => Error::NotLeaderForPartition {
            topic: topic.clone(),
            partition: *partition,
        },
        Error::MetadataAttemptsFail { message } => Error::MetadataAttemptsFail {
            message: message.clone(),
        },
        Error::DescriptionMismatch { message } => Error::DescriptionMismatch {
            message: message.clone(),
        },
        Error::CompressionCodecUnavailable { codec } => Error::CompressionCodecUnavailable {
            codec: codec.clone(),
        },
    }
}

fn request_clone(req: &MetadataRequest) -> MetadataRequest {
    MetadataRequest {
        topics: req
            .topics
            .iter()
            .map(|t| MetadataRequestTopic { name: t.name.clone() })
            .collect(),
    }
}

fn records_clone(set: &crate::protocol::record::MessageSet) -> crate::protocol::record::MessageSet {
    set.clone()
}
