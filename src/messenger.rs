//! Multiplexes requests over a single broker connection.
//!
//! Every request gets a fresh correlation ID; a background task reads response
//! frames and hands them to the waiting caller. Any read or write failure
//! poisons the messenger, failing every in-flight and future request.

use std::collections::HashMap;
use std::io::Cursor;
use std::ops::DerefMut;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::oneshot::{channel, Sender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::{ApiVersion, ApiVersionRange};
use crate::protocol::frame::{AsyncMessageRead, AsyncMessageWrite};
use crate::protocol::messages::{
    ApiVersionsRequest, ReadVersionedError, ReadVersionedType, RequestBody, RequestHeader,
    ResponseHeader, WriteVersionedError, WriteVersionedType,
};

/// Request headers are always sent as version 1, responses come back as version 0.
const REQUEST_HEADER_VERSION: ApiVersion = ApiVersion(1);
const RESPONSE_HEADER_VERSION: ApiVersion = ApiVersion(0);

#[derive(Debug)]
struct ActiveRequest {
    channel: Sender<Result<Cursor<Vec<u8>>, RequestError>>,
}

#[derive(Debug)]
enum MessengerState {
    /// Requests waiting for a response, keyed by correlation ID.
    RequestMap(HashMap<i32, ActiveRequest>),

    /// The connection is broken, nothing can be sent or received any longer.
    Poison(Arc<RequestError>),
}

impl MessengerState {
    fn poison(&mut self, err: RequestError) -> Arc<RequestError> {
        match self {
            Self::RequestMap(map) => {
                let err = Arc::new(err);

                for (_correlation_id, active_request) in map.drain() {
                    // the caller may have given up already
                    active_request
                        .channel
                        .send(Err(RequestError::Poisoned(Arc::clone(&err))))
                        .ok();
                }

                *self = Self::Poison(Arc::clone(&err));
                err
            }
            Self::Poison(e) => Arc::clone(e),
        }
    }
}

/// A connection to a single broker.
pub struct Messenger<RW> {
    /// Write half of the stream.
    ///
    /// Writes are serialized so frames never interleave.
    stream_write: Arc<AsyncMutex<WriteHalf<RW>>>,

    client_id: Arc<str>,

    correlation_id: AtomicI32,

    /// Versions the broker supports, filled by [`sync_versions`](Self::sync_versions).
    version_ranges: RwLock<HashMap<ApiKey, ApiVersionRange>>,

    state: Arc<Mutex<MessengerState>>,

    /// Background task reading responses.
    join_handle: JoinHandle<()>,
}

impl<RW> std::fmt::Debug for Messenger<RW> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RequestError {
    #[error("Cannot find matching version for: {api_key:?}")]
    NoVersionMatch { api_key: ApiKey },

    #[error("Cannot write data: {0}")]
    WriteError(#[from] WriteVersionedError),

    #[error("Cannot write framed message: {0}")]
    WriteMessageError(#[from] crate::protocol::frame::WriteError),

    #[error("Cannot read data: {0}")]
    ReadError(#[from] crate::protocol::traits::ReadError),

    #[error("Cannot read versioned data: {0}")]
    ReadVersionedError(#[from] ReadVersionedError),

    #[error("Cannot read/write data: {0}")]
    IO(#[from] std::io::Error),

    #[error(
        "Data left at the end of the message. Got {message_size} bytes but only read {read} bytes. api_key={api_key:?} api_version={api_version}"
    )]
    TooMuchData {
        message_size: u64,
        read: u64,
        api_key: ApiKey,
        api_version: ApiVersion,
    },

    #[error("Cannot read framed message: {0}")]
    ReadFramedMessageError(#[from] crate::protocol::frame::ReadError),

    #[error("Connection is poisoned: {0}")]
    Poisoned(Arc<RequestError>),
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncVersionsError {
    #[error("Did not found a version for ApiVersion that works with that broker")]
    NoWorkingVersion,

    #[error("Request error: {0}")]
    RequestError(#[from] RequestError),

    #[error("Got flipped version from server for API key {api_key:?}: min={min:?} max={max:?}")]
    FlippedVersionRange {
        api_key: ApiKey,
        min: ApiVersion,
        max: ApiVersion,
    },
}

impl<RW> Messenger<RW>
where
    RW: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: RW, max_message_size: usize, client_id: Arc<str>) -> Self {
        let (mut stream_read, stream_write) = tokio::io::split(stream);
        let state = Arc::new(Mutex::new(MessengerState::RequestMap(HashMap::default())));
        let state_captured = Arc::clone(&state);

        let join_handle = tokio::spawn(async move {
            loop {
                match stream_read.read_message(max_message_size).await {
                    Ok(msg) => {
                        let mut cursor = Cursor::new(msg);

                        let header = match ResponseHeader::read_versioned(
                            &mut cursor,
                            RESPONSE_HEADER_VERSION,
                        ) {
                            Ok(header) => header,
                            Err(e) => {
                                warn!(%e, "Cannot read message header, ignoring message");
                                continue;
                            }
                        };

                        let active_request = match state_captured.lock().deref_mut() {
                            MessengerState::RequestMap(map) => map.remove(&header.correlation_id),
                            MessengerState::Poison(_) => return,
                        };

                        match active_request {
                            Some(active_request) => {
                                // the caller may have been cancelled in the meantime
                                active_request.channel.send(Ok(cursor)).ok();
                            }
                            None => {
                                warn!(
                                    correlation_id = header.correlation_id,
                                    "Got response for unknown request",
                                );
                            }
                        }
                    }
                    Err(e) => {
                        state_captured
                            .lock()
                            .poison(RequestError::ReadFramedMessageError(e));
                        return;
                    }
                }
            }
        });

        Self {
            stream_write: Arc::new(AsyncMutex::new(stream_write)),
            client_id,
            correlation_id: AtomicI32::new(0),
            version_ranges: RwLock::new(HashMap::new()),
            state,
            join_handle,
        }
    }

    /// Replaces the known broker version ranges.
    pub fn set_version_ranges(&self, ranges: HashMap<ApiKey, ApiVersionRange>) {
        *self.version_ranges.write() = ranges;
    }

    pub async fn request<R>(&self, msg: R) -> Result<R::ResponseBody, RequestError>
    where
        R: RequestBody + Send + WriteVersionedType<Vec<u8>>,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>>,
    {
        let body_api_version = self
            .version_ranges
            .read()
            .get(&R::API_KEY)
            .and_then(|range_server| range_server.highest_common(&R::API_VERSION_RANGE))
            .ok_or(RequestError::NoVersionMatch {
                api_key: R::API_KEY,
            })?;

        // wrapping is fine, IDs only have to be unique among in-flight requests
        let correlation_id = self.correlation_id.fetch_add(1, Ordering::SeqCst);

        let header = RequestHeader {
            request_api_key: R::API_KEY,
            request_api_version: body_api_version,
            correlation_id,
            client_id: Some(self.client_id.to_string()),
        };

        let mut buf = Vec::new();
        header.write_versioned(&mut buf, REQUEST_HEADER_VERSION)?;
        msg.write_versioned(&mut buf, body_api_version)?;

        let (tx, rx) = channel();

        let mut cleanup_on_cancel =
            CleanupRequestStateOnCancel::new(Arc::clone(&self.state), correlation_id);

        match self.state.lock().deref_mut() {
            MessengerState::RequestMap(map) => {
                map.insert(correlation_id, ActiveRequest { channel: tx });
            }
            MessengerState::Poison(e) => {
                return Err(RequestError::Poisoned(Arc::clone(e)));
            }
        }

        self.send_message(buf).await?;
        cleanup_on_cancel.message_sent();

        let mut data = match rx.await {
            Ok(response) => response?,
            // the reader task is gone without poisoning, treat it like a broken pipe
            Err(_) => {
                return Err(RequestError::IO(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "response channel closed",
                )))
            }
        };

        let body = R::ResponseBody::read_versioned(&mut data, body_api_version)?;

        // check if we fully consumed the message, otherwise there might be a bug in our protocol code
        let read_bytes = data.position();
        let message_bytes = data.into_inner().len() as u64;
        if read_bytes != message_bytes {
            return Err(RequestError::TooMuchData {
                message_size: message_bytes,
                read: read_bytes,
                api_key: R::API_KEY,
                api_version: body_api_version,
            });
        }

        Ok(body)
    }

    async fn send_message(&self, msg: Vec<u8>) -> Result<(), RequestError> {
        match self.send_message_inner(msg).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // a partially written frame leaves the stream in an undefined state
                let e = self.state.lock().poison(e);
                Err(RequestError::Poisoned(e))
            }
        }
    }

    async fn send_message_inner(&self, msg: Vec<u8>) -> Result<(), RequestError> {
        let mut stream_write = Arc::clone(&self.stream_write).lock_owned().await;

        // Detach the write from the caller. Dropping the request future half-way
        // through a frame would corrupt the stream for everyone else.
        let fut = tokio::spawn(async move { stream_write.write_message(&msg).await });

        fut.await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(())
    }

    /// Negotiates the API versions supported by the broker.
    ///
    /// Brokers answer an `ApiVersions` request they cannot parse with a
    /// version 0 error response, so we start at our highest version and walk
    /// down until one works.
    pub async fn sync_versions(&self) -> Result<(), SyncVersionsError> {
        for upper_bound in (ApiVersionsRequest::API_VERSION_RANGE.min().0
            ..=ApiVersionsRequest::API_VERSION_RANGE.max().0)
            .rev()
        {
            self.set_version_ranges(HashMap::from([(
                ApiKey::ApiVersions,
                ApiVersionRange::new(upper_bound, upper_bound),
            )]));

            match self.request(ApiVersionsRequest).await {
                Ok(response) => {
                    if let Some(e) = response.error_code {
                        debug!(
                            %e,
                            version = upper_bound,
                            "Got error during version sync, cannot use version for ApiVersionRequest",
                        );
                        continue;
                    }

                    // check range sanity
                    for api_key in &response.api_keys {
                        if api_key.min_version.0 > api_key.max_version.0 {
                            return Err(SyncVersionsError::FlippedVersionRange {
                                api_key: api_key.api_key,
                                min: api_key.min_version,
                                max: api_key.max_version,
                            });
                        }
                    }

                    let ranges: HashMap<_, _> = response
                        .api_keys
                        .into_iter()
                        .map(|x| {
                            (
                                x.api_key,
                                ApiVersionRange::new(x.min_version.0, x.max_version.0),
                            )
                        })
                        .collect();
                    debug!(
                        versions = %sorted_ranges_repr(&ranges),
                        "Detected supported broker versions",
                    );
                    self.set_version_ranges(ranges);

                    return Ok(());
                }
                Err(RequestError::ReadVersionedError(e)) => {
                    debug!(
                        %e,
                        version = upper_bound,
                        "Cannot read ApiVersionResponse for version",
                    );
                    continue;
                }
                Err(RequestError::ReadError(e)) => {
                    debug!(
                        %e,
                        version = upper_bound,
                        "Cannot read ApiVersionResponse for version",
                    );
                    continue;
                }
                Err(e @ RequestError::TooMuchData { .. }) => {
                    debug!(
                        %e,
                        version = upper_bound,
                        "Cannot read ApiVersionResponse for version",
                    );
                    continue;
                }
                Err(e) => {
                    return Err(SyncVersionsError::RequestError(e));
                }
            }
        }

        Err(SyncVersionsError::NoWorkingVersion)
    }
}

impl<RW> Drop for Messenger<RW> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

fn sorted_ranges_repr(ranges: &HashMap<ApiKey, ApiVersionRange>) -> String {
    let mut ranges: Vec<_> = ranges.iter().map(|(key, range)| (*key, *range)).collect();
    ranges.sort_by_key(|(key, _range)| *key);
    let ranges: Vec<_> = ranges
        .into_iter()
        .map(|(key, range)| format!("{:?}: {}", key, range))
        .collect();
    ranges.join(", ")
}

/// Removes the request from the state map if the request future is dropped
/// before the message went out.
struct CleanupRequestStateOnCancel {
    state: Arc<Mutex<MessengerState>>,
    correlation_id: i32,
    message_sent: bool,
}

impl CleanupRequestStateOnCancel {
    fn new(state: Arc<Mutex<MessengerState>>, correlation_id: i32) -> Self {
        Self {
            state,
            correlation_id,
            message_sent: false,
        }
    }

    fn message_sent(&mut self) {
        self.message_sent = true;
    }
}

impl Drop for CleanupRequestStateOnCancel {
    fn drop(&mut self) {
        if !self.message_sent {
            if let MessengerState::RequestMap(map) = self.state.lock().deref_mut() {
                map.remove(&self.correlation_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use tokio::io::DuplexStream;

    use super::*;
    use crate::protocol::error::Error as ApiError;
    use crate::protocol::messages::{
        ApiVersionsResponse, ApiVersionsResponseApiKey, ListGroupsRequest, ListGroupsResponse,
    };
    use crate::protocol::traits::WriteType;

    const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

    fn messenger() -> (Messenger<DuplexStream>, DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        let messenger = Messenger::new(client, MAX_MESSAGE_SIZE, Arc::from("test"));
        (messenger, server)
    }

    async fn read_request(server: &mut DuplexStream) -> RequestHeader {
        let msg = server.read_message(MAX_MESSAGE_SIZE).await.unwrap();
        let mut cursor = Cursor::new(msg);
        RequestHeader::read_versioned(&mut cursor, REQUEST_HEADER_VERSION).unwrap()
    }

    async fn write_response(server: &mut DuplexStream, correlation_id: i32, body: &[u8]) {
        let mut msg = Vec::new();
        ResponseHeader { correlation_id }
            .write_versioned(&mut msg, RESPONSE_HEADER_VERSION)
            .unwrap();
        msg.extend_from_slice(body);
        server.write_message(&msg).await.unwrap();
    }

    fn list_groups_body(version: i16, group: &str) -> Vec<u8> {
        let mut body = Vec::new();
        if version >= 1 {
            0i32.write(&mut body).unwrap();
        }
        0i16.write(&mut body).unwrap();
        1i32.write(&mut body).unwrap();
        group.to_string().write(&mut body).unwrap();
        "consumer".to_string().write(&mut body).unwrap();
        body
    }

    #[tokio::test]
    async fn test_sync_versions_ok() {
        let (messenger, mut server) = messenger();

        let broker = tokio::spawn(async move {
            let header = read_request(&mut server).await;
            assert_eq!(header.request_api_key, ApiKey::ApiVersions);
            assert_eq!(header.request_api_version, ApiVersion(2));
            assert_eq!(header.client_id.as_deref(), Some("test"));

            let mut body = Vec::new();
            ApiVersionsResponse {
                error_code: None,
                api_keys: vec![ApiVersionsResponseApiKey {
                    api_key: ApiKey::ListGroups,
                    min_version: ApiVersion(0),
                    max_version: ApiVersion(4),
                }],
                throttle_time_ms: Some(0),
            }
            .write_versioned(&mut body, ApiVersion(2))
            .unwrap();
            write_response(&mut server, header.correlation_id, &body).await;

            // highest version we share with the broker is our own maximum
            let header = read_request(&mut server).await;
            assert_eq!(header.request_api_key, ApiKey::ListGroups);
            assert_eq!(header.request_api_version, ApiVersion(2));
            write_response(
                &mut server,
                header.correlation_id,
                &list_groups_body(2, "csmx"),
            )
            .await;
            server
        });

        messenger.sync_versions().await.unwrap();
        let resp = messenger.request(ListGroupsRequest).await.unwrap();
        assert_eq!(resp.groups.len(), 1);
        assert_eq!(resp.groups[0].group_id, "csmx");

        broker.await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_versions_falls_back() {
        let (messenger, mut server) = messenger();

        let broker = tokio::spawn(async move {
            // reject versions 2 and 1 the way old brokers do
            for want in [2, 1] {
                let header = read_request(&mut server).await;
                assert_eq!(header.request_api_version, ApiVersion(want));

                let mut body = Vec::new();
                ApiVersionsResponse {
                    error_code: Some(ApiError::UnsupportedVersion),
                    api_keys: vec![],
                    throttle_time_ms: None,
                }
                .write_versioned(&mut body, ApiVersion(0))
                .unwrap();
                write_response(&mut server, header.correlation_id, &body).await;
            }

            let header = read_request(&mut server).await;
            assert_eq!(header.request_api_version, ApiVersion(0));
            let mut body = Vec::new();
            ApiVersionsResponse {
                error_code: None,
                api_keys: vec![ApiVersionsResponseApiKey {
                    api_key: ApiKey::ListGroups,
                    min_version: ApiVersion(0),
                    max_version: ApiVersion(0),
                }],
                throttle_time_ms: None,
            }
            .write_versioned(&mut body, ApiVersion(0))
            .unwrap();
            write_response(&mut server, header.correlation_id, &body).await;
            server
        });

        messenger.sync_versions().await.unwrap();
        let _server = broker.await.unwrap();

        let ranges = messenger.version_ranges.read().clone();
        assert_eq!(
            ranges.get(&ApiKey::ListGroups),
            Some(&ApiVersionRange::new(0, 0))
        );
    }

    #[tokio::test]
    async fn test_no_version_match() {
        let (messenger, _server) = messenger();

        let err = messenger.request(ListGroupsRequest).await.unwrap_err();
        assert_matches!(
            err,
            RequestError::NoVersionMatch {
                api_key: ApiKey::ListGroups
            }
        );
    }

    #[tokio::test]
    async fn test_responses_matched_by_correlation_id() {
        let (messenger, mut server) = messenger();
        messenger.set_version_ranges(HashMap::from([(
            ApiKey::ListGroups,
            ApiVersionRange::new(0, 0),
        )]));

        let broker = tokio::spawn(async move {
            let first = read_request(&mut server).await;
            let second = read_request(&mut server).await;

            // answer in reverse order
            write_response(
                &mut server,
                second.correlation_id,
                &list_groups_body(0, "second"),
            )
            .await;
            write_response(
                &mut server,
                first.correlation_id,
                &list_groups_body(0, "first"),
            )
            .await;
            server
        });

        let (a, b) = tokio::join!(
            messenger.request(ListGroupsRequest),
            messenger.request(ListGroupsRequest)
        );
        let _server = broker.await.unwrap();

        let mut names: Vec<_> = [a.unwrap(), b.unwrap()]
            .into_iter()
            .map(|resp: ListGroupsResponse| resp.groups[0].group_id.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_too_much_data() {
        let (messenger, mut server) = messenger();
        messenger.set_version_ranges(HashMap::from([(
            ApiKey::ListGroups,
            ApiVersionRange::new(0, 0),
        )]));

        let broker = tokio::spawn(async move {
            let header = read_request(&mut server).await;
            let mut body = list_groups_body(0, "g");
            body.push(0x42);
            write_response(&mut server, header.correlation_id, &body).await;
            server
        });

        let err = messenger.request(ListGroupsRequest).await.unwrap_err();
        let _server = broker.await.unwrap();
        assert_matches!(err, RequestError::TooMuchData { .. });
    }

    #[tokio::test]
    async fn test_poison_on_eof() {
        let (messenger, mut server) = messenger();
        messenger.set_version_ranges(HashMap::from([(
            ApiKey::ListGroups,
            ApiVersionRange::new(0, 0),
        )]));

        let broker = tokio::spawn(async move {
            read_request(&mut server).await;
            drop(server);
        });

        let err = messenger.request(ListGroupsRequest).await.unwrap_err();
        assert_matches!(err, RequestError::Poisoned(_));
        broker.await.unwrap();

        // wait for the reader task to observe EOF, then everything fails fast
        tokio::time::sleep(Duration::from_millis(10)).await;
        let err = messenger.request(ListGroupsRequest).await.unwrap_err();
        assert_matches!(err, RequestError::Poisoned(_));
    }
}
