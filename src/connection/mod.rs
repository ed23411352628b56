//! Broker connections and cluster topology.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::BufStream;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::messenger::{Messenger, RequestError, SyncVersionsError};
use crate::protocol::messages::{
    MetadataRequest, MetadataRequestTopic, MetadataResponse, MetadataResponseBroker,
};

mod topology;

pub use topology::{Broker, BrokerTopology};

pub type MessengerTransport = Messenger<BufStream<TcpStream>>;

pub type BrokerConnection = Arc<MessengerTransport>;

/// Time allowed to open a connection and negotiate API versions.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Cannot connect to broker {broker}: {source}")]
    Transport {
        broker: String,
        source: std::io::Error,
    },

    #[error("Cannot sync versions with broker {broker}: {source}")]
    SyncVersions {
        broker: String,
        source: SyncVersionsError,
    },

    #[error("Metadata request to broker {broker} failed: {source}")]
    Metadata {
        broker: String,
        source: RequestError,
    },

    #[error("No broker reachable, last error: {0}")]
    NoBrokerReachable(Box<Error>),

    #[error("No bootstrap brokers configured")]
    NoBootstrapBrokers,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Whether a request failure means the connection itself is unusable.
pub(crate) fn is_connection_broken(e: &RequestError) -> bool {
    matches!(e, RequestError::Poisoned(_) | RequestError::IO(_))
}

/// Caches one connection per broker and keeps track of the cluster topology.
#[derive(Debug)]
pub struct BrokerConnector {
    /// Seed addresses, used when none of the known brokers answers.
    bootstrap_brokers: Vec<String>,

    client_id: Arc<str>,

    pub(crate) topology: BrokerTopology,

    /// Open connections keyed by broker ID.
    connections: Mutex<HashMap<i32, BrokerConnection>>,

    max_message_size: usize,

    connect_timeout: Duration,
}

impl BrokerConnector {
    pub fn new(bootstrap_brokers: Vec<String>, client_id: Arc<str>, max_message_size: usize) -> Self {
        Self {
            bootstrap_brokers,
            client_id,
            topology: BrokerTopology::default(),
            connections: Mutex::new(HashMap::new()),
            max_message_size,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Requests metadata from the first broker that answers and replaces the
    /// topology with the brokers it reports.
    ///
    /// Known brokers are tried first, then the bootstrap brokers in order.
    /// `None` asks for all topics.
    pub async fn request_metadata(&self, topics: Option<Vec<String>>) -> Result<MetadataResponse> {
        if self.bootstrap_brokers.is_empty() && self.topology.is_empty() {
            return Err(Error::NoBootstrapBrokers);
        }

        let mut last_error = None;

        for broker in self.topology.get_brokers() {
            let result = match self.connect(broker.id).await {
                Ok(Some(conn)) => metadata(&conn, topics.clone()).await.map_err(|source| {
                    if is_connection_broken(&source) {
                        self.invalidate(broker.id, "metadata request failed");
                    }
                    Error::Metadata {
                        broker: broker.to_string(),
                        source,
                    }
                }),
                Ok(None) => continue,
                Err(e) => Err(e),
            };

            match result {
                Ok(response) => {
                    self.update_topology(&response.brokers);
                    return Ok(response);
                }
                Err(e) => {
                    warn!(broker = %broker, e = %e, "Metadata request failed, trying next broker");
                    last_error = Some(e);
                }
            }
        }

        for addr in &self.bootstrap_brokers {
            let result = match self.connect_addr(addr).await {
                Ok(conn) => metadata(&conn, topics.clone())
                    .await
                    .map_err(|source| Error::Metadata {
                        broker: addr.clone(),
                        source,
                    }),
                Err(e) => Err(e),
            };

            match result {
                Ok(response) => {
                    self.update_topology(&response.brokers);
                    return Ok(response);
                }
                Err(e) => {
                    warn!(broker = %addr, e = %e, "Bootstrap broker failed, trying next one");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::NoBrokerReachable(Box::new(
            last_error.unwrap_or(Error::NoBootstrapBrokers),
        )))
    }

    /// Returns a connection to the given broker, opening one if needed.
    ///
    /// Returns `None` if the broker is not part of the current topology.
    pub async fn connect(&self, broker_id: i32) -> Result<Option<BrokerConnection>> {
        if let Some(conn) = self.cached(broker_id) {
            return Ok(Some(conn));
        }

        let Some(broker) = self.topology.get_broker(broker_id) else {
            debug!(broker = broker_id, "Broker not found in topology");
            return Ok(None);
        };

        let conn = self.connect_addr(&broker.to_string()).await?;

        // a concurrent caller may have connected in the meantime, keep theirs
        let conn = Arc::clone(self.connections.lock().entry(broker_id).or_insert(conn));
        Ok(Some(conn))
    }

    /// Drops the cached connection to a broker, the next request reconnects.
    pub fn invalidate(&self, broker_id: i32, reason: &'static str) {
        if self.connections.lock().remove(&broker_id).is_some() {
            info!(broker = broker_id, reason, "Invalidating cached broker connection");
        }
    }

    /// Replaces the topology and drops connections to brokers that left or moved.
    fn update_topology(&self, brokers: &[MetadataResponseBroker]) {
        for broker_id in self.topology.update(brokers) {
            self.invalidate(broker_id, "broker left the cluster or moved");
        }
    }

    fn cached(&self, broker_id: i32) -> Option<BrokerConnection> {
        self.connections.lock().get(&broker_id).cloned()
    }

    async fn connect_addr(&self, addr: &str) -> Result<BrokerConnection> {
        info!(broker = addr, "Establishing new connection");

        match tokio::time::timeout(self.connect_timeout, self.connect_addr_inner(addr)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Transport {
                broker: addr.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no answer within {:?}", self.connect_timeout),
                ),
            }),
        }
    }

    async fn connect_addr_inner(&self, addr: &str) -> Result<BrokerConnection> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| Error::Transport {
                broker: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true).map_err(|source| Error::Transport {
            broker: addr.to_string(),
            source,
        })?;

        let messenger = Messenger::new(
            BufStream::new(stream),
            self.max_message_size,
            Arc::clone(&self.client_id),
        );
        messenger
            .sync_versions()
            .await
            .map_err(|source| Error::SyncVersions {
                broker: addr.to_string(),
                source,
            })?;

        Ok(Arc::new(messenger))
    }
}

async fn metadata(
    conn: &MessengerTransport,
    topics: Option<Vec<String>>,
) -> Result<MetadataResponse, RequestError> {
    conn.request(MetadataRequest {
        topics: topics.map(|topics| {
            topics
                .into_iter()
                .map(|name| MetadataRequestTopic { name })
                .collect()
        }),
        allow_auto_topic_creation: None,
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;
    use tokio::net::TcpListener;

    use super::*;
    use crate::protocol::api_key::ApiKey;
    use crate::protocol::api_version::ApiVersion;
    use crate::protocol::frame::{AsyncMessageRead, AsyncMessageWrite};
    use crate::protocol::messages::{
        ApiVersionsResponse, ApiVersionsResponseApiKey, ReadVersionedType, RequestHeader,
        ResponseHeader, WriteVersionedType,
    };
    use crate::protocol::traits::WriteType;

    /// Answers `ApiVersions` and `Metadata` (version 1), announcing itself as broker 1.
    async fn fake_broker() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    while let Ok(msg) = stream.read_message(1024 * 1024).await {
                        let mut cursor = Cursor::new(msg);
                        let header =
                            RequestHeader::read_versioned(&mut cursor, ApiVersion(1)).unwrap();

                        let mut body = Vec::new();
                        ResponseHeader {
                            correlation_id: header.correlation_id,
                        }
                        .write_versioned(&mut body, ApiVersion(0))
                        .unwrap();

                        match header.request_api_key {
                            ApiKey::ApiVersions => ApiVersionsResponse {
                                error_code: None,
                                api_keys: vec![ApiVersionsResponseApiKey {
                                    api_key: ApiKey::Metadata,
                                    min_version: ApiVersion(0),
                                    max_version: ApiVersion(1),
                                }],
                                throttle_time_ms: Some(0),
                            }
                            .write_versioned(&mut body, header.request_api_version)
                            .unwrap(),
                            ApiKey::Metadata => {
                                assert_eq!(header.request_api_version, ApiVersion(1));
                                1i32.write(&mut body).unwrap(); // 1 broker
                                1i32.write(&mut body).unwrap(); // node id
                                "127.0.0.1".to_string().write(&mut body).unwrap();
                                i32::from(addr.port()).write(&mut body).unwrap();
                                None::<String>.write(&mut body).unwrap(); // rack
                                1i32.write(&mut body).unwrap(); // controller id
                                0i32.write(&mut body).unwrap(); // no topics
                            }
                            other => panic!("unexpected request {other:?}"),
                        }

                        stream.write_message(&body).await.unwrap();
                    }
                });
            }
        });

        addr.to_string()
    }

    async fn dead_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    fn connector(seeds: Vec<String>) -> BrokerConnector {
        BrokerConnector::new(seeds, Arc::from("test"), 1024 * 1024)
            .with_connect_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_bootstrap_tries_seeds_in_order() {
        let live = fake_broker().await;
        let connector = connector(vec![dead_addr().await, live.clone()]);

        let response = connector.request_metadata(None).await.unwrap();
        assert_eq!(response.controller_id, 1);

        let brokers = connector.topology.get_brokers();
        assert_eq!(brokers.len(), 1);
        assert_eq!(brokers[0].to_string(), live);
    }

    #[tokio::test]
    async fn test_connections_are_cached() {
        let live = fake_broker().await;
        let connector = connector(vec![live]);
        connector.request_metadata(None).await.unwrap();

        let a = connector.connect(1).await.unwrap().unwrap();
        let b = connector.connect(1).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        connector.invalidate(1, "test");
        let c = connector.connect(1).await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));

        assert!(connector.connect(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_topology_change_drops_connections() {
        let live = fake_broker().await;
        let connector = connector(vec![live.clone()]);
        connector.request_metadata(None).await.unwrap();

        let a = connector.connect(1).await.unwrap().unwrap();

        // same address again, connection survives
        connector.request_metadata(None).await.unwrap();
        let b = connector.connect(1).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        // broker left the cluster
        connector.update_topology(&[]);
        assert!(connector.cached(1).is_none());
        assert!(connector.connect(1).await.unwrap().is_none());

        connector.request_metadata(None).await.unwrap();
        let c = connector.connect(1).await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));

        // broker came back under another address
        connector.update_topology(&[MetadataResponseBroker {
            node_id: 1,
            host: "127.0.0.2".to_string(),
            port: 9092,
            rack: None,
        }]);
        assert!(connector.cached(1).is_none());
    }

    #[tokio::test]
    async fn test_no_broker_reachable() {
        let connector = connector(vec![dead_addr().await]);

        let err = connector.request_metadata(None).await.unwrap_err();
        assert_matches!(err, Error::NoBrokerReachable(inner) => {
            assert_matches!(*inner, Error::Transport { .. });
        });
    }

    #[tokio::test]
    async fn test_no_bootstrap_brokers() {
        let connector = connector(vec![]);

        let err = connector.request_metadata(None).await.unwrap_err();
        assert_matches!(err, Error::NoBootstrapBrokers);
    }
}
