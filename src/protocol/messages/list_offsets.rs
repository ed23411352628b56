//! `ListOffsets` request and response.
//!
//! # References
//! - [KIP-79](https://cwiki.apache.org/confluence/pages/viewpage.action?pageId=65868090)
//! - [KIP-98](https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging)
use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    messages::{read_versioned_array, write_versioned_array},
    traits::{ReadType, WriteType},
};

use super::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
};

/// Timestamp asking for the offset of the next message to be produced.
pub const LATEST_TIMESTAMP: i64 = -1;

/// Timestamp asking for the earliest retained offset.
pub const EARLIEST_TIMESTAMP: i64 = -2;

/// Controls the visibility of transactional records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    #[default]
    ReadUncommitted,
    ReadCommitted,
}

impl From<IsolationLevel> for i8 {
    fn from(level: IsolationLevel) -> Self {
        match level {
            IsolationLevel::ReadUncommitted => 0,
            IsolationLevel::ReadCommitted => 1,
        }
    }
}

#[derive(Debug)]
#[allow(missing_copy_implementations)]
pub struct ListOffsetsRequestPartition {
    /// The partition index.
    pub partition_index: i32,

    /// Returns the timestamp and offset of the first message greater/equal than this timestamp.
    ///
    /// Per [KIP-79] this can have the following special values:
    ///
    /// - `-1`: latest offset
    /// - `-2`: earlist offset
    ///
    /// [KIP-79]: https://cwiki.apache.org/confluence/pages/viewpage.action?pageId=65868090
    pub timestamp: i64,
}

impl<W> WriteVersionedType<W> for ListOffsetsRequestPartition
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!((1..=3).contains(&v));

        self.partition_index.write(writer)?;
        self.timestamp.write(writer)?;

        Ok(())
    }
}

#[derive(Debug)]
pub struct ListOffsetsRequestTopic {
    /// The topic name.
    pub name: String,

    /// Each partition in the request.
    ///
    /// Note: A partition may only appear once within the request.
    pub partitions: Vec<ListOffsetsRequestPartition>,
}

impl<W> WriteVersionedType<W> for ListOffsetsRequestTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!((1..=3).contains(&v));

        self.name.write(writer)?;
        write_versioned_array(writer, version, Some(&self.partitions))?;

        Ok(())
    }
}

#[derive(Debug)]
pub struct ListOffsetsRequest {
    /// The broker ID of the requestor, or -1 if this request is being made by a normal consumer.
    pub replica_id: i32,

    /// This setting controls the visibility of transactional records.
    ///
    /// As per [KIP-98] the default is `READ_UNCOMMITTED`.
    ///
    /// Added in version 2.
    ///
    /// [KIP-98]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging
    pub isolation_level: Option<IsolationLevel>,

    /// Each topic in the request.
    ///
    /// Note: A topic may only appear once within the request.
    pub topics: Vec<ListOffsetsRequestTopic>,
}

impl<W> WriteVersionedType<W> for ListOffsetsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!((1..=3).contains(&v));

        self.replica_id.write(writer)?;

        if v >= 2 {
            let level: i8 = self.isolation_level.unwrap_or_default().into();
            level.write(writer)?;
        }

        write_versioned_array(writer, version, Some(&self.topics))?;

        Ok(())
    }
}

impl RequestBody for ListOffsetsRequest {
    type ResponseBody = ListOffsetsResponse;

    const API_KEY: ApiKey = ApiKey::ListOffsets;

    /// Version 0 returns offset lists instead of a single offset.
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(1, 3);
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListOffsetsResponsePartition {
    /// The partition index.
    pub partition_index: i32,

    /// The partition error code, or 0 if there was no error.
    pub error_code: Option<ApiError>,

    /// The timestamp associated with the returned offset.
    pub timestamp: i64,

    /// The returned offset.
    pub offset: i64,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponsePartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!((1..=3).contains(&v));

        Ok(Self {
            partition_index: i32::read(reader)?,
            error_code: ApiError::new(i16::read(reader)?),
            timestamp: i64::read(reader)?,
            offset: i64::read(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListOffsetsResponseTopic {
    /// The topic name.
    pub name: String,

    /// Each partition in the response.
    pub partitions: Vec<ListOffsetsResponsePartition>,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!((1..=3).contains(&v));

        Ok(Self {
            name: String::read(reader)?,
            partitions: read_versioned_array(reader, version)?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListOffsetsResponse {
    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 2.
    pub throttle_time_ms: Option<i32>,

    /// Each topic in the response.
    pub topics: Vec<ListOffsetsResponseTopic>,
}

impl<R> ReadVersionedType<R> for ListOffsetsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!((1..=3).contains(&v));

        Ok(Self {
            throttle_time_ms: (v >= 2).then(|| i32::read(reader)).transpose()?,
            topics: read_versioned_array(reader, version)?.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn request() {
        for (name, version, req, want) in [
            (
                "no blocks",
                1,
                ListOffsetsRequest {
                    replica_id: -1,
                    isolation_level: None,
                    topics: vec![],
                },
                [0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00].as_ref(),
            ),
            (
                "one block",
                1,
                ListOffsetsRequest {
                    replica_id: -1,
                    isolation_level: None,
                    topics: vec![ListOffsetsRequestTopic {
                        name: "bar".to_string(),
                        partitions: vec![ListOffsetsRequestPartition {
                            partition_index: 4,
                            timestamp: 1,
                        }],
                    }],
                },
                [
                    0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x01, 0x00, 0x03, b'b', b'a', b'r',
                    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00,
                    0x00, 0x00, 0x01,
                ]
                .as_ref(),
            ),
            (
                "no blocks",
                2,
                ListOffsetsRequest {
                    replica_id: -1,
                    isolation_level: None,
                    topics: vec![],
                },
                [0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00].as_ref(),
            ),
            (
                "latest offset",
                2,
                ListOffsetsRequest {
                    replica_id: -1,
                    isolation_level: Some(IsolationLevel::ReadCommitted),
                    topics: vec![ListOffsetsRequestTopic {
                        name: "bar".to_string(),
                        partitions: vec![ListOffsetsRequestPartition {
                            partition_index: 4,
                            timestamp: LATEST_TIMESTAMP,
                        }],
                    }],
                },
                [
                    0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x03, b'b', b'a',
                    b'r', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xFF,
                    0xFF, 0xFF, 0xFF, 0xFF,
                ]
                .as_ref(),
            ),
            (
                "with replica id",
                3,
                ListOffsetsRequest {
                    replica_id: 42,
                    isolation_level: None,
                    topics: vec![],
                },
                [0x00, 0x00, 0x00, 0x2a, 0x00, 0x00, 0x00, 0x00, 0x00].as_ref(),
            ),
        ] {
            let mut buf = Vec::new();
            req.write_versioned(&mut buf, ApiVersion(version)).unwrap();
            assert_eq!(buf.as_slice(), want, "{name}/{version}");
        }
    }

    #[test]
    fn response() {
        for (name, version, want, data) in [
            (
                "empty",
                1,
                ListOffsetsResponse {
                    throttle_time_ms: None,
                    topics: vec![],
                },
                [0x00, 0x00, 0x00, 0x00].as_ref(),
            ),
            (
                "normal",
                1,
                ListOffsetsResponse {
                    throttle_time_ms: None,
                    topics: vec![
                        ListOffsetsResponseTopic {
                            name: "a".to_string(),
                            partitions: vec![],
                        },
                        ListOffsetsResponseTopic {
                            name: "z".to_string(),
                            partitions: vec![ListOffsetsResponsePartition {
                                partition_index: 2,
                                error_code: None,
                                timestamp: 1477920049286,
                                offset: 6,
                            }],
                        },
                    ],
                },
                [
                    0x00, 0x00, 0x00, 0x02, 0x00, 0x01, b'a', 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
                    b'z', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
                    0x01, 0x58, 0x1A, 0xE6, 0x48, 0x86, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                    0x06,
                ]
                .as_ref(),
            ),
            (
                "throttled",
                2,
                ListOffsetsResponse {
                    throttle_time_ms: Some(100),
                    topics: vec![ListOffsetsResponseTopic {
                        name: "z".to_string(),
                        partitions: vec![ListOffsetsResponsePartition {
                            partition_index: 0,
                            error_code: Some(ApiError::NotLeaderOrFollower),
                            timestamp: -1,
                            offset: -1,
                        }],
                    }],
                },
                [
                    0x00, 0x00, 0x00, 0x64, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, b'z', 0x00, 0x00,
                    0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
                    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
                ]
                .as_ref(),
            ),
        ] {
            let mut reader = Cursor::new(data);
            let resp =
                ListOffsetsResponse::read_versioned(&mut reader, ApiVersion(version)).unwrap();
            assert_eq!(resp, want, "{name}/{version}");
        }
    }
}
