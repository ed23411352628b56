use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::{ApiVersion, ApiVersionRange};
use crate::protocol::error::Error;
use crate::protocol::messages::{
    read_versioned_array, write_versioned_array, ReadVersionedError, ReadVersionedType,
    RequestBody, WriteVersionedError, WriteVersionedType,
};
use crate::protocol::traits::{ReadType, WriteType};

/// Committed offset reported for partitions without a commit.
pub const NO_COMMITTED_OFFSET: i64 = -1;

#[derive(Debug)]
pub struct OffsetFetchRequestTopic {
    /// The topic name.
    pub name: String,

    /// The partition indexes we would like to fetch offsets for.
    pub partition_indexes: Vec<i32>,
}

impl<W> WriteVersionedType<W> for OffsetFetchRequestTopic
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!((1..=5).contains(&v));

        self.name.write(writer)?;
        self.partition_indexes.write(writer)?;

        Ok(())
    }
}

#[derive(Debug)]
pub struct OffsetFetchRequest {
    /// The group to fetch offsets for.
    pub group_id: String,

    /// Each topic we would like to fetch offsets for, or `None` to fetch
    /// offsets for all topics.
    ///
    /// `None` is only supported from version 2 on.
    pub topics: Option<Vec<OffsetFetchRequestTopic>>,
}

impl<W> WriteVersionedType<W> for OffsetFetchRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        let v = version.0;
        assert!((1..=5).contains(&v));

        if v < 2 && self.topics.is_none() {
            return Err(WriteVersionedError::FieldNotAvailable {
                version,
                field: "topics=null".to_string(),
            });
        }

        self.group_id.write(writer)?;
        write_versioned_array(writer, version, self.topics.as_deref())?;

        Ok(())
    }
}

impl RequestBody for OffsetFetchRequest {
    type ResponseBody = OffsetFetchResponse;

    const API_KEY: ApiKey = ApiKey::OffsetFetch;

    /// Version 0 reads offsets from zookeeper.
    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(1, 5);
}

#[derive(Debug, PartialEq, Eq)]
pub struct OffsetFetchResponseTopicPartition {
    /// The partition index.
    pub partition_index: i32,

    /// The committed message offset, `-1` if nothing was committed.
    pub committed_offset: i64,

    /// The leader epoch.
    ///
    /// Added in version 5
    pub committed_leader_epoch: Option<i32>,

    /// The partition metadata.
    pub metadata: Option<String>,

    /// The error code, or 0 if there was no error.
    pub error_code: Option<Error>,
}

impl<R> ReadVersionedType<R> for OffsetFetchResponseTopicPartition
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!((1..=5).contains(&v));

        let partition_index = i32::read(reader)?;
        let committed_offset = i64::read(reader)?;
        let committed_leader_epoch = (v >= 5).then(|| i32::read(reader)).transpose()?;
        let metadata = Option::<String>::read(reader)?;
        let error_code = Error::new(i16::read(reader)?);

        Ok(Self {
            partition_index,
            committed_offset,
            committed_leader_epoch,
            metadata,
            error_code,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct OffsetFetchResponseTopic {
    /// The topic name.
    pub name: String,

    /// The responses per partition
    pub partitions: Vec<OffsetFetchResponseTopicPartition>,
}

impl<R> ReadVersionedType<R> for OffsetFetchResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!((1..=5).contains(&v));

        Ok(Self {
            name: String::read(reader)?,
            partitions: read_versioned_array(reader, version)?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct OffsetFetchResponse {
    /// The duration in milliseconds for which the request was throttled due to
    /// a quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 3
    pub throttle_time_ms: Option<i32>,

    /// The responses per topic.
    pub topics: Vec<OffsetFetchResponseTopic>,

    /// The top-level error code, or 0 if there was no error.
    ///
    /// Added in version 2
    pub error_code: Option<Error>,
}

impl<R> ReadVersionedType<R> for OffsetFetchResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!((1..=5).contains(&v));

        let throttle_time_ms = (v >= 3).then(|| i32::read(reader)).transpose()?;
        let topics = read_versioned_array(reader, version)?.unwrap_or_default();
        let error_code = if v >= 2 {
            Error::new(i16::read(reader)?)
        } else {
            None
        };

        Ok(Self {
            throttle_time_ms,
            topics,
            error_code,
        })
    }
}
