use std::io::{Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::{ApiVersion, ApiVersionRange};
use crate::protocol::error::Error;
use crate::protocol::messages::{
    read_versioned_array, ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError,
    WriteVersionedType,
};
use crate::protocol::traits::ReadType;

/// Lists the groups coordinated by the receiving broker.
///
/// The request has no body before version 4 (which adds a state filter).
#[derive(Debug, Default)]
pub struct ListGroupsRequest;

impl<W> WriteVersionedType<W> for ListGroupsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        _writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        assert!(version.0 <= 2);
        Ok(())
    }
}

impl RequestBody for ListGroupsRequest {
    type ResponseBody = ListGroupsResponse;

    const API_KEY: ApiKey = ApiKey::ListGroups;

    const API_VERSION_RANGE: ApiVersionRange = ApiVersionRange::new(0, 2);
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListGroupsResponseGroup {
    /// The group ID.
    pub group_id: String,

    /// The group protocol type, `consumer` for regular consumer groups.
    pub protocol_type: String,
}

impl<R> ReadVersionedType<R> for ListGroupsResponseGroup
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        assert!(version.0 <= 2);

        Ok(Self {
            group_id: String::read(reader)?,
            protocol_type: String::read(reader)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ListGroupsResponse {
    /// The duration in milliseconds for which the request was throttled due to a
    /// quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 1
    pub throttle_time_ms: Option<i32>,

    /// The error code, or 0 if there was no error.
    pub error_code: Option<Error>,

    /// Each group in the response.
    pub groups: Vec<ListGroupsResponseGroup>,
}

impl<R> ReadVersionedType<R> for ListGroupsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0;
        assert!(v <= 2);

        let throttle_time_ms = (v >= 1).then(|| i32::read(reader)).transpose()?;
        let error_code = Error::new(i16::read(reader)?);
        let groups = read_versioned_array(reader, version)?.unwrap_or_default();

        Ok(Self {
            throttle_time_ms,
            error_code,
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::test_utils::assert_read_versioned;

    #[test]
    fn response_v0() {
        let data = [
            0x00, 0x00, // no error
            0x00, 0x00, 0x00, 0x02, // 2 groups
            0x00, 0x03, b'f', b'o', b'o', // group name
            0x00, 0x08, b'c', b'o', b'n', b's', b'u', b'm', b'e', b'r', // protocol type
            0x00, 0x03, b'b', b'a', b'r', // group name
            0x00, 0x07, b'c', b'o', b'n', b'n', b'e', b'c', b't', // protocol type
        ];

        assert_read_versioned!(
            ListGroupsResponse,
            data,
            0,
            ListGroupsResponse {
                throttle_time_ms: None,
                error_code: None,
                groups: vec![
                    ListGroupsResponseGroup {
                        group_id: "foo".to_string(),
                        protocol_type: "consumer".to_string(),
                    },
                    ListGroupsResponseGroup {
                        group_id: "bar".to_string(),
                        protocol_type: "connect".to_string(),
                    },
                ],
            }
        );
    }

    #[test]
    fn response_v1_error() {
        let data = [
            0x00, 0x00, 0x00, 0x0a, // throttle time
            0x00, 0x1f, // cluster authorization failed
            0x00, 0x00, 0x00, 0x00, // no groups
        ];

        assert_read_versioned!(
            ListGroupsResponse,
            data,
            1,
            ListGroupsResponse {
                throttle_time_ms: Some(10),
                error_code: Some(Error::ClusterAuthorizationFailed),
                groups: vec![],
            }
        );
    }
}
