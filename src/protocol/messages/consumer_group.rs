//! Embedded protocol of the `consumer` group type.
//!
//! Group coordinators treat member metadata as opaque bytes; consumers encode
//! their subscription into it.
//!
//! # References
//! - <https://github.com/apache/kafka/blob/trunk/clients/src/main/resources/common/message/ConsumerProtocolSubscription.json>

use std::io::{Read, Write};

use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};
use crate::protocol::vec_builder::VecBuilder;

/// Protocol type advertised by regular consumer groups.
pub const CONSUMER_PROTOCOL_TYPE: &str = "consumer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPartition {
    pub topic: String,
    pub partitions: Vec<i32>,
}

impl<R> ReadType<R> for OwnedPartition
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            topic: String::read(reader)?,
            partitions: Vec::<i32>::read(reader)?,
        })
    }
}

impl<W> WriteType<W> for OwnedPartition
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.topic.write(writer)?;
        self.partitions.write(writer)
    }
}

/// Subscription of one consumer group member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroupMemberMetadata {
    pub version: i16,
    // Version >= 0
    pub topics: Vec<String>,
    // Version >= 0
    pub user_data: Vec<u8>,
    // Version >= 1
    pub owned_partitions: Vec<OwnedPartition>,
    // Version >= 2
    pub generation_id: i32,
    // Version >= 3
    pub rack_id: Option<String>,
}

impl ConsumerGroupMemberMetadata {
    /// Decodes the metadata blob of a group member.
    ///
    /// Newer versions only append fields, so bytes past the last known field
    /// are ignored.
    pub fn decode(mut data: &[u8]) -> Result<Self, ReadError> {
        Self::read(&mut data)
    }
}

impl<R> ReadType<R> for ConsumerGroupMemberMetadata
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let version = i16::read(reader)?;
        if version < 0 {
            return Err(ReadError::Malformed(
                format!("Invalid subscription version: {version}").into(),
            ));
        }

        let topics = Vec::<String>::read(reader)?;
        // nullable, a null blob reads as empty
        let user_data = match i32::read(reader)? {
            -1 => vec![],
            len => {
                let len = usize::try_from(len)?;
                VecBuilder::new(len).read_exact(reader)?.into()
            }
        };

        let owned_partitions = if version >= 1 {
            let len = usize::try_from(i32::read(reader)?)?;
            let mut owned = VecBuilder::new(len);
            for _ in 0..len {
                owned.push(OwnedPartition::read(reader)?);
            }
            owned.into()
        } else {
            vec![]
        };

        let generation_id = if version >= 2 { i32::read(reader)? } else { -1 };

        let rack_id = if version >= 3 {
            Option::<String>::read(reader)?
        } else {
            None
        };

        Ok(Self {
            version,
            topics,
            user_data,
            owned_partitions,
            generation_id,
            rack_id,
        })
    }
}

impl<W: Write> WriteType<W> for ConsumerGroupMemberMetadata {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.version.write(writer)?;
        self.topics.write(writer)?;
        self.user_data.write(writer)?;

        if self.version >= 1 {
            let len = i32::try_from(self.owned_partitions.len())?;
            len.write(writer)?;

            for op in &self.owned_partitions {
                op.write(writer)?;
            }
        }

        if self.version >= 2 {
            self.generation_id.write(writer)?;
        }

        if self.version >= 3 {
            self.rack_id.write(writer)?;
        }

        Ok(())
    }
}
