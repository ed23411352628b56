//! Error codes returned by brokers.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_error_codes>

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[non_exhaustive]
pub enum Error {
    #[error("The server experienced an unexpected error when processing the request")]
    UnknownServerError,

    #[error("The requested offset is not within the range of offsets maintained by the server")]
    OffsetOutOfRange,

    #[error("This message has failed its CRC checksum, exceeds the valid size, has a null key for a compacted topic, or is otherwise corrupt")]
    CorruptMessage,

    #[error("This server does not host this topic-partition")]
    UnknownTopicOrPartition,

    #[error("The requested fetch size is invalid")]
    InvalidFetchSize,

    #[error("There is no leader for this topic-partition as we are in the middle of a leadership election")]
    LeaderNotAvailable,

    #[error("For requests intended only for the leader, this error indicates that the broker is not the current leader")]
    NotLeaderOrFollower,

    #[error("The request timed out")]
    RequestTimedOut,

    #[error("The broker is not available")]
    BrokerNotAvailable,

    #[error("The replica is not available for the requested topic-partition")]
    ReplicaNotAvailable,

    #[error("The request included a message larger than the max message size the server will accept")]
    MessageTooLarge,

    #[error("The controller moved to another broker")]
    StaleControllerEpoch,

    #[error("The metadata field of the offset request was too large")]
    OffsetMetadataTooLarge,

    #[error("The server disconnected before a response was received")]
    NetworkException,

    #[error("The coordinator is loading and hence can't process requests")]
    CoordinatorLoadInProgress,

    #[error("The coordinator is not available")]
    CoordinatorNotAvailable,

    #[error("This is not the correct coordinator")]
    NotCoordinator,

    #[error("The request attempted to perform an operation on an invalid topic")]
    InvalidTopicException,

    #[error("The request included message batch larger than the configured segment size on the server")]
    RecordListTooLarge,

    #[error("Messages are rejected since there are fewer in-sync replicas than required")]
    NotEnoughReplicas,

    #[error("Messages are written to the log, but to fewer in-sync replicas than required")]
    NotEnoughReplicasAfterAppend,

    #[error("Produce request specified an invalid value for required acks")]
    InvalidRequiredAcks,

    #[error("Specified group generation id is not valid")]
    IllegalGeneration,

    #[error("The group member's supported protocols are incompatible with those of existing members")]
    InconsistentGroupProtocol,

    #[error("The configured groupId is invalid")]
    InvalidGroupId,

    #[error("The coordinator is not aware of this member")]
    UnknownMemberId,

    #[error("The session timeout is not within the range allowed by the broker")]
    InvalidSessionTimeout,

    #[error("The group is rebalancing, so a rejoin is needed")]
    RebalanceInProgress,

    #[error("The committing offset data size is not valid")]
    InvalidCommitOffsetSize,

    #[error("Topic authorization failed")]
    TopicAuthorizationFailed,

    #[error("Group authorization failed")]
    GroupAuthorizationFailed,

    #[error("Cluster authorization failed")]
    ClusterAuthorizationFailed,

    #[error("The timestamp of the message is out of acceptable range")]
    InvalidTimestamp,

    #[error("The broker does not support the requested SASL mechanism")]
    UnsupportedSaslMechanism,

    #[error("Request is not valid given the current SASL state")]
    IllegalSaslState,

    #[error("The version of API is not supported")]
    UnsupportedVersion,

    #[error("This is not the correct controller for this cluster")]
    NotController,

    #[error("The request is malformed or its parameters are invalid")]
    InvalidRequest,

    #[error("The group id does not exist")]
    GroupIdNotFound,

    #[error("There are unstable offsets that need to be cleared")]
    UnstableOffsetCommit,

    #[error("Unknown error code {0}")]
    Unknown(i16),
}

impl Error {
    /// Maps a wire error code to an error. `0` means "no error".
    pub fn new(code: i16) -> Option<Self> {
        match code {
            0 => None,
            -1 => Some(Self::UnknownServerError),
            1 => Some(Self::OffsetOutOfRange),
            2 => Some(Self::CorruptMessage),
            3 => Some(Self::UnknownTopicOrPartition),
            4 => Some(Self::InvalidFetchSize),
            5 => Some(Self::LeaderNotAvailable),
            6 => Some(Self::NotLeaderOrFollower),
            7 => Some(Self::RequestTimedOut),
            8 => Some(Self::BrokerNotAvailable),
            9 => Some(Self::ReplicaNotAvailable),
            10 => Some(Self::MessageTooLarge),
            11 => Some(Self::StaleControllerEpoch),
            12 => Some(Self::OffsetMetadataTooLarge),
            13 => Some(Self::NetworkException),
            14 => Some(Self::CoordinatorLoadInProgress),
            15 => Some(Self::CoordinatorNotAvailable),
            16 => Some(Self::NotCoordinator),
            17 => Some(Self::InvalidTopicException),
            18 => Some(Self::RecordListTooLarge),
            19 => Some(Self::NotEnoughReplicas),
            20 => Some(Self::NotEnoughReplicasAfterAppend),
            21 => Some(Self::InvalidRequiredAcks),
            22 => Some(Self::IllegalGeneration),
            23 => Some(Self::InconsistentGroupProtocol),
            24 => Some(Self::InvalidGroupId),
            25 => Some(Self::UnknownMemberId),
            26 => Some(Self::InvalidSessionTimeout),
            27 => Some(Self::RebalanceInProgress),
            28 => Some(Self::InvalidCommitOffsetSize),
            29 => Some(Self::TopicAuthorizationFailed),
            30 => Some(Self::GroupAuthorizationFailed),
            31 => Some(Self::ClusterAuthorizationFailed),
            32 => Some(Self::InvalidTimestamp),
            33 => Some(Self::UnsupportedSaslMechanism),
            34 => Some(Self::IllegalSaslState),
            35 => Some(Self::UnsupportedVersion),
            41 => Some(Self::NotController),
            42 => Some(Self::InvalidRequest),
            69 => Some(Self::GroupIdNotFound),
            88 => Some(Self::UnstableOffsetCommit),
            _ => Some(Self::Unknown(code)),
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            Self::UnknownServerError => -1,
            Self::OffsetOutOfRange => 1,
            Self::CorruptMessage => 2,
            Self::UnknownTopicOrPartition => 3,
            Self::InvalidFetchSize => 4,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderOrFollower => 6,
            Self::RequestTimedOut => 7,
            Self::BrokerNotAvailable => 8,
            Self::ReplicaNotAvailable => 9,
            Self::MessageTooLarge => 10,
            Self::StaleControllerEpoch => 11,
            Self::OffsetMetadataTooLarge => 12,
            Self::NetworkException => 13,
            Self::CoordinatorLoadInProgress => 14,
            Self::CoordinatorNotAvailable => 15,
            Self::NotCoordinator => 16,
            Self::InvalidTopicException => 17,
            Self::RecordListTooLarge => 18,
            Self::NotEnoughReplicas => 19,
            Self::NotEnoughReplicasAfterAppend => 20,
            Self::InvalidRequiredAcks => 21,
            Self::IllegalGeneration => 22,
            Self::InconsistentGroupProtocol => 23,
            Self::InvalidGroupId => 24,
            Self::UnknownMemberId => 25,
            Self::InvalidSessionTimeout => 26,
            Self::RebalanceInProgress => 27,
            Self::InvalidCommitOffsetSize => 28,
            Self::TopicAuthorizationFailed => 29,
            Self::GroupAuthorizationFailed => 30,
            Self::ClusterAuthorizationFailed => 31,
            Self::InvalidTimestamp => 32,
            Self::UnsupportedSaslMechanism => 33,
            Self::IllegalSaslState => 34,
            Self::UnsupportedVersion => 35,
            Self::NotController => 41,
            Self::InvalidRequest => 42,
            Self::GroupIdNotFound => 69,
            Self::UnstableOffsetCommit => 88,
            Self::Unknown(code) => *code,
        }
    }
}
