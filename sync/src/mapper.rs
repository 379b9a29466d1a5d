use crate::error::SyncResult;
use crate::types::Message;

/// Message-level transform applied between the source and the destination.
///
/// Returning [`None`] drops the message. The pipeline applies the mapper after
/// status tracking, so dropped messages still count towards stream state.
pub trait MessageMapper {
    fn map(&self, message: Message) -> SyncResult<Option<Message>>;
}

/// Mapper that forwards every message untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl MessageMapper for IdentityMapper {
    fn map(&self, message: Message) -> SyncResult<Option<Message>> {
        Ok(Some(message))
    }
}
