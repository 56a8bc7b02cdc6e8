//! A silent no-op [`CfuWriter`] for use as a test double.
//!
//! [`crate::CfuWriterDefault`] logs fake reads/writes and is useful for exercising the host
//! driver against something that talks back; this one does nothing and returns immediately,
//! which is preferable when a test only cares about the engine/registry state and would
//! otherwise be drowned in fake-transport log lines.

use crate::{CfuWriter, CfuWriterError};

#[derive(Copy, Clone, Debug, Default)]
pub struct CfuWriterNop;

impl CfuWriter for CfuWriterNop {
    async fn cfu_write_read(&self, _mem_offset: Option<usize>, _data: &[u8], _read: &mut [u8]) -> Result<(), CfuWriterError> {
        Ok(())
    }

    async fn cfu_read(&self, _mem_offset: Option<usize>, _read: &mut [u8]) -> Result<(), CfuWriterError> {
        Ok(())
    }

    async fn cfu_write(&self, _mem_offset: Option<usize>, _data: &[u8]) -> Result<(), CfuWriterError> {
        Ok(())
    }
}
