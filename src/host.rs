use binary_serde::{BinarySerde, DeserializeError, Endianness};

use super::*;
use crate::config::HostConfig;

/// CfuHostStates trait defines behavior needed for a Cfu Host to process available Cfu Offers
/// and send the appropriate commands to the Cfu Client to update the components
pub trait CfuHostStates {
    /// Notifies that the host is now initialized and has identified the offers to send
    fn start_transaction<W: CfuWriter>(
        self,
        writer: &mut W,
    ) -> impl Future<Output = Result<FwUpdateOfferResponse, CfuProtocolError>>;
    /// Notifies the primary component that the host is ready to start sending offers
    fn notify_start_offer_list<W: CfuWriter>(
        self,
        writer: &mut W,
    ) -> impl Future<Output = Result<FwUpdateOfferResponse, CfuProtocolError>>;
    /// Notifies the primary component that the host has sent all offers
    fn notify_end_offer_list<W: CfuWriter>(
        self,
        writer: &mut W,
    ) -> impl Future<Output = Result<FwUpdateOfferResponse, CfuProtocolError>>;
    /// For a slice of responses, determine if any components have not finished updating
    fn verify_all_updates_completed(
        offer_responses: &[FwUpdateOfferResponse],
    ) -> impl Future<Output = Result<bool, CfuProtocolError>>;
}

/// CfuUpdateContent trait defines behavior needed for a Cfu Host to send the contents of an accepted offer to a component via sending commands to a Cfu Client
pub trait CfuUpdateContent<W>
where
    W: CfuWriter,
{
    /// Write all chunks of an image
    fn write_data_chunks(
        &mut self,
        writer: &mut W,
        image: impl CfuImage,
        cmpt_id: ComponentId,
        base_offset: usize,
    ) -> impl Future<Output = Result<FwUpdateContentResponse, CfuProtocolError>>;
    /// Build and send UpdateOfferContent command with first block flag
    fn process_first_data_block(
        &mut self,
        w: &mut W,
        chunk: DataChunk,
    ) -> impl Future<Output = Result<FwUpdateContentResponse, CfuWriterError>>;
    /// Build and send UpdateOfferContent command, no special flags
    fn process_middle_data_block(
        &mut self,
        w: &mut W,
        chunk: DataChunk,
        seq_num: usize,
    ) -> impl Future<Output = Result<FwUpdateContentResponse, CfuWriterError>>;
    /// Build and send UpdateOfferContent command with last block flag
    fn process_last_data_block(
        &mut self,
        w: &mut W,
        chunk: DataChunk,
        seq_num: usize,
    ) -> impl Future<Output = Result<FwUpdateContentResponse, CfuWriterError>>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CfuUpdater {}

impl<W: CfuWriter> CfuUpdateContent<W> for CfuUpdater {
    /// Write all chunks of an image
    async fn write_data_chunks(
        &mut self,
        writer: &mut W,
        image: impl CfuImage,
        cmpt_id: ComponentId,
        base_offset: usize,
    ) -> Result<FwUpdateContentResponse, CfuProtocolError> {
        // Build update offer command
        let updateoffercmd_bytes = [0u8; 16];
        let mut offer_resp = [0u8; 16];
        writer
            .cfu_write_read(Some(base_offset), &updateoffercmd_bytes, &mut offer_resp)
            .await
            .map_err(CfuProtocolError::WriterError)?;

        let deser = FwUpdateContentResponse::binary_deserialize(&offer_resp, binary_serde::Endianness::Little)
            .map_err(|DeserializeError::InvalidEnumValue { enum_name }| {
                error!("deserializing error for: {:?}", enum_name);
                CfuProtocolError::WriterError(CfuWriterError::ByteConversionError)
            })?;
        let status = deser.status;
        if status != CfuOfferResponseStatus::Success {
            return Err(CfuProtocolError::CfuResponseError(status));
        }

        let total_bytes: usize = image.get_total_size();
        let chunk_size = DEFAULT_DATA_LENGTH;
        let num_chunks = total_bytes / chunk_size;
        let remainder = total_bytes % chunk_size;

        // Read and process data in chunks so as to not over-burden memory resources
        let mut resp = FwUpdateContentResponse::new(0, CfuOfferResponseStatus::ErrorInvalid);
        for i in 0..num_chunks {
            let mut chunk = [0u8; DEFAULT_DATA_LENGTH];
            let address_offset = i * DEFAULT_DATA_LENGTH + base_offset;
            let r = match i {
                0 => {
                    image
                        .get_bytes_for_chunk(&mut chunk, address_offset)
                        .await
                        .map_err(|_| CfuProtocolError::WriterError(CfuWriterError::StorageError))?;
                    self.process_first_data_block(writer, chunk).await
                }
                num if (num < num_chunks) => {
                    image
                        .get_bytes_for_chunk(&mut chunk, address_offset)
                        .await
                        .map_err(|_| CfuProtocolError::WriterError(CfuWriterError::StorageError))?;
                    self.process_middle_data_block(writer, chunk, i).await
                }
                _ => {
                    image
                        .get_bytes_for_chunk(&mut chunk[..remainder], address_offset)
                        .await
                        .map_err(|_| CfuProtocolError::WriterError(CfuWriterError::StorageError))?;
                    self.process_last_data_block(writer, chunk, i).await
                }
            }
            .map_err(CfuProtocolError::WriterError)?;
            // if no errors in processing the data block, check the response
            if r.status != CfuOfferResponseStatus::Success {
                return Err(CfuProtocolError::UpdateError(cmpt_id));
            }
            resp = r;
        }

        if resp.sequence != num_chunks as u16 {
            trace!("final sequence number does not match expected number of chunks");
            return Err(CfuProtocolError::InvalidBlockTransition);
        }

        Ok(resp)
    }

    /// Build and send UpdateOfferContent command with first block flag
    async fn process_first_data_block(
        &mut self,
        w: &mut W,
        chunk: DataChunk,
    ) -> Result<FwUpdateContentResponse, CfuWriterError> {
        let cmd = FwUpdateContentCommand::new(0, 0, FwUpdateFlags::from_bits(FwUpdateFlags::FIRST_BLOCK), DEFAULT_DATA_LENGTH as u8, chunk);
        let mut cmd_bytes = [0u8; FwUpdateContentCommand::SERIALIZED_SIZE];
        cmd.binary_serialize(&mut cmd_bytes, Endianness::Little);
        let offset = 0;
        let mut resp_buf = [0u8; FwUpdateContentResponse::SERIALIZED_SIZE];
        w.cfu_write_read(Some(offset), &cmd_bytes, &mut resp_buf)
            .await
            .map_err(|_| CfuWriterError::StorageError)?;

        FwUpdateContentResponse::binary_deserialize(&resp_buf, Endianness::Little)
            .map_err(|_| CfuWriterError::ByteConversionError)
    }
    /// Build and send UpdateOfferContent command, no special flags
    async fn process_middle_data_block(
        &mut self,
        w: &mut W,
        chunk: DataChunk,
        seq_num: usize,
    ) -> Result<FwUpdateContentResponse, CfuWriterError> {
        let cmd = FwUpdateContentCommand::new(
            seq_num as u16,
            0,
            FwUpdateFlags::from_bits(0),
            DEFAULT_DATA_LENGTH as u8,
            chunk,
        );
        let mut cmd_bytes = [0u8; FwUpdateContentCommand::SERIALIZED_SIZE];
        cmd.binary_serialize(&mut cmd_bytes, Endianness::Little);
        let offset = seq_num * DEFAULT_DATA_LENGTH;
        let mut resp_buf = [0u8; FwUpdateContentResponse::SERIALIZED_SIZE];
        w.cfu_write_read(Some(offset), &cmd_bytes, &mut resp_buf)
            .await
            .map_err(|_| CfuWriterError::StorageError)?;

        FwUpdateContentResponse::binary_deserialize(&resp_buf, Endianness::Little)
            .map_err(|_| CfuWriterError::ByteConversionError)
    }
    /// Build and send UpdateOfferContent command with last block flag
    async fn process_last_data_block(
        &mut self,
        w: &mut W,
        chunk: DataChunk,
        seq_num: usize,
    ) -> Result<FwUpdateContentResponse, CfuWriterError> {
        let cmd = FwUpdateContentCommand::new(
            seq_num as u16,
            0,
            FwUpdateFlags::from_bits(FwUpdateFlags::LAST_BLOCK),
            DEFAULT_DATA_LENGTH as u8,
            chunk,
        );
        let mut cmd_bytes = [0u8; FwUpdateContentCommand::SERIALIZED_SIZE];
        cmd.binary_serialize(&mut cmd_bytes, Endianness::Little);
        let offset = seq_num * DEFAULT_DATA_LENGTH;
        let mut resp_buf = [0u8; FwUpdateContentResponse::SERIALIZED_SIZE];
        w.cfu_write_read(Some(offset), &cmd_bytes, &mut resp_buf)
            .await
            .map_err(|_| CfuWriterError::StorageError)?;

        FwUpdateContentResponse::binary_deserialize(&resp_buf, Endianness::Little)
            .map_err(|_| CfuWriterError::ByteConversionError)
    }
}

/// Queries a target's reported versions before any offer is sent, matching the original host
/// tool's pre-offer `GetVersion` walk: every candidate device is asked for its current firmware
/// version and per-component metadata before the host decides what to offer it.
pub struct VersionQuery;

impl VersionQuery {
    /// Sends a `GetFwVersion` request (opcode-only, no payload) and parses the response.
    pub async fn query<W: CfuWriter>(writer: &W) -> Result<GetFwVersionResponse, CfuProtocolError> {
        let mut resp_buf = [0u8; GetFwVersionResponse::SERIALIZED_SIZE];
        writer
            .cfu_write_read(None, &[], &mut resp_buf)
            .await
            .map_err(CfuProtocolError::WriterError)?;

        GetFwVersionResponse::binary_deserialize(&resp_buf, Endianness::Little).map_err(|DeserializeError::InvalidEnumValue { enum_name }| {
            error!("deserializing GetFwVersion response failed for: {:?}", enum_name);
            CfuProtocolError::WriterError(CfuWriterError::ByteConversionError)
        })
    }

    /// Finds the reported version for `component_id` in an already-fetched response, used to
    /// feed [`OfferPlanner::next_action`]'s `component_version` argument.
    pub fn version_of(response: &GetFwVersionResponse, component_id: ComponentId) -> Option<FwVersion> {
        response
            .component_info
            .iter()
            .take(response.header.component_count as usize)
            .find(|info| info.component_id == component_id)
            .map(|info| info.fw_version)
    }
}

/// Matches offer/content responses back to the request that produced them and discards
/// anything that doesn't match, rather than trusting transport ordering.
#[derive(Copy, Clone, Debug, Default)]
pub struct ResponseCorrelator {
    expected_token: Option<HostToken>,
    expected_sequence: Option<u16>,
}

impl ResponseCorrelator {
    pub fn expect_offer(&mut self, token: HostToken) {
        self.expected_token = Some(token);
        self.expected_sequence = None;
    }

    pub fn expect_content(&mut self, sequence: u16) {
        self.expected_sequence = Some(sequence);
    }

    /// True if `response` carries the token currently expected. A mismatched response is
    /// discarded by the caller, not treated as a protocol error on its own: it may simply be a
    /// stale response to a prior, already-abandoned offer.
    pub fn accepts_offer_response(&self, response: &FwUpdateOfferResponse) -> bool {
        self.expected_token == Some(response.token)
    }

    /// True if `response` carries the sequence number currently expected.
    pub fn accepts_content_response(&self, response: &FwUpdateContentResponse) -> bool {
        self.expected_sequence == Some(response.sequence)
    }
}

/// Retry/backoff policy applied when a component responds `Busy` to an offer. The original
/// host driver simply waited and re-offered; this tracks how many attempts have been made so
/// a caller can cap total wait time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BusyRetryPolicy {
    pub max_attempts: u8,
    pub backoff: embassy_time::Duration,
}

impl BusyRetryPolicy {
    pub const fn new(max_attempts: u8, backoff: embassy_time::Duration) -> Self {
        Self { max_attempts, backoff }
    }
}

impl Default for BusyRetryPolicy {
    fn default() -> Self {
        Self::new(10, embassy_time::Duration::from_millis(100))
    }
}

/// Decision produced by [`OfferPlanner::next_action`] for a single configured component, given
/// the host's resume-on-connect / skip-optimization settings and the component's last known
/// state.
///
/// The protocol has no mid-stream resume: a disconnect is treated as offer-failure, and any
/// reconnect re-queries versions and either skips the component or starts its offer over from
/// the beginning.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OfferPlan {
    /// Send the full offer and, if accepted, stream content from the start.
    SendOfferThenContent,
    /// The component already reports a matching version; skip straight past it.
    Skip,
}

/// Decides, for one configured component, whether the host should offer/stream from scratch or
/// skip it — driven by [`HostConfig`]'s `support_resume_on_connect` /
/// `support_protocol_transaction_skip_optimization` flags and a version re-query.
///
/// Both flags gate the same decision: whether a version match is enough to skip the component,
/// either because the host just reconnected and re-queried versions (`support_resume_on_connect`)
/// or because it's re-evaluating a component it already knows about
/// (`support_protocol_transaction_skip_optimization`). Neither flag, nor any other state, can
/// produce anything but a full restart-from-scratch offer when versions don't match.
pub struct OfferPlanner<'a> {
    config: &'a HostConfig<'a>,
}

impl<'a> OfferPlanner<'a> {
    pub fn new(config: &'a HostConfig<'a>) -> Self {
        Self { config }
    }

    /// `reconnected` is true when this decision follows a transport reconnect (the host just
    /// re-queried `component_version` rather than trusting state from before the disconnect).
    pub fn next_action(&self, target_version: FwVersion, component_version: FwVersion, reconnected: bool) -> OfferPlan {
        let versions_match = component_version == target_version;
        let skip_enabled = (reconnected && self.config.support_resume_on_connect)
            || (!reconnected && self.config.support_protocol_transaction_skip_optimization);

        if skip_enabled && versions_match {
            OfferPlan::Skip
        } else {
            OfferPlan::SendOfferThenContent
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::config::ComponentFiles;

    #[test]
    fn version_of_finds_matching_component_and_ignores_unfilled_slots() {
        let mut response = GetFwVersionResponse {
            misc_and_protocol_version: 0,
            component_info: [FwVerComponentInfo::default(); MAX_CMPT_COUNT],
            header: GetFwVersionResponseHeader::new(2, GetFwVerRespHeaderByte3::NoSpecialFlags),
        };
        let v1 = FwVersion {
            major: 1,
            minor: 2,
            variant: 3,
        };
        response.component_info[0] = FwVerComponentInfo::new(v1, 1, BankType::DualBank);
        response.component_info[1] = FwVerComponentInfo::new(FwVersion::default(), 2, BankType::SingleBank);

        assert_eq!(VersionQuery::version_of(&response, 1), Some(v1));
        assert_eq!(VersionQuery::version_of(&response, 99), None);
    }

    #[test]
    fn correlator_discards_response_for_a_different_token() {
        let mut correlator = ResponseCorrelator::default();
        correlator.expect_offer(0xA0);
        let stale = FwUpdateOfferResponse::new_accept(0xB0);
        assert!(!correlator.accepts_offer_response(&stale));
        let fresh = FwUpdateOfferResponse::new_accept(0xA0);
        assert!(correlator.accepts_offer_response(&fresh));
    }

    #[test]
    fn correlator_discards_response_for_a_different_sequence() {
        let mut correlator = ResponseCorrelator::default();
        correlator.expect_content(3);
        assert!(!correlator.accepts_content_response(&FwUpdateContentResponse::new(2, CfuOfferResponseStatus::Success)));
        assert!(correlator.accepts_content_response(&FwUpdateContentResponse::new(3, CfuOfferResponseStatus::Success)));
    }

    #[test]
    fn planner_skips_on_reconnect_when_resume_on_connect_and_versions_match() {
        static FILES: [ComponentFiles; 0] = [];
        let mut config = HostConfig::new(&FILES);
        config.support_resume_on_connect = true;
        let planner = OfferPlanner::new(&config);

        let v = FwVersion {
            major: 1,
            minor: 0,
            variant: 0,
        };
        assert_eq!(planner.next_action(v, v, true), OfferPlan::Skip);
    }

    #[test]
    fn planner_restarts_on_reconnect_when_versions_mismatch_even_with_resume_on_connect() {
        static FILES: [ComponentFiles; 0] = [];
        let mut config = HostConfig::new(&FILES);
        config.support_resume_on_connect = true;
        let planner = OfferPlanner::new(&config);

        let older = FwVersion {
            major: 1,
            minor: 0,
            variant: 0,
        };
        let newer = FwVersion {
            major: 2,
            minor: 0,
            variant: 0,
        };
        assert_eq!(
            planner.next_action(newer, older, true),
            OfferPlan::SendOfferThenContent
        );
    }

    #[test]
    fn planner_skips_matching_version_when_skip_optimization_enabled() {
        static FILES: [ComponentFiles; 0] = [];
        let mut config = HostConfig::new(&FILES);
        config.support_protocol_transaction_skip_optimization = true;
        let planner = OfferPlanner::new(&config);

        let v = FwVersion {
            major: 1,
            minor: 0,
            variant: 0,
        };
        assert_eq!(planner.next_action(v, v, false), OfferPlan::Skip);
    }

    #[test]
    fn planner_sends_full_offer_by_default() {
        static FILES: [ComponentFiles; 0] = [];
        let config = HostConfig::new(&FILES);
        let planner = OfferPlanner::new(&config);

        let older = FwVersion {
            major: 1,
            minor: 0,
            variant: 0,
        };
        let newer = FwVersion {
            major: 2,
            minor: 0,
            variant: 0,
        };
        assert_eq!(
            planner.next_action(newer, older, false),
            OfferPlan::SendOfferThenContent
        );
    }
}
