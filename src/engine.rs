//! Target-side protocol engine: message dispatch, offer acceptance, and the content pipeline.
//!
//! Grounded directly on `ProcessCFWUOffer`/`ProcessCFWUContent`/`ProcessCFWUGetFWVersion` from
//! the original firmware update engine, generalized from that engine's single static
//! `s_pFirstComponentIFace` list and `s_currentOffer`/`s_updateTimer`/`s_bankSwapPending` globals
//! into explicit state owned by [`TargetEngine`].

use binary_serde::{BinarySerde, Endianness};
use embassy_time::Instant;

use crate::components::{ComponentHandler, CrcRequirement, StorageBackend};
use crate::protocol_definitions::*;
use crate::registry::ComponentRegistry;
use crate::timer::FailsafeTimer;
use crate::{error, info, warn};

/// Opcode carried by an inbound frame, as recognized by [`TargetEngine::handle_frame`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CfuOpcode {
    GetVersion,
    Offer,
    Content,
}

/// Response produced by [`TargetEngine::handle_frame`], shaped according to the opcode that
/// produced it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CfuFrameResponse {
    GetVersion(GetFwVersionResponse),
    Offer(FwUpdateOfferResponse),
    Content(FwUpdateContentResponse),
}

/// Tracks the offer currently accepted and in flight through the content pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct AcceptedOffer {
    component_id: ComponentId,
    token: HostToken,
    content_started: bool,
}

/// Target-side engine: owns the component registry, the single shared storage backend, and
/// the concurrency-sensitive state (`current_offer`, `update_in_progress`, `bank_swap_pending`)
/// the original engine kept as file-static globals.
pub struct TargetEngine<S: StorageBackend, const N: usize> {
    registry: ComponentRegistry<N>,
    storage: S,
    current_offer: Option<AcceptedOffer>,
    update_in_progress: bool,
    bank_swap_pending: bool,
    timer: FailsafeTimer,
}

impl<S: StorageBackend, const N: usize> TargetEngine<S, N> {
    pub const fn new(storage: S) -> Self {
        Self {
            registry: ComponentRegistry::new(),
            storage,
            current_offer: None,
            update_in_progress: false,
            bank_swap_pending: false,
            timer: FailsafeTimer::new(crate::timer::DEFAULT_FAILSAFE_DURATION),
        }
    }

    /// Registers a component handler. Registration order is preserved (§ component registry).
    pub fn register_component(
        &mut self,
        handler: &'static dyn ComponentHandler,
    ) -> Result<(), crate::registry::RegistryFull> {
        self.registry.register(handler)
    }

    pub fn bank_swap_pending(&self) -> bool {
        self.bank_swap_pending
    }

    /// Clears a pending bank swap once the caller has actually performed it (e.g. on next
    /// boot). Never called internally by the content pipeline itself.
    pub fn clear_bank_swap_pending(&mut self) {
        self.bank_swap_pending = false;
    }

    pub fn update_in_progress(&self) -> bool {
        self.update_in_progress
    }

    /// Polls the failsafe timer. Callers drive this from whatever periodic source they have
    /// (a real timer task, a transport poll loop); it never sleeps itself. Returns true if the
    /// timer had armed and just expired, in which case the in-progress update is abandoned.
    pub fn poll_failsafe(&mut self, now: Instant) -> bool {
        if self.timer.has_expired(now) {
            warn!("cfu failsafe timer expired, abandoning in-progress update");
            self.timer.cancel();
            self.update_in_progress = false;
            self.current_offer = None;
            true
        } else {
            false
        }
    }

    /// Target message dispatcher (T1): the single entry point for inbound frames. Not
    /// reentrant with respect to engine state; callers on a multi-producer transport must
    /// serialize calls (a mutex or critical section around this method).
    ///
    /// Every call produces exactly one response, shaped per `opcode`. An unrecognized opcode
    /// yields an offer-shaped response carrying `CfuOfferStatus::CmdNotSupported`, matching
    /// the original firmware's reuse of that status for "request not recognized". A payload
    /// shorter than the opcode's minimum frame size is rejected the same way for `Offer`
    /// frames, or as `CfuOfferResponseStatus::ErrorInvalid` for `Content` frames, which already
    /// has a dedicated status for a malformed request.
    pub async fn handle_frame(&mut self, opcode: Option<CfuOpcode>, payload: &[u8], now: Instant) -> CfuFrameResponse {
        let Some(opcode) = opcode else {
            warn!("cfu dispatcher: unrecognized opcode");
            return CfuFrameResponse::Offer(FwUpdateOfferResponse::new_cmd_not_supported());
        };

        match opcode {
            CfuOpcode::GetVersion => CfuFrameResponse::GetVersion(self.get_fw_version()),
            CfuOpcode::Offer => {
                let Some(bytes) = payload.get(..FwUpdateOfferCommand::SERIALIZED_SIZE) else {
                    warn!("cfu dispatcher: offer payload shorter than minimum frame size");
                    return CfuFrameResponse::Offer(FwUpdateOfferResponse::new_cmd_not_supported());
                };
                match FwUpdateOfferCommand::binary_deserialize(bytes, Endianness::Little) {
                    Ok(cmd) => CfuFrameResponse::Offer(self.handle_offer(cmd, now).await),
                    Err(_e) => {
                        warn!("cfu dispatcher: failed to decode offer frame");
                        CfuFrameResponse::Offer(FwUpdateOfferResponse::new_cmd_not_supported())
                    }
                }
            }
            CfuOpcode::Content => {
                let Some(bytes) = payload.get(..FwUpdateContentCommand::SERIALIZED_SIZE) else {
                    warn!("cfu dispatcher: content payload shorter than minimum frame size");
                    return CfuFrameResponse::Content(FwUpdateContentResponse::new(0, CfuOfferResponseStatus::ErrorInvalid));
                };
                match FwUpdateContentCommand::binary_deserialize(bytes, Endianness::Little) {
                    Ok(cmd) => CfuFrameResponse::Content(self.handle_content(cmd).await),
                    Err(_e) => {
                        warn!("cfu dispatcher: failed to decode content frame");
                        CfuFrameResponse::Content(FwUpdateContentResponse::new(0, CfuOfferResponseStatus::ErrorInvalid))
                    }
                }
            }
        }
    }

    /// Offer acceptance state machine (T2): routes an offer to the special-offer, info-only,
    /// or normal offer-acceptance path based on `component_id`.
    pub async fn handle_offer(&mut self, cmd: FwUpdateOfferCommand, now: Instant) -> FwUpdateOfferResponse {
        let token = cmd.component_info.token;
        let component_id = cmd.component_info.component_id;

        if component_id == SPECIAL_OFFER_COMPONENT_ID {
            return self.handle_special_offer(token);
        }
        if component_id == INFO_ONLY_COMPONENT_ID {
            return FwUpdateOfferResponse::new_command_ready(token);
        }

        self.handle_component_offer(cmd, now).await
    }

    fn handle_special_offer(&self, token: HostToken) -> FwUpdateOfferResponse {
        // Only CFU_SPECIAL_OFFER_GET_STATUS is implemented; all other sub-opcodes (nonce
        // exchange, notify-on-ready) are out of scope here.
        if self.update_in_progress {
            FwUpdateOfferResponse::new_with_failure(token, RejectReason::Busy, CfuOfferStatus::Busy)
        } else {
            FwUpdateOfferResponse::new_command_ready(token)
        }
    }

    async fn handle_component_offer(&mut self, cmd: FwUpdateOfferCommand, now: Instant) -> FwUpdateOfferResponse {
        let token = cmd.component_info.token;
        let component_id = cmd.component_info.component_id;

        if self.bank_swap_pending {
            return FwUpdateOfferResponse::new_with_failure(token, RejectReason::SwapPending, CfuOfferStatus::Reject);
        }
        if self.update_in_progress {
            return FwUpdateOfferResponse::new_with_failure(token, RejectReason::Busy, CfuOfferStatus::Busy);
        }

        let Some(handler) = self.registry.find(component_id) else {
            warn!("offer for unregistered component {}", component_id);
            return FwUpdateOfferResponse::new_with_failure(token, RejectReason::InvalidMcu, CfuOfferStatus::Reject);
        };

        if !cmd.is_hardware_compatible(handler.get_hardware_variant_mask()) {
            return FwUpdateOfferResponse::new_with_failure(
                token,
                RejectReason::VariantMismatch,
                CfuOfferStatus::Reject,
            );
        }

        let force_ignore_version = cmd.component_info.byte1.force_ignore_version != 0;
        match handler.evaluate_offer(&cmd) {
            Ok(()) => {}
            Err(RejectReason::OldFw) if force_ignore_version => {
                info!("force_ignore_version override accepted stale offer for component {}", component_id);
            }
            Err(reason) => {
                return FwUpdateOfferResponse::new_with_failure(token, reason, CfuOfferStatus::Reject);
            }
        }

        info!("accepted offer for component {}", component_id);
        self.current_offer = Some(AcceptedOffer {
            component_id,
            token,
            content_started: false,
        });
        self.update_in_progress = true;
        self.timer.start(now);

        FwUpdateOfferResponse::new_accept(token)
    }

    /// Content pipeline (T3): streams one block to the component storage backend currently
    /// accepted via [`TargetEngine::handle_offer`], running the last-block integrity pipeline
    /// (CRC, then authentication, then finalize) when `LAST_BLOCK` is set.
    ///
    /// Every non-`Success` response leaves the engine back in `Idle`: `update_in_progress` is
    /// cleared (and the failsafe timer stopped) atomically with the failing response, never
    /// only on the success path.
    pub async fn handle_content(&mut self, cmd: FwUpdateContentCommand) -> FwUpdateContentResponse {
        let seq = cmd.header.sequence_num;

        if cmd.header.data_length == 0 {
            warn!("rejecting zero-length content block");
            self.abort_update();
            return FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::ErrorInvalid);
        }

        let Some(offer) = self.current_offer else {
            return FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::ErrorNoOffer);
        };
        let component_id = offer.component_id;
        let flags = cmd.header.flags;
        let data_length = cmd.header.data_length as usize;
        let Some(data) = cmd.data.get(..data_length) else {
            self.abort_update();
            return FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::ErrorInvalidAddr);
        };

        if flags.is_first_block() {
            if let Err(_e) = self.storage.prepare(component_id).await {
                error!("storage prepare failed for component {}", component_id);
                self.abort_update();
                return FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::ErrorPrepare);
            }
            if let Some(current) = self.current_offer.as_mut() {
                current.content_started = true;
            }
        } else if !offer.content_started {
            self.abort_update();
            return FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::ErrorNoOffer);
        }

        if let Err(_e) = self.storage.write_block(component_id, cmd.header.firmware_address, data).await {
            error!("storage write failed for component {}", component_id);
            self.abort_update();
            return FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::ErrorWrite);
        }

        if flags.is_last_block() {
            return self.finish_update(component_id, seq).await;
        }

        FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::Success)
    }

    /// Clears the in-progress state back to `Idle`. Called on every content-pipeline failure
    /// path so `update_in_progress` never outlives a non-`Success` response; never called on
    /// the success path, which instead latches `bank_swap_pending`.
    fn abort_update(&mut self) {
        self.update_in_progress = false;
        self.current_offer = None;
        self.timer.cancel();
    }

    async fn finish_update(&mut self, component_id: ComponentId, seq: u16) -> FwUpdateContentResponse {
        let Some(handler) = self.registry.find(component_id) else {
            // Registration changed mid-update: the component that accepted the offer is gone.
            error!("component {} missing from registry at last block", component_id);
            self.abort_update();
            return FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::ErrorInvalid);
        };

        if handler.get_crc_offset() != CrcRequirement::CrcCheckNotRequired {
            if let Err(_e) = self.storage.compute_crc(component_id).await {
                error!("crc check failed for component {}", component_id);
                self.abort_update();
                return FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::ErrorCrc);
            }
        }
        // Authentication always runs after the CRC check (or CRC-skip) succeeds, regardless of
        // whether CRC verification itself was required for this component.
        if let Err(_e) = self.storage.authenticate(component_id).await {
            error!("authentication failed for component {}", component_id);
            self.abort_update();
            return FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::ErrorSignature);
        }
        if let Err(_e) = self.storage.finalize(component_id).await {
            error!("finalize failed for component {}", component_id);
            self.abort_update();
            return FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::ErrorComplete);
        }

        self.bank_swap_pending = true;
        self.update_in_progress = false;
        self.current_offer = None;
        self.timer.cancel();
        handler.notify_success();
        info!("update complete for component {}, bank swap pending", component_id);

        FwUpdateContentResponse::new(seq, CfuOfferResponseStatus::Success)
    }

    /// Assembles a `GetFwVersion` response from every registered component, in registration
    /// order.
    pub fn get_fw_version(&self) -> GetFwVersionResponse {
        let mut component_info = [FwVerComponentInfo::default(); MAX_CMPT_COUNT];
        let mut count = 0u8;
        for handler in self.registry.iter().take(MAX_CMPT_COUNT) {
            let bank = if handler.is_dual_bank() {
                BankType::DualBank
            } else {
                BankType::SingleBank
            };
            component_info[count as usize] =
                FwVerComponentInfo::new(handler.get_fw_version(), handler.component_id(), bank);
            count += 1;
        }
        GetFwVersionResponse {
            misc_and_protocol_version: PROTOCOL_REVISION as u32,
            component_info,
            header: GetFwVersionResponseHeader::new(count, GetFwVerRespHeaderByte3::NoSpecialFlags),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use embassy_futures::block_on;
    use std::sync::Mutex;

    use super::*;
    use crate::CfuWriterError;

    struct StubHandler {
        id: ComponentId,
        version: FwVersion,
        mask: u32,
        crc_requirement: CrcRequirement,
        notified: Mutex<bool>,
    }

    impl ComponentHandler for StubHandler {
        fn component_id(&self) -> ComponentId {
            self.id
        }
        fn get_fw_version(&self) -> FwVersion {
            self.version
        }
        fn get_hardware_variant_mask(&self) -> u32 {
            self.mask
        }
        fn is_dual_bank(&self) -> bool {
            true
        }
        fn evaluate_offer(&self, offer: &FwUpdateOfferCommand) -> Result<(), RejectReason> {
            if offer.firmware_version.is_newer_than(&self.version) {
                Ok(())
            } else {
                Err(RejectReason::OldFw)
            }
        }
        fn get_crc_offset(&self) -> CrcRequirement {
            self.crc_requirement
        }
        fn notify_success(&self) {
            *self.notified.lock().unwrap() = true;
        }
    }

    #[derive(Default)]
    struct StubStorage {
        fail_crc_for: Option<ComponentId>,
        written: std::vec::Vec<std::vec::Vec<u8>>,
    }

    impl StorageBackend for StubStorage {
        async fn prepare(&mut self, _component_id: ComponentId) -> Result<(), CfuWriterError> {
            Ok(())
        }
        async fn write_block(
            &mut self,
            _component_id: ComponentId,
            _address: u32,
            data: &[u8],
        ) -> Result<(), CfuWriterError> {
            self.written.push(data.to_vec());
            Ok(())
        }
        async fn compute_crc(&mut self, component_id: ComponentId) -> Result<u32, CfuWriterError> {
            if self.fail_crc_for == Some(component_id) {
                Err(CfuWriterError::StorageError)
            } else {
                Ok(0)
            }
        }
        async fn authenticate(&mut self, _component_id: ComponentId) -> Result<(), CfuWriterError> {
            Ok(())
        }
        async fn finalize(&mut self, _component_id: ComponentId) -> Result<(), CfuWriterError> {
            Ok(())
        }
    }

    static COMPONENT_A: StubHandler = StubHandler {
        id: 1,
        version: FwVersion {
            major: 1,
            minor: 0,
            variant: 0,
        },
        mask: 0xFFFF_FFFF,
        crc_requirement: CrcRequirement::Offset(0),
        notified: Mutex::new(false),
    };

    fn newer_offer(component_id: ComponentId, token: HostToken) -> FwUpdateOfferCommand {
        FwUpdateOfferCommand::new(
            token,
            component_id,
            FwVersion {
                major: 2,
                minor: 0,
                variant: 0,
            },
            0xFFFF_FFFF,
            OfferProductInfo::default(),
        )
    }

    #[test]
    fn happy_path_single_component_update() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            engine.register_component(&COMPONENT_A).unwrap();

            let offer_resp = engine.handle_offer(newer_offer(1, 0xA0), Instant::from_millis(0)).await;
            assert_eq!(offer_resp.status, CfuOfferStatus::Accept);
            assert!(engine.update_in_progress());

            let data = [0xAAu8; DEFAULT_DATA_LENGTH];
            let first = FwUpdateContentCommand::new(0, 0, FwUpdateFlags::first_and_last(true, false), 52, data);
            let resp = engine.handle_content(first).await;
            assert_eq!(resp.status, CfuOfferResponseStatus::Success);

            let last = FwUpdateContentCommand::new(1, 52, FwUpdateFlags::first_and_last(false, true), 52, data);
            let resp = engine.handle_content(last).await;
            assert_eq!(resp.status, CfuOfferResponseStatus::Success);
            assert!(engine.bank_swap_pending());
            assert!(!engine.update_in_progress());
            assert!(*COMPONENT_A.notified.lock().unwrap());
        });
    }

    #[test]
    fn single_block_image_combines_first_and_last_flags() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            engine.register_component(&COMPONENT_A).unwrap();
            engine.handle_offer(newer_offer(1, 0xA0), Instant::from_millis(0)).await;

            let data = [0x55u8; DEFAULT_DATA_LENGTH];
            let only_block = FwUpdateContentCommand::new(0, 0, FwUpdateFlags::first_and_last(true, true), 52, data);
            let resp = engine.handle_content(only_block).await;
            assert_eq!(resp.status, CfuOfferResponseStatus::Success);
            assert!(engine.bank_swap_pending());
        });
    }

    #[test]
    fn busy_rejects_concurrent_offer() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            engine.register_component(&COMPONENT_A).unwrap();
            let first = engine.handle_offer(newer_offer(1, 0xA0), Instant::from_millis(0)).await;
            assert_eq!(first.status, CfuOfferStatus::Accept);

            let second = engine.handle_offer(newer_offer(1, 0xB0), Instant::from_millis(1)).await;
            assert_eq!(second.status, CfuOfferStatus::Busy);
            assert_eq!(second.rejectreasoncode, RejectReason::Busy);
        });
    }

    #[test]
    fn force_ignore_version_only_overrides_old_fw() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            engine.register_component(&COMPONENT_A).unwrap();

            let mut stale = FwUpdateOfferCommand::new(
                0xA0,
                1,
                FwVersion {
                    major: 0,
                    minor: 5,
                    variant: 0,
                },
                0xFFFF_FFFF,
                OfferProductInfo::default(),
            );
            stale.component_info.byte1.force_ignore_version = 1;
            let resp = engine.handle_offer(stale, Instant::from_millis(0)).await;
            assert_eq!(resp.status, CfuOfferStatus::Accept);
        });
    }

    #[test]
    fn force_ignore_version_does_not_override_variant_mismatch() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            engine.register_component(&COMPONENT_A).unwrap();

            let mut mismatched = newer_offer(1, 0xA0);
            mismatched.hardware_variant_mask = 0; // no overlap with component's mask
            mismatched.component_info.byte1.force_ignore_version = 1;
            let resp = engine.handle_offer(mismatched, Instant::from_millis(0)).await;
            assert_eq!(resp.status, CfuOfferStatus::Reject);
            assert_eq!(resp.rejectreasoncode, RejectReason::VariantMismatch);
        });
    }

    #[test]
    fn crc_failure_on_last_block_is_reported_and_aborts_swap() {
        block_on(async {
            let storage = StubStorage {
                fail_crc_for: Some(1),
                ..Default::default()
            };
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(storage);
            engine.register_component(&COMPONENT_A).unwrap();
            engine.handle_offer(newer_offer(1, 0xA0), Instant::from_millis(0)).await;

            let data = [0u8; DEFAULT_DATA_LENGTH];
            let only_block = FwUpdateContentCommand::new(0, 0, FwUpdateFlags::first_and_last(true, true), 52, data);
            let resp = engine.handle_content(only_block).await;
            assert_eq!(resp.status, CfuOfferResponseStatus::ErrorCrc);
            assert!(!engine.bank_swap_pending());
            assert!(!engine.update_in_progress());
        });
    }

    #[test]
    fn crc_check_not_required_skips_crc_even_when_storage_would_fail_it() {
        static SKIPS_CRC: StubHandler = StubHandler {
            id: 9,
            version: FwVersion {
                major: 1,
                minor: 0,
                variant: 0,
            },
            mask: 0xFFFF_FFFF,
            crc_requirement: CrcRequirement::CrcCheckNotRequired,
            notified: Mutex::new(false),
        };
        block_on(async {
            let storage = StubStorage {
                fail_crc_for: Some(9),
                ..Default::default()
            };
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(storage);
            engine.register_component(&SKIPS_CRC).unwrap();
            engine.handle_offer(newer_offer(9, 0xA0), Instant::from_millis(0)).await;

            let data = [0u8; DEFAULT_DATA_LENGTH];
            let only_block = FwUpdateContentCommand::new(0, 0, FwUpdateFlags::first_and_last(true, true), 52, data);
            let resp = engine.handle_content(only_block).await;
            assert_eq!(resp.status, CfuOfferResponseStatus::Success);
            assert!(engine.bank_swap_pending());
        });
    }

    #[test]
    fn zero_length_block_rejected_before_storage_call() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            engine.register_component(&COMPONENT_A).unwrap();
            engine.handle_offer(newer_offer(1, 0xA0), Instant::from_millis(0)).await;

            let data = [0u8; DEFAULT_DATA_LENGTH];
            let zero_len = FwUpdateContentCommand::new(0, 0, FwUpdateFlags::first_and_last(true, false), 0, data);
            let resp = engine.handle_content(zero_len).await;
            assert_eq!(resp.status, CfuOfferResponseStatus::ErrorInvalid);
            assert!(!engine.update_in_progress());
        });
    }

    #[test]
    fn special_offer_get_status_reports_busy_while_update_in_progress() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            engine.register_component(&COMPONENT_A).unwrap();
            engine.handle_offer(newer_offer(1, 0xA0), Instant::from_millis(0)).await;

            let status_cmd = FwUpdateOfferCommand::new_with_command(
                0xC0,
                SPECIAL_OFFER_COMPONENT_ID,
                FwVersion::default(),
                0,
                InformationCodeValues::GetStatus,
                OfferProductInfo::default(),
            );
            let resp = engine.handle_offer(status_cmd, Instant::from_millis(1)).await;
            assert_eq!(resp.status, CfuOfferStatus::Busy);
        });
    }

    #[test]
    fn failsafe_timer_fire_clears_in_progress_state() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            engine.register_component(&COMPONENT_A).unwrap();
            engine.handle_offer(newer_offer(1, 0xA0), Instant::from_millis(0)).await;
            assert!(engine.update_in_progress());

            let fired = engine.poll_failsafe(Instant::from_millis(20 * 60 * 1000 + 1));
            assert!(fired);
            assert!(!engine.update_in_progress());

            // Recovery: a fresh offer is accepted normally afterward.
            let resp = engine.handle_offer(newer_offer(1, 0xA1), Instant::from_millis(20 * 60 * 1000 + 2)).await;
            assert_eq!(resp.status, CfuOfferStatus::Accept);
        });
    }

    #[test]
    fn get_fw_version_reports_components_in_registration_order() {
        static COMPONENT_B: StubHandler = StubHandler {
            id: 2,
            version: FwVersion {
                major: 3,
                minor: 1,
                variant: 0,
            },
            mask: 0xFFFF_FFFF,
            crc_requirement: CrcRequirement::Offset(0),
            notified: Mutex::new(false),
        };
        let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
        engine.register_component(&COMPONENT_A).unwrap();
        engine.register_component(&COMPONENT_B).unwrap();

        let resp = engine.get_fw_version();
        assert_eq!(resp.header.component_count, 2);
        assert_eq!(resp.component_info[0].component_id, 1);
        assert_eq!(resp.component_info[1].component_id, 2);
    }

    #[test]
    fn dispatcher_reports_cmd_not_supported_for_unrecognized_opcode() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            let resp = engine.handle_frame(None, &[], Instant::from_millis(0)).await;
            match resp {
                CfuFrameResponse::Offer(offer) => assert_eq!(offer.status, CfuOfferStatus::CmdNotSupported),
                other => panic!("expected an offer-shaped response, got {:?}", other),
            }
        });
    }

    #[test]
    fn dispatcher_reports_cmd_not_supported_for_short_offer_payload() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            let resp = engine.handle_frame(Some(CfuOpcode::Offer), &[0u8; 2], Instant::from_millis(0)).await;
            match resp {
                CfuFrameResponse::Offer(offer) => assert_eq!(offer.status, CfuOfferStatus::CmdNotSupported),
                other => panic!("expected an offer-shaped response, got {:?}", other),
            }
        });
    }

    #[test]
    fn dispatcher_reports_invalid_for_short_content_payload() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            let resp = engine.handle_frame(Some(CfuOpcode::Content), &[0u8; 2], Instant::from_millis(0)).await;
            match resp {
                CfuFrameResponse::Content(content) => assert_eq!(content.status, CfuOfferResponseStatus::ErrorInvalid),
                other => panic!("expected a content-shaped response, got {:?}", other),
            }
        });
    }

    #[test]
    fn dispatcher_routes_get_version_opcode_to_get_fw_version() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            engine.register_component(&COMPONENT_A).unwrap();
            let resp = engine.handle_frame(Some(CfuOpcode::GetVersion), &[], Instant::from_millis(0)).await;
            match resp {
                CfuFrameResponse::GetVersion(version) => assert_eq!(version.header.component_count, 1),
                other => panic!("expected a get-version-shaped response, got {:?}", other),
            }
        });
    }

    #[test]
    fn dispatcher_routes_well_formed_offer_through_to_acceptance() {
        block_on(async {
            let mut engine: TargetEngine<StubStorage, 4> = TargetEngine::new(StubStorage::default());
            engine.register_component(&COMPONENT_A).unwrap();
            let offer = newer_offer(1, 0xA0);
            let mut bytes = [0u8; FwUpdateOfferCommand::SERIALIZED_SIZE];
            offer.binary_serialize(&mut bytes, Endianness::Little);

            let resp = engine.handle_frame(Some(CfuOpcode::Offer), &bytes, Instant::from_millis(0)).await;
            match resp {
                CfuFrameResponse::Offer(offer_resp) => assert_eq!(offer_resp.status, CfuOfferStatus::Accept),
                other => panic!("expected an offer-shaped response, got {:?}", other),
            }
        });
    }
}
