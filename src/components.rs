//! Per-component capability surface.
//!
//! The original firmware update engine dispatches to components through a synchronous
//! vtable (`GetVersion`/`GetProductInfo`/`ProcessOffer`/`GetCrcOffset`/`NotifySuccess`); only
//! the storage back end that actually streams bytes to flash is asynchronous. [`ComponentHandler`]
//! mirrors that vtable and stays `dyn`-safe so a [`crate::registry::ComponentRegistry`] can hold
//! a heterogeneous, append-only set of components without `alloc`. [`StorageBackend`] is the one
//! async trait in the crate; it is shared across every registered component and keyed by
//! `component_id`, matching the "storage is shared, not per component" resource rule.

use core::future::Future;

use crate::protocol_definitions::*;
use crate::CfuWriterError;

/// Synchronous, object-safe per-component capability set.
///
/// Implementors are typically zero-sized or hold only `&'static` configuration, since the
/// registry stores them as `&'static dyn ComponentHandler`.
pub trait ComponentHandler {
    /// This component's id, used as the registry lookup key.
    fn component_id(&self) -> ComponentId;

    /// Current firmware version running on the component.
    fn get_fw_version(&self) -> FwVersion;

    /// Hardware variant compatibility bitmap for this component.
    fn get_hardware_variant_mask(&self) -> u32;

    /// True if this is the primary component (the one the host addresses first and whose
    /// response ends the offer list).
    fn is_primary_component(&self) -> bool {
        false
    }

    /// True if the component has a dual (or higher) bank layout and can therefore continue
    /// running the current bank while the next one is written.
    fn is_dual_bank(&self) -> bool;

    /// Ids of any subcomponents folded under this one in `GetFwVersion` responses.
    fn get_subcomponents(&self) -> [Option<ComponentId>; MAX_SUBCMPT_COUNT] {
        [None; MAX_SUBCMPT_COUNT]
    }

    /// Evaluates an offer against this component's current state. `force_ignore_version`
    /// already had the chance to override an `OldFw` rejection before this is called; any
    /// other rejection reason is never overridden.
    fn evaluate_offer(&self, offer: &FwUpdateOfferCommand) -> Result<(), RejectReason>;

    /// Where the last-block integrity pipeline finds this component's stored CRC, or the
    /// sentinel indicating no CRC comparison is required (authentication alone guards the
    /// image). Default implementation requires a CRC comparison against offset 0.
    fn get_crc_offset(&self) -> CrcRequirement {
        CrcRequirement::Offset(0)
    }

    /// Called once the content pipeline completes successfully for this component: CRC
    /// checked (or skipped), authentication passed, and bank swap armed. Default
    /// implementation does nothing.
    fn notify_success(&self) {}
}

/// Where the last-block integrity pipeline finds a component's stored CRC for comparison.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CrcRequirement {
    /// Byte offset within the written image where a 2-byte CRC was stored by the host.
    Offset(u32),
    /// No CRC comparison is required; the integrity pipeline proceeds directly to
    /// authentication.
    CrcCheckNotRequired,
}

/// Asynchronous storage back end shared by every registered component.
///
/// Every method takes an explicit `component_id` so a single backend (e.g. one SPI flash
/// controller addressing several regions) can serve the whole registry.
pub trait StorageBackend {
    /// Prepares storage to receive a new image for `component_id` (erase, open bank, etc).
    fn prepare(&mut self, component_id: ComponentId) -> impl Future<Output = Result<(), CfuWriterError>>;

    /// Writes one content block at `address` for `component_id`.
    fn write_block(
        &mut self,
        component_id: ComponentId,
        address: u32,
        data: &[u8],
    ) -> impl Future<Output = Result<(), CfuWriterError>>;

    /// Computes the running CRC over everything written for `component_id` so far.
    fn compute_crc(&mut self, component_id: ComponentId) -> impl Future<Output = Result<u32, CfuWriterError>>;

    /// Runs image authentication for `component_id`. Always called after the CRC check (or
    /// CRC-skip) succeeds on the last block, regardless of whether CRC verification itself
    /// was required.
    fn authenticate(&mut self, component_id: ComponentId) -> impl Future<Output = Result<(), CfuWriterError>>;

    /// Finalizes the write for `component_id` (e.g. flush, mark bank valid).
    fn finalize(&mut self, component_id: ComponentId) -> impl Future<Output = Result<(), CfuWriterError>>;
}

/// Gets the current fw version of the component. Retained from the original async,
/// single-component-oriented design for callers that talk to exactly one component directly
/// (e.g. a `CfuReceiveContent` implementor that is itself the component), without going
/// through a [`crate::registry::ComponentRegistry`].
pub trait CfuComponentInfo {
    fn get_fw_version(&self) -> impl Future<Output = Result<FwVersion, CfuProtocolError>>;
    fn get_component_id(&self) -> ComponentId;
    fn is_offer_valid(
        &self,
    ) -> impl Future<Output = Result<CfuOfferResponseStatus, (CfuOfferResponseStatus, RejectReason)>>;
    fn is_primary_component(&self) -> bool {
        false
    }
    fn is_dual_bank(&self) -> bool;
    fn get_subcomponents(&self) -> [Option<ComponentId>; MAX_SUBCMPT_COUNT];
}

pub trait CfuAccessoryComponent {
    /// Accessories need to be able to auto-reject offers if we're already mid-update
    /// Default implementation returns false
    fn is_midupdate(&self) -> impl Future<Output = Result<bool, CfuProtocolError>> {
        async { Ok(false) }
    }
}

pub trait CfuComponentFinalize {
    /// Handles any post-update requirements like delay before reset, or setting boot flags
    /// Default implementation is do nothing
    fn on_update_complete<T, RT: Default, E: Default>(&self, args: Option<T>) -> impl Future<Output = Result<RT, E>> {
        async move {
            if args.is_some() {
                use crate::trace;
                trace!("unexpected args to on_update_complete function");
                trace!("potentially missing implementation of on_update_complete in CfuComponentFinalize trait");
                return Err(E::default());
            }
            Ok(RT::default())
        }
    }
}

pub trait CfuComponentTraits: CfuComponentInfo + Default {}
