//! Host-side configuration surface.
//!
//! Mirrors the driver configuration knobs the original Windows host driver read out of the
//! registry (`SupportResumeOnConnect`, `SupportProtocolTransactionSkipOptimization`, per-component
//! offer/payload file paths). This crate doesn't parse a registry or config file itself: the
//! embedding application is expected to populate [`HostConfig`] from whatever configuration
//! surface it already owns, then hand it to the host engine.

use crate::protocol_definitions::{ComponentId, MAX_CMPT_COUNT};

/// Upper bound on how many components a single [`HostConfig`] can describe.
pub const MAX_CONFIGURED_COMPONENTS: usize = MAX_CMPT_COUNT;

/// Per-component file pair the host reads an offer and payload from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ComponentFiles<'a> {
    pub component_id: ComponentId,
    pub offer_path: &'a str,
    pub payload_path: &'a str,
}

/// Host-side transport selector. Transport-specific framing lives outside this crate; this
/// only records which one the host should drive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportType {
    #[default]
    Hid,
    I2c,
    Spi,
    Uart,
}

/// Host-side configuration surface (see §6 of the design notes this crate implements).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HostConfig<'a> {
    /// If true, a reconnect makes the host re-query this component's version and skip it when
    /// that version already matches the offer, rather than unconditionally re-offering it. The
    /// protocol has no mid-stream resume: any offer that does proceed after a reconnect starts
    /// content from the first block, never from wherever the prior connection left off.
    pub support_resume_on_connect: bool,
    /// If true, the host skips re-offering components whose version already matches and goes
    /// straight to the next component instead of transacting a full offer/reject round trip.
    pub support_protocol_transaction_skip_optimization: bool,
    pub transport_type: TransportType,
    /// Number of content-block reads the host pends ahead of acknowledging, for transports
    /// that support pipelining. `1` disables pipelining.
    pub pended_reads: u8,
    pub components: &'a [ComponentFiles<'a>],
}

impl<'a> HostConfig<'a> {
    pub const fn new(components: &'a [ComponentFiles<'a>]) -> Self {
        Self {
            support_resume_on_connect: false,
            support_protocol_transaction_skip_optimization: false,
            transport_type: TransportType::Hid,
            pended_reads: 1,
            components,
        }
    }
}

impl<'a> Default for HostConfig<'a> {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    #[test]
    fn default_config_has_no_components_and_no_pipelining() {
        let config = HostConfig::default();
        assert!(config.components.is_empty());
        assert_eq!(config.pended_reads, 1);
        assert!(!config.support_resume_on_connect);
        assert!(!config.support_protocol_transaction_skip_optimization);
    }

    #[test]
    fn config_can_describe_multiple_components() {
        static FILES: [ComponentFiles; 2] = [
            ComponentFiles {
                component_id: 1,
                offer_path: "primary.offer.bin",
                payload_path: "primary.bin",
            },
            ComponentFiles {
                component_id: 2,
                offer_path: "secondary.offer.bin",
                payload_path: "secondary.bin",
            },
        ];
        let config = HostConfig::new(&FILES);
        assert_eq!(config.components.len(), 2);
        assert_eq!(config.components[1].component_id, 2);
    }
}
