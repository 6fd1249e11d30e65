//! The endpoint table (spec.md §4.10): up to `N` application endpoint
//! slots. Slot 0 is reserved for the NWK service endpoint (ACK,
//! `ROUTE_ERROR`), handled directly by [`crate::rx::Rx`] rather than routed
//! through this table — see that module.

use crate::config::SERVICE_ENDPOINT_ID;

pub const IND_OPT_ACK_REQUESTED: u8 = 0x01;
pub const IND_OPT_SECURED: u8 = 0x02;
pub const IND_OPT_LINK_LOCAL: u8 = 0x04;
pub const IND_OPT_BROADCAST_PAN_ID: u8 = 0x08;
pub const IND_OPT_BROADCAST: u8 = 0x10;
pub const IND_OPT_LOCAL: u8 = 0x20;

/// A received frame handed up to an application endpoint.
#[derive(Debug, Clone, Copy)]
pub struct DataInd<'a> {
    pub src_addr: u16,
    pub src_endpoint: u8,
    pub dst_endpoint: u8,
    pub data: &'a [u8],
    pub lqi: u8,
    pub rssi: i8,
    pub options: u8,
}

/// Replaces `NWK_SetAckControl` (spec.md §9's ack-control redesign note): a
/// handler returns whether it consumed the indication and, if so, what
/// control byte to carry back in the NWK ACK.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckDecision {
    pub consumed: bool,
    pub ack_control: u8,
}

impl AckDecision {
    pub const NOT_CONSUMED: Self = Self {
        consumed: false,
        ack_control: 0,
    };

    pub fn consumed(ack_control: u8) -> Self {
        Self {
            consumed: true,
            ack_control,
        }
    }
}

/// `NWK_OpenEndpoint`'s handler, `fn(&DataInd) -> bool` in the original.
pub trait EndpointHandler {
    fn handle(&mut self, ind: &DataInd) -> AckDecision;
}

impl<F> EndpointHandler for F
where
    F: FnMut(&DataInd) -> AckDecision,
{
    fn handle(&mut self, ind: &DataInd) -> AckDecision {
        self(ind)
    }
}

/// Fixed-capacity table of `N` endpoint slots, borrowing each handler for
/// the lifetime `'a` of the owning [`crate::Nwk`].
pub struct EndpointTable<'a, const N: usize> {
    handlers: [Option<&'a mut dyn EndpointHandler>; N],
}

impl<'a, const N: usize> Default for EndpointTable<'a, N> {
    fn default() -> Self {
        Self {
            handlers: core::array::from_fn(|_| None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenEndpointError {
    ReservedId,
    OutOfRange,
}

impl<'a, const N: usize> EndpointTable<'a, N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, id: u8, handler: &'a mut dyn EndpointHandler) -> Result<(), OpenEndpointError> {
        if id == SERVICE_ENDPOINT_ID {
            return Err(OpenEndpointError::ReservedId);
        }
        let idx = id as usize;
        if idx >= N {
            return Err(OpenEndpointError::OutOfRange);
        }
        self.handlers[idx] = Some(handler);
        Ok(())
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut (dyn EndpointHandler + 'a)> {
        self.handlers
            .get_mut(id as usize)
            .and_then(|slot| slot.as_deref_mut())
    }
}
