//! The AES oracle contract this crate consumes (spec.md §6): a 128-bit
//! block cipher with an asynchronous `request → confirm` shape. The
//! primitive itself (and whether it's a hardware AES peripheral or a
//! software implementation) is out of scope for this crate.

/// Implemented by whatever supplies AES-128 encryption. `request` is given
/// the block to encrypt in place and the key; completion is signalled by
/// pushing [`crate::event::AesEvent::EncryptConf`] into the event mailbox
/// the implementor shares with [`crate::Nwk`] (on hardware, typically from
/// an AES-peripheral interrupt handler).
///
/// Exactly one request is ever outstanding at a time (spec.md §4.8):
/// [`crate::security::Security`] will not call `request` again until it has
/// observed the previous completion.
pub trait EncryptOracle {
    fn request(&mut self, block: &mut [u8; 16], key: &[u8; 16]);
}

/// A synchronous stand-in for real asynchronous AES hardware, useful on
/// hosts and in tests. Completes the request immediately; callers still go
/// through the normal event-mailbox path (see [`crate::Nwk::poll_aes`]) so
/// pipeline code does not need to special-case it.
#[cfg(feature = "sync-aes")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncAesOracle;

#[cfg(feature = "sync-aes")]
impl EncryptOracle for SyncAesOracle {
    fn request(&mut self, block: &mut [u8; 16], key: &[u8; 16]) {
        use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
        let cipher = aes::Aes128::new(GenericArray::from_slice(key));
        let mut ga = GenericArray::clone_from_slice(block);
        cipher.encrypt_block(&mut ga);
        block.copy_from_slice(ga.as_slice());
    }
}
