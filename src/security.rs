//! Per-frame CBC-style encryption and MIC (spec.md §4.8), grounded on
//! `nwkSecurity.c`. Cooperates with an asynchronous AES oracle
//! ([`crate::aes_oracle::EncryptOracle`]) with exactly one request
//! outstanding at a time, serialised across all frames — a second frame
//! needing security waits in its `*Pending` state until the active one
//! reaches `Confirm`.

use crate::config::SECURITY_MIC_SIZE;
use crate::frame::{FrameBuffer, FrameState, SecurityState};
use crate::pool::FramePool;

/// What finished when [`Security::task_handler`] returns `Some`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityConfirm {
    /// Encryption complete; hand back to TX at `Send`.
    Encrypted(usize),
    /// Decryption complete; `bool` is whether the MIC verified. Hand back
    /// to RX at `Indicate` (pass) or `Finish` (fail) — MIC failure is never
    /// surfaced to the application (spec.md §7).
    Decrypted(usize, bool),
}

#[derive(Default)]
pub struct Security {
    active: Option<usize>,
    size: usize,
    offset: usize,
    encrypt: bool,
    vector: [u8; 16],
}

impl Security {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an oracle request has actually been issued for the active
    /// frame and is ready to be confirmed — distinct from merely having
    /// claimed a frame (`Process`, before `task_handler` has called
    /// `oracle.request` on it).
    pub fn is_waiting<const N: usize>(&self, pool: &FramePool<N>) -> bool {
        match self.active {
            Some(idx) => matches!(pool.get(idx).state, FrameState::Security(SecurityState::Wait)),
            None => false,
        }
    }

    /// `nwkSecurityProcess`: hand a frame owned by TX (`Encrypt`) or RX
    /// (`Decrypt`) over to security.
    pub fn process(frame: &mut FrameBuffer, encrypt: bool) {
        frame.state = FrameState::Security(if encrypt {
            SecurityState::EncryptPending
        } else {
            SecurityState::DecryptPending
        });
    }

    fn start(&mut self, frame: &mut FrameBuffer) {
        let header = frame.header();
        let v0 = header.nwk_seq as u32;
        let v1 = ((header.nwk_dst_addr as u32) << 16) | header.nwk_dst_endpoint as u32;
        let v2 = ((header.nwk_src_addr as u32) << 16) | header.nwk_src_endpoint as u32;
        let v3 = ((header.mac_dst_pan_id as u32) << 16) | header.nwk_fcf.into_bytes()[0] as u32;

        self.vector[0..4].copy_from_slice(&v0.to_le_bytes());
        self.vector[4..8].copy_from_slice(&v1.to_le_bytes());
        self.vector[8..12].copy_from_slice(&v2.to_le_bytes());
        self.vector[12..16].copy_from_slice(&v3.to_le_bytes());

        self.size = frame.payload_len_without_mic();
        self.offset = 0;
        self.encrypt = matches!(frame.state, FrameState::Security(SecurityState::EncryptPending));

        frame.state = FrameState::Security(SecurityState::Process);
    }

    /// `vmic = V0 ^ V1 ^ V2 ^ V3`, computed lane-wise over whatever bytes
    /// the vector holds at the end of processing (spec.md §4.8).
    fn vmic(&self) -> [u8; SECURITY_MIC_SIZE] {
        let mut out = [0u8; SECURITY_MIC_SIZE];
        for k in 0..SECURITY_MIC_SIZE {
            out[k] = self.vector[k] ^ self.vector[4 + k] ^ self.vector[8 + k] ^ self.vector[12 + k];
        }
        out
    }

    fn finish(&self, frame: &mut FrameBuffer) -> bool {
        let vmic = self.vmic();
        if self.encrypt {
            frame.mic_mut().copy_from_slice(&vmic);
            true
        } else {
            frame.mic() == vmic
        }
    }

    /// `nwkSecurityTaskHandler`'s non-AES-request half: picks up a newly
    /// pending frame, or finalises one whose AES processing has completed.
    /// Returns `Some` exactly when a frame's security handling is done.
    pub fn task_handler<const N: usize>(
        &mut self,
        pool: &mut FramePool<N>,
        oracle: &mut impl crate::aes_oracle::EncryptOracle,
        key: &[u8; 16],
    ) -> Option<SecurityConfirm> {
        if let Some(idx) = self.active {
            let frame = pool.get_mut(idx);
            match frame.state {
                FrameState::Security(SecurityState::Process) => {
                    frame.state = FrameState::Security(SecurityState::Wait);
                    oracle.request(&mut self.vector, key);
                    None
                }
                FrameState::Security(SecurityState::Confirm) => {
                    let mic_ok = self.finish(frame);
                    self.active = None;
                    Some(if self.encrypt {
                        SecurityConfirm::Encrypted(idx)
                    } else {
                        SecurityConfirm::Decrypted(idx, mic_ok)
                    })
                }
                _ => None,
            }
        } else {
            for idx in pool.iter_indices() {
                let frame = pool.get_mut(idx);
                if matches!(
                    frame.state,
                    FrameState::Security(SecurityState::EncryptPending)
                        | FrameState::Security(SecurityState::DecryptPending)
                ) {
                    self.active = Some(idx);
                    self.start(frame);
                    return None;
                }
            }
            None
        }
    }

    /// `SYS_EncryptConf`: the AES oracle has replaced `self.vector` with
    /// `aes128_ecb(key, old_vector)` in place. XOR it into the current
    /// payload block, advance the keystream per spec.md §4.8, and decide
    /// whether more blocks remain.
    ///
    /// Called by [`crate::Nwk::task_handler`] after popping an
    /// `AesEvent::EncryptConf` out of the AES event mailbox (spec.md §6) —
    /// never directly from interrupt context.
    ///
    /// Open Question 2 (spec.md §9): firing with no active frame is a
    /// protocol violation. Debug-asserted; ignored in release builds.
    pub fn on_encrypt_conf<const N: usize>(&mut self, pool: &mut FramePool<N>) {
        let Some(idx) = self.active else {
            debug_assert!(false, "SYS_EncryptConf with no active security frame");
            return;
        };
        let frame = pool.get_mut(idx);
        debug_assert_eq!(frame.state, FrameState::Security(SecurityState::Wait));

        let block = self.size.min(crate::config::SECURITY_BLOCK_SIZE);
        let text = &mut frame.payload_mut()[self.offset..self.offset + block];

        for i in 0..block {
            text[i] ^= self.vector[i];
            if self.encrypt {
                self.vector[i] = text[i];
            } else {
                self.vector[i] ^= text[i];
            }
        }

        self.offset += block;
        self.size -= block;

        frame.state = FrameState::Security(if self.size > 0 {
            SecurityState::Process
        } else {
            SecurityState::Confirm
        });
    }
}
