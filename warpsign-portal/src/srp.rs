// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Apple's SRP-6a login exchange.
//!
//! Grounded on the GSA SRP flow shown in the iCloud/GrandSlam auth clients
//! (`AppleAccount::login`/`Account::new` style request shapes): the 2048-bit
//! group, SHA-256 hash, and PBKDF2 password stretching ahead of the
//! standard SRP math. Apple derives the SRP private key `x` from a
//! pre-stretched key rather than the RFC 5054 `H(salt || H(I || ":" || P))`
//! construction, so the stretched key is handed to [`SrpClient::process_reply`]
//! in place of a raw password.

use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::RngCore;
use sha2::{Digest, Sha256};
use srp::client::{SrpClient, SrpClientVerifier};
use srp::groups::G_2048;

use crate::error::{Error, Result};

/// Which key-stretching algorithm the portal told us to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StretchAlgorithm {
    /// `s2k`: PBKDF2-HMAC-SHA256 over `SHA256(password)`.
    S2k,
    /// `s2k_fo`: PBKDF2-HMAC-SHA256 over the hex encoding of `SHA256(password)`.
    S2kFo,
}

impl StretchAlgorithm {
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "s2k" => Ok(Self::S2k),
            "s2k_fo" => Ok(Self::S2kFo),
            other => Err(Error::UnexpectedResponse(format!(
                "unknown password stretching algorithm '{other}'"
            ))),
        }
    }
}

/// Stretch `password` per spec §4.1: SHA-256 the password, optionally
/// hex-encode it, then PBKDF2-HMAC-SHA256 with the portal-provided salt
/// and iteration count.
pub fn stretch_password(
    password: &str,
    salt: &[u8],
    iterations: u32,
    algorithm: StretchAlgorithm,
) -> Vec<u8> {
    let hashed = Sha256::digest(password.as_bytes());
    let intermediate: Vec<u8> = match algorithm {
        StretchAlgorithm::S2k => hashed.to_vec(),
        StretchAlgorithm::S2kFo => hex::encode(hashed).into_bytes(),
    };

    let mut derived = vec![0u8; 32];
    pbkdf2::<Hmac<Sha256>>(&intermediate, salt, iterations, &mut derived);
    derived
}

/// Client-side SRP-6a exchange state, one instance per login attempt.
pub struct SrpExchange {
    client: SrpClient<'static, Sha256>,
    a_private: Vec<u8>,
}

impl SrpExchange {
    /// Start a new exchange, generating a fresh ephemeral private key `a`.
    pub fn new() -> Self {
        let mut a_private = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut a_private);
        Self {
            client: SrpClient::new(&G_2048),
            a_private,
        }
    }

    /// The ephemeral public key `A` to send in the `init` request.
    pub fn public_ephemeral(&self) -> Vec<u8> {
        self.client.compute_public_ephemeral(&self.a_private)
    }

    /// Process the server's challenge (`salt`, `B`) and the stretched
    /// password key, producing a verifier that can compute `M1` and check
    /// the server's `M2`.
    pub fn process_challenge(
        &self,
        username: &str,
        stretched_password: &[u8],
        salt: &[u8],
        b_pub: &[u8],
    ) -> Result<SrpClientVerifier<Sha256>> {
        self.client
            .process_reply(&self.a_private, username.as_bytes(), stretched_password, salt, b_pub)
            .map_err(|e| Error::UnexpectedResponse(format!("SRP exchange failed: {e}")))
    }
}

impl Default for SrpExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2k_fo_hex_encodes_before_stretching() {
        let salt = b"saltsaltsaltsalt";
        let s2k = stretch_password("hunter2", salt, 1000, StretchAlgorithm::S2k);
        let s2k_fo = stretch_password("hunter2", salt, 1000, StretchAlgorithm::S2kFo);
        assert_ne!(s2k, s2k_fo);
    }

    #[test]
    fn stretching_is_deterministic() {
        let salt = b"saltsaltsaltsalt";
        let a = stretch_password("hunter2", salt, 1000, StretchAlgorithm::S2k);
        let b = stretch_password("hunter2", salt, 1000, StretchAlgorithm::S2k);
        assert_eq!(a, b);
    }
}
