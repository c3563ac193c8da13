//! Participant identity: secp256k1 keys addressed by their x-only public key,
//! written as 64 lowercase hex chars on the wire.

use std::fmt;
use std::str::FromStr;

use bech32::{Bech32, Hrp};
use once_cell::sync::Lazy;
use secp256k1::{schnorr, All, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};
use serde::{Deserialize, Serialize};

use crate::errors::{IdentityError, ProtocolError};

pub mod signer;

pub use signer::{signer_from_settings, CommandSigner, EventSigner, LocalKeySigner};

pub(crate) static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

const NSEC_HRP: Hrp = Hrp::parse_unchecked("nsec");
const NPUB_HRP: Hrp = Hrp::parse_unchecked("npub");

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(String);

impl PublicKey {
    pub fn from_hex(hex_key: &str) -> Result<Self, IdentityError> {
        let normalized = hex_key.trim().to_ascii_lowercase();
        if normalized.len() != 64 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IdentityError::InvalidPublicKey(hex_key.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs and the console, e.g. `3bf0c63f…`.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }

    pub fn to_npub(&self) -> Result<String, IdentityError> {
        let bytes = hex::decode(&self.0)
            .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))?;
        bech32::encode::<Bech32>(NPUB_HRP, &bytes)
            .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))
    }

    pub(crate) fn to_xonly(&self) -> Result<XOnlyPublicKey, ProtocolError> {
        XOnlyPublicKey::from_str(&self.0).map_err(|e| ProtocolError::InvalidSignature(e.to_string()))
    }
}

impl TryFrom<String> for PublicKey {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<PublicKey> for String {
    fn from(value: PublicKey) -> Self {
        value.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A locally held secret key.
#[derive(Clone)]
pub struct Keys {
    keypair: Keypair,
    public_key: PublicKey,
}

impl Keys {
    pub fn generate() -> Self {
        let secret = SecretKey::new(&mut rand::thread_rng());
        Self::from_secret(secret)
    }

    /// Accepts `nsec1…` or 64 hex chars.
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(IdentityError::MissingSecretKey);
        }
        if input.to_ascii_lowercase().starts_with("nsec1") {
            Self::from_nsec(input)
        } else {
            Self::from_secret_hex(input)
        }
    }

    pub fn from_nsec(nsec: &str) -> Result<Self, IdentityError> {
        let (hrp, data) =
            bech32::decode(nsec.trim()).map_err(|e| IdentityError::InvalidNsec(e.to_string()))?;
        if hrp != NSEC_HRP {
            return Err(IdentityError::InvalidNsec(format!(
                "expected nsec prefix, got {}",
                hrp
            )));
        }
        Self::from_secret_bytes(&data)
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| IdentityError::InvalidSecretKey(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    fn from_secret_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| IdentityError::InvalidSecretKey(e.to_string()))?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let keypair = Keypair::from_secret_key(&SECP, &secret);
        let (xonly, _parity) = keypair.x_only_public_key();
        let public_key = PublicKey(hex::encode(xonly.serialize()));
        Self {
            keypair,
            public_key,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }

    pub fn to_nsec(&self) -> Result<String, IdentityError> {
        bech32::encode::<Bech32>(NSEC_HRP, &self.keypair.secret_bytes())
            .map_err(|e| IdentityError::InvalidSecretKey(e.to_string()))
    }

    /// BIP-340 signature over a 32-byte event id.
    pub(crate) fn sign_digest(&self, digest: [u8; 32]) -> schnorr::Signature {
        let message = Message::from_digest(digest);
        SECP.sign_schnorr_no_aux_rand(&message, &self.keypair)
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}
