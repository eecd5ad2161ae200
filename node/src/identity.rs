use std::{fmt, str::FromStr};

use libp2p::identity::{DecodingError, Keypair};
use libp2p::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum KeyKind {
    #[default]
    #[display(fmt = "secp256k1")]
    Secp256k1,
    #[display(fmt = "ed25519")]
    Ed25519,
}

#[derive(thiserror::Error, Debug, Clone)]
#[error("unknown key kind `{0}`, expected `secp256k1` or `ed25519`")]
pub struct KeyKindFromStrError(String);

impl FromStr for KeyKind {
    type Err = KeyKindFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "secp256k1" => Ok(Self::Secp256k1),
            "ed25519" => Ok(Self::Ed25519),
            _ => Err(KeyKindFromStrError(s.to_owned())),
        }
    }
}

/// Node identity.
///
/// The text form is the hex encoded libp2p protobuf private key, so the
/// same string can be handed to any libp2p implementation.
#[derive(Clone)]
pub struct SecretKey(Keypair);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&"***").finish()
    }
}

impl SecretKey {
    pub fn rand() -> Self {
        Self::generate(KeyKind::default())
    }

    pub fn generate(kind: KeyKind) -> Self {
        match kind {
            KeyKind::Secp256k1 => Self(Keypair::generate_secp256k1()),
            KeyKind::Ed25519 => Self(Keypair::generate_ed25519()),
        }
    }

    pub fn from_protobuf_encoding(bytes: &[u8]) -> Result<Self, DecodingError> {
        Keypair::from_protobuf_encoding(bytes).map(Self)
    }

    pub fn to_protobuf_encoding(&self) -> Result<Vec<u8>, DecodingError> {
        self.0.to_protobuf_encoding()
    }

    pub fn kind(&self) -> KeyKind {
        if self.0.clone().try_into_ed25519().is_ok() {
            KeyKind::Ed25519
        } else {
            KeyKind::Secp256k1
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.0.public().to_peer_id()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.0
    }
}

impl From<Keypair> for SecretKey {
    fn from(value: Keypair) -> Self {
        Self(value)
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // only secp256k1 and ed25519 keys can be constructed, both encode
        let bytes = self.to_protobuf_encoding().map_err(|_| fmt::Error)?;
        write!(f, "{}", hex::encode(bytes))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SecretKeyFromStrError {
    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("private key decode error: {0}")]
    Decode(#[from] DecodingError),
}

impl FromStr for SecretKey {
    type Err = SecretKeyFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        Ok(Self::from_protobuf_encoding(&bytes)?)
    }
}
