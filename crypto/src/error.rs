use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("public key is not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("sealed payload signature is invalid")]
    InvalidSignature,

    #[error("sealing failed")]
    SealFailed,

    #[error("unsealing failed: authentication check failed")]
    UnsealFailed,
}
