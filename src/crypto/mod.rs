//! Field-level encryption subsystem.
//!
//! # Data Flow
//! ```text
//! KeyMaterial (startup)
//!     → keyring.rs (versioned keys, one active)
//!     → cipher.rs (AES-256-GCM seal/open)
//!
//! persistence layer write: plaintext → encrypt → EncryptedField → column
//! persistence layer read:  column → EncryptedField → decrypt → plaintext
//! ```

pub mod cipher;
pub mod keyring;

pub use cipher::{CipherError, CipherService, EncryptedField};
pub use keyring::KeyState;
