//! Concrete backends for the Stowage contracts: plain files on disk for the persister,
//! AES-GCM encrypted files or the OS keychain for secrets.

pub mod encrypted_keeper;
pub mod fs_persister;
pub mod key_provider;
pub mod keyring_keeper;

pub use encrypted_keeper::EncryptedFileKeeper;
pub use fs_persister::FsPersister;
pub use keyring_keeper::KeyringKeeper;
