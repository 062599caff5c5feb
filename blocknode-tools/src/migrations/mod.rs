//! Concrete migrations shipped with the tools

mod verification_storage;

pub use verification_storage::VerificationStorageMigration;
