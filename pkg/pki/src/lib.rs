//! TLS material handling: secrets to pem files, and the fallback certificate.

pub mod fake;
pub mod ssl;

pub use fake::generate_fake_certificate;
pub use ssl::{pem_checksum, write_secret_certificate};
