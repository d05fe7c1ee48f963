//! Process initialization: logging and TLS crypto provider.

mod logger;

use rustls::crypto::{ring::default_provider, CryptoProvider};

pub use logger::init_logger_with;

/// Initializes the crypto provider for TLS operations.
///
/// Must be called before any TLS handshake is attempted. Reinstalling the
/// provider is harmless, so the result is ignored.
pub fn init_crypto_provider() {
    let _ = CryptoProvider::install_default(default_provider());
}
