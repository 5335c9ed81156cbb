//! Test fixtures: key material, configuration and a scriptable mock server.

pub mod mock_server;

use std::path::PathBuf;
use std::sync::Once;

use sirena_core::{Client, ClientOptions, Config, KeysConfig};
use sirena_crypto::{PrivateKey, PublicKey};

pub use mock_server::{MockHandle, MockSirena};

/// Client ID used by every fixture configuration
pub const CLIENT_ID: u32 = 4242;

/// Password protecting `keys/client_private.pem`
pub const CLIENT_KEY_PASSWORD: &str = "sirena-test";

/// Directory holding the checked-in RSA fixtures
pub fn keys_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/keys")
}

/// Client configuration pointing at the fixture keys
pub fn client_config(address: &str) -> Config {
    Config {
        address: address.to_string(),
        client_id: CLIENT_ID,
        request_timeout_ms: 5_000,
        rekey_interval_secs: 3_600,
        keys: KeysConfig {
            dir: Some(keys_dir()),
            client_private_key: PathBuf::from("client_private.pem"),
            client_private_key_password: CLIENT_KEY_PASSWORD.to_string(),
            server_public_key: PathBuf::from("server_public.pem"),
        },
    }
}

/// Server-side private key (decrypts what the client wraps)
pub fn server_private_key() -> PrivateKey {
    let pem = std::fs::read(keys_dir().join("server_private.pem")).expect("server key fixture");
    PrivateKey::from_pem(&pem, "").expect("server key parses")
}

/// Client public key (server side: encrypts the echo, verifies signatures)
pub fn client_public_key() -> PublicKey {
    let pem = std::fs::read(keys_dir().join("client_public.pem")).expect("client key fixture");
    PublicKey::from_pem(&pem).expect("client public key parses")
}

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Start `mock` on an in-memory stream and build a client against it
pub async fn connect_in_memory(
    mock: MockSirena,
    config: Config,
    options: ClientOptions,
) -> (sirena_core::Result<Client>, MockHandle) {
    init_tracing();
    let (client_side, server_side) = tokio::io::duplex(256 * 1024);
    let handle = mock.spawn(server_side);
    let client = Client::with_stream(client_side, config, options).await;
    (client, handle)
}
