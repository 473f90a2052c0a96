//! Process-wide value codec registration.
//!
//! Transports that need to turn [`Value`]s into bytes look the codec up here
//! instead of relying on some module having been loaded for its side effects.
//! Registration is an explicit setup step: call [`crate::init`] (which
//! installs [`JsonCodec`] unless a codec was registered first) or
//! [`register`] once, before the first connection is made.
//! [`Connection::connect`](crate::Connection::connect) calls [`crate::init`]
//! itself, so registering a custom codec must happen before that.

use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::Error;

/// Encodes values for the wire and decodes them back.
pub trait Codec: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, Error>;

    fn decode(&self, bytes: &[u8]) -> Result<Value, Error>;
}

/// The default codec: values as JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

static CODEC: OnceLock<Arc<dyn Codec>> = OnceLock::new();

/// Register the process-wide codec.
///
/// The first registration wins; if a codec is already installed it is
/// returned as the error.
pub fn register(codec: impl Codec) -> Result<(), Arc<dyn Codec>> {
    let codec: Arc<dyn Codec> = Arc::new(codec);
    let mut installed = false;
    let current = CODEC.get_or_init(|| {
        installed = true;
        codec
    });
    if installed {
        tracing::debug!(codec = current.name(), "registered value codec");
        Ok(())
    } else {
        Err(current.clone())
    }
}

/// Install [`JsonCodec`] unless a codec is already registered, and return
/// the registered codec.
pub fn install_default() -> Arc<dyn Codec> {
    CODEC
        .get_or_init(|| {
            tracing::debug!(codec = "json", "installing default value codec");
            Arc::new(JsonCodec)
        })
        .clone()
}

/// The registered codec, if any.
pub fn registered() -> Option<Arc<dyn Codec>> {
    CODEC.get().cloned()
}
