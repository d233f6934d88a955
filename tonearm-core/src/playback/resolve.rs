//! File-to-decoder resolution

use std::path::Path;
use std::sync::Arc;
use tonearm_common::registry::ids;
use tonearm_common::{CapabilityRegistry, Decoder, Error, Result, ServiceId};
use tracing::debug;

/// Decoder ids to try for a file extension, most specific first
fn candidates(extension: &str) -> Vec<ServiceId> {
    let specific = match extension {
        "wav" | "wave" => Some(ids::DECODER_WAV),
        "flac" => Some(ids::DECODER_FLAC),
        "mp3" | "mpg" | "mpeg" => Some(ids::DECODER_MPEG),
        _ => None,
    };
    specific.into_iter().chain(Some(ids::DECODER_PCM)).collect()
}

/// Pick the registered decoder for `path`.
///
/// The decoder matching the file extension wins; otherwise the raw PCM
/// decoder is used when one is registered.
pub fn resolve_decoder(registry: &CapabilityRegistry, path: &Path) -> Result<Arc<dyn Decoder>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    for id in candidates(&extension) {
        if let Some(decoder) = registry.query_decoder(id) {
            debug!("Resolved {} to decoder {} ({})", path.display(), decoder.name(), id);
            return Ok(decoder);
        }
    }

    Err(Error::NotSupported(format!(
        "no decoder registered for {}",
        path.display()
    )))
}
