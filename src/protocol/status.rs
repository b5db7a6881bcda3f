//! Decoding of the status word that terminates every exchange.
//!
//! After the result fields of a request, the server sends one trailing
//! integer classifying the outcome. Codes 2 and 3 are followed by exactly
//! one human-readable message line; reading that line for any other code
//! would desynchronize the stream, so the decode order here is load-bearing.

use tracing::warn;

use crate::error::{LinkError, Result};
use crate::protocol::channel::Channel;

/// Read and interpret the trailing status word of the current exchange.
///
/// | code | meaning |
/// |---|---|
/// | 0 | success |
/// | 1 | invalid item handle |
/// | 2 | warning (one message line follows; logged, call succeeds) |
/// | 3 | error (one message line follows; surfaced to the caller) |
/// | 9 | invalid license |
/// | 4..=8 | unknown remote problem |
///
/// Anything else does not belong to the taxonomy: the stream is
/// misaligned and the channel is no longer trustworthy.
pub async fn check_status(channel: &mut Channel) -> Result<()> {
    let status = channel.recv_int().await?;
    match status {
        0 => Ok(()),
        1 => Err(LinkError::InvalidItem),
        2 => {
            let message = channel.recv_line().await?;
            warn!("simulator warning: {message}");
            Ok(())
        }
        3 => {
            let message = channel.recv_line().await?;
            Err(LinkError::Remote(message))
        }
        9 => Err(LinkError::InvalidLicense),
        s if (0..10).contains(&s) => Err(LinkError::RemoteUnknown(s)),
        s => Err(LinkError::Protocol(format!("unexpected status word {s}"))),
    }
}
