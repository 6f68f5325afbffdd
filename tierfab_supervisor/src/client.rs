//! Client side of the ingress: one connection, one request, no reply.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::debug;

use tierfab_core::Request;

use crate::error::FabricError;

pub fn send_request(path: &Path, request: &Request) -> Result<(), FabricError> {
    let mut stream = UnixStream::connect(path).map_err(|source| FabricError::Connect {
        path: path.to_path_buf(),
        source,
    })?;
    stream
        .write_all(&request.encode())
        .map_err(|source| FabricError::Io {
            context: "failed to send request",
            source,
        })?;
    debug!(path = %path.display(), client_id = request.client_id, "request sent");
    Ok(())
}
