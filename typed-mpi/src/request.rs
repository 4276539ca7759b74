//! Non-blocking send requests.
use log::error;
use crate::Result;
use crate::transport::{RequestId, Transport};

/// Outstanding non-blocking send.
///
/// Owns the outgoing bytes until the transport reports completion. Dropping
/// an incomplete request waits for it.
#[must_use]
pub struct SendRequest<'a, T: Transport> {
    transport: &'a T,
    request: Option<RequestId>,
    // Read by the transport until the request completes
    _data: Vec<u8>,
}

impl<'a, T: Transport> SendRequest<'a, T> {
    pub(crate) fn new(transport: &'a T, request: RequestId, data: Vec<u8>) -> SendRequest<'a, T> {
        SendRequest {
            transport,
            request: Some(request),
            _data: data,
        }
    }

    /// Block until the send completes.
    pub fn wait(mut self) -> Result<()> {
        match self.request.take() {
            Some(request) => Ok(self.transport.wait(request)?),
            None => Ok(()),
        }
    }

    /// Check for completion without blocking.
    pub fn test(&mut self) -> Result<bool> {
        let Some(request) = self.request else {
            return Ok(true);
        };
        let done = self.transport.test(request)?;
        if done {
            self.request = None;
        }
        Ok(done)
    }
}

impl<'a, T: Transport> Drop for SendRequest<'a, T> {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            if let Err(err) = self.transport.wait(request) {
                error!("Failed to complete send request {:?}: {}", request, err);
            }
        }
    }
}
