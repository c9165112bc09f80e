use tracing::{debug, warn};

use crate::error::Error;
use crate::queue::{Kernel, RequestQueue};
use crate::status;

/// Listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    /// Stopped; waiting for its in-flight requests to finish.
    Draining,
}

/// One bound URL and its request queue.
pub struct Listener<Q> {
    pub queue: Q,
    pub url: String,
    /// New-request receives still to be issued. Every accept completion adds
    /// one back; replenishment issues them.
    pub pending_accepts: u32,
    pub state: ListenerState,
    pub generation: u32,
    /// Request contexts referencing this listener.
    pub live: u32,
    /// Replenishment is failing to allocate; the starvation error has been
    /// reported for this episode.
    pub starved: bool,
}

impl<Q: RequestQueue> Listener<Q> {
    pub fn new(queue: Q, url: &str, pending_accepts: u32, generation: u32) -> Self {
        Listener {
            queue,
            url: url.to_string(),
            pending_accepts,
            state: ListenerState::Listening,
            generation,
            live: 0,
            starved: false,
        }
    }

    #[inline]
    pub fn is_listening(&self) -> bool {
        self.state == ListenerState::Listening
    }

    /// Close the queue and stop accepting. The kernel aborts outstanding
    /// operations.
    pub fn stop(&mut self) -> Result<(), Error> {
        self.state = ListenerState::Draining;
        self.pending_accepts = 0;
        self.queue.close().map_err(|code| {
            warn!(url = %self.url, code, "closing request queue failed");
            Error::Bind { code }
        })
    }
}

/// Queue name for a URL: `/` replaced by `_`, so every process that binds
/// the same URL opens the same queue.
pub fn queue_name(url: &str) -> String {
    url.replace('/', "_")
}

/// Open the queue for `url`, creating it when it does not exist.
pub fn bind<K: Kernel>(kernel: &mut K, url: &str, queue_length: u32) -> Result<K::Queue, Error> {
    let name = queue_name(url);
    match kernel.open_queue(&name) {
        Ok(queue) => {
            debug!(url, name = %name, "opened existing request queue");
            Ok(queue)
        }
        Err(status::ERROR_FILE_NOT_FOUND) => {
            let queue = kernel
                .create_queue(&name, url, queue_length)
                .map_err(|code| Error::Bind { code })?;
            debug!(url, name = %name, queue_length, "created request queue");
            Ok(queue)
        }
        Err(code) => Err(Error::Bind { code }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names() {
        assert_eq!(queue_name("http://*:8080/"), "http:__*:8080_");
        assert_eq!(
            queue_name("http://localhost:80/app/api/"),
            "http:__localhost:80_app_api_"
        );
    }
}
