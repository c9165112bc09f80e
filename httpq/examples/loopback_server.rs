//! A small server over the loopback kernel.
//!
//! The sink collects finished requests; the main loop answers them with a
//! chunked echo of the request body. Run with `RUST_LOG=debug` to see the
//! host's lifecycle logging.

use std::collections::HashMap;

use bytes::Bytes;
use httpq::loopback::{LoopbackKernel, Pace};
use httpq::protocol_httpq::{self, chunked};
use httpq::{Config, Event, EventSink, Flow, Host, RequestHandle, ResponseHead, ServerHandle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const URL: &str = "http://*:8080/echo/";

/// A request whose body has been read and which awaits a response.
struct Finished {
    req: RequestHandle,
    url: String,
    body: Vec<u8>,
}

#[derive(Default)]
struct Echo {
    reading: HashMap<RequestHandle, (String, Vec<u8>)>,
    finished: Vec<Finished>,
}

impl EventSink for Echo {
    fn on_event(&mut self, req: RequestHandle, _server: ServerHandle, event: Event<'_>) -> Flow {
        match event {
            Event::NewRequest(head) => {
                info!(verb = %head.verb, url = %head.url, "request");
                self.reading.insert(req, (head.url.clone(), Vec::new()));
            }
            Event::RequestBody(data) => {
                if let Some((_, body)) = self.reading.get_mut(&req) {
                    body.extend_from_slice(data);
                }
            }
            Event::EndRequest => {
                if let Some((url, body)) = self.reading.remove(&req) {
                    self.finished.push(Finished { req, url, body });
                }
            }
            Event::Written => {}
            Event::Error { kind, code } => {
                warn!(?kind, code, "request failed");
                self.reading.remove(&req);
            }
        }
        Flow::Continue
    }
}

fn respond(host: &mut Host<LoopbackKernel, Echo>, done: Finished) -> Result<(), httpq::Error> {
    let headers = protocol_httpq::classify([
        ("Content-Type", "application/octet-stream"),
        ("Server", "httpq-loopback"),
        ("X-Echo-Url", done.url.as_str()),
    ]);
    let framed = if headers.chunked {
        chunked::frame_all([Bytes::from(done.body)], true)
    } else {
        vec![Bytes::from(done.body)]
    };
    let mut head = ResponseHead::new(200, "OK").classified(&headers).last(true);
    for piece in &framed {
        head = head.chunk(piece);
    }
    host.write_headers(done.req, &head).map(|_| ())
}

fn main() -> Result<(), httpq::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let kernel = LoopbackKernel::new();
    let mut host = Host::new(config, kernel.clone(), Echo::default())?;
    let server = host.listen(URL)?;
    let Some(client) = kernel.control(URL) else {
        return Err(httpq::Error::Config("queue missing after listen".into()));
    };
    client.set_send_pace(Pace::Inline);

    client.push_request(b"GET /echo/ping HTTP/1.1\r\nHost: local\r\n\r\n", []);
    client.push_request(
        b"POST /echo/data HTTP/1.1\r\nHost: local\r\nContent-Length: 11\r\n\r\n",
        [b"hello ".to_vec(), b"world".to_vec()],
    );

    while client.responses().len() < 2 {
        host.turn();
        for done in std::mem::take(&mut host.sink_mut().finished) {
            if let Err(e) = respond(&mut host, done) {
                warn!(error = %e, kind = ?e.kind(), "response failed");
            }
        }
    }

    for response in client.responses() {
        let (body, _) = protocol_httpq::chunked::decode_body(&response.body)?;
        info!(
            status = response.status,
            body = %String::from_utf8_lossy(&body),
            "response"
        );
    }

    host.stop_listen(server)?;
    host.turn();
    let stats = host.stats();
    info!(
        allocated = stats.allocated,
        released = stats.released,
        listeners = stats.listeners,
        accepted = httpq::metrics::REQUESTS_ACCEPTED.value(),
        "stopped"
    );
    Ok(())
}
