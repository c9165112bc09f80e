//! In-memory request queues.
//!
//! [`LoopbackKernel`] implements [`Kernel`] over named queues held in a
//! shared registry. Clones of a kernel see the same queues, which is how
//! two hosts (standing in for two processes) bind the same URL. A
//! [`LoopbackControl`] is the client side of one queue: it injects
//! requests, chooses whether operations finish inline or on the next poll,
//! injects failures and captures responses.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use protocol_httpq::ResponseHeader;
use tracing::trace;

use crate::completion::{Completion, Issue, Lent, RequestId, UserData, flags};
use crate::listener::queue_name;
use crate::queue::{Kernel, RequestQueue};
use crate::response::{CachePolicy, Outbound};
use crate::status;

/// When a loopback operation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// During the initiating call.
    Inline,
    /// On the next poll.
    Deferred,
}

/// A response as the loopback queue received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub request_id: RequestId,
    pub status: u16,
    pub reason: String,
    pub known: Vec<(ResponseHeader, String)>,
    pub unknown: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub cache: CachePolicy,
    /// Sends received for this response, header send included.
    pub sends: usize,
    /// A send without the more-data flag has been received.
    pub complete: bool,
}

impl CapturedResponse {
    pub fn known(&self, header: ResponseHeader) -> Option<&str> {
        self.known
            .iter()
            .find(|(h, _)| *h == header)
            .map(|(_, v)| v.as_str())
    }
}

struct Incoming {
    head: Vec<u8>,
    body: VecDeque<Vec<u8>>,
}

struct LiveRequest {
    /// The handle that accepted the request.
    owner: Ready,
    body: VecDeque<Vec<u8>>,
    response: Option<CapturedResponse>,
}

#[derive(Default)]
struct Faults {
    accept: Option<u32>,
    body_read: Option<u32>,
    send: Option<u32>,
}

/// Completions awaiting a poll on one queue handle.
type Ready = Rc<RefCell<VecDeque<Completion>>>;

/// An accept waiting for a request to arrive.
struct Parked {
    user_data: UserData,
    buffer: Vec<u8>,
    ready: Ready,
}

struct QueueState {
    url: String,
    queue_length: u32,
    /// Open handles. The queue closes with its last handle.
    handles: usize,
    closed: bool,
    receive_pace: Pace,
    send_pace: Pace,
    next_request_id: u64,
    incoming: VecDeque<Incoming>,
    parked_accepts: VecDeque<Parked>,
    live: HashMap<u64, LiveRequest>,
    responses: Vec<CapturedResponse>,
    faults: Faults,
}

type Shared = Rc<RefCell<QueueState>>;

impl QueueState {
    fn new(url: &str, queue_length: u32) -> Self {
        QueueState {
            url: url.to_string(),
            queue_length,
            handles: 0,
            closed: false,
            receive_pace: Pace::Deferred,
            send_pace: Pace::Deferred,
            next_request_id: 1,
            incoming: VecDeque::new(),
            parked_accepts: VecDeque::new(),
            live: HashMap::new(),
            responses: Vec::new(),
            faults: Faults::default(),
        }
    }

    /// Open a new handle on this queue.
    fn open(shared: &Shared) -> LoopbackQueue {
        shared.borrow_mut().handles += 1;
        LoopbackQueue {
            shared: shared.clone(),
            ready: Ready::default(),
            closed: false,
        }
    }

    /// Hand the next incoming request to an accept.
    fn accept(
        &mut self,
        ud: UserData,
        mut buffer: Vec<u8>,
        incoming: Incoming,
        owner: &Ready,
    ) -> Completion {
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        if incoming.head.len() > buffer.len() {
            trace!(request_id = id.0, "request head exceeds receive buffer");
            return Completion::failed(ud, status::ERROR_MORE_DATA, id, Lent::Receive(buffer));
        }
        let len = incoming.head.len();
        buffer[..len].copy_from_slice(&incoming.head);
        let accept_flags = if incoming.body.is_empty() {
            0
        } else {
            flags::MORE_ENTITY_BODY
        };
        self.live.insert(
            id.0,
            LiveRequest {
                owner: owner.clone(),
                body: incoming.body,
                response: None,
            },
        );
        Completion {
            user_data: ud,
            status: status::NO_ERROR,
            bytes: len as u32,
            flags: accept_flags,
            request_id: id,
            lent: Lent::Receive(buffer),
        }
    }

    fn read_body(&mut self, ud: UserData, id: RequestId, mut buffer: Vec<u8>) -> Completion {
        if let Some(code) = self.faults.body_read.take() {
            return Completion::failed(ud, code, id, Lent::Receive(buffer));
        }
        let Some(request) = self.live.get_mut(&id.0) else {
            return Completion::failed(ud, status::ERROR_CONNECTION_INVALID, id, Lent::Receive(buffer));
        };
        let Some(mut chunk) = request.body.pop_front() else {
            return Completion::failed(ud, status::ERROR_HANDLE_EOF, id, Lent::Receive(buffer));
        };
        let n = chunk.len().min(buffer.len());
        buffer[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            request.body.push_front(chunk.split_off(n));
        }
        Completion {
            user_data: ud,
            status: status::NO_ERROR,
            bytes: n as u32,
            flags: 0,
            request_id: id,
            lent: Lent::Receive(buffer),
        }
    }

    fn send(
        &mut self,
        ud: UserData,
        id: RequestId,
        outbound: Outbound,
        more_data: bool,
        cache: Option<CachePolicy>,
    ) -> Completion {
        if let Some(code) = self.faults.send.take() {
            return Completion::failed(ud, code, id, Lent::Send(outbound));
        }
        let Some(request) = self.live.get_mut(&id.0) else {
            return Completion::failed(ud, status::ERROR_CONNECTION_INVALID, id, Lent::Send(outbound));
        };

        if let Some(head) = &outbound.response {
            request.response = Some(CapturedResponse {
                request_id: id,
                status: head.status(),
                reason: String::from_utf8_lossy(head.reason()).into_owned(),
                known: head
                    .known_headers()
                    .map(|(h, v)| (h, String::from_utf8_lossy(v).into_owned()))
                    .collect(),
                unknown: head
                    .unknown()
                    .iter()
                    .map(|h| {
                        (
                            String::from_utf8_lossy(&h.name).into_owned(),
                            String::from_utf8_lossy(&h.value).into_owned(),
                        )
                    })
                    .collect(),
                body: Vec::new(),
                cache: cache.unwrap_or(CachePolicy::NoCache),
                sends: 0,
                complete: false,
            });
        }
        let Some(response) = request.response.as_mut() else {
            return Completion::failed(ud, status::ERROR_INVALID_PARAMETER, id, Lent::Send(outbound));
        };

        let bytes = outbound.chunk.as_ref().map_or(0, Vec::len);
        if let Some(chunk) = &outbound.chunk {
            response.body.extend_from_slice(chunk);
        }
        response.sends += 1;
        if !more_data {
            response.complete = true;
            if let Some(request) = self.live.remove(&id.0)
                && let Some(response) = request.response
            {
                self.responses.push(response);
            }
        }
        Completion {
            user_data: ud,
            status: status::NO_ERROR,
            bytes: bytes as u32,
            flags: 0,
            request_id: id,
            lent: Lent::Send(outbound),
        }
    }
}

fn deliver(pace: Pace, completion: Completion, ready: &Ready) -> Issue {
    match pace {
        Pace::Inline => Issue::Inline(completion),
        Pace::Deferred => {
            ready.borrow_mut().push_back(completion);
            Issue::Pending
        }
    }
}

fn aborted(user_data: UserData, request: RequestId, lent: Lent) -> Issue {
    Issue::Inline(Completion::failed(
        user_data,
        status::ERROR_OPERATION_ABORTED,
        request,
        lent,
    ))
}

#[derive(Default)]
struct Registry {
    queues: HashMap<String, Shared>,
    bind_fault: Option<u32>,
}

/// An in-memory [`Kernel`]. Clones share one registry of queues.
#[derive(Clone, Default)]
pub struct LoopbackKernel {
    registry: Rc<RefCell<Registry>>,
}

impl LoopbackKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client side of the queue bound to `url`, once a host has created it.
    pub fn control(&self, url: &str) -> Option<LoopbackControl> {
        let registry = self.registry.borrow();
        registry
            .queues
            .get(&queue_name(url))
            .map(|shared| LoopbackControl {
                shared: shared.clone(),
            })
    }

    /// Make the next open-or-create fail with `code`.
    pub fn fail_next_bind(&self, code: u32) {
        self.registry.borrow_mut().bind_fault = Some(code);
    }
}

impl Kernel for LoopbackKernel {
    type Queue = LoopbackQueue;

    fn open_queue(&mut self, name: &str) -> Result<LoopbackQueue, u32> {
        let mut registry = self.registry.borrow_mut();
        if let Some(code) = registry.bind_fault.take() {
            return Err(code);
        }
        registry
            .queues
            .get(name)
            .filter(|shared| !shared.borrow().closed)
            .map(QueueState::open)
            .ok_or(status::ERROR_FILE_NOT_FOUND)
    }

    fn create_queue(
        &mut self,
        name: &str,
        url: &str,
        queue_length: u32,
    ) -> Result<LoopbackQueue, u32> {
        let mut registry = self.registry.borrow_mut();
        if let Some(code) = registry.bind_fault.take() {
            return Err(code);
        }
        if registry
            .queues
            .get(name)
            .is_some_and(|shared| !shared.borrow().closed)
        {
            return Err(status::ERROR_ALREADY_EXISTS);
        }
        let shared = Rc::new(RefCell::new(QueueState::new(url, queue_length)));
        registry.queues.insert(name.to_string(), shared.clone());
        Ok(QueueState::open(&shared))
    }
}

/// Server side of a loopback queue: one handle, with its own completions.
pub struct LoopbackQueue {
    shared: Shared,
    ready: Ready,
    closed: bool,
}

impl RequestQueue for LoopbackQueue {
    fn receive_request(&mut self, user_data: UserData, buffer: Vec<u8>) -> Issue {
        let mut q = self.shared.borrow_mut();
        if self.closed || q.closed {
            return aborted(user_data, RequestId::NULL, Lent::Receive(buffer));
        }
        let pace = q.receive_pace;
        if let Some(code) = q.faults.accept.take() {
            let completion = Completion::failed(user_data, code, RequestId::NULL, Lent::Receive(buffer));
            return deliver(pace, completion, &self.ready);
        }
        match q.incoming.pop_front() {
            Some(incoming) => {
                let completion = q.accept(user_data, buffer, incoming, &self.ready);
                deliver(pace, completion, &self.ready)
            }
            None => {
                q.parked_accepts.push_back(Parked {
                    user_data,
                    buffer,
                    ready: self.ready.clone(),
                });
                Issue::Pending
            }
        }
    }

    fn receive_body(&mut self, user_data: UserData, request: RequestId, buffer: Vec<u8>) -> Issue {
        let mut q = self.shared.borrow_mut();
        if self.closed || q.closed {
            return aborted(user_data, request, Lent::Receive(buffer));
        }
        let completion = q.read_body(user_data, request, buffer);
        deliver(q.receive_pace, completion, &self.ready)
    }

    fn send_response(
        &mut self,
        user_data: UserData,
        request: RequestId,
        outbound: Outbound,
        more_data: bool,
        cache: CachePolicy,
    ) -> Issue {
        let mut q = self.shared.borrow_mut();
        if self.closed || q.closed {
            return aborted(user_data, request, Lent::Send(outbound));
        }
        let completion = q.send(user_data, request, outbound, more_data, Some(cache));
        deliver(q.send_pace, completion, &self.ready)
    }

    fn send_body(
        &mut self,
        user_data: UserData,
        request: RequestId,
        outbound: Outbound,
        more_data: bool,
    ) -> Issue {
        let mut q = self.shared.borrow_mut();
        if self.closed || q.closed {
            return aborted(user_data, request, Lent::Send(outbound));
        }
        let completion = q.send(user_data, request, outbound, more_data, None);
        deliver(q.send_pace, completion, &self.ready)
    }

    fn cancel_request(&mut self, request: RequestId) -> Result<(), u32> {
        let mut q = self.shared.borrow_mut();
        if q.closed {
            return Ok(());
        }
        match q.live.remove(&request.0) {
            Some(_) => {
                trace!(request_id = request.0, "request cancelled");
                Ok(())
            }
            None => Err(status::ERROR_CONNECTION_INVALID),
        }
    }

    fn poll(&mut self, completions: &mut Vec<Completion>) {
        completions.extend(self.ready.borrow_mut().drain(..));
    }

    fn close(&mut self) -> Result<(), u32> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut ready = self.ready.borrow_mut();
        for completion in ready.iter_mut() {
            completion.status = status::ERROR_OPERATION_ABORTED;
            completion.bytes = 0;
        }

        let mut q = self.shared.borrow_mut();
        let (mine, others): (VecDeque<Parked>, VecDeque<Parked>) = q
            .parked_accepts
            .drain(..)
            .partition(|parked| Rc::ptr_eq(&parked.ready, &self.ready));
        q.parked_accepts = others;
        q.live.retain(|_, request| !Rc::ptr_eq(&request.owner, &self.ready));
        for parked in mine {
            ready.push_back(Completion::failed(
                parked.user_data,
                status::ERROR_OPERATION_ABORTED,
                RequestId::NULL,
                Lent::Receive(parked.buffer),
            ));
        }

        q.handles = q.handles.saturating_sub(1);
        if q.handles == 0 {
            q.closed = true;
            q.incoming.clear();
            q.live.clear();
            trace!(url = %q.url, "loopback queue closed");
        }
        Ok(())
    }
}

/// Client side of a loopback queue.
#[derive(Clone)]
pub struct LoopbackControl {
    shared: Shared,
}

impl LoopbackControl {
    /// Queue a request. `head` is the wire-format request line and header
    /// block; `body` is delivered piece by piece (pieces larger than the
    /// host's receive buffer are split). Empty pieces are dropped.
    pub fn push_request<I>(&self, head: &[u8], body: I)
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut q = self.shared.borrow_mut();
        if q.closed {
            return;
        }
        let incoming = Incoming {
            head: head.to_vec(),
            body: body.into_iter().filter(|piece| !piece.is_empty()).collect(),
        };
        match q.parked_accepts.pop_front() {
            Some(parked) => {
                let completion =
                    q.accept(parked.user_data, parked.buffer, incoming, &parked.ready);
                parked.ready.borrow_mut().push_back(completion);
            }
            None => q.incoming.push_back(incoming),
        }
    }

    /// Pace for new-request and body receives.
    pub fn set_receive_pace(&self, pace: Pace) {
        self.shared.borrow_mut().receive_pace = pace;
    }

    /// Pace for header and body sends.
    pub fn set_send_pace(&self, pace: Pace) {
        self.shared.borrow_mut().send_pace = pace;
    }

    /// Fail the next new-request receive with `code`.
    pub fn fail_next_accept(&self, code: u32) {
        self.shared.borrow_mut().faults.accept = Some(code);
    }

    /// Fail the next body receive with `code`.
    pub fn fail_next_body_read(&self, code: u32) {
        self.shared.borrow_mut().faults.body_read = Some(code);
    }

    /// Fail the next send with `code`.
    pub fn fail_next_send(&self, code: u32) {
        self.shared.borrow_mut().faults.send = Some(code);
    }

    /// Completed responses, in completion order.
    pub fn responses(&self) -> Vec<CapturedResponse> {
        self.shared.borrow().responses.clone()
    }

    /// A response still being sent.
    pub fn partial(&self, request: RequestId) -> Option<CapturedResponse> {
        let q = self.shared.borrow();
        q.live.get(&request.0).and_then(|r| r.response.clone())
    }

    /// Requests accepted and not yet answered or cancelled.
    pub fn live_requests(&self) -> usize {
        self.shared.borrow().live.len()
    }

    /// Accepts waiting for a request to arrive.
    pub fn parked_accepts(&self) -> usize {
        self.shared.borrow().parked_accepts.len()
    }

    /// Requests pushed but not yet accepted.
    pub fn backlog(&self) -> usize {
        self.shared.borrow().incoming.len()
    }

    /// Open server-side handles.
    pub fn handles(&self) -> usize {
        self.shared.borrow().handles
    }

    pub fn is_closed(&self) -> bool {
        self.shared.borrow().closed
    }

    pub fn queue_length(&self) -> u32 {
        self.shared.borrow().queue_length
    }

    pub fn url(&self) -> String {
        self.shared.borrow().url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::OpTag;

    fn ud(tag: OpTag) -> UserData {
        UserData::encode(tag, 0, 0)
    }

    fn bind(kernel: &mut LoopbackKernel, url: &str) -> LoopbackQueue {
        kernel.create_queue(&queue_name(url), url, 10).unwrap()
    }

    #[test]
    fn open_missing_queue() {
        let mut kernel = LoopbackKernel::new();
        assert_eq!(
            kernel.open_queue("nope").err(),
            Some(status::ERROR_FILE_NOT_FOUND)
        );
    }

    #[test]
    fn clones_share_queues() {
        let mut a = LoopbackKernel::new();
        let mut b = a.clone();
        bind(&mut a, "http://*:80/");
        assert!(b.open_queue(&queue_name("http://*:80/")).is_ok());
        assert_eq!(
            b.create_queue(&queue_name("http://*:80/"), "http://*:80/", 1).err(),
            Some(status::ERROR_ALREADY_EXISTS)
        );
    }

    #[test]
    fn parked_accept_completes_on_push() {
        let mut kernel = LoopbackKernel::new();
        let mut queue = bind(&mut kernel, "http://*:80/");
        let control = kernel.control("http://*:80/").unwrap();

        assert!(matches!(
            queue.receive_request(ud(OpTag::Accept), vec![0; 64]),
            Issue::Pending
        ));
        assert_eq!(control.parked_accepts(), 1);
        control.push_request(b"GET / HTTP/1.1\r\n\r\n", []);

        let mut out = Vec::new();
        queue.poll(&mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_success());
        assert_eq!(out[0].bytes, 18);
        assert_eq!(out[0].flags & flags::MORE_ENTITY_BODY, 0);
    }

    #[test]
    fn body_is_split_by_buffer_size() {
        let mut kernel = LoopbackKernel::new();
        let mut queue = bind(&mut kernel, "http://*:80/");
        let control = kernel.control("http://*:80/").unwrap();
        control.set_receive_pace(Pace::Inline);
        control.push_request(b"POST / HTTP/1.1\r\n\r\n", [b"abcdef".to_vec()]);

        let Issue::Inline(accept) = queue.receive_request(ud(OpTag::Accept), vec![0; 64]) else {
            panic!("expected inline accept");
        };
        assert_ne!(accept.flags & flags::MORE_ENTITY_BODY, 0);
        let id = accept.request_id;

        let mut sizes = Vec::new();
        loop {
            let Issue::Inline(c) = queue.receive_body(ud(OpTag::ReadBody), id, vec![0; 4]) else {
                panic!("expected inline read");
            };
            if c.status == status::ERROR_HANDLE_EOF {
                break;
            }
            sizes.push(c.bytes);
        }
        assert_eq!(sizes, vec![4, 2]);
    }

    #[test]
    fn oversized_head_reports_more_data() {
        let mut kernel = LoopbackKernel::new();
        let mut queue = bind(&mut kernel, "http://*:80/");
        let control = kernel.control("http://*:80/").unwrap();
        control.set_receive_pace(Pace::Inline);
        control.push_request(b"GET /a-long-url HTTP/1.1\r\n\r\n", []);
        let Issue::Inline(c) = queue.receive_request(ud(OpTag::Accept), vec![0; 8]) else {
            panic!("expected inline accept");
        };
        assert_eq!(c.status, status::ERROR_MORE_DATA);
    }

    #[test]
    fn close_aborts_outstanding() {
        let mut kernel = LoopbackKernel::new();
        let mut queue = bind(&mut kernel, "http://*:80/");
        let _ = queue.receive_request(ud(OpTag::Accept), vec![0; 64]);
        queue.close().unwrap();

        let mut out = Vec::new();
        queue.poll(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status, status::ERROR_OPERATION_ABORTED);

        let Issue::Inline(c) = queue.receive_request(ud(OpTag::Accept), vec![0; 64]) else {
            panic!("expected inline abort");
        };
        assert_eq!(c.status, status::ERROR_OPERATION_ABORTED);
    }

    #[test]
    fn queue_outlives_first_handle() {
        let mut kernel = LoopbackKernel::new();
        let mut first = bind(&mut kernel, "http://*:80/");
        let mut second = kernel.open_queue(&queue_name("http://*:80/")).unwrap();
        let control = kernel.control("http://*:80/").unwrap();
        assert_eq!(control.handles(), 2);

        let _ = first.receive_request(ud(OpTag::Accept), vec![0; 64]);
        let _ = second.receive_request(ud(OpTag::Accept), vec![0; 64]);
        first.close().unwrap();
        assert!(!control.is_closed());
        assert_eq!(control.parked_accepts(), 1);

        // the surviving handle's accept takes the next request
        control.push_request(b"GET / HTTP/1.1\r\n\r\n", []);
        let mut out = Vec::new();
        second.poll(&mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_success());

        second.close().unwrap();
        assert!(control.is_closed());
    }

    #[test]
    fn cancel_forgets_the_request() {
        let mut kernel = LoopbackKernel::new();
        let mut queue = bind(&mut kernel, "http://*:80/");
        let control = kernel.control("http://*:80/").unwrap();
        control.set_receive_pace(Pace::Inline);
        control.push_request(b"POST / HTTP/1.1\r\n\r\n", [b"abc".to_vec()]);

        let Issue::Inline(accept) = queue.receive_request(ud(OpTag::Accept), vec![0; 64]) else {
            panic!("expected inline accept");
        };
        assert_eq!(control.live_requests(), 1);
        assert_eq!(queue.cancel_request(accept.request_id), Ok(()));
        assert_eq!(control.live_requests(), 0);
        assert_eq!(
            queue.cancel_request(accept.request_id),
            Err(status::ERROR_CONNECTION_INVALID)
        );

        let issue = queue.receive_body(ud(OpTag::ReadBody), accept.request_id, vec![0; 8]);
        let Issue::Inline(read) = issue else {
            panic!("expected inline read");
        };
        assert_eq!(read.status, status::ERROR_CONNECTION_INVALID);
    }

    #[test]
    fn close_drops_requests_accepted_by_the_handle() {
        let mut kernel = LoopbackKernel::new();
        let mut first = bind(&mut kernel, "http://*:80/");
        let mut second = kernel.open_queue(&queue_name("http://*:80/")).unwrap();
        let control = kernel.control("http://*:80/").unwrap();
        control.set_receive_pace(Pace::Inline);
        control.push_request(b"GET /a HTTP/1.1\r\n\r\n", []);
        control.push_request(b"GET /b HTTP/1.1\r\n\r\n", []);
        let _ = first.receive_request(ud(OpTag::Accept), vec![0; 64]);
        let _ = second.receive_request(ud(OpTag::Accept), vec![0; 64]);
        assert_eq!(control.live_requests(), 2);

        first.close().unwrap();
        assert_eq!(control.live_requests(), 1);
    }
}
