// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM request/response correlation.
 *
 * Copyright (c) 2025 Code Construct
 */

//! Correlates PLDM responses with outstanding requests.
//!
//! A [`Requester`] allocates an instance ID for each request, and keeps the
//! request pending until a response with the same endpoint, instance ID,
//! PLDM type and command arrives, or its deadline passes. Each request
//! carries a caller-defined cookie, returned in its [`Completion`].
//!
//! Time is supplied by the caller through [`Requester::update`], in
//! milliseconds from an arbitrary monotonic origin.

use std::collections::BTreeMap;

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use mctp::Eid;
use pldm::{PldmHeader, PldmRequest, PldmResponse};

use crate::iid::{InstanceId, SharedInstanceIds};
use crate::{Error, Result};

/// Default time to wait for a response, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u32 = 2000;

/// Default number of times a request is resent after a timeout.
pub const DEFAULT_RETRIES: u8 = 2;

/// Sends PLDM messages to endpoints.
///
/// Messages are complete PLDM messages, without MCTP framing.
pub trait Transport {
    fn send(&mut self, eid: Eid, msg: &[u8]) -> mctp::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, eid: Eid, msg: &[u8]) -> mctp::Result<()> {
        (**self).send(eid, msg)
    }
}

/// Response timeout and retry policy
#[derive(Debug, Clone)]
pub struct RequesterConfig {
    /// Milliseconds to wait for each response
    pub timeout_ms: u32,
    /// Resends after a timeout, before failing
    pub retries: u8,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
        }
    }
}

#[derive(Debug)]
struct Pending<C> {
    typ: u8,
    cmd: u8,
    // Encoded request, for resends
    msg: Vec<u8>,
    deadline: u64,
    retries_left: u8,
    cookie: C,
}

/// The outcome of a request.
#[derive(Debug)]
pub struct Completion<C> {
    pub eid: Eid,
    pub iid: InstanceId,
    pub cookie: C,
    /// The response, or [`Error::TimedOut`], or a decode failure of a
    /// matching response.
    pub result: Result<PldmResponse>,
}

/// Tracks outstanding requests.
#[derive(Debug)]
pub struct Requester<C> {
    ids: SharedInstanceIds,
    config: RequesterConfig,
    pending: BTreeMap<(Eid, InstanceId), Pending<C>>,
    now: u64,
}

impl<C> Requester<C> {
    /// Create a new `Requester` allocating from `ids`.
    ///
    /// `now_millis` is the current timestamp, as later passed to
    /// [`update()`](Self::update).
    pub fn new(
        ids: SharedInstanceIds,
        config: RequesterConfig,
        now_millis: u64,
    ) -> Self {
        Self {
            ids,
            config,
            pending: BTreeMap::new(),
            now: now_millis,
        }
    }

    /// Sends a request, returning its allocated instance ID.
    ///
    /// The instance ID field of `req` is overwritten. Returns
    /// [`Error::ResourceExhausted`] if no instance ID is free. On a
    /// transport failure the instance ID is released before returning
    /// [`Error::Transport`].
    pub fn register_request(
        &mut self,
        transport: &mut impl Transport,
        eid: Eid,
        mut req: PldmRequest,
        cookie: C,
    ) -> Result<InstanceId> {
        let iid = self.ids.borrow_mut().next(eid)?;
        if self.pending.contains_key(&(eid, iid)) {
            // released elsewhere while still outstanding here
            error!("Duplicate pending request eid {eid} iid {iid}");
            self.ids.borrow_mut().free(eid, iid)?;
            return Err(Error::InvalidState("duplicate pending request"));
        }
        req.iid = iid.value();

        let sent = req
            .to_bytes()
            .map_err(Error::from)
            .and_then(|msg| {
                transport.send(eid, &msg)?;
                Ok(msg)
            });

        let msg = match sent {
            Ok(m) => m,
            Err(e) => {
                warn!("Request to eid {eid} cmd 0x{:02x} failed: {e}", req.cmd);
                self.ids.borrow_mut().free(eid, iid)?;
                return Err(e);
            }
        };

        trace!(
            "Sent eid {eid} iid {iid} type {} cmd 0x{:02x}",
            req.typ,
            req.cmd
        );

        let p = Pending {
            typ: req.typ,
            cmd: req.cmd,
            msg,
            deadline: self.now + u64::from(self.config.timeout_ms),
            retries_left: self.config.retries,
            cookie,
        };
        self.pending.insert((eid, iid), p);
        Ok(iid)
    }

    /// Handles a received message.
    ///
    /// Returns the completion for a matching outstanding request. Messages
    /// that match nothing are discarded. A matching message that fails to
    /// decode completes the request with the decode error.
    pub fn on_response(&mut self, eid: Eid, msg: &[u8]) -> Option<Completion<C>> {
        let hdr = match PldmHeader::decode(msg) {
            Ok(h) => h,
            Err(e) => {
                debug!("Discarding bad message from eid {eid}: {e}");
                return None;
            }
        };

        if hdr.request {
            debug!("Discarding request from eid {eid} cmd 0x{:02x}", hdr.cmd);
            return None;
        }

        let iid = InstanceId::new(hdr.iid)?;
        let key = (eid, iid);
        match self.pending.get(&key) {
            Some(p) if p.typ == hdr.typ && p.cmd == hdr.cmd => (),
            Some(p) => {
                debug!(
                    "Discarding response eid {eid} iid {iid} type {} cmd 0x{:02x}, expected type {} cmd 0x{:02x}",
                    hdr.typ, hdr.cmd, p.typ, p.cmd
                );
                return None;
            }
            None => {
                debug!("Discarding unexpected response eid {eid} iid {iid}");
                return None;
            }
        }

        let p = self.pending.remove(&key)?;
        self.release(eid, iid);

        let result = PldmResponse::from_buf(msg).map_err(|e| {
            warn!("Bad response from eid {eid} iid {iid}: {e}");
            Error::from(e)
        });
        Some(Completion {
            eid,
            iid,
            cookie: p.cookie,
            result,
        })
    }

    /// Expires requests past their deadline, resending those with retries
    /// remaining.
    ///
    /// Returns the milliseconds until the next deadline, `u32::MAX` if
    /// none are pending, along with completions for timed out requests.
    /// Returns [`Error::InvalidState`] if time goes backwards.
    pub fn update(
        &mut self,
        transport: &mut impl Transport,
        now_millis: u64,
    ) -> Result<(u32, Vec<Completion<C>>)> {
        if now_millis < self.now {
            error!("Time went backwards, {} to {now_millis}", self.now);
            return Err(Error::InvalidState("time went backwards"));
        }
        self.now = now_millis;

        let timeout_ms = u64::from(self.config.timeout_ms);
        let expired: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now_millis)
            .map(|(k, _)| *k)
            .collect();

        let mut done = Vec::new();
        for (eid, iid) in expired {
            let Some(p) = self.pending.get_mut(&(eid, iid)) else {
                continue;
            };

            if p.retries_left > 0 {
                p.retries_left -= 1;
                p.deadline = now_millis + timeout_ms;
                debug!(
                    "Retrying eid {eid} iid {iid} cmd 0x{:02x}, {} left",
                    p.cmd, p.retries_left
                );
                // A failed resend is left to time out
                if let Err(e) = transport.send(eid, &p.msg) {
                    warn!("Resend to eid {eid} failed: {e}");
                }
                continue;
            }

            if let Some(p) = self.pending.remove(&(eid, iid)) {
                debug!("Timed out eid {eid} iid {iid} cmd 0x{:02x}", p.cmd);
                self.release(eid, iid);
                done.push(Completion {
                    eid,
                    iid,
                    cookie: p.cookie,
                    result: Err(Error::TimedOut),
                });
            }
        }

        Ok((self.next_timeout(), done))
    }

    /// Milliseconds until the next deadline, `u32::MAX` if none.
    pub fn next_timeout(&self) -> u32 {
        self.pending
            .values()
            .map(|p| p.deadline.saturating_sub(self.now))
            .min()
            .map_or(u32::MAX, |t| t.try_into().unwrap_or(u32::MAX))
    }

    /// Number of outstanding requests.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of outstanding requests to `eid`.
    pub fn pending_for(&self, eid: Eid) -> usize {
        self.pending.keys().filter(|(e, _)| *e == eid).count()
    }

    /// The shared instance ID pools.
    pub fn instance_ids(&self) -> &SharedInstanceIds {
        &self.ids
    }

    fn release(&mut self, eid: Eid, iid: InstanceId) {
        // Errors are logged by free()
        let _ = self.ids.borrow_mut().free(eid, iid);
    }
}
