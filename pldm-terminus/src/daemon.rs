// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Async terminus manager loop.
 *
 * Copyright (c) 2025 Code Construct
 */

//! Runs a [`Manager`] on an async executor.
//!
//! [`Daemon::run`] waits for received messages or the manager's next
//! timeout, whichever comes first. Other tasks on the same executor act on
//! the manager through [`Daemon::with_manager`].

use core::cell::{Cell, RefCell};
use core::future::Future;
use std::time::{Duration, Instant};

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use mctp::Eid;
use smol::Timer;

use crate::config::ManagerConfig;
use crate::iid::{self, InstanceId, SharedInstanceIds};
use crate::manager::Manager;
use crate::requester::Transport;
use crate::sink::PropertySink;
use crate::Result;

/// Longest wait between manager updates, in milliseconds.
///
/// Bounds the delay before changes made through
/// [`with_manager`](Daemon::with_manager) take effect.
pub const MAX_WAIT_MS: u32 = 100;

/// A source of received PLDM messages.
pub trait ResponseSource {
    /// Receives the next message, with its source endpoint.
    ///
    /// The returned future may be dropped before completion, and must not
    /// lose a message when it is.
    fn recv(&mut self) -> impl Future<Output = mctp::Result<(Eid, Vec<u8>)>>;
}

/// Terminus manager daemon
pub struct Daemon<T: Transport, S: PropertySink> {
    manager: RefCell<Manager<T, S>>,
    start: Instant,
    shutdown: Cell<bool>,
}

impl<T: Transport, S: PropertySink> Daemon<T, S> {
    /// Creates a daemon around a new [`Manager`].
    ///
    /// `ids` may be shared with other requesters on the same executor.
    pub fn new(
        config: ManagerConfig,
        transport: T,
        sink: S,
        ids: SharedInstanceIds,
    ) -> Self {
        Self {
            manager: RefCell::new(Manager::new(config, transport, sink, ids, 0)),
            start: Instant::now(),
            shutdown: Cell::new(false),
        }
    }

    /// Milliseconds since the daemon was created.
    pub fn now_millis(&self) -> u64 {
        self.start
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    /// Runs `f` with the manager.
    ///
    /// Must not be called from within `f`.
    pub fn with_manager<R>(&self, f: impl FnOnce(&mut Manager<T, S>) -> R) -> R {
        f(&mut self.manager.borrow_mut())
    }

    /// Stops polling, and makes [`run`](Self::run) return once no requests
    /// remain outstanding.
    pub fn shutdown(&self) {
        info!("Shutting down");
        self.manager.borrow_mut().stop_polling();
        self.shutdown.set(true);
    }

    fn update(&self) -> Result<u32> {
        let now = self.now_millis();
        self.manager.borrow_mut().update(now)
    }

    /// Runs the manager until shutdown or a receive failure.
    pub async fn run(&self, source: &mut impl ResponseSource) -> Result<()> {
        loop {
            let next = self.update()?;

            if self.shutdown.get() && self.manager.borrow().is_idle() {
                debug!("Manager idle, exiting");
                return Ok(());
            }

            let wait = Duration::from_millis(next.min(MAX_WAIT_MS).into());
            let recv = async { Some(source.recv().await) };
            let expire = async {
                Timer::after(wait).await;
                None
            };

            match smol::future::or(recv, expire).await {
                Some(Ok((eid, msg))) => {
                    trace!("Received {} bytes from eid {eid}", msg.len());
                    // Bring deadlines up to date before matching
                    self.update()?;
                    self.manager.borrow_mut().on_message(eid, &msg)?;
                }
                Some(Err(e)) => {
                    error!("Receive failed: {e}");
                    return Err(e.into());
                }
                None => (),
            }
        }
    }

    /// Allocates an instance ID for a request sent outside the manager.
    ///
    /// Waits up to `timeout` for an ID to be released. The ID must be
    /// returned with [`free_instance_id`](Self::free_instance_id).
    pub async fn next_instance_id(
        &self,
        eid: Eid,
        timeout: Duration,
    ) -> Result<InstanceId> {
        let ids = self.manager.borrow().instance_ids().clone();
        iid::next_timeout(&ids, eid, timeout).await
    }

    /// Returns an instance ID allocated with
    /// [`next_instance_id`](Self::next_instance_id).
    pub fn free_instance_id(&self, eid: Eid, id: InstanceId) -> Result<()> {
        let ids = self.manager.borrow().instance_ids().clone();
        let r = ids.borrow_mut().free(eid, id);
        r
    }
}
