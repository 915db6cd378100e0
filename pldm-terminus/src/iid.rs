// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM instance ID allocation.
 *
 * Copyright (c) 2025 Code Construct
 */

//! Per-endpoint PLDM instance ID pools.
//!
//! Each endpoint has 32 instance IDs, tracked as a bitmask. Allocation
//! returns the lowest free ID. Async callers can wait for an ID to be
//! released with [`next_timeout`].

use core::fmt;
use core::future::poll_fn;
use core::task::{Context, Poll};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use embassy_sync::waitqueue::MultiWakerRegistration;
use mctp::Eid;

use crate::{Error, Result};

/// Number of instance IDs per endpoint
pub const INSTANCE_IDS: u8 = 32;

// Tasks waiting for a free ID. Further waiters cause a wake of all.
const MAX_WAITERS: usize = 8;

/// A PLDM instance ID, in the range `0..32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u8);

impl InstanceId {
    /// Creates an instance ID from its header value.
    ///
    /// Returns `None` if `v` is out of range.
    pub fn new(v: u8) -> Option<Self> {
        (v < INSTANCE_IDS).then_some(Self(v))
    }

    /// The instance ID as carried in the PLDM header.
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instance ID pools for all endpoints.
pub struct InstanceIds {
    // Bitmask of in-use IDs
    pools: BTreeMap<Eid, u32>,
    waiters: MultiWakerRegistration<MAX_WAITERS>,
}

/// Instance ID pools shared between requesters on a single event loop.
pub type SharedInstanceIds = Rc<RefCell<InstanceIds>>;

impl InstanceIds {
    /// Creates empty pools, with all IDs of every endpoint free.
    pub fn new() -> Self {
        Self {
            pools: BTreeMap::new(),
            waiters: MultiWakerRegistration::new(),
        }
    }

    /// Allocates the lowest free instance ID for `eid`.
    ///
    /// Returns [`Error::ResourceExhausted`] if all 32 are in use.
    pub fn next(&mut self, eid: Eid) -> Result<InstanceId> {
        let used = self.pools.entry(eid).or_default();
        let free = !*used;
        if free == 0 {
            debug!("No free instance IDs for eid {eid}");
            return Err(Error::ResourceExhausted);
        }

        let id = free.trailing_zeros() as u8;
        *used |= 1 << id;
        trace!("eid {eid} allocated iid {id}");
        Ok(InstanceId(id))
    }

    /// Releases an instance ID, waking any waiting allocations.
    ///
    /// Returns [`Error::InvalidState`] if the ID is not in use. The pool is
    /// unchanged in that case.
    pub fn free(&mut self, eid: Eid, id: InstanceId) -> Result<()> {
        let bit = 1u32 << id.0;
        match self.pools.get_mut(&eid) {
            Some(used) if *used & bit != 0 => {
                *used &= !bit;
                trace!("eid {eid} freed iid {id}");
                self.waiters.wake();
                Ok(())
            }
            _ => {
                error!("Free of unused instance ID {id} for eid {eid}");
                Err(Error::InvalidState("instance ID not in use"))
            }
        }
    }

    /// Returns whether `id` is allocated for `eid`.
    pub fn is_used(&self, eid: Eid, id: InstanceId) -> bool {
        self.pools
            .get(&eid)
            .is_some_and(|used| used & (1 << id.0) != 0)
    }

    /// Returns the number of allocated IDs for `eid`.
    pub fn in_use(&self, eid: Eid) -> u32 {
        self.pools.get(&eid).map_or(0, |used| used.count_ones())
    }

    /// Discards the pool for an endpoint.
    ///
    /// Any IDs still allocated become free.
    pub fn remove_endpoint(&mut self, eid: Eid) {
        if let Some(used) = self.pools.remove(&eid) {
            if used != 0 {
                debug!("eid {eid} removed with {} IDs in use", used.count_ones());
            }
            self.waiters.wake();
        }
    }

    /// Polls for a free ID, registering the task to be woken on release.
    pub fn poll_next(&mut self, eid: Eid, cx: &mut Context<'_>) -> Poll<InstanceId> {
        match self.next(eid) {
            Ok(id) => Poll::Ready(id),
            Err(_) => {
                self.waiters.register(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl Default for InstanceIds {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InstanceIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceIds")
            .field("pools", &self.pools)
            .finish_non_exhaustive()
    }
}

/// Allocates an instance ID, waiting up to `timeout` for one to be freed.
///
/// Returns [`Error::ResourceExhausted`] if none became available in time.
/// The `RefCell` is only borrowed while polling.
pub async fn next_timeout(
    ids: &RefCell<InstanceIds>,
    eid: Eid,
    timeout: Duration,
) -> Result<InstanceId> {
    let wait = async {
        Some(poll_fn(|cx| ids.borrow_mut().poll_next(eid, cx)).await)
    };
    let expire = async {
        smol::Timer::after(timeout).await;
        None
    };

    smol::future::or(wait, expire).await.ok_or_else(|| {
        debug!("Timed out waiting for instance ID for eid {eid}");
        Error::ResourceExhausted
    })
}
