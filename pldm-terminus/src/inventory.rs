// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Firmware inventory and update manager dispatch.
 *
 * Copyright (c) 2025 Code Construct
 */

//! Software inventory of termini components, with their update managers.
//!
//! Each component, identified by a [`SoftwareIdentifier`], has at most one
//! inventory record and at most one [`UpdateManager`]. Only one update may
//! run at a time across the whole inventory.
//!
//! Inbound requests from a terminus (such as firmware update requests from
//! a device) are offered to the primary update manager, then to each
//! manager for the originating endpoint in registration order, until one
//! claims the request.

use core::fmt;

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use mctp::Eid;
use pldm::{PldmRequest, PldmResponse};

use crate::{Error, Result};

/// Completion code for a request that the receiver was not expecting.
pub const COMMAND_NOT_EXPECTED: u8 = 0x88;

/// Identifies a component of a terminus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SoftwareIdentifier {
    pub eid: Eid,
    pub component: u16,
}

impl fmt::Display for SoftwareIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eid {} component {:#06x}", self.eid, self.component)
    }
}

/// Identifying descriptors for a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    PciVid(u16),
    Iana(u32),
    Uuid(uuid::Uuid),
    Vendor {
        title: Option<String>,
        data: Vec<u8>,
    },
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PciVid(id) => write!(f, "pci-vid:{:04x}", id),
            Self::Iana(id) => write!(f, "iana:{:08x}", id),
            Self::Uuid(id) => write!(f, "uuid:{}", id),
            Self::Vendor { title, data } => {
                match title {
                    Some(t) => write!(f, "vendor:{}", t.escape_default())?,
                    None => write!(f, "vendor:")?,
                }
                write!(f, "[")?;
                for b in data {
                    write!(f, "{:02x}", b)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Inventory record for one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareInventory {
    pub name: String,
    pub version: String,
    pub descriptors: Vec<Descriptor>,
}

/// The result of offering a request to an update manager.
#[derive(Debug)]
pub enum Handled {
    /// The manager handled the request. No further managers are offered it.
    Claimed(PldmResponse),
    /// The manager was not expecting the request.
    NotExpected(PldmResponse),
}

/// Handles firmware update requests for a component.
pub trait UpdateManager {
    fn try_handle(&mut self, eid: Eid, req: &PldmRequest) -> Handled;
}

struct Entry {
    inventory: SoftwareInventory,
    manager: Option<Box<dyn UpdateManager>>,
    // registration order of the manager
    seq: u64,
}

/// Inventory of components and their update managers.
#[derive(Default)]
pub struct SoftwareInventoryManager {
    entries: Vec<(SoftwareIdentifier, Entry)>,
    primary: Option<Box<dyn UpdateManager>>,
    updating: Option<SoftwareIdentifier>,
    next_seq: u64,
}

impl fmt::Debug for SoftwareInventoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareInventoryManager")
            .field("entries", &self.entries.len())
            .field("primary", &self.primary.is_some())
            .field("updating", &self.updating)
            .finish()
    }
}

impl SoftwareInventoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, id: &SoftwareIdentifier) -> Option<&Entry> {
        self.entries.iter().find(|(i, _)| i == id).map(|(_, e)| e)
    }

    fn find_mut(&mut self, id: &SoftwareIdentifier) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|(i, _)| i == id)
            .map(|(_, e)| e)
    }

    /// Creates or replaces the inventory record for `id`.
    ///
    /// An existing update manager is kept.
    pub fn create_entry(
        &mut self,
        id: SoftwareIdentifier,
        name: String,
        version: String,
        descriptors: Vec<Descriptor>,
    ) {
        let inventory = SoftwareInventory {
            name,
            version,
            descriptors,
        };
        debug!("Inventory {id}: {} {}", inventory.name, inventory.version);

        if let Some(e) = self.find_mut(&id) {
            e.inventory = inventory;
        } else {
            self.entries.push((
                id,
                Entry {
                    inventory,
                    manager: None,
                    seq: 0,
                },
            ));
        }
    }

    /// Returns the inventory recorded for `id`.
    pub fn entry(&self, id: &SoftwareIdentifier) -> Option<&SoftwareInventory> {
        self.find(id).map(|e| &e.inventory)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes the record for `id` with its update manager.
    ///
    /// An update in progress for `id` is abandoned. Returns whether a
    /// record existed.
    pub fn erase_entry(&mut self, id: &SoftwareIdentifier) -> bool {
        self.erase_entries_if(|i| i == id) > 0
    }

    /// Removes every record matching `pred`, with their update managers.
    ///
    /// An update in progress for a matching component is abandoned.
    /// Returns the number of records removed.
    pub fn erase_entries_if(
        &mut self,
        mut pred: impl FnMut(&SoftwareIdentifier) -> bool,
    ) -> usize {
        if let Some(cur) = self.updating.filter(|u| pred(u)) {
            warn!("Update for {cur} abandoned, component removed");
            self.updating = None;
        }
        let before = self.entries.len();
        self.entries.retain(|(i, _)| !pred(i));
        before - self.entries.len()
    }

    /// Registers the update manager for a component.
    ///
    /// Returns [`Error::InvalidState`] if the component has no inventory
    /// record, or already has a manager.
    pub fn register_update_manager(
        &mut self,
        id: SoftwareIdentifier,
        manager: Box<dyn UpdateManager>,
    ) -> Result<()> {
        let seq = self.next_seq;
        let Some(e) = self.find_mut(&id) else {
            error!("No inventory for {id}, can't register update manager");
            return Err(Error::InvalidState("no inventory record"));
        };
        if e.manager.is_some() {
            error!("Update manager already registered for {id}");
            return Err(Error::InvalidState("update manager registered"));
        }
        e.manager = Some(manager);
        e.seq = seq;
        self.next_seq += 1;
        Ok(())
    }

    pub fn has_update_manager(&self, id: &SoftwareIdentifier) -> bool {
        self.find(id).is_some_and(|e| e.manager.is_some())
    }

    /// Sets the manager first offered every inbound request.
    pub fn set_primary(&mut self, manager: Box<dyn UpdateManager>) {
        self.primary = Some(manager);
    }

    /// Marks an update as started for `id`.
    ///
    /// Returns [`Error::UpdateInProgress`] with the running update if one
    /// exists.
    pub fn begin_update(&mut self, id: SoftwareIdentifier) -> Result<()> {
        if let Some(cur) = self.updating {
            debug!("Update for {id} refused, {cur} in progress");
            return Err(Error::UpdateInProgress(cur));
        }
        info!("Update started for {id}");
        self.updating = Some(id);
        Ok(())
    }

    /// Marks the update for `id` as finished.
    ///
    /// Returns [`Error::InvalidState`] if `id` is not the running update.
    pub fn end_update(&mut self, id: SoftwareIdentifier) -> Result<()> {
        if self.updating != Some(id) {
            error!("End of update for {id}, not in progress");
            return Err(Error::InvalidState("update not in progress"));
        }
        info!("Update finished for {id}");
        self.updating = None;
        Ok(())
    }

    /// The component currently being updated, if any.
    pub fn update_in_progress(&self) -> Option<SoftwareIdentifier> {
        self.updating
    }

    /// Offers an inbound request to the update managers.
    ///
    /// The first [`Handled::Claimed`] response is returned, later managers
    /// are not invoked. If no manager claims the request, the last
    /// [`Handled::NotExpected`] response is returned, or a
    /// COMMAND_NOT_EXPECTED response if no manager was offered the request.
    pub fn dispatch(&mut self, eid: Eid, req: &PldmRequest) -> PldmResponse {
        let mut last = None;

        if let Some(p) = self.primary.as_mut() {
            match p.try_handle(eid, req) {
                Handled::Claimed(r) => return r,
                Handled::NotExpected(r) => last = Some(r),
            }
        }

        let mut managers: Vec<_> = self
            .entries
            .iter_mut()
            .filter(|(id, _)| id.eid == eid)
            .filter_map(|(_, e)| Some((e.seq, e.manager.as_mut()?)))
            .collect();
        managers.sort_by_key(|(seq, _)| *seq);

        for (_, m) in managers {
            match m.try_handle(eid, req) {
                Handled::Claimed(r) => return r,
                Handled::NotExpected(r) => last = Some(r),
            }
        }

        last.unwrap_or_else(|| {
            debug!(
                "No update manager for eid {eid} type {} cmd 0x{:02x}",
                req.typ, req.cmd
            );
            req.response_cc(COMMAND_NOT_EXPECTED)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::start_log;
    use std::cell::Cell;
    use std::rc::Rc;

    const EID: Eid = Eid(12);

    struct Mgr {
        claim: bool,
        // marker byte in responses
        tag: u8,
        calls: Rc<Cell<usize>>,
    }

    impl UpdateManager for Mgr {
        fn try_handle(&mut self, _eid: Eid, req: &PldmRequest) -> Handled {
            self.calls.set(self.calls.get() + 1);
            let mut r = req.response();
            r.data = vec![self.tag];
            if self.claim {
                Handled::Claimed(r)
            } else {
                r.cc = COMMAND_NOT_EXPECTED;
                Handled::NotExpected(r)
            }
        }
    }

    fn id(component: u16) -> SoftwareIdentifier {
        SoftwareIdentifier {
            eid: EID,
            component,
        }
    }

    fn mgr(claim: bool, tag: u8) -> (Box<Mgr>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        (
            Box::new(Mgr {
                claim,
                tag,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn req() -> PldmRequest {
        let mut r = PldmRequest::new(5, 0x15);
        r.iid = 3;
        r
    }

    #[test]
    fn second_claims() {
        start_log();
        let mut inv = SoftwareInventoryManager::new();
        let mut calls = vec![];
        for (c, claim) in [(1, false), (2, true), (3, false)] {
            inv.create_entry(id(c), format!("c{c}"), "1.0".into(), vec![]);
            let (m, n) = mgr(claim, c as u8);
            inv.register_update_manager(id(c), m).unwrap();
            calls.push(n);
        }

        let r = inv.dispatch(EID, &req());
        assert_eq!(r.cc, 0);
        assert_eq!(r.data, [2]);
        assert_eq!(r.iid, 3);
        assert_eq!(calls[0].get(), 1);
        assert_eq!(calls[1].get(), 1);
        assert_eq!(calls[2].get(), 0);
    }

    #[test]
    fn primary_first() {
        start_log();
        let mut inv = SoftwareInventoryManager::new();
        inv.create_entry(id(1), "c".into(), "1".into(), vec![]);
        let (m, n) = mgr(true, 1);
        inv.register_update_manager(id(1), m).unwrap();
        let (p, pn) = mgr(true, 9);
        inv.set_primary(p);

        assert_eq!(inv.dispatch(EID, &req()).data, [9]);
        assert_eq!(pn.get(), 1);
        assert_eq!(n.get(), 0);
    }

    #[test]
    fn none_claim() {
        start_log();
        let mut inv = SoftwareInventoryManager::new();

        // no managers at all
        let r = inv.dispatch(EID, &req());
        assert_eq!(r.cc, COMMAND_NOT_EXPECTED);
        assert!(r.data.is_empty());

        for c in [1, 2] {
            inv.create_entry(id(c), "c".into(), "1".into(), vec![]);
            let (m, _) = mgr(false, c as u8);
            inv.register_update_manager(id(c), m).unwrap();
        }
        // last response wins
        let r = inv.dispatch(EID, &req());
        assert_eq!(r.cc, COMMAND_NOT_EXPECTED);
        assert_eq!(r.data, [2]);

        // managers for other endpoints are not offered requests
        let r = inv.dispatch(Eid(40), &req());
        assert!(r.data.is_empty());
    }

    #[test]
    fn registration() {
        start_log();
        let mut inv = SoftwareInventoryManager::new();
        let (m, _) = mgr(true, 1);
        assert!(matches!(
            inv.register_update_manager(id(1), m),
            Err(Error::InvalidState(_))
        ));

        inv.create_entry(id(1), "c".into(), "1".into(), vec![]);
        let (m, _) = mgr(true, 1);
        inv.register_update_manager(id(1), m).unwrap();
        let (m, _) = mgr(true, 2);
        assert!(matches!(
            inv.register_update_manager(id(1), m),
            Err(Error::InvalidState(_))
        ));

        // replacing the record keeps the manager
        inv.create_entry(id(1), "c".into(), "2".into(), vec![Descriptor::Iana(0xa015)]);
        assert_eq!(inv.entry(&id(1)).unwrap().version, "2");
        assert!(inv.has_update_manager(&id(1)));

        // erasing removes both
        assert!(inv.erase_entry(&id(1)));
        assert!(!inv.has_update_manager(&id(1)));
        assert!(!inv.erase_entry(&id(1)));
        inv.create_entry(id(1), "c".into(), "1".into(), vec![]);
        let (m, _) = mgr(true, 1);
        inv.register_update_manager(id(1), m).unwrap();
    }

    #[test]
    fn erase_if() {
        let mut inv = SoftwareInventoryManager::new();
        inv.create_entry(id(1), "a".into(), "1".into(), vec![]);
        inv.create_entry(id(2), "b".into(), "1".into(), vec![]);
        let other = SoftwareIdentifier {
            eid: Eid(99),
            component: 1,
        };
        inv.create_entry(other, "c".into(), "1".into(), vec![]);
        assert_eq!(inv.erase_entries_if(|i| i.eid == EID), 2);
        assert_eq!(inv.len(), 1);
        assert!(inv.entry(&other).is_some());
    }

    #[test]
    fn single_update() {
        let mut inv = SoftwareInventoryManager::new();
        inv.begin_update(id(1)).unwrap();
        assert!(matches!(
            inv.begin_update(id(2)),
            Err(Error::UpdateInProgress(i)) if i == id(1)
        ));
        assert!(matches!(inv.end_update(id(2)), Err(Error::InvalidState(_))));
        inv.end_update(id(1)).unwrap();
        inv.begin_update(id(2)).unwrap();
        assert_eq!(inv.update_in_progress(), Some(id(2)));
    }

    #[test]
    fn erase_abandons_update() {
        start_log();
        let mut inv = SoftwareInventoryManager::new();
        inv.create_entry(id(1), "a".into(), "1".into(), vec![]);
        inv.create_entry(id(2), "b".into(), "1".into(), vec![]);

        // erasing another component leaves the update running
        inv.begin_update(id(1)).unwrap();
        assert!(inv.erase_entry(&id(2)));
        assert_eq!(inv.update_in_progress(), Some(id(1)));

        assert!(inv.erase_entry(&id(1)));
        assert_eq!(inv.update_in_progress(), None);
        inv.begin_update(id(3)).unwrap();
        // no longer running, so can't be ended
        assert!(matches!(inv.end_update(id(1)), Err(Error::InvalidState(_))));

        // by endpoint, as on terminus removal
        inv.create_entry(id(3), "c".into(), "1".into(), vec![]);
        assert_eq!(inv.erase_entries_if(|i| i.eid == EID), 1);
        assert_eq!(inv.update_in_progress(), None);
        inv.begin_update(id(4)).unwrap();
        assert_eq!(inv.update_in_progress(), Some(id(4)));
    }

    #[test]
    fn descriptor_display() {
        let d = Descriptor::Vendor {
            title: Some("acme".into()),
            data: vec![0xde, 0xad],
        };
        assert_eq!(d.to_string(), "vendor:acme[dead]");
        assert_eq!(Descriptor::PciVid(0x1af4).to_string(), "pci-vid:1af4");
        assert_eq!(
            Descriptor::Uuid(uuid::Uuid::nil()).to_string(),
            "uuid:00000000-0000-0000-0000-000000000000"
        );
    }
}
