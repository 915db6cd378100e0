// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM terminus manager.
 *
 * Copyright (c) 2025 Code Construct
 */

//! The terminus manager context.
//!
//! A [`Manager`] owns the terminus registry and everything that acts on
//! it: the request correlator, the sensor poller, the software inventory
//! and the loaded configuration. It is driven by [`Manager::update`] with
//! the current time, and [`Manager::on_message`] for each received
//! message.

use std::collections::{BTreeMap, BTreeSet};

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use mctp::Eid;
use pldm::{PldmHeader, PldmRequest, PldmResponse};
use pldm_platform::codec::decode_empty_response;
use pldm_platform::pdr::NumericSensorPdr;
use pldm_platform::proto::{
    NumericData, SensorId, SetRequest, StateEffecterField,
};
use pldm_platform::requester::{
    get_pdr, parse_get_pdr, set_numeric_effecter_value,
    set_state_effecter_states,
};

use crate::config::{
    self, ConfigSource, EffecterDescriptor, EffecterKind, ManagerConfig,
    SensorDescriptor,
};
use crate::iid::SharedInstanceIds;
use crate::inventory::SoftwareInventoryManager;
use crate::poller::SensorPoller;
use crate::requester::{Completion, Requester, Transport};
use crate::sensor::{NumericSensor, SensorKey};
use crate::sink::{PropertySink, PropertyValue};
use crate::{Error, Result, Tid};

/// Identifies what a request was sent for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cookie {
    SensorReading(SensorKey),
    Pdr { tid: Tid, handle: u32 },
    Effecter { path: String, property: String },
}

impl From<SensorKey> for Cookie {
    fn from(key: SensorKey) -> Self {
        Self::SensorReading(key)
    }
}

/// A remote PLDM terminus.
#[derive(Debug)]
pub struct Terminus {
    pub tid: Tid,
    pub eid: Eid,
    pub name: String,
    pub sensors: BTreeMap<SensorId, NumericSensor>,
    /// Cleared when the terminus can't be reached. Unreachable termini
    /// are not polled.
    pub reachable: bool,
}

impl Terminus {
    /// A reachable terminus with no sensors discovered yet.
    pub fn new(tid: Tid, eid: Eid, name: String) -> Self {
        Self {
            tid,
            eid,
            name,
            sensors: BTreeMap::new(),
            reachable: true,
        }
    }
}

// PDR repository walk for a terminus
#[derive(Debug, Default)]
struct Discovery {
    next_handle: u32,
    in_flight: bool,
    seen: BTreeSet<u32>,
    sensors: BTreeMap<SensorId, NumericSensor>,
}

/// Terminus manager context
pub struct Manager<T: Transport, S: PropertySink> {
    transport: T,
    sink: S,
    requester: Requester<Cookie>,
    poller: SensorPoller,
    termini: BTreeMap<Tid, Terminus>,
    discovery: BTreeMap<Tid, Discovery>,
    inventory: SoftwareInventoryManager,
    sensor_config: Vec<SensorDescriptor>,
    effecter_config: Vec<EffecterDescriptor>,
    now: u64,
}

impl<T: Transport, S: PropertySink> Manager<T, S> {
    /// Create a new manager.
    ///
    /// `ids` may be shared with other requesters to the same endpoints.
    /// `now_millis` is the current time, as later passed to
    /// [`update()`](Self::update).
    pub fn new(
        config: ManagerConfig,
        transport: T,
        sink: S,
        ids: SharedInstanceIds,
        now_millis: u64,
    ) -> Self {
        Self {
            transport,
            sink,
            requester: Requester::new(ids, config.requester, now_millis),
            poller: SensorPoller::new(config.poller),
            termini: BTreeMap::new(),
            discovery: BTreeMap::new(),
            inventory: SoftwareInventoryManager::new(),
            sensor_config: Vec::new(),
            effecter_config: Vec::new(),
            now: now_millis,
        }
    }

    /// Loads sensor and effecter mappings.
    ///
    /// The current mappings are kept if loading or validation fails.
    pub fn load_config(
        &mut self,
        source: &dyn ConfigSource,
        sensor_path: &str,
        effecter_path: &str,
    ) -> Result<()> {
        let (s, e) = config::load(source, sensor_path, effecter_path)?;
        self.sensor_config = s;
        self.effecter_config = e;
        Ok(())
    }

    /// Instance ID pools used for requests, shared with other requesters.
    pub fn instance_ids(&self) -> &SharedInstanceIds {
        self.requester.instance_ids()
    }

    /// The transport requests are sent on.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The sink that sensor and effecter state is published to.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Software inventory records and update managers.
    pub fn inventory(&self) -> &SoftwareInventoryManager {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut SoftwareInventoryManager {
        &mut self.inventory
    }

    /// Looks up a terminus by TID.
    pub fn terminus(&self, tid: Tid) -> Option<&Terminus> {
        self.termini.get(&tid)
    }

    /// Looks up a discovered sensor.
    pub fn sensor(&self, key: &SensorKey) -> Option<&NumericSensor> {
        self.termini.get(&key.tid)?.sensors.get(&key.sensor)
    }

    /// Adds a terminus.
    ///
    /// Adding a known terminus at the same endpoint marks it reachable
    /// again. A known terminus at a different endpoint is replaced.
    pub fn add_terminus(&mut self, tid: Tid, eid: Eid, name: String) {
        if let Some(t) = self.termini.get_mut(&tid) {
            if t.eid == eid {
                if !t.reachable {
                    info!("Terminus {tid} reachable");
                }
                t.reachable = true;
                return;
            }
            info!("Terminus {tid} moved from eid {} to {eid}", t.eid);
            // Known to be present
            let _ = self.remove_terminus(tid);
        }

        info!("Added terminus {tid} '{name}' at eid {eid}");
        self.termini.insert(tid, Terminus::new(tid, eid, name));
    }

    /// Removes a terminus with its sensors and inventory.
    ///
    /// Outstanding requests to the terminus complete by timing out.
    pub fn remove_terminus(&mut self, tid: Tid) -> Result<()> {
        let t = self
            .termini
            .remove(&tid)
            .ok_or(Error::UnknownTerminus(tid))?;

        for s in t.sensors.values() {
            self.sink.remove(&s.path);
        }
        self.discovery.remove(&tid);
        self.poller.forget_terminus(tid);
        let n = self.inventory.erase_entries_if(|id| id.eid == t.eid);
        if n > 0 {
            debug!("Removed {n} inventory entries for eid {}", t.eid);
        }

        if self.requester.pending_for(t.eid) == 0 {
            self.instance_ids().borrow_mut().remove_endpoint(t.eid);
        }
        info!("Removed terminus {tid}");
        Ok(())
    }

    /// Marks a terminus unreachable. Its sensors become unavailable.
    pub fn mark_unreachable(&mut self, tid: Tid) -> Result<()> {
        let t = self
            .termini
            .get_mut(&tid)
            .ok_or(Error::UnknownTerminus(tid))?;
        if t.reachable {
            warn!("Terminus {tid} unreachable");
        }
        t.reachable = false;
        for s in t.sensors.values_mut() {
            s.set_unavailable();
            s.publish(&mut self.sink);
        }
        Ok(())
    }

    /// Starts walking the PDR repository of a terminus.
    ///
    /// Discovered numeric sensors replace the terminus' existing sensors
    /// once the walk finishes. Has no effect if a walk is in progress.
    pub fn discover(&mut self, tid: Tid) -> Result<()> {
        if !self.termini.contains_key(&tid) {
            return Err(Error::UnknownTerminus(tid));
        }
        if self.discovery.contains_key(&tid) {
            debug!("Discovery already running for terminus {tid}");
            return Ok(());
        }

        debug!("Discovering PDRs for terminus {tid}");
        let d = Discovery {
            seen: BTreeSet::from([0]),
            ..Default::default()
        };
        self.discovery.insert(tid, d);
        self.advance_discovery()
    }

    /// Whether a PDR walk is running for `tid`.
    pub fn discovering(&self, tid: Tid) -> bool {
        self.discovery.contains_key(&tid)
    }

    // Sends the next GetPDR for every discovery without one in flight.
    fn advance_discovery(&mut self) -> Result<()> {
        let waiting: Vec<Tid> = self
            .discovery
            .iter()
            .filter(|(_, d)| !d.in_flight)
            .map(|(tid, _)| *tid)
            .collect();

        for tid in waiting {
            let Some(eid) = self.termini.get(&tid).map(|t| t.eid) else {
                self.discovery.remove(&tid);
                continue;
            };
            let Some(d) = self.discovery.get_mut(&tid) else {
                continue;
            };

            let handle = d.next_handle;
            let req = get_pdr(handle)?;
            match self.requester.register_request(
                &mut self.transport,
                eid,
                req,
                Cookie::Pdr { tid, handle },
            ) {
                Ok(_) => d.in_flight = true,
                Err(Error::ResourceExhausted) => {
                    debug!("No instance ID for terminus {tid} GetPDR, deferred");
                }
                Err(e @ Error::InvalidState(_)) => return Err(e),
                Err(e) => {
                    warn!("Terminus {tid} PDR discovery failed: {e}");
                    self.finish_discovery(tid);
                }
            }
        }
        Ok(())
    }

    fn pdr_complete(
        &mut self,
        tid: Tid,
        handle: u32,
        result: Result<PldmResponse>,
    ) {
        if !self.discovery.contains_key(&tid) {
            debug!("Dropping PDR {handle} for terminus {tid}");
            return;
        }

        let (rec, next) =
            match result.and_then(|r| Ok(parse_get_pdr(&r)?)) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Terminus {tid} GetPDR {handle} failed: {e}");
                    self.finish_discovery(tid);
                    return;
                }
            };

        trace!(
            "Terminus {tid} PDR {} type {}, next {next}",
            rec.header.record_handle,
            rec.header.pdr_type
        );

        let sensor = rec.numeric_sensor().map(|pdr| self.new_sensor(tid, pdr));

        let Some(d) = self.discovery.get_mut(&tid) else {
            return;
        };
        if let Some(s) = sensor {
            d.sensors.insert(s.key.sensor, s);
        }

        if next == 0 {
            self.finish_discovery(tid);
        } else if !d.seen.insert(next) {
            warn!("Terminus {tid} PDR repository loops at handle {next}");
            self.finish_discovery(tid);
        } else {
            d.next_handle = next;
            d.in_flight = false;
        }
    }

    fn new_sensor(&self, tid: Tid, pdr: &NumericSensorPdr) -> NumericSensor {
        let configured = self.sensor_config.iter().find(|c| {
            c.sensor_id == pdr.sensor_id
                && c.pdr_type == pldm_platform::pdr::PDR_TYPE_NUMERIC_SENSOR
        });

        match configured {
            Some(c) => NumericSensor::from_pdr(
                tid,
                pdr,
                c.name().to_string(),
                Some(c.path.clone()),
            ),
            None => {
                let tname = self
                    .termini
                    .get(&tid)
                    .map_or("Terminus", |t| t.name.as_str());
                let name = format!("{tname}_Sensor_{}", pdr.sensor_id);
                NumericSensor::from_pdr(tid, pdr, name, None)
            }
        }
    }

    // Installs the sensors found so far.
    fn finish_discovery(&mut self, tid: Tid) {
        let Some(d) = self.discovery.remove(&tid) else {
            return;
        };
        let Some(t) = self.termini.get_mut(&tid) else {
            return;
        };

        for s in t.sensors.values() {
            if !d.sensors.contains_key(&s.key.sensor) {
                self.sink.remove(&s.path);
            }
        }
        t.sensors = d.sensors;
        for s in t.sensors.values() {
            s.publish(&mut self.sink);
        }
        info!(
            "Terminus {tid} has {} numeric sensors from {} PDRs",
            t.sensors.len(),
            d.seen.len()
        );
    }

    /// Starts polling sensors.
    pub fn start_polling(&mut self) {
        self.poller.start(self.now)
    }

    /// Stops polling sensors. Outstanding readings still complete.
    pub fn stop_polling(&mut self) {
        self.poller.stop()
    }

    pub fn polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Whether there is nothing left to do: polling stopped, and no
    /// requests or discoveries outstanding.
    pub fn is_idle(&self) -> bool {
        !self.poller.is_running()
            && self.requester.pending_count() == 0
            && self.discovery.is_empty()
    }

    /// Sets an effecter-backed property.
    ///
    /// The request is sent through the correlator; the outcome is logged
    /// when the response arrives.
    pub fn set_property(
        &mut self,
        path: &str,
        property: &str,
        value: &PropertyValue,
    ) -> Result<()> {
        let d = self
            .effecter_config
            .iter()
            .find(|d| d.path == path && d.property == property)
            .ok_or_else(|| {
                Error::UnknownProperty(format!("{path} {property}"))
            })?;

        let req = match &d.kind {
            EffecterKind::State {
                states,
                property_values,
            } => {
                let state = property_values
                    .iter()
                    .position(|v| v == value)
                    .and_then(|i| states.get(i))
                    .ok_or_else(|| {
                        Error::UnknownProperty(format!(
                            "{path} {property} value {value}"
                        ))
                    })?;
                let f = StateEffecterField {
                    set_request: SetRequest::RequestSet,
                    effecter_state: *state,
                };
                set_state_effecter_states(d.effecter_id, &[f])?
            }
            EffecterKind::Numeric { data_size } => {
                let raw = match *value {
                    PropertyValue::Int(v) => v,
                    PropertyValue::Bool(b) => b.into(),
                    PropertyValue::Double(v)
                        if v.is_finite() && v.fract() == 0.0 =>
                    {
                        v as i64
                    }
                    _ => {
                        return Err(Error::UnknownProperty(format!(
                            "{path} {property} value {value}"
                        )))
                    }
                };
                let v = NumericData::from_raw(*data_size, raw)?;
                set_numeric_effecter_value(d.effecter_id, v)?
            }
        };

        let eid = Eid(d.eid);
        let cookie = Cookie::Effecter {
            path: path.to_string(),
            property: property.to_string(),
        };
        self.requester
            .register_request(&mut self.transport, eid, req, cookie)?;
        Ok(())
    }

    /// Handles a received message.
    ///
    /// Responses are matched to outstanding requests. Requests are offered
    /// to the update managers, and their response sent.
    pub fn on_message(&mut self, eid: Eid, msg: &[u8]) -> Result<()> {
        match PldmHeader::decode(msg) {
            Ok(h) if h.request => self.on_request(eid, msg),
            _ => self.on_response(eid, msg),
        }
    }

    /// Handles a received response.
    pub fn on_response(&mut self, eid: Eid, msg: &[u8]) -> Result<()> {
        if let Some(c) = self.requester.on_response(eid, msg) {
            self.complete(c)?;
            self.advance_discovery()?;
        }
        Ok(())
    }

    fn on_request(&mut self, eid: Eid, msg: &[u8]) -> Result<()> {
        let req = match PldmRequest::from_buf(msg) {
            Ok(r) => r,
            Err(e) => {
                debug!("Bad request from eid {eid}: {e}");
                return Ok(());
            }
        };
        let resp = self.inventory.dispatch(eid, &req).to_bytes()?;
        if let Err(e) = self.transport.send(eid, &resp) {
            warn!("Response to eid {eid} failed: {e}");
        }
        Ok(())
    }

    fn complete(&mut self, c: Completion<Cookie>) -> Result<()> {
        match c.cookie {
            Cookie::SensorReading(key) => self.poller.complete(
                key,
                c.result,
                &mut self.termini,
                &mut self.sink,
            ),
            Cookie::Pdr { tid, handle } => {
                self.pdr_complete(tid, handle, c.result)
            }
            Cookie::Effecter { path, property } => {
                match c.result.and_then(|r| Ok(decode_empty_response(&r)?)) {
                    Ok(()) => info!("Set {path} {property}"),
                    Err(e) => warn!("Setting {path} {property} failed: {e}"),
                }
            }
        }
        Ok(())
    }

    /// Processes timeouts, discovery and polling.
    ///
    /// Returns the milliseconds until `update` should next be called.
    /// Returns [`Error::InvalidState`] if time goes backwards.
    pub fn update(&mut self, now_millis: u64) -> Result<u32> {
        let (_, done) =
            self.requester.update(&mut self.transport, now_millis)?;
        self.now = now_millis;
        for c in done {
            self.complete(c)?;
        }

        self.advance_discovery()?;

        let poll = self.poller.poll(
            now_millis,
            &mut self.termini,
            &mut self.requester,
            &mut self.transport,
            &mut self.sink,
        )?;

        Ok(poll.min(self.requester.next_timeout()))
    }
}
