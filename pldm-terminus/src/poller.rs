// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Numeric sensor polling.
 *
 * Copyright (c) 2025 Code Construct
 */

//! Periodic GetSensorReading polling of all numeric sensors.
//!
//! Each tick sends a reading request for every due sensor, without waiting
//! for responses. Responses are applied by [`SensorPoller::complete`] as
//! they arrive. A sensor is never polled while a previous request for it
//! is outstanding.

use std::collections::{BTreeMap, BTreeSet};

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use pldm::PldmResponse;
use pldm_platform::requester::{get_sensor_reading, parse_get_sensor_reading};

use crate::manager::Terminus;
use crate::requester::{Requester, Transport};
use crate::sensor::SensorKey;
use crate::sink::PropertySink;
use crate::{Error, Result, Tid};

/// Default time between polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 250;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Milliseconds between polling ticks
    pub interval_ms: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug)]
pub struct SensorPoller {
    config: PollerConfig,
    running: bool,
    next_tick: u64,
    outstanding: BTreeSet<SensorKey>,
    last_poll: BTreeMap<SensorKey, u64>,
}

impl SensorPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            running: false,
            next_tick: 0,
            outstanding: BTreeSet::new(),
            last_poll: BTreeMap::new(),
        }
    }

    /// Starts polling, with the first tick at `now_millis`.
    ///
    /// Has no effect if already running.
    pub fn start(&mut self, now_millis: u64) {
        if self.running {
            return;
        }
        info!("Sensor polling started, every {}ms", self.config.interval_ms);
        self.running = true;
        self.next_tick = now_millis;
    }

    /// Stops polling.
    ///
    /// Outstanding requests still complete. Has no effect if not running.
    pub fn stop(&mut self) {
        if self.running {
            info!("Sensor polling stopped");
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether a reading request is outstanding for `key`.
    pub fn is_outstanding(&self, key: &SensorKey) -> bool {
        self.outstanding.contains(key)
    }

    /// Milliseconds until the next tick, `u32::MAX` when stopped.
    pub fn next_timeout(&self, now_millis: u64) -> u32 {
        if !self.running {
            return u32::MAX;
        }
        self.next_tick
            .saturating_sub(now_millis)
            .try_into()
            .unwrap_or(u32::MAX)
    }

    /// Runs a polling tick if one is due.
    ///
    /// Returns the milliseconds until the next tick. Failures for a single
    /// sensor do not stop the tick. Only [`Error::InvalidState`] is
    /// returned.
    pub fn poll<C: From<SensorKey>>(
        &mut self,
        now_millis: u64,
        termini: &mut BTreeMap<Tid, Terminus>,
        requester: &mut Requester<C>,
        transport: &mut impl Transport,
        sink: &mut dyn PropertySink,
    ) -> Result<u32> {
        if !self.running || now_millis < self.next_tick {
            return Ok(self.next_timeout(now_millis));
        }
        self.next_tick = now_millis + u64::from(self.config.interval_ms);

        for t in termini.values_mut().filter(|t| t.reachable) {
            for s in t.sensors.values_mut() {
                let key = s.key;
                if self.outstanding.contains(&key) {
                    trace!("{key} still outstanding");
                    continue;
                }

                if s.update_interval_ms > 0 {
                    if let Some(last) = self.last_poll.get(&key) {
                        if now_millis < last + s.update_interval_ms {
                            continue;
                        }
                    }
                }

                let req = match get_sensor_reading(key.sensor, false) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("{key} request failed: {e}");
                        continue;
                    }
                };

                match requester.register_request(
                    transport,
                    t.eid,
                    req,
                    C::from(key),
                ) {
                    Ok(_) => {
                        self.outstanding.insert(key);
                        self.last_poll.insert(key, now_millis);
                    }
                    Err(Error::ResourceExhausted) => {
                        debug!("No instance ID for {key}, skipping");
                    }
                    Err(Error::Transport(e)) => {
                        warn!("Sending to {} for {key} failed: {e}", t.eid);
                        s.handle_error();
                        s.publish(sink);
                    }
                    Err(e @ Error::InvalidState(_)) => return Err(e),
                    Err(e) => warn!("{key} poll failed: {e}"),
                }
            }
        }

        Ok(self.next_timeout(now_millis))
    }

    /// Applies the outcome of a reading request and publishes the sensor.
    ///
    /// Outcomes for sensors that no longer exist are dropped.
    pub fn complete(
        &mut self,
        key: SensorKey,
        result: Result<PldmResponse>,
        termini: &mut BTreeMap<Tid, Terminus>,
        sink: &mut dyn PropertySink,
    ) {
        self.outstanding.remove(&key);

        let Some(s) = termini
            .get_mut(&key.tid)
            .and_then(|t| t.sensors.get_mut(&key.sensor))
        else {
            debug!("Dropping reading for removed {key}");
            return;
        };

        match result.and_then(|r| Ok(parse_get_sensor_reading(&r)?)) {
            Ok(reading) => s.update_reading(&reading),
            Err(e) => {
                debug!("{} reading failed: {e}", s.name);
                s.handle_error();
            }
        }
        s.publish(sink);
    }

    /// Discards polling history for a terminus.
    pub fn forget_terminus(&mut self, tid: Tid) {
        self.last_poll.retain(|k, _| k.tid != tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iid::InstanceIds;
    use crate::requester::RequesterConfig;
    use crate::sensor::NumericSensor;
    use crate::testutil::*;
    use mctp::Eid;
    use pldm_platform::codec::to_vec;
    use pldm_platform::proto::*;
    use pldm_platform::testutil::temp_sensor_pdr;
    use std::cell::RefCell;
    use std::rc::Rc;

    const EID: Eid = Eid(8);

    fn terminus(ids: &[u16]) -> BTreeMap<Tid, Terminus> {
        let mut t = Terminus::new(1, EID, "T".into());
        for &id in ids {
            let s = NumericSensor::from_pdr(1, &temp_sensor_pdr(id), format!("S{id}"), None);
            t.sensors.insert(s.key.sensor, s);
        }
        BTreeMap::from([(1, t)])
    }

    fn requester() -> Requester<SensorKey> {
        let ids = Rc::new(RefCell::new(InstanceIds::new()));
        Requester::new(ids, RequesterConfig::default(), 0)
    }

    fn reading_body(v: u8) -> Vec<u8> {
        to_vec(&GetSensorReadingResp {
            op_state: SensorOperationalState::Enabled,
            event_enable: SensorEventMessageEnable::NoEventGeneration,
            present_state: SensorState::Normal,
            previous_state: SensorState::Normal,
            event_state: SensorState::Normal,
            reading: NumericData::U8(v),
        })
        .unwrap()
    }

    #[test]
    fn one_outstanding() {
        start_log();
        let mut termini = terminus(&[1, 2]);
        let mut r = requester();
        let mut t = MockTransport::default();
        let mut sink = RecordingSink::default();
        let mut p = SensorPoller::new(PollerConfig { interval_ms: 100 });

        // not started
        assert_eq!(p.poll(0, &mut termini, &mut r, &mut t, &mut sink).unwrap(), u32::MAX);
        assert!(t.sent.is_empty());

        p.start(0);
        p.start(50);
        assert_eq!(p.poll(0, &mut termini, &mut r, &mut t, &mut sink).unwrap(), 100);
        assert_eq!(t.sent.len(), 2);

        // before the next tick
        r.update(&mut t, 50).unwrap();
        assert_eq!(p.poll(50, &mut termini, &mut r, &mut t, &mut sink).unwrap(), 50);
        assert_eq!(t.sent.len(), 2);

        // answer sensor 2 only
        let (_, req2) = t.pop();
        let c = r.on_response(EID, &respond(&req2, 0, reading_body(36))).unwrap();
        p.complete(c.cookie, c.result, &mut termini, &mut sink);

        r.update(&mut t, 100).unwrap();
        p.poll(100, &mut termini, &mut r, &mut t, &mut sink).unwrap();
        // only sensor 2 was polled again
        assert_eq!(t.sent.len(), 2);
        let (_, again) = t.pop();
        assert_eq!(decode_sensor(&again), SensorId(2));
        assert!(p.is_outstanding(&SensorKey { tid: 1, sensor: SensorId(1) }));

        let s2 = &termini[&1].sensors[&SensorId(2)];
        assert_eq!(s2.value(), 36.0);
        assert_eq!(sink.get(&s2.path, "Value"), Some(&crate::sink::PropertyValue::Double(36.0)));
    }

    fn decode_sensor(req: &pldm::PldmRequest) -> SensorId {
        pldm_platform::codec::decode::<GetSensorReadingReq>(&req.data)
            .unwrap()
            .sensor
    }

    #[test]
    fn failures_isolated() {
        start_log();
        let mut termini = terminus(&[1, 2]);
        let mut r = requester();
        let mut t = MockTransport {
            fail: true,
            ..Default::default()
        };
        let mut sink = RecordingSink::default();
        let mut p = SensorPoller::new(PollerConfig::default());
        p.start(0);

        assert!(p.poll(0, &mut termini, &mut r, &mut t, &mut sink).is_ok());
        for s in termini[&1].sensors.values() {
            assert!(!s.functional());
            assert!(s.value().is_nan());
        }
        // both sensors published their failure
        assert_eq!(sink.publishes, 2);
        assert_eq!(r.pending_count(), 0);

        // exhausted instance IDs skip the sensor
        t.fail = false;
        for _ in 0..32 {
            r.instance_ids().borrow_mut().next(EID).unwrap();
        }
        assert!(p.poll(250, &mut termini, &mut r, &mut t, &mut sink).is_ok());
        assert!(t.sent.is_empty());
    }

    #[test]
    fn error_response() {
        start_log();
        let mut termini = terminus(&[1]);
        let mut r = requester();
        let mut t = MockTransport::default();
        let mut sink = RecordingSink::default();
        let mut p = SensorPoller::new(PollerConfig::default());
        p.start(0);
        p.poll(0, &mut termini, &mut r, &mut t, &mut sink).unwrap();

        let (_, req) = t.pop();
        let c = r
            .on_response(EID, &respond(&req, INVALID_SENSOR_ID, vec![]))
            .unwrap();
        p.complete(c.cookie, c.result, &mut termini, &mut sink);
        let s = &termini[&1].sensors[&SensorId(1)];
        assert!(s.available() && !s.functional());
        assert!(!p.is_outstanding(&s.key));
    }

    #[test]
    fn update_interval() {
        start_log();
        let mut termini = terminus(&[1]);
        termini
            .get_mut(&1)
            .unwrap()
            .sensors
            .get_mut(&SensorId(1))
            .unwrap()
            .update_interval_ms = 1000;
        let mut r = requester();
        let mut t = MockTransport::default();
        let mut sink = RecordingSink::default();
        let mut p = SensorPoller::new(PollerConfig { interval_ms: 250 });
        p.start(0);

        for now in [0, 250, 500, 750, 1000] {
            r.update(&mut t, now).unwrap();
            p.poll(now, &mut termini, &mut r, &mut t, &mut sink).unwrap();
            if let Some((_, b)) = t.sent.last().cloned() {
                let req = pldm::PldmRequest::from_buf(&b).unwrap();
                let c = r.on_response(EID, &respond(&req, 0, reading_body(30)));
                if let Some(c) = c {
                    p.complete(c.cookie, c.result, &mut termini, &mut sink);
                }
            }
        }
        assert_eq!(t.sent.len(), 2);
    }

    #[test]
    fn stopped_and_removed() {
        start_log();
        let mut termini = terminus(&[1]);
        let mut r = requester();
        let mut t = MockTransport::default();
        let mut sink = RecordingSink::default();
        let mut p = SensorPoller::new(PollerConfig::default());
        p.start(0);
        p.poll(0, &mut termini, &mut r, &mut t, &mut sink).unwrap();
        p.stop();
        p.stop();
        assert_eq!(p.next_timeout(10), u32::MAX);
        assert_eq!(p.poll(250, &mut termini, &mut r, &mut t, &mut sink).unwrap(), u32::MAX);
        assert_eq!(t.sent.len(), 1);

        // completion after the terminus went away
        termini.clear();
        let (_, req) = t.pop();
        let c = r.on_response(EID, &respond(&req, 0, reading_body(1))).unwrap();
        p.complete(c.cookie, c.result, &mut termini, &mut sink);
        assert_eq!(sink.publishes, 0);
    }
}
