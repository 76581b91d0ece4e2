//! One sampling cycle: read gas, temperature and pH, regulate the heat coil,
//! stamp the result.

use time::PrimitiveDateTime;
use tracing::{debug, warn};

use crate::adc::{ChannelMap, ChannelReader};
use crate::calibrate::{Calibration, Sensor};
use crate::error::SensorReadError;
use crate::heater::Heater;
use crate::reading::{now_utc_seconds, Reading};

/// The board: ADC, calibration and heat coil, owned for the life of the
/// process.  Dropping it releases the bus and switches the coil off.
pub struct Station {
    adc: Box<dyn ChannelReader>,
    channels: ChannelMap,
    calibration: Calibration,
    heater: Heater,
}

impl Station {
    pub fn new(
        adc: Box<dyn ChannelReader>,
        channels: ChannelMap,
        calibration: Calibration,
        heater: Heater,
    ) -> Self {
        Self {
            adc,
            channels,
            calibration,
            heater,
        }
    }

    /// Sample all sensors, regulate the coil and stamp the current UTC time.
    pub fn assemble(&mut self) -> Result<Reading, SensorReadError> {
        self.assemble_at(now_utc_seconds())
    }

    /// As [`Station::assemble`], stamped with `timestamp`.
    ///
    /// A failed channel read aborts before the coil is touched, so the
    /// controller keeps its previous command.
    pub fn assemble_at(&mut self, timestamp: PrimitiveDateTime) -> Result<Reading, SensorReadError> {
        let methane = self.measure(Sensor::Gas)?;
        let temperature = self.measure(Sensor::Temperature)?;
        let ph = self.measure(Sensor::Acidity)?;

        let heat_status = match self.heater.regulate(temperature) {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    held = %self.heater.state(),
                    "heat coil command failed, keeping previous state: {e}"
                );
                self.heater.state()
            }
        };

        Ok(Reading::new(methane, temperature, ph, heat_status, timestamp))
    }

    pub fn heater(&self) -> &Heater {
        &self.heater
    }

    fn measure(&mut self, sensor: Sensor) -> Result<f64, SensorReadError> {
        let channel = self.channels.channel(sensor);
        let raw = self
            .adc
            .read_channel(channel)
            .map_err(|source| SensorReadError { sensor, source })?;
        let value = self.calibration.convert(sensor, raw);
        debug!(%sensor, channel, raw, value, "sensor sampled");
        Ok(value)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::HwError;
    use crate::heater::HeaterPin;
    use crate::reading::HeatStatus;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use time::macros::datetime;

    /// Fixed raw value per channel; channels listed in `failing` error out.
    pub(crate) struct FixedAdc {
        pub(crate) values: HashMap<u8, u16>,
        pub(crate) failing: Vec<u8>,
        pub(crate) reads: Arc<Mutex<Vec<u8>>>,
    }

    impl FixedAdc {
        pub(crate) fn new(gas: u16, temp: u16, ph: u16) -> Self {
            Self {
                values: HashMap::from([(0, gas), (1, temp), (2, ph)]),
                failing: Vec::new(),
                reads: Arc::default(),
            }
        }
    }

    impl ChannelReader for FixedAdc {
        fn read_channel(&mut self, channel: u8) -> Result<u16, HwError> {
            self.reads.lock().unwrap().push(channel);
            if self.failing.contains(&channel) {
                return Err(HwError::Bus("transfer error".into()));
            }
            Ok(self.values.get(&channel).copied().unwrap_or(0))
        }
    }

    #[derive(Clone, Default)]
    pub(crate) struct SharedPin {
        pub(crate) writes: Arc<Mutex<Vec<bool>>>,
        pub(crate) broken: Arc<Mutex<bool>>,
    }

    impl HeaterPin for SharedPin {
        fn set_level(&mut self, high: bool) -> Result<(), HwError> {
            if *self.broken.lock().unwrap() {
                return Err(HwError::Pin("write failed".into()));
            }
            self.writes.lock().unwrap().push(high);
            Ok(())
        }
    }

    pub(crate) fn station(adc: FixedAdc, pin: SharedPin) -> Station {
        let heater = Heater::new(Box::new(pin), 30.0, false).unwrap();
        Station::new(
            Box::new(adc),
            ChannelMap::default(),
            Calibration::default(),
            heater,
        )
    }

    #[test]
    fn worked_example_end_to_end() {
        // gas=300, temp=620, ph=500 at 3.3 V / 1023
        let mut st = station(FixedAdc::new(300, 620, 500), SharedPin::default());
        let r = st.assemble_at(datetime!(2024-06-01 12:00:00)).unwrap();

        assert_eq!(r.methane, 433.87);
        assert_eq!(r.temperature, 200.0);
        // 500 counts = 1.6129 V -> 7 + 0.8871 / 0.18
        assert_eq!(r.ph, 11.93);
        // 200 °C is above target: coil off.
        assert_eq!(r.heat_status, HeatStatus::Off);
        assert_eq!(r.timestamp, datetime!(2024-06-01 12:00:00));
    }

    #[test]
    fn cold_digester_turns_coil_on() {
        // 62 counts = 0.2 V = 20 °C
        let pin = SharedPin::default();
        let mut st = station(FixedAdc::new(300, 62, 775), pin.clone());
        let r = st.assemble_at(datetime!(2024-06-01 12:00:00)).unwrap();

        assert_eq!(r.heat_status, HeatStatus::On);
        assert_eq!(st.heater().state(), HeatStatus::On);
        assert_eq!(pin.writes.lock().unwrap().last(), Some(&true));
    }

    #[test]
    fn sensors_read_in_order() {
        let adc = FixedAdc::new(1, 2, 3);
        let reads = Arc::clone(&adc.reads);
        let mut st = station(adc, SharedPin::default());
        st.assemble().unwrap();
        assert_eq!(*reads.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn read_failure_names_sensor_and_skips_coil() {
        let mut adc = FixedAdc::new(300, 62, 500);
        adc.failing.push(2);
        let pin = SharedPin::default();
        let mut st = station(adc, pin.clone());

        let err = st.assemble().unwrap_err();
        assert_eq!(err.sensor, Sensor::Acidity);
        assert_eq!(err.to_string(), "ph sensor read failed");

        // Only the write from Heater::new; no command this cycle.
        assert_eq!(*pin.writes.lock().unwrap(), vec![false]);
        assert_eq!(st.heater().state(), HeatStatus::Off);
    }

    #[test]
    fn failure_keeps_previous_coil_state() {
        let mut st = station(FixedAdc::new(300, 62, 500), SharedPin::default());
        st.assemble().unwrap();
        assert_eq!(st.heater().state(), HeatStatus::On);

        let mut failing = FixedAdc::new(300, 900, 500);
        failing.failing.push(0);
        st.adc = Box::new(failing);
        assert!(st.assemble().is_err());
        assert_eq!(st.heater().state(), HeatStatus::On);
    }

    #[test]
    fn pin_failure_still_produces_reading() {
        let pin = SharedPin::default();
        let mut st = station(FixedAdc::new(300, 62, 500), pin.clone());
        *pin.broken.lock().unwrap() = true;

        let r = st.assemble().unwrap();
        // Command did not go through: the reading reports the held state.
        assert_eq!(r.heat_status, HeatStatus::Off);
    }
}
