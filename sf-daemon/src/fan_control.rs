//! Fan control loop
//!
//! Runs the measure, decide, actuate cycle every two minutes:
//!
//! 1. **Sample**: average the two SoC sensors and push into the smoother
//! 2. **Measure**: count tach edges for the fan speed
//! 3. **Decide**: hand the smoothed temperature to the hysteresis controller
//! 4. **Actuate**: on a committed step write the pulse width and re-measure
//! 5. **Report**: publish a telemetry snapshot
//!
//! A sensor that fails mid-run skips the cycle with nothing changed. A failed
//! PWM write ends the loop. Telemetry and tach failures never interrupt it.

use std::thread;
use std::time::Duration;

use sf_core::constants::{pwm, timing};
use sf_core::{
    ControlState, Decision, HysteresisController, PwmActuator, PwmOutput, Result, TachInput,
    TachometerCounter, TemperatureSampler, TemperatureSmoother, TemperatureSource,
};
use sf_protocol::TelemetrySnapshot;
use tracing::{debug, error, info, warn};

use crate::telemetry::TelemetrySink;

/// Skipped cycles between repeated error lines
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Delays of the startup sequence and the cycle period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub interval: Duration,
    pub spinup: Duration,
    pub settle: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            interval: timing::CYCLE_INTERVAL,
            spinup: timing::SPINUP_DELAY,
            settle: timing::SETTLE_DELAY,
        }
    }
}

/// Take the first reading of the run and pre-fill a smoother with it.
///
/// The daemon calls this before exporting any GPIO or PWM channel, so a
/// missing sensor aborts without touching the fan.
pub fn warm_start<A, B>(sampler: &mut TemperatureSampler<A, B>) -> Result<TemperatureSmoother>
where
    A: TemperatureSource,
    B: TemperatureSource,
{
    let initial = sampler.sample()?;
    debug!("Smoother warmed with {:.2}°C", initial);
    Ok(TemperatureSmoother::warm(initial))
}

/// What one completed cycle did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub temperature: f64,
    pub state: ControlState,
    pub confirmations: u8,
    pub decision: Decision,
    pub snapshot: TelemetrySnapshot,
    pub published: bool,
}

pub struct FanControlLoop<A, B, P, O> {
    sampler: TemperatureSampler<A, B>,
    smoother: TemperatureSmoother,
    controller: HysteresisController,
    tach: TachometerCounter<P>,
    actuator: PwmActuator<O>,
    telemetry: Box<dyn TelemetrySink>,
    timing: LoopTiming,
}

impl<A, B, P, O> FanControlLoop<A, B, P, O>
where
    A: TemperatureSource,
    B: TemperatureSource,
    P: TachInput,
    O: PwmOutput,
{
    pub fn new(
        sampler: TemperatureSampler<A, B>,
        tach: TachometerCounter<P>,
        actuator: PwmActuator<O>,
        telemetry: Box<dyn TelemetrySink>,
    ) -> Self {
        Self {
            sampler,
            smoother: TemperatureSmoother::new(),
            controller: HysteresisController::new(),
            tach,
            actuator,
            telemetry,
            timing: LoopTiming::default(),
        }
    }

    /// Use a smoother already warmed by `warm_start`
    pub fn with_smoother(mut self, smoother: TemperatureSmoother) -> Self {
        self.smoother = smoother;
        self
    }

    pub fn with_timing(mut self, timing: LoopTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn controller(&self) -> &HysteresisController {
        &self.controller
    }

    pub fn pulse_width(&self) -> u32 {
        self.actuator.pulse_width()
    }

    /// Bring up the PWM and report the initial state.
    ///
    /// Samples once first unless the smoother was warmed beforehand. Any error
    /// here is returned as is; the daemon does not start on a missing sensor.
    pub fn startup(&mut self, period_us: u32) -> Result<TelemetrySnapshot> {
        let initial = match self.smoother.current() {
            Some(temp) => temp,
            None => {
                let temp = self.sampler.sample()?;
                self.smoother = TemperatureSmoother::warm(temp);
                temp
            }
        };

        self.actuator.initialize(period_us, pwm::PW_INIT)?;
        thread::sleep(self.timing.spinup);

        let fan_speed = self.measure_fan_speed();
        let snapshot = TelemetrySnapshot::new(initial, self.actuator.pulse_width(), fan_speed);
        info!(
            "Init: soc temperature: {:.2}°C, pulsewidth: {} of {}µs, fan speed: {}rpm.",
            snapshot.soc_temp,
            snapshot.pulsewidth,
            self.actuator.period_us(),
            snapshot.fan_speed
        );
        self.publish(&snapshot);

        thread::sleep(self.timing.settle);
        Ok(snapshot)
    }

    /// One control cycle without the trailing sleep
    pub fn step(&mut self) -> Result<CycleReport> {
        let sample = self.sampler.sample()?;
        let temperature = self.smoother.push(sample);
        let mut fan_speed = self.measure_fan_speed();
        let current = self.actuator.pulse_width();

        let decision = self.controller.evaluate(temperature, current);
        match decision {
            Decision::Confirming { confirmations } => {
                info!(
                    "CONTROL: pulse width {} fan speed {}rpm, confirm {}/3",
                    current, fan_speed, confirmations
                );
            }
            Decision::AtLimit { pulse_width } => {
                info!(
                    "CONTROL: pulse width stays {} at its limit, fan speed {}rpm",
                    pulse_width, fan_speed
                );
            }
            Decision::Adjust { pulse_width } => {
                self.actuator.set_pulsewidth(pulse_width)?;
                fan_speed = self.measure_fan_speed();
                info!(
                    "ACTION: pulse width {} -> {}, fan speed now {}rpm",
                    current, pulse_width, fan_speed
                );
            }
            Decision::Switched { .. } => {}
        }

        let snapshot = TelemetrySnapshot::new(temperature, self.actuator.pulse_width(), fan_speed);
        let published = self.publish(&snapshot);

        Ok(CycleReport {
            temperature,
            state: self.controller.state(),
            confirmations: self.controller.confirmations(),
            decision,
            snapshot,
            published,
        })
    }

    /// Cycle forever; only a fatal error returns
    pub fn run(&mut self) -> Result<()> {
        info!(
            "Fan control loop started (interval {:?})",
            self.timing.interval
        );
        let mut consecutive_skips: u32 = 0;

        loop {
            match self.step() {
                Ok(_) => {
                    if consecutive_skips > 0 {
                        debug!("Control loop recovered after {} skipped cycles", consecutive_skips);
                        consecutive_skips = 0;
                    }
                }
                Err(e) if !e.is_fatal() => {
                    consecutive_skips += 1;
                    if consecutive_skips == 1 || consecutive_skips % MAX_CONSECUTIVE_ERRORS == 0 {
                        warn!("Cycle skipped (count: {}): {}", consecutive_skips, e);
                    }
                }
                Err(e) => {
                    error!("Control loop stopped: {}", e);
                    return Err(e);
                }
            }
            thread::sleep(self.timing.interval);
        }
    }

    /// Tach read errors count as a stopped fan
    fn measure_fan_speed(&mut self) -> u32 {
        match self.tach.measure_rpm() {
            Ok(rpm) => rpm,
            Err(e) => {
                warn!("Fan speed unavailable, reporting 0rpm: {}", e);
                0
            }
        }
    }

    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> bool {
        match self.telemetry.publish(snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!("Telemetry publish failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MockTelemetrySink;
    use mockall::{mock, predicate::eq, Sequence};
    use sf_core::SocfanError;
    use std::cell::Cell;
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    mock! {
        pub Pwm {}
        impl PwmOutput for Pwm {
            fn set_period_us(&mut self, period_us: u32) -> Result<()>;
            fn set_pulse_width_us(&mut self, pulse_width_us: u32) -> Result<()>;
            fn set_enabled(&mut self, enabled: bool) -> Result<()>;
        }
    }

    /// Temperature source the test turns by hand
    #[derive(Clone, Default)]
    struct Dial {
        celsius: Rc<Cell<f64>>,
        broken: Rc<Cell<bool>>,
    }

    impl TemperatureSource for Dial {
        fn read_celsius(&mut self) -> Result<f64> {
            if self.broken.get() {
                Err(SocfanError::sensor("dial", "unplugged"))
            } else {
                Ok(self.celsius.get())
            }
        }
    }

    /// Tach line that never moves, or fails every read
    struct FlatTach {
        broken: bool,
    }

    impl TachInput for FlatTach {
        fn is_high(&mut self) -> Result<bool> {
            if self.broken {
                Err(SocfanError::TachRead {
                    path: PathBuf::from("/sys/class/gpio/gpio16/value"),
                    reason: "EIO".into(),
                })
            } else {
                Ok(false)
            }
        }
    }

    fn quiet_pwm() -> MockPwm {
        let mut pwm = MockPwm::new();
        pwm.expect_set_pulse_width_us().with(eq(0)).returning(|_| Ok(()));
        pwm.expect_set_period_us().returning(|_| Ok(()));
        pwm.expect_set_enabled().returning(|_| Ok(()));
        pwm
    }

    fn recording_sink(seen: Arc<Mutex<Vec<TelemetrySnapshot>>>) -> MockTelemetrySink {
        let mut sink = MockTelemetrySink::new();
        sink.expect_publish().returning(move |s| {
            seen.lock().unwrap().push(*s);
            Ok(())
        });
        sink
    }

    fn build(
        dial: &Dial,
        pwm: MockPwm,
        sink: MockTelemetrySink,
        tach_broken: bool,
    ) -> FanControlLoop<Dial, Dial, FlatTach, MockPwm> {
        let tach = TachometerCounter::new(FlatTach { broken: tach_broken })
            .with_window(Duration::from_millis(2));
        FanControlLoop::new(
            TemperatureSampler::new(dial.clone(), dial.clone()),
            tach,
            PwmActuator::new(pwm),
            Box::new(sink),
        )
        .with_timing(LoopTiming {
            interval: Duration::ZERO,
            spinup: Duration::ZERO,
            settle: Duration::ZERO,
        })
    }

    #[test]
    fn test_startup_initializes_pwm_and_reports() {
        let dial = Dial::default();
        dial.celsius.set(31.0);

        let mut seq = Sequence::new();
        let mut pwm = MockPwm::new();
        pwm.expect_set_pulse_width_us()
            .with(eq(0))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        pwm.expect_set_period_us()
            .with(eq(40))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        pwm.expect_set_enabled()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        pwm.expect_set_pulse_width_us()
            .with(eq(20))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut control = build(&dial, pwm, recording_sink(seen.clone()), false);
        let snapshot = control.startup(40).unwrap();

        assert_eq!(snapshot, TelemetrySnapshot::new(31.0, 20, 0));
        assert_eq!(*seen.lock().unwrap(), vec![snapshot]);
    }

    #[test]
    fn test_startup_aborts_without_sensor() {
        let dial = Dial::default();
        dial.broken.set(true);

        // No PWM expectations: nothing may be written
        let mut sink = MockTelemetrySink::new();
        sink.expect_publish().never();
        let mut control = build(&dial, MockPwm::new(), sink, false);

        let err = control.startup(40).unwrap_err();
        assert!(matches!(err, SocfanError::SensorUnavailable { .. }));
    }

    #[test]
    fn test_warm_start_fails_without_sensor() {
        let dial = Dial::default();
        dial.broken.set(true);
        let mut sampler = TemperatureSampler::new(dial.clone(), dial.clone());
        let err = warm_start(&mut sampler).unwrap_err();
        assert!(matches!(err, SocfanError::SensorUnavailable { .. }));
    }

    #[test]
    fn test_startup_uses_prewarmed_smoother() {
        let dial = Dial::default();
        dial.celsius.set(33.5);
        let mut sampler = TemperatureSampler::new(dial.clone(), dial.clone());
        let smoother = warm_start(&mut sampler).unwrap();

        // A sensor lost after the warm start does not block startup
        dial.broken.set(true);
        let mut pwm = quiet_pwm();
        pwm.expect_set_pulse_width_us().with(eq(20)).times(1).returning(|_| Ok(()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut control =
            build(&dial, pwm, recording_sink(seen.clone()), false).with_smoother(smoother);

        let snapshot = control.startup(40).unwrap();
        assert_eq!(snapshot, TelemetrySnapshot::new(33.5, 20, 0));
    }

    #[test]
    fn test_three_warm_cycles_step_down() {
        let dial = Dial::default();
        dial.celsius.set(31.0);

        let mut pwm = quiet_pwm();
        pwm.expect_set_pulse_width_us().with(eq(20)).times(1).returning(|_| Ok(()));
        pwm.expect_set_pulse_width_us().with(eq(19)).times(1).returning(|_| Ok(()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut control = build(&dial, pwm, recording_sink(seen.clone()), false);
        control.startup(40).unwrap();

        let first = control.step().unwrap();
        assert_eq!(first.decision, Decision::Confirming { confirmations: 1 });
        control.step().unwrap();
        let third = control.step().unwrap();

        assert_eq!(third.decision, Decision::Adjust { pulse_width: 19 });
        assert_eq!(third.confirmations, 0);
        assert_eq!(third.snapshot, TelemetrySnapshot::new(31.0, 19, 0));
        assert_eq!(control.pulse_width(), 19);
        // Initial snapshot plus one per cycle
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_sensor_loss_skips_cycle() {
        let dial = Dial::default();
        dial.celsius.set(31.0);

        let mut pwm = quiet_pwm();
        pwm.expect_set_pulse_width_us().with(eq(20)).times(1).returning(|_| Ok(()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut control = build(&dial, pwm, recording_sink(seen.clone()), false);
        control.startup(40).unwrap();
        control.step().unwrap();

        dial.broken.set(true);
        let err = control.step().unwrap_err();
        assert!(!err.is_fatal());
        // Skipped cycle leaves the debounce and the published history alone
        assert_eq!(control.controller().confirmations(), 1);
        assert_eq!(seen.lock().unwrap().len(), 2);

        dial.broken.set(false);
        let report = control.step().unwrap();
        assert_eq!(report.decision, Decision::Confirming { confirmations: 2 });
    }

    #[test]
    fn test_actuator_failure_is_fatal() {
        let dial = Dial::default();
        dial.celsius.set(31.0);

        let mut pwm = quiet_pwm();
        pwm.expect_set_pulse_width_us().with(eq(20)).times(1).returning(|_| Ok(()));
        pwm.expect_set_pulse_width_us()
            .with(eq(19))
            .times(1)
            .returning(|_| Err(SocfanError::actuator("/sys/class/pwm/pwmchip0/pwm0/duty_cycle", "EBUSY")));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut control = build(&dial, pwm, recording_sink(seen.clone()), false);
        control.startup(40).unwrap();
        control.step().unwrap();
        control.step().unwrap();

        let err = control.run().unwrap_err();
        assert!(matches!(err, SocfanError::ActuatorWrite { .. }));
        assert!(err.is_fatal());
        assert_eq!(control.pulse_width(), 20);
    }

    #[test]
    fn test_publish_failure_does_not_stop_cycle() {
        let dial = Dial::default();
        dial.celsius.set(32.0);

        let mut pwm = quiet_pwm();
        pwm.expect_set_pulse_width_us().returning(|_| Ok(()));

        let mut sink = MockTelemetrySink::new();
        sink.expect_publish()
            .returning(|_| Err(SocfanError::telemetry("broker unreachable")));

        let mut control = build(&dial, pwm, sink, false);
        control.startup(40).unwrap();
        let report = control.step().unwrap();

        assert!(!report.published);
        assert_eq!(report.snapshot.soc_temp, 32.0);
    }

    #[test]
    fn test_tach_failure_reports_stopped_fan() {
        let dial = Dial::default();
        dial.celsius.set(33.0);

        let mut pwm = quiet_pwm();
        pwm.expect_set_pulse_width_us().returning(|_| Ok(()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut control = build(&dial, pwm, recording_sink(seen.clone()), true);
        control.startup(40).unwrap();
        let report = control.step().unwrap();

        assert_eq!(report.snapshot.fan_speed, 0);
        assert!(report.published);
    }

    #[test]
    fn test_switch_cycle_writes_nothing() {
        let dial = Dial::default();
        dial.celsius.set(29.0);

        let mut pwm = quiet_pwm();
        pwm.expect_set_pulse_width_us().with(eq(20)).times(1).returning(|_| Ok(()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut control = build(&dial, pwm, recording_sink(seen.clone()), false);
        control.startup(40).unwrap();
        let report = control.step().unwrap();

        assert_eq!(report.decision, Decision::Switched { to: ControlState::GettingHot });
        assert_eq!(report.state, ControlState::GettingHot);
        assert_eq!(report.snapshot.pulsewidth, 20);
    }
}
