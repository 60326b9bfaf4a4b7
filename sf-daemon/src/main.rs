//! socfan Daemon (socfand)
//!
//! Keeps an SoC between 30°C and 35°C by stepping a PWM fan one microsecond
//! at a time, and reports every decision to an MQTT broker.
//!
//! # Hardware
//! - **Temperature**: hwmon chip `soc_thermal` and `thermal_zone0`, averaged
//! - **Fan speed**: tach signal on a sysfs GPIO line, edges counted for 500ms
//! - **Fan drive**: sysfs PWM channel, 40µs period
//!
//! # Failure Handling
//! - Missing sensor at startup aborts; mid-run it skips the cycle
//! - A failed PWM write stops the daemon with a non-zero exit
//! - Broker and tach problems are logged and never stop control

mod fan_control;
mod logging;
mod telemetry;

use std::path::PathBuf;

use anyhow::Context;
use sf_core::{
    default_config_path, Config, HwmonTemperature, PwmActuator, SysfsGpioInput, SysfsPwmOutput,
    TachometerCounter, TemperatureSampler, ThermalZoneTemperature,
};
use tracing::{error, info, warn};

use crate::fan_control::{warm_start, FanControlLoop};
use crate::telemetry::{MqttPublisher, NullSink, TelemetrySink};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    eprintln!("socfand {} - SoC fan control daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    socfand [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH   Config file (default: {})", default_config_path().display());
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}          Log level (trace, debug, info, warn, error)", logging::LOG_ENV);
    eprintln!("    SOCFAN_MQTT_PASSWORD  Broker password, overrides the config file");
}

fn print_version() {
    println!("socfand {}", VERSION);
}

/// sysfs exports and PWM writes need root on most boards
fn check_privileges() {
    // SAFETY: geteuid has no preconditions and only returns the effective user ID.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!("Running as euid {} - sysfs GPIO and PWM writes may be refused", euid);
    }
}

fn connect_telemetry(config: &Config) -> Box<dyn TelemetrySink> {
    if !config.telemetry.enabled {
        info!("Telemetry disabled");
        return Box::new(NullSink);
    }
    match MqttPublisher::connect(&config.telemetry) {
        Ok(publisher) => Box::new(publisher),
        Err(e) => {
            warn!("Telemetry unavailable: {} - continuing without it", e);
            Box::new(NullSink)
        }
    }
}

fn main() -> anyhow::Result<()> {
    // PHASE 1: Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: PathBuf = default_config_path();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                print_version();
                return Ok(());
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = PathBuf::from(&args[i]);
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    // PHASE 2: Configuration, then logging (the log file comes from config)
    let loaded = Config::load(&config_path)
        .with_context(|| format!("Failed to load config {:?}", config_path))?;
    let sink = logging::init_logging(loaded.config.logging.file.as_deref());

    info!("STARTUP: socfand {} starting (logging to {})", VERSION, sink);
    loaded.log_summary();
    let config = loaded.config;
    check_privileges();

    // PHASE 3: Signal handling
    ctrlc::set_handler(|| {
        info!("SIGNAL: Shutdown requested, exiting");
        std::process::exit(0);
    })
    .context("Failed to install signal handler")?;

    // PHASE 4: First temperature reading, before any sysfs export
    let mut sampler = TemperatureSampler::new(
        HwmonTemperature::new(&config.sensors.hwmon_root, &config.sensors.hwmon_name),
        ThermalZoneTemperature::new(&config.sensors.thermal_zone),
    );
    let smoother = warm_start(&mut sampler).context("No SoC temperature at startup")?;

    // PHASE 5: Telemetry and fan hardware
    let telemetry = connect_telemetry(&config);

    let tach_input = SysfsGpioInput::open(&config.tachometer.gpio_root, config.tachometer.gpio)
        .context("Tachometer setup failed")?;
    info!("STARTUP: tach on GPIO {}", config.tachometer.gpio);

    let pwm_output = SysfsPwmOutput::open(&config.pwm.chip, config.pwm.channel)
        .context("PWM setup failed")?;

    let mut control = FanControlLoop::new(
        sampler,
        TachometerCounter::new(tach_input),
        PwmActuator::new(pwm_output),
        telemetry,
    )
    .with_smoother(smoother);

    // PHASE 6: Startup sequence and control loop
    control
        .startup(config.pwm.period_us)
        .context("Startup failed")?;

    if let Err(e) = control.run() {
        error!("FATAL: {} - fan left at its last setting", e);
        return Err(e).context("Fan control stopped");
    }
    Ok(())
}
