//! Logging session orchestration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use me7_conv::{channel_widths, decode};
use me7_kline::{
    run_polling_loop, IdentityCheck, LinkAdapter, SerialConfig, SerialLink, SessionController,
    SessionError, SessionOptions, Verbosity, WakeConfig,
};
use tracing::{debug, info};

use crate::config::LogConfig;
use crate::output::{config_summary, Console, LogWriter};
use crate::Cli;

/// Run `me7log` end to end: connect, check identity, log until Ctrl-C
pub fn run(cli: &Cli) -> Result<()> {
    let config = LogConfig::load(&cli.config)?;
    let console = Console::new(cli.output.is_none());

    console.info("");
    console.info(&config_summary(&config, &cli.port));
    console.info("");

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut writer = match &cli.output {
        Some(path) => LogWriter::create(path)?,
        None => LogWriter::stdout(),
    };

    let link = SerialLink::new(SerialConfig::new(cli.port.as_str()));
    let options = SessionOptions::default().with_verbosity(Verbosity::new(cli.debug));
    let mut controller = SessionController::new(link, options);

    let result = log_session(
        &mut controller,
        &config,
        &config.wake_config(),
        &mut writer,
        &cancel,
        console,
    );

    writer.finish().context("Failed to flush log output")?;
    controller.terminate();

    match result {
        Ok(records) => {
            info!(records, "Logging stopped");
            console.success("Logging Finished");
            Ok(())
        }
        Err(e) => {
            console.error(&format!("Logging aborted: {:#}", e));
            Err(e)
        }
    }
}

/// Connect, configure and poll until `cancel` is set
///
/// Returns the number of records written. Cancelling while the ECU keeps the
/// log record setup busy ends with zero records. The caller terminates the
/// session.
pub fn log_session<L: LinkAdapter>(
    controller: &mut SessionController<L>,
    config: &LogConfig,
    wake: &WakeConfig,
    writer: &mut LogWriter,
    cancel: &AtomicBool,
    console: Console,
) -> Result<u64> {
    let descriptors = config.descriptors();
    let locations = config.locations()?;
    let pacer = config.pacer()?;
    let level = config.security_level()?;
    let baud = config.connection.baud;

    controller
        .wake(wake)
        .with_context(|| format!("Failed to connect ({})", config.connection.connect_mode))?;
    console.info("...signed");

    controller
        .unlock(level)
        .with_context(|| format!("Security access {} failed", level))?;
    controller
        .start_diagnostic_session(baud)
        .with_context(|| format!("Failed to start diagnostic session at {} baud", baud))?;
    console.info(&format!("Connected at {}", baud));
    console.info("....sealed");

    let identity = controller
        .read_identity()
        .context("Failed to read ECU identification")?;
    let check = IdentityCheck::compare(&config.expected_identity(), &identity);
    console.info(&check.to_string());
    if !check.passed() {
        console.warn(&format!(
            "ECU identity mismatch: {}",
            check.failures().join(", ")
        ));
    }
    check.enforce(config.connection.identity_policy)?;

    controller.keepalive().context("Tester present failed")?;
    controller.send_pad_byte()?;

    let layout = match controller.configure_logging(&locations, cancel) {
        Ok(layout) => layout,
        Err(SessionError::Cancelled(_)) => {
            console.info("Stopping");
            return Ok(0);
        }
        Err(e) => return Err(e).context("Failed to set up log record"),
    };
    layout.check_channels(&channel_widths(&descriptors))?;
    debug!(record_len = layout.record_len(), "Log record configured");
    console.info(".....delivered");

    writer.write_header(&descriptors)?;

    let records = run_polling_loop::<_, anyhow::Error, _>(
        controller,
        &pacer,
        cancel,
        |elapsed, record| {
            let sample = decode(record.as_bytes(), &descriptors, elapsed.as_secs_f64())?;
            writer.write_sample(&sample)?;
            Ok(())
        },
    )?;

    console.info("Stopping");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use me7_kline::config::Pulse;
    use me7_kline::{MockLink, SessionState};
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use std::thread;
    use std::time::Duration;

    const CONFIG: &str = r#"
[connection]
ecu_file = "06A906032HS"
sample_rate = 200
connect_mode = "SLOW-0x11"
baud = 38400
part_number = "06A906032HS"
sw_version = "0002"
identity_policy = "abort"

[[channels]]
name = "nmot"
unit = "rpm"
address = "0x380AE7"
size = 1
a = 40.0

[[channels]]
name = "lambda"
address = "0x380B1C"
size = 2
a = 0.1
"#;

    const COMPOSITE: &[u8] = b"06A906032HS 0002          1.8L R4/5VT     Passat";

    fn fast_wake() -> WakeConfig {
        WakeConfig {
            idle_before: Duration::ZERO,
            pulses: WakeConfig::default()
                .pulses
                .iter()
                .map(|p| Pulse::new(p.level, Duration::ZERO))
                .collect(),
            sync_timeout: Duration::from_millis(50),
            handshake_delay: Duration::ZERO,
            ack_timeout: Duration::from_millis(50),
            ..WakeConfig::default()
        }
    }

    fn scripted_ecu(composite: &[u8]) -> MockLink {
        let link = MockLink::new();
        link.on_wake(&[0x55, 0xEF, 0x8F]);
        link.respond_raw(&[0x70], &[0xFE]);
        link.respond(&[0x27, 0x03], &[0x67, 0x03, 0x00, 0x00, 0x00, 0x00]);
        link.respond(&[0x27, 0x04], &[0x67, 0x04, 0x34]);
        link.respond(&[0x10, 0x86, 0x50], &[0x50, 0x86]);
        link.respond_negative(&[0x1A, 0x92], 0x12);
        link.respond_negative(&[0x1A, 0x94], 0x12);
        let mut reply = vec![0x5A, 0x9B];
        reply.extend_from_slice(composite);
        link.respond(&[0x1A, 0x9B], &reply);
        link.respond(&[0x3E], &[0x7E]);
        link.respond(&[0xB7, 0x03], &[0xF7]);
        link.respond_always(&[0xB7], &[0xF7, 0x14, 0x64, 0x00]);
        link
    }

    fn controller(link: &MockLink) -> SessionController<MockLink> {
        let options = SessionOptions {
            baud_settle: Duration::ZERO,
            busy_retry_delay: Duration::ZERO,
            ..SessionOptions::default()
        };
        SessionController::new(link.clone(), options)
    }

    #[test]
    fn test_logs_until_cancelled() {
        let config = LogConfig::parse(CONFIG).unwrap();
        let link = scripted_ecu(COMPOSITE);
        let mut controller = controller(&link);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut writer = LogWriter::new(Box::new(File::create(&path).unwrap()), None);

        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        });

        let records = log_session(
            &mut controller,
            &config,
            &fast_wake(),
            &mut writer,
            &cancel,
            Console::new(false),
        )
        .unwrap();
        stopper.join().unwrap();
        writer.finish().unwrap();
        controller.terminate();

        assert!(records >= 1);
        assert_eq!(controller.state(), SessionState::Terminated);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len() as u64, records + 1);
        assert_eq!(lines[0], "  Time [s], nmot [rpm],     lambda");
        assert!(lines[1].ends_with("   800.000,     10.000"));
        assert_eq!(
            link.requests()[..4],
            [
                vec![0x27, 0x03],
                vec![0x27, 0x04, 0x00, 0x00, 0x2F, 0xC9],
                vec![0x10, 0x86, 0x50],
                vec![0x1A, 0x92],
            ]
        );
    }

    #[test]
    fn test_cancel_during_busy_setup_stops_cleanly() {
        let config = LogConfig::parse(CONFIG).unwrap();
        let link = MockLink::new();
        link.on_wake(&[0x55, 0xEF, 0x8F]);
        link.respond_raw(&[0x70], &[0xFE]);
        link.respond(&[0x27, 0x03], &[0x67, 0x03, 0x00, 0x00, 0x00, 0x00]);
        link.respond(&[0x27, 0x04], &[0x67, 0x04, 0x34]);
        link.respond(&[0x10, 0x86, 0x50], &[0x50, 0x86]);
        link.respond_negative(&[0x1A, 0x92], 0x12);
        link.respond_negative(&[0x1A, 0x94], 0x12);
        let mut reply = vec![0x5A, 0x9B];
        reply.extend_from_slice(COMPOSITE);
        link.respond(&[0x1A, 0x9B], &reply);
        link.respond(&[0x3E], &[0x7E]);
        link.respond_always(&[0xB7, 0x03], &[0x7F, 0xB7, 0x21]);
        link.respond(&[0x82], &[0xC2]);
        let mut controller = controller(&link);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut writer = LogWriter::new(Box::new(File::create(&path).unwrap()), None);
        let cancel = AtomicBool::new(true);

        let records = log_session(
            &mut controller,
            &config,
            &fast_wake(),
            &mut writer,
            &cancel,
            Console::new(false),
        )
        .unwrap();
        writer.finish().unwrap();
        assert_eq!(records, 0);
        assert_eq!(link.request_count(&[0xB7, 0x03]), 1);
        assert_eq!(controller.state(), SessionState::DiagSessionActive);

        controller.terminate();
        assert_eq!(link.request_count(&[0x82]), 1);
        assert_eq!(controller.state(), SessionState::Terminated);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_identity_mismatch_aborts() {
        let config = LogConfig::parse(CONFIG).unwrap();
        let link = scripted_ecu(b"8D0907551M  0001          2.7L V6/5VT     A6");
        let mut controller = controller(&link);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut writer = LogWriter::new(Box::new(File::create(&path).unwrap()), None);
        let cancel = AtomicBool::new(false);

        let err = log_session(
            &mut controller,
            &config,
            &fast_wake(),
            &mut writer,
            &cancel,
            Console::new(false),
        )
        .unwrap_err();
        assert!(err.to_string().contains("identity"));
        assert_eq!(link.request_count(&[0xB7]), 0);
    }

    #[test]
    fn test_connect_failure_reports_context() {
        let config = LogConfig::parse(CONFIG).unwrap();
        let link = MockLink::new();
        let mut controller = controller(&link);
        let mut writer = LogWriter::new(Box::new(std::io::sink()), None);
        let cancel = AtomicBool::new(false);

        let err = log_session(
            &mut controller,
            &config,
            &fast_wake(),
            &mut writer,
            &cancel,
            Console::new(false),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to connect"));
        assert_eq!(controller.state(), SessionState::Disconnected);
    }
}
