use std::io::Write;
use std::sync::Once;

use env_logger::fmt::Color;
use log::Level;

static SETUP_LOGS: Once = Once::new();

/// Installs the process-wide logger. Safe to call more than once.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init() {
    SETUP_LOGS.call_once(|| {
        let _ = build_logger().is_test(false).try_init();
    });
}

/// Same as [`init`] but routes output through the test harness capture.
pub fn init_for_tests() {
    SETUP_LOGS.call_once(|| {
        let _ = build_logger().is_test(true).try_init();
    });
}

fn build_logger() -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();

    builder.format(|f, record| {
        let target = record
            .target()
            .strip_prefix("minisql::")
            .unwrap_or_else(|| record.target());

        let mut style = f.style();
        let level = match record.level() {
            Level::Trace => style.set_color(Color::Magenta).value("TRACE"),
            Level::Debug => style.set_color(Color::Blue).value("DEBUG"),
            Level::Info => style.set_color(Color::Green).value("INFO "),
            Level::Warn => style.set_color(Color::Yellow).value("WARN "),
            Level::Error => style.set_color(Color::Red).value("ERROR"),
        };

        let time = format!("{}", f.timestamp_micros());
        let time = time.get(11..).unwrap_or(&time); // skip date
        writeln!(f, "{time} {level} {target} > {}", record.args())
    });

    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(log::LevelFilter::Info);
    }

    builder.parse_env("RUST_LOG");

    builder
}
