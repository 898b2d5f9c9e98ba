//! Logging setup. One colored, single-line-per-record `env_logger` format
//! when stdout is a terminal, the library default otherwise.

use std::io::Write;

use env_logger::fmt::Color;
use env_logger::Builder;
use log::Level;

/// Install the global logger. `RUST_LOG` is honored if set; otherwise the
/// scheduler runs at `info` by default.
pub fn init_log() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }

    if atty::is(atty::Stream::Stdout) {
        Builder::new()
            .format(|buf, record| {
                let ts = buf.timestamp();
                let level = record.level();
                let mut level_style = buf.style();
                match level {
                    Level::Trace => level_style.set_color(Color::White),
                    Level::Debug => level_style.set_color(Color::Blue),
                    Level::Info => level_style.set_color(Color::Green),
                    Level::Warn => level_style.set_color(Color::Yellow),
                    Level::Error => level_style.set_color(Color::Red).set_bold(true),
                };
                writeln!(buf, "{:>5} {} {}", level_style.value(level), ts, record.args())
            })
            .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
            .init();
    } else {
        env_logger::init();
    }
}
