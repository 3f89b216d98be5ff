use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

/// Crates whose debug output drowns the reconciler's own events.
const QUIET_CRATES: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn", "rustls=warn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default = "default_file_path")]
    pub file_path: PathBuf,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_path() -> PathBuf {
    PathBuf::from("/var/log/devbox/devbox.log")
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: default_file_path(),
        }
    }
}

// Writes every buffer to both sinks; succeeds if either one does.
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

fn build_filter(level: &str) -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    for directive in QUIET_CRATES {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Install the global tracing subscriber. `RUST_LOG` overrides `settings.level`.
///
/// Keep the returned guard alive for the life of the process when logging to a
/// file, otherwise buffered lines are lost on exit.
pub fn init_subscriber(settings: &LogSettings) -> Option<WorkerGuard> {
    let subscriber = registry().with(build_filter(&settings.level));
    let is_json = settings.format == LogFormat::Json;

    let log_dir = settings.file_path.parent().unwrap_or_else(|| Path::new("."));
    let log_filename = settings
        .file_path
        .file_name()
        .unwrap_or_else(|| "devbox.log".as_ref());

    match settings.output {
        LogOutput::Console => {
            let layer = tracing_subscriber::fmt::layer().with_writer(io::stdout);
            if is_json {
                subscriber.with(layer.json()).init();
            } else {
                subscriber.with(layer.pretty()).init();
            }
            None
        }
        LogOutput::File => {
            let appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            if is_json {
                subscriber.with(layer.json()).init();
            } else {
                subscriber.with(layer).init();
            }
            Some(guard)
        }
        LogOutput::Both => {
            let appender = tracing_appender::rolling::daily(log_dir, log_filename);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let tee = MakeTee {
                make_a: io::stdout,
                make_b: writer,
            };
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(tee);
            if is_json {
                subscriber.with(layer.json()).init();
            } else {
                subscriber.with(layer).init();
            }
            Some(guard)
        }
        LogOutput::None => {
            subscriber.init();
            None
        }
    }
}
