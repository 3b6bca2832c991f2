use std::{env, io, process, time::Duration};

use getopts::{Matches, Options};
use metrics_statsd_server::{Backend, BuildError, StatsDaemon, StatsDaemonBuilder};
use thiserror::Error;
use tracing::{error, Level};

#[derive(Debug, Error)]
enum ConfigError {
    #[error("invalid value '{value}' for --{name}")]
    InvalidNumber { name: &'static str, value: String },

    #[error(transparent)]
    Build(#[from] BuildError),
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("b", "bind", "address to listen for statsd packets on (default: :8125)", "[HOST]:PORT");
    opts.optmulti("d", "dest", "sink to send snapshots to, may be repeated", "[BACKEND:][HOST]:PORT");
    opts.optopt("f", "flush", "flush interval, in seconds (default: 10)", "SECONDS");
    opts.optopt("p", "percent", "percentile threshold for timers (default: 90)", "PERCENT");
    opts.optopt("x", "prefix", "prefix to prepend to every metric key", "PREFIX");
    opts.optflagmulti("v", "verbose", "log every packet; repeat for more verbose logging");
    opts.optflag("l", "list", "list the supported sink backends");
    opts.optflag("h", "help", "print this help menu");

    opts
}

fn parse_number(matches: &Matches, name: &'static str) -> Result<Option<f64>, ConfigError> {
    let Some(value) = matches.opt_str(name) else {
        return Ok(None);
    };

    match value.trim().parse::<f64>() {
        Ok(number) => Ok(Some(number)),
        Err(_) => Err(ConfigError::InvalidNumber { name, value }),
    }
}

fn configure(matches: &Matches, debug: bool) -> Result<StatsDaemon, ConfigError> {
    let mut builder = StatsDaemonBuilder::default().with_debug(debug);

    if let Some(bind) = matches.opt_str("bind") {
        builder = builder.with_bind_address(bind)?;
    }

    for dest in matches.opt_strs("dest") {
        builder = builder.with_sink(dest)?;
    }

    if let Some(secs) = parse_number(matches, "flush")? {
        let interval = Duration::try_from_secs_f64(secs)
            .map_err(|_| ConfigError::InvalidNumber { name: "flush", value: secs.to_string() })?;
        builder = builder.with_flush_interval(interval);
    }

    if let Some(percent) = parse_number(matches, "percent")? {
        builder = builder.with_percent_threshold(percent);
    }

    if let Some(prefix) = matches.opt_str("prefix") {
        builder = builder.with_key_prefix(prefix);
    }

    Ok(builder.build()?)
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("statsd-server", String::as_str);
    let opts = opts();

    let matches = match opts.parse(args.get(1..).unwrap_or_default()) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}: {}", program, f);
            print_usage(program, &opts);
            process::exit(1);
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return;
    }

    if matches.opt_present("list") {
        for backend in Backend::ALL {
            println!("{}", backend.name());
        }
        return;
    }

    let verbosity = matches.opt_count("verbose");
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_ansi(true)
        .with_level(true)
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let daemon = match configure(&matches, verbosity > 0) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "Invalid configuration.");
            process::exit(1);
        }
    };

    if let Err(e) = daemon.start() {
        error!(error = %e, "Daemon failed.");
        process::exit(1);
    }
}
