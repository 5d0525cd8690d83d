#![allow(unknown_lints)]

extern crate chrono;
extern crate fern;
extern crate tallier;

#[macro_use]
extern crate log;

use chrono::Utc;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tallier::aggregate::AggregationTable;
use tallier::config::Args;
use tallier::gather::Gatherer;
use tallier::sink::Sink;
use tallier::source::{BoxedProvider, FlushTimer, Poller, RecordReader, Source};
use tallier::status::{StatusFile, StatusRegistry};

fn build_sinks(args: &Args) -> Vec<Box<Sink + Send>> {
    args.sinks().iter().map(|s| s.build()).collect()
}

fn spawn<S>(name: &str, mut source: S)
where
    S: Source + Send + 'static,
{
    let res = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || source.run());
    if let Err(e) = res {
        error!("could not start {}: {}", name, e);
        process::exit(1);
    }
}

fn main() {
    let args = match tallier::config::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("tallier: {}", e);
            process::exit(1);
        }
    };

    let level = match args.verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    // reports go to stdout, logs stay out of their way
    let logging = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}][{}] {}",
                record.module_path().unwrap_or("?"),
                record.line().unwrap_or(0),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply();
    if let Err(e) = logging {
        eprintln!("tallier: could not set up logging: {}", e);
        process::exit(1);
    }

    info!("tallier - {}", args.version);
    if args.sinks().is_empty() {
        warn!("no sinks configured, reports will be discarded");
    }

    let table = Arc::new(AggregationTable::new(args.aggregation.clone()));

    spawn(
        "flush",
        FlushTimer::new(
            Arc::clone(&table),
            build_sinks(&args),
            Duration::from_secs(args.flush_interval),
        ),
    );

    if !args.resources.is_empty() {
        let registry = Arc::new(StatusRegistry::new());
        let resources: Vec<(String, BoxedProvider)> = args.resources
            .iter()
            .map(|r| {
                let provider: BoxedProvider = Box::new(StatusFile::new(r.tag.as_str(), &r.path));
                (r.tag.clone(), provider)
            })
            .collect();
        info!("polling {} resources every {}s", resources.len(), args.poll_interval);
        spawn(
            "poll",
            Poller::new(
                Gatherer::new(args.groups, registry),
                resources,
                build_sinks(&args),
                Duration::from_secs(args.poll_interval),
            ),
        );
    }

    match args.input {
        Some(ref path) => match File::open(path) {
            Ok(fp) => RecordReader::new(BufReader::new(fp), Arc::clone(&table)).run(),
            Err(e) => {
                error!("could not open {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => {
            let stdin = io::stdin();
            let mut reader = RecordReader::new(stdin.lock(), Arc::clone(&table));
            reader.run();
        }
    }

    // input is exhausted, make sure its tail is not lost
    let mut last = FlushTimer::new(table, build_sinks(&args), Duration::from_secs(0));
    last.flush_once();
}
