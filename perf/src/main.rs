use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use lookup_bench::{
    BENCHMARKS, Benchmark, Config, Harness, HarnessOptions, IterationLength, MAP_SIZE,
    MAP_SIZE_ENV, MapSelection, Measurement, NUM_LOOKUPS, NUM_LOOKUPS_ENV, Trial, find_benchmark,
    format_report,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Lookup latency of direct computation versus boxed and primitive-keyed hash maps.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Benchmark to run, by name. Repeat to run several. Runs all of them when omitted.
    #[arg(long = "bench", value_name = "NAME")]
    benches: Vec<String>,

    /// Keys populated into each map.
    #[arg(env = MAP_SIZE_ENV, long, default_value_t = MAP_SIZE)]
    map_size: usize,

    /// Random lookups per invocation.
    #[arg(env = NUM_LOOKUPS_ENV, long, default_value_t = NUM_LOOKUPS)]
    num_lookups: usize,

    /// Unrecorded iterations before measuring.
    #[arg(long, default_value_t = 5)]
    warmup: usize,

    /// Measured iterations per benchmark.
    #[arg(long, default_value_t = 5)]
    iterations: usize,

    /// Seconds each warmup and measured iteration keeps invoking the benchmark.
    #[arg(long, default_value_t = 10.0)]
    time: f64,

    /// Run this many invocations per iteration instead of a fixed time.
    #[arg(long, conflicts_with = "time")]
    ops_per_iteration: Option<usize>,

    /// Fixed seed for the lookup keys. Fresh randomness every iteration when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Build a separate trial per benchmark holding only the map it reads.
    #[arg(long)]
    isolate: bool,

    /// Print the registered benchmarks and exit.
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.list {
        for benchmark in BENCHMARKS.iter() {
            println!("{:<20} {}", benchmark.name, benchmark.description);
        }
        return Ok(());
    }

    if args.iterations == 0 {
        bail!("--iterations must be at least 1");
    }
    let config = Config::new(args.map_size, args.num_lookups)
        .context("invalid benchmark configuration")?;
    let selected = select(&args.benches)?;
    let iteration_length = match args.ops_per_iteration {
        Some(0) => bail!("--ops-per-iteration must be at least 1"),
        Some(count) => IterationLength::Ops(count),
        None => IterationLength::Time(
            Duration::try_from_secs_f64(args.time)
                .context("--time must be a non-negative number")?,
        ),
    };
    let harness = Harness::new(HarnessOptions {
        warmup_iterations: args.warmup,
        measurement_iterations: args.iterations,
        iteration_length,
        seed: args.seed,
    });

    log::info!(
        "running {} benchmarks, map size {}, {} lookups, {:?}",
        selected.len(),
        config.map_size(),
        config.num_lookups(),
        harness.options()
    );

    let measurements = if args.isolate {
        run_isolated(&harness, &config, &selected)
    } else {
        run_shared(&harness, &config, &selected)
    };

    print!("{}", format_report(&measurements));
    Ok(())
}

fn select(names: &[String]) -> Result<Vec<&'static Benchmark>> {
    if names.is_empty() {
        return Ok(BENCHMARKS.iter().collect());
    }

    names
        .iter()
        .map(|name| {
            find_benchmark(name).with_context(|| {
                let available: Vec<_> = BENCHMARKS.iter().map(|b| b.name).collect();
                format!(
                    "unknown benchmark {name:?}, expected one of {}",
                    available.join(", ")
                )
            })
        })
        .collect()
}

/// One trial holding every map the selected benchmarks read.
fn run_shared(
    harness: &Harness,
    config: &Config,
    selected: &[&'static Benchmark],
) -> Vec<Measurement> {
    let maps = selected
        .iter()
        .fold(MapSelection::Neither, |maps, b| maps.union(b.maps));
    let trial = Trial::setup(config, maps);
    selected.iter().map(|b| harness.run(b, &trial)).collect()
}

/// A fresh trial per benchmark. Only one map is resident at a time.
fn run_isolated(
    harness: &Harness,
    config: &Config,
    selected: &[&'static Benchmark],
) -> Vec<Measurement> {
    selected
        .iter()
        .map(|b| {
            let trial = Trial::setup(config, b.maps);
            let measurement = harness.run(b, &trial);
            log::info!("{}: {:.3} us/op", b.name, measurement.mean());
            measurement
        })
        .collect()
}
