use std::time::{Duration, Instant};

use rand::{SeedableRng, rngs::StdRng};

use crate::{Benchmark, Indexes, Trial};

/// How many invocations one warmup or measured iteration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationLength {
    /// Keep invoking until the duration has elapsed. Always at least one call.
    Time(Duration),
    /// A fixed number of invocations. Zero is treated as one.
    Ops(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessOptions {
    pub warmup_iterations: usize,
    pub measurement_iterations: usize,
    pub iteration_length: IterationLength,
    /// Seeds iteration `n` with `seed + n`. Unseeded runs draw from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        HarnessOptions {
            warmup_iterations: 5,
            measurement_iterations: 5,
            iteration_length: IterationLength::Time(Duration::from_secs(10)),
            seed: None,
        }
    }
}

/// Average time per invocation of one benchmark, one sample per measured iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: &'static str,
    pub samples_us: Vec<f64>,
}

impl Measurement {
    pub fn count(&self) -> usize {
        self.samples_us.len()
    }

    pub fn mean(&self) -> f64 {
        if self.samples_us.is_empty() {
            return f64::NAN;
        }
        self.samples_us.iter().sum::<f64>() / self.count() as f64
    }

    /// Sample standard deviation across iterations. NaN with fewer than two samples.
    pub fn error(&self) -> f64 {
        if self.count() < 2 {
            return f64::NAN;
        }
        let mean = self.mean();
        let sum_sq: f64 = self.samples_us.iter().map(|s| (s - mean).powi(2)).sum();
        (sum_sq / (self.count() - 1) as f64).sqrt()
    }
}

pub struct Harness {
    options: HarnessOptions,
}

impl Harness {
    pub fn new(options: HarnessOptions) -> Self {
        Harness { options }
    }

    pub fn options(&self) -> &HarnessOptions {
        &self.options
    }

    /// Runs warmup then measured iterations. Each iteration draws one set of
    /// indexes outside the timed region, invokes the operation repeatedly over
    /// it, and records the average time per invocation.
    pub fn run(&self, benchmark: &Benchmark, trial: &Trial) -> Measurement {
        let warmup = self.options.warmup_iterations;
        let mut samples_us = Vec::with_capacity(self.options.measurement_iterations);

        for iteration in 0..warmup + self.options.measurement_iterations {
            let indexes = self.indexes(trial, iteration);
            let (ops, elapsed) = self.invoke(benchmark, trial, &indexes);
            let us_per_op = elapsed.as_secs_f64() * 1e6 / ops as f64;

            if iteration < warmup {
                log::debug!(
                    "{} warmup {}: {:.3} us/op over {} ops",
                    benchmark.name,
                    iteration + 1,
                    us_per_op,
                    ops
                );
            } else {
                log::debug!(
                    "{} iteration {}: {:.3} us/op over {} ops",
                    benchmark.name,
                    iteration - warmup + 1,
                    us_per_op,
                    ops
                );
                samples_us.push(us_per_op);
            }
        }

        Measurement {
            name: benchmark.name,
            samples_us,
        }
    }

    fn invoke(&self, benchmark: &Benchmark, trial: &Trial, indexes: &[i32]) -> (usize, Duration) {
        let start = Instant::now();
        let ops = match self.options.iteration_length {
            IterationLength::Ops(count) => {
                let count = count.max(1);
                for _ in 0..count {
                    benchmark.run(trial, indexes);
                }
                count
            }
            IterationLength::Time(budget) => {
                let mut ops = 0;
                loop {
                    benchmark.run(trial, indexes);
                    ops += 1;
                    if start.elapsed() >= budget {
                        break ops;
                    }
                }
            }
        };
        (ops, start.elapsed())
    }

    fn indexes(&self, trial: &Trial, iteration: usize) -> Indexes {
        match self.options.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(iteration as u64));
                Indexes::generate(trial.config(), &mut rng)
            }
            None => Indexes::generate(trial.config(), &mut rand::rng()),
        }
    }
}

/// Formats measurements as an average-time table in microseconds per operation.
pub fn format_report(measurements: &[Measurement]) -> String {
    let width = measurements
        .iter()
        .map(|m| m.name.len())
        .max()
        .unwrap_or(0)
        .max("Benchmark".len());

    let mut report = format!(
        "{:<width$}  Mode  Cnt  {:>14}  {:>12}  Units\n",
        "Benchmark", "Score", "Error"
    );
    for m in measurements {
        report.push_str(&format!(
            "{:<width$}  avgt  {:>3}  {:>14.3}  {:>12.3}  us/op\n",
            m.name,
            m.count(),
            m.mean(),
            m.error()
        ));
    }
    report
}
