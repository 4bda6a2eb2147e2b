use std::{collections::HashMap, env, hint::black_box, ops::Deref, time::Instant};

use derive_more::{Display, Error};
use rand::Rng;

mod harness;
mod primitive;

pub use harness::{Harness, HarnessOptions, IterationLength, Measurement, format_report};
pub use primitive::Int2DoubleMap;

/// Random lookups performed by one invocation of a measured operation.
pub const NUM_LOOKUPS: usize = 1_000_000;
/// Keys `0..MAP_SIZE` are populated into every map.
pub const MAP_SIZE: usize = 100_000_000;

pub const MAP_SIZE_ENV: &str = "LOOKUP_BENCH_MAP_SIZE";
pub const NUM_LOOKUPS_ENV: &str = "LOOKUP_BENCH_NUM_LOOKUPS";

// Keys are i32, so the key space ends at i32::MAX.
const MAX_MAP_SIZE: usize = i32::MAX as usize + 1;

/// Every key and every value is its own heap allocation.
pub type BoxedMap = HashMap<Box<i32>, Box<f64>>;

/// Population function, also measured directly.
///
/// Both truncations saturate, so large keys collapse to `i32::MAX ^ 7 ^ i32::MAX`.
#[inline]
pub fn f1(i: i32) -> f64 {
    let i = f64::from(i);
    let d = (i * i + 5.0 * i - 99.0 * i) * (i * 76.0 / (i * 4.0 + 1.0));
    f64::from((d as i32) ^ 7 ^ ((i * i + i / 7.0) as i32))
}

/// `f2(0)` divides zero by zero and yields NaN.
#[inline]
pub fn f2(i: i32) -> f64 {
    let i = f64::from(i);
    i.sqrt() * i.tan() * i / (98.0 * i)
}

#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[display("map size must be between 1 and {max}, got {size}")]
    MapSize { size: usize, max: usize },
    #[display("number of lookups must be at least 1")]
    NumLookups,
    #[display("{name} must be a non-negative integer, got {value:?}")]
    Env { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    map_size: usize,
    num_lookups: usize,
}

impl Config {
    pub fn new(map_size: usize, num_lookups: usize) -> Result<Self, ConfigError> {
        if !(1..=MAX_MAP_SIZE).contains(&map_size) {
            return Err(ConfigError::MapSize {
                size: map_size,
                max: MAX_MAP_SIZE,
            });
        }
        if num_lookups == 0 {
            return Err(ConfigError::NumLookups);
        }
        Ok(Config {
            map_size,
            num_lookups,
        })
    }

    /// Defaults overridden by `LOOKUP_BENCH_MAP_SIZE` and `LOOKUP_BENCH_NUM_LOOKUPS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let map_size = env_count(MAP_SIZE_ENV)?.unwrap_or(MAP_SIZE);
        let num_lookups = env_count(NUM_LOOKUPS_ENV)?.unwrap_or(NUM_LOOKUPS);
        Self::new(map_size, num_lookups)
    }

    pub fn map_size(&self) -> usize {
        self.map_size
    }

    pub fn num_lookups(&self) -> usize {
        self.num_lookups
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            map_size: MAP_SIZE,
            num_lookups: NUM_LOOKUPS,
        }
    }
}

fn env_count(name: &'static str) -> Result<Option<usize>, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_count(name, value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_count(name: &'static str, value: String) -> Result<usize, ConfigError> {
    let digits = value.trim().replace('_', "");
    match digits.parse() {
        Ok(count) => Ok(count),
        Err(_) => Err(ConfigError::Env { name, value }),
    }
}

/// Which maps a trial populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapSelection {
    Neither,
    Boxed,
    Primitive,
    Both,
}

impl MapSelection {
    fn from_flags(boxed: bool, primitive: bool) -> Self {
        match (boxed, primitive) {
            (true, true) => MapSelection::Both,
            (true, false) => MapSelection::Boxed,
            (false, true) => MapSelection::Primitive,
            (false, false) => MapSelection::Neither,
        }
    }

    pub fn boxed(self) -> bool {
        matches!(self, MapSelection::Boxed | MapSelection::Both)
    }

    pub fn primitive(self) -> bool {
        matches!(self, MapSelection::Primitive | MapSelection::Both)
    }

    pub fn union(self, other: Self) -> Self {
        Self::from_flags(
            self.boxed() || other.boxed(),
            self.primitive() || other.primitive(),
        )
    }
}

/// Trial-level state: both maps populated with `f1` over `0..map_size`.
/// Immutable once built.
pub struct Trial {
    config: Config,
    boxed: BoxedMap,
    primitive: Int2DoubleMap,
}

impl Trial {
    /// Populates the selected maps. Maps left out of `maps` stay empty.
    pub fn setup(config: &Config, maps: MapSelection) -> Self {
        let start = Instant::now();
        let mut boxed = BoxedMap::new();
        let mut primitive = Int2DoubleMap::new();
        if maps.boxed() {
            boxed.reserve(config.map_size);
        }
        if maps.primitive() {
            primitive = Int2DoubleMap::with_capacity(config.map_size);
        }

        if maps != MapSelection::Neither {
            for key in 0..config.map_size {
                let key = key as i32;
                let value = f1(key);
                if maps.boxed() {
                    boxed.insert(Box::new(key), Box::new(value));
                }
                if maps.primitive() {
                    primitive.insert(key, value);
                }
            }
            log::info!(
                "populated {:?} maps with {} keys in {:?}",
                maps,
                config.map_size,
                start.elapsed()
            );
        }

        Trial {
            config: *config,
            boxed,
            primitive,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn boxed(&self) -> &BoxedMap {
        &self.boxed
    }

    pub fn primitive(&self) -> &Int2DoubleMap {
        &self.primitive
    }
}

/// Iteration-level state: the keys one invocation looks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indexes(Box<[i32]>);

impl Indexes {
    /// Draws `num_lookups` keys uniformly from `0..map_size`.
    pub fn generate<R: Rng>(config: &Config, rng: &mut R) -> Self {
        let bound = config.map_size;
        Indexes(
            (0..config.num_lookups)
                .map(|_| rng.random_range(0..bound) as i32)
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }
}

impl From<Vec<i32>> for Indexes {
    fn from(keys: Vec<i32>) -> Self {
        Indexes(keys.into_boxed_slice())
    }
}

impl Deref for Indexes {
    type Target = [i32];

    fn deref(&self) -> &[i32] {
        &self.0
    }
}

/// Consumes every computed value so the work is not optimized away.
pub trait Sink {
    fn consume(&mut self, value: f64);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Blackhole;

impl Sink for Blackhole {
    #[inline]
    fn consume(&mut self, value: f64) {
        black_box(value);
    }
}

impl Sink for Vec<f64> {
    fn consume(&mut self, value: f64) {
        self.push(value);
    }
}

pub fn direct_polynomial<S: Sink>(_trial: &Trial, indexes: &[i32], sink: &mut S) {
    for &i in indexes {
        sink.consume(f1(i));
    }
}

pub fn direct_trig<S: Sink>(_trial: &Trial, indexes: &[i32], sink: &mut S) {
    for &i in indexes {
        sink.consume(f2(i));
    }
}

/// A key missing from the map feeds NaN to the sink.
pub fn boxed_lookup<S: Sink>(trial: &Trial, indexes: &[i32], sink: &mut S) {
    for i in indexes {
        sink.consume(trial.boxed.get(i).map_or(f64::NAN, |v| **v));
    }
}

/// A key missing from the map feeds NaN to the sink.
pub fn primitive_lookup<S: Sink>(trial: &Trial, indexes: &[i32], sink: &mut S) {
    for &i in indexes {
        sink.consume(trial.primitive.get(i).unwrap_or(f64::NAN));
    }
}

pub type Operation = fn(&Trial, &[i32], &mut Blackhole);

#[derive(Debug, Clone, Copy)]
pub struct Benchmark {
    pub name: &'static str,
    pub description: &'static str,
    /// Maps the operation reads.
    pub maps: MapSelection,
    pub op: Operation,
}

impl Benchmark {
    #[inline]
    pub fn run(&self, trial: &Trial, indexes: &[i32]) {
        (self.op)(trial, indexes, &mut Blackhole);
    }
}

pub static BENCHMARKS: [Benchmark; 4] = [
    Benchmark {
        name: "f1",
        description: "compute the population function directly",
        maps: MapSelection::Neither,
        op: direct_polynomial::<Blackhole>,
    },
    Benchmark {
        name: "f2",
        description: "compute sqrt/tan directly",
        maps: MapSelection::Neither,
        op: direct_trig::<Blackhole>,
    },
    Benchmark {
        name: "hashMap",
        description: "look up boxed keys in a SipHash HashMap",
        maps: MapSelection::Boxed,
        op: boxed_lookup::<Blackhole>,
    },
    Benchmark {
        name: "int2DoubleHashMap",
        description: "look up keys in the open-addressing i32 -> f64 map",
        maps: MapSelection::Primitive,
        op: primitive_lookup::<Blackhole>,
    },
];

/// Case-insensitive lookup in [`BENCHMARKS`].
pub fn find_benchmark(name: &str) -> Option<&'static Benchmark> {
    BENCHMARKS.iter().find(|b| b.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use crate::{
        BENCHMARKS, Config, ConfigError, Indexes, MAX_MAP_SIZE, MapSelection, NUM_LOOKUPS, Trial,
        boxed_lookup, direct_polynomial, direct_trig, f1, f2, find_benchmark, parse_count,
        primitive_lookup,
    };

    fn run_all(trial: &Trial, indexes: &[i32]) -> [Vec<f64>; 4] {
        let mut poly = Vec::new();
        let mut trig = Vec::new();
        let mut boxed = Vec::new();
        let mut primitive = Vec::new();
        direct_polynomial(trial, indexes, &mut poly);
        direct_trig(trial, indexes, &mut trig);
        boxed_lookup(trial, indexes, &mut boxed);
        primitive_lookup(trial, indexes, &mut primitive);
        [poly, trig, boxed, primitive]
    }

    fn bits(values: &[f64]) -> Vec<u64> {
        values.iter().map(|v| v.to_bits()).collect()
    }

    #[test]
    fn f1_known_values() {
        assert_eq!(f1(0), 7.0);
        assert_eq!(f1(1), -1411.0);
        assert_eq!(f1(3), -4798.0);
        assert_eq!(f1(9), -14185.0);
    }

    #[test]
    fn f1_saturates_large_keys() {
        assert_eq!(f1(99_999_999), 7.0);
    }

    #[test]
    fn f1_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(3);
        let indexes = Indexes::generate(&Config::new(1 << 30, 1_000).unwrap(), &mut rng);
        for &i in indexes.iter() {
            assert_eq!(f1(i).to_bits(), f1(i).to_bits());
        }
    }

    #[test]
    fn f2_of_zero_is_not_finite() {
        assert!(!f2(0).is_finite());
        assert!(f2(0).is_nan());
    }

    #[test]
    fn f2_of_one() {
        assert!((f2(1) - 1f64.tan() / 98.0).abs() < 1e-15);
    }

    #[test]
    fn indexes_have_requested_length_and_range() {
        let config = Config::default();
        let indexes = Indexes::generate(&config, &mut rand::rng());

        assert_eq!(indexes.len(), NUM_LOOKUPS);
        assert!(
            indexes
                .iter()
                .all(|&i| i >= 0 && (i as usize) < config.map_size())
        );
    }

    #[test]
    fn indexes_in_range_for_any_seed() {
        let config = Config::new(37, 500).unwrap();
        for seed in 0..20 {
            let indexes = Indexes::generate(&config, &mut StdRng::seed_from_u64(seed));
            assert_eq!(indexes.len(), 500);
            assert!(indexes.iter().all(|&i| (0..37).contains(&i)));
        }
    }

    #[test]
    fn maps_agree_with_population_function() {
        // Past 46_341 both truncations in f1 saturate.
        let config = Config::new(60_000, 1).unwrap();
        let trial = Trial::setup(&config, MapSelection::Both);

        assert_eq!(trial.boxed().len(), 60_000);
        assert_eq!(trial.primitive().len(), 60_000);
        for key in 0..60_000 {
            let expected = f1(key).to_bits();
            assert_eq!(trial.boxed().get(&key).map(|v| v.to_bits()), Some(expected));
            assert_eq!(trial.primitive().get(key).map(f64::to_bits), Some(expected));
        }
        assert!((46_341..60_000).all(|key| trial.primitive().get(key) == Some(7.0)));
    }

    #[test]
    fn ten_key_scenario() {
        let config = Config::new(10, 5).unwrap();
        let trial = Trial::setup(&config, MapSelection::Both);
        let indexes = Indexes::from(vec![3, 3, 7, 0, 9]);

        let [poly, trig, boxed, primitive] = run_all(&trial, &indexes);

        assert_eq!(poly, vec![-4798.0, -4798.0, f1(7), 7.0, -14185.0]);
        assert_eq!(bits(&boxed), bits(&poly));
        assert_eq!(bits(&primitive), bits(&poly));
        let expected_trig: Vec<f64> = indexes.iter().map(|&i| f2(i)).collect();
        assert_eq!(bits(&trig), bits(&expected_trig));
        assert!(trig[3].is_nan());
        assert!(trig.iter().enumerate().all(|(n, v)| n == 3 || v.is_finite()));
    }

    #[test]
    fn single_key_scenario() {
        let config = Config::new(1, 4).unwrap();
        let trial = Trial::setup(&config, MapSelection::Both);
        let indexes = Indexes::generate(&config, &mut rand::rng());
        assert_eq!(indexes.as_slice(), &[0, 0, 0, 0]);

        let [poly, trig, boxed, primitive] = run_all(&trial, &indexes);

        assert_eq!(poly, vec![7.0; 4]);
        assert_eq!(boxed, vec![7.0; 4]);
        assert_eq!(primitive, vec![7.0; 4]);
        assert!(trig.iter().all(|v| !v.is_finite()));
    }

    #[test]
    fn isolated_trial_leaves_other_map_empty() {
        let config = Config::new(64, 8).unwrap();
        let trial = Trial::setup(&config, MapSelection::Primitive);
        assert!(trial.boxed().is_empty());
        assert_eq!(trial.primitive().len(), 64);

        let indexes = Indexes::from(vec![1, 2]);
        let mut missing = Vec::new();
        boxed_lookup(&trial, &indexes, &mut missing);
        assert!(missing.iter().all(|v| v.is_nan()));

        let empty = Trial::setup(&config, MapSelection::Neither);
        assert!(empty.boxed().is_empty());
        assert!(empty.primitive().is_empty());
    }

    #[test]
    fn config_validation() {
        assert_eq!(
            Config::new(0, 1),
            Err(ConfigError::MapSize {
                size: 0,
                max: MAX_MAP_SIZE
            })
        );
        assert!(Config::new(MAX_MAP_SIZE + 1, 1).is_err());
        assert!(Config::new(MAX_MAP_SIZE, 1).is_ok());
        assert_eq!(Config::new(1, 0), Err(ConfigError::NumLookups));

        let err = Config::new(0, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("map size must be between 1 and {MAX_MAP_SIZE}, got 0")
        );
    }

    #[test]
    fn parse_env_counts() {
        assert_eq!(parse_count("N", "1_000".into()), Ok(1_000));
        assert_eq!(parse_count("N", " 42 ".into()), Ok(42));
        assert_eq!(
            parse_count("N", "ten".into()),
            Err(ConfigError::Env {
                name: "N",
                value: "ten".into()
            })
        );
    }

    #[test]
    fn registry_lookup() {
        assert_eq!(find_benchmark("hashmap").map(|b| b.name), Some("hashMap"));
        assert_eq!(
            find_benchmark("INT2DOUBLEHASHMAP").map(|b| b.maps),
            Some(MapSelection::Primitive)
        );
        assert!(find_benchmark("treeMap").is_none());

        let mut names: Vec<_> = BENCHMARKS.iter().map(|b| b.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BENCHMARKS.len());
    }

    #[test]
    fn registry_runs_against_trial() {
        let config = Config::new(16, 32).unwrap();
        let trial = Trial::setup(&config, MapSelection::Both);
        let indexes = Indexes::generate(&config, &mut StdRng::seed_from_u64(5));
        for benchmark in BENCHMARKS.iter() {
            benchmark.run(&trial, &indexes);
        }
    }

    #[test]
    fn map_selection_union() {
        use MapSelection::*;

        assert_eq!(Neither.union(Neither), Neither);
        assert_eq!(Neither.union(Boxed), Boxed);
        assert_eq!(Boxed.union(Primitive), Both);
        assert_eq!(Primitive.union(Both), Both);
        assert!(Both.boxed() && Both.primitive());
        assert!(!Neither.boxed() && !Neither.primitive());
    }
}
