//! Seeded randomized round-trip tests
//!
//! Random multi-batch ingests for every encoding. After reload, every
//! station must yield exactly the records written for it, across all of
//! its chains, and time-range queries must match a filtered model.

use std::collections::BTreeMap;
use std::sync::Arc;

use obschain::{
    Convention, Encoding, Index, MemoryStore, RecNo, RecordPayload, Schema, StationKey, TimeRange,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

const SEEDS: u64 = 16;
const STATIONS: i64 = 6;

/// station → (recno, time) in append order
type Model = BTreeMap<StationKey, Vec<(RecNo, i64)>>;

fn open(encoding: Encoding) -> Index<MemoryStore> {
    let convention = Convention::default();
    let store = MemoryStore::new(Schema::for_encoding(&convention, encoding), &convention);
    Index::open(Arc::new(store), &convention).unwrap()
}

/// Unique times so chronological order is total
fn random_time(rng: &mut SmallRng, seq: &mut i64) -> i64 {
    *seq += 1;
    rng.random_range(0..10_000i64) * 1_000 + *seq
}

/// One session: interleaved keys, or one run per key for Contiguous
fn ingest_batch(index: &Index<MemoryStore>, rng: &mut SmallRng, model: &mut Model, seq: &mut i64) {
    let mut writer = index.writer();

    let mut plan: Vec<i64> = Vec::new();
    match index.encoding() {
        Encoding::Contiguous => {
            for station in 0..STATIONS {
                if rng.random_bool(0.7) {
                    let run = rng.random_range(1..8);
                    plan.extend(std::iter::repeat(station).take(run));
                }
            }
        }
        Encoding::Forward | Encoding::Backward => {
            let len = rng.random_range(1..60);
            for _ in 0..len {
                plan.push(rng.random_range(0..STATIONS));
            }
        }
    }

    for station in plan {
        let time = random_time(rng, seq);
        let recno = writer
            .append(RecordPayload::new(station, time).field("seq", *seq as f64))
            .unwrap();
        model
            .entry(StationKey::Id(station))
            .or_default()
            .push((recno, time));
    }
    writer.finalize().unwrap();
}

fn check_roundtrip(encoding: Encoding) {
    for seed in 0..SEEDS {
        let mut rng = SmallRng::seed_from_u64(0x0B5C_4A17_u64 ^ seed);
        let mut index = open(encoding);
        let mut model = Model::new();
        let mut seq = 0i64;

        let batches = rng.random_range(1..4);
        for _ in 0..batches {
            ingest_batch(&index, &mut rng, &mut model, &mut seq);
            index.reload().unwrap();
        }

        assert!(index.merge_faults().is_empty(), "seed {}", seed);
        assert_eq!(index.stations().len(), model.len(), "seed {}", seed);

        for (key, expected) in &model {
            let mut expected = expected.clone();
            expected.sort_by_key(|&(_, time)| time);

            let got: Vec<(RecNo, i64)> = index
                .observations_of(key, None)
                .unwrap()
                .iter()
                .map(|o| (o.recno, o.time()))
                .collect();
            assert_eq!(got, expected, "seed {} station {}", seed, key);

            let station = index.station(key).unwrap();
            if encoding == Encoding::Contiguous {
                assert_eq!(station.count(), Some(expected.len() as u64));
            }

            // Random inclusive window, endpoints taken from real times
            let a = expected[rng.random_range(0..expected.len())].1;
            let b = expected[rng.random_range(0..expected.len())].1;
            let range = TimeRange::new(a.min(b), a.max(b));
            let filtered: Vec<(RecNo, i64)> = expected
                .iter()
                .copied()
                .filter(|&(_, t)| range.contains(t))
                .collect();
            let got: Vec<(RecNo, i64)> = index
                .observations_of(key, Some(range))
                .unwrap()
                .iter()
                .map(|o| (o.recno, o.time()))
                .collect();
            assert_eq!(got, filtered, "seed {} station {} range", seed, key);
        }

        let report = index.verify();
        assert!(report.is_clean(), "seed {}: {:?}", seed, report);
        assert_eq!(report.observations, seq as u64);
    }
}

#[test]
fn test_roundtrip_forward() {
    check_roundtrip(Encoding::Forward);
}

#[test]
fn test_roundtrip_backward() {
    check_roundtrip(Encoding::Backward);
}

#[test]
fn test_roundtrip_contiguous() {
    check_roundtrip(Encoding::Contiguous);
}
