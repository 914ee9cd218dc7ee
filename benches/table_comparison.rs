use std::hash::Hasher;
use std::hint::black_box;

use criterion::Criterion;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use elastic_hash::HashTable;
use elastic_hash::hash_table::Entry;
use hashbrown::hash_table::Entry as HashbrownEntry;
use hashbrown::hash_table::HashTable as HashbrownHashTable;
use rand::TryRngCore;
use rand::rngs::OsRng;
use siphasher::sip::SipHasher;

#[derive(Clone, Debug, PartialEq, Eq)]
struct TestItem {
    key: u64,
    value: u64,
}

// Element counts sized so the fixed-capacity table runs at 85% load, the
// regime the elastic placement policy is built for.
const SIZES: &[usize] = &[10_000, 100_000];
const TARGET_LOAD: f64 = 0.85;

fn hash_key(key: u64) -> u64 {
    let mut hasher = SipHasher::new();
    hasher.write_u64(key);
    black_box(hasher.finish())
}

fn random_keys(count: usize) -> Vec<u64> {
    let mut rng = OsRng;
    (0..count).map(|_| rng.try_next_u64().unwrap()).collect()
}

fn fill_elastic(capacity: usize, keys: &[u64]) -> HashTable<TestItem> {
    let mut table = HashTable::with_capacity(capacity).unwrap();
    for &key in keys {
        match table.entry(hash_key(key), |v: &TestItem| v.key == key) {
            Ok(Entry::Vacant(entry)) => {
                entry.insert(TestItem { key, value: key });
            }
            Ok(Entry::Occupied(_)) => {}
            // Probe exhaustion under the linear schedule; skip the key the
            // same way the lookup loops below skip misses.
            Err(_) => {}
        }
    }
    table
}

fn fill_hashbrown(capacity: usize, keys: &[u64]) -> HashbrownHashTable<TestItem> {
    let mut table = HashbrownHashTable::with_capacity(capacity);
    for &key in keys {
        match table.entry(hash_key(key), |v: &TestItem| v.key == key, |v| hash_key(v.key)) {
            HashbrownEntry::Vacant(entry) => {
                entry.insert(TestItem { key, value: key });
            }
            HashbrownEntry::Occupied(_) => {}
        }
    }
    table
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for &size in SIZES {
        let capacity = (size as f64 / TARGET_LOAD) as usize;
        let keys = random_keys(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("elastic_hash/{}", size), |b| {
            b.iter(|| black_box(fill_elastic(capacity, &keys)))
        });
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| black_box(fill_hashbrown(size, &keys)))
        });
    }

    group.finish();
}

fn bench_find_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_hit");

    for &size in SIZES {
        let capacity = (size as f64 / TARGET_LOAD) as usize;
        let keys = random_keys(size);
        let lookups = &keys[0..size / 10];

        let elastic = fill_elastic(capacity, &keys);
        let hashbrown = fill_hashbrown(size, &keys);

        group.throughput(Throughput::Elements(lookups.len() as u64));
        group.bench_function(format!("elastic_hash/{}", size), |b| {
            b.iter(|| {
                for &key in lookups {
                    black_box(elastic.find(hash_key(key), |v| v.key == key));
                }
            })
        });
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| {
                for &key in lookups {
                    black_box(hashbrown.find(hash_key(key), |v| v.key == key));
                }
            })
        });
    }

    group.finish();
}

fn bench_find_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_miss");

    for &size in SIZES {
        let capacity = (size as f64 / TARGET_LOAD) as usize;
        let keys = random_keys(size);
        let misses = random_keys(size / 10);

        let elastic = fill_elastic(capacity, &keys);
        let hashbrown = fill_hashbrown(size, &keys);

        group.throughput(Throughput::Elements(misses.len() as u64));
        group.bench_function(format!("elastic_hash/{}", size), |b| {
            b.iter(|| {
                for &key in &misses {
                    black_box(elastic.find(hash_key(key), |v| v.key == key));
                }
            })
        });
        group.bench_function(format!("hashbrown/{}", size), |b| {
            b.iter(|| {
                for &key in &misses {
                    black_box(hashbrown.find(hash_key(key), |v| v.key == key));
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_find_hit, bench_find_miss);
criterion_main!(benches);
