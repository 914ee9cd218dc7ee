use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use clap::Parser;
use elastic_hash::HashTable;
use elastic_hash::hash_table::Entry;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "capacity", default_value_t = 100_000)]
    capacity: usize,

    #[arg(short = 'd', long = "delta", default_value_t = 0.1)]
    delta: f64,
}

fn hash_u64(value: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write_u64(value);
    hasher.finish()
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating HashTable with capacity {} and delta {}",
        args.capacity, args.delta
    );

    let mut table: HashTable<(u64, u64)> =
        HashTable::with_capacity_and_delta(args.capacity, args.delta)
            .expect("invalid capacity/delta");

    println!("Insert cap: {} entries", table.max_inserts());
    println!("Probe budget: {} slots", table.max_probe_limit());
    println!("Filling table with u64 keys...");

    let mut num_failures = 0u64;
    for key in 0..table.max_inserts() as u64 {
        let hash = hash_u64(key);
        match table.entry(hash, |entry| entry.0 == key) {
            Ok(Entry::Vacant(entry)) => {
                entry.insert((key, key));
            }
            Ok(Entry::Occupied(_)) => {
                panic!("key already present: {}", key);
            }
            Err(_) => {
                num_failures += 1;
            }
        }
    }

    println!("Inserted {} entries", table.len());
    println!("Final load factor: {:.2}%", table.load_factor() * 100.0);
    println!(
        "Max group used: {} (probe offset {} of limit {})",
        table.max_group_used(),
        table.max_probe_used(),
        table.max_probe_limit()
    );
    println!(
        "Refused insertions: {} ({:.02}%)",
        num_failures,
        num_failures as f64 / table.max_inserts() as f64 * 100.0
    );
}
