use clap::Parser;
use flat_hash_map::FlatHashMap;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    #[arg(short = 'l', long = "max_load_factor", default_value_t = 0.75)]
    max_load_factor: f32,

    /// Fraction of keys erased and replaced after filling, to show tombstone reuse.
    #[arg(short = 'e', long = "erase_fraction", default_value_t = 0.25)]
    erase_fraction: f64,

    #[arg(short = 's', long = "seed", default_value_t = 42)]
    seed: u64,
}

fn main() {
    let args = Args::parse();
    let mut rng = SmallRng::seed_from_u64(args.seed);

    println!(
        "Creating FlatHashMap with target capacity: {}",
        args.target_capacity
    );

    let mut map: FlatHashMap<u64, u64> = FlatHashMap::with_capacity(args.target_capacity);
    if let Err(err) = map.try_set_max_load_factor(args.max_load_factor) {
        eprintln!("{err}, falling back to clamping");
        map.set_max_load_factor(args.max_load_factor);
    }

    println!("Actual capacity: {}", map.capacity());
    println!("Maximum load factor: {:.2}", map.max_load_factor());
    println!("Filling map up to its growth limit...");

    let limit = (map.capacity() as f64 * map.max_load_factor() as f64) as usize;
    let mut keys = Vec::with_capacity(limit);
    while map.len() < limit {
        let key = rng.random();
        if map.insert(key, key).1 {
            keys.push(key);
        }
    }

    println!("Inserted {} values", map.len());
    map.probe_histogram().print();
    map.debug_stats().print();

    let churn = (keys.len() as f64 * args.erase_fraction) as usize;
    println!();
    println!("Erasing and replacing {churn} keys...");
    for key in keys.iter().take(churn) {
        map.erase(key);
    }
    map.debug_stats().print();

    for _ in 0..churn {
        let key = rng.random();
        map.insert(key, key);
    }

    println!();
    println!("After refilling:");
    println!(
        "Final load factor: {:.2}% at capacity {}",
        map.load_factor() * 100.0,
        map.capacity()
    );
    map.probe_histogram().print();
    map.debug_stats().print();
}
