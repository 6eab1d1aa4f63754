mod common;

use std::cell::Cell;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use common::CollidingBuilder;
use common::SipHashBuilder;
use flat_hash_map::Error;
use flat_hash_map::FlatHashMap;
use flat_hash_map::HashTable;

type SipMap<K, V> = FlatHashMap<K, V, SipHashBuilder>;

#[test]
fn distinct_keys_are_all_found() {
    let mut map = SipMap::default();
    for i in 0..10_000u64 {
        assert!(map.insert(i, i.wrapping_mul(31)).1);
        assert!(map.load_factor() <= map.max_load_factor());
    }

    assert_eq!(map.len(), 10_000);
    assert!(map.capacity().is_power_of_two());
    for i in 0..10_000u64 {
        assert_eq!(map.get(&i), Some(&i.wrapping_mul(31)));
    }
    assert_eq!(map.iter().count(), 10_000);
}

#[test]
fn capacity_doubles_at_the_growth_limit() {
    let mut map = SipMap::default();
    let mut capacity = map.capacity();
    for i in 0..2_000u32 {
        let before = map.len();
        map.insert(i, ());
        if map.capacity() != capacity {
            // Growth happens exactly when one more pair would exceed the limit.
            assert!((before + 1) as f32 > capacity as f32 * 0.75);
            assert_eq!(map.capacity(), capacity * 2);
            capacity = map.capacity();
        }
    }
}

#[test]
fn all_keys_colliding() {
    let mut map: FlatHashMap<u32, u32, CollidingBuilder> = FlatHashMap::default();
    for i in 0..200 {
        map.insert(i, i);
    }
    assert_eq!(map.len(), 200);

    for i in (0..200).step_by(2) {
        assert_eq!(map.erase(&i), 1);
    }
    for i in 0..200 {
        assert_eq!(map.contains_key(&i), i % 2 == 1, "key {i}");
    }

    // Re-inserting reuses the tombstones left behind.
    let capacity = map.capacity();
    for i in (0..200).step_by(2) {
        map.insert(i, i + 1);
    }
    assert_eq!(map.capacity(), capacity);
    assert_eq!(map.get(&10), Some(&11));
}

#[test]
fn tombstone_churn_does_not_grow() {
    let mut map = SipMap::with_capacity_and_hasher(64, SipHashBuilder::default());
    for i in 0..40u32 {
        map.insert(i, i);
    }
    let capacity = map.capacity();

    for round in 0..50u32 {
        for i in 0..40u32 {
            assert_eq!(map.erase(&i), 1);
            map.insert(i, i + round);
        }
    }

    assert_eq!(map.capacity(), capacity);
    assert_eq!(map.len(), 40);
    assert_eq!(map.get(&3), Some(&52));
}

#[test]
fn missing_keys_are_errors() {
    let map: SipMap<String, u32> = SipMap::default();
    assert_eq!(map.at("nope"), Err(Error::KeyNotFound));
    assert_eq!(map.get("nope"), None);
    assert_eq!(Error::KeyNotFound.to_string(), "key not found");
}

#[test]
fn positions_survive_inserts_but_not_erases() {
    let mut map = SipMap::default();
    map.insert(1u32, 'a');
    let position = map.find(&1).unwrap();

    // Inserting below the growth limit does not move anything.
    for i in 2..10 {
        map.insert(i, 'b');
    }
    assert_eq!(map.get_at(position), Ok((&1, &'a')));

    map.erase(&5);
    assert_eq!(map.get_at(position), Err(Error::StalePosition));
}

#[test]
fn positions_go_stale_on_growth() {
    let mut map = SipMap::default();
    map.insert(0u32, 0u32);
    let position = map.find(&0).unwrap();

    let capacity = map.capacity();
    let mut i = 1;
    while map.capacity() == capacity {
        map.insert(i, i);
        i += 1;
    }
    assert_eq!(map.next_position(position), Err(Error::StalePosition));
}

struct DropCounter {
    drops: Rc<Cell<usize>>,
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[test]
fn every_value_dropped_once() {
    let drops = Rc::new(Cell::new(0));
    {
        let mut map = SipMap::default();
        for i in 0..500u32 {
            map.insert(
                i,
                DropCounter {
                    drops: drops.clone(),
                },
            );
        }

        // Rejected duplicates are dropped immediately.
        map.insert(
            0,
            DropCounter {
                drops: drops.clone(),
            },
        );
        assert_eq!(drops.get(), 1);

        for i in 0..100 {
            map.erase(&i);
        }
        assert_eq!(drops.get(), 101);

        let remaining = map.len();
        map.drain().take(10).for_each(drop);
        assert_eq!(drops.get(), 101 + remaining);
        assert!(map.is_empty());

        for i in 0..20u32 {
            map.insert(
                i,
                DropCounter {
                    drops: drops.clone(),
                },
            );
        }
    }
    assert_eq!(drops.get(), 521);
}

#[test]
fn clone_is_independent() {
    let mut source: SipMap<u32, Vec<u32>> = (0..100).map(|i| (i, vec![i])).collect();
    let copy = source.clone();

    source.get_mut(&1).unwrap().push(99);
    source.erase(&2);

    assert_eq!(copy.get(&1), Some(&vec![1]));
    assert_eq!(copy.get(&2), Some(&vec![2]));
    assert_eq!(copy.len(), 100);
}

#[test]
fn maps_can_move_across_threads() {
    let map: SipMap<u64, String> = (0..100).map(|i| (i, i.to_string())).collect();
    let handle = std::thread::spawn(move || map.get(&42).cloned());
    assert_eq!(handle.join().unwrap().as_deref(), Some("42"));
}

#[test]
fn deterministic_hasher_gives_deterministic_order() {
    let build = || {
        let mut map = FlatHashMap::with_hasher(SipHashBuilder::with_keys(1, 2));
        for i in 0..64u32 {
            map.insert(i, ());
        }
        map.keys().copied().collect::<Vec<_>>()
    };
    assert_eq!(build(), build());
}

#[test]
fn panicking_hasher_during_growth_keeps_unmoved_values() {
    let mut table: HashTable<u64> = HashTable::new();
    for key in 0..12u64 {
        table.entry(key, |&v| v == key, |&v| v).or_insert(key);
    }

    let calls = Cell::new(0);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        table.reserve(20, |&v| {
            calls.set(calls.get() + 1);
            if calls.get() == 3 {
                panic!("hasher failed");
            }
            v
        });
    }));
    assert!(result.is_err());

    // Keys 0 and 1 were already moved into the new table and dropped with it.
    assert_eq!(table.capacity(), 16);
    assert_eq!(table.len(), 10);
    assert_eq!(table.find(0, |&v| v == 0), None);
    for key in 2..12u64 {
        assert_eq!(table.find(key, |&v| v == key), Some(&key));
    }
}
