use std::{
    ptr::NonNull,
    sync::{Arc, Mutex},
    thread,
};

use seqpool::{
    AlignmentStrategy, AllocError, BlockList, Configuration, GlobalAllocator, GrowthStrategy,
    InfrequentDeleteBlockList, SequentialPool,
};
use seqpool_test::CountingAllocator;

#[test]
fn block_list_release_returns_every_block() {
    let allocator = CountingAllocator::new();
    let mut list = BlockList::new(&allocator);

    let a = list.allocate(10).unwrap();
    let b = list.allocate(20).unwrap();

    assert!(a.is_some() && b.is_some());
    assert_eq!(2, allocator.blocks_in_use());

    list.release();

    assert_eq!(0, allocator.blocks_in_use());
    assert_eq!(2, allocator.deallocations());
}

#[test]
fn infrequent_delete_block_list_only_releases_in_bulk() {
    let allocator = CountingAllocator::new();
    let mut list = InfrequentDeleteBlockList::new(&allocator);

    let a = list.allocate(10).unwrap();
    list.allocate(20).unwrap();

    list.deallocate(a);
    assert_eq!(2, allocator.blocks_in_use());

    drop(list);
    assert_eq!(0, allocator.blocks_in_use());
}

#[test]
fn sequential_pool_grows_geometrically() {
    let allocator = CountingAllocator::new();
    let configuration = Configuration::new().with_initial_size(64);
    let mut pool = SequentialPool::with_configuration(configuration, &allocator).unwrap();

    pool.allocate(50).unwrap();
    assert_eq!(64, pool.cursor().size());

    pool.allocate(30).unwrap();
    assert_eq!(128, pool.cursor().size());

    assert_eq!(2, allocator.blocks_in_use());

    pool.release();
    assert_eq!(0, allocator.blocks_in_use());
}

#[test]
fn sequential_pool_shares_allocator() {
    let allocator = CountingAllocator::new();

    let mut first = SequentialPool::new(&allocator);
    let mut second = SequentialPool::new(&allocator);

    first.allocate(8).unwrap();
    second.allocate(8).unwrap();
    second.allocate(1000).unwrap();

    assert_eq!(3, allocator.blocks_in_use());

    drop(second);
    assert_eq!(1, allocator.blocks_in_use());

    drop(first);
    assert_eq!(0, allocator.blocks_in_use());
}

#[test]
fn sequential_pool_memory_is_usable() {
    let allocator = CountingAllocator::new();
    let configuration = Configuration::new()
        .with_initial_size(100)
        .with_growth(GrowthStrategy::Constant)
        .with_alignment(AlignmentStrategy::Maximum);
    let mut pool = SequentialPool::with_configuration(configuration, &allocator).unwrap();

    let values: Vec<NonNull<u64>> = (0..100u64)
        .map(|i| {
            let pointer = pool.allocate(8).unwrap().expect("Non-null").cast::<u64>();
            unsafe { pointer.as_ptr().write(i) };
            pointer
        })
        .collect();

    for (i, pointer) in values.iter().enumerate() {
        assert_eq!(i as u64, unsafe { pointer.as_ptr().read() });
    }
}

#[test]
fn sequential_pool_propagates_out_of_memory() {
    let allocator = CountingAllocator::new();
    let mut pool = SequentialPool::new(&allocator);

    allocator.fail_after(0);

    assert!(matches!(pool.allocate(8), Err(AllocError::OutOfMemory { .. })));

    allocator.succeed();

    assert!(pool.allocate(8).unwrap().is_some());
}

#[test]
fn block_lists_move_across_threads() {
    let allocator = CountingAllocator::new();

    let mut list = BlockList::new(&allocator);
    let mut infrequent = InfrequentDeleteBlockList::new(&allocator);

    thread::scope(|scope| {
        scope.spawn(|| {
            list.allocate(10).unwrap();
            infrequent.allocate(10).unwrap();
        });
    });

    assert_eq!(2, allocator.blocks_in_use());

    thread::scope(|scope| {
        scope.spawn(move || {
            drop(list);
            drop(infrequent);
        });
    });

    assert_eq!(0, allocator.blocks_in_use());
}

#[test]
fn sequential_pool_shared_behind_lock() {
    let pool = Arc::new(Mutex::new(SequentialPool::new(GlobalAllocator)));

    let handles: Vec<_> = (0..4u8).map(|marker| {
        let pool = pool.clone();

        thread::spawn(move || {
            (0..100).map(|i| {
                let size = i % 31 + 1;
                let pointer = pool.lock().unwrap().allocate(size).unwrap().expect("Non-null");

                unsafe { pointer.as_ptr().write_bytes(marker, size) };

                (pointer.as_ptr() as usize, size, marker)
            }).collect::<Vec<_>>()
        })
    }).collect();

    let allocations: Vec<_> = handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();

    assert_eq!(400, allocations.len());

    for &(address, size, marker) in &allocations {
        let bytes = unsafe { std::slice::from_raw_parts(address as *const u8, size) };
        assert!(bytes.iter().all(|&byte| byte == marker), "Corrupted {:x}", address);
    }

    let mut pool = pool.lock().unwrap();

    assert!(pool.num_blocks() > 0);

    pool.release();
    assert_eq!(0, pool.num_blocks());
}

#[cfg(unix)]
mod native {

use seqpool::{AllocError, NativeBlockDispenser, ProtectableSequentialAllocator};

#[test]
fn protectable_round_trip() {
    let dispenser = NativeBlockDispenser::new();
    let allocator = ProtectableSequentialAllocator::new(&dispenser);

    let pointer = allocator.allocate(64).unwrap().expect("Non-null");
    unsafe { pointer.as_ptr().write_bytes(0x33, 64) };

    assert_eq!(dispenser.page_size().value(), allocator.num_bytes_allocated());

    allocator.protect().unwrap();

    assert!(allocator.is_protected());
    assert_eq!(Err(AllocError::Protected), allocator.allocate(1));
    assert_eq!(0x33, unsafe { *pointer.as_ptr().add(63) });

    allocator.unprotect().unwrap();

    unsafe { pointer.as_ptr().write_bytes(0x44, 64) };
    assert_eq!(0x44, unsafe { *pointer.as_ptr() });

    allocator.release();
    assert_eq!(0, allocator.num_bytes_allocated());
}

#[test]
fn protectable_expand_to_end_of_buffer() {
    let dispenser = NativeBlockDispenser::new();
    let allocator = ProtectableSequentialAllocator::new(&dispenser);

    let pointer = allocator.allocate(16).unwrap().expect("Non-null");

    let size = allocator.expand(pointer, 16, usize::MAX);

    assert!(size > 16);
    assert!(size < dispenser.page_size().value());

    unsafe { pointer.as_ptr().write_bytes(0x55, size) };
}

#[test]
fn protectable_release_while_protected() {
    let dispenser = NativeBlockDispenser::new();
    let allocator = ProtectableSequentialAllocator::new(&dispenser).with_growth_limit(dispenser.page_size().value());

    for size in &[10, 100, 1000, 10_000, 100_000] {
        allocator.allocate(*size).unwrap();
    }

    allocator.protect().unwrap();
    allocator.release();

    assert!(!allocator.is_protected());
    assert!(allocator.allocate(10).unwrap().is_some());
}

} // mod native
