//! End-to-end cache hierarchy scenarios, each driven purely through
//! `MemoryInterface::{request_fetch,poll_fetch,request_data,poll_data,clock}`
//! the way the CPU controller would.

use mem_hier::{CachedMemory, DataAccess, MainMemory, MemoryInterface};
use sim_core::WordBus;

fn tick_until_fetch_ready(mem: &mut CachedMemory, ip: u32) -> (u32, u64) {
    mem.request_fetch(ip);
    let mut ticks = 0u64;
    loop {
        if let Some(word) = mem.poll_fetch() {
            return (word, ticks);
        }
        mem.clock();
        ticks += 1;
    }
}

#[test]
fn cold_fetch_ready_on_tick_155() {
    let mut raw = MainMemory::new();
    raw.poke_word(0x20, 0xDEAD_BEEF); // word index 0x20 == byte address 0x80
    let mut mem = CachedMemory::new(raw);

    let (word, ticks) = tick_until_fetch_ready(&mut mem, 0x80);
    assert_eq!(ticks, 155);
    assert_eq!(word, 0xDEAD_BEEF);
}

#[test]
fn warm_refetch_ready_on_tick_3() {
    let mut raw = MainMemory::new();
    raw.poke_word(0x20, 0xDEAD_BEEF);
    let mut mem = CachedMemory::new(raw);

    tick_until_fetch_ready(&mut mem, 0x80);
    let (word, ticks) = tick_until_fetch_ready(&mut mem, 0x80);
    assert_eq!(ticks, 3);
    assert_eq!(word, 0xDEAD_BEEF);
}

fn tick_until_store_done(mem: &mut CachedMemory, addr: u32, data: u32) {
    mem.request_data(DataAccess::Store { addr, data });
    while mem.poll_data().is_none() {
        mem.clock();
    }
}

#[test]
fn ninth_store_evicts_and_writes_back_the_first_line() {
    let mut mem = CachedMemory::new(MainMemory::new());

    // Eight stores fill the 8-line data cache exactly.
    for line in 0..8u32 {
        tick_until_store_done(&mut mem, line * 0x80, 0x1000 + line);
    }
    // A ninth, to a fresh line base, forces FIFO eviction of line base 0x0000.
    tick_until_store_done(&mut mem, 0x0400, 0x11);

    let raw = mem.into_main_memory();
    assert_eq!(raw.read(0x0000), 0x1000);
}

#[test]
fn suspension_without_ticking_memory_never_resolves() {
    let mut mem = CachedMemory::new(MainMemory::new());
    mem.request_fetch(0x200);
    for _ in 0..1000 {
        assert!(mem.poll_fetch().is_none(), "must not resolve without Clock");
    }
}
