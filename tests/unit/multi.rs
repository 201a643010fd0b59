//! Multi-level persistence domain unit tests.
//!
//! The state is a stack of PERS levels, outermost first. Tests cover the
//! stack discipline on loop entry/exit edges, the call-depth truncation,
//! the prefix join, and the per-level access transfer.

use wcet_dcache::access::{Access, AccessAction};
use wcet_dcache::acs::BOT_AGE;
use wcet_dcache::cfg::{BlockRef, Cfg, CfgCollection, CfgId, EdgeRef};
use wcet_dcache::common::Address;
use wcet_dcache::domain::{Domain, MultiPersDomain};

use crate::common::harness::{cache, ram_and_mmio, self_loop, MapProvider, World, RAM_BASE};

fn domain(w: &World) -> MultiPersDomain {
    MultiPersDomain::new(&w.collection, 0, 2, 1 << 20)
}

/// The entry state carries a single outermost level.
#[test]
fn entry_has_one_level() {
    let s = self_loop();
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    w.collection.intern(Address(RAM_BASE)).unwrap();

    let d = domain(&w);
    assert_eq!(d.arena().levels(d.entry()).len(), 1);
}

/// A loop-entry edge pushes a fresh unreferenced level.
#[test]
fn loop_entry_pushes_level() {
    let s = self_loop();
    let entry_edge = s.entry_edge;
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    w.collection.intern(Address(RAM_BASE)).unwrap();
    w.collection.intern(Address(RAM_BASE + 64)).unwrap();

    let prog = w.program();
    let mut d = domain(&w);
    let pushed = d.update_edge(&prog, entry_edge, d.entry());

    let levels = d.arena().levels(pushed).to_vec();
    assert_eq!(levels.len(), 2);
    assert_eq!(d.arena().ages(levels[1]), &[BOT_AGE, BOT_AGE]);
}

/// A loop-exit edge pops down to the sink's depth.
#[test]
fn loop_exit_pops_level() {
    let s = self_loop();
    let entry_edge = s.entry_edge;
    let exit_edge = s.exit_edge;
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    w.collection.intern(Address(RAM_BASE)).unwrap();

    let prog = w.program();
    let mut d = domain(&w);
    let inside = d.update_edge(&prog, entry_edge, d.entry());
    assert_eq!(d.arena().levels(inside).len(), 2);

    let outside = d.update_edge(&prog, exit_edge, inside);
    assert_eq!(d.arena().levels(outside).len(), 1);
}

/// Joining stacks of different depth aligns at the outermost level and
/// keeps the longer stack's deeper levels unchanged.
#[test]
fn join_aligns_at_outermost() {
    let s = self_loop();
    let entry_edge = s.entry_edge;
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    w.collection.intern(Address(RAM_BASE)).unwrap();

    let prog = w.program();
    let mut d = domain(&w);
    let shallow = d.entry();
    let deep = d.update_edge(&prog, entry_edge, d.entry());
    let deep_inner = d.arena().levels(deep)[1];

    let j = d.join(shallow, deep);
    let levels = d.arena().levels(j).to_vec();
    assert_eq!(levels.len(), 2);
    assert_eq!(levels[1], deep_inner, "deeper levels pass through");
}

/// Bottom is the unit of the join.
#[test]
fn join_with_bottom_is_identity() {
    let s = self_loop();
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    w.collection.intern(Address(RAM_BASE)).unwrap();

    let mut d = domain(&w);
    let e = d.entry();
    assert_eq!(d.join(d.bot(), e), e);
    assert_eq!(d.join(e, d.bot()), e);
}

/// The access transfer applies to every level of the stack.
#[test]
fn access_applies_to_every_level() {
    let s = self_loop();
    let entry_edge = s.entry_edge;
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    let a = w.collection.intern(Address(RAM_BASE)).unwrap();
    w.collection.intern(Address(RAM_BASE + 64)).unwrap();

    let prog = w.program();
    let mut d = domain(&w);
    let s0 = d.update_edge(&prog, entry_edge, d.entry());
    let s1 = d.update_access(&prog, &Access::block(Address(0x100), AccessAction::Load, a), s0);

    let levels = d.arena().levels(s1).to_vec();
    assert_eq!(levels.len(), 2);
    // Outermost level came from the pessimistic top; inner level was fresh.
    assert_eq!(d.arena().ages(levels[0]), &[0, 2]);
    assert_eq!(d.arena().ages(levels[1]), &[0, BOT_AGE]);
}

/// Edges leaving a synthetic call block truncate the callee result to the
/// depth recorded at call time; without a recorded depth they are dead.
#[test]
fn call_return_truncates_to_recorded_depth() {
    let mut main = Cfg::new("main");
    let call = main.add_call(Some(CfgId(1)));
    main.add_edge(Cfg::ENTRY, call);
    let e_ret = main.add_edge(call, Cfg::EXIT);
    let mut callee = Cfg::new("leaf");
    callee.add_edge(Cfg::ENTRY, Cfg::EXIT);
    let cfgs = CfgCollection::new(vec![main, callee]);
    let loops = wcet_dcache::cfg::LoopTree::new(&cfgs);

    let cfg = CfgId(0);
    let call = BlockRef { cfg, index: call };
    let e_ret = EdgeRef { cfg, index: e_ret };

    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 2), ram_and_mmio(), cfgs, loops, &provider);
    w.collection.intern(Address(RAM_BASE)).unwrap();

    let prog = w.program();
    let mut d = domain(&w);

    // No recorded depth yet: the return edge yields bottom.
    let deep = {
        let top_level = d.arena().levels(d.entry())[0];
        d.arena_mut().alloc_multi(&[top_level, top_level, top_level])
    };
    assert_eq!(d.update_edge(&prog, e_ret, deep), d.bot());

    // Passing the call block records its input depth.
    d.update_block(&prog, call, d.entry());
    let truncated = d.update_edge(&prog, e_ret, deep);
    assert_eq!(d.arena().levels(truncated).len(), 1);
}

/// Multi-level states serialise as a level count plus the level payloads
/// and survive a round trip.
#[test]
fn save_load_roundtrip() {
    let s = self_loop();
    let entry_edge = s.entry_edge;
    let provider = MapProvider::new();
    let mut w = World::build(cache(6, 1, 2), ram_and_mmio(), s.cfgs, s.loops, &provider);
    let a = w.collection.intern(Address(RAM_BASE)).unwrap();
    w.collection.intern(Address(RAM_BASE + 64)).unwrap();

    let prog = w.program();
    let mut d = domain(&w);
    let s0 = d.update_edge(&prog, entry_edge, d.entry());
    let s1 = d.update_access(&prog, &Access::block(Address(0x100), AccessAction::Load, a), s0);

    let mut buf = Vec::new();
    d.save_state(s1, &mut buf).unwrap();
    // 4-byte level count plus two 2-byte age vectors.
    assert_eq!(buf.len(), 4 + 2 * 2);

    let loaded = d.load_state(&mut buf.as_slice()).unwrap();
    assert!(d.equals(s1, loaded));

    let mut buf2 = Vec::new();
    d.save_state(loaded, &mut buf2).unwrap();
    assert_eq!(buf, buf2);
}
