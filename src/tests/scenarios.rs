//! The budget-admission scenarios, end to end over scripted in-memory
//! segments and a real (tempdir) CDC-raw directory.

use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::{CdcState, MIB, Options, SegmentManager, testing::TestMutation};

use super::helpers::{mem_fixture, wait_for_recalc};

fn opts(segment_size: u64, budget: u64) -> Options {
    Options {
        segment_size,
        cdc_total_space: budget,
        cdc_disk_check_interval: Duration::from_millis(10),
    }
}

#[test]
fn empty_budget_rejects_cdc_writes() {
    let fixture = mem_fixture(opts(32 * MIB, 0), [], false);
    let alloc = &fixture.alloc;
    assert_eq!(alloc.manager().active().cdc_state().get(), CdcState::Forbidden);

    let err = alloc.allocate(&TestMutation::cdc("ks_cdc"), 1024).unwrap_err();
    assert!(err.is_rejection());

    // The rejected write reserved nothing: the next reservation starts at
    // offset zero.
    let res = alloc.allocate(&TestMutation::plain("ks_plain"), 1024).unwrap();
    assert_eq!(res.offset, 0);
    assert_eq!(alloc.tracker().total_on_disk(), 0);
}

#[test]
fn admitted_cdc_write_marks_the_segment() {
    let fixture = mem_fixture(opts(32 * MIB, 64 * MIB), [], false);
    let alloc = &fixture.alloc;
    let active = alloc.manager().active();
    assert_eq!(active.cdc_state().get(), CdcState::Permitted);
    assert_eq!(alloc.tracker().total_on_disk(), 32 * MIB);

    let res = alloc.allocate(&TestMutation::cdc("ks_cdc"), 1024).unwrap();
    assert_eq!(res.segment_id, 0);
    assert_eq!(res.len, 1024);
    assert_eq!(active.cdc_state().get(), CdcState::Contains);
    // Admission does not change the accounting; discard does.
    assert_eq!(alloc.tracker().total_on_disk(), 32 * MIB);
}

#[test]
fn overflow_then_drain_readmits() {
    let fixture = mem_fixture(opts(32 * MIB, 32 * MIB), [], false);
    let alloc = &fixture.alloc;

    // Segment A takes the whole budget and admits CDC data.
    let a = alloc.manager().active();
    assert_eq!(a.cdc_state().get(), CdcState::Permitted);
    alloc.allocate(&TestMutation::cdc("ks_cdc"), 1024).unwrap();
    assert_eq!(a.cdc_state().get(), CdcState::Contains);

    // Discarding A moves its on-disk bytes into the flushed column.
    alloc.discard(&a, false).unwrap();
    assert_eq!(alloc.tracker().total_on_disk(), 32 * MIB);

    // Segment B cannot fit on top of A's flushed bytes.
    alloc.manager().switch_segment(&a).unwrap();
    let b = alloc.manager().active();
    assert_eq!(b.cdc_state().get(), CdcState::Forbidden);
    assert!(
        alloc
            .allocate(&TestMutation::cdc("ks_cdc"), 1024)
            .unwrap_err()
            .is_rejection()
    );

    // The consumer has (from the walker's point of view) already archived
    // everything: the CDC-raw directory is empty. One recalculation picks
    // that up and re-admits B.
    let recalcs = alloc.tracker().completed_recalcs();
    alloc.tracker().start(alloc.manager().clone()).unwrap();
    wait_for_recalc(alloc.tracker(), recalcs);

    assert_eq!(b.cdc_state().get(), CdcState::Permitted);
    assert_eq!(alloc.tracker().total_on_disk(), 32 * MIB);
    alloc.allocate(&TestMutation::cdc("ks_cdc"), 1024).unwrap();
    assert_eq!(b.cdc_state().get(), CdcState::Contains);
}

#[test]
fn non_cdc_writes_ignore_cdc_state() {
    let fixture = mem_fixture(opts(32 * MIB, 0), [], false);
    let alloc = &fixture.alloc;
    assert_eq!(alloc.manager().active().cdc_state().get(), CdcState::Forbidden);

    let res = alloc.allocate(&TestMutation::plain("ks_plain"), 1024).unwrap();
    assert_eq!((res.segment_id, res.offset), (0, 0));
}

#[test]
fn allocation_makes_progress_across_handoffs() {
    // The active segment is full, and so is the next one (it rolled right
    // after creation); the third fits.
    let fixture = mem_fixture(opts(MIB, 64 * MIB), [0, 0], false);
    let alloc = &fixture.alloc;

    let res = alloc.allocate(&TestMutation::plain("ks_plain"), 1024).unwrap();
    assert_eq!(res.segment_id, 2);
    assert_eq!(res.offset, 0);
}

#[test]
fn discarding_forbidden_releases_nothing() {
    let fixture = mem_fixture(opts(32 * MIB, 0), [], false);
    let alloc = &fixture.alloc;
    let a = alloc.manager().active();
    assert_eq!(a.cdc_state().get(), CdcState::Forbidden);
    assert_eq!(alloc.tracker().total_on_disk(), 0);

    alloc.discard(&a, false).unwrap();
    // No reservation was ever taken for A, so none is released.
    assert_eq!(alloc.tracker().total_on_disk(), 0);
}

#[test]
fn rejection_schedules_a_recalculation() {
    let fixture = mem_fixture(opts(32 * MIB, 0), [], false);
    let alloc = &fixture.alloc;

    alloc.allocate(&TestMutation::cdc("ks_cdc"), 1024).unwrap_err();

    // A recalculation is pending (the rejection's submission coalesced
    // with the creation-time one) and runs as soon as the worker starts.
    alloc.tracker().start(alloc.manager().clone()).unwrap();
    wait_for_recalc(alloc.tracker(), 0);
}
