//! Benchmarks for the allocation and distribution paths

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use emissions_controller::distributor::compute_shares;
use emissions_controller::{
    AllocationEntry, EmissionsController, EmissionsParams, MockRewardLedger, StaticPowerSource,
    VotingPowerSource,
};
use emissions_types::{units, DialId, ManualClock, RecipientId, VoterId, FIXED_POINT_SCALE};
use std::sync::Arc;

const DIALS: u32 = 32;

fn controller_with_dials() -> (EmissionsController, Arc<StaticPowerSource>, Arc<ManualClock>) {
    let source = Arc::new(StaticPowerSource::new("staking"));
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let sources: Vec<Arc<dyn VotingPowerSource>> = vec![source.clone()];
    let controller =
        EmissionsController::new(EmissionsParams::default(), sources, clock.clone()).unwrap();
    let recipients: Vec<_> = (0..DIALS)
        .map(|i| RecipientId::from_label(&format!("dial-{i}")))
        .collect();
    controller.initialize(&recipients).unwrap();
    (controller, source, clock)
}

fn spread(dials: u32, offset: u32) -> Vec<AllocationEntry> {
    (0..dials)
        .map(|i| AllocationEntry::new(DialId((i + offset) % DIALS), FIXED_POINT_SCALE / dials as u128))
        .collect()
}

fn bench_set_voter_weights(c: &mut Criterion) {
    let (controller, source, _) = controller_with_dials();
    let voter = VoterId::from_label("voter");
    source.set_power(voter, units(1_000));
    let allocations = [spread(8, 0), spread(8, 4)];

    let mut flip = 0usize;
    c.bench_function("set_voter_weights_8_dials", |b| {
        b.iter(|| {
            flip ^= 1;
            controller
                .set_voter_weights(black_box(voter), allocations[flip].clone())
                .unwrap()
        })
    });
}

fn bench_compute_shares(c: &mut Criterion) {
    let (controller, source, _) = controller_with_dials();
    for i in 0..256u32 {
        let voter = VoterId::from_label(&format!("voter-{i}"));
        source.set_power(voter, units(100 + i as u128));
        controller.set_voter_weights(voter, spread(4, i)).unwrap();
    }
    let dials = controller.dials();
    let total = controller.total_dial_votes();
    let pot = controller.epoch_reward();

    c.bench_function("compute_shares_32_dials", |b| {
        b.iter(|| compute_shares(black_box(&dials), black_box(total), black_box(pot)).unwrap())
    });
}

fn bench_distribute_rewards(c: &mut Criterion) {
    c.bench_function("distribute_rewards_256_voters", |b| {
        b.iter_with_setup(
            || {
                let (controller, source, clock) = controller_with_dials();
                for i in 0..256u32 {
                    let voter = VoterId::from_label(&format!("voter-{i}"));
                    source.set_power(voter, units(100 + i as u128));
                    controller.set_voter_weights(voter, spread(4, i)).unwrap();
                }
                clock.advance(controller.params().epoch_duration_secs);
                controller
            },
            |controller| {
                let mut ledger = MockRewardLedger::new();
                controller.distribute_rewards(&mut ledger).unwrap()
            },
        )
    });
}

criterion_group!(
    benches,
    bench_set_voter_weights,
    bench_compute_shares,
    bench_distribute_rewards
);
criterion_main!(benches);
