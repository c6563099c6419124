// Redemption queue benchmarks.
//
// Covers share conversion with a widened intermediate, queuing requests,
// and settling a full queue after the waiting period.

use std::sync::Arc;

use chrono::Duration;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use canopy_protocol::clock::ManualClock;
use canopy_protocol::config::{ProtocolParams, WAD};
use canopy_protocol::custody::{AssetBook, CustodyVault, FixedRate, RateProviderRegistry};
use canopy_protocol::ledger::{ShareLedger, VaultShare};
use canopy_protocol::math::mul_div;
use canopy_protocol::redemption::{RedemptionContext, RedemptionQueue};
use canopy_protocol::{Address, Amount};

struct Bench {
    holder: Address,
    clock: ManualClock,
    book: AssetBook,
    rates: RateProviderRegistry,
    iau: ShareLedger,
    share: VaultShare,
    vault: CustodyVault,
    queue: RedemptionQueue,
}

impl Bench {
    fn new() -> Self {
        let owner = Address::from_label("owner");
        let holder = Address::from_label("holder");
        let wsteth = Address::from_label("wsteth");

        let mut book = AssetBook::new();
        book.register_token(wsteth, "wstETH", 18).unwrap();
        let mut rates = RateProviderRegistry::new(owner, Address::from_label("steth"));
        rates
            .update(owner, wsteth, Arc::new(FixedRate(11 * WAD / 10)))
            .unwrap();

        let mut iau = ShareLedger::new(owner, wsteth, "wstETH", "wstETH");
        let mut share = VaultShare::new(owner, &iau, "Canopy ETH", "cETH");
        let mut vault = CustodyVault::new(owner, wsteth);
        let clock = ManualClock::default();
        let params = ProtocolParams {
            min_redeem: 1,
            ..ProtocolParams::default()
        };
        let queue = RedemptionQueue::new(owner, &vault, &params, Arc::new(clock.clone())).unwrap();

        iau.add_minter(owner, owner).unwrap();
        iau.add_minter(owner, queue.address()).unwrap();
        iau.mint_to(owner, holder, 10_000 * WAD).unwrap();
        iau.approve(holder, share.address(), Amount::MAX);
        share.deposit(&mut iau, holder, 10_000 * WAD, holder).unwrap();
        share.approve(holder, queue.address(), Amount::MAX).unwrap();
        vault.set_redemption(owner, queue.address()).unwrap();
        book.mint(wsteth, vault.address(), 10_000 * WAD).unwrap();

        Self {
            holder,
            clock,
            book,
            rates,
            iau,
            share,
            vault,
            queue,
        }
    }

    fn redeem(&mut self, shares: Amount) {
        let ctx = RedemptionContext {
            share_ledger: &mut self.iau,
            vault_share: &mut self.share,
            vault: &self.vault,
            assets: &mut self.book,
            rates: &self.rates,
        };
        self.queue.redeem(self.holder, shares, ctx).unwrap();
    }

    fn finalize_last(&mut self) {
        let index = self.queue.redeem_length(self.holder) - 1;
        let ctx = RedemptionContext {
            share_ledger: &mut self.iau,
            vault_share: &mut self.share,
            vault: &self.vault,
            assets: &mut self.book,
            rates: &self.rates,
        };
        self.queue.finalize_redeem(self.holder, index, ctx).unwrap();
    }
}

fn bench_mul_div(c: &mut Criterion) {
    c.bench_function("math/mul_div_wide", |b| {
        b.iter(|| mul_div(100 * WAD, 100 * WAD + 7, 100 * WAD + 1).unwrap());
    });
}

fn bench_redeem(c: &mut Criterion) {
    c.bench_function("redemption/redeem", |b| {
        b.iter_batched(Bench::new, |mut s| s.redeem(WAD), BatchSize::SmallInput);
    });
}

fn bench_finalize_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("redemption/finalize_queue");

    for size in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let mut s = Bench::new();
                    for _ in 0..size {
                        s.redeem(WAD);
                    }
                    s.clock.advance(Duration::days(7));
                    s
                },
                |mut s| {
                    for _ in 0..size {
                        s.finalize_last();
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mul_div, bench_redeem, bench_finalize_queue);
criterion_main!(benches);
