//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Benchmarks for the rendezvous collection, the structure on every stream
//! handoff path.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use revipc::{Rendezvous, Verdict};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Items buffered first, then claimed: the reconnect-heavy case where the
/// instance dials in before any caller is waiting.
fn bench_buffered_handoff(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("buffered_handoff");

    for size in [1usize, 64, 1024] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                runtime.block_on(async {
                    let collection = Rendezvous::new();
                    for n in 0..size as u64 {
                        collection.add(n).unwrap();
                    }
                    for _ in 0..size {
                        black_box(collection.wait(|_| Verdict::Claim).await.unwrap());
                    }
                })
            });
        });
    }
    group.finish();
}

/// Waiters registered first, then settled by adds: the steady-state case
/// where callers are parked waiting for reconnects.
fn bench_waiter_settlement(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("waiter_settlement");

    for size in [1usize, 64, 1024] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                runtime.block_on(async {
                    let collection = Arc::new(Rendezvous::new());
                    let mut waiters = Vec::with_capacity(size);
                    for _ in 0..size {
                        let collection = collection.clone();
                        waiters.push(tokio::spawn(async move {
                            collection.wait(|_| Verdict::Claim).await.unwrap()
                        }));
                    }
                    tokio::task::yield_now().await;
                    for n in 0..size as u64 {
                        collection.add(n).unwrap();
                    }
                    for waiter in waiters {
                        black_box(waiter.await.unwrap());
                    }
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_buffered_handoff, bench_waiter_settlement);
criterion_main!(benches);
