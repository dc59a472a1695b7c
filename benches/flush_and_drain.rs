//! Benchmarks the flush/serialize pass and the worker engine's drain loop
//! over a linear chain of compute tasks, the workload shape a long-running
//! pipeline of sequentially-dependent tasks produces. Measures
//! orchestration hot paths end to end rather than isolated micro-ops.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use accel_rt::{
    CommandGraphStore, CommandPackage, CommandPayload, CompletionStrategy, DeviceQueue, EmitSink, GraphSerializer, JobEngine, NodeId, Subrange, TaskId,
    TaskStore,
};
use rt_sim::{SimBufferTransferManager, SimDeviceQueue, SimTaskStore, SimTransferFabric};

struct CollectingSink {
    packets: Vec<(NodeId, CommandPackage, Vec<CommandId>)>,
}

use rt_shared::CommandId;

impl EmitSink for &mut CollectingSink {
    fn emit(&mut self, node: NodeId, pkg: CommandPackage, deps: Vec<CommandId>) -> Result<(), String> {
        self.packets.push((node, pkg, deps));
        Ok(())
    }
}

/// Builds a linear chain of `n` single-command compute tasks, each
/// depending on the one before it, all on node 0.
fn build_chain(n: u64) -> (CommandGraphStore, Vec<TaskId>) {
    let mut graph = CommandGraphStore::new();
    let mut previous = None;
    let mut tids = Vec::with_capacity(n as usize);
    for tid in 1..=n {
        let handle = graph.add_command(
            NodeId::from_raw(0),
            CommandPayload::Compute {
                tid: TaskId::from_raw(tid),
                subrange: Subrange::one_dim(0, 64),
            },
        );
        if let Some(prev) = previous {
            graph.add_dependency(prev, handle, false).unwrap();
        }
        previous = Some(handle);
        tids.push(TaskId::from_raw(tid));
    }
    (graph, tids)
}

fn bench_flush_chain(c: &mut Criterion) {
    c.bench_function("flush_1000_task_chain", |b| {
        b.iter_batched(
            || build_chain(1_000),
            |(mut graph, tids)| {
                let mut sink = CollectingSink { packets: Vec::new() };
                for tid in tids {
                    GraphSerializer::new(&mut graph, &mut sink).flush(tid).unwrap();
                }
                criterion::black_box(sink.packets.len());
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_drain_chain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("drain_1000_job_chain", |b| {
        b.to_async(&runtime).iter_batched(
            || {
                let (mut graph, tids) = build_chain(1_000);
                let mut sink = CollectingSink { packets: Vec::new() };
                for tid in tids.iter().copied() {
                    GraphSerializer::new(&mut graph, &mut sink).flush(tid).unwrap();
                }

                let task_store = SimTaskStore::new();
                for tid in tids {
                    task_store.register(tid);
                }

                let engine = JobEngine::new(
                    accel_rt::SharedCommandGraph::new(),
                    task_store as Arc<dyn TaskStore>,
                    SimDeviceQueue::new(0, false) as Arc<dyn DeviceQueue>,
                    SimBufferTransferManager::new(SimTransferFabric::new(), 0) as Arc<dyn accel_rt::BufferTransferManager>,
                    CompletionStrategy::DirectQuery,
                );
                (engine, sink.packets)
            },
            |(mut engine, packets)| async move {
                for (_, pkg, deps) in packets {
                    engine.submit(pkg, deps);
                }
                engine.run_until_drained().await.unwrap();
                criterion::black_box(engine.pending_count());
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_flush_chain, bench_drain_chain);
criterion_main!(benches);
