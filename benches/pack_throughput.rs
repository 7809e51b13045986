// benches/pack_throughput.rs
//
// In-memory packing throughput over a generated tree, for a few chunk sizes
// and worker counts. The archive goes to a Vec so only read + compress + assemble
// is measured.

use std::fs;
use std::path::Path;

use chunkzip::codec::ZstdCodec;
use chunkzip::compress::{pack_to_writer, PackOptions};
use chunkzip::plan::plan_tree;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::tempdir;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Half text-like, half incompressible, so both codec paths get exercised.
fn build_dataset(root: &Path) -> std::io::Result<()> {
    let mut rng = StdRng::seed_from_u64(0x6368_756e_6b7a);
    fs::create_dir_all(root.join("logs"))?;
    fs::create_dir_all(root.join("blobs"))?;
    for i in 0..8 {
        let mut text = String::with_capacity(2 * MIB as usize);
        let mut line = 0u64;
        while text.len() < 2 * MIB as usize {
            text.push_str(&format!("{i:02} line {line} status=ok latency_ms={}\n", rng.gen_range(0..500)));
            line += 1;
        }
        fs::write(root.join("logs").join(format!("app_{i}.log")), text)?;
    }
    for i in 0..4 {
        let mut blob = vec![0u8; (3 * MIB + 123 * KIB) as usize];
        rng.fill(blob.as_mut_slice());
        fs::write(root.join("blobs").join(format!("blob_{i}.bin")), blob)?;
    }
    Ok(())
}

fn bench_pack(c: &mut Criterion) {
    let dir = tempdir().expect("tempdir");
    build_dataset(dir.path()).expect("dataset");

    let mut group = c.benchmark_group("pack_to_writer");
    group.sample_size(10);

    for chunk_size in [256 * KIB, MIB, 4 * MIB] {
        let plan = plan_tree(dir.path(), chunk_size).expect("plan");
        group.throughput(Throughput::Bytes(plan.total_bytes()));
        for workers in [1usize, 4] {
            let opts = PackOptions { chunk_size, workers, ..Default::default() };
            let id = BenchmarkId::new(format!("{}KiB", chunk_size / KIB), format!("{workers}w"));
            group.bench_with_input(id, &opts, |b, opts| {
                b.iter(|| {
                    let (stats, _, archive) =
                        pack_to_writer(&plan, Vec::with_capacity(plan.total_bytes() as usize), &ZstdCodec, opts)
                            .expect("pack");
                    assert!(!stats.has_failures());
                    archive.len()
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_pack);
criterion_main!(benches);
