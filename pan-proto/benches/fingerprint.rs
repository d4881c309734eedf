// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![allow(missing_docs)]

//! Fingerprint computation at representative path lengths.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pan_proto::path::{DataPlanePath, MetaHeader, PathFingerprint, StandardPath};

fn path_with_segments(segment_lengths: [u8; 3]) -> DataPlanePath {
    let meta = MetaHeader {
        segment_lengths,
        ..Default::default()
    };
    DataPlanePath::Standard(StandardPath::zeroed(meta).unwrap())
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("Fingerprint");

    let cases = [
        ("short", path_with_segments([2, 0, 0])),
        ("three-seg", path_with_segments([2, 2, 2])),
        ("long", path_with_segments([63, 63, 63])),
    ];

    for (name, path) in cases.iter() {
        let hops = match path {
            DataPlanePath::Standard(p) => p.meta_header().hop_fields_count(),
            _ => 0,
        };
        group.bench_with_input(BenchmarkId::new(*name, hops), path, |b, path| {
            b.iter(|| PathFingerprint::of(path))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fingerprint);
criterion_main!(benches);
