/// Reconciliation Benchmarks
///
/// Measures ledger reconciliation of one nightly batch against ledgers of
/// increasing size (a year of nightly digests is a few thousand entries).
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use perfdigest::digest::{reconcile, ChangeRecord, NotificationLedger, RenderLabels, RunTimestamp};
use perfdigest::metric::MetricKind;
use perfdigest::provenance::Provenance;

const TEST_TYPES: [&str; 6] = [
    "lwt-fixed-100-partitions",
    "lwt-fixed-1000-partitions",
    "lwt-fixed-10000-partitions",
    "lwt-rated-100-partitions",
    "lwt-rated-1000-partitions",
    "lwt-rated-10000-partitions",
];

fn batch(day_offset: u32, days: u32) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    for day in 0..days {
        let date = format!("2023-{:02}-{:02} 23:00:00", 1 + (day_offset + day) / 28 % 12, 1 + (day_offset + day) % 28);
        let timestamp = match RunTimestamp::parse(&date) {
            Ok(timestamp) => timestamp,
            Err(_) => continue,
        };
        for test_type in TEST_TYPES {
            for (i, kind) in MetricKind::ALL.iter().enumerate() {
                let percent = format!("{}.{}", 12 + i, day % 10);
                if let Ok(record) = ChangeRecord::new(
                    test_type,
                    timestamp.clone(),
                    kind.short_name(),
                    &percent,
                    Provenance::new("1a2b3c4", "f00dbab"),
                ) {
                    records.push(record);
                }
            }
        }
    }
    records
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let labels = RenderLabels::default();
    let candidates = batch(0, 2);

    for ledger_days in [0u32, 30, 300] {
        let history = batch(2, ledger_days);
        let ledger = reconcile(&history, &NotificationLedger::default(), &labels).updated;

        group.throughput(Throughput::Elements(candidates.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("ledger_entries", ledger.len()),
            &ledger,
            |b, ledger| b.iter(|| reconcile(black_box(&candidates), ledger, &labels)),
        );
    }

    group.finish();
}

fn bench_ledger_parse(c: &mut Criterion) {
    let labels = RenderLabels::default();
    let history = batch(0, 300);
    let text = reconcile(&history, &NotificationLedger::default(), &labels).new_text();

    c.bench_function("ledger_parse_300_days", |b| {
        b.iter(|| NotificationLedger::parse(black_box(&text)))
    });
}

criterion_group!(benches, bench_reconcile, bench_ledger_parse);
criterion_main!(benches);
