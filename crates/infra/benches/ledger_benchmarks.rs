use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use fleetstock_core::{ItemId, SupplierId, UserId, WarehouseId};
use fleetstock_infra::{ApplyPayment, InMemoryServices, Settings};
use fleetstock_inventory::RequestedLine;
use fleetstock_payables::{InvoiceLineRequest, PaymentAllocation, PaymentMethod};

/// Stock large enough that no benchmark iteration runs dry.
const OPENING_STOCK: i64 = 1_000_000_000;

fn bench_transfer_confirmation(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_confirmation");

    for lines in [1usize, 10, 50] {
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, &lines| {
            let (services, _, _) = InMemoryServices::in_memory(Settings::default());
            let (source, destination) = (WarehouseId::new(), WarehouseId::new());
            let items: Vec<ItemId> = (0..lines).map(|_| ItemId::new()).collect();
            for item in &items {
                services.stock.assign(*item, source, OPENING_STOCK).unwrap();
            }
            let requested: Vec<RequestedLine> = items
                .iter()
                .map(|&item_id| RequestedLine { item_id, quantity: 1 })
                .collect();

            b.iter(|| {
                let id = services
                    .transfers
                    .create(source, destination, UserId::new(), requested.clone())
                    .unwrap();
                black_box(services.transfers.confirm(id).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_payment_application(c: &mut Criterion) {
    let mut group = c.benchmark_group("payment_application");

    for invoices in [1usize, 10] {
        group.throughput(Throughput::Elements(invoices as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(invoices),
            &invoices,
            |b, &invoices| {
                let (services, _, _) = InMemoryServices::in_memory(Settings::default());
                let supplier_id = SupplierId::new();
                let targets: Vec<_> = (0..invoices)
                    .map(|_| {
                        services
                            .payables
                            .issue_invoice(
                                supplier_id,
                                vec![InvoiceLineRequest {
                                    item_id: ItemId::new(),
                                    quantity: 1,
                                    unit_price: OPENING_STOCK,
                                }],
                            )
                            .unwrap()
                            .invoice_id
                    })
                    .collect();

                b.iter(|| {
                    let request = ApplyPayment {
                        supplier_id,
                        method: PaymentMethod::BankTransfer,
                        total_amount: invoices as i64,
                        allocations: targets
                            .iter()
                            .map(|&invoice_id| PaymentAllocation { invoice_id, amount: 1 })
                            .collect(),
                        reference: None,
                        notes: None,
                        idempotency_key: None,
                    };
                    black_box(services.payables.apply_payment(request).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_stock_correction(c: &mut Criterion) {
    let mut group = c.benchmark_group("stock_correction");
    group.sample_size(1000);

    group.bench_function("adjust_alternating", |b| {
        let (services, _, _) = InMemoryServices::in_memory(Settings::default());
        let (warehouse, item) = (WarehouseId::new(), ItemId::new());
        services.stock.assign(item, warehouse, 100).unwrap();
        let mut sign = 1;

        b.iter(|| {
            sign = -sign;
            black_box(services.stock.adjust(item, warehouse, sign).unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_transfer_confirmation,
    bench_payment_application,
    bench_stock_correction
);
criterion_main!(benches);
