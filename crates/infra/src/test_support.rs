//! Shared fixtures for this crate's tests.

use chrono::{DateTime, NaiveDate, Utc};

use cavastock_inventory::{
    Category, CreateEntry, DispatchEntry, Ledger, LedgerCommand, LedgerSnapshot, LocationKey,
    NewEntry, SlotPolicy, Tag, Weights,
};
use cavastock_products::ProductCatalog;

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

pub(crate) fn candidate(tag: &str, bruto: f64, estibas: f64, cestas: f64, cava: &str) -> NewEntry {
    NewEntry {
        tag: Tag::new(tag),
        codigo: "1001".to_string(),
        operador: "LUIS".to_string(),
        turno: 1,
        weights: Weights::new(bruto, estibas, cestas),
        location: LocationKey::in_cava(cava),
        categoria: Category::Pt,
        ..NewEntry::default()
    }
}

fn run(ledger: &mut Ledger, command: LedgerCommand) {
    ledger.execute(&command).expect("fixture command must be valid");
}

/// Three entries: one slotted with dates, one in a bulk zone, one dispatched.
pub(crate) fn sample_ledger() -> Ledger {
    let mut ledger = Ledger::new("main", ProductCatalog::seeded(), SlotPolicy::default());

    let mut slotted = candidate("S1", 120.375, 12.5, 3.125, "1");
    slotted.location = LocationKey::new("1", "2", "A", "3", "");
    slotted.lote = "L-01".to_string();
    slotted.fecha_fabricacion = NaiveDate::from_ymd_opt(2024, 3, 1);
    slotted.fecha_vencimiento = NaiveDate::from_ymd_opt(2024, 9, 1);
    run(&mut ledger, LedgerCommand::CreateEntry(CreateEntry { entry: slotted, occurred_at: now() }));

    run(
        &mut ledger,
        LedgerCommand::CreateEntry(CreateEntry {
            entry: candidate("B1", 80.0, 5.0, 2.0, "4"),
            occurred_at: now(),
        }),
    );

    run(
        &mut ledger,
        LedgerCommand::CreateEntry(CreateEntry {
            entry: candidate("D1", 40.0, 0.0, 0.0, "2"),
            occurred_at: now(),
        }),
    );
    run(
        &mut ledger,
        LedgerCommand::DispatchEntry(DispatchEntry {
            tag: Tag::new("D1"),
            destino: Some("CLIENTE".to_string()),
            merma: Some(0.75),
            operador: None,
            observaciones: None,
            occurred_at: now(),
        }),
    );

    ledger
}

/// Snapshots with versions `1..=n`, one entry added per version.
pub(crate) fn versions(n: usize) -> Vec<LedgerSnapshot> {
    let mut ledger = Ledger::new("main", ProductCatalog::seeded(), SlotPolicy::default());
    (1..=n)
        .map(|i| {
            run(
                &mut ledger,
                LedgerCommand::CreateEntry(CreateEntry {
                    entry: candidate(&format!("V{i}"), 10.0, 0.0, 0.0, "1"),
                    occurred_at: now(),
                }),
            );
            ledger.snapshot()
        })
        .collect()
}
