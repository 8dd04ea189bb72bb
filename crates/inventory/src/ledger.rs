use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cavastock_core::{Aggregate, AggregateRoot, BatchId, DomainError, DomainResult};
use cavastock_events::Event;
use cavastock_products::{Product, ProductCatalog};

use crate::entry::{
    EntryPatch, InventoryEntry, LocationKey, MovementType, NewEntry, Tag, fecha_registro,
    validate_dates, validate_merma,
};
use crate::location::SlotPolicy;
use crate::snapshot::LedgerSnapshot;

/// Command: CreateEntry (ENTRADA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEntry {
    pub entry: NewEntry,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RelocateEntry (TRASLADO).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelocateEntry {
    pub tag: Tag,
    pub location: LocationKey,
    pub merma: Option<f64>,
    pub operador: Option<String>,
    pub observaciones: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DispatchEntry (SALIDA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEntry {
    pub tag: Tag,
    pub destino: Option<String>,
    pub merma: Option<f64>,
    pub operador: Option<String>,
    pub observaciones: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateEntry (field correction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub tag: Tag,
    pub patch: EntryPatch,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BulkLoad (all-or-nothing import of ENTRADA candidates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkLoad {
    pub batch_id: BatchId,
    pub entries: Vec<NewEntry>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterProduct (catalog addition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub product: Product,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerCommand {
    CreateEntry(CreateEntry),
    RelocateEntry(RelocateEntry),
    DispatchEntry(DispatchEntry),
    UpdateEntry(UpdateEntry),
    BulkLoad(BulkLoad),
    RegisterProduct(RegisterProduct),
}

impl LedgerCommand {
    /// Short operation name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerCommand::CreateEntry(_) => "create",
            LedgerCommand::RelocateEntry(_) => "relocate",
            LedgerCommand::DispatchEntry(_) => "dispatch",
            LedgerCommand::UpdateEntry(_) => "update",
            LedgerCommand::BulkLoad(_) => "bulk_load",
            LedgerCommand::RegisterProduct(_) => "register_product",
        }
    }
}

/// Event: EntryCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryCreated {
    pub entry: InventoryEntry,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryRelocated. `from.cava` becomes `origen`, `to.cava` becomes `destino`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRelocated {
    pub tag: Tag,
    pub from: LocationKey,
    pub to: LocationKey,
    pub merma: Option<f64>,
    pub operador: Option<String>,
    pub observaciones: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryDispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDispatched {
    pub tag: Tag,
    pub destino: Option<String>,
    pub merma: Option<f64>,
    pub operador: Option<String>,
    pub observaciones: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryUpdated. Carries the corrected record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdated {
    pub entry: InventoryEntry,
    pub fields: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchLoaded. Entries are in import order and get prepended as a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchLoaded {
    pub batch_id: BatchId,
    pub entries: Vec<InventoryEntry>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub product: Product,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerEvent {
    EntryCreated(EntryCreated),
    EntryRelocated(EntryRelocated),
    EntryDispatched(EntryDispatched),
    EntryUpdated(EntryUpdated),
    BatchLoaded(BatchLoaded),
    ProductRegistered(ProductRegistered),
}

impl LedgerEvent {
    /// Tags touched by this event.
    pub fn tags(&self) -> Vec<&Tag> {
        match self {
            LedgerEvent::EntryCreated(e) => vec![e.entry.tag()],
            LedgerEvent::EntryRelocated(e) => vec![&e.tag],
            LedgerEvent::EntryDispatched(e) => vec![&e.tag],
            LedgerEvent::EntryUpdated(e) => vec![e.entry.tag()],
            LedgerEvent::BatchLoaded(e) => e.entries.iter().map(|x| x.tag()).collect(),
            LedgerEvent::ProductRegistered(_) => vec![],
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::EntryCreated(_) => "ledger.entry.created",
            LedgerEvent::EntryRelocated(_) => "ledger.entry.relocated",
            LedgerEvent::EntryDispatched(_) => "ledger.entry.dispatched",
            LedgerEvent::EntryUpdated(_) => "ledger.entry.updated",
            LedgerEvent::BatchLoaded(_) => "ledger.batch.loaded",
            LedgerEvent::ProductRegistered(_) => "ledger.product.registered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::EntryCreated(e) => e.occurred_at,
            LedgerEvent::EntryRelocated(e) => e.occurred_at,
            LedgerEvent::EntryDispatched(e) => e.occurred_at,
            LedgerEvent::EntryUpdated(e) => e.occurred_at,
            LedgerEvent::BatchLoaded(e) => e.occurred_at,
            LedgerEvent::ProductRegistered(e) => e.occurred_at,
        }
    }
}

/// Aggregate root: the inventory ledger of one facility.
///
/// Holds every entry ever created (most recent first) together with the
/// product catalog and slot policy used to validate new movements.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    id: String,
    entries: Arc<Vec<InventoryEntry>>,
    catalog: ProductCatalog,
    policy: SlotPolicy,
    version: u64,
}

/// Tags and slot usage claimed by earlier rows of the same bulk batch.
#[derive(Debug, Default)]
struct Reservations {
    tags: HashSet<Tag>,
    placed: HashMap<LocationKey, usize>,
}

impl Ledger {
    pub fn new(id: impl Into<String>, catalog: ProductCatalog, policy: SlotPolicy) -> Self {
        Self {
            id: id.into(),
            entries: Arc::new(Vec::new()),
            catalog,
            policy,
            version: 0,
        }
    }

    /// Rebuild a ledger from a persisted snapshot.
    ///
    /// Every record is re-checked: tags must be present and unique, weights
    /// valid (`neto` is recomputed), `cava` present and dates ordered. Product
    /// codes missing from `catalog` are learned from the records themselves.
    pub fn restore(
        id: impl Into<String>,
        catalog: ProductCatalog,
        policy: SlotPolicy,
        entries: Vec<InventoryEntry>,
    ) -> DomainResult<Self> {
        let mut catalog = catalog;
        let mut seen: HashSet<Tag> = HashSet::with_capacity(entries.len());
        let mut restored = Vec::with_capacity(entries.len());

        for (idx, mut entry) in entries.into_iter().enumerate() {
            entry.tag = Tag::new(entry.tag.as_str());
            if entry.tag.is_blank() {
                return Err(DomainError::validation(format!("record #{idx}: tag cannot be empty")));
            }
            if !seen.insert(entry.tag.clone()) {
                return Err(DomainError::validation(format!(
                    "record #{idx}: duplicate tag {}",
                    entry.tag
                )));
            }

            let tag = entry.tag.clone();
            let at = |err: DomainError| in_record(idx, &tag, err);
            entry.neto = entry.weights.validate().map_err(at)?;
            validate_dates(entry.fecha_fabricacion, entry.fecha_vencimiento).map_err(at)?;
            entry.location = entry.location.normalized();
            if !entry.location.has_cava() {
                return Err(at(DomainError::validation("cava cannot be empty")));
            }

            let code = entry.codigo.trim();
            if !code.is_empty() && !catalog.contains(code) {
                let name = if entry.producto.trim().is_empty() {
                    code.to_string()
                } else {
                    entry.producto.clone()
                };
                catalog.register(Product::new(code, name))?;
            }

            restored.push(entry);
        }

        Ok(Self {
            id: id.into(),
            entries: Arc::new(restored),
            catalog,
            policy,
            version: 0,
        })
    }

    /// Continue numbering from a previously persisted version.
    ///
    /// `restore` starts at 0; callers that saved the version alongside the
    /// entries pass it here so versions never repeat across restarts.
    pub fn resumed_at(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn entries(&self) -> &[InventoryEntry] {
        &self.entries
    }

    pub fn get(&self, tag: &Tag) -> Option<&InventoryEntry> {
        self.entries.iter().find(|e| e.tag() == tag)
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.get(tag).is_some()
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> SlotPolicy {
        self.policy
    }

    /// Immutable view of the current entry sequence.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::new(self.version, Arc::clone(&self.entries))
    }

    /// Number of active entries resting exactly at `key`.
    pub fn occupants_at(&self, key: &LocationKey) -> usize {
        self.entries
            .iter()
            .filter(|e| e.is_active() && e.location() == key)
            .count()
    }

    /// Decide and apply in one step. Nothing is applied if `handle` fails.
    pub fn execute(&mut self, command: &LedgerCommand) -> DomainResult<Vec<LedgerEvent>> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }

    fn position(&self, tag: &Tag) -> Option<usize> {
        self.entries.iter().position(|e| e.tag() == tag)
    }
}

impl AggregateRoot for Ledger {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Ledger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::EntryCreated(e) => {
                Arc::make_mut(&mut self.entries).insert(0, e.entry.clone());
            }
            LedgerEvent::BatchLoaded(e) => {
                Arc::make_mut(&mut self.entries).splice(0..0, e.entries.iter().cloned());
            }
            LedgerEvent::EntryRelocated(e) => {
                if let Some(idx) = self.position(&e.tag) {
                    let entry = &mut Arc::make_mut(&mut self.entries)[idx];
                    entry.origen = e.from.cava.clone();
                    entry.destino = e.to.cava.clone();
                    entry.location = e.to.clone();
                    entry.tipo = MovementType::Traslado;
                    if e.merma.is_some() {
                        entry.merma = e.merma;
                    }
                    if let Some(op) = &e.operador {
                        entry.operador = op.clone();
                    }
                    if let Some(obs) = &e.observaciones {
                        entry.observaciones = obs.clone();
                    }
                }
            }
            LedgerEvent::EntryDispatched(e) => {
                if let Some(idx) = self.position(&e.tag) {
                    let entry = &mut Arc::make_mut(&mut self.entries)[idx];
                    entry.tipo = MovementType::Salida;
                    if let Some(destino) = &e.destino {
                        entry.destino = destino.clone();
                    }
                    if e.merma.is_some() {
                        entry.merma = e.merma;
                    }
                    if let Some(op) = &e.operador {
                        entry.operador = op.clone();
                    }
                    if let Some(obs) = &e.observaciones {
                        entry.observaciones = obs.clone();
                    }
                }
            }
            LedgerEvent::EntryUpdated(e) => {
                if let Some(idx) = self.position(e.entry.tag()) {
                    Arc::make_mut(&mut self.entries)[idx] = e.entry.clone();
                }
            }
            LedgerEvent::ProductRegistered(e) => {
                self.catalog.upsert(e.product.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::CreateEntry(cmd) => self.handle_create(cmd),
            LedgerCommand::RelocateEntry(cmd) => self.handle_relocate(cmd),
            LedgerCommand::DispatchEntry(cmd) => self.handle_dispatch(cmd),
            LedgerCommand::UpdateEntry(cmd) => self.handle_update(cmd),
            LedgerCommand::BulkLoad(cmd) => self.handle_bulk_load(cmd),
            LedgerCommand::RegisterProduct(cmd) => self.handle_register_product(cmd),
        }
    }
}

impl Ledger {
    /// Entry that exists and is still STORED.
    fn require_stored(&self, tag: &Tag, op: &str) -> DomainResult<&InventoryEntry> {
        let entry = self
            .get(tag)
            .ok_or_else(|| DomainError::not_found(format!("tag {tag}")))?;
        if !entry.is_active() {
            return Err(DomainError::invalid_transition(format!(
                "cannot {op} tag {tag}: entry is already dispatched"
            )));
        }
        Ok(entry)
    }

    fn ensure_capacity(&self, key: &LocationKey, reserved: usize) -> DomainResult<()> {
        if let Some(capacity) = self.policy.capacity_of(key) {
            if self.occupants_at(key) + reserved >= capacity {
                return Err(DomainError::validation(format!(
                    "slot {key} is full (capacity {capacity})"
                )));
            }
        }
        Ok(())
    }

    /// Validate one ENTRADA candidate and build the record it would become.
    fn admit(
        &self,
        candidate: &NewEntry,
        occurred_at: DateTime<Utc>,
        reservations: &mut Reservations,
    ) -> DomainResult<InventoryEntry> {
        let tag = Tag::new(candidate.tag.as_str());
        if tag.is_blank() {
            return Err(DomainError::validation("tag cannot be empty"));
        }
        if let Some(tipo) = candidate.tipo {
            if tipo != MovementType::Entrada {
                return Err(DomainError::validation(format!(
                    "new entries must be ENTRADA, got {tipo}"
                )));
            }
        }
        if self.contains(&tag) || reservations.tags.contains(&tag) {
            return Err(DomainError::validation(format!("tag {tag} already exists")));
        }

        let product = self.catalog.resolve(&candidate.codigo)?;
        let neto = candidate.weights.validate()?;
        validate_dates(candidate.fecha_fabricacion, candidate.fecha_vencimiento)?;

        let location = candidate.location.normalized();
        if !location.has_cava() {
            return Err(DomainError::validation("cava cannot be empty"));
        }
        let reserved = reservations.placed.get(&location).copied().unwrap_or(0);
        self.ensure_capacity(&location, reserved)?;

        reservations.tags.insert(tag.clone());
        *reservations.placed.entry(location.clone()).or_insert(0) += 1;

        let fecha = candidate.fecha_registro.trim();
        Ok(InventoryEntry {
            tag,
            fecha_registro: if fecha.is_empty() {
                fecha_registro(occurred_at)
            } else {
                fecha.to_string()
            },
            timestamp: occurred_at.timestamp_millis(),
            turno: candidate.turno,
            operador: candidate.operador.trim().to_string(),
            codigo: product.code.clone(),
            producto: product.name.clone(),
            lote: candidate.lote.trim().to_string(),
            fecha_fabricacion: candidate.fecha_fabricacion,
            fecha_vencimiento: candidate.fecha_vencimiento,
            origen: candidate.origen.trim().to_string(),
            entrada: candidate.entrada.trim().to_string(),
            weights: candidate.weights,
            neto,
            destino: candidate.destino.trim().to_string(),
            location,
            observaciones: candidate.observaciones.clone(),
            categoria: candidate.categoria,
            tipo: MovementType::Entrada,
            merma: None,
        })
    }

    fn handle_create(&self, cmd: &CreateEntry) -> DomainResult<Vec<LedgerEvent>> {
        let entry = self.admit(&cmd.entry, cmd.occurred_at, &mut Reservations::default())?;
        Ok(vec![LedgerEvent::EntryCreated(EntryCreated {
            entry,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_bulk_load(&self, cmd: &BulkLoad) -> DomainResult<Vec<LedgerEvent>> {
        if cmd.entries.is_empty() {
            return Err(DomainError::validation("bulk load requires at least one entry"));
        }

        let mut reservations = Reservations::default();
        let mut admitted = Vec::with_capacity(cmd.entries.len());
        for (idx, candidate) in cmd.entries.iter().enumerate() {
            let entry = self
                .admit(candidate, cmd.occurred_at, &mut reservations)
                .map_err(|err| in_record(idx, &candidate.tag, err))?;
            admitted.push(entry);
        }

        Ok(vec![LedgerEvent::BatchLoaded(BatchLoaded {
            batch_id: cmd.batch_id,
            entries: admitted,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_relocate(&self, cmd: &RelocateEntry) -> DomainResult<Vec<LedgerEvent>> {
        let entry = self.require_stored(&cmd.tag, "relocate")?;

        let to = cmd.location.normalized();
        if !to.has_cava() {
            return Err(DomainError::validation("destination cava cannot be empty"));
        }
        if &to == entry.location() {
            return Err(DomainError::validation(format!(
                "tag {} is already at {to}",
                entry.tag()
            )));
        }
        self.ensure_capacity(&to, 0)?;
        let merma = validate_merma(cmd.merma, entry.neto())?;

        Ok(vec![LedgerEvent::EntryRelocated(EntryRelocated {
            tag: entry.tag().clone(),
            from: entry.location().clone(),
            to,
            merma,
            operador: trimmed(&cmd.operador),
            observaciones: cmd.observaciones.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_dispatch(&self, cmd: &DispatchEntry) -> DomainResult<Vec<LedgerEvent>> {
        let entry = self.require_stored(&cmd.tag, "dispatch")?;
        let merma = validate_merma(cmd.merma, entry.neto())?;

        Ok(vec![LedgerEvent::EntryDispatched(EntryDispatched {
            tag: entry.tag().clone(),
            destino: trimmed(&cmd.destino),
            merma,
            operador: trimmed(&cmd.operador),
            observaciones: cmd.observaciones.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateEntry) -> DomainResult<Vec<LedgerEvent>> {
        let current = self.require_stored(&cmd.tag, "update")?;
        if cmd.patch.is_empty() {
            return Err(DomainError::validation("patch does not change any field"));
        }

        let entry = self.patched(current, &cmd.patch)?;
        Ok(vec![LedgerEvent::EntryUpdated(EntryUpdated {
            entry,
            fields: cmd.patch.fields().into_iter().map(String::from).collect(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_product(&self, cmd: &RegisterProduct) -> DomainResult<Vec<LedgerEvent>> {
        let mut scratch = self.catalog.clone();
        let product = scratch.register(cmd.product.clone())?.clone();
        Ok(vec![LedgerEvent::ProductRegistered(ProductRegistered {
            product,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Apply a correction to a copy of `current` and re-validate it.
    fn patched(&self, current: &InventoryEntry, patch: &EntryPatch) -> DomainResult<InventoryEntry> {
        let mut next = current.clone();

        if let Some(turno) = patch.turno {
            next.turno = turno;
        }
        if let Some(v) = &patch.operador {
            next.operador = v.trim().to_string();
        }
        if let Some(code) = &patch.codigo {
            let product = self.catalog.resolve(code)?;
            next.codigo = product.code.clone();
            next.producto = product.name.clone();
        }
        if let Some(v) = &patch.lote {
            next.lote = v.trim().to_string();
        }
        if patch.fecha_fabricacion.is_some() {
            next.fecha_fabricacion = patch.fecha_fabricacion;
        }
        if patch.fecha_vencimiento.is_some() {
            next.fecha_vencimiento = patch.fecha_vencimiento;
        }
        if let Some(v) = &patch.origen {
            next.origen = v.trim().to_string();
        }
        if let Some(v) = &patch.entrada {
            next.entrada = v.trim().to_string();
        }
        if let Some(v) = &patch.destino {
            next.destino = v.trim().to_string();
        }
        if let Some(v) = patch.peso_bruto {
            next.weights.peso_bruto = v;
        }
        if let Some(v) = patch.tara_estibas {
            next.weights.tara_estibas = v;
        }
        if let Some(v) = patch.tara_cestas {
            next.weights.tara_cestas = v;
        }
        if let Some(v) = &patch.observaciones {
            next.observaciones = v.clone();
        }

        next.neto = next.weights.validate()?;
        validate_dates(next.fecha_fabricacion, next.fecha_vencimiento)?;
        validate_merma(next.merma, next.neto)?;

        Ok(next)
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim().to_string())
}

/// Prefix an error with the offending record, keeping its kind.
fn in_record(idx: usize, tag: &Tag, err: DomainError) -> DomainError {
    let ctx = |msg: String| format!("record #{idx} (tag {tag}): {msg}");
    match err {
        DomainError::Validation(m) => DomainError::Validation(ctx(m)),
        DomainError::InvalidTransition(m) => DomainError::InvalidTransition(ctx(m)),
        DomainError::InvariantViolation(m) => DomainError::InvariantViolation(ctx(m)),
        DomainError::InvalidId(m) => DomainError::InvalidId(ctx(m)),
        DomainError::NotFound(m) => DomainError::NotFound(ctx(m)),
        DomainError::Conflict(m) => DomainError::Conflict(ctx(m)),
    }
}
