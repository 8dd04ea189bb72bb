//! Inventory entry model: the ledger's unit of record and its value objects.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use cavastock_core::{DomainError, DomainResult, Entity, ValueObject};

/// Unique identifier of one inventory entry across its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self(value.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl core::fmt::Display for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Movement type recorded on an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    /// Intake.
    #[default]
    Entrada,
    /// Dispatch (terminal).
    Salida,
    /// Internal relocation.
    Traslado,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Entrada => "ENTRADA",
            MovementType::Salida => "SALIDA",
            MovementType::Traslado => "TRASLADO",
        }
    }

    pub fn lifecycle(self) -> LifecycleState {
        match self {
            MovementType::Entrada | MovementType::Traslado => LifecycleState::Stored,
            MovementType::Salida => LifecycleState::Dispatched,
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product category, fixed at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    /// Raw material.
    Mp,
    /// Finished product.
    #[default]
    Pt,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Mp => "MP",
            Category::Pt => "PT",
        }
    }
}

/// Lifecycle state of a stock unit, derived from its movement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Stored,
    Dispatched,
}

/// Storage coordinate: cava × pasillo × torre × piso × pagina.
///
/// Empty components mean "unspecified". A blank `piso` falls back to `nivel` when reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "LocationKeyInput")]
pub struct LocationKey {
    pub cava: String,
    pub pasillo: String,
    pub torre: String,
    pub piso: String,
    pub pagina: String,
}

/// Wire shape of a coordinate; clients send `piso`, `nivel`, or both.
#[derive(Default, Deserialize)]
#[serde(default)]
struct LocationKeyInput {
    cava: String,
    pasillo: String,
    torre: String,
    piso: String,
    nivel: String,
    pagina: String,
}

impl From<LocationKeyInput> for LocationKey {
    fn from(input: LocationKeyInput) -> Self {
        let piso = if input.piso.trim().is_empty() { input.nivel } else { input.piso };
        Self {
            cava: input.cava,
            pasillo: input.pasillo,
            torre: input.torre,
            piso,
            pagina: input.pagina,
        }
    }
}

impl ValueObject for LocationKey {}

impl LocationKey {
    pub fn new(
        cava: impl Into<String>,
        pasillo: impl Into<String>,
        torre: impl Into<String>,
        piso: impl Into<String>,
        pagina: impl Into<String>,
    ) -> Self {
        Self {
            cava: cava.into(),
            pasillo: pasillo.into(),
            torre: torre.into(),
            piso: piso.into(),
            pagina: pagina.into(),
        }
        .normalized()
    }

    /// A coordinate naming only the cava.
    pub fn in_cava(cava: impl Into<String>) -> Self {
        Self::new(cava, "", "", "", "")
    }

    /// Same key with every component trimmed.
    pub fn normalized(&self) -> Self {
        Self {
            cava: self.cava.trim().to_string(),
            pasillo: self.pasillo.trim().to_string(),
            torre: self.torre.trim().to_string(),
            piso: self.piso.trim().to_string(),
            pagina: self.pagina.trim().to_string(),
        }
    }

    /// A slotted coordinate names aisle, tower and level; only those have a bounded capacity.
    pub fn is_slotted(&self) -> bool {
        !self.pasillo.trim().is_empty() && !self.torre.trim().is_empty() && !self.piso.trim().is_empty()
    }

    pub fn has_cava(&self) -> bool {
        !self.cava.trim().is_empty()
    }
}

impl core::fmt::Display for LocationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fn part(s: &str) -> &str {
            if s.is_empty() { "-" } else { s }
        }
        write!(
            f,
            "cava {} / pasillo {} / torre {} / piso {} / pagina {}",
            part(&self.cava),
            part(&self.pasillo),
            part(&self.torre),
            part(&self.piso),
            part(&self.pagina)
        )
    }
}

/// Round a weight to grams (kg with three decimals), normalizing `-0.0`.
///
/// Used for report totals only; stored weights keep their full precision.
pub fn round_kg(value: f64) -> f64 {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Float slack allowed when comparing weights of magnitude `scale`.
fn weight_tolerance(scale: f64) -> f64 {
    1e-9 * scale.abs().max(1.0)
}

/// `value > limit`, ignoring float noise.
pub fn exceeds(value: f64, limit: f64) -> bool {
    value > limit + weight_tolerance(limit)
}

/// Strip float noise (below a microgram) from a derived weight, normalizing `-0.0`.
fn settle_kg(value: f64) -> f64 {
    let settled = (value * 1e9).round() / 1e9;
    if settled == 0.0 { 0.0 } else { settled }
}

/// Raw weight inputs of an entry. `neto` is derived from these and nothing else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weights {
    #[serde(default)]
    pub peso_bruto: f64,
    #[serde(default)]
    pub tara_estibas: f64,
    #[serde(default)]
    pub tara_cestas: f64,
}

impl ValueObject for Weights {}

impl Weights {
    pub fn new(peso_bruto: f64, tara_estibas: f64, tara_cestas: f64) -> Self {
        Self {
            peso_bruto,
            tara_estibas,
            tara_cestas,
        }
    }

    pub fn tares(&self) -> f64 {
        self.tara_estibas + self.tara_cestas
    }

    /// `pesoBruto − taraEstibas − taraCestas`. Never below zero once validated.
    pub fn neto(&self) -> f64 {
        settle_kg((self.peso_bruto - self.tares()).max(0.0))
    }

    /// Validate inputs and return the derived net weight.
    pub fn validate(&self) -> DomainResult<f64> {
        for (name, value) in [
            ("pesoBruto", self.peso_bruto),
            ("taraEstibas", self.tara_estibas),
            ("taraCestas", self.tara_cestas),
        ] {
            if !value.is_finite() {
                return Err(DomainError::validation(format!("{name} must be a finite number")));
            }
            if value < 0.0 {
                return Err(DomainError::validation(format!("{name} cannot be negative ({value})")));
            }
        }

        if exceeds(self.tares(), self.peso_bruto) {
            return Err(DomainError::validation(format!(
                "net weight cannot be negative: pesoBruto {} < taraEstibas {} + taraCestas {}",
                self.peso_bruto, self.tara_estibas, self.tara_cestas
            )));
        }
        Ok(self.neto())
    }
}

/// Validate an optional loss quantity against the entry's net weight.
pub fn validate_merma(merma: Option<f64>, neto: f64) -> DomainResult<Option<f64>> {
    let Some(m) = merma else {
        return Ok(None);
    };
    if !m.is_finite() || m < 0.0 {
        return Err(DomainError::validation(format!("merma must be a non-negative number ({m})")));
    }
    if exceeds(m, neto) {
        return Err(DomainError::validation(format!("merma {m} exceeds neto {neto}")));
    }
    Ok(Some(settle_kg(m.min(neto))))
}

/// Expiry must not precede manufacture.
pub fn validate_dates(fabricacion: Option<NaiveDate>, vencimiento: Option<NaiveDate>) -> DomainResult<()> {
    if let (Some(fab), Some(venc)) = (fabricacion, vencimiento) {
        if venc < fab {
            return Err(DomainError::validation(format!(
                "fechaVencimiento {venc} precedes fechaFabricacion {fab}"
            )));
        }
    }
    Ok(())
}

/// Display date stamped on new entries (`dd/mm/yyyy`).
pub fn fecha_registro(at: DateTime<Utc>) -> String {
    at.format("%d/%m/%Y").to_string()
}

/// ISO `YYYY-MM-DD` dates; blank strings read as absent.
///
/// Also accepts full RFC 3339 timestamps and `dd/mm/yyyy` on input.
pub mod iso_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Result<NaiveDate, String> {
        let raw = raw.trim();
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(d);
        }
        if let Some(prefix) = raw.get(..10) {
            if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Ok(d);
            }
        }
        NaiveDate::parse_from_str(raw, "%d/%m/%Y").map_err(|e| format!("invalid date {raw:?}: {e}"))
    }

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse(s).map(Some).map_err(serde::de::Error::custom),
        }
    }
}

/// A ledger record. Built only by the ledger, so `neto` always matches the weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventoryEntry {
    pub(crate) tag: Tag,
    pub(crate) fecha_registro: String,
    pub(crate) timestamp: i64,
    pub(crate) turno: u32,
    pub(crate) operador: String,
    pub(crate) codigo: String,
    pub(crate) producto: String,
    pub(crate) lote: String,
    #[serde(with = "iso_date")]
    pub(crate) fecha_fabricacion: Option<NaiveDate>,
    #[serde(with = "iso_date")]
    pub(crate) fecha_vencimiento: Option<NaiveDate>,
    pub(crate) origen: String,
    pub(crate) entrada: String,
    #[serde(flatten)]
    pub(crate) weights: Weights,
    pub(crate) neto: f64,
    pub(crate) destino: String,
    #[serde(flatten)]
    pub(crate) location: LocationKey,
    pub(crate) observaciones: String,
    pub(crate) categoria: Category,
    pub(crate) tipo: MovementType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) merma: Option<f64>,
}

impl Entity for InventoryEntry {
    type Id = Tag;

    fn id(&self) -> &Self::Id {
        &self.tag
    }
}

impl InventoryEntry {
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn fecha_registro(&self) -> &str {
        &self.fecha_registro
    }

    /// Creation instant, milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn turno(&self) -> u32 {
        self.turno
    }

    pub fn operador(&self) -> &str {
        &self.operador
    }

    pub fn codigo(&self) -> &str {
        &self.codigo
    }

    pub fn producto(&self) -> &str {
        &self.producto
    }

    pub fn lote(&self) -> &str {
        &self.lote
    }

    pub fn fecha_fabricacion(&self) -> Option<NaiveDate> {
        self.fecha_fabricacion
    }

    pub fn fecha_vencimiento(&self) -> Option<NaiveDate> {
        self.fecha_vencimiento
    }

    pub fn origen(&self) -> &str {
        &self.origen
    }

    pub fn entrada(&self) -> &str {
        &self.entrada
    }

    pub fn weights(&self) -> Weights {
        self.weights
    }

    pub fn peso_bruto(&self) -> f64 {
        self.weights.peso_bruto
    }

    pub fn tara_estibas(&self) -> f64 {
        self.weights.tara_estibas
    }

    pub fn tara_cestas(&self) -> f64 {
        self.weights.tara_cestas
    }

    pub fn neto(&self) -> f64 {
        self.neto
    }

    pub fn destino(&self) -> &str {
        &self.destino
    }

    pub fn location(&self) -> &LocationKey {
        &self.location
    }

    pub fn cava(&self) -> &str {
        &self.location.cava
    }

    pub fn observaciones(&self) -> &str {
        &self.observaciones
    }

    pub fn categoria(&self) -> Category {
        self.categoria
    }

    pub fn tipo(&self) -> MovementType {
        self.tipo
    }

    pub fn merma(&self) -> Option<f64> {
        self.merma
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.tipo.lifecycle()
    }

    /// STORED entries count as active stock.
    pub fn is_active(&self) -> bool {
        self.lifecycle() == LifecycleState::Stored
    }
}

/// Candidate payload for a new ENTRADA (single create or bulk import).
///
/// Accepts the full entry schema on input; `neto`, `producto` and `timestamp`
/// are ignored and derived by the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewEntry {
    pub tag: Tag,
    pub fecha_registro: String,
    pub turno: u32,
    pub operador: String,
    pub codigo: String,
    pub lote: String,
    #[serde(with = "iso_date")]
    pub fecha_fabricacion: Option<NaiveDate>,
    #[serde(with = "iso_date")]
    pub fecha_vencimiento: Option<NaiveDate>,
    pub origen: String,
    pub entrada: String,
    #[serde(flatten)]
    pub weights: Weights,
    pub destino: String,
    #[serde(flatten)]
    pub location: LocationKey,
    pub observaciones: String,
    pub categoria: Category,
    /// Must be absent or ENTRADA.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo: Option<MovementType>,
}

/// Field corrections allowed on a non-terminal entry.
///
/// `tag`, `categoria`, `tipo`, timestamps and the location key are not
/// patchable; unknown fields are rejected on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operador: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codigo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lote: Option<String>,
    #[serde(with = "iso_date", skip_serializing_if = "Option::is_none")]
    pub fecha_fabricacion: Option<NaiveDate>,
    #[serde(with = "iso_date", skip_serializing_if = "Option::is_none")]
    pub fecha_vencimiento: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrada: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destino: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peso_bruto: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tara_estibas: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tara_cestas: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observaciones: Option<String>,
}

impl EntryPatch {
    /// Names (wire spelling) of the fields this patch sets.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        let mut mark = |set: bool, name: &'static str| {
            if set {
                out.push(name);
            }
        };
        mark(self.turno.is_some(), "turno");
        mark(self.operador.is_some(), "operador");
        mark(self.codigo.is_some(), "codigo");
        mark(self.lote.is_some(), "lote");
        mark(self.fecha_fabricacion.is_some(), "fechaFabricacion");
        mark(self.fecha_vencimiento.is_some(), "fechaVencimiento");
        mark(self.origen.is_some(), "origen");
        mark(self.entrada.is_some(), "entrada");
        mark(self.destino.is_some(), "destino");
        mark(self.peso_bruto.is_some(), "pesoBruto");
        mark(self.tara_estibas.is_some(), "taraEstibas");
        mark(self.tara_cestas.is_some(), "taraCestas");
        mark(self.observaciones.is_some(), "observaciones");
        out
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    pub fn touches_weights(&self) -> bool {
        self.peso_bruto.is_some() || self.tara_estibas.is_some() || self.tara_cestas.is_some()
    }
}
